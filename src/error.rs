//! Error types shared across the backend.
//!
//! Boundaries between subsystems use typed errors; the low-level HTTP client
//! maps transport failures into [`ServiceError`] so callers can decide
//! whether a failure is fatal (feedback analysis) or degradable (tone check,
//! archive).

use thiserror::Error;

/// Failure talking to an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The endpoint for this collaborator was never configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// The remote service answered with an error status or a business-level
    /// failure flag.
    #[error("service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("network error: {0}")]
    Network(String),

    /// The bounded wait for the service elapsed.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The service answered but the payload did not parse.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Why a submit attempt was rejected. Every variant leaves the student's
/// progress and the shared submission log untouched.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Neither reflection text nor files were provided.
    #[error("submission needs a written reflection or at least one file")]
    EmptyPayload,

    /// An uploaded file's payload was not valid base64.
    #[error("file \"{0}\" is corrupt, please re-attach it")]
    MalformedFile(String),

    /// The feedback analyzer failed; the whole submit is aborted.
    #[error("feedback analysis failed: {0}")]
    Analysis(#[from] ServiceError),
}

/// Why a peer-review attempt was rejected before reaching the tone gate.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("constructive feedback text is required")]
    EmptyFeedback,

    #[error("unknown submission: {0}")]
    UnknownSubmission(String),
}

/// Login rejections from the allow-list check.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("an email address is required")]
    EmptyEmail,

    #[error("only allow-listed teacher accounts can access this dashboard")]
    TeacherNotAllowed,

    #[error("access is restricted to school accounts ({0})")]
    WrongStudentDomain(String),
}
