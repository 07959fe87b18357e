//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ActivityMetric, ChallengeDraft, ChallengeStatus, DifficultyLevel, GradeLevel, PeerReview,
    SkillDomain, StudentProgress, Submission, User, UserRole,
};
use crate::progress::{progress_fraction, StatusChange};
use crate::review::{ReviewForm, ReviewStage};
use crate::submission::SubmitRequest;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewChallenge {
        domain: SkillDomain,
        grade: GradeLevel,
        #[serde(default)]
        difficulty: DifficultyLevel,
        #[serde(default, rename = "studentId")]
        student_id: String,
    },
    SubmitWork(SubmitIn),
    SubmitReview(ReviewIn),
    Progress {
        #[serde(rename = "studentId")]
        student_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Challenge {
        challenge: ChallengeOut,
    },
    SubmitResult {
        submission: Submission,
        #[serde(rename = "xpAwarded")]
        xp_awarded: u32,
        #[serde(rename = "levelUp")]
        level_up: Option<u32>,
        #[serde(rename = "archiveWarning")]
        archive_warning: Option<String>,
    },
    ReviewResult {
        stage: ReviewStage,
        suggestion: Option<String>,
        review: Option<PeerReview>,
    },
    Progress {
        progress: ProgressOut,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for challenge delivery. A served challenge
/// may still be a partial draft (permissive preview); validation happens at
/// submit time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOut {
    pub domain: SkillDomain,
    pub grade: GradeLevel,
    #[serde(flatten)]
    pub draft: ChallengeDraft,
    pub origin: &'static str,
    /// The student's cell status after this fetch (AVAILABLE cells move to
    /// IN_PROGRESS on first open).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ChallengeStatus>,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub domain: SkillDomain,
    pub grade: GradeLevel,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub student: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PracticeQuery {
    pub domain: SkillDomain,
    pub grade: GradeLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeCompleteIn {
    pub student_id: String,
    #[serde(default)]
    pub xp_reward: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpOut {
    pub xp: u32,
    pub level: u32,
    pub level_up: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TeamIn {
    pub theme: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOut {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressOut>,
    /// The client holds the session start and echoes it back at logout time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutIn {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct OkOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub domain: SkillDomain,
    pub grade: GradeLevel,
    pub challenge: ChallengeDraft,
    #[serde(flatten)]
    pub request: SubmitRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOut {
    pub submission: Submission,
    pub status: ChallengeStatus,
    pub xp_awarded: u32,
    pub level_up: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_warning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIn {
    pub submission_id: String,
    pub reviewer_id: String,
    #[serde(flatten)]
    pub form: ReviewForm,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOut {
    pub stage: ReviewStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<PeerReview>,
    pub nominated: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub student: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOut {
    #[serde(flatten)]
    pub progress: StudentProgress,
    /// Fraction of the current level band earned, for the progress bar.
    pub progress_pct: f32,
}

impl ProgressOut {
    pub fn from_progress(progress: StudentProgress) -> Self {
        let progress_pct = progress_fraction(progress.xp, progress.level) * 100.0;
        Self { progress, progress_pct }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRow {
    #[serde(flatten)]
    pub metric: ActivityMetric,
    pub online: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportIn {
    pub domain: SkillDomain,
    pub grade: GradeLevel,
    pub challenge: ChallengeDraft,
    pub student_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    #[serde(default)]
    pub grade: Option<GradeLevel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryUpsertIn {
    pub domain: SkillDomain,
    pub grade: GradeLevel,
    #[serde(flatten)]
    pub challenge: ChallengeDraft,
}

/// Teacher action: mark a student's cell completed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteIn {
    pub student_id: String,
    pub domain: SkillDomain,
    pub grade: GradeLevel,
    pub challenge_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

/// Flatten a submit outcome's ledger change for responses.
pub fn xp_fields(change: &StatusChange) -> (u32, Option<u32>) {
    match change.award {
        Some(award) => (award.amount, award.leveled_up_to),
        None => (0, None),
    }
}
