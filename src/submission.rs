//! Submission pipeline: the single "submit work" action, end to end.
//!
//! Ordering is deliberate: validation, then feedback analysis (fatal on
//! failure), then best-effort archival, then exactly one ledger status
//! write, then the Submission record. Nothing is mutated before the
//! analyzer call completes, so a request dropped mid-flight leaves no trace.

use std::collections::HashSet;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::archive::{ArchivePayload, SubmissionArchive};
use crate::domain::{Challenge, ChallengeStatus, PeerReview, Submission};
use crate::error::SubmitError;
use crate::gateway::FeedbackAnalyzer;
use crate::progress::{ProgressLedger, StatusChange};
use uuid::Uuid;

/// One uploaded file, already base64-encoded by the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionFile {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub base64: String,
}

/// Everything the student provides when turning work in.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub student_id: String,
    pub student_name: String,
    pub content: String,
    #[serde(default)]
    pub files: Vec<SubmissionFile>,
}

/// What a successful submit hands back to the caller.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub submission: Submission,
    pub change: StatusChange,
    /// Set when archival failed; surfaced as a warning, never a rollback.
    pub archive_warning: Option<String>,
}

/// Shared, append-only submission log read by reviewers and teacher views.
/// Most recent first. The only in-place mutation is review attachment,
/// which runs as an atomic update-by-id under the write lock.
#[derive(Default)]
pub struct SubmissionLog {
    entries: RwLock<Vec<Submission>>,
}

impl SubmissionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, submission: Submission) {
        let mut entries = self.entries.write().await;
        entries.insert(0, submission);
    }

    pub async fn all(&self) -> Vec<Submission> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Submission> {
        let entries = self.entries.read().await;
        entries.iter().find(|s| s.id == id).cloned()
    }

    /// Attach an accepted review to its submission. Returns false when the
    /// submission id is unknown.
    pub async fn attach_review(&self, submission_id: &str, review: PeerReview) -> bool {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|s| s.id == submission_id) {
            Some(sub) => {
                sub.peer_reviews.push(review);
                true
            }
            None => false,
        }
    }
}

/// Submit work against a validated challenge for one curriculum cell.
///
/// All-or-nothing up to the analyzer call: if analysis fails, the status
/// map, the ledger XP, the archive, and the shared log are all untouched.
#[instrument(
    level = "info",
    skip_all,
    fields(challenge_id = %challenge.id, student = %request.student_id, text_len = request.content.len(), files = request.files.len())
)]
pub async fn submit(
    challenge: &Challenge,
    request: SubmitRequest,
    ledger: &ProgressLedger,
    analyzer: &dyn FeedbackAnalyzer,
    archive: &dyn SubmissionArchive,
    log: &SubmissionLog,
) -> Result<SubmitOutcome, SubmitError> {
    let content = request.content.trim().to_string();
    if content.is_empty() && request.files.is_empty() {
        return Err(SubmitError::EmptyPayload);
    }
    for file in &request.files {
        if base64::engine::general_purpose::STANDARD
            .decode(&file.base64)
            .is_err()
        {
            return Err(SubmitError::MalformedFile(file.name.clone()));
        }
    }

    let analysis = analyzer
        .analyze(&challenge.title, &content, &challenge.rubric_summary())
        .await?;

    let payload = ArchivePayload {
        student_name: request.student_name.clone(),
        student_id: request.student_id.clone(),
        grade: challenge.grade,
        domain: challenge.domain,
        challenge_title: challenge.title.clone(),
        submission_text: content.clone(),
        ai_feedback: analysis.feedback.clone(),
        atl_skills: analysis.atl_skills.clone(),
        files: request.files.clone(),
    };
    let (file_urls, archive_warning) = match archive.archive(&payload).await {
        Ok(receipt) => {
            if let Some(msg) = &receipt.message {
                debug!(target: "challenge", %msg, "Archive note");
            }
            (receipt.file_urls, None)
        }
        Err(e) => {
            warn!(target: "challenge", error = %e, "Archive failed; keeping submission locally");
            (Vec::new(), Some(e.to_string()))
        }
    };

    // Single point where XP may be awarded for this action.
    let change = ledger
        .set_status(&request.student_id, challenge.key(), ChallengeStatus::Submitted)
        .await;

    let submission = Submission {
        id: Uuid::new_v4().to_string(),
        challenge_id: challenge.id.clone(),
        domain: challenge.domain,
        grade: challenge.grade,
        title: challenge.title.clone(),
        student_name: request.student_name,
        content,
        file_urls,
        rubric: challenge.rubric.clone(),
        peer_reviews: Vec::new(),
        feedback: Some(analysis.feedback),
        atl_skills: dedup_skills(analysis.atl_skills),
        score: 0.0,
    };
    log.insert(submission.clone()).await;

    info!(
        target: "challenge",
        submission_id = %submission.id,
        xp_awarded = change.award.map(|a| a.amount).unwrap_or(0),
        archived = archive_warning.is_none(),
        "Submission recorded"
    );
    Ok(SubmitOutcome {
        submission,
        change,
        archive_warning,
    })
}

fn dedup_skills(skills: Vec<crate::domain::AtlSkill>) -> Vec<crate::domain::AtlSkill> {
    let mut seen = HashSet::new();
    skills.into_iter().filter(|s| seen.insert(*s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::archive::ArchiveReceipt;
    use crate::domain::{AtlSkill, ChallengeDraft, ChallengeKey, GradeLevel, SkillDomain};
    use crate::error::ServiceError;
    use crate::gateway::SubmissionAnalysis;
    use crate::progress::{ProgressLedger, SUBMISSION_XP};

    struct StubAnalyzer {
        fail: bool,
    }

    #[async_trait]
    impl FeedbackAnalyzer for StubAnalyzer {
        async fn analyze(
            &self,
            _title: &str,
            _text: &str,
            _rubric: &str,
        ) -> Result<SubmissionAnalysis, ServiceError> {
            if self.fail {
                Err(ServiceError::Network("connection reset".into()))
            } else {
                Ok(SubmissionAnalysis {
                    feedback: "Nice precision on the joints.".into(),
                    atl_skills: vec![AtlSkill::Thinking, AtlSkill::Thinking],
                })
            }
        }
    }

    struct StubArchive {
        fail: bool,
    }

    #[async_trait]
    impl SubmissionArchive for StubArchive {
        async fn archive(&self, _payload: &ArchivePayload) -> Result<ArchiveReceipt, ServiceError> {
            if self.fail {
                Err(ServiceError::NotConfigured("archive endpoint"))
            } else {
                Ok(ArchiveReceipt {
                    message: None,
                    file_urls: vec!["https://archive.example/f1".into()],
                })
            }
        }

        async fn export_document(
            &self,
            _challenge: &Challenge,
            _student_name: &str,
        ) -> crate::archive::DocExport {
            unimplemented!("not exercised here")
        }
    }

    fn challenge() -> Challenge {
        ChallengeDraft {
            id: Some("ch-1".into()),
            title: "Basic Box Joint".into(),
            description: "Build a box.".into(),
            rubric: vec![crate::domain::RubricItem {
                criterion: "C.2".into(),
                points: 8,
                description: "Demonstrate technical skills.".into(),
            }],
            ..ChallengeDraft::default()
        }
        .publish(SkillDomain::Woodwork, GradeLevel::G6)
        .expect("valid challenge")
    }

    fn request(content: &str, files: Vec<SubmissionFile>) -> SubmitRequest {
        SubmitRequest {
            student_id: "alice@fis.ed.jp".into(),
            student_name: "Alice".into(),
            content: content.into(),
            files,
        }
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_before_any_side_effect() {
        let ledger = ProgressLedger::new(SUBMISSION_XP);
        let log = SubmissionLog::new();
        let ch = challenge();
        ledger.ensure_student("alice@fis.ed.jp").await;

        let result = submit(
            &ch,
            request("   ", Vec::new()),
            &ledger,
            &StubAnalyzer { fail: false },
            &StubArchive { fail: false },
            &log,
        )
        .await;

        assert!(matches!(result, Err(SubmitError::EmptyPayload)));
        assert!(log.all().await.is_empty());
        assert_eq!(
            ledger.status("alice@fis.ed.jp", ch.key()).await,
            ChallengeStatus::Available
        );
    }

    #[tokio::test]
    async fn corrupt_file_payload_is_rejected_up_front() {
        let ledger = ProgressLedger::new(SUBMISSION_XP);
        let log = SubmissionLog::new();
        let ch = challenge();
        ledger.ensure_student("alice@fis.ed.jp").await;

        let result = submit(
            &ch,
            request("My box joint holds weight.", vec![SubmissionFile {
                name: "box.jpg".into(),
                mime: "image/jpeg".into(),
                base64: "!!not-base64!!".into(),
            }]),
            &ledger,
            &StubAnalyzer { fail: false },
            &StubArchive { fail: false },
            &log,
        )
        .await;

        assert!(matches!(result, Err(SubmitError::MalformedFile(_))));
        assert!(log.all().await.is_empty());
        assert_eq!(
            ledger.status("alice@fis.ed.jp", ch.key()).await,
            ChallengeStatus::Available
        );
    }

    #[tokio::test]
    async fn analyzer_failure_aborts_everything() {
        let ledger = ProgressLedger::new(SUBMISSION_XP);
        let log = SubmissionLog::new();
        let ch = challenge();
        let key = ChallengeKey::new(ch.domain, ch.grade);
        ledger
            .set_status("alice@fis.ed.jp", key, ChallengeStatus::InProgress)
            .await;
        let xp_before = ledger.snapshot("alice@fis.ed.jp").await.unwrap().xp;

        let result = submit(
            &ch,
            request("My box joint holds weight.", Vec::new()),
            &ledger,
            &StubAnalyzer { fail: true },
            &StubArchive { fail: false },
            &log,
        )
        .await;

        assert!(matches!(result, Err(SubmitError::Analysis(_))));
        assert!(log.all().await.is_empty());
        assert_eq!(
            ledger.status("alice@fis.ed.jp", key).await,
            ChallengeStatus::InProgress
        );
        assert_eq!(ledger.snapshot("alice@fis.ed.jp").await.unwrap().xp, xp_before);
    }

    #[tokio::test]
    async fn successful_submit_updates_status_and_awards_once() {
        let ledger = ProgressLedger::new(SUBMISSION_XP);
        let log = SubmissionLog::new();
        let ch = challenge();

        let outcome = submit(
            &ch,
            request("My box joint holds weight.", Vec::new()),
            &ledger,
            &StubAnalyzer { fail: false },
            &StubArchive { fail: false },
            &log,
        )
        .await
        .expect("submit");

        assert_eq!(outcome.change.current, ChallengeStatus::Submitted);
        assert_eq!(outcome.change.award.unwrap().amount, SUBMISSION_XP);
        assert_eq!(outcome.submission.score, 0.0);
        assert_eq!(outcome.submission.rubric, ch.rubric);
        assert_eq!(outcome.submission.file_urls.len(), 1);
        // Duplicate ATL tags from the analyzer collapse to a set.
        assert_eq!(outcome.submission.atl_skills, vec![AtlSkill::Thinking]);

        // Resubmitting the same cell creates a new record but no new XP.
        let second = submit(
            &ch,
            request("Improved the sanding.", Vec::new()),
            &ledger,
            &StubAnalyzer { fail: false },
            &StubArchive { fail: false },
            &log,
        )
        .await
        .expect("resubmit");
        assert!(second.change.award.is_none());
        assert_eq!(ledger.snapshot("alice@fis.ed.jp").await.unwrap().xp, SUBMISSION_XP);

        // Most recent first.
        let all = log.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.submission.id);
    }

    #[tokio::test]
    async fn archive_failure_is_a_warning_not_a_rollback() {
        let ledger = ProgressLedger::new(SUBMISSION_XP);
        let log = SubmissionLog::new();
        let ch = challenge();

        let outcome = submit(
            &ch,
            request("", vec![SubmissionFile {
                name: "box.jpg".into(),
                mime: "image/jpeg".into(),
                base64: "aGVsbG8=".into(),
            }]),
            &ledger,
            &StubAnalyzer { fail: false },
            &StubArchive { fail: true },
            &log,
        )
        .await
        .expect("files-only submit with failing archive still succeeds");

        assert!(outcome.archive_warning.is_some());
        assert!(outcome.submission.file_urls.is_empty());
        assert_eq!(log.all().await.len(), 1);
        assert_eq!(
            ledger.status("alice@fis.ed.jp", ch.key()).await,
            ChallengeStatus::Submitted
        );
    }

    #[tokio::test]
    async fn review_attachment_is_by_id() {
        let log = SubmissionLog::new();
        let ch = challenge();
        let mut sub = Submission {
            id: "sub-1".into(),
            challenge_id: ch.id.clone(),
            domain: ch.domain,
            grade: ch.grade,
            title: ch.title.clone(),
            student_name: "Alice".into(),
            content: "Box joint holds weight.".into(),
            file_urls: Vec::new(),
            rubric: ch.rubric.clone(),
            peer_reviews: Vec::new(),
            feedback: None,
            atl_skills: Vec::new(),
            score: 0.0,
        };
        log.insert(sub.clone()).await;
        sub.id = "sub-2".into();
        log.insert(sub).await;

        let review = PeerReview {
            id: "r-1".into(),
            reviewer_id: "bob@fis.ed.jp".into(),
            submission_id: "sub-1".into(),
            ratings: Vec::new(),
            constructive_feedback: "Clean joints; sand the edges next time.".into(),
            timestamp: chrono::Utc::now(),
        };
        assert!(log.attach_review("sub-1", review.clone()).await);
        assert!(!log.attach_review("missing", review).await);

        let stored = log.get("sub-1").await.unwrap();
        assert_eq!(stored.peer_reviews.len(), 1);
        assert!(log.get("sub-2").await.unwrap().peer_reviews.is_empty());
    }
}
