//! Peer review subsystem: the review-authoring flow for one submission,
//! gated by an automated tone check.
//!
//! Stages: DRAFTING -> VALIDATING -> {REJECTED_RETRY | ACCEPTED}. A rejected
//! review surfaces the moderator's suggestion and the reviewer may edit and
//! resubmit as often as they like. Nothing is written until ACCEPTED.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Nomination, PeerReview, ReviewRating, Submission};
use crate::error::ReviewError;
use crate::gateway::ToneValidator;
use crate::submission::SubmissionLog;

pub const NOMINATION_AWARD: &str = "Best Design of The Year";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStage {
  Drafting,
  Validating,
  RejectedRetry,
  Accepted,
}

/// What the reviewer fills in before hitting submit.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewForm {
  #[serde(default)]
  pub ratings: Vec<ReviewRating>,
  pub feedback: String,
  #[serde(default)]
  pub nominate: bool,
}

/// Terminal result of one review attempt.
#[derive(Debug)]
pub enum ReviewOutcome {
  Accepted {
    review: PeerReview,
    nomination: Option<Nomination>,
  },
  /// Tone gate said no. The reviewer keeps their draft and retries.
  RejectedRetry { suggestion: String },
}

impl ReviewOutcome {
  pub fn stage(&self) -> ReviewStage {
    match self {
      ReviewOutcome::Accepted { .. } => ReviewStage::Accepted,
      ReviewOutcome::RejectedRetry { .. } => ReviewStage::RejectedRetry,
    }
  }
}

/// Run one review attempt against a submission in the shared log.
///
/// The tone check is the only suspension point. A rejection creates nothing
/// and mutates nothing; an acceptance clamps every rating into its
/// criterion's range, persists the review onto the submission, and carries
/// the optional nomination as a side annotation of the acceptance.
#[instrument(level = "info", skip(log, tone, form), fields(%submission_id, %reviewer_id, ratings = form.ratings.len()))]
pub async fn submit_review(
  log: &SubmissionLog,
  tone: &dyn ToneValidator,
  submission_id: &str,
  reviewer_id: &str,
  form: ReviewForm,
) -> Result<ReviewOutcome, ReviewError> {
  let feedback = form.feedback.trim().to_string();
  if feedback.is_empty() {
    return Err(ReviewError::EmptyFeedback);
  }
  let submission = log
    .get(submission_id)
    .await
    .ok_or_else(|| ReviewError::UnknownSubmission(submission_id.to_string()))?;

  debug!(target: "review", stage = ?ReviewStage::Validating, "Checking feedback tone");
  let verdict = tone.validate(&feedback).await;
  if !verdict.is_constructive {
    let suggestion = verdict
      .suggestion
      .unwrap_or_else(|| "Please make your feedback more specific and kind.".into());
    info!(target: "review", %submission_id, "Review rejected by tone gate");
    return Ok(ReviewOutcome::RejectedRetry { suggestion });
  }

  let ratings = clamp_ratings(form.ratings, &submission);
  let review = PeerReview {
    id: Uuid::new_v4().to_string(),
    reviewer_id: reviewer_id.to_string(),
    submission_id: submission_id.to_string(),
    ratings,
    constructive_feedback: feedback.clone(),
    timestamp: Utc::now(),
  };
  if !log.attach_review(submission_id, review.clone()).await {
    return Err(ReviewError::UnknownSubmission(submission_id.to_string()));
  }

  let nomination = form.nominate.then(|| Nomination {
    id: Uuid::new_v4().to_string(),
    student_name: submission.student_name.clone(),
    award: NOMINATION_AWARD.into(),
    justification: feedback,
    timestamp: Utc::now(),
  });
  info!(
    target: "review",
    %submission_id,
    review_id = %review.id,
    nominated = nomination.is_some(),
    "Review accepted"
  );
  Ok(ReviewOutcome::Accepted { review, nomination })
}

/// Bound every rating to [0, criterion.points] against the submission's
/// rubric snapshot. Ratings naming a criterion the rubric does not carry
/// cannot be bounded and are dropped.
fn clamp_ratings(ratings: Vec<ReviewRating>, submission: &Submission) -> Vec<ReviewRating> {
  ratings
    .into_iter()
    .filter_map(|mut rating| {
      match submission
        .rubric
        .iter()
        .find(|item| item.criterion == rating.criterion)
      {
        Some(item) => {
          if rating.score > item.points {
            debug!(
              target: "review",
              criterion = %rating.criterion,
              score = rating.score,
              max = item.points,
              "Clamping out-of-range rating"
            );
            rating.score = item.points;
          }
          Some(rating)
        }
        None => {
          warn!(target: "review", criterion = %rating.criterion, "Dropping rating for unknown criterion");
          None
        }
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;

  use crate::domain::{GradeLevel, RubricItem, SkillDomain};
  use crate::gateway::ToneVerdict;

  struct StubTone {
    constructive: bool,
  }

  #[async_trait]
  impl ToneValidator for StubTone {
    async fn validate(&self, _feedback: &str) -> ToneVerdict {
      if self.constructive {
        ToneVerdict::constructive()
      } else {
        ToneVerdict {
          is_constructive: false,
          suggestion: Some("Try naming one thing to improve.".into()),
        }
      }
    }
  }

  async fn seeded_log() -> SubmissionLog {
    let log = SubmissionLog::new();
    log
      .insert(Submission {
        id: "sub-1".into(),
        challenge_id: "ch-1".into(),
        domain: SkillDomain::Woodwork,
        grade: GradeLevel::G6,
        title: "Basic Box Joint".into(),
        student_name: "Alice".into(),
        content: "Box joint holds weight.".into(),
        file_urls: Vec::new(),
        rubric: vec![RubricItem {
          criterion: "C.2".into(),
          points: 8,
          description: "Demonstrate technical skills.".into(),
        }],
        peer_reviews: Vec::new(),
        feedback: None,
        atl_skills: Vec::new(),
        score: 0.0,
      })
      .await;
    log
  }

  fn form(feedback: &str, ratings: Vec<ReviewRating>, nominate: bool) -> ReviewForm {
    ReviewForm {
      ratings,
      feedback: feedback.into(),
      nominate,
    }
  }

  #[tokio::test]
  async fn empty_feedback_is_a_noop_guard() {
    let log = seeded_log().await;
    let result = submit_review(&log, &StubTone { constructive: true }, "sub-1", "bob", form("  ", Vec::new(), false)).await;
    assert!(matches!(result, Err(ReviewError::EmptyFeedback)));
    assert!(log.get("sub-1").await.unwrap().peer_reviews.is_empty());
  }

  #[tokio::test]
  async fn unconstructive_feedback_creates_nothing() {
    let log = seeded_log().await;
    let outcome = submit_review(
      &log,
      &StubTone { constructive: false },
      "sub-1",
      "bob",
      form("it's bad", Vec::new(), true),
    )
    .await
    .expect("flow runs");

    match outcome {
      ReviewOutcome::RejectedRetry { suggestion } => {
        assert!(!suggestion.is_empty());
      }
      other => panic!("expected rejection, got {other:?}"),
    }
    assert!(log.get("sub-1").await.unwrap().peer_reviews.is_empty());
  }

  #[tokio::test]
  async fn constructive_feedback_is_persisted_onto_the_submission() {
    let log = seeded_log().await;
    let outcome = submit_review(
      &log,
      &StubTone { constructive: true },
      "sub-1",
      "bob",
      form(
        "Great use of the box joint technique; next time sand the edges more evenly.",
        vec![ReviewRating {
          criterion: "C.2".into(),
          score: 6,
          comment: "Tight joints".into(),
        }],
        false,
      ),
    )
    .await
    .expect("flow runs");

    assert_eq!(outcome.stage(), ReviewStage::Accepted);
    let stored = log.get("sub-1").await.unwrap();
    assert_eq!(stored.peer_reviews.len(), 1);
    assert_eq!(stored.peer_reviews[0].reviewer_id, "bob");
  }

  #[tokio::test]
  async fn ratings_are_clamped_and_unknown_criteria_dropped() {
    let log = seeded_log().await;
    let outcome = submit_review(
      &log,
      &StubTone { constructive: true },
      "sub-1",
      "bob",
      form(
        "Solid work overall; consider a finer saw for the last cut.",
        vec![
          ReviewRating { criterion: "C.2".into(), score: 99, comment: String::new() },
          ReviewRating { criterion: "Z.9".into(), score: 3, comment: String::new() },
        ],
        false,
      ),
    )
    .await
    .expect("flow runs");

    let ReviewOutcome::Accepted { review, .. } = outcome else {
      panic!("expected acceptance");
    };
    assert_eq!(review.ratings.len(), 1);
    assert_eq!(review.ratings[0].score, 8);
  }

  #[tokio::test]
  async fn nomination_rides_along_with_acceptance() {
    let log = seeded_log().await;
    let outcome = submit_review(
      &log,
      &StubTone { constructive: true },
      "sub-1",
      "bob",
      form("Exceptional craftsmanship; the joints could be showcased as an example.", Vec::new(), true),
    )
    .await
    .expect("flow runs");

    let ReviewOutcome::Accepted { nomination, .. } = outcome else {
      panic!("expected acceptance");
    };
    let nomination = nomination.expect("nomination");
    assert_eq!(nomination.student_name, "Alice");
    assert_eq!(nomination.award, NOMINATION_AWARD);
  }

  #[tokio::test]
  async fn same_reviewer_may_review_twice() {
    let log = seeded_log().await;
    for _ in 0..2 {
      submit_review(
        &log,
        &StubTone { constructive: true },
        "sub-1",
        "bob",
        form("Clean joints; next time check the squareness before gluing.", Vec::new(), false),
      )
      .await
      .expect("flow runs");
    }
    assert_eq!(log.get("sub-1").await.unwrap().peer_reviews.len(), 2);
  }

  #[tokio::test]
  async fn unknown_submission_is_an_error() {
    let log = seeded_log().await;
    let result = submit_review(
      &log,
      &StubTone { constructive: true },
      "missing",
      "bob",
      form("Nice work; consider documenting each step.", Vec::new(), false),
    )
    .await;
    assert!(matches!(result, Err(ReviewError::UnknownSubmission(_))));
  }
}
