//! Interfaces to the external AI collaborators, plus the local fallbacks
//! used when no API key is configured.
//!
//! Contract summary:
//!   - content generation never fails outward: implementations return a
//!     placeholder draft instead of an error.
//!   - feedback analysis propagates failure; the submit flow treats it as
//!     fatal and leaves all state untouched.
//!   - tone validation fails open: an unreachable moderator never blocks a
//!     student from submitting a review.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::{
  AtlSkill, CollaborativeProject, ChallengeDraft, DifficultyLevel, GradeLevel, SkillDomain,
};
use crate::error::ServiceError;
use crate::seeds;

/// What the feedback analyzer returns for one submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAnalysis {
  pub feedback: String,
  #[serde(default)]
  pub atl_skills: Vec<AtlSkill>,
}

/// Verdict of the tone gate on peer feedback.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneVerdict {
  pub is_constructive: bool,
  #[serde(default)]
  pub suggestion: Option<String>,
}

impl ToneVerdict {
  /// The fail-open verdict used when the moderator cannot be reached.
  pub fn constructive() -> Self {
    Self { is_constructive: true, suggestion: None }
  }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
  async fn generate_challenge(
    &self,
    domain: SkillDomain,
    grade: GradeLevel,
    difficulty: DifficultyLevel,
  ) -> ChallengeDraft;

  async fn generate_practice(&self, domain: SkillDomain, grade: GradeLevel) -> ChallengeDraft;

  async fn generate_team_project(&self, theme: &str) -> CollaborativeProject;
}

#[async_trait]
pub trait FeedbackAnalyzer: Send + Sync {
  async fn analyze(
    &self,
    challenge_title: &str,
    submission_text: &str,
    rubric_summary: &str,
  ) -> Result<SubmissionAnalysis, ServiceError>;
}

#[async_trait]
pub trait ToneValidator: Send + Sync {
  async fn validate(&self, feedback: &str) -> ToneVerdict;
}

// -------- Local implementations (no API key) --------

/// Serves the built-in placeholder drafts. Keeps the app usable offline.
pub struct LocalGenerator;

#[async_trait]
impl ContentGenerator for LocalGenerator {
  #[instrument(level = "info", skip(self))]
  async fn generate_challenge(
    &self,
    domain: SkillDomain,
    grade: GradeLevel,
    _difficulty: DifficultyLevel,
  ) -> ChallengeDraft {
    seeds::fallback_challenge_draft(domain, grade)
  }

  #[instrument(level = "info", skip(self))]
  async fn generate_practice(&self, domain: SkillDomain, _grade: GradeLevel) -> ChallengeDraft {
    seeds::fallback_practice_draft(domain)
  }

  #[instrument(level = "info", skip(self))]
  async fn generate_team_project(&self, theme: &str) -> CollaborativeProject {
    seeds::fallback_team_project(theme)
  }
}

/// Keyword heuristic standing in for the remote analyzer. Always succeeds,
/// so offline submissions still get some feedback and ATL tags.
pub struct LocalAnalyzer;

#[async_trait]
impl FeedbackAnalyzer for LocalAnalyzer {
  #[instrument(level = "info", skip(self, submission_text, rubric_summary), fields(text_len = submission_text.len()))]
  async fn analyze(
    &self,
    challenge_title: &str,
    submission_text: &str,
    rubric_summary: &str,
  ) -> Result<SubmissionAnalysis, ServiceError> {
    let mut atl_skills = detect_atl_skills(submission_text);
    if atl_skills.is_empty() {
      atl_skills.push(AtlSkill::Communication);
    }

    let first_criterion = rubric_summary.split(':').next().unwrap_or("").trim();
    let opener = if submission_text.chars().count() >= 120 {
      "You described your process in good detail."
    } else {
      "Good start. Next time describe your process in more detail."
    };
    let feedback = if first_criterion.is_empty() {
      format!("{opener} Keep iterating on \"{challenge_title}\" and note any changes you make.")
    } else {
      format!(
        "{opener} For {first_criterion}, say which tools you used and how you used them safely."
      )
    };

    Ok(SubmissionAnalysis { feedback, atl_skills })
  }
}

/// Small word-list heuristic for the tone gate. Biased towards accepting:
/// it rejects only clearly unhelpful feedback (too short, or harsh wording
/// without any improvement suggestion).
pub struct LocalToneCheck;

const HARSH_WORDS: [&str; 8] = [
  "bad", "terrible", "awful", "ugly", "lazy", "stupid", "worst", "sucks",
];
const CONSTRUCTIVE_MARKERS: [&str; 7] = [
  "try", "next time", "could", "improve", "maybe", "consider", "suggest",
];

#[async_trait]
impl ToneValidator for LocalToneCheck {
  #[instrument(level = "info", skip(self, feedback), fields(text_len = feedback.len()))]
  async fn validate(&self, feedback: &str) -> ToneVerdict {
    let text = feedback.trim().to_lowercase();
    let has_harsh = HARSH_WORDS.iter().any(|w| text.contains(w));
    let has_marker = CONSTRUCTIVE_MARKERS.iter().any(|w| text.contains(w));

    if text.chars().count() < 20 {
      return ToneVerdict {
        is_constructive: false,
        suggestion: Some(
          "Say one specific thing they did well and one concrete thing to improve.".into(),
        ),
      };
    }
    if has_harsh && !has_marker {
      return ToneVerdict {
        is_constructive: false,
        suggestion: Some(
          "Rephrase the criticism as a suggestion, e.g. \"next time you could...\".".into(),
        ),
      };
    }
    ToneVerdict::constructive()
  }
}

/// Naive ATL detection over the reflection text.
fn detect_atl_skills(text: &str) -> Vec<AtlSkill> {
  let lower = text.to_lowercase();
  let mut skills = Vec::new();
  let rules: [(&[&str], AtlSkill); 4] = [
    (&["team", "partner", "together", "helped"], AtlSkill::Social),
    (&["plan", "schedule", "organized", "time"], AtlSkill::SelfManagement),
    (&["research", "looked up", "tutorial", "learned about"], AtlSkill::Research),
    (&["because", "decided", "tested", "compared"], AtlSkill::Thinking),
  ];
  for (needles, skill) in rules {
    if needles.iter().any(|n| lower.contains(n)) {
      skills.push(skill);
    }
  }
  skills
}
