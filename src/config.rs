//! Loading hub configuration (prompts, access rules, roster seeds, and an
//! optional curated challenge library) from TOML.
//!
//! See `HubConfig` for the expected schema. Everything is optional; missing
//! or invalid config degrades to defaults with an error log.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{ChallengeDraft, GradeLevel, SkillDomain, UserRole};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct HubConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub access: AccessRules,
  #[serde(default)]
  pub roster: Vec<RosterEntry>,
  #[serde(default)]
  pub library: Vec<LibraryEntry>,
  #[serde(default)]
  pub xp: XpRules,
}

/// Allow-list rules for login. Teachers must match an explicit list;
/// students must carry the school domain.
#[derive(Clone, Debug, Deserialize)]
pub struct AccessRules {
  #[serde(default = "default_teacher_allowlist")]
  pub teacher_allowlist: Vec<String>,
  #[serde(default = "default_student_domain")]
  pub student_domain: String,
}

fn default_teacher_allowlist() -> Vec<String> {
  vec!["teacher@fis.ed.jp".into(), "mzuk@fis.ed.jp".into()]
}

fn default_student_domain() -> String {
  "@fis.ed.jp".into()
}

impl Default for AccessRules {
  fn default() -> Self {
    Self {
      teacher_allowlist: default_teacher_allowlist(),
      student_domain: default_student_domain(),
    }
  }
}

/// Optional pre-seeded account, mainly to carry XP across deployments.
#[derive(Clone, Debug, Deserialize)]
pub struct RosterEntry {
  pub name: String,
  pub email: String,
  #[serde(default = "default_role")]
  pub role: UserRole,
  #[serde(default)]
  pub xp: u32,
  #[serde(default)]
  pub level: Option<u32>,
}

fn default_role() -> UserRole {
  UserRole::Student
}

/// A curated challenge accepted in TOML configuration. Title and
/// description are required at load time (entries failing validation are
/// skipped with an error log).
#[derive(Clone, Debug, Deserialize)]
pub struct LibraryEntry {
  pub domain: SkillDomain,
  pub grade: GradeLevel,
  #[serde(flatten)]
  pub draft: ChallengeDraft,
}

/// XP tuning knobs. The level formula itself is fixed.
#[derive(Clone, Debug, Deserialize)]
pub struct XpRules {
  #[serde(default = "default_submission_bonus")]
  pub submission_bonus: u32,
}

fn default_submission_bonus() -> u32 {
  crate::progress::SUBMISSION_XP
}

impl Default for XpRules {
  fn default() -> Self {
    Self { submission_bonus: default_submission_bonus() }
  }
}

/// Prompts used by the OpenAI-backed collaborators. Defaults target an IB
/// MYP design classroom; override them in TOML to tune tone or structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Challenge generation
  pub challenge_system: String,
  pub challenge_user_template: String,
  // Practice drill generation
  pub practice_system: String,
  pub practice_user_template: String,
  // Team project generation
  pub team_system: String,
  pub team_user_template: String,
  // Submission feedback analysis
  pub analysis_system: String,
  pub analysis_user_template: String,
  // Peer feedback tone check
  pub tone_system: String,
  pub tone_user_template: String,
}

const PERSONA_BASE: &str = "You are the engine behind a school Design Pathway Hub. Be supportive, student-friendly, aligned with MYP Design language, and clear. Never guess student information.";

impl Default for Prompts {
  fn default() -> Self {
    Self {
      challenge_system: format!("{PERSONA_BASE} You are creating content for students. Be inspiring. Respond ONLY with strict JSON."),
      challenge_user_template: "Create a practical MYP Design challenge for grade {grade} in the skill domain {domain}. Difficulty: {difficulty}.\nPathway context: {pathway}\nAssessment standards: {standards}\nRules: the rubric must use ONLY Criterion C codes and language from the standards above; tutorialLinks must be 2-3 search terms including at least one safety-focused term.\nReturn JSON with fields: title, description, scenario, tools (array), tutorialLinks (array), rubric (array of {criterion, points, description}).".into(),
      practice_system: format!("{PERSONA_BASE} You are a coach running a quick practice session. Respond ONLY with strict JSON."),
      practice_user_template: "Create a SHORT 20-minute practice drill for a grade {grade} student to hone {domain} technique. Fun title, simple scenario, step-by-step description, pass/fail style rubric, minimal tools.\nReturn JSON with fields: title, description, scenario, tools, tutorialLinks, rubric.".into(),
      team_system: format!("{PERSONA_BASE} You are creating a collaborative curriculum. Focus on teamwork and impact. Respond ONLY with strict JSON."),
      team_user_template: "Create a collaborative MYP Design project for a team of 3-4 students. Theme: {theme}.\nQuality benchmark standards: {standards}\nRequire multiple skills, clear role-based collaboration, deliverables per design-cycle phase, and 2-3 tutorial search terms.\nReturn JSON with fields: title, scenario, objectives (array), deliverables (array), teamRubric (array of {criterion, points, description}), tutorialLinks (array).".into(),
      analysis_system: format!("{PERSONA_BASE} Provide supportive, level-appropriate feedback. Respond ONLY with strict JSON."),
      analysis_user_template: "Challenge: {title}\nStudent submission: \"{submission}\"\nRubric criteria: {rubric}\n\nTask 1: constructive feedback (max 100 words) on TECHNICAL SKILLS, referencing criterion codes where applicable; start positive, then one improvement on safety or accuracy.\nTask 2: list which ATL skills are clearly evident (1-3 of: Communication, Social, Self-Management, Research, Thinking).\nReturn JSON: {\"feedback\": string, \"atlSkills\": array}.".into(),
      tone_system: format!("{PERSONA_BASE} Coach students to give kind and helpful feedback. Respond ONLY with strict JSON."),
      tone_user_template: "Peer review feedback written by a student for another student:\n\"{feedback}\"\nIs it constructive, kind, and specific? If rude, too vague (e.g. \"it's bad\"), or unhelpful, return false and suggest a better phrasing.\nReturn JSON: {\"isConstructive\": boolean, \"suggestion\": string}.".into(),
    }
  }
}

/// Attempt to load `HubConfig` from HUB_CONFIG_PATH. On any parsing/IO
/// error, returns None and the caller falls back to defaults.
pub fn load_hub_config_from_env() -> Option<HubConfig> {
  let path = std::env::var("HUB_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<HubConfig>(&s) {
      Ok(cfg) => {
        info!(target: "designhub_backend", %path, "Loaded hub config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "designhub_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "designhub_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

impl AccessRules {
  /// Allow-list check. Teachers must appear verbatim; students only need
  /// the school domain suffix. Comparison is case-insensitive.
  pub fn check(&self, email: &str, role: UserRole) -> Result<(), crate::error::AccessError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
      return Err(crate::error::AccessError::EmptyEmail);
    }
    match role {
      UserRole::Teacher => {
        if self.teacher_allowlist.iter().any(|t| t.to_lowercase() == email) {
          Ok(())
        } else {
          Err(crate::error::AccessError::TeacherNotAllowed)
        }
      }
      UserRole::Student => {
        if email.ends_with(&self.student_domain.to_lowercase()) {
          Ok(())
        } else {
          Err(crate::error::AccessError::WrongStudentDomain(
            self.student_domain.clone(),
          ))
        }
      }
    }
  }
}
