//! Domain models used by the backend: curriculum cells, challenge lifecycle,
//! rubrics, submissions, peer reviews, and per-student progress.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Skill domains of the design curriculum. One row of the skill matrix.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SkillDomain {
  Sketching,
  Woodwork,
  #[serde(rename = "Power Tools")]
  PowerTools,
  #[serde(rename = "3D Printing")]
  ThreeDPrinting,
  #[serde(rename = "Laser Cutter")]
  LaserCutter,
  Microbits,
  #[serde(rename = "Digital Design")]
  DigitalDesign,
  Textiles,
  Robotics,
  #[serde(rename = "Video Production")]
  VideoProduction,
  #[serde(rename = "Sustainable Design")]
  SustainableDesign,
  Programming,
  #[serde(rename = "AI Literacy")]
  AiLiteracy,
  Entrepreneurship,
}

impl SkillDomain {
  pub const ALL: [SkillDomain; 14] = [
    SkillDomain::Sketching,
    SkillDomain::Woodwork,
    SkillDomain::PowerTools,
    SkillDomain::ThreeDPrinting,
    SkillDomain::LaserCutter,
    SkillDomain::Microbits,
    SkillDomain::DigitalDesign,
    SkillDomain::Textiles,
    SkillDomain::Robotics,
    SkillDomain::VideoProduction,
    SkillDomain::SustainableDesign,
    SkillDomain::Programming,
    SkillDomain::AiLiteracy,
    SkillDomain::Entrepreneurship,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      SkillDomain::Sketching => "Sketching",
      SkillDomain::Woodwork => "Woodwork",
      SkillDomain::PowerTools => "Power Tools",
      SkillDomain::ThreeDPrinting => "3D Printing",
      SkillDomain::LaserCutter => "Laser Cutter",
      SkillDomain::Microbits => "Microbits",
      SkillDomain::DigitalDesign => "Digital Design",
      SkillDomain::Textiles => "Textiles",
      SkillDomain::Robotics => "Robotics",
      SkillDomain::VideoProduction => "Video Production",
      SkillDomain::SustainableDesign => "Sustainable Design",
      SkillDomain::Programming => "Programming",
      SkillDomain::AiLiteracy => "AI Literacy",
      SkillDomain::Entrepreneurship => "Entrepreneurship",
    }
  }

  pub fn from_name(s: &str) -> Option<Self> {
    Self::ALL.iter().copied().find(|d| d.name() == s)
  }
}

impl fmt::Display for SkillDomain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Grade levels served by the hub (MYP 1 through 5).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GradeLevel {
  G6,
  G7,
  G8,
  G9,
  G10,
}

impl GradeLevel {
  pub const ALL: [GradeLevel; 5] = [
    GradeLevel::G6,
    GradeLevel::G7,
    GradeLevel::G8,
    GradeLevel::G9,
    GradeLevel::G10,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      GradeLevel::G6 => "G6",
      GradeLevel::G7 => "G7",
      GradeLevel::G8 => "G8",
      GradeLevel::G9 => "G9",
      GradeLevel::G10 => "G10",
    }
  }

  pub fn from_name(s: &str) -> Option<Self> {
    Self::ALL.iter().copied().find(|g| g.name() == s)
  }
}

impl fmt::Display for GradeLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// One curriculum cell: a (domain, grade) pair. Keys the status map and the
/// challenge library. Rendered as `"{domain}-{grade}"`, e.g. `"Woodwork-G8"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChallengeKey {
  pub domain: SkillDomain,
  pub grade: GradeLevel,
}

impl ChallengeKey {
  pub fn new(domain: SkillDomain, grade: GradeLevel) -> Self {
    Self { domain, grade }
  }
}

impl fmt::Display for ChallengeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.domain, self.grade)
  }
}

impl FromStr for ChallengeKey {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (domain, grade) = s
      .rsplit_once('-')
      .ok_or_else(|| format!("malformed challenge key: {s}"))?;
    let domain =
      SkillDomain::from_name(domain).ok_or_else(|| format!("unknown skill domain: {domain}"))?;
    let grade =
      GradeLevel::from_name(grade).ok_or_else(|| format!("unknown grade level: {grade}"))?;
    Ok(Self { domain, grade })
  }
}

// Serialized as the display string so the status map comes out keyed the way
// the frontend expects (`"Woodwork-G8": "AVAILABLE"`).
impl Serialize for ChallengeKey {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for ChallengeKey {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// Per-cell lifecycle for a student. Mutated only through the progress ledger.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeStatus {
  Locked,
  Available,
  InProgress,
  Submitted,
  Completed,
}

impl ChallengeStatus {
  /// True once work has been turned in for this cell.
  pub fn is_turned_in(&self) -> bool {
    matches!(self, ChallengeStatus::Submitted | ChallengeStatus::Completed)
  }
}

/// Library lifecycle of a curated challenge.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationStatus {
  Draft,
  Published,
  Archived,
}

/// Approaches-to-Learning skill tags attached to submissions by analysis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AtlSkill {
  Communication,
  Social,
  #[serde(rename = "Self-Management")]
  SelfManagement,
  Research,
  Thinking,
}

/// Difficulty steering for generated challenges.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DifficultyLevel {
  Easy,
  Medium,
  Hard,
}

impl Default for DifficultyLevel {
  fn default() -> Self {
    DifficultyLevel::Medium
  }
}

/// One standards-coded assessment line item. `points` is the maximum a
/// reviewer may award for this criterion. Immutable once attached.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RubricItem {
  pub criterion: String,
  pub points: u32,
  pub description: String,
}

/// A fully specified challenge: either curated in the library or the
/// validated form of a generated draft. Only this type can be submitted
/// against; see [`ChallengeDraft::publish`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
  pub id: String,
  pub domain: SkillDomain,
  pub grade: GradeLevel,
  pub title: String,
  pub description: String,
  pub scenario: String,
  pub tools: Vec<String>,
  pub tutorial_links: Vec<String>,
  pub rubric: Vec<RubricItem>,
  pub xp_reward: u32,
  pub author: String,
  pub status: PublicationStatus,
  /// Empty means open to every student in the grade.
  pub assigned_student_ids: Vec<String>,
}

impl Challenge {
  pub fn key(&self) -> ChallengeKey {
    ChallengeKey::new(self.domain, self.grade)
  }

  /// Visibility rule: an unassigned challenge is implicitly open to all.
  pub fn is_visible_to(&self, student_id: &str) -> bool {
    self.assigned_student_ids.is_empty()
      || self.assigned_student_ids.iter().any(|id| id == student_id)
  }

  /// Flat `"C.2: desc; C.4: desc"` rendering handed to the feedback analyzer.
  pub fn rubric_summary(&self) -> String {
    self
      .rubric
      .iter()
      .map(|r| format!("{}: {}", r.criterion, r.description))
      .collect::<Vec<_>>()
      .join("; ")
  }
}

/// Why a draft could not be published.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
  #[error("challenge title is required")]
  MissingTitle,
  #[error("challenge description is required")]
  MissingDescription,
}

/// Partially specified challenge as produced by the content generator or the
/// library editor. Safe to preview; must pass [`ChallengeDraft::publish`]
/// before work can be started or submitted against it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChallengeDraft {
  pub id: Option<String>,
  pub title: String,
  pub description: String,
  pub scenario: String,
  pub tools: Vec<String>,
  pub tutorial_links: Vec<String>,
  pub rubric: Vec<RubricItem>,
  pub xp_reward: Option<u32>,
  pub author: Option<String>,
  pub status: Option<PublicationStatus>,
  pub assigned_student_ids: Vec<String>,
}

impl ChallengeDraft {
  /// Validate the draft against the given cell and produce a `Challenge`.
  /// Title and description are required; everything else gets defaults.
  pub fn publish(self, domain: SkillDomain, grade: GradeLevel) -> Result<Challenge, DraftError> {
    if self.title.trim().is_empty() {
      return Err(DraftError::MissingTitle);
    }
    if self.description.trim().is_empty() {
      return Err(DraftError::MissingDescription);
    }
    Ok(Challenge {
      id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
      domain,
      grade,
      title: self.title,
      description: self.description,
      scenario: self.scenario,
      tools: self.tools,
      tutorial_links: self.tutorial_links,
      rubric: self.rubric,
      xp_reward: self.xp_reward.unwrap_or(50),
      author: self.author.unwrap_or_else(|| "System".into()),
      status: self.status.unwrap_or(PublicationStatus::Published),
      assigned_student_ids: self.assigned_student_ids,
    })
  }
}

impl From<Challenge> for ChallengeDraft {
  fn from(c: Challenge) -> Self {
    ChallengeDraft {
      id: Some(c.id),
      title: c.title,
      description: c.description,
      scenario: c.scenario,
      tools: c.tools,
      tutorial_links: c.tutorial_links,
      rubric: c.rubric,
      xp_reward: Some(c.xp_reward),
      author: Some(c.author),
      status: Some(c.status),
      assigned_student_ids: c.assigned_student_ids,
    }
  }
}

/// A single rating a reviewer gives against one rubric criterion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewRating {
  pub criterion: String,
  pub score: u32,
  pub comment: String,
}

/// An accepted peer review. Only created after the tone gate passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerReview {
  pub id: String,
  pub reviewer_id: String,
  pub submission_id: String,
  pub ratings: Vec<ReviewRating>,
  pub constructive_feedback: String,
  pub timestamp: DateTime<Utc>,
}

/// A student's turned-in work. Created exactly once per successful submit;
/// immutable afterwards except for reviews appended by the review subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
  pub id: String,
  pub challenge_id: String,
  pub domain: SkillDomain,
  pub grade: GradeLevel,
  pub title: String,
  pub student_name: String,
  pub content: String,
  pub file_urls: Vec<String>,
  /// Snapshot of the challenge rubric at submit time. Later library edits do
  /// not reach back into past submissions.
  pub rubric: Vec<RubricItem>,
  pub peer_reviews: Vec<PeerReview>,
  pub feedback: Option<String>,
  pub atl_skills: Vec<AtlSkill>,
  pub score: f32,
}

/// Per-student progress record: XP, level, and the status of every cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
  pub user_id: String,
  pub xp: u32,
  pub level: u32,
  pub status_map: HashMap<ChallengeKey, ChallengeStatus>,
  pub completed_challenges: Vec<String>,
  pub badges: Vec<String>,
}

/// Login/session bookkeeping for one user, independent of progress.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetric {
  pub email: String,
  pub login_count: u32,
  pub total_minutes: f64,
  pub last_login: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
  Student,
  Teacher,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: UserRole,
}

/// Team challenge produced by the content generator for 3-4 students.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborativeProject {
  pub title: String,
  pub theme: String,
  pub scenario: String,
  pub objectives: Vec<String>,
  pub deliverables: Vec<String>,
  pub team_rubric: Vec<RubricItem>,
  pub tutorial_links: Vec<String>,
}

/// Award nomination raised alongside an accepted peer review.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nomination {
  pub id: String,
  pub student_name: String,
  pub award: String,
  pub justification: String,
  pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_round_trips_through_display() {
    for domain in SkillDomain::ALL {
      let key = ChallengeKey::new(domain, GradeLevel::G8);
      let parsed: ChallengeKey = key.to_string().parse().expect("parse");
      assert_eq!(parsed, key);
    }
  }

  #[test]
  fn key_display_matches_frontend_convention() {
    let key = ChallengeKey::new(SkillDomain::ThreeDPrinting, GradeLevel::G7);
    assert_eq!(key.to_string(), "3D Printing-G7");
  }

  #[test]
  fn draft_without_title_cannot_be_published() {
    let draft = ChallengeDraft {
      description: "Build a box.".into(),
      ..ChallengeDraft::default()
    };
    let err = draft
      .publish(SkillDomain::Woodwork, GradeLevel::G6)
      .unwrap_err();
    assert_eq!(err, DraftError::MissingTitle);
  }

  #[test]
  fn draft_without_description_cannot_be_published() {
    let draft = ChallengeDraft {
      title: "Box Joint".into(),
      description: "   ".into(),
      ..ChallengeDraft::default()
    };
    let err = draft
      .publish(SkillDomain::Woodwork, GradeLevel::G6)
      .unwrap_err();
    assert_eq!(err, DraftError::MissingDescription);
  }

  #[test]
  fn published_draft_gets_defaults() {
    let draft = ChallengeDraft {
      title: "Box Joint".into(),
      description: "Build a box with finger joints.".into(),
      ..ChallengeDraft::default()
    };
    let ch = draft
      .publish(SkillDomain::Woodwork, GradeLevel::G6)
      .expect("publish");
    assert!(!ch.id.is_empty());
    assert_eq!(ch.author, "System");
    assert_eq!(ch.status, PublicationStatus::Published);
    assert_eq!(ch.xp_reward, 50);
  }

  #[test]
  fn unassigned_challenge_is_open_to_all() {
    let draft = ChallengeDraft {
      title: "Box Joint".into(),
      description: "Build a box.".into(),
      ..ChallengeDraft::default()
    };
    let mut ch = draft
      .publish(SkillDomain::Woodwork, GradeLevel::G6)
      .expect("publish");
    assert!(ch.is_visible_to("anyone"));

    ch.assigned_student_ids = vec!["alice@school".into()];
    assert!(ch.is_visible_to("alice@school"));
    assert!(!ch.is_visible_to("bob@school"));
  }

  #[test]
  fn status_map_serializes_with_string_keys() {
    let mut map = HashMap::new();
    map.insert(
      ChallengeKey::new(SkillDomain::Woodwork, GradeLevel::G8),
      ChallengeStatus::Available,
    );
    let json = serde_json::to_value(&map).expect("json");
    assert_eq!(json["Woodwork-G8"], "AVAILABLE");
  }
}
