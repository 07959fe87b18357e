//! Built-in content: a minimal curated challenge library, fallback drafts
//! for when generation is unavailable, and condensed standards text fed to
//! the generation prompts.

use crate::domain::{
  Challenge, ChallengeDraft, CollaborativeProject, GradeLevel, PublicationStatus, RubricItem,
  SkillDomain,
};

fn rubric_item(criterion: &str, points: u32, description: &str) -> RubricItem {
  RubricItem {
    criterion: criterion.into(),
    points,
    description: description.into(),
  }
}

/// Minimal set of curated challenges so the library is useful even without
/// external config or an API key.
pub fn library_challenges() -> Vec<Challenge> {
  vec![
    Challenge {
      id: "lib-woodwork-g6-box-joint".into(),
      domain: SkillDomain::Woodwork,
      grade: GradeLevel::G6,
      title: "Basic Box Joint".into(),
      description: "Cut and assemble a small open box using finger joints. Document each cut and any adjustments you made.".into(),
      scenario: "The art room needs small storage boxes for brushes. Build one that holds together without glue.".into(),
      tools: vec!["Tenon saw".into(), "Bench hook".into(), "Sandpaper".into()],
      tutorial_links: vec![
        "box joint hand saw basics".into(),
        "tenon saw safety guide".into(),
      ],
      rubric: vec![
        rubric_item("C.2", 8, "Demonstrate technical skills: use tools and techniques to assemble a simple design safely."),
        rubric_item("C.4", 4, "List changes made to the chosen design."),
      ],
      xp_reward: 50,
      author: "System".into(),
      status: PublicationStatus::Published,
      assigned_student_ids: Vec::new(),
    },
    Challenge {
      id: "lib-3dprint-g8-phone-stand".into(),
      domain: SkillDomain::ThreeDPrinting,
      grade: GradeLevel::G8,
      title: "Phone Stand Prototype".into(),
      description: "Model and print a phone stand that holds a device at a usable angle. Iterate at least once and explain what changed.".into(),
      scenario: "Students keep propping phones against water bottles during video calls. Design something better.".into(),
      tools: vec!["Tinkercad".into(), "FDM printer".into(), "Calipers".into()],
      tutorial_links: vec![
        "tinkercad phone stand tutorial".into(),
        "3d printer first layer safety checklist".into(),
      ],
      rubric: vec![
        rubric_item("C.2", 8, "Demonstrate excellent skills: advanced technical proficiency with digital fabrication tools."),
        rubric_item("C.4", 4, "Explain changes made between iterations."),
      ],
      xp_reward: 50,
      author: "System".into(),
      status: PublicationStatus::Published,
      assigned_student_ids: Vec::new(),
    },
  ]
}

/// Placeholder served when challenge generation fails or is disabled. Valid
/// enough to preview; students can still submit against it.
pub fn fallback_challenge_draft(domain: SkillDomain, grade: GradeLevel) -> ChallengeDraft {
  ChallengeDraft {
    title: format!("{domain} Challenge for {grade}"),
    description: "Could not generate new content at this time. Practice a core technique in this domain and document your process step by step.".into(),
    scenario: "Content generation is offline.".into(),
    ..ChallengeDraft::default()
  }
}

/// Placeholder practice drill, lower stakes than a full challenge.
pub fn fallback_practice_draft(domain: SkillDomain) -> ChallengeDraft {
  ChallengeDraft {
    title: format!("Quick Drill: {domain}"),
    description: "Practice your basics. 1. Set up your tools. 2. Perform the core operation three times. 3. Clean up and note what improved.".into(),
    scenario: "Practice makes perfect.".into(),
    xp_reward: Some(crate::progress::PRACTICE_XP),
    ..ChallengeDraft::default()
  }
}

/// Placeholder team project for when generation fails.
pub fn fallback_team_project(theme: &str) -> CollaborativeProject {
  CollaborativeProject {
    title: "Team Innovation Challenge".into(),
    theme: theme.into(),
    scenario: "Work together to solve a community problem.".into(),
    objectives: vec![
      "Identify the problem".into(),
      "Design a solution".into(),
      "Build a prototype".into(),
    ],
    deliverables: vec!["Process journal".into(), "Prototype".into()],
    team_rubric: Vec::new(),
    tutorial_links: Vec::new(),
  }
}

/// Condensed Criterion C (Creating the Solution) standards per grade, used
/// to anchor generated rubrics to real codes.
pub fn standards_for(grade: GradeLevel) -> &'static str {
  match grade {
    GradeLevel::G6 => "MYP 1 Criterion C: C.1 Outline a plan with resources. C.2 Demonstrate technical skills: use tools safely with guidance. C.3 Follow the plan to create the solution. C.4 List changes made to the chosen design.",
    GradeLevel::G7 => "MYP 2 Criterion C: C.1 Outline a plan considering time and resources. C.2 Apply intermediate techniques with accuracy and precision. C.3 Follow the plan. C.4 List changes made to the design and plan.",
    GradeLevel::G8 => "MYP 3 Criterion C: C.1 Construct a logical plan. C.2 Advanced proficiency with digital fabrication tools; justify tool selection. C.3 Follow the plan precisely. C.4 Explain changes made.",
    GradeLevel::G9 | GradeLevel::G10 => "MYP 4/5 Criterion C: C.1 Construct a logical plan. C.2 Professional-level craftsmanship; integrate emerging technologies; solve technical issues independently. C.3 Follow the plan. C.4 Fully justify changes made.",
  }
}

/// One-line learning-pathway framing per grade for generation prompts.
pub fn pathway_for(grade: GradeLevel) -> &'static str {
  match grade {
    GradeLevel::G6 | GradeLevel::G7 => "Stage: INCLUDE (foundation). Challenges should be accessible, safe, and build core skills and confidence.",
    GradeLevel::G8 => "Stage: EMPOWER (exploration). Challenges should require autonomy, hands-on application, and student decision making.",
    GradeLevel::G9 | GradeLevel::G10 => "Stage: IMPACT (innovation). Projects must solve real problems with precision, sustainability, and measurable impact.",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn curated_library_entries_are_publishable() {
    for ch in library_challenges() {
      assert!(!ch.title.trim().is_empty());
      assert!(!ch.description.trim().is_empty());
      assert_eq!(ch.status, PublicationStatus::Published);
      assert!(ch.rubric.iter().all(|r| r.points > 0));
    }
  }

  #[test]
  fn fallback_drafts_pass_strict_validation() {
    let draft = fallback_challenge_draft(SkillDomain::Robotics, GradeLevel::G9);
    assert!(draft.rubric.is_empty() && draft.tools.is_empty());
    let ch = draft
      .publish(SkillDomain::Robotics, GradeLevel::G9)
      .expect("fallbacks must stay submittable");
    assert_eq!(ch.title, "Robotics Challenge for G9");
  }
}
