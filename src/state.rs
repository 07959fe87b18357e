//! Application state: the challenge library, the progress ledger, the shared
//! submission log, engagement metrics, and the AI collaborators.
//!
//! Selection policy for a cell: a published, visible library challenge wins;
//! otherwise the content generator produces a fresh draft (the generator
//! itself degrades to a placeholder rather than erroring).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::archive::{HttpArchive, LocalArchive, SubmissionArchive};
use crate::config::{load_hub_config_from_env, AccessRules, HubConfig};
use crate::domain::{
    Challenge, ChallengeDraft, ChallengeKey, ChallengeStatus, DifficultyLevel, DraftError,
    GradeLevel, Nomination, PublicationStatus, SkillDomain, StudentProgress, User, UserRole,
};
use crate::error::AccessError;
use crate::gateway::{
    ContentGenerator, FeedbackAnalyzer, LocalAnalyzer, LocalGenerator, LocalToneCheck,
    ToneValidator,
};
use crate::metrics::EngagementRecorder;
use crate::openai::OpenAi;
use crate::progress::ProgressLedger;
use crate::seeds;
use crate::submission::SubmissionLog;

pub struct AppState {
    pub library: RwLock<HashMap<String, Challenge>>,
    pub by_cell: RwLock<HashMap<ChallengeKey, Vec<String>>>,
    pub ledger: ProgressLedger,
    pub submissions: SubmissionLog,
    pub nominations: RwLock<Vec<Nomination>>,
    pub recorder: EngagementRecorder,
    /// email -> session start; held here, not in the metric records.
    pub sessions: RwLock<HashMap<String, DateTime<Utc>>>,
    pub access: AccessRules,
    pub generator: Arc<dyn ContentGenerator>,
    pub analyzer: Arc<dyn FeedbackAnalyzer>,
    pub tone: Arc<dyn ToneValidator>,
    pub archive: Arc<dyn SubmissionArchive>,
}

impl AppState {
    /// Build state from env: load config, seed the library, wire the AI
    /// collaborators (OpenAI if keyed, local fallbacks otherwise).
    #[instrument(level = "info", skip_all)]
    pub async fn new() -> Self {
        let cfg = load_hub_config_from_env().unwrap_or_default();
        let state = Self::with_config(cfg).await;
        state.log_inventory().await;
        state
    }

    pub async fn with_config(cfg: HubConfig) -> Self {
        let mut library = HashMap::<String, Challenge>::new();
        let mut by_cell = HashMap::<ChallengeKey, Vec<String>>::new();

        // Config-provided library entries first; invalid ones are skipped.
        for entry in cfg.library {
            match entry.draft.publish(entry.domain, entry.grade) {
                Ok(ch) => {
                    by_cell.entry(ch.key()).or_default().push(ch.id.clone());
                    library.insert(ch.id.clone(), ch);
                }
                Err(e) => {
                    error!(target: "challenge", domain = %entry.domain, grade = %entry.grade, error = %e, "Skipping library entry");
                }
            }
        }

        // Always insert built-in seeds, but don't overwrite existing ids.
        for ch in seeds::library_challenges() {
            if !library.contains_key(&ch.id) {
                by_cell.entry(ch.key()).or_default().push(ch.id.clone());
                library.insert(ch.id.clone(), ch);
            }
        }

        let (generator, analyzer, tone) = match OpenAi::from_env(cfg.prompts.clone()) {
            Some(oa) => {
                info!(
                    target: "designhub_backend",
                    base_url = %oa.base_url(),
                    fast_model = %oa.fast_model,
                    strong_model = %oa.strong_model,
                    "OpenAI enabled."
                );
                let oa = Arc::new(oa);
                let generator: Arc<dyn ContentGenerator> = oa.clone();
                let analyzer: Arc<dyn FeedbackAnalyzer> = oa.clone();
                let tone: Arc<dyn ToneValidator> = oa;
                (generator, analyzer, tone)
            }
            None => {
                info!(target: "designhub_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local generation and checks.");
                let generator: Arc<dyn ContentGenerator> = Arc::new(LocalGenerator);
                let analyzer: Arc<dyn FeedbackAnalyzer> = Arc::new(LocalAnalyzer);
                let tone: Arc<dyn ToneValidator> = Arc::new(LocalToneCheck);
                (generator, analyzer, tone)
            }
        };

        let archive: Arc<dyn SubmissionArchive> = match HttpArchive::from_env() {
            Some(a) => Arc::new(a),
            None => {
                info!(target: "designhub_backend", "ARCHIVE_URL not set; submissions stay local and exports render offline.");
                Arc::new(LocalArchive)
            }
        };

        let ledger = ProgressLedger::new(cfg.xp.submission_bonus);
        for entry in &cfg.roster {
            if entry.role == UserRole::Student {
                info!(target: "designhub_backend", name = %entry.name, email = %entry.email, xp = entry.xp, "Seeding roster progress");
                ledger
                    .seed_student(StudentProgress {
                        user_id: entry.email.to_lowercase(),
                        xp: entry.xp,
                        level: entry.level.unwrap_or(1),
                        status_map: HashMap::new(),
                        completed_challenges: Vec::new(),
                        badges: Vec::new(),
                    })
                    .await;
            }
        }

        Self {
            library: RwLock::new(library),
            by_cell: RwLock::new(by_cell),
            ledger,
            submissions: SubmissionLog::new(),
            nominations: RwLock::new(Vec::new()),
            recorder: EngagementRecorder::from_env(),
            sessions: RwLock::new(HashMap::new()),
            access: cfg.access,
            generator,
            analyzer,
            tone,
            archive,
        }
    }

    async fn log_inventory(&self) {
        let library = self.library.read().await;
        let mut per_grade: HashMap<GradeLevel, usize> = HashMap::new();
        for ch in library.values() {
            *per_grade.entry(ch.grade).or_default() += 1;
        }
        for (grade, count) in per_grade {
            info!(target: "challenge", %grade, count, "Startup library inventory");
        }
    }

    /// Allow-list login. Students get their progress record created on
    /// first login and their engagement metric bumped.
    #[instrument(level = "info", skip(self))]
    pub async fn login(&self, email: &str, role: UserRole) -> Result<LoginSession, AccessError> {
        self.access.check(email, role)?;
        let email = email.trim().to_lowercase();
        let name = email.split('@').next().unwrap_or(&email).to_string();
        let prefix = match role {
            UserRole::Teacher => "teacher",
            UserRole::Student => "student",
        };
        let user = User {
            id: format!("{prefix}-{}", Uuid::new_v4()),
            name,
            email: email.clone(),
            role,
        };

        let (progress, session_start) = if role == UserRole::Student {
            let progress = self.ledger.ensure_student(&email).await;
            let start = self.recorder.on_login(&email);
            self.sessions.write().await.insert(email.clone(), start);
            (Some(progress), Some(start))
        } else {
            (None, None)
        };
        info!(target: "metrics", %email, ?role, "Login");
        Ok(LoginSession { user, progress, session_start })
    }

    /// Fold the session into the metrics. Without a prior login this is a
    /// no-op.
    #[instrument(level = "info", skip(self))]
    pub async fn logout(&self, email: &str) {
        let email = email.trim().to_lowercase();
        if let Some(start) = self.sessions.write().await.remove(&email) {
            self.recorder.on_logout(&email, start);
        }
    }

    /// Serve a challenge for one cell: library first, then generation.
    #[instrument(level = "info", skip(self), fields(%domain, %grade))]
    pub async fn challenge_for_cell(
        &self,
        domain: SkillDomain,
        grade: GradeLevel,
        difficulty: DifficultyLevel,
        student_id: &str,
    ) -> (ChallengeDraft, &'static str) {
        let key = ChallengeKey::new(domain, grade);
        if let Some(ids) = { self.by_cell.read().await.get(&key).cloned() } {
            let library = self.library.read().await;
            let visible = ids.iter().filter_map(|id| library.get(id)).find(|ch| {
                ch.status == PublicationStatus::Published && ch.is_visible_to(student_id)
            });
            if let Some(ch) = visible {
                info!(target: "challenge", %key, id = %ch.id, source = "library", "Serving library challenge");
                return (ChallengeDraft::from(ch.clone()), "library");
            }
        }

        let draft = self.generator.generate_challenge(domain, grade, difficulty).await;
        info!(target: "challenge", %key, title = %draft.title, source = "generated", "Serving generated challenge");
        (draft, "generated")
    }

    /// Opening an AVAILABLE cell moves it to IN_PROGRESS; any other state is
    /// left alone.
    pub async fn mark_opened(&self, student_id: &str, key: ChallengeKey) -> ChallengeStatus {
        let current = self.ledger.status(student_id, key).await;
        if current == ChallengeStatus::Available {
            self.ledger
                .set_status(student_id, key, ChallengeStatus::InProgress)
                .await
                .current
        } else {
            current
        }
    }

    /// Teacher library upsert: validates the draft, replaces any previous
    /// version, and reindexes the cell. Editing a library challenge never
    /// touches rubric snapshots inside past submissions.
    #[instrument(level = "info", skip(self, draft), fields(%domain, %grade))]
    pub async fn upsert_library(
        &self,
        domain: SkillDomain,
        grade: GradeLevel,
        draft: ChallengeDraft,
    ) -> Result<Challenge, DraftError> {
        let ch = draft.publish(domain, grade)?;
        let mut library = self.library.write().await;
        let mut by_cell = self.by_cell.write().await;
        if let Some(old) = library.insert(ch.id.clone(), ch.clone()) {
            if let Some(ids) = by_cell.get_mut(&old.key()) {
                ids.retain(|id| id != &ch.id);
            }
            warn!(target: "challenge", id = %ch.id, "Replacing library challenge");
        }
        by_cell.entry(ch.key()).or_default().push(ch.id.clone());
        Ok(ch)
    }

    pub async fn library_list(&self, grade: Option<GradeLevel>) -> Vec<Challenge> {
        let library = self.library.read().await;
        let mut all: Vec<_> = library
            .values()
            .filter(|ch| grade.map_or(true, |g| ch.grade == g))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn record_nomination(&self, nomination: Nomination) {
        self.nominations.write().await.push(nomination);
    }
}

/// What a successful login hands back.
pub struct LoginSession {
    pub user: User,
    pub progress: Option<StudentProgress>,
    pub session_start: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HubConfig, LibraryEntry, RosterEntry};

    fn draft(title: &str) -> ChallengeDraft {
        ChallengeDraft {
            title: title.into(),
            description: "Do the thing.".into(),
            ..ChallengeDraft::default()
        }
    }

    #[tokio::test]
    async fn seeds_populate_the_library() {
        let state = AppState::with_config(HubConfig::default()).await;
        let all = state.library_list(None).await;
        assert!(!all.is_empty());
        let g6 = state.library_list(Some(GradeLevel::G6)).await;
        assert!(g6.iter().all(|ch| ch.grade == GradeLevel::G6));
    }

    #[tokio::test]
    async fn invalid_config_library_entries_are_skipped() {
        let cfg = HubConfig {
            library: vec![LibraryEntry {
                domain: SkillDomain::Textiles,
                grade: GradeLevel::G7,
                draft: ChallengeDraft::default(),
            }],
            ..HubConfig::default()
        };
        let state = AppState::with_config(cfg).await;
        assert!(state
            .library_list(Some(GradeLevel::G7))
            .await
            .iter()
            .all(|ch| ch.domain != SkillDomain::Textiles));
    }

    #[tokio::test]
    async fn library_challenge_wins_over_generation() {
        let state = AppState::with_config(HubConfig::default()).await;
        let (served, origin) = state
            .challenge_for_cell(
                SkillDomain::Woodwork,
                GradeLevel::G6,
                DifficultyLevel::Medium,
                "alice@fis.ed.jp",
            )
            .await;
        assert_eq!(origin, "library");
        assert_eq!(served.title, "Basic Box Joint");
    }

    #[tokio::test]
    async fn empty_cell_falls_back_to_generation() {
        let state = AppState::with_config(HubConfig::default()).await;
        let (served, origin) = state
            .challenge_for_cell(
                SkillDomain::Entrepreneurship,
                GradeLevel::G10,
                DifficultyLevel::Hard,
                "alice@fis.ed.jp",
            )
            .await;
        assert_eq!(origin, "generated");
        assert!(!served.title.is_empty());
    }

    #[tokio::test]
    async fn assigned_library_challenge_is_hidden_from_others() {
        let state = AppState::with_config(HubConfig::default()).await;
        let mut d = draft("Private Drill");
        d.id = Some("private-1".into());
        d.assigned_student_ids = vec!["alice@fis.ed.jp".into()];
        state
            .upsert_library(SkillDomain::Robotics, GradeLevel::G9, d)
            .await
            .expect("upsert");

        let (_, origin) = state
            .challenge_for_cell(SkillDomain::Robotics, GradeLevel::G9, DifficultyLevel::Medium, "bob@fis.ed.jp")
            .await;
        assert_eq!(origin, "generated");
        let (served, origin) = state
            .challenge_for_cell(SkillDomain::Robotics, GradeLevel::G9, DifficultyLevel::Medium, "alice@fis.ed.jp")
            .await;
        assert_eq!(origin, "library");
        assert_eq!(served.title, "Private Drill");
    }

    #[tokio::test]
    async fn login_seeds_progress_and_session() {
        let state = AppState::with_config(HubConfig::default()).await;
        let session = state
            .login("Alice@FIS.ed.jp", UserRole::Student)
            .await
            .expect("login");
        assert_eq!(session.user.email, "alice@fis.ed.jp");
        assert!(session.progress.is_some());
        assert!(session.session_start.is_some());

        // Teacher from the allow-list carries no progress record.
        let teacher = state
            .login("teacher@fis.ed.jp", UserRole::Teacher)
            .await
            .expect("teacher login");
        assert!(teacher.progress.is_none());

        state.logout("alice@fis.ed.jp").await;
        assert!(state.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn roster_seed_keeps_inconsistent_level() {
        let cfg = HubConfig {
            roster: vec![RosterEntry {
                name: "Alice".into(),
                email: "alice@fis.ed.jp".into(),
                role: UserRole::Student,
                xp: 1250,
                level: Some(4),
            }],
            ..HubConfig::default()
        };
        let state = AppState::with_config(cfg).await;
        let progress = state.ledger.snapshot("alice@fis.ed.jp").await.unwrap();
        assert_eq!(progress.xp, 1250);
        assert_eq!(progress.level, 4);
    }

    #[tokio::test]
    async fn opening_an_available_cell_starts_it() {
        let state = AppState::with_config(HubConfig::default()).await;
        state
            .login("alice@fis.ed.jp", UserRole::Student)
            .await
            .expect("login");
        let key = ChallengeKey::new(SkillDomain::Woodwork, GradeLevel::G6);
        assert_eq!(
            state.mark_opened("alice@fis.ed.jp", key).await,
            ChallengeStatus::InProgress
        );
        // Already started: stays put.
        state
            .ledger
            .set_status("alice@fis.ed.jp", key, ChallengeStatus::Submitted)
            .await;
        assert_eq!(
            state.mark_opened("alice@fis.ed.jp", key).await,
            ChallengeStatus::Submitted
        );
    }
}
