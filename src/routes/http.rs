//! HTTP endpoint handlers. These are thin wrappers that forward to core
//! logic. Each handler is instrumented and logs parameters and basic result
//! info.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::ChallengeKey;
use crate::metrics::is_online;
use crate::progress::PRACTICE_XP;
use crate::protocol::*;
use crate::review::{self, ReviewOutcome};
use crate::routes::ApiError;
use crate::state::AppState;
use crate::submission;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(email = %body.email, role = ?body.role))]
pub async fn http_post_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LoginIn>,
) -> Result<Json<LoginOut>, ApiError> {
  let session = state.login(&body.email, body.role).await?;
  Ok(Json(LoginOut {
    user: session.user,
    progress: session.progress.map(ProgressOut::from_progress),
    session_start: session.session_start,
  }))
}

#[instrument(level = "info", skip(state, body), fields(email = %body.email))]
pub async fn http_post_logout(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LogoutIn>,
) -> impl IntoResponse {
  state.logout(&body.email).await;
  Json(OkOut { ok: true })
}

#[instrument(level = "info", skip(state), fields(domain = %q.domain, grade = %q.grade))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ChallengeQuery>,
) -> impl IntoResponse {
  let student = q.student.unwrap_or_default();
  let (draft, origin) = state
    .challenge_for_cell(q.domain, q.grade, q.difficulty, &student)
    .await;

  // Opening an open cell starts it.
  let status = if student.is_empty() {
    None
  } else {
    Some(
      state
        .mark_opened(&student, ChallengeKey::new(q.domain, q.grade))
        .await,
    )
  };
  info!(target: "challenge", domain = %q.domain, grade = %q.grade, %origin, "HTTP challenge served");
  Json(ChallengeOut { domain: q.domain, grade: q.grade, draft, origin, status })
}

#[instrument(level = "info", skip(state), fields(domain = %q.domain, grade = %q.grade))]
pub async fn http_get_practice(
  State(state): State<Arc<AppState>>,
  Query(q): Query<PracticeQuery>,
) -> impl IntoResponse {
  let draft = state.generator.generate_practice(q.domain, q.grade).await;
  Json(ChallengeOut {
    domain: q.domain,
    grade: q.grade,
    draft,
    origin: "practice",
    status: None,
  })
}

#[instrument(level = "info", skip(state, body), fields(student = %body.student_id))]
pub async fn http_post_practice_complete(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PracticeCompleteIn>,
) -> impl IntoResponse {
  let amount = body.xp_reward.unwrap_or(PRACTICE_XP);
  let award = state.ledger.award_xp(&body.student_id, amount).await;
  info!(target: "progress", student = %body.student_id, amount, "Practice drill completed");
  Json(XpOut { xp: award.xp, level: award.level, level_up: award.leveled_up_to })
}

#[instrument(level = "info", skip(state, body), fields(theme = %body.theme))]
pub async fn http_post_team(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TeamIn>,
) -> impl IntoResponse {
  let project = state.generator.generate_team_project(&body.theme).await;
  Json(project)
}

#[instrument(level = "info", skip(state, body), fields(domain = %body.domain, grade = %body.grade, student = %body.request.student_id))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<SubmitOut>, ApiError> {
  // Strict commit: the served draft must validate before submission.
  let challenge = body.challenge.publish(body.domain, body.grade)?;
  let outcome = submission::submit(
    &challenge,
    body.request,
    &state.ledger,
    state.analyzer.as_ref(),
    state.archive.as_ref(),
    &state.submissions,
  )
  .await?;

  let (xp_awarded, level_up) = xp_fields(&outcome.change);
  Ok(Json(SubmitOut {
    submission: outcome.submission,
    status: outcome.change.current,
    xp_awarded,
    level_up,
    archive_warning: outcome.archive_warning,
  }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_submissions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.submissions.all().await)
}

#[instrument(level = "info", skip(state, body), fields(submission = %body.submission_id, reviewer = %body.reviewer_id))]
pub async fn http_post_review(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ReviewIn>,
) -> Result<Json<ReviewOut>, ApiError> {
  let outcome = review::submit_review(
    &state.submissions,
    state.tone.as_ref(),
    &body.submission_id,
    &body.reviewer_id,
    body.form,
  )
  .await?;

  let stage = outcome.stage();
  let out = match outcome {
    ReviewOutcome::Accepted { review, nomination } => {
      let nominated = nomination.is_some();
      if let Some(n) = nomination {
        state.record_nomination(n).await;
      }
      ReviewOut { stage, suggestion: None, review: Some(review), nominated }
    }
    ReviewOutcome::RejectedRetry { suggestion } => ReviewOut {
      stage,
      suggestion: Some(suggestion),
      review: None,
      nominated: false,
    },
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_nominations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.nominations.read().await.clone())
}

#[instrument(level = "info", skip(state), fields(student = %q.student))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProgressQuery>,
) -> impl IntoResponse {
  let progress = state.ledger.ensure_student(&q.student).await;
  Json(ProgressOut::from_progress(progress))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let now = Utc::now();
  let rows: Vec<MetricRow> = state
    .recorder
    .all()
    .into_iter()
    .map(|metric| {
      let online = is_online(&metric, now);
      MetricRow { metric, online }
    })
    .collect();
  Json(rows)
}

#[instrument(level = "info", skip(state, body), fields(student = %body.student_name))]
pub async fn http_post_export(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExportIn>,
) -> Result<impl IntoResponse, ApiError> {
  let challenge = body.challenge.publish(body.domain, body.grade)?;
  let export = state
    .archive
    .export_document(&challenge, &body.student_name)
    .await;
  Ok(Json(export))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_library(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LibraryQuery>,
) -> impl IntoResponse {
  Json(state.library_list(q.grade).await)
}

#[instrument(level = "info", skip(state, body), fields(domain = %body.domain, grade = %body.grade))]
pub async fn http_post_library(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LibraryUpsertIn>,
) -> Result<impl IntoResponse, ApiError> {
  let ch = state
    .upsert_library(body.domain, body.grade, body.challenge)
    .await?;
  Ok(Json(ch))
}

#[instrument(level = "info", skip(state, body), fields(student = %body.student_id))]
pub async fn http_post_complete(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CompleteIn>,
) -> impl IntoResponse {
  state
    .ledger
    .complete_challenge(
      &body.student_id,
      ChallengeKey::new(body.domain, body.grade),
      &body.challenge_id,
    )
    .await;
  Json(OkOut { ok: true })
}
