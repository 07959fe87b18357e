//! Minimal OpenAI-compatible client backing the AI collaborators.
//!
//! We only call chat.completions and always request a strict JSON object.
//! Calls are instrumented and log model names, latencies, and token usage
//! (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{
  ChallengeDraft, CollaborativeProject, DifficultyLevel, GradeLevel, RubricItem, SkillDomain,
};
use crate::error::ServiceError;
use crate::gateway::{
  ContentGenerator, FeedbackAnalyzer, SubmissionAnalysis, ToneValidator, ToneVerdict,
};
use crate::seeds;
use crate::util::fill_template;

const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Clone)]
pub struct OpenAi {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  prompts: Prompts,
}

impl OpenAi {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, prompts })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// One strict-JSON chat completion, parsed into `T`. Every collaborator
  /// call goes through here.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, ServiceError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "designhub-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          ServiceError::Timeout(REQUEST_TIMEOUT_SECS)
        } else {
          ServiceError::Network(e.to_string())
        }
      })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or(body);
      return Err(ServiceError::Api { status, message });
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| ServiceError::Malformed(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();
    serde_json::from_str::<T>(&text).map_err(|e| ServiceError::Malformed(e.to_string()))
  }
}

// Wire shape of a generated challenge. Mirrors `ChallengeDraft` but kept
// separate so prompt-schema drift stays isolated here.
#[derive(Deserialize)]
struct ChallengeGen {
  title: String,
  description: String,
  #[serde(default)]
  scenario: String,
  #[serde(default)]
  tools: Vec<String>,
  #[serde(default, rename = "tutorialLinks")]
  tutorial_links: Vec<String>,
  #[serde(default)]
  rubric: Vec<RubricItem>,
}

impl ChallengeGen {
  fn into_draft(self) -> ChallengeDraft {
    ChallengeDraft {
      title: self.title,
      description: self.description,
      scenario: self.scenario,
      tools: self.tools,
      tutorial_links: self.tutorial_links,
      rubric: self.rubric,
      ..ChallengeDraft::default()
    }
  }
}

#[derive(Deserialize)]
struct TeamGen {
  title: String,
  #[serde(default)]
  scenario: String,
  #[serde(default)]
  objectives: Vec<String>,
  #[serde(default)]
  deliverables: Vec<String>,
  #[serde(default, rename = "teamRubric")]
  team_rubric: Vec<RubricItem>,
  #[serde(default, rename = "tutorialLinks")]
  tutorial_links: Vec<String>,
}

#[async_trait]
impl ContentGenerator for OpenAi {
  /// Generation never fails outward: any error falls back to a placeholder
  /// draft the student can still work against.
  #[instrument(level = "info", skip(self), fields(model = %self.strong_model))]
  async fn generate_challenge(
    &self,
    domain: SkillDomain,
    grade: GradeLevel,
    difficulty: DifficultyLevel,
  ) -> ChallengeDraft {
    let user = fill_template(
      &self.prompts.challenge_user_template,
      &[
        ("domain", domain.name()),
        ("grade", grade.name()),
        ("difficulty", &format!("{difficulty:?}")),
        ("standards", seeds::standards_for(grade)),
        ("pathway", seeds::pathway_for(grade)),
      ],
    );
    let start = std::time::Instant::now();
    let result = self
      .chat_json::<ChallengeGen>(&self.strong_model, &self.prompts.challenge_system, &user, 0.9)
      .await;
    let elapsed = start.elapsed();

    match result {
      Ok(gen) => {
        let draft = gen.into_draft();
        info!(
          target: "challenge",
          ?elapsed,
          title = %draft.title,
          rubric_items = draft.rubric.len(),
          "Challenge generated"
        );
        draft
      }
      Err(e) => {
        error!(target: "challenge", ?elapsed, error = %e, "Challenge generation failed; using fallback draft");
        seeds::fallback_challenge_draft(domain, grade)
      }
    }
  }

  #[instrument(level = "info", skip(self), fields(model = %self.strong_model))]
  async fn generate_practice(&self, domain: SkillDomain, grade: GradeLevel) -> ChallengeDraft {
    let user = fill_template(
      &self.prompts.practice_user_template,
      &[("domain", domain.name()), ("grade", grade.name())],
    );
    match self
      .chat_json::<ChallengeGen>(&self.strong_model, &self.prompts.practice_system, &user, 0.9)
      .await
    {
      Ok(gen) => {
        let mut draft = gen.into_draft();
        draft.xp_reward = Some(crate::progress::PRACTICE_XP);
        draft
      }
      Err(e) => {
        error!(target: "challenge", error = %e, "Practice generation failed; using fallback drill");
        seeds::fallback_practice_draft(domain)
      }
    }
  }

  #[instrument(level = "info", skip(self), fields(model = %self.strong_model))]
  async fn generate_team_project(&self, theme: &str) -> CollaborativeProject {
    let user = fill_template(
      &self.prompts.team_user_template,
      &[("theme", theme), ("standards", seeds::standards_for(GradeLevel::G9))],
    );
    match self
      .chat_json::<TeamGen>(&self.strong_model, &self.prompts.team_system, &user, 0.9)
      .await
    {
      Ok(gen) => CollaborativeProject {
        title: gen.title,
        theme: theme.to_string(),
        scenario: gen.scenario,
        objectives: gen.objectives,
        deliverables: gen.deliverables,
        team_rubric: gen.team_rubric,
        tutorial_links: gen.tutorial_links,
      },
      Err(e) => {
        error!(target: "challenge", error = %e, "Team project generation failed; using fallback");
        seeds::fallback_team_project(theme)
      }
    }
  }
}

#[async_trait]
impl FeedbackAnalyzer for OpenAi {
  /// Analysis failures propagate: the submit flow is all-or-nothing and the
  /// student simply retries.
  #[instrument(level = "info", skip(self, submission_text, rubric_summary), fields(model = %self.strong_model, text_len = submission_text.len()))]
  async fn analyze(
    &self,
    challenge_title: &str,
    submission_text: &str,
    rubric_summary: &str,
  ) -> Result<SubmissionAnalysis, ServiceError> {
    let user = fill_template(
      &self.prompts.analysis_user_template,
      &[
        ("title", challenge_title),
        ("submission", submission_text),
        ("rubric", rubric_summary),
      ],
    );
    self
      .chat_json::<SubmissionAnalysis>(&self.strong_model, &self.prompts.analysis_system, &user, 0.2)
      .await
  }
}

#[async_trait]
impl ToneValidator for OpenAi {
  /// Fails open: moderation being down never blocks a review.
  #[instrument(level = "info", skip(self, feedback), fields(model = %self.fast_model, text_len = feedback.len()))]
  async fn validate(&self, feedback: &str) -> ToneVerdict {
    let user = fill_template(&self.prompts.tone_user_template, &[("feedback", feedback)]);
    match self
      .chat_json::<ToneVerdict>(&self.fast_model, &self.prompts.tone_system, &user, 0.2)
      .await
    {
      Ok(verdict) => verdict,
      Err(e) => {
        error!(target: "review", error = %e, "Tone check failed; failing open");
        ToneVerdict::constructive()
      }
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
