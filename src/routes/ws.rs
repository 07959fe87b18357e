//! WebSocket upgrade + message loop. Each client message is parsed as JSON
//! and forwarded to core logic. We reply with a single JSON message per
//! request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::ChallengeKey;
use crate::protocol::*;
use crate::review::{self, ReviewOutcome};
use crate::state::AppState;
use crate::submission;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "designhub_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "designhub_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "designhub_backend", msg = %crate::util::trunc_for_log(&txt, 200), "WS received");
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "designhub_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "designhub_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state, msg))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::NewChallenge { domain, grade, difficulty, student_id } => {
      let (draft, origin) = state
        .challenge_for_cell(domain, grade, difficulty, &student_id)
        .await;
      let status = if student_id.is_empty() {
        None
      } else {
        Some(state.mark_opened(&student_id, ChallengeKey::new(domain, grade)).await)
      };
      tracing::info!(target: "challenge", %domain, %grade, %origin, "WS new_challenge served");
      ServerWsMessage::Challenge {
        challenge: ChallengeOut { domain, grade, draft, origin, status },
      }
    }

    ClientWsMessage::SubmitWork(body) => {
      let challenge = match body.challenge.publish(body.domain, body.grade) {
        Ok(ch) => ch,
        Err(e) => return ServerWsMessage::Error { message: e.to_string() },
      };
      match submission::submit(
        &challenge,
        body.request,
        &state.ledger,
        state.analyzer.as_ref(),
        state.archive.as_ref(),
        &state.submissions,
      )
      .await
      {
        Ok(outcome) => {
          let (xp_awarded, level_up) = xp_fields(&outcome.change);
          ServerWsMessage::SubmitResult {
            submission: outcome.submission,
            xp_awarded,
            level_up,
            archive_warning: outcome.archive_warning,
          }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::SubmitReview(body) => {
      match review::submit_review(
        &state.submissions,
        state.tone.as_ref(),
        &body.submission_id,
        &body.reviewer_id,
        body.form,
      )
      .await
      {
        Ok(outcome) => {
          let stage = outcome.stage();
          match outcome {
            ReviewOutcome::Accepted { review, nomination } => {
              if let Some(n) = nomination {
                state.record_nomination(n).await;
              }
              ServerWsMessage::ReviewResult { stage, suggestion: None, review: Some(review) }
            }
            ReviewOutcome::RejectedRetry { suggestion } => ServerWsMessage::ReviewResult {
              stage,
              suggestion: Some(suggestion),
              review: None,
            },
          }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::Progress { student_id } => {
      let progress = state.ledger.ensure_student(&student_id).await;
      ServerWsMessage::Progress { progress: ProgressOut::from_progress(progress) }
    }
  }
}
