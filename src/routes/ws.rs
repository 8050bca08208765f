//! WebSocket upgrade + message loop. Each client message is parsed as JSON
//! and dispatched; grading relays the model's fragment stream back as one
//! `grade_delta` message per fragment.
//!
//! Authentication lives in a per-connection `SessionState`, not in shared
//! app state: the flag's lifetime is exactly one interactive session.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use base64::prelude::*;
use tracing::{error, info, instrument};

use crate::grader::grade_submission_stream;
use crate::protocol::{report_filename, ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

/// Per-connection flags. Dropped with the socket.
struct SessionState {
  authenticated: bool,
}

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "webgrader_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "webgrader_backend", "WebSocket connected");
  let mut session = SessionState { authenticated: false };

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let outcome = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => handle_client_ws(incoming, &state, &mut session, &mut socket).await,
          Err(e) => {
            send(&mut socket, ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) })
              .await
          }
        };
        if let Err(e) = outcome {
          error!(target: "webgrader_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "webgrader_backend", "WebSocket disconnected");
}

async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &mut SessionState,
  socket: &mut WebSocket,
) -> Result<(), axum::Error> {
  match msg {
    ClientWsMessage::Ping => send(socket, ServerWsMessage::Pong).await,

    ClientWsMessage::Login { username, password } => {
      session.authenticated = state.authenticate(&username, &password);
      send(socket, ServerWsMessage::LoginResult { authenticated: session.authenticated }).await
    }

    ClientWsMessage::FetchRubric { title, chapter, exercise } => {
      let rubric = state.lookup_rubric(&title, &chapter, &exercise);
      info!(target: "webgrader_backend", found = rubric.is_some(), "WS rubric lookup");
      send(
        socket,
        ServerWsMessage::Rubric { found: rubric.is_some(), prompt: rubric.map(|r| r.prompt) },
      )
      .await
    }

    ClientWsMessage::GradeSubmission { filename, zip_base64, title, chapter, exercise } => {
      if !session.authenticated {
        return send(
          socket,
          ServerWsMessage::Error { message: "Login required before grading".into() },
        )
        .await;
      }

      let Some(rubric) = state.lookup_rubric(&title, &chapter, &exercise) else {
        return send(
          socket,
          ServerWsMessage::Error {
            message: "Rubric not found for the selected exercise".into(),
          },
        )
        .await;
      };

      let archive = match BASE64_STANDARD.decode(&zip_base64) {
        Ok(b) => b,
        Err(e) => {
          return send(
            socket,
            ServerWsMessage::Error { message: format!("Invalid zipBase64 payload: {}", e) },
          )
          .await;
        }
      };

      info!(target: "grading", %filename, %title, %chapter, %exercise, "WS grading request");
      send(socket, ServerWsMessage::GradeStarted { filename: filename.clone() }).await?;

      match grade_submission_stream(state, &filename, &archive, &rubric.prompt).await {
        Ok(mut stream) => {
          let mut report = String::new();
          while let Some(fragment) = stream.next_fragment().await {
            match fragment {
              Ok(text) => {
                report.push_str(&text);
                send(socket, ServerWsMessage::GradeDelta { filename: filename.clone(), text })
                  .await?;
              }
              Err(e) => {
                error!(target: "grading", %filename, error = %e, "Grading stream broke mid-flight");
                return send(
                  socket,
                  ServerWsMessage::Error { message: format!("Error in grading ({})", e) },
                )
                .await;
              }
            }
          }
          info!(target: "grading", %filename, report_len = report.len(), "WS grading complete");
          send(
            socket,
            ServerWsMessage::GradeComplete {
              report_filename: report_filename(&filename),
              filename,
              report,
            },
          )
          .await
        }
        // Failed before the first fragment: the sentinel takes the stream's
        // place as a displayable error.
        Err(sentinel) => send(socket, ServerWsMessage::Error { message: sentinel }).await,
      }
    }
  }
}

async fn send(socket: &mut WebSocket, msg: ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(&msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}
