//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! grading pipeline and state lookups. Each handler is instrumented and logs
//! parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Multipart, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::grader::grade_submission;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(username = %body.username))]
pub async fn http_post_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LoginIn>,
) -> impl IntoResponse {
  let authenticated = state.authenticate(&body.username, &body.password);
  Json(LoginOut { authenticated })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_books(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(BooksOut { books: state.books_catalog() })
}

#[instrument(level = "info", skip(state), fields(title = %q.title, chapter = %q.chapter, exercise = %q.exercise))]
pub async fn http_get_rubric(
  State(state): State<Arc<AppState>>,
  Query(q): Query<RubricQuery>,
) -> impl IntoResponse {
  let rubric = state.lookup_rubric(&q.title, &q.chapter, &q.exercise);
  info!(target: "webgrader_backend", found = rubric.is_some(), "HTTP rubric lookup");
  Json(RubricOut { found: rubric.is_some(), prompt: rubric.map(|r| r.prompt) })
}

/// Blocking grading endpoint. Multipart fields: `file` (the zip), `title`,
/// `chapter`, `exercise`. The response is always displayable: the report
/// field may itself carry the "Error in grading (...)" text.
#[instrument(level = "info", skip(state, multipart))]
pub async fn http_post_grade(
  State(state): State<Arc<AppState>>,
  mut multipart: Multipart,
) -> Response {
  let mut filename = String::new();
  let mut archive: Option<Vec<u8>> = None;
  let mut title = String::new();
  let mut chapter = String::new();
  let mut exercise = String::new();

  while let Ok(Some(field)) = multipart.next_field().await {
    let name = field.name().unwrap_or("").to_string();
    match name.as_str() {
      "file" => {
        filename = field.file_name().unwrap_or("submission.zip").to_string();
        match field.bytes().await {
          Ok(b) => archive = Some(b.to_vec()),
          Err(e) => {
            warn!(target: "webgrader_backend", error = %e, "Failed to read uploaded file field");
            return (
              StatusCode::BAD_REQUEST,
              Json(json!({ "message": format!("failed to read file field: {}", e) })),
            )
              .into_response();
          }
        }
      }
      "title" => title = field.text().await.unwrap_or_default(),
      "chapter" => chapter = field.text().await.unwrap_or_default(),
      "exercise" => exercise = field.text().await.unwrap_or_default(),
      _ => {}
    }
  }

  let Some(archive) = archive else {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "message": "missing file field" })),
    )
      .into_response();
  };

  let Some(rubric) = state.lookup_rubric(&title, &chapter, &exercise) else {
    return (
      StatusCode::NOT_FOUND,
      Json(json!({ "found": false, "message": "Rubric not found for the selected exercise" })),
    )
      .into_response();
  };

  info!(target: "grading", %filename, %title, %chapter, %exercise, "HTTP grading request");
  let report = grade_submission(&state, &filename, &archive, &rubric.prompt).await;
  Json(GradeOut {
    report_filename: report_filename(&filename),
    filename,
    report,
  })
  .into_response()
}
