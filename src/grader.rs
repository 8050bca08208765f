//! The grading pipeline: extract → per-file checker dispatch → prompt
//! assembly → model invocation, in blocking and streaming variants.
//!
//! Everything here is strictly sequential for one submission. External
//! failures surface as the displayable "Error in grading (...)" sentinel —
//! a grading failure is reported as a graded result, never as a fault the
//! caller has to catch.

use std::collections::HashMap;

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::checkers::CheckerContext;
use crate::config::Prompts;
use crate::domain::ExtractedFile;
use crate::extract::extract_submission;
use crate::openai::{ChatMessage, ChatStream};
use crate::state::AppState;
use crate::util::fill_template;

/// Diagnostic text per file name. Keys always match the extracted file set.
pub type CheckReports = HashMap<String, String>;

/// Extract the archive and run every file through its checker, one at a
/// time. The extraction dir lives exactly as long as this call.
#[instrument(level = "info", skip(ctx, bytes), fields(archive_len = bytes.len()))]
pub async fn syntax_check(
  ctx: &CheckerContext<'_>,
  bytes: &[u8],
) -> Result<(Vec<ExtractedFile>, CheckReports), String> {
  let (dir, files) = extract_submission(bytes)?;

  let mut reports = CheckReports::new();
  for file in &files {
    let report = ctx.check_file(dir.path(), file).await;
    reports.insert(file.name.clone(), report);
  }

  info!(target: "grading", n_files = files.len(), "Syntax check complete");
  Ok((files, reports))
}

/// Build the request message sequence. Pure function of its inputs: the
/// same files, reports, and rubric always produce the same sequence.
pub fn assemble_messages(
  prompts: &Prompts,
  files: &[ExtractedFile],
  reports: &CheckReports,
  rubric_text: &str,
) -> Vec<ChatMessage> {
  let mut messages = vec![ChatMessage::system(prompts.grading_system.clone())];
  messages.push(ChatMessage::user(prompts.files_preamble.clone()));

  for file in files {
    messages.push(ChatMessage::user(fill_template(
      &prompts.file_header_template,
      &[("filename", &file.name)],
    )));
    messages.push(ChatMessage::user(file.content.clone()));
    if let Some(report) = reports.get(&file.name) {
      if !report.is_empty() {
        messages.push(ChatMessage::system(format!(
          "{}{}",
          prompts.syntax_report_prefix, report
        )));
      }
    }
  }

  messages.push(ChatMessage::user(format!("{}{}", prompts.rubric_prefix, rubric_text)));
  messages
}

/// Blocking grading: always returns displayable text, either the model's
/// report or the "Error in grading (...)" sentinel.
#[instrument(level = "info", skip(state, bytes, rubric_text), fields(%submission_name, archive_len = bytes.len()))]
pub async fn grade_submission(
  state: &AppState,
  submission_name: &str,
  bytes: &[u8],
  rubric_text: &str,
) -> String {
  let submission_id = Uuid::new_v4();
  match grade_inner(state, bytes, rubric_text).await {
    Ok(report) => {
      info!(target: "grading", %submission_id, report_len = report.len(), "Grading finished");
      report
    }
    Err(e) => {
      error!(target: "grading", %submission_id, error = %e, "Grading failed");
      format!("Error in grading ({})", e)
    }
  }
}

/// Streaming grading: on success a fragment sequence the caller relays; if
/// anything fails before the first fragment, the same sentinel string takes
/// the stream's place.
#[instrument(level = "info", skip(state, bytes, rubric_text), fields(%submission_name, archive_len = bytes.len()))]
pub async fn grade_submission_stream(
  state: &AppState,
  submission_name: &str,
  bytes: &[u8],
  rubric_text: &str,
) -> Result<ChatStream, String> {
  let ctx = state.checker_context();
  let result = async {
    let (files, reports) = syntax_check(&ctx, bytes).await?;
    let messages = assemble_messages(&state.prompts, &files, &reports, rubric_text);
    let oa = state
      .openai
      .as_ref()
      .ok_or_else(|| "completion service not configured".to_string())?;
    oa.chat_stream(messages).await
  }
  .await;

  result.map_err(|e| {
    error!(target: "grading", %submission_name, error = %e, "Streaming grading failed before first fragment");
    format!("Error in grading ({})", e)
  })
}

async fn grade_inner(state: &AppState, bytes: &[u8], rubric_text: &str) -> Result<String, String> {
  let ctx = state.checker_context();
  let (files, reports) = syntax_check(&ctx, bytes).await?;
  let messages = assemble_messages(&state.prompts, &files, &reports, rubric_text);
  let oa = state
    .openai
    .as_ref()
    .ok_or_else(|| "completion service not configured".to_string())?;
  oa.chat(messages).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{CheckerConfig, JsStrategy};
  use crate::domain::FileKind;
  use std::io::Write;
  use zip::write::SimpleFileOptions;

  fn sample_files() -> Vec<ExtractedFile> {
    vec![
      ExtractedFile {
        name: "app.js".into(),
        kind: FileKind::Js,
        content: "var x = 1;".into(),
      },
      ExtractedFile {
        name: "index.html".into(),
        kind: FileKind::Html,
        content: "<html></html>".into(),
      },
    ]
  }

  #[test]
  fn assembly_structure_matches_file_order() {
    let prompts = Prompts::default();
    let files = sample_files();
    let mut reports = CheckReports::new();
    reports.insert("app.js".into(), "1:5 unexpected token".into());
    reports.insert("index.html".into(), String::new());

    let messages = assemble_messages(&prompts, &files, &reports, "Grade strictly.");
    let shape: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
    // system policy, user preamble, (user header, user content, system report)
    // for app.js, (user header, user content) for the clean file, user rubric.
    assert_eq!(shape, vec!["system", "user", "user", "user", "system", "user", "user", "user"]);

    assert_eq!(messages[2].content, "File: app.js");
    assert_eq!(messages[3].content, "var x = 1;");
    assert_eq!(
      messages[4].content,
      "This is a syntax analysis of the file1:5 unexpected token"
    );
    assert_eq!(messages[5].content, "File: index.html");
    assert_eq!(messages.last().unwrap().content, "This is the rubric :Grade strictly.");
  }

  #[test]
  fn assembly_is_deterministic() {
    let prompts = Prompts::default();
    let files = sample_files();
    let mut reports = CheckReports::new();
    reports.insert("app.js".into(), "finding".into());
    reports.insert("index.html".into(), String::new());

    let a = assemble_messages(&prompts, &files, &reports, "rubric");
    let b = assemble_messages(&prompts, &files, &reports, "rubric");
    let flat = |ms: &[ChatMessage]| -> Vec<(String, String)> {
      ms.iter().map(|m| (m.role.clone(), m.content.clone())).collect()
    };
    assert_eq!(flat(&a), flat(&b));
  }

  #[test]
  fn clean_reports_add_no_system_message() {
    let prompts = Prompts::default();
    let files = sample_files();
    let mut reports = CheckReports::new();
    reports.insert("app.js".into(), String::new());
    reports.insert("index.html".into(), String::new());

    let messages = assemble_messages(&prompts, &files, &reports, "rubric");
    let system_count = messages.iter().filter(|m| m.role == "system").count();
    assert_eq!(system_count, 1); // only the grading policy
  }

  #[tokio::test]
  async fn report_keys_always_match_extracted_files() {
    let bytes = {
      let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
      let opts = SimpleFileOptions::default();
      for (name, data) in [
        ("main.js", "var ok = true;"),
        ("styles.css", "body { color: red; }"),
        ("notes.txt", "ignored"),
        (".hidden.js", "ignored too"),
      ] {
        w.start_file(name.to_string(), opts).expect("start_file");
        w.write_all(data.as_bytes()).expect("write");
      }
      w.finish().expect("finish").into_inner()
    };

    // eslint points at a binary that cannot exist, so the JS report folds the
    // spawn failure into diagnostic text instead of failing the pipeline.
    let cfg = CheckerConfig {
      js_strategy: JsStrategy::Eslint,
      eslint_bin: "/nonexistent/eslint-binary".into(),
      ..CheckerConfig::default()
    };
    let prompts = Prompts::default();
    let http = reqwest::Client::new();
    let ctx = CheckerContext { cfg: &cfg, prompts: &prompts, openai: None, http: &http };

    let (files, reports) = syntax_check(&ctx, &bytes).await.expect("syntax_check");
    assert_eq!(files.len(), 2);
    assert_eq!(reports.len(), 2);
    for f in &files {
      assert!(reports.contains_key(&f.name), "missing report for {}", f.name);
    }
    assert!(reports["main.js"].contains("eslint invocation failed"));
    assert_eq!(reports["styles.css"], "CSS is valid");
  }

  #[tokio::test]
  async fn blocking_grade_never_propagates_failures() {
    let state = AppState {
      rubrics: HashMap::new(),
      credentials: HashMap::new(),
      prompts: Prompts::default(),
      checkers: CheckerConfig::default(),
      openai: None,
      http: reqwest::Client::new(),
    };

    // Malformed archive: fatal to the submission, still displayable text.
    let report = grade_submission(&state, "bad.zip", b"not a zip", "rubric").await;
    assert!(report.contains("Error in grading"), "{}", report);

    // Valid archive but no completion service configured.
    let bytes = {
      let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
      let opts = SimpleFileOptions::default();
      w.start_file("styles.css", opts).expect("start_file");
      w.write_all(b"body { color: red; }").expect("write");
      w.finish().expect("finish").into_inner()
    };
    let report = grade_submission(&state, "ok.zip", &bytes, "rubric").await;
    assert!(report.contains("Error in grading"), "{}", report);
  }

  #[tokio::test]
  async fn malformed_archive_surfaces_as_error() {
    let cfg = CheckerConfig::default();
    let prompts = Prompts::default();
    let http = reqwest::Client::new();
    let ctx = CheckerContext { cfg: &cfg, prompts: &prompts, openai: None, http: &http };

    let err = syntax_check(&ctx, b"not a zip").await.unwrap_err();
    assert!(err.contains("invalid zip archive"));
  }
}
