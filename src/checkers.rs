//! Per-file checkers: JS lint (external binary or model-based), CSS grammar
//! validation (in-process), and HTML validation (remote service).
//!
//! Checker failures never abort a submission; they fold into that file's
//! diagnostic text and grading continues with the rest of the files.

use std::path::Path;

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::config::{CheckerConfig, JsStrategy, Prompts};
use crate::domain::{ExtractedFile, FileKind};
use crate::openai::OpenAI;
use crate::util::trunc_for_log;

/// Everything the checkers need, borrowed from `AppState` for one submission.
pub struct CheckerContext<'a> {
  pub cfg: &'a CheckerConfig,
  pub prompts: &'a Prompts,
  pub openai: Option<&'a OpenAI>,
  pub http: &'a reqwest::Client,
}

impl<'a> CheckerContext<'a> {
  /// Route one extracted file to the checker its extension selects and
  /// return the diagnostic text (possibly empty).
  #[instrument(level = "debug", skip(self, root, file), fields(file = %file.name))]
  pub async fn check_file(&self, root: &Path, file: &ExtractedFile) -> String {
    let report = match file.kind {
      FileKind::Js => self.check_js(&root.join(&file.name), &file.content).await,
      FileKind::Css => check_css(&file.content),
      FileKind::Html => self.check_html(&root.join(&file.name)).await,
    };
    if !report.is_empty() {
      warn!(target: "grading", file = %file.name, report = %trunc_for_log(&report, 200), "Checker reported findings");
    }
    report
  }

  async fn check_js(&self, path: &Path, content: &str) -> String {
    match self.cfg.js_strategy {
      JsStrategy::Eslint => run_eslint(&self.cfg.eslint_bin, path).await,
      JsStrategy::Model => match self.openai {
        Some(oa) => oa
          .js_syntax_check(&self.prompts.js_syntax_system, content)
          .await
          .unwrap_or_else(|e| format!("JS syntax check failed: {}", e)),
        None => "JS syntax check unavailable (completion service not configured)".into(),
      },
    }
  }

  async fn check_html(&self, path: &Path) -> String {
    let raw = match std::fs::read(path) {
      Ok(b) => b,
      Err(e) => return format!("Error in validation: {}", e),
    };

    let res = match self
      .http
      .post(&self.cfg.html_validator_url)
      .header(CONTENT_TYPE, "text/html; charset=utf-8")
      .body(raw)
      .send()
      .await
    {
      Ok(r) => r,
      Err(e) => return format!("Error in validation: {}", e),
    };

    if !res.status().is_success() {
      return format!("Error in validation: {}", res.status().as_u16());
    }

    match res.json::<HtmlValidationDoc>().await {
      Ok(doc) => summarize_html_messages(&doc),
      Err(e) => format!("Error in validation: {}", e),
    }
  }
}

/// Spawn the external linter against the file path and relay its output
/// verbatim: stdout if non-empty, else stderr. Empty means a clean pass.
async fn run_eslint(bin: &str, path: &Path) -> String {
  match Command::new(bin).arg(path).output().await {
    Ok(out) => merge_linter_output(
      String::from_utf8_lossy(&out.stdout).into_owned(),
      String::from_utf8_lossy(&out.stderr).into_owned(),
    ),
    Err(e) => format!("eslint invocation failed: {}", e),
  }
}

fn merge_linter_output(stdout: String, stderr: String) -> String {
  if !stdout.is_empty() { stdout } else { stderr }
}

/// In-process CSS grammar check. Exactly "CSS is valid" on success; a
/// one-line "CSS validation error: <cause>" otherwise.
pub fn check_css(content: &str) -> String {
  use lightningcss::stylesheet::{ParserOptions, StyleSheet};
  match StyleSheet::parse(content, ParserOptions::default()) {
    Ok(_) => "CSS is valid".into(),
    Err(e) => format!("CSS validation error: {}", e),
  }
}

// --- HTML validator response DTOs ---

#[derive(Debug, Deserialize)]
pub struct HtmlValidationDoc {
  #[serde(default)]
  pub messages: Vec<HtmlValidationMessage>,
}

#[derive(Debug, Deserialize)]
pub struct HtmlValidationMessage {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub message: String,
  #[serde(default, rename = "lastLine")]
  pub last_line: Option<u64>,
}

/// Keep only error-type messages that carry a usable line number.
pub fn summarize_html_messages(doc: &HtmlValidationDoc) -> String {
  let mut out = String::new();
  for m in &doc.messages {
    if m.kind == "error" {
      if let Some(line) = m.last_line {
        out.push_str(&format!("Error: {} at line {}\n", m.message, line));
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn valid_css_reports_exactly_the_ok_string() {
    assert_eq!(check_css("body { color: red; }"), "CSS is valid");
  }

  #[test]
  fn broken_css_reports_a_validation_error() {
    let report = check_css("body { color: red; } }");
    assert!(report.starts_with("CSS validation error:"), "{}", report);
  }

  #[test]
  fn linter_output_prefers_stdout() {
    assert_eq!(
      merge_linter_output("3 problems".into(), "noise".into()),
      "3 problems"
    );
    assert_eq!(merge_linter_output(String::new(), "spawn warning".into()), "spawn warning");
    assert_eq!(merge_linter_output(String::new(), String::new()), "");
  }

  #[test]
  fn html_summary_keeps_only_errors_with_line_numbers() {
    let doc: HtmlValidationDoc = serde_json::from_str(
      r#"{"messages":[
        {"type":"error","message":"Stray end tag div","lastLine":12},
        {"type":"info","subType":"warning","message":"Consider lang attribute","lastLine":1},
        {"type":"error","message":"No line info here"}
      ]}"#,
    )
    .expect("parse");
    let report = summarize_html_messages(&doc);
    assert_eq!(report, "Error: Stray end tag div at line 12\n");
  }

  #[test]
  fn empty_message_list_yields_empty_report() {
    let doc: HtmlValidationDoc = serde_json::from_str(r#"{"messages":[]}"#).expect("parse");
    assert_eq!(summarize_html_messages(&doc), "");
  }
}
