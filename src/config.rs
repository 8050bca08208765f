//! Loading grader configuration (prompts, rubric bank, credentials, checker
//! settings) from TOML.
//!
//! See `GraderConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{info, error};

use crate::domain::{Credential, Rubric};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GraderConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub checkers: CheckerConfig,
  #[serde(default)]
  pub rubrics: Vec<Rubric>,
  #[serde(default)]
  pub credentials: Vec<Credential>,
}

/// Which implementation handles `.js` files. Both satisfy the same contract:
/// file in, diagnostic text out (empty on a clean pass).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JsStrategy {
  /// Spawn the external linter binary and relay its output.
  Eslint,
  /// Ask the completion service to act as a syntax-only evaluator.
  Model,
}

impl Default for JsStrategy {
  fn default() -> Self { JsStrategy::Eslint }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckerConfig {
  #[serde(default)]
  pub js_strategy: JsStrategy,
  #[serde(default = "default_eslint_bin")]
  pub eslint_bin: String,
  #[serde(default = "default_html_validator_url")]
  pub html_validator_url: String,
}

fn default_eslint_bin() -> String { "eslint".into() }
fn default_html_validator_url() -> String { "https://validator.w3.org/nu/?out=json".into() }

impl Default for CheckerConfig {
  fn default() -> Self {
    Self {
      js_strategy: JsStrategy::default(),
      eslint_bin: default_eslint_bin(),
      html_validator_url: default_html_validator_url(),
    }
  }
}

/// Prompts used when talking to the completion service. Defaults reproduce
/// the grading policy the courses were run with; override in TOML to tune
/// tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  /// Leading system message: overall grading policy.
  pub grading_system: String,
  /// User message introducing the file list.
  pub files_preamble: String,
  /// Per-file header, `{filename}` substituted.
  pub file_header_template: String,
  /// System-message prefix attached to a non-empty checker report.
  pub syntax_report_prefix: String,
  /// Prefix for the final user message carrying the rubric text.
  pub rubric_prefix: String,
  /// System prompt for the model-based JS syntax strategy.
  pub js_syntax_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      grading_system: r#"
You are an auto grader for web programing courses. You will be given the student codes, compilation results and rubric as well as extra information if any.
Do not be strict on comment and syntax style. For example if the task is to add the student name and date as a comment, accept any commenting style
and any name and dates that are not placeholders. Example of placeholder that should not be accepted are 'first name last name', 'MM/DD/YYYY', 'your name', 'today's date'
Example of acceptable name and date 'John Sminth', 'Hsung Tsai', '2/2/2000'. Remember, you can not verify the actual date and name or uploading task, so accept anything that is not an obvious placeholder;
Acceot tasks that you do not have the tools to verify and note that you were not able to actually verify it.
Fill out the rubric and provide justification for your grading. Refer to the line number with error when possible. Always show the achieved score in bold number. Never add up the total grade or do any math.
Provide these extra information afterward when aplicable, like compile error, tips to manually grade this submission for instructor, feedback for student.

Example:
1. {First rubric item} [Possible Score:{First possible score}] .
- **Score: 1/1** {Justification and reasoning}

2. {Second rubric item} [Possible Score:{Second possible score}]
- **Score: 2/3** {Justification and reasoning}

3. {Third rubric item} [Possible Score:{Third possilbe score}]
- **Score: 3/3** {Justification and reasoning}

Addtional information: {Compile error}
 {Manual grading tips for instructor}
 {feedback for student}
"#.into(),
      files_preamble: "You are grading the following file(s):".into(),
      file_header_template: "File: {filename}".into(),
      syntax_report_prefix: "This is a syntax analysis of the file".into(),
      rubric_prefix: "This is the rubric :".into(),
      js_syntax_system: "You are a JavaScript syntax evaluator. Check the code the user sends for syntax errors ONLY. Output compiler-style error lines with line numbers, nothing else. If the code parses cleanly, output an empty string.".into(),
    }
  }
}

/// Attempt to load `GraderConfig` from GRADER_CONFIG_PATH. On any parsing/IO
/// error, returns None.
pub fn load_grader_config_from_env() -> Option<GraderConfig> {
  let path = std::env::var("GRADER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GraderConfig>(&s) {
      Ok(cfg) => {
        info!(target: "webgrader_backend", %path, "Loaded grader config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "webgrader_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "webgrader_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_yields_defaults() {
    let cfg: GraderConfig = toml::from_str("").expect("parse");
    assert_eq!(cfg.checkers.js_strategy, JsStrategy::Eslint);
    assert_eq!(cfg.checkers.eslint_bin, "eslint");
    assert!(cfg.rubrics.is_empty());
    assert!(cfg.credentials.is_empty());
    assert!(cfg.prompts.grading_system.contains("auto grader"));
  }

  #[test]
  fn bank_and_strategy_parse_from_toml() {
    let cfg: GraderConfig = toml::from_str(
      r#"
[checkers]
js_strategy = "model"

[[rubrics]]
title = "Sample Book 1e"
chapter = "3"
exercise = "ex02"
prompt = "1. Page has a title [Possible Score: 2]"

[[credentials]]
username = "instructor"
password_sha256 = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
"#,
    )
    .expect("parse");
    assert_eq!(cfg.checkers.js_strategy, JsStrategy::Model);
    assert_eq!(cfg.rubrics.len(), 1);
    assert_eq!(cfg.rubrics[0].chapter, "3");
    assert_eq!(cfg.credentials[0].username, "instructor");
  }
}
