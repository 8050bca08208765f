//! Domain models used by the backend: rubrics, credentials, and the
//! per-submission file/report shapes the grading pipeline passes around.

use serde::{Deserialize, Serialize};

/// Instructor-authored grading criteria, keyed by book/chapter/exercise.
/// `prompt` is opaque free text handed verbatim to the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rubric {
  pub title: String,
  pub chapter: String,
  pub exercise: String,
  pub prompt: String,
}

/// Exact-match lookup key for a rubric. All three fields are case-sensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RubricKey {
  pub title: String,
  pub chapter: String,
  pub exercise: String,
}

impl RubricKey {
  pub fn new(title: &str, chapter: &str, exercise: &str) -> Self {
    Self { title: title.into(), chapter: chapter.into(), exercise: exercise.into() }
  }
}

/// Stored login record. The password is kept only as a lowercase hex
/// sha-256 digest; authentication is an exact match on `(username, digest)`.
#[derive(Clone, Debug, Deserialize)]
pub struct Credential {
  pub username: String,
  pub password_sha256: String,
}

/// Which checker a submission file is routed to, decided by extension alone.
/// Files of any other extension never enter the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
  Js,
  Css,
  Html,
}

impl FileKind {
  /// Suffix match is case-sensitive, mirroring the upload conventions the
  /// graded courses use.
  pub fn from_name(name: &str) -> Option<Self> {
    if name.ends_with(".js") {
      Some(FileKind::Js)
    } else if name.ends_with(".css") {
      Some(FileKind::Css)
    } else if name.ends_with(".html") {
      Some(FileKind::Html)
    } else {
      None
    }
  }
}

/// One file pulled out of a submission archive: relative path + text content.
#[derive(Clone, Debug)]
pub struct ExtractedFile {
  pub name: String,
  pub kind: FileKind,
  pub content: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classification_is_by_extension_only() {
    assert_eq!(FileKind::from_name("scripts/app.js"), Some(FileKind::Js));
    assert_eq!(FileKind::from_name("styles.css"), Some(FileKind::Css));
    assert_eq!(FileKind::from_name("index.html"), Some(FileKind::Html));
    assert_eq!(FileKind::from_name("readme.txt"), None);
    assert_eq!(FileKind::from_name("photo.png"), None);
  }

  #[test]
  fn suffix_match_is_case_sensitive() {
    assert_eq!(FileKind::from_name("APP.JS"), None);
    assert_eq!(FileKind::from_name("page.Html"), None);
  }
}
