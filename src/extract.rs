//! Submission intake: expand a ZIP archive into an ephemeral directory and
//! enumerate the files that take part in grading.
//!
//! Every call gets its own `TempDir`, so concurrent submissions never share
//! an extraction directory. The directory and all contents are removed when
//! the handle drops, whether grading succeeded or failed.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{instrument, warn};

use crate::domain::{ExtractedFile, FileKind};
use crate::util::is_hidden_name;

/// Expand `bytes` (a ZIP archive) into a fresh temp dir and collect the
/// gradeable files, in lexicographic path order.
///
/// A malformed archive is fatal to this submission; there is no partial
/// recovery. The returned `TempDir` must be kept alive while file contents
/// on disk are still needed.
#[instrument(level = "info", skip(bytes), fields(archive_len = bytes.len()))]
pub fn extract_submission(bytes: &[u8]) -> Result<(TempDir, Vec<ExtractedFile>), String> {
  let dir = TempDir::new().map_err(|e| format!("failed to create extraction dir: {}", e))?;

  let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
    .map_err(|e| format!("invalid zip archive: {}", e))?;
  archive
    .extract(dir.path())
    .map_err(|e| format!("zip extraction failed: {}", e))?;

  let files = collect_files(dir.path())?;
  Ok((dir, files))
}

/// Walk the extraction dir and keep regular files that are not hidden and
/// carry a recognized extension. Anything else is silently dropped, so the
/// content and report maps always cover exactly the same names.
fn collect_files(root: &Path) -> Result<Vec<ExtractedFile>, String> {
  let mut rel_paths = Vec::new();
  walk(root, root, &mut rel_paths)?;
  // Stable order: grading prompts must be reproducible for identical input.
  rel_paths.sort();

  let mut out = Vec::new();
  for rel in rel_paths {
    let name = rel.to_string_lossy().replace('\\', "/");
    let base = rel
      .file_name()
      .map(|s| s.to_string_lossy().to_string())
      .unwrap_or_default();
    if is_hidden_name(&base) {
      continue;
    }
    let kind = match FileKind::from_name(&name) {
      Some(k) => k,
      None => continue,
    };
    match std::fs::read_to_string(root.join(&rel)) {
      Ok(content) => out.push(ExtractedFile { name, kind, content }),
      Err(e) => {
        // Binary or unreadable data under a text extension: skip the file
        // entirely rather than grade garbage.
        warn!(target: "grading", file = %name, error = %e, "Skipping unreadable submission file");
      }
    }
  }
  Ok(out)
}

fn walk(root: &Path, dir: &Path, acc: &mut Vec<PathBuf>) -> Result<(), String> {
  let entries =
    std::fs::read_dir(dir).map_err(|e| format!("failed to read {}: {}", dir.display(), e))?;
  for entry in entries {
    let entry = entry.map_err(|e| format!("failed to read dir entry: {}", e))?;
    let path = entry.path();
    if path.is_dir() {
      walk(root, &path, acc)?;
    } else if path.is_file() {
      let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
      acc.push(rel);
    }
  }
  Ok(())
}
