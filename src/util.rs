//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// True if the final path component marks a hidden file (dot-prefixed).
/// Hidden files never take part in grading.
pub fn is_hidden_name(name: &str) -> bool {
  name.starts_with('.')
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max { s.to_string() } else { format!("{}… ({} bytes total)", &s[..max], s.len()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_occurrences() {
    let out = fill_template("File: {name} ({name})", &[("name", "index.html")]);
    assert_eq!(out, "File: index.html (index.html)");
  }

  #[test]
  fn fill_template_leaves_unknown_keys_alone() {
    let out = fill_template("{a} {b}", &[("a", "x")]);
    assert_eq!(out, "x {b}");
  }

  #[test]
  fn hidden_names_are_dot_prefixed() {
    assert!(is_hidden_name(".hidden.js"));
    assert!(is_hidden_name(".DS_Store"));
    assert!(!is_hidden_name("main.js"));
  }
}
