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

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let cut: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", cut, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_only_known_keys() {
    let out = fill_template("{a} and {b} but not {c}", &[("a", "1"), ("b", "2")]);
    assert_eq!(out, "1 and 2 but not {c}");
  }

  #[test]
  fn truncation_counts_chars_not_bytes() {
    let s = "日本語のテキストです";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with("日本語"));
  }
}
