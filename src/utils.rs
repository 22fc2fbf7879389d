//! Utility functions for cross-platform path handling and command rendering

/// Normalize a path inside a source tree
///
/// Tree paths are relative, use forward slashes, and carry no `.` or empty
/// components, so the same file always has the same key on every platform.
pub fn normalize_tree_path(path: &str) -> String {
  path
    .replace('\\', "/")
    .split('/')
    .filter(|part| !part.is_empty() && *part != ".")
    .collect::<Vec<_>>()
    .join("/")
}

/// Quote a single argument for display in a shell-like command line
///
/// Only used for rendering; commands are never re-parsed from this output.
pub fn shell_quote(arg: &str) -> String {
  if arg.is_empty() {
    return "''".to_string();
  }

  let plain = arg
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%{}*".contains(c));
  if plain {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}
