//! Immutable, copy-on-write source trees
//!
//! A [`SourceSnapshot`] is the value threaded through every pipeline stage.
//! Stages never mutate a snapshot; a mutating stage returns a new snapshot
//! whose generation is one higher than the snapshot it consumed. File contents
//! are shared between generations, so deriving a snapshot only copies the index.

use crate::core::error::{RailError, RailResult, ResultExt};
use crate::utils::normalize_tree_path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

/// Directories never captured from disk
const IGNORED_DIRS: &[&str] = &[".git"];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
  contents: Arc<Vec<u8>>,
  executable: bool,
}

/// Content hash of a snapshot (or of a subtree of it)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotDigest(String);

impl SnapshotDigest {
  /// Get the short digest (first 12 characters)
  pub fn short(&self) -> &str {
    &self.0[..12.min(self.0.len())]
  }
}

impl fmt::Display for SnapshotDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.short())
  }
}

/// An immutable directory tree
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
  files: Arc<BTreeMap<String, Entry>>,
  generation: u64,
}

impl PartialEq for SourceSnapshot {
  /// Snapshots are equal when their trees are equal, whatever their generation
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.files, &other.files) || self.files == other.files
  }
}

impl SourceSnapshot {
  /// An empty tree (generation 0)
  pub fn empty() -> Self {
    Self {
      files: Arc::new(BTreeMap::new()),
      generation: 0,
    }
  }

  /// Capture a directory from disk as generation 0
  pub fn from_dir(root: &Path) -> RailResult<Self> {
    Ok(Self {
      files: Arc::new(read_tree(root)?),
      generation: 0,
    })
  }

  /// Capture a directory that an external command produced from this snapshot
  pub fn successor_from_dir(&self, root: &Path) -> RailResult<Self> {
    Ok(Self {
      files: Arc::new(read_tree(root)?),
      generation: self.generation + 1,
    })
  }

  /// Number of replacements since the tree was captured
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn contains(&self, path: &str) -> bool {
    self.files.contains_key(&normalize_tree_path(path))
  }

  /// Raw contents of a file, if present
  pub fn read(&self, path: &str) -> Option<&[u8]> {
    self.files.get(&normalize_tree_path(path)).map(|e| e.contents.as_slice())
  }

  /// Contents of a UTF-8 file, if present
  pub fn read_string(&self, path: &str) -> RailResult<Option<String>> {
    match self.read(path) {
      Some(bytes) => Ok(Some(
        String::from_utf8(bytes.to_vec()).with_context(|| format!("File '{}' is not valid UTF-8", path))?,
      )),
      None => Ok(None),
    }
  }

  /// All file paths, sorted
  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.files.keys().map(String::as_str)
  }

  /// Start deriving the next generation
  pub fn edit(&self) -> SnapshotBuilder {
    SnapshotBuilder {
      files: (*self.files).clone(),
      generation: self.generation + 1,
    }
  }

  /// New snapshot with one file written
  pub fn with_file(&self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
    let mut builder = self.edit();
    builder.write(path, contents);
    builder.build()
  }

  /// Content hash of the whole tree
  pub fn digest(&self) -> SnapshotDigest {
    self.subtree_digest("")
  }

  /// Content hash of every file under `prefix` (a directory path)
  pub fn subtree_digest(&self, prefix: &str) -> SnapshotDigest {
    let prefix = normalize_tree_path(prefix);
    let mut hasher = Sha256::new();

    for (path, entry) in self.files.iter() {
      if !prefix.is_empty() && !(path.starts_with(&prefix) && path[prefix.len()..].starts_with('/')) {
        continue;
      }
      hasher.update(path.as_bytes());
      hasher.update([0u8, entry.executable as u8]);
      hasher.update((entry.contents.len() as u64).to_le_bytes());
      hasher.update(entry.contents.as_slice());
    }

    SnapshotDigest(format!("{:x}", hasher.finalize()))
  }

  /// Write the full tree into `dir`
  pub fn materialize(&self, dir: &Path) -> RailResult<()> {
    for (path, entry) in self.files.iter() {
      write_entry(dir, path, entry)?;
    }
    Ok(())
  }

  /// Files that differ between this snapshot and a later one
  pub fn diff(&self, newer: &SourceSnapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();

    for (path, entry) in newer.files.iter() {
      match self.files.get(path) {
        None => diff.added.push(path.clone()),
        Some(old) if old != entry => diff.modified.push(path.clone()),
        Some(_) => {}
      }
    }

    for path in self.paths() {
      if !newer.contains(path) {
        diff.removed.push(path.to_string());
      }
    }

    diff
  }

  /// Apply the changes from `base` to this snapshot onto `dir`
  ///
  /// Only added, modified and removed files are touched.
  pub fn export_changes(&self, base: &SourceSnapshot, dir: &Path) -> RailResult<SnapshotDiff> {
    let diff = base.diff(self);

    for path in diff.added.iter().chain(diff.modified.iter()) {
      if let Some(entry) = self.files.get(path) {
        write_entry(dir, path, entry)?;
      }
    }

    for path in &diff.removed {
      let target = dir.join(path);
      if target.exists() {
        fs::remove_file(&target).with_context(|| format!("Failed to remove {}", target.display()))?;
      }
    }

    Ok(diff)
  }
}

/// Mutable staging area for the next snapshot generation
pub struct SnapshotBuilder {
  files: BTreeMap<String, Entry>,
  generation: u64,
}

impl SnapshotBuilder {
  pub fn write(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> &mut Self {
    let path = normalize_tree_path(path);
    let executable = self.files.get(&path).map(|e| e.executable).unwrap_or(false);
    self.files.insert(
      path,
      Entry {
        contents: Arc::new(contents.into()),
        executable,
      },
    );
    self
  }

  pub fn set_executable(&mut self, path: &str, executable: bool) -> &mut Self {
    if let Some(entry) = self.files.get_mut(&normalize_tree_path(path)) {
      entry.executable = executable;
    }
    self
  }

  pub fn remove(&mut self, path: &str) -> &mut Self {
    self.files.remove(&normalize_tree_path(path));
    self
  }

  pub fn build(self) -> SourceSnapshot {
    SourceSnapshot {
      files: Arc::new(self.files),
      generation: self.generation,
    }
  }
}

/// Paths changed between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
  pub added: Vec<String>,
  pub modified: Vec<String>,
  pub removed: Vec<String>,
}

impl SnapshotDiff {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
  }

  pub fn len(&self) -> usize {
    self.added.len() + self.modified.len() + self.removed.len()
  }
}

fn read_tree(root: &Path) -> RailResult<BTreeMap<String, Entry>> {
  if !root.is_dir() {
    return Err(RailError::message(format!(
      "Source directory does not exist: {}",
      root.display()
    )));
  }

  let mut files = BTreeMap::new();
  let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| {
    !(e.file_type().is_dir() && IGNORED_DIRS.iter().any(|d| e.file_name() == *d))
  });

  for entry in walker {
    let entry = entry?;
    if !entry.file_type().is_file() {
      continue;
    }

    let relative = entry.path().strip_prefix(root)?;
    let contents = fs::read(entry.path()).with_context(|| format!("Failed to read {}", entry.path().display()))?;
    let executable = is_executable(&entry.metadata()?);

    files.insert(
      normalize_tree_path(&relative.to_string_lossy()),
      Entry {
        contents: Arc::new(contents),
        executable,
      },
    );
  }

  Ok(files)
}

fn write_entry(dir: &Path, path: &str, entry: &Entry) -> RailResult<()> {
  let target = dir.join(path);
  if let Some(parent) = target.parent() {
    fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
  }
  fs::write(&target, entry.contents.as_slice()).with_context(|| format!("Failed to write {}", target.display()))?;
  set_executable(&target, entry.executable)?;
  Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
  false
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> RailResult<()> {
  use std::os::unix::fs::PermissionsExt;
  let mode = if executable { 0o755 } else { 0o644 };
  fs::set_permissions(path, fs::Permissions::from_mode(mode))
    .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> RailResult<()> {
  Ok(())
}
