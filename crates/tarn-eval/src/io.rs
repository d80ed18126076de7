//! Capabilities injected into a run: peer I/O, the job's files, and the
//! interrupt flag.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// The job was cancelled or timed out while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Output to, and input from, the peer that submitted the job.
pub trait Io {
    /// Hand `text` followed by `end` to the peer. Never blocks on the peer.
    fn emit(&mut self, text: &str, end: &str);

    /// Wait until the peer supplies a line of text.
    fn request_input(&mut self) -> Result<String, Interrupted>;
}

/// The job's files as a name → content store.
pub trait FileStore {
    fn read(&self, name: &str) -> Option<String>;

    fn write(&mut self, name: &str, contents: &str) -> Result<(), String>;

    fn append(&mut self, name: &str, contents: &str) -> Result<(), String> {
        let mut existing = self.read(name).unwrap_or_default();
        existing.push_str(contents);
        self.write(name, &existing)
    }
}

/// Returns `true` if `name` may be stored as a job file.
///
/// Files are flat: path separators, empty names, `.` and `..` are refused.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// An in-memory [`FileStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFiles {
    files: BTreeMap<String, String>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a file map, dropping unsafe names.
    pub fn from_map(files: BTreeMap<String, String>) -> Self {
        Self {
            files: files
                .into_iter()
                .filter(|(name, _)| is_safe_file_name(name))
                .collect(),
        }
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.files
    }
}

impl FileStore for MemoryFiles {
    fn read(&self, name: &str) -> Option<String> {
        self.files.get(name).cloned()
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<(), String> {
        if !is_safe_file_name(name) {
            return Err(format!("invalid file name '{name}'"));
        }
        self.files.insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

/// Shared cancellation flag, raised by the host and polled by the evaluator.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
