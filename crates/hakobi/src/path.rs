//! Path normalization.
//!
//! Callers hand us paths in whatever shape they like (`/a//b/`, `a\b`,
//! `./a/../a/b`). Every adapter sees the same canonical [`VfsPath`]: a
//! list of segments with no empty, `.` or `..` parts. The root is the
//! empty path.

use std::fmt;

/// A normalized, adapter-agnostic path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VfsPath {
    segments: Vec<String>,
}

/// Normalize a raw path.
///
/// Both `/` and `\` separate segments. `..` is clamped at the root, so a
/// normalized path can never point above it.
pub fn normalize(raw: &str) -> VfsPath {
    let mut segments: Vec<String> = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s.to_string()),
        }
    }
    VfsPath { segments }
}

impl VfsPath {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, or `""` for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Path with the final segment removed. The parent of root is root.
    pub fn parent(&self) -> VfsPath {
        let mut segments = self.segments.clone();
        segments.pop();
        VfsPath { segments }
    }

    /// Append another path under this one.
    pub fn join(&self, other: &VfsPath) -> VfsPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        VfsPath { segments }
    }

    /// Segment-wise prefix test. Every path starts with root.
    pub fn starts_with(&self, prefix: &VfsPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Remove `prefix` from the front of this path.
    pub fn strip_prefix(&self, prefix: &VfsPath) -> Option<VfsPath> {
        self.segments
            .strip_prefix(prefix.segments.as_slice())
            .map(|rest| VfsPath {
                segments: rest.to_vec(),
            })
    }

    /// Render with `/` separators; root renders as `""`.
    pub fn as_key(&self) -> String {
        self.segments.join("/")
    }

    /// Ancestors from the first segment down to (excluding) this path.
    pub fn ancestors(&self) -> impl Iterator<Item = VfsPath> + '_ {
        (1..self.segments.len()).map(|n| VfsPath {
            segments: self.segments[..n].to_vec(),
        })
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<&str> for VfsPath {
    fn from(raw: &str) -> Self {
        normalize(raw)
    }
}
