//! Filesystem configuration.
//!
//! Settings are plain serde structs so they can live in a RON file next to
//! the rest of an application's config:
//!
//! ```ron
//! (
//!     default_visibility: private,
//!     default_encoding: Some(utf8),
//!     root_prefix: Some("tenants/42"),
//!     sniff_len: 1024,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::encoding::Encoding;
use crate::error::{VfsError, VfsResult};
use crate::mime::DEFAULT_SNIFF_LEN;
use crate::path::{VfsPath, normalize};
use crate::visibility::Visibility;

/// Behavior knobs for a [`Filesystem`](crate::Filesystem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Visibility for writes that do not name one.
    pub default_visibility: Visibility,
    /// Encoding applied to reads that do not name one. `None` returns bytes.
    pub default_encoding: Option<Encoding>,
    /// Every path is resolved under this prefix.
    pub root_prefix: Option<String>,
    /// Bytes inspected when guessing a mimetype.
    pub sniff_len: usize,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            default_visibility: Visibility::Public,
            default_encoding: None,
            root_prefix: None,
            sniff_len: DEFAULT_SNIFF_LEN,
        }
    }
}

impl FilesystemConfig {
    pub fn with_default_visibility(mut self, visibility: Visibility) -> Self {
        self.default_visibility = visibility;
        self
    }

    pub fn with_default_encoding(mut self, encoding: Encoding) -> Self {
        self.default_encoding = Some(encoding);
        self
    }

    pub fn with_root_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.root_prefix = Some(prefix.into());
        self
    }

    /// Parse and validate a RON document.
    pub fn from_ron_str(text: &str) -> VfsResult<Self> {
        let config: Self = ron::from_str(text).map_err(|e| VfsError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a RON file on disk.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VfsError::config(format!("{}: {e}", path.display())))?;
        Self::from_ron_str(&text)
    }

    pub fn validate(&self) -> VfsResult<()> {
        if self.sniff_len == 0 {
            return Err(VfsError::config("sniff_len must be positive"));
        }
        Ok(())
    }

    /// The root prefix as a normalized path.
    pub fn prefix(&self) -> VfsPath {
        self.root_prefix
            .as_deref()
            .map(normalize)
            .unwrap_or_default()
    }
}
