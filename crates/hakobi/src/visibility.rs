//! Visibility model and its mapping onto backend permission systems.
//!
//! Callers only ever see [`Visibility::Public`] and [`Visibility::Private`].
//! Each adapter translates that through a [`VisibilityMap`] into whatever
//! its storage understands: Unix mode bits for [`PermissionMap`], canned
//! ACL strings for [`AclMap`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{VfsError, VfsResult};
use crate::types::FileType;

/// Two-level visibility.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Validates loosely typed visibility input.
///
/// Numeric values follow declaration order (`0` public, `1` private);
/// strings are matched case-insensitively. Anything else fails with
/// [`VfsError::InvalidVisibility`] carrying the rejected literal.
pub trait IntoVisibility {
    fn into_visibility(self) -> VfsResult<Visibility>;
}

impl IntoVisibility for Visibility {
    fn into_visibility(self) -> VfsResult<Visibility> {
        Ok(self)
    }
}

impl IntoVisibility for &str {
    fn into_visibility(self) -> VfsResult<Visibility> {
        self.parse()
            .map_err(|_| VfsError::invalid_visibility(self))
    }
}

impl IntoVisibility for String {
    fn into_visibility(self) -> VfsResult<Visibility> {
        self.as_str().into_visibility()
    }
}

macro_rules! int_visibility {
    ($($t:ty),*) => {$(
        impl IntoVisibility for $t {
            fn into_visibility(self) -> VfsResult<Visibility> {
                match self {
                    0 => Ok(Visibility::Public),
                    1 => Ok(Visibility::Private),
                    other => Err(VfsError::invalid_visibility(other.to_string())),
                }
            }
        }
    )*};
}

int_visibility!(u8, u32, u64, i32, i64);

/// Translation between [`Visibility`] and an adapter's native form.
pub trait VisibilityMap {
    type Repr;

    /// Native representation for an entry of the given kind.
    fn to_repr(&self, visibility: Visibility, kind: FileType) -> Self::Repr;

    /// Collapse a native value back onto the two-level model.
    fn from_repr(&self, repr: &Self::Repr) -> Visibility;
}

/// Unix permission bits for files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionMap {
    pub file_public: u32,
    pub file_private: u32,
    pub dir_public: u32,
    pub dir_private: u32,
}

impl Default for PermissionMap {
    fn default() -> Self {
        Self {
            file_public: 0o644,
            file_private: 0o600,
            dir_public: 0o755,
            dir_private: 0o700,
        }
    }
}

impl VisibilityMap for PermissionMap {
    type Repr = u32;

    fn to_repr(&self, visibility: Visibility, kind: FileType) -> u32 {
        match (kind, visibility) {
            (FileType::Directory, Visibility::Public) => self.dir_public,
            (FileType::Directory, Visibility::Private) => self.dir_private,
            (FileType::File, Visibility::Public) => self.file_public,
            (FileType::File, Visibility::Private) => self.file_private,
        }
    }

    fn from_repr(&self, mode: &u32) -> Visibility {
        // world-readable is public
        if mode & 0o004 != 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// Canned ACL strings, as used by object stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclMap {
    pub public: String,
    pub private: String,
}

impl Default for AclMap {
    fn default() -> Self {
        Self {
            public: "public-read".to_string(),
            private: "private".to_string(),
        }
    }
}

impl VisibilityMap for AclMap {
    type Repr = String;

    fn to_repr(&self, visibility: Visibility, _kind: FileType) -> String {
        match visibility {
            Visibility::Public => self.public.clone(),
            Visibility::Private => self.private.clone(),
        }
    }

    fn from_repr(&self, acl: &String) -> Visibility {
        if *acl == self.public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}
