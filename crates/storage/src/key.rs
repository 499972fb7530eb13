//! Hierarchical document keys.
//!
//! A key names one document inside a namespace. Child documents carry the
//! kind and ID of their owner as an [`Ancestor`], which is what scoped
//! queries and cascading deletes filter on.

use crate::error::{StorageError, StorageResult};
use std::borrow::Cow;
use std::fmt;

/// The kind of an entity. Each kind has its own key space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a document within its kind (and ancestor, if any).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyId {
    /// Numeric ID, assigned externally or through `allocate_ids`.
    Id(i64),
    /// Name chosen by the writer, such as a content digest.
    Name(String),
}

impl KeyId {
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Name(name) => Some(name),
        }
    }

    fn validate(&self) -> StorageResult<()> {
        match self {
            Self::Id(id) if *id <= 0 => Err(StorageError::InvalidKey(format!(
                "numeric id must be positive, got {id}"
            ))),
            Self::Name(name) if name.is_empty() => {
                Err(StorageError::InvalidKey("name must not be empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// The owning side of a parent/child key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ancestor {
    pub kind: Kind,
    pub id: KeyId,
}

/// Fully qualified document key.
///
/// Keys order by namespace, then ancestor, then kind, then ID, so all
/// children of one parent are adjacent in a backend's natural order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    namespace: String,
    parent: Option<Ancestor>,
    kind: Kind,
    id: KeyId,
}

impl Key {
    /// Key of a top-level document with a numeric ID.
    pub fn id(namespace: impl Into<String>, kind: Kind, id: i64) -> Self {
        Self {
            namespace: namespace.into(),
            parent: None,
            kind,
            id: KeyId::Id(id),
        }
    }

    /// Key of a top-level document with a name.
    pub fn name(namespace: impl Into<String>, kind: Kind, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            parent: None,
            kind,
            id: KeyId::Name(name.into()),
        }
    }

    /// Key of a document owned by `self`. Only top-level keys can own children.
    pub fn child(&self, kind: Kind, id: KeyId) -> StorageResult<Key> {
        if self.parent.is_some() {
            return Err(StorageError::InvalidKey(format!(
                "{self} is already a child key and cannot own {kind} documents"
            )));
        }
        Ok(Key {
            namespace: self.namespace.clone(),
            parent: Some(Ancestor {
                kind: self.kind.clone(),
                id: self.id.clone(),
            }),
            kind,
            id,
        })
    }

    /// Rebuild a key from its parts, as read back from a backend.
    pub fn from_parts(
        namespace: impl Into<String>,
        parent: Option<Ancestor>,
        kind: Kind,
        id: KeyId,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            parent,
            kind,
            id,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parent(&self) -> Option<&Ancestor> {
        self.parent.as_ref()
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn key_id(&self) -> &KeyId {
        &self.id
    }

    /// Whether `self` is a direct child of `ancestor`.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        ancestor.parent.is_none()
            && self.namespace == ancestor.namespace
            && self
                .parent
                .as_ref()
                .is_some_and(|p| p.kind == ancestor.kind && p.id == ancestor.id)
    }

    /// Check that the key is complete and well formed.
    pub fn validate(&self) -> StorageResult<()> {
        if self.namespace.is_empty() {
            return Err(StorageError::InvalidKey(format!(
                "{self}: namespace must not be empty"
            )));
        }
        if self.kind.as_str().is_empty() {
            return Err(StorageError::InvalidKey("kind must not be empty".to_string()));
        }
        if let Some(parent) = &self.parent {
            parent.id.validate()?;
        }
        self.id.validate()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.namespace)?;
        if let Some(parent) = &self.parent {
            write!(f, "/{},{}", parent.kind, parent.id)?;
        }
        write!(f, "/{},{}", self.kind, self.id)
    }
}
