//! Strong type definitions for documents and revisions.
//!
//! Identifiers are newtypes so a document id can never be passed where a
//! revision id is expected.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// Domain tag mixed into generated revision hashes.
const REV_DOMAIN: &[u8] = b"revsync-rev-v1:";

/// Number of hex characters kept from a generated revision digest.
const REV_HASH_LEN: usize = 32;

/// Opaque document identifier, unique per document across stores.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A revision identifier of the form `<generation>-<hash>`.
///
/// Two revision ids are equal iff their strings are equal. The generation is
/// parsed once and cached; it orders revisions, with the full string as the
/// tie breaker.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RevisionId {
    raw: String,
    generation: u64,
}

impl RevisionId {
    /// Parse a revision id, rejecting anything that is not `<gen>-<hash>`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidRevisionId(s.to_string());

        let (gen, hash) = s.split_once('-').ok_or_else(invalid)?;
        if gen.is_empty()
            || gen.starts_with('0')
            || !gen.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if hash.is_empty() || hash.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let generation = gen.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self {
            raw: s.to_string(),
            generation,
        })
    }

    /// Build a revision id from its parts.
    pub fn from_parts(generation: u64, hash: &str) -> Result<Self> {
        Self::parse(&format!("{}-{}", generation, hash))
    }

    /// Generate the id for a new revision written on top of `parent`.
    ///
    /// The hash is a truncated BLAKE3 digest of the parent, the deleted flag
    /// and the body, so the same edit made twice yields the same id.
    /// Fails when the parent is already at the last representable generation.
    pub fn derive(parent: Option<&RevisionId>, body: &serde_json::Value, deleted: bool) -> Result<Self> {
        let generation = match parent {
            Some(p) => p
                .generation
                .checked_add(1)
                .ok_or_else(|| CoreError::InvalidRevisionId(format!("no generation after {}", p)))?,
            None => 1,
        };

        let mut hasher = blake3::Hasher::new();
        hasher.update(REV_DOMAIN);
        if let Some(parent) = parent {
            hasher.update(parent.as_str().as_bytes());
        }
        hasher.update(&[0x00, deleted as u8]);
        hasher.update(body.to_string().as_bytes());

        let digest = hex::encode(hasher.finalize().as_bytes());
        let hash = &digest[..REV_HASH_LEN];

        Ok(Self {
            raw: format!("{}-{}", generation, hash),
            generation,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The part after the first `-`.
    pub fn hash(&self) -> &str {
        // parse() guarantees a '-' after the generation digits
        &self.raw[self.raw.find('-').map_or(0, |i| i + 1)..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for RevisionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.generation
            .cmp(&other.generation)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for RevisionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self.raw)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for RevisionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for RevisionId {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for RevisionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for RevisionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
