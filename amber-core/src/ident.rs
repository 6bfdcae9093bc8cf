use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A node identifier: the decoder-selecting kind name plus a unique suffix.
///
/// Ids render as `"<kind>+<uuid>"`; the rendered form doubles as the storage
/// key for byte-oriented shelves. Keeping the two halves as separate fields
/// means a reference can never be confused with a stored string that happens
/// to contain a `+`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    kind: String,
    uuid: Uuid,
}

impl NodeId {
    /// Mints a fresh id for the given kind.
    pub fn mint(kind: impl Into<String>) -> Self {
        NodeId {
            kind: kind.into(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Rebuilds an id from its parts (e.g., when decoding a reference).
    pub fn from_parts(kind: impl Into<String>, uuid: Uuid) -> Self {
        NodeId {
            kind: kind.into(),
            uuid,
        }
    }

    /// The kind name, used as the type-registry key.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The unique suffix.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.kind, self.uuid)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

/// Error parsing a rendered node id.
#[derive(Debug, thiserror::Error)]
pub enum ParseIdError {
    #[error("node id has no '+' separator")]
    MissingSeparator,
    #[error("node id has an empty kind")]
    EmptyKind,
    #[error("bad uuid in node id: {0}")]
    BadUuid(#[from] uuid::Error),
}

impl FromStr for NodeId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The kind is everything before the first '+'; kind names never
        // contain one.
        let (kind, rest) = s.split_once('+').ok_or(ParseIdError::MissingSeparator)?;
        if kind.is_empty() {
            return Err(ParseIdError::EmptyKind);
        }
        Ok(NodeId {
            kind: kind.to_owned(),
            uuid: Uuid::parse_str(rest)?,
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = NodeId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a '<kind>+<uuid>' node id string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}
