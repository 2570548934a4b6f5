//! The entity record and its reserved-field conventions.
//!
//! An entity is a typed envelope (id, type tag, version) around an open
//! field map: the envelope fields (`id`, `type_tag`, `version`) are
//! first-class and engine-managed, everything else lives in `fields`
//! and is opaque to the engine except for the conventions below.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An entity's monotonically increasing optimistic-concurrency token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// The version assigned to a brand new entity.
    pub const INITIAL: Version = Version(1);

    /// The version that follows this one.
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of lifecycle tags carried by the conventional `status`
/// field. The engine does not branch on these except where explicitly
/// documented (saga preconditions in `forge-saga`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Normal state; entity can be used freely.
    Active,
    /// Admin-locked; must not be modified by gameplay commands.
    Locked,
    /// Listed on a marketplace; cannot be used elsewhere.
    OnAuction,
    /// Part of a pending trade.
    InTrade,
    /// Equipped by its owner; cannot be traded.
    Equipped,
    /// Used up, pending deletion.
    Consumed,
    /// Reserved for a specific in-flight action.
    Reserved,
}

impl Status {
    /// The wire representation stored in the entity's `status` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Locked => "locked",
            Status::OnAuction => "on_auction",
            Status::InTrade => "in_trade",
            Status::Equipped => "equipped",
            Status::Consumed => "consumed",
            Status::Reserved => "reserved",
        }
    }

    /// Parse a status tag, returning `None` for unrecognized strings.
    /// Unrecognized status strings are left in place by callers rather
    /// than rejected outright; the set is a convention, not a schema.
    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "active" => Some(Status::Active),
            "locked" => Some(Status::Locked),
            "on_auction" => Some(Status::OnAuction),
            "in_trade" => Some(Status::InTrade),
            "equipped" => Some(Status::Equipped),
            "consumed" => Some(Status::Consumed),
            "reserved" => Some(Status::Reserved),
            _ => None,
        }
    }
}

/// A keyed, versioned, opaque record — the unit of persistence and
/// locking throughout the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique id. Stable for the lifetime of the entity.
    pub id: String,
    /// `_type` — type discriminator used for type-indexed listings.
    pub type_tag: String,
    /// `_version` — optimistic concurrency token.
    pub version: Version,
    /// Every other field, opaque to the engine.
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Construct a brand new entity at `Version::INITIAL`.
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            type_tag: type_tag.into(),
            version: Version::INITIAL,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Read a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field by name, returning the previous value if any.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// The conventional `owner_id` field, if present.
    pub fn owner_id(&self) -> Option<&str> {
        self.field("owner_id").and_then(Value::as_str)
    }

    /// The conventional `proto_id` field, if present.
    pub fn proto_id(&self) -> Option<&str> {
        self.field("proto_id").and_then(Value::as_str)
    }

    /// The conventional `status` field, parsed, if present and recognized.
    pub fn status(&self) -> Option<Status> {
        self.field("status").and_then(Value::as_str).and_then(Status::parse)
    }

    /// Set the conventional `status` field.
    pub fn set_status(&mut self, status: Status) {
        self.set_field("status", Value::String(status.as_str().to_string()));
    }

    /// True if the entity's `status` field equals `status` exactly.
    /// An entity with no `status` field or an unrecognized value never
    /// matches.
    pub fn has_status(&self, status: Status) -> bool {
        self.status() == Some(status)
    }

    /// Remove the conventional `status` field entirely.
    pub fn clear_status(&mut self) {
        self.fields.remove("status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_starts_at_version_one() {
        let e = Entity::new("p1", "player");
        assert_eq!(e.version, Version::INITIAL);
        assert_eq!(e.version.0, 1);
    }

    #[test]
    fn status_roundtrips_through_the_field_map() {
        let mut e = Entity::new("c1", "card");
        assert_eq!(e.status(), None);
        e.set_status(Status::OnAuction);
        assert!(e.has_status(Status::OnAuction));
        assert!(!e.has_status(Status::Active));
        assert_eq!(e.field("status").unwrap().as_str(), Some("on_auction"));
    }

    #[test]
    fn version_next_increments_by_one() {
        assert_eq!(Version(41).next(), Version(42));
    }

    #[test]
    fn clear_status_removes_the_field() {
        let mut e = Entity::new("c1", "card");
        e.set_status(Status::Locked);
        assert!(e.has_status(Status::Locked));
        e.clear_status();
        assert_eq!(e.status(), None);
        assert!(e.field("status").is_none());
    }
}
