// # Core Types
//
// Strongly-typed identifiers and the partition filter used throughout the
// sync engine. Newtypes keep instance ids, record ids, session ids and
// transfer ids from being mixed up, and the `Filter` type makes the
// "wildcard facility with a concrete user" combination unrepresentable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::md5_hex;
use crate::error::{Result, SyncError};

/// Identity of a node. Stamps every write the node produces and is immutable
/// for the node's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an instance id. The id is opaque but must be non-empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SyncError::InvalidArgument(
                "instance id must be non-empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a record, shared by the application working set and the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id. Must be non-empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SyncError::InvalidArgument(
                "record id must be non-empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a sync session between two nodes.
///
/// Derived deterministically from the two endpoint identities so both sides
/// compute the same id: `md5(client) || md5(server)` in hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Derives the session id for a client/server pair.
    pub fn for_pair(client: &InstanceId, server: &InstanceId) -> Self {
        Self(format!(
            "{}{}",
            md5_hex(client.as_str()),
            md5_hex(server.as_str())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single pull or push exchange within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    /// Builds the transfer id for the given request ordinal on a session.
    pub fn new(session_id: &SessionId, request_counter: u64) -> Self {
        Self(format!("{}_{}", session_id.as_str(), request_counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized form of a filter, used as the key of the sync data structure.
///
/// The form is `facility + "+" + user` with wildcards rendered as empty
/// strings, so the universal filter is the reserved key `"+"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilterKey(String);

impl FilterKey {
    /// The key of the universal filter.
    pub fn universal() -> Self {
        Self("+".to_string())
    }

    pub(crate) fn from_parts(facility: &str, user: &str) -> Self {
        Self(format!("{}+{}", facility, user))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partition selector: an ordered `(facility, user)` pair where a missing
/// component is a wildcard.
///
/// A concrete user only makes sense inside a concrete facility, so
/// `user.is_some()` implies `facility.is_some()` by construction. Records
/// carry a `Filter` as their partition; scoped sync operations carry one as
/// their scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    facility: Option<String>,
    user: Option<String>,
}

impl Filter {
    /// The universal filter: wildcard on both axes.
    pub fn all() -> Self {
        Self {
            facility: None,
            user: None,
        }
    }

    /// Builds a filter from its string form, where the empty string means
    /// wildcard on that axis.
    ///
    /// Rejects the ill-formed combination of a wildcard facility with a
    /// concrete user. This is the single entry point enforcing the rule, so
    /// every code path that works with filters sees it applied consistently.
    pub fn new(facility: impl Into<String>, user: impl Into<String>) -> Result<Self> {
        let facility = facility.into();
        let user = user.into();
        if facility.is_empty() && !user.is_empty() {
            return Err(SyncError::InvalidFilter(format!(
                "user '{}' scoped under a wildcard facility",
                user
            )));
        }
        Ok(Self {
            facility: (!facility.is_empty()).then_some(facility),
            user: (!user.is_empty()).then_some(user),
        })
    }

    /// Facility axis; `None` is the wildcard.
    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }

    /// User axis; `None` is the wildcard.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// True when both axes are wildcards.
    pub fn is_universal(&self) -> bool {
        self.facility.is_none() && self.user.is_none()
    }

    /// Subset test: `self ⊆ other` iff on each axis `other` is a wildcard or
    /// equals `self`'s component.
    pub fn is_subset_of(&self, other: &Filter) -> bool {
        fn axis(ours: &Option<String>, theirs: &Option<String>) -> bool {
            theirs.is_none() || theirs == ours
        }
        axis(&self.facility, &other.facility) && axis(&self.user, &other.user)
    }

    /// Serialized key form used at the sync data structure boundary.
    pub fn key(&self) -> FilterKey {
        FilterKey::from_parts(
            self.facility.as_deref().unwrap_or(""),
            self.user.as_deref().unwrap_or(""),
        )
    }

    /// Keys of all filters that are supersets of this one, most general
    /// first: the universal key, then the facility key, then the fully
    /// scoped key, as applicable.
    pub fn superset_keys(&self) -> Vec<FilterKey> {
        let mut keys = vec![FilterKey::universal()];
        if let Some(facility) = self.facility.as_deref() {
            keys.push(FilterKey::from_parts(facility, ""));
            if self.user.is_some() {
                keys.push(self.key());
            }
        }
        keys
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_validation() {
        assert!(InstanceId::new("A").is_ok());
        assert!(InstanceId::new("").is_err());
    }

    #[test]
    fn test_record_id_validation() {
        assert!(RecordId::new("record1").is_ok());
        assert!(RecordId::new("").is_err());
    }

    #[test]
    fn test_session_id_is_deterministic() {
        let a = InstanceId::new("A").unwrap();
        let b = InstanceId::new("B").unwrap();
        assert_eq!(SessionId::for_pair(&a, &b), SessionId::for_pair(&a, &b));
        assert_ne!(SessionId::for_pair(&a, &b), SessionId::for_pair(&b, &a));
        // md5 hex is 32 chars per endpoint
        assert_eq!(SessionId::for_pair(&a, &b).as_str().len(), 64);
    }

    #[test]
    fn test_transfer_id_form() {
        let a = InstanceId::new("A").unwrap();
        let b = InstanceId::new("B").unwrap();
        let session = SessionId::for_pair(&a, &b);
        let transfer = TransferId::new(&session, 3);
        assert_eq!(
            transfer.as_str(),
            format!("{}_3", session.as_str())
        );
    }

    #[test]
    fn test_filter_rejects_user_without_facility() {
        assert!(Filter::new("", "UserX").is_err());
        assert!(Filter::new("Facility1", "UserX").is_ok());
        assert!(Filter::new("Facility1", "").is_ok());
        assert!(Filter::new("", "").is_ok());
    }

    #[test]
    fn test_filter_keys() {
        assert_eq!(Filter::all().key(), FilterKey::universal());
        assert_eq!(Filter::all().key().as_str(), "+");
        assert_eq!(
            Filter::new("Facility1", "").unwrap().key().as_str(),
            "Facility1+"
        );
        assert_eq!(
            Filter::new("Facility1", "UserX").unwrap().key().as_str(),
            "Facility1+UserX"
        );
    }

    #[test]
    fn test_subset_rule() {
        let all = Filter::all();
        let facility = Filter::new("Facility1", "").unwrap();
        let scoped = Filter::new("Facility1", "UserX").unwrap();
        let other = Filter::new("Facility2", "UserX").unwrap();

        assert!(scoped.is_subset_of(&facility));
        assert!(scoped.is_subset_of(&all));
        assert!(facility.is_subset_of(&all));
        assert!(!facility.is_subset_of(&scoped));
        assert!(!all.is_subset_of(&facility));
        assert!(!other.is_subset_of(&facility));
        assert!(scoped.is_subset_of(&scoped));
    }

    #[test]
    fn test_superset_keys() {
        assert_eq!(Filter::all().superset_keys(), vec![FilterKey::universal()]);

        let scoped = Filter::new("Facility1", "UserX").unwrap();
        let keys: Vec<String> = scoped
            .superset_keys()
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["+", "Facility1+", "Facility1+UserX"]);
    }
}
