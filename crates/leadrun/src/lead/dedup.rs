//! Lead deduplication policy.
//!
//! A candidate is identified by its provider place id when it has one,
//! otherwise by its normalized phone number. Identity is scoped to the
//! owning user, across all of that user's jobs. Candidates with neither
//! identifier are always new.

use crate::db::{lead_repo, Database, DatabaseError};

/// Identity of a candidate for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupKey {
    Place(String),
    Phone(String),
}

impl DedupKey {
    /// Picks the key for a candidate. The place id takes precedence.
    pub fn for_candidate(place_id: Option<&str>, normalized_phone: Option<&str>) -> Option<Self> {
        match (place_id, normalized_phone) {
            (Some(id), _) => Some(DedupKey::Place(id.to_string())),
            (None, Some(phone)) => Some(DedupKey::Phone(phone.to_string())),
            (None, None) => None,
        }
    }

    /// Identifier recorded in the checkpoint's processed set.
    pub fn identifier(&self) -> String {
        match self {
            DedupKey::Place(id) => format!("place:{}", id),
            DedupKey::Phone(phone) => format!("phone:{}", phone),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedup {
    New,
    Duplicate,
}

/// Read access to the leads a user already owns.
pub trait KnownLeads {
    fn has_place_id(&self, user_id: &str, place_id: &str) -> Result<bool, DatabaseError>;
    fn has_phone(&self, user_id: &str, normalized_phone: &str) -> Result<bool, DatabaseError>;
}

impl KnownLeads for Database {
    fn has_place_id(&self, user_id: &str, place_id: &str) -> Result<bool, DatabaseError> {
        lead_repo::has_place_id(self, user_id, place_id)
    }

    fn has_phone(&self, user_id: &str, normalized_phone: &str) -> Result<bool, DatabaseError> {
        lead_repo::has_phone(self, user_id, normalized_phone)
    }
}

/// Classifies a candidate against the user's existing leads.
pub fn classify(
    user_id: &str,
    key: Option<&DedupKey>,
    known: &impl KnownLeads,
) -> Result<Dedup, DatabaseError> {
    let duplicate = match key {
        Some(DedupKey::Place(id)) => known.has_place_id(user_id, id)?,
        Some(DedupKey::Phone(phone)) => known.has_phone(user_id, phone)?,
        None => false,
    };
    Ok(if duplicate { Dedup::Duplicate } else { Dedup::New })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Known {
        places: HashSet<(String, String)>,
        phones: HashSet<(String, String)>,
    }

    impl KnownLeads for Known {
        fn has_place_id(&self, user_id: &str, place_id: &str) -> Result<bool, DatabaseError> {
            Ok(self
                .places
                .contains(&(user_id.to_string(), place_id.to_string())))
        }

        fn has_phone(&self, user_id: &str, phone: &str) -> Result<bool, DatabaseError> {
            Ok(self
                .phones
                .contains(&(user_id.to_string(), phone.to_string())))
        }
    }

    fn known() -> Known {
        let mut k = Known::default();
        k.places.insert(("u1".into(), "P1".into()));
        k.phones.insert(("u1".into(), "+15551234567".into()));
        k
    }

    #[test]
    fn test_place_id_takes_precedence() {
        let key = DedupKey::for_candidate(Some("P9"), Some("+15551234567")).unwrap();
        assert_eq!(key, DedupKey::Place("P9".to_string()));
        // Phone matches an existing lead, but the place id is what counts.
        assert_eq!(classify("u1", Some(&key), &known()).unwrap(), Dedup::New);
    }

    #[test]
    fn test_place_id_match_is_duplicate() {
        let key = DedupKey::Place("P1".to_string());
        assert_eq!(
            classify("u1", Some(&key), &known()).unwrap(),
            Dedup::Duplicate
        );
    }

    #[test]
    fn test_phone_match_without_place_id() {
        let key = DedupKey::for_candidate(None, Some("+15551234567")).unwrap();
        assert_eq!(
            classify("u1", Some(&key), &known()).unwrap(),
            Dedup::Duplicate
        );
    }

    #[test]
    fn test_scoped_per_user() {
        let key = DedupKey::Place("P1".to_string());
        assert_eq!(classify("u2", Some(&key), &known()).unwrap(), Dedup::New);
    }

    #[test]
    fn test_no_identifiers_is_always_new() {
        assert_eq!(DedupKey::for_candidate(None, None), None);
        assert_eq!(classify("u1", None, &known()).unwrap(), Dedup::New);
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(DedupKey::Place("P1".into()).identifier(), "place:P1");
        assert_eq!(DedupKey::Phone("+1555".into()).identifier(), "phone:+1555");
    }
}
