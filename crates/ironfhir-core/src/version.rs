//! Bit-packed resource version tokens.
//!
//! A token is a single `i64`: the high 62 bits hold the version ordinal
//! (negated, decrement-to-next), bit 1 is the deletion flag, and bit 0
//! records whether the resource id was server- or client-assigned. Bit 0
//! never changes after creation; every write transitions the ordinal by one.

use serde::{Deserialize, Serialize};

/// How a resource received its id at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreationMode {
    ServerAssigned,
    ClientAssigned,
}

/// Token for the first version of a newly created resource.
pub fn initial(mode: CreationMode) -> i64 {
    match mode {
        CreationMode::ServerAssigned => -3,
        CreationMode::ClientAssigned => -4,
    }
}

/// Token after an upsert: ordinal advances, deletion flag clears,
/// creation-mode bit carries over.
pub fn upsert_next(v: i64) -> i64 {
    let mut next = ((v >> 2) - 1) << 2;
    if v & 1 != 0 {
        next |= 1;
    }
    next
}

/// Token after a delete: ordinal advances, deletion flag sets,
/// creation-mode bit carries over.
pub fn delete_next(v: i64) -> i64 {
    upsert_next(v) | 2
}

pub fn is_deleted(v: i64) -> bool {
    v & 2 != 0
}

/// The externally visible version number, as reported in ETags.
pub fn ordinal(v: i64) -> i64 {
    -(v >> 2)
}

pub fn creation_mode(v: i64) -> CreationMode {
    if v & 1 != 0 {
        CreationMode::ServerAssigned
    } else {
        CreationMode::ClientAssigned
    }
}

/// Weak ETag for a token, e.g. `W/"3"`.
pub fn etag(v: i64) -> String {
    format!("W/\"{}\"", ordinal(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_tokens_have_ordinal_one() {
        assert_eq!(ordinal(initial(CreationMode::ServerAssigned)), 1);
        assert_eq!(ordinal(initial(CreationMode::ClientAssigned)), 1);
        assert!(!is_deleted(initial(CreationMode::ServerAssigned)));
        assert!(!is_deleted(initial(CreationMode::ClientAssigned)));
    }

    #[test]
    fn upsert_chain_counts_up_without_gaps() {
        let mut v = initial(CreationMode::ServerAssigned);
        for expected in 1..=16 {
            assert_eq!(ordinal(v), expected);
            v = upsert_next(v);
        }
    }

    #[test]
    fn creation_mode_survives_every_transition() {
        for mode in [CreationMode::ServerAssigned, CreationMode::ClientAssigned] {
            let mut v = initial(mode);
            v = upsert_next(v);
            assert_eq!(creation_mode(v), mode);
            v = delete_next(v);
            assert_eq!(creation_mode(v), mode);
            v = upsert_next(v);
            assert_eq!(creation_mode(v), mode);
        }
    }

    #[test]
    fn delete_sets_and_upsert_clears_the_tombstone_bit() {
        let created = initial(CreationMode::ClientAssigned);
        let deleted = delete_next(created);
        assert!(is_deleted(deleted));
        assert_eq!(ordinal(deleted), 2);

        let recreated = upsert_next(deleted);
        assert!(!is_deleted(recreated));
        assert_eq!(ordinal(recreated), 3);
    }

    #[test]
    fn known_token_values() {
        // Server-assigned lineage: -3 -> -7 -> -11; delete from -3 is -5.
        assert_eq!(upsert_next(-3), -7);
        assert_eq!(upsert_next(-7), -11);
        assert_eq!(delete_next(-3), -5);
        assert_eq!(upsert_next(-5), -11);

        // Client-assigned lineage: -4 -> -8 -> -12; delete from -8 is -10.
        assert_eq!(upsert_next(-4), -8);
        assert_eq!(delete_next(-8), -10);
        assert_eq!(upsert_next(-10), -16);
    }

    #[test]
    fn etag_formats_the_ordinal() {
        assert_eq!(etag(initial(CreationMode::ServerAssigned)), "W/\"1\"");
        assert_eq!(etag(upsert_next(initial(CreationMode::ServerAssigned))), "W/\"2\"");
    }
}
