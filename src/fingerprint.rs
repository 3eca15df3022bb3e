//! Content fingerprinting for change detection
//!
//! A fingerprint is a cheap equality proxy over a record's domain fields: two
//! records with the same key and the same fingerprint are treated as identical
//! by the sync engine without comparing full payloads. The digest is computed
//! over a canonical (sorted, length-delimited) serialization so that field
//! ordering never affects the result, and bookkeeping fields never feed it.

use std::collections::BTreeMap;

use sha2::Digest;
use sha2::Sha256;

/// Field names excluded from fingerprinting.
///
/// Remote audit timestamps and local ETL bookkeeping change on every touch
/// without the record being semantically different; hashing them would turn
/// every re-fetch into a spurious update.
pub const EXCLUDED_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "sys_created_on",
    "sys_updated_on",
    "etl_created_at",
    "etl_updated_at",
];

/// Compute the fingerprint of a domain-field bag.
///
/// The `active` flag participates in the digest: a remote-side deactivation is
/// a real state change even when no other field moved. Keys and values are
/// length-prefixed before hashing so adjacent fields cannot collide by
/// concatenation.
#[must_use]
pub fn fingerprint(fields: &BTreeMap<String, String>, active: bool) -> String {
    let mut hasher = Sha256::new();
    let active_tag: &[u8] = if active { b"active\x011" } else { b"active\x010" };
    hasher.update(active_tag);

    // BTreeMap iteration is key-ordered, which gives the canonical field order.
    for (name, value) in fields {
        if EXCLUDED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn stable_under_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("name".to_string(), "Acme".to_string());
        a.insert("city".to_string(), "Lisboa".to_string());
        a.insert("phone".to_string(), "555-0100".to_string());

        let mut b = BTreeMap::new();
        b.insert("phone".to_string(), "555-0100".to_string());
        b.insert("city".to_string(), "Lisboa".to_string());
        b.insert("name".to_string(), "Acme".to_string());

        assert_eq!(fingerprint(&a, true), fingerprint(&b, true));
    }

    #[test]
    fn changes_when_a_field_changes() {
        let a = bag(&[("name", "Acme"), ("city", "Lisboa")]);
        let b = bag(&[("name", "Acme Corp"), ("city", "Lisboa")]);
        assert_ne!(fingerprint(&a, true), fingerprint(&b, true));
    }

    #[test]
    fn ignores_bookkeeping_fields() {
        let a = bag(&[("name", "Acme"), ("sys_updated_on", "2024-01-01")]);
        let b = bag(&[("name", "Acme"), ("sys_updated_on", "2024-06-30")]);
        let c = bag(&[("name", "Acme")]);
        assert_eq!(fingerprint(&a, true), fingerprint(&b, true));
        assert_eq!(fingerprint(&a, true), fingerprint(&c, true));
    }

    #[test]
    fn active_flag_changes_digest() {
        let a = bag(&[("name", "Acme")]);
        assert_ne!(fingerprint(&a, true), fingerprint(&a, false));
    }

    #[test]
    fn length_framing_prevents_concatenation_collisions() {
        let a = bag(&[("ab", "c")]);
        let b = bag(&[("a", "bc")]);
        assert_ne!(fingerprint(&a, true), fingerprint(&b, true));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let d = fingerprint(&bag(&[("name", "Acme")]), true);
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
