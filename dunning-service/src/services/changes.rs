//! Change detection for synced debtor records.
//!
//! The digest covers a fixed, ordered subset of semantic fields so that
//! identical content always hashes identically, regardless of how the
//! upstream payload was shaped. Volatile fields (timestamps, raw payload)
//! are deliberately excluded.

use sha2::{Digest, Sha256};

use crate::models::{ChangeOutcome, NormalizedDebtor};

/// Keeps adjacent fields from colliding ("ab","c" vs "a","bc").
const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// Stable hex digest over the debtor's semantic fields.
pub fn debtor_digest(debtor: &NormalizedDebtor) -> String {
    let fields: [Option<&str>; 11] = [
        Some(debtor.name.as_str()),
        debtor.email.as_deref(),
        debtor.contact_person.as_deref(),
        debtor.street.as_deref(),
        debtor.zip_code.as_deref(),
        debtor.city.as_deref(),
        debtor.country.as_deref(),
        debtor.vat_id.as_deref(),
        debtor.tax_number.as_deref(),
        debtor.iban.as_deref(),
        debtor.bic.as_deref(),
    ];

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.unwrap_or(""));
        hasher.update(FIELD_SEPARATOR);
    }
    hex::encode(hasher.finalize())
}

/// Classify a freshly computed digest against the stored one.
pub fn classify(digest: &str, stored: Option<&str>) -> ChangeOutcome {
    match stored {
        None => ChangeOutcome::FirstSeen,
        Some(previous) if previous == digest => ChangeOutcome::Unchanged,
        Some(_) => ChangeOutcome::Updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debtor() -> NormalizedDebtor {
        NormalizedDebtor {
            posting_account_number: 70001,
            name: "Musterfirma GmbH".to_string(),
            email: Some("buchhaltung@musterfirma.de".to_string()),
            city: Some("Berlin".to_string()),
            iban: Some("DE02120300000000202051".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn identical_content_yields_identical_digest() {
        assert_eq!(debtor_digest(&debtor()), debtor_digest(&debtor()));
    }

    #[test]
    fn semantic_change_changes_the_digest() {
        let base = debtor_digest(&debtor());

        let mut renamed = debtor();
        renamed.name = "Musterfirma AG".to_string();
        assert_ne!(debtor_digest(&renamed), base);

        let mut moved = debtor();
        moved.city = Some("Hamburg".to_string());
        assert_ne!(debtor_digest(&moved), base);
    }

    #[test]
    fn volatile_fields_do_not_affect_the_digest() {
        // The posting-account number is identity, not content: renumbering
        // alone must not register as a change.
        let mut renumbered = debtor();
        renumbered.posting_account_number = 80007;
        assert_eq!(debtor_digest(&renumbered), debtor_digest(&debtor()));
    }

    #[test]
    fn adjacent_fields_do_not_collide() {
        let mut a = debtor();
        a.email = None;
        a.contact_person = Some("x".to_string());

        let mut b = debtor();
        b.email = Some("x".to_string());
        b.contact_person = None;

        assert_ne!(debtor_digest(&a), debtor_digest(&b));
    }

    #[test]
    fn first_sync_is_first_seen_not_updated() {
        let digest = debtor_digest(&debtor());
        assert_eq!(classify(&digest, None), ChangeOutcome::FirstSeen);
        assert_eq!(
            classify(&digest, Some(digest.as_str())),
            ChangeOutcome::Unchanged
        );
        assert_eq!(classify(&digest, Some("stale")), ChangeOutcome::Updated);
    }
}
