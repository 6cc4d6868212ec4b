//! Property tests for the core primitives.

use admit_core::{ApplicationId, ApplicationNumber, FieldErrors, Role, Timestamp};
use proptest::prelude::*;
use uuid::Uuid;

proptest! {
    /// Every derived application number parses back and embeds its year.
    #[test]
    fn derived_numbers_are_well_formed(bytes in any::<[u8; 16]>(), year in 1000i32..=9999) {
        let id = ApplicationId::from_uuid(Uuid::from_bytes(bytes));
        let number = ApplicationNumber::derive(year, &id);
        prop_assert!(ApplicationNumber::parse(number.as_str()).is_ok());
        let year_prefix = format!("APP{year}");
        prop_assert!(number.as_str().starts_with(&year_prefix));
    }

    /// Arbitrary strings never panic the number parser.
    #[test]
    fn number_parser_is_total(raw in "\\PC{0,20}") {
        let _ = ApplicationNumber::parse(raw);
    }

    /// The joined rendering carries one segment per recorded message.
    #[test]
    fn joined_has_one_segment_per_message(
        entries in prop::collection::vec(("[a-z_]{1,12}", "[A-Za-z ]{1,20}"), 1..10)
    ) {
        let mut errors = FieldErrors::new();
        for (field, message) in &entries {
            errors.add(field.as_str(), message.as_str());
        }
        prop_assert_eq!(errors.joined().split("; ").count(), entries.len());
    }

    /// Whole-second timestamps survive a JSON round-trip unchanged.
    #[test]
    fn timestamp_json_roundtrip(secs in 0i64..4_102_444_800) {
        let dt = chrono::DateTime::from_timestamp(secs, 0).unwrap();
        let ts = Timestamp::from_utc(dt);
        let json = serde_json::to_string(&ts).unwrap();
        prop_assert_eq!(serde_json::from_str::<Timestamp>(&json).unwrap(), ts);
    }
}

#[test]
fn roles_parse_from_display() {
    for role in [Role::Applicant, Role::AdmissionOfficer, Role::Admin] {
        assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
    }
}
