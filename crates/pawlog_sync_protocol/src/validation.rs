//! Per-item validation of uploaded records.

use crate::category::LogFields;
use crate::error::ValidationError;
use crate::messages::WireRecord;
use chrono::{DateTime, Duration, Utc};

/// Maximum idempotency key length in characters.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// How far in the future an event timestamp may lie, to absorb clock skew.
pub const MAX_FUTURE_SKEW_HOURS: i64 = 24;

/// Maximum notes length in characters.
pub const MAX_NOTES_LEN: usize = 4000;

const MAX_UNIT_LEN: usize = 32;
const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Validates one record against the server clock `now`.
pub fn validate_record(record: &WireRecord, now: DateTime<Utc>) -> Result<(), ValidationError> {
    let key_len = record.idempotency_key.as_str().chars().count();
    if record.idempotency_key.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyKey);
    }
    if key_len > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ValidationError::KeyTooLong(key_len));
    }

    if record.timestamp > now + Duration::hours(MAX_FUTURE_SKEW_HOURS) {
        return Err(ValidationError::TimestampInFuture(record.timestamp.to_rfc3339()));
    }

    validate_fields(record, &record.fields)
}

fn validate_fields(record: &WireRecord, fields: &LogFields) -> Result<(), ValidationError> {
    let category = record.category;

    match fields.quantity {
        Some(q) if !q.is_finite() || q < 0.0 => return Err(ValidationError::InvalidQuantity),
        None if category.requires_quantity() => {
            return Err(ValidationError::MissingField {
                category,
                field: "quantity",
            })
        }
        _ => {}
    }

    match fields.severity {
        Some(s) if !(1..=5).contains(&s) => return Err(ValidationError::SeverityOutOfRange(s)),
        None if category.requires_severity() => {
            return Err(ValidationError::MissingField {
                category,
                field: "severity",
            })
        }
        _ => {}
    }

    if let Some(minutes) = fields.duration_minutes {
        if minutes > MAX_DURATION_MINUTES {
            return Err(ValidationError::DurationTooLong(minutes));
        }
    }

    let notes = fields.notes.as_deref().map(str::trim).unwrap_or_default();
    if notes.is_empty() && category.requires_notes() {
        return Err(ValidationError::MissingField {
            category,
            field: "notes",
        });
    }
    check_len("notes", fields.notes.as_deref(), MAX_NOTES_LEN)?;
    check_len("unit", fields.unit.as_deref(), MAX_UNIT_LEN)?;

    Ok(())
}

fn check_len(field: &'static str, value: Option<&str>, max: usize) -> Result<(), ValidationError> {
    let len = value.map_or(0, |v| v.chars().count());
    if len > max {
        return Err(ValidationError::TextTooLong { field, len, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, IdempotencyKey};
    use proptest::prelude::*;

    fn record(category: Category, fields: LogFields) -> WireRecord {
        WireRecord {
            idempotency_key: IdempotencyKey::new("k-1"),
            category,
            timestamp: Utc::now(),
            fields,
        }
    }

    #[test]
    fn plain_meal_is_valid() {
        let r = record(Category::Meal, LogFields::default().with_quantity(120.0, "g"));
        assert!(validate_record(&r, Utc::now()).is_ok());
    }

    #[test]
    fn category_requirements() {
        let now = Utc::now();
        assert_eq!(
            validate_record(&record(Category::Weight, LogFields::default()), now),
            Err(ValidationError::MissingField {
                category: Category::Weight,
                field: "quantity"
            })
        );
        assert!(matches!(
            validate_record(&record(Category::Symptom, LogFields::default()), now),
            Err(ValidationError::MissingField { field: "severity", .. })
        ));
        assert!(matches!(
            validate_record(
                &record(Category::Medication, LogFields::default().with_notes("   ")),
                now
            ),
            Err(ValidationError::MissingField { field: "notes", .. })
        ));
        assert!(validate_record(
            &record(Category::Symptom, LogFields::default().with_severity(3)),
            now
        )
        .is_ok());
    }

    #[test]
    fn range_checks() {
        let now = Utc::now();
        assert_eq!(
            validate_record(
                &record(Category::Symptom, LogFields::default().with_severity(9)),
                now
            ),
            Err(ValidationError::SeverityOutOfRange(9))
        );
        assert_eq!(
            validate_record(
                &record(Category::Meal, LogFields::default().with_quantity(-1.0, "g")),
                now
            ),
            Err(ValidationError::InvalidQuantity)
        );
        assert_eq!(
            validate_record(
                &record(Category::Meal, LogFields::default().with_quantity(f64::NAN, "g")),
                now
            ),
            Err(ValidationError::InvalidQuantity)
        );
        assert_eq!(
            validate_record(&record(Category::Walk, LogFields::default().with_duration(2000)), now),
            Err(ValidationError::DurationTooLong(2000))
        );
    }

    #[test]
    fn key_checks() {
        let now = Utc::now();
        let mut r = record(Category::Play, LogFields::default());
        r.idempotency_key = IdempotencyKey::new("");
        assert_eq!(validate_record(&r, now), Err(ValidationError::EmptyKey));

        r.idempotency_key = IdempotencyKey::new("x".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1));
        assert_eq!(
            validate_record(&r, now),
            Err(ValidationError::KeyTooLong(MAX_IDEMPOTENCY_KEY_LEN + 1))
        );
    }

    #[test]
    fn future_timestamps_within_skew_are_accepted() {
        let now = Utc::now();
        let mut r = record(Category::Potty, LogFields::default());
        r.timestamp = now + Duration::hours(2);
        assert!(validate_record(&r, now).is_ok());

        r.timestamp = now + Duration::hours(MAX_FUTURE_SKEW_HOURS + 1);
        assert!(matches!(
            validate_record(&r, now),
            Err(ValidationError::TimestampInFuture(_))
        ));
    }

    #[test]
    fn long_notes_are_rejected() {
        let r = record(
            Category::Note,
            LogFields::default().with_notes("a".repeat(MAX_NOTES_LEN + 1)),
        );
        assert!(matches!(
            validate_record(&r, Utc::now()),
            Err(ValidationError::TextTooLong { field: "notes", .. })
        ));
    }

    proptest! {
        #[test]
        fn severity_valid_iff_in_range(severity in any::<u8>()) {
            let r = record(Category::Symptom, LogFields::default().with_severity(severity));
            let result = validate_record(&r, Utc::now());
            prop_assert_eq!(result.is_ok(), (1..=5).contains(&severity));
        }

        #[test]
        fn non_negative_quantities_are_valid(quantity in 0.0f64..1.0e6) {
            let r = record(Category::Weight, LogFields::default().with_quantity(quantity, "kg"));
            prop_assert!(validate_record(&r, Utc::now()).is_ok());
        }
    }
}
