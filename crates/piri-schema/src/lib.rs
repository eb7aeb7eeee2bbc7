//! Typed schema descriptors for the Config-Registry (spec §3 "Schema").
//!
//! A [`Schema`] is a polymorphic descriptor over the value kinds the
//! registry understands: duration, signed integer, and unsigned integer.
//! Duration and unsigned-integer bounds follow the spec's unbounded
//! convention — a bound of zero means "unbounded on that side" — since
//! both types have a natural zero floor; signed-integer bounds are taken
//! literally, since zero is an ordinary value for a signed range.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("cannot parse {value:?} as {expected}{}", cause.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
    Parse { value: String, expected: String, cause: Option<String> },

    #[error("type mismatch: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("value {value} out of range [{min}, {max}]")]
    Range { value: String, min: String, max: String },
}

/// A value that has passed a schema's `parse_and_validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedValue {
    Duration(Duration),
    Integer(i64),
    UnsignedInteger(u64),
}

impl TypedValue {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            TypedValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TypedValue::UnsignedInteger(u) => Some(*u),
            _ => None,
        }
    }

    /// Renders the value the way the persister writes it back to TOML:
    /// durations as their canonical string form, integers natively.
    pub fn to_wire_string(&self) -> String {
        match self {
            TypedValue::Duration(d) => piri_duration::format_canonical(*d),
            TypedValue::Integer(i) => i.to_string(),
            TypedValue::UnsignedInteger(u) => u.to_string(),
        }
    }
}

/// A polymorphic schema descriptor. `min`/`max` of `0` on a `Duration` or
/// `UnsignedInteger` bound means "unbounded on that side" (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Duration { min: Duration, max: Duration },
    Integer { min: i64, max: i64 },
    UnsignedInteger { min: u64, max: u64 },
}

impl Schema {
    pub fn duration(min: Duration, max: Duration) -> Self {
        Schema::Duration { min, max }
    }

    pub fn integer(min: i64, max: i64) -> Self {
        Schema::Integer { min, max }
    }

    pub fn unsigned_integer(min: u64, max: u64) -> Self {
        Schema::UnsignedInteger { min, max }
    }

    /// A human-readable description of the type and its bounds, e.g.
    /// `"duration [1s..1h]"`, `"uint [0..10]"`, `"int [-5..5]"`.
    pub fn type_description(&self) -> String {
        match self {
            Schema::Duration { min, max } => format!(
                "duration [{}..{}]",
                if min.is_zero() { "0s".to_string() } else { piri_duration::format_canonical(*min) },
                if max.is_zero() { "unbounded".to_string() } else { piri_duration::format_canonical(*max) },
            ),
            Schema::Integer { min, max } => format!("int [{}..{}]", min, max),
            Schema::UnsignedInteger { min, max } => format!(
                "uint [{}..{}]",
                min,
                if *max == 0 { "unbounded".to_string() } else { max.to_string() },
            ),
        }
    }

    /// Parses `raw` according to this schema's type, then validates it
    /// falls within the configured bounds.
    pub fn parse_and_validate(&self, raw: &str) -> Result<TypedValue, SchemaError> {
        match self {
            Schema::Duration { min, max } => {
                let parsed = piri_duration::parse(raw).map_err(|e| SchemaError::Parse {
                    value: raw.to_string(),
                    expected: "duration".to_string(),
                    cause: Some(e.to_string()),
                })?;
                let lower = *min;
                let upper = if max.is_zero() { Duration::MAX } else { *max };
                if parsed < lower || parsed > upper {
                    return Err(SchemaError::Range {
                        value: piri_duration::format_canonical(parsed),
                        min: piri_duration::format_canonical(lower),
                        max: self.type_description(),
                    });
                }
                Ok(TypedValue::Duration(parsed))
            }
            Schema::Integer { min, max } => {
                let parsed = raw.trim().parse::<i64>().map_err(|e| SchemaError::Parse {
                    value: raw.to_string(),
                    expected: "int".to_string(),
                    cause: Some(e.to_string()),
                })?;
                if parsed < *min || parsed > *max {
                    return Err(SchemaError::Range {
                        value: parsed.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(TypedValue::Integer(parsed))
            }
            Schema::UnsignedInteger { min, max } => {
                let parsed = raw.trim().parse::<u64>().map_err(|e| SchemaError::Parse {
                    value: raw.to_string(),
                    expected: "uint".to_string(),
                    cause: Some(e.to_string()),
                })?;
                let upper = if *max == 0 { u64::MAX } else { *max };
                if parsed < *min || parsed > upper {
                    return Err(SchemaError::Range {
                        value: parsed.to_string(),
                        min: min.to_string(),
                        max: self.type_description(),
                    });
                }
                Ok(TypedValue::UnsignedInteger(parsed))
            }
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_schema_parses_within_bounds() {
        let schema = Schema::duration(Duration::from_secs(1), Duration::from_secs(3600));
        let value = schema.parse_and_validate("5m").unwrap();
        assert_eq!(value.as_duration(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn duration_schema_rejects_out_of_range() {
        let schema = Schema::duration(Duration::from_secs(1), Duration::from_secs(3600));
        let err = schema.parse_and_validate("2h").unwrap_err();
        assert!(matches!(err, SchemaError::Range { .. }));
    }

    #[test]
    fn duration_schema_zero_max_is_unbounded() {
        let schema = Schema::duration(Duration::from_secs(1), Duration::ZERO);
        assert!(schema.parse_and_validate("1000h").is_ok());
    }

    #[test]
    fn duration_schema_rejects_garbage() {
        let schema = Schema::duration(Duration::ZERO, Duration::ZERO);
        assert!(matches!(
            schema.parse_and_validate("not-a-duration"),
            Err(SchemaError::Parse { .. })
        ));
    }

    #[test]
    fn uint_schema_parses_within_bounds() {
        let schema = Schema::unsigned_integer(0, 10);
        let value = schema.parse_and_validate("5").unwrap();
        assert_eq!(value.as_u64(), Some(5));
    }

    #[test]
    fn uint_schema_rejects_out_of_range() {
        let schema = Schema::unsigned_integer(0, 10);
        assert!(matches!(
            schema.parse_and_validate("99"),
            Err(SchemaError::Range { .. })
        ));
    }

    #[test]
    fn uint_schema_rejects_negative() {
        let schema = Schema::unsigned_integer(0, 10);
        assert!(matches!(
            schema.parse_and_validate("-1"),
            Err(SchemaError::Parse { .. })
        ));
    }

    #[test]
    fn uint_schema_zero_max_is_unbounded() {
        let schema = Schema::unsigned_integer(0, 0);
        assert!(schema.parse_and_validate("9999999").is_ok());
    }

    #[test]
    fn int_schema_accepts_negative_within_bounds() {
        let schema = Schema::integer(-5, 5);
        let value = schema.parse_and_validate("-3").unwrap();
        assert_eq!(value.as_i64(), Some(-3));
    }

    #[test]
    fn int_schema_zero_bound_is_literal_not_unbounded() {
        let schema = Schema::integer(0, 5);
        assert!(matches!(
            schema.parse_and_validate("-1"),
            Err(SchemaError::Range { .. })
        ));
    }

    #[test]
    fn parse_and_validate_is_idempotent_on_its_own_output() {
        let schema = Schema::duration(Duration::from_secs(1), Duration::from_secs(3600));
        let first = schema.parse_and_validate("5m").unwrap();
        let canonical = first.to_wire_string();
        let second = schema.parse_and_validate(&canonical).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn type_description_formats() {
        assert_eq!(
            Schema::duration(Duration::from_secs(1), Duration::from_secs(3600)).type_description(),
            "duration [1s..1h0m0s]"
        );
        assert_eq!(Schema::unsigned_integer(0, 10).type_description(), "uint [0..10]");
        assert_eq!(Schema::integer(-5, 5).type_description(), "int [-5..5]");
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn uint_in_range_always_parses(v in 0u64..1000) {
                let schema = Schema::unsigned_integer(0, 1000);
                prop_assert!(schema.parse_and_validate(&v.to_string()).is_ok());
            }

            #[test]
            fn uint_out_of_range_always_rejected(v in 1001u64..u64::MAX) {
                let schema = Schema::unsigned_integer(0, 1000);
                prop_assert!(schema.parse_and_validate(&v.to_string()).is_err());
            }
        }
    }
}
