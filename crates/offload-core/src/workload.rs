//! Synthetic CPU and memory workloads served next to the Fibonacci
//! endpoints.
//!
//! Both functions are blocking; callers run them off the async runtime.

use crate::{Error, Result, dispatch::parse_param};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One generated object of [`json_round_trip`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JsonElement {
    pub id: u64,
    pub value: f64,
}

/// Parses the multiplier of [`memory_intensive`].
///
/// # Errors
///
/// Returns [`Error::BadRequest`] for non-numeric or negative values.
pub fn parse_memory_multiplier(raw: &str) -> Result<u64> {
    let multiplier = parse_param(raw)?;
    u64::try_from(multiplier)
        .map_err(|_| Error::bad_request(format!("multiplier `{multiplier}` is negative")))
}

/// Resolves the optional multiplier of [`json_round_trip`].
///
/// Anything that is not a non-zero integer falls back to `1`.
pub fn json_multiplier(raw: Option<&str>) -> i64 {
    raw.and_then(|raw| parse_param(raw).ok())
        .filter(|&multiplier| multiplier != 0)
        .unwrap_or(1)
}

/// Fills `multiplier * per_unit` random `f64`s, sorts them ascending and
/// returns their sum.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] if the element count overflows or cannot
/// be allocated.
pub fn memory_intensive(multiplier: u64, per_unit: usize) -> Result<f64> {
    let len = element_count(multiplier, per_unit)?;

    let mut values: Vec<f64> = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|e| Error::bad_request(format!("cannot allocate {len} elements: {e}")))?;

    let mut rng = rand::rng();
    values.extend((0..len).map(|_| rng.random::<f64>()));
    values.sort_unstable_by(f64::total_cmp);

    tracing::trace!("Sorted {len} random elements");
    Ok(values.iter().sum())
}

/// Generates `multiplier * per_unit` objects `{id, value}`, serializes them
/// to a JSON string and parses that string back.
///
/// Negative multipliers produce an empty array.
///
/// # Errors
///
/// - [`Error::BadRequest`] if the element count overflows.
/// - [`Error::Io`] if serialization fails.
pub fn json_round_trip(multiplier: i64, per_unit: usize) -> Result<Vec<JsonElement>> {
    let len = match u64::try_from(multiplier) {
        Ok(multiplier) => element_count(multiplier, per_unit)?,
        Err(_) => 0,
    };

    let mut rng = rand::rng();
    let generated: Vec<JsonElement> = (0..len as u64)
        .map(|id| JsonElement {
            id,
            value: rng.random(),
        })
        .collect();

    let encoded = serde_json::to_string(&generated).map_err(std::io::Error::from)?;
    let decoded = serde_json::from_str(&encoded).map_err(std::io::Error::from)?;

    tracing::trace!("Round-tripped {len} elements through {} bytes", encoded.len());
    Ok(decoded)
}

fn element_count(multiplier: u64, per_unit: usize) -> Result<usize> {
    usize::try_from(multiplier)
        .ok()
        .and_then(|multiplier| multiplier.checked_mul(per_unit))
        .ok_or_else(|| {
            Error::bad_request(format!(
                "{multiplier} x {per_unit} elements exceeds the addressable size"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_multiplier_rejects_negative_and_garbage() {
        assert_eq!(parse_memory_multiplier("3").unwrap(), 3);
        assert_eq!(parse_memory_multiplier("0").unwrap(), 0);
        assert!(matches!(
            parse_memory_multiplier("-1"),
            Err(Error::BadRequest { .. })
        ));
        assert!(matches!(
            parse_memory_multiplier("lots"),
            Err(Error::BadRequest { .. })
        ));
    }

    #[test]
    fn json_multiplier_defaults_to_one() {
        assert_eq!(json_multiplier(None), 1);
        assert_eq!(json_multiplier(Some("0")), 1);
        assert_eq!(json_multiplier(Some("abc")), 1);
        assert_eq!(json_multiplier(Some("4")), 4);
        assert_eq!(json_multiplier(Some("-2")), -2);
    }

    #[test]
    fn memory_intensive_sums_unit_interval_samples() {
        let sum = memory_intensive(2, 500).unwrap();
        assert!(sum > 0.0 && sum < 1000.0, "sum {sum} out of range");
        assert_eq!(memory_intensive(0, 500).unwrap(), 0.0);
    }

    #[test]
    fn memory_intensive_rejects_overflow() {
        assert!(matches!(
            memory_intensive(u64::MAX, 2),
            Err(Error::BadRequest { .. })
        ));
    }

    #[test]
    fn json_round_trip_preserves_elements() {
        let elements = json_round_trip(3, 10).unwrap();
        assert_eq!(elements.len(), 30);
        for (i, element) in elements.iter().enumerate() {
            assert_eq!(element.id, i as u64);
            assert!((0.0..1.0).contains(&element.value));
        }
    }

    #[test]
    fn json_round_trip_negative_multiplier_is_empty() {
        assert!(json_round_trip(-5, 10).unwrap().is_empty());
    }
}
