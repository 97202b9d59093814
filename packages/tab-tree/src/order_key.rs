//! Fractional sibling keys (`treeOrder`).
//!
//! Keys are strings over a 62-symbol alphabet (`0-9`, `A-Z`, `a-z`) whose ASCII
//! order equals the digit order, so plain byte-wise comparison of two keys is
//! the same as comparing them as base-62 fractions `0.d1d2d3…`.
//!
//! A valid key is non-empty, uses only alphabet symbols and never ends with
//! `'0'`. The last rule guarantees there is always room below a key: without
//! it `"V"` and `"V0"` would be distinct strings with no key between them.
//!
//! When no symbol fits between two adjacent digits the generator extends the
//! key by one position instead of failing, so the key space never runs out.
//!
//! ```ignore
//! let a = key_between(None, None)?;          // "V"
//! let b = key_between(Some(&a), None)?;      // "l"
//! let c = key_between(Some(&a), Some(&b))?;  // "d"
//! ```

use thiserror::Error;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = ALPHABET.len();
const ZERO: u8 = b'0';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderKeyError {
    #[error("invalid order key {0:?}")]
    InvalidKey(String),

    #[error("order key bounds out of order: {low:?} >= {high:?}")]
    OutOfOrder { low: String, high: String },
}

/// Returns true when `key` can be used as a bound for generation.
pub fn is_valid_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    !bytes.is_empty() && bytes.iter().all(|b| digit(*b).is_some()) && bytes.last() != Some(&ZERO)
}

/// Generate a key sorting strictly between `low` and `high`.
///
/// `None` stands for −∞ (`low`) or +∞ (`high`). `key_between(None, None)`
/// always returns the same midpoint key.
pub fn key_between(low: Option<&str>, high: Option<&str>) -> Result<String, OrderKeyError> {
    validate_bounds(low, high)?;
    let low = low.map(str::as_bytes).unwrap_or_default();
    let key = midpoint(low, high.map(str::as_bytes));
    // Every byte comes from ALPHABET, which is ASCII.
    Ok(key.into_iter().map(char::from).collect())
}

/// Generate `n` strictly increasing keys between `low` and `high`.
///
/// Keys are produced by recursive bisection, so they are spread evenly over
/// the interval instead of piling up against one bound.
pub fn keys_between(
    low: Option<&str>,
    high: Option<&str>,
    n: usize,
) -> Result<Vec<String>, OrderKeyError> {
    validate_bounds(low, high)?;
    let mut out = Vec::with_capacity(n);
    bisect(low, high, n, &mut out)?;
    Ok(out)
}

/// Like [`key_between`], but degrades instead of failing when the bounds are
/// unusable (duplicate keys, corrupted records).
///
/// Falls back to "after `low`", then "before `high`", then the midpoint key.
pub fn key_between_lenient(low: Option<&str>, high: Option<&str>) -> String {
    let low = low.filter(|k| is_valid_key(k));
    let high = high.filter(|k| is_valid_key(k));
    key_between(low, high)
        .or_else(|_| key_between(low, None))
        .or_else(|_| key_between(None, high))
        .unwrap_or_else(|_| midpoint(&[], None).into_iter().map(char::from).collect())
}

/// Lenient counterpart of [`keys_between`], see [`key_between_lenient`].
pub fn keys_between_lenient(low: Option<&str>, high: Option<&str>, n: usize) -> Vec<String> {
    let low = low.filter(|k| is_valid_key(k));
    let high = high.filter(|k| is_valid_key(k));
    keys_between(low, high, n)
        .or_else(|_| keys_between(low, None, n))
        .or_else(|_| keys_between(None, high, n))
        .or_else(|_| keys_between(None, None, n))
        .unwrap_or_default()
}

/// True when `key` sorts strictly inside `(low, high)`.
pub fn is_between(key: &str, low: Option<&str>, high: Option<&str>) -> bool {
    low.map_or(true, |low| low < key) && high.map_or(true, |high| key < high)
}

fn bisect(
    low: Option<&str>,
    high: Option<&str>,
    n: usize,
    out: &mut Vec<String>,
) -> Result<(), OrderKeyError> {
    if n == 0 {
        return Ok(());
    }
    let mid = key_between(low, high)?;
    let left = (n - 1) / 2;
    bisect(low, Some(&mid), left, out)?;
    out.push(mid.clone());
    bisect(Some(&mid), high, n - 1 - left, out)
}

fn validate_bounds(low: Option<&str>, high: Option<&str>) -> Result<(), OrderKeyError> {
    for key in [low, high].into_iter().flatten() {
        if !is_valid_key(key) {
            return Err(OrderKeyError::InvalidKey(key.to_string()));
        }
    }
    if let (Some(low), Some(high)) = (low, high) {
        if low >= high {
            return Err(OrderKeyError::OutOfOrder {
                low: low.to_string(),
                high: high.to_string(),
            });
        }
    }
    Ok(())
}

fn digit(symbol: u8) -> Option<usize> {
    match symbol {
        b'0'..=b'9' => Some((symbol - b'0') as usize),
        b'A'..=b'Z' => Some((symbol - b'A') as usize + 10),
        b'a'..=b'z' => Some((symbol - b'a') as usize + 36),
        _ => None,
    }
}

fn value(symbol: u8) -> usize {
    digit(symbol).unwrap_or(0)
}

/// Midpoint of two validated digit strings, `low < high`. An empty `low` is
/// zero; a missing `high` is one.
fn midpoint(low: &[u8], high: Option<&[u8]>) -> Vec<u8> {
    if let Some(high) = high {
        // Shared prefix, reading `low` as if padded with zeros.
        let mut n = 0;
        while n < high.len() && low.get(n).copied().unwrap_or(ZERO) == high[n] {
            n += 1;
        }
        if n > 0 {
            let rest = low.get(n..).unwrap_or_default();
            let mut out = high[..n].to_vec();
            out.extend(midpoint(rest, Some(&high[n..])));
            return out;
        }
    }

    let low_digit = low.first().map_or(0, |&b| value(b));
    let high_digit = high.map_or(BASE, |h| value(h[0]));

    if high_digit - low_digit > 1 {
        let mid = (low_digit + high_digit + 1) / 2;
        return vec![ALPHABET[mid]];
    }

    match high {
        // The high bound's first digit alone already sits inside the interval.
        Some(high) if high.len() > 1 => vec![high[0]],
        _ => {
            let mut out = vec![ALPHABET[low_digit]];
            out.extend(midpoint(low.get(1..).unwrap_or_default(), None));
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_of_open_interval_is_fixed() {
        assert_eq!(key_between(None, None).unwrap(), "V");
        assert_eq!(key_between(None, None).unwrap(), key_between(None, None).unwrap());
    }

    #[test]
    fn test_key_between_is_strictly_inside() {
        let cases = [
            (Some("V"), None),
            (None, Some("V")),
            (Some("V"), Some("W")),
            (Some("V"), Some("V1")),
            (Some("a"), Some("a01")),
            (None, Some("01")),
            (Some("zz"), None),
            (Some("0V"), Some("1")),
        ];
        for (low, high) in cases {
            let key = key_between(low, high).unwrap();
            assert!(is_valid_key(&key), "{key:?} should be valid");
            assert!(
                is_between(&key, low, high),
                "{key:?} should sit between {low:?} and {high:?}"
            );
        }
    }

    #[test]
    fn test_adjacent_digits_extend_key_length() {
        let key = key_between(Some("V"), Some("W")).unwrap();
        assert!(key.len() > 1);
        assert!(key.starts_with('V'));
    }

    #[test]
    fn test_repeated_insertion_at_same_boundary() {
        let high = key_between(None, None).unwrap();

        // Always insert right after the same low bound.
        let mut upper = high.clone();
        let mut seen = vec![upper.clone()];
        for _ in 0..50 {
            let key = key_between(Some("A"), Some(&upper)).unwrap();
            assert!("A" < key.as_str() && key < upper);
            assert!(!seen.contains(&key));
            seen.push(key.clone());
            upper = key;
        }

        // Always append at the end.
        let mut lower = high;
        for _ in 0..50 {
            let key = key_between(Some(&lower), None).unwrap();
            assert!(key > lower);
            lower = key;
        }
    }

    #[test]
    fn test_keys_between_are_increasing_and_bounded() {
        let keys = keys_between(Some("A"), Some("B"), 20).unwrap();
        assert_eq!(keys.len(), 20);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| "A" < k.as_str() && k.as_str() < "B"));

        let open = keys_between(None, None, 5).unwrap();
        assert_eq!(open.len(), 5);
        assert!(open.windows(2).all(|w| w[0] < w[1]));
        assert!(open.contains(&"V".to_string()));
    }

    #[test]
    fn test_keys_between_spreads_evenly() {
        // Bisection keeps keys short instead of growing one symbol per key.
        let keys = keys_between(None, None, 30).unwrap();
        assert!(keys.iter().all(|k| k.len() <= 3), "{keys:?}");
    }

    #[test]
    fn test_keys_between_zero_is_empty() {
        assert!(keys_between(Some("A"), None, 0).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_bounds_are_rejected() {
        assert_eq!(
            key_between(Some("V0"), None),
            Err(OrderKeyError::InvalidKey("V0".to_string()))
        );
        assert!(matches!(
            key_between(Some("b"), Some("a")),
            Err(OrderKeyError::OutOfOrder { .. })
        ));
        assert!(matches!(
            key_between(Some("a"), Some("a")),
            Err(OrderKeyError::OutOfOrder { .. })
        ));
        assert!(key_between(Some("a-b"), None).is_err());
        assert!(key_between(Some(""), None).is_err());
    }

    #[test]
    fn test_lenient_generation_survives_duplicates() {
        let key = key_between_lenient(Some("a"), Some("a"));
        assert!(key.as_str() > "a");

        let keys = keys_between_lenient(Some("m"), Some("c"), 3);
        assert_eq!(keys.len(), 3);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let key = key_between_lenient(Some("bad key"), Some("c"));
        assert!(key.as_str() < "c");
    }
}
