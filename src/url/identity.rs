use sha2::{Digest, Sha256};

/// Upper bound (exclusive) of derived identifiers
pub const ID_MODULUS: u128 = 1_000_000_000_000_000_000;

/// Derives a stable numeric identifier from a string
///
/// The SHA-256 digest of `s` is read as a big-endian unsigned integer and
/// reduced modulo 10^18, so the result always fits in an `i64` column and is
/// identical across processes and runs.
///
/// # Examples
///
/// ```
/// use hotel_harvest::hash_id;
///
/// assert_eq!(hash_id("abc"), 985_829_716_817_089_965);
/// ```
pub fn hash_id(s: &str) -> i64 {
    let digest = Sha256::digest(s.as_bytes());

    // Horner's rule over the digest bytes keeps the accumulator below 2^72.
    let reduced = digest
        .iter()
        .fold(0u128, |acc, byte| (acc * 256 + u128::from(*byte)) % ID_MODULUS);

    reduced as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(hash_id("abc"), 985_829_716_817_089_965);
        assert_eq!(hash_id(""), 397_001_115_665_086_549);
        assert_eq!(
            hash_id("https://www.tripadvisor.com/Hotel_Review-g187791-d123-Reviews-Foo.html"),
            931_169_133_712_657_380
        );
    }

    #[test]
    fn test_stable_across_calls() {
        let url = "https://www.example.com/Hotel_Review-d42.html";
        assert_eq!(hash_id(url), hash_id(url));
    }

    #[test]
    fn test_range() {
        for s in ["a", "b", "https://example.com/x", "ß∂ƒ"] {
            let id = hash_id(s);
            assert!(id >= 0);
            assert!((id as u128) < ID_MODULUS);
        }
    }

    #[test]
    fn test_distinct_inputs_differ() {
        assert_ne!(hash_id("https://example.com/a"), hash_id("https://example.com/b"));
    }
}
