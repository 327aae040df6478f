//! Pure validation helpers for transferred artifacts.
//!
//! No side effects; callable from any worker without synchronization.

/// Exact byte-length equality. No tolerance.
pub fn size_matches(expected: u64, observed: u64) -> bool {
    expected == observed
}

/// Exact checksum equality, compared case-insensitively since backends differ
/// in hex digest casing.
pub fn checksum_matches(expected: &str, observed: &str) -> bool {
    expected.eq_ignore_ascii_case(observed)
}
