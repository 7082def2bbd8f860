//! Glob Pattern Matching
//!
//! Single matcher applied identically to both tiers so pattern eviction
//! never behaves differently depending on where a key currently lives.
//! `*` matches any run of characters, including the empty run; all other
//! characters match literally.

/// Match a key against a glob pattern with `*` wildcards
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();

    // No wildcard: exact match
    if segments.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;

    // First segment must anchor at the start
    let first = segments[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    // Middle segments match greedily left-to-right
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(idx) => rest = &rest[idx + segment.len()..],
            None => return false,
        }
    }

    // Last segment must anchor at the end
    let last = segments[segments.len() - 1];
    last.is_empty() || rest.ends_with(last)
}

// =============================================================================
// Tests
// =============================================================================
