//! Core type definitions

use std::collections::HashMap;

use crate::error::{Result, SolidError};

/// Type alias for tags attached to a model entry
pub type Tags = Vec<String>;

/// Version numbers registered under each tag, in append order
pub type TagIndex = HashMap<String, Vec<usize>>;

/// Normalize a user supplied identifier.
///
/// Whitespace runs collapse into a single hyphen, leading and trailing
/// whitespace is dropped, and the result is lower-cased. Run names, metric
/// names and experiment ids all go through this before being used as keys.
pub fn normalize_id(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Validate a caller supplied tag list.
///
/// Blank tags are rejected. Repeats collapse onto their first occurrence so
/// one request never indexes the same version twice under a tag.
pub fn distinct_tags(tags: &[String]) -> Result<Tags> {
    let mut out: Tags = Vec::with_capacity(tags.len());
    for tag in tags {
        if tag.trim().is_empty() {
            return Err(SolidError::BadRequest("tag cannot be empty".to_string()));
        }
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_id("  Linear Regression 1 "), "linear-regression-1");
        assert_eq!(normalize_id("M  S E"), "m-s-e");
        assert_eq!(normalize_id("a\tb\nc"), "a-b-c");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["  Linear Regression 1 ", "mse", "", "ALREADY-normal", " x  y "] {
            let once = normalize_id(raw);
            assert_eq!(normalize_id(&once), once);
        }
    }

    #[test]
    fn test_distinct_tags() {
        let tags = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(distinct_tags(&tags(&["prod", "v2", "prod"])).unwrap(), tags(&["prod", "v2"]));
        assert!(distinct_tags(&[]).unwrap().is_empty());
        assert!(matches!(distinct_tags(&tags(&["prod", " "])), Err(SolidError::BadRequest(_))));
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_id("   "), "");
    }
}
