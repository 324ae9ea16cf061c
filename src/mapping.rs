//! Rewriting datastore file locations for the target repository.
//!
//! Exported datastore records carry paths from the source repository, often
//! absolute `file://` URIs into its filesystem. When importing into a
//! repository with a different layout, each path is rewritten by prefix
//! rules before the record is registered. Paths may carry a trailing
//! `#fragment` with reader directives; the fragment is detached before
//! matching and reattached unchanged afterwards.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w+]+://").unwrap());

/// Split a trailing `#fragment` off a path.
#[must_use]
pub fn split_fragment(path: &str) -> (&str, Option<&str>) {
    match path.split_once('#') {
        Some((bare, fragment)) => (bare, Some(fragment)),
        None => (path, None),
    }
}

/// One prefix rewrite rule: paths starting with `prefix` have it replaced by
/// `replacement`.
#[derive(Debug, Clone)]
pub struct PathRule {
    /// Prefix to match, typically an absolute URI prefix.
    pub prefix: String,
    /// Replacement, typically a path relative to the target datastore root.
    pub replacement: String,
}

/// The rewritten destination of one datastore record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedLocation {
    /// Target backing-store name.
    pub datastore_name: String,
    /// Rewritten path.
    pub path: String,
}

/// Maps source-repository datastore records to the target repository.
///
/// In identity mode nothing is rewritten, for imports into a repository that
/// shares the source filesystem. In relocation mode the first matching rule
/// applies; a path that is still an absolute `scheme://` URI after rewriting
/// has no defined location in the target repository and is an error.
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    rules: Vec<PathRule>,
    store_renames: HashMap<String, String>,
    relocate: bool,
}

impl PathMapper {
    /// Mapper that passes every record through unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Relocating mapper with no rules yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            relocate: true,
            ..Self::default()
        }
    }

    /// Builder-style rule addition. Rules are tried in insertion order and
    /// only the first match applies.
    #[must_use]
    pub fn with_rule(mut self, prefix: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.rules.push(PathRule {
            prefix: prefix.into(),
            replacement: replacement.into(),
        });
        self
    }

    /// Builder-style store rename, for records moving to a differently named
    /// backing store in the target repository.
    #[must_use]
    pub fn with_store_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.store_renames.insert(from.into(), to.into());
        self
    }

    /// Map one record's store name and path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrelocatablePath`] when relocation leaves an
    /// absolute `scheme://` URI behind.
    pub fn map(&self, datastore_name: &str, path: &str) -> Result<MappedLocation> {
        let datastore_name = self
            .store_renames
            .get(datastore_name)
            .map_or(datastore_name, String::as_str)
            .to_string();
        if !self.relocate {
            return Ok(MappedLocation {
                datastore_name,
                path: path.to_string(),
            });
        }

        let (bare, fragment) = split_fragment(path);
        let mut mapped = bare.to_string();
        for rule in &self.rules {
            if let Some(rest) = bare.strip_prefix(&rule.prefix) {
                mapped = format!("{}{rest}", rule.replacement);
                break;
            }
        }
        if SCHEME.is_match(&mapped) {
            return Err(Error::UnrelocatablePath(path.to_string()));
        }
        if let Some(fragment) = fragment {
            mapped = format!("{mapped}#{fragment}");
        }
        Ok(MappedLocation {
            datastore_name,
            path: mapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PathMapper {
        PathMapper::new().with_rule("file:///sdf/data/rubin/", "external/rubin/")
    }

    #[test]
    fn test_prefix_rewrite_preserves_fragment() {
        let mapped = mapper()
            .map("main", "file:///sdf/data/rubin/x/y.fits#unzip=1")
            .unwrap();
        assert_eq!(mapped.path, "external/rubin/x/y.fits#unzip=1");
        assert_eq!(mapped.datastore_name, "main");
    }

    #[test]
    fn test_relative_paths_pass_through() {
        let mapped = mapper().map("main", "raw/r/file.fits").unwrap();
        assert_eq!(mapped.path, "raw/r/file.fits");
    }

    #[test]
    fn test_unmatched_absolute_uri_is_an_error() {
        let err = mapper()
            .map("main", "s3://bucket/file.fits")
            .unwrap_err();
        assert!(matches!(err, Error::UnrelocatablePath(_)));
    }

    #[test]
    fn test_fragment_does_not_defeat_prefix_match() {
        // The fragment is detached before matching, so a rule ending exactly
        // at the file name still applies.
        let mapped = PathMapper::new()
            .with_rule("file:///data/a.fits", "local/a.fits")
            .map("main", "file:///data/a.fits#unzip")
            .unwrap();
        assert_eq!(mapped.path, "local/a.fits#unzip");
    }

    #[test]
    fn test_identity_mapper_keeps_absolute_uris() {
        let mapped = PathMapper::identity()
            .map("main", "file:///sdf/data/rubin/x.fits")
            .unwrap();
        assert_eq!(mapped.path, "file:///sdf/data/rubin/x.fits");
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let mapped = PathMapper::new()
            .with_rule("file:///a/", "first/")
            .with_rule("file:///a/", "second/")
            .map("main", "file:///a/x")
            .unwrap();
        assert_eq!(mapped.path, "first/x");
    }

    #[test]
    fn test_store_rename() {
        let mapped = PathMapper::identity()
            .with_store_rename("old_store", "new_store")
            .map("old_store", "x.fits")
            .unwrap();
        assert_eq!(mapped.datastore_name, "new_store");
    }
}
