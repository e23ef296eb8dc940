//! `bucket/key` addressing for stored objects.
//!
//! Accepts both the bare `bucket/key` form and the scheme-prefixed
//! `s3://bucket/key` form (scheme matched case-insensitively).

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Scheme prefix rendered by [`ObjectPath::full_path`].
pub const SCHEME: &str = "s3://";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("no bucket separator in object path `{0}`")]
    NoBucketSeparator(String),
    #[error("no key in object path `{0}`")]
    NoKey(String),
}

/// A full path to a bucket object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    pub bucket: String,
    pub key: String,
}

impl ObjectPath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `[s3://]bucket/key`.
    ///
    /// Splits on the first `/`. No character-set checks are made on either
    /// half; backends validate names when they see them.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let rest = match raw.get(..SCHEME.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => &raw[SCHEME.len()..],
            _ => raw,
        };

        let idx = rest
            .find('/')
            .ok_or_else(|| PathError::NoBucketSeparator(raw.to_string()))?;
        if idx + 1 >= rest.len() {
            return Err(PathError::NoKey(raw.to_string()));
        }

        Ok(Self {
            bucket: rest[..idx].to_string(),
            key: rest[idx + 1..].to_string(),
        })
    }

    /// `bucket/key`
    pub fn path(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }

    /// `s3://bucket/key`
    pub fn full_path(&self) -> String {
        format!("{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_bare_path() {
        let p = ObjectPath::parse("photos/2025/img.jpg").unwrap();
        assert_eq!(p.bucket, "photos");
        assert_eq!(p.key, "2025/img.jpg");
        assert_eq!(p.path(), "photos/2025/img.jpg");
        assert_eq!(p.full_path(), "s3://photos/2025/img.jpg");
    }

    #[test]
    fn strips_scheme_case_insensitively() {
        let p = ObjectPath::parse("S3://bucket/key").unwrap();
        assert_eq!(p, ObjectPath::new("bucket", "key"));

        let p: ObjectPath = "s3://bucket/a/b".parse().unwrap();
        assert_eq!(p.to_string(), "bucket/a/b");
    }

    #[test]
    fn missing_separator_is_reported() {
        assert_eq!(
            ObjectPath::parse("bucketonly"),
            Err(PathError::NoBucketSeparator("bucketonly".into()))
        );
        assert!(matches!(
            ObjectPath::parse("s3://bucketonly"),
            Err(PathError::NoBucketSeparator(_))
        ));
    }

    #[test]
    fn trailing_separator_has_no_key() {
        assert_eq!(
            ObjectPath::parse("bucket/"),
            Err(PathError::NoKey("bucket/".into()))
        );
    }

    #[test]
    fn short_input_is_not_mistaken_for_scheme() {
        assert!(matches!(
            ObjectPath::parse("s3:"),
            Err(PathError::NoBucketSeparator(_))
        ));
        assert_eq!(ObjectPath::parse("s3/x").unwrap(), ObjectPath::new("s3", "x"));
    }

    proptest! {
        #[test]
        fn parse_then_path_round_trips(
            bucket in "[a-z0-9][a-z0-9.-]{0,20}",
            key in "[A-Za-z0-9_./-]{1,40}",
        ) {
            let raw = format!("{bucket}/{key}");
            let parsed = ObjectPath::parse(&raw).unwrap();
            prop_assert_eq!(parsed.path(), raw.clone());

            let prefixed = ObjectPath::parse(&format!("s3://{raw}")).unwrap();
            prop_assert_eq!(prefixed.path(), raw);
        }
    }
}
