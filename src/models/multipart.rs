//! Multipart copy values and the session/part rows of the local store.

use crate::path::ObjectPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Highest part number a multipart session accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// One byte window of a multipart copy. `end` is inclusive.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based.
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl PartRange {
    /// Number of bytes covered; never zero.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the copy-source range header, `bytes=<start>-<end>`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for PartRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part {} ({})", self.part_number, self.header_value())
    }
}

/// Split `[0, size)` into contiguous windows of `chunk_size` bytes.
///
/// The last window is truncated to `size - 1`. An empty source yields no
/// parts. `chunk_size` must be non-zero.
pub fn partition(size: u64, chunk_size: u64) -> Vec<PartRange> {
    assert!(chunk_size > 0, "chunk size must be non-zero");

    let mut parts = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut start = 0u64;
    let mut part_number = 1u32;
    while start < size {
        let end = start.saturating_add(chunk_size - 1).min(size - 1);
        parts.push(PartRange {
            part_number,
            start,
            end,
        });
        start = end + 1;
        part_number += 1;
    }
    parts
}

/// A part whose copy succeeded, as submitted to the commit step.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// An open multipart session on a destination object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartSession {
    pub upload_id: String,
    pub destination: ObjectPath,
}

/// Session row in the local store.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartUpload {
    pub id: Uuid,

    pub bucket_id: Uuid,

    /// Destination key.
    pub key: String,

    /// Identifier handed back to the caller.
    pub upload_id: String,

    pub initiated_at: DateTime<Utc>,

    pub completed: bool,
}

/// Staged part row in the local store.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartPart {
    pub id: Uuid,

    /// References `MultipartUpload::id`.
    pub upload_id: Uuid,

    pub part_number: i64,

    pub size_bytes: i64,

    pub etag: String,

    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn partitions_350_mib_into_100_mib_chunks() {
        let parts = partition(350 * MIB, 100 * MIB);
        let bounds: Vec<(u32, u64, u64)> = parts
            .iter()
            .map(|p| (p.part_number, p.start, p.end))
            .collect();
        assert_eq!(
            bounds,
            vec![
                (1, 0, 104_857_599),
                (2, 104_857_600, 209_715_199),
                (3, 209_715_200, 314_572_799),
                (4, 314_572_800, 367_001_599),
            ]
        );
        assert_eq!(parts[3].header_value(), "bytes=314572800-367001599");
    }

    #[test]
    fn exact_multiple_has_no_trailing_part() {
        let parts = partition(300, 100);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].end, 299);
    }

    #[test]
    fn empty_source_has_no_parts() {
        assert!(partition(0, 100).is_empty());
    }

    #[test]
    fn one_byte_source() {
        assert_eq!(
            partition(1, 100),
            vec![PartRange {
                part_number: 1,
                start: 0,
                end: 0
            }]
        );
    }

    proptest! {
        #[test]
        fn ranges_are_contiguous_and_cover_source(
            size in 1u64..10_000_000,
            chunk in 1_000u64..2_000_000,
        ) {
            let parts = partition(size, chunk);
            prop_assert_eq!(parts.len() as u64, size.div_ceil(chunk));
            prop_assert_eq!(parts[0].start, 0);
            prop_assert_eq!(parts.last().unwrap().end, size - 1);

            for (i, pair) in parts.windows(2).enumerate() {
                prop_assert_eq!(pair[0].part_number, i as u32 + 1);
                prop_assert_eq!(pair[1].part_number, pair[0].part_number + 1);
                prop_assert_eq!(pair[1].start, pair[0].end + 1);
                prop_assert_eq!(pair[0].len(), chunk);
            }
            let total: u64 = parts.iter().map(PartRange::len).sum();
            prop_assert_eq!(total, size);
        }
    }
}
