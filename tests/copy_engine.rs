//! Copy engine behaviour against a scripted in-memory backend.

use chrono::Utc;
use objcopy::{
    CopyBackend, CopyEngine, CopyError, CopyOptions, EngineConfig, ObjectPath, RequestPayer,
    errors::{Operation, StoreError, StoreResult},
    models::{
        multipart::{CompletedPart, PartRange},
        object::ObjectHead,
    },
};
use proptest::prelude::*;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Default, Debug)]
struct Calls {
    heads: usize,
    copies: usize,
    creates: usize,
    part_ranges: Vec<PartRange>,
    completed: Vec<Vec<CompletedPart>>,
    aborts: usize,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Default)]
struct MockBackend {
    size: u64,
    missing: bool,
    source_etag: Option<String>,
    copy_etag: Option<String>,
    failing_parts: HashSet<u32>,
    panicking_parts: HashSet<u32>,
    part_delays_ms: HashMap<u32, u64>,
    fail_create: bool,
    fail_complete: bool,
    calls: Mutex<Calls>,
}

impl MockBackend {
    fn sized(size: u64) -> Self {
        Self {
            size,
            source_etag: Some("abc".into()),
            copy_etag: Some("abc".into()),
            ..Self::default()
        }
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

impl CopyBackend for MockBackend {
    async fn head_object(&self, path: &ObjectPath, _payer: RequestPayer) -> StoreResult<ObjectHead> {
        self.calls().heads += 1;
        if self.missing {
            return Err(StoreError::not_found(path));
        }
        Ok(ObjectHead {
            size: self.size,
            etag: self.source_etag.clone(),
            last_modified: Utc::now(),
        })
    }

    async fn copy_object(
        &self,
        _source: &ObjectPath,
        _destination: &ObjectPath,
        _payer: RequestPayer,
    ) -> StoreResult<Option<String>> {
        self.calls().copies += 1;
        Ok(self.copy_etag.clone())
    }

    async fn create_multipart_upload(&self, _destination: &ObjectPath) -> StoreResult<String> {
        self.calls().creates += 1;
        if self.fail_create {
            return Err(StoreError::BucketNotFound("dst".into()));
        }
        Ok("upload-1".into())
    }

    async fn upload_part_copy(
        &self,
        _source: &ObjectPath,
        _destination: &ObjectPath,
        upload_id: &str,
        range: PartRange,
        _payer: RequestPayer,
    ) -> StoreResult<String> {
        assert_eq!(upload_id, "upload-1");
        if self.panicking_parts.contains(&range.part_number) {
            panic!("part {} blew up", range.part_number);
        }
        {
            let mut calls = self.calls();
            calls.part_ranges.push(range);
            calls.in_flight += 1;
            calls.max_in_flight = calls.max_in_flight.max(calls.in_flight);
        }

        let delay = self.part_delays_ms.get(&range.part_number).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.calls().in_flight -= 1;
        if self.failing_parts.contains(&range.part_number) {
            return Err(StoreError::InvalidRange {
                range: range.header_value(),
                size: self.size,
            });
        }
        Ok(format!("etag-{}", range.part_number))
    }

    async fn complete_multipart_upload(
        &self,
        _destination: &ObjectPath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        assert_eq!(upload_id, "upload-1");
        self.calls().completed.push(parts.to_vec());
        if self.fail_complete {
            return Err(StoreError::InvalidPartOrder);
        }
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _destination: &ObjectPath,
        _upload_id: &str,
    ) -> StoreResult<()> {
        self.calls().aborts += 1;
        Ok(())
    }
}

fn src() -> ObjectPath {
    ObjectPath::new("src-bucket", "data/in.bin")
}

fn dst() -> ObjectPath {
    ObjectPath::new("dst-bucket", "data/out.bin")
}

/// Limit and chunk of 100 bytes so small sizes exercise the multipart path.
fn small_parts_config() -> EngineConfig {
    EngineConfig {
        single_part_copy_limit: 100,
        chunk_size: 100,
        max_concurrent_parts: 8,
        abort_on_failure: true,
    }
}

fn engine(backend: MockBackend, config: EngineConfig) -> (CopyEngine<MockBackend>, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    let engine = CopyEngine::new(Arc::clone(&backend), config).expect("valid config");
    (engine, backend)
}

#[tokio::test]
async fn small_object_uses_single_copy() {
    let (engine, backend) = engine(MockBackend::sized(100), small_parts_config());

    engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .expect("copy should succeed");

    let calls = backend.calls();
    assert_eq!(calls.copies, 1);
    assert_eq!(calls.creates, 0);
}

#[tokio::test]
async fn matching_etags_validate() {
    let (engine, _) = engine(MockBackend::sized(10), EngineConfig::default());

    engine
        .copy(&src(), &dst(), CopyOptions::new(true, false))
        .await
        .expect("abc == abc");
}

#[tokio::test]
async fn mismatched_etags_fail() {
    let backend = MockBackend {
        copy_etag: Some("xyz".into()),
        ..MockBackend::sized(10)
    };
    let (engine, _) = engine(backend, EngineConfig::default());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::new(true, false))
        .await
        .unwrap_err();
    match err {
        CopyError::IntegrityMismatch { expected, actual } => {
            assert_eq!(expected, "abc");
            assert_eq!(actual, "xyz");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_destination_etag_is_unverifiable() {
    let backend = MockBackend {
        copy_etag: None,
        ..MockBackend::sized(10)
    };
    let (engine, _) = engine(backend, EngineConfig::default());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::new(true, false))
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::IntegrityUnavailable(path) if path == dst()));
}

#[tokio::test]
async fn missing_etag_is_ignored_without_validation() {
    let backend = MockBackend {
        source_etag: None,
        copy_etag: None,
        ..MockBackend::sized(10)
    };
    let (engine, _) = engine(backend, EngineConfig::default());

    engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .expect("no validation requested");
}

#[tokio::test]
async fn missing_source_is_not_found() {
    let backend = MockBackend {
        missing: true,
        ..MockBackend::default()
    };
    let (engine, backend) = engine(backend, EngineConfig::default());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::SourceNotFound(path) if path == src()));
    assert_eq!(backend.calls().copies, 0);
}

#[tokio::test]
async fn validation_over_limit_is_refused_before_multipart() {
    let (engine, backend) = engine(MockBackend::sized(101), small_parts_config());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::new(true, false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CopyError::ValidationUnsupportedForMultipart { size: 101 }
    ));

    let calls = backend.calls();
    assert_eq!(calls.creates, 0);
    assert_eq!(calls.copies, 0);
    assert!(calls.part_ranges.is_empty());
}

#[tokio::test]
async fn zero_byte_source_takes_single_copy() {
    let config = EngineConfig {
        single_part_copy_limit: 0,
        ..small_parts_config()
    };
    let (engine, backend) = engine(MockBackend::sized(0), config);

    engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .expect("empty copy");

    let calls = backend.calls();
    assert_eq!(calls.copies, 1);
    assert_eq!(calls.creates, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multipart_commits_parts_in_order() {
    // Earlier parts sleep longer so they finish last.
    let backend = MockBackend {
        part_delays_ms: HashMap::from([(1, 40), (2, 30), (3, 20), (4, 0)]),
        ..MockBackend::sized(350)
    };
    let (engine, backend) = engine(backend, small_parts_config());

    engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .expect("multipart copy");

    let calls = backend.calls();
    assert_eq!(calls.copies, 0);
    assert_eq!(calls.creates, 1);
    assert_eq!(calls.completed.len(), 1);
    let numbers: Vec<u32> = calls.completed[0].iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(calls.completed[0][2].etag, "etag-3");

    let mut ranges: Vec<(u64, u64)> = calls.part_ranges.iter().map(|r| (r.start, r.end)).collect();
    ranges.sort();
    assert_eq!(ranges, vec![(0, 99), (100, 199), (200, 299), (300, 349)]);
}

#[tokio::test]
async fn part_failures_are_aggregated_and_not_committed() {
    let backend = MockBackend {
        failing_parts: HashSet::from([2, 4]),
        ..MockBackend::sized(450)
    };
    let (engine, backend) = engine(backend, small_parts_config());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .unwrap_err();

    match &err {
        CopyError::PartsFailed {
            upload_id,
            failures,
        } => {
            assert_eq!(upload_id, "upload-1");
            let numbers: Vec<u32> = failures.iter().map(|f| f.part_number).collect();
            assert_eq!(numbers, vec![2, 4]);
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("part 2"), "{message}");
    assert!(message.contains("part 4"), "{message}");
    assert!(message.contains("bytes=100-199"), "{message}");

    let calls = backend.calls();
    assert_eq!(calls.part_ranges.len(), 5, "every part is attempted");
    assert!(calls.completed.is_empty(), "commit must not run");
    assert_eq!(calls.aborts, 1);
}

#[tokio::test]
async fn panicked_part_counts_as_failed() {
    let backend = MockBackend {
        panicking_parts: HashSet::from([3]),
        ..MockBackend::sized(500)
    };
    let (engine, backend) = engine(backend, small_parts_config());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .unwrap_err();

    match &err {
        CopyError::PartsFailed { failures, .. } => {
            let numbers: Vec<u32> = failures.iter().map(|f| f.part_number).collect();
            assert_eq!(numbers, vec![3]);
            assert!(failures[0].error.contains("did not finish"), "{}", failures[0].error);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("part 3"), "{err}");

    let calls = backend.calls();
    assert_eq!(calls.part_ranges.len(), 4, "the other parts still run");
    assert!(calls.completed.is_empty());
    assert_eq!(calls.aborts, 1);
}

#[tokio::test]
async fn too_many_parts_is_rejected_before_session() {
    let (engine, backend) = engine(MockBackend::sized(20_002), small_parts_config());

    let err = engine
        .copy_multipart(&src(), &dst(), 20_002, 2, RequestPayer::Owner)
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::InvalidConfig(_)), "{err}");

    engine
        .copy_multipart(&src(), &dst(), 20_000, 2, RequestPayer::Owner)
        .await
        .expect("exactly the part limit");

    let calls = backend.calls();
    assert_eq!(calls.creates, 1);
    assert_eq!(calls.completed[0].len(), 10_000);
}

#[tokio::test]
async fn abort_can_be_disabled() {
    let backend = MockBackend {
        failing_parts: HashSet::from([1]),
        ..MockBackend::sized(250)
    };
    let config = EngineConfig {
        abort_on_failure: false,
        ..small_parts_config()
    };
    let (engine, backend) = engine(backend, config);

    assert!(
        engine
            .copy(&src(), &dst(), CopyOptions::default())
            .await
            .is_err()
    );
    assert_eq!(backend.calls().aborts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn part_copies_respect_concurrency_limit() {
    let backend = MockBackend {
        part_delays_ms: (1..=8).map(|n| (n, 15)).collect(),
        ..MockBackend::sized(800)
    };
    let config = EngineConfig {
        max_concurrent_parts: 2,
        ..small_parts_config()
    };
    let (engine, backend) = engine(backend, config);

    engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .expect("multipart copy");

    let calls = backend.calls();
    assert_eq!(calls.part_ranges.len(), 8);
    assert!(calls.max_in_flight <= 2, "saw {} in flight", calls.max_in_flight);
}

#[tokio::test]
async fn create_failure_is_wrapped() {
    let backend = MockBackend {
        fail_create: true,
        ..MockBackend::sized(500)
    };
    let (engine, backend) = engine(backend, small_parts_config());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CopyError::Store {
            op: Operation::CreateMultipartUpload,
            ..
        }
    ));
    assert!(backend.calls().part_ranges.is_empty());
}

#[tokio::test]
async fn complete_failure_is_propagated() {
    let backend = MockBackend {
        fail_complete: true,
        ..MockBackend::sized(150)
    };
    let (engine, _) = engine(backend, small_parts_config());

    let err = engine
        .copy(&src(), &dst(), CopyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CopyError::Store {
            op: Operation::CompleteMultipartUpload,
            source: StoreError::InvalidPartOrder,
            ..
        }
    ));
}

#[test]
fn zero_chunk_size_config_is_rejected() {
    let config = EngineConfig {
        chunk_size: 0,
        ..EngineConfig::default()
    };
    assert!(CopyEngine::new(Arc::new(MockBackend::default()), config).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn commit_order_ignores_completion_order(
        delays in proptest::collection::vec(0u64..6, 2..12),
    ) {
        let parts = delays.len() as u32;
        let backend = MockBackend {
            part_delays_ms: delays
                .iter()
                .enumerate()
                .map(|(i, d)| (i as u32 + 1, *d))
                .collect(),
            ..MockBackend::sized(parts as u64 * 100)
        };
        let (engine, backend) = engine(backend, small_parts_config());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime
            .block_on(engine.copy(&src(), &dst(), CopyOptions::default()))
            .unwrap();

        let calls = backend.calls();
        let numbers: Vec<u32> = calls.completed[0].iter().map(|p| p.part_number).collect();
        prop_assert_eq!(numbers, (1..=parts).collect::<Vec<_>>());
    }
}
