//! objcopy: server-side object copies for S3-style stores.
//!
//! [`copy::CopyEngine`] picks a single copy request or a parallel multipart
//! copy from the object size and can verify ETags. It talks to the store
//! only through [`store::CopyBackend`]. [`client::StoreClient`] and
//! [`bucket::BucketClient`] wrap it with the other object operations, and
//! [`services::local_store::LocalStore`] is a disk + SQLite backend.

pub mod bucket;
pub mod client;
pub mod config;
pub mod copy;
pub mod errors;
pub mod models;
pub mod path;
pub mod services;
pub mod store;

pub use bucket::BucketClient;
pub use client::StoreClient;
pub use copy::{CopyEngine, CopyOptions, EngineConfig};
pub use errors::{ClientError, CopyError, StoreError};
pub use path::ObjectPath;
pub use store::{CopyBackend, ObjectStore, RequestPayer};
