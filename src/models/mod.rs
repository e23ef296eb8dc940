//! Data types shared by the copy engine, the facades and the local store.
//!
//! `object` and `multipart` hold both the wire-level values the engine
//! passes around (`ObjectHead`, `PartRange`, `CompletedPart`) and the rows
//! the local store keeps in SQLite.

pub mod bucket;
pub mod multipart;
pub mod object;
