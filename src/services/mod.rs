//! Store backends.

pub mod local_store;
