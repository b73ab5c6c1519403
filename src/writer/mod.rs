// src/writer/mod.rs

//! File writers built on a [`Ring`](crate::Ring).
//!
//! Both writers borrow the ring mutably for their whole life, so a ring is
//! never driven by two writers at once. Each writer tracks its own file
//! offset and advances it by the byte count of every successful write.

pub mod async_writer;
pub mod sync_writer;

pub use async_writer::AsyncWriter;
pub use sync_writer::SyncWriter;
