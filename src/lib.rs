// src/lib.rs

//! ioring - a managed layer over Linux io_uring.
//!
//! The crate owns the parts that sit between the raw submission/completion
//! rings and application code: ring setup options, a fixed pool of
//! submission slots that are never rebound while their request is in flight,
//! blocking and bounded completion waits, and two file writers built on top.
//!
//! ```no_run
//! use ioring::{Ring, SyncWriter};
//! use std::os::unix::io::AsRawFd;
//!
//! let mut ring = Ring::new(128, None)?;
//! let file = std::fs::File::create("/tmp/ioring-doc")?;
//! let written = SyncWriter::new(&mut ring).write(&[0u8; 256], file.as_raw_fd())?;
//! assert_eq!(written, 256);
//! ring.destroy();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Ring-wide configuration with defaults.
pub mod config;
/// Reaped completions.
pub mod cqe;
/// Error types for every fallible operation.
pub mod error;
/// Setup and feature bitsets.
pub mod flags;
mod mem;
/// Ring setup parameters.
pub mod params;
/// The ring itself: lifecycle, acquisition, submission and waits.
pub mod ring;
/// Pooled submission slots.
pub mod sqe;
/// Synchronous and asynchronous file writers.
pub mod writer;

pub use config::{RingConfig, DEFAULT_QUEUE_DEPTH};
pub use cqe::{Completion, Cqe};
pub use error::{ParamsError, RingError, SqeError, SubmitError, WaitError, WriteError};
pub use flags::{FeatureFlags, SetupFlags};
pub use params::Params;
pub use ring::Ring;
pub use sqe::Sqe;
pub use writer::{AsyncWriter, SyncWriter};

/// Major version number of the ioring library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the ioring library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the ioring library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// # Examples
///
/// ```
/// let (major, minor, patch) = ioring::version();
/// println!("ioring version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
