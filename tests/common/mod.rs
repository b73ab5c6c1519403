// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset of helpers

use ioring::{Params, Ring, RingError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Once, OnceLock};

static TEMP_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();
static IO_URING_AVAILABLE: OnceLock<bool> = OnceLock::new();

fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ioring=debug,warn"));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// False when the kernel (or a sandbox such as a container seccomp profile)
/// refuses io_uring. Tests that need a live ring return early in that case.
pub fn io_uring_available() -> bool {
  setup_tracing();
  *IO_URING_AVAILABLE.get_or_init(|| match Ring::new(1, None) {
    Ok(ring) => {
      ring.destroy();
      true
    }
    Err(RingError::Kernel { code, message }) if code == libc::ENOSYS || code == libc::EPERM => {
      println!("io_uring unavailable ({}: {}); skipping ring tests.", code, message);
      false
    }
    Err(e) => panic!("Unexpected failure probing io_uring: {}", e),
  })
}

/// Creates a ring for a test, or `None` when io_uring is unavailable.
pub fn test_ring(queue_depth: u32) -> Option<Ring> {
  test_ring_with(queue_depth, None)
}

pub fn test_ring_with(queue_depth: u32, params: Option<Params>) -> Option<Ring> {
  if !io_uring_available() {
    return None;
  }
  Some(Ring::new(queue_depth, params).expect("Failed to create test ring"))
}

/// Unique path under the temp dir, so tests in parallel never share a file.
pub fn temp_path(name: &str) -> PathBuf {
  let pid = std::process::id();
  let count = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
  std::env::temp_dir().join(format!("ioring_test_{}_{}_{}", pid, count, name))
}

/// Creates (or truncates) a read/write file at a fresh temp path.
pub fn fresh_file(name: &str) -> (PathBuf, File) {
  let path = temp_path(name);
  let file = OpenOptions::new()
    .create(true)
    .truncate(true)
    .read(true)
    .write(true)
    .open(&path)
    .expect("Failed to create temp file");
  (path, file)
}

/// Number of descriptors currently open in this process.
pub fn open_fd_count() -> usize {
  std::fs::read_dir("/proc/self/fd")
    .expect("Failed to list /proc/self/fd")
    .count()
}
