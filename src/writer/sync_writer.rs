// src/writer/sync_writer.rs

use crate::error::WriteError;
use crate::ring::{Ring, SYNC_WRITE_TAG};

use std::fmt;
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

use io_uring::{opcode, types};
use tracing::{debug, trace, warn};

const WAIT_RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// Per-writer scratch descriptor for the one write in flight.
struct WriteScratch {
  iov: libc::iovec,
}

/// Writes one buffer per call and blocks until the kernel reports the result.
///
/// The writer does not take a slot from the ring's pool; it owns a single
/// scratch descriptor instead. Completions of other requests reaped while it
/// waits are kept by the ring and handed out by later waits.
pub struct SyncWriter<'r> {
  ring: &'r mut Ring,
  offset: u64,
  scratch: WriteScratch,
}

impl<'r> SyncWriter<'r> {
  pub fn new(ring: &'r mut Ring) -> Self {
    Self::with_offset(ring, 0)
  }

  /// Starts writing at `offset` instead of the beginning of the file.
  pub fn with_offset(ring: &'r mut Ring, offset: u64) -> Self {
    Self {
      ring,
      offset,
      scratch: WriteScratch {
        iov: libc::iovec {
          iov_base: std::ptr::null_mut(),
          iov_len: 0,
        },
      },
    }
  }

  /// File offset the next write will target.
  pub fn offset(&self) -> u64 {
    self.offset
  }

  /// Writes `buf` to `fd` at the tracked offset and returns the byte count.
  ///
  /// A negative completion result is returned as [`WriteError::Request`].
  /// Once the entry is queued, the call only returns after its completion
  /// has been reaped: failed waits are retried and the ring's default wait
  /// timeout does not apply.
  pub fn write(&mut self, buf: &[u8], fd: RawFd) -> Result<usize, WriteError> {
    self.scratch.iov.iov_base = buf.as_ptr() as *mut libc::c_void;
    self.scratch.iov.iov_len = buf.len();

    let entry = opcode::Writev::new(types::Fd(fd), &self.scratch.iov as *const libc::iovec, 1)
      .offset(self.offset)
      .build()
      .user_data(SYNC_WRITE_TAG);

    // SAFETY: `buf` and the scratch iovec are borrowed for this whole call.
    // From here on the call only returns once the completion is reaped, so
    // neither can be freed while the kernel may still read them.
    unsafe { self.ring.push_entry(&entry)? };
    trace!("SyncWriter: queued {} bytes for fd {} at offset {}.", buf.len(), fd, self.offset);

    // The wait submits the queued entry and blocks in the same syscall.
    let cqe = loop {
      match self.ring.wait_for_tag(SYNC_WRITE_TAG, None) {
        Ok(cqe) => break cqe,
        Err(e) if e.is_interrupted() => {
          trace!("SyncWriter: wait interrupted, retrying.");
        }
        Err(e) => {
          warn!("SyncWriter: wait failed with write still queued ({}); retrying.", e);
          thread::sleep(WAIT_RETRY_BACKOFF);
        }
      }
    };

    let result = cqe.result();
    self.ring.mark_seen(cqe);
    if result < 0 {
      let err = WriteError::from_result(result);
      debug!("SyncWriter: {}", err);
      return Err(err);
    }

    self.offset += result as u64;
    Ok(result as usize)
  }
}

impl fmt::Debug for SyncWriter<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SyncWriter")
      .field("ring", &self.ring)
      .field("offset", &self.offset)
      .finish()
  }
}
