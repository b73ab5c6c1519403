// src/writer/async_writer.rs

use crate::error::WriteError;
use crate::ring::Ring;

use std::fmt;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

enum WriterState {
  Idle,
  AwaitingCompletion {
    slot: usize,
    // Kept alive until the kernel is done reading it.
    buffer: Bytes,
  },
}

/// Submits a write and returns immediately; [`AsyncWriter::wait_for_completion`]
/// reaps the result later.
///
/// At most one write per writer is outstanding. The writer targets a single
/// descriptor fixed at construction.
pub struct AsyncWriter<'r> {
  ring: &'r mut Ring,
  fd: RawFd,
  offset: u64,
  state: WriterState,
}

impl<'r> AsyncWriter<'r> {
  pub fn new(ring: &'r mut Ring, fd: RawFd) -> Self {
    Self::with_offset(ring, fd, 0)
  }

  /// Starts writing at `offset` instead of the beginning of the file.
  pub fn with_offset(ring: &'r mut Ring, fd: RawFd, offset: u64) -> Self {
    Self {
      ring,
      fd,
      offset,
      state: WriterState::Idle,
    }
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  /// File offset the next write will target.
  pub fn offset(&self) -> u64 {
    self.offset
  }

  pub fn is_idle(&self) -> bool {
    matches!(self.state, WriterState::Idle)
  }

  /// Changes the ring's default wait timeout, which bounds
  /// [`AsyncWriter::wait_for_completion`].
  pub fn set_wait_timeout(&mut self, timeout: Option<Duration>) {
    self.ring.set_wait_timeout(timeout);
  }

  /// Queues `data` for writing at the tracked offset and submits it.
  ///
  /// Fails with [`WriteError::AlreadyInFlight`] while a previous write has not
  /// been waited for. If the submit syscall fails the write stays queued and
  /// the next [`AsyncWriter::wait_for_completion`] submits it.
  pub fn write(&mut self, data: Bytes) -> Result<(), WriteError> {
    if !self.is_idle() {
      debug!("AsyncWriter: write called with a write already in flight.");
      return Err(WriteError::AlreadyInFlight);
    }

    let mut sqe = self.ring.acquire_sqe()?;
    let slot = sqe.index();
    sqe.set_user_data(self.offset);
    // SAFETY: `data` is moved into `self.state` below and only released after
    // the completion is reaped (or leaked if it never can be). `Bytes`
    // contents do not move when the handle does.
    unsafe { sqe.prep_writev(self.fd, &data, self.offset)? };

    trace!(
      "AsyncWriter: slot {} queued {} bytes for fd {} at offset {}.",
      slot,
      data.len(),
      self.fd,
      self.offset
    );
    self.state = WriterState::AwaitingCompletion { slot, buffer: data };

    self.ring.submit()?;
    Ok(())
  }

  /// Blocks until the outstanding write completes and returns its byte count.
  ///
  /// Fails with [`WriteError::NothingInFlight`] instead of blocking when no
  /// write is outstanding. A wait error (including the ring's default
  /// timeout) leaves the write outstanding so the call can be repeated.
  pub fn wait_for_completion(&mut self) -> Result<usize, WriteError> {
    let slot = match &self.state {
      WriterState::Idle => {
        debug!("AsyncWriter: wait_for_completion called with no write in flight.");
        return Err(WriteError::NothingInFlight);
      }
      WriterState::AwaitingCompletion { slot, .. } => *slot,
    };

    let timeout = self.ring.wait_timeout();
    let cqe = self.ring.wait_for_tag(slot as u64, timeout)?;
    let result = cqe.result();
    self.ring.mark_seen(cqe);
    self.state = WriterState::Idle;

    if result < 0 {
      let err = WriteError::from_result(result);
      debug!("AsyncWriter: {}", err);
      return Err(err);
    }

    self.offset += result as u64;
    trace!("AsyncWriter: slot {} wrote {} bytes.", slot, result);
    Ok(result as usize)
  }
}

impl Drop for AsyncWriter<'_> {
  fn drop(&mut self) {
    let (slot, buffer) = match mem::replace(&mut self.state, WriterState::Idle) {
      WriterState::Idle => return,
      WriterState::AwaitingCompletion { slot, buffer } => (slot, buffer),
    };

    loop {
      match self.ring.wait_for_tag(slot as u64, None) {
        Ok(cqe) => {
          self.ring.mark_seen(cqe);
          return;
        }
        Err(e) if e.is_interrupted() => continue,
        Err(e) => {
          warn!(
            "AsyncWriter dropped with write in flight and wait failed ({}); leaking its buffer.",
            e
          );
          mem::forget(buffer);
          return;
        }
      }
    }
  }
}

impl fmt::Debug for AsyncWriter<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let in_flight = match &self.state {
      WriterState::Idle => None,
      WriterState::AwaitingCompletion { slot, buffer } => Some((*slot, buffer.len())),
    };
    f.debug_struct("AsyncWriter")
      .field("fd", &self.fd)
      .field("offset", &self.offset)
      .field("in_flight", &in_flight)
      .finish()
  }
}
