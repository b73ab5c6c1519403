// src/cqe.rs

use std::io;
use std::os::unix::io::RawFd;

/// Result and correlation data of one reaped completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
  /// Negative values are negated errnos; otherwise a byte count or zero.
  pub result: i32,
  /// Correlation data set on the submission that produced this completion.
  pub user_data: u64,
}

impl Completion {
  pub fn is_success(&self) -> bool {
    self.result >= 0
  }

  /// The error carried by a failed request, if any.
  pub fn error(&self) -> Option<io::Error> {
    if self.result < 0 {
      Some(io::Error::from_raw_os_error(self.result.saturating_neg()))
    } else {
      None
    }
  }
}

/// A reaped completion that has not yet been marked seen.
///
/// Handed out by [`Ring::wait_for_completion`](crate::Ring::wait_for_completion)
/// and consumed by [`Ring::mark_seen`](crate::Ring::mark_seen). Not `Clone`,
/// so a completion can be marked seen at most once. It remembers the ring it
/// was reaped from; marking it seen on another ring releases nothing.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reaped completion must be passed to Ring::mark_seen to release its slot"]
pub struct Cqe {
  completion: Completion,
  /// Ring-internal tag identifying the slot that produced the completion.
  pub(crate) tag: u64,
  /// Descriptor of the ring that reaped it.
  pub(crate) ring_fd: RawFd,
}

impl Cqe {
  pub(crate) fn new(completion: Completion, tag: u64, ring_fd: RawFd) -> Self {
    Self {
      completion,
      tag,
      ring_fd,
    }
  }

  pub fn result(&self) -> i32 {
    self.completion.result
  }

  pub fn user_data(&self) -> u64 {
    self.completion.user_data
  }

  pub fn completion(&self) -> Completion {
    self.completion
  }

  pub fn is_success(&self) -> bool {
    self.completion.is_success()
  }

  /// Byte count (or zero) of a successful request.
  pub fn bytes(&self) -> Option<usize> {
    usize::try_from(self.completion.result).ok()
  }
}
