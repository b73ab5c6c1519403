// src/config.rs

use crate::error::ParamsError;
use crate::flags::SetupFlags;
use crate::params::Params;

use std::time::Duration;

/// Default number of submission entries (and pool slots) per ring.
pub const DEFAULT_QUEUE_DEPTH: u32 = 128;

/// Plain description of a ring, for callers that build rings from settings
/// rather than calling [`Params::new`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
  pub queue_depth: u32,
  pub flags: SetupFlags,
  pub sq_thread_cpu: u32,
  pub sq_thread_idle: u32,
  pub cq_entries: u32,
  /// Bound applied by [`Ring::wait_for_completion`](crate::Ring::wait_for_completion)
  /// and [`AsyncWriter::wait_for_completion`](crate::AsyncWriter::wait_for_completion).
  /// Synchronous writes and the reap on `AsyncWriter` drop always wait
  /// without limit. `None` waits without limit.
  pub wait_timeout: Option<Duration>,
}

impl Default for RingConfig {
  fn default() -> Self {
    Self {
      queue_depth: DEFAULT_QUEUE_DEPTH,
      flags: SetupFlags::empty(),
      sq_thread_cpu: 0,
      sq_thread_idle: 0,
      cq_entries: 0,
      wait_timeout: None,
    }
  }
}

impl RingConfig {
  pub(crate) fn build_params(&self) -> Result<Params, ParamsError> {
    Params::new(self.flags, self.sq_thread_cpu, self.sq_thread_idle, self.cq_entries)
  }
}
