// src/ring.rs

use crate::config::RingConfig;
use crate::cqe::{Completion, Cqe};
use crate::error::{RingError, SqeError, SubmitError, WaitError};
use crate::flags::{FeatureFlags, SetupFlags};
use crate::params::Params;
use crate::sqe::{Sqe, SqePool};

use std::collections::VecDeque;
use std::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use io_uring::{cqueue, squeue, types, IoUring};
use tracing::{debug, error, info, trace, warn};

/// Tag carried by submissions made outside the pool by the synchronous
/// writer. Pool slots use their index as tag, so it can never collide.
pub(crate) const SYNC_WRITE_TAG: u64 = u64::MAX;

/// An io_uring instance with a fixed pool of submission slots.
///
/// The ring is driven by a single owner: every operation takes `&mut self`,
/// and the type is neither `Send` nor `Sync`. Use one ring per worker thread.
pub struct Ring {
  // Field order matters: the kernel pair is torn down before the params.
  uring: IoUring<squeue::Entry, cqueue::Entry>,
  params: Params,
  queue_depth: u32,
  features: FeatureFlags,
  pub(crate) pool: SqePool,
  /// Last completion reaped by any wait.
  last: Option<Completion>,
  /// Completions reaped while waiting for a specific tag; returned by later waits.
  backlog: VecDeque<Cqe>,
  wait_timeout: Option<Duration>,
}

impl Ring {
  /// Creates a ring with `queue_depth` submission entries.
  ///
  /// Default params are built when `params` is `None`. The ring takes
  /// ownership of the params; if the kernel refuses the setup they are
  /// dropped before the error is returned.
  pub fn new(queue_depth: u32, params: Option<Params>) -> Result<Self, RingError> {
    let params = match params {
      Some(p) => p,
      None => Params::default_params().map_err(|e| {
        error!("Ring::new: failed to create default params: {}", e);
        RingError::from(e)
      })?,
    };

    if queue_depth == 0 {
      warn!("Ring::new: queue depth must be at least 1.");
      return Err(RingError::from_errno(libc::EINVAL));
    }

    let mut builder = IoUring::<squeue::Entry, cqueue::Entry>::builder();
    params.apply(&mut builder);
    let uring = match builder.build(queue_depth) {
      Ok(uring) => uring,
      Err(e) => {
        let err = RingError::from_io(&e);
        error!("Ring::new: kernel refused ring setup (depth {}, {:?}): {}", queue_depth, params, err);
        drop(params);
        return Err(err);
      }
    };

    // Dropping `uring` on this path closes the ring fd.
    let pool = SqePool::new(queue_depth as usize).map_err(|_| {
      error!("Ring::new: could not allocate {} submission slots.", queue_depth);
      RingError::Alloc
    })?;

    let features = FeatureFlags::from_parameters(uring.params());
    info!(
      "Ring created: fd {}, depth {}, sq {}, cq {}, flags {:?}, features {:?}",
      uring.as_raw_fd(),
      queue_depth,
      uring.params().sq_entries(),
      uring.params().cq_entries(),
      params.flags(),
      features
    );

    Ok(Self {
      uring,
      params,
      queue_depth,
      features,
      pool,
      last: None,
      backlog: VecDeque::new(),
      wait_timeout: None,
    })
  }

  /// Creates a ring from a [`RingConfig`], applying its default wait timeout.
  pub fn with_config(config: &RingConfig) -> Result<Self, RingError> {
    let params = config.build_params()?;
    let mut ring = Self::new(config.queue_depth, Some(params))?;
    ring.wait_timeout = config.wait_timeout;
    Ok(ring)
  }

  pub fn queue_depth(&self) -> u32 {
    self.queue_depth
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  pub fn features(&self) -> FeatureFlags {
    self.features
  }

  /// Submission ring size granted by the kernel (a power of two, at least `queue_depth`).
  pub fn sq_capacity(&self) -> u32 {
    self.uring.params().sq_entries()
  }

  pub fn cq_capacity(&self) -> u32 {
    self.uring.params().cq_entries()
  }

  /// True for IOPOLL rings, whose completions are polled by the kernel
  /// inside the wait call instead of being signalled by interrupts.
  pub fn is_polled(&self) -> bool {
    self.params.flags().contains(SetupFlags::IOPOLL)
  }

  /// Pool slots acquired and not yet released by [`Ring::mark_seen`].
  pub fn in_flight(&self) -> usize {
    self.pool.live()
  }

  /// The most recently reaped completion. Overwritten by every wait.
  pub fn last_completion(&self) -> Option<Completion> {
    self.last
  }

  pub fn wait_timeout(&self) -> Option<Duration> {
    self.wait_timeout
  }

  pub fn set_wait_timeout(&mut self, timeout: Option<Duration>) {
    self.wait_timeout = timeout;
  }

  /// Takes the next free submission slot.
  ///
  /// Returns [`SqeError::QueueFull`] when every slot belongs to a request
  /// whose completion has not been marked seen, or when the kernel's
  /// submission ring has no room. Wait for and mark seen a completion, then
  /// retry.
  pub fn acquire_sqe(&mut self) -> Result<Sqe<'_>, SqeError> {
    if self.uring.submission().is_full() {
      debug!("Ring::acquire_sqe: kernel submission ring is full.");
      return Err(SqeError::QueueFull);
    }
    let index = self.pool.claim().map_err(|e| {
      debug!("Ring::acquire_sqe: all {} slots are live.", self.pool.len());
      e
    })?;
    trace!("Ring::acquire_sqe: slot {} (next {}).", index, self.pool.next_index());
    Ok(Sqe::new(self, index))
  }

  /// Places a prepared entry in the submission ring.
  ///
  /// # Safety
  ///
  /// Every buffer and iovec referenced by `entry` must stay valid until its
  /// completion is reaped.
  pub(crate) unsafe fn push_entry(&mut self, entry: &squeue::Entry) -> Result<(), SqeError> {
    self.uring.submission().push(entry).map_err(|_| {
      debug!("Ring::push_entry: kernel submission ring is full.");
      SqeError::QueueFull
    })
  }

  /// Hands every prepared entry to the kernel, in preparation order.
  ///
  /// Entries start in that order; their completions may arrive in any order.
  pub fn submit(&mut self) -> Result<usize, SubmitError> {
    match self.uring.submit() {
      Ok(n) => {
        trace!("Ring::submit: {} entries submitted.", n);
        Ok(n)
      }
      Err(e) => {
        let err = SubmitError::from_io(&e);
        warn!("Ring::submit: {}", err);
        Err(err)
      }
    }
  }

  /// Blocks until a completion is available and returns it.
  ///
  /// Entries prepared but not yet submitted are submitted first. The wait is
  /// bounded only if a default timeout was configured. An error means the
  /// wait itself failed; a failed request is returned as a `Cqe` with a
  /// negative result.
  pub fn wait_for_completion(&mut self) -> Result<Cqe, WaitError> {
    let timeout = self.wait_timeout;
    self.wait_for(None, timeout)
  }

  /// Like [`Ring::wait_for_completion`] but gives up with
  /// [`WaitError::TimedOut`] after `timeout`.
  pub fn wait_for_completion_timeout(&mut self, timeout: Duration) -> Result<Cqe, WaitError> {
    self.wait_for(None, Some(timeout))
  }

  /// Returns a completion if one is already available, without blocking.
  pub fn peek_completion(&mut self) -> Option<Cqe> {
    if let Some(cqe) = self.backlog.pop_front() {
      self.last = Some(cqe.completion());
      return Some(cqe);
    }
    self.reap_ready()
  }

  /// Waits for the completion carrying `tag`, keeping any other completion
  /// reaped meanwhile for later waits.
  pub(crate) fn wait_for_tag(&mut self, tag: u64, timeout: Option<Duration>) -> Result<Cqe, WaitError> {
    self.wait_for(Some(tag), timeout)
  }

  fn wait_for(&mut self, tag: Option<u64>, timeout: Option<Duration>) -> Result<Cqe, WaitError> {
    let backlogged = match tag {
      None => self.backlog.pop_front(),
      Some(t) => self
        .backlog
        .iter()
        .position(|c| c.tag == t)
        .and_then(|pos| self.backlog.remove(pos)),
    };
    if let Some(cqe) = backlogged {
      self.last = Some(cqe.completion());
      return Ok(cqe);
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
      while let Some(cqe) = self.reap_ready() {
        match tag {
          Some(t) if cqe.tag != t => {
            trace!("Ring::wait: keeping completion for tag {} while waiting for {}.", cqe.tag, t);
            self.backlog.push_back(cqe);
          }
          _ => return Ok(cqe),
        }
      }
      self.enter(deadline)?;
    }
  }

  /// One blocking `io_uring_enter` asking for at least one completion.
  fn enter(&mut self, deadline: Option<Instant>) -> Result<(), WaitError> {
    let res = match deadline {
      None => self.uring.submit_and_wait(1),
      Some(deadline) => {
        if !self.features.contains(FeatureFlags::EXT_ARG) {
          return Err(WaitError::TimeoutUnsupported);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
          return Err(WaitError::TimedOut);
        }
        let ts = types::Timespec::new()
          .sec(remaining.as_secs())
          .nsec(remaining.subsec_nanos());
        let args = types::SubmitArgs::new().timespec(&ts);
        self.uring.submitter().submit_with_args(1, &args)
      }
    };

    match res {
      Ok(_) => Ok(()),
      // Completion ring overflowed; reaping what is there makes progress.
      Err(e) if e.raw_os_error() == Some(libc::EBUSY) && !self.uring.completion().is_empty() => Ok(()),
      Err(e) => {
        let err = WaitError::from_io(&e);
        if err != WaitError::TimedOut {
          debug!("Ring::wait: {}", err);
        }
        Err(err)
      }
    }
  }

  fn reap_ready(&mut self) -> Option<Cqe> {
    let entry = self.uring.completion().next()?;
    let tag = entry.user_data();
    let user_data = self.slot_of(tag).map_or(0, |i| self.pool.user_data(i));
    let completion = Completion {
      result: entry.result(),
      user_data,
    };
    self.last = Some(completion);
    trace!("Ring: reaped tag {} result {}.", tag, completion.result);
    Some(Cqe::new(completion, tag, self.uring.as_raw_fd()))
  }

  fn slot_of(&self, tag: u64) -> Option<usize> {
    usize::try_from(tag).ok().filter(|&i| i < self.pool.len())
  }

  /// Releases the slot that produced `cqe`, making it available to
  /// [`Ring::acquire_sqe`] again. Must be called once for every reaped completion.
  /// A completion reaped from a different ring is ignored.
  pub fn mark_seen(&mut self, cqe: Cqe) {
    let fd = self.uring.as_raw_fd();
    if cqe.ring_fd != fd {
      warn!(
        "Ring::mark_seen: completion for tag {} was reaped from ring {}, not {}; ignored.",
        cqe.tag, cqe.ring_fd, fd
      );
      return;
    }
    match self.slot_of(cqe.tag) {
      Some(index) => {
        if !self.pool.release(index) {
          warn!("Ring::mark_seen: slot {} was not in flight.", index);
        }
      }
      None if cqe.tag == SYNC_WRITE_TAG => {}
      None => warn!("Ring::mark_seen: completion with unknown tag {}.", cqe.tag),
    }
  }

  /// Tears down the kernel ring pair, then releases the params.
  ///
  /// Every outstanding completion should be reaped first: buffers of requests
  /// still in flight may be accessed by the kernel until teardown finishes.
  pub fn destroy(self) {
    if self.pool.live() > 0 || !self.backlog.is_empty() {
      warn!(
        "Ring::destroy: {} slots still live, {} completions unreaped.",
        self.pool.live(),
        self.backlog.len()
      );
    }
    let Ring { uring, params, .. } = self;
    let fd = uring.as_raw_fd();
    drop(uring);
    debug!("Ring {} torn down; releasing params {:?}.", fd, params);
    drop(params);
  }
}

impl AsRawFd for Ring {
  fn as_raw_fd(&self) -> RawFd {
    self.uring.as_raw_fd()
  }
}

impl fmt::Debug for Ring {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Ring")
      .field("fd", &self.uring.as_raw_fd())
      .field("queue_depth", &self.queue_depth)
      .field("params", &self.params)
      .field("features", &self.features)
      .field("pool", &self.pool)
      .field("backlog_len", &self.backlog.len())
      .field("wait_timeout", &self.wait_timeout)
      .finish_non_exhaustive()
  }
}
