// src/params.rs

use crate::error::ParamsError;
use crate::flags::SetupFlags;
use crate::mem;

use std::fmt;
use std::os::unix::io::RawFd;

use io_uring::Builder;
use tracing::trace;

/// Normalized setup block. Every field not enabled by its flag is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ParamBlock {
  flags: SetupFlags,
  sq_thread_cpu: u32,
  sq_thread_idle: u32,
  cq_entries: u32,
  attach_wq_fd: Option<RawFd>,
}

/// Ring setup options.
///
/// `sq_thread_cpu` and `sq_thread_idle` are only kept when
/// [`SetupFlags::SQPOLL`] is set, `cq_entries` only when
/// [`SetupFlags::CQSIZE`] is set. The constructor zeroes the rest so stale
/// values can never reach the kernel.
pub struct Params {
  block: Box<ParamBlock>,
}

impl Params {
  pub fn new(flags: SetupFlags, sq_thread_cpu: u32, sq_thread_idle: u32, cq_entries: u32) -> Result<Self, ParamsError> {
    let mut block = ParamBlock {
      flags,
      sq_thread_cpu,
      sq_thread_idle,
      cq_entries,
      attach_wq_fd: None,
    };

    if !flags.contains(SetupFlags::SQPOLL) {
      block.sq_thread_cpu = 0;
      block.sq_thread_idle = 0;
    }
    if !flags.contains(SetupFlags::CQSIZE) {
      block.cq_entries = 0;
    }

    let block = mem::try_box(block).map_err(|_| ParamsError::Alloc)?;
    trace!("Params created: {:?}", block);
    Ok(Self { block })
  }

  /// Params with no setup flags and zeroed tuning fields.
  pub fn default_params() -> Result<Self, ParamsError> {
    Self::new(SetupFlags::empty(), 0, 0, 0)
  }

  /// Records the ring whose async worker pool should be shared.
  /// Ignored unless [`SetupFlags::ATTACH_WQ`] is set.
  pub fn attach_wq(mut self, ring_fd: RawFd) -> Self {
    if self.block.flags.contains(SetupFlags::ATTACH_WQ) {
      self.block.attach_wq_fd = Some(ring_fd);
    }
    self
  }

  pub fn flags(&self) -> SetupFlags {
    self.block.flags
  }

  pub fn sq_thread_cpu(&self) -> u32 {
    self.block.sq_thread_cpu
  }

  pub fn sq_thread_idle(&self) -> u32 {
    self.block.sq_thread_idle
  }

  pub fn cq_entries(&self) -> u32 {
    self.block.cq_entries
  }

  pub fn attach_wq_fd(&self) -> Option<RawFd> {
    self.block.attach_wq_fd
  }

  /// Translates the options into an `io_uring` builder.
  ///
  /// Flags are forwarded as given; combinations the kernel rejects (SQ_AFF
  /// without SQPOLL, ATTACH_WQ without a donor ring) surface as `EINVAL`
  /// from ring setup.
  pub(crate) fn apply(&self, builder: &mut Builder) {
    let b = &*self.block;
    if b.flags.contains(SetupFlags::IOPOLL) {
      builder.setup_iopoll();
    }
    if b.flags.contains(SetupFlags::SQPOLL) {
      builder.setup_sqpoll(b.sq_thread_idle);
    }
    if b.flags.contains(SetupFlags::SQ_AFF) {
      builder.setup_sqpoll_cpu(b.sq_thread_cpu);
    }
    if b.flags.contains(SetupFlags::CQSIZE) {
      builder.setup_cqsize(b.cq_entries);
    }
    if b.flags.contains(SetupFlags::CLAMP) {
      builder.setup_clamp();
    }
    if b.flags.contains(SetupFlags::ATTACH_WQ) {
      builder.setup_attach_wq(b.attach_wq_fd.unwrap_or(-1));
    }
  }
}

impl fmt::Debug for Params {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Params")
      .field("flags", &self.block.flags)
      .field("sq_thread_cpu", &self.block.sq_thread_cpu)
      .field("sq_thread_idle", &self.block.sq_thread_idle)
      .field("cq_entries", &self.block.cq_entries)
      .field("attach_wq_fd", &self.block.attach_wq_fd)
      .finish()
  }
}
