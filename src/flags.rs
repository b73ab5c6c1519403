// src/flags.rs

use bitflags::bitflags;
use io_uring::Parameters;

bitflags! {
  /// Setup options recognized when a ring is created.
  ///
  /// Bit values match the kernel's `IORING_SETUP_*` constants so they can be
  /// logged and compared against `io_uring_setup(2)` documentation directly.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct SetupFlags: u32 {
    /// Busy-poll for completions instead of waiting for interrupts.
    /// Only meaningful for descriptors opened with `O_DIRECT`.
    const IOPOLL = 1 << 0;
    /// A kernel thread polls the submission queue, so submitting does not
    /// require a syscall while the thread is awake.
    const SQPOLL = 1 << 1;
    /// Pin the SQPOLL thread to `sq_thread_cpu`. Rejected by the kernel
    /// without `SQPOLL`.
    const SQ_AFF = 1 << 2;
    /// Size the completion queue from `cq_entries` instead of `2 * depth`.
    const CQSIZE = 1 << 3;
    /// Clamp oversized depth / cq_entries requests instead of failing.
    const CLAMP = 1 << 4;
    /// Share the async worker pool of an existing ring.
    const ATTACH_WQ = 1 << 5;
  }
}

bitflags! {
  /// Features reported by the kernel after a ring has been set up.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct FeatureFlags: u32 {
    const SINGLE_MMAP = 1 << 0;
    /// Completions are never dropped; overflow is reported as `EBUSY` on submit.
    const NODROP = 1 << 1;
    /// Data handed to the kernel is consumed at submit time.
    const SUBMIT_STABLE = 1 << 2;
    /// An offset of `-1` for read/write uses the current file position.
    const RW_CUR_POS = 1 << 3;
    const CUR_PERSONALITY = 1 << 4;
    const FAST_POLL = 1 << 5;
    const POLL_32BITS = 1 << 6;
    const SQPOLL_NONFIXED = 1 << 7;
    /// Waits accept a timeout argument (needed for bounded waits).
    const EXT_ARG = 1 << 8;
    const NATIVE_WORKERS = 1 << 9;
    const RSRC_TAGS = 1 << 10;
  }
}

impl FeatureFlags {
  /// Collects the feature bits reported in the ring's setup parameters.
  pub(crate) fn from_parameters(params: &Parameters) -> Self {
    let mut features = FeatureFlags::empty();
    features.set(FeatureFlags::SINGLE_MMAP, params.is_feature_single_mmap());
    features.set(FeatureFlags::NODROP, params.is_feature_nodrop());
    features.set(FeatureFlags::SUBMIT_STABLE, params.is_feature_submit_stable());
    features.set(FeatureFlags::RW_CUR_POS, params.is_feature_rw_cur_pos());
    features.set(FeatureFlags::CUR_PERSONALITY, params.is_feature_cur_personality());
    features.set(FeatureFlags::FAST_POLL, params.is_feature_fast_poll());
    features.set(FeatureFlags::POLL_32BITS, params.is_feature_poll_32bits());
    features.set(FeatureFlags::SQPOLL_NONFIXED, params.is_feature_sqpoll_nonfixed());
    features.set(FeatureFlags::EXT_ARG, params.is_feature_ext_arg());
    features.set(FeatureFlags::NATIVE_WORKERS, params.is_feature_native_workers());
    features.set(FeatureFlags::RSRC_TAGS, params.is_feature_resource_tagging());
    features
  }
}
