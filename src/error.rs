use std::io;
use thiserror::Error;

/// Renders an errno the way the platform does (`strerror`), without the
/// "(os error N)" suffix that `io::Error`'s `Display` appends.
pub(crate) fn errno_message(errno: i32) -> String {
  let rendered = io::Error::from_raw_os_error(errno).to_string();
  match rendered.rfind(" (os error ") {
    Some(idx) => rendered[..idx].to_string(),
    None => rendered,
  }
}

/// Extracts the errno carried by an `io::Error`, falling back to `EIO` for
/// errors that did not originate from a syscall.
pub(crate) fn errno_of(e: &io::Error) -> i32 {
  e.raw_os_error().unwrap_or(libc::EIO)
}

// --- Params ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
  #[error("create params failed: could not allocate memory")]
  Alloc,
}

impl ParamsError {
  pub const CODE_ALLOC: i32 = 1;

  pub fn code(&self) -> i32 {
    match self {
      ParamsError::Alloc => Self::CODE_ALLOC,
    }
  }
}

// --- Ring creation ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RingError {
  #[error("create ring failed: could not create params: {0}")]
  Params(#[from] ParamsError),

  #[error("create ring failed: could not allocate memory")]
  Alloc,

  /// The kernel refused the setup request. `code` is the positive errno
  /// (EINVAL for bad flags or depth, EMFILE/ENFILE for descriptor limits,
  /// EPERM for SQPOLL without privilege, ENOMEM for kernel resources).
  #[error("create ring failed: code: {code}, err: {message}")]
  Kernel { code: i32, message: String },
}

impl RingError {
  /// Code reported when the default params could not be built.
  pub const CODE_PARAMS: i32 = -1;
  /// Code reported when the ring's own bookkeeping could not be allocated.
  pub const CODE_ALLOC: i32 = -2;

  pub(crate) fn from_errno(errno: i32) -> Self {
    RingError::Kernel {
      code: errno,
      message: errno_message(errno),
    }
  }

  pub(crate) fn from_io(e: &io::Error) -> Self {
    Self::from_errno(errno_of(e))
  }

  /// Kernel errors report their errno; local failures use negative codes
  /// so they can never be confused with one.
  pub fn code(&self) -> i32 {
    match self {
      RingError::Params(_) => Self::CODE_PARAMS,
      RingError::Alloc => Self::CODE_ALLOC,
      RingError::Kernel { code, .. } => *code,
    }
  }
}

// --- Submission entries ---

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqeError {
  #[error("submission queue entry: could not allocate memory")]
  Alloc,

  /// Every slot is bound to a request whose completion has not been marked
  /// seen, or the kernel's submission ring has no free entry.
  #[error("submission queue entry: submission queue is full")]
  QueueFull,
}

impl SqeError {
  pub const CODE_ALLOC: i32 = 1;
  pub const CODE_QUEUE_FULL: i32 = 2;

  pub fn code(&self) -> i32 {
    match self {
      SqeError::Alloc => Self::CODE_ALLOC,
      SqeError::QueueFull => Self::CODE_QUEUE_FULL,
    }
  }

  /// True when draining completions and retrying can succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, SqeError::QueueFull)
  }
}

// --- Submit / wait ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
  #[error("submit failed: code: {code}, err: {message}")]
  Kernel { code: i32, message: String },
}

impl SubmitError {
  pub(crate) fn from_io(e: &io::Error) -> Self {
    let code = errno_of(e);
    SubmitError::Kernel {
      code,
      message: errno_message(code),
    }
  }

  pub fn code(&self) -> i32 {
    match self {
      SubmitError::Kernel { code, .. } => *code,
    }
  }
}

/// The blocking wait itself failed. A request that completed with a negative
/// result is not a `WaitError`; it is a successful wait carrying that result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
  #[error("wait for completion failed: code: {code}, err: {message}")]
  Kernel { code: i32, message: String },

  #[error("wait for completion timed out")]
  TimedOut,

  #[error("wait for completion: kernel does not support wait timeouts")]
  TimeoutUnsupported,
}

impl WaitError {
  pub(crate) fn from_io(e: &io::Error) -> Self {
    let code = errno_of(e);
    if code == libc::ETIME {
      return WaitError::TimedOut;
    }
    WaitError::Kernel {
      code,
      message: errno_message(code),
    }
  }

  pub fn code(&self) -> i32 {
    match self {
      WaitError::Kernel { code, .. } => *code,
      WaitError::TimedOut => libc::ETIME,
      WaitError::TimeoutUnsupported => libc::EINVAL,
    }
  }

  /// True when the wait was cut short by a signal and can simply be retried.
  pub fn is_interrupted(&self) -> bool {
    matches!(self, WaitError::Kernel { code, .. } if *code == libc::EINTR)
  }
}

// --- Writers ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteError {
  #[error(transparent)]
  Sqe(#[from] SqeError),

  #[error(transparent)]
  Submit(#[from] SubmitError),

  #[error(transparent)]
  Wait(#[from] WaitError),

  /// The write reached the kernel and completed with `-code`.
  #[error("write failed: code: {code}, err: {message}")]
  Request { code: i32, message: String },

  #[error("write failed: a previous write is still awaiting completion")]
  AlreadyInFlight,

  #[error("wait for completion failed: no write is in flight")]
  NothingInFlight,
}

impl WriteError {
  /// Builds a request error from a negative completion result.
  pub(crate) fn from_result(result: i32) -> Self {
    let code = result.saturating_neg();
    WriteError::Request {
      code,
      message: errno_message(code),
    }
  }

  pub fn code(&self) -> i32 {
    match self {
      WriteError::Sqe(e) => e.code(),
      WriteError::Submit(e) => e.code(),
      WriteError::Wait(e) => e.code(),
      WriteError::Request { code, .. } => *code,
      WriteError::AlreadyInFlight => libc::EBUSY,
      WriteError::NothingInFlight => libc::EINVAL,
    }
  }

  /// True when the queue was full and the write can be retried after draining.
  pub fn is_retryable(&self) -> bool {
    matches!(self, WriteError::Sqe(e) if e.is_retryable())
  }
}
