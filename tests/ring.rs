// tests/ring.rs

use ioring::{Params, Ring, RingConfig, RingError, SetupFlags, SqeError, WaitError};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

mod common;

#[test]
fn new_ring_reports_exact_depth() {
  for depth in [1u32, 2, 7, 64, 100, 128, 256] {
    let Some(ring) = common::test_ring(depth) else { return };
    assert_eq!(ring.queue_depth(), depth);
    assert!(ring.sq_capacity() >= depth);
    assert_eq!(ring.in_flight(), 0);
    ring.destroy();
  }
}

#[test]
fn zero_depth_is_rejected() {
  let err = Ring::new(0, None).unwrap_err();
  assert_eq!(err.code(), libc::EINVAL);
  assert!(matches!(err, RingError::Kernel { .. }));
}

#[test]
fn sq_affinity_without_sqpoll_is_kernel_rejected() {
  if !common::io_uring_available() {
    return;
  }
  let params = Params::new(SetupFlags::SQ_AFF, 0, 0, 0).unwrap();
  let err = Ring::new(8, Some(params)).unwrap_err();
  assert_eq!(err.code(), libc::EINVAL);
  assert!(err.to_string().starts_with("create ring failed: code: 22"), "{}", err);
}

#[test]
fn custom_cq_size_is_applied() {
  let params = Params::new(SetupFlags::CQSIZE, 0, 0, 1024).unwrap();
  let Some(ring) = common::test_ring_with(16, Some(params)) else { return };
  assert_eq!(ring.cq_capacity(), 1024);
  assert!(ring.params().flags().contains(SetupFlags::CQSIZE));
  ring.destroy();
}

#[test]
fn with_config_applies_wait_timeout() {
  if !common::io_uring_available() {
    return;
  }
  let config = RingConfig {
    queue_depth: 8,
    wait_timeout: Some(Duration::from_millis(20)),
    ..RingConfig::default()
  };
  let ring = Ring::with_config(&config).expect("ring from config");
  assert_eq!(ring.queue_depth(), 8);
  assert_eq!(ring.wait_timeout(), Some(Duration::from_millis(20)));
}

#[test]
fn prep_writev_submit_wait_and_mark_seen() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(128) else { return Ok(()) };
  let (path, file) = common::fresh_file("prep_writev");
  let data = vec![0u8; 256];

  let mut sqe = ring.acquire_sqe()?;
  sqe.set_user_data(42);
  unsafe { sqe.prep_writev(file.as_raw_fd(), &data, 0)? };
  assert_eq!(ring.in_flight(), 1);
  ring.submit()?;

  let cqe = ring.wait_for_completion()?;
  assert_eq!(cqe.result(), 256);
  assert_eq!(cqe.user_data(), 42);
  assert_eq!(ring.last_completion(), Some(cqe.completion()));
  ring.mark_seen(cqe);
  assert_eq!(ring.in_flight(), 0);

  assert_eq!(std::fs::metadata(&path)?.len(), 256);
  ring.destroy();
  std::fs::remove_file(&path)?;
  Ok(())
}

#[test]
fn acquiring_past_depth_yields_queue_full() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(128) else { return Ok(()) };
  let (path, file) = common::fresh_file("queue_full");
  let fd = file.as_raw_fd();
  let data = vec![0u8; 256];

  for i in 0..128u64 {
    let mut sqe = ring.acquire_sqe()?;
    sqe.set_user_data(i);
    unsafe { sqe.prep_writev(fd, &data, i * 256)? };
    ring.submit()?;
  }

  let err = ring.acquire_sqe().unwrap_err();
  assert_eq!(err, SqeError::QueueFull);
  assert!(err.is_retryable());
  assert_eq!(ring.in_flight(), 128);

  // Drain-and-retry.
  let mut seen = Vec::new();
  for _ in 0..128 {
    let cqe = ring.wait_for_completion()?;
    assert_eq!(cqe.result(), 256);
    seen.push(cqe.user_data());
    ring.mark_seen(cqe);
  }
  seen.sort_unstable();
  assert_eq!(seen, (0..128).collect::<Vec<u64>>());
  assert_eq!(ring.in_flight(), 0);

  let sqe = ring.acquire_sqe()?;
  drop(sqe);

  assert_eq!(std::fs::metadata(&path)?.len(), 128 * 256);
  ring.destroy();
  std::fs::remove_file(&path)?;
  Ok(())
}

#[test]
fn pool_bounds_acquisitions_below_kernel_capacity() -> anyhow::Result<()> {
  // The kernel rounds 3 up to 4 entries; the pool still stops at 3.
  let Some(mut ring) = common::test_ring(3) else { return Ok(()) };
  assert!(ring.sq_capacity() >= 4);

  for _ in 0..3 {
    ring.acquire_sqe()?.prep_nop()?;
  }
  assert_eq!(ring.acquire_sqe().unwrap_err(), SqeError::QueueFull);

  ring.submit()?;
  for _ in 0..3 {
    let cqe = ring.wait_for_completion()?;
    assert_eq!(cqe.result(), 0);
    ring.mark_seen(cqe);
  }
  ring.destroy();
  Ok(())
}

#[test]
fn dropping_an_unprepared_handle_returns_its_slot() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(2) else { return Ok(()) };
  {
    let sqe = ring.acquire_sqe()?;
    assert_eq!(sqe.index(), 0);
  }
  assert_eq!(ring.in_flight(), 0);

  // The cursor still advanced past slot 0.
  let sqe = ring.acquire_sqe()?;
  assert_eq!(sqe.index(), 1);
  drop(sqe);
  ring.destroy();
  Ok(())
}

#[test]
fn slots_are_reused_cyclically() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(2) else { return Ok(()) };
  let mut indices = Vec::new();
  for round in 0..5u64 {
    let mut sqe = ring.acquire_sqe()?;
    indices.push(sqe.index());
    sqe.set_user_data(round);
    sqe.prep_nop()?;
    ring.submit()?;
    let cqe = ring.wait_for_completion()?;
    assert_eq!(cqe.user_data(), round);
    ring.mark_seen(cqe);
  }
  assert_eq!(indices, vec![0, 1, 0, 1, 0]);
  ring.destroy();
  Ok(())
}

#[test]
fn failed_request_is_a_successful_wait() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(8) else { return Ok(()) };
  let (path, _rw) = common::fresh_file("read_only");
  let read_only = std::fs::File::open(&path)?;
  let data = vec![1u8; 16];

  let sqe = ring.acquire_sqe()?;
  unsafe { sqe.prep_writev(read_only.as_raw_fd(), &data, 0)? };
  ring.submit()?;

  let cqe = ring.wait_for_completion()?;
  assert!(!cqe.is_success());
  assert_eq!(cqe.result(), -libc::EBADF);
  assert_eq!(cqe.completion().error().and_then(|e| e.raw_os_error()), Some(libc::EBADF));
  ring.mark_seen(cqe);

  ring.destroy();
  std::fs::remove_file(&path)?;
  Ok(())
}

#[test]
fn readv_reads_back_written_bytes() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(8) else { return Ok(()) };
  let (path, file) = common::fresh_file("readv");
  let fd = file.as_raw_fd();
  let data = vec![0u8; 256];

  unsafe { ring.acquire_sqe()?.prep_writev(fd, &data, 0)? };
  ring.submit()?;
  let cqe = ring.wait_for_completion()?;
  assert_eq!(cqe.result(), 256);
  ring.mark_seen(cqe);

  let mut back = vec![0xffu8; 256];
  unsafe { ring.acquire_sqe()?.prep_readv(fd, &mut back, 0)? };
  ring.submit()?;
  let cqe = ring.wait_for_completion()?;
  assert_eq!(cqe.result(), 256);
  ring.mark_seen(cqe);
  assert!(back.iter().all(|&b| b == 0));

  ring.acquire_sqe()?.prep_fsync(fd)?;
  ring.submit()?;
  let cqe = ring.wait_for_completion()?;
  assert_eq!(cqe.result(), 0);
  ring.mark_seen(cqe);

  ring.destroy();
  std::fs::remove_file(&path)?;
  Ok(())
}

#[test]
fn bounded_wait_times_out_when_idle() {
  let Some(mut ring) = common::test_ring(4) else { return };
  match ring.wait_for_completion_timeout(Duration::from_millis(30)) {
    Err(WaitError::TimedOut) | Err(WaitError::TimeoutUnsupported) => {}
    other => panic!("expected a timeout, got {:?}", other),
  }
  assert!(ring.peek_completion().is_none());
  ring.destroy();
}

#[test]
fn peek_is_empty_after_reaping() -> anyhow::Result<()> {
  let Some(mut ring) = common::test_ring(4) else { return Ok(()) };
  let mut sqe = ring.acquire_sqe()?;
  sqe.set_user_data(5);
  sqe.prep_nop()?;
  ring.submit()?;

  let cqe = ring.wait_for_completion_timeout(Duration::from_secs(5)).or_else(|e| match e {
    WaitError::TimeoutUnsupported => ring.wait_for_completion(),
    other => Err(other),
  })?;
  assert_eq!(cqe.user_data(), 5);
  ring.mark_seen(cqe);
  assert!(ring.peek_completion().is_none());
  ring.destroy();
  Ok(())
}

#[test]
fn default_wait_timeout_bounds_wait_for_completion() {
  if !common::io_uring_available() {
    return;
  }
  let config = RingConfig {
    queue_depth: 4,
    wait_timeout: Some(Duration::from_millis(20)),
    ..RingConfig::default()
  };
  let mut ring = Ring::with_config(&config).expect("ring from config");
  match ring.wait_for_completion() {
    Err(WaitError::TimedOut) | Err(WaitError::TimeoutUnsupported) => {}
    other => panic!("expected a timeout, got {:?}", other),
  }
  ring.destroy();
}

#[test]
fn completion_from_another_ring_releases_nothing() -> anyhow::Result<()> {
  let Some(mut first) = common::test_ring(2) else { return Ok(()) };
  let Some(mut second) = common::test_ring(2) else { return Ok(()) };

  first.acquire_sqe()?.prep_nop()?;
  first.submit()?;
  second.acquire_sqe()?.prep_nop()?;
  second.submit()?;

  // Both completions use slot 0; only the owning ring may release it.
  let foreign = first.wait_for_completion()?;
  second.mark_seen(foreign);
  assert_eq!(second.in_flight(), 1);
  assert_eq!(first.in_flight(), 1);

  let own = second.wait_for_completion()?;
  second.mark_seen(own);
  assert_eq!(second.in_flight(), 0);

  first.destroy();
  second.destroy();
  Ok(())
}
