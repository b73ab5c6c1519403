// src/sqe.rs

use crate::error::SqeError;
use crate::mem;
use crate::ring::Ring;

use std::fmt;
use std::os::unix::io::RawFd;

use io_uring::{opcode, squeue, types};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
  Free,
  /// Handed out by `claim`, not yet placed in the submission ring.
  Reserved,
  /// Placed in the submission ring; stays here until its completion is marked seen.
  InFlight,
}

/// Scratch descriptor owned by one pool slot. The iovec lives inside the
/// pool's boxed slice, so its address stays fixed for the life of the ring
/// even when the `Ring` value itself moves.
struct SqeSlot {
  offset: u64,
  iov: libc::iovec,
  user_data: u64,
  state: SlotState,
}

impl SqeSlot {
  fn empty() -> Self {
    Self {
      offset: 0,
      iov: libc::iovec {
        iov_base: std::ptr::null_mut(),
        iov_len: 0,
      },
      user_data: 0,
      state: SlotState::Free,
    }
  }
}

/// Fixed pool of submission slots, reused cyclically.
pub(crate) struct SqePool {
  slots: Box<[SqeSlot]>,
  next_index: usize,
  live: usize,
}

impl SqePool {
  pub fn new(depth: usize) -> Result<Self, SqeError> {
    let slots = mem::try_boxed_slice(depth, |_| SqeSlot::empty()).map_err(|_| SqeError::Alloc)?;
    Ok(Self {
      slots,
      next_index: 0,
      live: 0,
    })
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn next_index(&self) -> usize {
    self.next_index
  }

  /// Slots that are reserved or in flight.
  pub fn live(&self) -> usize {
    self.live
  }

  /// Picks the first free slot at or after the cursor and moves the cursor
  /// past it. Slots whose completion has not been marked seen are skipped,
  /// so a live request's descriptor is never rebound.
  pub fn claim(&mut self) -> Result<usize, SqeError> {
    let len = self.slots.len();
    if self.live == len {
      return Err(SqeError::QueueFull);
    }
    for step in 0..len {
      let index = (self.next_index + step) % len;
      if self.slots[index].state == SlotState::Free {
        let slot = &mut self.slots[index];
        slot.state = SlotState::Reserved;
        slot.offset = 0;
        slot.iov.iov_base = std::ptr::null_mut();
        slot.iov.iov_len = 0;
        slot.user_data = 0;
        self.live += 1;
        self.next_index = (index + 1) % len;
        return Ok(index);
      }
    }
    Err(SqeError::QueueFull)
  }

  /// Returns a reserved slot that was never placed in the ring.
  pub fn unclaim(&mut self, index: usize) {
    let slot = &mut self.slots[index];
    debug_assert_eq!(slot.state, SlotState::Reserved);
    slot.state = SlotState::Free;
    self.live -= 1;
  }

  pub fn mark_in_flight(&mut self, index: usize) {
    let slot = &mut self.slots[index];
    debug_assert_eq!(slot.state, SlotState::Reserved);
    slot.state = SlotState::InFlight;
  }

  /// Frees an in-flight slot after its completion has been seen.
  /// Returns false if the slot was not in flight.
  pub fn release(&mut self, index: usize) -> bool {
    match self.slots.get_mut(index) {
      Some(slot) if slot.state == SlotState::InFlight => {
        slot.state = SlotState::Free;
        self.live -= 1;
        true
      }
      _ => false,
    }
  }

  #[cfg(test)]
  pub fn is_in_flight(&self, index: usize) -> bool {
    self.slots.get(index).map_or(false, |s| s.state == SlotState::InFlight)
  }

  /// Points the slot's iovec at `ptr`/`len` and returns its address.
  fn bind(&mut self, index: usize, ptr: *mut u8, len: usize, offset: u64) -> *const libc::iovec {
    let slot = &mut self.slots[index];
    slot.offset = offset;
    slot.iov.iov_base = ptr.cast();
    slot.iov.iov_len = len;
    &slot.iov as *const libc::iovec
  }

  pub fn set_user_data(&mut self, index: usize, user_data: u64) {
    self.slots[index].user_data = user_data;
  }

  pub fn user_data(&self, index: usize) -> u64 {
    self.slots[index].user_data
  }

  pub fn offset(&self, index: usize) -> u64 {
    self.slots[index].offset
  }
}

impl fmt::Debug for SqePool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SqePool")
      .field("len", &self.slots.len())
      .field("next_index", &self.next_index)
      .field("live", &self.live)
      .finish_non_exhaustive()
  }
}

/// A submission slot borrowed from a [`Ring`].
///
/// Obtained from [`Ring::acquire_sqe`]. One of the `prep_*` methods binds the
/// operation and places it in the submission ring; it is sent to the kernel
/// by the next [`Ring::submit`]. Dropping the handle without preparing it
/// returns the slot to the pool.
pub struct Sqe<'r> {
  ring: &'r mut Ring,
  index: usize,
  committed: bool,
}

impl<'r> Sqe<'r> {
  pub(crate) fn new(ring: &'r mut Ring, index: usize) -> Self {
    Self {
      ring,
      index,
      committed: false,
    }
  }

  /// Position of the slot in the ring's pool.
  pub fn index(&self) -> usize {
    self.index
  }

  /// Attaches correlation data, echoed back by [`Cqe::user_data`](crate::Cqe::user_data).
  pub fn set_user_data(&mut self, user_data: u64) -> &mut Self {
    self.ring.pool.set_user_data(self.index, user_data);
    self
  }

  /// Prepares a single-buffer vectored write of `buf` at `offset`.
  ///
  /// # Safety
  ///
  /// `buf` must stay valid and must not be moved or freed until the
  /// completion for this entry has been reaped.
  pub unsafe fn prep_writev(mut self, fd: RawFd, buf: &[u8], offset: u64) -> Result<(), SqeError> {
    let iov = self
      .ring
      .pool
      .bind(self.index, buf.as_ptr() as *mut u8, buf.len(), offset);
    let entry = opcode::Writev::new(types::Fd(fd), iov, 1).offset(offset).build();
    self.commit(entry)
  }

  /// Prepares a single-buffer vectored read into `buf` from `offset`.
  ///
  /// # Safety
  ///
  /// `buf` must stay valid, unmoved and otherwise unaccessed until the
  /// completion for this entry has been reaped.
  pub unsafe fn prep_readv(mut self, fd: RawFd, buf: &mut [u8], offset: u64) -> Result<(), SqeError> {
    let iov = self.ring.pool.bind(self.index, buf.as_mut_ptr(), buf.len(), offset);
    let entry = opcode::Readv::new(types::Fd(fd), iov, 1).offset(offset).build();
    self.commit(entry)
  }

  /// Prepares an fsync of `fd`. Ordering against earlier writes is not
  /// implied; wait for those completions first.
  pub fn prep_fsync(mut self, fd: RawFd) -> Result<(), SqeError> {
    let entry = opcode::Fsync::new(types::Fd(fd)).build();
    self.commit(entry)
  }

  pub fn prep_nop(mut self) -> Result<(), SqeError> {
    let entry = opcode::Nop::new().build();
    self.commit(entry)
  }

  fn commit(&mut self, entry: squeue::Entry) -> Result<(), SqeError> {
    let entry = entry.user_data(self.index as u64);
    // SAFETY: the iovec the entry may point to lives in the pool, which is
    // not freed while the slot is in flight. Buffer validity is the caller's
    // contract on the unsafe `prep_*` methods.
    unsafe { self.ring.push_entry(&entry)? };
    self.ring.pool.mark_in_flight(self.index);
    self.committed = true;
    trace!(
      "Sqe {} prepared (offset {}, user_data {}).",
      self.index,
      self.ring.pool.offset(self.index),
      self.ring.pool.user_data(self.index)
    );
    Ok(())
  }
}

impl Drop for Sqe<'_> {
  fn drop(&mut self) {
    if !self.committed {
      trace!("Sqe {} dropped unprepared; returning it to the pool.", self.index);
      self.ring.pool.unclaim(self.index);
    }
  }
}

impl fmt::Debug for Sqe<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sqe")
      .field("index", &self.index)
      .field("committed", &self.committed)
      .finish()
  }
}
