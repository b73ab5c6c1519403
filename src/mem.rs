// src/mem.rs

//! Fallible allocation helpers.
//!
//! Ring setup reports allocation failure as an error value instead of
//! aborting, so the few long-lived allocations the crate makes go through
//! `try_reserve_exact`.

use std::collections::TryReserveError;

/// Boxes `value`, returning an error instead of aborting when the allocator fails.
pub(crate) fn try_box<T>(value: T) -> Result<Box<T>, TryReserveError> {
  let mut slot: Vec<T> = Vec::new();
  slot.try_reserve_exact(1)?;
  slot.push(value);
  let boxed: Box<[T]> = slot.into_boxed_slice();
  // SAFETY: the slice holds exactly one element, so its allocation has the
  // layout of a single `T` and may be reinterpreted as `Box<T>`.
  Ok(unsafe { Box::from_raw(Box::into_raw(boxed) as *mut T) })
}

/// Allocates a boxed slice of `len` elements produced by `make`.
pub(crate) fn try_boxed_slice<T>(len: usize, mut make: impl FnMut(usize) -> T) -> Result<Box<[T]>, TryReserveError> {
  let mut items: Vec<T> = Vec::new();
  items.try_reserve_exact(len)?;
  for i in 0..len {
    items.push(make(i));
  }
  Ok(items.into_boxed_slice())
}
