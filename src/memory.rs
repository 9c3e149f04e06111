//! Flat program memory.
//!
//! The first [`RESERVED`] slots are memory-mapped host state. Program code may
//! write them, but the host rewrites all of them before every tick, so a write
//! only lasts until the end of the tick that made it.

/// The smallest memory a program ever gets.
pub const MIN_MEMORY: usize = 32;

/// Control1 and Control2, then A, B, Up, Down, Left, Right.
pub const BUTTONS: usize = 0;
pub const BUTTON_COUNT: usize = 8;
pub const MEMORY_SIZE: usize = 8;
pub const DISPLAY_WIDTH: usize = 9;
pub const DISPLAY_HEIGHT: usize = 10;
pub const TICK_RATE: usize = 11;
pub const DELTA_MS: usize = 12;

/// Number of host-owned slots at the bottom of memory.
pub const RESERVED: usize = 13;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("address {address} is out of bounds for {len} slots of memory")]
pub struct OutOfBounds {
  pub address: i64,
  pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
  slots: Vec<i32>,
}

impl Memory {
  /// Allocate zeroed memory, never smaller than [`MIN_MEMORY`].
  pub fn new(size: usize) -> Self {
    Self {
      slots: vec![0; size.max(MIN_MEMORY)],
    }
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn read(&self, address: i64) -> Result<i32, OutOfBounds> {
    let index = self.index(address)?;
    Ok(self.slots[index])
  }

  pub fn write(&mut self, address: i64, value: i32) -> Result<(), OutOfBounds> {
    let index = self.index(address)?;
    self.slots[index] = value;
    Ok(())
  }

  /// Copy `values` into memory starting at `address`. Nothing is written if
  /// the region does not fit.
  pub fn load(&mut self, address: usize, values: &[i32]) -> Result<(), OutOfBounds> {
    let end = address
      .checked_add(values.len())
      .filter(|end| *end <= self.slots.len())
      .ok_or(OutOfBounds {
        address: i64::try_from(address.saturating_add(values.len().saturating_sub(1)))
          .unwrap_or(i64::MAX),
        len: self.slots.len(),
      })?;
    self.slots[address..end].copy_from_slice(values);
    Ok(())
  }

  pub fn as_slice(&self) -> &[i32] {
    &self.slots
  }

  /// The host-owned slots, always present since memory is at least
  /// [`MIN_MEMORY`] long.
  pub fn reserved_mut(&mut self) -> &mut [i32] {
    &mut self.slots[..RESERVED]
  }

  fn index(&self, address: i64) -> Result<usize, OutOfBounds> {
    usize::try_from(address)
      .ok()
      .filter(|index| *index < self.slots.len())
      .ok_or(OutOfBounds {
        address,
        len: self.slots.len(),
      })
  }
}
