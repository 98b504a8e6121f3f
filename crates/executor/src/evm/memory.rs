//! Byte-addressable, word-billed EVM memory.

use alloy_primitives::U256;

use crate::errors::FrameError;
use crate::gas::bytes_to_words;

/// Linear memory. Grows in 32-byte words; callers charge [`crate::gas::memory_expansion_cost`]
/// themselves before calling [`Memory::resize`].
#[derive(Debug, Clone, Default)]
pub struct Memory(Vec<u8>);

impl Memory {
    /// Empty memory.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Current size in bytes (always a multiple of 32).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether memory is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Current size in 32-byte words.
    pub fn words(&self) -> u64 {
        bytes_to_words(self.0.len() as u64)
    }

    /// Grows memory so that it is at least `new_words` words long, zero-filling the new region.
    pub fn resize(&mut self, new_words: u64) {
        let new_len = new_words as usize * 32;
        if new_len > self.0.len() {
            self.0.resize(new_len, 0);
        }
    }

    /// Ensures memory covers `offset..offset+len`, growing it (in whole words) if needed. Returns
    /// the number of words memory must be grown to, for gas-charging purposes.
    pub fn words_required(offset: u64, len: u64) -> u64 {
        if len == 0 {
            0
        } else {
            bytes_to_words(offset.saturating_add(len))
        }
    }

    /// Reads a 32-byte word at `offset`, zero-extending past the end of allocated memory is not
    /// permitted: callers must `resize` first.
    pub fn load(&self, offset: usize) -> Result<U256, FrameError> {
        let end = offset.checked_add(32).ok_or(FrameError::OutOfBoundsRead)?;
        let slice = self.0.get(offset..end).ok_or(FrameError::OutOfBoundsRead)?;
        Ok(U256::from_be_slice(slice))
    }

    /// Writes a 32-byte word at `offset`.
    pub fn store(&mut self, offset: usize, value: U256) -> Result<(), FrameError> {
        let end = offset.checked_add(32).ok_or(FrameError::OutOfBoundsRead)?;
        let slice = self.0.get_mut(offset..end).ok_or(FrameError::OutOfBoundsRead)?;
        slice.copy_from_slice(&value.to_be_bytes::<32>());
        Ok(())
    }

    /// Writes a single byte at `offset`.
    pub fn store_byte(&mut self, offset: usize, value: u8) -> Result<(), FrameError> {
        let byte = self.0.get_mut(offset).ok_or(FrameError::OutOfBoundsRead)?;
        *byte = value;
        Ok(())
    }

    /// Copies `src` into memory starting at `offset`, growing memory first if necessary.
    pub fn set_slice(&mut self, offset: usize, src: &[u8]) -> Result<(), FrameError> {
        if src.is_empty() {
            return Ok(());
        }
        let end = offset.checked_add(src.len()).ok_or(FrameError::OutOfBoundsRead)?;
        let slice = self.0.get_mut(offset..end).ok_or(FrameError::OutOfBoundsRead)?;
        slice.copy_from_slice(src);
        Ok(())
    }

    /// Reads `len` bytes starting at `offset`, zero-extending past the allocated region (the
    /// behavior `CALLDATACOPY`/`CODECOPY`/`RETURNDATACOPY` rely on for out-of-bounds reads).
    pub fn load_padded(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        if offset >= self.0.len() {
            return out;
        }
        let available = (self.0.len() - offset).min(len);
        out[..available].copy_from_slice(&self.0[offset..offset + available]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_zero_fills_new_region() {
        let mut mem = Memory::new();
        mem.resize(1);
        assert_eq!(mem.len(), 32);
        assert_eq!(mem.load(0).unwrap(), U256::ZERO);
    }

    #[test]
    fn store_then_load_round_trips() {
        let mut mem = Memory::new();
        mem.resize(1);
        mem.store(0, U256::from(7u64)).unwrap();
        assert_eq!(mem.load(0).unwrap(), U256::from(7u64));
    }

    #[test]
    fn load_past_allocation_is_out_of_bounds() {
        let mem = Memory::new();
        assert_eq!(mem.load(0), Err(FrameError::OutOfBoundsRead));
    }

    #[test]
    fn load_padded_zero_extends() {
        let mut mem = Memory::new();
        mem.resize(1);
        mem.set_slice(0, &[1, 2, 3]).unwrap();
        let out = mem.load_padded(30, 8);
        assert_eq!(out, vec![0, 0, 1, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn words_required_rounds_up() {
        assert_eq!(Memory::words_required(0, 1), 1);
        assert_eq!(Memory::words_required(0, 33), 2);
        assert_eq!(Memory::words_required(0, 0), 0);
    }
}
