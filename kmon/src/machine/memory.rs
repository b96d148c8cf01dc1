//! Flat, bounds-checked memory views
//!
//! Every read the monitor performs on the inspected machine goes through
//! [`MemoryRegion::read_u32`]. A read that is misaligned or falls outside the
//! region yields `None` instead of touching anything, which lets the
//! traversals treat garbage pointers as ordinary data.

use kmon_common::PGSIZE;
use log::debug;

use crate::domain::SnapshotError;

const WORD: u32 = 4;

/// A contiguous run of 32-bit words starting at `base`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    base: u32,
    words: Vec<u32>,
}

impl MemoryRegion {
    /// Create a region from its contents
    ///
    /// # Errors
    /// Fails if `base` is not word aligned or the region would extend past
    /// the top of the 32-bit address space
    pub fn new(base: u32, words: Vec<u32>) -> Result<Self, SnapshotError> {
        if base % WORD != 0 {
            return Err(SnapshotError::MisalignedRegion { base });
        }
        let end = u64::from(base) + words.len() as u64 * u64::from(WORD);
        if end > 1 << 32 {
            return Err(SnapshotError::RegionOverflow { base, words: words.len() });
        }
        Ok(Self { base, words })
    }

    /// Create a zero-filled region of `bytes` bytes (rounded up to a word)
    ///
    /// # Errors
    /// Same conditions as [`MemoryRegion::new`]
    pub fn zeroed(base: u32, bytes: u64) -> Result<Self, SnapshotError> {
        let words = usize::try_from(bytes.div_ceil(u64::from(WORD)))
            .map_err(|_| SnapshotError::RegionOverflow { base, words: usize::MAX })?;
        Self::new(base, vec![0; words])
    }

    /// Lowest address in the region
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// One past the highest address in the region
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.base) + self.size()
    }

    /// Size of the region in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.words.len() as u64 * u64::from(WORD)
    }

    /// Number of words held by the region
    #[must_use]
    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    fn index_of(&self, addr: u32) -> Option<usize> {
        if addr % WORD != 0 || addr < self.base {
            return None;
        }
        let index = ((addr - self.base) / WORD) as usize;
        (index < self.words.len()).then_some(index)
    }

    /// Read the word at `addr`, or `None` if it is misaligned or out of range
    #[must_use]
    pub fn read_u32(&self, addr: u32) -> Option<u32> {
        let word = self.index_of(addr).map(|i| self.words[i]);
        if word.is_none() {
            debug!("Read of {addr:#010x} outside [{:#010x}, {:#x})", self.base, self.end());
        }
        word
    }

    /// Write the word at `addr`; `None` if it is misaligned or out of range
    #[must_use]
    pub fn write_u32(&mut self, addr: u32, value: u32) -> Option<()> {
        let index = self.index_of(addr)?;
        self.words[index] = value;
        Some(())
    }

    /// Zero the page starting at `addr`
    ///
    /// # Errors
    /// Fails if any word of the page lies outside the region
    pub fn clear_page(&mut self, addr: u32) -> Result<(), SnapshotError> {
        let outside = || SnapshotError::OutsidePhysicalMemory { pa: addr, size: self.size() };
        let first = self.index_of(addr).ok_or_else(outside)?;
        let last = first + (PGSIZE / WORD) as usize;
        if last > self.words.len() {
            return Err(outside());
        }
        self.words[first..last].fill(0);
        Ok(())
    }
}
