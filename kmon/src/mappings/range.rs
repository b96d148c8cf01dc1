//! Address range parsing and page alignment
//!
//! Bounds are carried as `u64` so the exclusive end of the last page,
//! `0x1_0000_0000`, is representable.

use kmon_common::{round_up, PGSIZE};

use crate::domain::{parse_address, MonitorError};

/// Usage line of the `showmappings` command
pub const USAGE: &str = "showmappings begin_addr end_addr";

const PAGE: u64 = PGSIZE as u64;

/// A requested `[begin, end)` range, not yet validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeQuery {
    pub begin: u64,
    pub end: u64,
}

impl RangeQuery {
    /// Parse the two address arguments of `showmappings`
    ///
    /// # Errors
    /// [`MonitorError::Usage`] unless exactly two arguments are given,
    /// [`MonitorError::InvalidAddress`] if either is not a number
    pub fn parse(args: &[&str]) -> Result<Self, MonitorError> {
        let [begin, end] = args else {
            return Err(MonitorError::Usage(USAGE));
        };
        Ok(Self { begin: u64::from(parse_address(begin)?), end: u64::from(parse_address(end)?) })
    }

    #[must_use]
    pub fn is_page_aligned(&self) -> bool {
        self.begin % PAGE == 0 && self.end % PAGE == 0
    }

    /// Both bounds rounded up to the next page boundary
    #[must_use]
    pub fn page_aligned(self) -> Self {
        Self { begin: round_up(self.begin, PAGE), end: round_up(self.end, PAGE) }
    }

    /// Validate the query as a non-empty page range, aligning it first
    ///
    /// # Errors
    /// [`MonitorError::EmptyRange`] when `end <= begin` after alignment
    pub fn into_page_range(self) -> Result<PageRange, MonitorError> {
        let Self { begin, end } = self.page_aligned();
        if end <= begin {
            return Err(MonitorError::EmptyRange { begin, end });
        }
        Ok(PageRange { begin, end })
    }
}

/// A non-empty, page-aligned `[begin, end)` range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    begin: u64,
    end: u64,
}

impl PageRange {
    #[must_use]
    pub fn begin(&self) -> u64 {
        self.begin
    }

    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub fn page_count(&self) -> u64 {
        (self.end - self.begin) / PAGE
    }

    /// Start address of every page in the range, ascending
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        (self.begin..self.end).step_by(PGSIZE as usize).filter_map(|va| u32::try_from(va).ok())
    }
}
