//! Commit frontier
//!
//! The poller numbers every entry in discovery order and marks the last entry
//! of each page. Workers finish out of order, so a committed batch can contain
//! records newer than ones still being fetched. The frontier only hands out a
//! resume cursor for a page once every entry up to and including that page's
//! last entry has been committed.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Place of an entry in the scrape, assigned by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Discovery order, starting at 0 for each run
    pub seq: u64,
    /// Last entry of an index page; its timestamp is that page's next cursor
    pub closes_page: bool,
}

#[derive(Debug, Default)]
pub struct CommitFrontier {
    /// Lowest sequence number not committed yet
    next: u64,
    /// Committed sequence numbers above `next`
    ahead: BTreeSet<u64>,
    /// Page ends not yet covered by the contiguous prefix
    page_ends: BTreeMap<u64, DateTime<Utc>>,
}

impl CommitFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a batch as committed.
    ///
    /// Returns the newest page cursor whose page and all earlier pages are now
    /// fully committed, or `None` when the covered prefix did not reach a new
    /// page end.
    pub fn advance<I>(&mut self, committed: I) -> Option<DateTime<Utc>>
    where
        I: IntoIterator<Item = (Position, DateTime<Utc>)>,
    {
        for (position, timestamp) in committed {
            if position.closes_page {
                self.page_ends.insert(position.seq, timestamp);
            }
            if position.seq >= self.next {
                self.ahead.insert(position.seq);
            }
        }

        while self.ahead.remove(&self.next) {
            self.next += 1;
        }

        let pending = self.page_ends.split_off(&self.next);
        let covered = std::mem::replace(&mut self.page_ends, pending);
        covered.into_values().next_back()
    }

    /// Entries committed out of order and still waiting on an earlier one
    pub fn waiting(&self) -> usize {
        self.ahead.len()
    }
}
