//! Item and byte budgets for a single run
//!
//! Budgets only ever grow their consumed totals; nothing is refunded once
//! committed.

use crate::storage::reason;
use crate::url::TargetKind;

/// Why a bulk candidate was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetRejection {
    /// `max_count` items were already committed
    CountExhausted,
    /// The candidate would push consumed bytes past `max_bytes`
    BytesExceeded { remaining_bytes: u64 },
}

impl BudgetRejection {
    /// Reason string written to the failure log
    pub fn reason(&self) -> &'static str {
        reason::SIZE_LIMIT
    }
}

/// Cumulative byte and item ceiling for bulk downloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkBudget {
    pub max_count: usize,
    pub max_bytes: u64,
    pub consumed_count: usize,
    pub consumed_bytes: u64,
}

impl BulkBudget {
    pub fn new(max_count: usize, max_bytes: u64) -> Self {
        Self {
            max_count,
            max_bytes,
            consumed_count: 0,
            consumed_bytes: 0,
        }
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.max_bytes.saturating_sub(self.consumed_bytes)
    }

    /// True once no further candidate can be admitted
    pub fn is_exhausted(&self) -> bool {
        self.consumed_count >= self.max_count || self.consumed_bytes >= self.max_bytes
    }

    /// Checks a candidate of `candidate_bytes` without consuming anything
    pub fn reserve(&self, candidate_bytes: u64) -> bool {
        self.check(candidate_bytes).is_ok()
    }

    /// Same as [`reserve`](Self::reserve), reporting why a candidate was refused
    pub fn check(&self, candidate_bytes: u64) -> Result<(), BudgetRejection> {
        if self.consumed_count + 1 > self.max_count {
            return Err(BudgetRejection::CountExhausted);
        }
        match self.consumed_bytes.checked_add(candidate_bytes) {
            Some(total) if total <= self.max_bytes => Ok(()),
            _ => Err(BudgetRejection::BytesExceeded {
                remaining_bytes: self.remaining_bytes(),
            }),
        }
    }

    /// Consumes the actual size of a finished download
    ///
    /// The check is repeated against the actual size, because a declared
    /// length can under-report. An overflowing commit changes nothing.
    pub fn commit(&mut self, actual_bytes: u64) -> Result<(), BudgetRejection> {
        self.check(actual_bytes)?;
        self.consumed_count += 1;
        self.consumed_bytes += actual_bytes;
        Ok(())
    }
}

/// Independent page and attachment ceilings for the crawl phase
///
/// Dispatching a target reserves a slot; the slot is either consumed (the
/// target was recorded) or released (it failed). Counting reservations
/// keeps concurrent workers from overshooting a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlBudget {
    max_pages: usize,
    max_attachments: usize,
    pages: ClassCounter,
    attachments: ClassCounter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ClassCounter {
    consumed: usize,
    in_flight: usize,
}

impl CrawlBudget {
    pub fn new(max_pages: usize, max_attachments: usize) -> Self {
        Self {
            max_pages,
            max_attachments,
            pages: ClassCounter::default(),
            attachments: ClassCounter::default(),
        }
    }

    fn class(&self, kind: TargetKind) -> (&ClassCounter, usize) {
        match kind {
            TargetKind::Page => (&self.pages, self.max_pages),
            TargetKind::Attachment => (&self.attachments, self.max_attachments),
        }
    }

    fn class_mut(&mut self, kind: TargetKind) -> &mut ClassCounter {
        match kind {
            TargetKind::Page => &mut self.pages,
            TargetKind::Attachment => &mut self.attachments,
        }
    }

    /// True if another target of this kind may be dispatched
    pub fn has_room(&self, kind: TargetKind) -> bool {
        let (counter, max) = self.class(kind);
        counter.consumed + counter.in_flight < max
    }

    /// True once both classes are full
    pub fn is_exhausted(&self) -> bool {
        !self.has_room(TargetKind::Page) && !self.has_room(TargetKind::Attachment)
    }

    /// Reserves a slot; returns false if the class is full
    pub fn reserve(&mut self, kind: TargetKind) -> bool {
        if !self.has_room(kind) {
            return false;
        }
        self.class_mut(kind).in_flight += 1;
        true
    }

    /// Turns a reservation into a consumed slot
    pub fn consume(&mut self, kind: TargetKind) {
        let counter = self.class_mut(kind);
        counter.in_flight = counter.in_flight.saturating_sub(1);
        counter.consumed += 1;
    }

    /// Gives a reservation back
    pub fn release(&mut self, kind: TargetKind) {
        let counter = self.class_mut(kind);
        counter.in_flight = counter.in_flight.saturating_sub(1);
    }

    pub fn consumed(&self, kind: TargetKind) -> usize {
        self.class(kind).0.consumed
    }
}
