//! Run-scoped spend ceiling for paid classifier calls.
//!
//! Amounts are tracked in micro-dollars so repeated reservations never drift
//! past the ceiling through float rounding.

use tracing::{debug, warn};

use binwatch_models::CostSummary;

const MICROS_PER_USD: f64 = 1_000_000.0;

fn to_micros(usd: f64) -> u64 {
    if usd.is_finite() && usd > 0.0 {
        (usd * MICROS_PER_USD).round() as u64
    } else {
        0
    }
}

fn to_usd(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_USD
}

/// Budget gate consulted before every paid call.
///
/// One guard lives for one run and is passed by `&mut` to the classifier, so
/// check-and-reserve needs no locking.
#[derive(Debug)]
pub struct CostGuard {
    ceiling: u64,
    spent: u64,
    exhausted: bool,
    calls_granted: u32,
    calls_denied: u32,
    images_analyzed: u32,
}

impl CostGuard {
    pub fn new(max_cost_usd: f64) -> Self {
        Self {
            ceiling: to_micros(max_cost_usd),
            spent: 0,
            exhausted: false,
            calls_granted: 0,
            calls_denied: 0,
            images_analyzed: 0,
        }
    }

    /// Reserve `estimated_cost_usd` against the ceiling.
    ///
    /// Returns `false` if the reservation would exceed the ceiling. The first
    /// denial marks the guard exhausted and every later call is denied too.
    /// An estimate that is NaN, infinite or negative is denied without
    /// exhausting the guard.
    pub fn reserve(&mut self, estimated_cost_usd: f64) -> bool {
        if !(estimated_cost_usd.is_finite() && estimated_cost_usd >= 0.0) {
            self.calls_denied += 1;
            warn!(estimate = estimated_cost_usd, "Invalid cost estimate, call denied");
            return false;
        }

        if self.exhausted {
            self.calls_denied += 1;
            debug!(estimate = estimated_cost_usd, "Budget exhausted, call denied");
            return false;
        }

        let amount = to_micros(estimated_cost_usd);
        match self.spent.checked_add(amount) {
            Some(total) if total <= self.ceiling => {
                self.spent = total;
                self.calls_granted += 1;
                debug!(
                    estimate = estimated_cost_usd,
                    spent = to_usd(self.spent),
                    remaining = self.remaining_usd(),
                    "Reserved budget for paid call"
                );
                true
            }
            _ => {
                self.exhausted = true;
                self.calls_denied += 1;
                warn!(
                    spent = to_usd(self.spent),
                    ceiling = to_usd(self.ceiling),
                    estimate = estimated_cost_usd,
                    "Cost ceiling reached, remaining events will not be analyzed"
                );
                false
            }
        }
    }

    /// Return a reservation for a call that failed before being billed.
    ///
    /// Headroom comes back but an exhausted guard stays exhausted.
    pub fn release(&mut self, amount_usd: f64) {
        let amount = to_micros(amount_usd);
        self.spent = self.spent.saturating_sub(amount);
        self.calls_granted = self.calls_granted.saturating_sub(1);
        debug!(released = amount_usd, spent = to_usd(self.spent), "Released reservation");
    }

    /// Count images sent in a completed call.
    pub fn record_images(&mut self, count: usize) {
        self.images_analyzed = self
            .images_analyzed
            .saturating_add(u32::try_from(count).unwrap_or(u32::MAX));
    }

    pub fn spent_usd(&self) -> f64 {
        to_usd(self.spent)
    }

    pub fn remaining_usd(&self) -> f64 {
        to_usd(self.ceiling.saturating_sub(self.spent))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn summary(&self) -> CostSummary {
        CostSummary {
            total_cost_usd: self.spent_usd(),
            max_cost_usd: to_usd(self.ceiling),
            remaining_usd: self.remaining_usd(),
            calls_granted: self.calls_granted,
            calls_denied: self.calls_denied,
            images_analyzed: self.images_analyzed,
            exhausted: self.exhausted,
        }
    }
}
