//! Freshness rules for cached proofs
//!
//! A proof is fresh at instant `t` when both hold:
//!
//! - `t < producedAt + window`
//! - `t < nextUpdate`, if the response carries one and enforcement is on
//!
//! Neither bound looks backwards, so freshness is monotone in time: once a
//! proof is stale it stays stale.

use chrono::{DateTime, TimeDelta, Utc};
use ocsp_proto::RevocationProof;

#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    window: TimeDelta,
    verify_next_update: bool,
    refresh_margin: TimeDelta,
}

impl FreshnessPolicy {
    /// Policy with the default refresh margin of a tenth of the window
    pub fn new(window: TimeDelta, verify_next_update: bool) -> Self {
        Self {
            window,
            verify_next_update,
            refresh_margin: window / 10,
        }
    }

    /// Refresh `ratio` of the window ahead of expiry, clamped to `[0, 1)`
    pub fn with_refresh_margin_ratio(mut self, ratio: f64) -> Self {
        let ratio = ratio.clamp(0.0, 0.99);
        let window_ms = self.window.num_milliseconds() as f64;
        self.refresh_margin = TimeDelta::milliseconds((window_ms * ratio) as i64);
        self
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn verify_next_update(&self) -> bool {
        self.verify_next_update
    }

    pub fn is_fresh(&self, proof: &RevocationProof, at: DateTime<Utc>) -> bool {
        at < self.expires_at(proof)
    }

    /// First instant at which the proof is no longer fresh
    pub fn expires_at(&self, proof: &RevocationProof) -> DateTime<Utc> {
        let window_end = saturating_offset(proof.produced_at(), self.window);
        match proof.next_update() {
            Some(next_update) if self.verify_next_update => window_end.min(next_update),
            _ => window_end,
        }
    }

    /// When the refresher should replace the proof, ahead of expiry
    pub fn next_scheduled_refresh(&self, proof: &RevocationProof) -> DateTime<Utc> {
        saturating_offset(self.expires_at(proof), -self.refresh_margin)
    }

    /// Missing, stale, or due for refresh at `at`
    pub fn needs_refresh(&self, proof: Option<&RevocationProof>, at: DateTime<Utc>) -> bool {
        match proof {
            None => true,
            Some(proof) => !self.is_fresh(proof, at) || at >= self.next_scheduled_refresh(proof),
        }
    }
}

/// `at + delta`, clamped to the representable range
fn saturating_offset(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
