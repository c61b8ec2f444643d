//! Quantity rules for a line item.
//!
//! A line item carries four counters. Which relationships between them must
//! hold depends on the entry point that mutates the item:
//!
//! | Entry point | Rules |
//! |---|---|
//! | creation | non-negative, `received + short <= total` |
//! | short reconciliation | non-negative, `received + short + rejected == total` |
//! | ordinary adjustment | non-negative, `rejected <= received`, `available >= 0` |
//!
//! `available` is always derived here and never stored.

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult};

pub const TOTAL_MISMATCH: &str = "received + short + rejected must equal Total Quantity";
pub const REJECTED_OVER_RECEIVED: &str = "rejected cannot exceed received";

/// The four counters of a line item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantities {
    pub total: i64,
    pub received: i64,
    pub short: i64,
    pub rejected: i64,
}

impl Quantities {
    pub fn new(total: i64, received: i64, short: i64, rejected: i64) -> Self {
        Self {
            total,
            received,
            short,
            rejected,
        }
    }

    /// Usable units: `received - rejected - short`. Saturates; rules go
    /// through [`Quantities::checked_available`].
    pub fn available(&self) -> i64 {
        self.received
            .saturating_sub(self.rejected)
            .saturating_sub(self.short)
    }

    pub fn checked_available(&self) -> DomainResult<i64> {
        self.received
            .checked_sub(self.rejected)
            .and_then(|v| v.checked_sub(self.short))
            .ok_or_else(overflow)
    }

    /// Units the invoice claims that were never accepted as good stock.
    pub fn shortfall(&self) -> i64 {
        self.total - self.received
    }

    pub fn ensure_non_negative(&self) -> DomainResult<()> {
        for (name, value) in [
            ("total quantity", self.total),
            ("received", self.received),
            ("short", self.short),
            ("rejected", self.rejected),
        ] {
            if value < 0 {
                return Err(DomainError::validation(format!("{name} cannot be negative")));
            }
        }
        Ok(())
    }

    /// Creation rule: what was received plus what is still pending cannot
    /// exceed what the invoice claims.
    pub fn ensure_receivable(&self) -> DomainResult<()> {
        self.ensure_non_negative()?;
        if self.rejected != 0 {
            return Err(DomainError::validation(
                "rejected must be zero when an item is first received",
            ));
        }
        // Non-negative operands: overflow means the sum is past any total.
        if self
            .received
            .checked_add(self.short)
            .is_none_or(|sum| sum > self.total)
        {
            return Err(DomainError::validation(
                "received + short cannot exceed Total Quantity",
            ));
        }
        Ok(())
    }

    /// Short-reconciliation rule (strict equality with the invoice total).
    pub fn ensure_matches_total(&self) -> DomainResult<()> {
        self.ensure_non_negative()?;
        let sum = self
            .received
            .checked_add(self.short)
            .and_then(|v| v.checked_add(self.rejected));
        if sum != Some(self.total) {
            return Err(DomainError::validation(TOTAL_MISMATCH));
        }
        Ok(())
    }

    /// Ordinary-edit rule. Deliberately does not compare against `total`.
    pub fn ensure_usable(&self) -> DomainResult<()> {
        self.ensure_non_negative()?;
        self.ensure_rejected_within_received()?;
        let available = self.checked_available()?;
        if available < 0 {
            return Err(DomainError::validation(format!(
                "available quantity cannot be negative (received {} - rejected {} - short {} = {available})",
                self.received, self.rejected, self.short,
            )));
        }
        Ok(())
    }

    pub fn ensure_rejected_within_received(&self) -> DomainResult<()> {
        if self.rejected > self.received {
            return Err(DomainError::validation(REJECTED_OVER_RECEIVED));
        }
        Ok(())
    }

    /// A mutation may leave `available` negative only if it was already at
    /// least that negative before.
    pub fn ensure_not_driven_negative(&self, before: &Quantities) -> DomainResult<()> {
        let after = self.checked_available()?;
        let was = before.checked_available()?;
        if after < 0 && after < was {
            return Err(DomainError::validation(format!(
                "change would drive available quantity negative ({was} -> {after})"
            )));
        }
        Ok(())
    }
}

fn overflow() -> DomainError {
    DomainError::validation("quantities are out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn available_subtracts_rejected_and_short() {
        assert_eq!(Quantities::new(100, 100, 0, 10).available(), 90);
        assert_eq!(Quantities::new(100, 80, 20, 0).available(), 60);
    }

    #[test]
    fn strict_rule_reports_the_business_message() {
        let err = Quantities::new(100, 81, 20, 0).ensure_matches_total().unwrap_err();
        assert_eq!(err, DomainError::validation(TOTAL_MISMATCH));
    }

    #[test]
    fn relaxed_rule_ignores_total() {
        // Short written off elsewhere: the three no longer sum to total.
        Quantities::new(100, 100, 0, 10).ensure_usable().unwrap();
        Quantities::new(100, 70, 0, 0).ensure_usable().unwrap();
    }

    #[test]
    fn relaxed_rule_caps_rejected_at_received() {
        let err = Quantities::new(100, 10, 0, 11).ensure_usable().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert_eq!(msg, "rejected cannot exceed received"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn relaxed_rule_rejects_negative_available() {
        assert!(Quantities::new(100, 50, 30, 25).ensure_usable().is_err());
    }

    #[test]
    fn oversized_counters_fail_validation_instead_of_wrapping() {
        let max = i64::MAX;
        let q = Quantities::new(100, 102, max, max);
        assert_eq!(q.ensure_matches_total(), Err(DomainError::validation(TOTAL_MISMATCH)));
        assert!(q.ensure_usable().is_err());

        let q = Quantities::new(100, max, 1, 0);
        assert!(q.ensure_receivable().is_err());

        let before = Quantities::new(100, 80, 20, 0);
        let deep = Quantities::new(100, 0, max, max);
        assert!(deep.checked_available().is_err());
        assert!(deep.ensure_not_driven_negative(&before).is_err());
        assert_eq!(deep.available(), i64::MIN);
    }

    #[test]
    fn negative_fields_are_rejected_everywhere() {
        let q = Quantities::new(100, 100, -1, 0);
        assert!(q.ensure_non_negative().is_err());
        assert!(q.ensure_usable().is_err());
        assert!(q.ensure_receivable().is_err());
    }

    #[test]
    fn receivable_rejects_over_delivery() {
        assert!(Quantities::new(100, 90, 20, 0).ensure_receivable().is_err());
        Quantities::new(100, 80, 20, 0).ensure_receivable().unwrap();
        Quantities::new(100, 80, 10, 0).ensure_receivable().unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Strict rule accepts exactly the states whose counters sum to total.
        #[test]
        fn strict_rule_is_exact_sum(
            total in 0i64..10_000,
            received in 0i64..10_000,
            short in 0i64..10_000,
            rejected in 0i64..10_000,
        ) {
            let q = Quantities::new(total, received, short, rejected);
            prop_assert_eq!(
                q.ensure_matches_total().is_ok(),
                received + short + rejected == total
            );
        }

        /// Relaxed rule never consults total.
        #[test]
        fn relaxed_rule_is_independent_of_total(
            total_a in 0i64..10_000,
            total_b in 0i64..10_000,
            received in 0i64..10_000,
            short in 0i64..10_000,
            rejected in 0i64..10_000,
        ) {
            let a = Quantities::new(total_a, received, short, rejected);
            let b = Quantities::new(total_b, received, short, rejected);
            prop_assert_eq!(a.ensure_usable().is_ok(), b.ensure_usable().is_ok());
        }
    }
}
