//! Loss accounting
//!
//! A loss account is a (total, lost) pair that can be merged across
//! measurement spans. The receiver keeps one for the lifetime of a flow and
//! computes short-lived ones from the packets it still holds.

use std::ops::{AddAssign, SubAssign};

/// Packet totals for computing a loss ratio
///
/// Merges are plain additions with no bounds checking. Subtracting an account
/// that was never added is a caller bug; it is not detected and shows up as a
/// nonsensical ratio rather than a panic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossAccount {
    /// Packets expected over the accounted spans
    pub num_total: usize,
    /// Packets never observed over the accounted spans
    pub num_lost: usize,
}

impl LossAccount {
    /// Create a loss account
    pub fn new(num_total: usize, num_lost: usize) -> Self {
        LossAccount {
            num_total,
            num_lost,
        }
    }

    /// Merge another account into this one
    #[inline]
    pub fn add(&mut self, rhs: LossAccount) {
        self.num_total = self.num_total.wrapping_add(rhs.num_total);
        self.num_lost = self.num_lost.wrapping_add(rhs.num_lost);
    }

    /// Remove a previously merged account from this one
    #[inline]
    pub fn subtract(&mut self, rhs: LossAccount) {
        self.num_total = self.num_total.wrapping_sub(rhs.num_total);
        self.num_lost = self.num_lost.wrapping_sub(rhs.num_lost);
    }

    /// Fraction of lost packets, 0.0 for an empty account
    pub fn loss_ratio(&self) -> f32 {
        if self.num_total == 0 {
            return 0.0;
        }
        self.num_lost as f32 / self.num_total as f32
    }

    /// Number of packets actually observed
    pub fn num_received(&self) -> usize {
        self.num_total.wrapping_sub(self.num_lost)
    }

    /// Check if nothing has been accounted
    pub fn is_empty(&self) -> bool {
        self.num_total == 0
    }
}

impl AddAssign for LossAccount {
    fn add_assign(&mut self, rhs: LossAccount) {
        LossAccount::add(self, rhs);
    }
}

impl SubAssign for LossAccount {
    fn sub_assign(&mut self, rhs: LossAccount) {
        self.subtract(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_ratio() {
        assert!((LossAccount::new(10, 3).loss_ratio() - 0.3).abs() < 1e-6);
        assert_eq!(LossAccount::new(0, 0).loss_ratio(), 0.0);
        assert_eq!(LossAccount::default().loss_ratio(), 0.0);
    }

    #[test]
    fn test_add_is_commutative() {
        let a = LossAccount::new(100, 7);
        let b = LossAccount::new(40, 2);

        let mut ab = a;
        ab.add(b);
        let mut ba = b;
        ba.add(a);

        assert_eq!(ab, ba);
        assert_eq!(ab, LossAccount::new(140, 9));
    }

    #[test]
    fn test_subtract_undoes_add() {
        let mut account = LossAccount::new(1000, 10);
        let window = LossAccount::new(26, 0);
        account.add(window);
        account.subtract(window);
        assert_eq!(account, LossAccount::new(1000, 10));
    }

    #[test]
    fn test_operators() {
        let mut account = LossAccount::new(5, 1);
        account += LossAccount::new(5, 2);
        assert_eq!(account, LossAccount::new(10, 3));

        account -= LossAccount::new(4, 1);
        assert_eq!(account, LossAccount::new(6, 2));
    }

    #[test]
    fn test_unchecked_subtract_does_not_panic() {
        let mut account = LossAccount::new(1, 0);
        account.subtract(LossAccount::new(2, 1));
        assert_eq!(account.num_total, usize::MAX);
    }

    #[test]
    fn test_num_received() {
        assert_eq!(LossAccount::new(10, 3).num_received(), 7);
        assert!(LossAccount::default().is_empty());
    }
}
