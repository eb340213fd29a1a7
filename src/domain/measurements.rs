use serde::{Deserialize, Serialize};

// ============================================================================
// Shared Value Objects
// ============================================================================

/// Amount in minor currency units
pub type Money = i64;

/// Price of `quantity` units, clamped at the `Money` range
pub fn line_total(unit: Money, quantity: u32) -> Money {
    unit.saturating_mul(Money::from(quantity))
}

/// Saturating sum of amounts
pub fn total<I: IntoIterator<Item = Money>>(amounts: I) -> Money {
    amounts.into_iter().fold(0, Money::saturating_add)
}

/// Physical size: weight in grams, dimensions in millimetres
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurements {
    pub weight: u64,
    pub width: u64,
    pub height: u64,
    pub length: u64,
}

impl Measurements {
    pub fn new(weight: u64, width: u64, height: u64, length: u64) -> Self {
        Self {
            weight,
            width,
            height,
            length,
        }
    }

    pub fn weight_only(weight: u64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_only() {
        let m = Measurements::weight_only(1500);
        assert_eq!(m.weight, 1500);
        assert_eq!(m.width, 0);
        assert!(!m.is_zero());
        assert!(Measurements::default().is_zero());
    }

    #[test]
    fn test_money_arithmetic_saturates() {
        assert_eq!(line_total(250, 4), 1_000);
        assert_eq!(line_total(Money::MAX / 2, 3), Money::MAX);
        assert_eq!(line_total(Money::MIN / 2, 3), Money::MIN);
        assert_eq!(total([Money::MAX, 1, 1]), Money::MAX);
        assert_eq!(total([100, -40, 15]), 75);
    }
}
