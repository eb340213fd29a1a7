use serde::{Deserialize, Serialize};

use crate::domain::measurements::{line_total, total, Measurements, Money};
use crate::domain::package::{Package, PackageItem};
use crate::domain::shipment::{Shipment, ShipmentItem};

// ============================================================================
// Measurement Rollup
// ============================================================================
//
// Pure bottom-up recomputation:
//
//   Package  = wrapper + items
//   Shipment = packages if any exist, else the basket items estimate
//   Cargo    = member shipments
//   Delivery = non-canceled shipments
//
// Each axis has its own aggregation rule. Physical parcels sum their weight
// and take the largest extent for width/height/length.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    Sum,
    Max,
}

impl AggregationRule {
    fn combine(self, acc: u64, value: u64) -> u64 {
        match self {
            AggregationRule::Sum => acc.saturating_add(value),
            AggregationRule::Max => acc.max(value),
        }
    }

    /// Contribution of `quantity` identical units
    fn scale(self, unit: u64, quantity: u32) -> u64 {
        match self {
            AggregationRule::Sum => unit.saturating_mul(u64::from(quantity)),
            AggregationRule::Max => unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRules {
    pub weight: AggregationRule,
    pub width: AggregationRule,
    pub height: AggregationRule,
    pub length: AggregationRule,
}

impl Default for RollupRules {
    fn default() -> Self {
        Self::PHYSICAL
    }
}

/// Rolled-up measurements and value of one entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollup {
    pub measurements: Measurements,
    pub cost: Money,
}

impl RollupRules {
    pub const PHYSICAL: RollupRules = RollupRules {
        weight: AggregationRule::Sum,
        width: AggregationRule::Max,
        height: AggregationRule::Max,
        length: AggregationRule::Max,
    };

    pub fn combine(&self, acc: Measurements, next: Measurements) -> Measurements {
        Measurements {
            weight: self.weight.combine(acc.weight, next.weight),
            width: self.width.combine(acc.width, next.width),
            height: self.height.combine(acc.height, next.height),
            length: self.length.combine(acc.length, next.length),
        }
    }

    fn scale(&self, unit: Measurements, quantity: u32) -> Measurements {
        Measurements {
            weight: self.weight.scale(unit.weight, quantity),
            width: self.width.scale(unit.width, quantity),
            height: self.height.scale(unit.height, quantity),
            length: self.length.scale(unit.length, quantity),
        }
    }

    pub fn aggregate<I>(&self, base: Measurements, parts: I) -> Measurements
    where
        I: IntoIterator<Item = Measurements>,
    {
        parts.into_iter().fold(base, |acc, part| self.combine(acc, part))
    }

    pub fn package(&self, wrapper: Measurements, items: &[PackageItem]) -> Rollup {
        let measurements = self.aggregate(
            wrapper,
            items.iter().map(|item| self.scale(item.unit, item.quantity)),
        );
        let cost = total(items.iter().map(|item| line_total(item.unit_cost, item.quantity)));
        Rollup { measurements, cost }
    }

    /// Pre-packing estimate from catalog data of the basket items
    pub fn shipment_estimate(&self, items: &[ShipmentItem]) -> Rollup {
        let measurements = self.aggregate(
            Measurements::default(),
            items.iter().map(|item| self.scale(item.unit, item.quantity)),
        );
        let cost = total(items.iter().map(ShipmentItem::total_cost));
        Rollup { measurements, cost }
    }

    /// Packed values replace the estimate as soon as one package exists
    pub fn shipment(&self, packages: &[Package], items: &[ShipmentItem]) -> Rollup {
        if packages.is_empty() {
            return self.shipment_estimate(items);
        }

        let measurements = self.aggregate(
            Measurements::default(),
            packages.iter().map(|package| package.measurements),
        );
        let cost = total(packages.iter().map(|package| package.cost));
        Rollup { measurements, cost }
    }

    pub fn cargo(&self, members: &[Shipment]) -> Measurements {
        self.aggregate(
            Measurements::default(),
            members.iter().map(|shipment| shipment.measurements),
        )
    }

    pub fn delivery(&self, shipments: &[Shipment]) -> Rollup {
        let active = || shipments.iter().filter(|shipment| !shipment.is_canceled);
        Rollup {
            measurements: self.aggregate(
                Measurements::default(),
                active().map(|shipment| shipment.measurements),
            ),
            cost: total(active().map(|shipment| shipment.cost)),
        }
    }
}
