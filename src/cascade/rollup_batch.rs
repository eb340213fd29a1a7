use std::collections::BTreeSet;
use uuid::Uuid;

/// Parents to recompute after one logical operation.
///
/// Each id is kept once however many children changed, and the batch is
/// flushed bottom-up: shipments first, then the cargos and deliveries above
/// them, so every parent is recomputed exactly once per batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupBatch {
    shipments: BTreeSet<Uuid>,
    cargos: BTreeSet<Uuid>,
    deliveries: BTreeSet<Uuid>,
}

impl RollupBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shipment(&mut self, id: Uuid) -> &mut Self {
        self.shipments.insert(id);
        self
    }

    pub fn cargo(&mut self, id: Option<Uuid>) -> &mut Self {
        if let Some(id) = id {
            self.cargos.insert(id);
        }
        self
    }

    pub fn delivery(&mut self, id: Uuid) -> &mut Self {
        self.deliveries.insert(id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty() && self.cargos.is_empty() && self.deliveries.is_empty()
    }

    pub fn shipments(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.shipments.iter().copied()
    }

    pub fn cargos(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.cargos.iter().copied()
    }

    pub fn deliveries(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.deliveries.iter().copied()
    }

    /// Move every id of `other` into this batch
    pub fn merge(&mut self, other: RollupBatch) {
        self.shipments.extend(other.shipments);
        self.cargos.extend(other.cargos);
        self.deliveries.extend(other.deliveries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_deduplicated() {
        let delivery = Uuid::now_v7();
        let cargo = Uuid::now_v7();
        let mut batch = RollupBatch::new();

        batch.delivery(delivery).cargo(Some(cargo)).cargo(None);
        batch.delivery(delivery).cargo(Some(cargo));

        assert_eq!(batch.deliveries().count(), 1);
        assert_eq!(batch.cargos().count(), 1);
        assert_eq!(batch.shipments().count(), 0);
    }

    #[test]
    fn test_merge() {
        let shipment = Uuid::now_v7();
        let mut left = RollupBatch::new();
        left.shipment(shipment);
        let mut right = RollupBatch::new();
        right.shipment(shipment).delivery(Uuid::now_v7());

        left.merge(right);

        assert_eq!(left.shipments().count(), 1);
        assert_eq!(left.deliveries().count(), 1);
        assert!(!left.is_empty());
        assert!(RollupBatch::new().is_empty());
    }
}
