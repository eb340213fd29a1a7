use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::measurements::{Measurements, Money};
use crate::lifecycle::{Aggregate, DomainEvent, Entity, EntityKind};
use crate::rollup::RollupRules;

// ============================================================================
// Package - physical parcel inside a shipment
// ============================================================================
//
// Own measurements and cost are recomputed from the wrapper and items on
// every change, using the aggregation rules fixed when the package was
// created.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageItem {
    pub offer_id: Uuid,
    pub quantity: u32,
    pub unit: Measurements,
    pub unit_cost: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub order_id: Uuid,
    pub wrapper: Measurements,
    pub items: Vec<PackageItem>,
    pub measurements: Measurements,
    pub cost: Money,
    pub rules: RollupRules,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PackageCommand {
    SetWrapper { wrapper: Measurements },
    /// Adds to the quantity already packed for the same offer
    AddItem { item: PackageItem },
    RemoveItem { offer_id: Uuid, quantity: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PackageEvent {
    Created {
        shipment_id: Uuid,
        wrapper: Measurements,
        items: Vec<PackageItem>,
    },
    WrapperSet {
        wrapper: Measurements,
    },
    ItemAdded {
        item: PackageItem,
    },
    ItemRemoved {
        offer_id: Uuid,
        quantity: u32,
    },
}

impl DomainEvent for PackageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PackageEvent::Created { .. } => "PackageCreated",
            PackageEvent::WrapperSet { .. } => "PackageWrapperSet",
            PackageEvent::ItemAdded { .. } => "PackageItemAdded",
            PackageEvent::ItemRemoved { .. } => "PackageItemRemoved",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, PackageEvent::Created { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Offer {0} is not in this package")]
    ItemNotFound(Uuid),

    #[error("Cannot remove {requested} of offer {offer_id}, only {packed} packed")]
    RemoveTooMany {
        offer_id: Uuid,
        requested: u32,
        packed: u32,
    },
}

impl Package {
    pub fn create(
        id: Uuid,
        shipment_id: Uuid,
        order_id: Uuid,
        wrapper: Measurements,
        items: Vec<PackageItem>,
        rules: RollupRules,
    ) -> Result<(Self, PackageEvent), PackageError> {
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(PackageError::InvalidQuantity(item.quantity));
        }

        let now = Utc::now();
        let mut package = Self {
            id,
            shipment_id,
            order_id,
            wrapper,
            items: Vec::new(),
            measurements: Measurements::default(),
            cost: 0,
            rules,
            created_at: now,
            updated_at: now,
        };
        for item in &items {
            package.merge_item(item);
        }
        package.recompute();

        let event = PackageEvent::Created {
            shipment_id,
            wrapper,
            items: package.items.clone(),
        };
        Ok((package, event))
    }

    /// Quantity of an offer packed here
    pub fn packed_quantity(&self, offer_id: Uuid) -> u32 {
        self.items
            .iter()
            .filter(|item| item.offer_id == offer_id)
            .map(|item| item.quantity)
            .sum()
    }

    fn merge_item(&mut self, item: &PackageItem) {
        match self.items.iter_mut().find(|existing| existing.offer_id == item.offer_id) {
            Some(existing) => existing.quantity += item.quantity,
            None => self.items.push(item.clone()),
        }
    }

    fn recompute(&mut self) {
        let rollup = self.rules.package(self.wrapper, &self.items);
        self.measurements = rollup.measurements;
        self.cost = rollup.cost;
    }
}

impl Entity for Package {
    const KIND: EntityKind = EntityKind::Package;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Aggregate for Package {
    type Event = PackageEvent;
    type Command = PackageCommand;
    type Error = PackageError;

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PackageCommand::SetWrapper { wrapper } => {
                if *wrapper == self.wrapper {
                    return Ok(vec![]);
                }
                Ok(vec![PackageEvent::WrapperSet { wrapper: *wrapper }])
            }
            PackageCommand::AddItem { item } => {
                if item.quantity == 0 {
                    return Err(PackageError::InvalidQuantity(0));
                }
                Ok(vec![PackageEvent::ItemAdded { item: item.clone() }])
            }
            PackageCommand::RemoveItem { offer_id, quantity } => {
                if *quantity == 0 {
                    return Err(PackageError::InvalidQuantity(0));
                }
                let packed = self.packed_quantity(*offer_id);
                if packed == 0 {
                    return Err(PackageError::ItemNotFound(*offer_id));
                }
                if *quantity > packed {
                    return Err(PackageError::RemoveTooMany {
                        offer_id: *offer_id,
                        requested: *quantity,
                        packed,
                    });
                }
                Ok(vec![PackageEvent::ItemRemoved {
                    offer_id: *offer_id,
                    quantity: *quantity,
                }])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            PackageEvent::Created { .. } => {}
            PackageEvent::WrapperSet { wrapper } => self.wrapper = *wrapper,
            PackageEvent::ItemAdded { item } => self.merge_item(item),
            PackageEvent::ItemRemoved { offer_id, quantity } => {
                if let Some(existing) = self.items.iter_mut().find(|item| item.offer_id == *offer_id) {
                    existing.quantity = existing.quantity.saturating_sub(*quantity);
                }
                self.items.retain(|item| item.quantity > 0);
            }
        }
        self.recompute();
        Ok(())
    }
}
