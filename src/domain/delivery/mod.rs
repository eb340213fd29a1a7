// One carrier-method leg of an order, grouping its shipments.

pub mod aggregate;
pub mod types;

pub use aggregate::*;
pub use types::*;
