//! Order fulfillment consistency engine.
//!
//! Orders fan out into deliveries, shipments, packages and cargo loads.
//! Every mutation goes through a versioned command handler; the cascade
//! coordinator then keeps rollups, the order problem flag, carrier orders,
//! cargo membership and history consistent. Payments are reconciled against
//! external gateways by [`reconciliation::PaymentReconciler`].

pub mod cascade;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fulfillment;
pub mod gateway;
pub mod history;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod reconciliation;
pub mod rollup;
pub mod store;
pub mod utils;

#[cfg(test)]
pub mod testing;

pub use engine::{Engine, EngineBuilder, EngineContext};
pub use error::{EngineError, EngineResult};
