use crate::collaborators::CollaboratorError;
use crate::domain::cargo::CargoError;
use crate::domain::delivery::DeliveryError;
use crate::domain::order::OrderError;
use crate::domain::order_return::OrderReturnError;
use crate::domain::package::PackageError;
use crate::domain::payment::PaymentError;
use crate::domain::shipment::ShipmentError;
use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Engine Error
// ============================================================================
//
// Guard rejections come from the entity state machines and leave state
// untouched. Everything else is infrastructure. The web layer maps
// `status_code()` onto its responses.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Shipment(#[from] ShipmentError),

    #[error(transparent)]
    Cargo(#[from] CargoError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Return(#[from] OrderReturnError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::Invalid(message.into())
    }

    /// Rejected by a state machine or validation rule
    pub fn is_guard_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::Order(_)
                | EngineError::Delivery(_)
                | EngineError::Shipment(_)
                | EngineError::Cargo(_)
                | EngineError::Package(_)
                | EngineError::Payment(_)
                | EngineError::Return(_)
                | EngineError::Invalid(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::NotFound(_)))
    }

    /// Cancel sent to an entity that is already canceled
    pub fn is_already_canceled(&self) -> bool {
        matches!(
            self,
            EngineError::Order(OrderError::AlreadyCanceled)
                | EngineError::Delivery(DeliveryError::AlreadyCanceled)
                | EngineError::Shipment(ShipmentError::AlreadyCanceled)
                | EngineError::Cargo(CargoError::AlreadyCanceled)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Invalid(_) => 400,
            EngineError::Store(StoreError::NotFound(_)) => 404,
            EngineError::Store(StoreError::AlreadyExists(_)) => 409,
            EngineError::Store(StoreError::Conflict { .. }) => 409,
            EngineError::Store(StoreError::Backend(_)) => 502,
            EngineError::Gateway(GatewayError::InvalidPayload(_))
            | EngineError::Gateway(GatewayError::InvalidSignature)
            | EngineError::Gateway(GatewayError::NotRegistered(_)) => 400,
            EngineError::Gateway(_) | EngineError::Collaborator(_) => 502,
            _ => 422,
        }
    }
}

impl IsTransient for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::Conflict { .. }))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
