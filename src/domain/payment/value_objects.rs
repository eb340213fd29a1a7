use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Payment Value Objects
// ============================================================================

/// Shared by payments and by the order's derived payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Started,
    /// Payment window lapsed or the gateway declined
    Timeout,
    Waiting,
    /// Authorized, waiting for capture
    Hold,
    Paid,
    Canceled,
    PartialDone,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Started => "started",
            PaymentStatus::Timeout => "timeout",
            PaymentStatus::Waiting => "waiting",
            PaymentStatus::Hold => "hold",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::PartialDone => "partial_done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::Canceled | PaymentStatus::PartialDone | PaymentStatus::Timeout
        )
    }

    /// Progress rank of non-terminal statuses
    fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Created => 0,
            PaymentStatus::Started => 1,
            PaymentStatus::Waiting => 2,
            PaymentStatus::Hold => 3,
            _ => u8::MAX,
        }
    }

    /// Whether a gateway report of `self` may replace `current`.
    ///
    /// Terminal statuses are final; a non-terminal report only applies when
    /// it moves the payment forward. Everything else is a duplicate or a
    /// stale, out-of-order delivery.
    pub fn supersedes(&self, current: PaymentStatus) -> bool {
        if current.is_terminal() {
            return false;
        }
        self.is_terminal() || self.rank() > current.rank()
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider tag persisted on orders and payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayId {
    /// In-process gateway for development and tests
    Local,
    CheckoutCard,
    TerminalCard,
    CarrierCredit,
}

impl GatewayId {
    pub const ALL: [GatewayId; 4] = [
        GatewayId::Local,
        GatewayId::CheckoutCard,
        GatewayId::TerminalCard,
        GatewayId::CarrierCredit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayId::Local => "local",
            GatewayId::CheckoutCard => "checkout_card",
            GatewayId::TerminalCard => "terminal_card",
            GatewayId::CarrierCredit => "carrier_credit",
        }
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown payment gateway: {0}")]
pub struct UnknownGateway(pub String);

impl FromStr for GatewayId {
    type Err = UnknownGateway;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GatewayId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownGateway(s.to_string()))
    }
}
