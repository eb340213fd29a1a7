use super::value_objects::PaymentStatus;

/// Order payment status derived from the statuses of all its payments.
///
/// Rules are checked in order; the first match wins:
/// no payments keeps `current`; all paid is `Paid`; some paid is
/// `PartialDone`; any timeout is `Timeout`; all canceled is `Canceled`;
/// then `Hold`, then `Waiting`; a `Created` order with a started payment
/// becomes `Started`; otherwise `current` is kept.
pub fn derive_order_payment_status(current: PaymentStatus, payments: &[PaymentStatus]) -> PaymentStatus {
    if payments.is_empty() {
        return current;
    }

    let any = |status: PaymentStatus| payments.iter().any(|s| *s == status);
    let all = |status: PaymentStatus| payments.iter().all(|s| *s == status);

    if all(PaymentStatus::Paid) {
        PaymentStatus::Paid
    } else if any(PaymentStatus::Paid) {
        PaymentStatus::PartialDone
    } else if any(PaymentStatus::Timeout) {
        PaymentStatus::Timeout
    } else if all(PaymentStatus::Canceled) {
        PaymentStatus::Canceled
    } else if any(PaymentStatus::Hold) {
        PaymentStatus::Hold
    } else if any(PaymentStatus::Waiting) {
        PaymentStatus::Waiting
    } else if current == PaymentStatus::Created && any(PaymentStatus::Started) {
        PaymentStatus::Started
    } else {
        current
    }
}
