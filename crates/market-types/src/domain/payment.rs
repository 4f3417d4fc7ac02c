use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::order::Order;
use crate::domain::status::{PaymentStatus, StatusMachine};

labelled_enum! {
    pub enum PaymentMethod {
        CashOnDelivery => "cash_on_delivery",
        MobileMoney => "mobile_money",
        Card => "card",
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::CashOnDelivery
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// The pending payment opened together with a new order.
    pub fn for_order(order: &Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total_amount,
            method: order.payment_method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: order.created_at,
            updated_at: order.created_at,
        }
    }

    /// Input check that runs before the store is touched.
    pub fn validate_request(
        status: PaymentStatus,
        transaction_id: Option<&str>,
    ) -> Result<(), DomainError> {
        let has_txn = transaction_id.is_some_and(|t| !t.trim().is_empty());
        if status == PaymentStatus::Paid && !has_txn {
            return Err(DomainError::invalid(
                "transactionId is required when marking a payment paid",
            ));
        }
        Ok(())
    }

    pub fn settle(
        &mut self,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<(), DomainError> {
        Self::validate_request(status, transaction_id.as_deref())?;
        self.status = self.status.transition_to(status)?;
        if let Some(txn) = transaction_id.filter(|t| !t.trim().is_empty()) {
            self.transaction_id = Some(txn);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: 12_000,
            method: PaymentMethod::MobileMoney,
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn paid_requires_transaction_id() {
        let mut p = pending();
        let err = p.settle(PaymentStatus::Paid, None).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = p.settle(PaymentStatus::Paid, Some("  ".into())).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(p.status, PaymentStatus::Pending);
    }

    #[test]
    fn paid_is_terminal() {
        let mut p = pending();
        p.settle(PaymentStatus::Paid, Some("OM-7781".into())).unwrap();
        assert_eq!(p.transaction_id.as_deref(), Some("OM-7781"));
        let err = p.settle(PaymentStatus::Failed, None).unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_STATE_TRANSITION");
        assert_eq!(p.status, PaymentStatus::Paid);
    }

    #[test]
    fn failed_needs_no_transaction() {
        let mut p = pending();
        p.settle(PaymentStatus::Failed, None).unwrap();
        assert_eq!(p.status, PaymentStatus::Failed);
        assert!(p.transaction_id.is_none());
    }
}
