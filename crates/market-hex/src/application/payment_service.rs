use std::sync::Arc;

use market_types::api::{PaymentCallback, UpdatePaymentRequest};
use market_types::domain::actor::{Actor, Capability};
use market_types::domain::error::DomainError;
use market_types::domain::notification::{Notification, NotificationKind};
use market_types::domain::payment::Payment;
use market_types::domain::status::PaymentStatus;
use market_types::ports::notifier::Notifier;
use market_types::ports::repository::MarketRepository;
use uuid::Uuid;

use crate::application::dispatch;
use crate::errors::AppError;

pub struct PaymentService<R: MarketRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
    callback_token: Option<String>,
}

impl<R: MarketRepository> PaymentService<R> {
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>, callback_token: Option<String>) -> Self {
        Self {
            repo,
            notifier,
            callback_token,
        }
    }

    /// Manual status update by an admin.
    pub async fn update_payment_status(
        &self,
        actor: &Actor,
        order_id: Uuid,
        request: UpdatePaymentRequest,
    ) -> Result<Payment, AppError> {
        actor.authorize(Capability::UpdatePaymentStatus)?;
        self.settle(order_id, request.status, request.transaction_id)
            .await
    }

    /// Provider callback, authenticated by the shared secret.
    pub async fn apply_callback(
        &self,
        token: Option<&str>,
        callback: PaymentCallback,
    ) -> Result<Payment, AppError> {
        match (self.callback_token.as_deref(), token) {
            (Some(expected), Some(given)) if expected == given => {}
            _ => return Err(DomainError::forbidden("invalid payment callback token").into()),
        }
        self.settle(callback.order_id, callback.status, callback.transaction_id)
            .await
    }

    pub async fn get_payment(&self, actor: &Actor, order_id: Uuid) -> Result<Payment, AppError> {
        actor.authorize(Capability::ViewOrder)?;
        let order = self
            .repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        if !actor.is_staff() && order.buyer_id != actor.user_id {
            return Err(DomainError::forbidden("order belongs to another buyer").into());
        }
        Ok(self
            .repo
            .get_payment_for_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("payment", order_id))?)
    }

    async fn settle(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Payment, AppError> {
        Payment::validate_request(status, transaction_id.as_deref())?;
        let payment = self
            .repo
            .settle_payment(order_id, status, transaction_id)
            .await?;
        tracing::info!(
            order_id = %order_id,
            payment_id = %payment.id,
            status = %payment.status,
            "payment settled"
        );

        // The payment has committed; a failed lookup only skips the notification.
        let order = self.repo.get_order(order_id).await.unwrap_or_else(|e| {
            tracing::warn!(order_id = %order_id, error = %e, "order lookup for notification failed");
            None
        });
        if let Some(order) = order {
            let note = Notification::new(
                order.buyer_id,
                NotificationKind::PaymentUpdated,
                order.id,
                format!("payment is {}", payment.status),
            );
            dispatch(self.notifier.as_ref(), vec![note]).await;
        }
        Ok(payment)
    }
}
