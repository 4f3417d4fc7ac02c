//! Order, shipment and payment state machines.
//!
//! Each status type carries its legal transitions as a static table; the
//! shared [`StatusMachine`] trait derives the checks from it.

use crate::domain::error::DomainError;

pub trait StatusMachine: Copy + Eq + std::fmt::Display + 'static {
    const ENTITY: &'static str;
    const TRANSITIONS: &'static [(Self, Self)];

    fn can_transition_to(self, next: Self) -> bool {
        Self::TRANSITIONS.contains(&(self, next))
    }

    fn is_terminal(self) -> bool {
        !Self::TRANSITIONS.iter().any(|(from, _)| *from == self)
    }

    fn transition_to(self, next: Self) -> Result<Self, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::IllegalStateTransition {
                entity: Self::ENTITY,
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

labelled_enum! {
    /// Status of an order and of each of its store sub-orders.
    pub enum OrderStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
}

impl StatusMachine for OrderStatus {
    const ENTITY: &'static str = "order";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (OrderStatus::Pending, OrderStatus::InProgress),
        (OrderStatus::InProgress, OrderStatus::Delivered),
        (OrderStatus::Pending, OrderStatus::Cancelled),
        (OrderStatus::InProgress, OrderStatus::Cancelled),
    ];
}

labelled_enum! {
    pub enum ShipmentStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Delivered => "delivered",
        Failed => "failed",
    }
}

impl StatusMachine for ShipmentStatus {
    const ENTITY: &'static str = "shipment";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (ShipmentStatus::Pending, ShipmentStatus::InProgress),
        (ShipmentStatus::InProgress, ShipmentStatus::Delivered),
        (ShipmentStatus::Pending, ShipmentStatus::Failed),
        (ShipmentStatus::InProgress, ShipmentStatus::Failed),
    ];
}

impl ShipmentStatus {
    /// Terminal status an active shipment takes when staff close its order.
    /// Only a shipment already under way can end up delivered.
    pub fn closed_with(self, order: OrderStatus) -> Result<Self, DomainError> {
        let next = match (order, self) {
            (OrderStatus::Delivered, ShipmentStatus::InProgress) => ShipmentStatus::Delivered,
            _ => ShipmentStatus::Failed,
        };
        self.transition_to(next)
    }
}

labelled_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
}

impl StatusMachine for PaymentStatus {
    const ENTITY: &'static str = "payment";
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (PaymentStatus::Pending, PaymentStatus::Paid),
        (PaymentStatus::Pending, PaymentStatus::Failed),
    ];
}
