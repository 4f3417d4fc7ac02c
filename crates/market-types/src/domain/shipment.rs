use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::address::Coordinates;
use crate::domain::error::DomainError;
use crate::domain::order::StoreOrder;
use crate::domain::status::{ShipmentStatus, StatusMachine};

labelled_enum! {
    pub enum Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: Uuid,
    pub store_order_id: Uuid,
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: ShipmentStatus,
    pub priority: Priority,
    pub managed_by_store: bool,
    pub delivery_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentPatch {
    pub status: Option<ShipmentStatus>,
    pub driver_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub delivery_notes: Option<String>,
}

impl ShipmentPatch {
    pub fn assign(driver_id: Uuid) -> Self {
        Self {
            driver_id: Some(driver_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.driver_id.is_none()
            && self.priority.is_none()
            && self.delivery_notes.is_none()
    }
}

/// What an adapter has to do besides writing the shipment row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipmentChange {
    pub claim_driver: Option<Uuid>,
    pub release_driver: Option<Uuid>,
    pub status_changed: Option<ShipmentStatus>,
}

impl Shipment {
    /// A new shipment for `store_order`. With a driver it starts
    /// `in_progress`, otherwise `pending`.
    pub fn open(
        store_order: &StoreOrder,
        driver_id: Option<Uuid>,
        priority: Priority,
        managed_by_store: bool,
        delivery_notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            store_order_id: store_order.id,
            order_id: store_order.order_id,
            store_id: store_order.store_id,
            driver_id,
            status: if driver_id.is_some() {
                ShipmentStatus::InProgress
            } else {
                ShipmentStatus::Pending
            },
            priority,
            managed_by_store,
            delivery_notes: delivery_notes.or_else(|| store_order.delivery_notes.clone()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Applies `patch`. Nothing changes when it returns an error.
    pub fn apply(&mut self, patch: ShipmentPatch) -> Result<ShipmentChange, DomainError> {
        let requested = match patch.status {
            Some(next) => Some(self.status.transition_to(next)?),
            None => None,
        };
        if requested.is_none() && self.status.is_terminal() {
            return Err(DomainError::invalid(format!(
                "shipment {} is {} and can no longer be modified",
                self.id, self.status
            )));
        }

        let mut change = ShipmentChange::default();
        let previous_driver = self.driver_id;
        // A shipment being closed keeps its last driver.
        let closing = requested.is_some_and(|s| s.is_terminal());
        if let Some(driver) = patch
            .driver_id
            .filter(|d| !closing && Some(*d) != previous_driver)
        {
            change.claim_driver = Some(driver);
            change.release_driver = previous_driver;
            self.driver_id = Some(driver);
        }

        let next = match requested {
            Some(next) => Some(next),
            // Handing a pending shipment to a driver starts it.
            None if change.claim_driver.is_some() && self.status == ShipmentStatus::Pending => {
                Some(ShipmentStatus::InProgress)
            }
            None => None,
        };
        if let Some(next) = next {
            self.status = next;
            change.status_changed = Some(next);
            if next.is_terminal() {
                change.claim_driver = None;
                change.release_driver = previous_driver;
            }
        }

        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(notes) = patch.delivery_notes {
            self.delivery_notes = Some(notes);
        }
        self.updated_at = Utc::now();
        Ok(change)
    }
}

/// Append-only position report for an active shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingPing {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TrackingPing {
    pub fn new(shipment_id: Uuid, position: Coordinates) -> Result<Self, DomainError> {
        let position = position.check_range()?;
        Ok(Self {
            id: Uuid::new_v4(),
            shipment_id,
            latitude: position.latitude,
            longitude: position.longitude,
            recorded_at: Utc::now(),
        })
    }
}
