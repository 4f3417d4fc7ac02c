use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;

labelled_enum! {
    /// Caller role as resolved by the authentication layer.
    pub enum Role {
        Buyer => "buyer",
        Store => "store",
        Driver => "driver",
        Admin => "admin",
        Manager => "manager",
    }
}

/// Operations guarded by the role matrix. Ownership (buyer of the order,
/// owner of the store, assigned driver) is checked separately by the
/// services once the capability is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    PlaceOrder,
    ViewOrder,
    CancelOrder,
    UpdateOrderStatus,
    UpdatePaymentStatus,
    EstimateDelivery,
    ManageFeeRules,
    ManageShipments,
    RecordTracking,
    SearchShipments,
    SearchStoreOrders,
    SetDriverAvailability,
    ViewStoreRevenue,
}

impl Role {
    pub fn allows(self, capability: Capability) -> bool {
        use Capability::*;
        use Role::*;
        match capability {
            PlaceOrder | ViewOrder | CancelOrder => matches!(self, Buyer | Admin | Manager),
            UpdateOrderStatus | ManageFeeRules => matches!(self, Admin | Manager),
            UpdatePaymentStatus => self == Admin,
            EstimateDelivery => matches!(self, Buyer | Store | Admin | Manager),
            ManageShipments => matches!(self, Store | Admin),
            SetDriverAvailability => matches!(self, Driver | Admin),
            RecordTracking | ViewStoreRevenue => matches!(self, Store | Admin | Manager),
            SearchShipments => matches!(self, Store | Driver | Admin | Manager),
            SearchStoreOrders => self == Store,
        }
    }

    /// Admins and managers see and act on every order.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

/// Explicit caller identity handed to every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn authorize(&self, capability: Capability) -> Result<(), DomainError> {
        if self.role.allows(capability) {
            Ok(())
        } else {
            Err(DomainError::forbidden(format!(
                "role {} may not perform {:?}",
                self.role, capability
            )))
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}
