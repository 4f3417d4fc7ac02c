use std::sync::Arc;

use market_types::api::{
    AssignDriverRequest, CreateShipmentRequest, DriverAvailabilityRequest, ShipmentSearchParams,
    TrackingRequest, UpdateShipmentRequest,
};
use market_types::domain::actor::{Actor, Capability, Role};
use market_types::domain::address::Coordinates;
use market_types::domain::catalog::Driver;
use market_types::domain::error::DomainError;
use market_types::domain::notification::{Notification, NotificationKind};
use market_types::domain::order::{Order, StoreOrder};
use market_types::domain::query::{Page, Pagination, ShipmentQuery};
use market_types::domain::shipment::{Shipment, ShipmentPatch, TrackingPing};
use market_types::domain::status::ShipmentStatus;
use market_types::ports::notifier::Notifier;
use market_types::ports::repository::MarketRepository;
use uuid::Uuid;

use crate::application::dispatch;
use crate::errors::AppError;

pub struct ShipmentService<R: MarketRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
}

impl<R: MarketRepository> ShipmentService<R> {
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    pub async fn create_shipment(
        &self,
        actor: &Actor,
        request: CreateShipmentRequest,
    ) -> Result<Shipment, AppError> {
        actor.authorize(Capability::ManageShipments)?;
        let data = request.shipment_data;
        let order = self.order(request.order_id).await?;
        let owned = self.owned_store_ids(actor).await?;
        let sub = pick_store_order(&order, data.store_order_id, actor, &owned)?;
        if actor.role == Role::Store && !owned.contains(&sub.store_id) {
            return Err(DomainError::forbidden("store order belongs to another store").into());
        }
        let driver = match data.driver_id {
            Some(id) => Some(self.driver(id).await?),
            None => None,
        };

        let shipment = Shipment::open(
            sub,
            driver.as_ref().map(|d| d.id),
            data.priority_level.unwrap_or_default(),
            data.managed_by_store.unwrap_or(true),
            data.delivery_notes,
        );
        let shipment = self.repo.insert_shipment(shipment).await?;
        tracing::info!(
            shipment_id = %shipment.id,
            store_order_id = %shipment.store_order_id,
            driver_id = ?shipment.driver_id,
            status = %shipment.status,
            "shipment created"
        );

        let mut notes = vec![Notification::new(
            order.buyer_id,
            NotificationKind::ShipmentUpdated,
            order.id,
            format!("shipment {} is {}", shipment.id, shipment.status),
        )
        .with_store(shipment.store_id)
        .with_shipment(shipment.id)];
        if let Some(driver) = driver {
            notes.push(driver_note(&driver, &shipment));
        }
        dispatch(self.notifier.as_ref(), notes).await;
        Ok(shipment)
    }

    pub async fn assign_driver(
        &self,
        actor: &Actor,
        request: AssignDriverRequest,
    ) -> Result<Shipment, AppError> {
        self.apply(actor, request.shipment_id, ShipmentPatch::assign(request.driver_id))
            .await
    }

    pub async fn update_shipment(
        &self,
        actor: &Actor,
        request: UpdateShipmentRequest,
    ) -> Result<Shipment, AppError> {
        let patch = request.shipment_data.patch();
        if patch.is_empty() {
            return Err(DomainError::invalid("shipment update carries no changes").into());
        }
        self.apply(actor, request.shipment_data.shipment_id, patch).await
    }

    async fn apply(
        &self,
        actor: &Actor,
        shipment_id: Uuid,
        patch: ShipmentPatch,
    ) -> Result<Shipment, AppError> {
        actor.authorize(Capability::ManageShipments)?;
        let before = self.shipment(shipment_id).await?;
        self.check_store_owner(actor, before.store_id).await?;
        let driver = match patch.driver_id {
            Some(id) => Some(self.driver(id).await?),
            None => None,
        };

        let after = self.repo.update_shipment(shipment_id, patch).await?;
        tracing::info!(
            shipment_id = %after.id,
            from = %before.status,
            to = %after.status,
            driver_id = ?after.driver_id,
            "shipment updated"
        );

        let mut notes = Vec::new();
        if let Some(driver) = driver.filter(|d| before.driver_id != Some(d.id)) {
            notes.push(driver_note(&driver, &after));
        }
        if before.status != after.status {
            let order = self.repo.get_order(after.order_id).await.unwrap_or_else(|e| {
                tracing::warn!(order_id = %after.order_id, error = %e, "order lookup for notification failed");
                None
            });
            if let Some(order) = order {
                notes.push(
                    Notification::new(
                        order.buyer_id,
                        NotificationKind::ShipmentUpdated,
                        order.id,
                        format!("shipment {} is {}", after.id, after.status),
                    )
                    .with_store(after.store_id)
                    .with_shipment(after.id),
                );
            }
        }
        dispatch(self.notifier.as_ref(), notes).await;
        Ok(after)
    }

    /// Appends a position report. Store users may only track shipments
    /// their own store manages.
    pub async fn add_tracking(
        &self,
        actor: &Actor,
        request: TrackingRequest,
    ) -> Result<TrackingPing, AppError> {
        actor.authorize(Capability::RecordTracking)?;
        let data = request.tracking_data;
        let shipment = self.shipment(data.shipment_id).await?;
        if actor.role == Role::Store {
            self.check_store_owner(actor, shipment.store_id).await?;
            if !shipment.managed_by_store {
                return Err(DomainError::forbidden("shipment is not managed by the store").into());
            }
        }
        if !shipment.is_active() {
            return Err(DomainError::invalid(format!(
                "shipment {} is {}; tracking is closed",
                shipment.id, shipment.status
            ))
            .into());
        }
        let ping = TrackingPing::new(shipment.id, Coordinates::new(data.latitude, data.longitude))?;
        let ping = self.repo.add_tracking(ping).await?;
        tracing::debug!(
            shipment_id = %ping.shipment_id,
            latitude = ping.latitude,
            longitude = ping.longitude,
            "tracking ping recorded"
        );
        Ok(ping)
    }

    pub async fn list_tracking(
        &self,
        actor: &Actor,
        shipment_id: Uuid,
    ) -> Result<Vec<TrackingPing>, AppError> {
        actor.authorize(Capability::SearchShipments)?;
        let shipment = self.shipment(shipment_id).await?;
        match actor.role {
            Role::Store => self.check_store_owner(actor, shipment.store_id).await?,
            Role::Driver => {
                let own = self.repo.driver_for_user(actor.user_id).await?.map(|d| d.id);
                if own.is_none() || own != shipment.driver_id {
                    return Err(DomainError::forbidden("shipment is assigned to another driver").into());
                }
            }
            _ => {}
        }
        Ok(self.repo.list_tracking(shipment_id).await?)
    }

    pub async fn search_shipments(
        &self,
        actor: &Actor,
        params: ShipmentSearchParams,
    ) -> Result<Page<Shipment>, AppError> {
        actor.authorize(Capability::SearchShipments)?;
        let mut query = params.into_query()?;
        match actor.role {
            Role::Store => query.store_ids = Some(self.owned_store_ids(actor).await?),
            Role::Driver => match self.repo.driver_for_user(actor.user_id).await? {
                Some(driver) => query.driver_id = Some(driver.id),
                None => return Ok(Page::slice(Vec::new(), query.pagination)),
            },
            _ => {}
        }
        Ok(self.repo.search_shipments(&query).await?)
    }

    /// Drivers toggle their own record; admins name the driver. A driver
    /// with a shipment in progress cannot be made available.
    pub async fn set_driver_availability(
        &self,
        actor: &Actor,
        request: DriverAvailabilityRequest,
    ) -> Result<Driver, AppError> {
        actor.authorize(Capability::SetDriverAvailability)?;
        let driver = if actor.role == Role::Driver {
            let own = self
                .repo
                .driver_for_user(actor.user_id)
                .await?
                .ok_or_else(|| DomainError::not_found("driver", actor.user_id))?;
            if request.driver_id.is_some_and(|id| id != own.id) {
                return Err(DomainError::forbidden("drivers may only update themselves").into());
            }
            own
        } else {
            let id = request
                .driver_id
                .ok_or_else(|| DomainError::invalid("driverId is required"))?;
            self.driver(id).await?
        };

        if request.is_available {
            let busy = self
                .repo
                .search_shipments(&ShipmentQuery {
                    driver_id: Some(driver.id),
                    status: Some(ShipmentStatus::InProgress),
                    pagination: Pagination::new(Some(1), Some(1)),
                    ..ShipmentQuery::default()
                })
                .await?;
            if busy.total > 0 {
                return Err(DomainError::invalid(format!(
                    "driver {} has a shipment in progress",
                    driver.id
                ))
                .into());
            }
        }

        let driver = self
            .repo
            .set_driver_availability(driver.id, request.is_available)
            .await?
            .ok_or_else(|| DomainError::not_found("driver", driver.id))?;
        tracing::info!(driver_id = %driver.id, is_available = driver.is_available, "driver availability set");
        Ok(driver)
    }

    async fn order(&self, id: Uuid) -> Result<Order, AppError> {
        Ok(self
            .repo
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", id))?)
    }

    async fn shipment(&self, id: Uuid) -> Result<Shipment, AppError> {
        Ok(self
            .repo
            .get_shipment(id)
            .await?
            .ok_or_else(|| DomainError::not_found("shipment", id))?)
    }

    async fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        Ok(self
            .repo
            .get_driver(id)
            .await?
            .ok_or_else(|| DomainError::not_found("driver", id))?)
    }

    async fn owned_store_ids(&self, actor: &Actor) -> Result<Vec<Uuid>, AppError> {
        if actor.role != Role::Store {
            return Ok(Vec::new());
        }
        Ok(self
            .repo
            .stores_owned_by(actor.user_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect())
    }

    /// Store users must own `store_id`; other roles pass.
    async fn check_store_owner(&self, actor: &Actor, store_id: Uuid) -> Result<(), AppError> {
        if actor.role == Role::Store && !self.owned_store_ids(actor).await?.contains(&store_id) {
            return Err(DomainError::forbidden("shipment belongs to another store").into());
        }
        Ok(())
    }
}

fn driver_note(driver: &Driver, shipment: &Shipment) -> Notification {
    Notification::new(
        driver.user_id,
        NotificationKind::DriverAssigned,
        shipment.order_id,
        format!("you have been assigned shipment {}", shipment.id),
    )
    .with_store(shipment.store_id)
    .with_shipment(shipment.id)
}

/// The sub-order a shipment request is about: the named one, else the only
/// candidate the caller may ship.
fn pick_store_order<'a>(
    order: &'a Order,
    requested: Option<Uuid>,
    actor: &Actor,
    owned: &[Uuid],
) -> Result<&'a StoreOrder, DomainError> {
    if let Some(id) = requested {
        return order
            .store_order(id)
            .ok_or_else(|| DomainError::not_found("store order", id));
    }
    let candidates: Vec<&StoreOrder> = order
        .store_orders
        .iter()
        .filter(|s| actor.role != Role::Store || owned.contains(&s.store_id))
        .collect();
    match candidates.as_slice() {
        [only] => Ok(only),
        [] if actor.role == Role::Store => {
            Err(DomainError::forbidden("order has nothing for the caller's stores"))
        }
        _ => Err(DomainError::invalid(
            "storeOrderId is required when the order spans several stores",
        )),
    }
}
