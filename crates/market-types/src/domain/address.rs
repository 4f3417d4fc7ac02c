use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `(0, 0)` is what the address form stores when geocoding never ran.
    pub fn is_unknown(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    pub fn in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Range check only. Used for tracking pings.
    pub fn check_range(self) -> Result<Self, DomainError> {
        if self.in_range() {
            Ok(self)
        } else {
            Err(self.invalid())
        }
    }

    /// Range check plus rejection of the unknown sentinel. Fee computation
    /// goes through this.
    pub fn require_known(self) -> Result<Self, DomainError> {
        if self.in_range() && !self.is_unknown() {
            Ok(self)
        } else {
            Err(self.invalid())
        }
    }

    fn invalid(&self) -> DomainError {
        DomainError::InvalidCoordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressLocation {
    #[serde(rename_all = "camelCase")]
    Urban {
        commune: String,
        district: String,
        landmark: Option<String>,
        street: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Rural {
        sub_prefecture: String,
        prefecture: String,
        district: Option<String>,
        landmark: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location: AddressLocation,
    #[serde(default)]
    pub coordinates: Coordinates,
    pub region: String,
    pub postal_code: Option<String>,
    pub formatted: String,
}
