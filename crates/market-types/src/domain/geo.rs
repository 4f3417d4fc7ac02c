use crate::domain::address::Coordinates;
use crate::domain::error::DomainError;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres (haversine). Both ends must be known,
/// in-range coordinates.
pub fn compute_distance(origin: Coordinates, dest: Coordinates) -> Result<f64, DomainError> {
    let origin = origin.require_known()?;
    let dest = dest.require_known()?;

    let (lat1, lat2) = (origin.latitude.to_radians(), dest.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (dest.longitude - origin.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    Ok((EARTH_RADIUS_KM * c).max(0.0))
}
