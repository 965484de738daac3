//! Travel legs between consecutive activities

use crate::models::{Coordinates, TransportMode};

const EARTH_RADIUS_KM: f64 = 6371.0;

const WALKING_MAX_KM: f64 = 0.5;
const PUBLIC_TRANSPORT_MAX_KM: f64 = 3.0;

const WALKING_MIN_PER_KM: f64 = 12.0;
const PUBLIC_TRANSPORT_MIN_PER_KM: f64 = 8.0;
const TAXI_MIN_PER_KM: f64 = 5.0;

const PUBLIC_TRANSPORT_FARE: f64 = 2.50;
const TAXI_BASE_FARE: f64 = 1.50;
const TAXI_FARE_PER_KM: f64 = 1.20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegEstimate {
    pub mode: TransportMode,
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub cost: f64,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Leg from `from` to `to`. An unknown origin counts as zero distance.
pub fn estimate_leg(from: Option<Coordinates>, to: Coordinates) -> LegEstimate {
    let distance_km = from.map(|f| haversine_km(f, to)).unwrap_or(0.0);

    let (mode, min_per_km, floor, cost) = if distance_km <= WALKING_MAX_KM {
        (TransportMode::Walking, WALKING_MIN_PER_KM, 5, 0.0)
    } else if distance_km <= PUBLIC_TRANSPORT_MAX_KM {
        (
            TransportMode::PublicTransport,
            PUBLIC_TRANSPORT_MIN_PER_KM,
            10,
            PUBLIC_TRANSPORT_FARE,
        )
    } else {
        (
            TransportMode::Taxi,
            TAXI_MIN_PER_KM,
            15,
            TAXI_BASE_FARE + TAXI_FARE_PER_KM * distance_km,
        )
    };

    let duration_minutes = ((distance_km * min_per_km).ceil() as u32).max(floor);

    LegEstimate {
        mode,
        distance_km,
        duration_minutes,
        cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISBON: Coordinates = Coordinates { latitude: 38.7223, longitude: -9.1393 };
    const PORTO: Coordinates = Coordinates { latitude: 41.1579, longitude: -8.6291 };

    #[test]
    fn test_haversine_known_distance() {
        let km = haversine_km(LISBON, PORTO);
        assert!((270.0..280.0).contains(&km), "got {}", km);
        assert_eq!(haversine_km(LISBON, LISBON), 0.0);
    }

    #[test]
    fn test_mode_thresholds() {
        let near = Coordinates { latitude: 38.7250, longitude: -9.1393 };
        let mid = Coordinates { latitude: 38.7400, longitude: -9.1393 };

        let walk = estimate_leg(Some(LISBON), near);
        assert_eq!(walk.mode, TransportMode::Walking);
        assert_eq!(walk.duration_minutes, 5);
        assert_eq!(walk.cost, 0.0);

        let bus = estimate_leg(Some(LISBON), mid);
        assert_eq!(bus.mode, TransportMode::PublicTransport);
        assert_eq!(bus.duration_minutes, 16);
        assert_eq!(bus.cost, 2.50);

        let taxi = estimate_leg(Some(LISBON), PORTO);
        assert_eq!(taxi.mode, TransportMode::Taxi);
        assert!(taxi.cost > 300.0);
    }

    #[test]
    fn test_unknown_origin_is_a_short_walk() {
        let leg = estimate_leg(None, PORTO);
        assert_eq!(leg.mode, TransportMode::Walking);
        assert_eq!(leg.distance_km, 0.0);
        assert_eq!(leg.duration_minutes, 5);
    }
}
