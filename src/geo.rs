//! Great-circle distance on a spherical Earth approximation.

pub const EARTH_RADIUS_KM: f64 = 6371.0;


/// Haversine distance in kilometers between two WGS-84 points given in
/// degrees. Only defined for latitude in [-90, 90] and longitude in
/// [-180, 180]; callers pass anything else at their own risk.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_to_self() {
        assert_eq!(distance_km(23.2599, 77.4126, 23.2599, 77.4126), 0.0);
        assert_eq!(distance_km(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn symmetric() {
        let pairs = [
            ((23.2599, 77.4126), (23.2315, 77.4219)),
            ((-33.8688, 151.2093), (51.5074, -0.1278)),
            ((89.9, 0.0), (-89.9, 180.0)),
        ];

        for &((lat1, lon1), (lat2, lon2)) in pairs.iter() {
            let d1 = distance_km(lat1, lon1, lat2, lon2);
            let d2 = distance_km(lat2, lon2, lat1, lon1);
            assert!((d1 - d2).abs() < 1e-9);
        }
    }

    #[test]
    fn quarter_circumference() {
        // Equator to pole along a meridian.
        let d = distance_km(0.0, 0.0, 90.0, 0.0);
        let expected = EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn city_scale_distance() {
        // Two points in Bhopal roughly 3.3 km apart.
        let d = distance_km(23.2599, 77.4126, 23.2315, 77.4219);
        assert!(d > 3.0 && d < 3.5, "unexpected distance: {}", d);
    }
}
