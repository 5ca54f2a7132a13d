/// Great-circle distance between two WGS-84 coordinates, in meters.
///
/// Haversine on a mean-radius sphere. Raw degree deltas are off by the
/// cosine of the latitude in the east-west direction, which at 45°N already
/// rejects valid check-ins from across the street; this stays within ~0.5%
/// of the geodesic everywhere check-ins happen.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}
