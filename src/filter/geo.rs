use crate::sample::Sample;

/// IUGG mean Earth radius.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two samples in meters (haversine).
pub fn distance_meters(a: &Sample, b: &Sample) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = lat_b - lat_a;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
