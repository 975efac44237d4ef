use nalgebra::Vector3;
use crate::basic::var::{GeoPos, FE_WGS84, RE_WGS84};

const MAX_ITER: usize = 10;
const LAT_TOL: f64 = 1E-12;
const POLE_TOL: f64 = 1E-6;

/// ECEF (m) to geodetic position (deg, deg, m) on WGS84.
///
/// Iterates latitude from the `atan2(z, p(1-e2))` estimate until the change drops
/// below 1e-12 rad or ten iterations have run. Longitude is reported as 0 at the poles.
pub fn ecef2pos(r: &Vector3<f64>) -> GeoPos {
    let e2 = FE_WGS84 * (2.0 - FE_WGS84);
    let (x, y, z) = (r[0], r[1], r[2]);
    let p = x.hypot(y);

    if p < POLE_TOL {
        let lat = std::f64::consts::FRAC_PI_2.copysign(z);
        let alt = z.abs() - RE_WGS84 * (1.0 - e2).sqrt();
        return GeoPos::new(lat.to_degrees(), 0.0, alt);
    }

    let lon = y.atan2(x);
    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..MAX_ITER {
        let v = prime_vertical(lat, e2);
        let alt = p / lat.cos() - v;
        let next = z.atan2(p * (1.0 - e2 * (v / (v + alt))));
        let done = (next - lat).abs() < LAT_TOL;
        lat = next;
        if done {
            break;
        }
    }
    let alt = p / lat.cos() - prime_vertical(lat, e2);

    GeoPos::new(lat.to_degrees(), lon.to_degrees(), alt)
}

/// Geodetic position (deg, deg, m) to ECEF (m) on WGS84.
pub fn pos2ecef(pos: &GeoPos) -> Vector3<f64> {
    let e2 = FE_WGS84 * (2.0 - FE_WGS84);
    let (lat, lon) = (pos.lat.to_radians(), pos.lon.to_radians());
    let v = prime_vertical(lat, e2);
    Vector3::new(
        (v + pos.alt) * lat.cos() * lon.cos(),
        (v + pos.alt) * lat.cos() * lon.sin(),
        (v * (1.0 - e2) + pos.alt) * lat.sin(),
    )
}

/// Horizontal and vertical distance (m) between two reference positions.
///
/// A local flat-earth approximation; good enough to compare two base station datums.
pub fn base_offset(a: &GeoPos, b: &GeoPos) -> (f64, f64) {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat_mean = 0.5 * (a.lat + b.lat).to_radians();
    let dx = RE_WGS84 * dlon * lat_mean.cos();
    let dy = RE_WGS84 * dlat;
    (dx.hypot(dy), (b.alt - a.alt).abs())
}

fn prime_vertical(lat: f64, e2: f64) -> f64 {
    let sinp = lat.sin();
    RE_WGS84 / (1.0 - e2 * sinp * sinp).sqrt()
}
