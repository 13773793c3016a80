//! Spherical geometry on (RA, Dec) in degrees.
//!
//! Separations use the Vincenty form so that sub-arcsecond distances keep
//! full precision; the plain `acos` of a dot product does not.

/// Arcseconds per degree.
pub const ARCSEC_PER_DEG: f64 = 3600.0;

pub fn arcsec_to_deg(arcsec: f64) -> f64 {
    arcsec / ARCSEC_PER_DEG
}

pub fn deg_to_arcsec(deg: f64) -> f64 {
    deg * ARCSEC_PER_DEG
}

/// Bring an RA in degrees into `[0, 360)`.
pub fn wrap_ra(ra: f64) -> f64 {
    let r = ra.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if r >= 360.0 { 0.0 } else { r }
}

/// Convert (RA, Dec) in degrees to a unit vector `[x, y, z]`.
pub fn radec_to_xyz(ra: f64, dec: f64) -> [f64; 3] {
    let (ra, dec) = (ra.to_radians(), dec.to_radians());
    let cos_dec = dec.cos();
    [cos_dec * ra.cos(), cos_dec * ra.sin(), dec.sin()]
}

/// Convert a (not necessarily unit) vector to (RA, Dec) in degrees.
pub fn xyz_to_radec(xyz: [f64; 3]) -> (f64, f64) {
    let ra = wrap_ra(f64::atan2(xyz[1], xyz[0]).to_degrees());
    let dec = f64::atan2(xyz[2], xyz[0].hypot(xyz[1])).to_degrees();
    (ra, dec)
}

/// Great-circle separation in degrees.
///
/// Bit-for-bit symmetric in its two points: they are put in a fixed order
/// before evaluating.
pub fn separation(ra0: f64, dec0: f64, ra1: f64, dec1: f64) -> f64 {
    let ((ra0, dec0), (ra1, dec1)) = if (ra0, dec0) <= (ra1, dec1) {
        ((ra0, dec0), (ra1, dec1))
    } else {
        ((ra1, dec1), (ra0, dec0))
    };
    let dra = (ra1 - ra0).to_radians();
    let (d0, d1) = (dec0.to_radians(), dec1.to_radians());
    let (s0, c0) = d0.sin_cos();
    let (s1, c1) = d1.sin_cos();
    let (sdra, cdra) = dra.sin_cos();

    let num1 = c1 * sdra;
    let num2 = c0 * s1 - s0 * c1 * cdra;
    let denom = s0 * s1 + c0 * c1 * cdra;
    num1.hypot(num2).atan2(denom).to_degrees()
}

/// Position angle (bearing) of point 1 as seen from point 0, degrees east of
/// north in `[0, 360)`.
pub fn position_angle(ra0: f64, dec0: f64, ra1: f64, dec1: f64) -> f64 {
    let dra = (ra1 - ra0).to_radians();
    let (d0, d1) = (dec0.to_radians(), dec1.to_radians());
    let y = dra.sin() * d1.cos();
    let x = d0.cos() * d1.sin() - d0.sin() * d1.cos() * dra.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Bearing and separation from point 0 to point 1, both in degrees.
pub fn project_and_measure(ra0: f64, dec0: f64, ra1: f64, dec1: f64) -> (f64, f64) {
    (
        position_angle(ra0, dec0, ra1, dec1),
        separation(ra0, dec0, ra1, dec1),
    )
}

/// The point reached by travelling `distance` degrees from (ra, dec) along
/// `bearing` (degrees east of north). Inverse of [`project_and_measure`].
pub fn offset_by(ra: f64, dec: f64, bearing: f64, distance: f64) -> (f64, f64) {
    let (ra, dec) = (ra.to_radians(), dec.to_radians());
    let (pa, d) = (bearing.to_radians(), distance.to_radians());
    let (sd, cd) = dec.sin_cos();
    let (sdist, cdist) = d.sin_cos();

    let sin_dec2 = sd * cdist + cd * sdist * pa.cos();
    let dec2 = sin_dec2.clamp(-1.0, 1.0).asin();
    let ra2 = ra + (pa.sin() * sdist * cd).atan2(cdist - sd * sin_dec2);
    (wrap_ra(ra2.to_degrees()), dec2.to_degrees())
}

/// Midpoint of the great-circle arc between two points.
pub fn midpoint(ra0: f64, dec0: f64, ra1: f64, dec1: f64) -> (f64, f64) {
    let (bearing, sep) = project_and_measure(ra0, dec0, ra1, dec1);
    offset_by(ra0, dec0, bearing, sep / 2.0)
}

/// Mean direction of a set of points (normalized vector sum). `None` for an
/// empty set or antipodal points.
pub fn mean_position(points: impl IntoIterator<Item = (f64, f64)>) -> Option<(f64, f64)> {
    let mut sum = [0.0; 3];
    let mut n = 0usize;
    for (ra, dec) in points {
        let v = radec_to_xyz(ra, dec);
        for i in 0..3 {
            sum[i] += v[i];
        }
        n += 1;
    }
    let norm = (sum[0] * sum[0] + sum[1] * sum[1] + sum[2] * sum[2]).sqrt();
    if n == 0 || norm < 1e-12 {
        return None;
    }
    Some(xyz_to_radec(sum))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    #[test]
    fn wrap_ra_range() {
        assert_close(wrap_ra(-0.1), 359.9, 1e-12);
        assert_close(wrap_ra(360.1), 0.1, 1e-12);
        assert_eq!(wrap_ra(-1e-20), 0.0);
        assert_eq!(wrap_ra(0.0), 0.0);
    }

    #[test]
    fn roundtrip_radec_xyz() {
        for (ra, dec) in [(0.0, 0.0), (180.0, 0.0), (45.0, 30.0), (270.0, -45.0), (12.3, 89.0)] {
            let (ra2, dec2) = xyz_to_radec(radec_to_xyz(ra, dec));
            assert_close(ra, ra2, 1e-9);
            assert_close(dec, dec2, 1e-9);
        }
    }

    #[test]
    fn separation_known() {
        assert_close(separation(0.0, 0.0, 90.0, 0.0), 90.0, 1e-12);
        assert_close(separation(10.0, 80.0, 190.0, 80.0), 20.0, 1e-9);
        assert_close(separation(0.0, 90.0, 0.0, -90.0), 180.0, 1e-9);
    }

    #[test]
    fn separation_is_exactly_symmetric() {
        let pts = [(10.0, 30.0), (10.000123, 30.0004), (359.9999, -12.3), (0.0001, -12.30001)];
        for a in pts {
            for b in pts {
                assert_eq!(separation(a.0, a.1, b.0, b.1), separation(b.0, b.1, a.0, a.1));
            }
        }
    }

    #[test]
    fn separation_across_seam() {
        assert_close(separation(359.9, 0.0, 0.1, 0.0), 0.2, 1e-9);
    }

    #[test]
    fn separation_keeps_arcsecond_precision() {
        let one_arcsec = arcsec_to_deg(1.0);
        let sep = separation(150.0, 2.0, 150.0, 2.0 + one_arcsec);
        assert_close(deg_to_arcsec(sep), 1.0, 1e-7);
    }

    #[test]
    fn position_angle_cardinal() {
        assert_close(position_angle(10.0, 0.0, 10.0, 1.0), 0.0, 1e-9);
        assert_close(position_angle(10.0, 0.0, 11.0, 0.0), 90.0, 1e-9);
        assert_close(position_angle(10.0, 0.0, 10.0, -1.0), 180.0, 1e-9);
        assert_close(position_angle(10.0, 0.0, 9.0, 0.0), 270.0, 1e-9);
    }

    #[test]
    fn offset_inverts_measure() {
        let (ra0, dec0, ra1, dec1) = (359.8, -20.0, 0.3, -19.7);
        let (bearing, sep) = project_and_measure(ra0, dec0, ra1, dec1);
        let (ra, dec) = offset_by(ra0, dec0, bearing, sep);
        assert_close(ra, ra1, 1e-9);
        assert_close(dec, dec1, 1e-9);
    }

    #[test]
    fn midpoint_across_seam() {
        let (ra, dec) = midpoint(359.0, 0.0, 1.0, 0.0);
        assert!(ra < 1e-9 || ra > 360.0 - 1e-9, "ra = {ra}");
        assert_close(dec, 0.0, 1e-9);
        let m = midpoint(10.0, 10.0, 12.0, 14.0);
        assert_close(separation(10.0, 10.0, m.0, m.1), separation(12.0, 14.0, m.0, m.1), 1e-9);
    }

    #[test]
    fn mean_position_basic() {
        let (ra, dec) = mean_position([(359.5, 10.0), (0.5, 10.0)]).unwrap();
        assert!(ra > 359.99 || ra < 0.01);
        assert!(dec > 10.0);
        assert!(mean_position(Vec::new()).is_none());
        assert!(mean_position([(0.0, 0.0), (180.0, 0.0)]).is_none());
    }
}
