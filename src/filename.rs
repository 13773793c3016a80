//! Raw file names: `field<NNNNNN>_ra<min>to<max>_dec<min>to<max>.txt`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::geom::sphere::wrap_ra;

/// Field id and sky bounding box encoded in a raw file's name.
///
/// A box with `ra_max < ra_min` wraps through RA 0/360.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFileName {
    pub field_id: u32,
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl RawFileName {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFileName {
                name: path.display().to_string(),
            })?;
        name.parse()
    }

    pub fn wraps(&self) -> bool {
        self.ra_max < self.ra_min
    }

    /// Whether (ra, dec) lies inside the box.
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        self.contains_within(ra, dec, 0.0)
    }

    /// Whether (ra, dec) lies inside the box grown by `margin` degrees.
    ///
    /// The RA margin is widened by `1/cos(dec)` so that a search circle of
    /// radius `margin` around a point just outside the box still counts.
    pub fn contains_within(&self, ra: f64, dec: f64, margin: f64) -> bool {
        if dec < self.dec_min - margin || dec > self.dec_max + margin {
            return false;
        }
        let cos_dec = dec.abs().min(89.999).to_radians().cos();
        let ra_margin = (margin / cos_dec).min(180.0);
        let ra = wrap_ra(ra);
        let lo = wrap_ra(self.ra_min - ra_margin);
        let hi = wrap_ra(self.ra_max + ra_margin);
        if (self.ra_max - self.ra_min).rem_euclid(360.0) + 2.0 * ra_margin >= 360.0 {
            return true;
        }
        if lo <= hi {
            (lo..=hi).contains(&ra)
        } else {
            ra >= lo || ra <= hi
        }
    }
}

impl FromStr for RawFileName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        let invalid = || Error::InvalidFileName {
            name: name.to_string(),
        };
        let stem = name.strip_suffix(".txt").ok_or_else(invalid)?;
        let mut parts = stem.splitn(3, '_');
        let field = parts.next().and_then(|p| p.strip_prefix("field"));
        let ra = parts.next().and_then(|p| p.strip_prefix("ra"));
        let dec = parts.next().and_then(|p| p.strip_prefix("dec"));
        let (Some(field), Some(ra), Some(dec)) = (field, ra, dec) else {
            return Err(invalid());
        };

        let field_id = field.parse::<u32>().map_err(|_| invalid())?;
        let (ra_min, ra_max) = parse_span(ra).ok_or_else(invalid)?;
        let (dec_min, dec_max) = parse_span(dec).ok_or_else(invalid)?;
        if dec_min > dec_max {
            return Err(invalid());
        }
        Ok(RawFileName {
            field_id,
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        })
    }
}

impl fmt::Display for RawFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field{:06}_ra{}to{}_dec{}to{}.txt",
            self.field_id, self.ra_min, self.ra_max, self.dec_min, self.dec_max
        )
    }
}

/// `<a>to<b>`; values may be negative (`-12.5to-10.0`).
fn parse_span(s: &str) -> Option<(f64, f64)> {
    let (a, b) = s.split_once("to")?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_name() {
        let n: RawFileName = "field000245_ra357.5to2.5_dec-12.5to-10.0.txt".parse().unwrap();
        assert_eq!(n.field_id, 245);
        assert_eq!((n.ra_min, n.ra_max), (357.5, 2.5));
        assert_eq!((n.dec_min, n.dec_max), (-12.5, -10.0));
        assert!(n.wraps());
        assert_eq!(n.to_string(), "field000245_ra357.5to2.5_dec-12.5to-10.txt");
    }

    #[test]
    fn rejects_other_names() {
        for bad in [
            "field000245_ra357.5to2.5.txt",
            "field000245_ra1to2_dec3to4.objects",
            "fieldX_ra1to2_dec3to4.txt",
            "field1_ra1_dec3to4.txt",
            "field1_ra1to2_dec4to3.txt",
        ] {
            assert!(
                matches!(bad.parse::<RawFileName>(), Err(Error::InvalidFileName { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn contains_handles_the_seam() {
        let wrapped: RawFileName = "field000001_ra358.0to2.0_dec-1.0to1.0.txt".parse().unwrap();
        assert!(wrapped.contains(359.0, 0.0));
        assert!(wrapped.contains(1.0, 0.0));
        assert!(!wrapped.contains(180.0, 0.0));
        assert!(!wrapped.contains(1.0, 2.0));

        let plain: RawFileName = "field000002_ra10.0to12.0_dec20.0to22.0.txt".parse().unwrap();
        assert!(plain.contains(11.0, 21.0));
        assert!(!plain.contains(12.5, 21.0));
        assert!(plain.contains_within(12.5, 21.0, 1.0));
    }

    #[test]
    fn from_path_uses_the_file_name() {
        let n = RawFileName::from_path(Path::new("/data/x/field000003_ra1to2_dec3to4.txt")).unwrap();
        assert_eq!(n.field_id, 3);
    }
}
