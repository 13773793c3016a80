//! Cross-match of same-position objects across bands into sources.

use std::collections::BTreeMap;

use crate::config::DataConfig;
use crate::error::Result;
use crate::geom::sphere::{arcsec_to_deg, mean_position, midpoint};
use crate::index::Neighbor;
use crate::reader::{Reader, candidate_files};
use crate::record::{Band, ObjectRecord};

/// Match radius used when none is given.
pub const DEFAULT_RADIUS_ARCSEC: f64 = 2.0;

/// A group of objects, at most one per band, taken to be one physical source.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    members: BTreeMap<Band, ObjectRecord>,
    pub ra: f64,
    pub dec: f64,
}

impl Source {
    pub fn singleton(record: ObjectRecord) -> Self {
        let (ra, dec) = (record.ra, record.dec);
        let mut members = BTreeMap::new();
        members.insert(record.band, record);
        Source { members, ra, dec }
    }

    /// Build a source from records; the first record of each band wins.
    /// `None` if there are no records.
    pub fn from_members(records: impl IntoIterator<Item = ObjectRecord>) -> Option<Self> {
        let mut members = BTreeMap::new();
        for rec in records {
            members.entry(rec.band).or_insert(rec);
        }
        let (ra, dec) = centre(&members)?;
        Some(Source { members, ra, dec })
    }

    pub fn member(&self, band: Band) -> Option<&ObjectRecord> {
        self.members.get(&band)
    }

    /// Members in band order.
    pub fn members(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.members.values()
    }

    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        self.members.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn insert(&mut self, record: ObjectRecord) {
        self.members.insert(record.band, record);
        if let Some((ra, dec)) = centre(&self.members) {
            self.ra = ra;
            self.dec = dec;
        }
    }
}

fn centre(members: &BTreeMap<Band, ObjectRecord>) -> Option<(f64, f64)> {
    let recs: Vec<&ObjectRecord> = members.values().collect();
    match recs.as_slice() {
        [] => None,
        [one] => Some((one.ra, one.dec)),
        [a, b] => Some(midpoint(a.ra, a.dec, b.ra, b.dec)),
        many => mean_position(many.iter().map(|r| (r.ra, r.dec))),
    }
}

/// More than one candidate fell inside the radius; the nearest was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousMatch {
    pub band: Band,
    pub candidates: usize,
    pub chosen: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: Source,
    pub warnings: Vec<AmbiguousMatch>,
}

/// Objects of `band` within `radius_arcsec` of `anchor`, searched in the
/// anchor's partition only. Empty when that partition has no `band` tree.
pub fn match_candidates(
    reader: &Reader,
    anchor: &ObjectRecord,
    band: Band,
    radius_arcsec: f64,
) -> Vec<Neighbor> {
    reader
        .indices()
        .spatial
        .get(band, anchor.partition_id)
        .map(|part| part.within(anchor.ra, anchor.dec, arcsec_to_deg(radius_arcsec)))
        .unwrap_or_default()
}

/// Group `anchor` with the nearest object of every other band within
/// `radius_arcsec`. A source with only the anchor is a valid result.
pub fn resolve_source(reader: &Reader, anchor: &ObjectRecord, radius_arcsec: f64) -> Result<Resolution> {
    let mut source = Source::singleton(anchor.clone());
    let mut warnings = Vec::new();
    for band in anchor.band.others() {
        let candidates = match_candidates(reader, anchor, band, radius_arcsec);
        let Some(nearest) = candidates.first() else {
            continue;
        };
        if candidates.len() > 1 {
            tracing::warn!(
                anchor = anchor.id,
                %band,
                candidates = candidates.len(),
                chosen = nearest.id,
                "ambiguous match, keeping the nearest"
            );
            warnings.push(AmbiguousMatch {
                band,
                candidates: candidates.len(),
                chosen: nearest.id,
            });
        }
        source.insert(reader.record(nearest.id)?);
    }
    Ok(Resolution { source, warnings })
}

impl Reader {
    /// The source made of the nearest object per band around (ra, dec).
    /// `None` when nothing lies within the radius.
    pub fn locate_source(&self, ra: f64, dec: f64, radius_arcsec: f64) -> Result<Option<Resolution>> {
        let found = self.locate_objects(ra, dec, radius_arcsec)?;
        let mut per_band: BTreeMap<Band, Vec<ObjectRecord>> = BTreeMap::new();
        for obj in found {
            per_band.entry(obj.record.band).or_default().push(obj.record);
        }

        let mut warnings = Vec::new();
        let mut nearest = Vec::new();
        for (band, mut recs) in per_band {
            if recs.len() > 1 {
                tracing::warn!(%band, candidates = recs.len(), "several objects near position, keeping the nearest");
                warnings.push(AmbiguousMatch {
                    band,
                    candidates: recs.len(),
                    chosen: recs[0].id,
                });
            }
            nearest.push(recs.swap_remove(0));
        }
        Ok(Source::from_members(nearest).map(|source| Resolution { source, warnings }))
    }
}

/// [`Reader::locate_source`] over every raw file in the data root that can
/// contain the position.
pub fn locate_sources_in_root(
    config: &DataConfig,
    ra: f64,
    dec: f64,
    radius_arcsec: f64,
) -> Result<Vec<Resolution>> {
    let mut sources = Vec::new();
    for path in candidate_files(config, ra, dec, radius_arcsec)? {
        if let Some(res) = Reader::open(&path)?.locate_source(ra, dec, radius_arcsec)? {
            sources.push(res);
        }
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::sphere::separation;
    use crate::index::{BuildOptions, build_index};
    use std::fs;
    use std::path::{Path, PathBuf};

    fn rec(id: u64, band: Band, ra: f64, dec: f64) -> ObjectRecord {
        ObjectRecord {
            id,
            epoch_count: 0,
            band,
            field_id: 1,
            partition_id: 0,
            ra,
            dec,
            byte_offset: 0,
        }
    }

    fn build(dir: &Path, body: &str) -> PathBuf {
        let raw = dir.join("field000001_ra9.0to11.0_dec-1.0to1.0.txt");
        fs::write(&raw, body).unwrap();
        build_index(&raw, &BuildOptions::default()).unwrap();
        raw
    }

    #[test]
    fn source_centre_is_spherical() {
        let s = Source::from_members([rec(1, Band::G, 10.0, 0.0), rec(2, Band::R, 10.002, 0.0)]).unwrap();
        assert!((s.ra - 10.001).abs() < 1e-9);
        assert!(s.dec.abs() < 1e-9);

        let three = Source::from_members([
            rec(1, Band::G, 10.0, 0.0),
            rec(2, Band::R, 10.003, 0.0),
            rec(3, Band::I, 10.0, 0.003),
        ])
        .unwrap();
        assert!((three.ra - 10.001).abs() < 1e-6);
        assert!((three.dec - 0.001).abs() < 1e-6);
        assert!(Source::from_members([]).is_none());
    }

    #[test]
    fn first_member_per_band_wins() {
        let s = Source::from_members([rec(1, Band::G, 10.0, 0.0), rec(2, Band::G, 11.0, 0.0)]).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s.member(Band::G).unwrap().id, 1);
        assert_eq!(s.ra, 10.0);
    }

    #[test]
    fn ambiguous_match_keeps_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let raw = build(
            dir.path(),
            "# 1 0 1 1 0 10.0 0.0\n# 2 0 2 1 0 10.0004 0.0\n# 3 0 2 1 0 10.0002 0.0\n",
        );
        let reader = Reader::open(&raw).unwrap();
        let anchor = reader.record(1).unwrap();
        let res = resolve_source(&reader, &anchor, 2.0).unwrap();
        assert_eq!(res.source.member(Band::R).unwrap().id, 3);
        assert_eq!(
            res.warnings,
            vec![AmbiguousMatch {
                band: Band::R,
                candidates: 2,
                chosen: 3
            }]
        );
    }

    #[test]
    fn missing_band_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let raw = build(dir.path(), "# 1 0 1 1 0 10.0 0.0\n# 2 0 2 1 5 10.0 0.0\n");
        let reader = Reader::open(&raw).unwrap();
        let res = resolve_source(&reader, &reader.record(1).unwrap(), 2.0).unwrap();
        assert_eq!(res.source.len(), 1);
        assert!(res.warnings.is_empty());
    }

    #[test]
    fn matching_is_symmetric_near_the_radius() {
        let dir = tempfile::tempdir().unwrap();
        let dra = arcsec_to_deg(1.99);
        let body = format!("# 1 0 1 1 0 10.0 0.0\n# 2 0 2 1 0 {} 0.0\n# 3 0 2 1 0 10.0 0.5\n", 10.0 + dra);
        let raw = build(dir.path(), &body);
        let reader = Reader::open(&raw).unwrap();
        let a = reader.record(1).unwrap();
        let b = reader.record(2).unwrap();
        assert!(separation(a.ra, a.dec, b.ra, b.dec) <= arcsec_to_deg(2.0));

        let from_a = resolve_source(&reader, &a, 2.0).unwrap().source;
        assert_eq!(from_a.member(Band::R).unwrap().id, 2);
        let from_b = resolve_source(&reader, &b, 2.0).unwrap().source;
        assert_eq!(from_b.member(Band::G).unwrap().id, 1);
    }

    #[test]
    fn locate_source_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let raw = build(
            dir.path(),
            "# 1 0 1 1 0 10.0 0.0\n# 2 0 2 1 0 10.0002 0.0\n# 3 0 3 1 0 10.5 0.0\n",
        );
        let reader = Reader::open(&raw).unwrap();
        let res = reader.locate_source(10.0001, 0.0, 2.0).unwrap().unwrap();
        assert_eq!(res.source.bands().collect::<Vec<_>>(), vec![Band::G, Band::R]);
        assert!(reader.locate_source(20.0, 0.0, 2.0).unwrap().is_none());

        let config = DataConfig::new(dir.path());
        assert_eq!(locate_sources_in_root(&config, 10.0001, 0.0, 2.0).unwrap().len(), 1);
    }
}
