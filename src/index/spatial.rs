//! Per (band, partition) coordinate trees over object positions.
//!
//! Positions are stored in a partition-local plane `(ra' · cos(dec0), dec)`
//! where `ra'` is the RA after the partition's seam shift. Partitions that
//! straddle RA 0/360 would otherwise be split across the two ends of the RA
//! axis and radius queries near the seam would miss half of their neighbours.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::geom::sphere::separation;
use crate::kdtree::PlaneTree;
use crate::record::{Band, ObjectRecord, PARTITIONS_PER_FIELD};

use super::codec::{
    open_artifact, read_f64, read_preamble, read_u8, read_u64, truncated, write_atomic,
    write_f64, write_preamble, write_u8, write_u64,
};

const MAGIC: &[u8; 4] = b"LCSP";

/// Safety margin on the plane search radius before exact confirmation.
const SEARCH_MARGIN: f64 = 1.01;

/// RA correction applied to one partition before its tree is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeamShift {
    #[default]
    None,
    /// `ra - 360` for `ra > 180`: the patch is continuous around 0.
    SubtractAbove180,
    /// `ra + 360` for `ra < 180`: the patch is continuous around 360.
    AddBelow180,
}

impl SeamShift {
    pub fn apply(self, ra: f64) -> f64 {
        match self {
            SeamShift::None => ra,
            SeamShift::SubtractAbove180 if ra > 180.0 => ra - 360.0,
            SeamShift::AddBelow180 if ra < 180.0 => ra + 360.0,
            _ => ra,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SeamShift::None => 0,
            SeamShift::SubtractAbove180 => 1,
            SeamShift::AddBelow180 => 2,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SeamShift::None),
            1 => Some(SeamShift::SubtractAbove180),
            2 => Some(SeamShift::AddBelow180),
            _ => None,
        }
    }

    /// Pick a shift from the RAs of one partition's objects.
    ///
    /// A partition spans well under a degree, so an RA spread above 180
    /// means it wraps through the seam. The shift keeps the side holding the
    /// circular mean unchanged.
    pub fn infer(ras: &[f64]) -> SeamShift {
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut s, mut c) = (0.0, 0.0);
        for &ra in ras {
            lo = lo.min(ra);
            hi = hi.max(ra);
            let (sin, cos) = ra.to_radians().sin_cos();
            s += sin;
            c += cos;
        }
        if ras.is_empty() || hi - lo <= 180.0 {
            return SeamShift::None;
        }
        let mean = s.atan2(c).to_degrees().rem_euclid(360.0);
        if mean >= 180.0 {
            SeamShift::AddBelow180
        } else {
            SeamShift::SubtractAbove180
        }
    }
}

/// Static per-field seam calibration: partition id → shift.
///
/// Partitions not listed are inferred from their points at build time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCalibration {
    shifts: BTreeMap<u8, SeamShift>,
}

impl FieldCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, partition: u8, shift: SeamShift) -> Self {
        self.shifts.insert(partition, shift);
        self
    }

    pub fn get(&self, partition: u8) -> Option<SeamShift> {
        self.shifts.get(&partition).copied()
    }

    /// Fill every partition not listed with a shift inferred from the RAs
    /// of all its records, whatever their band.
    ///
    /// Every band of a partition shares the shift, so a band whose points
    /// all sit on one side of the seam still lines up with the others.
    pub fn completed_from(&self, records: &[ObjectRecord]) -> FieldCalibration {
        let mut ras: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
        for rec in records {
            if !self.shifts.contains_key(&rec.partition_id) {
                ras.entry(rec.partition_id).or_default().push(rec.ra);
            }
        }
        let mut shifts = self.shifts.clone();
        for (partition, ras) in ras {
            let shift = SeamShift::infer(&ras);
            if shift != SeamShift::None {
                tracing::debug!(partition, ?shift, "partition straddles the RA seam");
            }
            shifts.insert(partition, shift);
        }
        FieldCalibration { shifts }
    }
}

/// A confirmed neighbour of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: u64,
    /// Great-circle separation, degrees.
    pub separation: f64,
}

/// The tree and id array of one (band, partition) group.
#[derive(Debug, Clone)]
pub struct SpatialPartition {
    pub band: Band,
    pub partition: u8,
    pub shift: SeamShift,
    /// Reference declination of the local plane, degrees.
    pub dec0: f64,
    cos_dec0: f64,
    /// `(id, ra, dec)` in insertion order.
    points: Vec<(u64, f64, f64)>,
    positions: BTreeMap<u64, (f64, f64)>,
    tree: PlaneTree,
    /// Plane bounding box: `[min_x, min_y, max_x, max_y]`.
    bounds: [f64; 4],
}

impl SpatialPartition {
    pub fn build(
        band: Band,
        partition: u8,
        shift: SeamShift,
        points: Vec<(u64, f64, f64)>,
    ) -> Self {
        let dec0 = if points.is_empty() {
            0.0
        } else {
            points.iter().map(|p| p.2).sum::<f64>() / points.len() as f64
        };
        Self::with_reference(band, partition, shift, dec0, points)
    }

    fn with_reference(
        band: Band,
        partition: u8,
        shift: SeamShift,
        dec0: f64,
        points: Vec<(u64, f64, f64)>,
    ) -> Self {
        let cos_dec0 = dec0.to_radians().cos();
        let project = |ra: f64, dec: f64| [shift.apply(ra) * cos_dec0, dec];

        let mut bounds = [
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        ];
        for &(_, ra, dec) in &points {
            let p = project(ra, dec);
            bounds[0] = bounds[0].min(p[0]);
            bounds[1] = bounds[1].min(p[1]);
            bounds[2] = bounds[2].max(p[0]);
            bounds[3] = bounds[3].max(p[1]);
        }
        let tree = PlaneTree::build(points.iter().map(|&(id, ra, dec)| (id, project(ra, dec))));
        let positions = points.iter().map(|&(id, ra, dec)| (id, (ra, dec))).collect();

        SpatialPartition {
            band,
            partition,
            shift,
            dec0,
            cos_dec0,
            points,
            positions,
            tree,
            bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Ids in the parallel array, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.points.iter().map(|p| p.0)
    }

    pub fn position(&self, id: u64) -> Option<(f64, f64)> {
        self.positions.get(&id).copied()
    }

    /// Project a sky position into this partition's plane, seam shift applied.
    pub fn project(&self, ra: f64, dec: f64) -> [f64; 2] {
        [self.shift.apply(ra) * self.cos_dec0, dec]
    }

    /// The query's shifted RA on whichever branch (±360) lies nearest the
    /// partition's points.
    fn query_ra(&self, ra: f64) -> f64 {
        let shifted = self.shift.apply(ra);
        if self.is_empty() {
            return shifted;
        }
        let centre = 0.5 * (self.bounds[0] + self.bounds[2]) / self.cos_dec0.max(1e-9);
        [shifted, shifted - 360.0, shifted + 360.0]
            .into_iter()
            .min_by(|a, b| (a - centre).abs().total_cmp(&(b - centre).abs()))
            .unwrap_or(shifted)
    }

    fn project_query(&self, ra: f64, dec: f64) -> [f64; 2] {
        [self.query_ra(ra) * self.cos_dec0, dec]
    }

    /// Plane radius that is guaranteed to contain every point within
    /// `radius` degrees of great-circle separation from a query at `dec`.
    fn plane_radius(&self, dec: f64, radius: f64) -> f64 {
        let extreme = (dec.abs() + radius).min(90.0);
        let min_cos = extreme.to_radians().cos().max(1e-9);
        radius * (self.cos_dec0 / min_cos).max(1.0) * SEARCH_MARGIN
    }

    /// Whether the partition's points could lie within `radius` of the query.
    pub fn may_contain(&self, ra: f64, dec: f64, radius: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        let q = self.project_query(ra, dec);
        let r = self.plane_radius(dec, radius);
        q[0] >= self.bounds[0] - r
            && q[0] <= self.bounds[2] + r
            && q[1] >= self.bounds[1] - r
            && q[1] <= self.bounds[3] + r
    }

    /// Every point within `radius` degrees of (ra, dec), nearest first.
    ///
    /// The tree yields candidates in the local plane; each is confirmed
    /// against the great-circle separation.
    pub fn within(&self, ra: f64, dec: f64, radius: f64) -> Vec<Neighbor> {
        let q = self.project_query(ra, dec);
        let mut found: Vec<Neighbor> = self
            .tree
            .within(q, self.plane_radius(dec, radius))
            .into_iter()
            .filter_map(|hit| {
                let (pra, pdec) = self.positions[&hit.id];
                let sep = separation(ra, dec, pra, pdec);
                (sep <= radius).then_some(Neighbor {
                    id: hit.id,
                    separation: sep,
                })
            })
            .collect();
        found.sort_by(|a, b| {
            a.separation
                .total_cmp(&b.separation)
                .then(a.id.cmp(&b.id))
        });
        found
    }
}

/// All spatial partitions of one raw file.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    partitions: BTreeMap<(Band, u8), SpatialPartition>,
}

impl SpatialIndex {
    pub fn get(&self, band: Band, partition: u8) -> Option<&SpatialPartition> {
        self.partitions.get(&(band, partition))
    }

    pub fn partitions(&self) -> impl Iterator<Item = &SpatialPartition> {
        self.partitions.values()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            write_preamble(w, MAGIC)?;
            write_u64(w, self.partitions.len() as u64)?;
            for p in self.partitions.values() {
                write_u8(w, p.band.filter_id())?;
                write_u8(w, p.partition)?;
                write_u8(w, p.shift.to_u8())?;
                write_f64(w, p.dec0)?;
                write_u64(w, p.points.len() as u64)?;
                for &(id, ra, dec) in &p.points {
                    write_u64(w, id)?;
                    write_f64(w, ra)?;
                    write_f64(w, dec)?;
                }
            }
            Ok(())
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut r = open_artifact(path)?;
        read_preamble(&mut r, MAGIC, path)?;
        let t = |e| truncated(path, e);

        let count = read_u64(&mut r).map_err(t)?;
        let mut partitions = BTreeMap::new();
        for _ in 0..count {
            let filter_id = read_u8(&mut r).map_err(t)?;
            let band = Band::from_filter_id(filter_id)
                .ok_or_else(|| Error::invalid_index(path, format!("bad filter id {filter_id}")))?;
            let partition = read_u8(&mut r).map_err(t)?;
            if partition >= PARTITIONS_PER_FIELD {
                return Err(Error::invalid_index(path, format!("bad partition {partition}")));
            }
            let raw_shift = read_u8(&mut r).map_err(t)?;
            let shift = SeamShift::from_u8(raw_shift)
                .ok_or_else(|| Error::invalid_index(path, format!("bad seam shift {raw_shift}")))?;
            let dec0 = read_f64(&mut r).map_err(t)?;
            let n = read_u64(&mut r).map_err(t)? as usize;
            let mut points = Vec::with_capacity(n.min(1 << 20));
            for _ in 0..n {
                let id = read_u64(&mut r).map_err(t)?;
                let ra = read_f64(&mut r).map_err(t)?;
                let dec = read_f64(&mut r).map_err(t)?;
                points.push((id, ra, dec));
            }
            let part = SpatialPartition::with_reference(band, partition, shift, dec0, points);
            if partitions.insert((band, partition), part).is_some() {
                return Err(Error::invalid_index(
                    path,
                    format!("{band} partition {partition} appears twice"),
                ));
            }
        }
        Ok(SpatialIndex { partitions })
    }
}

/// Accumulates positions group by group and builds each tree when its group
/// closes.
pub struct SpatialIndexBuilder<'a> {
    calibration: &'a FieldCalibration,
    current: Option<(Band, u8, Vec<(u64, f64, f64)>)>,
    done: SpatialIndex,
}

impl<'a> SpatialIndexBuilder<'a> {
    pub fn new(calibration: &'a FieldCalibration) -> Self {
        SpatialIndexBuilder {
            calibration,
            current: None,
            done: SpatialIndex::default(),
        }
    }

    /// Add a record; records must arrive grouped by (band, partition).
    pub fn push(&mut self, rec: &ObjectRecord) {
        let same_group = matches!(
            &self.current,
            Some((band, partition, _)) if *band == rec.band && *partition == rec.partition_id
        );
        if !same_group {
            self.close_group();
            self.current = Some((rec.band, rec.partition_id, Vec::new()));
        }
        if let Some((_, _, points)) = &mut self.current {
            points.push((rec.id, rec.ra, rec.dec));
        }
    }

    fn close_group(&mut self) {
        let Some((band, partition, points)) = self.current.take() else {
            return;
        };
        let shift = self.calibration.get(partition).unwrap_or_else(|| {
            let ras: Vec<f64> = points.iter().map(|p| p.1).collect();
            SeamShift::infer(&ras)
        });
        let part = SpatialPartition::build(band, partition, shift, points);
        self.done.partitions.insert((band, partition), part);
    }

    pub fn finish(mut self) -> SpatialIndex {
        self.close_group();
        self.done
    }
}
