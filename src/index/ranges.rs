//! (band, partition) → contiguous byte span of the `.objects` catalog.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::record::{Band, PARTITIONS_PER_FIELD};

use super::codec::{
    open_artifact, read_preamble, read_u8, read_u64, truncated, write_atomic, write_preamble,
    write_u8, write_u64,
};

const MAGIC: &[u8; 4] = b"LCRG";

/// Byte span `[start, end)` of one group's rows in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    pub band: Band,
    pub partition: u8,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PartitionRangeIndex {
    /// In catalog order; non-overlapping and contiguous.
    ranges: Vec<PartitionRange>,
    by_key: BTreeMap<(Band, u8), usize>,
}

impl PartitionRangeIndex {
    fn from_ranges(ranges: Vec<PartitionRange>) -> std::result::Result<Self, String> {
        let mut by_key = BTreeMap::new();
        for (i, r) in ranges.iter().enumerate() {
            if r.start > r.end {
                return Err(format!("range {}..{} is inverted", r.start, r.end));
            }
            if i > 0 && ranges[i - 1].end > r.start {
                return Err(format!(
                    "range for {} partition {} overlaps its predecessor",
                    r.band, r.partition
                ));
            }
            if by_key.insert((r.band, r.partition), i).is_some() {
                return Err(format!("{} partition {} appears twice", r.band, r.partition));
            }
        }
        Ok(PartitionRangeIndex { ranges, by_key })
    }

    pub fn get(&self, band: Band, partition: u8) -> Option<PartitionRange> {
        self.by_key.get(&(band, partition)).map(|&i| self.ranges[i])
    }

    pub fn ranges(&self) -> &[PartitionRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        Band::ALL
            .into_iter()
            .filter(|&b| self.ranges.iter().any(|r| r.band == b))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| {
            write_preamble(w, MAGIC)?;
            write_u64(w, self.ranges.len() as u64)?;
            for r in &self.ranges {
                write_u8(w, r.band.filter_id())?;
                write_u8(w, r.partition)?;
                write_u64(w, r.start)?;
                write_u64(w, r.end)?;
            }
            Ok(())
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut r = open_artifact(path)?;
        read_preamble(&mut r, MAGIC, path)?;
        let count = read_u64(&mut r).map_err(|e| truncated(path, e))? as usize;
        let mut ranges = Vec::with_capacity(count.min(Band::ALL.len() * 64));
        for _ in 0..count {
            let filter_id = read_u8(&mut r).map_err(|e| truncated(path, e))?;
            let band = Band::from_filter_id(filter_id)
                .ok_or_else(|| Error::invalid_index(path, format!("bad filter id {filter_id}")))?;
            let partition = read_u8(&mut r).map_err(|e| truncated(path, e))?;
            if partition >= PARTITIONS_PER_FIELD {
                return Err(Error::invalid_index(path, format!("bad partition {partition}")));
            }
            let start = read_u64(&mut r).map_err(|e| truncated(path, e))?;
            let end = read_u64(&mut r).map_err(|e| truncated(path, e))?;
            ranges.push(PartitionRange {
                band,
                partition,
                start,
                end,
            });
        }
        Self::from_ranges(ranges).map_err(|msg| Error::invalid_index(path, msg))
    }
}

/// Records group boundaries while catalog rows are written in grouped order.
#[derive(Debug, Default)]
pub struct RangeRecorder {
    closed: Vec<PartitionRange>,
    open: Option<PartitionRange>,
}

impl RangeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that the row for (`band`, `partition`) starts at `offset`.
    ///
    /// Rows must arrive grouped; a group that reappears after closing is an
    /// error.
    pub fn observe(&mut self, band: Band, partition: u8, offset: u64) -> std::result::Result<(), String> {
        if let Some(open) = &self.open {
            if open.band == band && open.partition == partition {
                return Ok(());
            }
        }
        if self
            .closed
            .iter()
            .any(|r| r.band == band && r.partition == partition)
        {
            return Err(format!(
                "{band} partition {partition} reappears after its group closed"
            ));
        }
        self.close(offset);
        tracing::debug!(%band, partition, offset, "opening partition range");
        self.open = Some(PartitionRange {
            band,
            partition,
            start: offset,
            end: offset,
        });
        Ok(())
    }

    fn close(&mut self, end: u64) {
        if let Some(mut open) = self.open.take() {
            open.end = end;
            self.closed.push(open);
        }
    }

    /// Close the final group at `end`, the catalog length.
    pub fn finish(mut self, end: u64) -> PartitionRangeIndex {
        self.close(end);
        let mut by_key = BTreeMap::new();
        for (i, r) in self.closed.iter().enumerate() {
            by_key.insert((r.band, r.partition), i);
        }
        PartitionRangeIndex {
            ranges: self.closed,
            by_key,
        }
    }
}
