//! Two-dimensional KD-tree over local sky-plane positions.
//!
//! The tree is implicit: entries are reordered in place so that the median of
//! every sub-slice is its splitting node, and only the split axis per node is
//! stored alongside. Small sub-slices are scanned linearly.

/// Sub-slices at most this long are not split further.
const LEAF_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    pos: [f64; 2],
    id: u64,
}

/// A single query result: the stored id and its Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: u64,
    pub dist: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PlaneTree {
    entries: Vec<Entry>,
    /// Split axis of the node stored at the same position; unused in leaves.
    axes: Vec<u8>,
}

impl PlaneTree {
    pub fn build(points: impl IntoIterator<Item = (u64, [f64; 2])>) -> Self {
        let entries: Vec<Entry> = points
            .into_iter()
            .map(|(id, pos)| Entry { pos, id })
            .collect();
        let mut tree = PlaneTree {
            axes: vec![0; entries.len()],
            entries,
        };
        let n = tree.entries.len();
        tree.build_range(0, n);
        tree
    }

    fn build_range(&mut self, lo: usize, hi: usize) {
        if hi - lo <= LEAF_SIZE {
            return;
        }
        let axis = widest_axis(&self.entries[lo..hi]);
        let mid = lo + (hi - lo) / 2;
        self.entries[lo..hi].select_nth_unstable_by(mid - lo, |a, b| {
            a.pos[axis].total_cmp(&b.pos[axis])
        });
        self.axes[mid] = axis as u8;
        self.build_range(lo, mid);
        self.build_range(mid + 1, hi);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries within `radius` of `query` (inclusive), nearest first.
    pub fn within(&self, query: [f64; 2], radius: f64) -> Vec<Hit> {
        let mut hits = Vec::new();
        self.within_range(0, self.entries.len(), query, radius, &mut hits);
        hits.sort_by(|a, b| a.dist.total_cmp(&b.dist).then(a.id.cmp(&b.id)));
        hits
    }

    fn within_range(&self, lo: usize, hi: usize, q: [f64; 2], radius: f64, out: &mut Vec<Hit>) {
        if hi - lo <= LEAF_SIZE {
            for e in &self.entries[lo..hi] {
                let dist = distance(q, e.pos);
                if dist <= radius {
                    out.push(Hit { id: e.id, dist });
                }
            }
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let node = self.entries[mid];
        let axis = self.axes[mid] as usize;
        let dist = distance(q, node.pos);
        if dist <= radius {
            out.push(Hit { id: node.id, dist });
        }
        let diff = q[axis] - node.pos[axis];
        if diff <= radius {
            self.within_range(lo, mid, q, radius, out);
        }
        if diff >= -radius {
            self.within_range(mid + 1, hi, q, radius, out);
        }
    }
}

fn widest_axis(entries: &[Entry]) -> usize {
    let mut lo = [f64::INFINITY; 2];
    let mut hi = [f64::NEG_INFINITY; 2];
    for e in entries {
        for d in 0..2 {
            lo[d] = lo[d].min(e.pos[d]);
            hi[d] = hi[d].max(e.pos[d]);
        }
    }
    if hi[1] - lo[1] > hi[0] - lo[0] { 1 } else { 0 }
}

#[inline]
fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}
