//! Per-chromosome, per-strand interval index.
//!
//! Intervals are collected with an [`IntervalIndexBuilder`] and frozen into a
//! [`GenomicIntervalIndex`]; the frozen index has no mutating methods, so it can
//! be shared between classification threads.
//!
//! Each `(chrom, strand)` bucket owns its payloads in insertion order and a
//! `coitrees::BasicCOITree` whose metadata is the payload slot. Query results are
//! always reported in insertion order.

use std::collections::HashMap;

use coitrees::{BasicCOITree, Interval, IntervalTree};

use crate::types::{RefBlock, Strand};

#[derive(Debug)]
struct BucketBuilder<T> {
    entries: Vec<(RefBlock, T)>,
}

struct Bucket<T> {
    entries: Vec<(RefBlock, T)>,
    tree: BasicCOITree<usize, u32>,
}

/// Collects intervals before the index is frozen.
///
/// Repeated inserts of identical coordinates are kept as separate entries
/// (several transcripts sharing one exon).
#[derive(Debug)]
pub struct IntervalIndexBuilder<T> {
    buckets: HashMap<String, HashMap<Strand, BucketBuilder<T>>>,
}

impl<T> Default for IntervalIndexBuilder<T> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<T> IntervalIndexBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[start0, end1)` on `chrom`/`strand`. Empty intervals are ignored.
    pub fn insert(&mut self, chrom: &str, strand: Strand, start0: u32, end1: u32, payload: T) {
        if end1 <= start0 {
            return;
        }

        self.buckets
            .entry(chrom.to_string())
            .or_default()
            .entry(strand)
            .or_insert_with(|| BucketBuilder { entries: Vec::new() })
            .entries
            .push((RefBlock { start: start0, end: end1 }, payload));
    }

    /// Freeze into a queryable index.
    pub fn build(self) -> GenomicIntervalIndex<T> {
        let mut buckets = HashMap::with_capacity(self.buckets.len());
        let mut len = 0usize;

        for (chrom, per_strand) in self.buckets {
            let mut frozen = HashMap::with_capacity(per_strand.len());
            for (strand, b) in per_strand {
                // COITree intervals are end-inclusive; convert [start, end) -> [start, end-1].
                let nodes: Vec<Interval<usize>> = b
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(slot, (block, _))| {
                        Interval::new(to_coord(block.start), to_coord(block.end - 1), slot)
                    })
                    .collect();

                len += b.entries.len();
                frozen.insert(
                    strand,
                    Bucket {
                        entries: b.entries,
                        tree: BasicCOITree::new(&nodes),
                    },
                );
            }
            buckets.insert(chrom, frozen);
        }

        GenomicIntervalIndex { buckets, len }
    }
}

/// Frozen interval index keyed by `(chrom, strand)`.
pub struct GenomicIntervalIndex<T> {
    buckets: HashMap<String, HashMap<Strand, Bucket<T>>>,
    len: usize,
}

impl<T> Default for GenomicIntervalIndex<T> {
    fn default() -> Self {
        IntervalIndexBuilder::new().build()
    }
}

impl<T> std::fmt::Debug for GenomicIntervalIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenomicIntervalIndex")
            .field("chromosomes", &self.buckets.len())
            .field("intervals", &self.len)
            .finish()
    }
}

impl<T> GenomicIntervalIndex<T> {
    /// Total number of stored intervals.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of intervals stored for one chromosome (all strands).
    pub fn len_on(&self, chrom: &str) -> usize {
        self.buckets
            .get(chrom)
            .map(|m| m.values().map(|b| b.entries.len()).sum())
            .unwrap_or(0)
    }

    fn bucket(&self, chrom: &str, strand: Strand) -> Option<&Bucket<T>> {
        self.buckets.get(chrom)?.get(&strand)
    }

    /// Slots of intervals overlapping `[start0, end1)`, in insertion order.
    ///
    /// The tree works on clamped `i32` coordinates, so every hit is checked
    /// again against the stored `u32` block.
    fn query_slots(bucket: &Bucket<T>, start0: u32, end1: u32) -> Vec<usize> {
        let mut slots: Vec<usize> = Vec::new();
        if end1 <= start0 {
            return slots;
        }

        let query = RefBlock { start: start0, end: end1 };
        bucket
            .tree
            .query(to_coord(start0), to_coord(end1 - 1), |node| {
                let slot = node.metadata.to_owned();
                if bucket.entries[slot].0.overlaps(query) {
                    slots.push(slot);
                }
            });

        slots.sort_unstable();
        slots
    }

    /// Payloads whose interval overlaps `[start0, end1)`.
    pub fn overlapping(&self, chrom: &str, strand: Strand, start0: u32, end1: u32) -> Vec<&T> {
        self.overlapping_blocks(chrom, strand, start0, end1)
            .into_iter()
            .map(|(_, p)| p)
            .collect()
    }

    /// Like [`overlapping`](Self::overlapping), also returning the stored interval.
    pub fn overlapping_blocks(
        &self,
        chrom: &str,
        strand: Strand,
        start0: u32,
        end1: u32,
    ) -> Vec<(RefBlock, &T)> {
        let Some(bucket) = self.bucket(chrom, strand) else {
            return Vec::new();
        };

        Self::query_slots(bucket, start0, end1)
            .into_iter()
            .map(|slot| {
                let (block, payload) = &bucket.entries[slot];
                (*block, payload)
            })
            .collect()
    }

    /// Payload whose interval is closest to `point`, searching `window` bp on
    /// either side. The distance is signed in genomic orientation: 0 when the
    /// interval contains `point`, negative when `point` lies before the
    /// interval, positive when it lies after. Ties go to the earliest insert.
    pub fn nearest(&self, chrom: &str, strand: Strand, point: u32, window: u32) -> Option<(&T, i64)> {
        let (payload, (_, dist)) = self.nearest_by(chrom, strand, point, window, |_, block| {
            let d = signed_distance(point, block);
            Some((d.unsigned_abs(), d))
        })?;
        Some((payload, dist))
    }

    /// Generalised nearest-neighbour lookup.
    ///
    /// Every interval overlapping `[point - window, point + window]` is passed to
    /// `rank`; `None` drops the candidate, otherwise the smallest key wins and
    /// ties go to the earliest insert.
    pub fn nearest_by<K, F>(
        &self,
        chrom: &str,
        strand: Strand,
        point: u32,
        window: u32,
        mut rank: F,
    ) -> Option<(&T, K)>
    where
        K: Ord,
        F: FnMut(&T, RefBlock) -> Option<K>,
    {
        let bucket = self.bucket(chrom, strand)?;
        let lo = point.saturating_sub(window);
        let hi = point.saturating_add(window).saturating_add(1);

        let mut best: Option<(usize, K)> = None;
        for slot in Self::query_slots(bucket, lo, hi) {
            let (block, payload) = &bucket.entries[slot];
            let Some(key) = rank(payload, *block) else {
                continue;
            };
            let better = match &best {
                Some((_, k)) => key < *k,
                None => true,
            };
            if better {
                best = Some((slot, key));
            }
        }

        best.map(|(slot, key)| (&bucket.entries[slot].1, key))
    }
}

/// Signed distance from an interval to a point, 0 when the point is inside.
pub fn signed_distance(point: u32, block: RefBlock) -> i64 {
    let p = point as i64;
    if point < block.start {
        p - block.start as i64
    } else if point >= block.end {
        p - (block.end as i64 - 1)
    } else {
        0
    }
}

/// Coordinate for the tree. Values past `i32::MAX` saturate; callers
/// re-check overlaps on the original blocks.
#[inline]
fn to_coord(x: u32) -> i32 {
    i32::try_from(x).unwrap_or(i32::MAX)
}
