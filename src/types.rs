use serde::{Deserialize, Serialize};
use std::fmt;

/// Strand column of an annotation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Parse the strand column of a GTF/BED row.
    pub fn from_symbol(s: &str) -> Option<Strand> {
        match s {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            "." | "?" => Some(Strand::Unknown),
            _ => None,
        }
    }

    /// The other strand. `Unknown` has no opposite and maps to itself.
    #[inline]
    pub fn opposite(self) -> Strand {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
            Strand::Unknown => Strand::Unknown,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Strand::Plus => "+",
            Strand::Minus => "-",
            Strand::Unknown => ".",
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One exon (or any aligned block) on the reference.
/// Coordinates are 0-based, half-open: [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefBlock {
    pub start: u32,
    pub end: u32,
}

impl RefBlock {
    /// Panics on an empty or inverted interval.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start < end, "RefBlock requires start < end");
        Self { start, end }
    }

    #[inline]
    pub fn len(self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn overlaps(self, other: RefBlock) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[inline]
    pub fn contains(self, other: RefBlock) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Introns between consecutive blocks of a sorted exon list.
    ///
    /// Junction i is the intron `[blocks[i].end, blocks[i+1].start)`.
    /// Touching or overlapping neighbours do not produce a junction.
    ///
    /// For unspliced transcripts (len < 2), this returns an empty vec.
    pub fn junctions_from_blocks(blocks: &[RefBlock]) -> Vec<Junction> {
        let mut out = Vec::new();
        if blocks.len() < 2 {
            return out;
        }

        for w in blocks.windows(2) {
            let a = w[0];
            let b = w[1];

            if b.start <= a.end {
                continue;
            }

            out.push(Junction {
                start: a.end,
                end: b.start,
            });
        }

        out
    }
}

/// One intron, stored in genomic order as `[start, end)`:
/// `start` is the first intronic base, `end` the first base of the next exon.
///
/// Splice sites are reported as the exonic bases flanking the intron, see
/// [`Junction::donor`] and [`Junction::acceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Junction {
    pub start: u32,
    pub end: u32,
}

impl Junction {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Last exonic base before the intron, read along `strand`.
    pub fn donor(self, strand: Strand) -> u32 {
        match strand {
            Strand::Minus => self.end,
            _ => self.start.saturating_sub(1),
        }
    }

    /// First exonic base after the intron, read along `strand`.
    pub fn acceptor(self, strand: Strand) -> u32 {
        match strand {
            Strand::Minus => self.start.saturating_sub(1),
            _ => self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refblock_junctions() {
        let blocks = vec![RefBlock::new(10, 20), RefBlock::new(30, 40), RefBlock::new(50, 60)];
        assert_eq!(
            RefBlock::junctions_from_blocks(&blocks),
            vec![Junction::new(20, 30), Junction::new(40, 50)]
        );
    }

    #[test]
    fn touching_blocks_do_not_make_junctions() {
        let blocks = vec![RefBlock::new(10, 20), RefBlock::new(20, 40)];
        assert!(RefBlock::junctions_from_blocks(&blocks).is_empty());
        assert!(RefBlock::junctions_from_blocks(&blocks[..1]).is_empty());
    }

    #[test]
    fn splice_sites_are_flanking_exon_bases() {
        // Exons [100,150) and [200,260): the intron covers bases 150..=199.
        let j = Junction::new(150, 200);
        assert_eq!((j.donor(Strand::Plus), j.acceptor(Strand::Plus)), (149, 200));
        assert_eq!((j.donor(Strand::Minus), j.acceptor(Strand::Minus)), (200, 149));
    }

    #[test]
    fn strand_symbols() {
        assert_eq!(Strand::from_symbol("+"), Some(Strand::Plus));
        assert_eq!(Strand::from_symbol("?"), Some(Strand::Unknown));
        assert_eq!(Strand::from_symbol("x"), None);
        assert_eq!(Strand::Minus.opposite(), Strand::Plus);
        assert_eq!(Strand::Unknown.opposite(), Strand::Unknown);
        assert_eq!(Strand::Minus.to_string(), "-");
    }
}
