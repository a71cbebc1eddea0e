use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Internal numeric IDs (indexes into Vecs).
pub type GeneId = usize;
pub type TranscriptId = usize;

/// Structural category of a query transcript relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StructuralCategory {
    /// Junction chain equals a reference transcript's chain.
    FullSpliceMatch,

    /// Junction chain is a contiguous part of a reference transcript's chain.
    IncompleteSpliceMatch,

    /// Known junctions only, in a combination no single transcript has.
    NovelInCatalog,

    /// At least one junction absent from the reference.
    NovelNotInCatalog,

    /// Known junctions combined across transcripts of two or more genes.
    Fusion,

    /// Overlaps reference exons only on the opposite strand.
    Antisense,

    /// Overlaps reference exons but cannot be spliced-matched.
    Genic,

    /// Lies inside a gene span without touching any exon.
    GenicIntron,

    /// Outside every reference gene span.
    Intergenic,
}

impl StructuralCategory {
    /// All categories, in reporting order.
    pub const ALL: [StructuralCategory; 9] = [
        StructuralCategory::FullSpliceMatch,
        StructuralCategory::IncompleteSpliceMatch,
        StructuralCategory::NovelInCatalog,
        StructuralCategory::NovelNotInCatalog,
        StructuralCategory::Fusion,
        StructuralCategory::Antisense,
        StructuralCategory::Genic,
        StructuralCategory::GenicIntron,
        StructuralCategory::Intergenic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StructuralCategory::FullSpliceMatch => "full-splice_match",
            StructuralCategory::IncompleteSpliceMatch => "incomplete-splice_match",
            StructuralCategory::NovelInCatalog => "novel_in_catalog",
            StructuralCategory::NovelNotInCatalog => "novel_not_in_catalog",
            StructuralCategory::Fusion => "fusion",
            StructuralCategory::Antisense => "antisense",
            StructuralCategory::Genic => "genic",
            StructuralCategory::GenicIntron => "genic_intron",
            StructuralCategory::Intergenic => "intergenic",
        }
    }

    /// Short column header used in summary tables.
    pub fn abbreviation(self) -> &'static str {
        match self {
            StructuralCategory::FullSpliceMatch => "FSM",
            StructuralCategory::IncompleteSpliceMatch => "ISM",
            StructuralCategory::NovelInCatalog => "NIC",
            StructuralCategory::NovelNotInCatalog => "NNC",
            StructuralCategory::Fusion => "Fusion",
            StructuralCategory::Antisense => "AS",
            StructuralCategory::Genic => "GG",
            StructuralCategory::GenicIntron => "GI",
            StructuralCategory::Intergenic => "Intergenic",
        }
    }
}

impl fmt::Display for StructuralCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StructuralCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StructuralCategory::ALL
            .into_iter()
            .find(|c| c.label() == s || c.abbreviation() == s)
            .ok_or_else(|| format!("unknown structural category '{s}'"))
    }
}

/// Outcome of comparing one query junction chain against candidate transcripts.
///
/// Transcript ids are indexes into [`crate::ReferenceIndex::transcripts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JunctionVerdict {
    ExactMatch(TranscriptId),
    SubsetMatch(TranscriptId),
    NovelCombination(Vec<TranscriptId>),
    NovelJunction,
}

/// How a query chain differs from the reference, carried into the output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JunctionDiff {
    /// Junctions in the query chain.
    pub query: usize,
    /// Query junctions found in the reference junction universe.
    pub known: usize,
    /// Junctions of the matched reference transcript (FSM/ISM only).
    pub reference: Option<usize>,
}

impl JunctionDiff {
    pub fn novel(&self) -> usize {
        self.query - self.known
    }
}

impl fmt::Display for JunctionDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query == 0 {
            return f.write_str("mono-exon");
        }
        write!(f, "known={}/{}", self.known, self.query)?;
        if let Some(r) = self.reference {
            write!(f, ";ref={r}")?;
        }
        Ok(())
    }
}
