use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::types::{GeneId, TranscriptId};
use crate::types::{Junction, RefBlock, Strand};

/// Structural problems found while finalizing a transcript's exon list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("transcript has no exons")]
    NoExons,

    #[error("exon {next_start}-{next_end} overlaps preceding exon ending at {prev_end}")]
    OverlappingExons {
        prev_end: u32,
        next_start: u32,
        next_end: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: TranscriptId,
    pub name: String,
    pub gene_id: GeneId,
    pub gene_name: String,
    pub chrom: String,
    pub strand: Strand,
    exons: Vec<RefBlock>,
    junctions: Vec<Junction>,
    finalized: bool,
}

impl Transcript {
    pub fn new(
        id: TranscriptId,
        name: impl Into<String>,
        gene_id: GeneId,
        gene_name: impl Into<String>,
        chrom: impl Into<String>,
        strand: Strand,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            gene_id,
            gene_name: gene_name.into(),
            chrom: chrom.into(),
            strand,
            exons: Vec::new(),
            junctions: Vec::new(),
            finalized: false,
        }
    }

    pub fn add_exon(&mut self, block: RefBlock) {
        self.exons.push(block);
        self.finalized = false;
    }

    /// Exons sorted by genomic start.
    pub fn exons(&self) -> &[RefBlock] {
        &self.exons
    }

    /// Junction chain in ascending genomic order; empty for mono-exonic transcripts.
    pub fn junctions(&self) -> &[Junction] {
        debug_assert!(self.finalized, "Transcript::junctions called before finalize()");
        &self.junctions
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_monoexonic(&self) -> bool {
        self.exons.len() == 1
    }

    /// Sort exons, merge touching neighbours and derive the junction chain.
    ///
    /// Returns the transcript span. Overlapping exons are rejected.
    pub fn finalize(&mut self) -> Result<RefBlock, StructureError> {
        if self.exons.is_empty() {
            return Err(StructureError::NoExons);
        }

        self.exons.sort_by_key(|b| (b.start, b.end));

        let mut merged: Vec<RefBlock> = Vec::with_capacity(self.exons.len());
        for &b in &self.exons {
            match merged.last_mut() {
                Some(cur) if b.start < cur.end => {
                    return Err(StructureError::OverlappingExons {
                        prev_end: cur.end,
                        next_start: b.start,
                        next_end: b.end,
                    });
                }
                Some(cur) if b.start == cur.end => cur.end = b.end,
                _ => merged.push(b),
            }
        }

        self.exons = merged;
        self.junctions = RefBlock::junctions_from_blocks(&self.exons);
        self.finalized = true;

        Ok(RefBlock {
            start: self.exons[0].start,
            end: self.exons[self.exons.len() - 1].end,
        })
    }

    pub fn span(&self) -> Option<RefBlock> {
        let first = self.exons.first()?;
        let last = self.exons.last()?;
        Some(RefBlock {
            start: first.start,
            end: last.end,
        })
    }

    /// 0-based coordinate of the 5'-most transcribed base.
    pub fn tss(&self) -> Option<u32> {
        let span = self.span()?;
        Some(match self.strand {
            Strand::Minus => span.end - 1,
            _ => span.start,
        })
    }

    /// 0-based coordinate of the 3'-most transcribed base.
    pub fn tts(&self) -> Option<u32> {
        let span = self.span()?;
        Some(match self.strand {
            Strand::Minus => span.start,
            _ => span.end - 1,
        })
    }

    /// Exon that holds the 3' end of the transcript.
    pub fn three_prime_exon(&self) -> Option<RefBlock> {
        match self.strand {
            Strand::Minus => self.exons.first().copied(),
            _ => self.exons.last().copied(),
        }
    }

    /// Donor coordinates in transcript (5'->3') order.
    pub fn donors(&self) -> Vec<u32> {
        self.oriented_junctions().map(|j| j.donor(self.strand)).collect()
    }

    /// Acceptor coordinates in transcript (5'->3') order.
    pub fn acceptors(&self) -> Vec<u32> {
        self.oriented_junctions().map(|j| j.acceptor(self.strand)).collect()
    }

    fn oriented_junctions(&self) -> Box<dyn Iterator<Item = Junction> + '_> {
        match self.strand {
            Strand::Minus => Box::new(self.junctions.iter().rev().copied()),
            _ => Box::new(self.junctions.iter().copied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(strand: Strand, exons: &[(u32, u32)]) -> Transcript {
        let mut t = Transcript::new(0, "T1", 0, "G1", "chr1", strand);
        for &(s, e) in exons {
            t.add_exon(RefBlock::new(s, e));
        }
        t
    }

    #[test]
    fn finalize_sorts_and_derives_chain() {
        let mut t = tx(Strand::Plus, &[(300, 350), (100, 150), (200, 250)]);
        let span = t.finalize().unwrap();

        assert_eq!(span, RefBlock::new(100, 350));
        assert_eq!(
            t.junctions(),
            &[Junction::new(150, 200), Junction::new(250, 300)]
        );
        assert_eq!(t.tss(), Some(100));
        assert_eq!(t.tts(), Some(349));
        assert_eq!(t.donors(), vec![149, 249]);
        assert_eq!(t.acceptors(), vec![200, 300]);
        assert_eq!(t.three_prime_exon(), Some(RefBlock::new(300, 350)));
    }

    #[test]
    fn minus_strand_reports_in_transcript_order() {
        let mut t = tx(Strand::Minus, &[(100, 150), (200, 250), (300, 350)]);
        t.finalize().unwrap();

        assert_eq!(t.tss(), Some(349));
        assert_eq!(t.tts(), Some(100));
        assert_eq!(t.donors(), vec![300, 200]);
        assert_eq!(t.acceptors(), vec![249, 149]);
        assert_eq!(t.three_prime_exon(), Some(RefBlock::new(100, 150)));
    }

    #[test]
    fn touching_exons_merge_and_overlaps_fail() {
        let mut t = tx(Strand::Plus, &[(100, 150), (150, 200), (300, 400)]);
        t.finalize().unwrap();
        assert_eq!(t.exons(), &[RefBlock::new(100, 200), RefBlock::new(300, 400)]);

        let mut bad = tx(Strand::Plus, &[(100, 150), (140, 200)]);
        assert_eq!(
            bad.finalize(),
            Err(StructureError::OverlappingExons {
                prev_end: 150,
                next_start: 140,
                next_end: 200
            })
        );

        let mut empty = tx(Strand::Plus, &[]);
        assert_eq!(empty.finalize(), Err(StructureError::NoExons));
    }

    #[test]
    fn mono_exonic_has_empty_chain() {
        let mut t = tx(Strand::Plus, &[(10, 20)]);
        t.finalize().unwrap();
        assert!(t.is_monoexonic());
        assert!(t.junctions().is_empty());
        assert!(t.donors().is_empty());
    }
}
