use serde::{Deserialize, Serialize};

use crate::model::transcript::Transcript;
use crate::model::types::{GeneId, TranscriptId};
use crate::types::{RefBlock, Strand};

/// Gene model: the annotation's gene key, its location and its transcripts.
///
/// `span` and `footprint` are filled by [`Gene::finalize`] once all transcripts
/// are known:
/// - `span` is `[min start, max end)` over all transcripts, introns included.
/// - `footprint` is the union of all exon intervals, merged and sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    pub id: GeneId,
    pub name: String,
    pub chrom: String,
    pub strand: Strand,
    transcript_ids: Vec<TranscriptId>,
    span: Option<RefBlock>,
    footprint: Vec<RefBlock>,
}

impl Gene {
    pub fn new(id: GeneId, name: impl Into<String>, chrom: impl Into<String>, strand: Strand) -> Self {
        Self {
            id,
            name: name.into(),
            chrom: chrom.into(),
            strand,
            transcript_ids: Vec::new(),
            span: None,
            footprint: Vec::new(),
        }
    }

    pub fn add_transcript(&mut self, tx_id: TranscriptId) {
        self.transcript_ids.push(tx_id);
    }

    pub fn transcript_ids(&self) -> &[TranscriptId] {
        &self.transcript_ids
    }

    pub fn span(&self) -> Option<RefBlock> {
        self.span
    }

    pub fn footprint(&self) -> &[RefBlock] {
        &self.footprint
    }

    /// Sort/dedup transcript ids and derive span and exon footprint.
    ///
    /// `transcripts` is the full transcript table the ids index into.
    pub fn finalize(&mut self, transcripts: &[Transcript]) {
        self.transcript_ids.sort_unstable();
        self.transcript_ids.dedup();

        let mut exons: Vec<RefBlock> = self
            .transcript_ids
            .iter()
            .flat_map(|&t| transcripts[t].exons().iter().copied())
            .collect();
        exons.sort_unstable();

        self.span = exons.iter().fold(None, |acc: Option<RefBlock>, e| {
            Some(match acc {
                None => *e,
                Some(s) => RefBlock {
                    start: s.start.min(e.start),
                    end: s.end.max(e.end),
                },
            })
        });

        let mut footprint: Vec<RefBlock> = Vec::with_capacity(exons.len());
        for e in exons {
            match footprint.last_mut() {
                Some(cur) if e.start <= cur.end => cur.end = cur.end.max(e.end),
                _ => footprint.push(e),
            }
        }
        self.footprint = footprint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: TranscriptId, exons: &[(u32, u32)]) -> Transcript {
        let mut t = Transcript::new(id, format!("T{id}"), 0, "G1", "chr1", Strand::Plus);
        for &(s, e) in exons {
            t.add_exon(RefBlock::new(s, e));
        }
        t.finalize().unwrap();
        t
    }

    #[test]
    fn transcripts_finalize_dedups() {
        let txs = vec![tx(0, &[(10, 20)]), tx(1, &[(10, 20)])];
        let mut g = Gene::new(0, "G1", "chr1", Strand::Plus);
        g.add_transcript(1);
        g.add_transcript(0);
        g.add_transcript(1);
        g.finalize(&txs);
        assert_eq!(g.transcript_ids(), &[0, 1]);
    }

    #[test]
    fn span_includes_introns_and_footprint_merges_exons() {
        let txs = vec![
            tx(0, &[(100, 200), (300, 400)]),
            tx(1, &[(150, 250), (500, 600)]),
        ];
        let mut g = Gene::new(0, "G1", "chr1", Strand::Plus);
        g.add_transcript(0);
        g.add_transcript(1);
        g.finalize(&txs);

        assert_eq!(g.span(), Some(RefBlock::new(100, 600)));
        assert_eq!(
            g.footprint(),
            &[RefBlock::new(100, 250), RefBlock::new(300, 400), RefBlock::new(500, 600)]
        );
    }

    #[test]
    fn empty_gene_has_no_span() {
        let mut g = Gene::new(0, "G1", "chr1", Strand::Plus);
        g.finalize(&[]);
        assert_eq!(g.span(), None);
        assert!(g.footprint().is_empty());
    }
}
