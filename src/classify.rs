//! Structural category assignment for query transcripts.

use log::{debug, info};
use rayon::prelude::*;

use crate::cage::{CageHit, CagePeakLocator, DEFAULT_CAGE_WINDOW};
use crate::compare::{compare, covering_genes};
use crate::error::{Error, Result};
use crate::index::ReferenceIndex;
use crate::model::transcript::Transcript;
use crate::model::types::{GeneId, JunctionDiff, JunctionVerdict, StructuralCategory, TranscriptId};
use crate::types::{RefBlock, Strand};

/// Default end slack (bp) for matching a mono-exonic query to a mono-exonic reference.
pub const DEFAULT_MONO_EXON_TOLERANCE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyOptions {
    pub mono_exon_tolerance: u32,
    pub cage_window: u32,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            mono_exon_tolerance: DEFAULT_MONO_EXON_TOLERANCE,
            cage_window: DEFAULT_CAGE_WINDOW,
        }
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRecord {
    /// Position of the query in its input set.
    pub ordinal: usize,
    pub query_id: String,
    /// The query's own gene id as given in the query file.
    pub gene_id: String,
    pub chrom: String,
    pub strand: Strand,
    pub category: StructuralCategory,
    pub matched_gene_ids: Vec<String>,
    pub matched_transcript_ids: Vec<String>,
    pub junction_diff: JunctionDiff,
    pub donors: Vec<u32>,
    pub acceptors: Vec<u32>,
    pub tss: u32,
    pub tts: u32,
    pub cage: Option<CageHit>,
}

/// Records in input order plus the queries that could not be classified.
#[derive(Debug, Default)]
pub struct ClassifyOutcome {
    pub records: Vec<ClassificationRecord>,
    pub rejected: Vec<Error>,
}

impl ClassifyOutcome {
    /// Count per category, all nine categories in [`StructuralCategory::ALL`] order.
    pub fn category_counts(&self) -> Vec<(StructuralCategory, usize)> {
        StructuralCategory::ALL
            .iter()
            .map(|&c| (c, self.records.iter().filter(|r| r.category == c).count()))
            .collect()
    }
}

/// Category with the reference genes/transcripts that led to it.
struct Assignment {
    category: StructuralCategory,
    genes: Vec<GeneId>,
    transcripts: Vec<TranscriptId>,
    diff: JunctionDiff,
}

impl Assignment {
    fn genes_only(category: StructuralCategory, genes: Vec<GeneId>) -> Self {
        Self {
            category,
            genes,
            transcripts: Vec::new(),
            diff: JunctionDiff::default(),
        }
    }

    fn with_transcript(mut self, t: TranscriptId) -> Self {
        self.transcripts = vec![t];
        self
    }
}

/// Classify one query transcript.
///
/// Pure function of `(query, reference, opts)`. Fails with
/// [`Error::InvalidTranscript`] when the query has no exons, is not finalized
/// or has no strand.
pub fn classify_transcript(
    query: &Transcript,
    reference: &ReferenceIndex,
    opts: &ClassifyOptions,
) -> Result<ClassificationRecord> {
    let (span, tss, tts) = match (query.span(), query.tss(), query.tts()) {
        (Some(s), Some(a), Some(b)) => (s, a, b),
        _ => return Err(Error::invalid(&query.name, "transcript has no exons")),
    };
    if !query.is_finalized() {
        return Err(Error::invalid(&query.name, "exon structure was not finalized"));
    }
    if query.strand == Strand::Unknown {
        return Err(Error::invalid(&query.name, "transcript has no strand"));
    }

    let a = assign(query, span, reference, opts);

    Ok(ClassificationRecord {
        ordinal: query.id,
        query_id: query.name.clone(),
        gene_id: query.gene_name.clone(),
        chrom: query.chrom.clone(),
        strand: query.strand,
        category: a.category,
        matched_gene_ids: a.genes.iter().map(|&g| reference.gene(g).name.clone()).collect(),
        matched_transcript_ids: a
            .transcripts
            .iter()
            .map(|&t| reference.transcript(t).name.clone())
            .collect(),
        junction_diff: a.diff,
        donors: query.donors(),
        acceptors: query.acceptors(),
        tss,
        tts,
        cage: None,
    })
}

fn assign(query: &Transcript, span: RefBlock, reference: &ReferenceIndex, opts: &ClassifyOptions) -> Assignment {
    let chrom = query.chrom.as_str();
    let same = reference.genes_overlapping_exons(chrom, query.strand, query.exons());

    if same.is_empty() {
        let opposite = reference.genes_overlapping_exons(chrom, query.strand.opposite(), query.exons());
        if !opposite.is_empty() {
            return Assignment::genes_only(StructuralCategory::Antisense, opposite);
        }

        let mut spanning: Vec<GeneId> = [Strand::Plus, Strand::Minus, Strand::Unknown]
            .iter()
            .flat_map(|&s| reference.genes_overlapping_span(chrom, s, span))
            .collect();
        spanning.sort_unstable();
        spanning.dedup();
        return if spanning.is_empty() {
            Assignment::genes_only(StructuralCategory::Intergenic, spanning)
        } else {
            Assignment::genes_only(StructuralCategory::GenicIntron, spanning)
        };
    }

    if query.is_monoexonic() {
        return assign_monoexonic(query, span, same, reference, opts);
    }

    let candidates = reference.transcripts_of(&same);
    let cmp = compare(query.junctions(), Some(span), &candidates);
    let tx_gene = |t: TranscriptId| reference.transcript(t).gene_id;

    match cmp.verdict {
        JunctionVerdict::ExactMatch(t) => Assignment {
            category: StructuralCategory::FullSpliceMatch,
            genes: vec![tx_gene(t)],
            transcripts: vec![t],
            diff: cmp.diff,
        },
        JunctionVerdict::SubsetMatch(t) => Assignment {
            category: StructuralCategory::IncompleteSpliceMatch,
            genes: vec![tx_gene(t)],
            transcripts: vec![t],
            diff: cmp.diff,
        },
        JunctionVerdict::NovelCombination(contributing) => {
            let txs: Vec<&Transcript> = contributing.iter().map(|&t| reference.transcript(t)).collect();
            let covering = covering_genes(query.junctions(), &txs);

            if let Some(&gene) = covering.first() {
                if covering.len() > 1 {
                    debug!(
                        "ambiguous match: {} novel combination covered by {} genes, picked {}",
                        query.name,
                        covering.len(),
                        reference.gene(gene).name
                    );
                }
                Assignment {
                    category: StructuralCategory::NovelInCatalog,
                    genes: vec![gene],
                    transcripts: contributing.into_iter().filter(|&t| tx_gene(t) == gene).collect(),
                    diff: cmp.diff,
                }
            } else {
                let mut genes: Vec<GeneId> = contributing.iter().map(|&t| tx_gene(t)).collect();
                genes.sort_unstable();
                genes.dedup();
                if genes.len() > 2 {
                    debug!("{} joins junctions of {} genes", query.name, genes.len());
                }
                Assignment {
                    category: StructuralCategory::Fusion,
                    genes,
                    transcripts: contributing,
                    diff: cmp.diff,
                }
            }
        }
        JunctionVerdict::NovelJunction => Assignment {
            category: StructuralCategory::NovelNotInCatalog,
            genes: same,
            transcripts: Vec::new(),
            diff: cmp.diff,
        },
    }
}

/// Mono-exonic query overlapping same-strand reference exons.
///
/// FSM against a mono-exonic reference whose ends both lie within the
/// tolerance; ISM against a multi-exonic reference whose 3' exon contains the
/// query; genic otherwise.
fn assign_monoexonic(
    query: &Transcript,
    exon: RefBlock,
    same: Vec<GeneId>,
    reference: &ReferenceIndex,
    opts: &ClassifyOptions,
) -> Assignment {
    let hits = reference.exons_overlapping(&query.chrom, query.strand, exon);
    let tol = u64::from(opts.mono_exon_tolerance);

    let mut full: Vec<((u64, &str), TranscriptId)> = hits
        .iter()
        .filter_map(|&(block, t)| {
            let tx = reference.transcript(t);
            if !tx.is_monoexonic() {
                return None;
            }
            let ds = (i64::from(block.start) - i64::from(exon.start)).unsigned_abs();
            let de = (i64::from(block.end) - i64::from(exon.end)).unsigned_abs();
            (ds <= tol && de <= tol).then_some(((ds + de, tx.name.as_str()), t))
        })
        .collect();
    full.sort_unstable();

    if let Some(&(_, t)) = full.first() {
        if full.len() > 1 {
            debug!(
                "ambiguous match: mono-exonic {} within tolerance of {} references",
                query.name,
                full.len()
            );
        }
        return Assignment::genes_only(StructuralCategory::FullSpliceMatch, vec![reference.transcript(t).gene_id])
            .with_transcript(t);
    }

    let mut partial: Vec<((usize, &str), TranscriptId)> = hits
        .iter()
        .filter_map(|&(block, t)| {
            let tx = reference.transcript(t);
            let terminal = !tx.is_monoexonic() && tx.three_prime_exon() == Some(block);
            (terminal && block.contains(exon)).then_some(((tx.junctions().len(), tx.name.as_str()), t))
        })
        .collect();
    partial.sort_unstable();

    if let Some(&(_, t)) = partial.first() {
        return Assignment::genes_only(
            StructuralCategory::IncompleteSpliceMatch,
            vec![reference.transcript(t).gene_id],
        )
        .with_transcript(t);
    }

    Assignment::genes_only(StructuralCategory::Genic, same)
}

/// Classify every query on the current rayon pool.
///
/// Queries are independent; records come back sorted by input ordinal and
/// rejected queries are collected instead of aborting the batch. When a peak
/// locator is given, each record carries its CAGE lookup.
pub fn classify_all(
    queries: &[Transcript],
    reference: &ReferenceIndex,
    cage: Option<&CagePeakLocator>,
    opts: &ClassifyOptions,
) -> ClassifyOutcome {
    let results: Vec<Result<ClassificationRecord>> = queries
        .par_iter()
        .enumerate()
        .map(|(ordinal, q)| {
            let rec = classify_transcript(q, reference, opts)?;
            let cage = cage.map(|loc| loc.locate_transcript(q, opts.cage_window));
            Ok(ClassificationRecord { ordinal, cage, ..rec })
        })
        .collect();

    let mut out = ClassifyOutcome::default();
    for r in results {
        match r {
            Ok(rec) => out.records.push(rec),
            Err(e) => out.rejected.push(e),
        }
    }
    out.records.sort_by_key(|r| r.ordinal);

    info!(
        "Classified {} transcripts, {} rejected",
        out.records.len(),
        out.rejected.len()
    );
    out
}
