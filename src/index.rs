use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interval::{GenomicIntervalIndex, IntervalIndexBuilder};
use crate::model::gene::Gene;
use crate::model::transcript::Transcript;
use crate::model::types::{GeneId, TranscriptId};
use crate::types::{RefBlock, Strand};

const MAGIC: &[u8; 4] = b"ISX1";
const VERSION_STR: &str = env!("CARGO_PKG_VERSION");

/// Attribute keys and feature types the annotation builder looks for.
///
/// Each key list is tried in order and the first non-empty value wins. A GFF3
/// `Parent` holding several comma-separated transcripts attaches the exon to
/// each of them.
#[derive(Debug, Clone)]
pub struct IdNameKeys {
    pub gene_id_keys: Vec<String>,
    pub transcript_id_keys: Vec<String>,

    /// Exon-to-transcript link when no transcript id attribute is present.
    pub parent_keys: Vec<String>,

    /// Feature types that declare a transcript (default: transcript, mRNA)
    pub transcript_feature_types: Vec<String>,

    /// Rows that contribute exon blocks.
    pub exon_feature_types: Vec<String>,
}

impl Default for IdNameKeys {
    fn default() -> Self {
        Self {
            gene_id_keys: vec!["gene_id".into(), "gene".into(), "GeneID".into()],
            transcript_id_keys: vec!["transcript_id".into(), "transcript".into()],
            parent_keys: vec!["Parent".into()],
            transcript_feature_types: vec!["transcript".into(), "mRNA".into()],
            exon_feature_types: vec!["exon".into()],
        }
    }
}

/// The owning reference model:
/// - chromosome dictionary (first-seen order)
/// - genes + transcripts, addressed by `GeneId` / `TranscriptId`
/// - per `(chrom, strand)` interval indexes over exons and gene spans
///
/// Built once, then only read. The interval indexes are not serialized;
/// [`ReferenceIndex::load`] rebuilds them from the model.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReferenceIndex {
    pub chr_names: Vec<String>,
    pub genes: Vec<Gene>,
    pub transcripts: Vec<Transcript>,

    #[serde(skip)]
    exon_index: GenomicIntervalIndex<TranscriptId>,
    #[serde(skip)]
    footprint_index: GenomicIntervalIndex<GeneId>,
    #[serde(skip)]
    gene_index: GenomicIntervalIndex<GeneId>,
}

/// Human-readable summary of the `ReferenceIndex`.
///
/// Prints the global gene/transcript/chromosome counts, then one line per
/// chromosome with gene, transcript, multi-exonic transcript and exon
/// interval counts. Intended for logging and the `stats` command.
impl fmt::Display for ReferenceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ReferenceIndex: {} genes, {} transcripts, {} chromosomes",
            self.genes.len(),
            self.transcripts.len(),
            self.chr_names.len()
        )?;

        let mut per_chr: BTreeMap<&str, (usize, usize, usize)> = BTreeMap::new();
        for g in &self.genes {
            per_chr.entry(g.chrom.as_str()).or_default().0 += 1;
        }
        for t in &self.transcripts {
            let e = per_chr.entry(t.chrom.as_str()).or_default();
            e.1 += 1;
            if !t.is_monoexonic() {
                e.2 += 1;
            }
        }

        for chr_name in &self.chr_names {
            let (genes, txs, multi) = per_chr.get(chr_name.as_str()).copied().unwrap_or_default();
            let mean_tx = if genes == 0 { 0.0 } else { txs as f64 / genes as f64 };
            writeln!(
                f,
                "  - {}: genes={}, transcripts={}, multi_exonic={}, exons={}, mean_tx/gene={:.3}",
                chr_name,
                genes,
                txs,
                multi,
                self.exon_index.len_on(chr_name),
                mean_tx
            )?;
        }

        Ok(())
    }
}

impl ReferenceIndex {
    /// Assemble the index from finalized genes and transcripts and build the
    /// interval indexes.
    pub fn from_parts(chr_names: Vec<String>, genes: Vec<Gene>, transcripts: Vec<Transcript>) -> Self {
        let mut idx = ReferenceIndex {
            chr_names,
            genes,
            transcripts,
            exon_index: GenomicIntervalIndex::default(),
            footprint_index: GenomicIntervalIndex::default(),
            gene_index: GenomicIntervalIndex::default(),
        };
        idx.rebuild_lookups();
        idx
    }

    fn rebuild_lookups(&mut self) {
        let mut exons = IntervalIndexBuilder::new();
        let mut footprints = IntervalIndexBuilder::new();
        let mut spans = IntervalIndexBuilder::new();

        for t in &self.transcripts {
            for e in t.exons() {
                exons.insert(&t.chrom, t.strand, e.start, e.end, t.id);
            }
        }
        for g in &self.genes {
            if let Some(span) = g.span() {
                spans.insert(&g.chrom, g.strand, span.start, span.end, g.id);
            }
            for b in g.footprint() {
                footprints.insert(&g.chrom, g.strand, b.start, b.end, g.id);
            }
        }

        self.exon_index = exons.build();
        self.footprint_index = footprints.build();
        self.gene_index = spans.build();
    }

    pub fn gene(&self, id: GeneId) -> &Gene {
        &self.genes[id]
    }

    pub fn transcript(&self, id: TranscriptId) -> &Transcript {
        &self.transcripts[id]
    }

    /// Reference exons on `chrom`/`strand` overlapping `block`, with their transcript.
    pub fn exons_overlapping(
        &self,
        chrom: &str,
        strand: Strand,
        block: RefBlock,
    ) -> Vec<(RefBlock, TranscriptId)> {
        self.exon_index
            .overlapping_blocks(chrom, strand, block.start, block.end)
            .into_iter()
            .map(|(b, &t)| (b, t))
            .collect()
    }

    /// Genes whose exon footprint overlaps any of `exons` on `strand`.
    /// Sorted by `GeneId`, no duplicates.
    pub fn genes_overlapping_exons(&self, chrom: &str, strand: Strand, exons: &[RefBlock]) -> Vec<GeneId> {
        let mut out: Vec<GeneId> = exons
            .iter()
            .flat_map(|e| self.footprint_index.overlapping(chrom, strand, e.start, e.end))
            .copied()
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Genes whose span (introns included) overlaps `span` on `strand`.
    pub fn genes_overlapping_span(&self, chrom: &str, strand: Strand, span: RefBlock) -> Vec<GeneId> {
        let mut out: Vec<GeneId> = self
            .gene_index
            .overlapping(chrom, strand, span.start, span.end)
            .into_iter()
            .copied()
            .collect();
        out.sort_unstable();
        out
    }

    /// All transcripts of the given genes, in `TranscriptId` order.
    pub fn transcripts_of(&self, genes: &[GeneId]) -> Vec<&Transcript> {
        let mut ids: Vec<TranscriptId> = genes
            .iter()
            .flat_map(|&g| self.genes[g].transcript_ids().iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(|t| &self.transcripts[t]).collect()
    }

    /// Write `ISX1`, the crate version and the bincode-encoded model.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut f = BufWriter::new(File::create(path)?);

        f.write_all(MAGIC)?;

        let v = VERSION_STR.as_bytes();
        let len = v.len() as u16;
        f.write_all(&len.to_le_bytes())?;
        f.write_all(v)?;

        bincode::serialize_into(&mut f, self).map_err(|e| Error::Index(e.to_string()))?;
        f.flush()?;

        info!("Index written to {}", path.display());
        Ok(())
    }

    /// Read a file produced by [`save`](Self::save) and rebuild the interval indexes.
    /// Files from another crate version are refused.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut f = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        f.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Index(format!(
                "{} is not a reference index (bad magic)",
                path.display()
            )));
        }

        let mut len_buf = [0u8; 2];
        f.read_exact(&mut len_buf)?;
        let len = u16::from_le_bytes(len_buf) as usize;

        let mut ver_buf = vec![0u8; len];
        f.read_exact(&mut ver_buf)?;
        let file_version = String::from_utf8_lossy(&ver_buf);

        if file_version != VERSION_STR {
            return Err(Error::Index(format!(
                "version mismatch: file={}, binary={}",
                file_version, VERSION_STR
            )));
        }

        let mut idx: Self =
            bincode::deserialize_from(&mut f).map_err(|e| Error::Index(e.to_string()))?;
        idx.rebuild_lookups();

        info!(
            "Loaded index {}: {} genes, {} transcripts",
            path.display(),
            idx.genes.len(),
            idx.transcripts.len()
        );
        Ok(idx)
    }
}
