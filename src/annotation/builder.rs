use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use log::{info, warn};

use crate::annotation::io::{
    collect_tolerant, open_path, AnnotationReader, AnnotationRecord, Dialect, ParseError,
    DEFAULT_MAX_MALFORMED_FRACTION,
};
use crate::error::{Error, Result};
use crate::index::{IdNameKeys, ReferenceIndex};
use crate::model::gene::Gene;
use crate::model::transcript::Transcript;
use crate::model::types::GeneId;
use crate::types::{RefBlock, Strand};

/// High-level loader for GTF/GFF3 annotations.
///
/// - parses the whole file (optionally gzipped)
/// - configurable attribute keys for gene + transcript ids
/// - builds the [`ReferenceIndex`] for a reference annotation, or a
///   [`QuerySet`] for transcripts to be classified
///
/// Unparsable rows are skipped with a warning unless their share exceeds
/// `max_malformed_fraction`, in which case the whole input is rejected.
#[derive(Debug, Clone)]
pub struct AnnotationBuilder {
    pub keys: IdNameKeys,
    pub max_malformed_fraction: f64,
}

impl Default for AnnotationBuilder {
    fn default() -> Self {
        Self {
            keys: IdNameKeys::default(),
            max_malformed_fraction: DEFAULT_MAX_MALFORMED_FRACTION,
        }
    }
}

/// Query transcripts ready for classification, plus the ones that were not.
#[derive(Debug, Default)]
pub struct QuerySet {
    pub transcripts: Vec<Transcript>,
    /// `Error::InvalidTranscript` for every rejected query, in input order.
    pub rejected: Vec<Error>,
}

/// One relevant annotation row after attribute extraction.
enum Row {
    Transcript {
        tx_key: String,
        /// GFF3 `ID` when it differs from `tx_key`; exons may link through it.
        alias: Option<String>,
        gene_key: Option<String>,
    },
    Exon {
        tx_keys: Vec<String>,
        gene_key: Option<String>,
        block: RefBlock,
    },
}

/// Per-transcript accumulator of the grouping pass.
struct Pending {
    name: String,
    gene_key: Option<String>,
    chrom: String,
    strand: Strand,
    exons: Vec<RefBlock>,
    declared: bool,
    /// Exons were handed over to the transcript this key turned out to alias.
    absorbed: bool,
    problem: Option<String>,
}

impl AnnotationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use only `key` for the gene id.
    pub fn gene_id_key(mut self, key: &str) -> Self {
        self.keys.gene_id_keys = vec![key.to_string()];
        self
    }

    pub fn transcript_id_keys(mut self, keys: &[&str]) -> Self {
        self.keys.transcript_id_keys = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn parent_keys(mut self, keys: &[&str]) -> Self {
        self.keys.parent_keys = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replace the exon feature types, e.g. `["exon", "CDS"]`.
    pub fn exon_feature_types(mut self, types: &[&str]) -> Self {
        self.keys.exon_feature_types = types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn max_malformed_fraction(mut self, fraction: f64) -> Self {
        self.max_malformed_fraction = fraction;
        self
    }

    /// Build the reference from anything implementing `BufRead`.
    ///
    /// Fails with `MalformedAnnotation` when an exon names an undeclared
    /// transcript, a transcript has no exons, or its exons overlap.
    pub fn build_from_reader<R: BufRead>(&self, reader: R) -> Result<ReferenceIndex> {
        self.build_labeled(reader, "<reader>")
    }

    /// Build the reference from a file path (`.gz` is decompressed).
    pub fn build_from_path<P: AsRef<Path>>(&self, path: P) -> Result<ReferenceIndex> {
        let path = path.as_ref();
        let reader = open_path(path)?;
        self.build_labeled(reader, &path.display().to_string())
    }

    fn build_labeled<R: BufRead>(&self, reader: R, label: &str) -> Result<ReferenceIndex> {
        let (chr_names, assembled) = self.assemble(reader, label)?;

        let mut transcripts: Vec<Transcript> = Vec::with_capacity(assembled.len());
        for (pending, tx) in assembled {
            let mut tx = tx.map_err(|reason| Error::malformed(pending, reason))?;
            tx.id = transcripts.len();
            transcripts.push(tx);
        }

        let genes = link_genes(&mut transcripts);
        let idx = ReferenceIndex::from_parts(chr_names, genes, transcripts);

        info!(
            "Reference {}: {} genes, {} transcripts on {} chromosomes",
            label,
            idx.genes.len(),
            idx.transcripts.len(),
            idx.chr_names.len()
        );
        Ok(idx)
    }

    /// Load query transcripts from a reader.
    ///
    /// Structural problems do not abort the load: the transcript is moved to
    /// [`QuerySet::rejected`] as `InvalidTranscript`.
    pub fn load_queries_from_reader<R: BufRead>(&self, reader: R) -> Result<QuerySet> {
        self.load_queries_labeled(reader, "<reader>")
    }

    pub fn load_queries_from_path<P: AsRef<Path>>(&self, path: P) -> Result<QuerySet> {
        let path = path.as_ref();
        let reader = open_path(path)?;
        self.load_queries_labeled(reader, &path.display().to_string())
    }

    fn load_queries_labeled<R: BufRead>(&self, reader: R, label: &str) -> Result<QuerySet> {
        let (_, assembled) = self.assemble(reader, label)?;

        let mut set = QuerySet::default();
        for (name, tx) in assembled {
            match tx {
                Ok(t) if t.strand == Strand::Unknown => {
                    set.rejected.push(Error::invalid(name, "transcript has no strand"));
                }
                Ok(mut t) => {
                    t.id = set.transcripts.len();
                    set.transcripts.push(t);
                }
                Err(reason) => set.rejected.push(Error::invalid(name, reason)),
            }
        }

        // Query gene ids only need to be consistent within the set.
        link_genes(&mut set.transcripts);

        for e in &set.rejected {
            warn!("{label}: {e}");
        }
        info!(
            "Queries {}: {} transcripts loaded, {} rejected",
            label,
            set.transcripts.len(),
            set.rejected.len()
        );
        Ok(set)
    }

    /// Parse rows, group exons by transcript and finalize each transcript.
    ///
    /// Returns the chromosome names in first-seen order and, per transcript in
    /// first-seen order, its name with either the finalized transcript or the
    /// reason it is structurally invalid.
    #[allow(clippy::type_complexity)]
    fn assemble<R: BufRead>(
        &self,
        reader: R,
        label: &str,
    ) -> Result<(Vec<String>, Vec<(String, std::result::Result<Transcript, String>)>)> {
        let rows = AnnotationReader::new(reader)
            .records()
            .filter_map(|r| match r {
                Ok(rec) => self.interpret(rec).transpose(),
                Err(e) => Some(Err(e)),
            });
        let rows = collect_tolerant(rows, label, self.max_malformed_fraction)?;

        let mut chr_names: Vec<String> = Vec::new();
        let mut seen_chr: HashSet<String> = HashSet::new();
        let mut pending: Vec<Pending> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut any_declared = false;

        for (rec, row) in rows {
            if seen_chr.insert(rec.seqname.clone()) {
                chr_names.push(rec.seqname.clone());
            }

            let (keys, alias, gene_key, block, declares) = match row {
                Row::Transcript {
                    tx_key,
                    alias,
                    gene_key,
                } => (vec![tx_key], alias, gene_key, None, true),
                Row::Exon {
                    tx_keys,
                    gene_key,
                    block,
                } => (tx_keys, None, gene_key, Some(block), false),
            };
            any_declared |= declares;

            let mut last_slot = None;
            for key in keys {
                let slot = *by_key.entry(key.clone()).or_insert_with(|| {
                    pending.push(Pending {
                        name: key.clone(),
                        gene_key: None,
                        chrom: rec.seqname.clone(),
                        strand: rec.strand,
                        exons: Vec::new(),
                        declared: false,
                        absorbed: false,
                        problem: None,
                    });
                    pending.len() - 1
                });
                let p = &mut pending[slot];

                p.declared |= declares;
                if p.gene_key.is_none() {
                    p.gene_key = gene_key.clone();
                }
                if p.problem.is_none() && (p.chrom != rec.seqname || p.strand != rec.strand) {
                    p.problem = Some(format!(
                        "line {}: feature on {}:{} disagrees with transcript location {}:{}",
                        rec.line_no, rec.seqname, rec.strand, p.chrom, p.strand
                    ));
                }
                if let Some(b) = block {
                    p.exons.push(b);
                }
                last_slot = Some(slot);
            }

            if let (Some(alias), Some(slot)) = (alias, last_slot) {
                link_alias(&mut pending, &mut by_key, alias, slot);
            }
        }

        let assembled = pending
            .into_iter()
            .filter(|p| !p.absorbed)
            .map(|p| {
                let name = p.name.clone();
                (name, finish_transcript(p, any_declared))
            })
            .collect();

        Ok((chr_names, assembled))
    }

    /// Extract ids from a record; `None` for feature types we do not use.
    fn interpret(
        &self,
        rec: AnnotationRecord,
    ) -> std::result::Result<Option<(AnnotationRecord, Row)>, ParseError> {
        let keys = &self.keys;
        let missing = |what: &str, tried: &[String]| ParseError::MalformedLine {
            line_no: rec.line_no,
            line: format!("{}\t{}\t{}-{}", rec.seqname, rec.feature_type, rec.start0 + 1, rec.end0),
            reason: format!("missing {what} attribute (tried {tried:?})"),
        };

        let row = if rec.is_feature(&keys.exon_feature_types) {
            let raw = rec
                .pick_first_attr(&keys.transcript_id_keys)
                .or_else(|| rec.pick_first_attr(&keys.parent_keys))
                .ok_or_else(|| {
                    let mut tried = keys.transcript_id_keys.clone();
                    tried.extend(keys.parent_keys.iter().cloned());
                    missing("transcript id", &tried)
                })?;
            Row::Exon {
                tx_keys: split_gff3_parent_list(&raw),
                gene_key: rec.pick_first_attr(&keys.gene_id_keys),
                block: RefBlock {
                    start: rec.start0,
                    end: rec.end0,
                },
            }
        } else if rec.is_feature(&keys.transcript_feature_types) {
            let gff_id = rec.attr("ID").map(str::to_string);
            let tx_key = rec
                .pick_first_attr(&keys.transcript_id_keys)
                .or_else(|| gff_id.clone())
                .ok_or_else(|| missing("transcript id", &keys.transcript_id_keys))?;
            Row::Transcript {
                alias: gff_id.filter(|id| rec.dialect == Dialect::Gff3 && *id != tx_key),
                tx_key,
                gene_key: rec
                    .pick_first_attr(&keys.gene_id_keys)
                    .or_else(|| rec.pick_first_attr(&keys.parent_keys)),
            }
        } else {
            return Ok(None);
        };

        Ok(Some((rec, row)))
    }
}

/// Make `alias` resolve to the transcript in `slot`.
///
/// Exons that arrived under the alias before the transcript row declared it
/// are moved over; an alias already owned by another declared transcript is
/// left alone.
fn link_alias(pending: &mut [Pending], by_key: &mut HashMap<String, usize>, alias: String, slot: usize) {
    match by_key.get(&alias).copied() {
        None => {
            by_key.insert(alias, slot);
        }
        Some(early) if early != slot && !pending[early].declared => {
            let exons = std::mem::take(&mut pending[early].exons);
            pending[slot].exons.extend(exons);
            pending[early].absorbed = true;
            by_key.insert(alias, slot);
        }
        Some(_) => {}
    }
}

fn finish_transcript(p: Pending, any_declared: bool) -> std::result::Result<Transcript, String> {
    if let Some(problem) = p.problem {
        return Err(problem);
    }
    if any_declared && !p.declared {
        return Err("exon references an unknown transcript id".to_string());
    }
    let gene = p.gene_key.ok_or_else(|| "no gene id on any of its rows".to_string())?;

    let mut tx = Transcript::new(0, p.name, 0, gene, p.chrom, p.strand);
    for e in p.exons {
        tx.add_exon(e);
    }
    tx.finalize().map_err(|e| e.to_string())?;
    Ok(tx)
}

/// Group transcripts into genes by `(gene key, chrom, strand)` and set each
/// transcript's `gene_id`. Genes come out in first-seen order.
fn link_genes(transcripts: &mut [Transcript]) -> Vec<Gene> {
    let mut genes: Vec<Gene> = Vec::new();
    let mut by_key: HashMap<(String, String, Strand), GeneId> = HashMap::new();

    for tx in transcripts.iter_mut() {
        let key = (tx.gene_name.clone(), tx.chrom.clone(), tx.strand);
        let gid = *by_key.entry(key).or_insert_with(|| {
            genes.push(Gene::new(genes.len(), tx.gene_name.clone(), tx.chrom.clone(), tx.strand));
            genes.len() - 1
        });
        tx.gene_id = gid;
        genes[gid].add_transcript(tx.id);
    }

    for g in &mut genes {
        g.finalize(transcripts);
    }
    genes
}

/// Split Parent= list (GFF3) by commas; also trim whitespace.
fn split_gff3_parent_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn gtf_exons_are_sorted_and_genes_linked() {
        let gtf = "\
chr1\tsrc\texon\t201\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";

        let idx = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();

        assert_eq!(idx.chr_names, vec!["chr1".to_string()]);
        assert_eq!(idx.genes.len(), 1);
        assert_eq!(idx.transcripts.len(), 1);

        // Exons sorted and converted to 0-based half-open: 101..150 => [100,150)
        let t = &idx.transcripts[0];
        assert_eq!(t.exons(), &[RefBlock::new(100, 150), RefBlock::new(200, 250)]);
        assert_eq!(t.junctions().len(), 1);
        assert_eq!(idx.genes[0].span(), Some(RefBlock::new(100, 250)));
    }

    #[test]
    fn gff3_parent_list_attaches_exon_to_each_transcript() {
        let gff = "\
chr2\tsrc\tmRNA\t5\t40\t.\t-\t.\tID=tx1;Parent=G9
chr2\tsrc\texon\t5\t20\t.\t-\t.\tParent=tx1
chr2\tsrc\texon\t30\t40\t.\t-\t.\tParent=tx1
";

        let idx = AnnotationBuilder::new()
            .transcript_id_keys(&[])
            .parent_keys(&["Parent"])
            .build_from_reader(Cursor::new(gff.as_bytes()))
            .unwrap();

        assert_eq!(idx.genes.len(), 1);
        assert_eq!(idx.genes[0].name, "G9");
        assert_eq!(idx.transcripts[0].name, "tx1");
        assert_eq!(idx.transcripts[0].strand, Strand::Minus);
        assert_eq!(idx.transcripts[0].exons()[0], RefBlock::new(4, 20));
    }

    #[test]
    fn ensembl_gff3_exons_link_through_transcript_id_alias() {
        let gff = "\
##gff-version 3
7\tensembl\tgene\t1001\t3000\t.\t+\t.\tID=gene:ENSG0001;gene_id=ENSG0001
7\tensembl\tmRNA\t1001\t3000\t.\t+\t.\tID=transcript:ENST0001;Parent=gene:ENSG0001;transcript_id=ENST0001
7\tensembl\texon\t1001\t1200\t.\t+\t.\tParent=transcript:ENST0001;Name=ENSE0001
7\tensembl\texon\t2801\t3000\t.\t+\t.\tParent=transcript:ENST0001;Name=ENSE0002
";
        let idx = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gff.as_bytes()))
            .unwrap();

        assert_eq!(idx.transcripts.len(), 1);
        let t = &idx.transcripts[0];
        assert_eq!(t.name, "ENST0001");
        assert_eq!(t.exons(), &[RefBlock::new(1000, 1200), RefBlock::new(2800, 3000)]);
        assert_eq!(idx.genes[0].name, "gene:ENSG0001");
    }

    #[test]
    fn exons_listed_before_their_mrna_still_join_it() {
        let gff = "\
7\tensembl\texon\t1001\t1200\t.\t-\t.\tParent=transcript:ENST0002
7\tensembl\tmRNA\t1001\t3000\t.\t-\t.\tID=transcript:ENST0002;Parent=gene:ENSG0002;transcript_id=ENST0002
7\tensembl\texon\t2801\t3000\t.\t-\t.\tParent=transcript:ENST0002
";
        let idx = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gff.as_bytes()))
            .unwrap();

        assert_eq!(idx.transcripts.len(), 1);
        assert_eq!(idx.transcripts[0].name, "ENST0002");
        assert_eq!(idx.transcripts[0].exons().len(), 2);
    }

    #[test]
    fn only_configured_feature_types_become_exons() {
        let gtf = "\
chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\tCDS\t201\t250\t.\t+\t0\tgene_id \"G1\"; transcript_id \"T1\";
";
        let idx = AnnotationBuilder::new()
            .exon_feature_types(&["exon"])
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();

        assert_eq!(idx.transcripts[0].exons(), &[RefBlock::new(100, 150)]);
    }

    #[test]
    fn unknown_transcript_is_malformed_annotation() {
        let gtf = "\
chr1\tsrc\ttranscript\t101\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t201\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T9\";
";
        let err = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap_err();
        match err {
            Error::MalformedAnnotation { transcript_id, .. } => assert_eq!(transcript_id, "T9"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_exon_and_overlapping_exons_are_malformed() {
        let gtf = "\
chr1\tsrc\ttranscript\t101\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let err = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap_err();
        assert!(err.to_string().contains("no exons"));

        let gtf = "\
chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t141\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let err = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedAnnotation { .. }));
    }

    #[test]
    fn malformed_rows_are_skipped_below_threshold() {
        let gtf = "\
chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\tXX\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t301\t350\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let idx = AnnotationBuilder::new()
            .max_malformed_fraction(0.5)
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();
        assert_eq!(idx.transcripts[0].exons().len(), 2);

        let err = AnnotationBuilder::new()
            .max_malformed_fraction(0.1)
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Parse(ParseError::TooManyMalformed { malformed: 1, total: 3, .. })
        ));
    }

    #[test]
    fn invalid_queries_are_rejected_not_fatal() {
        let gtf = "\
chr1\tsrc\ttranscript\t101\t250\t.\t+\t.\tgene_id \"Q\"; transcript_id \"empty\";
chr1\tsrc\ttranscript\t101\t250\t.\t+\t.\tgene_id \"Q\"; transcript_id \"ok\";
chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"Q\"; transcript_id \"ok\";
chr1\tsrc\ttranscript\t101\t250\t.\t.\t.\tgene_id \"Q\"; transcript_id \"nostrand\";
chr1\tsrc\texon\t101\t150\t.\t.\t.\tgene_id \"Q\"; transcript_id \"nostrand\";
";
        let set = AnnotationBuilder::new()
            .load_queries_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();

        assert_eq!(set.transcripts.len(), 1);
        assert_eq!(set.transcripts[0].name, "ok");
        assert_eq!(set.transcripts[0].id, 0);

        let rejected: Vec<String> = set
            .rejected
            .iter()
            .map(|e| match e {
                Error::InvalidTranscript { transcript_id, .. } => transcript_id.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(rejected, vec!["empty".to_string(), "nostrand".to_string()]);
    }

    #[test]
    fn same_gene_key_on_two_chromosomes_makes_two_genes() {
        let gtf = "\
chrX\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"PAR\"; transcript_id \"T1\";
chrY\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"PAR\"; transcript_id \"T2\";
";
        let idx = AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gtf.as_bytes()))
            .unwrap();
        assert_eq!(idx.genes.len(), 2);
        assert_ne!(idx.transcripts[0].gene_id, idx.transcripts[1].gene_id);
    }
}
