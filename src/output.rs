//! Tab-separated classification table, rejected-transcript report and
//! category summary.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use log::info;

use crate::annotation::io::{open_path, ParseError};
use crate::classify::ClassificationRecord;
use crate::error::{Error, Result};
use crate::model::types::StructuralCategory;
use crate::types::Strand;

const NA: &str = "NA";

const BASE_COLUMNS: [&str; 12] = [
    "transcript_id",
    "gene_id",
    "chrom",
    "strand",
    "structural_category",
    "associated_gene",
    "associated_transcript",
    "junction_diff",
    "donors",
    "acceptors",
    "TSS_genomic_coord",
    "TTS_genomic_coord",
];

const CAGE_COLUMNS: [&str; 2] = ["within_cage_peak", "dist_to_cage_peak"];

fn join_or_na<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        return NA.to_string();
    }
    items.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
}

/// Write the classification table. CAGE columns are emitted when `with_cage`
/// is set; records without a lookup then get `FALSE`/`NA`.
pub fn write_classification<W: Write>(
    mut w: W,
    records: &[ClassificationRecord],
    with_cage: bool,
) -> std::io::Result<()> {
    let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
    if with_cage {
        header.extend(CAGE_COLUMNS);
    }
    writeln!(w, "{}", header.join("\t"))?;

    for r in records {
        write!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.query_id,
            r.gene_id,
            r.chrom,
            r.strand,
            r.category,
            join_or_na(&r.matched_gene_ids),
            join_or_na(&r.matched_transcript_ids),
            r.junction_diff,
            join_or_na(&r.donors),
            join_or_na(&r.acceptors),
            r.tss,
            r.tts,
        )?;
        if with_cage {
            let hit = r.cage.unwrap_or_default();
            let within = if hit.within_peak { "TRUE" } else { "FALSE" };
            let dist = hit.distance.map_or_else(|| NA.to_string(), |d| d.to_string());
            write!(w, "\t{within}\t{dist}")?;
        }
        writeln!(w)?;
    }
    w.flush()
}

/// Write `records` to `path`.
pub fn write_classification_path<P: AsRef<Path>>(
    path: P,
    records: &[ClassificationRecord],
    with_cage: bool,
) -> Result<()> {
    let f = File::create(path.as_ref())?;
    write_classification(BufWriter::new(f), records, with_cage)?;
    Ok(())
}

/// `transcript_id  reason` for each rejected query.
pub fn write_rejected<W: Write>(mut w: W, rejected: &[Error]) -> std::io::Result<()> {
    writeln!(w, "transcript_id\treason")?;
    for e in rejected {
        match e {
            Error::InvalidTranscript { transcript_id, reason } => writeln!(w, "{transcript_id}\t{reason}")?,
            other => writeln!(w, "{NA}\t{other}")?,
        }
    }
    w.flush()
}

pub fn write_rejected_path<P: AsRef<Path>>(path: P, rejected: &[Error]) -> Result<()> {
    let f = File::create(path.as_ref())?;
    write_rejected(BufWriter::new(f), rejected)?;
    Ok(())
}

/// Render the per-category counts as two tab-separated lines (abbreviations, counts).
pub fn summary_table(counts: &[(StructuralCategory, usize)]) -> String {
    let names: Vec<&str> = counts.iter().map(|(c, _)| c.abbreviation()).collect();
    let values: Vec<String> = counts.iter().map(|(_, n)| n.to_string()).collect();
    format!("{}\n{}", names.join("\t"), values.join("\t"))
}

pub fn log_summary(counts: &[(StructuralCategory, usize)]) {
    for line in summary_table(counts).lines() {
        info!("{line}");
    }
}

/// The fields of a classification row needed to compare two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub transcript_id: String,
    pub chrom: String,
    pub strand: Strand,
    pub category: StructuralCategory,
    pub donors: Vec<u32>,
    pub acceptors: Vec<u32>,
    pub tss: u32,
    pub tts: u32,
}

impl TableRow {
    pub fn is_monoexonic(&self) -> bool {
        self.donors.is_empty()
    }

    /// Half-open genomic span `[start, end)` derived from TSS/TTS.
    pub fn span(&self) -> (u32, u32) {
        let (lo, hi) = if self.tss <= self.tts {
            (self.tss, self.tts)
        } else {
            (self.tts, self.tss)
        };
        (lo, hi + 1)
    }
}

/// Read back a table written by [`write_classification`]. Columns are found
/// by header name, so extra or reordered columns are fine.
pub fn read_classification<R: BufRead>(reader: R, label: &str) -> Result<Vec<TableRow>> {
    let mut lines = reader.lines().enumerate();

    let header = match lines.next() {
        Some((_, line)) => line?,
        None => return Ok(Vec::new()),
    };
    let cols: HashMap<&str, usize> = header.split('\t').enumerate().map(|(i, c)| (c, i)).collect();
    let col = |name: &str| {
        cols.get(name).copied().ok_or_else(|| {
            Error::Parse(ParseError::MalformedLine {
                line_no: 1,
                line: header.clone(),
                reason: format!("{label}: missing column {name}"),
            })
        })
    };
    let (c_id, c_chrom, c_strand, c_cat) = (
        col("transcript_id")?,
        col("chrom")?,
        col("strand")?,
        col("structural_category")?,
    );
    let (c_donors, c_acceptors, c_tss, c_tts) = (
        col("donors")?,
        col("acceptors")?,
        col("TSS_genomic_coord")?,
        col("TTS_genomic_coord")?,
    );

    let mut rows = Vec::new();
    for (i, line) in lines {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let line_no = i + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        let bad = |reason: String| {
            Error::Parse(ParseError::MalformedLine {
                line_no,
                line: line.clone(),
                reason,
            })
        };
        let field = |c: usize| fields.get(c).copied().ok_or_else(|| bad(format!("missing column {c}")));
        let coord = |c: usize| -> Result<u32> {
            let s = field(c)?;
            s.parse().map_err(|_| bad(format!("bad coordinate {s}")))
        };
        let coords = |c: usize| -> Result<Vec<u32>> {
            let s = field(c)?;
            if s == NA {
                return Ok(Vec::new());
            }
            s.split(',')
                .map(|x| x.parse().map_err(|_| bad(format!("bad coordinate {x}"))))
                .collect()
        };

        rows.push(TableRow {
            transcript_id: field(c_id)?.to_string(),
            chrom: field(c_chrom)?.to_string(),
            strand: Strand::from_symbol(field(c_strand)?).ok_or_else(|| bad("invalid strand".to_string()))?,
            category: field(c_cat)?.parse().map_err(bad)?,
            donors: coords(c_donors)?,
            acceptors: coords(c_acceptors)?,
            tss: coord(c_tss)?,
            tts: coord(c_tts)?,
        });
    }
    Ok(rows)
}

pub fn read_classification_path<P: AsRef<Path>>(path: P) -> Result<Vec<TableRow>> {
    let path = path.as_ref();
    let reader = open_path(path)?;
    read_classification(reader, &path.display().to_string())
}
