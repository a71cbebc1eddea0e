//! CAGE peak track and TSS lookup.
//!
//! Peaks come from a BED6+ file whose 7th column (`thickStart`) holds the peak
//! apex. Distances are signed along the transcript: positive when the query TSS
//! lies downstream of the apex, negative when upstream.

use std::io::BufRead;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::annotation::io::{collect_tolerant, data_lines, open_path, ParseError};
use crate::error::Result;
use crate::interval::{GenomicIntervalIndex, IntervalIndexBuilder};
use crate::model::transcript::Transcript;
use crate::types::Strand;

/// Default search radius around a TSS, in bp.
pub const DEFAULT_CAGE_WINDOW: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CagePeak {
    pub chrom: String,
    pub strand: Strand,
    pub start0: u32,
    pub end1: u32,
    /// Apex of the peak (TSS-defining coordinate), 0-based.
    pub tss0: u32,
}

/// Result of a TSS lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CageHit {
    pub within_peak: bool,
    /// Signed distance to the chosen peak's apex; `None` when no peak qualified.
    pub distance: Option<i64>,
}

/// Peaks indexed per `(chrom, strand)`; read-only after construction.
#[derive(Debug, Default)]
pub struct CagePeakLocator {
    peaks: GenomicIntervalIndex<CagePeak>,
}

impl CagePeakLocator {
    pub fn from_peaks(peaks: impl IntoIterator<Item = CagePeak>) -> Self {
        let mut b = IntervalIndexBuilder::new();
        for p in peaks {
            let (chrom, strand, start0, end1) = (p.chrom.clone(), p.strand, p.start0, p.end1);
            b.insert(&chrom, strand, start0, end1, p);
        }
        Self { peaks: b.build() }
    }

    /// Read a BED peak track. Unparsable rows follow the malformed-row policy
    /// of [`collect_tolerant`].
    pub fn from_reader<R: BufRead>(reader: R, label: &str, max_malformed_fraction: f64) -> Result<Self> {
        let rows = data_lines(reader)
            .filter(|res| !matches!(res, Ok((_, line)) if is_bed_header(line)))
            .map(|res| {
                let (line_no, line) = res?;
                parse_peak_line(line_no, &line)
            });
        let peaks = collect_tolerant(rows, label, max_malformed_fraction)?;
        let locator = Self::from_peaks(peaks);
        info!("CAGE peaks {}: {} loaded", label, locator.len());
        Ok(locator)
    }

    pub fn from_path<P: AsRef<Path>>(path: P, max_malformed_fraction: f64) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_path(path)?;
        Self::from_reader(reader, &path.display().to_string(), max_malformed_fraction)
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Look up `tss` (0-based) against peaks on the same chrom/strand within `window` bp.
    ///
    /// Peaks lying entirely downstream of `tss` are skipped: a degraded
    /// transcript only loses 5' sequence, so its TSS cannot sit upstream of the
    /// true one. Containing peaks win over non-containing ones; then the
    /// smallest absolute apex distance; then the smallest peak start.
    pub fn locate(&self, chrom: &str, strand: Strand, tss: u32, window: u32) -> CageHit {
        let hit = self.peaks.nearest_by(chrom, strand, tss, window, |peak, _| {
            let downstream = match strand {
                Strand::Plus => peak.start0 > tss && peak.end1 > tss,
                Strand::Minus => peak.start0 < tss && peak.end1 < tss,
                Strand::Unknown => return None,
            };
            if downstream {
                return None;
            }

            let within = peak.start0 <= tss && tss < peak.end1;
            let mut d = tss as i64 - peak.tss0 as i64;
            if strand == Strand::Minus {
                d = -d;
            }
            Some((!within, d.unsigned_abs(), peak.start0, d))
        });

        match hit {
            Some((_, (outside, _, _, d))) => CageHit {
                within_peak: !outside,
                distance: Some(d),
            },
            None => CageHit::default(),
        }
    }

    /// [`locate`](Self::locate) at the 5' end of `tx`.
    pub fn locate_transcript(&self, tx: &Transcript, window: u32) -> CageHit {
        match tx.tss() {
            Some(tss) => self.locate(&tx.chrom, tx.strand, tss, window),
            None => CageHit::default(),
        }
    }
}

/// UCSC `track`/`browser` lines preceding the BED rows.
fn is_bed_header(line: &str) -> bool {
    matches!(line.split_whitespace().next(), Some("track" | "browser"))
}

/// Parse `chrom start0 end1 name score strand thickStart ...`.
fn parse_peak_line(line_no: usize, line: &str) -> std::result::Result<CagePeak, ParseError> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 7 {
        return Err(ParseError::MalformedLine {
            line_no,
            line: line.to_string(),
            reason: format!("expected at least 7 BED columns, found {}", cols.len()),
        });
    }

    let bad = || ParseError::BadCoordinates {
        line_no,
        line: line.to_string(),
    };
    let start0: u32 = cols[1].parse().map_err(|_| bad())?;
    let end1: u32 = cols[2].parse().map_err(|_| bad())?;
    let tss0: u32 = cols[6].parse().map_err(|_| bad())?;
    if end1 <= start0 {
        return Err(bad());
    }

    let strand = Strand::from_symbol(cols[5]).ok_or_else(|| ParseError::MalformedLine {
        line_no,
        line: line.to_string(),
        reason: "invalid strand".to_string(),
    })?;

    Ok(CagePeak {
        chrom: cols[0].to_string(),
        strand,
        start0,
        end1,
        tss0,
    })
}
