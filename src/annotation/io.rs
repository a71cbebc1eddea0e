use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use log::warn;
use thiserror::Error;

use crate::types::Strand;

/// Default upper bound on the fraction of malformed rows tolerated in one input.
pub const DEFAULT_MAX_MALFORMED_FRACTION: f64 = 0.1;

/// Attribute syntax of a row: `key "value";` (GTF) or `key=value;` (GFF3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Gff3,
    Gtf,
    Unknown,
}

/// One feature row, with its coordinates already shifted to `[start0, end0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub line_no: usize,
    pub seqname: String,
    pub feature_type: String,
    pub start0: u32,
    pub end0: u32,
    pub strand: Strand,
    pub attrs: HashMap<String, String>,
    pub dialect: Dialect,
}

impl AnnotationRecord {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    pub fn is_feature(&self, types: &[String]) -> bool {
        types.iter().any(|t| t == &self.feature_type)
    }

    pub fn pick_first_attr(&self, keys: &[String]) -> Option<String> {
        for k in keys {
            if let Some(v) = self.attr(k) {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
        None
    }
}

/// Row-level parsing errors for GTF/GFF3 and BED inputs.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error while reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed line {line_no} ({reason}): {line}")]
    MalformedLine {
        line_no: usize,
        line: String,
        reason: String,
    },

    #[error("bad coordinates in line {line_no}: {line}")]
    BadCoordinates { line_no: usize, line: String },

    #[error("{path}: {malformed} of {total} rows are malformed (limit {threshold})")]
    TooManyMalformed {
        path: String,
        malformed: usize,
        total: usize,
        threshold: f64,
    },
}

impl ParseError {
    fn malformed(line_no: usize, line: &str, reason: impl Into<String>) -> Self {
        ParseError::MalformedLine {
            line_no,
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Row-level problems are skippable; I/O failures are not.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            ParseError::MalformedLine { .. } | ParseError::BadCoordinates { .. }
        )
    }
}

/// Open a plain or gzipped (`.gz`) text file for line reading.
pub fn open_path(path: &Path) -> Result<Box<dyn BufRead>, ParseError> {
    let f = File::open(path).map_err(|e| ParseError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let is_gz = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gz {
        Ok(Box::new(BufReader::new(GzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Iterate over data lines of a reader as `(line_no, line)`, 1-based.
///
/// - Skips blank lines
/// - Skips comment lines starting with '#'
pub(crate) fn data_lines<R: BufRead>(
    mut reader: R,
) -> impl Iterator<Item = Result<(usize, String), ParseError>> {
    let mut buf = String::new();
    let mut line_no = 0usize;

    std::iter::from_fn(move || loop {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => {
                return Some(Err(ParseError::Io {
                    path: "<reader>".to_string(),
                    source: e,
                }))
            }
        }
        line_no += 1;

        let line = buf.trim_end_matches(&['\n', '\r'][..]);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        return Some(Ok((line_no, line.to_string())));
    })
}

/// Row-by-row GTF/GFF3 reader. [`crate::annotation::AnnotationBuilder`] wraps
/// it with the malformed-row policy.
///
/// ```no_run
/// use isoclass::annotation::io::{open_path, AnnotationReader};
///
/// let input = open_path("query.gtf.gz".as_ref())?;
/// let exons = AnnotationReader::new(input)
///     .records()
///     .filter_map(Result::ok)
///     .filter(|r| r.feature_type == "exon")
///     .count();
/// # Ok::<(), isoclass::annotation::io::ParseError>(())
/// ```
pub struct AnnotationReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parsed rows; each item fails independently.
    pub fn records(self) -> impl Iterator<Item = Result<AnnotationRecord, ParseError>> {
        data_lines(self.reader).map(|res| {
            let (line_no, line) = res?;
            parse_record_line(line_no, &line)
        })
    }
}

/// Drain `records`, skipping row-level errors with a warning.
///
/// Fails on the first I/O error, or with [`ParseError::TooManyMalformed`] when
/// the malformed fraction exceeds `max_fraction`.
pub fn collect_tolerant<T, I>(
    records: I,
    label: &str,
    max_fraction: f64,
) -> Result<Vec<T>, ParseError>
where
    I: IntoIterator<Item = Result<T, ParseError>>,
{
    let mut good = Vec::new();
    let mut malformed = 0usize;

    for rec in records {
        match rec {
            Ok(r) => good.push(r),
            Err(e) if e.is_row_error() => {
                warn!("{label}: skipping {e}");
                malformed += 1;
            }
            Err(ParseError::Io { source, .. }) => {
                return Err(ParseError::Io {
                    path: label.to_string(),
                    source,
                })
            }
            Err(e) => return Err(e),
        }
    }

    let total = good.len() + malformed;
    if malformed > 0 && (malformed as f64 / total as f64) > max_fraction {
        return Err(ParseError::TooManyMalformed {
            path: label.to_string(),
            malformed,
            total,
            threshold: max_fraction,
        });
    }

    Ok(good)
}

/// Split a 9-column GTF/GFF3 data row. `line_no` is only used for error reports.
pub fn parse_record_line(line_no: usize, line: &str) -> Result<AnnotationRecord, ParseError> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 9 {
        return Err(ParseError::malformed(
            line_no,
            line,
            format!("expected 9 tab-separated columns, found {}", cols.len()),
        ));
    }

    let seqname = cols[0];
    if seqname.is_empty() {
        return Err(ParseError::malformed(line_no, line, "empty seqname"));
    }

    // 1-based closed on disk.
    let bad = || ParseError::BadCoordinates {
        line_no,
        line: line.to_string(),
    };
    let start_1: u32 = cols[3].trim().parse().map_err(|_| bad())?;
    let end_1: u32 = cols[4].trim().parse().map_err(|_| bad())?;
    if start_1 == 0 || end_1 < start_1 {
        return Err(bad());
    }

    let strand = Strand::from_symbol(cols[6].trim())
        .ok_or_else(|| ParseError::malformed(line_no, line, "invalid strand"))?;

    let (dialect, attrs) = parse_attributes(cols[8]);

    Ok(AnnotationRecord {
        line_no,
        seqname: seqname.to_string(),
        feature_type: cols[2].to_string(),
        start0: start_1 - 1,
        end0: end_1,
        strand,
        attrs,
        dialect,
    })
}

/// Split column 9 into key/value pairs. Quoted values mean GTF, `=` means GFF3;
/// with neither, both separators are tried. The first occurrence of a key wins.
pub fn parse_attributes(s: &str) -> (Dialect, HashMap<String, String>) {
    let s = s.trim();

    let dialect = if s.contains('"') {
        Dialect::Gtf
    } else if s.contains('=') {
        Dialect::Gff3
    } else {
        Dialect::Unknown
    };

    let mut map = HashMap::new();

    for part in s.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let kv = match dialect {
            Dialect::Gff3 => part.split_once('='),
            Dialect::Gtf => part.split_once(char::is_whitespace),
            Dialect::Unknown => part
                .split_once('=')
                .or_else(|| part.split_once(char::is_whitespace)),
        };

        let Some((k, v)) = kv else { continue };
        let k = k.trim();
        let v = unquote(v);
        if !k.is_empty() && !v.is_empty() {
            map.entry(k.to_string()).or_insert(v);
        }
    }

    (dialect, map)
}

fn unquote(v: &str) -> String {
    let v = v.trim();
    let v = v.strip_prefix('"').unwrap_or(v);
    let v = v.strip_suffix('"').unwrap_or(v);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn gtf_row_is_shifted_to_half_open() {
        let line = "chr3\tPacBio\texon\t2001\t2480\t.\t-\t.\tgene_id \"PB.12\"; transcript_id \"PB.12.3\";";
        let rec = parse_record_line(7, line).unwrap();

        assert_eq!(rec.dialect, Dialect::Gtf);
        assert_eq!(
            (rec.line_no, rec.seqname.as_str(), rec.feature_type.as_str()),
            (7, "chr3", "exon")
        );
        assert_eq!((rec.start0, rec.end0), (2000, 2480));
        assert_eq!(rec.strand, Strand::Minus);
        assert_eq!(rec.attr("transcript_id"), Some("PB.12.3"));
        assert_eq!(rec.pick_first_attr(&["gene".into(), "gene_id".into()]), Some("PB.12".into()));
    }

    #[test]
    fn gff3_row_keeps_parent_link() {
        let line = "chrX\tensembl\texon\t1\t90\t.\t+\t.\tID=exon:1;Parent=transcript:ENST01,transcript:ENST02";
        let rec = parse_record_line(1, line).unwrap();

        assert_eq!(rec.dialect, Dialect::Gff3);
        assert_eq!((rec.start0, rec.end0), (0, 90));
        assert_eq!(rec.attr("Parent"), Some("transcript:ENST01,transcript:ENST02"));
        assert!(rec.is_feature(&["exon".to_string()]));
    }

    #[test]
    fn malformed_lines_report_position_and_content() {
        let err = parse_record_line(3, "chr1\tsrc\texon\t101").unwrap_err();
        match err {
            ParseError::MalformedLine { line_no, line, .. } => {
                assert_eq!(line_no, 3);
                assert_eq!(line, "chr1\tsrc\texon\t101");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = parse_record_line(4, "chr1\tsrc\texon\t200\t100\t.\t+\t.\tgene_id \"G\";")
            .unwrap_err();
        assert!(matches!(err, ParseError::BadCoordinates { line_no: 4, .. }));

        let err = parse_record_line(5, "chr1\tsrc\texon\t1\t10\t.\tx\t.\tgene_id \"G\";")
            .unwrap_err();
        assert!(err.to_string().contains("line 5"));
    }

    #[test]
    fn line_numbers_count_skipped_lines() {
        let data = "\
##gtf-version 2.2
chr1\tsrc\ttranscript\t11\t80\t.\t+\t.\tgene_id \"A\"; transcript_id \"A.1\";

chr1\tsrc\texon\t11\t30\t.\t+\t.\tgene_id \"A\"; transcript_id \"A.1\";
";
        let recs: Vec<AnnotationRecord> = AnnotationReader::new(Cursor::new(data.as_bytes()))
            .records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            recs.iter().map(|r| (r.line_no, r.start0, r.end0)).collect::<Vec<_>>(),
            vec![(2, 10, 80), (4, 10, 30)]
        );
    }

    #[test]
    fn contigs_named_like_bed_headers_are_data() {
        let data = "track_1\tsrc\texon\t5\t9\t.\t+\t.\tgene_id \"T\"; transcript_id \"T.1\";\n";
        let recs: Vec<AnnotationRecord> = AnnotationReader::new(Cursor::new(data.as_bytes()))
            .records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].seqname, "track_1");
    }

    #[test]
    fn tolerant_collection_skips_until_threshold() {
        let rows: Vec<Result<u32, ParseError>> = vec![
            Ok(1),
            Err(ParseError::malformed(2, "x", "bad")),
            Ok(3),
            Ok(4),
        ];
        let ok = collect_tolerant(rows, "test", 0.5).unwrap();
        assert_eq!(ok, vec![1, 3, 4]);

        let rows: Vec<Result<u32, ParseError>> = vec![
            Ok(1),
            Err(ParseError::malformed(2, "x", "bad")),
        ];
        let err = collect_tolerant(rows, "test", 0.1).unwrap_err();
        assert!(matches!(
            err,
            ParseError::TooManyMalformed { malformed: 1, total: 2, .. }
        ));
    }
}
