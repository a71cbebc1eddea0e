//! Per-category agreement between an expected and an observed classification table.

use std::collections::HashMap;
use std::fmt;

use crate::model::types::StructuralCategory;
use crate::output::TableRow;
use crate::types::Strand;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryMetrics {
    pub category: StructuralCategory,
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl CategoryMetrics {
    pub fn precision(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn fdr(&self) -> Option<f64> {
        ratio(self.fp, self.tp + self.fp)
    }

    pub fn sensitivity(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fn_)
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

type ChainKey<'a> = (&'a str, Strand, &'a [u32], &'a [u32]);

fn chain_key(r: &TableRow) -> ChainKey<'_> {
    (&r.chrom, r.strand, &r.donors, &r.acceptors)
}

fn spans_overlap(a: &TableRow, b: &TableRow) -> bool {
    let (a0, a1) = a.span();
    let (b0, b1) = b.span();
    a.chrom == b.chrom && a.strand == b.strand && a0 < b1 && b0 < a1
}

/// Score `observed` against `expected`, one entry per category present in either.
///
/// An observed row is a true positive when an unused expected row of the same
/// category has the same chrom, strand and junction chain (or, for
/// mono-exonic rows, an overlapping span). Each expected row backs at most one
/// true positive.
pub fn evaluate(expected: &[TableRow], observed: &[TableRow]) -> Vec<CategoryMetrics> {
    let mut out = Vec::new();

    for category in StructuralCategory::ALL {
        let exp: Vec<&TableRow> = expected.iter().filter(|r| r.category == category).collect();
        let obs: Vec<&TableRow> = observed.iter().filter(|r| r.category == category).collect();
        if exp.is_empty() && obs.is_empty() {
            continue;
        }

        let mut used = vec![false; exp.len()];
        let mut by_chain: HashMap<ChainKey<'_>, Vec<usize>> = HashMap::new();
        for (i, r) in exp.iter().enumerate() {
            if !r.is_monoexonic() {
                by_chain.entry(chain_key(r)).or_default().push(i);
            }
        }

        let mut tp = 0;
        for o in &obs {
            let hit = if o.is_monoexonic() {
                (0..exp.len()).find(|&i| !used[i] && exp[i].is_monoexonic() && spans_overlap(exp[i], o))
            } else {
                by_chain
                    .get(&chain_key(o))
                    .and_then(|ids| ids.iter().copied().find(|&i| !used[i]))
            };
            if let Some(i) = hit {
                used[i] = true;
                tp += 1;
            }
        }

        out.push(CategoryMetrics {
            category,
            tp,
            fp: obs.len() - tp,
            fn_: exp.len() - tp,
        });
    }
    out
}

/// Tab-separated rendering of [`evaluate`] output.
pub struct MetricsTable<'a>(pub &'a [CategoryMetrics]);

impl fmt::Display for MetricsTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num = |x: Option<f64>| x.map_or_else(|| "NA".to_string(), |v| format!("{v:.4}"));
        writeln!(f, "structural_category\tTP\tFP\tFN\tprecision\tFDR\tsensitivity")?;
        for m in self.0 {
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                m.category,
                m.tp,
                m.fp,
                m.fn_,
                num(m.precision()),
                num(m.fdr()),
                num(m.sensitivity())
            )?;
        }
        Ok(())
    }
}
