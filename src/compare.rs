//! Junction-chain comparison of one query against candidate reference transcripts.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::model::transcript::Transcript;
use crate::model::types::{GeneId, JunctionDiff, JunctionVerdict, TranscriptId};
use crate::types::{Junction, RefBlock};

/// Verdict plus the bookkeeping the classifier reports alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub verdict: JunctionVerdict,
    pub diff: JunctionDiff,
    /// More than one candidate was equally good before the id tie-break.
    pub ambiguous: bool,
}

/// Ranking key of an FSM/ISM candidate; smaller is better.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MatchKey<'a> {
    extra_junctions: usize,
    end_distance: u64,
    name: &'a str,
}

/// Compare `chain` against the junction chains of `candidates`.
///
/// - `ExactMatch` / `SubsetMatch`: the candidate needing the fewest extra
///   junctions wins, then the one whose outer ends are closest to `span`,
///   then the lexicographically smallest transcript name.
/// - `NovelCombination`: every junction is known, listing every candidate
///   transcript that carries at least one of them.
/// - `NovelJunction`: otherwise. An empty chain never matches.
pub fn compare(chain: &[Junction], span: Option<RefBlock>, candidates: &[&Transcript]) -> Comparison {
    let mut diff = JunctionDiff {
        query: chain.len(),
        known: 0,
        reference: None,
    };

    if chain.is_empty() {
        return Comparison {
            verdict: JunctionVerdict::NovelJunction,
            diff,
            ambiguous: false,
        };
    }

    let mut best: Option<(MatchKey<'_>, &Transcript)> = None;
    let mut ties = 0usize;

    for &tx in candidates {
        let reference = tx.junctions();
        if !contains_contiguous(reference, chain) {
            continue;
        }

        let key = MatchKey {
            extra_junctions: reference.len() - chain.len(),
            end_distance: end_distance(span, tx.span()),
            name: &tx.name,
        };

        let against_best = best.as_ref().map(|(k, _)| {
            let primary = (k.extra_junctions, k.end_distance).cmp(&(key.extra_junctions, key.end_distance));
            (primary, key < *k)
        });
        match against_best {
            None | Some((Ordering::Greater, _)) => {
                ties = 0;
                best = Some((key, tx));
            }
            Some((Ordering::Equal, better)) => {
                ties += 1;
                if better {
                    best = Some((key, tx));
                }
            }
            Some((Ordering::Less, _)) => {}
        }
    }

    if let Some((key, tx)) = best {
        diff.known = chain.len();
        diff.reference = Some(tx.junctions().len());
        if ties > 0 {
            debug!(
                "ambiguous match: {} equally good candidates, picked {}",
                ties + 1,
                tx.name
            );
        }
        let verdict = if key.extra_junctions == 0 {
            JunctionVerdict::ExactMatch(tx.id)
        } else {
            JunctionVerdict::SubsetMatch(tx.id)
        };
        return Comparison {
            verdict,
            diff,
            ambiguous: ties > 0,
        };
    }

    let universe = junction_universe(candidates);
    let mut contributing: BTreeSet<TranscriptId> = BTreeSet::new();
    for j in chain {
        if let Some(txs) = universe.get(j) {
            diff.known += 1;
            contributing.extend(txs.iter().copied());
        }
    }

    let verdict = if diff.known == chain.len() {
        JunctionVerdict::NovelCombination(contributing.into_iter().collect())
    } else {
        JunctionVerdict::NovelJunction
    };

    Comparison {
        verdict,
        diff,
        ambiguous: false,
    }
}

/// Genes whose transcripts, taken together, carry every junction of `chain`.
/// Sorted by `GeneId`.
pub fn covering_genes(chain: &[Junction], transcripts: &[&Transcript]) -> Vec<GeneId> {
    let mut per_gene: BTreeMap<GeneId, BTreeSet<Junction>> = BTreeMap::new();
    for tx in transcripts {
        per_gene
            .entry(tx.gene_id)
            .or_default()
            .extend(tx.junctions().iter().copied());
    }

    per_gene
        .into_iter()
        .filter(|(_, known)| chain.iter().all(|j| known.contains(j)))
        .map(|(g, _)| g)
        .collect()
}

/// True when `needle` occurs in `haystack` as a contiguous run.
fn contains_contiguous(haystack: &[Junction], needle: &[Junction]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

fn junction_universe(candidates: &[&Transcript]) -> BTreeMap<Junction, Vec<TranscriptId>> {
    let mut universe: BTreeMap<Junction, Vec<TranscriptId>> = BTreeMap::new();
    for tx in candidates {
        for j in tx.junctions() {
            universe.entry(*j).or_default().push(tx.id);
        }
    }
    universe
}

fn end_distance(a: Option<RefBlock>, b: Option<RefBlock>) -> u64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            (a.start as i64 - b.start as i64).unsigned_abs() + (a.end as i64 - b.end as i64).unsigned_abs()
        }
        _ => 0,
    }
}
