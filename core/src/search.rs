use crate::error::{Error, Result};
use crate::index::{Posting, Snapshot};
use crate::tokenizer::tokenize;
use serde::Serialize;
use std::cmp::Ordering;

pub const BM25_K1: f64 = 1.2;
pub const BM25_B: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: String,
    pub score: f64,
}

/// Conjunctive BM25 search.
///
/// A document is a candidate only when it contains every distinct query term.
/// Results are ordered by descending score, ties by ascending doc id, and
/// truncated to `limit`. `limit == 0` is rejected.
pub fn search(snapshot: &Snapshot, query: &str, limit: usize) -> Result<Vec<ScoredDoc>> {
    search_counted(snapshot, query, limit).map(|(hits, _)| hits)
}

/// Like [`search`], also returning how many documents matched before
/// truncation.
pub fn search_counted(snapshot: &Snapshot, query: &str, limit: usize) -> Result<(Vec<ScoredDoc>, usize)> {
    if limit == 0 {
        return Err(Error::InvalidArgument("limit must be greater than zero".into()));
    }

    let mut terms = tokenize(query);
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return Ok((Vec::new(), 0));
    }

    // Any unknown term empties the intersection
    let mut lists: Vec<&[Posting]> = Vec::with_capacity(terms.len());
    for term in &terms {
        match snapshot.postings(term) {
            Some(p) => lists.push(p),
            None => return Ok((Vec::new(), 0)),
        }
    }
    // Drive the intersection from the rarest term
    lists.sort_by_key(|p| p.len());

    let n = snapshot.num_docs() as f64;
    let avgdl = snapshot.avg_doc_length();
    let idfs: Vec<f64> = lists.iter().map(|p| idf(n, p.len() as f64)).collect();

    let mut scored: Vec<ScoredDoc> = Vec::new();
    'candidates: for lead in lists[0] {
        let dl = snapshot.doc_length(&lead.doc_id).unwrap_or(0) as f64;
        let mut score = idfs[0] * term_weight(lead.term_frequency as f64, dl, avgdl);
        for (plist, idf) in lists[1..].iter().zip(&idfs[1..]) {
            match plist.binary_search_by(|p| p.doc_id.as_str().cmp(&lead.doc_id)) {
                Ok(i) => score += idf * term_weight(plist[i].term_frequency as f64, dl, avgdl),
                Err(_) => continue 'candidates,
            }
        }
        scored.push(ScoredDoc { doc_id: lead.doc_id.clone(), score });
    }

    let total = scored.len();
    scored.sort_by(rank_order);
    scored.truncate(limit);
    tracing::debug!(terms = terms.len(), total, hits = scored.len(), "search complete");
    Ok((scored, total))
}

/// `ln(1 + (N - df + 0.5) / (df + 0.5))`
fn idf(n: f64, df: f64) -> f64 {
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

fn term_weight(tf: f64, dl: f64, avgdl: f64) -> f64 {
    let norm = if avgdl > 0.0 { dl / avgdl } else { 0.0 };
    (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm))
}

fn rank_order(a: &ScoredDoc, b: &ScoredDoc) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id))
}
