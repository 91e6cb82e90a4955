use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One markdown page of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Source path relative to the corpus root, `/`-separated.
    pub id: String,
    pub repo: String,
    pub category: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: String,
    pub term_frequency: u32,
}

/// A document the loader could not produce, or the indexer refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub included: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// What a rebuild reports back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub indexed: usize,
    pub skipped: Vec<SkippedDocument>,
}

impl From<BuildReport> for RebuildSummary {
    fn from(r: BuildReport) -> Self {
        Self { indexed: r.included, skipped: r.skipped }
    }
}

/// Immutable index plus document table.
///
/// Every doc id referenced by a posting is present in `documents`, and every
/// document has exactly one entry in `doc_lengths`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    documents: HashMap<String, Document>,
    postings: HashMap<String, Vec<Posting>>, // postings sorted by doc_id
    doc_lengths: HashMap<String, u32>,
    avg_doc_length: f64,
}

impl Snapshot {
    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(Vec::as_slice)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &[Posting])> {
        self.postings.iter().map(|(t, p)| (t.as_str(), p.as_slice()))
    }

    pub fn doc_length(&self, id: &str) -> Option<u32> {
        self.doc_lengths.get(id).copied()
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    pub fn num_docs(&self) -> usize {
        self.documents.len()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Reassemble a snapshot from stored parts, checking the structural
    /// invariants. Postings are re-sorted so storage order does not matter.
    pub(crate) fn from_parts(
        documents: HashMap<String, Document>,
        mut postings: HashMap<String, Vec<Posting>>,
        doc_lengths: HashMap<String, u32>,
    ) -> Result<Self, String> {
        if doc_lengths.len() != documents.len() {
            return Err(format!("{} documents but {} length entries", documents.len(), doc_lengths.len()));
        }
        if let Some(id) = documents.keys().find(|id| !doc_lengths.contains_key(*id)) {
            return Err(format!("document {id} has no length entry"));
        }
        for (term, plist) in postings.iter_mut() {
            if let Some(p) = plist.iter().find(|p| !documents.contains_key(&p.doc_id)) {
                return Err(format!("posting for term {term:?} references unknown document {}", p.doc_id));
            }
            plist.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        }
        let avg_doc_length = average(doc_lengths.values());
        Ok(Self { documents, postings, doc_lengths, avg_doc_length })
    }
}

fn average<'a>(lengths: impl Iterator<Item = &'a u32>) -> f64 {
    let (count, total) = lengths.fold((0usize, 0u64), |(c, t), &l| (c + 1, t + u64::from(l)));
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

/// Build a snapshot from the loader's output.
///
/// Documents the loader reported as failed are recorded in the report and
/// otherwise ignored, as are repeated ids (the first occurrence wins).
pub fn build<I>(documents: I) -> (Snapshot, BuildReport)
where
    I: IntoIterator<Item = Result<Document, SkippedDocument>>,
{
    let mut report = BuildReport::default();
    let mut docs: HashMap<String, Document> = HashMap::new();
    let mut doc_lengths: HashMap<String, u32> = HashMap::new();
    let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for item in documents {
        let doc = match item {
            Ok(doc) => doc,
            Err(skipped) => {
                tracing::warn!(id = %skipped.id, reason = %skipped.reason, "skipping document");
                report.skipped.push(skipped);
                continue;
            }
        };
        if !seen.insert(doc.id.clone()) {
            tracing::warn!(id = %doc.id, "skipping duplicate document id");
            report.skipped.push(SkippedDocument { id: doc.id, reason: "duplicate document id".into() });
            continue;
        }

        // Title and body form one term stream
        let mut tf_counts: HashMap<String, u32> = HashMap::new();
        let mut length = 0u32;
        for term in tokenize(&doc.title).into_iter().chain(tokenize(&doc.body)) {
            *tf_counts.entry(term).or_insert(0) += 1;
            length += 1;
        }
        for (term, term_frequency) in tf_counts {
            postings.entry(term).or_default().push(Posting { doc_id: doc.id.clone(), term_frequency });
        }
        doc_lengths.insert(doc.id.clone(), length);
        docs.insert(doc.id.clone(), doc);
        report.included += 1;
    }

    for plist in postings.values_mut() {
        plist.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    }
    let avg_doc_length = average(doc_lengths.values());
    tracing::info!(included = report.included, skipped = report.skipped.len(), terms = postings.len(), "built index snapshot");

    (Snapshot { documents: docs, postings, doc_lengths, avg_doc_length }, report)
}
