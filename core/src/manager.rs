use crate::error::{Error, Result};
use crate::index::{build, BuildReport, Document, Snapshot};
use crate::loader::{DocumentSource, LoadedDocument};
use crate::search::search_counted;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A ranked result, resolved against the snapshot it was scored on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    pub id: String,
    pub title: String,
    pub repo: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// `false` while no snapshot has been published yet.
    pub ready: bool,
    pub hits: Vec<DocumentHit>,
    /// Matching documents before `limit` was applied.
    pub total_hits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub ready: bool,
    /// Number of snapshots published so far.
    pub generation: u64,
    pub documents: usize,
    pub terms: usize,
}

/// Load from `source` and build a snapshot without publishing it. A
/// corpus-level loader failure becomes [`Error::BuildFailure`].
pub fn build_from<S: DocumentSource + ?Sized>(source: &S) -> Result<(Snapshot, BuildReport)> {
    let documents = source.load().map_err(|e| {
        tracing::error!(error = %e, "rebuild aborted, keeping previous snapshot");
        Error::BuildFailure { reason: e.to_string() }
    })?;
    Ok(build(documents))
}

/// Owns the current snapshot.
///
/// Readers clone the `Arc` out of the slot and release the lock before doing
/// any work, so a rebuild publishing mid-query never affects a reader that
/// already holds its snapshot. Rebuilds construct the new snapshot without
/// holding the lock and take it only for the swap.
#[derive(Default)]
pub struct IndexManager {
    current: RwLock<Option<Arc<Snapshot>>>,
    generation: AtomicU64,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot current at the moment of the call.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    /// Install an already built snapshot (e.g. one loaded from disk).
    pub fn publish(&self, snapshot: Snapshot) {
        let docs = snapshot.num_docs();
        let next = Arc::new(snapshot);
        *self.current.write() = Some(next);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(generation, docs, "published index snapshot");
    }

    /// Build from a document sequence and publish the result.
    pub fn rebuild<I>(&self, documents: I) -> BuildReport
    where
        I: IntoIterator<Item = LoadedDocument>,
    {
        let (snapshot, report) = build(documents);
        self.publish(snapshot);
        report
    }

    /// Load from `source` and rebuild. A corpus-level loader failure aborts
    /// the rebuild and leaves the current snapshot live.
    pub fn rebuild_from<S: DocumentSource + ?Sized>(&self, source: &S) -> Result<BuildReport> {
        let (snapshot, report) = build_from(source)?;
        self.publish(snapshot);
        Ok(report)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<SearchOutcome> {
        if limit == 0 {
            return Err(Error::InvalidArgument("limit must be greater than zero".into()));
        }
        let Some(snap) = self.snapshot() else {
            return Ok(SearchOutcome { ready: false, hits: Vec::new(), total_hits: 0 });
        };
        let (scored, total_hits) = search_counted(&snap, query, limit)?;
        let hits = scored
            .into_iter()
            .filter_map(|scored| {
                let doc = snap.document(&scored.doc_id)?;
                Some(DocumentHit { id: scored.doc_id, title: doc.title.clone(), repo: doc.repo.clone(), score: scored.score })
            })
            .collect();
        Ok(SearchOutcome { ready: true, hits, total_hits })
    }

    /// Document-table lookup; `None` when the id is unknown or nothing is
    /// published yet.
    pub fn fetch(&self, id: &str) -> Option<Document> {
        self.snapshot()?.document(id).cloned()
    }

    pub fn status(&self) -> IndexStatus {
        let snap = self.snapshot();
        IndexStatus {
            ready: snap.is_some(),
            generation: self.generation.load(Ordering::SeqCst),
            documents: snap.as_ref().map_or(0, |s| s.num_docs()),
            terms: snap.as_ref().map_or(0, |s| s.num_terms()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;
    use std::path::PathBuf;

    struct MissingCorpus;

    impl DocumentSource for MissingCorpus {
        fn load(&self) -> std::result::Result<Vec<LoadedDocument>, LoaderError> {
            Err(LoaderError::CorpusRootMissing { path: PathBuf::from("/nowhere") })
        }
    }

    fn doc(id: &str, body: &str) -> Document {
        Document { id: id.into(), repo: "gitaly".into(), category: "general".into(), title: String::new(), body: body.into() }
    }

    #[test]
    fn empty_manager_reports_not_ready() {
        let m = IndexManager::new();
        let out = m.search("anything", 10).unwrap();
        assert!(!out.ready);
        assert!(out.hits.is_empty());
        assert!(m.fetch("a.md").is_none());
        assert_eq!(m.status(), IndexStatus { ready: false, generation: 0, documents: 0, terms: 0 });
    }

    #[test]
    fn zero_limit_rejected_even_when_empty() {
        let m = IndexManager::new();
        assert!(matches!(m.search("x", 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn failed_rebuild_keeps_previous_snapshot() {
        let m = IndexManager::new();
        m.rebuild(vec![Ok(doc("a.md", "storage"))]);
        let before = m.snapshot().unwrap();

        let err = m.rebuild_from(&MissingCorpus).unwrap_err();
        assert!(matches!(err, Error::BuildFailure { .. }));
        assert!(Arc::ptr_eq(&before, &m.snapshot().unwrap()));
        assert_eq!(m.status().generation, 1);
        assert_eq!(m.search("storage", 10).unwrap().hits.len(), 1);
    }

    #[test]
    fn total_hits_ignores_the_limit() {
        let m = IndexManager::new();
        m.rebuild(vec![Ok(doc("a.md", "storage")), Ok(doc("b.md", "storage node")), Ok(doc("c.md", "node"))]);
        let out = m.search("storage", 1).unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.total_hits, 2);
    }

    #[test]
    fn build_from_does_not_publish() {
        let m = IndexManager::new();
        let (snap, report) = build_from(&vec![doc("a.md", "one")]).unwrap();
        assert_eq!(report.included, 1);
        assert_eq!(snap.num_docs(), 1);
        assert!(!m.status().ready);
        assert!(matches!(build_from(&MissingCorpus), Err(Error::BuildFailure { .. })));
    }

    #[test]
    fn rebuild_from_vec_source() {
        let m = IndexManager::new();
        let report = m.rebuild_from(&vec![doc("a.md", "one"), doc("b.md", "two")]).unwrap();
        assert_eq!(report.included, 2);
        assert_eq!(m.status(), IndexStatus { ready: true, generation: 1, documents: 2, terms: 2 });
    }
}
