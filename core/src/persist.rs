use crate::error::{Error, Result};
use crate::index::{Document, Posting, Snapshot};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub avg_doc_length: f64,
    pub created_at: String,
    pub version: u32,
}

/// Document table row: the document plus its term count.
#[derive(Debug, Serialize, Deserialize)]
struct DocRow {
    id: String,
    repo: String,
    category: String,
    title: String,
    body: String,
    length: u32,
}

/// `(term, doc_id, term_frequency)`
type PostingTriple = (String, String, u32);

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    /// Whether a complete index has been written here.
    pub fn exists(&self) -> bool {
        self.meta().is_file()
    }

    /// Sibling of `root` named `.{name}.{suffix}`. `root` must end in a
    /// normal component (not `.`, `..` or `/`) so the sibling can never land
    /// inside it.
    fn sibling(&self, suffix: &str) -> Result<PathBuf> {
        let name = match self.root.components().next_back() {
            Some(Component::Normal(name)) => name.to_string_lossy().into_owned(),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "index directory {} must name a directory, not `.`, `..` or a root",
                    self.root.display()
                )))
            }
        };
        Ok(self.root.with_file_name(format!(".{name}.{suffix}")))
    }

    /// Refuse to replace a directory that holds anything but an index.
    fn check_replaceable(&self) -> Result<()> {
        if !self.root.exists() || self.exists() {
            return Ok(());
        }
        let mut entries = fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))?;
        if entries.next().is_some() {
            return Err(Error::NotAnIndex { path: self.root.clone() });
        }
        Ok(())
    }
}

fn write_bin<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    let mut f = File::create(path).map_err(|e| Error::io(path, e))?;
    f.write_all(&bytes).map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(|e| Error::io(path, e))?;
    Ok(bincode::deserialize(&buf)?)
}

/// Write `snapshot` under `paths.root`.
///
/// Only an existing index or an empty directory is replaced. Files go to a
/// sibling staging directory first; the previous index is renamed aside, the
/// staging directory renamed into place, and only then is the old copy
/// removed. A crash at any point leaves either the old or the new index on
/// disk. Callers serialize saves to the same `root`.
pub fn save_snapshot(paths: &IndexPaths, snapshot: &Snapshot, created_at: &str) -> Result<MetaFile> {
    let staging = IndexPaths::new(paths.sibling("staging")?);
    let previous = paths.sibling("previous")?;
    paths.check_replaceable()?;
    if staging.root.exists() {
        fs::remove_dir_all(&staging.root).map_err(|e| Error::io(&staging.root, e))?;
    }
    create_dir_all(&staging.root).map_err(|e| Error::io(&staging.root, e))?;

    let mut rows: Vec<DocRow> = snapshot
        .documents()
        .map(|d| DocRow {
            id: d.id.clone(),
            repo: d.repo.clone(),
            category: d.category.clone(),
            title: d.title.clone(),
            body: d.body.clone(),
            length: snapshot.doc_length(&d.id).unwrap_or(0),
        })
        .collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    write_bin(&staging.docs(), &rows)?;

    let mut triples: Vec<PostingTriple> = snapshot
        .terms()
        .flat_map(|(term, plist)| plist.iter().map(move |p| (term.to_string(), p.doc_id.clone(), p.term_frequency)))
        .collect();
    triples.sort();
    write_bin(&staging.postings(), &triples)?;

    let meta = MetaFile {
        num_docs: snapshot.num_docs(),
        num_terms: snapshot.num_terms(),
        avg_doc_length: snapshot.avg_doc_length(),
        created_at: created_at.to_string(),
        version: FORMAT_VERSION,
    };
    let json = serde_json::to_string_pretty(&meta)?;
    fs::write(staging.meta(), json).map_err(|e| Error::io(staging.meta(), e))?;

    if previous.exists() {
        fs::remove_dir_all(&previous).map_err(|e| Error::io(&previous, e))?;
    }
    let had_previous = paths.root.exists();
    if had_previous {
        fs::rename(&paths.root, &previous).map_err(|e| Error::io(&paths.root, e))?;
    }
    if let Err(e) = fs::rename(&staging.root, &paths.root) {
        if had_previous {
            // Put the old index back
            let _ = fs::rename(&previous, &paths.root);
        }
        return Err(Error::io(&paths.root, e));
    }
    if had_previous {
        if let Err(e) = fs::remove_dir_all(&previous) {
            tracing::warn!(path = %previous.display(), error = %e, "could not remove previous index");
        }
    }
    tracing::info!(path = %paths.root.display(), docs = meta.num_docs, terms = meta.num_terms, "saved index");
    Ok(meta)
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let mut f = File::open(&path).map_err(|e| Error::io(&path, e))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(|e| Error::io(&path, e))?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Load a snapshot written by [`save_snapshot`], validating its invariants.
pub fn load_snapshot(paths: &IndexPaths) -> Result<Snapshot> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::Corrupt(format!("unsupported index version {}", meta.version)));
    }

    let rows: Vec<DocRow> = read_bin(&paths.docs())?;
    let mut documents: HashMap<String, Document> = HashMap::with_capacity(rows.len());
    let mut doc_lengths: HashMap<String, u32> = HashMap::with_capacity(rows.len());
    for row in rows {
        doc_lengths.insert(row.id.clone(), row.length);
        let doc = Document { id: row.id, repo: row.repo, category: row.category, title: row.title, body: row.body };
        if let Some(prev) = documents.insert(doc.id.clone(), doc) {
            return Err(Error::Corrupt(format!("duplicate document {}", prev.id)));
        }
    }

    let triples: Vec<PostingTriple> = read_bin(&paths.postings())?;
    let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
    for (term, doc_id, term_frequency) in triples {
        postings.entry(term).or_default().push(Posting { doc_id, term_frequency });
    }

    let snapshot = Snapshot::from_parts(documents, postings, doc_lengths).map_err(Error::Corrupt)?;
    if snapshot.num_docs() != meta.num_docs || snapshot.num_terms() != meta.num_terms {
        return Err(Error::Corrupt("meta.json does not match stored tables".into()));
    }
    tracing::info!(path = %paths.root.display(), docs = meta.num_docs, created_at = %meta.created_at, "loaded index");
    Ok(snapshot)
}
