//! Markdown corpus loader.
//!
//! Walks each configured documentation tree under a corpus root and turns
//! every `*.md` file into a [`Document`]. Files that cannot be read or carry
//! malformed front matter come back as [`SkippedDocument`]s so a single bad
//! page never sinks a rebuild; only a missing corpus is a hard failure.

use crate::config::{CorpusConfig, RepoRoot};
use crate::error::LoaderError;
use crate::index::{Document, SkippedDocument};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub type LoadedDocument = Result<Document, SkippedDocument>;

/// Anything that can hand the indexer a full document sequence.
pub trait DocumentSource {
    fn load(&self) -> Result<Vec<LoadedDocument>, LoaderError>;
}

impl DocumentSource for Vec<Document> {
    fn load(&self) -> Result<Vec<LoadedDocument>, LoaderError> {
        Ok(self.iter().cloned().map(Ok).collect())
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownCorpus {
    root: PathBuf,
    config: CorpusConfig,
}

impl MarkdownCorpus {
    pub fn new<P: AsRef<Path>>(root: P, config: CorpusConfig) -> Self {
        Self { root: root.as_ref().to_path_buf(), config }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_repo(&self, repo: &RepoRoot, base: &Path, out: &mut Vec<LoadedDocument>) {
        for entry in WalkDir::new(base).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let id = e.path().map(|p| self.doc_id(p)).unwrap_or_else(|| repo.root.clone());
                    out.push(Err(SkippedDocument { id, reason: e.to_string() }));
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
                continue;
            }
            out.push(self.load_file(repo, base, path));
        }
    }

    fn load_file(&self, repo: &RepoRoot, base: &Path, path: &Path) -> LoadedDocument {
        let id = self.doc_id(path);
        let raw = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => return Err(SkippedDocument { id, reason: format!("unreadable: {e}") }),
        };
        let (front, body) = match parse_front_matter(&raw) {
            Ok(parsed) => parsed,
            Err(e) => return Err(SkippedDocument { id, reason: format!("malformed front matter: {e}") }),
        };
        let title = front
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default());
        Ok(Document { id, repo: repo.name.clone(), category: category(base, path), title, body: body.to_string() })
    }

    /// Corpus-relative, `/`-separated path.
    fn doc_id(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl DocumentSource for MarkdownCorpus {
    fn load(&self) -> Result<Vec<LoadedDocument>, LoaderError> {
        if !self.root.is_dir() {
            return Err(LoaderError::CorpusRootMissing { path: self.root.clone() });
        }
        let mut out = Vec::new();
        let mut found_any = false;
        for repo in &self.config.repos {
            let base = self.root.join(&repo.root);
            if !base.is_dir() {
                tracing::warn!(repo = %repo.name, path = %base.display(), "documentation root not found, skipping repo");
                continue;
            }
            found_any = true;
            self.load_repo(repo, &base, &mut out);
        }
        if !found_any {
            return Err(LoaderError::NoDocumentationRoots { path: self.root.clone() });
        }
        tracing::info!(root = %self.root.display(), files = out.len(), "loaded corpus");
        Ok(out)
    }
}

/// First directory below the repo's doc root, `general` for top-level pages.
fn category(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    let mut parts = rel.components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(dir)), Some(_)) => dir.to_string_lossy().into_owned(),
        _ => "general".to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    title: Option<String>,
}

/// Split an optional `---` delimited YAML block off the top of a page.
///
/// A page without a closing delimiter has no front matter and is returned
/// whole. Only a block that exists but does not parse is an error.
fn parse_front_matter(content: &str) -> Result<(FrontMatter, &str), serde_yaml::Error> {
    let content = content.trim_start_matches('\u{feff}');
    let Some(after_opening) = content.strip_prefix("---") else {
        return Ok((FrontMatter::default(), content));
    };
    let Some(after_opening) = after_opening.strip_prefix("\r\n").or_else(|| after_opening.strip_prefix('\n')) else {
        return Ok((FrontMatter::default(), content));
    };
    let Some(close) = find_closing_delimiter(after_opening) else {
        return Ok((FrontMatter::default(), content));
    };

    let yaml = &after_opening[..close];
    let rest = &after_opening[close + 3..];
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')).unwrap_or(rest);

    if yaml.trim().is_empty() {
        return Ok((FrontMatter::default(), rest));
    }
    let front: FrontMatter = serde_yaml::from_str(yaml)?;
    Ok((front, rest))
}

/// Byte offset of a `---` line, which must start a line of its own.
fn find_closing_delimiter(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}
