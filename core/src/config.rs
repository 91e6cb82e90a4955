use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One documentation tree inside the corpus root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoot {
    /// Repository label stored on every document, e.g. `runner`.
    pub name: String,
    /// Doc directory relative to the corpus root, e.g. `gitlab-runner/docs`.
    pub root: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub repos: Vec<RepoRoot>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        let repos = [
            ("gitlab", "gitlab/doc"),
            ("runner", "gitlab-runner/docs"),
            ("omnibus", "omnibus-gitlab/doc"),
            ("gitaly", "gitaly/doc"),
            ("pages", "gitlab-pages/doc"),
            ("agent", "gitlab-agent/doc"),
        ]
        .into_iter()
        .map(|(name, root)| RepoRoot { name: name.into(), root: root.into() })
        .collect();
        Self { repos }
    }
}

impl CorpusConfig {
    /// Read a JSON repo layout, e.g. `{"repos": [{"name": "runner", "root": "gitlab-runner/docs"}]}`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| Error::io(path, e))?;
        let config: CorpusConfig = serde_json::from_reader(BufReader::new(f))?;
        Ok(config)
    }

    /// The built-in layout unless a JSON override is given.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => Self::from_json_file(p),
            None => Ok(Self::default()),
        }
    }
}
