use docsearch_core::{build, search, Document, IndexManager, MarkdownCorpus, CorpusConfig, RepoRoot, Error};
use std::sync::{Arc, Barrier};
use std::thread;

fn doc(id: &str, title: &str, body: &str) -> Document {
    Document { id: id.into(), repo: "gitlab".into(), category: "general".into(), title: title.into(), body: body.into() }
}

fn runner_and_gitaly() -> Vec<Document> {
    vec![
        doc("A", "Install Runner", "Install GitLab Runner using Docker"),
        doc("B", "Gitaly Storage", "Configure Gitaly storage backend"),
    ]
}

fn hit_ids(m: &IndexManager, q: &str) -> Vec<String> {
    m.search(q, 10).unwrap().hits.into_iter().map(|h| h.id).collect()
}

#[test]
fn two_document_scenario() {
    let m = IndexManager::new();
    let report = m.rebuild(runner_and_gitaly().into_iter().map(Ok));
    assert_eq!(report.included, 2);
    assert!(report.skipped.is_empty());

    assert_eq!(hit_ids(&m, "docker"), vec!["A"]);
    assert_eq!(hit_ids(&m, "storage"), vec!["B"]);
    assert!(hit_ids(&m, "nonexistent term").is_empty());
    assert_eq!(m.fetch("A"), Some(runner_and_gitaly()[0].clone()));
    assert_eq!(m.fetch("Z"), None);
}

#[test]
fn rebuild_without_a_drops_it() {
    let m = IndexManager::new();
    m.rebuild(runner_and_gitaly().into_iter().map(Ok));
    m.rebuild(runner_and_gitaly().into_iter().skip(1).map(Ok));
    assert!(hit_ids(&m, "docker").is_empty());
    assert_eq!(m.fetch("A"), None);
    assert_eq!(m.status().generation, 2);
}

#[test]
fn build_is_idempotent() {
    let first = build(runner_and_gitaly().into_iter().map(Ok));
    let second = build(runner_and_gitaly().into_iter().map(Ok));
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
}

#[test]
fn build_ignores_input_order() {
    let forward = build(runner_and_gitaly().into_iter().map(Ok)).0;
    let backward = build(runner_and_gitaly().into_iter().rev().map(Ok)).0;
    assert_eq!(forward, backward);
}

#[test]
fn search_is_deterministic() {
    let docs: Vec<Document> = (0..50)
        .map(|i| doc(&format!("doc-{i:02}"), "Runner", &"docker runner ".repeat(i % 7 + 1)))
        .collect();
    let (snap, _) = build(docs.into_iter().map(Ok));
    let a = search(&snap, "runner docker", 20).unwrap();
    let b = search(&snap, "docker runner", 20).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 20);
    for pair in a.windows(2) {
        assert!(pair[0].score > pair[1].score || (pair[0].score == pair[1].score && pair[0].doc_id < pair[1].doc_id));
    }
}

#[test]
fn candidates_contain_every_term() {
    let docs = vec![
        doc("1", "", "alpha beta gamma"),
        doc("2", "", "alpha beta"),
        doc("3", "", "beta gamma"),
        doc("4", "alpha", "gamma"),
    ];
    let (snap, _) = build(docs.clone().into_iter().map(Ok));
    for query in ["alpha", "alpha beta", "beta gamma", "alpha gamma", "alpha beta gamma", "delta alpha"] {
        let terms = docsearch_core::tokenizer::tokenize(query);
        let mut expected: Vec<&str> = docs
            .iter()
            .filter(|d| {
                let words = docsearch_core::tokenizer::tokenize(&format!("{} {}", d.title, d.body));
                terms.iter().all(|t| words.contains(t))
            })
            .map(|d| d.id.as_str())
            .collect();
        expected.sort();
        let mut got: Vec<String> = search(&snap, query, 10).unwrap().into_iter().map(|h| h.doc_id).collect();
        got.sort();
        assert_eq!(got, expected, "query {query:?}");
    }
}

#[test]
fn reader_keeps_its_snapshot_across_rebuild() {
    let m = Arc::new(IndexManager::new());
    m.rebuild(runner_and_gitaly().into_iter().map(Ok));

    let held = m.snapshot().unwrap();
    let barrier = Arc::new(Barrier::new(2));
    let writer = {
        let m = Arc::clone(&m);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            m.rebuild(vec![Ok(doc("C", "Pages", "GitLab Pages custom domains"))]);
        })
    };
    barrier.wait();
    writer.join().unwrap();

    // The held snapshot is unaffected while the manager serves the new one
    assert_eq!(search(&held, "docker", 10).unwrap().len(), 1);
    assert!(held.document("A").is_some());
    assert!(hit_ids(&m, "docker").is_empty());
    assert_eq!(hit_ids(&m, "pages"), vec!["C"]);
}

#[test]
fn concurrent_readers_see_whole_snapshots() {
    let m = Arc::new(IndexManager::new());
    let old: Vec<Document> = (0..20).map(|i| doc(&format!("old-{i:02}"), "", "shared old")).collect();
    let new: Vec<Document> = (0..30).map(|i| doc(&format!("new-{i:02}"), "", "shared new")).collect();
    m.rebuild(old.clone().into_iter().map(Ok));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..200 {
                    let n = m.search("shared", 100).unwrap().hits.len();
                    assert!(n == 20 || n == 30, "saw partial snapshot with {n} hits");
                }
            })
        })
        .collect();
    for _ in 0..10 {
        m.rebuild(new.clone().into_iter().map(Ok));
        m.rebuild(old.clone().into_iter().map(Ok));
    }
    for r in readers {
        r.join().unwrap();
    }
}

#[test]
fn rebuild_from_markdown_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("gitaly/doc/storage");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("backends.md"), "---\ntitle: Storage backends\n---\nConfigure Gitaly storage").unwrap();
    std::fs::write(docs.join("bad.md"), "---\ntitle: {\n---\n").unwrap();

    let config = CorpusConfig { repos: vec![RepoRoot { name: "gitaly".into(), root: "gitaly/doc".into() }] };
    let m = IndexManager::new();
    let report = m.rebuild_from(&MarkdownCorpus::new(dir.path(), config.clone())).unwrap();
    assert_eq!(report.included, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, "gitaly/doc/storage/bad.md");

    let found = m.fetch("gitaly/doc/storage/backends.md").unwrap();
    assert_eq!(found.title, "Storage backends");
    assert_eq!(found.category, "storage");

    let err = m.rebuild_from(&MarkdownCorpus::new(dir.path().join("missing"), config)).unwrap_err();
    assert!(matches!(err, Error::BuildFailure { .. }));
    assert!(m.fetch("gitaly/doc/storage/backends.md").is_some());
}
