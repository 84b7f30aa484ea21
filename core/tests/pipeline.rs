mod common;

use common::{build, ingest, page, synthetic_corpus, Page};
use diskdex_core::segment::SegmentReader;
use diskdex_core::{
    finalize, merge, BuildConfig, EngineConfig, IndexError, IndexPaths, Posting, QueryEngine,
};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn three_pages() -> Vec<Page<'static>> {
    vec![
        page("https://zoo.example/0", "cat dog"),
        page("https://zoo.example/1", "dog fish"),
        page("https://zoo.example/2", "cat fish"),
    ]
}

fn urls(hits: &[diskdex_core::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.url.as_str()).collect()
}

#[test]
fn three_document_scenario() {
    let dir = tempdir().unwrap();
    let (flushes, _) = build(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));
    assert_eq!(flushes, 3);

    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(urls(&engine.search("cat dog", 10).unwrap()), vec!["https://zoo.example/0"]);

    let fish = engine.search("fish", 10).unwrap();
    assert_eq!(urls(&fish), vec!["https://zoo.example/1", "https://zoo.example/2"]);
    assert!(fish[0].score >= fish[1].score);

    assert!(engine.search("bird", 10).unwrap().is_empty());
}

#[test]
fn flush_count_follows_chunk_size() {
    let config = BuildConfig { min_chunk: 10, target_flush_count: 3, max_docs_in_memory: None };
    for total in [1usize, 4, 10, 11, 12, 29, 64, 101] {
        let dir = tempdir().unwrap();
        let corpus: Vec<(String, String)> = (0..total)
            .map(|i| (format!("https://e.example/{i}"), format!("shared word{i}")))
            .collect();
        let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
        let out = ingest(dir.path(), &pages, &config);
        let chunk = config.effective_chunk_size(total);
        let expected = (total + chunk - 1) / chunk;
        assert_eq!(out.segments.len(), expected, "total={total}");
        if total > config.min_chunk {
            assert!(out.segments.len() >= 3, "total={total} gave {}", out.segments.len());
        }
    }
}

#[test]
fn builder_never_exceeds_chunk() {
    let dir = tempdir().unwrap();
    let corpus = synthetic_corpus(57);
    let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
    let config = BuildConfig::with_chunk_size(8);
    let out = ingest(dir.path(), &pages, &config);
    assert!(out.stats.peak_buffered_docs <= 8);
    for f in &out.stats.flushes {
        assert!(f.docs <= 8, "flush {} held {} docs", f.seq, f.docs);
        assert!(f.path.exists());
    }
    let seqs: Vec<u32> = out.stats.flushes.iter().map(|f| f.seq).collect();
    assert_eq!(seqs, (0..seqs.len() as u32).collect::<Vec<_>>());
}

#[test]
fn merged_postings_are_union_of_partials() {
    let dir = tempdir().unwrap();
    let corpus = synthetic_corpus(40);
    let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
    let out = ingest(dir.path(), &pages, &BuildConfig::with_chunk_size(6));
    assert!(out.segments.len() >= 3);

    let mut expected: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
    for seg in &out.segments {
        let mut r = SegmentReader::open(seg).unwrap();
        while let Some((term, list)) = r.next_record().unwrap() {
            expected.entry(term).or_default().extend(list);
        }
    }

    let (merged, _) = diskdex_core::finalize(out, &IndexPaths::new(dir.path())).unwrap();
    assert_eq!(merged.terms as usize, expected.len());
    assert_eq!(merged.resorted_terms, 0);

    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    for (term, list) in &expected {
        assert_eq!(engine.postings(term).unwrap().as_ref(), list, "term {term}");
    }
    let dir_terms: HashSet<&str> = engine.directory().terms().collect();
    let exp_terms: HashSet<&str> = expected.keys().map(String::as_str).collect();
    assert_eq!(dir_terms, exp_terms);
}

#[test]
fn merging_same_segments_is_byte_identical() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    let corpus = synthetic_corpus(30);
    let pages: Vec<Page> = corpus.iter().map(|(u, body)| page(u, body)).collect();
    let out = ingest(a.path(), &pages, &BuildConfig::with_chunk_size(7));

    let copies: Vec<_> = out
        .segments
        .iter()
        .map(|s| {
            let dst = b.path().join(s.file_name().unwrap());
            fs::copy(s, &dst).unwrap();
            dst
        })
        .collect();

    let pa = IndexPaths::new(a.path());
    let pb = IndexPaths::new(b.path());
    merge(&out.segments, &pa).unwrap();
    merge(&copies, &pb).unwrap();
    assert_eq!(fs::read(pa.postings()).unwrap(), fs::read(pb.postings()).unwrap());
    assert_eq!(fs::read(pa.directory()).unwrap(), fs::read(pb.directory()).unwrap());
}

#[test]
fn failed_merge_keeps_partial_segments() {
    let dir = tempdir().unwrap();
    let out = ingest(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));
    let victim = &out.segments[1];
    let f = fs::OpenOptions::new().write(true).open(victim).unwrap();
    f.set_len(6).unwrap();

    let paths = IndexPaths::new(dir.path());
    match merge(&out.segments, &paths) {
        Err(IndexError::Merge { segment, .. }) => assert_eq!(&segment, victim),
        other => panic!("unexpected: {other:?}"),
    }
    for seg in &out.segments {
        assert!(seg.exists(), "{} was deleted", seg.display());
    }
    assert!(!paths.postings().exists());
    assert!(!paths.directory().exists());
}

#[test]
fn failed_rebuild_keeps_previous_index() {
    let dir = tempdir().unwrap();
    let old = vec![page("https://old/0", "cat"), page("https://old/1", "dog")];
    build(dir.path(), &old, &BuildConfig::with_chunk_size(1));

    let new = vec![page("https://new/0", "zzz"), page("https://new/1", "yyy"), page("https://new/2", "cat")];
    let out = ingest(dir.path(), &new, &BuildConfig::with_chunk_size(1));
    let f = fs::OpenOptions::new().write(true).open(&out.segments[1]).unwrap();
    f.set_len(6).unwrap();
    let paths = IndexPaths::new(dir.path());
    assert!(finalize(out, &paths).is_err());

    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(engine.num_docs(), 2);
    assert_eq!(urls(&engine.search("cat", 10).unwrap()), vec!["https://old/0"]);
    assert!(engine.search("zzz", 10).unwrap().is_empty());
    drop(engine);

    build(dir.path(), &new, &BuildConfig::with_chunk_size(1));
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(urls(&engine.search("cat", 10).unwrap()), vec!["https://new/2"]);
}

#[test]
fn half_committed_index_does_not_open() {
    let dir = tempdir().unwrap();
    build(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));

    let out = ingest(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));
    let paths = IndexPaths::new(dir.path());
    fs::remove_file(paths.postings()).unwrap();
    fs::create_dir_all(paths.postings().join("x")).unwrap();
    assert!(finalize(out, &paths).is_err());

    match QueryEngine::open(dir.path(), EngineConfig::default()) {
        Err(IndexError::MissingIndexFile(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("opened a half-replaced index"),
    }
}

#[test]
fn unknown_terms_return_empty_without_disk_reads() {
    let dir = tempdir().unwrap();
    build(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();

    assert!(engine.search("zebra", 5).unwrap().is_empty());
    assert!(engine.search("cat zebra", 5).unwrap().is_empty());
    assert!(engine.search("", 5).unwrap().is_empty());
    assert!(engine.search("!!! ???", 5).unwrap().is_empty());
    assert_eq!(engine.stats().bytes_read, 0);
}

#[test]
fn and_semantics_and_relaxation() {
    let dir = tempdir().unwrap();
    let corpus = synthetic_corpus(60);
    let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
    build(dir.path(), &pages, &BuildConfig::with_chunk_size(9));
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();

    let ids = |q: &str| -> HashSet<u32> {
        engine.search(q, usize::MAX).unwrap().into_iter().map(|h| h.doc_id).collect()
    };
    let docs_of = |t: &str| -> HashSet<u32> {
        engine.postings(t).unwrap().iter().map(|p| p.doc_id).collect()
    };

    let both = ids("alpha bravo");
    let expected: HashSet<u32> = docs_of("alpha").intersection(&docs_of("bravo")).copied().collect();
    assert!(!both.is_empty());
    assert_eq!(both, expected);
    assert!(both.is_subset(&ids("alpha")));
    assert!(both.is_subset(&ids("bravo")));

    let three = ids("alpha bravo charlie");
    assert!(three.is_subset(&both));
}

#[test]
fn query_reads_only_directory_listed_bytes() {
    let dir = tempdir().unwrap();
    let corpus = synthetic_corpus(50);
    let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
    build(dir.path(), &pages, &BuildConfig::with_chunk_size(10));
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();

    let expected: u64 = ["delta", "echo"]
        .iter()
        .map(|t| engine.directory().get(t).unwrap().len)
        .sum();
    engine.search("delta echo delta", 10).unwrap();
    let stats = engine.stats();
    assert_eq!(stats.bytes_read, expected);
    assert_eq!(stats.cache_misses, 2);
    let file_len = fs::metadata(IndexPaths::new(dir.path()).postings()).unwrap().len();
    assert!(stats.bytes_read < file_len);

    engine.search("echo delta", 10).unwrap();
    let again = engine.stats();
    assert_eq!(again.bytes_read, expected);
    assert_eq!(again.cache_hits, 2);
}

#[test]
fn cache_stays_bounded() {
    let dir = tempdir().unwrap();
    let corpus = synthetic_corpus(50);
    let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
    build(dir.path(), &pages, &BuildConfig::with_chunk_size(10));
    let config = EngineConfig { cache_capacity: 2, ..EngineConfig::default() };
    let engine = QueryEngine::open(dir.path(), config).unwrap();
    for q in ["alpha", "bravo", "charlie", "delta", "alpha"] {
        engine.search(q, 3).unwrap();
        assert!(engine.stats().cached_terms <= 2);
    }
    assert_eq!(engine.stats().cache_misses, 5);
}

#[test]
fn cache_evicts_least_recently_used_term() {
    let dir = tempdir().unwrap();
    build(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));
    let config = EngineConfig { cache_capacity: 2, ..EngineConfig::default() };
    let engine = QueryEngine::open(dir.path(), config).unwrap();
    // "dog" is the oldest entry when "fish" arrives.
    for q in ["cat", "dog", "cat", "fish", "cat", "dog"] {
        engine.search(q, 3).unwrap();
    }
    let stats = engine.stats();
    assert_eq!((stats.cache_hits, stats.cache_misses), (2, 4));
    assert_eq!(stats.cached_terms, 2);
    assert_eq!(stats.cache_capacity, 2);
}

#[test]
fn important_postings_rank_higher() {
    let dir = tempdir().unwrap();
    let pages = vec![
        page("https://u.example/plain", "compilers lecture notes"),
        Page { url: "https://u.example/title", body: "lecture notes", important: "compilers" },
        page("https://u.example/other", "databases"),
    ];
    build(dir.path(), &pages, &BuildConfig::with_chunk_size(1));
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    let hits = engine.search("compilers", 10).unwrap();
    assert_eq!(urls(&hits), vec!["https://u.example/title", "https://u.example/plain"]);
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn scores_follow_tf_idf_formula() {
    let dir = tempdir().unwrap();
    build(dir.path(), &three_pages(), &BuildConfig::with_chunk_size(1));
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    let hit = &engine.search("cat dog", 1).unwrap()[0];
    // N = 3, df = 2 for both terms, tf = 1.
    let idf = (4.0f32 / 3.0).ln() + 1.0;
    let expected = (2.0 * idf) / 2.0f32.sqrt() * 1.2;
    assert!((hit.score - expected).abs() < 1e-5, "{} vs {expected}", hit.score);
}

#[test]
fn repeated_url_across_flushes_is_folded() {
    let dir = tempdir().unwrap();
    let pages = vec![
        page("https://r.example/a", "kiwi"),
        page("https://r.example/b", "kiwi"),
        page("https://r.example/a#again", "kiwi kiwi"),
    ];
    let (flushes, merged) = build(dir.path(), &pages, &BuildConfig::with_chunk_size(1));
    assert_eq!(flushes, 3);
    assert_eq!(merged.resorted_terms, 1);
    let engine = QueryEngine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(engine.num_docs(), 2);
    let list = engine.postings("kiwi").unwrap();
    assert_eq!(
        list.as_ref(),
        &vec![
            Posting { doc_id: 0, tf: 3, important: false },
            Posting { doc_id: 1, tf: 1, important: false },
        ]
    );
}

#[test]
fn missing_index_fails_open() {
    let dir = tempdir().unwrap();
    match QueryEngine::open(dir.path(), EngineConfig::default()) {
        Err(IndexError::MissingIndexFile(p)) => assert!(p.ends_with("postings.seg")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("opened an empty directory"),
    }
}

#[test]
fn concurrent_queries_agree() {
    let dir = tempdir().unwrap();
    let corpus = synthetic_corpus(80);
    let pages: Vec<Page> = corpus.iter().map(|(u, b)| page(u, b)).collect();
    build(dir.path(), &pages, &BuildConfig::with_chunk_size(16));
    let config = EngineConfig { cache_capacity: 3, ..EngineConfig::default() };
    let engine = Arc::new(QueryEngine::open(dir.path(), config).unwrap());
    let queries = ["alpha", "bravo charlie", "delta echo", "foxtrot", "golf hotel alpha"];
    let baseline: Vec<_> = queries.iter().map(|q| engine.search(q, 20).unwrap()).collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        let q = queries[i % queries.len()];
                        (i % queries.len(), engine.search(q, 20).unwrap())
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for h in handles {
        for (i, hits) in h.join().unwrap() {
            assert_eq!(hits, baseline[i]);
        }
    }
    assert!(engine.stats().cached_terms <= 3);
}
