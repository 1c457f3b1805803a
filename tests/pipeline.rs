//! End-to-end integration tests for the complete merge, build, and search
//! pipeline.
//!
//! These tests exercise the full workflow:
//! 1. Merge: enriched batches → validation → dedup → corpus
//! 2. Build: normalization → embedding → index + alignment table
//! 3. Persistence: artifact save → load → cross-validation
//! 4. Search: query embedding → ranked scan → filters → top-k
//!
//! Embeddings come from a deterministic topic-count mock so the tests run
//! without model files or network access.

use std::collections::BTreeSet;

use abstract_search::corpus::merge::merge;
use abstract_search::corpus::Corpus;
use abstract_search::embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use abstract_search::index::{self, artifacts, SnapshotHandle};
use abstract_search::models::Record;
use abstract_search::query::{
    query, RecordFilter, SearchEngine, SearchQuery, SnapshotSearchEngine, YearRange,
};
use async_trait::async_trait;
use tempfile::tempdir;

/// Topic axes the mock provider projects text onto.
const TOPICS: [&str; 4] = ["retriev", "vision", "speech", "graph"];

/// Deterministic embedding provider: one dimension per topic, valued by how
/// often the topic stem occurs in the text. Texts about the same topic get
/// high cosine similarity without any model involved.
struct TopicCountProvider;

fn topic_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    TOPICS
        .iter()
        .map(|topic| lowered.matches(topic).count() as f32)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for TopicCountProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(topic_vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| topic_vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        TOPICS.len()
    }

    fn model_name(&self) -> &str {
        "topic-count-mock"
    }
}

/// Provider that always fails, for build-abandonment scenarios.
struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
        Err(EmbeddingError::ApiError("backend unavailable".to_string()))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Err(EmbeddingError::ApiError("backend unavailable".to_string()))
    }

    fn dimension(&self) -> usize {
        TOPICS.len()
    }

    fn model_name(&self) -> &str {
        "failing-mock"
    }
}

fn record(
    id: &str,
    title: &str,
    abstract_text: &str,
    language: &str,
    year: Option<i32>,
    authors: &[&str],
    categories: &[&str],
) -> Record {
    Record {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        summary: None,
        keywords: Vec::new(),
        authors: authors.iter().map(|s| s.to_string()).collect(),
        categories: categories.iter().map(|s| s.to_string()).collect(),
        affiliations: BTreeSet::new(),
        language: language.to_string(),
        year,
        pdf_url: String::new(),
    }
}

/// A small scholarly corpus spanning the mock provider's topics.
fn sample_batch() -> Vec<Record> {
    vec![
        record(
            "2020.dense-ir",
            "Dense Retrieval for Open-Domain Questions",
            "We study dense retrieval with learned representations. Our retrieval \
             system retrieves passages by embedding similarity.",
            "en",
            Some(2020),
            &["Elena Moreau", "Tom Becker"],
            &["cs.CL", "cs.IR"],
        ),
        record(
            "2021.vit-scenes",
            "Transformers for Scene Understanding",
            "A vision transformer for scene parsing. We evaluate vision backbones \
             on dense prediction tasks.",
            "en",
            Some(2021),
            &["Priya Raman"],
            &["cs.CV"],
        ),
        record(
            "2019.asr-fr",
            "Reconnaissance de la parole neuronale",
            "Nous etudions un systeme de reconnaissance de speech de bout en bout \
             pour le francais, avec un encodeur speech convolutif.",
            "fr",
            Some(2019),
            &["Luc Fontaine"],
            &["cs.CL", "eess.AS"],
        ),
        record(
            "gnn-survey",
            "A Survey of Graph Neural Networks",
            "Graph neural networks operate on graph structured data. We survey \
             graph convolution and graph attention variants.",
            "en",
            None,
            &["Wei Zhang", "Elena Moreau"],
            &["cs.LG"],
        ),
    ]
}

fn hit_ids(hits: &[abstract_search::models::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.record.id.as_str()).collect()
}

#[tokio::test]
async fn test_full_pipeline_merge_build_save_load_query() {
    // Merge: the second batch revises one abstract and adds nothing new.
    let revised = record(
        "2021.vit-scenes",
        "Transformers for Scene Understanding",
        "A revised vision study. Vision vision vision everywhere.",
        "en",
        Some(2021),
        &["Priya Raman"],
        &["cs.CV"],
    );
    let (corpus, report) = merge(Corpus::new(), vec![sample_batch(), vec![revised]]);

    assert_eq!(report.accepted, 4);
    assert_eq!(report.replaced, 1);
    assert_eq!(report.skipped(), 0);
    assert_eq!(corpus.len(), 4);

    // Build and persist the artifact set.
    let build = index::build(corpus, &TopicCountProvider, 2).await.unwrap();
    assert_eq!(build.snapshot.index.len(), 4);
    assert_eq!(build.snapshot.alignment.len(), 4);

    let dir = tempdir().unwrap();
    artifacts::save(&build, dir.path()).unwrap();

    // Load it back and verify the shape survived.
    let snapshot = artifacts::load(dir.path()).unwrap();
    assert_eq!(snapshot.corpus.len(), 4);
    assert_eq!(snapshot.config.model_name, "topic-count-mock");
    assert_eq!(snapshot.config.dimension, TOPICS.len());
    for (position, id) in snapshot.alignment.ids().iter().enumerate() {
        assert_eq!(snapshot.alignment.id_at(position), Some(id.as_str()));
        assert!(snapshot.corpus.get(id).is_some());
    }

    // Query the loaded snapshot directly.
    let query_vector = topic_vector("dense retrieval of passages");
    let hits = query(
        &snapshot.index,
        &snapshot.alignment,
        &snapshot.corpus,
        &query_vector,
        2,
        &RecordFilter::default(),
        None,
    )
    .unwrap();

    assert_eq!(hits[0].record.id, "2020.dense-ir");
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn test_resubmitted_record_changes_its_ranking() {
    // First enrichment pass tags the record as a vision paper.
    let first = vec![
        record(
            "x",
            "Ambiguous Paper",
            "A study of vision models.",
            "en",
            Some(2022),
            &["Sam Ortega"],
            &["cs.CV"],
        ),
        sample_batch().remove(0),
    ];
    let (corpus, _) = merge(Corpus::new(), vec![first]);
    let before = index::build(corpus.clone(), &TopicCountProvider, 8)
        .await
        .unwrap();

    let vision_query = topic_vector("vision");
    let hits = query(
        &before.snapshot.index,
        &before.snapshot.alignment,
        &before.snapshot.corpus,
        &vision_query,
        1,
        &RecordFilter::default(),
        None,
    )
    .unwrap();
    assert_eq!(hit_ids(&hits), vec!["x"]);

    // A later pass re-submits the same id with a corrected abstract. The
    // corpus keeps one entry for it, and a rebuild re-ranks it.
    let corrected = record(
        "x",
        "Ambiguous Paper",
        "Actually a retrieval study. Retrieval retrieval retrieval.",
        "en",
        Some(2022),
        &["Sam Ortega"],
        &["cs.IR"],
    );
    let (corpus, report) = merge(corpus, vec![vec![corrected]]);
    assert_eq!(report.replaced, 1);
    assert_eq!(corpus.len(), 2);

    let after = index::build(corpus, &TopicCountProvider, 8).await.unwrap();
    let hits = query(
        &after.snapshot.index,
        &after.snapshot.alignment,
        &after.snapshot.corpus,
        &vision_query,
        2,
        &RecordFilter::default(),
        Some(0.1),
    )
    .unwrap();
    // The corrected record no longer answers vision queries.
    assert!(!hit_ids(&hits).contains(&"x"));
}

#[tokio::test]
async fn test_empty_corpus_builds_and_queries_cleanly() {
    let (corpus, report) = merge(Corpus::new(), vec![]);
    assert_eq!(report.processed(), 0);

    let build = index::build(corpus, &TopicCountProvider, 4).await.unwrap();
    assert!(build.snapshot.index.is_empty());

    let dir = tempdir().unwrap();
    artifacts::save(&build, dir.path()).unwrap();
    let snapshot = artifacts::load(dir.path()).unwrap();

    let hits = query(
        &snapshot.index,
        &snapshot.alignment,
        &snapshot.corpus,
        &topic_vector("anything at all"),
        5,
        &RecordFilter::default(),
        None,
    )
    .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_failed_build_preserves_existing_artifacts() {
    let (corpus, _) = merge(Corpus::new(), vec![sample_batch()]);
    let good = index::build(corpus.clone(), &TopicCountProvider, 4)
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    artifacts::save(&good, dir.path()).unwrap();

    // A later rebuild fails at embedding time; the build yields nothing to
    // persist and the published set keeps serving.
    let result = index::build(corpus, &FailingProvider, 4).await;
    assert!(result.is_err());

    let snapshot = artifacts::load(dir.path()).unwrap();
    assert_eq!(snapshot.corpus.len(), 4);
    assert_eq!(snapshot.config.model_name, "topic-count-mock");
}

#[tokio::test]
async fn test_engine_serves_across_snapshot_swaps() {
    let (corpus, _) = merge(Corpus::new(), vec![sample_batch()]);
    let first = index::build(corpus.clone(), &TopicCountProvider, 4)
        .await
        .unwrap();

    let handle = SnapshotHandle::with_snapshot(first.snapshot);
    let engine = SnapshotSearchEngine::new(TopicCountProvider, handle);

    // The query mixes topics (graph x2, retrieval x1); the general survey
    // is the closest thing the first snapshot has.
    let request = SearchQuery::new("graph retrieval over large graph collections").with_k(1);
    let hits = engine.search(&request).await.unwrap();
    assert_eq!(hit_ids(&hits), vec!["gnn-survey"]);

    // A new batch arrives with a paper matching the topic mix directly;
    // merge, rebuild, and swap the snapshot under the running engine.
    let closer = record(
        "graph-retrieval",
        "Graph Retrieval at Scale",
        "We retrieve subgraphs from large graph stores. Graph retrieval \
         benefits from structure-aware embeddings.",
        "en",
        Some(2023),
        &["Ana Silva"],
        &["cs.LG"],
    );
    let (corpus, _) = merge(corpus, vec![vec![closer]]);
    let second = index::build(corpus, &TopicCountProvider, 4).await.unwrap();
    engine.handle().install(second.snapshot);

    let hits = engine.search(&request).await.unwrap();
    assert_eq!(hit_ids(&hits), vec!["graph-retrieval"]);
}

#[tokio::test]
async fn test_filtered_search_over_loaded_artifacts() {
    let (corpus, _) = merge(Corpus::new(), vec![sample_batch()]);
    let build = index::build(corpus, &TopicCountProvider, 4).await.unwrap();

    let dir = tempdir().unwrap();
    artifacts::save(&build, dir.path()).unwrap();
    let snapshot = artifacts::load(dir.path()).unwrap();

    let engine =
        SnapshotSearchEngine::new(TopicCountProvider, SnapshotHandle::with_snapshot(snapshot));

    // Language filter: the speech query matches the French record best, but
    // an en filter excludes it entirely.
    let request = SearchQuery::new("speech recognition")
        .with_k(5)
        .with_filter(RecordFilter {
            language: Some("en".to_string()),
            ..Default::default()
        })
        .with_min_score(0.1);
    let hits = engine.search(&request).await.unwrap();
    assert!(!hit_ids(&hits).contains(&"2019.asr-fr"));

    // Author + year filter: Elena Moreau wrote two records, but only the
    // retrieval paper has a year inside the range; the survey has no year
    // and passes too.
    let request = SearchQuery::new("retrieval and graphs")
        .with_k(5)
        .with_filter(RecordFilter {
            authors: vec!["Elena Moreau".to_string()],
            years: Some(YearRange::new(2020, 2021)),
            ..Default::default()
        });
    let hits = engine.search(&request).await.unwrap();
    let ids = hit_ids(&hits);
    assert!(ids.contains(&"2020.dense-ir"));
    assert!(ids.contains(&"gnn-survey"));
    assert_eq!(ids.len(), 2);
}
