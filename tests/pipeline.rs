//! Ingestion and answering end to end, with a deterministic embedder and a
//! scripted language model in place of the real ones.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{html_page, minimal_pdf, HashEmbedder, Project, ScriptedModel, StalledEmbedder};
use grounded_answers::embedding::Embedder;
use grounded_answers::error::{NotReadyReason, RagError};
use grounded_answers::index::VectorIndex;
use grounded_answers::ingest::{IngestPipeline, IngestRequest, IngestStage};

async fn index_len(project: &Project) -> usize {
    VectorIndex::load(&project.index_dir(), &HashEmbedder::new())
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn full_ingest_builds_index_from_data_dir() {
    let project = Project::new();
    project.write("data/guide.html", html_page("water", 4));
    project.write("data/pump.json", r#"{"pump": "P-100", "flow_lpm": 12}"#);
    project.write("data/notes.txt", "ignored: unsupported extension");

    let embedder = HashEmbedder::new();
    let mut pipeline = IngestPipeline::new(&project.config, &embedder);
    let report = pipeline.run(IngestRequest::full()).await.unwrap();

    assert_eq!(pipeline.stage(), IngestStage::Done);
    assert_eq!(report.chunks, Some(5));
    assert_eq!(report.chunks_added, None);
    assert_eq!(index_len(&project).await, 5);
}

#[tokio::test]
async fn full_ingest_is_idempotent() {
    let project = Project::new();
    project.write("data/a.html", html_page("alpha", 3));
    project.write("data/b.json", r#"{"beta": [1, 2, 3]}"#);
    let embedder = HashEmbedder::new();

    let first = IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap();
    let second = IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap();

    assert_eq!(first.chunks, second.chunks);
    assert_eq!(index_len(&project).await, 4);
}

#[tokio::test]
async fn full_ingest_skips_unreadable_files() {
    let project = Project::new();
    project.write("data/good.json", r#"{"ok": true}"#);
    project.write("data/broken.json", "{not json");

    let embedder = HashEmbedder::new();
    let report = IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap();
    assert_eq!(report.chunks, Some(1));
}

#[tokio::test]
async fn empty_data_dir_fails_without_writing() {
    let project = Project::new();
    let embedder = HashEmbedder::new();
    let mut pipeline = IngestPipeline::new(&project.config, &embedder);

    let err = pipeline.run_full().await.unwrap_err();
    assert!(matches!(err, RagError::NoDocuments(_)));
    assert_eq!(pipeline.stage(), IngestStage::Failed);
    assert!(!project.index_dir().exists());
}

#[tokio::test]
async fn empty_data_dir_leaves_existing_index_untouched() {
    let project = Project::new();
    let page = project.write("data/a.html", html_page("alpha", 2));
    let embedder = HashEmbedder::new();
    IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap();

    std::fs::remove_file(page).unwrap();
    let err = IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoDocuments(_)));
    assert_eq!(index_len(&project).await, 2);
}

#[tokio::test]
async fn documents_without_text_are_no_documents() {
    let project = Project::new();
    project.write("data/blank.html", "<html><body><script>var x;</script></body></html>");
    let embedder = HashEmbedder::new();

    let err = IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoDocuments(_)));
    assert!(!project.index_dir().exists());
}

#[tokio::test]
async fn incremental_add_reports_only_new_chunks() {
    let project = Project::new();
    project.write("data/base.html", html_page("base", 10));
    project.write("incoming/new.html", html_page("fresh", 3));
    let embedder = HashEmbedder::new();

    let full = IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap();
    assert_eq!(full.chunks, Some(10));

    let report = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&["incoming/new.html".to_string()])
        .await
        .unwrap();
    assert_eq!(report.chunks_added, Some(3));
    assert_eq!(report.chunks, None);
    assert_eq!(index_len(&project).await, 13);
}

#[tokio::test]
async fn incremental_bootstraps_missing_index() {
    let project = Project::new();
    project.write("docs/first.json", r#"{"first": true}"#);
    let embedder = HashEmbedder::new();

    let report = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&["docs/first.json".to_string()])
        .await
        .unwrap();
    assert_eq!(report.chunks_added, Some(1));
    assert_eq!(index_len(&project).await, 1);
}

#[tokio::test]
async fn incremental_is_additive_and_order_independent() {
    let embedder = HashEmbedder::new();
    let a = "docs/a.html".to_string();
    let b = "docs/b.html".to_string();

    let setup = || {
        let project = Project::new();
        project.write("docs/a.html", html_page("apple", 2));
        project.write("docs/b.html", html_page("banana", 3));
        project
    };

    let together = setup();
    IngestPipeline::new(&together.config, &embedder)
        .run_incremental(&[a.clone(), b.clone()])
        .await
        .unwrap();

    let a_then_b = setup();
    for p in [&a, &b] {
        IngestPipeline::new(&a_then_b.config, &embedder)
            .run_incremental(std::slice::from_ref(p))
            .await
            .unwrap();
    }

    let b_then_a = setup();
    for p in [&b, &a] {
        IngestPipeline::new(&b_then_a.config, &embedder)
            .run_incremental(std::slice::from_ref(p))
            .await
            .unwrap();
    }

    assert_eq!(index_len(&together).await, 5);
    assert_eq!(index_len(&a_then_b).await, 5);
    assert_eq!(index_len(&b_then_a).await, 5);
}

#[tokio::test]
async fn incremental_with_empty_list_is_invalid_request() {
    let project = Project::new();
    let embedder = HashEmbedder::new();
    let err = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&[])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
}

#[tokio::test]
async fn incremental_fails_whole_batch_on_bad_path() {
    let project = Project::new();
    project.write("docs/ok.json", r#"{"ok": 1}"#);
    let embedder = HashEmbedder::new();

    let err = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&["docs/ok.json".to_string(), "/etc/passwd".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::PathNotAllowed { .. }));
    assert!(!project.index_dir().exists());

    let err = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&["docs/missing.pdf".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn incremental_pdf_is_indexed_per_page() {
    let project = Project::new();
    project.write("docs/manual.pdf", minimal_pdf("boil water for one minute"));
    let embedder = HashEmbedder::new();

    let report = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&["docs/manual.pdf".to_string()])
        .await
        .unwrap();
    assert_eq!(report.chunks_added, Some(1));

    let index = VectorIndex::load(&project.index_dir(), &embedder).await.unwrap();
    let chunk = index.chunks().next().unwrap();
    assert!(chunk.text.contains("boil water"));
    assert_eq!(chunk.metadata["page"], 0);
    assert!(chunk.source().unwrap().ends_with("manual.pdf"));
}

#[tokio::test]
async fn index_from_another_model_is_refused() {
    let project = Project::new();
    project.write("data/a.json", r#"{"a": 1}"#);
    IngestPipeline::new(&project.config, &HashEmbedder::named("model-a"))
        .run_full()
        .await
        .unwrap();

    let err = VectorIndex::load(&project.index_dir(), &HashEmbedder::named("model-b"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));

    // Incremental add must not mix embedding spaces either.
    project.write("docs/b.json", r#"{"b": 2}"#);
    let err = IngestPipeline::new(&project.config, &HashEmbedder::named("model-b"))
        .run_incremental(&["docs/b.json".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));
}

#[tokio::test]
async fn query_returns_closest_first_and_at_most_k() {
    let project = Project::new();
    project.write("data/water.json", r#"{"topic": "boil water purify kettle"}"#);
    project.write("data/fire.json", r#"{"topic": "start fire tinder kindling"}"#);
    project.write("data/food.json", r#"{"topic": "store grain dry cool"}"#);
    let embedder = HashEmbedder::new();
    IngestPipeline::new(&project.config, &embedder)
        .run_full()
        .await
        .unwrap();

    let index = VectorIndex::load(&project.index_dir(), &embedder).await.unwrap();
    let query = embedder.embed_query("how do I boil water").await.unwrap();

    let hits = index.query(&query, 2);
    assert_eq!(hits.len(), 2);
    assert!(hits[0].chunk.text.contains("boil water"));
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(index.query(&query, 10).len(), 3);
}

#[tokio::test]
async fn state_reports_preconditions_distinctly() {
    let project = Project::new();

    let no_creds = project.state(None);
    assert!(matches!(
        no_creds.readiness().await,
        Err(NotReadyReason::MissingCredentials { .. })
    ));

    let state = project.state(Some(Arc::new(ScriptedModel::replying("ok"))));
    assert!(matches!(
        state.readiness().await,
        Err(NotReadyReason::MissingIndex { .. })
    ));

    std::fs::create_dir_all(project.index_dir()).unwrap();
    std::fs::write(project.index_dir().join("index.sqlite"), b"garbage").unwrap();
    state.initialize().await;
    assert!(matches!(
        state.readiness().await,
        Err(NotReadyReason::LoadFailed(_))
    ));
}

#[tokio::test]
async fn ingest_through_state_publishes_new_chain() {
    let project = Project::new();
    project.write("data/water.json", r#"{"advice": "boil water for one minute"}"#);
    let model = Arc::new(ScriptedModel::replying("Boil it for one minute."));
    let state = project.state(Some(model.clone()));

    state.initialize().await;
    let err = state.answer("how long to boil water?").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady(NotReadyReason::MissingIndex { .. })));
    assert_eq!(model.calls(), 0);

    state.ingest(IngestRequest::full()).await.unwrap();
    assert!(state.readiness().await.is_ok());

    let answer = state.answer("how long to boil water?").await.unwrap();
    assert_eq!(answer, "Boil it for one minute.");
    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].contains("boil water for one minute"));
    assert!(prompts[0].contains("how long to boil water?"));
}

#[tokio::test]
async fn blank_question_rejected_before_any_work() {
    let project = Project::new();
    let model = Arc::new(ScriptedModel::replying("unused"));
    let state = project.state(Some(model.clone()));

    let err = state.answer("   ").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn generation_failure_carries_cause() {
    let project = Project::new();
    project.write("data/a.json", r#"{"a": "alpha"}"#);
    let model = Arc::new(ScriptedModel::failing("upstream returned 502"));
    let state = project.state(Some(model.clone()));
    state.ingest(IngestRequest::full()).await.unwrap();

    let err = state.answer("alpha?").await.unwrap_err();
    assert!(matches!(err, RagError::GenerationFailed(ref m) if m.contains("upstream returned 502")));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn stalled_embedding_times_out_without_writing() {
    let mut project = Project::new();
    project.config.ingest.timeout_secs = 1;
    project.write("data/a.html", html_page("alpha", 2));

    let embedder = StalledEmbedder::new(Duration::from_secs(30));
    let mut pipeline = IngestPipeline::new(&project.config, &embedder);
    let started = Instant::now();
    let err = pipeline.run(IngestRequest::full()).await.unwrap_err();

    assert!(matches!(err, RagError::Timeout { .. }), "got {:?}", err);
    assert_eq!(pipeline.stage(), IngestStage::Failed);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!project.index_dir().exists());
}

#[tokio::test]
async fn stalled_incremental_ingest_leaves_existing_index() {
    let mut project = Project::new();
    project.write("data/a.json", r#"{"a": "alpha"}"#);
    IngestPipeline::new(&project.config, &HashEmbedder::new())
        .run_full()
        .await
        .unwrap();
    let before = index_len(&project).await;

    project.config.ingest.timeout_secs = 1;
    project.write("data/b.json", r#"{"b": "beta"}"#);
    let embedder = StalledEmbedder::new(Duration::from_secs(30));
    let err = IngestPipeline::new(&project.config, &embedder)
        .run_incremental(&["data/b.json".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Timeout { .. }), "got {:?}", err);
    assert_eq!(index_len(&project).await, before);
}
