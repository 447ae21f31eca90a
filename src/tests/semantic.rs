//! Integration tests against the real embedding model.
//!
//! These tests require model download and are marked #[ignore] by default.
//! Run with: cargo test -- --ignored

use std::sync::Arc;

use crate::records::{Category, RecordStore};
use crate::semantic::{
    preprocess_content, store_fingerprint, CategoryCorpus, CorpusSource, EmbeddingModel,
    NearestNeighbors, QueryEncoder, SemanticSearchService, VectorIndex, VectorStorage,
};
use crate::tests::fixtures::record;

fn incidents() -> RecordStore {
    RecordStore::new(vec![
        record("1", "Error en cuota", "El cálculo de la cuota mensual falla", Some("INC-1")),
        record("2", "Pagaré rechazado", "El pagaré digital no se firma", Some("INC-2")),
        record("3", "Login lento", "Los usuarios esperan 30s al iniciar sesión", Some("INC-3")),
    ])
}

/// Embed → save → load → search, through the same path the daemon uses.
#[test]
#[ignore = "requires model download (~23MB)"]
fn test_embedding_storage_search_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let model = EmbeddingModel::new("all-MiniLM-L6-v2", tmp.path().to_path_buf())
        .expect("Failed to initialize embedding model");
    assert_eq!(model.dimensions(), 384);

    let store = incidents();
    let texts: Vec<String> = store.iter().filter_map(preprocess_content).collect();
    let mut index = VectorIndex::new(model.dimensions());
    for embedding in model.embed_batch(&texts).unwrap() {
        index.push(embedding).unwrap();
    }

    // the nearest row to a record's own text is that record
    let query = model.embed(&texts[1]).unwrap();
    assert_eq!(index.search(&query, 1).unwrap(), vec![Some(1)]);

    std::fs::write(
        tmp.path().join(Category::Incidents.records_file()),
        serde_json::to_vec(store.records()).unwrap(),
    )
    .unwrap();
    VectorStorage::new(tmp.path().join(Category::Incidents.vectors_file()))
        .save(&index, &model.model_id_hash(), &store_fingerprint(&store))
        .unwrap();

    let source = CorpusSource::new(tmp.path(), model.model_id_hash(), model.dimensions());
    let corpus = CategoryCorpus::load(Category::Incidents, &source).unwrap();
    assert_eq!(corpus.len(), 3);

    let service = SemanticSearchService::load(Arc::new(model), source, 100).unwrap();

    let hits = service.search(Category::Incidents, "pagaré", None).unwrap();
    assert_eq!(hits[0].id, "2");

    let hits = service.search(Category::Incidents, "INC-3", None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "3");
}

#[test]
#[ignore = "requires model download (~23MB)"]
fn test_vectors_from_other_model_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let model = EmbeddingModel::new("all-MiniLM-L6-v2", tmp.path().to_path_buf()).unwrap();

    let store = incidents();
    let mut index = VectorIndex::new(model.dimensions());
    for text in store.iter().filter_map(preprocess_content) {
        index.push(model.embed(&text).unwrap()).unwrap();
    }

    std::fs::write(
        tmp.path().join(Category::Incidents.records_file()),
        serde_json::to_vec(store.records()).unwrap(),
    )
    .unwrap();
    VectorStorage::new(tmp.path().join(Category::Incidents.vectors_file()))
        .save(&index, &crate::semantic::model_id_hash("bge-small-en-v1.5"), &store_fingerprint(&store))
        .unwrap();

    let source = CorpusSource::new(tmp.path(), model.model_id_hash(), model.dimensions());
    assert!(CategoryCorpus::load(Category::Incidents, &source).is_err());
}
