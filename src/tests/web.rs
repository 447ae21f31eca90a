use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::records::{Category, RecordStore};
use crate::semantic::{CategoryCorpus, SemanticSearchService, VectorIndex};
use crate::tests::fixtures::{record, ScriptedIndex, StaticEncoder};
use crate::web::{router, SearchResponse};

/// Incidents hold the two-record store; the vector stage always proposes row 0.
fn app() -> Router {
    let service = SemanticSearchService::new(Arc::new(StaticEncoder), 3, 100);

    let store = RecordStore::new(vec![
        record("1", "Payment error", "cuota failed", Some("INC-1")),
        record("2", "Login bug", "", Some("INC-2")),
    ]);
    service
        .install(CategoryCorpus::new(Category::Incidents, store, ScriptedIndex::rows(&[0])))
        .unwrap();

    router(Arc::new(service))
}

/// Incidents served from a real flat index with one row per record.
fn vector_app() -> Router {
    let service = SemanticSearchService::new(Arc::new(StaticEncoder), 3, 100);

    let store = RecordStore::new(vec![
        record("1", "Payment error", "cuota failed", Some("INC-1")),
        record("2", "Login bug", "", Some("INC-2")),
    ]);
    let mut index = VectorIndex::new(3);
    index.push(vec![0.0, 0.0, 0.0]).unwrap();
    index.push(vec![0.0, 1.0, 0.0]).unwrap();
    service
        .install(CategoryCorpus::new(Category::Incidents, store, index))
        .unwrap();

    router(Arc::new(service))
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn matches(body: serde_json::Value) -> Vec<String> {
    let response: SearchResponse = serde_json::from_value(body).unwrap();
    response.best_matches.into_iter().map(|r| r.id).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vector_candidate_matches() {
    let (status, body) = get(app(), "/search_incident?query=cuota").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "cuota");
    assert_eq!(body["best_matches"][0]["número del incidente"], "INC-1");
    assert_eq!(matches(body), vec!["1"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_falls_back_to_full_scan() {
    let (status, body) = get(app(), "/search_incident?query=INC-2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(matches(body), vec!["2"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_is_echoed_verbatim() {
    let (_, body) = get(app(), "/search_incident?query=%20%20CUOTA%20").await;

    assert_eq!(body["query"], "  CUOTA ");
    assert_eq!(matches(body), vec!["1"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_query_is_bad_request() {
    let (status, body) = get(app(), "/search_incident?query=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = get(app(), "/search_incident").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_num_results_bounds() {
    let (_, body) = get(app(), "/search_incident?query=inc&num_results=1").await;
    assert_eq!(matches(body).len(), 1);

    let (status, body) = get(app(), "/search_incident?query=inc&num_results=-5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches(body).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_huge_num_results() {
    for n in ["10000000000", "9223372036854775807"] {
        let uri = format!("/search_incident?query=cuota&num_results={n}");
        let (status, body) = get(vector_app(), &uri).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(matches(body), vec!["1"]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_num_results_is_json_bad_request() {
    for n in ["abc", "1.5", "99999999999999999999"] {
        let uri = format!("/search_incident?query=cuota&num_results={n}");
        let (status, body) = get(app(), &uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid query parameters"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_categories_are_independent() {
    let (status, body) = get(app(), "/search_postmortem?query=cuota").await;

    assert_eq!(status, StatusCode::OK);
    assert!(matches(body).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_category_stats() {
    let (status, body) = get(app(), "/api/categories").await;

    assert_eq!(status, StatusCode::OK);
    let stats = body.as_array().unwrap();
    assert_eq!(stats.len(), 4);
    assert_eq!(stats[0]["category"], "incidents");
    assert_eq!(stats[0]["endpoint"], "/search_incident");
    assert_eq!(stats[0]["records"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reload_without_artifacts_is_server_error() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_page() {
    let response = app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("/search_incident"));
}
