//! Router-level tests: token gate, normalization, rate limiting, dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use danmu_api::{create_router, AppState};
use danmu_core::config::{ConfigRegistry, Settings};
use danmu_core::models::{Danmaku, MediaType};
use danmu_core::source::{RawAnime, RawEpisode, Source, SourceRegistry};
use danmu_core::{Catalog, Orchestrator, Result, StorageService};

struct StubSource;

#[async_trait]
impl Source for StubSource {
    fn name(&self) -> &'static str {
        "tencent"
    }

    async fn search(&self, _keyword: &str) -> Result<Vec<RawAnime>> {
        let mut raw = RawAnime::new("tencent", "cover/abc", "Arcane");
        raw.year = Some(2021);
        raw.media_type = MediaType::Drama;
        Ok(vec![raw])
    }

    async fn episodes(&self, _anime: &RawAnime) -> Result<Vec<RawEpisode>> {
        Ok(vec![
            RawEpisode {
                url: "https://v.stub.test/e1".into(),
                title: "第1集".into(),
                air_date: None,
            },
            RawEpisode {
                url: "https://v.stub.test/e2".into(),
                title: "第2集".into(),
                air_date: None,
            },
        ])
    }

    async fn comments(&self, _url: &str) -> Result<Vec<Danmaku>> {
        Ok(vec![
            Danmaku::scrolling(1.0, "first"),
            Danmaku::scrolling(2.0, "second"),
        ])
    }

    fn matches_host(&self, host: &str) -> bool {
        host.ends_with("stub.test")
    }
}

fn app_with(mutate: impl FnOnce(&mut Settings)) -> (axum::Router, AppState) {
    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(StubSource));

    let mut settings = Settings::default();
    settings.source_order = vec!["tencent".into()];
    mutate(&mut settings);

    let catalog = Arc::new(Catalog::new());
    let config = Arc::new(ConfigRegistry::new(settings, HashMap::new()));
    let storage = Arc::new(StorageService::new(catalog.clone(), config.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(registry),
        catalog,
        config,
        storage,
    ));
    let state = AppState::new(orchestrator);
    (create_router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn test_banner_route() {
    let (app, _) = app_with(|_| {});
    let response = app.oneshot(get("/")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "danmu-proxy");
}

#[tokio::test]
async fn test_search_anime_envelope() {
    let (app, _) = app_with(|_| {});
    let response = app
        .oneshot(get("/api/v2/search/anime?keyword=Arcane"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["errorCode"], 0);
    assert_eq!(body["success"], true);
    assert_eq!(body["animes"][0]["animeTitle"], "Arcane(2021)【drama】from tencent");
    assert_eq!(
        body["animes"][0]["animeId"],
        danmu_core::models::ascii_sum("cover/abc")
    );
}

#[tokio::test]
async fn test_missing_keyword_is_400() {
    let (app, _) = app_with(|_| {});
    let response = app
        .oneshot(get("/api/v2/search/anime"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_custom_token_gate() {
    let (app, _) = app_with(|s| s.token = "sekrit".into());
    let denied = app
        .clone()
        .oneshot(get("/api/v2/search/anime?keyword=Arcane"))
        .await
        .expect("response");
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(denied).await;
    assert_eq!(body["errorCode"], 401);
    assert_eq!(body["success"], false);

    let allowed = app
        .oneshot(get("/sekrit/api/v2/search/anime?keyword=Arcane"))
        .await
        .expect("response");
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_default_token_prefix_is_optional() {
    let (app, _) = app_with(|_| {});
    let with_prefix = app
        .clone()
        .oneshot(get("/87654321/api/v2/search/anime?keyword=Arcane"))
        .await
        .expect("response");
    assert_eq!(with_prefix.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_repeated_prefix_collapses() {
    let (app, _) = app_with(|_| {});
    let response = app
        .oneshot(get("/api/v2/api/v2/search/anime?keyword=Arcane"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_comment_unknown_id_is_404() {
    let (app, _) = app_with(|_| {});
    let response = app
        .oneshot(get("/api/v2/comment/99999"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_by_url_json() {
    let (app, _) = app_with(|_| {});
    let response = app
        .oneshot(get("/api/v2/comment?url=https://v.stub.test/e1&format=json"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["comments"][0]["cid"], 1);
    assert_eq!(body["comments"][0]["m"], "first");
}

#[tokio::test]
async fn test_comment_xml_format() {
    let (app, _) = app_with(|_| {});
    let response = app
        .oneshot(get("/api/v2/comment?url=https://v.stub.test/e1&format=xml"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.starts_with("text/xml"));

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let xml = String::from_utf8_lossy(&bytes);
    assert!(xml.contains("<i>"));
    assert!(xml.contains("first"));
}

#[tokio::test]
async fn test_rate_limit_exactly_two_rejections() {
    let (app, _) = app_with(|s| s.rate_limit_max_requests = 3);

    let mut rejected = 0;
    for _ in 0..5 {
        let request = Request::builder()
            .uri("/api/v2/comment?url=https://v.stub.test/e1")
            .header("X-Forwarded-For", "203.0.113.7")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 2);
}

#[tokio::test]
async fn test_rate_limit_only_applies_to_comments() {
    let (app, _) = app_with(|s| s.rate_limit_max_requests = 1);
    for _ in 0..4 {
        let request = Request::builder()
            .uri("/api/v2/search/anime?keyword=Arcane")
            .header("X-Forwarded-For", "203.0.113.8")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_match_endpoint() {
    let (app, _) = app_with(|_| {});
    let request = Request::builder()
        .method("POST")
        .uri("/api/v2/match")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"fileName":"Arcane.S01E02.1080p.WEB.mkv"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["isMatched"], true);
    assert_eq!(body["matches"][0]["episodeTitle"], "【tencent】第2集");
}

#[tokio::test]
async fn test_bangumi_route() {
    let (app, state) = app_with(|_| {});
    // Populate the catalog through a search first.
    let warmup = app
        .clone()
        .oneshot(get("/api/v2/search/anime?keyword=Arcane"))
        .await
        .expect("response");
    assert_eq!(warmup.status(), StatusCode::OK);

    let anime_id = danmu_core::models::ascii_sum("cover/abc");
    let response = app
        .oneshot(get(&format!("/api/v2/bangumi/{anime_id}")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["bangumi"]["animeId"], anime_id);
    assert_eq!(body["bangumi"]["episodes"].as_array().map(Vec::len), Some(2));
    assert!(state.orchestrator.catalog().anime_count() >= 1);
}

#[tokio::test]
async fn test_config_patch_applies() {
    let (app, state) = app_with(|_| {});
    let request = Request::builder()
        .method("PUT")
        .uri("/api/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"DANMU_LIMIT": 250}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.orchestrator.config().settings().danmu_limit, 250);
}
