//! Tests for the Unsplash and Tenor subject resolvers, against wiremock.

use kitten::KittenError;
use kitten::providers::{SubjectResolver, TenorClient, UnsplashClient};
use kitten::types::SubjectMetadata;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Unsplash
// ============================================================================

fn photo(server: &MockServer) -> serde_json::Value {
    json!({
        "id": "abc123",
        "urls": {"raw": "https://images.unsplash.com/photo-abc"},
        "links": {
            "html": "https://unsplash.com/photos/abc123",
            "download_location": format!("{}/photos/abc123/download", server.uri())
        },
        "user": {
            "name": "Ada",
            "links": {"html": "https://unsplash.com/@ada"}
        }
    })
}

#[tokio::test]
async fn unsplash_resolves_photo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/abc123"))
        .and(header("Authorization", "Client-ID test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(photo(&server)))
        .expect(1)
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("test-key", server.uri()).unwrap();
    let subject = client.resolve("abc123").await.unwrap();

    assert_eq!(subject.id, "abc123");
    assert_eq!(
        subject.source_url,
        "https://images.unsplash.com/photo-abc?fm=jpeg&w=800&fit=clip"
    );
    assert_eq!(subject.author.as_deref(), Some("Ada"));
    assert_eq!(
        subject.author_url.as_deref(),
        Some("https://unsplash.com/@ada?utm_source=kitten&utm_medium=referral")
    );
    assert_eq!(client.name(), "unsplash");
}

#[tokio::test]
async fn unsplash_missing_photo_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let err = client.resolve("nope").await.unwrap_err();
    assert!(matches!(err, KittenError::NotFound(_)));
}

#[tokio::test]
async fn unsplash_rate_limit_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/a"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Rate Limit Exceeded"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/photos/b"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Rate Limit Exceeded"))
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    for id in ["a", "b"] {
        let err = client.resolve(id).await.unwrap_err();
        assert!(matches!(err, KittenError::RateLimited { .. }), "{id}: {err}");
    }
}

#[tokio::test]
async fn unsplash_other_errors_are_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let err = client.resolve("x").await.unwrap_err();
    assert!(matches!(err, KittenError::Api { status: 502, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn unsplash_notifies_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/abc123/download"))
        .and(header("Authorization", "Client-ID k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "x"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let subject = SubjectMetadata::new("abc123", "https://images.example.com/a")
        .with_notify_url(format!("{}/photos/abc123/download", server.uri()));
    client.notify_used(&subject, Some("cats")).await.unwrap();
}

#[tokio::test]
async fn unsplash_without_notify_url_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let subject = SubjectMetadata::new("abc123", "https://images.example.com/a");
    client.notify_used(&subject, None).await.unwrap();
}

#[tokio::test]
async fn unsplash_search_picks_random_landscape_photo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/random"))
        .and(query_param("query", "grumpy cat"))
        .and(query_param("orientation", "landscape"))
        .and(header("Authorization", "Client-ID k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(photo(&server)))
        .expect(1)
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let hit = client.search("grumpy cat", None).await.unwrap();

    assert_eq!(hit.subject.id, "abc123");
    assert_eq!(
        hit.subject.source_url,
        "https://images.unsplash.com/photo-abc?fm=jpeg&w=800&fit=clip"
    );
    assert_eq!(hit.next, None);
}

#[tokio::test]
async fn unsplash_search_without_matches_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/random"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let err = client.search("zzzz", None).await.unwrap_err();
    assert!(matches!(err, KittenError::NotFound(_)));
}

#[tokio::test]
async fn unsplash_search_rate_limit_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/random"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Rate Limit Exceeded"))
        .mount(&server)
        .await;

    let client = UnsplashClient::with_base_url("k", server.uri()).unwrap();
    let err = client.search("cats", None).await.unwrap_err();
    assert!(matches!(err, KittenError::RateLimited { .. }));
}

// ============================================================================
// Tenor
// ============================================================================

#[tokio::test]
async fn tenor_resolves_gif() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/posts"))
        .and(query_param("key", "api"))
        .and(query_param("client_key", "client"))
        .and(query_param("ids", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "42",
                "url": "https://tenor.com/view/42",
                "media_formats": {
                    "tinygif": {"url": "https://media.tenor.com/tiny.gif"},
                    "gif": {"url": "https://media.tenor.com/full.gif"}
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let subject = client.resolve("42").await.unwrap();
    assert_eq!(subject.source_url, "https://media.tenor.com/full.gif");
    assert_eq!(subject.page_url.as_deref(), Some("https://tenor.com/view/42"));
}

#[tokio::test]
async fn tenor_falls_back_to_smaller_renditions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "42",
                "media_formats": {"tinygif": {"url": "https://media.tenor.com/tiny.gif"}}
            }]
        })))
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let subject = client.resolve("42").await.unwrap();
    assert_eq!(subject.source_url, "https://media.tenor.com/tiny.gif");
}

#[tokio::test]
async fn tenor_empty_results_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let err = client.resolve("missing").await.unwrap_err();
    assert!(matches!(err, KittenError::NotFound(_)));
}

#[tokio::test]
async fn tenor_registers_shares_with_search_term() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/registershare"))
        .and(query_param("id", "42"))
        .and(query_param("q", "happy cat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let subject = SubjectMetadata::new("42", "https://media.tenor.com/full.gif");
    client.notify_used(&subject, Some("happy cat")).await.unwrap();
}

#[tokio::test]
async fn tenor_rate_limit_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let err = client.resolve("42").await.unwrap_err();
    assert_eq!(err.status_code(), 429);
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(3)));
}

fn search_page(id: &str, next: &str) -> serde_json::Value {
    json!({
        "results": [{
            "id": id,
            "url": format!("https://tenor.com/view/{id}"),
            "media_formats": {"gif": {"url": format!("https://media.tenor.com/{id}.gif")}}
        }],
        "next": next
    })
}

#[tokio::test]
async fn tenor_search_pages_with_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "party"))
        .and(query_param("limit", "1"))
        .and(query_param("key", "api"))
        .and(query_param("client_key", "client"))
        .and(query_param_is_missing("pos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("1", "cursor-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "party"))
        .and(query_param("pos", "cursor-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("2", "")))
        .expect(1)
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let first = client.search("party", None).await.unwrap();
    assert_eq!(first.subject.id, "1");
    assert_eq!(first.subject.source_url, "https://media.tenor.com/1.gif");
    assert_eq!(first.next.as_deref(), Some("cursor-1"));

    let last = client.search("party", first.next.as_deref()).await.unwrap();
    assert_eq!(last.subject.id, "2");
    assert_eq!(last.next, None);
}

#[tokio::test]
async fn tenor_search_without_results_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "next": ""})))
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let err = client.search("nothing", None).await.unwrap_err();
    assert!(matches!(err, KittenError::NotFound(_)));
}

#[tokio::test]
async fn tenor_search_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let client = TenorClient::with_base_url("api", "client", server.uri()).unwrap();
    let err = client.search("cats", None).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(12)));
}
