//! HTTP providers against a mock server.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use broll::acquisition::providers::{
    GiphyProvider, NasaProvider, PexelsProvider, PixabayProvider, UnsplashProvider,
};
use broll::acquisition::{ProviderEndpoint, ProviderError, ProviderRegistry, SearchProvider, Source};
use broll::utils::http_client::build_client;

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(5)).unwrap()
}

fn endpoint(server: &MockServer, prefix: &str, key: Option<&str>) -> ProviderEndpoint {
    ProviderEndpoint {
        base_url: Some(format!("{}{}", server.uri(), prefix)),
        api_key: key.map(str::to_string),
    }
}

#[tokio::test]
async fn test_nasa_first_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "apollo 11"))
        .and(query_param("media_type", "image,video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collection": {
                "items": [
                    {"links": [{"href": "https://images-assets.nasa.gov/apollo.jpg"}]},
                    {"links": [{"href": "https://images-assets.nasa.gov/other.jpg"}]}
                ]
            }
        })))
        .mount(&server)
        .await;

    let provider = NasaProvider::new(client(), endpoint(&server, "", None));
    let url = provider.search("apollo 11").await.unwrap();
    assert_eq!(url.as_deref(), Some("https://images-assets.nasa.gov/apollo.jpg"));
}

#[tokio::test]
async fn test_nasa_empty_collection_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"collection": {"items": []}})))
        .mount(&server)
        .await;

    let provider = NasaProvider::new(client(), endpoint(&server, "", None));
    assert_eq!(provider.search("nothing").await.unwrap(), None);
}

#[tokio::test]
async fn test_pixabay_prefers_image_then_video() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(query_param("key", "pb-key"))
        .and(query_param("q", "forest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{"largeImageURL": "https://pixabay.test/forest.jpg"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(query_param("q", "waterfall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{"videos": {"medium": {"url": "https://pixabay.test/falls.mp4"}}}]
        })))
        .mount(&server)
        .await;

    let provider = PixabayProvider::new(client(), endpoint(&server, "/api", Some("pb-key")));
    assert_eq!(
        provider.search("forest").await.unwrap().as_deref(),
        Some("https://pixabay.test/forest.jpg")
    );
    assert_eq!(
        provider.search("waterfall").await.unwrap().as_deref(),
        Some("https://pixabay.test/falls.mp4")
    );
}

#[tokio::test]
async fn test_pexels_sends_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("Authorization", "px-key"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": [{"src": {"large": "https://pexels.test/city.jpeg"}}]
        })))
        .mount(&server)
        .await;

    let provider = PexelsProvider::new(client(), endpoint(&server, "/v1", Some("px-key")));
    assert_eq!(
        provider.search("city").await.unwrap().as_deref(),
        Some("https://pexels.test/city.jpeg")
    );
}

#[tokio::test]
async fn test_unsplash_and_giphy_parse_first_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/photos"))
        .and(query_param("client_id", "un-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"urls": {"regular": "https://unsplash.test/sea.jpg"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/gifs/search"))
        .and(query_param("api_key", "gf-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"images": {"original": {"url": "https://giphy.test/cat.gif"}}}]
        })))
        .mount(&server)
        .await;

    let unsplash = UnsplashProvider::new(client(), endpoint(&server, "", Some("un-key")));
    assert_eq!(
        unsplash.search("sea").await.unwrap().as_deref(),
        Some("https://unsplash.test/sea.jpg")
    );

    let giphy = GiphyProvider::new(client(), endpoint(&server, "/v1", Some("gf-key")));
    assert_eq!(
        giphy.search("cat").await.unwrap().as_deref(),
        Some("https://giphy.test/cat.gif")
    );
}

#[tokio::test]
async fn test_failures_are_typed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down/search"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbled/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let down = NasaProvider::new(client(), endpoint(&server, "/down", None));
    assert!(matches!(
        down.search("x").await,
        Err(ProviderError::Status { status: 502, ref body }) if body == "bad gateway"
    ));

    let garbled = NasaProvider::new(client(), endpoint(&server, "/garbled", None));
    assert!(matches!(garbled.search("x").await, Err(ProviderError::Malformed(_))));

    let keyless = PexelsProvider::new(client(), endpoint(&server, "", None));
    assert!(matches!(
        keyless.search("x").await,
        Err(ProviderError::MissingCredential {
            provider: Source::Pexels,
            ..
        })
    ));
    // The credential check happens before any request.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_registry_uses_configured_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nasa/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collection": {"items": [{"links": [{"href": "https://nasa.test/a.jpg"}]}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut endpoints = HashMap::new();
    endpoints.insert(Source::Nasa, endpoint(&server, "/nasa", None));
    let registry = ProviderRegistry::with_defaults(&client(), &endpoints);

    let nasa = registry.get(Source::Nasa).unwrap();
    assert_eq!(
        nasa.search("moon").await.unwrap().as_deref(),
        Some("https://nasa.test/a.jpg")
    );
}
