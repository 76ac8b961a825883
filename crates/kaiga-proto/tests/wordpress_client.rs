use std::time::Duration;

use kaiga_proto::content::{author_name, featured_image};
use kaiga_proto::wordpress::{ContentError, WordPressClient};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn post_json(id: u64, slug: &str) -> serde_json::Value {
    json!({
        "id": id,
        "date": "2024-03-01T08:00:00",
        "slug": slug,
        "title": { "rendered": format!("Post {}", id) },
        "content": { "rendered": "<p>Body</p>" },
        "excerpt": { "rendered": "<p>Teaser</p>" },
        "featured_media": 0,
        "categories": [4],
        "author": 1,
        "link": format!("https://kaiga.online/{}", slug),
        "_embedded": {
            "author": [{ "name": "Desk" }]
        }
    })
}

async fn client_for(server: &MockServer) -> WordPressClient {
    WordPressClient::new(format!("{}/wp-json/wp/v2/", server.uri()), Duration::from_secs(5))
        .unwrap()
}

#[tokio::test]
async fn test_fetch_posts_sends_paging_and_embed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "10"))
        .and(query_param("_embed", "true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([post_json(1, "a"), post_json(2, "b")])),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let posts = client.fetch_posts(2, 10).await.unwrap();

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1].slug, "b");
    assert_eq!(author_name(&posts[0]), "Desk");
    assert_eq!(featured_image(&posts[0]), None);
}

#[tokio::test]
async fn test_fetch_posts_by_category() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("categories", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(9, "tech")])))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let posts = client.fetch_posts_by_category(4, 1, 10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].categories, vec![4]);
}

#[tokio::test]
async fn test_fetch_post_by_slug_missing_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("slug", "found"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(3, "found")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("slug", "gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let found = client.fetch_post_by_slug("found").await.unwrap();
    assert_eq!(found.map(|p| p.id), Some(3));
    assert!(client.fetch_post_by_slug("gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_uses_fixed_page_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("search", "music"))
        .and(query_param("per_page", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(5, "m")])))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let posts = client.search_posts("music", 1).await.unwrap();
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn test_fetch_categories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/categories"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 2, "name": "News", "slug": "news", "description": "" },
            { "id": 5, "name": "Tech", "slug": "tech" }
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let categories = client.fetch_categories().await.unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1].description, "");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    match client.fetch_posts(1, 10).await {
        Err(ContentError::Status(status)) => assert_eq!(status.as_u16(), 500),
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(matches!(
        client.fetch_posts(1, 10).await,
        Err(ContentError::Decode(_))
    ));
}
