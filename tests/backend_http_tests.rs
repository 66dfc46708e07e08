//! Collaborator client tests against wiremock doubles of the hosted backend
//! and the generative-language API.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cicentre::backend::{AuthEvent, AuthService, ContentClient, HttpAuthClient, ListQuery, SignOutScope, StorageClient};
use cicentre::backend::AdminDirectory;
use cicentre::chat::{ChatClient, ChatSettings};
use cicentre::error::AppError;
use cicentre::records::{Article, BlogPost, NewBlogPost, TABLE_BLOG_POSTS, TABLE_CLIMATE_CONTENT};

fn auth_client(server: &MockServer, dir: &tempfile::TempDir) -> HttpAuthClient {
    HttpAuthClient::new(&server.uri(), "anon-key", &dir.path().join("session.json")).unwrap()
}

fn token_body() -> serde_json::Value {
    json!({
        "access_token": "jwt-abc",
        "token_type": "bearer",
        "refresh_token": "refresh-xyz",
        "expires_at": 1_900_000_000i64,
        "user": { "id": "u-admin", "email": "admin@example.com" }
    })
}

#[tokio::test]
async fn password_sign_in_persists_session_and_emits_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = auth_client(&server, &dir);
    let mut rx = client.subscribe();

    let session = client.sign_in_with_password("admin@example.com", "secret1").await.unwrap();
    assert_eq!(session.user.id, "u-admin");
    assert_eq!(session.access_token, "jwt-abc");
    assert!(dir.path().join("session.json").exists(), "session must be persisted locally");

    match rx.recv().await.unwrap() {
        AuthEvent::SignedIn(s) => assert_eq!(s.user.email, "admin@example.com"),
        other => panic!("expected SignedIn, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_credentials_map_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant", "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = auth_client(&server, &dir);
    let err = client.sign_in_with_password("admin@example.com", "nope").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));
    assert_eq!(err.code_str(), "invalid_credentials");
    assert!(!dir.path().join("session.json").exists());
}

#[tokio::test]
async fn restore_validates_the_persisted_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("Authorization", "Bearer jwt-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-admin", "email": "admin@example.com"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = auth_client(&server, &dir);
    client.sign_in_with_password("admin@example.com", "secret1").await.unwrap();

    let restored = client.current_session().await.unwrap().expect("session restored");
    assert_eq!(restored.user.id, "u-admin");
}

#[tokio::test]
async fn expired_persisted_session_restores_as_absent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = auth_client(&server, &dir);
    client.sign_in_with_password("admin@example.com", "secret1").await.unwrap();

    assert!(client.current_session().await.unwrap().is_none());
    assert!(!dir.path().join("session.json").exists(), "stale cache must be dropped");
}

#[tokio::test]
async fn sign_out_clears_cache_and_emits_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(query_param("scope", "global"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = auth_client(&server, &dir);
    client.sign_in_with_password("admin@example.com", "secret1").await.unwrap();
    let mut rx = client.subscribe();

    client.sign_out(SignOutScope::Global).await.unwrap();
    assert!(!dir.path().join("session.json").exists());
    assert!(matches!(rx.recv().await.unwrap(), AuthEvent::SignedOut));
}

#[tokio::test]
async fn list_builds_filter_and_order_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/climate_content"))
        .and(query_param("category", "eq.adaptation"))
        .and(query_param("order", "last_updated.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "c1",
                "title": "Early warning systems",
                "content": "Community flood alerts.",
                "category": "adaptation",
                "source_url": null,
                "created_at": "2026-04-01T10:00:00Z",
                "last_updated": "2026-04-20T10:00:00Z"
            }
        ])))
        .mount(&server)
        .await;

    let client = ContentClient::new(&server.uri(), "service-key").unwrap();
    let rows: Vec<Article> = client
        .list(
            TABLE_CLIMATE_CONTENT,
            &ListQuery::default().filter_eq("category", "adaptation").order_desc("last_updated"),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Early warning systems");
}

#[tokio::test]
async fn get_by_id_maps_empty_result_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/blog_posts"))
        .and(query_param("id", "eq.missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = ContentClient::new(&server.uri(), "service-key").unwrap();
    let err = client.get_by_id::<BlogPost>(TABLE_BLOG_POSTS, "missing").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn insert_requests_representation_and_returns_the_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/blog_posts"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {
                "id": "b1",
                "title": "Flood resilience in Accra",
                "content": "...",
                "author": "K. Mensah",
                "category": "adaptation",
                "image_url": null,
                "created_at": "2026-05-01T08:30:00Z",
                "updated_at": "2026-05-01T08:30:00Z"
            }
        ])))
        .mount(&server)
        .await;

    let client = ContentClient::new(&server.uri(), "service-key").unwrap();
    let new_post = NewBlogPost {
        title: "Flood resilience in Accra".into(),
        content: "...".into(),
        author: "K. Mensah".into(),
        category: "adaptation".into(),
        image_url: None,
    };
    let created: BlogPost = client.insert(TABLE_BLOG_POSTS, &new_post).await.unwrap();
    assert_eq!(created.id, "b1");
}

#[tokio::test]
async fn backend_server_errors_map_to_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/climate_content"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = ContentClient::new(&server.uri(), "service-key").unwrap();
    let err = client
        .list::<Article>(TABLE_CLIMATE_CONTENT, &ListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Network { .. }));
}

#[tokio::test]
async fn is_admin_user_rpc_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/is_admin_user"))
        .and(body_json(json!({ "user_id": "u-admin" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/is_admin_user"))
        .and(body_json(json!({ "user_id": "u-plain" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
        .mount(&server)
        .await;

    let client = ContentClient::new(&server.uri(), "service-key").unwrap();
    assert!(client.is_admin_user("u-admin").await.unwrap());
    assert!(!client.is_admin_user("u-plain").await.unwrap());
}

#[tokio::test]
async fn upload_returns_the_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/gallery/2026-flood.jpg"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "gallery/2026-flood.jpg" })))
        .mount(&server)
        .await;

    let client = StorageClient::new(&server.uri(), "service-key", "gallery").unwrap();
    let url = client.upload("2026-flood.jpg", b"jpeg-bytes".to_vec(), "image/jpeg").await.unwrap();
    assert_eq!(url, format!("{}/storage/v1/object/public/gallery/2026-flood.jpg", server.uri()));
}

#[tokio::test]
async fn chat_falls_through_to_the_next_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "k1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "k2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Ghana's NDCs cover 47 programmes." }] } }]
        })))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), "gemini-2.5-flash", vec!["k1".into(), "k2".into()]).unwrap();
    let reply = client.generate("What are Ghana's NDCs?", &ChatSettings::default()).await.unwrap();
    assert_eq!(reply, "Ghana's NDCs cover 47 programmes.");
}

#[tokio::test]
async fn chat_reports_the_last_error_when_all_keys_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), "gemini-2.5-flash", vec!["k1".into(), "k2".into()]).unwrap();
    let err = client.generate("hello", &ChatSettings::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Network { .. }));
}

#[tokio::test]
async fn chat_treats_unrecognized_shapes_as_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), "gemini-2.5-flash", vec!["k1".into()]).unwrap();
    let err = client.generate("hello", &ChatSettings::default()).await.unwrap_err();
    assert_eq!(err.code_str(), "unrecognized_response");
}
