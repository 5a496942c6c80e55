mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn upload_list_query_delete() {
    let app = spawn_app(false).await;
    let token = app.register("alice@example.com", "pw12345").await;

    let (status, body) = app
        .upload(&token, "rust.md", "Rust ownership rules keep memory safe without a garbage collector.")
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["filename"], "rust.md");

    let (status, files) = app.get_authed("/files", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(files["total_files"], 1);
    assert_eq!(files["files"][0]["filename"], "rust.md");

    let (status, answer) = app.get_authed("/query?query=ownership%20memory&top_k=3", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["query"], "ownership memory");
    assert_eq!(answer["sources"][0]["metadata"]["filename"], "rust.md");
    assert!(answer["response"].as_str().unwrap().contains("ownership"));

    let (status, _) = app
        .send(
            Request::delete("/files/rust.md")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, files) = app.get_authed("/files", &token).await;
    assert_eq!(files["total_files"], 0);
}

#[tokio::test]
async fn chat_answers_from_uploaded_documents() {
    let app = spawn_app(false).await;
    let token = app.register("alice@example.com", "pw12345").await;
    app.upload(&token, "pets.txt", "The cat is called Miso and sleeps all day.")
        .await;

    let (status, reply) = app
        .send(
            Request::post("/chat")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "message": "what is the cat called?",
                        "chat_history": [{ "role": "user", "content": "hello" }]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply["response"].as_str().unwrap().contains("Miso"));
    assert_eq!(reply["sources"][0]["metadata"]["filename"], "pets.txt");
}

#[tokio::test]
async fn users_only_see_their_own_files() {
    let app = spawn_app(false).await;
    let alice = app.register("alice@example.com", "pw12345").await;
    let bob = app.register("bob@example.com", "pw12345").await;

    app.upload(&alice, "secret.txt", "alice private notes").await;

    let (_, bob_files) = app.get_authed("/files", &bob).await;
    assert_eq!(bob_files["total_files"], 0);

    let (_, bob_answer) = app.get_authed("/query?query=private", &bob).await;
    assert_eq!(bob_answer["sources"].as_array().unwrap().len(), 0);

    let (status, _) = app
        .send(
            Request::delete("/files/secret.txt")
                .header(header::AUTHORIZATION, format!("Bearer {bob}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, alice_files) = app.get_authed("/files", &alice).await;
    assert_eq!(alice_files["total_files"], 1);
}

#[tokio::test]
async fn unsupported_upload_is_rejected() {
    let app = spawn_app(false).await;
    let token = app.register("alice@example.com", "pw12345").await;

    let (status, body) = app.upload(&token, "tool.exe", "MZ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Unsupported file type for extraction.");

    let (_, files) = app.get_authed("/files", &token).await;
    assert_eq!(files["total_files"], 0);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let app = spawn_app(false).await;
    let token = app.register("alice@example.com", "pw12345").await;
    let (status, _) = app.get_authed("/query?query=%20", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
