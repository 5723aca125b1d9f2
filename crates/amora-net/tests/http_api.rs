use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use amora_net::{ApiError, ChatApi, HttpChatApi, MediaUpload};
use amora_shared::types::{MediaKind, MessageId, UserId};

async fn conversation(Path(target): Path<String>) -> Json<Value> {
    Json(json!({
        "participant": [
            {"_id": "me", "firstName": "Ada", "lastName": "L"},
            {"_id": target, "firstName": "Bo", "lastName": "K", "photoUrl": "https://cdn/bo.jpg"}
        ],
        "messages": [
            {"_id": "m1", "senderId": {"_id": "bo", "firstName": "Bo", "lastName": "K"},
             "message": "hello", "timestamp": "2024-05-01T10:00:00Z", "isRead": false}
        ]
    }))
}

async fn user(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"_id": id, "firstName": "Cy", "lastName": "D"}))
}

async fn upload(Path(target): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if target == "too-big" {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({"message": "File too large"})),
        );
    }
    assert_eq!(body["mediaType"], "image");
    assert_eq!(body["message"], "");
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "_id": "srv-1",
                "message": "",
                "mediaUrl": "https://cdn/stored.png",
                "mediaType": "image",
                "timestamp": "2024-05-01T10:02:00Z"
            }
        })),
    )
}

async fn inbox() -> Json<Value> {
    Json(json!({
        "data": [
            {"_id": "c1", "participant": [{"_id": "bo", "firstName": "Bo"}],
             "lastMessage": {"message": "see you", "timestamp": "2024-05-01T10:00:00Z"},
             "unreadCount": 12}
        ]
    }))
}

async fn start_backend() -> String {
    let app = Router::new()
        .route("/chat/:target", get(conversation))
        .route("/chat/media/:target", post(upload))
        .route("/users/:id", get(user))
        .route("/all", get(inbox));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn sample_upload() -> MediaUpload {
    MediaUpload {
        media_data: format!("data:image/png;base64,{}", "A".repeat(40_000)),
        media_type: MediaKind::Image,
        message: String::new(),
    }
}

#[tokio::test]
async fn test_fetch_conversation() {
    let api = HttpChatApi::new(start_backend().await, None).unwrap();
    let conversation = api.fetch_conversation(&UserId::new("bo")).await.unwrap();

    assert_eq!(conversation.participant.len(), 2);
    assert_eq!(conversation.participant[1].photo_url.as_deref(), Some("https://cdn/bo.jpg"));
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].id, MessageId::new("m1"));
}

#[tokio::test]
async fn test_fetch_user() {
    let api = HttpChatApi::new(start_backend().await, Some("token".into())).unwrap();
    let user = api.fetch_user(&UserId::new("cy")).await.unwrap();
    assert_eq!(user.display_name(), "Cy D");
}

#[tokio::test]
async fn test_upload_media_reports_progress() {
    let api = HttpChatApi::new(start_backend().await, None).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let stored = api
        .upload_media(&UserId::new("bo"), sample_upload(), Some(tx))
        .await
        .unwrap();
    assert_eq!(stored.id, MessageId::new("srv-1"));
    assert_eq!(stored.media_url, "https://cdn/stored.png");

    let mut last = None;
    while let Ok(p) = rx.try_recv() {
        last = Some(p);
    }
    let last = last.unwrap();
    assert_eq!(last.sent, last.total);
    assert!(last.total > 40_000);
}

#[tokio::test]
async fn test_upload_media_error_keeps_server_message() {
    let api = HttpChatApi::new(start_backend().await, None).unwrap();
    let err = api
        .upload_media(&UserId::new("too-big"), sample_upload(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 413, .. }));
    assert_eq!(err.user_message("Failed to upload media"), "File too large");
}

#[tokio::test]
async fn test_list_conversations() {
    let api = HttpChatApi::new(start_backend().await, None).unwrap();
    let inbox = api.list_conversations().await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].unread_count, 12);
}
