use super::*;

use std::sync::Arc;

use axum::{
    extract::State, http::HeaderMap, response::IntoResponse, routing::post, Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<(HeaderMapLite, Value)>>>,
    respond_with: Arc<Mutex<Response>>,
}

#[derive(Clone, Debug)]
struct HeaderMapLite {
    api_key: Option<String>,
    content_type: Option<String>,
}

#[derive(Clone)]
enum Response {
    Grant(Value),
    Status(u16, String),
}

impl Default for Response {
    fn default() -> Self {
        Response::Grant(json!({
            "token": "tok-1",
            "serverUrl": "wss://conf.example",
            "roomId": "r-1",
            "participants": [
                {"userId": "41_Ann-Lee_nurse", "username": "Ann Lee", "isOnline": true}
            ]
        }))
    }
}

async fn handle_create_room(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let lite = HeaderMapLite {
        api_key: headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        content_type: headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    state.requests.lock().await.push((lite, body));

    match state.respond_with.lock().await.clone() {
        Response::Grant(value) => Json(value).into_response(),
        Response::Status(code, body) => (
            axum::http::StatusCode::from_u16(code).expect("status"),
            body,
        )
            .into_response(),
    }
}

async fn spawn_room_server() -> (RoomServiceClient, ServerState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ServerState::default();
    let app = Router::new()
        .route("/create-room", post(handle_create_room))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = RoomServiceClient::new(RoomServiceConfig {
        base_url: format!("http://{addr}"),
        api_key: "test-key".into(),
    });
    (client, state)
}

fn sample_request() -> RoomRequest {
    RoomRequest {
        room_id: "r-1".into(),
        from_username: "Paul Smith".into(),
        recipients: vec![RoomRecipient {
            identifier: "41_Ann-Lee_nurse".into(),
            display_name: "Ann Lee".into(),
        }],
        is_video: true,
        group_name: None,
        check_only: None,
    }
}

#[tokio::test]
async fn creates_room_and_parses_grant() {
    let (client, state) = spawn_room_server().await;

    let grant = client.create_room(&sample_request()).await.expect("grant");
    assert_eq!(grant.token, "tok-1");
    assert_eq!(grant.server_url, "wss://conf.example");
    assert_eq!(grant.room_id, "r-1");
    assert_eq!(grant.e2ee_key, None);
    assert_eq!(grant.participants.len(), 1);
    assert!(grant.participants[0].is_online);

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers.api_key.as_deref(), Some("test-key"));
    assert_eq!(headers.content_type.as_deref(), Some("application/json"));
    assert_eq!(body["roomId"], "r-1");
    assert_eq!(body["fromUsername"], "Paul Smith");
    assert_eq!(body["isVideo"], true);
    assert_eq!(body["toUserIds"], json!(["41_Ann-Lee_nurse"]));
    assert_eq!(body["toUsernames"]["41_Ann-Lee_nurse"], "Ann Lee");
    assert!(body.get("groupName").is_none());
    assert!(body.get("checkOnly").is_none());
}

#[tokio::test]
async fn group_and_check_only_fields_are_forwarded_when_present() {
    let (client, state) = spawn_room_server().await;

    let mut request = sample_request();
    request.group_name = Some("Cardiology".into());
    request.check_only = Some(true);
    client.create_room(&request).await.expect("grant");

    let requests = state.requests.lock().await;
    let (_, body) = &requests[0];
    assert_eq!(body["groupName"], "Cardiology");
    assert_eq!(body["checkOnly"], true);
}

#[tokio::test]
async fn empty_recipient_list_fails_locally_with_zero_requests() {
    let (client, state) = spawn_room_server().await;

    let mut request = sample_request();
    request.recipients.clear();
    let err = client.create_room(&request).await.expect_err("must fail");
    assert!(matches!(err, RoomServiceError::MissingField("recipients")));
    assert!(state.requests.lock().await.is_empty());
}

#[tokio::test]
async fn missing_room_id_and_caller_name_fail_locally() {
    let (client, state) = spawn_room_server().await;

    let mut request = sample_request();
    request.room_id.clear();
    assert!(matches!(
        client.create_room(&request).await,
        Err(RoomServiceError::MissingField("roomId"))
    ));

    let mut request = sample_request();
    request.from_username.clear();
    assert!(matches!(
        client.create_room(&request).await,
        Err(RoomServiceError::MissingField("fromUsername"))
    ));

    assert!(state.requests.lock().await.is_empty());
}

#[tokio::test]
async fn non_success_status_carries_status_and_body() {
    let (client, state) = spawn_room_server().await;
    *state.respond_with.lock().await = Response::Status(402, "quota exceeded".into());

    let err = client
        .create_room(&sample_request())
        .await
        .expect_err("must fail");
    match err {
        RoomServiceError::Rejected { status, body } => {
            assert_eq!(status.as_u16(), 402);
            assert_eq!(body, "quota exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unparseable_success_body_is_a_distinct_parse_error() {
    let (client, state) = spawn_room_server().await;
    *state.respond_with.lock().await = Response::Status(200, "<html>not json</html>".into());

    let err = client
        .create_room(&sample_request())
        .await
        .expect_err("must fail");
    match err {
        RoomServiceError::MalformedResponse { body, .. } => {
            assert!(body.contains("not json"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
