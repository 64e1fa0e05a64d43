//! Chat over WebSocket, one document per connection.
//!
//! # Handshake
//!
//! `GET /ws/chat?token=<jwt>&userEmail=<email>&documentS3Key=<key>`
//!
//! The token may also be sent in the `Authorization` header. When `userEmail`
//! is absent the token's `email` claim is used. A `userEmail` that differs
//! from the claim is rejected with 403.
//!
//! # Protocol
//!
//! JSON text frames tagged by `type`:
//!
//! ```json
//! {"type": "chat_message", "content": "What is this paper about?"}
//! {"type": "reset_memory"}
//! {"type": "ping"}
//! ```
//!
//! Every client frame gets exactly one reply: `chat_message`, `memory_reset`,
//! `pong` or `error`.
//!
//! # Keepalive
//!
//! The server pings every 30 seconds and closes connections that leave a
//! ping unanswered for 60 seconds.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthError, JwtValidator, authorize_email, strip_bearer},
    models::ChatMessage,
    rag::{RagComponents, RagSession},
    services::MessageService,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQueryParams {
    pub token: Option<String>,
    pub user_email: Option<String>,
    pub document_s3_key: Option<String>,
}

/// Client-to-server messages.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ChatMessage {
        #[serde(default)]
        content: String,
    },
    ResetMemory,
    Ping,
}

/// Server-to-client messages.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        #[serde(rename = "userId")]
        user_id: String,
    },
    ChatMessage(ChatMessage),
    Error {
        message: String,
    },
    Pong,
    MemoryReset,
}

impl ServerMessage {
    fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

/// Metadata about one open chat connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: Uuid,
    pub user_id: String,
    pub user_email: String,
    pub s3_key: String,
    pub connected_at: DateTime<Utc>,
}

/// Open chat connections keyed by user id. A user's newest connection
/// replaces the older entry.
#[derive(Clone, Default)]
pub struct ActiveConnections {
    inner: Arc<DashMap<String, ConnectionInfo>>,
}

impl ActiveConnections {
    pub fn register(&self, info: ConnectionInfo) {
        self.inner.insert(info.user_id.clone(), info);
    }

    /// Remove the entry only if it still belongs to this connection.
    pub fn unregister(&self, user_id: &str, connection_id: Uuid) {
        self.inner
            .remove_if(user_id, |_, info| info.connection_id == connection_id);
    }

    pub fn get(&self, user_id: &str) -> Option<ConnectionInfo> {
        self.inner.get(user_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Who is connecting, and to which document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub user_id: String,
    pub user_email: String,
    pub s3_key: String,
}

/// Verify the token and resolve the chat target.
pub fn authorize_handshake(
    jwt: &JwtValidator,
    params: &ChatQueryParams,
    headers: &HeaderMap,
) -> Result<Handshake, Response> {
    let token = params
        .token
        .as_deref()
        .or_else(|| headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))
        .map(strip_bearer)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::MissingToken.into_response())?;

    let claims = jwt.validate(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected socket token");
        e.into_response()
    })?;

    let requested = params.user_email.clone().filter(|e| !e.is_empty());
    if let Some(requested) = &requested {
        authorize_email(claims.email.as_deref(), requested).map_err(|e| {
            tracing::warn!(user_id = %claims.sub, "Rejected socket for another email");
            e.into_response()
        })?;
    }
    let user_email = requested.or(claims.email).filter(|e| !e.is_empty());
    let s3_key = params.document_s3_key.clone().filter(|k| !k.is_empty());

    let (Some(user_email), Some(s3_key)) = (user_email, s3_key) else {
        return Err((
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": "User email and document S3 key are required" })),
        )
            .into_response());
    };

    Ok(Handshake {
        user_id: claims.sub,
        user_email,
        s3_key,
    })
}

/// WebSocket upgrade handler for `/ws/chat`.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ChatQueryParams>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let handshake = authorize_handshake(&state.jwt, &params, &headers)?;

    tracing::info!(
        user_id = %handshake.user_id,
        s3_key = %handshake.s3_key,
        "Chat socket upgrading"
    );

    let span = tracing::info_span!(
        "chat_socket",
        user_id = %handshake.user_id,
        s3_key = %handshake.s3_key,
    );
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, handshake).instrument(span)))
}

async fn handle_socket(socket: WebSocket, state: AppState, handshake: Handshake) {
    let connection_id = Uuid::new_v4();
    state.connections.register(ConnectionInfo {
        connection_id,
        user_id: handshake.user_id.clone(),
        user_email: handshake.user_email.clone(),
        s3_key: handshake.s3_key.clone(),
        connected_at: Utc::now(),
    });
    tracing::info!(active = state.connections.len(), "Chat socket connected");

    let (sender, receiver) = socket.split();
    let ws_config = &state.config.server.websocket;
    let conn = ChatConnection {
        sender,
        chat: ChatSession::new(
            &handshake,
            state.rag.clone(),
            state.services.messages.clone(),
        ),
        ping_interval: Duration::from_secs(ws_config.ping_interval_secs),
        pong_timeout: Duration::from_secs(ws_config.pong_timeout_secs),
    };

    if let Err(e) = conn.run(receiver).await {
        tracing::debug!(error = %e, "Chat socket closed with error");
    }

    state
        .connections
        .unregister(&handshake.user_id, connection_id);
    tracing::info!(active = state.connections.len(), "Chat socket disconnected");
}

/// Per-connection chat state, independent of the transport.
pub struct ChatSession {
    user_id: String,
    user_email: String,
    rag: RagSession,
    messages: MessageService,
}

impl ChatSession {
    pub fn new(handshake: &Handshake, rag: RagComponents, messages: MessageService) -> Self {
        Self {
            user_id: handshake.user_id.clone(),
            user_email: handshake.user_email.clone(),
            rag: RagSession::new(&handshake.s3_key, &handshake.user_email, rag),
            messages,
        }
    }

    pub fn connected(&self) -> ServerMessage {
        ServerMessage::Connected {
            user_id: self.user_id.clone(),
        }
    }

    /// Handle one text frame and produce the reply.
    pub async fn handle_text(&mut self, text: &str) -> ServerMessage {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Invalid client message");
                return ServerMessage::error("Invalid message format");
            }
        };

        match message {
            ClientMessage::ChatMessage { content } => self.answer(content.trim()).await,
            ClientMessage::ResetMemory => {
                self.rag.reset_memory();
                ServerMessage::MemoryReset
            }
            ClientMessage::Ping => ServerMessage::Pong,
        }
    }

    async fn answer(&mut self, content: &str) -> ServerMessage {
        if content.is_empty() {
            return ServerMessage::error("Message content is required");
        }

        let answer = match self.rag.query_document(content).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "Failed to answer chat message");
                return ServerMessage::error("Failed to process message");
            }
        };

        if let Err(e) = self
            .messages
            .save_message_pair(&self.user_email, self.rag.s3_key(), content, &answer)
            .await
        {
            tracing::error!(error = %e, "Failed to persist chat messages");
        }

        ServerMessage::ChatMessage(ChatMessage {
            content: answer,
            timestamp: Utc::now().timestamp_millis(),
            user_id: self.user_id.clone(),
            is_user: false,
        })
    }
}

/// Drives one socket: replies to client frames and keeps the link alive.
struct ChatConnection<S> {
    sender: S,
    chat: ChatSession,
    ping_interval: Duration,
    pong_timeout: Duration,
}

impl<S> ChatConnection<S>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    async fn run<R>(mut self, mut receiver: R) -> Result<(), WsError>
    where
        R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let connected = self.chat.connected();
        self.send_message(&connected).await?;

        let mut ping_interval = tokio::time::interval(self.ping_interval);
        ping_interval.tick().await;
        // Set when a ping goes out, cleared by the pong. Time spent answering a
        // chat message does not count against the client.
        let mut awaiting_pong: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let reply = self.chat.handle_text(text.as_str()).await;
                            self.send_message(&reply).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            awaiting_pong = None;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::debug!("Client initiated close");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::debug!(error = %e, "WebSocket receive error");
                            break;
                        }
                        None => {
                            tracing::debug!("WebSocket stream ended");
                            break;
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    if let Some(sent) = awaiting_pong {
                        if sent.elapsed() >= self.pong_timeout {
                            tracing::info!("Pong timeout, closing connection");
                            break;
                        }
                        continue;
                    }
                    self.sender
                        .send(Message::Ping(bytes::Bytes::new()))
                        .await
                        .map_err(WsError::Send)?;
                    awaiting_pong = Some(Instant::now());
                }
            }
        }

        let _ = self.sender.close().await;
        Ok(())
    }

    async fn send_message(&mut self, msg: &ServerMessage) -> Result<(), WsError> {
        let json = serde_json::to_string(msg)?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(WsError::Send)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Send error: {0}")]
    Send(axum::Error),
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::Value;

    use super::*;
    use crate::{
        auth::tests::{TEST_SECRET, sign},
        config::AuthConfig,
        tests::fakes::{FakeChatModel, FakeEmbedder, FakeVectorStore},
    };

    fn validator() -> JwtValidator {
        JwtValidator::new(&AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            allowed_algorithms: vec![jsonwebtoken::Algorithm::HS256],
            leeway_secs: 0,
        })
    }

    fn params(token: Option<String>, email: Option<&str>, key: Option<&str>) -> ChatQueryParams {
        ChatQueryParams {
            token,
            user_email: email.map(String::from),
            document_s3_key: key.map(String::from),
        }
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"chat_message","content":"hi"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ChatMessage {
                content: "hi".into()
            }
        );
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"reset_memory"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ResetMemory);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn test_server_message_shapes() {
        let connected = serde_json::to_value(ServerMessage::Connected {
            user_id: "u1".into(),
        })
        .unwrap();
        assert_eq!(connected, json!({ "type": "connected", "userId": "u1" }));

        let chat = serde_json::to_value(ServerMessage::ChatMessage(ChatMessage {
            content: "Birds.".into(),
            timestamp: 1,
            user_id: "u1".into(),
            is_user: false,
        }))
        .unwrap();
        assert_eq!(
            chat,
            json!({
                "type": "chat_message",
                "content": "Birds.",
                "timestamp": 1,
                "userId": "u1",
                "isUser": false
            })
        );

        let reset = serde_json::to_value(ServerMessage::MemoryReset).unwrap();
        assert_eq!(reset, json!({ "type": "memory_reset" }));
    }

    #[test]
    fn test_handshake_from_query_token() {
        let token = sign("user-1", None, 3600);
        let handshake = authorize_handshake(
            &validator(),
            &params(Some(token), Some("ada@example.com"), Some("k")),
            &HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(
            handshake,
            Handshake {
                user_id: "user-1".into(),
                user_email: "ada@example.com".into(),
                s3_key: "k".into(),
            }
        );
    }

    #[test]
    fn test_handshake_header_token_and_email_claim() {
        let mut headers = HeaderMap::new();
        let token = sign("user-1", Some("claim@example.com"), 3600);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let handshake =
            authorize_handshake(&validator(), &params(None, None, Some("k")), &headers).unwrap();
        assert_eq!(handshake.user_email, "claim@example.com");
    }

    #[test]
    fn test_handshake_rejections() {
        let missing = authorize_handshake(
            &validator(),
            &params(None, Some("a@b.c"), Some("k")),
            &HeaderMap::new(),
        )
        .unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let expired = authorize_handshake(
            &validator(),
            &params(Some(sign("u", None, -60)), Some("a@b.c"), Some("k")),
            &HeaderMap::new(),
        )
        .unwrap_err();
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);

        let no_key = authorize_handshake(
            &validator(),
            &params(Some(sign("u", None, 3600)), Some("a@b.c"), None),
            &HeaderMap::new(),
        )
        .unwrap_err();
        assert_eq!(no_key.status(), StatusCode::BAD_REQUEST);

        let no_email = authorize_handshake(
            &validator(),
            &params(Some(sign("u", None, 3600)), None, Some("k")),
            &HeaderMap::new(),
        )
        .unwrap_err();
        assert_eq!(no_email.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_handshake_rejects_other_users_email() {
        let token = sign("mallory-id", Some("mallory@example.com"), 3600);
        let rejected = authorize_handshake(
            &validator(),
            &params(Some(token.clone()), Some("ada@example.com"), Some("k")),
            &HeaderMap::new(),
        )
        .unwrap_err();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        // Same address in a different case is the same user.
        let handshake = authorize_handshake(
            &validator(),
            &params(Some(token), Some("Mallory@Example.com"), Some("k")),
            &HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(handshake.user_id, "mallory-id");
    }

    #[test]
    fn test_connections_registry() {
        let connections = ActiveConnections::default();
        let info = |id: Uuid| ConnectionInfo {
            connection_id: id,
            user_id: "u1".into(),
            user_email: "ada@example.com".into(),
            s3_key: "k".into(),
            connected_at: Utc::now(),
        };
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        connections.register(info(first));
        connections.register(info(second));
        assert_eq!(connections.len(), 1);

        // A stale connection closing must not drop the newer one.
        connections.unregister("u1", first);
        assert_eq!(connections.get("u1").unwrap().connection_id, second);

        connections.unregister("u1", second);
        assert!(connections.is_empty());
    }

    #[cfg(feature = "database-sqlite")]
    mod session {
        use tokio::{sync::mpsc, task::JoinHandle};
        use tokio_util::sync::PollSender;

        use super::*;
        use crate::tests::fakes::sqlite_db;

        async fn chat_session(chat: FakeChatModel) -> (ChatSession, MessageService) {
            let messages = MessageService::new(sqlite_db().await);
            let handshake = Handshake {
                user_id: "user-1".into(),
                user_email: "ada@example.com".into(),
                s3_key: "ada@example.com/1_owls.pdf".into(),
            };
            let rag = RagComponents {
                chat: Arc::new(chat),
                embedder: Arc::new(FakeEmbedder),
                vector_store: Arc::new(FakeVectorStore::default()),
                top_k: 5,
                memory_window: 10,
            };
            (
                ChatSession::new(&handshake, rag, messages.clone()),
                messages,
            )
        }

        fn to_json(msg: &ServerMessage) -> Value {
            serde_json::to_value(msg).unwrap()
        }

        struct Client {
            inbox: mpsc::Sender<Result<Message, axum::Error>>,
            outbox: mpsc::Receiver<Message>,
        }

        impl Client {
            async fn send_text(&self, text: &str) {
                self.inbox.send(Ok(Message::Text(text.into()))).await.unwrap();
            }

            async fn pong(&self) {
                self.inbox
                    .send(Ok(Message::Pong(bytes::Bytes::new())))
                    .await
                    .unwrap();
            }

            /// Next JSON frame, skipping keepalive pings.
            async fn next_json(&mut self) -> Value {
                loop {
                    match self.outbox.recv().await {
                        Some(Message::Text(text)) => {
                            return serde_json::from_str(text.as_str()).unwrap();
                        }
                        Some(Message::Ping(_)) => continue,
                        other => panic!("unexpected frame: {other:?}"),
                    }
                }
            }
        }

        fn assert_elapsed(start: Instant, secs: u64) {
            let elapsed = start.elapsed().as_secs_f64();
            assert!((elapsed - secs as f64).abs() < 1.0, "elapsed {elapsed}s");
        }

        /// Run a connection over in-memory channels with a 30s ping and 60s pong timeout.
        fn connect(chat: ChatSession) -> (Client, JoinHandle<Result<(), WsError>>) {
            let (out_tx, outbox) = mpsc::channel(16);
            let (inbox, in_rx) = mpsc::channel(16);
            let sender = Box::pin(
                PollSender::new(out_tx)
                    .sink_map_err(|_| axum::Error::new(std::io::Error::other("socket closed"))),
            );
            let receiver = Box::pin(futures_util::stream::unfold(in_rx, |mut rx| async move {
                rx.recv().await.map(|msg| (msg, rx))
            }));
            let connection = ChatConnection {
                sender,
                chat,
                ping_interval: Duration::from_secs(30),
                pong_timeout: Duration::from_secs(60),
            };
            (Client { inbox, outbox }, tokio::spawn(connection.run(receiver)))
        }

        #[tokio::test]
        async fn test_chat_message_answered_and_persisted() {
            let (mut session, messages) = chat_session(FakeChatModel::replying(["Birds."])).await;

            let reply = session
                .handle_text(r#"{"type":"chat_message","content":"What are owls?"}"#)
                .await;
            let reply = to_json(&reply);
            assert_eq!(reply["type"], "chat_message");
            assert_eq!(reply["content"], "Birds.");
            assert_eq!(reply["isUser"], false);
            assert_eq!(reply["userId"], "user-1");

            let history = messages
                .get_all("ada@example.com", "ada@example.com/1_owls.pdf")
                .await
                .unwrap();
            assert_eq!(history.len(), 2);
            assert_eq!(history[1].content, "What are owls?");
        }

        #[tokio::test]
        async fn test_errors_are_reported_in_band() {
            let (mut session, _) = chat_session(FakeChatModel::failing_first(2, "unused")).await;

            let empty = session
                .handle_text(r#"{"type":"chat_message","content":"   "}"#)
                .await;
            assert_eq!(empty, ServerMessage::error("Message content is required"));

            let invalid = session.handle_text("not json").await;
            assert_eq!(invalid, ServerMessage::error("Invalid message format"));

            let failed = session
                .handle_text(r#"{"type":"chat_message","content":"Hi"}"#)
                .await;
            assert_eq!(failed, ServerMessage::error("Failed to process message"));
        }

        #[tokio::test]
        async fn test_ping_and_reset() {
            let (mut session, _) = chat_session(FakeChatModel::replying(["a"])).await;

            session
                .handle_text(r#"{"type":"chat_message","content":"q"}"#)
                .await;
            assert_eq!(session.rag.memory().len(), 1);

            assert_eq!(
                session.handle_text(r#"{"type":"reset_memory"}"#).await,
                ServerMessage::MemoryReset
            );
            assert!(session.rag.memory().is_empty());
            assert_eq!(
                session.handle_text(r#"{"type":"ping"}"#).await,
                ServerMessage::Pong
            );
        }

        #[tokio::test]
        async fn test_unanswered_ping_closes_connection() {
            let (session, _) = chat_session(FakeChatModel::replying(["unused"])).await;
            tokio::time::pause();
            let start = Instant::now();
            let (mut client, handle) = connect(session);

            assert_eq!(client.next_json().await["type"], "connected");
            assert!(matches!(client.outbox.recv().await, Some(Message::Ping(_))));
            assert_elapsed(start, 30);

            assert!(client.outbox.recv().await.is_none());
            assert_elapsed(start, 90);
            handle.await.unwrap().unwrap();
        }

        #[tokio::test]
        async fn test_answered_pings_keep_connection_open() {
            let (session, _) = chat_session(FakeChatModel::replying(["unused"])).await;
            tokio::time::pause();
            let start = Instant::now();
            let (mut client, handle) = connect(session);

            assert_eq!(client.next_json().await["type"], "connected");
            for _ in 0..4 {
                assert!(matches!(client.outbox.recv().await, Some(Message::Ping(_))));
                client.pong().await;
            }
            assert_elapsed(start, 120);

            client.send_text(r#"{"type":"ping"}"#).await;
            assert_eq!(client.next_json().await, json!({ "type": "pong" }));

            drop(client);
            handle.await.unwrap().unwrap();
        }

        #[tokio::test]
        async fn test_slow_answer_does_not_trip_pong_timeout() {
            let chat = FakeChatModel::replying(["Birds."]).delayed(Duration::from_secs(150));
            let (session, _) = chat_session(chat).await;
            tokio::time::pause();
            let start = Instant::now();
            let (mut client, handle) = connect(session);

            assert_eq!(client.next_json().await["type"], "connected");
            client
                .send_text(r#"{"type":"chat_message","content":"What are owls?"}"#)
                .await;

            let reply = client.next_json().await;
            assert_eq!(reply["content"], "Birds.");
            assert!(start.elapsed() >= Duration::from_secs(150));

            client.pong().await;
            client.send_text(r#"{"type":"ping"}"#).await;
            assert_eq!(client.next_json().await, json!({ "type": "pong" }));

            drop(client);
            handle.await.unwrap().unwrap();
        }
    }
}
