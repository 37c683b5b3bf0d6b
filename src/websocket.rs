//! # WebSocket Session Channel
//!
//! One actor per client connection on `/ws`. The actor parses inbound JSON
//! event frames, routes them through the shared [`EventDispatcher`], and
//! pushes outbound events back as text frames.
//!
//! ## Protocol:
//! 1. Client connects and sends `start-recording` (or `join-session` for an
//!    existing session).
//! 2. The server answers with `session-created` and the connection is
//!    subscribed to the session's broadcast group.
//! 3. `audio-chunk` frames stream in; `transcription-update` frames stream
//!    out to every subscriber of the session.
//! 4. `stop-recording` drives post-processing; the final
//!    `processing-complete` carries the download URL.
//!
//! `error` events are connection-scoped: a dispatch failure is reported only
//! to the connection that caused it, never broadcast.

use crate::dispatcher::EventDispatcher;
use crate::events::{decode_chunk, ClientEvent, ServerEvent};
use crate::session::SessionHandle;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// How often the server pings idle connections.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Close the connection after this long without a pong.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct SessionWebSocket {
    state: web::Data<AppState>,
    dispatcher: Arc<EventDispatcher>,

    /// Largest single decoded chunk this connection may submit.
    max_chunk_bytes: usize,

    last_heartbeat: Instant,

    /// Broadcast-forwarding tasks, one per session this connection is
    /// subscribed to. Aborted when the connection closes.
    subscriptions: HashMap<String, tokio::task::JoinHandle<()>>,
}

impl SessionWebSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        let max_chunk_bytes = state.get_config().audio.max_chunk_bytes;
        let dispatcher = Arc::clone(&state.dispatcher);
        Self {
            state,
            dispatcher,
            max_chunk_bytes,
            last_heartbeat: Instant::now(),
            subscriptions: HashMap::new(),
        }
    }

    /// Send a connection-scoped event directly to this client.
    fn send_event(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        if let ServerEvent::Error { message, code } = event {
            self.state.increment_error_count();
            warn!("WebSocket error {:?}: {}", code, message);
        }
        match event.to_json() {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize outbound event: {}", err),
        }
    }

    /// Subscribe this connection to a session's broadcast group by spawning
    /// a forwarding task from the broadcast receiver to the actor mailbox.
    /// The task holds only the receiver, so it ends (Closed) once the last
    /// handle reference drops after session teardown.
    fn subscribe(&mut self, handle: &SessionHandle, addr: Addr<Self>) {
        if self.subscriptions.contains_key(&handle.session_id) {
            debug!("Connection already subscribed to session {}", handle.session_id);
            return;
        }

        let mut rx = handle.subscribe();
        let session_id = handle.session_id.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match event.to_json() {
                        Ok(json) => addr.do_send(SendText(json)),
                        Err(err) => error!("Failed to serialize broadcast event: {}", err),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Session {} subscriber lagged, skipped {} events", session_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.subscriptions.insert(handle.session_id.clone(), task);
    }

    fn handle_client_event(&mut self, event: ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        self.state.increment_event_count();
        let dispatcher = Arc::clone(&self.dispatcher);
        let addr = ctx.address();

        match event {
            ClientEvent::StartRecording { user_id, audio_source } => {
                tokio::spawn(async move {
                    match dispatcher.handle_start(user_id, audio_source).await {
                        Ok(handle) => addr.do_send(SessionStarted { handle }),
                        Err(err) => addr.do_send(SendError {
                            message: err.to_string(),
                            code: err.code(),
                        }),
                    }
                });
            }

            ClientEvent::JoinSession { session_id } => {
                match self.dispatcher.handle_join(&session_id) {
                    Ok(handle) => {
                        self.subscribe(&handle, addr.clone());
                        // Let the late joiner sync to the current state.
                        tokio::spawn(async move {
                            let status = handle.state.lock().await.session.status();
                            addr.do_send(SendText(
                                ServerEvent::StatusUpdate { session_id, status }
                                    .to_json()
                                    .unwrap_or_default(),
                            ));
                        });
                    }
                    Err(err) => self.send_event(
                        ctx,
                        &ServerEvent::error(err.to_string(), err.code()),
                    ),
                }
            }

            ClientEvent::AudioChunk { session_id, chunk, timestamp } => {
                let bytes = match decode_chunk(&chunk) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        self.send_event(
                            ctx,
                            &ServerEvent::error(
                                format!("Invalid audio chunk encoding: {}", err),
                                "invalid_payload",
                            ),
                        );
                        return;
                    }
                };

                if bytes.len() > self.max_chunk_bytes {
                    self.send_event(
                        ctx,
                        &ServerEvent::error(
                            format!(
                                "Audio chunk of {} bytes exceeds the {} byte limit",
                                bytes.len(),
                                self.max_chunk_bytes
                            ),
                            "invalid_payload",
                        ),
                    );
                    return;
                }

                tokio::spawn(async move {
                    if let Err(err) = dispatcher.handle_audio_chunk(&session_id, bytes, timestamp).await {
                        addr.do_send(SendError {
                            message: err.to_string(),
                            code: err.code(),
                        });
                    }
                });
            }

            ClientEvent::PauseRecording { session_id } => {
                tokio::spawn(async move {
                    if let Err(err) = dispatcher.handle_pause(&session_id).await {
                        addr.do_send(SendError {
                            message: err.to_string(),
                            code: err.code(),
                        });
                    }
                });
            }

            ClientEvent::ResumeRecording { session_id } => {
                tokio::spawn(async move {
                    if let Err(err) = dispatcher.handle_resume(&session_id).await {
                        addr.do_send(SendError {
                            message: err.to_string(),
                            code: err.code(),
                        });
                    }
                });
            }

            ClientEvent::StopRecording { session_id, client_transcript, duration } => {
                tokio::spawn(async move {
                    if let Err(err) = dispatcher
                        .handle_stop(&session_id, client_transcript, duration)
                        .await
                    {
                        addr.do_send(SendError {
                            message: err.to_string(),
                            code: err.code(),
                        });
                    }
                });
            }
        }
    }
}

/// Raw outbound frame for this connection.
#[derive(Message)]
#[rtype(result = "()")]
struct SendText(String);

/// Connection-scoped error event.
#[derive(Message)]
#[rtype(result = "()")]
struct SendError {
    message: String,
    code: &'static str,
}

/// A `start-recording` completed; subscribe and announce the new session.
#[derive(Message)]
#[rtype(result = "()")]
struct SessionStarted {
    handle: Arc<SessionHandle>,
}

impl Actor for SessionWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Sessions outlive their connections; only the forwarding tasks go.
        for (session_id, task) in self.subscriptions.drain() {
            debug!("Unsubscribing closed connection from session {}", session_id);
            task.abort();
        }
        info!("WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => self.handle_client_event(event, ctx),
                Err(err) => self.send_event(
                    ctx,
                    &ServerEvent::error(format!("Invalid event frame: {}", err), "invalid_payload"),
                ),
            },
            Ok(ws::Message::Binary(_)) => {
                self.send_event(
                    ctx,
                    &ServerEvent::error(
                        "Binary frames are not supported; send audio-chunk events",
                        "invalid_payload",
                    ),
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for SessionWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<SendError> for SessionWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendError, ctx: &mut Self::Context) {
        let event = ServerEvent::error(msg.message, msg.code);
        self.send_event(ctx, &event);
    }
}

impl Handler<SessionStarted> for SessionWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SessionStarted, ctx: &mut Self::Context) {
        let addr = ctx.address();
        self.subscribe(&msg.handle, addr);

        let created = ServerEvent::SessionCreated {
            session_id: msg.handle.session_id.clone(),
        };
        self.send_event(ctx, &created);
    }
}

/// `/ws` upgrade handler; each connection gets its own actor.
pub async fn session_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );
    ws::start(SessionWebSocket::new(state), &req, stream)
}
