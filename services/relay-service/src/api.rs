//! API routes for the relay service

use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use actix_ws::{Message as Frame, MessageStream, Session};
use futures::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use ephchat_core::{ClientEvent, Identity, LiveEvent, Message};
use ephchat_relay::{
    parse_client_frame, run_channel, ChannelError, MpscChannel, RelayService, RelayStats,
};

use crate::error::ServiceError;

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health))
            .route("/messages", web::post().to(send_message))
            .route("/messages/{peer}", web::get().to(get_conversation))
            .route("/contacts", web::get().to(get_contacts))
            .route("/logout", web::post().to(logout))
            .route("/ws", web::get().to(live_socket)),
    );
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the `Authorization` header, else the `token` query
/// parameter
fn bearer_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    from_header.or_else(|| {
        web::Query::<TokenQuery>::from_query(req.query_string())
            .ok()
            .and_then(|query| query.into_inner().token)
    })
}

async fn authenticated(
    relay: &RelayService,
    req: &HttpRequest,
) -> Result<(Identity, String), ServiceError> {
    let token = bearer_token(req).ok_or(ServiceError::Unauthorized)?;
    let identity = relay.authenticate(&token).await?;
    Ok((identity, token))
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    stats: RelayStats,
}

async fn health(relay: web::Data<RelayService>) -> Result<HttpResponse, ServiceError> {
    let stats = relay.stats().await?;

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "relay-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stats,
    }))
}

/// Send message request
#[derive(Deserialize)]
struct SendMessageRequest {
    recipient: String,
    encrypted_content: String,
}

async fn send_message(
    relay: web::Data<RelayService>,
    req: HttpRequest,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (sender, _) = authenticated(&relay, &req).await?;
    let recipient = Identity::parse(&body.recipient)?;

    let message = relay
        .send(&sender, &recipient, &body.encrypted_content)
        .await?;

    Ok(HttpResponse::Created().json(message))
}

/// Conversation response
#[derive(Serialize)]
struct ConversationResponse {
    peer: Identity,
    messages: Vec<Message>,
}

async fn get_conversation(
    relay: web::Data<RelayService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let (user, _) = authenticated(&relay, &req).await?;
    let peer = Identity::parse(&path.into_inner())?;

    let messages = relay.fetch_conversation(&user, &peer).await?;

    Ok(HttpResponse::Ok().json(ConversationResponse { peer, messages }))
}

/// Contacts response
#[derive(Serialize)]
struct ContactsResponse {
    contacts: Vec<Identity>,
    count: usize,
}

async fn get_contacts(
    relay: web::Data<RelayService>,
    req: HttpRequest,
) -> Result<HttpResponse, ServiceError> {
    let (user, _) = authenticated(&relay, &req).await?;
    let contacts: Vec<Identity> = relay.contacts(&user).await?.into_iter().collect();

    Ok(HttpResponse::Ok().json(ContactsResponse {
        count: contacts.len(),
        contacts,
    }))
}

async fn logout(
    relay: web::Data<RelayService>,
    req: HttpRequest,
) -> Result<HttpResponse, ServiceError> {
    let (_, token) = authenticated(&relay, &req).await?;
    relay.logout(&token).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "logged_out": true
    })))
}

type Inbound = std::result::Result<ClientEvent, ChannelError>;

/// Live channel over a WebSocket.
///
/// Outbound events go out as JSON text frames. Inbound text frames are
/// client events; `{"type":"ping"}` is answered with `{"type":"pong"}`.
async fn live_socket(
    relay: web::Data<RelayService>,
    req: HttpRequest,
    body: web::Payload,
) -> Result<HttpResponse, ServiceError> {
    let (identity, _) = authenticated(&relay, &req).await?;
    let (response, session, frames) = actix_ws::handle(&req, body)
        .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

    let (channel, events) = MpscChannel::new(relay.config().channel_buffer);
    let registry = Arc::clone(relay.registry());

    actix_web::rt::spawn(forward_events(events, session.clone()));
    actix_web::rt::spawn(async move {
        let inbound = client_events(frames, session.clone());
        // Outcome is logged by the channel loop
        let _ = run_channel(registry, identity, Arc::new(channel), inbound).await;
        let _ = session.close(None).await;
    });

    Ok(response)
}

/// Write queued live events to the socket until either side goes away
async fn forward_events(mut events: mpsc::Receiver<LiveEvent>, mut session: Session) {
    while let Some(event) = events.recv().await {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Could not encode live event: {}", e);
                continue;
            }
        };
        if session.text(frame).await.is_err() {
            break;
        }
    }
}

/// Inbound socket frames as client events.
///
/// Protocol-level pings are answered in place; a close frame ends the
/// stream.
fn client_events(frames: MessageStream, session: Session) -> impl Stream<Item = Inbound> + Unpin {
    Box::pin(
        frames
            .take_while(|frame| future::ready(!matches!(frame, Ok(Frame::Close(_)))))
            .filter_map(move |frame| {
                let mut session = session.clone();
                async move {
                    match frame {
                        Ok(Frame::Ping(bytes)) => match session.pong(&bytes).await {
                            Ok(()) => None,
                            Err(_) => Some(Err(ChannelError::Closed)),
                        },
                        Ok(frame) => client_event(frame),
                        Err(e) => Some(Err(ChannelError::Io(e.to_string()))),
                    }
                }
            }),
    )
}

/// Decode one data frame; control and continuation frames carry no event
fn client_event(frame: Frame) -> Option<Inbound> {
    match frame {
        Frame::Text(text) => Some(parse_client_frame(&text)),
        Frame::Binary(_) => Some(Err(ChannelError::Malformed(
            "binary frames are not accepted".to_string(),
        ))),
        _ => None,
    }
}
