use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use wander_types::api::Claims;
use wander_types::events::{GatewayCommand, GatewayEvent};

use crate::commands::{Session, handle_command};
use crate::error::ChatError;
use crate::hub::ChatHub;
use crate::session::verify_token;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a WebSocket whose token was already verified at the HTTP upgrade.
pub async fn handle_connection_authenticated(socket: WebSocket, hub: ChatHub, claims: Claims) {
    let (sender, receiver) = socket.split();
    run_connection_loop(sender, receiver, hub, claims).await;
}

/// Handle a WebSocket that must authenticate with an `identify` frame first.
pub async fn handle_connection(socket: WebSocket, hub: ChatHub, jwt_secret: String) {
    let (sender, mut receiver) = socket.split();

    let claims = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    run_connection_loop(sender, receiver, hub, claims).await;
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            None
        }
    }
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    hub: ChatHub,
    claims: Claims,
) {
    let (conn_id, mut conn_rx) = hub.rooms.register().await;
    let session = Session {
        conn_id,
        user_id: claims.sub,
        username: claims.username,
    };

    info!("{} ({}) connected to gateway [{}]", session.username, session.user_id, conn_id);

    let ready = GatewayEvent::Ready {
        user_id: session.user_id,
        username: session.username.clone(),
    };
    let ready_sent = match encode(&ready) {
        Some(frame) => sender.send(frame).await.is_ok(),
        None => false,
    };
    if !ready_sent {
        hub.rooms.unregister(conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events and errors for this connection -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = conn_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(frame) = encode(&event) else { continue };
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_hub = hub.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if let Err(e) = handle_command(&recv_hub, &recv_session, cmd).await {
                            report_error(&recv_hub, &recv_session, e).await;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_session.username,
                            recv_session.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.rooms.unregister(conn_id).await;
    info!("{} ({}) disconnected from gateway", session.username, session.user_id);
}

/// Log the failure and tell the originating connection, and only it.
async fn report_error(hub: &ChatHub, session: &Session, err: ChatError) {
    match &err {
        ChatError::Storage(source) => error!(
            "{} ({}) command failed: {:?}",
            session.username, session.user_id, source
        ),
        other => debug!("{} ({}) command rejected: {}", session.username, session.user_id, other),
    }

    hub.rooms
        .send_to(session.conn_id, GatewayEvent::MessageError(err.client_message()))
        .await;
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return verify_token(jwt_secret, &token).ok();
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}
