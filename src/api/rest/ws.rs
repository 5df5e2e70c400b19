use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::allocation::UserId;
use crate::protocol::codec::{decode_message, encode_message};
use crate::protocol::error_codes;
use crate::protocol::messages::{
    ParkingAllocationMessage, ParkingRequestMessage, WsError, WsMessage,
};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<UserId>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    check_user_id(user_id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

fn check_user_id(user_id: UserId) -> Result<(), AppError> {
    if user_id < 0 {
        return Err(AppError::BadRequest(format!(
            "user id must be non-negative, got {user_id}"
        )));
    }
    Ok(())
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.outbound_buffer_size);

    let conn_seq = state.sessions.connect(user_id, outbound_tx);
    state.metrics.active_sessions.set(state.sessions.len() as i64);
    info!(user_id, conn_seq, "user connected");

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let frame = match encode_message(&message) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "failed to encode outbound message");
                    continue;
                }
            };

            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            match frame {
                Message::Text(text) => dispatch_frame(&recv_state, user_id, text.as_ref()).await,
                Message::Binary(_) => {
                    recv_state.metrics.protocol_errors_total.inc();
                    warn!(user_id, "dropping binary frame");
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    // The disconnect guard keeps a stale connection from tearing down the
    // session of a reconnect that already replaced it.
    if let Some(session) = state.sessions.disconnect(user_id, conn_seq) {
        if let Err(err) = state.engine.remove_allocation(user_id).await {
            warn!(error = %err, user_id, "failed to release allocation on disconnect");
        }
        let session_secs = (Utc::now() - session.connected_at).num_seconds();
        info!(user_id, conn_seq, session_secs, "user disconnected");
    } else {
        info!(user_id, conn_seq, "stale connection closed");
    }
    state.metrics.active_sessions.set(state.sessions.len() as i64);
}

/// Decodes one inbound frame and routes it. Undecodable frames are counted
/// and dropped without closing the connection.
async fn dispatch_frame(state: &AppState, user_id: UserId, raw: &str) {
    let message = match decode_message(raw) {
        Ok(message) => message,
        Err(err) => {
            state.metrics.protocol_errors_total.inc();
            warn!(user_id, error = %err, "dropping undecodable frame");
            return;
        }
    };

    if let Err(err) = handle_message(state, user_id, message).await {
        warn!(user_id, error = %err, "failed to handle inbound message");
    }
}

async fn handle_message(
    state: &AppState,
    user_id: UserId,
    message: WsMessage,
) -> Result<(), AppError> {
    let message_type = message.message_type();
    match message {
        WsMessage::LocationUpdate(update) => {
            state.sessions.update_location(user_id, update.location)
        }
        WsMessage::ParkingRequest(request) => {
            state.sessions.set_last_request(user_id, request.clone())?;
            send_offer(state, user_id, &request).await
        }
        WsMessage::ParkingAcceptance(acceptance) => {
            let committed = state.engine.commit_allocation(user_id, acceptance.id).await?;
            if !committed {
                // The lot filled up or vanished between offer and acceptance;
                // the client should request again.
                reply(
                    state,
                    user_id,
                    ParkingAllocationMessage::refusal(WsError {
                        err_type: error_codes::LOT_FULL,
                        msg: format!("lot {} can no longer take the allocation", acceptance.id),
                    }),
                );
            }
            Ok(())
        }
        WsMessage::ParkingRejection(rejection) => {
            state.sessions.add_rejection(user_id, rejection.id)?;
            let last_request = state
                .sessions
                .get_user(user_id)
                .and_then(|session| session.last_request);
            match last_request {
                Some(request) => send_offer(state, user_id, &request).await,
                None => {
                    reply(
                        state,
                        user_id,
                        ParkingAllocationMessage::refusal(WsError {
                            err_type: error_codes::NO_ACTIVE_REQUEST,
                            msg: "no parking request on this session".to_string(),
                        }),
                    );
                    Ok(())
                }
            }
        }
        WsMessage::ParkingCancellation(cancellation) => {
            info!(
                user_id,
                lot_id = cancellation.id,
                reason = cancellation.reason,
                "user cancelled allocation"
            );
            state.engine.remove_allocation(user_id).await
        }
        WsMessage::ParkingAllocation(_) | WsMessage::ParkingDeallocation(_) => {
            state.metrics.protocol_errors_total.inc();
            warn!(
                user_id,
                message_type = ?message_type,
                "dropping server-only message from client"
            );
            Ok(())
        }
    }
}

async fn send_offer(
    state: &AppState,
    user_id: UserId,
    request: &ParkingRequestMessage,
) -> Result<(), AppError> {
    let offer = state.engine.handle_request_allocation(user_id, request).await?;
    let message = match offer {
        Some(lot) => ParkingAllocationMessage::offer(lot),
        None => ParkingAllocationMessage::refusal(WsError {
            err_type: error_codes::NO_AVAILABLE_LOT,
            msg: "no parking available near the requested location".to_string(),
        }),
    };
    reply(state, user_id, message);
    Ok(())
}

fn reply(state: &AppState, user_id: UserId, message: ParkingAllocationMessage) {
    if !state
        .sessions
        .notify(user_id, WsMessage::ParkingAllocation(message))
    {
        warn!(user_id, "failed to deliver allocation reply");
    }
}
