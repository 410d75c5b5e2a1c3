use crate::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::server::{RegisterClientError, RelayServer};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(super) async fn handle_socket(socket: WebSocket, server: Arc<RelayServer>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<ServerMessage>>(server.config().send_queue_capacity);

    // Register the connection with the relay
    let connection_id = match server.register_client(tx, addr) {
        Ok(connection_id) => {
            tracing::info!(%connection_id, client_addr = %addr, "WebSocket connection established");
            connection_id
        }
        Err(err @ RegisterClientError::IpLimitExceeded { .. }) => {
            let error_message = ServerMessage::Error {
                message: err.to_string(),
                error_code: Some(ErrorCode::TooManyConnections),
            };
            if let Err(err) = send_frame(&mut sender, &error_message).await {
                tracing::debug!(
                    client_addr = %addr,
                    error = %err,
                    "Failed to send IP limit error frame"
                );
            }
            let _ = sender.close().await;
            return;
        }
    };

    // Outbound pump: drains the connection's queue onto the socket. Ends
    // when the queue closes (unregister drops the sender side) or the
    // socket errors.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if send_frame(&mut sender, message.as_ref()).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Inbound pump: parses frames and hands them to the relay in arrival
    // order for this connection.
    let server_clone = server.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(%connection_id, "WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let max_size = server_clone.config().max_message_size;
                    if text.len() > max_size {
                        tracing::warn!(
                            %connection_id,
                            size = text.len(),
                            max = max_size,
                            "Message exceeds size limit"
                        );
                        server_clone
                            .send_error_frame(&connection_id, ErrorCode::MessageTooLarge);
                        continue;
                    }

                    let client_message: ClientMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(err) => {
                            tracing::warn!(
                                %connection_id,
                                error = %err,
                                "Rejected unparseable client frame"
                            );
                            server_clone
                                .send_error_frame(&connection_id, ErrorCode::MalformedMessage);
                            continue;
                        }
                    };

                    server_clone
                        .handle_client_message(&connection_id, client_message)
                        .await;
                }
                Message::Binary(_) => {
                    tracing::warn!(%connection_id, "Binary frames are not part of the protocol");
                    server_clone.send_error_frame(&connection_id, ErrorCode::MalformedMessage);
                }
                Message::Close(_) => {
                    tracing::info!(%connection_id, "WebSocket connection closed");
                    break;
                }
                Message::Pong(_) => {
                    // Transport-level pong counts as liveness
                    server_clone
                        .handle_client_message(&connection_id, ClientMessage::Ping)
                        .await;
                }
                _ => {
                    // Ignore other message types
                }
            }
        }

        // Cleanup when receive task ends
        server_clone.unregister_client(&connection_id).await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(%connection_id, "Send task completed");
        }
        _ = receive_task => {
            tracing::debug!(%connection_id, "Receive task completed");
        }
    }

    // Ensure cleanup
    server.unregister_client(&connection_id).await;
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize server message");
            "{\"type\":\"error\",\"data\":{\"message\":\"Internal error\"}}".to_string()
        }
    };

    sender.send(Message::Text(payload.into())).await
}
