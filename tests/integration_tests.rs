//! Integration tests driving the relay server object directly through
//! registered mpsc channels, without a live WebSocket transport.

use peercast_relay::protocol::{BoundRole, ClientMessage, ConnectionId, ErrorCode, ServerMessage};
use peercast_relay::server::{RelayServer, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

struct TestClient {
    id: ConnectionId,
    rx: mpsc::Receiver<Arc<ServerMessage>>,
}

impl TestClient {
    fn connect(server: &RelayServer, port: u16) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let addr: SocketAddr = SocketAddr::from(([127, 0, 0, 1], port));
        let id = server
            .register_client(tx, addr)
            .expect("client registration succeeds");
        Self { id, rx }
    }

    async fn recv(&mut self) -> Arc<ServerMessage> {
        timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("channel still open")
            .expect("message present")
    }
}

fn test_server() -> Arc<RelayServer> {
    RelayServer::new(ServerConfig::default()).expect("failed to create test server")
}

#[tokio::test]
async fn full_session_scenario() {
    let server = test_server();

    // Create node for project "p1" and receive (node_id, owner_token)
    let (node, owner_token) = server.create_node("p1").expect("create node");
    assert_eq!(node.project_id, "p1");
    assert_eq!(node.viewer_count, 0);

    // Publisher binds
    let mut publisher = TestClient::connect(&server, 40000);
    server
        .handle_client_message(
            &publisher.id,
            ClientMessage::Publish {
                node_id: node.id,
                owner_token,
            },
        )
        .await;
    match publisher.recv().await.as_ref() {
        ServerMessage::Connected { role } => assert_eq!(*role, BoundRole::Publisher),
        other => panic!("expected publisher ack, got {other:?}"),
    }

    // Mint a viewer token and bind a viewer
    let viewer_token = server.mint_viewer_token(&node.id).expect("mint");
    let mut viewer = TestClient::connect(&server, 40001);
    server
        .handle_client_message(
            &viewer.id,
            ClientMessage::Join {
                node_id: node.id,
                viewer_token: viewer_token.clone(),
            },
        )
        .await;
    match viewer.recv().await.as_ref() {
        ServerMessage::Connected { role } => assert_eq!(*role, BoundRole::Viewer),
        other => panic!("expected viewer ack, got {other:?}"),
    }

    // Publisher sees viewer-count 1, then the join notification
    match publisher.recv().await.as_ref() {
        ServerMessage::ViewerCount { count, .. } => assert_eq!(*count, 1),
        other => panic!("expected viewer-count, got {other:?}"),
    }
    match publisher.recv().await.as_ref() {
        ServerMessage::Join {
            viewer_token: token,
        } => assert_eq!(*token, viewer_token),
        other => panic!("expected join notification, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_joins_never_exceed_capacity() {
    let server = test_server();
    let (node, _owner) = server.create_node("p1").expect("create node");

    // Mint more tokens than capacity before anyone binds; issuance does not
    // reserve slots.
    let tokens: Vec<String> = (0..6)
        .map(|_| server.mint_viewer_token(&node.id).expect("mint"))
        .collect();

    let mut clients: Vec<TestClient> = (0..6u16)
        .map(|i| TestClient::connect(&server, 40100 + i))
        .collect();

    let mut handles = Vec::new();
    for (client, token) in clients.iter().zip(tokens) {
        let server = server.clone();
        let id = client.id;
        let node_id = node.id;
        handles.push(tokio::spawn(async move {
            server
                .handle_client_message(
                    &id,
                    ClientMessage::Join {
                        node_id,
                        viewer_token: token,
                    },
                )
                .await;
        }));
    }
    for handle in handles {
        handle.await.expect("join task");
    }

    let mut bound = 0;
    let mut refused = 0;
    for client in &mut clients {
        match client.recv().await.as_ref() {
            ServerMessage::Connected { role } => {
                assert_eq!(*role, BoundRole::Viewer);
                bound += 1;
            }
            ServerMessage::Error { error_code, .. } => {
                assert_eq!(*error_code, Some(ErrorCode::CapacityExceeded));
                refused += 1;
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    assert_eq!(bound, 3);
    assert_eq!(refused, 3);
    assert_eq!(
        server.node_status(&node.id).map(|n| n.viewer_count),
        Some(3)
    );
}

#[tokio::test]
async fn revoke_notifies_bound_connections_and_blocks_minting() {
    let server = test_server();
    let (node, owner_token) = server.create_node("p1").expect("create node");

    let mut publisher = TestClient::connect(&server, 40200);
    server
        .handle_client_message(
            &publisher.id,
            ClientMessage::Publish {
                node_id: node.id,
                owner_token,
            },
        )
        .await;
    publisher.recv().await;

    let viewer_token = server.mint_viewer_token(&node.id).expect("mint");
    let mut viewer = TestClient::connect(&server, 40201);
    server
        .handle_client_message(
            &viewer.id,
            ClientMessage::Join {
                node_id: node.id,
                viewer_token,
            },
        )
        .await;
    viewer.recv().await;
    publisher.recv().await;
    publisher.recv().await;

    server.revoke_node(&node.id).await.expect("revoke");

    for client in [&mut publisher, &mut viewer] {
        match client.recv().await.as_ref() {
            ServerMessage::Revoke { node_id: revoked } => assert_eq!(*revoked, node.id),
            other => panic!("expected revoke, got {other:?}"),
        }
    }

    assert!(server.mint_viewer_token(&node.id).is_err());

    // Revoking again is an idempotent success.
    server.revoke_node(&node.id).await.expect("revoke twice");
}

#[tokio::test]
async fn viewer_disconnect_is_propagated_once() {
    let server = test_server();
    let (node, owner_token) = server.create_node("p1").expect("create node");

    let mut publisher = TestClient::connect(&server, 40300);
    server
        .handle_client_message(
            &publisher.id,
            ClientMessage::Publish {
                node_id: node.id,
                owner_token,
            },
        )
        .await;
    publisher.recv().await;

    let viewer_token = server.mint_viewer_token(&node.id).expect("mint");
    let viewer = TestClient::connect(&server, 40301);
    server
        .handle_client_message(
            &viewer.id,
            ClientMessage::Join {
                node_id: node.id,
                viewer_token,
            },
        )
        .await;
    publisher.recv().await; // viewer-count 1
    publisher.recv().await; // join

    server.unregister_client(&viewer.id).await;
    match publisher.recv().await.as_ref() {
        ServerMessage::ViewerCount { count, .. } => assert_eq!(*count, 0),
        other => panic!("expected viewer-count after close, got {other:?}"),
    }

    // Closing again neither underflows nor re-notifies.
    server.unregister_client(&viewer.id).await;
    assert_eq!(
        server.node_status(&node.id).map(|n| n.viewer_count),
        Some(0)
    );
    assert!(
        timeout(Duration::from_millis(100), publisher.rx.recv())
            .await
            .is_err(),
        "no duplicate viewer-count expected"
    );
}

#[tokio::test]
async fn liveness_sweep_drops_silent_connections() {
    let server = RelayServer::new(ServerConfig {
        ping_timeout: Duration::from_millis(50),
        sweep_interval: Duration::from_millis(20),
        ..ServerConfig::default()
    })
    .expect("failed to create test server");

    let (node, _owner) = server.create_node("p1").expect("create node");
    let viewer_token = server.mint_viewer_token(&node.id).expect("mint");
    let viewer = TestClient::connect(&server, 40400);
    server
        .handle_client_message(
            &viewer.id,
            ClientMessage::Join {
                node_id: node.id,
                viewer_token,
            },
        )
        .await;
    assert_eq!(server.connection_count(), 1);

    let sweeper = server.clone();
    let sweep = tokio::spawn(async move { sweeper.cleanup_task().await });

    // The sweep releases the viewer slot once the connection goes silent
    // past the timeout.
    tokio::time::sleep(Duration::from_millis(300)).await;
    sweep.abort();

    assert_eq!(server.connection_count(), 0);
    assert_eq!(
        server.node_status(&node.id).map(|n| n.viewer_count),
        Some(0)
    );
}
