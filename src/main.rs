#![cfg_attr(not(test), deny(clippy::panic))]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use peercast_relay::config;
use peercast_relay::logging;
use peercast_relay::server::{RelayServer, ServerConfig};
use peercast_relay::websocket;
use std::net::SocketAddr;

/// Peercast Relay -- lightweight WebSocket signaling relay for
/// publisher/viewer sessions
#[derive(Parser, Debug)]
#[command(name = "peercast-relay")]
#[command(about = "A lightweight, in-memory WebSocket signaling relay for publisher/viewer sessions")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code defaults.
    let cfg = config::load();

    // Handle --print-config: output the loaded configuration as JSON
    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    // Decode the optional signing key up front so --validate-config catches
    // a malformed secret before deployment.
    let token_secret = decode_token_secret(cfg.server.token_secret.as_deref());

    if cli.validate_config {
        match &token_secret {
            Ok(_) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Max viewers per node: {}", cfg.server.max_viewers);
                println!("  Token TTL: {}s", cfg.server.token_ttl_secs);
                println!("  Ping timeout: {}s", cfg.server.ping_timeout_secs);
                println!(
                    "  Token secret: {}",
                    if cfg.server.token_secret.is_some() {
                        "configured"
                    } else {
                        "random per process"
                    }
                );
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    let token_secret = token_secret?;

    // Initialize logging from config.
    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!(%addr, "Starting Peercast relay");

    let server_config = ServerConfig {
        max_viewers: cfg.server.max_viewers,
        token_ttl: tokio::time::Duration::from_secs(cfg.server.token_ttl_secs),
        ping_timeout: tokio::time::Duration::from_secs(cfg.server.ping_timeout_secs),
        sweep_interval: tokio::time::Duration::from_secs(cfg.server.sweep_interval_secs),
        max_message_size: cfg.server.max_message_size,
        max_connections_per_ip: cfg.server.max_connections_per_ip,
        send_queue_capacity: cfg.server.send_queue_capacity,
        token_secret,
    };

    let relay = RelayServer::new(server_config)?;

    // Start the liveness sweep
    let cleanup_server = relay.clone();
    tokio::spawn(async move {
        cleanup_server.cleanup_task().await;
    });

    let app = websocket::create_router(&cfg.cors_origins)
        .fallback(|| async {
            "Peercast Relay. Use /ws for the WebSocket protocol, /v1/nodes for the session API, /v1/metrics for metrics."
        })
        .with_state(relay);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.cors_origins,
        "Server started - WebSocket: /ws, Session API: /v1/nodes, Metrics: /v1/metrics"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn decode_token_secret(raw: Option<&str>) -> anyhow::Result<Option<[u8; 32]>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let decoded = BASE64
        .decode(raw)
        .map_err(|e| anyhow::anyhow!("token_secret is not valid base64: {e}"))?;
    let len = decoded.len();
    let key: [u8; 32] = decoded
        .try_into()
        .map_err(|_| anyhow::anyhow!("token_secret must decode to 32 bytes, got {len}"))?;
    Ok(Some(key))
}

#[cfg(test)]
mod cli_tests {
    use super::{decode_token_secret, Cli};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["peercast-relay"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_validate_config_long_and_short() {
        let cli = Cli::try_parse_from(["peercast-relay", "--validate-config"]).unwrap();
        assert!(cli.validate_config);

        let cli = Cli::try_parse_from(["peercast-relay", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn test_cli_print_config() {
        let cli = Cli::try_parse_from(["peercast-relay", "--print-config"]).unwrap();
        assert!(cli.print_config);
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        // --validate-config and --print-config are mutually exclusive
        let result =
            Cli::try_parse_from(["peercast-relay", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_token_secret() {
        assert_eq!(decode_token_secret(None).unwrap(), None);

        let key = BASE64.encode([5u8; 32]);
        assert_eq!(decode_token_secret(Some(&key)).unwrap(), Some([5u8; 32]));

        assert!(decode_token_secret(Some("!!!")).is_err());
        let short = BASE64.encode([5u8; 8]);
        assert!(decode_token_secret(Some(&short)).is_err());
    }
}
