use anyhow::{Context, Result};
use chat_realtime::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, ConfigType, ShutdownManager,
};
use chat_realtime::config::AppConfig;
use hublink::{EventHandlers, HttpNegotiator, SharedIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How often the main loop reports the connection state
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Optional first argument overrides CONFIG_PATH
    let config_type = match parse_args().into_iter().next() {
        Some(path) => ConfigType::Custom(path),
        None => ConfigType::ChatClient,
    };
    let config_path = load_config_from_env(config_type);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing_with_level(&config.log_level);
    config.log();

    let identity = SharedIdentity::new();
    identity.set(config.hub.identity.clone());
    let identity = Arc::new(identity);

    let mut negotiator =
        HttpNegotiator::new(&config.hub.negotiate_url)?.with_identity(identity.clone());
    if let Some(key) = &config.hub.access_key {
        negotiator = negotiator.with_access_key(key.clone());
    }

    let manager = hublink::builder()
        .negotiator(negotiator)
        .websocket()
        .shared_identity(identity)
        .config(config.manager.clone())
        .handlers(logging_handlers())
        .build()?;

    print_banner(&config.hub.negotiate_url);

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let state = manager.connect().await;
    if !state.is_connected {
        warn!(
            "Initial connect failed ({}), retrying in the background",
            state.error.as_deref().unwrap_or("unknown error")
        );
    }

    while shutdown.is_running() {
        shutdown.interruptible_sleep(STATUS_INTERVAL).await;
        if shutdown.is_running() {
            info!(
                "Status: {:?} (retry attempt {})",
                manager.phase(),
                manager.retry_attempt()
            );
        }
    }

    manager.shutdown().await;
    print_shutdown();
    Ok(())
}

fn logging_handlers() -> EventHandlers {
    EventHandlers::new()
        .on_message_received(|message| {
            info!(
                "[{}] {}: {}",
                message.conversation_id, message.sender_id, message.content
            );
        })
        .on_user_typing(|event| {
            info!("[{}] {} is typing...", event.conversation_id, event.user_id);
        })
        .on_user_stopped_typing(|event| {
            info!("[{}] {} stopped typing", event.conversation_id, event.user_id);
        })
        .on_message_read(|receipt| {
            info!(
                "[{}] {} read {} message(s)",
                receipt.conversation_id,
                receipt.user_id,
                receipt.message_ids.len()
            );
        })
        .on_connection_change(|state| {
            if state.is_connected {
                info!("Connection: connected");
            } else if state.is_connecting {
                info!("Connection: connecting...");
            } else {
                warn!(
                    "Connection: disconnected ({})",
                    state.error.as_deref().unwrap_or("no error")
                );
            }
        })
}

fn print_banner(url: &str) {
    info!("");
    info!("========================================");
    info!("Starting chat client");
    info!("Hub: {}", url);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown() {
    info!("");
    info!("========================================");
    info!("Chat client stopped gracefully");
    info!("========================================");
}
