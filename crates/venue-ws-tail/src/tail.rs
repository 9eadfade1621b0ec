/*
[INPUT]:  Tail configuration and a shutdown token
[OUTPUT]: One log line per delivered payload until shutdown
[POS]:    Runner - wires the client to logging
[UPDATE]: When changing what is logged or how startup failures are handled
*/

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use venue_ws_adapter::{WsClient, WsError};

use crate::config::{SubscriptionConfig, TailConfig};

/// Payloads longer than this are cut in log lines
const PAYLOAD_LOG_MAX_CHARS: usize = 1024;

/// Connect, subscribe to every configured channel and log until `shutdown`
pub async fn run(config: &TailConfig, shutdown: CancellationToken) -> Result<()> {
    let client = WsClient::new(config.client_config()?);

    client
        .set_listeners(
            |message| info!(message = %clip(message), "venue message"),
            |err| warn!(error = %err, "venue error"),
        )
        .context("install listeners")?;

    for subscription in &config.subscriptions {
        subscribe_logged(&client, subscription).await?;
    }

    match client.connect().await {
        Ok(()) => info!(subscriptions = client.subscriptions().len(), "tail running"),
        Err(err) if is_recoverable(&err) => {
            warn!(error = %err, "first connection attempt failed; retrying in background")
        }
        Err(err) => return Err(err).context("connect"),
    }

    shutdown.cancelled().await;
    client.close().await;
    info!("tail stopped");
    Ok(())
}

async fn subscribe_logged(client: &WsClient, subscription: &SubscriptionConfig) -> Result<()> {
    let arg = subscription.arg();
    let label = arg.to_string();
    let log = move |payload: &str| {
        info!(subscription = %label, payload = %clip(payload), "data");
    };
    let result = if subscription.private {
        client.subscribe_private(arg, log).await
    } else {
        client.subscribe(arg, log).await
    };
    result.with_context(|| format!("subscribe {}", subscription.channel))
}

/// The supervisor keeps retrying these; anything else means the config is wrong
fn is_recoverable(err: &WsError) -> bool {
    err.is_retryable() || matches!(err, WsError::Authentication { .. })
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(PAYLOAD_LOG_MAX_CHARS) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
