//! Example bot entry point
//!
//! Run with:
//! ```bash
//! CORD_TOKEN=... cargo run -p cord-client --bin cord-bot
//! ```
//!
//! Configuration is loaded from `CORD_*` environment variables. Replies
//! `pong` to any message reading `!ping`.

use cord_client::{Client, GatewayEvent, GatewayHandle, HandlerError, RestClient, Route};
use cord_common::{try_init_tracing_with_config, TracingConfig};
use serde_json::json;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_env()) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Bot stopped with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting cord-bot...");

    let client = Client::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        shard = %client.config().shard,
        api_version = client.config().api_version,
        "Configuration loaded"
    );

    client.on("READY", |_, event: GatewayEvent| async move {
        let user = event.data["user"]["username"].as_str().unwrap_or("unknown");
        info!(user, "Logged in");
        Ok(())
    });

    let rest = client.rest().clone();
    client.on("MESSAGE_CREATE", move |_: GatewayHandle, event| {
        let rest = rest.clone();
        async move { reply_to_ping(&rest, &event).await }
    });

    let gateway = client.start().await?;

    let join = gateway.join();
    tokio::pin!(join);

    tokio::select! {
        result = &mut join => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            client.stop();
            join.await?;
        }
    }

    info!("cord-bot stopped");
    Ok(())
}

async fn reply_to_ping(rest: &RestClient, event: &GatewayEvent) -> Result<(), HandlerError> {
    if event.data["content"].as_str() != Some("!ping") {
        return Ok(());
    }
    let Some(channel_id) = event.data["channel_id"].as_str() else {
        return Ok(());
    };

    rest.request(
        Route::post(format!("/channels/{channel_id}/messages")),
        Some(json!({ "content": "pong" })),
    )
    .await?;
    Ok(())
}
