//! Walks one session through its whole lifecycle.
//!
//! Run with: cargo run -p session-demo
//!
//! Without `ENGAGE_BASE_URL` the demo runs against a scripted in-memory
//! platform. Set `ENGAGE_BASE_URL`, `ENGAGE_API_KEY` and `ENGAGE_TOKEN` to
//! talk to a live endpoint instead.

use std::{env, sync::Arc};

use anyhow::Context as _;
use engage_core::{
    ChannelKey, Event, FetchQuery, Identity, SessionConfig, Token, TokenError, Transport,
    UserAttributes, WireMessage, project, token_provider_fn,
};
use engage_session::{MemoryTransport, MessageChannel, OutboundChannel, SessionManager};
use engage_transport::{HttpTransport, HttpTransportConfig};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FEED: &str = "home-feed";

fn scripted_platform() -> anyhow::Result<MemoryTransport> {
    let platform = MemoryTransport::new();
    let message = |id: &str, title: &str, action: serde_json::Value| -> anyhow::Result<WireMessage> {
        Ok(serde_json::from_value(json!({
            "messageId": id,
            "elements": {
                "title": title,
                "body": "Sent by the demo platform",
                "buttons": [
                    {"id": "dismiss", "title": "Dismiss"},
                    {"id": "open", "title": "Open", "action": action}
                ]
            },
            "payload": {"bg_color": "#f0fdf4", "button2_corner_radius": 12}
        }))?)
    };

    platform.set_candidates(vec![message(
        "prompt-1",
        "Welcome aboard",
        json!({"type": "custom", "data": "app://tour"}),
    )?]);
    platform.set_message_set(
        &ChannelKey::new(FEED),
        vec![
            message("feed-1", "New offers", json!({"type": "openUrl", "data": "app://offers"}))?,
            message("feed-2", "Profile tips", json!({"type": "dismiss"}))?,
        ],
    );
    Ok(platform)
}

fn transport() -> anyhow::Result<Arc<dyn Transport>> {
    match env::var("ENGAGE_BASE_URL") {
        Ok(base_url) => {
            let api_key = env::var("ENGAGE_API_KEY").context("ENGAGE_API_KEY is required")?;
            tracing::info!(%base_url, "Using HTTP transport");
            Ok(Arc::new(HttpTransport::new(HttpTransportConfig::new(
                base_url, api_key,
            ))?))
        }
        Err(_) => {
            tracing::info!("Using in-memory platform");
            Ok(Arc::new(scripted_platform()?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let identity = Identity::new(
        env::var("ENGAGE_IDENTITY").unwrap_or_else(|_| "demo.user@example.com".to_string()),
    )?;
    let package_name = env::var("ENGAGE_PACKAGE").unwrap_or_else(|_| "engage-demo".to_string());

    // Read per call so a fresh token backs every initialization attempt.
    let tokens = token_provider_fn(|identity: Identity| async move {
        let value = env::var("ENGAGE_TOKEN").unwrap_or_else(|_| "demo-token".to_string());
        if value.is_empty() {
            return Err(TokenError::Issuance("ENGAGE_TOKEN is empty".to_string()));
        }
        Ok(Token::new(value, identity))
    });

    let session = Arc::new(SessionManager::new(Arc::new(tokens), transport()?));
    session
        .initialize(SessionConfig::new(identity, package_name))
        .await?;
    tracing::info!(status = ?session.status().status, "Session initialized");

    let outbound = OutboundChannel::new(Arc::clone(&session));
    outbound
        .update_user(
            &UserAttributes::new()
                .with("firstName", "Demo")
                .with("isWebUser", true)
                .with("onboardingStep", "completed"),
        )
        .await?;
    outbound
        .track(&Event::new("demoStarted").with_field("surface", "cli"))
        .await?;

    let prompts = MessageChannel::ephemeral(Arc::clone(&session));
    match prompts.fetch_one(FetchQuery::default()).await? {
        Some(message) => match project(&message) {
            Some(tree) => println!("Prompt: {} ({} buttons)", tree.title, tree.buttons.len()),
            None => println!("Prompt {} could not be displayed", message.id),
        },
        None => println!("No prompt waiting"),
    }

    let feed = MessageChannel::persistent(Arc::clone(&session), ChannelKey::new(FEED));
    let mut changes = feed.subscribe();
    feed.sync().await?;
    if let Ok(change) = changes.try_recv() {
        println!("Feed changed: +{:?} -{:?}", change.added, change.removed);
    }

    let mut view = feed.working_view();
    let trees: Vec<_> = view.messages().iter().filter_map(|m| project(m)).collect();
    for tree in &trees {
        println!("Feed item {}: {}", tree.message_id, tree.title);
        for button in &tree.buttons {
            println!("  [{}] radius={}", button.title, button.style.corner_radius);
        }
    }

    for tree in &trees {
        if let Some(dispatch) = tree.dispatch("open") {
            match view.apply(dispatch) {
                Some(custom) => println!(
                    "Custom action {} ({}) -> {}",
                    custom.button_id, custom.kind, custom.data
                ),
                None => println!("Dismissed {}", tree.message_id),
            }
        }
    }

    println!(
        "Displayed {} of {} cached feed messages",
        view.len(),
        feed.get_all().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use engage_core::SessionHandle;

    use super::*;

    #[tokio::test]
    async fn test_scripted_platform_serves_every_message() {
        let platform = scripted_platform().unwrap();
        let session = SessionHandle::new("demo");

        let prompts = platform
            .fetch_messages(&session, &FetchQuery::new(5))
            .await
            .unwrap();
        assert_eq!(prompts.len(), 1);

        let feed = platform
            .sync_message_set(&session, &ChannelKey::new(FEED))
            .await
            .unwrap();
        assert_eq!(feed.len(), 2);
    }
}
