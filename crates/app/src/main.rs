//! Trellis - federated inter-game chat client
//!
//! A headless reference host that connects a game to the Trellis relay
//! network. An embedding game server would drive the same crates from its
//! own scheduler and player registry; this binary stands in with a pulse
//! loop and a settings-seeded roster.

use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod context;
mod roster;

use trellis_core::Settings;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Trellis");

    let path = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => path,
        None => match Settings::default_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Could not locate settings: {}", e);
                std::process::exit(1);
            }
        },
    };

    let settings = match Settings::load(&path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load settings from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };

    let mut context = context::Context::new(settings);
    context.run().await;
}
