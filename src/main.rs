// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pillbox Companion

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pillbox_companion::bluetooth::{BluezPicker, PeripheralClaims};
use pillbox_companion::config::Config;
use pillbox_companion::events::{self, EventProcessor, NoticeBoard};
use pillbox_companion::registry::DeviceRegistry;
use pillbox_companion::session::SessionContext;
use pillbox_companion::storage::DeviceStore;
use pillbox_companion::time_sync::LocalClock;
use pillbox_companion::ui::{self, Console, StdinConfirm};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pillbox_companion=info".parse()?),
        )
        .init();

    info!("Starting Pillbox Companion v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Initialize storage
    let store = DeviceStore::new(&config.data_dir)?;
    info!("Device storage initialized");

    // Initialize BLE central
    let picker = BluezPicker::new().await?;
    info!("Bluetooth adapter ready");

    let (event_tx, mut event_rx) = events::channel();
    let context = SessionContext {
        picker: Arc::new(picker),
        clock: Arc::new(LocalClock),
        settings: config.session_settings(),
        claims: PeripheralClaims::new(),
        events: event_tx,
    };
    let registry = Arc::new(DeviceRegistry::with_store(context, store)?);

    // Render session events
    let notices = NoticeBoard::new();
    let mut processor = EventProcessor::new(std::io::stdout(), notices.clone());
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Err(e) = processor.process_event(event) {
                error!("Error rendering event: {}", e);
            }
        }
    });

    let input = ui::stdin_lines();
    let prompt = Arc::new(StdinConfirm::new(input.clone()));
    let console = Console::new(
        registry.clone(),
        input,
        prompt,
        config.alarm.clone(),
        notices,
    );

    info!("Ready. {} device(s) known.", registry.len());

    tokio::select! {
        result = console.run() => {
            if let Err(e) = result {
                warn!("Console stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    registry.shutdown().await;
    info!("Pillbox Companion stopped");
    Ok(())
}
