use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use console_core::{
    api::ResourceClient, channel::WebSocketChannel, ConsoleEvent, Dashboard, LiveUpdateController,
};
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the dashboard server, e.g. http://localhost:5000
    #[arg(long)]
    server_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let api = ResourceClient::new(&args.server_url)?;
    let dashboard = Dashboard::new(api);
    let channel = WebSocketChannel::connect(&args.server_url).await?;

    let mut events = dashboard.subscribe_events();
    let controller = LiveUpdateController::new(Arc::clone(&dashboard), channel);
    controller.start().await?;

    // The subscription is process-lifetime; render state changes until the
    // event stream closes or the process is terminated.
    while let Ok(event) = events.recv().await {
        match event {
            ConsoleEvent::InstanceListUpdated { instances } => {
                info!(count = instances.len(), "instance list updated");
                for instance in &instances {
                    let name = instance
                        .attribute("name")
                        .and_then(|value| value.as_str())
                        .unwrap_or("(unnamed)");
                    info!(pk = instance.pk.0, name, "instance");
                }
            }
            ConsoleEvent::SelectionChanged { category, instance } => match instance {
                Some(instance) => info!(%category, pk = instance.pk.0, "selection updated"),
                None => info!(%category, "selection cleared"),
            },
        }
    }

    Ok(())
}
