use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use stay_scout::map::{CameraSurface, HeadlessMap, WidgetCall};
use stay_scout::query::ParamSet;
use stay_scout::search::{HttpSearchBackend, SearchBackend, StaticBackend};
use stay_scout::{HostEffect, SyncConfig, ViewEvent, ViewSyncController};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stay-scout", about = "Run a map/list stay search against a headless map")]
struct Cli {
    /// Search parameters as a URL query string
    #[arg(long, default_value = "destination=Seoul&adults=2")]
    params: String,

    /// Search API base URL; the built-in catalogue is used when absent
    #[arg(long, env = "STAY_SCOUT_API_URL")]
    api_url: Option<String>,

    /// Page to request after the first results arrive
    #[arg(long)]
    page: Option<u32>,

    /// JSON file with controller settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "search_results.json")]
    output: PathBuf,
}

type Controller = ViewSyncController<HeadlessMap>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stay_scout=debug")),
        )
        .init();

    info!("🏠 Stay Scout - map/list search");
    info!("===============================");

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?.with_env_overrides(),
        None => SyncConfig::from_env(),
    };

    let backend: Arc<dyn SearchBackend> = match &cli.api_url {
        Some(url) => Arc::new(HttpSearchBackend::new(url)?),
        None => Arc::new(StaticBackend::sample()),
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (effects_tx, mut effects_rx) = mpsc::unbounded_channel();
    let mut controller = ViewSyncController::new(
        config,
        backend,
        HeadlessMap::new(),
        events_tx,
        effects_tx,
    );

    dispatch(&mut controller, ViewEvent::WidgetReady);
    // initial layout
    dispatch(&mut controller, ViewEvent::CameraIdle);
    dispatch(&mut controller, ViewEvent::Navigated(ParamSet::parse(&cli.params)));

    let mut pending_page = cli.page;
    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => dispatch(&mut controller, event),
            Some(effect) = effects_rx.recv() => match effect {
                HostEffect::ResultsChanged => {
                    let Some(page) = pending_page.take() else { break };
                    let before = controller.last_query().cloned();
                    dispatch(&mut controller, ViewEvent::PageRequested(page));
                    if controller.last_query() == before.as_ref() {
                        break;
                    }
                }
                HostEffect::ShowError(message) => anyhow::bail!("Search failed: {message}"),
                HostEffect::ReplaceParams(params) => {
                    info!("URL state: ?{}", params.to_query_string());
                }
                other => debug!(?other, "Unhandled host effect"),
            },
            else => break,
        }
    }

    // Display results
    let results = controller.results();
    info!(
        "\n✅ Page {} of {} ({} stays)\n",
        results.current_page + 1,
        results.total_pages,
        results.total_elements
    );

    for (i, listing) in results.listings.iter().enumerate() {
        println!("{}. {} ({} / night)", i + 1, listing.name, listing.price);
        if let Some(city) = &listing.city {
            println!("   City: {}", city);
        }
        if let Some(review) = &listing.review {
            println!("   Rating: {:.1} ({} reviews)", review.average, review.count);
        }
        println!("   ID: {}", listing.id);
        println!();
    }

    if let Some(camera) = controller.widget().bounds() {
        println!(
            "Map camera: N {:.4} S {:.4} E {:.4} W {:.4} ({} markers)",
            camera.north,
            camera.south,
            camera.east,
            camera.west,
            controller.widget().markers().len()
        );
    }

    let json = serde_json::to_string_pretty(results)?;
    tokio::fs::write(&cli.output, json)
        .await
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!("💾 Saved results to {}", cli.output.display());

    Ok(())
}

/// Handle one event, then play the widget's part: a real map reports an
/// idle once every camera command finishes animating.
fn dispatch(controller: &mut Controller, event: ViewEvent) {
    controller.handle(event);

    let moved = controller
        .widget_mut()
        .take_calls()
        .iter()
        .any(|call| matches!(call, WidgetCall::FitBounds(..) | WidgetCall::SetZoom(_)));
    if moved {
        controller.handle(ViewEvent::CameraIdle);
    }
}
