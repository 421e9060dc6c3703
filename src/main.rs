mod app;
mod attribution;
mod logging;
mod util;

use std::path::PathBuf;

use clap::Parser;

/// Interactive explorer for attribution graph subgraphs.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Attribution graph JSON document.
    graph: PathBuf,

    /// Share query or link to restore on top of the graph's embedded view.
    #[arg(long)]
    query: Option<String>,

    /// Log filter directive, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, default_value_t = 1440.0)]
    window_width: f32,

    #[arg(long, default_value_t = 920.0)]
    window_height: f32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(&args.log_level)?;

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([args.window_width, args.window_height]),
        ..Default::default()
    };

    eframe::run_native(
        "attribution subgraph",
        options,
        Box::new(move |cc| {
            Ok(Box::new(app::AttributionApp::new(
                cc,
                args.graph.clone(),
                args.query.clone(),
            )))
        }),
    )
    .map_err(|error| anyhow::anyhow!("failed to run the viewer: {error}"))
}
