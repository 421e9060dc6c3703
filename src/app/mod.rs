use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use eframe::egui::{self, Context, Vec2};
use tracing::error;

use crate::attribution::{AttributionGraph, load_attribution_graph};

mod aggregate;
mod graph;
mod highlight;
mod interaction;
mod layout;
mod physics;
mod render_utils;
mod state;
mod ui;
mod url_sync;

#[cfg(test)]
mod test_support;

use aggregate::Subgraph;
use graph::EdgeLabelAnchors;
use interaction::InteractionState;
use physics::LayoutSlot;
use state::{LayoutKey, ViewState};
use url_sync::UrlSync;

pub struct AttributionApp {
    graph_path: PathBuf,
    startup_query: Option<String>,
    state: AppState,
    reload_rx: Option<Receiver<Result<AttributionGraph, String>>>,
}

enum AppState {
    Loading {
        rx: Receiver<Result<AttributionGraph, String>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    graph: AttributionGraph,
    state: ViewState,
    subgraph: Subgraph,
    layout: LayoutSlot,
    layout_key: Option<LayoutKey>,
    /// Particle index for every visible node of `subgraph`.
    particle_of_visible: Vec<usize>,
    interaction: InteractionState,
    label_anchors: EdgeLabelAnchors,
    focus_label_edit: bool,
    url_sync: UrlSync,
    pan: Vec2,
    zoom: f32,
    search: String,
    search_match_cache: Option<SearchMatchCache>,
    override_draft: Option<OverrideDraft>,
    query_input: String,
    query_errors: Vec<String>,
}

struct SearchMatchCache {
    query: String,
    matches: Vec<usize>,
}

/// Label override being typed in the details panel for one feature.
struct OverrideDraft {
    feature_id: String,
    text: String,
}

impl AttributionApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        graph_path: PathBuf,
        startup_query: Option<String>,
    ) -> Self {
        let state = Self::start_load(graph_path.clone());
        Self {
            graph_path,
            startup_query,
            state,
            reload_rx: None,
        }
    }

    fn spawn_load(graph_path: PathBuf) -> Receiver<Result<AttributionGraph, String>> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = load_attribution_graph(&graph_path).map_err(|error| {
                error!(error = format!("{error:#}"), "failed to load attribution graph");
                format!("{error:#}")
            });
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(graph_path: PathBuf) -> AppState {
        AppState::Loading {
            rx: Self::spawn_load(graph_path),
        }
    }

    fn ready(&self, graph: AttributionGraph) -> AppState {
        AppState::Ready(Box::new(ViewModel::new(graph, self.startup_query.as_deref())))
    }
}

impl eframe::App for AttributionApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;
        let mut retry = false;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(result) => {
                        transition = Some(result);
                    }
                    Err(TryRecvError::Empty) => ctx.request_repaint(),
                    Err(TryRecvError::Disconnected) => {
                        transition = Some(Err("Background load worker disconnected".to_owned()));
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading attribution graph...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load attribution graph");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    retry = ui.button("Retry").clicked();
                });
            }
            AppState::Ready(model) => {
                let mut reload_requested = false;
                let is_reloading = self.reload_rx.is_some();
                model.show(ctx, &self.graph_path, &mut reload_requested, is_reloading);

                if reload_requested && self.reload_rx.is_none() {
                    self.reload_rx = Some(Self::spawn_load(self.graph_path.clone()));
                }

                if let Some(rx) = self.reload_rx.take() {
                    match rx.try_recv() {
                        Ok(result) => transition = Some(result),
                        Err(TryRecvError::Empty) => {
                            self.reload_rx = Some(rx);
                            ctx.request_repaint();
                        }
                        Err(TryRecvError::Disconnected) => {
                            transition = Some(Err("Background load worker disconnected".to_owned()));
                        }
                    }
                }
            }
        }

        if retry {
            self.state = Self::start_load(self.graph_path.clone());
            return;
        }

        if let Some(result) = transition {
            self.reload_rx = None;
            self.state = match result {
                Ok(graph) => self.ready(graph),
                Err(error) => AppState::Error(error),
            };
        }
    }
}
