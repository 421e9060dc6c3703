use std::path::Path;
use std::time::Instant;

use eframe::egui::{self, Align, Context, Layout, Vec2};
use tracing::debug;

use crate::attribution::AttributionGraph;

use super::super::aggregate::Subgraph;
use super::super::graph::EdgeLabelAnchors;
use super::super::interaction::InteractionState;
use super::super::physics::LayoutSlot;
use super::super::state::ViewState;
use super::super::url_sync::{URL_SYNC_DEBOUNCE, UrlSync, decode_query, encode_query};
use super::super::ViewModel;

impl ViewModel {
    /// Restores the view from the graph's embedded parameters, then from the
    /// startup query, which wins where both set a field.
    pub(in crate::app) fn new(graph: AttributionGraph, startup_query: Option<&str>) -> Self {
        let mut state = ViewState::for_graph(&graph);
        let mut query_errors = Vec::new();
        if let Some(query) = startup_query {
            let (overrides, errors) = decode_query(query);
            if let Some(slug) = overrides.slug.as_deref()
                && graph.metadata.slug.as_deref() != Some(slug)
            {
                debug!(slug, "startup query names a different graph slug");
            }
            overrides.apply(&mut state, &graph);
            query_errors = errors.iter().map(ToString::to_string).collect();
        }

        let url_sync = UrlSync::new(encode_query(&state, graph.metadata.slug.as_deref()));

        Self {
            graph,
            state,
            subgraph: Subgraph::default(),
            layout: LayoutSlot::default(),
            layout_key: None,
            particle_of_visible: Vec::new(),
            interaction: InteractionState::default(),
            label_anchors: EdgeLabelAnchors::default(),
            focus_label_edit: false,
            url_sync,
            pan: Vec2::ZERO,
            zoom: 1.0,
            search: String::new(),
            search_match_cache: None,
            override_draft: None,
            query_input: String::new(),
            query_errors,
        }
    }

    pub(in crate::app) fn show(
        &mut self,
        ctx: &Context,
        graph_path: &Path,
        reload_requested: &mut bool,
        is_loading: bool,
    ) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("attribution subgraph");
                    ui.separator();
                    if let Some(slug) = &self.graph.metadata.slug {
                        ui.label(format!("graph: {slug}"));
                    }
                    if let Some(scan) = &self.graph.metadata.scan {
                        ui.weak(scan.as_str()).on_hover_text("Transcoder scan the graph was built with.");
                    }
                    ui.label(format!("file: {}", graph_path.display()));
                    ui.label(format!("nodes: {}", self.graph.node_count()));
                    ui.label(format!("links: {}", self.graph.edge_count()));
                    let reload_button = ui.add_enabled(!is_loading, egui::Button::new("Reload graph"));
                    if reload_button.clicked() {
                        *reload_requested = true;
                    }
                    if ui.button("Reset view").clicked() {
                        self.pan = Vec2::ZERO;
                        self.zoom = 1.0;
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        if let Some(prompt) = &self.graph.metadata.prompt {
                            ui.label(prompt.as_str()).on_hover_text("Prompt the graph was traced on.");
                        }
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            if is_loading {
                ui.vertical_centered(|ui| {
                    ui.add_space(120.0);
                    ui.heading("Reloading attribution graph...");
                    ui.add_space(8.0);
                    ui.spinner();
                });
            } else {
                self.draw_graph(ui);
            }
        });

        self.sync_url(ctx);
    }

    fn sync_url(&mut self, ctx: &Context) {
        let now = Instant::now();
        let query = encode_query(&self.state, self.graph.metadata.slug.as_deref());
        self.url_sync.observe(query, now);
        if self.url_sync.poll(now).is_none() && self.url_sync.is_pending() {
            ctx.request_repaint_after(URL_SYNC_DEBOUNCE);
        }
    }

    /// Applies a pasted share link or query on top of the current view.
    pub(in crate::app) fn apply_query(&mut self, input: &str) {
        let (overrides, errors) = decode_query(input);
        overrides.apply(&mut self.state, &self.graph);
        self.query_errors = errors.iter().map(ToString::to_string).collect();
        self.search_match_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::app::test_support::graph_with_links;

    #[test]
    fn startup_query_overrides_embedded_view() {
        let graph = graph_with_links(&["a", "b"], &[("a", "b", 1.0)]);
        let model = ViewModel::new(graph, Some("pinnedIds=b&clickedId=zzz&densityThreshold=0.5"));

        assert_eq!(model.state.pinned_ids, vec!["b"]);
        assert_eq!(model.state.clicked_id, None);
        assert_eq!(model.state.density_threshold, Some(0.5));
        assert!(model.query_errors.is_empty());
    }

    #[test]
    fn malformed_fields_are_reported_and_skipped() {
        let graph = graph_with_links(&["a", "b"], &[]);
        let mut model = ViewModel::new(graph, None);

        model.apply_query("?pinnedIds=a&supernodes=%5Bnot-json");
        assert_eq!(model.state.pinned_ids, vec!["a"]);
        assert!(model.state.supernodes.is_empty());
        assert_eq!(model.query_errors.len(), 1);
    }
}
