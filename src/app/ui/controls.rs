use eframe::egui::{self, Color32, RichText, Ui};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::attribution::AttributionGraph;
use crate::util::truncate_label;

use super::super::aggregate::override_aware_label;
use super::super::state::{MAX_PINNED_NODES, ViewState};
use super::super::{SearchMatchCache, ViewModel};

const SEARCH_RESULT_LIMIT: usize = 40;

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

/// Graph nodes whose label, feature id or node id match `query`, best first.
fn rank_search_matches(
    graph: &AttributionGraph,
    state: &ViewState,
    query: &str,
    limit: usize,
) -> Vec<usize> {
    let matcher = SkimMatcherV2::default();
    let mut scored = graph
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let label = override_aware_label(state, node);
            [label.as_str(), node.feature_id.as_str(), node.node_id.as_str()]
                .into_iter()
                .filter_map(|text| fuzzy_match_score(&matcher, text, query))
                .max()
                .map(|score| (score, index))
        })
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.truncate(limit);
    scored.into_iter().map(|(_, index)| index).collect()
}

impl ViewModel {
    fn search_matches(&mut self) -> Vec<usize> {
        let query = self.search.trim();
        if query.is_empty() {
            return Vec::new();
        }

        if let Some(cached) = &self.search_match_cache
            && cached.query == query
        {
            return cached.matches.clone();
        }

        let matches = rank_search_matches(&self.graph, &self.state, query, SEARCH_RESULT_LIMIT);
        self.search_match_cache = Some(SearchMatchCache {
            query: query.to_owned(),
            matches: matches.clone(),
        });
        matches
    }

    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        ui.heading("Subgraph Controls");
        ui.separator();
        ui.add_space(4.0);

        egui::ScrollArea::vertical()
            .id_salt("controls_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                self.draw_mode_toggles(ui);
                ui.separator();
                self.draw_search(ui);
                ui.separator();
                self.draw_pinned_list(ui);
                self.draw_supernode_list(ui);
                ui.separator();
                self.draw_thresholds(ui);
                ui.separator();
                self.draw_layout_controls(ui);
                ui.separator();
                self.draw_share_controls(ui);
                ui.separator();
                ui.collapsing("Shortcuts", |ui| {
                    ui.label("Click a node to select it, click again to clear.");
                    ui.label("Ctrl/Cmd + click pins or unpins a node.");
                    ui.label("Hold G in edit mode and click nodes to group them.");
                    ui.label("Click a supernode label in edit mode to rename it.");
                    ui.label("Drag boxes to move them, right or middle drag to pan.");
                    ui.label("Scroll to zoom around the pointer.");
                });
            });
    }

    fn draw_mode_toggles(&mut self, ui: &mut Ui) {
        let edit_changed = ui
            .checkbox(&mut self.state.edit_mode, "Edit mode")
            .on_hover_text("Allow grouping, ungrouping and renaming supernodes.")
            .changed();
        if edit_changed && !self.state.edit_mode {
            self.state.active_grouping.reset();
            self.interaction.cancel_label_edit(&mut self.state);
        }

        ui.checkbox(&mut self.state.sticky, "Sticky nodes")
            .on_hover_text("Keep dragged nodes where they were dropped.");
        ui.checkbox(&mut self.state.auto_arrange, "Auto-arrange")
            .on_hover_text("Apply a saved layout from the share link when one is present.");
    }

    fn draw_search(&mut self, ui: &mut Ui) {
        ui.label("Search (label, feature or node id)")
            .on_hover_text("Fuzzy-search the whole graph to pin nodes into the subgraph.");
        ui.text_edit_singleline(&mut self.search);

        let matches = self.search_matches();
        if matches.is_empty() {
            if !self.search.trim().is_empty() {
                ui.weak("No matching nodes.");
            }
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("search_results_scroll")
            .max_height(220.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for index in matches {
                    let Some(node) = self.graph.nodes.get(index) else {
                        continue;
                    };
                    let node_id = node.node_id.clone();
                    let ctx_idx = node.ctx_idx;
                    let label = truncate_label(&override_aware_label(&self.state, node), 36);
                    let layer = node.layer_label();
                    let pinned = self.state.is_pinned(&node_id);

                    ui.horizontal(|ui| {
                        let pin_text = if pinned { "Unpin" } else { "Pin" };
                        if ui.small_button(pin_text).clicked() {
                            self.state.toggle_pinned(&node_id);
                        }
                        if ui
                            .link(label)
                            .on_hover_text(format!("{node_id}  |  {layer}"))
                            .clicked()
                        {
                            self.state.toggle_clicked(&node_id, ctx_idx);
                        }
                    });
                }
            });
    }

    fn draw_pinned_list(&mut self, ui: &mut Ui) {
        let count = self.state.pinned_ids.len();
        ui.collapsing(format!("Pinned nodes ({count})"), |ui| {
            if count > MAX_PINNED_NODES {
                ui.colored_label(
                    Color32::from_rgb(200, 120, 30),
                    format!("Only the first {MAX_PINNED_NODES} pinned nodes are shown."),
                );
            }

            let mut unpin = None;
            for (position, node_id) in self.state.pinned_ids.iter().enumerate() {
                let label = self
                    .graph
                    .node(node_id)
                    .map(|node| override_aware_label(&self.state, node))
                    .unwrap_or_else(|| node_id.clone());
                ui.horizontal(|ui| {
                    if ui.small_button("×").on_hover_text("Unpin").clicked() {
                        unpin = Some(position);
                    }
                    ui.label(truncate_label(&label, 36)).on_hover_text(node_id.as_str());
                });
            }
            if let Some(position) = unpin {
                self.state.pinned_ids.remove(position);
            }

            if count > 0 && ui.button("Clear pinned").clicked() {
                self.state.pinned_ids.clear();
            }
        });
    }

    fn draw_supernode_list(&mut self, ui: &mut Ui) {
        let count = self.state.supernodes.len();
        ui.collapsing(format!("Supernodes ({count})"), |ui| {
            if count == 0 {
                ui.weak("Hold G and click nodes to group them.");
                return;
            }

            let mut removed = None;
            for entry in &self.state.supernodes {
                ui.horizontal(|ui| {
                    let ungroup = ui
                        .add_enabled(self.state.edit_mode, egui::Button::new("Ungroup").small())
                        .on_disabled_hover_text("Enable edit mode to ungroup.");
                    if ungroup.clicked() {
                        removed = Some(entry.member_ids.clone());
                    }
                    ui.label(RichText::new(truncate_label(&entry.label, 28)).strong());
                    ui.weak(format!("{} members", entry.member_ids.len()))
                        .on_hover_text(entry.member_ids.join(", "));
                });
            }
            if let Some(member_ids) = removed {
                self.state.ungroup(&member_ids);
            }
        });
    }

    fn draw_thresholds(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Thresholds").strong())
            .on_hover_text("Stored in the share link for the full graph view.");

        let mut pruning = self.state.pruning_threshold.unwrap_or(0.8);
        if ui
            .add(egui::Slider::new(&mut pruning, 0.0..=1.0).text("Pruning"))
            .changed()
        {
            self.state.pruning_threshold = Some(pruning);
        }

        let mut density = self.state.density_threshold.unwrap_or(1.0);
        if ui
            .add(egui::Slider::new(&mut density, 0.0..=1.0).text("Density"))
            .changed()
        {
            self.state.density_threshold = Some(density);
        }
    }

    fn draw_layout_controls(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Layout").strong());
        ui.horizontal(|ui| {
            if ui
                .button("Export layout")
                .on_hover_text("Store current positions in the share link.")
                .clicked()
            {
                self.export_layout();
            }
            if self.state.exported_positions.is_some() && ui.button("Forget").clicked() {
                self.state.exported_positions = None;
            }
        });

        if let Some(applied) = self.state.applied_positions.clone()
            && ui
                .add_enabled(self.state.auto_arrange, egui::Button::new("Reapply saved layout"))
                .clicked()
        {
            self.state.saved_positions = Some(applied);
        }
    }

    fn draw_share_controls(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Share").strong());
        let mut published = self.url_sync.published().to_owned();
        ui.add(
            egui::TextEdit::multiline(&mut published)
                .desired_rows(2)
                .interactive(false),
        );
        if ui.button("Copy query").clicked() {
            ui.ctx().copy_text(published);
        }

        ui.add_space(4.0);
        ui.label("Apply a query or share link");
        ui.text_edit_singleline(&mut self.query_input);
        if ui.button("Apply").clicked() && !self.query_input.trim().is_empty() {
            let input = std::mem::take(&mut self.query_input);
            self.apply_query(&input);
        }
        for error in &self.query_errors {
            ui.colored_label(Color32::from_rgb(190, 40, 40), error.as_str());
        }
    }
}
