use eframe::egui::{self, RichText, Ui};

use crate::attribution::{AttributionGraph, FeatureLink};
use crate::util::{format_weight, truncate_label};

use super::super::aggregate::override_aware_label;
use super::super::render_utils::{text_color_for, weight_color};
use super::super::state::ViewState;
use super::super::{OverrideDraft, ViewModel};

const TOP_LINK_ROWS: usize = 12;

/// One neighbor row of the details panel.
struct LinkRow {
    node_id: String,
    ctx_idx: f32,
    label: String,
    weight: f64,
    pct_input: f64,
    pinned: bool,
}

fn link_rows(
    graph: &AttributionGraph,
    state: &ViewState,
    links: Vec<&FeatureLink>,
    incoming: bool,
) -> Vec<LinkRow> {
    links
        .into_iter()
        .map(|link| {
            let (source, target) = graph.link_endpoints(link);
            let other = if incoming { source } else { target };
            LinkRow {
                node_id: other.node_id.clone(),
                ctx_idx: other.ctx_idx,
                label: override_aware_label(state, other),
                weight: link.weight,
                pct_input: link.pct_input,
                pinned: state.is_pinned(&other.node_id),
            }
        })
        .collect()
}

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let Some(clicked_id) = self.state.clicked_id.clone() else {
            ui.label("Click a node in the subgraph or in the search results.");
            return;
        };

        egui::ScrollArea::vertical()
            .id_salt("details_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if let Some(supernode) = self.subgraph.node(&clicked_id).filter(|node| node.is_supernode()) {
                    let members = supernode
                        .members
                        .iter()
                        .filter_map(|&member| self.graph.nodes.get(member).map(|node| (member, node)))
                        .map(|(member, node)| {
                            let weighting = self
                                .subgraph
                                .member(member)
                                .map_or(0.0, |pinned| pinned.input_weighting);
                            (node.node_id.clone(), node.ctx_idx, override_aware_label(&self.state, node), weighting)
                        })
                        .collect::<Vec<_>>();

                    ui.label(RichText::new(supernode.label.as_str()).strong());
                    ui.small(format!("supernode  |  {} members", supernode.members.len()));
                    ui.add_space(6.0);
                    ui.label(format!("Mean layer: {}", supernode.layer));
                    ui.label(format!("Mean ctx index: {:.2}", supernode.ctx_idx));
                    ui.label(format!("Input abs sum: {:.4}", supernode.input_abs_sum));
                    ui.label(format!("External input: {:.4}", supernode.input_abs_sum_external));

                    ui.separator();
                    ui.label(RichText::new("Members").strong());
                    for (node_id, ctx_idx, label, weighting) in members {
                        ui.horizontal(|ui| {
                            if ui.link(truncate_label(&label, 32)).on_hover_text(node_id.as_str()).clicked() {
                                self.state.toggle_clicked(&node_id, ctx_idx);
                            }
                            ui.weak(format!("{:.0}% of input", weighting * 100.0));
                        });
                    }
                    return;
                }

                let Some(&index) = self.graph.index_by_id.get(&clicked_id) else {
                    ui.label("Selected node is not part of this graph.");
                    return;
                };
                self.draw_node_details(ui, index);
            });
    }

    fn draw_node_details(&mut self, ui: &mut Ui, index: usize) {
        let node = &self.graph.nodes[index];
        let node_id = node.node_id.clone();
        let feature_id = node.feature_id.clone();
        let label = override_aware_label(&self.state, node);

        ui.label(RichText::new(label.as_str()).strong());
        ui.small(format!("{}  |  {}", node.node_id, node.feature_id));
        ui.add_space(6.0);
        ui.label(format!("{}  |  ctx {}", node.layer_label(), node.ctx_idx));
        ui.label(format!("Stream index: {}", node.stream_idx));
        ui.label(format!("Feature type: {}", node.feature_type));
        ui.label(format!("Input abs sum: {:.4}", node.input_abs_sum));
        if let Some(member) = self.subgraph.member(index) {
            ui.label(format!("External input: {:.4}", member.input_abs_sum_external));
            if let Some(supernode) = &member.supernode_id {
                ui.label(format!(
                    "In supernode {supernode} ({:.0}% of its input)",
                    member.input_weighting * 100.0
                ));
            }
        }
        if let Some(explanation) = node.explanation.as_deref().filter(|text| !text.is_empty()) {
            ui.label(format!("Explanation: {explanation}"));
        }
        let incoming = link_rows(&self.graph, &self.state, self.graph.top_incoming(index, TOP_LINK_ROWS), true);
        let outgoing = link_rows(&self.graph, &self.state, self.graph.top_outgoing(index, TOP_LINK_ROWS), false);

        let pin_text = if self.state.is_pinned(&node_id) { "Unpin" } else { "Pin to subgraph" };
        if ui.button(pin_text).clicked() {
            self.state.toggle_pinned(&node_id);
        }

        ui.separator();
        self.draw_label_override(ui, &feature_id, &label);

        ui.separator();
        ui.label(RichText::new("Strongest inputs").strong());
        self.draw_link_rows(ui, incoming);
        ui.separator();
        ui.label(RichText::new("Strongest outputs").strong());
        self.draw_link_rows(ui, outgoing);
    }

    fn draw_label_override(&mut self, ui: &mut Ui, feature_id: &str, label: &str) {
        ui.label(RichText::new("Label").strong())
            .on_hover_text("Overrides are keyed by feature id and stored in the share link.");

        if self
            .override_draft
            .as_ref()
            .is_none_or(|draft| draft.feature_id != feature_id)
        {
            self.override_draft = Some(OverrideDraft {
                feature_id: feature_id.to_owned(),
                text: label.to_owned(),
            });
        }
        let Some(draft) = self.override_draft.as_mut() else {
            return;
        };

        let enter = ui.text_edit_singleline(&mut draft.text).lost_focus()
            && ui.input(|input| input.key_pressed(egui::Key::Enter));
        let mut save = enter;
        let mut reset = false;
        ui.horizontal(|ui| {
            save |= ui.button("Save label").clicked();
            reset = ui
                .add_enabled(
                    self.state.label_override(feature_id).is_some(),
                    egui::Button::new("Reset"),
                )
                .clicked();
        });

        if save {
            let text = draft.text.clone();
            self.state.set_label_override(feature_id, &text);
            self.search_match_cache = None;
        }
        if reset {
            self.state.set_label_override(feature_id, "");
            self.override_draft = None;
            self.search_match_cache = None;
        }
    }

    fn draw_link_rows(&mut self, ui: &mut Ui, rows: Vec<LinkRow>) {
        if rows.is_empty() {
            ui.weak("None.");
            return;
        }

        for row in rows {
            ui.horizontal(|ui| {
                let color = weight_color(row.pct_input);
                ui.label(
                    RichText::new(format_weight(row.weight))
                        .monospace()
                        .background_color(color)
                        .color(text_color_for(color)),
                )
                .on_hover_text(format!("{:.1}% of target input", row.pct_input * 100.0));

                let pin_text = if row.pinned { "Unpin" } else { "Pin" };
                if ui.small_button(pin_text).clicked() {
                    self.state.toggle_pinned(&row.node_id);
                }
                if ui
                    .link(truncate_label(&row.label, 30))
                    .on_hover_text(row.node_id.as_str())
                    .clicked()
                {
                    self.state.toggle_clicked(&row.node_id, row.ctx_idx);
                }
            });
        }
    }
}
