use std::collections::HashMap;

use eframe::egui::Color32;

use crate::attribution::AttributionGraph;

use super::aggregate::Subgraph;
use super::render_utils::weight_color;

/// Styling derived from the clicked node. Rebuilt from nothing on every frame.
#[derive(Debug, Default, PartialEq)]
pub(super) struct HighlightState {
    pub clicked_visible: Option<usize>,
    /// Member (graph index) -> tint from the original link reaching it.
    pub member_tints: HashMap<usize, Color32>,
    /// Visible node feeding the clicked node -> combined link index.
    pub clicked_sources: HashMap<usize, usize>,
    /// Visible node fed by the clicked node -> combined link index.
    pub clicked_targets: HashMap<usize, usize>,
}

impl HighlightState {
    pub(super) fn is_link_highlighted(&self, source: usize, target: usize) -> bool {
        self.clicked_visible
            .is_some_and(|clicked| clicked == source || clicked == target)
    }
}

pub(super) fn build_highlight_state(
    graph: &AttributionGraph,
    subgraph: &Subgraph,
    clicked_id: Option<&str>,
) -> HighlightState {
    let Some(clicked) = clicked_id.and_then(|id| subgraph.index_by_id.get(id).copied()) else {
        return HighlightState::default();
    };

    let mut state = HighlightState {
        clicked_visible: Some(clicked),
        ..HighlightState::default()
    };
    for (link_index, link) in subgraph.links.iter().enumerate() {
        if link.source == clicked {
            for &original in &link.original_links {
                let original = &graph.links[original];
                state.member_tints.insert(original.target, weight_color(original.pct_input));
            }
            state.clicked_targets.insert(link.target, link_index);
        } else if link.target == clicked {
            for &original in &link.original_links {
                let original = &graph.links[original];
                state.member_tints.insert(original.source, weight_color(original.pct_input));
            }
            state.clicked_sources.insert(link.source, link_index);
        }
    }
    state
}
