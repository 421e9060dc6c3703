use crate::attribution::{AttributionGraph, DefaultViewParams};

pub(in crate::app) const MAX_PINNED_NODES: usize = 200;
pub(in crate::app) const DEFAULT_SUPERNODE_LABEL: &str = "supernode";
const DEFAULT_DENSITY_THRESHOLD: f64 = 1.0;

/// One user-defined group, persisted as `[label, ...member ids]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(in crate::app) struct GroupingEntry {
    pub label: String,
    pub member_ids: Vec<String>,
}

impl GroupingEntry {
    pub(in crate::app) fn new(label: impl Into<String>, member_ids: Vec<String>) -> Self {
        Self {
            label: label.into(),
            member_ids,
        }
    }

    pub(in crate::app) fn from_array(values: &[String]) -> Option<Self> {
        let (label, member_ids) = values.split_first()?;
        Some(Self::new(label.clone(), member_ids.to_vec()))
    }

    pub(in crate::app) fn to_array(&self) -> Vec<String> {
        let mut values = Vec::with_capacity(self.member_ids.len() + 1);
        values.push(self.label.clone());
        values.extend(self.member_ids.iter().cloned());
        values
    }

    pub(in crate::app) fn members_within(&self, ids: &[String]) -> bool {
        self.member_ids.iter().all(|id| ids.contains(id))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(in crate::app) struct ActiveGrouping {
    pub is_active: bool,
    /// Insertion-ordered selection of visible node ids.
    pub selected_ids: Vec<String>,
}

impl ActiveGrouping {
    pub(in crate::app) fn toggle(&mut self, node_id: &str) {
        if let Some(position) = self.selected_ids.iter().position(|id| id == node_id) {
            self.selected_ids.remove(position);
        } else {
            self.selected_ids.push(node_id.to_owned());
        }
    }

    pub(in crate::app) fn contains(&self, node_id: &str) -> bool {
        self.selected_ids.iter().any(|id| id == node_id)
    }

    pub(in crate::app) fn reset(&mut self) {
        self.is_active = false;
        self.selected_ids.clear();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct ViewState {
    pub pinned_ids: Vec<String>,
    pub clicked_id: Option<String>,
    pub clicked_ctx_idx: Option<f32>,
    pub hovered_id: Option<String>,
    pub hovered_ctx_idx: Option<f32>,
    pub edit_mode: bool,
    pub sticky: bool,
    pub auto_arrange: bool,
    pub supernodes: Vec<GroupingEntry>,
    pub active_grouping: ActiveGrouping,
    /// `(feature id, label)` pairs.
    pub label_overrides: Vec<(String, String)>,
    /// Pending permille layout, consumed by the next layout rebuild.
    pub saved_positions: Option<String>,
    pub applied_positions: Option<String>,
    pub exported_positions: Option<String>,
    pub pruning_threshold: Option<f64>,
    pub density_threshold: Option<f64>,
    pub is_editing_label: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            pinned_ids: Vec::new(),
            clicked_id: None,
            clicked_ctx_idx: None,
            hovered_id: None,
            hovered_ctx_idx: None,
            edit_mode: true,
            sticky: true,
            auto_arrange: true,
            supernodes: Vec::new(),
            active_grouping: ActiveGrouping::default(),
            label_overrides: Vec::new(),
            saved_positions: None,
            applied_positions: None,
            exported_positions: None,
            pruning_threshold: None,
            density_threshold: Some(DEFAULT_DENSITY_THRESHOLD),
            is_editing_label: false,
        }
    }
}

/// Everything whose change forces the layout to be torn down and rebuilt.
#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct LayoutKey {
    pinned_ids: Vec<String>,
    supernodes: Vec<GroupingEntry>,
    label_overrides: Vec<(String, String)>,
    sticky: bool,
    auto_arrange: bool,
    saved_positions: Option<String>,
    canvas_size: (u32, u32),
}

impl ViewState {
    /// Blank state, then the graph's embedded view. The graph's own node threshold
    /// wins over an embedded pruning threshold and density always starts at 1.
    pub(in crate::app) fn for_graph(graph: &AttributionGraph) -> Self {
        let mut state = Self::default();
        if let Some(defaults) = &graph.default_view {
            state.apply_default_view(defaults, graph);
        }
        if graph.metadata.node_threshold.is_some() {
            state.pruning_threshold = graph.metadata.node_threshold;
        }
        state.density_threshold = Some(DEFAULT_DENSITY_THRESHOLD);
        state
    }

    pub(in crate::app) fn apply_default_view(
        &mut self,
        defaults: &DefaultViewParams,
        graph: &AttributionGraph,
    ) {
        self.pinned_ids = defaults.pinned_ids.clone();
        self.clicked_id = defaults
            .clicked_id
            .clone()
            .filter(|id| graph.contains(id));
        self.clicked_ctx_idx = self
            .clicked_id
            .as_deref()
            .and_then(|id| graph.node(id))
            .map(|node| node.ctx_idx);
        self.supernodes = defaults
            .supernodes
            .iter()
            .filter_map(|values| GroupingEntry::from_array(values))
            .collect();
        self.label_overrides = label_pairs(&defaults.clerps);
        self.saved_positions = defaults.saved_positions.clone();
        if defaults.pruning_threshold.is_some() {
            self.pruning_threshold = defaults.pruning_threshold;
        }
    }

    /// Drops every grouping entry whose members all lie in `member_ids`.
    /// Returns how many entries were removed.
    pub(in crate::app) fn ungroup(&mut self, member_ids: &[String]) -> usize {
        let before = self.supernodes.len();
        self.supernodes
            .retain(|entry| !entry.members_within(member_ids));
        before - self.supernodes.len()
    }

    pub(in crate::app) fn honored_pinned_ids(&self) -> &[String] {
        let limit = self.pinned_ids.len().min(MAX_PINNED_NODES);
        &self.pinned_ids[..limit]
    }

    pub(in crate::app) fn is_pinned(&self, node_id: &str) -> bool {
        self.pinned_ids.iter().any(|id| id == node_id)
    }

    pub(in crate::app) fn toggle_pinned(&mut self, node_id: &str) {
        if let Some(position) = self.pinned_ids.iter().position(|id| id == node_id) {
            self.pinned_ids.remove(position);
        } else {
            self.pinned_ids.push(node_id.to_owned());
        }
    }

    pub(in crate::app) fn toggle_clicked(&mut self, node_id: &str, ctx_idx: f32) {
        if self.clicked_id.as_deref() == Some(node_id) {
            self.clicked_id = None;
            self.clicked_ctx_idx = None;
        } else {
            self.clicked_id = Some(node_id.to_owned());
            self.clicked_ctx_idx = Some(ctx_idx);
        }
    }

    pub(in crate::app) fn set_hovered(&mut self, hovered: Option<(&str, f32)>) {
        self.hovered_id = hovered.map(|(id, _)| id.to_owned());
        self.hovered_ctx_idx = hovered.map(|(_, ctx_idx)| ctx_idx);
    }

    pub(in crate::app) fn label_override(&self, feature_id: &str) -> Option<&str> {
        self.label_overrides
            .iter()
            .find(|(id, _)| id == feature_id)
            .map(|(_, label)| label.as_str())
    }

    pub(in crate::app) fn set_label_override(&mut self, feature_id: &str, label: &str) {
        let label = label.trim();
        let existing = self
            .label_overrides
            .iter()
            .position(|(id, _)| id == feature_id);

        match (existing, label.is_empty()) {
            (Some(index), true) => {
                self.label_overrides.remove(index);
            }
            (Some(index), false) => self.label_overrides[index].1 = label.to_owned(),
            (None, false) => self
                .label_overrides
                .push((feature_id.to_owned(), label.to_owned())),
            (None, true) => {}
        }
    }

    pub(in crate::app) fn layout_key(&self, canvas_size: (u32, u32)) -> LayoutKey {
        LayoutKey {
            pinned_ids: self.honored_pinned_ids().to_vec(),
            supernodes: self.supernodes.clone(),
            label_overrides: self.label_overrides.clone(),
            sticky: self.sticky,
            auto_arrange: self.auto_arrange,
            saved_positions: self.saved_positions.clone(),
            canvas_size,
        }
    }
}

pub(in crate::app) fn label_pairs(values: &[Vec<String>]) -> Vec<(String, String)> {
    values
        .iter()
        .filter_map(|pair| match pair.as_slice() {
            [feature_id, label, ..] => Some((feature_id.clone(), label.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pin_cap_honors_first_two_hundred_ids() {
        let state = ViewState {
            pinned_ids: (0..250).map(|index| format!("n{index}")).collect(),
            ..ViewState::default()
        };

        let honored = state.honored_pinned_ids();
        assert_eq!(honored.len(), MAX_PINNED_NODES);
        assert_eq!(honored.first().map(String::as_str), Some("n0"));
        assert_eq!(honored.last().map(String::as_str), Some("n199"));
    }

    #[test]
    fn toggling_pin_adds_then_removes() {
        let mut state = ViewState::default();
        state.toggle_pinned("a");
        state.toggle_pinned("b");
        assert_eq!(state.pinned_ids, vec!["a", "b"]);

        state.toggle_pinned("a");
        assert_eq!(state.pinned_ids, vec!["b"]);
    }

    #[test]
    fn clicking_same_node_twice_clears_selection() {
        let mut state = ViewState::default();
        state.toggle_clicked("a", 3.0);
        assert_eq!(state.clicked_id.as_deref(), Some("a"));
        assert_eq!(state.clicked_ctx_idx, Some(3.0));

        state.toggle_clicked("a", 3.0);
        assert_eq!(state.clicked_id, None);
        assert_eq!(state.clicked_ctx_idx, None);
    }

    #[test]
    fn label_override_updates_and_removes() {
        let mut state = ViewState::default();
        state.set_label_override("f1", "capital");
        state.set_label_override("f1", " state capital ");
        assert_eq!(state.label_override("f1"), Some("state capital"));

        state.set_label_override("f1", "   ");
        assert_eq!(state.label_override("f1"), None);
        assert!(state.label_overrides.is_empty());
    }

    #[test]
    fn grouping_entry_round_trips_through_array_form() {
        let values = vec!["texas".to_owned(), "a".to_owned(), "b".to_owned()];
        let entry = GroupingEntry::from_array(&values).unwrap();

        assert_eq!(entry.label, "texas");
        assert_eq!(entry.member_ids, vec!["a", "b"]);
        assert_eq!(entry.to_array(), values);
        assert_eq!(GroupingEntry::from_array(&[]), None);
    }

    #[test]
    fn ungroup_drops_nested_entries_too() {
        let mut state = ViewState {
            supernodes: vec![
                GroupingEntry::new("ab", vec!["a".to_owned(), "b".to_owned()]),
                GroupingEntry::new("a", vec!["a".to_owned()]),
                GroupingEntry::new("cd", vec!["c".to_owned(), "d".to_owned()]),
            ],
            ..ViewState::default()
        };

        assert_eq!(state.ungroup(&["a".to_owned(), "b".to_owned()]), 2);
        assert_eq!(
            state.supernodes,
            vec![GroupingEntry::new("cd", vec!["c".to_owned(), "d".to_owned()])]
        );
    }

    #[test]
    fn graph_node_threshold_wins_and_density_starts_at_one() {
        let graph = crate::attribution::parse_graph_document(
            r#"{
                "metadata": { "slug": "s", "node_threshold": 0.6 },
                "nodes": [{ "nodeId": "a", "layer": "0", "ctx_idx": 0, "clerp": "a" }],
                "links": [],
                "qParams": { "pinnedIds": "a", "pruningThreshold": 0.9, "densityThreshold": 0.2 }
            }"#,
        )
        .unwrap();

        let state = ViewState::for_graph(&graph);
        assert_eq!(state.pinned_ids, vec!["a"]);
        assert_eq!(state.pruning_threshold, Some(0.6));
        assert_eq!(state.density_threshold, Some(1.0));
    }

    #[test]
    fn embedded_pruning_applies_without_node_threshold() {
        let graph = crate::attribution::parse_graph_document(
            r#"{
                "nodes": [{ "nodeId": "a", "layer": "0", "ctx_idx": 0, "clerp": "a" }],
                "links": [],
                "qParams": { "pruningThreshold": 0.9 }
            }"#,
        )
        .unwrap();

        assert_eq!(ViewState::for_graph(&graph).pruning_threshold, Some(0.9));
    }

    #[test]
    fn layout_key_ignores_styling_only_fields() {
        let mut state = ViewState::default();
        let before = state.layout_key((800, 400));

        state.hovered_id = Some("a".to_owned());
        state.clicked_id = Some("b".to_owned());
        state.active_grouping.toggle("a");
        assert_eq!(state.layout_key((800, 400)), before);

        state.sticky = false;
        assert!(state.layout_key((800, 400)) != before);
    }
}
