use eframe::egui::Vec2;
use tracing::{debug, warn};

use crate::attribution::AttributionGraph;

use super::aggregate::Subgraph;
use super::physics::ForceSimulation;
use super::state::{DEFAULT_SUPERNODE_LABEL, GroupingEntry, ViewState};

/// What the pointer is over: a node box, or one member circle inside a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::app) enum HitTarget {
    Node { visible: usize },
    Member { visible: usize, member: usize },
}

impl HitTarget {
    pub(in crate::app) fn visible(self) -> usize {
        match self {
            Self::Node { visible } | Self::Member { visible, .. } => visible,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(in crate::app) struct PointerState {
    pub button_down: bool,
    /// Ctrl on Linux/Windows, Cmd on macOS.
    pub command: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(in crate::app) struct DragState {
    pub particle: usize,
    pub grab_offset: Vec2,
    pub moved: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(in crate::app) struct LabelEdit {
    pub supernode_id: String,
    pub member_ids: Vec<String>,
    pub text: String,
}

/// The graph, its current aggregation, and the view state an event may mutate.
pub(in crate::app) struct Dispatch<'a> {
    pub graph: &'a AttributionGraph,
    pub subgraph: &'a Subgraph,
    pub state: &'a mut ViewState,
}

/// Transient pointer and keyboard state threaded through every canvas event.
#[derive(Debug, Default)]
pub(in crate::app) struct InteractionState {
    pub hovered: Option<HitTarget>,
    pub tooltip: Option<HitTarget>,
    pub drag: Option<DragState>,
    pub label_edit: Option<LabelEdit>,
}

impl InteractionState {
    pub(in crate::app) fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub(in crate::app) fn is_busy(&self) -> bool {
        self.drag.is_some() || self.label_edit.is_some()
    }

    /// Pointer moved onto `target` (or off everything when `None`).
    pub(in crate::app) fn hover(&mut self, dispatch: Dispatch<'_>, target: Option<HitTarget>, pointer: PointerState) {
        if target == self.hovered || pointer.button_down {
            return;
        }

        self.hovered = target;
        self.tooltip = None;
        dispatch.state.set_hovered(None);

        let Some(target) = target else {
            return;
        };
        if dispatch.state.active_grouping.is_active || dispatch.state.is_editing_label || pointer.command {
            return;
        }

        let (feature_id, ctx_idx) = match target {
            HitTarget::Node { visible } => {
                let Some(node) = dispatch.subgraph.nodes.get(visible) else {
                    return;
                };
                (node.feature_id.as_str(), node.ctx_idx)
            }
            HitTarget::Member { member, .. } => {
                let Some(node) = dispatch.graph.nodes.get(member) else {
                    return;
                };
                (node.feature_id.as_str(), node.ctx_idx)
            }
        };
        dispatch.state.set_hovered(Some((feature_id, ctx_idx)));
        self.tooltip = Some(target);
    }

    pub(in crate::app) fn click(&mut self, dispatch: Dispatch<'_>, target: HitTarget, pointer: PointerState) {
        let Dispatch {
            graph,
            subgraph,
            state,
        } = dispatch;
        let Some(node) = subgraph.nodes.get(target.visible()) else {
            return;
        };

        if state.active_grouping.is_active {
            state.active_grouping.toggle(&node.node_id);
            return;
        }

        match target {
            HitTarget::Node { .. } if pointer.command => {
                if node.is_supernode() {
                    debug!(supernode = node.node_id, "ignoring pin toggle on supernode box");
                } else {
                    state.toggle_pinned(&node.node_id);
                }
            }
            HitTarget::Node { .. } => state.toggle_clicked(&node.node_id, node.ctx_idx),
            HitTarget::Member { member, .. } => {
                let Some(member) = graph.nodes.get(member) else {
                    return;
                };
                if pointer.command {
                    state.toggle_pinned(&member.node_id);
                } else {
                    state.toggle_clicked(&member.node_id, member.ctx_idx);
                }
            }
        }
    }

    pub(in crate::app) fn grouping_key_pressed(&mut self, state: &mut ViewState, repeat: bool) {
        if repeat || !state.edit_mode || state.is_editing_label || state.active_grouping.is_active {
            return;
        }
        state.active_grouping.is_active = true;
        state.set_hovered(None);
        self.tooltip = None;
    }

    pub(in crate::app) fn grouping_key_released(&mut self, dispatch: Dispatch<'_>) {
        let Dispatch {
            graph,
            subgraph,
            state,
        } = dispatch;
        if !state.active_grouping.is_active {
            return;
        }

        if state.active_grouping.selected_ids.len() > 1 {
            let entry = merge_selection(graph, subgraph, state);
            debug!(label = entry.label, members = entry.member_ids.len(), "grouped nodes");
        }
        state.active_grouping.reset();
    }

    pub(in crate::app) fn ungroup(&mut self, dispatch: Dispatch<'_>, visible: usize) {
        let Dispatch {
            subgraph, state, ..
        } = dispatch;
        if !state.edit_mode {
            return;
        }
        let Some(node) = subgraph.nodes.get(visible).filter(|node| node.is_supernode()) else {
            return;
        };

        let removed = state.ungroup(&node.member_node_ids);
        debug!(supernode = node.node_id, removed, "ungrouped supernode");
    }

    pub(in crate::app) fn begin_label_edit(&mut self, dispatch: Dispatch<'_>, visible: usize) {
        let Dispatch {
            subgraph, state, ..
        } = dispatch;
        if !state.edit_mode {
            return;
        }
        let Some(node) = subgraph.nodes.get(visible).filter(|node| node.is_supernode()) else {
            return;
        };

        self.label_edit = Some(LabelEdit {
            supernode_id: node.node_id.clone(),
            member_ids: node.member_node_ids.clone(),
            text: node.label.clone(),
        });
        self.tooltip = None;
        state.is_editing_label = true;
        state.set_hovered(None);
    }

    /// Writes the edited label into the grouping entry it was opened on.
    pub(in crate::app) fn commit_label_edit(&mut self, state: &mut ViewState) {
        state.is_editing_label = false;
        let Some(edit) = self.label_edit.take() else {
            return;
        };

        let Some(entry) = state
            .supernodes
            .iter_mut()
            .find(|entry| entry.members_within(&edit.member_ids))
        else {
            warn!(supernode = edit.supernode_id, "supernode disappeared while editing its label");
            return;
        };

        let label = edit.text.trim();
        entry.label = if label.is_empty() {
            DEFAULT_SUPERNODE_LABEL.to_owned()
        } else {
            label.to_owned()
        };
    }

    /// Cancels a label edit whose supernode is no longer visible. Returns true if
    /// the edit was dropped.
    pub(in crate::app) fn drop_orphaned_label_edit(&mut self, subgraph: &Subgraph, state: &mut ViewState) -> bool {
        let Some(edit) = &self.label_edit else {
            return false;
        };
        if subgraph.index_by_id.contains_key(&edit.supernode_id) {
            return false;
        }
        warn!(supernode = edit.supernode_id, "supernode disappeared while editing its label");
        self.cancel_label_edit(state);
        true
    }

    pub(in crate::app) fn cancel_label_edit(&mut self, state: &mut ViewState) {
        self.label_edit = None;
        state.is_editing_label = false;
    }

    pub(in crate::app) fn begin_drag(&mut self, simulation: &mut ForceSimulation, particle: usize, pointer: Vec2) {
        let Some(position) = simulation.particles().get(particle).map(|particle| particle.position) else {
            return;
        };
        simulation.begin_drag(particle);
        self.drag = Some(DragState {
            particle,
            grab_offset: pointer - position,
            moved: false,
        });
    }

    pub(in crate::app) fn drag_to(&mut self, simulation: &mut ForceSimulation, pointer: Vec2) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        drag.moved = true;
        simulation.drag_to(drag.particle, pointer - drag.grab_offset);
        self.tooltip = None;
    }

    pub(in crate::app) fn end_drag(&mut self, simulation: &mut ForceSimulation, sticky: bool) {
        if let Some(drag) = self.drag.take() {
            simulation.end_drag(drag.particle, sticky);
        }
    }

    /// Forgets per-layout state after the subgraph was rebuilt.
    pub(in crate::app) fn reset_for_rebuild(&mut self) {
        self.hovered = None;
        self.tooltip = None;
        self.drag = None;
    }
}

/// Replaces the selected boxes by one grouping entry and returns it.
fn merge_selection(graph: &AttributionGraph, subgraph: &Subgraph, state: &mut ViewState) -> GroupingEntry {
    let mut collected: Vec<String> = Vec::new();
    let mut preferred_label = None;
    let mut removed: Vec<usize> = Vec::new();

    for selected in &state.active_grouping.selected_ids {
        match subgraph.node(selected).filter(|node| node.is_supernode()) {
            Some(supernode) => {
                collected.extend(supernode.member_node_ids.iter().cloned());
                preferred_label = Some(supernode.label.clone());
                if let Some(index) = state
                    .supernodes
                    .iter()
                    .position(|entry| entry.members_within(&supernode.member_node_ids))
                    && !removed.contains(&index)
                {
                    removed.push(index);
                }
            }
            None => collected.push(selected.clone()),
        }
    }

    let mut member_ids = Vec::with_capacity(collected.len());
    for id in collected {
        if !member_ids.contains(&id) {
            member_ids.push(id);
        }
    }

    let label = preferred_label
        .or_else(|| {
            member_ids
                .iter()
                .filter_map(|id| subgraph.display_label(graph, id))
                .find(|label| !label.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| DEFAULT_SUPERNODE_LABEL.to_owned());

    let removed_members = removed
        .iter()
        .map(|&index| state.supernodes[index].member_ids.clone())
        .collect::<Vec<_>>();
    let mut kept = Vec::with_capacity(state.supernodes.len() + 1);
    for (index, entry) in state.supernodes.drain(..).enumerate() {
        let absorbed = removed.contains(&index)
            || removed_members
                .iter()
                .any(|members| entry.members_within(members));
        if !absorbed {
            kept.push(entry);
        }
    }

    let entry = GroupingEntry::new(label, member_ids);
    kept.push(entry.clone());
    state.supernodes = kept;
    entry
}
