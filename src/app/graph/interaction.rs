use eframe::egui::{self, Rect, Ui, Vec2, vec2};

use super::super::ViewModel;
use super::super::interaction::HitTarget;
use super::super::physics::{NODE_HEIGHT, NODE_WIDTH};
use super::super::render_utils::screen_to_world;

pub(in crate::app) const MEMBER_DIAMETER: f32 = 8.0;
const MEMBER_ROW_WIDTH: f32 = 4.0 * MEMBER_DIAMETER;
const MEMBER_ROW_INSET: Vec2 = vec2(3.0, 2.0);
const LABEL_TOP: f32 = MEMBER_ROW_INSET.y + MEMBER_DIAMETER + 1.0;
const UNGROUP_BUTTON_SIZE: f32 = 10.0;

/// Centers of the member circles relative to the box corner. Up to four sit
/// side by side with a one pixel gap, more overlap to fit the same row.
pub(in crate::app) fn member_offsets(count: usize) -> Vec<Vec2> {
    let step = if count <= 4 {
        MEMBER_DIAMETER + 1.0
    } else {
        (MEMBER_ROW_WIDTH - MEMBER_DIAMETER) / (count - 1) as f32
    };
    (0..count)
        .map(|index| {
            MEMBER_ROW_INSET + vec2(index as f32 * step + MEMBER_DIAMETER / 2.0, MEMBER_DIAMETER / 2.0)
        })
        .collect()
}

pub(in crate::app) fn node_rect(position: Vec2) -> Rect {
    Rect::from_min_size(position.to_pos2(), vec2(NODE_WIDTH, NODE_HEIGHT))
}

pub(in crate::app) fn label_rect(position: Vec2) -> Rect {
    Rect::from_min_max(
        (position + vec2(0.0, LABEL_TOP)).to_pos2(),
        (position + vec2(NODE_WIDTH, NODE_HEIGHT)).to_pos2(),
    )
}

/// The `x` sits just left of a supernode box, level with the member row.
pub(in crate::app) fn ungroup_rect(position: Vec2) -> Rect {
    Rect::from_min_size(
        (position + vec2(-UNGROUP_BUTTON_SIZE - 3.0, MEMBER_ROW_INSET.y)).to_pos2(),
        vec2(UNGROUP_BUTTON_SIZE, UNGROUP_BUTTON_SIZE),
    )
}

impl ViewModel {
    pub(in crate::app) fn handle_graph_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.2, 4.0);
        self.pan = pointer - rect.min - (world_before * self.zoom);
    }

    pub(in crate::app) fn handle_graph_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }
    }

    /// Topmost box (or member circle) under a canvas point. Later particles
    /// are drawn on top, so they are tested first.
    pub(in crate::app) fn hit_test(&self, positions: &[Vec2], point: Vec2) -> Option<HitTarget> {
        let simulation = self.layout.current()?;
        let visible_of_particle = self.visible_of_particle();

        (0..simulation.particles().len()).rev().find_map(|particle| {
            let visible = *visible_of_particle.get(particle)?;
            let position = *positions.get(visible)?;
            if !node_rect(position).contains(point.to_pos2()) {
                return None;
            }

            let node = self.subgraph.nodes.get(visible)?;
            let radius_sq = (MEMBER_DIAMETER / 2.0).powi(2);
            let member = member_offsets(node.members.len())
                .into_iter()
                .zip(&node.members)
                .rev()
                .find(|(offset, _)| (position + *offset - point).length_sq() <= radius_sq)
                .map(|(_, &member)| member);

            Some(match member {
                Some(member) => HitTarget::Member { visible, member },
                None => HitTarget::Node { visible },
            })
        })
    }

    /// Supernode whose ungroup button contains `point`, in edit mode only.
    pub(in crate::app) fn ungroup_hit(&self, positions: &[Vec2], point: Vec2) -> Option<usize> {
        if !self.state.edit_mode {
            return None;
        }
        self.subgraph
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_supernode())
            .find(|(visible, _)| {
                positions
                    .get(*visible)
                    .is_some_and(|&position| ungroup_rect(position).contains(point.to_pos2()))
            })
            .map(|(visible, _)| visible)
    }
}
