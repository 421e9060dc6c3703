use eframe::egui::{
    self, Align2, Color32, CursorIcon, Event, FontId, Key, Painter, PointerButton, Pos2, Rect,
    Sense, Shape, Stroke, StrokeKind, TextEdit, Ui, Vec2, vec2,
};

use crate::util::{format_weight, truncate_label};

use super::super::ViewModel;
use super::super::aggregate::{SubgraphNode, override_aware_label};
use super::super::highlight::{HighlightState, build_highlight_state};
use super::super::interaction::{Dispatch, HitTarget, PointerState};
use super::super::physics::{NODE_HEIGHT, NODE_WIDTH};
use super::super::render_utils::{
    EDGE_OPACITY, arrow_color, blend_color, draw_background, screen_to_world, text_color_for,
    with_opacity, world_to_screen,
};
use super::edges::{RoutedEdge, route_edges};
use super::interaction::{MEMBER_DIAMETER, label_rect, member_offsets, node_rect, ungroup_rect};

const LABEL_MAX_CHARS: usize = 14;
const GROUPING_TINT: Color32 = Color32::from_rgb(255, 196, 92);

impl ViewModel {
    fn visible_positions(&self) -> Vec<Vec2> {
        let Some(simulation) = self.layout.current() else {
            return Vec::new();
        };
        self.particle_of_visible
            .iter()
            .map(|&particle| {
                simulation
                    .particles()
                    .get(particle)
                    .map_or(Vec2::ZERO, |particle| particle.position)
            })
            .collect()
    }

    fn visible_externally_positioned(&self) -> Vec<bool> {
        let Some(simulation) = self.layout.current() else {
            return Vec::new();
        };
        self.particle_of_visible
            .iter()
            .map(|&particle| {
                simulation
                    .particles()
                    .get(particle)
                    .is_some_and(|particle| particle.externally_positioned)
            })
            .collect()
    }

    fn handle_grouping_key(&mut self, ui: &Ui) {
        let typing = ui.ctx().wants_keyboard_input();
        let events = ui.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    Event::Key {
                        key: Key::G,
                        pressed,
                        repeat,
                        ..
                    } => Some((*pressed, *repeat)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        });

        for (pressed, repeat) in events {
            if pressed {
                if !typing {
                    self.interaction.grouping_key_pressed(&mut self.state, repeat);
                }
            } else {
                self.interaction.grouping_key_released(Dispatch {
                    graph: &self.graph,
                    subgraph: &self.subgraph,
                    state: &mut self.state,
                });
            }
        }
    }

    fn handle_canvas_pointer(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
        positions: &[Vec2],
    ) {
        let (pan, zoom) = (self.pan, self.zoom);
        let to_world = |screen: Pos2| screen_to_world(rect, pan, zoom, screen);
        let (pointer, press_origin) = ui.input(|input| {
            (
                PointerState {
                    button_down: input.pointer.primary_down(),
                    command: input.modifiers.command,
                },
                input.pointer.press_origin(),
            )
        });

        let hovered = response
            .hover_pos()
            .and_then(|screen| self.hit_test(positions, to_world(screen)));
        if !self.interaction.is_dragging() {
            self.interaction.hover(
                Dispatch {
                    graph: &self.graph,
                    subgraph: &self.subgraph,
                    state: &mut self.state,
                },
                hovered,
                pointer,
            );
        }
        if hovered.is_some() {
            ui.ctx().set_cursor_icon(CursorIcon::PointingHand);
        }

        if response.drag_started_by(PointerButton::Primary)
            && !self.state.active_grouping.is_active
            && !self.state.is_editing_label
            && let Some(origin) = press_origin.map(to_world)
            && let Some(target) = self.hit_test(positions, origin)
            && let Some(&particle) = self.particle_of_visible.get(target.visible())
            && let Some(simulation) = self.layout.current_mut()
        {
            self.interaction.begin_drag(simulation, particle, origin);
        }

        if self.interaction.is_dragging() {
            if response.dragged_by(PointerButton::Primary)
                && let Some(pointer) = response.interact_pointer_pos()
                && let Some(simulation) = self.layout.current_mut()
            {
                self.interaction.drag_to(simulation, to_world(pointer));
            }
            if response.drag_stopped()
                && let Some(simulation) = self.layout.current_mut()
            {
                self.interaction.end_drag(simulation, self.state.sticky);
            }
        }

        if response.clicked_by(PointerButton::Primary)
            && let Some(point) = response.interact_pointer_pos().map(to_world)
        {
            self.handle_canvas_click(positions, point, pointer);
        }
    }

    fn handle_canvas_click(&mut self, positions: &[Vec2], point: Vec2, pointer: PointerState) {
        let grouping = self.state.active_grouping.is_active;

        if !grouping && let Some(visible) = self.ungroup_hit(positions, point) {
            self.interaction.ungroup(
                Dispatch {
                    graph: &self.graph,
                    subgraph: &self.subgraph,
                    state: &mut self.state,
                },
                visible,
            );
            return;
        }

        let Some(target) = self.hit_test(positions, point) else {
            return;
        };

        let on_supernode_label = match target {
            HitTarget::Node { visible } => {
                self.subgraph
                    .nodes
                    .get(visible)
                    .is_some_and(SubgraphNode::is_supernode)
                    && positions
                        .get(visible)
                        .is_some_and(|&position| label_rect(position).contains(point.to_pos2()))
            }
            HitTarget::Member { .. } => false,
        };

        let dispatch = Dispatch {
            graph: &self.graph,
            subgraph: &self.subgraph,
            state: &mut self.state,
        };
        if on_supernode_label && !grouping && !pointer.command && dispatch.state.edit_mode {
            self.interaction.begin_label_edit(dispatch, target.visible());
            self.focus_label_edit = true;
        } else {
            self.interaction.click(dispatch, target, pointer);
        }
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_pan(&response);
        self.refresh_layout(rect.size());
        self.handle_grouping_key(ui);

        if let Some(generation) = self.layout.current_generation() {
            self.layout.tick(generation);
        }

        let positions = self.visible_positions();
        self.handle_canvas_pointer(ui, rect, &response, &positions);

        let positions = self.visible_positions();
        let externally_positioned = self.visible_externally_positioned();
        let member_counts = self
            .subgraph
            .nodes
            .iter()
            .map(|node| node.members.len())
            .collect::<Vec<_>>();
        let edges = route_edges(&self.subgraph, &positions, &member_counts);
        self.label_anchors
            .update(&edges, &positions, &externally_positioned);
        let highlight =
            build_highlight_state(&self.graph, &self.subgraph, self.state.clicked_id.as_deref());

        self.draw_edges(&painter, rect, &edges, &highlight);
        let animating = self.draw_nodes(ui, &painter, rect, &positions, &highlight);
        self.draw_label_editor(ui, rect, &positions);
        self.draw_tooltip(&painter, response.hover_pos());

        let mut status = format!(
            "{} nodes  |  {} links",
            self.subgraph.nodes.len(),
            self.subgraph.links.len(),
        );
        if let Some(simulation) = self.layout.current() {
            status.push_str(&format!(
                "  |  alpha {:.3} (target {:.2})",
                simulation.alpha(),
                simulation.alpha_target()
            ));
        }
        if self.state.active_grouping.is_active {
            status.push_str(&format!(
                "  |  grouping {} selected, release G to merge",
                self.state.active_grouping.selected_ids.len()
            ));
        }
        painter.text(
            rect.left_top() + vec2(10.0, 10.0),
            Align2::LEFT_TOP,
            status,
            FontId::proportional(13.0),
            Color32::from_gray(70),
        );

        if self.layout.is_running() || self.interaction.is_busy() || animating {
            ui.ctx().request_repaint();
        }
    }

    fn draw_edges(
        &self,
        painter: &Painter,
        rect: Rect,
        edges: &[RoutedEdge],
        highlight: &HighlightState,
    ) {
        let (pan, zoom) = (self.pan, self.zoom);
        let to_screen = |world: Vec2| world_to_screen(rect, pan, zoom, world);
        let hovered = self
            .interaction
            .hovered
            .filter(|_| self.state.hovered_id.is_some())
            .map(HitTarget::visible);

        for edge in edges {
            let start = to_screen(edge.start);
            let end = to_screen(edge.end);
            painter.line_segment(
                [start, end],
                Stroke::new(edge.stroke_width * zoom, with_opacity(edge.color, EDGE_OPACITY)),
            );
            draw_mid_arrow(painter, start, end, edge.arrow, zoom);

            let labelled = hovered
                .is_some_and(|visible| visible == edge.source || visible == edge.target)
                || highlight.is_link_highlighted(edge.source, edge.target);
            if labelled
                && let Some(anchor) = self.label_anchors.anchor(edge.source, edge.target)
            {
                painter.text(
                    to_screen(anchor),
                    Align2::CENTER_CENTER,
                    format_weight(edge.weight),
                    FontId::proportional(10.0 * zoom),
                    arrow_color(edge.weight),
                );
            }
        }
    }

    /// Returns true while a selection animation is still in flight.
    fn draw_nodes(
        &self,
        ui: &Ui,
        painter: &Painter,
        rect: Rect,
        positions: &[Vec2],
        highlight: &HighlightState,
    ) -> bool {
        let (pan, zoom) = (self.pan, self.zoom);
        let to_screen = |world: Vec2| world_to_screen(rect, pan, zoom, world);
        let editing = self
            .interaction
            .label_edit
            .as_ref()
            .map(|edit| edit.supernode_id.as_str());
        let mut animating = false;

        for visible in self.visible_of_particle() {
            let (Some(node), Some(&position)) =
                (self.subgraph.nodes.get(visible), positions.get(visible))
            else {
                continue;
            };

            let is_clicked = self.state.clicked_id.as_deref() == Some(node.node_id.as_str());
            let is_hovered = self.state.hovered_id.as_deref() == Some(node.feature_id.as_str());
            let is_grouping_selected = self.state.active_grouping.contains(&node.node_id);

            let clicked_mix = ui.ctx().animate_bool(
                ui.make_persistent_id(("subgraph-node", node.node_id.as_str())),
                is_clicked,
            );
            if clicked_mix > 0.0 && clicked_mix < 1.0 {
                animating = true;
            }

            let fill = if is_grouping_selected {
                blend_color(Color32::WHITE, GROUPING_TINT, 0.55)
            } else {
                Color32::WHITE
            };
            let box_rect = Rect::from_min_max(
                to_screen(position),
                to_screen(position + vec2(NODE_WIDTH, NODE_HEIGHT)),
            );
            let corner = 3.0 * zoom;
            painter.rect_filled(box_rect, corner, fill);
            let stroke_width = if is_hovered { 1.6 } else { 1.0 } + clicked_mix * 1.4;
            let stroke_color = if is_clicked || is_hovered {
                Color32::from_gray(20)
            } else {
                Color32::from_gray(150)
            };
            painter.rect_stroke(
                box_rect,
                corner,
                Stroke::new(stroke_width, stroke_color),
                StrokeKind::Inside,
            );

            for (offset, &member) in member_offsets(node.members.len()).iter().zip(&node.members) {
                let Some(feature) = self.graph.nodes.get(member) else {
                    continue;
                };
                let center = to_screen(position + *offset);
                let radius = MEMBER_DIAMETER / 2.0 * zoom;
                let tint = highlight.member_tints.get(&member).copied();
                painter.circle_filled(center, radius, tint.unwrap_or(Color32::WHITE));

                let member_clicked =
                    node.is_supernode() && self.state.clicked_id.as_deref() == Some(feature.node_id.as_str());
                let member_hovered = self.state.hovered_id.as_deref() == Some(feature.feature_id.as_str());
                let width = if member_clicked {
                    2.0
                } else if member_hovered {
                    1.5
                } else {
                    0.8
                };
                let color = if feature.is_transcoder_feature() {
                    Color32::from_gray(60)
                } else {
                    Color32::from_gray(170)
                };
                painter.circle_stroke(center, radius, Stroke::new(width, color));
            }

            if editing != Some(node.node_id.as_str()) {
                let label_area = label_rect(position);
                painter.text(
                    to_screen(label_area.left_center().to_vec2() + vec2(3.0, 0.0)),
                    Align2::LEFT_CENTER,
                    truncate_label(&node.label, LABEL_MAX_CHARS),
                    FontId::proportional(10.0 * zoom),
                    text_color_for(fill),
                );
            }

            if self.state.edit_mode && node.is_supernode() {
                let button = ungroup_rect(position);
                painter.text(
                    to_screen(button.center().to_vec2()),
                    Align2::CENTER_CENTER,
                    "×",
                    FontId::proportional(12.0 * zoom),
                    Color32::from_gray(80),
                );
            }

            if let Some(link) = highlight
                .clicked_sources
                .get(&visible)
                .and_then(|&link| self.subgraph.links.get(link))
            {
                painter.text(
                    to_screen(position + vec2(5.0, NODE_HEIGHT + 2.0)),
                    Align2::LEFT_TOP,
                    format_weight(link.weight),
                    FontId::proportional(10.0 * zoom),
                    arrow_color(link.weight),
                );
            }
            if let Some(link) = highlight
                .clicked_targets
                .get(&visible)
                .and_then(|&link| self.subgraph.links.get(link))
            {
                painter.text(
                    to_screen(position + vec2(NODE_WIDTH - 5.0, NODE_HEIGHT + 2.0)),
                    Align2::RIGHT_TOP,
                    format_weight(link.weight),
                    FontId::proportional(10.0 * zoom),
                    arrow_color(link.weight),
                );
            }
        }

        animating
    }

    fn draw_label_editor(&mut self, ui: &mut Ui, rect: Rect, positions: &[Vec2]) {
        if self
            .interaction
            .drop_orphaned_label_edit(&self.subgraph, &mut self.state)
        {
            return;
        }
        let Some(supernode_id) = self
            .interaction
            .label_edit
            .as_ref()
            .map(|edit| edit.supernode_id.clone())
        else {
            return;
        };
        let Some(position) = self
            .subgraph
            .index_by_id
            .get(&supernode_id)
            .and_then(|&visible| positions.get(visible))
            .copied()
        else {
            return;
        };

        let area = node_rect(position);
        let editor_rect = Rect::from_min_max(
            world_to_screen(rect, self.pan, self.zoom, area.min.to_vec2()),
            world_to_screen(rect, self.pan, self.zoom, area.max.to_vec2()),
        );
        let font = FontId::proportional(10.0 * self.zoom.max(0.8));
        let Some(edit) = self.interaction.label_edit.as_mut() else {
            return;
        };
        let response = ui.put(
            editor_rect,
            TextEdit::singleline(&mut edit.text)
                .font(font)
                .desired_width(editor_rect.width()),
        );
        if self.focus_label_edit {
            response.request_focus();
            self.focus_label_edit = false;
        }

        if ui.input(|input| input.key_pressed(Key::Escape)) {
            self.interaction.cancel_label_edit(&mut self.state);
        } else if response.lost_focus() {
            self.interaction.commit_label_edit(&mut self.state);
        }
    }

    fn draw_tooltip(&self, painter: &Painter, pointer: Option<Pos2>) {
        let (Some(target), Some(pointer)) = (self.interaction.tooltip, pointer) else {
            return;
        };
        let Some(text) = self.tooltip_text(target) else {
            return;
        };

        let galley = painter.layout(text, FontId::proportional(12.0), Color32::from_gray(20), 280.0);
        let padding = vec2(6.0, 4.0);
        let origin = pointer + vec2(14.0, 14.0);
        let background = Rect::from_min_size(origin, galley.size() + padding * 2.0);
        painter.rect_filled(background, 4.0, Color32::from_rgba_unmultiplied(255, 255, 255, 240));
        painter.rect_stroke(
            background,
            4.0,
            Stroke::new(1.0, Color32::from_gray(180)),
            StrokeKind::Inside,
        );
        painter.galley(origin + padding, galley, Color32::from_gray(20));
    }

    fn tooltip_text(&self, target: HitTarget) -> Option<String> {
        let feature = match target {
            HitTarget::Node { visible } => {
                let node = self.subgraph.nodes.get(visible)?;
                if node.is_supernode() {
                    return Some(format!(
                        "{}\n{} members  |  layer {}",
                        node.label,
                        node.members.len(),
                        node.layer
                    ));
                }
                let &member = node.members.first()?;
                self.graph.nodes.get(member)?
            }
            HitTarget::Member { member, .. } => self.graph.nodes.get(member)?,
        };

        let label = match self.graph.index_by_id.get(&feature.node_id) {
            Some(index) => self
                .subgraph
                .member(*index)
                .map(|member| member.display_label.clone())
                .unwrap_or_else(|| override_aware_label(&self.state, feature)),
            None => override_aware_label(&self.state, feature),
        };
        Some(format!(
            "{label}\n{}  |  {}  |  ctx {}",
            feature.feature_id,
            feature.layer_label(),
            feature.ctx_idx
        ))
    }
}

fn draw_mid_arrow(painter: &Painter, start: Pos2, end: Pos2, color: Color32, zoom: f32) {
    let delta = end - start;
    if delta.length_sq() <= f32::EPSILON {
        return;
    }

    let direction = delta.normalized();
    let normal = vec2(-direction.y, direction.x);
    let size = 4.0 * zoom.max(0.5);
    let middle = start + delta * 0.5;
    let base = middle - direction * size;
    painter.add(Shape::convex_polygon(
        vec![middle + direction * size, base + normal * size, base - normal * size],
        color,
        Stroke::NONE,
    ));
}
