use eframe::egui::Vec2;
use tracing::debug;

use super::super::ViewModel;
use super::super::aggregate::build_subgraph;
use super::super::layout::{LayoutOptions, SavedLayout, build_simulation, export_positions};

impl ViewModel {
    /// Rebuilds aggregation and simulation when anything in the layout key moved.
    pub(in crate::app) fn refresh_layout(&mut self, canvas: Vec2) {
        let canvas_size = (canvas.x.max(1.0).round() as u32, canvas.y.max(1.0).round() as u32);
        let key = self.state.layout_key(canvas_size);
        if self.layout_key.as_ref() == Some(&key) {
            return;
        }

        self.layout.stop();
        self.subgraph = build_subgraph(&self.graph, &self.state);

        let generation = self.layout.next_generation();
        let built = build_simulation(
            &self.graph,
            &self.subgraph,
            self.layout.current(),
            LayoutOptions {
                canvas: Vec2::new(canvas_size.0 as f32, canvas_size.1 as f32),
                sticky: self.state.sticky,
                auto_arrange: self.state.auto_arrange,
                saved_positions: self.state.saved_positions.as_deref(),
            },
            generation,
        );

        match built.saved_layout {
            SavedLayout::Applied => self.state.applied_positions = self.state.saved_positions.take(),
            SavedLayout::Rejected => self.state.saved_positions = None,
            SavedLayout::NotRequested => {}
        }

        self.particle_of_visible = vec![0; self.subgraph.nodes.len()];
        for (particle, &visible) in built.visible_index.iter().enumerate() {
            self.particle_of_visible[visible] = particle;
        }

        self.layout.replace(built.simulation);
        self.interaction.reset_for_rebuild();
        self.label_anchors.clear();
        self.layout_key = Some(self.state.layout_key(canvas_size));

        debug!(
            generation,
            visible = self.subgraph.nodes.len(),
            links = self.subgraph.links.len(),
            "rebuilt subgraph layout"
        );
    }

    /// Visible-node index of every particle, the inverse of `particle_of_visible`.
    pub(in crate::app) fn visible_of_particle(&self) -> Vec<usize> {
        let mut visible_of_particle = vec![0; self.particle_of_visible.len()];
        for (visible, &particle) in self.particle_of_visible.iter().enumerate() {
            visible_of_particle[particle] = visible;
        }
        visible_of_particle
    }

    pub(in crate::app) fn export_layout(&mut self) {
        let Some(simulation) = self.layout.current() else {
            return;
        };
        let exported = export_positions(simulation.particles(), simulation.canvas());
        debug!(particles = simulation.particles().len(), "exported layout");
        self.state.exported_positions = Some(exported);
    }
}
