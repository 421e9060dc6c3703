mod forces;
mod quadtree;

use eframe::egui::{Vec2, vec2};
use tracing::{debug, trace};

pub(in crate::app) use forces::SpringLink;
use forces::{
    Jiggle, apply_collide, apply_container, apply_links, apply_many_body, apply_position_bias,
};

pub(in crate::app) const NODE_WIDTH: f32 = 75.0;
pub(in crate::app) const NODE_HEIGHT: f32 = 25.0;
pub(in crate::app) const REHEAT_ALPHA_TARGET: f32 = 0.3;

const ALPHA_MIN: f32 = 0.001;
const VELOCITY_DECAY: f32 = 0.4;
const CONTAINER_MARGIN_LEFT: f32 = -10.0;

fn default_alpha_decay() -> f32 {
    1.0 - ALPHA_MIN.powf(1.0 / 300.0)
}

pub(in crate::app) fn collide_radius() -> f32 {
    (NODE_HEIGHT * NODE_HEIGHT + NODE_WIDTH * NODE_WIDTH).sqrt() / 2.0
}

#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct Particle {
    pub node_id: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pinned: Option<Vec2>,
    /// Set when the position came from a saved layout instead of the forces.
    pub externally_positioned: bool,
    /// Scale-derived resting point the x/y bias forces pull toward.
    pub anchor: Vec2,
}

impl Particle {
    pub(in crate::app) fn new(node_id: String, position: Vec2, anchor: Vec2) -> Self {
        Self {
            node_id,
            position,
            velocity: Vec2::ZERO,
            pinned: None,
            externally_positioned: false,
            anchor,
        }
    }

    pub(in crate::app) fn pin_at(&mut self, position: Vec2) {
        self.pinned = Some(position);
        self.position = position;
    }
}

/// Cooling force simulation over a fixed particle set.
pub(in crate::app) struct ForceSimulation {
    generation: u64,
    particles: Vec<Particle>,
    links: Vec<SpringLink>,
    canvas: Vec2,
    alpha: f32,
    alpha_target: f32,
    alpha_decay: f32,
    running: bool,
    jiggle: Jiggle,
}

impl ForceSimulation {
    pub(in crate::app) fn new(
        generation: u64,
        particles: Vec<Particle>,
        links: Vec<SpringLink>,
        canvas: Vec2,
    ) -> Self {
        Self {
            generation,
            particles,
            links,
            canvas,
            alpha: 1.0,
            alpha_target: 0.0,
            alpha_decay: default_alpha_decay(),
            running: true,
            jiggle: Jiggle::seeded(generation.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
        }
    }

    pub(in crate::app) fn generation(&self) -> u64 {
        self.generation
    }

    pub(in crate::app) fn particles(&self) -> &[Particle] {
        &self.particles
    }

    #[cfg(test)]
    pub(in crate::app) fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub(in crate::app) fn links(&self) -> &[SpringLink] {
        &self.links
    }

    pub(in crate::app) fn canvas(&self) -> Vec2 {
        self.canvas
    }

    pub(in crate::app) fn alpha(&self) -> f32 {
        self.alpha
    }

    pub(in crate::app) fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    pub(in crate::app) fn is_running(&self) -> bool {
        self.running
    }

    pub(in crate::app) fn set_alpha_target(&mut self, alpha_target: f32) {
        self.alpha_target = alpha_target;
    }

    pub(in crate::app) fn restart(&mut self) {
        self.running = true;
    }

    pub(in crate::app) fn stop(&mut self) {
        self.running = false;
    }

    /// Advances one step. Returns false once alpha has cooled below the floor,
    /// which also stops the simulation.
    pub(in crate::app) fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.alpha_decay;
        let alpha = self.alpha;
        let container_min = vec2(CONTAINER_MARGIN_LEFT, 0.0);
        let container_max = self.canvas - vec2(NODE_HEIGHT, NODE_HEIGHT);

        apply_links(&mut self.particles, &self.links, alpha, &mut self.jiggle);
        apply_many_body(&mut self.particles, alpha, &mut self.jiggle);
        apply_collide(&mut self.particles, collide_radius(), &mut self.jiggle);
        apply_container(&mut self.particles, container_min, container_max, alpha);
        apply_position_bias(&mut self.particles, alpha);

        for particle in &mut self.particles {
            if let Some(pinned) = particle.pinned {
                particle.position = pinned;
                particle.velocity = Vec2::ZERO;
            } else {
                particle.velocity *= 1.0 - VELOCITY_DECAY;
                particle.position += particle.velocity;
            }
        }

        if self.alpha < ALPHA_MIN {
            trace!(generation = self.generation, "force simulation cooled");
            self.running = false;
        }
        self.running
    }

    pub(in crate::app) fn begin_drag(&mut self, index: usize) {
        self.alpha_target = REHEAT_ALPHA_TARGET;
        self.restart();
        if let Some(particle) = self.particles.get_mut(index) {
            particle.pinned = Some(particle.position);
        }
    }

    pub(in crate::app) fn drag_to(&mut self, index: usize, position: Vec2) {
        if let Some(particle) = self.particles.get_mut(index) {
            particle.pinned = Some(position);
            particle.externally_positioned = false;
        }
    }

    pub(in crate::app) fn end_drag(&mut self, index: usize, sticky: bool) {
        self.alpha_target = 0.0;
        if let Some(particle) = self.particles.get_mut(index)
            && !sticky
            && !particle.externally_positioned
        {
            particle.pinned = None;
        }
    }
}

/// Owns at most one live simulation and hands out generation numbers so that
/// work scheduled against a replaced simulation can be recognized and dropped.
#[derive(Default)]
pub(in crate::app) struct LayoutSlot {
    simulation: Option<ForceSimulation>,
    next_generation: u64,
}

impl LayoutSlot {
    pub(in crate::app) fn next_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.wrapping_add(1);
        self.next_generation
    }

    /// Stops the previous simulation before installing its replacement.
    pub(in crate::app) fn replace(&mut self, simulation: ForceSimulation) {
        if let Some(previous) = self.simulation.as_mut() {
            previous.stop();
            debug!(
                previous = previous.generation(),
                next = simulation.generation(),
                "replacing force simulation"
            );
        }
        self.simulation = Some(simulation);
    }

    pub(in crate::app) fn stop(&mut self) {
        if let Some(simulation) = self.simulation.as_mut() {
            simulation.stop();
        }
    }

    pub(in crate::app) fn current(&self) -> Option<&ForceSimulation> {
        self.simulation.as_ref()
    }

    pub(in crate::app) fn current_mut(&mut self) -> Option<&mut ForceSimulation> {
        self.simulation.as_mut()
    }

    pub(in crate::app) fn current_generation(&self) -> Option<u64> {
        self.simulation.as_ref().map(ForceSimulation::generation)
    }

    /// Ticks the live simulation if `generation` still names it.
    pub(in crate::app) fn tick(&mut self, generation: u64) -> bool {
        match self.simulation.as_mut() {
            Some(simulation) if simulation.generation() == generation => simulation.tick(),
            _ => false,
        }
    }

    pub(in crate::app) fn is_running(&self) -> bool {
        self.simulation
            .as_ref()
            .is_some_and(ForceSimulation::is_running)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn simulation(generation: u64) -> ForceSimulation {
        let particles = vec![
            Particle::new("a".to_owned(), vec2(100.0, 100.0), vec2(100.0, 100.0)),
            Particle::new("b".to_owned(), vec2(400.0, 200.0), vec2(300.0, 150.0)),
        ];
        let links = SpringLink::from_pairs(&[(0, 1)], particles.len());
        ForceSimulation::new(generation, particles, links, vec2(800.0, 600.0))
    }

    #[test]
    fn alpha_cools_to_a_stop() {
        let mut sim = simulation(1);
        let mut ticks = 0;
        while sim.tick() {
            ticks += 1;
            assert!(ticks < 1000);
        }

        assert!(sim.alpha() < ALPHA_MIN);
        assert!(!sim.is_running());
        assert!((299..=301).contains(&ticks));
    }

    #[test]
    fn pinned_particles_hold_position() {
        let mut sim = simulation(1);
        sim.particles_mut()[0].pin_at(vec2(50.0, 60.0));
        for _ in 0..20 {
            sim.tick();
        }

        assert_eq!(sim.particles()[0].position, vec2(50.0, 60.0));
        assert_eq!(sim.particles()[0].velocity, Vec2::ZERO);
    }

    #[test]
    fn particles_settle_inside_the_canvas() {
        let mut sim = simulation(1);
        while sim.tick() {}

        for particle in sim.particles() {
            assert!(particle.position.x > -40.0 && particle.position.x < 800.0);
            assert!(particle.position.y > -30.0 && particle.position.y < 600.0);
        }
    }

    #[test]
    fn drag_pins_then_releases_unless_sticky() {
        let mut sim = simulation(1);
        sim.particles_mut()[1].externally_positioned = true;

        sim.begin_drag(1);
        assert_eq!(sim.alpha_target(), REHEAT_ALPHA_TARGET);
        sim.drag_to(1, vec2(10.0, 20.0));
        assert!(!sim.particles()[1].externally_positioned);
        sim.end_drag(1, false);

        assert_eq!(sim.alpha_target(), 0.0);
        assert_eq!(sim.particles()[1].pinned, None);

        sim.begin_drag(0);
        sim.drag_to(0, vec2(30.0, 40.0));
        sim.end_drag(0, true);
        assert_eq!(sim.particles()[0].pinned, Some(vec2(30.0, 40.0)));
    }

    #[test]
    fn sticky_drag_holds_the_drop_point_while_ticking() {
        let mut sim = simulation(1);

        sim.begin_drag(1);
        sim.drag_to(1, vec2(120.0, 340.0));
        sim.end_drag(1, true);
        for _ in 0..50 {
            sim.tick();
        }

        assert_eq!(sim.particles()[1].pinned, Some(vec2(120.0, 340.0)));
        assert_eq!(sim.particles()[1].position, vec2(120.0, 340.0));
    }

    #[test]
    fn loose_drag_releases_the_particle_to_the_forces() {
        let mut sim = simulation(1);

        sim.begin_drag(1);
        sim.drag_to(1, vec2(120.0, 340.0));
        sim.tick();
        assert_eq!(sim.particles()[1].position, vec2(120.0, 340.0));
        sim.end_drag(1, false);
        assert_eq!(sim.particles()[1].pinned, None);

        for _ in 0..10 {
            sim.tick();
        }
        assert!(sim.particles()[1].position != vec2(120.0, 340.0));
    }

    #[test]
    fn externally_positioned_particle_keeps_pin_after_click_without_move() {
        let mut sim = simulation(1);
        sim.particles_mut()[0].pin_at(vec2(5.0, 5.0));
        sim.particles_mut()[0].externally_positioned = true;

        sim.begin_drag(0);
        sim.end_drag(0, false);

        assert_eq!(sim.particles()[0].pinned, Some(vec2(5.0, 5.0)));
    }

    #[test]
    fn replaced_simulation_ignores_stale_ticks() {
        let mut slot = LayoutSlot::default();
        let first = slot.next_generation();
        slot.replace(simulation(first));
        assert!(slot.tick(first));

        let second = slot.next_generation();
        slot.replace(simulation(second));

        let before = slot.current().unwrap().particles().to_vec();
        assert!(!slot.tick(first));
        assert_eq!(slot.current().unwrap().particles(), before.as_slice());
        assert!(slot.tick(second));
    }

    #[test]
    fn stopped_slot_does_not_tick() {
        let mut slot = LayoutSlot::default();
        let generation = slot.next_generation();
        slot.replace(simulation(generation));
        slot.stop();

        assert!(!slot.is_running());
        assert!(!slot.tick(generation));
        assert_eq!(slot.current_generation(), Some(generation));
    }
}
