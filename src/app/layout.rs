use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};
use thiserror::Error;
use tracing::{debug, warn};

use crate::attribution::AttributionGraph;

use super::aggregate::Subgraph;
use super::physics::{ForceSimulation, NODE_HEIGHT, Particle, REHEAT_ALPHA_TARGET, SpringLink};

const PERMILLE: f32 = 1000.0;
const MAX_PERMILLE: u16 = 1000;

/// Why a saved layout string was rejected. A rejected layout pins nothing.
#[derive(Debug, Error, PartialEq, Eq)]
pub(in crate::app) enum SavedLayoutError {
    #[error("saved position {value:?} is not a whole permille value in 0..=1000")]
    InvalidValue { value: String },
    #[error("saved layout has {found} values, expected {expected}")]
    WrongCount { expected: usize, found: usize },
}

/// What happened to the pending saved layout during a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::app) enum SavedLayout {
    NotRequested,
    Applied,
    Rejected,
}

/// Linear map from a data extent onto a pixel range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(in crate::app) struct LinearScale {
    domain: (f32, f32),
    range: (f32, f32),
}

impl LinearScale {
    pub(in crate::app) fn new(domain: (f32, f32), range: (f32, f32)) -> Self {
        Self { domain, range }
    }

    /// Scale over the extent of `values`; `reversed` flips the domain.
    pub(in crate::app) fn over(values: impl Iterator<Item = f32>, range: (f32, f32), reversed: bool) -> Self {
        let (min, max) = values
            .filter(|value| value.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
                (min.min(value), max.max(value))
            });
        let domain = if min > max {
            (0.0, 0.0)
        } else if reversed {
            (max, min)
        } else {
            (min, max)
        };
        Self::new(domain, range)
    }

    pub(in crate::app) fn map(&self, value: f32) -> f32 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if d0 == d1 || !value.is_finite() {
            return (r0 + r1) / 2.0;
        }
        r0 + (value - d0) / (d1 - d0) * (r1 - r0)
    }
}

/// Scales placing a node by token position (x) and residual-stream depth (y).
#[derive(Clone, Copy, Debug, PartialEq)]
pub(in crate::app) struct LayoutScales {
    pub x: LinearScale,
    pub y: LinearScale,
}

impl LayoutScales {
    pub(in crate::app) fn for_subgraph(subgraph: &Subgraph, canvas: Vec2) -> Self {
        Self {
            x: LinearScale::over(
                subgraph.nodes.iter().map(|node| node.ctx_idx),
                (0.0, canvas.x * 3.0 / 4.0),
                false,
            ),
            y: LinearScale::over(
                subgraph.nodes.iter().map(|node| node.stream_idx),
                (0.0, canvas.y - NODE_HEIGHT),
                true,
            ),
        }
    }

    pub(in crate::app) fn anchor(&self, ctx_idx: f32, stream_idx: f32) -> Vec2 {
        vec2(self.x.map(ctx_idx), self.y.map(stream_idx))
    }
}

/// Sort key of a visible node: its member ids, sorted and space-joined.
pub(in crate::app) fn member_slug(member_ids: &[&str]) -> String {
    let mut ids = member_ids.to_vec();
    ids.sort_unstable();
    ids.join(" ")
}

pub(in crate::app) struct LayoutOptions<'a> {
    pub canvas: Vec2,
    pub sticky: bool,
    pub auto_arrange: bool,
    pub saved_positions: Option<&'a str>,
}

/// Result of a rebuild: the simulation plus the particle order used for saved
/// layouts, and what became of the pending saved layout.
pub(in crate::app) struct BuiltLayout {
    pub simulation: ForceSimulation,
    /// Visible-node index for every particle.
    pub visible_index: Vec<usize>,
    pub saved_layout: SavedLayout,
}

pub(in crate::app) fn build_simulation(
    graph: &AttributionGraph,
    subgraph: &Subgraph,
    previous: Option<&ForceSimulation>,
    options: LayoutOptions<'_>,
    generation: u64,
) -> BuiltLayout {
    let scales = LayoutScales::for_subgraph(subgraph, options.canvas);
    let carried = previous
        .map(|simulation| {
            simulation
                .particles()
                .iter()
                .map(|particle| (particle.node_id.as_str(), particle))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let mut order = subgraph
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let ids = if node.is_supernode() {
                node.members
                    .iter()
                    .map(|&member| graph.nodes[member].node_id.as_str())
                    .collect::<Vec<_>>()
            } else {
                vec![node.node_id.as_str()]
            };
            (member_slug(&ids), index)
        })
        .collect::<Vec<_>>();
    order.sort_by(|a, b| a.0.cmp(&b.0));
    let visible_index = order.into_iter().map(|(_, index)| index).collect::<Vec<_>>();

    let mut particles = visible_index
        .iter()
        .map(|&index| {
            let node = &subgraph.nodes[index];
            let anchor = scales.anchor(node.ctx_idx, node.stream_idx);
            match carried.get(node.node_id.as_str()) {
                Some(previous) => Particle {
                    node_id: node.node_id.clone(),
                    position: previous.position,
                    velocity: Vec2::ZERO,
                    pinned: previous.pinned,
                    externally_positioned: previous.externally_positioned,
                    anchor,
                },
                None => Particle::new(node.node_id.clone(), anchor, anchor),
            }
        })
        .collect::<Vec<_>>();

    let mut particle_of_visible = vec![0; subgraph.nodes.len()];
    for (particle, &visible) in visible_index.iter().enumerate() {
        particle_of_visible[visible] = particle;
    }
    let pairs = subgraph
        .links
        .iter()
        .map(|link| (particle_of_visible[link.source], particle_of_visible[link.target]))
        .collect::<Vec<_>>();
    let links = SpringLink::from_pairs(&pairs, particles.len());

    if !options.sticky {
        for particle in &mut particles {
            particle.pinned = None;
        }
    }

    let mut saved_layout = SavedLayout::NotRequested;
    if options.auto_arrange
        && let Some(saved) = options.saved_positions
    {
        saved_layout = match apply_saved_positions(&mut particles, saved, options.canvas) {
            Ok(()) => SavedLayout::Applied,
            Err(error) => {
                warn!(%error, "ignoring saved layout");
                SavedLayout::Rejected
            }
        };
    }

    let mut simulation = ForceSimulation::new(generation, particles, links, options.canvas);
    if !options.sticky {
        simulation.set_alpha_target(REHEAT_ALPHA_TARGET);
    }
    debug!(
        generation,
        particles = simulation.particles().len(),
        links = simulation.links().len(),
        "built force simulation"
    );

    BuiltLayout {
        simulation,
        visible_index,
        saved_layout,
    }
}

fn parse_permille(value: &str) -> Result<u16, SavedLayoutError> {
    value
        .parse::<u16>()
        .ok()
        .filter(|permille| *permille <= MAX_PERMILLE)
        .ok_or_else(|| SavedLayoutError::InvalidValue {
            value: value.to_owned(),
        })
}

/// Pins particles to a permille layout: `x0 y0 x1 y1 ...` in particle order.
/// The whole string is validated first, so a bad layout leaves every particle as it was.
pub(in crate::app) fn apply_saved_positions(
    particles: &mut [Particle],
    saved: &str,
    canvas: Vec2,
) -> Result<(), SavedLayoutError> {
    let values = saved
        .split_whitespace()
        .map(parse_permille)
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != particles.len() * 2 {
        return Err(SavedLayoutError::WrongCount {
            expected: particles.len() * 2,
            found: values.len(),
        });
    }

    for (particle, pair) in particles.iter_mut().zip(values.chunks_exact(2)) {
        let permille = vec2(f32::from(pair[0]), f32::from(pair[1]));
        particle.pin_at(permille / PERMILLE * canvas);
        particle.externally_positioned = true;
    }
    Ok(())
}

pub(in crate::app) fn export_positions(particles: &[Particle], canvas: Vec2) -> String {
    let to_permille = |value: f32, extent: f32| {
        if extent <= 0.0 {
            0
        } else {
            (value / extent * PERMILLE).round().clamp(0.0, PERMILLE) as i32
        }
    };

    particles
        .iter()
        .flat_map(|particle| {
            [
                to_permille(particle.position.x, canvas.x),
                to_permille(particle.position.y, canvas.y),
            ]
        })
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::app::aggregate::build_subgraph;
    use crate::app::state::{GroupingEntry, ViewState};
    use crate::app::test_support::graph_with_links;

    #[test]
    fn degenerate_domain_maps_to_range_midpoint() {
        let scale = LinearScale::over([3.0, 3.0].into_iter(), (0.0, 600.0), false);
        assert_eq!(scale.map(3.0), 300.0);

        let empty = LinearScale::over(std::iter::empty(), (0.0, 100.0), true);
        assert_eq!(empty.map(1.0), 50.0);
    }

    #[test]
    fn reversed_domain_puts_deep_layers_on_top() {
        let scale = LinearScale::over([0.0, 10.0].into_iter(), (0.0, 575.0), true);
        assert_eq!(scale.map(10.0), 0.0);
        assert_eq!(scale.map(0.0), 575.0);
    }

    #[test]
    fn slug_sorts_member_ids() {
        assert_eq!(member_slug(&["c", "a", "b"]), "a b c");
    }

    fn sample() -> (AttributionGraph, ViewState) {
        let graph = graph_with_links(&["d", "a", "c", "b"], &[("a", "b", 1.0), ("c", "d", 0.5)]);
        let state = ViewState {
            pinned_ids: vec!["d".to_owned(), "a".to_owned(), "c".to_owned(), "b".to_owned()],
            ..ViewState::default()
        };
        (graph, state)
    }

    fn options(saved: Option<&str>, sticky: bool) -> LayoutOptions<'_> {
        LayoutOptions {
            canvas: vec2(1000.0, 500.0),
            sticky,
            auto_arrange: true,
            saved_positions: saved,
        }
    }

    #[test]
    fn particles_follow_member_slug_order() {
        let (graph, mut state) = sample();
        state.supernodes = vec![GroupingEntry::new("z", vec!["d".to_owned(), "c".to_owned()])];
        let subgraph = build_subgraph(&graph, &state);

        let built = build_simulation(&graph, &subgraph, None, options(None, true), 1);
        let ids = built
            .simulation
            .particles()
            .iter()
            .map(|particle| particle.node_id.as_str())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec!["a", "b", "z"]);
        assert_eq!(built.simulation.links().len(), 1);
    }

    #[test]
    fn new_particles_start_at_their_anchor() {
        let (graph, state) = sample();
        let subgraph = build_subgraph(&graph, &state);
        let built = build_simulation(&graph, &subgraph, None, options(None, true), 1);

        let a = &built.simulation.particles()[0];
        assert_eq!(a.node_id, "a");
        assert_eq!(a.position, a.anchor);
        assert_eq!(a.anchor.x, 250.0);
    }

    #[test]
    fn rebuild_carries_position_and_pin() {
        let (graph, state) = sample();
        let subgraph = build_subgraph(&graph, &state);
        let mut first = build_simulation(&graph, &subgraph, None, options(None, true), 1).simulation;
        first.particles_mut()[0].pin_at(vec2(12.0, 34.0));

        let second = build_simulation(&graph, &subgraph, Some(&first), options(None, true), 2);
        assert_eq!(second.simulation.particles()[0].pinned, Some(vec2(12.0, 34.0)));

        let loose = build_simulation(&graph, &subgraph, Some(&first), options(None, false), 3);
        assert_eq!(loose.simulation.particles()[0].pinned, None);
        assert_eq!(loose.simulation.particles()[0].position, vec2(12.0, 34.0));
        assert_eq!(loose.simulation.alpha_target(), REHEAT_ALPHA_TARGET);
    }

    #[test]
    fn saved_positions_pin_particles_in_order() {
        let (graph, state) = sample();
        let subgraph = build_subgraph(&graph, &state);

        let built = build_simulation(
            &graph,
            &subgraph,
            None,
            options(Some("100 200 500 1000 0 0 1000 500"), true),
            1,
        );
        let particles = built.simulation.particles();

        assert_eq!(built.saved_layout, SavedLayout::Applied);
        assert_eq!(particles[0].pinned, Some(vec2(100.0, 100.0)));
        assert_eq!(particles[1].pinned, Some(vec2(500.0, 500.0)));
        assert_eq!(particles[3].pinned, Some(vec2(1000.0, 250.0)));
        assert!(particles.iter().all(|particle| particle.externally_positioned));
    }

    fn loose_particles() -> Vec<Particle> {
        ["a", "b", "c"]
            .into_iter()
            .map(|id| Particle::new(id.to_owned(), vec2(10.0, 10.0), vec2(10.0, 10.0)))
            .collect()
    }

    #[test]
    fn non_numeric_and_non_finite_positions_are_rejected() {
        for saved in ["10 x 0 0 0 0", "NaN 50 0 0 0 0", "inf 50 0 0 0 0", "10.5 50 0 0 0 0"] {
            let mut particles = loose_particles();
            let result = apply_saved_positions(&mut particles, saved, vec2(100.0, 100.0));

            assert!(matches!(result, Err(SavedLayoutError::InvalidValue { .. })), "{saved}");
            assert!(particles.iter().all(|particle| particle.pinned.is_none()));
        }
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let mut particles = loose_particles();
        let result = apply_saved_positions(&mut particles, "5000 -300 0 0 0 0", vec2(100.0, 100.0));

        assert_eq!(
            result,
            Err(SavedLayoutError::InvalidValue {
                value: "5000".to_owned()
            })
        );
        assert!(particles.iter().all(|particle| particle.pinned.is_none()));
    }

    #[test]
    fn layout_for_a_different_node_count_is_rejected_whole() {
        let mut particles = loose_particles();
        let result = apply_saved_positions(&mut particles, "100 100", vec2(100.0, 100.0));

        assert_eq!(result, Err(SavedLayoutError::WrongCount { expected: 6, found: 2 }));
        assert!(particles.iter().all(|particle| particle.pinned.is_none()));
        assert!(particles.iter().all(|particle| !particle.externally_positioned));
    }

    #[test]
    fn rejected_layout_leaves_the_simulation_finite() {
        let (graph, state) = sample();
        let subgraph = build_subgraph(&graph, &state);

        let mut built = build_simulation(
            &graph,
            &subgraph,
            None,
            options(Some("NaN 50 0 0 0 0 0 0"), true),
            1,
        );
        assert_eq!(built.saved_layout, SavedLayout::Rejected);
        for _ in 0..30 {
            built.simulation.tick();
        }

        assert!(built.simulation.particles().iter().all(|particle| {
            particle.position.x.is_finite() && particle.position.y.is_finite()
        }));
    }

    #[test]
    fn export_clamps_to_permille() {
        let particles = vec![
            Particle::new("a".to_owned(), vec2(250.0, 50.0), Vec2::ZERO),
            Particle::new("b".to_owned(), vec2(-20.0, 900.0), Vec2::ZERO),
        ];
        assert_eq!(export_positions(&particles, vec2(1000.0, 500.0)), "250 100 0 1000");
    }
}
