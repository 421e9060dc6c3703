use eframe::egui::{Vec2, vec2};

use super::Particle;
use super::quadtree::QuadNode;

pub(super) const LINK_DISTANCE: f32 = 30.0;
pub(super) const CHARGE_STRENGTH: f32 = -100.0;
const BARNES_HUT_THETA_SQ: f32 = 0.9 * 0.9;
const CHARGE_MIN_DISTANCE_SQ: f32 = 1.0;
const COLLIDE_STRENGTH: f32 = 1.0;
const X_STRENGTH: f32 = 0.1;
const Y_STRENGTH: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(in crate::app) struct SpringLink {
    pub source: usize,
    pub target: usize,
    pub strength: f32,
    /// Share of the correction applied to the target.
    pub bias: f32,
}

impl SpringLink {
    /// Builds springs with degree-derived strength and bias; self loops and
    /// out-of-range endpoints are skipped.
    pub(in crate::app) fn from_pairs(pairs: &[(usize, usize)], particle_count: usize) -> Vec<Self> {
        let mut degree = vec![0usize; particle_count];
        let pairs = pairs
            .iter()
            .copied()
            .filter(|&(source, target)| source != target && source < particle_count && target < particle_count)
            .collect::<Vec<_>>();
        for &(source, target) in &pairs {
            degree[source] += 1;
            degree[target] += 1;
        }

        pairs
            .into_iter()
            .map(|(source, target)| {
                let (source_degree, target_degree) = (degree[source] as f32, degree[target] as f32);
                Self {
                    source,
                    target,
                    strength: 1.0 / source_degree.min(target_degree),
                    bias: source_degree / (source_degree + target_degree),
                }
            })
            .collect()
    }
}

/// Deterministic replacement for random jitter on exactly coincident points.
pub(super) struct Jiggle(u64);

impl Jiggle {
    pub(super) fn seeded(seed: u64) -> Self {
        Self(seed | 1)
    }

    pub(super) fn next(&mut self) -> f32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        let unit = (self.0 >> 40) as f32 / (1u64 << 24) as f32;
        (unit - 0.5) * 1e-6
    }

    fn nonzero(&mut self, mut delta: Vec2) -> Vec2 {
        if delta.x == 0.0 {
            delta.x = self.next();
        }
        if delta.y == 0.0 {
            delta.y = self.next();
        }
        delta
    }
}

pub(super) fn apply_links(particles: &mut [Particle], links: &[SpringLink], alpha: f32, jiggle: &mut Jiggle) {
    for link in links {
        let source = &particles[link.source];
        let target = &particles[link.target];
        let delta = jiggle.nonzero(
            (target.position + target.velocity) - (source.position + source.velocity),
        );
        let length = delta.length();
        let correction = delta * ((length - LINK_DISTANCE) / length * alpha * link.strength);

        particles[link.target].velocity -= correction * link.bias;
        particles[link.source].velocity += correction * (1.0 - link.bias);
    }
}

pub(super) fn apply_many_body(particles: &mut [Particle], alpha: f32, jiggle: &mut Jiggle) {
    let positions = particles.iter().map(|particle| particle.position).collect::<Vec<_>>();
    let Some(tree) = QuadNode::build(&positions) else {
        return;
    };

    for (index, particle) in particles.iter_mut().enumerate() {
        let mut velocity = Vec2::ZERO;
        accumulate_charge(&tree, index, &positions, alpha, jiggle, &mut velocity);
        particle.velocity += velocity;
    }
}

fn charge_pull(delta: Vec2, charge: f32, alpha: f32) -> Vec2 {
    let mut distance_sq = delta.length_sq();
    if distance_sq < CHARGE_MIN_DISTANCE_SQ {
        distance_sq = (CHARGE_MIN_DISTANCE_SQ * distance_sq).sqrt();
    }
    delta * (charge * alpha / distance_sq)
}

fn accumulate_charge(
    node: &QuadNode,
    index: usize,
    positions: &[Vec2],
    alpha: f32,
    jiggle: &mut Jiggle,
    velocity: &mut Vec2,
) {
    if node.count == 0 {
        return;
    }

    let point = positions[index];
    let delta = node.centroid - point;
    let far_enough = node.cell.side() * node.cell.side() / BARNES_HUT_THETA_SQ < delta.length_sq();
    if far_enough && !node.cell.contains(point) {
        let delta = jiggle.nonzero(delta);
        *velocity += charge_pull(delta, CHARGE_STRENGTH * node.count as f32, alpha);
        return;
    }

    if node.is_leaf() {
        for &other in &node.points {
            if other == index {
                continue;
            }
            let delta = jiggle.nonzero(positions[other] - point);
            *velocity += charge_pull(delta, CHARGE_STRENGTH, alpha);
        }
        return;
    }

    for child in node.children() {
        accumulate_charge(child, index, positions, alpha, jiggle, velocity);
    }
}

/// Pushes apart overlapping particles using positions predicted one step ahead.
pub(super) fn apply_collide(particles: &mut [Particle], radius: f32, jiggle: &mut Jiggle) {
    let predicted = particles
        .iter()
        .map(|particle| particle.position + particle.velocity)
        .collect::<Vec<_>>();
    let Some(tree) = QuadNode::build(&predicted) else {
        return;
    };

    let mut nudges = vec![Vec2::ZERO; particles.len()];
    let reach = radius * 2.0;
    collide_cells(&tree, &tree, true, &predicted, reach, jiggle, &mut nudges);
    for (particle, nudge) in particles.iter_mut().zip(nudges) {
        particle.velocity += nudge;
    }
}

fn collide_pair(from: usize, to: usize, predicted: &[Vec2], reach: f32, jiggle: &mut Jiggle, nudges: &mut [Vec2]) {
    let delta = predicted[from] - predicted[to];
    if delta.length_sq() >= reach * reach {
        return;
    }

    let delta = jiggle.nonzero(delta);
    let distance = delta.length();
    let push = delta * ((reach - distance) / distance * COLLIDE_STRENGTH);
    // Equal radii split the push evenly.
    nudges[from] += push * 0.5;
    nudges[to] -= push * 0.5;
}

fn collide_cells(
    a: &QuadNode,
    b: &QuadNode,
    same: bool,
    predicted: &[Vec2],
    reach: f32,
    jiggle: &mut Jiggle,
    nudges: &mut [Vec2],
) {
    if a.cell.gap_sq(b.cell) > reach * reach {
        return;
    }

    if a.is_leaf() && b.is_leaf() {
        if same {
            for (offset, &from) in a.points.iter().enumerate() {
                for &to in &a.points[offset + 1..] {
                    collide_pair(from, to, predicted, reach, jiggle, nudges);
                }
            }
        } else {
            for &from in &a.points {
                for &to in &b.points {
                    collide_pair(from, to, predicted, reach, jiggle, nudges);
                }
            }
        }
        return;
    }

    if same {
        let children = a.children().collect::<Vec<_>>();
        for (offset, first) in children.iter().enumerate() {
            collide_cells(first, first, true, predicted, reach, jiggle, nudges);
            for second in &children[offset + 1..] {
                collide_cells(first, second, false, predicted, reach, jiggle, nudges);
            }
        }
        return;
    }

    let split_a = !a.is_leaf() && (b.is_leaf() || a.cell.half_extent >= b.cell.half_extent);
    if split_a {
        for child in a.children() {
            collide_cells(child, b, false, predicted, reach, jiggle, nudges);
        }
    } else {
        for child in b.children() {
            collide_cells(a, child, false, predicted, reach, jiggle, nudges);
        }
    }
}

/// Keeps particles inside `[min, max]` by steering velocity back toward the box.
pub(super) fn apply_container(particles: &mut [Particle], min: Vec2, max: Vec2, alpha: f32) {
    for particle in particles {
        let position = particle.position;
        let bound = vec2(position.x.clamp(min.x, max.x.max(min.x)), position.y.clamp(min.y, max.y.max(min.y)));
        particle.velocity += (bound - position) * alpha;
    }
}

pub(super) fn apply_position_bias(particles: &mut [Particle], alpha: f32) {
    for particle in particles {
        let offset = particle.anchor - particle.position;
        particle.velocity += vec2(offset.x * X_STRENGTH, offset.y * Y_STRENGTH) * alpha;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn particle(x: f32, y: f32) -> Particle {
        Particle::new(format!("{x},{y}"), vec2(x, y), vec2(x, y))
    }

    #[test]
    fn spring_strength_and_bias_follow_degree() {
        let links = SpringLink::from_pairs(&[(0, 1), (0, 2), (1, 1), (0, 9)], 3);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].strength, 1.0);
        assert!((links[0].bias - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn stretched_link_pulls_endpoints_together() {
        let mut particles = vec![particle(0.0, 0.0), particle(100.0, 0.0)];
        let links = SpringLink::from_pairs(&[(0, 1)], 2);

        apply_links(&mut particles, &links, 1.0, &mut Jiggle::seeded(7));

        assert!(particles[0].velocity.x > 0.0);
        assert!(particles[1].velocity.x < 0.0);
    }

    #[test]
    fn charge_repels_neighbors() {
        let mut particles = vec![particle(0.0, 0.0), particle(10.0, 0.0)];

        apply_many_body(&mut particles, 1.0, &mut Jiggle::seeded(7));

        assert!((particles[0].velocity.x - -10.0).abs() < 1e-4);
        assert!((particles[1].velocity.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn far_clusters_are_approximated_close_to_exact() {
        let mut particles = (0..30)
            .map(|index| particle((index % 5) as f32, (index / 5) as f32))
            .collect::<Vec<_>>();
        particles.push(particle(1000.0, 0.0));

        apply_many_body(&mut particles, 1.0, &mut Jiggle::seeded(7));

        let far = particles.last().unwrap().velocity;
        let exact = 30.0 * 100.0 / 998.0;
        assert!(far.x > 0.0);
        assert!((far.x - exact).abs() / exact < 0.05);
    }

    #[test]
    fn overlapping_boxes_are_pushed_apart() {
        let mut particles = vec![particle(0.0, 0.0), particle(10.0, 0.0), particle(500.0, 500.0)];

        apply_collide(&mut particles, 20.0, &mut Jiggle::seeded(7));

        assert!((particles[0].velocity.x - -15.0).abs() < 1e-4);
        assert!((particles[1].velocity.x - 15.0).abs() < 1e-4);
        assert!(particles[0].velocity.y.abs() < 1e-5);
        assert_eq!(particles[2].velocity, Vec2::ZERO);
    }

    #[test]
    fn container_only_steers_escaped_axes() {
        let mut particles = vec![particle(-30.0, 50.0), particle(40.0, 40.0)];

        apply_container(&mut particles, vec2(-10.0, 0.0), vec2(100.0, 100.0), 0.5);

        assert_eq!(particles[0].velocity, vec2(10.0, 0.0));
        assert_eq!(particles[1].velocity, Vec2::ZERO);
    }

    #[test]
    fn position_bias_is_stronger_vertically() {
        let mut particles = vec![Particle::new("a".to_owned(), Vec2::ZERO, vec2(10.0, 10.0))];

        apply_position_bias(&mut particles, 1.0);

        assert_eq!(particles[0].velocity, vec2(1.0, 20.0));
    }

    #[test]
    fn jiggle_is_tiny_and_repeatable() {
        let mut first = Jiggle::seeded(42);
        let mut second = Jiggle::seeded(42);
        for _ in 0..100 {
            let value = first.next();
            assert_eq!(value, second.next());
            assert!(value.abs() <= 0.5e-6);
        }
    }
}
