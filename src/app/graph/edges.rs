use std::collections::HashMap;

use eframe::egui::{Color32, Vec2, vec2};

use super::super::aggregate::Subgraph;
use super::super::physics::{NODE_HEIGHT, NODE_WIDTH};
use super::super::render_utils::{arrow_color, weight_color};

const STROKE_SCALE: f32 = 15.0;
const SOURCE_SLOT_WIDTH: f32 = 8.0;
const TARGET_SLOT_WIDTH: f32 = 3.0;
const MAX_SLOTS: usize = 4;

/// A combined link resolved to canvas coordinates for drawing.
#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct RoutedEdge {
    pub link: usize,
    pub source: usize,
    pub target: usize,
    pub start: Vec2,
    pub end: Vec2,
    pub weight: f64,
    pub stroke_width: f32,
    pub color: Color32,
    pub arrow: Color32,
}

/// Fans out links leaving (or entering) the same box so they do not overlap.
/// `positions` and `member_counts` are indexed by visible node.
pub(in crate::app) fn route_edges(
    subgraph: &Subgraph,
    positions: &[Vec2],
    member_counts: &[usize],
) -> Vec<RoutedEdge> {
    let links = &subgraph.links;
    let mut source_offsets = vec![0.0_f32; links.len()];
    let mut target_offsets = vec![0.0_f32; links.len()];

    for (source, mut group) in group_by(links.len(), |link| links[link].source) {
        let origin = positions[source];
        group.sort_by(|&a, &b| {
            angle(positions[links[a].target] - origin).total_cmp(&angle(positions[links[b].target] - origin))
        });
        let width = member_counts[source].clamp(1, MAX_SLOTS) as f32 * SOURCE_SLOT_WIDTH;
        spread(&group, width, &mut source_offsets);
    }

    for (target, mut group) in group_by(links.len(), |link| links[link].target) {
        let origin = positions[target];
        group.sort_by(|&a, &b| {
            (-angle(positions[links[a].source] - origin))
                .total_cmp(&-angle(positions[links[b].source] - origin))
        });
        let width = (member_counts[target].clamp(1, MAX_SLOTS) + 1) as f32 * TARGET_SLOT_WIDTH;
        spread(&group, width, &mut target_offsets);
    }

    links
        .iter()
        .enumerate()
        .map(|(index, link)| {
            let source = positions[link.source];
            let target = positions[link.target];
            RoutedEdge {
                link: index,
                source: link.source,
                target: link.target,
                start: vec2(source.x + NODE_WIDTH / 2.0 + source_offsets[index], source.y),
                end: vec2(
                    target.x + NODE_WIDTH / 2.0 + target_offsets[index],
                    target.y + NODE_HEIGHT,
                ),
                weight: link.weight,
                stroke_width: link.weight.abs() as f32 * STROKE_SCALE,
                color: weight_color(link.weight),
                arrow: arrow_color(link.weight),
            }
        })
        .collect()
}

fn angle(delta: Vec2) -> f32 {
    delta.y.atan2(delta.x)
}

/// Groups link indices by key, keeping first-seen key order and link order.
fn group_by(count: usize, key: impl Fn(usize) -> usize) -> Vec<(usize, Vec<usize>)> {
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    let mut slot_of: HashMap<usize, usize> = HashMap::new();
    for link in 0..count {
        let key = key(link);
        let slot = *slot_of.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(link);
    }
    groups
}

fn spread(group: &[usize], width: f32, offsets: &mut [f32]) {
    let count = group.len() as f32;
    for (rank, &link) in group.iter().enumerate() {
        offsets[link] = (rank as f32 - count / 2.0) * width / count;
    }
}

/// Weight labels float at the middle of each link, half a box down and right.
/// Labels between two externally positioned boxes keep their last anchor.
#[derive(Default)]
pub(in crate::app) struct EdgeLabelAnchors {
    anchors: HashMap<(usize, usize), Vec2>,
}

impl EdgeLabelAnchors {
    pub(in crate::app) fn clear(&mut self) {
        self.anchors.clear();
    }

    pub(in crate::app) fn update(
        &mut self,
        edges: &[RoutedEdge],
        positions: &[Vec2],
        externally_positioned: &[bool],
    ) {
        for edge in edges {
            let key = (edge.source, edge.target);
            let frozen = externally_positioned[edge.source] && externally_positioned[edge.target];
            if frozen && self.anchors.contains_key(&key) {
                continue;
            }
            let anchor = (positions[edge.source] + positions[edge.target]) * 0.5
                + vec2(NODE_WIDTH / 2.0, NODE_HEIGHT / 2.0);
            self.anchors.insert(key, anchor);
        }
    }

    pub(in crate::app) fn anchor(&self, source: usize, target: usize) -> Option<Vec2> {
        self.anchors.get(&(source, target)).copied()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::app::aggregate::build_subgraph;
    use crate::app::state::ViewState;
    use crate::app::test_support::graph_with_links;

    fn fan_out() -> Subgraph {
        let graph = graph_with_links(
            &["s", "a", "b"],
            &[("s", "a", 0.5), ("s", "b", -0.5)],
        );
        let state = ViewState {
            pinned_ids: vec!["s".to_owned(), "a".to_owned(), "b".to_owned()],
            ..ViewState::default()
        };
        build_subgraph(&graph, &state)
    }

    #[test]
    fn links_sharing_a_source_are_spread_by_angle() {
        let subgraph = fan_out();
        // s at origin, a below-right, b below-left.
        let positions = vec![vec2(0.0, 0.0), vec2(100.0, 100.0), vec2(-100.0, 100.0)];

        let edges = route_edges(&subgraph, &positions, &[1, 1, 1]);
        let to_a = edges.iter().find(|edge| edge.target == 1).unwrap();
        let to_b = edges.iter().find(|edge| edge.target == 2).unwrap();

        // width = 8, two links -> offsets -4 and 0, a has the smaller angle
        assert_eq!(to_a.start, vec2(NODE_WIDTH / 2.0 - 4.0, 0.0));
        assert_eq!(to_b.start, vec2(NODE_WIDTH / 2.0, 0.0));
        assert_eq!(to_a.end, vec2(100.0 + NODE_WIDTH / 2.0 - 3.0, 100.0 + NODE_HEIGHT));
    }

    #[test]
    fn stroke_and_arrow_follow_weight_sign() {
        let subgraph = fan_out();
        let positions = vec![Vec2::ZERO, vec2(10.0, 10.0), vec2(20.0, 20.0)];

        let edges = route_edges(&subgraph, &positions, &[1, 1, 1]);
        for edge in &edges {
            assert_eq!(edge.stroke_width, 15.0);
            if edge.weight > 0.0 {
                assert_eq!(edge.arrow, Color32::from_rgb(0x00, 0x80, 0x00));
            } else {
                assert_eq!(edge.arrow, Color32::from_rgb(0x80, 0x00, 0x00));
            }
        }
    }

    #[test]
    fn source_width_caps_at_four_members() {
        let subgraph = fan_out();
        let positions = vec![vec2(0.0, 0.0), vec2(100.0, 100.0), vec2(-100.0, 100.0)];

        let edges = route_edges(&subgraph, &positions, &[9, 1, 1]);

        assert_eq!(edges[0].start.x, NODE_WIDTH / 2.0 - 16.0);
    }

    #[test]
    fn frozen_label_anchors_keep_their_place() {
        let subgraph = fan_out();
        let mut positions = vec![Vec2::ZERO, vec2(100.0, 0.0), vec2(0.0, 100.0)];
        let edges = route_edges(&subgraph, &positions, &[1, 1, 1]);
        let mut anchors = EdgeLabelAnchors::default();

        anchors.update(&edges, &positions, &[true, true, false]);
        let first = anchors.anchor(0, 1).unwrap();
        assert_eq!(first, vec2(50.0 + NODE_WIDTH / 2.0, NODE_HEIGHT / 2.0));

        positions[1] = vec2(300.0, 0.0);
        positions[2] = vec2(0.0, 300.0);
        anchors.update(&edges, &positions, &[true, true, false]);

        assert_eq!(anchors.anchor(0, 1), Some(first));
        assert_eq!(anchors.anchor(0, 2), Some(vec2(NODE_WIDTH / 2.0, 150.0 + NODE_HEIGHT / 2.0)));
    }
}
