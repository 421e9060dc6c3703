use std::collections::HashMap;

use crate::attribution::{AttributionGraph, FeatureNode};

use super::state::{GroupingEntry, ViewState};

#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct SubgraphNode {
    pub node_id: String,
    pub feature_id: String,
    pub label: String,
    pub layer: String,
    pub ctx_idx: f32,
    pub stream_idx: f32,
    pub input_abs_sum: f64,
    pub input_abs_sum_external: f64,
    /// Graph indices of the nodes drawn inside this box; a plain node lists itself.
    pub members: Vec<usize>,
    /// Member ids exactly as stored in the grouping entry.
    pub member_node_ids: Vec<String>,
    pub grouping_index: Option<usize>,
}

impl SubgraphNode {
    pub(in crate::app) fn is_supernode(&self) -> bool {
        self.grouping_index.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct SubgraphLink {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
    /// Graph link indices merged into this link.
    pub original_links: Vec<usize>,
}

/// Per pinned graph node: ownership and the weights used to split links.
#[derive(Clone, Debug, PartialEq)]
pub(in crate::app) struct PinnedMember {
    pub supernode_id: Option<String>,
    pub visible_index: usize,
    pub input_abs_sum_external: f64,
    pub input_weighting: f64,
    pub display_label: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(in crate::app) struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub links: Vec<SubgraphLink>,
    pub index_by_id: HashMap<String, usize>,
    pub pinned: HashMap<usize, PinnedMember>,
}

impl Subgraph {
    pub(in crate::app) fn node(&self, node_id: &str) -> Option<&SubgraphNode> {
        self.index_by_id
            .get(node_id)
            .and_then(|&index| self.nodes.get(index))
    }

    pub(in crate::app) fn member(&self, graph_index: usize) -> Option<&PinnedMember> {
        self.pinned.get(&graph_index)
    }

    /// Label of a visible node, or of a pinned member when `node_id` names one.
    pub(in crate::app) fn display_label(&self, graph: &AttributionGraph, node_id: &str) -> Option<&str> {
        if let Some(node) = self.node(node_id) {
            return Some(node.label.as_str());
        }
        graph
            .index_by_id
            .get(node_id)
            .and_then(|index| self.pinned.get(index))
            .map(|member| member.display_label.as_str())
    }
}

struct ResolvedSupernode<'a> {
    node_id: String,
    entry_index: usize,
    entry: &'a GroupingEntry,
    members: Vec<usize>,
}

pub(in crate::app) fn override_aware_label(state: &ViewState, node: &FeatureNode) -> String {
    state
        .label_override(&node.feature_id)
        .unwrap_or_else(|| node.default_label())
        .to_owned()
}

pub(in crate::app) fn build_subgraph(graph: &AttributionGraph, state: &ViewState) -> Subgraph {
    let honored = state.honored_pinned_ids();
    let pinned_indices = graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| honored.contains(&node.node_id))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    let pinned_by_id = pinned_indices
        .iter()
        .map(|&index| (graph.nodes[index].node_id.as_str(), index))
        .collect::<HashMap<_, _>>();

    let mut owner: HashMap<usize, usize> = HashMap::new();
    let mut taken_ids = pinned_by_id
        .keys()
        .map(|id| (*id).to_owned())
        .collect::<std::collections::HashSet<_>>();
    let mut supernodes = Vec::new();
    for (entry_index, entry) in state.supernodes.iter().enumerate() {
        let node_id = if taken_ids.contains(&entry.label) {
            format!("supernode-{entry_index}")
        } else {
            entry.label.clone()
        };

        let mut members = Vec::new();
        for member_id in &entry.member_ids {
            let Some(&graph_index) = pinned_by_id.get(member_id.as_str()) else {
                continue;
            };
            if owner.contains_key(&graph_index) || members.contains(&graph_index) {
                continue;
            }
            members.push(graph_index);
        }
        if members.is_empty() {
            continue;
        }

        let supernode_index = supernodes.len();
        for &member in &members {
            owner.insert(member, supernode_index);
        }
        taken_ids.insert(node_id.clone());
        supernodes.push(ResolvedSupernode {
            node_id,
            entry_index,
            entry,
            members,
        });
    }

    let mut external = HashMap::with_capacity(pinned_indices.len());
    let mut weighting = HashMap::with_capacity(pinned_indices.len());
    for &index in &pinned_indices {
        let node = &graph.nodes[index];
        let own_group = owner.get(&index);
        let input_abs_sum_external = node
            .incoming
            .iter()
            .map(|&link_index| {
                let link = &graph.links[link_index];
                match (owner.get(&link.source), own_group) {
                    (Some(source_group), Some(group)) if source_group == group => 0.0,
                    _ => link.weight.abs(),
                }
            })
            .sum::<f64>();
        let input_weighting = if input_abs_sum_external != 0.0 && node.input_abs_sum != 0.0 {
            input_abs_sum_external / node.input_abs_sum
        } else {
            0.0
        };
        external.insert(index, input_abs_sum_external);
        weighting.insert(index, input_weighting);
    }

    let mut nodes = Vec::with_capacity(pinned_indices.len() + supernodes.len());
    for &index in &pinned_indices {
        if owner.contains_key(&index) {
            continue;
        }
        let node = &graph.nodes[index];
        nodes.push(SubgraphNode {
            node_id: node.node_id.clone(),
            feature_id: node.feature_id.clone(),
            label: override_aware_label(state, node),
            layer: node.layer.clone(),
            ctx_idx: node.ctx_idx,
            stream_idx: node.stream_idx,
            input_abs_sum: node.input_abs_sum,
            input_abs_sum_external: external[&index],
            members: vec![index],
            member_node_ids: Vec::new(),
            grouping_index: None,
        });
    }
    let first_supernode = nodes.len();
    for supernode in &supernodes {
        nodes.push(aggregate_node(graph, supernode, &external));
    }

    for node in &nodes {
        let total = node
            .members
            .iter()
            .map(|member| weighting[member])
            .sum::<f64>();
        if total > 0.0 {
            for member in &node.members {
                if let Some(value) = weighting.get_mut(member) {
                    *value /= total;
                }
            }
        }
    }

    let index_by_id = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.node_id.clone(), index))
        .collect::<HashMap<_, _>>();

    let mut pinned = HashMap::with_capacity(pinned_indices.len());
    for (visible_index, node) in nodes.iter().enumerate() {
        for &member in &node.members {
            let graph_node = &graph.nodes[member];
            let base_label = override_aware_label(state, graph_node);
            let display_label = if node.is_supernode() {
                decorate_member_label(&node.label, base_label, node.members.len())
            } else {
                base_label
            };
            pinned.insert(
                member,
                PinnedMember {
                    supernode_id: (visible_index >= first_supernode).then(|| node.node_id.clone()),
                    visible_index,
                    input_abs_sum_external: external[&member],
                    input_weighting: weighting[&member],
                    display_label,
                },
            );
        }
    }

    let links = combine_links(graph, &pinned);

    Subgraph {
        nodes,
        links,
        index_by_id,
        pinned,
    }
}

fn aggregate_node(
    graph: &AttributionGraph,
    supernode: &ResolvedSupernode<'_>,
    external: &HashMap<usize, f64>,
) -> SubgraphNode {
    let members = &supernode.members;
    let count = members.len() as f32;
    let mean = |value: fn(&FeatureNode) -> f32| {
        members
            .iter()
            .map(|&member| value(&graph.nodes[member]))
            .sum::<f32>()
            / count
    };

    let numeric_layers = members
        .iter()
        .filter_map(|&member| graph.nodes[member].numeric_layer())
        .collect::<Vec<_>>();
    let layer = if numeric_layers.is_empty() {
        String::new()
    } else {
        (numeric_layers.iter().sum::<f32>() / numeric_layers.len() as f32).to_string()
    };

    SubgraphNode {
        node_id: supernode.node_id.clone(),
        feature_id: format!("supernode-{}", supernode.entry_index),
        label: supernode.entry.label.clone(),
        layer,
        ctx_idx: mean(|node| node.ctx_idx),
        stream_idx: mean(|node| node.stream_idx),
        input_abs_sum: members
            .iter()
            .map(|&member| graph.nodes[member].input_abs_sum)
            .sum(),
        input_abs_sum_external: members.iter().map(|member| external[member]).sum(),
        members: members.clone(),
        member_node_ids: supernode.entry.member_ids.clone(),
        grouping_index: Some(supernode.entry_index),
    }
}

fn decorate_member_label(supernode_label: &str, base_label: String, member_count: usize) -> String {
    if member_count == 1 && base_label == supernode_label {
        return base_label;
    }
    if base_label == supernode_label {
        format!("[{supernode_label}]")
    } else {
        format!("[{supernode_label}] {base_label}")
    }
}

fn combine_links(graph: &AttributionGraph, pinned: &HashMap<usize, PinnedMember>) -> Vec<SubgraphLink> {
    let mut combined: Vec<SubgraphLink> = Vec::new();
    let mut index_by_pair: HashMap<(usize, usize), usize> = HashMap::new();

    for (link_index, link) in graph.links.iter().enumerate() {
        let (Some(source), Some(target)) = (pinned.get(&link.source), pinned.get(&link.target)) else {
            continue;
        };

        let contribution = if target.input_abs_sum_external != 0.0 {
            (link.weight / target.input_abs_sum_external) * target.input_weighting
        } else {
            0.0
        };

        let pair = (source.visible_index, target.visible_index);
        let slot = *index_by_pair.entry(pair).or_insert_with(|| {
            combined.push(SubgraphLink {
                source: pair.0,
                target: pair.1,
                weight: 0.0,
                original_links: Vec::new(),
            });
            combined.len() - 1
        });
        combined[slot].weight += contribution;
        combined[slot].original_links.push(link_index);
    }

    combined.retain(|link| link.source != link.target);
    combined.sort_by(|a, b| a.weight.abs().total_cmp(&b.weight.abs()));
    combined
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::app::test_support::graph_with_links;

    fn state_with(pinned: &[&str], groups: &[(&str, &[&str])]) -> ViewState {
        ViewState {
            pinned_ids: pinned.iter().map(|id| (*id).to_owned()).collect(),
            supernodes: groups
                .iter()
                .map(|(label, members)| {
                    GroupingEntry::new(*label, members.iter().map(|id| (*id).to_owned()).collect())
                })
                .collect(),
            ..ViewState::default()
        }
    }

    fn visible_ids(subgraph: &Subgraph) -> Vec<&str> {
        subgraph.nodes.iter().map(|node| node.node_id.as_str()).collect()
    }

    #[test]
    fn grouping_two_targets_leaves_single_combined_edge() {
        let graph = graph_with_links(&["A", "B", "C"], &[("A", "B", 0.5), ("A", "C", -0.3)]);
        let state = state_with(&["A", "B", "C"], &[("S", &["B", "C"])]);

        let subgraph = build_subgraph(&graph, &state);

        assert_eq!(visible_ids(&subgraph), vec!["A", "S"]);
        assert_eq!(subgraph.links.len(), 1);
        let link = &subgraph.links[0];
        assert_eq!(subgraph.nodes[link.source].node_id, "A");
        assert_eq!(subgraph.nodes[link.target].node_id, "S");
        assert_eq!(link.original_links.len(), 2);

        let b = subgraph.member(graph.index_by_id["B"]).unwrap();
        let c = subgraph.member(graph.index_by_id["C"]).unwrap();
        assert_eq!(b.input_weighting, 0.5);
        assert_eq!(c.input_weighting, 0.5);
        let expected = (0.5 / 0.5) * 0.5 + (-0.3 / 0.3) * 0.5;
        assert!((link.weight - expected).abs() < 1e-12);
    }

    #[test]
    fn apportions_by_member_weighting() {
        let graph = graph_with_links(
            &["A", "B", "C", "D"],
            &[("A", "B", 0.5), ("D", "B", 0.5), ("A", "C", 0.3)],
        );
        let state = state_with(&["A", "B", "C"], &[("S", &["B", "C"])]);

        let subgraph = build_subgraph(&graph, &state);

        assert_eq!(subgraph.links.len(), 1);
        let expected = (0.5 / 1.0) * 0.5 + (0.3 / 0.3) * 0.5;
        assert!((subgraph.links[0].weight - expected).abs() < 1e-12);
    }

    #[test]
    fn internal_links_do_not_count_as_external_input() {
        let graph = graph_with_links(&["A", "B", "C"], &[("A", "B", 1.0), ("B", "C", 2.0), ("A", "C", 2.0)]);
        let state = state_with(&["A", "B", "C"], &[("S", &["B", "C"])]);

        let subgraph = build_subgraph(&graph, &state);
        let c = subgraph.member(graph.index_by_id["C"]).unwrap();

        assert_eq!(c.input_abs_sum_external, 2.0);
        assert_eq!(subgraph.node("S").unwrap().input_abs_sum_external, 3.0);
        assert_eq!(subgraph.node("S").unwrap().input_abs_sum, 5.0);
        assert!(subgraph.links.iter().all(|link| link.source != link.target));
    }

    #[test]
    fn unresolved_members_and_empty_groups_are_dropped() {
        let graph = graph_with_links(&["A", "B", "C"], &[("A", "B", 1.0)]);
        let state = state_with(&["A", "B"], &[("ghost", &["C", "Z"]), ("pair", &["B", "Z"])]);

        let subgraph = build_subgraph(&graph, &state);

        assert_eq!(visible_ids(&subgraph), vec!["A", "pair"]);
        assert_eq!(subgraph.node("pair").unwrap().members, vec![graph.index_by_id["B"]]);
        assert_eq!(subgraph.node("pair").unwrap().member_node_ids, vec!["B", "Z"]);
    }

    #[test]
    fn label_colliding_with_node_id_gets_synthetic_id() {
        let graph = graph_with_links(&["A", "B", "C"], &[]);
        let state = state_with(&["A", "B", "C"], &[("A", &["B", "C"]), ("A", &["A"])]);

        let subgraph = build_subgraph(&graph, &state);

        assert_eq!(visible_ids(&subgraph), vec!["supernode-0", "supernode-1"]);
        assert_eq!(subgraph.nodes[0].label, "A");
    }

    #[test]
    fn member_labels_are_decorated_with_group_label() {
        let graph = graph_with_links(&["A", "B", "C"], &[]);
        let mut state = state_with(&["A", "B", "C"], &[("texas", &["B", "C"]), ("clerp A", &["A"])]);
        state.set_label_override("f-C", "texas");

        let subgraph = build_subgraph(&graph, &state);
        let label = |id: &str| subgraph.member(graph.index_by_id[id]).unwrap().display_label.clone();

        assert_eq!(label("B"), "[texas] clerp B");
        assert_eq!(label("C"), "[texas]");
        assert_eq!(label("A"), "clerp A");
    }

    #[test]
    fn supernode_position_is_mean_of_members() {
        let graph = graph_with_links(&["A", "B", "C"], &[]);
        let state = state_with(&["A", "B", "C"], &[("S", &["A", "C"])]);

        let subgraph = build_subgraph(&graph, &state);
        let supernode = subgraph.node("S").unwrap();

        assert_eq!(supernode.ctx_idx, 1.0);
        assert_eq!(supernode.layer, "1");
        assert_eq!(supernode.feature_id, "supernode-0");
    }

    #[test]
    fn links_are_sorted_by_absolute_weight() {
        let graph = graph_with_links(&["A", "B", "C"], &[("A", "C", 3.0), ("B", "C", -1.0)]);
        let state = state_with(&["A", "B", "C"], &[]);

        let subgraph = build_subgraph(&graph, &state);
        let weights = subgraph.links.iter().map(|link| link.weight).collect::<Vec<_>>();

        assert_eq!(weights, vec![-0.25, 0.75]);
    }

    #[test]
    fn pin_cap_applies_before_grouping() {
        let ids = (0..250).map(|index| format!("n{index}")).collect::<Vec<_>>();
        let id_refs = ids.iter().map(String::as_str).collect::<Vec<_>>();
        let graph = graph_with_links(&id_refs, &[]);
        let state = state_with(&id_refs, &[("late", &["n240", "n241"])]);

        let subgraph = build_subgraph(&graph, &state);

        assert_eq!(subgraph.nodes.len(), 200);
        assert!(subgraph.node("late").is_none());
    }

    const NODE_IDS: [&str; 7] = ["a", "b", "c", "d", "e", "f", "g"];

    fn scenario() -> impl Strategy<Value = (Vec<(usize, usize, f64)>, Vec<bool>, Vec<Vec<usize>>)> {
        let links = prop::collection::vec((0usize..7, 0usize..7, -1.0f64..1.0), 0..24);
        let pinned = prop::collection::vec(any::<bool>(), 7);
        let groups = prop::collection::vec(prop::collection::vec(0usize..7, 0..4), 0..3);
        (links, pinned, groups)
    }

    fn build_scenario(
        links: &[(usize, usize, f64)],
        pinned: &[bool],
        groups: &[Vec<usize>],
    ) -> (AttributionGraph, ViewState) {
        let link_refs = links
            .iter()
            .filter(|(source, target, _)| source != target)
            .map(|&(source, target, weight)| (NODE_IDS[source], NODE_IDS[target], weight))
            .collect::<Vec<_>>();
        let graph = graph_with_links(&NODE_IDS, &link_refs);
        let state = ViewState {
            pinned_ids: NODE_IDS
                .iter()
                .zip(pinned)
                .filter(|(_, pinned)| **pinned)
                .map(|(id, _)| (*id).to_owned())
                .collect(),
            supernodes: groups
                .iter()
                .enumerate()
                .map(|(index, members)| {
                    GroupingEntry::new(
                        format!("group {index}"),
                        members.iter().map(|&member| NODE_IDS[member].to_owned()).collect(),
                    )
                })
                .collect(),
            ..ViewState::default()
        };
        (graph, state)
    }

    proptest! {
        #[test]
        fn visible_count_matches_ungrouped_plus_live_groups((links, pinned, groups) in scenario()) {
            let (graph, state) = build_scenario(&links, &pinned, &groups);
            let subgraph = build_subgraph(&graph, &state);

            let grouped = subgraph.pinned.values().filter(|member| member.supernode_id.is_some()).count();
            let live_groups = subgraph.nodes.iter().filter(|node| node.is_supernode()).count();
            prop_assert_eq!(subgraph.nodes.len(), subgraph.pinned.len() - grouped + live_groups);
            prop_assert!(subgraph.nodes.iter().all(|node| !node.members.is_empty()));
        }

        #[test]
        fn combined_links_are_unique_and_never_loops((links, pinned, groups) in scenario()) {
            let (graph, state) = build_scenario(&links, &pinned, &groups);
            let subgraph = build_subgraph(&graph, &state);

            let mut pairs = HashSet::new();
            for link in &subgraph.links {
                prop_assert!(link.source != link.target);
                prop_assert!(pairs.insert((link.source, link.target)));
            }
        }

        #[test]
        fn member_weighting_sums_to_one_or_zero((links, pinned, groups) in scenario()) {
            let (graph, state) = build_scenario(&links, &pinned, &groups);
            let subgraph = build_subgraph(&graph, &state);

            for node in &subgraph.nodes {
                let weights = node.members.iter().map(|member| subgraph.pinned[member].input_weighting).collect::<Vec<_>>();
                let total = weights.iter().sum::<f64>();
                let any_external = node.members.iter().any(|member| subgraph.pinned[member].input_abs_sum_external > 0.0);
                if any_external {
                    prop_assert!((total - 1.0).abs() < 1e-9);
                } else {
                    prop_assert!(weights.iter().all(|weight| *weight == 0.0));
                }
            }
        }

        #[test]
        fn aggregation_is_idempotent((links, pinned, groups) in scenario()) {
            let (graph, state) = build_scenario(&links, &pinned, &groups);
            prop_assert_eq!(build_subgraph(&graph, &state), build_subgraph(&graph, &state));
        }

        #[test]
        fn absolute_combined_input_never_exceeds_one((links, pinned, groups) in scenario()) {
            let (graph, state) = build_scenario(&links, &pinned, &groups);
            let subgraph = build_subgraph(&graph, &state);

            for target in 0..subgraph.nodes.len() {
                let total = subgraph
                    .links
                    .iter()
                    .filter(|link| link.target == target)
                    .map(|link| {
                        link.original_links
                            .iter()
                            .map(|&index| {
                                let original = &graph.links[index];
                                let member = &subgraph.pinned[&original.target];
                                if member.input_abs_sum_external == 0.0 {
                                    0.0
                                } else {
                                    (original.weight / member.input_abs_sum_external).abs() * member.input_weighting
                                }
                            })
                            .sum::<f64>()
                    })
                    .sum::<f64>();
                prop_assert!(total <= 1.0 + 1e-9);
            }
        }
    }
}
