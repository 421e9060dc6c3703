use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use super::graph::{
    AttributionGraph, DefaultViewParams, EMBEDDING_LAYER, FeatureLink, FeatureNode,
    GraphMetadata, LOGIT_LAYER,
};
use super::parse::{RawGraph, RawNode, RawViewParams};

pub fn load_attribution_graph(path: &Path) -> Result<AttributionGraph> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read graph document {}", path.display()))?;
    let graph = parse_graph_document(&raw)
        .with_context(|| format!("failed to parse graph document {}", path.display()))?;

    info!(
        path = %path.display(),
        nodes = graph.node_count(),
        links = graph.edge_count(),
        "loaded attribution graph"
    );
    Ok(graph)
}

pub fn parse_graph_document(raw: &str) -> Result<AttributionGraph> {
    let document: RawGraph = serde_json::from_str(raw).context("invalid graph JSON")?;
    if document.nodes.is_empty() {
        return Err(anyhow!("graph document contains no nodes"));
    }

    let max_layer = document
        .nodes
        .iter()
        .filter_map(|node| node.resolved_layer().parse::<f32>().ok())
        .fold(0.0_f32, f32::max);

    let mut nodes = Vec::with_capacity(document.nodes.len());
    let mut index_by_id = HashMap::with_capacity(document.nodes.len());
    for raw_node in document.nodes {
        let Some(node_id) = raw_node.resolved_id() else {
            debug!("skipping graph node without an id");
            continue;
        };
        if index_by_id.contains_key(&node_id) {
            debug!(node_id, "skipping duplicate graph node");
            continue;
        }

        index_by_id.insert(node_id.clone(), nodes.len());
        nodes.push(build_node(raw_node, node_id, max_layer));
    }

    let mut links = Vec::with_capacity(document.links.len());
    for raw_link in document.links {
        let (Some(&source), Some(&target)) = (
            index_by_id.get(&raw_link.source),
            index_by_id.get(&raw_link.target),
        ) else {
            continue;
        };

        let link_index = links.len();
        nodes[source].outgoing.push(link_index);
        nodes[target].incoming.push(link_index);
        links.push(FeatureLink {
            source,
            target,
            weight: raw_link.weight,
            pct_input: 0.0,
        });
    }

    for node in &mut nodes {
        if node.input_abs_sum <= 0.0 {
            node.input_abs_sum = node
                .incoming
                .iter()
                .map(|&link| links[link].weight.abs())
                .sum();
        }
    }

    for link in &mut links {
        let input_abs_sum = nodes[link.target].input_abs_sum;
        link.pct_input = if input_abs_sum > 0.0 {
            link.weight / input_abs_sum
        } else {
            0.0
        };
    }

    Ok(AttributionGraph {
        metadata: GraphMetadata {
            slug: document.metadata.slug,
            prompt: document.metadata.prompt,
            scan: document.metadata.scan,
            node_threshold: document.metadata.node_threshold,
        },
        nodes,
        links,
        index_by_id,
        default_view: document.q_params.map(default_view_params),
    })
}

fn build_node(raw: RawNode, node_id: String, max_layer: f32) -> FeatureNode {
    let feature_id = raw.resolved_feature_id(&node_id);
    let layer = raw.resolved_layer();
    let clerp = raw.resolved_clerp();
    let stream_idx = raw
        .stream_idx
        .unwrap_or_else(|| stream_index_for_layer(&layer, max_layer));

    FeatureNode {
        node_id,
        feature_id,
        clerp,
        explanation: raw.explanation,
        layer,
        ctx_idx: raw.ctx_idx.unwrap_or(0.0),
        stream_idx,
        input_abs_sum: raw.input_abs_sum.unwrap_or(0.0),
        feature_type: raw.feature_type.unwrap_or_default(),
        incoming: Vec::new(),
        outgoing: Vec::new(),
    }
}

fn stream_index_for_layer(layer: &str, max_layer: f32) -> f32 {
    match layer {
        EMBEDDING_LAYER => 0.0,
        LOGIT_LAYER => max_layer + 2.0,
        numeric => numeric.parse::<f32>().map(|value| value + 1.0).unwrap_or(0.0),
    }
}

fn default_view_params(raw: RawViewParams) -> DefaultViewParams {
    DefaultViewParams {
        pinned_ids: raw.pinned_ids.map(|ids| ids.into_ids()).unwrap_or_default(),
        clicked_id: raw.clicked_id.filter(|id| !id.is_empty()),
        supernodes: raw.supernodes.unwrap_or_default(),
        clerps: raw.clerps.unwrap_or_default(),
        saved_positions: raw.sg_pos.filter(|positions| !positions.is_empty()),
        pruning_threshold: raw.pruning_threshold,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const DOCUMENT: &str = r#"{
        "metadata": { "slug": "capital-state", "node_threshold": 0.8 },
        "nodes": [
            { "nodeId": "E_26_0", "feature": 26, "layer": "E", "ctx_idx": 0, "clerp": "Emb: Dallas", "feature_type": "embedding" },
            { "nodeId": "1_100_1", "featureId": "1_100", "layer": "1", "ctx_idx": 1, "clerp": "Texas", "feature_type": "cross layer transcoder" },
            { "node_id": "20_5_2", "feature": 5, "layer": 20, "ctx_idx": 2, "clerp": "say a capital", "explanation": "capital cities" },
            { "nodeId": "27_9_2", "layer": "Lgt", "ctx_idx": 2, "clerp": "Austin", "inputAbsSum": 4.0 }
        ],
        "links": [
            { "source": "E_26_0", "target": "1_100_1", "weight": 2.0 },
            { "source": "1_100_1", "target": "27_9_2", "weight": -1.0 },
            { "source": "20_5_2", "target": "27_9_2", "weight": 3.0 },
            { "source": "missing", "target": "27_9_2", "weight": 9.0 }
        ],
        "qParams": { "pinnedIds": "E_26_0,1_100_1", "supernodes": [["texas", "1_100_1"]] }
    }"#;

    #[test]
    fn parses_nodes_links_and_back_references() {
        let graph = parse_graph_document(DOCUMENT).unwrap();

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);

        let logit = graph.node("27_9_2").unwrap();
        assert_eq!(logit.incoming.len(), 2);
        assert_eq!(logit.input_abs_sum, 4.0);

        let texas = graph.node("1_100_1").unwrap();
        assert_eq!(texas.feature_id, "1_100");
        assert_eq!(texas.input_abs_sum, 2.0);
        assert_eq!(texas.outgoing.len(), 1);
        assert!(texas.is_transcoder_feature());
    }

    #[test]
    fn derives_stream_index_from_layer() {
        let graph = parse_graph_document(DOCUMENT).unwrap();

        assert_eq!(graph.node("E_26_0").unwrap().stream_idx, 0.0);
        assert_eq!(graph.node("1_100_1").unwrap().stream_idx, 2.0);
        assert_eq!(graph.node("20_5_2").unwrap().stream_idx, 21.0);
        assert_eq!(graph.node("27_9_2").unwrap().stream_idx, 22.0);
    }

    #[test]
    fn prefers_explanation_as_default_label() {
        let graph = parse_graph_document(DOCUMENT).unwrap();

        assert_eq!(graph.node("20_5_2").unwrap().default_label(), "capital cities");
        assert_eq!(graph.node("20_5_2").unwrap().feature_id, "5");
        assert_eq!(graph.node("1_100_1").unwrap().default_label(), "Texas");
    }

    #[test]
    fn computes_pct_input_against_target_sum() {
        let graph = parse_graph_document(DOCUMENT).unwrap();

        let pct = graph
            .links
            .iter()
            .map(|link| link.pct_input)
            .collect::<Vec<_>>();
        assert_eq!(pct, vec![1.0, -0.25, 0.75]);
    }

    #[test]
    fn reads_default_view_params() {
        let graph = parse_graph_document(DOCUMENT).unwrap();
        let view = graph.default_view.unwrap();

        assert_eq!(view.pinned_ids, vec!["E_26_0", "1_100_1"]);
        assert_eq!(view.supernodes, vec![vec!["texas", "1_100_1"]]);
        assert_eq!(view.clicked_id, None);
    }

    #[test]
    fn rejects_documents_without_nodes() {
        let error = parse_graph_document(r#"{ "nodes": [], "links": [] }"#).unwrap_err();
        assert!(error.to_string().contains("no nodes"));
    }
}
