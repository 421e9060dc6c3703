use std::collections::HashMap;

pub const EMBEDDING_LAYER: &str = "E";
pub const LOGIT_LAYER: &str = "Lgt";
const TRANSCODER_FEATURE_TYPE: &str = "cross layer transcoder";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphMetadata {
    pub slug: Option<String>,
    pub prompt: Option<String>,
    pub scan: Option<String>,
    pub node_threshold: Option<f64>,
}

/// View state shipped inside the graph document (`qParams`), applied before any
/// query string given on the command line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DefaultViewParams {
    pub pinned_ids: Vec<String>,
    pub clicked_id: Option<String>,
    pub supernodes: Vec<Vec<String>>,
    pub clerps: Vec<Vec<String>>,
    pub saved_positions: Option<String>,
    pub pruning_threshold: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct FeatureNode {
    pub node_id: String,
    pub feature_id: String,
    pub clerp: String,
    pub explanation: Option<String>,
    pub layer: String,
    pub ctx_idx: f32,
    pub stream_idx: f32,
    pub input_abs_sum: f64,
    pub feature_type: String,
    /// Links whose target is this node.
    pub incoming: Vec<usize>,
    /// Links whose source is this node.
    pub outgoing: Vec<usize>,
}

impl FeatureNode {
    pub fn default_label(&self) -> &str {
        self.explanation
            .as_deref()
            .filter(|explanation| !explanation.is_empty())
            .unwrap_or(&self.clerp)
    }

    pub fn is_transcoder_feature(&self) -> bool {
        self.feature_type == TRANSCODER_FEATURE_TYPE
    }

    pub fn layer_label(&self) -> String {
        match self.layer.as_str() {
            EMBEDDING_LAYER => "Emb".to_owned(),
            LOGIT_LAYER => "Logit".to_owned(),
            layer => format!("Layer {layer}"),
        }
    }

    pub fn numeric_layer(&self) -> Option<f32> {
        self.layer.parse::<f32>().ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureLink {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
    /// Share of the target's absolute input carried by this link.
    pub pct_input: f64,
}

#[derive(Clone, Debug)]
pub struct AttributionGraph {
    pub metadata: GraphMetadata,
    pub nodes: Vec<FeatureNode>,
    pub links: Vec<FeatureLink>,
    pub index_by_id: HashMap<String, usize>,
    pub default_view: Option<DefaultViewParams>,
}

impl AttributionGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.links.len()
    }

    pub fn node(&self, node_id: &str) -> Option<&FeatureNode> {
        self.index_by_id
            .get(node_id)
            .and_then(|&index| self.nodes.get(index))
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index_by_id.contains_key(node_id)
    }

    pub fn link_endpoints(&self, link: &FeatureLink) -> (&FeatureNode, &FeatureNode) {
        (&self.nodes[link.source], &self.nodes[link.target])
    }

    pub fn top_incoming(&self, node_index: usize, limit: usize) -> Vec<&FeatureLink> {
        self.top_links(&self.nodes[node_index].incoming, limit)
    }

    pub fn top_outgoing(&self, node_index: usize, limit: usize) -> Vec<&FeatureLink> {
        self.top_links(&self.nodes[node_index].outgoing, limit)
    }

    fn top_links(&self, link_indices: &[usize], limit: usize) -> Vec<&FeatureLink> {
        let mut links = link_indices
            .iter()
            .filter_map(|&index| self.links.get(index))
            .collect::<Vec<_>>();
        links.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
        links.truncate(limit);
        links
    }
}
