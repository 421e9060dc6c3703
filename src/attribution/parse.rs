use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(super) struct RawGraph {
    #[serde(default)]
    pub(super) metadata: RawMetadata,
    pub(super) nodes: Vec<RawNode>,
    #[serde(default)]
    pub(super) links: Vec<RawLink>,
    #[serde(default, rename = "qParams")]
    pub(super) q_params: Option<RawViewParams>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawMetadata {
    #[serde(default)]
    pub(super) slug: Option<String>,
    #[serde(default)]
    pub(super) prompt: Option<String>,
    #[serde(default)]
    pub(super) scan: Option<String>,
    #[serde(default)]
    pub(super) node_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawNode {
    #[serde(default, rename = "nodeId")]
    pub(super) node_id: Option<String>,
    #[serde(default, rename = "node_id")]
    pub(super) node_id_snake: Option<String>,
    #[serde(default, rename = "jsNodeId")]
    pub(super) js_node_id: Option<String>,
    #[serde(default, rename = "featureId")]
    pub(super) feature_id: Option<String>,
    #[serde(default)]
    pub(super) feature: Option<Value>,
    #[serde(default)]
    pub(super) layer: Option<Value>,
    #[serde(default)]
    pub(super) ctx_idx: Option<f32>,
    #[serde(default, rename = "streamIdx")]
    pub(super) stream_idx: Option<f32>,
    #[serde(default, rename = "inputAbsSum")]
    pub(super) input_abs_sum: Option<f64>,
    #[serde(default)]
    pub(super) feature_type: Option<String>,
    #[serde(default)]
    pub(super) clerp: Option<String>,
    #[serde(default, rename = "ppClerp")]
    pub(super) pp_clerp: Option<String>,
    #[serde(default)]
    pub(super) explanation: Option<String>,
}

impl RawNode {
    pub(super) fn resolved_id(&self) -> Option<String> {
        [&self.node_id, &self.node_id_snake, &self.js_node_id]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .cloned()
    }

    pub(super) fn resolved_feature_id(&self, node_id: &str) -> String {
        if let Some(feature_id) = self.feature_id.as_ref().filter(|id| !id.is_empty()) {
            return feature_id.clone();
        }

        self.feature
            .as_ref()
            .and_then(scalar_to_string)
            .unwrap_or_else(|| node_id.to_owned())
    }

    pub(super) fn resolved_layer(&self) -> String {
        self.layer
            .as_ref()
            .and_then(scalar_to_string)
            .unwrap_or_default()
    }

    pub(super) fn resolved_clerp(&self) -> String {
        self.clerp
            .clone()
            .or_else(|| self.pp_clerp.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RawLink {
    #[serde(alias = "sourceNodeId")]
    pub(super) source: String,
    #[serde(alias = "targetNodeId")]
    pub(super) target: String,
    #[serde(default)]
    pub(super) weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum IdList {
    Joined(String),
    List(Vec<String>),
}

impl IdList {
    pub(super) fn into_ids(self) -> Vec<String> {
        match self {
            Self::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect(),
            Self::List(ids) => ids,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawViewParams {
    #[serde(default, rename = "pinnedIds")]
    pub(super) pinned_ids: Option<IdList>,
    #[serde(default, rename = "clickedId")]
    pub(super) clicked_id: Option<String>,
    #[serde(default)]
    pub(super) supernodes: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub(super) clerps: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub(super) sg_pos: Option<String>,
    #[serde(default, rename = "pruningThreshold")]
    pub(super) pruning_threshold: Option<f64>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
