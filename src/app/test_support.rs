use serde_json::json;

use crate::attribution::{AttributionGraph, parse_graph_document};

/// Builds a graph of nodes `ids` (layer = position in the slice, ctx = 0) joined by
/// `(source, target, weight)` links.
pub(in crate::app) fn graph_with_links(ids: &[&str], links: &[(&str, &str, f64)]) -> AttributionGraph {
    let nodes = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            json!({
                "nodeId": id,
                "featureId": format!("f-{id}"),
                "layer": index.to_string(),
                "ctx_idx": index,
                "clerp": format!("clerp {id}"),
                "feature_type": "cross layer transcoder",
            })
        })
        .collect::<Vec<_>>();
    let links = links
        .iter()
        .map(|(source, target, weight)| json!({ "source": source, "target": target, "weight": weight }))
        .collect::<Vec<_>>();

    let document = json!({ "metadata": { "slug": "test" }, "nodes": nodes, "links": links });
    parse_graph_document(&document.to_string()).expect("test graph parses")
}
