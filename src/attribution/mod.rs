mod graph;
mod load;
mod parse;

pub use graph::{AttributionGraph, DefaultViewParams, FeatureLink, FeatureNode};
pub use load::{load_attribution_graph, parse_graph_document};
