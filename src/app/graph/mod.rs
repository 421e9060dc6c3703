mod build;
mod edges;
mod interaction;
mod view;

pub(super) use edges::EdgeLabelAnchors;
