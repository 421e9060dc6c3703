use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

use crate::attribution::AttributionGraph;

use super::state::{GroupingEntry, ViewState, label_pairs};

pub(in crate::app) const URL_SYNC_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub(in crate::app) enum QueryStateError {
    #[error("query field `{field}` is not valid JSON")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("query field `{field}` is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid share URL")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(in crate::app) struct QueryOverrides {
    pub slug: Option<String>,
    pub pinned_ids: Option<Vec<String>>,
    pub clicked_id: Option<String>,
    pub supernodes: Option<Vec<GroupingEntry>>,
    pub label_overrides: Option<Vec<(String, String)>>,
    pub pruning_threshold: Option<f64>,
    pub density_threshold: Option<f64>,
    pub saved_positions: Option<String>,
}

impl QueryOverrides {
    pub(in crate::app) fn apply(self, state: &mut ViewState, graph: &AttributionGraph) {
        if let Some(pinned_ids) = self.pinned_ids {
            state.pinned_ids = pinned_ids;
        }
        if let Some(clicked_id) = self.clicked_id {
            if let Some(node) = graph.node(&clicked_id) {
                state.clicked_ctx_idx = Some(node.ctx_idx);
                state.clicked_id = Some(clicked_id);
            } else {
                debug!(clicked_id, "ignoring clicked id that is not in the graph");
            }
        }
        if let Some(supernodes) = self.supernodes {
            state.supernodes = supernodes;
        }
        if let Some(label_overrides) = self.label_overrides {
            state.label_overrides = label_overrides;
        }
        if self.pruning_threshold.is_some() {
            state.pruning_threshold = self.pruning_threshold;
        }
        if self.density_threshold.is_some() {
            state.density_threshold = self.density_threshold;
        }
        if self.saved_positions.is_some() {
            state.saved_positions = self.saved_positions;
        }
    }
}

pub(in crate::app) fn query_params(state: &ViewState, slug: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    let mut push = |key: &'static str, value: Option<String>| {
        if let Some(value) = value.filter(|value| !value.is_empty()) {
            params.push((key, value));
        }
    };

    push("slug", slug.map(str::to_owned));
    push("pinnedIds", Some(state.pinned_ids.join(",")));
    push("clickedId", state.clicked_id.clone());
    if !state.supernodes.is_empty() {
        let supernodes = state
            .supernodes
            .iter()
            .map(GroupingEntry::to_array)
            .collect::<Vec<_>>();
        push("supernodes", serde_json::to_string(&supernodes).ok());
    }
    if !state.label_overrides.is_empty() {
        let clerps = state
            .label_overrides
            .iter()
            .map(|(feature_id, label)| [feature_id.as_str(), label.as_str()])
            .collect::<Vec<_>>();
        push("clerps", serde_json::to_string(&clerps).ok());
    }
    push("pruningThreshold", state.pruning_threshold.map(|value| value.to_string()));
    push("densityThreshold", state.density_threshold.map(|value| value.to_string()));
    push("sg_pos", state.exported_positions.clone());
    params
}

pub(in crate::app) fn encode_query(state: &ViewState, slug: Option<&str>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in query_params(state, slug) {
        serializer.append_pair(key, &value);
    }
    serializer.finish()
}

/// Accepts a bare query (`a=b&c=d`), one with a leading `?`, or a full share URL.
pub(in crate::app) fn decode_query(input: &str) -> (QueryOverrides, Vec<QueryStateError>) {
    let input = input.trim();
    let mut errors = Vec::new();

    let query = if input.contains("://") {
        match Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_owned(),
            Err(error) => {
                errors.push(QueryStateError::from(error));
                return (QueryOverrides::default(), errors);
            }
        }
    } else {
        input.trim_start_matches('?').to_owned()
    };

    let mut overrides = QueryOverrides::default();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let value = value.into_owned();
        match key.as_ref() {
            "slug" => overrides.slug = Some(value),
            "pinnedIds" => {
                overrides.pinned_ids = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_owned)
                        .collect(),
                );
            }
            "clickedId" => overrides.clicked_id = Some(value).filter(|id| !id.is_empty()),
            "supernodes" => match serde_json::from_str::<Vec<Vec<String>>>(&value) {
                Ok(entries) => {
                    overrides.supernodes = Some(
                        entries
                            .iter()
                            .filter_map(|values| GroupingEntry::from_array(values))
                            .collect(),
                    );
                }
                Err(source) => errors.push(QueryStateError::InvalidJson {
                    field: "supernodes",
                    source,
                }),
            },
            "clerps" => match serde_json::from_str::<Vec<Vec<String>>>(&value) {
                Ok(pairs) => overrides.label_overrides = Some(label_pairs(&pairs)),
                Err(source) => errors.push(QueryStateError::InvalidJson {
                    field: "clerps",
                    source,
                }),
            },
            "pruningThreshold" => match parse_number("pruningThreshold", &value) {
                Ok(number) => overrides.pruning_threshold = Some(number),
                Err(error) => errors.push(error),
            },
            "densityThreshold" => match parse_number("densityThreshold", &value) {
                Ok(number) => overrides.density_threshold = Some(number),
                Err(error) => errors.push(error),
            },
            "sg_pos" => overrides.saved_positions = Some(value).filter(|value| !value.is_empty()),
            other => debug!(key = other, "ignoring unknown query parameter"),
        }
    }

    for error in &errors {
        warn!(%error, "skipping query state field");
    }
    (overrides, errors)
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, QueryStateError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| QueryStateError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}

/// Debounced one-way push of the view state into a shareable query string.
pub(in crate::app) struct UrlSync {
    observed: String,
    published: String,
    last_change: Option<Instant>,
}

impl UrlSync {
    pub(in crate::app) fn new(initial: String) -> Self {
        Self {
            observed: initial.clone(),
            published: initial,
            last_change: None,
        }
    }

    pub(in crate::app) fn observe(&mut self, query: String, now: Instant) {
        if query != self.observed {
            self.observed = query;
            self.last_change = Some(now);
        }
    }

    /// Returns the newly published query once the state has been quiet for the
    /// debounce window.
    pub(in crate::app) fn poll(&mut self, now: Instant) -> Option<&str> {
        let changed_at = self.last_change?;
        if now.saturating_duration_since(changed_at) < URL_SYNC_DEBOUNCE {
            return None;
        }

        self.last_change = None;
        if self.published == self.observed {
            return None;
        }
        self.published = self.observed.clone();
        debug!(query = %self.published, "updating url params");
        Some(&self.published)
    }

    pub(in crate::app) fn is_pending(&self) -> bool {
        self.last_change.is_some()
    }

    pub(in crate::app) fn published(&self) -> &str {
        &self.published
    }
}
