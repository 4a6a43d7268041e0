//! Context configuration.
//!
//! A `GraphConfig` is usually built in code, but it can also be loaded from
//! the embedding's JSON settings:
//!
//! ```rust
//! use signal_graph::GraphConfig;
//!
//! let config = GraphConfig::from_json(r#"{ "label": "page", "max_update_depth": 16 }"#).unwrap();
//! assert_eq!(config.max_update_depth, 16);
//! ```

use serde::Deserialize;

/// Default bound on nested effect flushes. Effects that write signals read
/// by other effects nest one flush per step, so a legitimate cascade longer
/// than this fails with
/// [`Error::UpdateDepthExceeded`](crate::Error::UpdateDepthExceeded); raise
/// it with [`GraphConfig::with_max_update_depth`] for deeper chains.
pub const DEFAULT_MAX_UPDATE_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Recorded on the context's tracing span.
    pub label: Option<String>,

    /// How many effect flushes may nest before the batch is aborted with
    /// [`Error::UpdateDepthExceeded`](crate::Error::UpdateDepthExceeded).
    pub max_update_depth: usize,
}

impl GraphConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_max_update_depth(mut self, depth: usize) -> Self {
        self.max_update_depth = depth;
        self
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_update_depth: DEFAULT_MAX_UPDATE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = GraphConfig::from_json("{}").unwrap();
        assert_eq!(config, GraphConfig::default());
        assert_eq!(config.max_update_depth, DEFAULT_MAX_UPDATE_DEPTH);
    }

    #[test]
    fn parses_all_fields() {
        let config =
            GraphConfig::from_json(r#"{ "label": "card", "max_update_depth": 4 }"#).unwrap();
        assert_eq!(config.label.as_deref(), Some("card"));
        assert_eq!(config.max_update_depth, 4);
    }

    #[test]
    fn rejects_bad_types() {
        assert!(GraphConfig::from_json(r#"{ "max_update_depth": "deep" }"#).is_err());
    }

    #[test]
    fn builder_methods() {
        let config = GraphConfig::default()
            .with_label("root")
            .with_max_update_depth(8);
        assert_eq!(config.label.as_deref(), Some("root"));
        assert_eq!(config.max_update_depth, 8);
    }
}
