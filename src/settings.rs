use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::error::Result;
use crate::matcher::FilterKind;
use crate::rules::RuleSet;

const DEFAULT_ROUTE: &str = "incompatible_browser";
const DEFAULT_TIMEOUT: u64 = 7200;

/// Filter configuration, typically published by the host application as a
/// small YAML document:
///
/// ```yaml
/// route: incompatible_browser
/// timeout: 7200
/// type: block
/// rules:
///   Tablet: '*'
///   Other:
///     IE:
///       '<': '9'
/// ```
///
/// `blocked:` is accepted as a legacy spelling of `rules:`. Every key is
/// optional; rules default to none and the filter kind to unset.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    /// Name of the route clients are redirected to.
    pub route: String,
    /// Seconds a cached verdict or memoized filter string stays fresh.
    pub timeout: u64,
    /// Globally configured filter polarity, if any.
    pub kind: Option<FilterKind>,
    /// Rules evaluated by settings-sourced filters.
    pub rules: RuleSet,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            route: DEFAULT_ROUTE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            kind: None,
            rules: RuleSet::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawSettings {
    route: Option<String>,
    timeout: Option<u64>,
    #[serde(alias = "type")]
    kind: Option<String>,
    #[serde(alias = "blocked")]
    rules: Option<Value>,
}

impl FilterSettings {
    /// Loads settings from a YAML document, validating the rule shapes and
    /// the filter kind.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawSettings = serde_yaml::from_str(yaml)?;
        let kind = match raw.kind {
            Some(kind) => Some(kind.parse::<FilterKind>()?),
            None => None,
        };
        let rules = match &raw.rules {
            Some(value) => RuleSet::from_value(value)?,
            None => RuleSet::new(),
        };
        let settings = Self {
            route: raw.route.unwrap_or_else(|| DEFAULT_ROUTE.to_string()),
            timeout: raw.timeout.unwrap_or(DEFAULT_TIMEOUT),
            kind,
            rules,
        };
        debug!(
            route = %settings.route,
            timeout = settings.timeout,
            devices = settings.rules.len(),
            "loaded filter settings"
        );
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_kind(mut self, kind: FilterKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }
}
