use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::version;

/// Comparison operator for browser version constraints. Parsing accepts the
/// symbolic and mnemonic spellings (`<`/`lt`, `<=`/`le`, `>`/`gt`, `>=`/`ge`,
/// `=`/`==`/`eq`, `!=`/`<>`/`ne`); rendering always uses the symbolic form,
/// so aliases collapse onto a single key in a version map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
        }
    }

    /// Whether `candidate` relates to `reference` under this operator.
    pub fn compare(&self, candidate: &str, reference: &str) -> bool {
        let ordering = version::compare(candidate, reference);
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "<" | "lt" => Operator::Lt,
            "<=" | "le" => Operator::Le,
            ">" | "gt" => Operator::Gt,
            ">=" | "ge" => Operator::Ge,
            "=" | "==" | "eq" => Operator::Eq,
            "!=" | "<>" | "ne" => Operator::Ne,
            other => {
                return Err(Error::InvalidRuleDefinitions(format!(
                    "unknown operator {other:?}"
                )))
            }
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Rule for one browser family under a device: either a wildcard matching
/// every version, or version constraints keyed by operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserRule {
    Wildcard,
    Versions(IndexMap<Operator, String>),
}

/// Rule for one device family: either a wildcard matching every browser on
/// that device, or per-browser rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRule {
    Wildcard,
    Browsers(IndexMap<String, BrowserRule>),
}

/// Filter rules keyed by device family.
///
/// Maps are insertion-ordered so validation reports the first offending
/// entry of a definition and serialization is stable enough to fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    devices: IndexMap<String, DeviceRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn device_rule(&self, device: &str) -> Option<&DeviceRule> {
        self.devices.get(device)
    }

    pub fn browser_rule(&self, device: &str, browser: &str) -> Option<&BrowserRule> {
        match self.devices.get(device)? {
            DeviceRule::Wildcard => None,
            DeviceRule::Browsers(browsers) => browsers.get(browser),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeviceRule)> {
        self.devices.iter()
    }

    /// Matches everything on `device`, replacing any narrower rule recorded
    /// for it.
    pub fn set_device_wildcard(&mut self, device: impl Into<String>) {
        self.devices.insert(device.into(), DeviceRule::Wildcard);
    }

    /// Matches every version of `browser` on `device`, replacing any version
    /// constraints recorded for that browser. An existing device wildcard
    /// absorbs the assignment.
    pub fn set_browser_wildcard(&mut self, device: impl Into<String>, browser: impl Into<String>) {
        match self
            .devices
            .entry(device.into())
            .or_insert_with(|| DeviceRule::Browsers(IndexMap::new()))
        {
            DeviceRule::Wildcard => {}
            DeviceRule::Browsers(browsers) => {
                browsers.insert(browser.into(), BrowserRule::Wildcard);
            }
        }
    }

    /// Records one version constraint, merging with any already present for
    /// the browser. Wildcards on the path absorb the assignment.
    pub fn add_browser_version(
        &mut self,
        device: impl Into<String>,
        browser: impl Into<String>,
        operator: Operator,
        reference: impl Into<String>,
    ) {
        self.merge_browser_versions(device, browser, [(operator, reference.into())]);
    }

    /// Merges version constraints into the browser's version map, creating
    /// the (possibly empty) map when the browser has no rule yet.
    pub(crate) fn merge_browser_versions<I>(
        &mut self,
        device: impl Into<String>,
        browser: impl Into<String>,
        constraints: I,
    ) where
        I: IntoIterator<Item = (Operator, String)>,
    {
        let browsers = match self
            .devices
            .entry(device.into())
            .or_insert_with(|| DeviceRule::Browsers(IndexMap::new()))
        {
            DeviceRule::Wildcard => return,
            DeviceRule::Browsers(browsers) => browsers,
        };
        let versions = match browsers
            .entry(browser.into())
            .or_insert_with(|| BrowserRule::Versions(IndexMap::new()))
        {
            BrowserRule::Wildcard => return,
            BrowserRule::Versions(versions) => versions,
        };
        for (operator, reference) in constraints {
            versions.insert(operator, reference);
        }
    }

    /// Builds a rule set from loosely-typed YAML, rejecting structures the
    /// model cannot represent. `null` means no rules. Entries are checked in
    /// definition order and the first violation is reported.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mapping = match value {
            Value::Null => return Ok(RuleSet::new()),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(Error::InvalidRuleDefinitions(format!(
                    "rules must be a mapping, got {}",
                    value_kind(other)
                )))
            }
        };
        let mut rules = RuleSet::new();
        for (device, device_value) in mapping {
            let device = key_string(device).ok_or_else(|| {
                Error::InvalidRuleDefinitions(format!(
                    "device names must be strings, got {}",
                    value_kind(device)
                ))
            })?;
            match device_value {
                Value::String(s) if s == "*" => rules.set_device_wildcard(device),
                Value::Mapping(browsers) => {
                    // Materialize the device entry even when the map is empty.
                    rules
                        .devices
                        .entry(device.clone())
                        .or_insert_with(|| DeviceRule::Browsers(IndexMap::new()));
                    for (browser, browser_value) in browsers {
                        let browser = key_string(browser).ok_or_else(|| {
                            Error::InvalidRuleDefinitions(format!(
                                "browser names under device {device:?} must be strings, got {}",
                                value_kind(browser)
                            ))
                        })?;
                        read_browser_rule(&mut rules, &device, &browser, browser_value)?;
                    }
                }
                other => {
                    return Err(Error::InvalidRuleDefinitions(format!(
                        "the rule for device {device:?} must be a mapping of browsers or \"*\", got {}",
                        value_kind(other)
                    )))
                }
            }
        }
        Ok(rules)
    }
}

fn read_browser_rule(
    rules: &mut RuleSet,
    device: &str,
    browser: &str,
    value: &Value,
) -> Result<()> {
    match value {
        Value::String(s) if s == "*" => rules.set_browser_wildcard(device, browser),
        Value::Mapping(versions) => {
            // Materialize the browser entry even when the map is empty.
            rules.merge_browser_versions(device, browser, std::iter::empty());
            for (operator, reference) in versions {
                let operator = match operator {
                    Value::String(s) => s.parse::<Operator>().map_err(|_| {
                        Error::InvalidRuleDefinitions(format!(
                            "unknown operator {s:?} for browser {browser:?} on device {device:?}"
                        ))
                    })?,
                    other => {
                        return Err(Error::InvalidRuleDefinitions(format!(
                            "operator keys for browser {browser:?} must be strings, got {}",
                            value_kind(other)
                        )))
                    }
                };
                let reference = match reference {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(Error::InvalidRuleDefinitions(format!(
                            "the version for {device:?}/{browser:?} {operator} must be a string, got {}",
                            value_kind(other)
                        )))
                    }
                };
                rules.add_browser_version(device, browser, operator, reference);
            }
        }
        other => {
            return Err(Error::InvalidRuleDefinitions(format!(
                "the rule for browser {device:?}/{browser:?} must be a mapping of versions or \"*\", got {}",
                value_kind(other)
            )))
        }
    }
    Ok(())
}

fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.devices.len()))?;
        for (device, rule) in &self.devices {
            map.serialize_entry(device, rule)?;
        }
        map.end()
    }
}

impl Serialize for DeviceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DeviceRule::Wildcard => serializer.serialize_str("*"),
            DeviceRule::Browsers(browsers) => browsers.serialize(serializer),
        }
    }
}

impl Serialize for BrowserRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            BrowserRule::Wildcard => serializer.serialize_str("*"),
            BrowserRule::Versions(versions) => versions.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RuleSet::from_value(&value).map_err(serde::de::Error::custom)
    }
}
