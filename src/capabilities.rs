//! Capability set construction and merging
//!
//! A capability set is the negotiated configuration (browser, platform,
//! vendor flags) sent to the remote endpoint when opening a session. It
//! is assembled fresh for every test from four layers, lowest precedence
//! first: driver-type defaults, browser-name defaults, session-scoped
//! overrides, and per-test marker overrides. Later layers overwrite
//! earlier keys; a nested vendor-options object is merged key-by-key one
//! level deep, anything deeper collides wholesale.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};

/// Capability key under which gridcap's own per-session options travel
pub const VENDOR_OPTIONS_KEY: &str = "gridcap:options";

/// An immutable-after-build set of session capabilities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    entries: Map<String, Value>,
}

impl CapabilitySet {
    /// Create an empty capability set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a capability, overwriting any existing value
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a capability by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Look up a string capability by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Number of top-level capabilities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no capabilities are set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the capability entries in deterministic key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// The set as a JSON object value, for the wire
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    /// Merge another layer into this one, last write wins.
    ///
    /// When both sides hold a JSON object under the same key, the objects
    /// are merged key-by-key one level deep. Values nested below that are
    /// replaced wholesale, not merged.
    pub fn merge_from(&mut self, higher: &CapabilitySet) {
        for (key, value) in higher.entries.iter() {
            match (self.entries.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                _ => {
                    self.entries.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

impl FromIterator<(String, Value)> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Parse a `key=value` capability pair from the CLI surface.
///
/// Values that parse as JSON scalars (`true`, `42`) keep their type;
/// everything else is taken as a string.
pub fn parse_capability_pair(pair: &str) -> Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidCapabilityPair(pair.to_string()))?;
    if key.is_empty() {
        return Err(ConfigError::InvalidCapabilityPair(pair.to_string()).into());
    }
    let value = match Value::from_str(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_))) => v,
        _ => Value::String(raw.to_string()),
    };
    Ok((key.to_string(), value))
}

/// Load session-scoped capability overrides from a JSON file
pub fn load_capabilities_file(path: &Path) -> Result<CapabilitySet> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::CapabilitiesFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let caps: CapabilitySet =
        serde_json::from_str(&raw).map_err(|e| ConfigError::CapabilitiesFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(caps)
}

/// Builds the final capability set for one test
pub struct CapabilityBuilder;

impl CapabilityBuilder {
    /// Merge the four capability layers for `driver`.
    ///
    /// Pure and deterministic: no I/O, no validation of values. Invalid
    /// values are the remote endpoint's to reject, surfacing as session
    /// acquisition failures.
    pub fn build(driver: &str, base: &CapabilitySet, markers: &CapabilitySet) -> CapabilitySet {
        let mut caps = Self::driver_defaults(driver);
        if let Some(browser) = caps.get_str("browserName").map(str::to_owned) {
            caps.merge_from(&Self::browser_defaults(&browser));
        }
        caps.merge_from(base);
        caps.merge_from(markers);
        caps
    }

    /// Default capabilities for a driver type
    fn driver_defaults(driver: &str) -> CapabilitySet {
        let mut caps = CapabilitySet::new();
        match driver.to_ascii_lowercase().as_str() {
            "chrome" => caps.insert("browserName", "chrome"),
            "firefox" => caps.insert("browserName", "firefox"),
            "edge" => caps.insert("browserName", "MicrosoftEdge"),
            "safari" => caps.insert("browserName", "safari"),
            // Remote and cloud grids default to chrome unless overridden
            _ => caps.insert("browserName", "chrome"),
        }
        caps
    }

    /// Default capabilities keyed by the resolved browser name
    fn browser_defaults(browser: &str) -> CapabilitySet {
        let mut caps = CapabilitySet::new();
        match browser {
            "chrome" => {
                caps.insert("goog:chromeOptions", serde_json::json!({ "args": [] }));
            }
            "firefox" => {
                caps.insert("moz:firefoxOptions", serde_json::json!({ "prefs": {} }));
            }
            _ => {}
        }
        caps
    }
}
