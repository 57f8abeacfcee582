//! Fixed tables the pass is parameterised by.
//!
//! An [`OffsetsConfig`] is built once and then only read, so one instance can
//! be shared by every class processed in the process. [`OffsetsConfig::standard`]
//! returns the defaults matching the fiber runtime's own names.
//!
//! Configurations can also be loaded from JSON. Keys that are omitted keep
//! their defaults:
//!
//! ```
//! use fiber_offsets::OffsetsConfig;
//!
//! let config = OffsetsConfig::from_json(r#"{"restore_owner": "my/rt/Stack"}"#).unwrap();
//! assert_eq!(config.restore_owner, "my/rt/Stack");
//! assert_eq!(config.metadata_desc, OffsetsConfig::standard().metadata_desc);
//! ```

use std::sync::LazyLock;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, event::ClassVersion};

/// Descriptor of the metadata annotation written by the instrumenting pass.
pub const INSTRUMENTED_DESC: &str = "Lco/paralleluniverse/fibers/Instrumented;";

/// Type whose calls restore captured frames; they look suspendable but are not.
pub const STACK_NAME: &str = "co/paralleluniverse/fibers/Stack";

/// Type that declares the yield trampolines.
pub const FIBER_CLASS_NAME: &str = "co/paralleluniverse/fibers/Fiber";

/// Methods of [`FIBER_CLASS_NAME`] that perform the suspension themselves.
const YIELD_NAMES: &[&str] = &["park", "yield", "parkAndUnpark", "yieldAndUnpark"];

static STANDARD: LazyLock<OffsetsConfig> = LazyLock::new(OffsetsConfig::default);

/// Element names of the metadata annotation, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataFieldNames {
    pub method_start: String,
    pub method_end: String,
    pub optimized: String,
    pub call_site_ids: String,
    /// The element this pass fills in.
    pub call_site_offsets: String,
}

impl Default for MetadataFieldNames {
    fn default() -> Self {
        Self {
            method_start: "methodStart".to_owned(),
            method_end: "methodEnd".to_owned(),
            optimized: "optimized".to_owned(),
            call_site_ids: "suspendableCallSiteIds".to_owned(),
            call_site_offsets: "suspendableCallSiteOffsetsAfterInstrumentation".to_owned(),
        }
    }
}

/// A `(owner, name)` pair identifying a yield trampoline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YieldMethod {
    pub owner: String,
    pub name: String,
}

impl YieldMethod {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// Configuration of the offset pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetsConfig {
    /// Type descriptor identifying the metadata annotation.
    pub metadata_desc: String,
    pub fields: MetadataFieldNames,
    /// Owner whose calls are never recorded as suspension points.
    pub restore_owner: String,
    /// Methods skipped entirely.
    pub yield_methods: IndexSet<YieldMethod>,
    /// Oldest class version able to carry the metadata annotation.
    pub min_version: ClassVersion,
}

impl Default for OffsetsConfig {
    fn default() -> Self {
        Self {
            metadata_desc: INSTRUMENTED_DESC.to_owned(),
            fields: MetadataFieldNames::default(),
            restore_owner: STACK_NAME.to_owned(),
            yield_methods: YIELD_NAMES
                .iter()
                .map(|name| YieldMethod::new(FIBER_CLASS_NAME, *name))
                .collect(),
            min_version: ClassVersion::V1_5,
        }
    }
}

impl OffsetsConfig {
    /// Returns the process-wide default configuration.
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Parses a configuration from JSON, filling omitted keys with defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn with_metadata_desc(mut self, desc: impl Into<String>) -> Self {
        self.metadata_desc = desc.into();
        self
    }

    #[must_use]
    pub fn with_restore_owner(mut self, owner: impl Into<String>) -> Self {
        self.restore_owner = owner.into();
        self
    }

    #[must_use]
    pub fn with_yield_method(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
        self.yield_methods.insert(YieldMethod::new(owner, name));
        self
    }

    #[must_use]
    pub fn with_min_version(mut self, version: ClassVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Returns true if `desc` names the metadata annotation.
    #[must_use]
    pub fn is_metadata(&self, desc: &str) -> bool {
        self.metadata_desc == desc
    }

    /// Returns true if `class_name.method_name` is a yield trampoline.
    #[must_use]
    pub fn is_yield_method(&self, class_name: &str, method_name: &str) -> bool {
        self.yield_methods
            .iter()
            .any(|m| m.owner == class_name && m.name == method_name)
    }
}
