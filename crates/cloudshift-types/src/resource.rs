//! Canonical resource types
//!
//! A `Resource` is a cloud resource normalized into a provider-agnostic shape,
//! independent of the format it was discovered from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Cloud provider a resource graph was discovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gcp,
    Aws,
    Azure,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gcp => "gcp",
            Provider::Aws => "aws",
            Provider::Azure => "azure",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Broad resource category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Compute,
    Storage,
    Database,
    Networking,
    Messaging,
    Security,
    Identity,
    /// Opaque pass-through types whose kind is not known to the catalog
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Compute => "compute",
            Category::Storage => "storage",
            Category::Database => "database",
            Category::Networking => "networking",
            Category::Messaging => "messaging",
            Category::Security => "security",
            Category::Identity => "identity",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies a resource kind
///
/// Immutable and compared by value. Catalog types are usually declared as
/// constants with [`ResourceType::new`]; types a parser does not recognize are
/// carried through with [`ResourceType::opaque`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType {
    provider: Provider,
    name: Cow<'static, str>,
    category: Category,
}

impl ResourceType {
    pub const fn new(provider: Provider, name: &'static str, category: Category) -> Self {
        Self {
            provider,
            name: Cow::Borrowed(name),
            category,
        }
    }

    /// Pass-through type for a provider-native type string with no catalog entry
    pub fn opaque(provider: Provider, native: impl Into<String>) -> Self {
        Self {
            provider,
            name: Cow::Owned(native.into()),
            category: Category::Other,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn is_opaque(&self) -> bool {
        self.category == Category::Other
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The canonical unit of the resource graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique within an `Infrastructure`; used for dependency references
    pub id: String,
    /// Human-readable display name
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Free-form location, may be "global"
    pub region: String,
    /// Provider-native locator (self-link, ARN, resource URI)
    pub external_ref: Option<String>,
    /// Open attribute bag; read it through the `config_*` accessors
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_type: ResourceType,
        region: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            resource_type,
            region: region.into(),
            external_ref: None,
            config: Map::new(),
            tags: BTreeMap::new(),
            dependencies: Vec::new(),
            created_at: None,
        }
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.add_dependency(id);
        self
    }

    /// Ordered, duplicate-free dependency IDs
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Record a dependency on another resource
    ///
    /// Returns false when the ID is empty, already present, or refers to
    /// this resource itself.
    pub fn add_dependency(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if id.is_empty() || id == self.id || self.dependencies.contains(&id) {
            return false;
        }
        self.dependencies.push(id);
        true
    }

    /// Replace all dependencies, applying the same dedupe rules as `add_dependency`
    pub fn set_dependencies<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.clear();
        for id in ids {
            self.add_dependency(id);
        }
    }

    /// Look up a config value by dotted path (`settings.tier`, `containers.0.image`)
    pub fn config_value(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.config.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn config_str(&self, path: &str) -> Option<&str> {
        self.config_value(path).and_then(Value::as_str)
    }

    /// Numeric config value; numeric strings are accepted too
    pub fn config_f64(&self, path: &str) -> Option<f64> {
        match self.config_value(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn config_u64(&self, path: &str) -> Option<u64> {
        match self.config_value(path)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn config_bool(&self, path: &str) -> Option<bool> {
        match self.config_value(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}
