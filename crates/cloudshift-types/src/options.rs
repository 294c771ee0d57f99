//! Parse options and progress reporting

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::resource::{Category, ResourceType};

/// Callback receiving progress events
///
/// Invoked synchronously from whichever task performs a scan, possibly from
/// several tasks at once. Implementations must not block.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Structured progress event emitted while parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    ScanStarted {
        scan: String,
        category: Category,
    },
    ScanCompleted {
        scan: String,
        discovered: usize,
    },
    /// Scan not run because the filters exclude everything it would produce
    ScanSkipped {
        scan: String,
        reason: String,
    },
    /// Scan failed and was skipped under `ignore_errors`
    ScanFailed {
        scan: String,
        error: String,
    },
    FileParsed {
        path: String,
        resources: usize,
    },
    /// A file or entry was left out of the graph
    EntrySkipped {
        source: String,
        reason: String,
    },
}

/// Options accepted by every parser
#[derive(Clone)]
pub struct ParseOptions {
    /// When non-empty, only these exact types are kept and `filter_categories` is ignored
    pub filter_types: HashSet<ResourceType>,
    /// Consulted only when `filter_types` is empty
    pub filter_categories: HashSet<Category>,
    /// Regions to scan; the first one is the default
    pub regions: Vec<String>,
    /// Provider-specific credential settings
    pub credentials: HashMap<String, String>,
    /// Surface values that are normally redacted
    pub include_sensitive: bool,
    /// Skip failing scans/entries instead of aborting the parse
    pub ignore_errors: bool,
    /// Upper bound on concurrently running category scans
    pub max_concurrent_scans: usize,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            filter_types: HashSet::new(),
            filter_categories: HashSet::new(),
            regions: Vec::new(),
            credentials: HashMap::new(),
            include_sensitive: false,
            ignore_errors: false,
            max_concurrent_scans: 4,
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseOptions")
            .field("filter_types", &self.filter_types)
            .field("filter_categories", &self.filter_categories)
            .field("regions", &self.regions)
            .field(
                "credentials",
                &self.credentials.keys().collect::<Vec<_>>(),
            )
            .field("include_sensitive", &self.include_sensitive)
            .field("ignore_errors", &self.ignore_errors)
            .field("max_concurrent_scans", &self.max_concurrent_scans)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ParseOptions {
    pub fn with_filter_type(mut self, resource_type: ResourceType) -> Self {
        self.filter_types.insert(resource_type);
        self
    }

    pub fn with_filter_category(mut self, category: Category) -> Self {
        self.filter_categories.insert(category);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.regions.push(region.into());
        self
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    pub fn with_include_sensitive(mut self, include: bool) -> Self {
        self.include_sensitive = include;
        self
    }

    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn with_max_concurrent_scans(mut self, max: usize) -> Self {
        self.max_concurrent_scans = max.max(1);
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// First configured region, if any
    pub fn default_region(&self) -> Option<&str> {
        self.regions.first().map(String::as_str)
    }

    /// Whether a resource of this type passes the filters
    ///
    /// A non-empty type filter fully shadows the category filter.
    pub fn admits(&self, resource_type: &ResourceType) -> bool {
        if !self.filter_types.is_empty() {
            return self.filter_types.contains(resource_type);
        }
        if !self.filter_categories.is_empty() {
            return self.filter_categories.contains(&resource_type.category());
        }
        true
    }

    pub fn has_filters(&self) -> bool {
        !self.filter_types.is_empty() || !self.filter_categories.is_empty()
    }

    pub fn report(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(&event);
        }
    }
}
