//! Format parser trait
//!
//! Every input format (live API, exported state, declarative templates,
//! infrastructure-as-code source) is handled by one `ResourceParser`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryResult;
use crate::infrastructure::Infrastructure;
use crate::options::ParseOptions;
use crate::resource::Provider;

/// Input shape a parser consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// Live provider API, addressed by a `<provider>://<account>` target
    LiveApi,
    /// Serialized state snapshot (e.g. a Terraform state file)
    ExportedState,
    /// Declarative template tree (e.g. Deployment Manager YAML)
    DeclarativeTemplate,
    /// Infrastructure-as-code source tree (e.g. Terraform HCL)
    IacSource,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::LiveApi => "live-api",
            SourceFormat::ExportedState => "exported-state",
            SourceFormat::DeclarativeTemplate => "declarative-template",
            SourceFormat::IacSource => "iac-source",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of probing an input with `auto_detect`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub can_handle: bool,
    /// Always within [0, 1]
    pub confidence: f64,
}

impl Detection {
    pub const NONE: Detection = Detection {
        can_handle: false,
        confidence: 0.0,
    };

    /// Build a detection, clamping the confidence into [0, 1]
    ///
    /// NaN and non-positive values mean the parser cannot handle the input.
    pub fn with_confidence(confidence: f64) -> Self {
        if confidence.is_nan() || confidence <= 0.0 {
            return Self::NONE;
        }
        Self {
            can_handle: true,
            confidence: confidence.min(1.0),
        }
    }

    /// Confidence from the share of recognizable entries, scaled by a parser ceiling
    pub fn from_ratio(recognized: usize, total: usize, ceiling: f64) -> Self {
        if total == 0 {
            return Self::NONE;
        }
        Self::with_confidence(recognized as f64 / total as f64 * ceiling)
    }
}

/// Format parser
///
/// Implementations must be registered explicitly with a registry; none of
/// them registers itself.
#[async_trait]
pub trait ResourceParser: Send + Sync {
    /// Human-readable parser name
    fn name(&self) -> &str;

    /// Provider whose resources this parser produces
    fn provider(&self) -> Provider;

    /// Formats this parser accepts
    fn supported_formats(&self) -> Vec<SourceFormat>;

    /// Cheap rejection check: no network calls, no full parse
    fn validate(&self, path: &Path) -> DiscoveryResult<()>;

    /// Estimate how well this parser can handle the input
    ///
    /// May read files but never mutates anything, needs no credentials and
    /// never panics, even on garbage input.
    fn auto_detect(&self, path: &Path) -> Detection;

    /// Convert the input into a resource graph
    ///
    /// Must observe `cancel` at every blocking point and return
    /// `DiscoveryError::Cancelled` (never a partial graph) when it fires.
    async fn parse(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
    ) -> DiscoveryResult<Infrastructure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_clamps_into_unit_interval() {
        assert_eq!(Detection::with_confidence(1.7).confidence, 1.0);
        assert_eq!(Detection::with_confidence(-0.2), Detection::NONE);
        assert_eq!(Detection::with_confidence(f64::NAN), Detection::NONE);
        assert!(Detection::with_confidence(0.3).can_handle);
    }

    #[test]
    fn test_detection_from_ratio() {
        let detection = Detection::from_ratio(3, 4, 0.9);
        assert!((detection.confidence - 0.675).abs() < 1e-9);
        assert_eq!(Detection::from_ratio(0, 0, 0.9), Detection::NONE);
        assert_eq!(Detection::from_ratio(0, 10, 0.9), Detection::NONE);
    }
}
