//! Parser registry
//!
//! Parsers are registered explicitly by application startup code; nothing
//! registers itself. Selection is deterministic for a fixed registration
//! order: the highest confidence wins and ties go to the parser registered
//! first.

use std::path::Path;

use cloudshift_types::{
    Detection, DiscoveryError, DiscoveryResult, Provider, ResourceParser, SourceFormat,
};
use tracing::debug;

/// Auto-detection outcome of one registered parser
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Registration index
    pub index: usize,
    pub name: String,
    pub detection: Detection,
}

/// Registry of format parsers
#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ResourceParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser; registration order is the tie-break order
    pub fn register(&mut self, parser: Box<dyn ResourceParser>) {
        debug!(
            "Registering parser {} ({})",
            parser.name(),
            parser.provider()
        );
        self.parsers.push(parser);
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Registered parsers in registration order
    pub fn parsers(&self) -> impl Iterator<Item = &dyn ResourceParser> {
        self.parsers.iter().map(|p| p.as_ref())
    }

    /// Run `auto_detect` on every registered parser
    ///
    /// Results are returned in registration order.
    pub fn detect_all(&self, path: &Path) -> Vec<DetectionResult> {
        self.parsers
            .iter()
            .enumerate()
            .map(|(index, parser)| DetectionResult {
                index,
                name: parser.name().to_string(),
                detection: sanitize(parser.auto_detect(path)),
            })
            .collect()
    }

    /// Pick the parser with the highest confidence for `path`
    ///
    /// A candidate whose cheap `validate` check rejects the path is passed
    /// over in favor of the next best one. Fails with `NoParserFound` when no
    /// parser reports a positive confidence or every candidate is rejected.
    pub fn select_best(&self, path: &Path) -> DiscoveryResult<&dyn ResourceParser> {
        let mut candidates: Vec<DetectionResult> = self
            .detect_all(path)
            .into_iter()
            .filter(|result| result.detection.can_handle && result.detection.confidence > 0.0)
            .collect();

        // Stable sort keeps registration order among equal confidences
        candidates.sort_by(|a, b| b.detection.confidence.total_cmp(&a.detection.confidence));

        for candidate in &candidates {
            let parser = self.parsers[candidate.index].as_ref();
            match parser.validate(path) {
                Ok(()) => {
                    debug!(
                        "Selected parser {} with confidence {:.2} for {}",
                        candidate.name,
                        candidate.detection.confidence,
                        path.display()
                    );
                    return Ok(parser);
                }
                Err(e) => {
                    debug!(
                        "Parser {} rejected {} during validation: {}",
                        candidate.name,
                        path.display(),
                        e
                    );
                }
            }
        }

        Err(DiscoveryError::NoParserFound(path.display().to_string()))
    }

    /// Look up a parser explicitly by provider and format
    pub fn get(
        &self,
        provider: Provider,
        format: SourceFormat,
    ) -> DiscoveryResult<&dyn ResourceParser> {
        self.parsers
            .iter()
            .map(|p| p.as_ref())
            .find(|p| p.provider() == provider && p.supported_formats().contains(&format))
            .ok_or_else(|| {
                DiscoveryError::UnsupportedFormat(format!("{} {}", provider, format))
            })
    }

    /// Look up a parser by its name
    pub fn get_by_name(&self, name: &str) -> Option<&dyn ResourceParser> {
        self.parsers
            .iter()
            .map(|p| p.as_ref())
            .find(|p| p.name() == name)
    }
}

/// Re-clamp a parser's answer so a misbehaving parser cannot skew selection
fn sanitize(detection: Detection) -> Detection {
    if !detection.can_handle {
        return Detection::NONE;
    }
    Detection::with_confidence(detection.confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloudshift_types::{Infrastructure, ParseOptions};
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    struct MockParser {
        name: &'static str,
        confidence: f64,
        format: SourceFormat,
        accepts: bool,
    }

    impl MockParser {
        fn boxed(name: &'static str, confidence: f64) -> Box<dyn ResourceParser> {
            Box::new(Self {
                name,
                confidence,
                format: SourceFormat::ExportedState,
                accepts: true,
            })
        }
    }

    #[async_trait]
    impl ResourceParser for MockParser {
        fn name(&self) -> &str {
            self.name
        }

        fn provider(&self) -> Provider {
            Provider::Gcp
        }

        fn supported_formats(&self) -> Vec<SourceFormat> {
            vec![self.format]
        }

        fn validate(&self, path: &Path) -> DiscoveryResult<()> {
            if self.accepts {
                Ok(())
            } else {
                Err(DiscoveryError::InvalidPath(path.display().to_string()))
            }
        }

        fn auto_detect(&self, _path: &Path) -> Detection {
            Detection {
                can_handle: self.confidence > 0.0,
                confidence: self.confidence,
            }
        }

        async fn parse(
            &self,
            _cancel: &CancellationToken,
            _path: &Path,
            _options: &ParseOptions,
        ) -> DiscoveryResult<Infrastructure> {
            Ok(Infrastructure::new(Provider::Gcp))
        }
    }

    fn target() -> PathBuf {
        PathBuf::from("terraform.tfstate")
    }

    #[test]
    fn test_highest_confidence_wins() {
        let mut registry = ParserRegistry::new();
        registry.register(MockParser::boxed("low", 0.3));
        registry.register(MockParser::boxed("high", 0.8));

        let selected = registry.select_best(&target()).unwrap();
        assert_eq!(selected.name(), "high");
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let mut registry = ParserRegistry::new();
        registry.register(MockParser::boxed("first", 0.9));
        registry.register(MockParser::boxed("second", 0.9));

        let selected = registry.select_best(&target()).unwrap();
        assert_eq!(selected.name(), "first");
    }

    #[test]
    fn test_all_zero_confidence_fails() {
        let mut registry = ParserRegistry::new();
        registry.register(MockParser::boxed("a", 0.0));
        registry.register(MockParser::boxed("b", 0.0));

        let err = registry.select_best(&target()).err().unwrap();
        assert!(matches!(err, DiscoveryError::NoParserFound(_)));
    }

    #[test]
    fn test_empty_registry_fails() {
        let registry = ParserRegistry::new();
        assert!(matches!(
            registry.select_best(&target()),
            Err(DiscoveryError::NoParserFound(_))
        ));
    }

    #[test]
    fn test_validation_rejection_falls_through_to_next_candidate() {
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(MockParser {
            name: "picky",
            confidence: 0.95,
            format: SourceFormat::ExportedState,
            accepts: false,
        }));
        registry.register(MockParser::boxed("fallback", 0.5));

        let selected = registry.select_best(&target()).unwrap();
        assert_eq!(selected.name(), "fallback");
    }

    #[test]
    fn test_out_of_range_confidence_is_clamped() {
        let mut registry = ParserRegistry::new();
        registry.register(MockParser::boxed("overconfident", 3.0));

        let results = registry.detect_all(&target());
        assert_eq!(results[0].detection.confidence, 1.0);
    }

    #[test]
    fn test_lookup_by_provider_and_format() {
        let mut registry = ParserRegistry::new();
        registry.register(MockParser::boxed("state", 0.9));
        registry.register(Box::new(MockParser {
            name: "live",
            confidence: 0.9,
            format: SourceFormat::LiveApi,
            accepts: true,
        }));

        let parser = registry.get(Provider::Gcp, SourceFormat::LiveApi).unwrap();
        assert_eq!(parser.name(), "live");
        assert!(matches!(
            registry.get(Provider::Aws, SourceFormat::LiveApi),
            Err(DiscoveryError::UnsupportedFormat(_))
        ));
        assert!(registry.get_by_name("state").is_some());
    }
}
