//! Live-API parser
//!
//! Targets look like `gcp://<project>` (or `gcp://` to use the project of
//! the resolved credentials). Category scans run concurrently, bounded by
//! `ParseOptions::max_concurrent_scans`; results are merged by this task
//! alone, in scan order, so output does not depend on completion order.

mod translate;

pub use translate::translate;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cloudshift_types::{
    Detection, DiscoveryError, DiscoveryResult, Infrastructure, ParseOptions, ProgressEvent,
    Provider, Resource, ResourceParser, SourceFormat,
};

use crate::api::{GcpApi, GcpConnector, Scan};
use crate::client::RestConnector;

pub const TARGET_SCHEME: &str = "gcp://";
const LIVE_CONFIDENCE: f64 = 0.95;

/// Project named by a `gcp://` target; empty when the target omits it
pub fn parse_target(path: &Path) -> Option<String> {
    let target = path.to_str()?.trim();
    let project = target.strip_prefix(TARGET_SCHEME)?;
    Some(project.trim_matches('/').to_string())
}

/// One scheduled scan
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScanJob {
    scan: Scan,
    region: Option<String>,
}

impl ScanJob {
    fn label(&self) -> String {
        match &self.region {
            Some(region) => format!("{}@{}", self.scan, region),
            None => self.scan.name().to_string(),
        }
    }
}

/// Live-API parser for Google Cloud projects
#[derive(Clone)]
pub struct LiveApiParser {
    connector: Arc<dyn GcpConnector>,
}

impl Default for LiveApiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LiveApiParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveApiParser").finish_non_exhaustive()
    }
}

impl LiveApiParser {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(RestConnector::new()))
    }

    pub fn with_connector(connector: Arc<dyn GcpConnector>) -> Self {
        Self { connector }
    }

    /// Scans admitted by the filters, one job per region for regional scans
    fn plan(options: &ParseOptions) -> Vec<ScanJob> {
        let mut jobs = Vec::new();
        for scan in Scan::ALL {
            if !options.admits(&scan.resource_type()) {
                debug!("Skipping {} (filtered)", scan);
                options.report(ProgressEvent::ScanSkipped {
                    scan: scan.name().to_string(),
                    reason: "excluded by filters".to_string(),
                });
                continue;
            }

            if scan.is_regional() {
                if options.regions.is_empty() {
                    options.report(ProgressEvent::ScanSkipped {
                        scan: scan.name().to_string(),
                        reason: "no regions configured".to_string(),
                    });
                    continue;
                }
                for region in &options.regions {
                    jobs.push(ScanJob {
                        scan,
                        region: Some(region.clone()),
                    });
                }
            } else {
                jobs.push(ScanJob { scan, region: None });
            }
        }
        jobs
    }

    async fn open_session(
        &self,
        cancel: &CancellationToken,
        options: &ParseOptions,
    ) -> DiscoveryResult<Arc<dyn GcpApi>> {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            connected = self.connector.connect(cancel, &options.credentials) => connected,
        };
        connected.map_err(|e| match e {
            DiscoveryError::Cancelled => DiscoveryError::Cancelled,
            DiscoveryError::CredentialResolutionFailed(reason) => {
                DiscoveryError::CredentialResolutionFailed(reason)
            }
            other => DiscoveryError::CredentialResolutionFailed(other.to_string()),
        })
    }
}

#[async_trait]
impl ResourceParser for LiveApiParser {
    fn name(&self) -> &str {
        "gcp-live-api"
    }

    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn supported_formats(&self) -> Vec<SourceFormat> {
        vec![SourceFormat::LiveApi]
    }

    fn validate(&self, path: &Path) -> DiscoveryResult<()> {
        match parse_target(path) {
            Some(_) => Ok(()),
            None => Err(DiscoveryError::InvalidPath(format!(
                "{} is not a {}<project> target",
                path.display(),
                TARGET_SCHEME
            ))),
        }
    }

    fn auto_detect(&self, path: &Path) -> Detection {
        match parse_target(path) {
            Some(_) => Detection::with_confidence(LIVE_CONFIDENCE),
            None => Detection::NONE,
        }
    }

    #[instrument(skip_all, fields(location = %path.display()))]
    async fn parse(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        options: &ParseOptions,
    ) -> DiscoveryResult<Infrastructure> {
        self.validate(path)?;
        let requested = parse_target(path).unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        let session = self.open_session(cancel, options).await?;
        let project = if requested.is_empty() {
            session.default_project().ok_or_else(|| {
                DiscoveryError::CredentialResolutionFailed(
                    "no project in target and none associated with the credentials".to_string(),
                )
            })?
        } else {
            requested
        };

        let jobs = Self::plan(options);
        info!(
            "Scanning project {} with {} scans (up to {} at once)",
            project,
            jobs.len(),
            options.max_concurrent_scans.max(1)
        );

        let api: &dyn GcpApi = session.as_ref();
        let project_ref = project.as_str();
        let mut results: Vec<Option<Vec<Resource>>> = (0..jobs.len()).map(|_| None).collect();

        let scans = stream::iter(jobs.clone().into_iter().enumerate())
            .map(move |(index, job)| async move {
                options.report(ProgressEvent::ScanStarted {
                    scan: job.label(),
                    category: job.scan.category(),
                });
                let outcome = api
                    .list(cancel, project_ref, job.scan, job.region.as_deref())
                    .await;
                (index, outcome)
            })
            .buffer_unordered(options.max_concurrent_scans.max(1));
        let mut scans = std::pin::pin!(scans);

        let mut failed = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                next = scans.next() => next,
            };
            let Some((index, outcome)) = next else {
                break;
            };
            let job = &jobs[index];

            match outcome {
                Ok(items) => {
                    let resources: Vec<Resource> = items
                        .into_iter()
                        .filter_map(|item| translate(job.scan, project_ref, item, options))
                        .collect();
                    debug!("{} discovered {} resources", job.label(), resources.len());
                    options.report(ProgressEvent::ScanCompleted {
                        scan: job.label(),
                        discovered: resources.len(),
                    });
                    results[index] = Some(resources);
                }
                // Cancellation and credential failures abort even under ignore_errors
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    let error = DiscoveryError::CategoryScanFailed {
                        scan: job.label(),
                        reason: e.to_string(),
                    };
                    if !options.ignore_errors {
                        return Err(error);
                    }
                    warn!("{}", error);
                    failed += 1;
                    options.report(ProgressEvent::ScanFailed {
                        scan: job.label(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut infra = Infrastructure::new(Provider::Gcp);
        infra.set_metadata("source.format", SourceFormat::LiveApi.as_str());
        infra.set_metadata("project_id", project.as_str());
        infra.set_metadata("scans.total", jobs.len().to_string());
        infra.set_metadata("scans.failed", failed.to_string());

        for resource in results.into_iter().flatten().flatten() {
            if infra.contains(&resource.id) {
                debug!("Duplicate resource {} from overlapping scans", resource.id);
                continue;
            }
            infra.add_resource(resource)?;
        }

        info!("Discovered {} resources in project {}", infra.len(), project);
        Ok(infra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudshift_types::Category;
    use std::path::PathBuf;

    #[test]
    fn test_target_parsing() {
        assert_eq!(parse_target(Path::new("gcp://demo")), Some("demo".to_string()));
        assert_eq!(parse_target(Path::new("gcp://demo/")), Some("demo".to_string()));
        assert_eq!(parse_target(Path::new("gcp://")), Some(String::new()));
        assert_eq!(parse_target(Path::new("./terraform.tfstate")), None);
    }

    #[test]
    fn test_detection_is_flat() {
        let parser = LiveApiParser::default();
        assert_eq!(
            parser.auto_detect(&PathBuf::from("gcp://demo")).confidence,
            LIVE_CONFIDENCE
        );
        assert!(!parser.auto_detect(Path::new("main.tf")).can_handle);
        assert!(parser.validate(Path::new("main.tf")).is_err());
    }

    #[test]
    fn test_plan_respects_filters_and_regions() {
        let options = ParseOptions::default().with_filter_category(Category::Messaging);
        let jobs = LiveApiParser::plan(&options);
        let scans: Vec<Scan> = jobs.iter().map(|job| job.scan).collect();
        assert_eq!(scans, vec![Scan::Topics, Scan::Subscriptions]);

        let options = ParseOptions::default()
            .with_filter_type(crate::catalog::SCHEDULER_JOB)
            .with_region("us-central1")
            .with_region("europe-west1");
        let jobs = LiveApiParser::plan(&options);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].label(), "cloudscheduler.jobs@europe-west1");

        let options = ParseOptions::default().with_filter_type(crate::catalog::SCHEDULER_JOB);
        assert!(LiveApiParser::plan(&options).is_empty());
    }
}
