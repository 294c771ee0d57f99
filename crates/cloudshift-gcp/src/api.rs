//! Cloud API seam used by the live parser
//!
//! `GcpConnector` resolves credentials into an authenticated `GcpApi`
//! session; `GcpApi::list` performs one category scan. The REST client in
//! `client` is the production implementation, tests substitute fakes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cloudshift_types::{Category, DiscoveryResult, ResourceType};

use crate::catalog;

/// One independent category scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scan {
    Instances,
    Disks,
    Networks,
    Subnetworks,
    Firewalls,
    ForwardingRules,
    Buckets,
    SqlInstances,
    RedisInstances,
    Topics,
    Subscriptions,
    RunServices,
    Functions,
    GkeClusters,
    SchedulerJobs,
    Secrets,
    ServiceAccounts,
}

impl Scan {
    pub const ALL: [Scan; 17] = [
        Scan::Instances,
        Scan::Disks,
        Scan::Networks,
        Scan::Subnetworks,
        Scan::Firewalls,
        Scan::ForwardingRules,
        Scan::Buckets,
        Scan::SqlInstances,
        Scan::RedisInstances,
        Scan::Topics,
        Scan::Subscriptions,
        Scan::RunServices,
        Scan::Functions,
        Scan::GkeClusters,
        Scan::SchedulerJobs,
        Scan::Secrets,
        Scan::ServiceAccounts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scan::Instances => "compute.instances",
            Scan::Disks => "compute.disks",
            Scan::Networks => "compute.networks",
            Scan::Subnetworks => "compute.subnetworks",
            Scan::Firewalls => "compute.firewalls",
            Scan::ForwardingRules => "compute.forwardingRules",
            Scan::Buckets => "storage.buckets",
            Scan::SqlInstances => "sql.instances",
            Scan::RedisInstances => "redis.instances",
            Scan::Topics => "pubsub.topics",
            Scan::Subscriptions => "pubsub.subscriptions",
            Scan::RunServices => "run.services",
            Scan::Functions => "cloudfunctions.functions",
            Scan::GkeClusters => "container.clusters",
            Scan::SchedulerJobs => "cloudscheduler.jobs",
            Scan::Secrets => "secretmanager.secrets",
            Scan::ServiceAccounts => "iam.serviceAccounts",
        }
    }

    /// Type of every resource this scan produces
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Scan::Instances => catalog::COMPUTE_INSTANCE,
            Scan::Disks => catalog::COMPUTE_DISK,
            Scan::Networks => catalog::NETWORK,
            Scan::Subnetworks => catalog::SUBNETWORK,
            Scan::Firewalls => catalog::FIREWALL,
            Scan::ForwardingRules => catalog::FORWARDING_RULE,
            Scan::Buckets => catalog::STORAGE_BUCKET,
            Scan::SqlInstances => catalog::SQL_INSTANCE,
            Scan::RedisInstances => catalog::REDIS_INSTANCE,
            Scan::Topics => catalog::PUBSUB_TOPIC,
            Scan::Subscriptions => catalog::PUBSUB_SUBSCRIPTION,
            Scan::RunServices => catalog::CLOUD_RUN_SERVICE,
            Scan::Functions => catalog::CLOUD_FUNCTION,
            Scan::GkeClusters => catalog::GKE_CLUSTER,
            Scan::SchedulerJobs => catalog::SCHEDULER_JOB,
            Scan::Secrets => catalog::SECRET,
            Scan::ServiceAccounts => catalog::SERVICE_ACCOUNT,
        }
    }

    pub fn category(&self) -> Category {
        self.resource_type().category()
    }

    /// Regional scans run once per configured region
    pub fn is_regional(&self) -> bool {
        matches!(self, Scan::SchedulerJobs)
    }
}

impl std::fmt::Display for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Authenticated session against the Google Cloud APIs
#[async_trait]
pub trait GcpApi: Send + Sync {
    /// Project the credentials belong to, when known
    fn default_project(&self) -> Option<String>;

    /// Raw items for one scan, all pages included
    ///
    /// `region` is set only for regional scans. Must return
    /// `DiscoveryError::Cancelled` promptly when `cancel` fires.
    async fn list(
        &self,
        cancel: &CancellationToken,
        project: &str,
        scan: Scan,
        region: Option<&str>,
    ) -> DiscoveryResult<Vec<Value>>;
}

/// Turns a credential configuration into an authenticated session
#[async_trait]
pub trait GcpConnector: Send + Sync {
    /// Failures surface as `DiscoveryError::CredentialResolutionFailed`
    async fn connect(
        &self,
        cancel: &CancellationToken,
        credentials: &HashMap<String, String>,
    ) -> DiscoveryResult<Arc<dyn GcpApi>>;
}
