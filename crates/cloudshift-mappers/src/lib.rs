//! Target mappers for discovered Google Cloud resources
//!
//! Each mapper turns one canonical resource into a locally runnable
//! container service plus the scripts and configuration files it needs.
//! Mappers are pure apart from the secret source carried by `MapContext`.
//!
//! | resource type | local target |
//! |---|---|
//! | compute instance | base OS image of the boot disk |
//! | Cloud SQL instance | PostgreSQL / MySQL / SQL Server |
//! | storage bucket | MinIO |
//! | Memorystore Redis | Redis |
//! | Pub/Sub topic | RabbitMQ fanout exchange |
//! | Cloud Run service | the service's own container image |
//! | Cloud Function | language image running the Functions Framework |

pub mod common;
pub mod compose;
pub mod compute;
pub mod function;
pub mod pubsub;
pub mod redis;
pub mod registry;
pub mod run;
pub mod sql;
pub mod storage;

pub use common::{
    artifact_path, parse_cpu, parse_memory_mb, service_name, DEFAULT_LIMITS, RESOURCE_TYPE_LABEL,
    SOURCE_ID_LABEL,
};
pub use compose::render_compose;
pub use compute::ComputeInstanceMapper;
pub use function::CloudFunctionMapper;
pub use pubsub::PubSubTopicMapper;
pub use redis::RedisMapper;
pub use registry::MapperRegistry;
pub use run::CloudRunMapper;
pub use sql::CloudSqlMapper;
pub use storage::StorageBucketMapper;

use cloudshift_types::ResourceMapper;

/// Every Google Cloud mapper, for explicit registration
pub fn gcp_mappers() -> Vec<Box<dyn ResourceMapper>> {
    vec![
        Box::new(ComputeInstanceMapper::new()),
        Box::new(CloudSqlMapper::new()),
        Box::new(StorageBucketMapper::new()),
        Box::new(RedisMapper::new()),
        Box::new(PubSubTopicMapper::new()),
        Box::new(CloudRunMapper::new()),
        Box::new(CloudFunctionMapper::new()),
    ]
}
