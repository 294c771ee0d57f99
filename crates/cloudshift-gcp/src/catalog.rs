//! Google Cloud resource type catalog
//!
//! Canonical type names follow `gcp:<service>:<kind>`. Native type strings
//! from Terraform and Deployment Manager are mapped through exact lookup
//! tables with a suffix/substring fallback; anything else becomes an opaque
//! type instead of an error.

use cloudshift_types::{Category, Provider, ResourceType};

pub const COMPUTE_INSTANCE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:compute:instance", Category::Compute);
pub const COMPUTE_DISK: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:compute:disk", Category::Compute);
pub const GKE_CLUSTER: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:container:cluster", Category::Compute);
pub const CLOUD_RUN_SERVICE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:run:service", Category::Compute);
pub const CLOUD_FUNCTION: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:cloudfunctions:function", Category::Compute);
pub const SCHEDULER_JOB: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:cloudscheduler:job", Category::Compute);

pub const STORAGE_BUCKET: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:storage:bucket", Category::Storage);

pub const SQL_INSTANCE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:sql:instance", Category::Database);
pub const SQL_DATABASE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:sql:database", Category::Database);
pub const REDIS_INSTANCE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:redis:instance", Category::Database);
pub const FIRESTORE_DATABASE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:firestore:database", Category::Database);

pub const NETWORK: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:compute:network", Category::Networking);
pub const SUBNETWORK: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:compute:subnetwork", Category::Networking);
pub const FIREWALL: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:compute:firewall", Category::Networking);
pub const FORWARDING_RULE: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:compute:forwarding-rule", Category::Networking);

pub const PUBSUB_TOPIC: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:pubsub:topic", Category::Messaging);
pub const PUBSUB_SUBSCRIPTION: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:pubsub:subscription", Category::Messaging);

pub const SECRET: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:secretmanager:secret", Category::Security);
pub const KMS_CRYPTO_KEY: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:kms:crypto-key", Category::Security);

pub const SERVICE_ACCOUNT: ResourceType =
    ResourceType::new(Provider::Gcp, "gcp:iam:service-account", Category::Identity);

/// Every catalogued type
pub const ALL_TYPES: &[ResourceType] = &[
    COMPUTE_INSTANCE,
    COMPUTE_DISK,
    GKE_CLUSTER,
    CLOUD_RUN_SERVICE,
    CLOUD_FUNCTION,
    SCHEDULER_JOB,
    STORAGE_BUCKET,
    SQL_INSTANCE,
    SQL_DATABASE,
    REDIS_INSTANCE,
    FIRESTORE_DATABASE,
    NETWORK,
    SUBNETWORK,
    FIREWALL,
    FORWARDING_RULE,
    PUBSUB_TOPIC,
    PUBSUB_SUBSCRIPTION,
    SECRET,
    KMS_CRYPTO_KEY,
    SERVICE_ACCOUNT,
];

/// Terraform resource types, exact match
const TERRAFORM_TYPES: &[(&str, ResourceType)] = &[
    ("google_compute_instance", COMPUTE_INSTANCE),
    ("google_compute_disk", COMPUTE_DISK),
    ("google_container_cluster", GKE_CLUSTER),
    ("google_cloud_run_service", CLOUD_RUN_SERVICE),
    ("google_cloud_run_v2_service", CLOUD_RUN_SERVICE),
    ("google_cloudfunctions_function", CLOUD_FUNCTION),
    ("google_cloudfunctions2_function", CLOUD_FUNCTION),
    ("google_cloud_scheduler_job", SCHEDULER_JOB),
    ("google_storage_bucket", STORAGE_BUCKET),
    ("google_sql_database_instance", SQL_INSTANCE),
    ("google_sql_database", SQL_DATABASE),
    ("google_redis_instance", REDIS_INSTANCE),
    ("google_firestore_database", FIRESTORE_DATABASE),
    ("google_compute_network", NETWORK),
    ("google_compute_subnetwork", SUBNETWORK),
    ("google_compute_firewall", FIREWALL),
    ("google_compute_forwarding_rule", FORWARDING_RULE),
    ("google_compute_global_forwarding_rule", FORWARDING_RULE),
    ("google_pubsub_topic", PUBSUB_TOPIC),
    ("google_pubsub_subscription", PUBSUB_SUBSCRIPTION),
    ("google_secret_manager_secret", SECRET),
    ("google_kms_crypto_key", KMS_CRYPTO_KEY),
    ("google_service_account", SERVICE_ACCOUNT),
];

/// Deployment Manager types after normalisation to `<service>.<kind>`
const TEMPLATE_TYPES: &[(&str, ResourceType)] = &[
    ("compute.instance", COMPUTE_INSTANCE),
    ("compute.disk", COMPUTE_DISK),
    ("container.cluster", GKE_CLUSTER),
    ("run.service", CLOUD_RUN_SERVICE),
    ("cloudfunctions.function", CLOUD_FUNCTION),
    ("cloudscheduler.job", SCHEDULER_JOB),
    ("storage.bucket", STORAGE_BUCKET),
    ("sqladmin.instance", SQL_INSTANCE),
    ("sqladmin.database", SQL_DATABASE),
    ("redis.instance", REDIS_INSTANCE),
    ("firestore.database", FIRESTORE_DATABASE),
    ("compute.network", NETWORK),
    ("compute.subnetwork", SUBNETWORK),
    ("compute.firewall", FIREWALL),
    ("compute.forwardingrule", FORWARDING_RULE),
    ("compute.globalforwardingrule", FORWARDING_RULE),
    ("pubsub.topic", PUBSUB_TOPIC),
    ("pubsub.subscription", PUBSUB_SUBSCRIPTION),
    ("secretmanager.secret", SECRET),
    ("cloudkms.cryptokey", KMS_CRYPTO_KEY),
    ("iam.serviceaccount", SERVICE_ACCOUNT),
];

/// Whether a Terraform type string belongs to the Google providers
pub fn is_terraform_gcp_type(native: &str) -> bool {
    native.starts_with("google_")
}

/// Map a Terraform type to its canonical type
///
/// Unknown `google_*` types and foreign types pass through as opaque.
pub fn from_terraform_type(native: &str) -> ResourceType {
    if let Some((_, resource_type)) = TERRAFORM_TYPES.iter().find(|(name, _)| *name == native) {
        return resource_type.clone();
    }

    // Namespaced variants such as `google_beta_compute_instance`: match the
    // longest known stem the type ends with.
    let fallback = TERRAFORM_TYPES
        .iter()
        .filter(|(name, _)| {
            let stem = name.trim_start_matches("google_");
            native.ends_with(&format!("_{}", stem))
        })
        .max_by_key(|(name, _)| name.len());

    match fallback {
        Some((_, resource_type)) => resource_type.clone(),
        None => ResourceType::opaque(Provider::Gcp, native),
    }
}

/// Reduce a Deployment Manager type string to `<service>.<kind>`
///
/// Accepts `compute.v1.instance`, `storage.v1.bucket` and type-provider
/// strings such as `gcp-types/sqladmin-v1beta4:instances` or
/// `gcp-types/pubsub-v1:projects.topics`.
pub fn normalize_template_type(native: &str) -> Option<String> {
    let native = native.trim();
    if native.is_empty() || is_template_import(native) {
        return None;
    }

    if let Some(rest) = native.strip_prefix("gcp-types/") {
        let (service_version, collection) = rest.split_once(':')?;
        let service = service_version
            .split_once("-v")
            .map(|(service, _)| service)
            .unwrap_or(service_version);
        let kind = collection.rsplit('.').next().unwrap_or(collection);
        return Some(format!(
            "{}.{}",
            service.to_ascii_lowercase(),
            singular(&kind.to_ascii_lowercase())
        ));
    }

    let parts: Vec<&str> = native.split('.').collect();
    let (service, kind) = match parts.as_slice() {
        [service, _version, kind] => (*service, *kind),
        [service, kind] => (*service, *kind),
        _ => return None,
    };
    Some(format!(
        "{}.{}",
        service.to_ascii_lowercase(),
        singular(&kind.to_ascii_lowercase())
    ))
}

/// Template imports (`.jinja`/`.py`) are composite types that cannot be expanded
pub fn is_template_import(native: &str) -> bool {
    native.ends_with(".jinja") || native.ends_with(".py")
}

/// Map a Deployment Manager type to its canonical type
pub fn from_template_type(native: &str) -> ResourceType {
    let Some(normalized) = normalize_template_type(native) else {
        return ResourceType::opaque(Provider::Gcp, native);
    };

    if let Some((_, resource_type)) = TEMPLATE_TYPES.iter().find(|(key, _)| *key == normalized) {
        return resource_type.clone();
    }

    TEMPLATE_TYPES
        .iter()
        .filter(|(key, _)| template_key_matches(key, &normalized))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, resource_type)| resource_type.clone())
        .unwrap_or_else(|| ResourceType::opaque(Provider::Gcp, native))
}

/// Whether a template type string looks like a Google Cloud type
pub fn is_template_gcp_type(native: &str) -> bool {
    if is_template_import(native) || native.starts_with("gcp-types/") {
        return true;
    }
    match normalize_template_type(native) {
        Some(normalized) => TEMPLATE_TYPES
            .iter()
            .any(|(key, _)| template_key_matches(key, &normalized)),
        None => false,
    }
}

/// Look up a canonical type by its `gcp:<service>:<kind>` name
pub fn by_name(name: &str) -> Option<ResourceType> {
    ALL_TYPES.iter().find(|t| t.name() == name).cloned()
}

/// Same service family and a kind ending in the table kind (`regiondisk` -> `disk`)
fn template_key_matches(key: &str, normalized: &str) -> bool {
    match (key.split_once('.'), normalized.split_once('.')) {
        (Some((service, kind)), Some((n_service, n_kind))) => {
            n_service.contains(service) && n_kind.ends_with(kind)
        }
        _ => false,
    }
}

fn singular(kind: &str) -> String {
    kind.strip_suffix('s').unwrap_or(kind).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terraform_exact_lookup() {
        assert_eq!(from_terraform_type("google_compute_instance"), COMPUTE_INSTANCE);
        assert_eq!(from_terraform_type("google_sql_database"), SQL_DATABASE);
        assert_eq!(
            from_terraform_type("google_sql_database_instance"),
            SQL_INSTANCE
        );
    }

    #[test]
    fn test_terraform_namespaced_fallback() {
        assert_eq!(
            from_terraform_type("google_beta_compute_instance"),
            COMPUTE_INSTANCE
        );
        // A longer unrelated type must not match a shorter stem it merely starts with
        assert!(from_terraform_type("google_compute_instance_template").is_opaque());
    }

    #[test]
    fn test_unknown_types_are_opaque() {
        let unknown = from_terraform_type("google_vertex_ai_endpoint");
        assert!(unknown.is_opaque());
        assert_eq!(unknown.name(), "google_vertex_ai_endpoint");
        assert_eq!(unknown.category(), Category::Other);
    }

    #[test]
    fn test_template_type_normalisation() {
        assert_eq!(
            normalize_template_type("compute.v1.instance").as_deref(),
            Some("compute.instance")
        );
        assert_eq!(
            normalize_template_type("gcp-types/sqladmin-v1beta4:instances").as_deref(),
            Some("sqladmin.instance")
        );
        assert_eq!(
            normalize_template_type("gcp-types/pubsub-v1:projects.topics").as_deref(),
            Some("pubsub.topic")
        );
        assert_eq!(normalize_template_type("templates/vm.jinja"), None);
    }

    #[test]
    fn test_template_lookup() {
        assert_eq!(from_template_type("compute.v1.instance"), COMPUTE_INSTANCE);
        assert_eq!(from_template_type("storage.v1.bucket"), STORAGE_BUCKET);
        assert_eq!(
            from_template_type("compute.v1.forwardingRule"),
            FORWARDING_RULE
        );
        assert_eq!(
            from_template_type("gcp-types/sqladmin-v1beta4:instances"),
            SQL_INSTANCE
        );
        assert_eq!(from_template_type("compute.beta.regionDisk"), COMPUTE_DISK);
        assert!(from_template_type("compute.v1.instanceTemplate").is_opaque());
        assert!(from_template_type("vm_template.jinja").is_opaque());
        assert!(is_template_gcp_type("vm_template.jinja"));
        assert!(!is_template_gcp_type("apps/v1"));
    }

    #[test]
    fn test_catalog_names_are_unique() {
        for (i, a) in ALL_TYPES.iter().enumerate() {
            for b in &ALL_TYPES[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
            assert_eq!(by_name(a.name()).as_ref(), Some(a));
        }
    }
}
