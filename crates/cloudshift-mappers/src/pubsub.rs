//! Pub/Sub topic mapper
//!
//! A topic becomes a fanout exchange on a RabbitMQ broker. The broker boots
//! from `definitions.json`, which carries the generated admin user as a
//! salted SHA-256 hash so no plaintext password lands in the definitions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cloudshift_gcp::catalog;
use cloudshift_types::{
    HealthCheck, MapContext, MapperResult, MappingError, MappingResult, Protocol, Resource,
    ResourceLimits, ResourceMapper, ResourceType,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::common::{
    base_service, data_volume, first_str, first_value, last_segment, mount_artifact,
};

pub const RABBITMQ_IMAGE: &str = "rabbitmq:3.13-management-alpine";
pub const AMQP_PORT: u16 = 5672;
pub const MANAGEMENT_PORT: u16 = 15672;

const DEFINITIONS: &str = "definitions.json";
const RABBITMQ_CONF: &str = "rabbitmq.conf";
const CONFIG_DIR: &str = "/etc/rabbitmq";

const RETENTION_PATHS: &[&str] = &["message_retention_duration", "messageRetentionDuration"];
const SCHEMA_PATHS: &[&str] = &["schema_settings.0", "schemaSettings"];

/// `rabbit_password_hashing_sha256` hash: base64(salt ++ sha256(salt ++ password))
pub fn rabbit_password_hash(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut salted = salt.to_vec();
    salted.extend_from_slice(&digest);
    STANDARD.encode(salted)
}

fn rabbitmq_conf() -> String {
    format!(
        "load_definitions = {dir}/{definitions}\n\
         listeners.tcp.default = {amqp}\n\
         management.tcp.port = {management}\n\
         loopback_users.guest = false\n",
        dir = CONFIG_DIR,
        definitions = DEFINITIONS,
        amqp = AMQP_PORT,
        management = MANAGEMENT_PORT
    )
}

/// Maps `gcp:pubsub:topic`
#[derive(Debug, Clone, Copy, Default)]
pub struct PubSubTopicMapper;

impl PubSubTopicMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for PubSubTopicMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::PUBSUB_TOPIC
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;
        let mut result = MappingResult::new(
            resource.id.clone(),
            base_service(ctx, resource, RABBITMQ_IMAGE),
        );

        let exchange = first_str(resource, &["name"])
            .map(last_segment)
            .unwrap_or(&resource.name)
            .to_string();

        let user = format!("admin_{}", ctx.secrets.alphanumeric(8).to_ascii_lowercase());
        let password = ctx.secrets.password();
        let salt = ctx.secrets.alphanumeric(4);

        let definitions = json!({
            "users": [{
                "name": user,
                "password_hash": rabbit_password_hash(salt.as_bytes(), &password),
                "hashing_algorithm": "rabbit_password_hashing_sha256",
                "tags": ["administrator"]
            }],
            "vhosts": [{ "name": "/" }],
            "permissions": [{
                "user": user,
                "vhost": "/",
                "configure": ".*",
                "write": ".*",
                "read": ".*"
            }],
            "exchanges": [{
                "name": exchange,
                "vhost": "/",
                "type": "fanout",
                "durable": true,
                "auto_delete": false,
                "internal": false,
                "arguments": {}
            }],
            "queues": [],
            "bindings": []
        });
        let definitions = serde_json::to_string_pretty(&definitions)
            .map_err(|e| MappingError::Render(format!("definitions for {}: {}", resource.id, e)))?;

        result.add_config(DEFINITIONS, definitions);
        result.add_config(RABBITMQ_CONF, rabbitmq_conf());

        let service = &mut result.service;
        service
            .environment
            .insert("RABBITMQ_DEFAULT_USER".to_string(), user.clone());
        service
            .environment
            .insert("RABBITMQ_DEFAULT_PASS".to_string(), password);
        service.add_port(AMQP_PORT, Protocol::Tcp);
        service.add_port(MANAGEMENT_PORT, Protocol::Tcp);
        service.health_check = Some(HealthCheck::shell("rabbitmq-diagnostics -q ping"));
        service.resources = ResourceLimits::new(1.0, 1024);
        mount_artifact(service, DEFINITIONS, format!("{}/{}", CONFIG_DIR, DEFINITIONS));
        mount_artifact(service, RABBITMQ_CONF, format!("{}/{}", CONFIG_DIR, RABBITMQ_CONF));
        data_volume(service, "/var/lib/rabbitmq");

        result.manual_step(format!(
            "Declare a queue bound to exchange {} for each Pub/Sub subscription of the topic",
            exchange
        ));
        if first_value(resource, RETENTION_PATHS).is_some() {
            result.warn("Topic message retention is not emulated; unrouted messages are dropped");
        }
        if first_value(resource, SCHEMA_PATHS).is_some() {
            result.warn("Topic schema validation is not enforced locally");
        }

        debug!("Mapped Pub/Sub topic {} to exchange {}", resource.id, exchange);
        Ok(result)
    }
}
