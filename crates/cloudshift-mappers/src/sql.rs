//! Cloud SQL instance mapper
//!
//! `database_version` strings such as `POSTGRES_15`, `MYSQL_8_0` or
//! `SQLSERVER_2019_STANDARD` select the engine image; the tier selects the
//! sizing. Admin credentials are generated through the context's secret
//! source, so a seeded generator gives a fully reproducible mapping.

use cloudshift_gcp::catalog;
use cloudshift_types::{
    HealthCheck, MapContext, MapperResult, MappingResult, Protocol, Resource, ResourceLimits,
    ResourceMapper, ResourceType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::common::{
    base_service, data_volume, field_str, first_str, first_value, mount_artifact,
    ARTIFACT_MOUNT_DIR, DEFAULT_LIMITS,
};

const INIT_SQL: &str = "init.sql";
const MIGRATE_SCRIPT: &str = "migrate.sh";
const MSSQL_TOOLS: &str = "/opt/mssql-tools18/bin/sqlcmd";

/// Tier to (CPUs, memory MB)
const TIERS: &[(&str, f64, u64)] = &[
    ("db-f1-micro", 0.2, 614),
    ("db-g1-small", 0.5, 1740),
    ("db-n1-standard-1", 1.0, 3840),
    ("db-n1-standard-2", 2.0, 7680),
    ("db-n1-standard-4", 4.0, 15360),
    ("db-n1-standard-8", 8.0, 30720),
    ("db-n1-highmem-2", 2.0, 13312),
    ("db-n1-highmem-4", 4.0, 26624),
    ("db-n1-highmem-8", 8.0, 53248),
];

const VERSION_PATHS: &[&str] = &["database_version", "databaseVersion"];
const TIER_PATHS: &[&str] = &["settings.0.tier", "settings.tier", "tier"];
const FLAG_PATHS: &[&str] = &["settings.0.database_flags", "settings.databaseFlags"];
const AVAILABILITY_PATHS: &[&str] = &["settings.0.availability_type", "settings.availabilityType"];
const PRIMARY_PATHS: &[&str] = &["master_instance_name", "masterInstanceName"];

static CUSTOM_TIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^db-custom-(\d+)-(\d+)$").expect("custom tier pattern is valid"));

/// Database engine family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    MySql,
    SqlServer,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgres => "PostgreSQL",
            Engine::MySql => "MySQL",
            Engine::SqlServer => "SQL Server",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Engine::Postgres => 5432,
            Engine::MySql => 3306,
            Engine::SqlServer => 1433,
        }
    }

    fn data_dir(&self) -> &'static str {
        match self {
            Engine::Postgres => "/var/lib/postgresql/data",
            Engine::MySql => "/var/lib/mysql",
            Engine::SqlServer => "/var/opt/mssql",
        }
    }
}

/// Engine and version parsed from a `database_version` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    pub engine: Engine,
    /// Dotted version, or the release year for SQL Server
    pub version: String,
    /// SQL Server edition (`STANDARD`, `EXPRESS`, ...)
    pub edition: Option<String>,
}

impl EngineVersion {
    fn fallback() -> Self {
        Self {
            engine: Engine::Postgres,
            version: "16".to_string(),
            edition: None,
        }
    }

    pub fn image(&self) -> String {
        match self.engine {
            Engine::Postgres => format!("postgres:{}-alpine", self.version),
            Engine::MySql => format!("mysql:{}", self.version),
            Engine::SqlServer => format!("mcr.microsoft.com/mssql/server:{}-latest", self.version),
        }
    }
}

/// Parse `POSTGRES_9_6`, `MYSQL_8_0_31`, `SQLSERVER_2022_EXPRESS`
pub fn parse_database_version(value: &str) -> Option<EngineVersion> {
    let upper = value.trim().to_ascii_uppercase();
    let mut tokens = upper.split('_');
    let engine = match tokens.next()? {
        "POSTGRES" => Engine::Postgres,
        "MYSQL" => Engine::MySql,
        "SQLSERVER" => Engine::SqlServer,
        _ => return None,
    };
    let rest: Vec<&str> = tokens.collect();
    let numeric = |token: &&str| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit());

    match engine {
        Engine::SqlServer => {
            let year = rest.first().copied().filter(|token| numeric(token))?;
            Some(EngineVersion {
                engine,
                version: year.to_string(),
                edition: rest.get(1).map(|edition| edition.to_string()),
            })
        }
        _ => {
            if rest.is_empty() || !rest.iter().all(|token| numeric(token)) {
                return None;
            }
            Some(EngineVersion {
                engine,
                version: rest.join("."),
                edition: None,
            })
        }
    }
}

/// Sizing for a Cloud SQL tier, including `db-custom-<cpus>-<mb>`
pub fn tier_limits(tier: &str) -> Option<ResourceLimits> {
    let tier = tier.to_ascii_lowercase();
    if let Some((_, cpus, memory_mb)) = TIERS.iter().find(|(name, _, _)| *name == tier) {
        return Some(ResourceLimits::new(*cpus, *memory_mb));
    }
    let caps = CUSTOM_TIER.captures(&tier)?;
    let cpus: f64 = caps[1].parse().ok()?;
    let memory_mb: u64 = caps[2].parse().ok()?;
    Some(ResourceLimits::new(cpus, memory_mb))
}

/// SQL identifier derived from a resource name
fn database_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    match cleaned.chars().next() {
        None => "app".to_string(),
        Some(first) if first.is_ascii_digit() => format!("db_{}", cleaned),
        Some(_) => cleaned.to_string(),
    }
}

struct AdminCredentials {
    username: String,
    password: String,
}

impl AdminCredentials {
    fn generate(ctx: &MapContext, engine: Engine) -> Self {
        match engine {
            // SQL Server only accepts passwords mixing character classes
            Engine::SqlServer => Self {
                username: "sa".to_string(),
                password: format!("{}#Aa1", ctx.secrets.password()),
            },
            _ => Self {
                username: format!("admin_{}", ctx.secrets.alphanumeric(8).to_ascii_lowercase()),
                password: ctx.secrets.password(),
            },
        }
    }
}

fn health_check(engine: Engine, credentials: &AdminCredentials, database: &str) -> HealthCheck {
    let port = engine.port();
    match engine {
        Engine::Postgres => HealthCheck::shell(format!(
            "pg_isready -h 127.0.0.1 -p {} -U {} -d {}",
            port, credentials.username, database
        )),
        Engine::MySql => HealthCheck::shell(format!(
            "mysqladmin ping -h 127.0.0.1 -P {} -u {} --password={} --silent",
            port, credentials.username, credentials.password
        )),
        Engine::SqlServer => HealthCheck {
            start_period_secs: Some(60),
            ..HealthCheck::shell(format!(
                "{} -C -S 127.0.0.1,{} -U {} -P '{}' -Q 'SELECT 1' -b",
                MSSQL_TOOLS, port, credentials.username, credentials.password
            ))
        },
    }
}

fn init_sql(engine: Engine, resource: &Resource, database: &str, username: &str) -> String {
    let header = format!(
        "-- Initial schema for {} (source: {})\n-- Add schema statements or restore exported data below.\n",
        database, resource.id
    );
    let body = match engine {
        Engine::Postgres => format!(
            "GRANT ALL PRIVILEGES ON DATABASE \"{}\" TO \"{}\";\n",
            database, username
        ),
        Engine::MySql => format!(
            "CREATE DATABASE IF NOT EXISTS `{db}`;\nGRANT ALL PRIVILEGES ON `{db}`.* TO '{user}'@'%';\nFLUSH PRIVILEGES;\n",
            db = database,
            user = username
        ),
        Engine::SqlServer => format!(
            "IF DB_ID(N'{db}') IS NULL CREATE DATABASE [{db}];\nGO\n",
            db = database
        ),
    };
    header + &body
}

fn migrate_script(engine: Engine, resource: &Resource, service: &str, database: &str) -> String {
    let client = match engine {
        Engine::Postgres => {
            r#"psql -v ON_ERROR_STOP=1 -U "$POSTGRES_USER" -d "$POSTGRES_DB""#.to_string()
        }
        Engine::MySql => r#"mysql -uroot -p"$MYSQL_ROOT_PASSWORD" "$MYSQL_DATABASE""#.to_string(),
        Engine::SqlServer => format!(
            r#"{} -C -S localhost -U sa -P "$MSSQL_SA_PASSWORD" -d {} -i /dev/stdin"#,
            MSSQL_TOOLS, database
        ),
    };
    format!(
        "#!/bin/sh\n\
         # Load a Cloud SQL export into the local {engine} service.\n\
         # Export first with:\n\
         #   gcloud sql export sql {instance} gs://<bucket>/{db}.sql --database={db}\n\
         #   gcloud storage cp gs://<bucket>/{db}.sql .\n\
         set -eu\n\
         DUMP=\"${{1:-{db}.sql}}\"\n\
         docker compose exec -T {service} sh -c '{client}' < \"$DUMP\"\n",
        engine = engine.as_str(),
        instance = resource.name,
        db = database,
        service = service,
        client = client
    )
}

/// `name=value` pairs from the database flag list
fn database_flags(resource: &Resource) -> Vec<(String, String)> {
    first_value(resource, FLAG_PATHS)
        .and_then(Value::as_array)
        .map(|flags| {
            flags
                .iter()
                .filter_map(|flag| {
                    let name = field_str(flag, &["name"])?;
                    let value = field_str(flag, &["value"])?;
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Maps `gcp:sql:instance`
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudSqlMapper;

impl CloudSqlMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceMapper for CloudSqlMapper {
    fn resource_type(&self) -> ResourceType {
        catalog::SQL_INSTANCE
    }

    fn map(&self, ctx: &MapContext, resource: &Resource) -> MapperResult<MappingResult> {
        self.validate(Some(resource))?;

        let raw_version = first_str(resource, VERSION_PATHS);
        let parsed = raw_version.and_then(parse_database_version);
        let recognized = parsed.is_some();
        let version = parsed.unwrap_or_else(EngineVersion::fallback);
        let engine = version.engine;

        let mut result = MappingResult::new(
            resource.id.clone(),
            base_service(ctx, resource, version.image()),
        );
        if !recognized {
            result.warn(format!(
                "Unrecognized database engine {}; defaulting to PostgreSQL {}",
                raw_version.unwrap_or("(unspecified)"),
                version.version
            ));
            result.manual_step(format!(
                "Review the database engine chosen for {} before loading data",
                resource.name
            ));
        }

        let service_name = result.service.name.clone();
        let database = database_name(&resource.name);
        let credentials = AdminCredentials::generate(ctx, engine);

        let environment = &mut result.service.environment;
        match engine {
            Engine::Postgres => {
                environment.insert("POSTGRES_USER".to_string(), credentials.username.clone());
                environment.insert("POSTGRES_PASSWORD".to_string(), credentials.password.clone());
                environment.insert("POSTGRES_DB".to_string(), database.clone());
            }
            Engine::MySql => {
                environment.insert("MYSQL_ROOT_PASSWORD".to_string(), ctx.secrets.password());
                environment.insert("MYSQL_USER".to_string(), credentials.username.clone());
                environment.insert("MYSQL_PASSWORD".to_string(), credentials.password.clone());
                environment.insert("MYSQL_DATABASE".to_string(), database.clone());
            }
            Engine::SqlServer => {
                environment.insert("ACCEPT_EULA".to_string(), "Y".to_string());
                environment.insert("MSSQL_SA_PASSWORD".to_string(), credentials.password.clone());
                let edition = match version.edition.as_deref() {
                    Some("EXPRESS") => "Express",
                    _ => "Developer",
                };
                environment.insert("MSSQL_PID".to_string(), edition.to_string());
            }
        }

        result.service.add_port(engine.port(), Protocol::Tcp);
        result.service.health_check = Some(health_check(engine, &credentials, &database));
        data_volume(&mut result.service, engine.data_dir());

        let limits = match first_str(resource, TIER_PATHS).map(|tier| (tier, tier_limits(tier))) {
            Some((_, Some(limits))) => limits,
            Some((tier, None)) => {
                result.warn(format!(
                    "Unknown tier {}; using default 1 CPU / 2048 MB",
                    tier
                ));
                DEFAULT_LIMITS
            }
            None => DEFAULT_LIMITS,
        };
        result.service.resources = limits;

        let flags = database_flags(resource);
        match engine {
            Engine::Postgres if !flags.is_empty() => {
                let mut command = vec!["postgres".to_string()];
                for (name, value) in &flags {
                    command.push("-c".to_string());
                    command.push(format!("{}={}", name, value));
                }
                result.service.command = Some(command);
            }
            Engine::MySql if !flags.is_empty() => {
                let mut command = vec!["mysqld".to_string()];
                command.extend(flags.iter().map(|(name, value)| format!("--{}={}", name, value)));
                result.service.command = Some(command);
            }
            Engine::SqlServer if !flags.is_empty() => {
                result.warn("Database flags are not applied to the local SQL Server");
            }
            _ => {}
        }

        result.add_config(
            INIT_SQL,
            init_sql(engine, resource, &database, &credentials.username),
        );
        match engine {
            Engine::SqlServer => {
                let mount_point = format!("{}/{}", ARTIFACT_MOUNT_DIR, INIT_SQL);
                mount_artifact(&mut result.service, INIT_SQL, mount_point.clone());
                result.manual_step(format!(
                    "Run {} once {} is healthy: docker compose exec {} {} -C -S localhost -U sa -P \"$MSSQL_SA_PASSWORD\" -i {}",
                    INIT_SQL, service_name, service_name, MSSQL_TOOLS, mount_point
                ));
            }
            _ => mount_artifact(
                &mut result.service,
                INIT_SQL,
                format!("/docker-entrypoint-initdb.d/{}", INIT_SQL),
            ),
        }

        result.add_script(
            MIGRATE_SCRIPT,
            migrate_script(engine, resource, &service_name, &database),
        );
        result.manual_step(format!(
            "Export data from Cloud SQL instance {} and load it with {}",
            resource.name, MIGRATE_SCRIPT
        ));

        if first_str(resource, AVAILABILITY_PATHS) == Some("REGIONAL") {
            result.warn("High availability is not replicated locally");
        }
        if let Some(primary) = first_str(resource, PRIMARY_PATHS) {
            result.warn(format!(
                "Read replica of {}; mapped as a standalone server",
                primary
            ));
        }

        debug!(
            "Mapped Cloud SQL instance {} to {} {}",
            resource.id,
            engine.as_str(),
            version.version
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudshift_types::SeededSecretGenerator;
    use serde_json::json;
    use std::sync::Arc;

    fn sql_instance(config: Value) -> Resource {
        let config = match config {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        Resource::new(
            "google_sql_database_instance.orders",
            "orders-db",
            catalog::SQL_INSTANCE,
            "us-central1",
        )
        .with_config(config)
    }

    fn seeded() -> MapContext {
        MapContext::new(Arc::new(SeededSecretGenerator::new(42)))
    }

    #[test]
    fn test_parse_database_version() {
        let pg = parse_database_version("POSTGRES_9_6").unwrap();
        assert_eq!(pg.engine, Engine::Postgres);
        assert_eq!(pg.image(), "postgres:9.6-alpine");

        let mysql = parse_database_version("MYSQL_8_0_31").unwrap();
        assert_eq!(mysql.image(), "mysql:8.0.31");

        let mssql = parse_database_version("SQLSERVER_2019_STANDARD").unwrap();
        assert_eq!(mssql.image(), "mcr.microsoft.com/mssql/server:2019-latest");
        assert_eq!(mssql.edition.as_deref(), Some("STANDARD"));

        assert!(parse_database_version("ORACLE_19").is_none());
        assert!(parse_database_version("POSTGRES_LATEST").is_none());
        assert!(parse_database_version("POSTGRES").is_none());
    }

    #[test]
    fn test_tier_table_and_custom_tiers() {
        assert_eq!(tier_limits("db-f1-micro"), Some(ResourceLimits::new(0.2, 614)));
        assert_eq!(
            tier_limits("db-custom-2-7680"),
            Some(ResourceLimits::new(2.0, 7680))
        );
        assert_eq!(tier_limits("db-perf-optimized-N-8"), None);
    }

    #[test]
    fn test_maps_postgres_from_terraform_state() {
        let resource = sql_instance(json!({
            "database_version": "POSTGRES_15",
            "settings": [{
                "tier": "db-custom-2-7680",
                "database_flags": [{ "name": "max_connections", "value": "200" }]
            }]
        }));

        let result = CloudSqlMapper::new().map(&seeded(), &resource).unwrap();
        let service = &result.service;

        assert_eq!(service.name, "orders-db");
        assert_eq!(service.image, "postgres:15-alpine");
        assert_eq!(service.ports[0].container_port, 5432);
        assert_eq!(service.resources, ResourceLimits::new(2.0, 7680));
        assert_eq!(
            service.environment.get("POSTGRES_DB").map(String::as_str),
            Some("orders_db")
        );
        let user = service.environment.get("POSTGRES_USER").unwrap();
        assert!(user.starts_with("admin_"));
        let health = service.health_check.as_ref().unwrap();
        assert!(health.test[1].starts_with("pg_isready"));
        assert!(health.test[1].contains(user.as_str()));
        assert_eq!(
            service.command,
            Some(vec![
                "postgres".to_string(),
                "-c".to_string(),
                "max_connections=200".to_string()
            ])
        );
        assert!(result.configs.contains_key("init.sql"));
        assert!(result.scripts["migrate.sh"].contains("docker compose exec -T orders-db"));
        assert!(service
            .volumes
            .iter()
            .any(|v| v.destination == "/docker-entrypoint-initdb.d/init.sql"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_credentials_are_reproducible_with_seeded_generator() {
        let resource = sql_instance(json!({ "databaseVersion": "MYSQL_8_0", "settings": { "tier": "db-n1-standard-1" } }));
        let mapper = CloudSqlMapper::new();

        let a = mapper.map(&seeded(), &resource).unwrap();
        let b = mapper.map(&seeded(), &resource).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.service.image, "mysql:8.0");
        assert_eq!(a.service.resources, ResourceLimits::new(1.0, 3840));
        assert_ne!(
            a.service.environment.get("MYSQL_ROOT_PASSWORD"),
            a.service.environment.get("MYSQL_PASSWORD")
        );
    }

    #[test]
    fn test_sql_server_edition_and_init_step() {
        let resource = sql_instance(json!({ "database_version": "SQLSERVER_2022_EXPRESS" }));

        let result = CloudSqlMapper::new().map(&seeded(), &resource).unwrap();

        assert_eq!(
            result.service.environment.get("MSSQL_PID").map(String::as_str),
            Some("Express")
        );
        assert_eq!(result.service.ports[0].container_port, 1433);
        assert_eq!(result.manual_steps.len(), 2);
        assert_eq!(result.service.resources, DEFAULT_LIMITS);
    }

    #[test]
    fn test_unknown_engine_degrades_to_warning() {
        let resource = sql_instance(json!({ "database_version": "ORACLE_19", "settings": [{ "tier": "db-mystery" }] }));

        let result = CloudSqlMapper::new().map(&seeded(), &resource).unwrap();

        assert_eq!(result.service.image, "postgres:16-alpine");
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("ORACLE_19"));
        assert!(result
            .manual_steps
            .iter()
            .any(|step| step.contains("Review the database engine")));
        assert_eq!(result.service.resources, DEFAULT_LIMITS);
    }
}
