//! Environment-driven configuration.
//!
//! Every setting is a `SYNC_*` variable. Endpoints and credentials are
//! required; everything else has a default. `.env` is loaded by the binary
//! before [`SyncConfig::from_env`] runs.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_EXCLUDED_TABLES: &str =
    "QueryBuilders,QueryTransformers,sysdiagrams,AggregateConcordanceTemp";
pub const DEFAULT_DICTIONARY: &str = "National Datawarehouse Data Dictionary";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub catalog: CatalogConfig,
    pub glossary: GlossaryConfig,
    pub reporting: ReportingConfig,
    /// `None` when `SYNC_MAIL_HOST` is unset; changelogs are then only logged.
    pub mail: Option<MailConfig>,
    /// Reporting tables never registered as datasets.
    pub excluded_tables: BTreeSet<String>,
    pub server: ServerConfig,
    pub schedules: ScheduleConfig,
}

/// Superset login payload.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub provider: String,
    pub refresh: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .field("provider", &self.provider)
            .field("refresh", &self.refresh)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// e.g. `http://superset:8088`
    pub base_url: String,
    pub credentials: Credentials,
    /// Catalog id of the reporting database new datasets are attached to.
    pub database_id: i64,
    /// Schema new datasets are registered under.
    pub schema: String,
    /// Owner assigned to every new dataset.
    pub owner_id: i64,
    pub page_size: u32,
    /// `None` = log in again for every call.
    pub token_cache_ttl: Option<Duration>,
}

#[derive(Clone)]
pub struct GlossaryConfig {
    pub base_url: String,
    pub token: String,
    /// Glossary whose terms are named `<dictionary>.<table>[.<column>]`.
    pub dictionary: String,
}

impl fmt::Debug for GlossaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlossaryConfig")
            .field("base_url", &self.base_url)
            .field("token", &"***REDACTED***")
            .field("dictionary", &self.dictionary)
            .finish()
    }
}

/// Connection parameters for the reporting database.
#[derive(Clone)]
pub struct ReportingConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: String,
    pub schema: String,
}

impl fmt::Debug for ReportingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"****")
            .field("ssl_mode", &self.ssl_mode)
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
    pub from: String,
    pub reply_to: Option<String>,
    pub recipients: Vec<String>,
    pub subject: String,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("starttls", &self.starttls)
            .field("from", &self.from)
            .field("reply_to", &self.reply_to)
            .field("recipients", &self.recipients)
            .field("subject", &self.subject)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub http_timeout: Duration,
}

/// Cron expressions for scheduled runs; `None` disables the schedule.
#[derive(Debug, Clone, Default)]
pub struct ScheduleConfig {
    pub refresh: Option<String>,
    pub enrich: Option<String>,
    pub sync: Option<String>,
    pub changelog: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let catalog_schema = env.or("SYNC_CATALOG_SCHEMA", "dbo");
        let token_cache_secs: u64 = env.parse("SYNC_TOKEN_CACHE_SECS", 0)?;

        let catalog = CatalogConfig {
            base_url: trim_base_url(env.required("SYNC_CATALOG_URL")?),
            credentials: Credentials {
                username: env.required("SYNC_CATALOG_USERNAME")?,
                password: env.required("SYNC_CATALOG_PASSWORD")?,
                provider: env.or("SYNC_CATALOG_PROVIDER", "db"),
                refresh: env.flag("SYNC_CATALOG_REFRESH", true)?,
            },
            database_id: env.parse("SYNC_CATALOG_DATABASE_ID", 2)?,
            schema: catalog_schema.clone(),
            owner_id: env.parse("SYNC_CATALOG_OWNER_ID", 1)?,
            page_size: env.parse("SYNC_CATALOG_PAGE_SIZE", 200)?,
            token_cache_ttl: (token_cache_secs > 0).then(|| Duration::from_secs(token_cache_secs)),
        };
        if catalog.page_size == 0 {
            return Err(ConfigError::Invalid {
                var: "SYNC_CATALOG_PAGE_SIZE",
                message: "must be greater than zero".to_string(),
            });
        }

        let glossary = GlossaryConfig {
            base_url: trim_base_url(env.required("SYNC_GLOSSARY_URL")?),
            token: env.required("SYNC_GLOSSARY_TOKEN")?,
            dictionary: env.or("SYNC_GLOSSARY_DICTIONARY", DEFAULT_DICTIONARY),
        };

        let reporting = ReportingConfig {
            host: env.required("SYNC_REPORTING_HOST")?,
            port: env.parse("SYNC_REPORTING_PORT", 5432)?,
            database: env.required("SYNC_REPORTING_DATABASE")?,
            username: env.required("SYNC_REPORTING_USERNAME")?,
            password: env.required("SYNC_REPORTING_PASSWORD")?,
            ssl_mode: env.or("SYNC_REPORTING_SSLMODE", "prefer"),
            schema: env.or("SYNC_REPORTING_SCHEMA", &catalog_schema),
        };
        // The reporting connection has no TLS connector.
        if !matches!(reporting.ssl_mode.as_str(), "disable" | "allow" | "prefer") {
            return Err(ConfigError::Invalid {
                var: "SYNC_REPORTING_SSLMODE",
                message: format!(
                    "{:?} needs TLS; use disable, allow or prefer",
                    reporting.ssl_mode
                ),
            });
        }

        let mail = match env.optional("SYNC_MAIL_HOST") {
            None => None,
            Some(host) => {
                let recipients = env.list("SYNC_MAIL_RECIPIENTS", "");
                if recipients.is_empty() {
                    return Err(ConfigError::Missing("SYNC_MAIL_RECIPIENTS"));
                }
                Some(MailConfig {
                    host,
                    port: env.parse("SYNC_MAIL_PORT", 587)?,
                    username: env.optional("SYNC_MAIL_USERNAME"),
                    password: env.optional("SYNC_MAIL_PASSWORD"),
                    starttls: env.flag("SYNC_MAIL_STARTTLS", true)?,
                    from: env.required("SYNC_MAIL_FROM")?,
                    reply_to: env.optional("SYNC_MAIL_REPLY_TO"),
                    recipients,
                    subject: env.or("SYNC_MAIL_SUBJECT", "Self-service Change log"),
                })
            }
        };

        let server = ServerConfig {
            bind_addr: env.or("SYNC_BIND_ADDR", "127.0.0.1:8085"),
            http_timeout: Duration::from_secs(env.parse("SYNC_HTTP_TIMEOUT_SECS", 30)?),
        };

        let schedules = ScheduleConfig {
            refresh: env.optional("SYNC_SCHEDULE_REFRESH"),
            enrich: env.optional("SYNC_SCHEDULE_ENRICH"),
            sync: env.optional("SYNC_SCHEDULE_SYNC"),
            changelog: env.optional("SYNC_SCHEDULE_CHANGELOG"),
        };

        Ok(Self {
            catalog,
            glossary,
            reporting,
            mail,
            excluded_tables: env
                .list("SYNC_EXCLUDED_TABLES", DEFAULT_EXCLUDED_TABLES)
                .into_iter()
                .collect(),
            server,
            schedules,
        })
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Unset and blank are the same thing.
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.optional(var).ok_or(ConfigError::Missing(var))
    }

    fn or(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                message: format!("{raw:?}: {e}"),
            }),
        }
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(var).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "TRUE" | "True" | "yes") => Ok(true),
            Some("0" | "false" | "FALSE" | "False" | "no") => Ok(false),
            Some(other) => Err(ConfigError::Invalid {
                var,
                message: format!("expected a boolean, got {other:?}"),
            }),
        }
    }

    fn list(&self, var: &str, default: &str) -> Vec<String> {
        self.or(var, default)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
