//! Logic for loading configuration in to an object model.
//!
//! Configuration is consumed once, when the client is constructed; it is never
//! re-read per request.

use std::path::Path;
use std::str::FromStr;

use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::ConfigurationError;

pub const API_URL_ENV: &str = "NEXT_PUBLIC_API_URL";
pub const RUNTIME_ENV_ENV: &str = "NEXT_PUBLIC_RUNTIME_ENV";
pub const SITE_DOMAIN_TLD_ENV: &str = "NEXT_PUBLIC_SITE_DOMAIN_TLD";
pub const SITE_DOMAIN_TLD_OLD_ENV: &str = "NEXT_PUBLIC_SITE_DOMAIN_TLD_OLD";

/// The runtime environment the client is deployed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    /// A developer machine: operations are logged.
    Local,
    /// Any non-production deployment.
    Development,
    #[default]
    Production,
}

impl RuntimeEnv {
    pub fn is_local(&self) -> bool {
        matches!(self, RuntimeEnv::Local)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeEnv::Production)
    }

    /// Unknown names are treated as a non-production deployment.
    pub fn from_name(name: &str) -> Self {
        match name {
            "local" => RuntimeEnv::Local,
            "production" => RuntimeEnv::Production,
            _ => RuntimeEnv::Development,
        }
    }
}

impl FromStr for RuntimeEnv {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

/// Automatic persisted queries.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct PersistedQueries {
    /// Send a hash of the document before sending the full text.
    pub enabled: bool,
    /// Send hashed reads over `GET` so that they can be HTTP cached.
    pub use_get_for_hashed_queries: bool,
}

impl Default for PersistedQueries {
    fn default() -> Self {
        Self {
            enabled: true,
            use_get_for_hashed_queries: true,
        }
    }
}

/// Where the browser fingerprint lives and what it must look like.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Fingerprint {
    /// Storage key holding the fingerprint.
    pub storage_key: String,
    /// Stored values not starting with this prefix are ignored.
    pub prefix: String,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            storage_key: "__agent_hash".to_string(),
            prefix: "ahv1_".to_string(),
        }
    }
}

/// Names of the cookies the client reads.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct CookieNames {
    /// The user segment, forwarded as `x-user-group`.
    pub user_group: String,
    /// The language preference.
    pub language: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            user_group: "__user_group".to_string(),
            language: "__lang".to_string(),
        }
    }
}

/// The configuration for the client.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or from the environment with [`Configuration::from_env`].
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// The GraphQL endpoint.
    pub api_url: Url,

    /// The runtime environment.
    #[serde(default)]
    pub runtime_env: RuntimeEnv,

    /// The primary site domain suffix.
    #[serde(default = "default_site_domain_tld")]
    pub site_domain_tld: String,

    /// The legacy site domain suffix, still served during the domain migration.
    #[serde(default = "default_site_domain_tld_old")]
    pub site_domain_tld_old: String,

    /// Automatic persisted queries.
    #[serde(default)]
    pub persisted_queries: PersistedQueries,

    /// Static `x-access-token` sent with every credentialed operation.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Sent as `x-client-name`.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    #[serde(default)]
    pub fingerprint: Fingerprint,

    #[serde(default)]
    pub cookies: CookieNames,
}

fn default_site_domain_tld() -> String {
    "matters.town".to_string()
}

fn default_site_domain_tld_old() -> String {
    "matters.news".to_string()
}

fn default_client_name() -> String {
    "web".to_string()
}

impl Configuration {
    /// A configuration with every optional setting at its default.
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            runtime_env: RuntimeEnv::default(),
            site_domain_tld: default_site_domain_tld(),
            site_domain_tld_old: default_site_domain_tld_old(),
            persisted_queries: PersistedQueries::default(),
            access_token: None,
            client_name: default_client_name(),
            fingerprint: Fingerprint::default(),
            cookies: CookieNames::default(),
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_env_vars(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_env_vars(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let api_url = lookup(API_URL_ENV).ok_or(ConfigurationError::Environment {
            name: API_URL_ENV,
            reason: "not set".to_string(),
        })?;
        let api_url = parse_api_url(&api_url)?;

        let mut configuration = Self::new(api_url);
        if let Some(runtime_env) = lookup(RUNTIME_ENV_ENV) {
            configuration.runtime_env = RuntimeEnv::from_name(&runtime_env);
        }
        if let Some(tld) = lookup(SITE_DOMAIN_TLD_ENV).filter(|tld| !tld.is_empty()) {
            configuration.site_domain_tld = tld;
        }
        if let Some(tld) = lookup(SITE_DOMAIN_TLD_OLD_ENV).filter(|tld| !tld.is_empty()) {
            configuration.site_domain_tld_old = tld;
        }
        Ok(configuration)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|error| ConfigurationError::Deserialize(error.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// The JSON schema of the YAML configuration.
    pub fn json_schema() -> RootSchema {
        let settings = SchemaSettings::draft07().with(|s| {
            s.option_nullable = true;
            s.option_add_null_type = false;
            s.inline_subschemas = true;
        });
        settings
            .into_generator()
            .into_root_schema_for::<Configuration>()
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigurationError> {
    let url = Url::parse(raw).map_err(|error| ConfigurationError::InvalidEndpoint {
        url: raw.to_string(),
        reason: error.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigurationError::InvalidEndpoint {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}
