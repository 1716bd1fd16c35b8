//! Endpoint resolution and the TLS policy that goes with it.

use url::Url;

use crate::configuration::Configuration;
use crate::configuration::RuntimeEnv;
use crate::error::ConfigurationError;

/// The URL operations are sent to and the `host` header that goes with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub host: String,
}

impl Endpoint {
    /// Resolve the endpoint for a page served on `host`.
    ///
    /// Pages still served from the legacy domain talk to the API on the legacy
    /// domain too: the first occurrence of the primary domain suffix in both
    /// the URL and its hostname is replaced by the legacy one.
    pub fn resolve(configuration: &Configuration, host: &str) -> Result<Self, ConfigurationError> {
        let mut api_url = configuration.api_url.to_string();
        let mut hostname = host_with_port(&configuration.api_url);

        let tld = configuration.site_domain_tld.as_str();
        let tld_old = configuration.site_domain_tld_old.as_str();
        if !host.is_empty() && !tld.is_empty() && !tld_old.is_empty() && host.ends_with(tld_old) {
            tracing::debug!(host, tld, tld_old, "serving a legacy domain");
            api_url = api_url.replacen(tld, tld_old, 1);
            hostname = hostname.replacen(tld, tld_old, 1);
        }

        let url = Url::parse(&api_url).map_err(|error| ConfigurationError::InvalidEndpoint {
            url: api_url.clone(),
            reason: error.to_string(),
        })?;
        Ok(Self {
            url,
            host: hostname,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() != "http"
    }
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// How the transport connects to the endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityPolicy {
    /// Plain HTTP, for `http` endpoints.
    Plain,
    /// TLS. Certificates are only verified in production.
    Tls { verify_certificates: bool },
}

impl SecurityPolicy {
    pub fn for_endpoint(endpoint: &Endpoint, runtime_env: RuntimeEnv) -> Self {
        if endpoint.is_tls() {
            SecurityPolicy::Tls {
                verify_certificates: runtime_env.is_production(),
            }
        } else {
            SecurityPolicy::Plain
        }
    }
}
