//! Where the client is running: rendering on the server for one inbound
//! request, or in a browser.

use std::fmt;
use std::sync::Arc;

use http::header::ACCEPT_LANGUAGE;
use http::header::COOKIE;
use http::header::HOST;
use http::HeaderMap;

use crate::cookie::CookieSource;
use crate::storage::Storage;

/// The render context the client is constructed for.
///
/// This is passed explicitly into the pipeline construction instead of being
/// looked up from ambient globals.
#[derive(Clone)]
pub enum RenderContext {
    /// Server-side rendering of one inbound HTTP request.
    Server {
        /// The inbound request headers.
        headers: HeaderMap,
    },
    /// A browser session.
    Browser {
        /// `location.host`
        host: String,
        /// `document.cookie`
        cookie: String,
        /// `navigator.language`
        language: Option<String>,
        /// The persisted client-side storage.
        storage: Arc<dyn Storage>,
    },
}

impl RenderContext {
    pub fn server(headers: HeaderMap) -> Self {
        RenderContext::Server { headers }
    }

    pub fn browser(
        host: impl Into<String>,
        cookie: impl Into<String>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        RenderContext::Browser {
            host: host.into(),
            cookie: cookie.into(),
            language: None,
            storage,
        }
    }

    /// Set `navigator.language`. Has no effect on a server context.
    pub fn with_navigator_language(mut self, navigator_language: impl Into<String>) -> Self {
        if let RenderContext::Browser { language, .. } = &mut self {
            *language = Some(navigator_language.into());
        }
        self
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, RenderContext::Browser { .. })
    }

    /// The host the page is served on; empty when unknown.
    pub fn host(&self) -> &str {
        match self {
            RenderContext::Server { headers } => headers
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .unwrap_or_default(),
            RenderContext::Browser { host, .. } => host,
        }
    }

    /// The cookie string: the inbound `Cookie` header on the server,
    /// `document.cookie` in the browser.
    pub fn cookies(&self) -> CookieSource {
        match self {
            RenderContext::Server { headers } => {
                let header = headers.get(COOKIE).and_then(|cookie| cookie.to_str().ok());
                CookieSource::resolve(header, None)
            }
            RenderContext::Browser { cookie, .. } => CookieSource::resolve(None, Some(cookie)),
        }
    }

    /// Client-side storage, only reachable in a browser.
    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        match self {
            RenderContext::Server { .. } => None,
            RenderContext::Browser { storage, .. } => Some(storage),
        }
    }

    /// The preferred language reported by the user agent.
    pub fn preferred_language(&self) -> Option<&str> {
        match self {
            RenderContext::Server { headers } => headers
                .get(ACCEPT_LANGUAGE)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').map(str::trim).next())
                .filter(|value| !value.is_empty()),
            RenderContext::Browser { language, .. } => language.as_deref(),
        }
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderContext::Server { headers } => f
                .debug_struct("Server")
                .field("host", &headers.get(HOST))
                .finish_non_exhaustive(),
            RenderContext::Browser { host, language, .. } => f
                .debug_struct("Browser")
                .field("host", host)
                .field("language", language)
                .finish_non_exhaustive(),
        }
    }
}
