//! Isomorphic cookie access.
//!
//! During server rendering cookies come from the inbound request's `Cookie`
//! header; in the browser they come from the live `document.cookie` string.
//! Both are the same `name=value; name2=value2` format.

use cookie::Cookie;

/// Where the cookie string of the current render comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieSource {
    raw: String,
}

impl CookieSource {
    /// Prefer the server-side request header, fall back to the browser's
    /// cookie string, else no cookies at all.
    pub fn resolve(ssr_header: Option<&str>, browser_cookie: Option<&str>) -> Self {
        let raw = ssr_header
            .filter(|header| !header.is_empty())
            .or(browser_cookie)
            .unwrap_or_default()
            .to_string();
        Self { raw }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        get_isomorphic_cookie(&self.raw, name)
    }
}

impl From<&str> for CookieSource {
    fn from(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
        }
    }
}

/// Read one cookie out of a `Cookie` header string.
///
/// Values are percent-decoded when possible. Missing, empty or unparsable
/// cookies are `None`.
pub fn get_isomorphic_cookie(cookie_header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(cookie_header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| {
            let value = cookie.value();
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|value| !value.is_empty())
}
