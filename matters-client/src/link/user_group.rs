//! Forwards the user-group cookie so the API can serve the viewer's segment.

use http::HeaderName;

use crate::cookie::CookieSource;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::link::Link;
use crate::link::Next;
use crate::operation::Operation;

pub const USER_GROUP_HEADER: HeaderName = HeaderName::from_static("x-user-group");

#[derive(Clone, Debug)]
pub struct UserGroupLink {
    cookie_name: String,
    cookies: CookieSource,
}

impl UserGroupLink {
    pub fn new(cookie_name: impl Into<String>, cookies: CookieSource) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookies,
        }
    }
}

#[async_trait::async_trait]
impl Link for UserGroupLink {
    async fn handle(
        &self,
        mut operation: Operation,
        next: Next<'_>,
    ) -> Result<Response, FetchError> {
        if let Some(group) = self.cookies.get(&self.cookie_name) {
            operation.context.set_header(USER_GROUP_HEADER, &group);
        }
        next.run(operation).await
    }

    fn name(&self) -> &'static str {
        "user_group"
    }
}
