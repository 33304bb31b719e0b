//! REST routes and their rate-limit keys

use std::fmt;

/// HTTP method of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that split one route template into independent rate-limit buckets
const MAJOR_PARAMS: [&str; 3] = ["guild_id", "channel_id", "webhook_id"];

/// A REST route: method, path template and parameter values.
///
/// ```ignore
/// let route = Route::new(Method::Patch, "/guilds/{guild_id}/roles/{role_id}")
///     .param("guild_id", 1)
///     .param("role_id", 2);
/// assert_eq!(route.path(), "/guilds/1/roles/2");
/// assert_eq!(route.bucket_key(), "PATCH /guilds/{guild_id}/roles/{role_id} 1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: String,
    params: Vec<(&'static str, String)>,
    requires_auth: bool,
}

impl Route {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Self {
            method,
            template: template.into(),
            params: Vec::new(),
            requires_auth: true,
        }
    }

    /// Bind a `{name}` placeholder
    #[must_use]
    pub fn param(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// Send without the `Authorization` header
    #[must_use]
    pub fn unauthenticated(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[inline]
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// The concrete path with every bound placeholder substituted
    pub fn path(&self) -> String {
        self.params
            .iter()
            .fold(self.template.clone(), |path, (name, value)| {
                path.replace(&format!("{{{name}}}"), value)
            })
    }

    /// Values of the major parameters present on this route, joined by `:`
    pub fn major(&self) -> String {
        MAJOR_PARAMS
            .iter()
            .filter_map(|major| {
                self.params
                    .iter()
                    .find(|(name, _)| name == major)
                    .map(|(_, value)| value.as_str())
            })
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Key of the route-scoped bucket used until the server names the bucket
    pub fn bucket_key(&self) -> String {
        format!("{} {} {}", self.method, self.template, self.major())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}
