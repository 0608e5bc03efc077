//! What a session streams, and where it connects to stream it.
//!
//! A mounted view describes itself with a [`MountContext`]. At start time the
//! context becomes a [`SessionIdentity`], and the [`IdentityResolver`] turns
//! that identity plus the credential read for this start into a
//! [`ConnectTarget`].

use std::fmt;
use std::str::FromStr;

use url::Url;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("select a site before starting the log stream")]
    MissingResource,
    #[error("resource id cannot be empty")]
    EmptyResource,
    #[error("no credential available; log in or pass a token")]
    MissingCredential,
    #[error("invalid api url: {0}")]
    InvalidBaseUrl(String),
    #[error("unknown log category '{0}' (expected application or webserver)")]
    UnknownCategory(String),
}

/// Opaque identifier of a hosted resource (a site id or domain).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self, ResolveError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ResolveError::EmptyResource);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Process manager output of the site's application.
    #[default]
    Application,
    /// Web server access log of the site.
    Webserver,
}

impl LogCategory {
    pub const ALL: [LogCategory; 2] = [LogCategory::Application, LogCategory::Webserver];

    /// Path segment the backend routes on.
    pub fn path_segment(self) -> &'static str {
        match self {
            LogCategory::Application => "app",
            LogCategory::Webserver => "nginx",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::Application => "application",
            LogCategory::Webserver => "webserver",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            LogCategory::Application => LogCategory::Webserver,
            LogCategory::Webserver => LogCategory::Application,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = ResolveError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "application" | "app" => Ok(LogCategory::Application),
            "webserver" | "web" | "nginx" => Ok(LogCategory::Webserver),
            other => Err(ResolveError::UnknownCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Shell,
    Logs,
}

impl Intent {
    /// Shells connect as soon as the view mounts; log tails wait for an
    /// explicit start.
    pub fn auto_connects(self) -> bool {
        matches!(self, Intent::Shell)
    }
}

/// Caller-side description of a mounted view. The resource and category are
/// selections the user may change while no session is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountContext {
    pub intent: Intent,
    pub resource: Option<String>,
    pub category: LogCategory,
}

impl MountContext {
    pub fn global_shell() -> Self {
        Self {
            intent: Intent::Shell,
            resource: None,
            category: LogCategory::default(),
        }
    }

    pub fn shell(resource: Option<String>) -> Self {
        Self {
            intent: Intent::Shell,
            resource,
            category: LogCategory::default(),
        }
    }

    pub fn logs(resource: Option<String>, category: LogCategory) -> Self {
        Self {
            intent: Intent::Logs,
            resource,
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    Global,
    ShellFor(ResourceId),
    LogTailFor(ResourceId, LogCategory),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    GlobalShell,
    ScopedShell,
    LogTail,
}

impl SessionIdentity {
    pub fn from_mount(context: &MountContext) -> Result<Self, ResolveError> {
        match (context.intent, context.resource.as_deref()) {
            (Intent::Shell, None) => Ok(SessionIdentity::Global),
            (Intent::Shell, Some(resource)) => {
                Ok(SessionIdentity::ShellFor(ResourceId::new(resource)?))
            }
            (Intent::Logs, None) => Err(ResolveError::MissingResource),
            (Intent::Logs, Some(resource)) => match ResourceId::new(resource) {
                Ok(resource) => Ok(SessionIdentity::LogTailFor(resource, context.category)),
                Err(_) => Err(ResolveError::MissingResource),
            },
        }
    }

    pub fn mode(&self) -> SessionMode {
        match self {
            SessionIdentity::Global => SessionMode::GlobalShell,
            SessionIdentity::ShellFor(_) => SessionMode::ScopedShell,
            SessionIdentity::LogTailFor(..) => SessionMode::LogTail,
        }
    }

    pub fn is_log_tail(&self) -> bool {
        matches!(self, SessionIdentity::LogTailFor(..))
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionIdentity::Global => f.write_str("shell"),
            SessionIdentity::ShellFor(resource) => write!(f, "shell:{resource}"),
            SessionIdentity::LogTailFor(resource, category) => {
                write!(f, "logs:{category}:{resource}")
            }
        }
    }
}

/// Bearer credential attached when a connection is established.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Whitespace-only tokens count as absent. Anything else is kept verbatim.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where the bearer credential comes from. Read once per session start.
pub trait CredentialSource: Send + Sync {
    fn current(&self) -> Option<Credential>;
}

#[derive(Debug, Clone)]
pub struct StaticCredential(Option<Credential>);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Credential::new(token))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticCredential {
    fn current(&self) -> Option<Credential> {
        self.0.clone()
    }
}

/// A fully resolved connection target. `Display` redacts the credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    url: Url,
    mode: SessionMode,
}

impl ConnectTarget {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| {
                let value = if name == "token" {
                    "***".to_string()
                } else {
                    value.into_owned()
                };
                (name.into_owned(), value)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.to_string()
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("url", &self.redacted())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Maps identities onto the backend's streaming endpoints.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    stream_base: Url,
}

impl IdentityResolver {
    /// `api_base` is the panel's HTTP API base; the stream base is derived
    /// from it by swapping `http`/`https` for `ws`/`wss`.
    pub fn new(api_base: impl AsRef<str>) -> Result<Self, ResolveError> {
        let mut stream_base = api_base_url(api_base.as_ref())?;
        let scheme = if stream_base.scheme() == "https" { "wss" } else { "ws" };
        stream_base
            .set_scheme(scheme)
            .map_err(|()| ResolveError::InvalidBaseUrl(stream_base.to_string()))?;
        Ok(Self { stream_base })
    }

    pub fn stream_base(&self) -> &Url {
        &self.stream_base
    }

    pub fn resolve(
        &self,
        identity: &SessionIdentity,
        credential: &Credential,
    ) -> Result<ConnectTarget, ResolveError> {
        let mut url = self.stream_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ResolveError::InvalidBaseUrl(self.stream_base.to_string()))?;
            segments.pop_if_empty();
            match identity {
                SessionIdentity::Global | SessionIdentity::ShellFor(_) => {
                    segments.extend(["ws", "terminal"]);
                }
                SessionIdentity::LogTailFor(resource, category) => {
                    segments.extend(["ws", "logs", category.path_segment(), resource.as_str()]);
                }
            }
        }
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", credential.expose());
            if let SessionIdentity::ShellFor(resource) = identity {
                query.append_pair("site_id", resource.as_str());
            }
        }
        Ok(ConnectTarget {
            url,
            mode: identity.mode(),
        })
    }
}

/// Parses the panel's API base into an `http`/`https` URL.
///
/// `ws`/`wss` bases are mapped back to their HTTP schemes. A bare
/// `host[:port]` gets plain `http` on loopback and `https` everywhere else.
pub fn api_base_url(raw: &str) -> Result<Url, ResolveError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ResolveError::InvalidBaseUrl(
            "api url cannot be empty".into(),
        ));
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else if is_loopback_host(raw) {
        format!("http://{raw}")
    } else {
        format!("https://{raw}")
    };
    let mut url =
        Url::parse(&with_scheme).map_err(|err| ResolveError::InvalidBaseUrl(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        _ => {
            return Err(ResolveError::InvalidBaseUrl(format!(
                "unsupported scheme in '{raw}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ResolveError::InvalidBaseUrl(with_scheme.clone()))?;
    if url.cannot_be_a_base() {
        return Err(ResolveError::InvalidBaseUrl(with_scheme));
    }
    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    let lowered = host.to_ascii_lowercase();
    lowered.starts_with("localhost") || lowered.starts_with("127.") || lowered.starts_with("[::1]")
}
