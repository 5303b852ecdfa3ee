use std::env;
use thiserror::Error;

use crate::policy::{RouteTable, RouteTableError};

/// ConfigError
///
/// Startup failures. The gate refuses to start rather than run with a
/// configuration that silently changes who can see what.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },

    #[error("failed to read route table '{path}': {source}")]
    RouteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse route table '{path}': {source}")]
    RouteFileFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    RouteTable(#[from] RouteTableError),
}

/// AppConfig
///
/// The gate's entire configuration, loaded once at startup and immutable
/// afterwards. Pulled into handlers and middleware via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects log format and required secrets.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Origin of the dashboard front-end that allowed requests are forwarded to.
    pub upstream_url: String,
    // Name of the cookie carrying the access token.
    pub cookie_name: String,
    pub token_verification: TokenVerification,
    pub unclassified_routes: UnclassifiedPolicy,
    // Optional JSON route table replacing the built-in one.
    pub route_table_path: Option<String>,
    // Path prefixes the gate never inspects (framework assets).
    pub bypass_prefixes: Vec<String>,
}

/// Env
///
/// Defines the runtime context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// TokenVerification
///
/// How much the gate trusts the cookie. `Unverified` reads the payload
/// without checking the signature, so anyone able to set the cookie picks
/// their own role.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenVerification {
    Unverified,
    Hs256 { secret: String },
}

impl std::fmt::Debug for TokenVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unverified => f.write_str("Unverified"),
            Self::Hs256 { .. } => f.write_str("Hs256 { secret: <redacted> }"),
        }
    }
}

/// UnclassifiedPolicy
///
/// What happens to paths listed neither as public nor as protected.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum UnclassifiedPolicy {
    /// Let them through regardless of credentials.
    #[default]
    Allow,
    /// Treat them as protected.
    Deny,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_LOCAL_UPSTREAM: &str = "http://localhost:3001";
const DEFAULT_COOKIE_NAME: &str = "accessToken";
const DEFAULT_BYPASS_PREFIXES: &[&str] = &["/_next", "/static", "/images", "/favicon.ico"];

impl Default for AppConfig {
    /// default
    ///
    /// Local settings with no environment lookups, for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            upstream_url: DEFAULT_LOCAL_UPSTREAM.to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            token_verification: TokenVerification::Unverified,
            unclassified_routes: UnclassifiedPolicy::Allow,
            route_table_path: None,
            bypass_prefixes: DEFAULT_BYPASS_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// from_lookup
    ///
    /// Builds the configuration from any key lookup. Blank values count as
    /// unset. Production requires `UPSTREAM_URL` and, unless verification
    /// is explicitly disabled, `JWT_SECRET`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = match get("APP_ENV").as_deref() {
            None | Some("local") => Env::Local,
            Some("production") => Env::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "APP_ENV",
                    value: other.to_string(),
                });
            }
        };

        let upstream_url = match (get("UPSTREAM_URL"), env) {
            (Some(url), _) => url,
            (None, Env::Local) => DEFAULT_LOCAL_UPSTREAM.to_string(),
            (None, Env::Production) => return Err(ConfigError::Missing("UPSTREAM_URL")),
        };
        if !upstream_url.starts_with("http://") && !upstream_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "UPSTREAM_URL",
                value: upstream_url,
            });
        }

        let cookie_name = get("AUTH_COOKIE_NAME").unwrap_or_else(|| DEFAULT_COOKIE_NAME.into());
        if !is_cookie_token(&cookie_name) {
            return Err(ConfigError::Invalid {
                var: "AUTH_COOKIE_NAME",
                value: cookie_name,
            });
        }

        let verification_mode = get("TOKEN_VERIFICATION").unwrap_or_else(|| match env {
            Env::Local => "unverified".into(),
            Env::Production => "hs256".into(),
        });
        let token_verification = match verification_mode.as_str() {
            "unverified" => TokenVerification::Unverified,
            "hs256" => TokenVerification::Hs256 {
                secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            },
            _ => {
                return Err(ConfigError::Invalid {
                    var: "TOKEN_VERIFICATION",
                    value: verification_mode,
                });
            }
        };

        let unclassified_routes = match get("UNCLASSIFIED_ROUTES").as_deref() {
            None | Some("allow") => UnclassifiedPolicy::Allow,
            Some("deny") => UnclassifiedPolicy::Deny,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "UNCLASSIFIED_ROUTES",
                    value: other.to_string(),
                });
            }
        };

        let bypass_prefixes = match get("GATE_BYPASS_PREFIXES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_BYPASS_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        };

        Ok(Self {
            env,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            upstream_url,
            cookie_name,
            token_verification,
            unclassified_routes,
            route_table_path: get("ROUTE_TABLE_PATH"),
            bypass_prefixes,
        })
    }

    /// route_table
    ///
    /// The configured route table: the JSON file when `ROUTE_TABLE_PATH` is
    /// set, the built-in dashboard table otherwise.
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        match &self.route_table_path {
            Some(path) => RouteTable::load_json(path),
            None => Ok(RouteTable::cms_defaults()),
        }
    }

    /// True when the gate should not look at this path at all.
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

// RFC 6265 cookie-name token characters.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
