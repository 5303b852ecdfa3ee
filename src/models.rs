use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

// --- Identity Schemas ---

/// Role
///
/// The fixed set of dashboard roles carried in the token's `role` claim.
/// The wire form is the upper snake case name (`SUPER_ADMIN`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Role {
    SuperAdmin,
    Admin,
    Employee,
}

impl Role {
    /// Every recognized role, in descending order of privilege.
    pub const ALL: [Role; 3] = [Role::SuperAdmin, Role::Admin, Role::Employee];

    /// parse
    ///
    /// Maps a raw claim value onto a known role. Case is ignored; anything
    /// else is unrecognized and yields `None`, which the permission resolver
    /// always denies.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" => Some(Self::SuperAdmin),
            "ADMIN" => Some(Self::Admin),
            "EMPLOYEE" => Some(Self::Employee),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Admin => "ADMIN",
            Self::Employee => "EMPLOYEE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims
///
/// The decoded token payload. Every field is optional on the wire and the
/// types are read loosely: a token whose claims have unexpected shapes
/// still decodes, and a `role` that is missing or not a known string simply
/// cannot open any protected page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Raw role claim as issued by the sign-in service. Non-string values
    /// are kept as their JSON text, which no role parses from.
    #[serde(default, deserialize_with = "loose_string")]
    pub role: Option<String>,
    /// Subject (sub): the signed-in account identifier. Numeric IDs are
    /// accepted.
    #[serde(default, deserialize_with = "loose_string")]
    pub sub: Option<String>,
    /// Expiration time (exp), seconds since the Unix epoch.
    #[serde(default, deserialize_with = "loose_timestamp")]
    pub exp: Option<i64>,
    /// Issued at (iat), seconds since the Unix epoch.
    #[serde(default, deserialize_with = "loose_timestamp")]
    pub iat: Option<i64>,
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// Fractional seconds are truncated; anything that is not a number is dropped.
fn loose_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        _ => None,
    })
}

impl Claims {
    /// The role claim resolved against the known roles.
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::parse)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

// --- Access Decision Schemas ---

/// RouteClass
///
/// Where a normalized path falls in the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RouteClass {
    Public,
    Protected,
    Unclassified,
}

/// Decision
///
/// The only three outcomes the gate ever produces for a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Decision {
    Continue,
    RedirectToLogin,
    RedirectToDashboard,
}

/// DenialReason
///
/// Why a request was redirected. Never surfaced to the browser; used for
/// logs and the access check API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DenialReason {
    MissingCredential,
    MalformedCredential,
    InsufficientPermission,
    /// A valid session asked for a login/registration page.
    AlreadyAuthenticated,
    /// A valid token whose role cannot open the dashboard.
    NoDashboardAccess,
}

/// Verdict
///
/// The engine's full answer for one request: the decision plus the facts
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub class: RouteClass,
    pub reason: Option<DenialReason>,
}

// --- Access API Payloads ---

/// AccessQuery
///
/// Query parameters for `GET /api/access/check`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccessQuery {
    /// The page path to evaluate, e.g. `/posts/all_posts`.
    pub path: String,
}

/// AccessReport
///
/// What the gate would do if the caller requested `path` with their
/// current cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessReport {
    /// The path after normalization.
    pub path: String,
    pub classification: RouteClass,
    pub decision: Decision,
    pub reason: Option<DenialReason>,
    /// True when the cookie decoded into claims.
    pub authenticated: bool,
    pub role: Option<Role>,
    pub subject: Option<String>,
    #[ts(type = "string | null")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// NavigationResponse
///
/// The dashboard routes the caller's role may open, sorted. Drives the
/// sidebar so it never links to a page the gate would bounce.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NavigationResponse {
    pub role: Option<Role>,
    pub routes: Vec<String>,
}
