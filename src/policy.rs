use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::engine::{DASHBOARD_PATH, LOGIN_PATH};
use crate::models::{Role, RouteClass};

/// RouteTableError
///
/// Configuration mistakes that would otherwise degrade silently into
/// default-allow or permanent-deny at request time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    /// A protected path that no role may open.
    #[error("protected route '{0}' is not allowed for any role")]
    UnreachableRoute(String),

    #[error("route '{0}' is listed as both public and protected")]
    Overlap(String),

    #[error("route '{0}' must start with '/'")]
    InvalidPath(String),

    #[error("unknown role '{0}' in route table")]
    UnknownRole(String),

    /// Anonymous visitors could never reach the sign-in page.
    #[error("login route '{0}' cannot be protected")]
    ProtectedLogin(String),

    /// Signed-in users would be redirected to the page they are on.
    #[error("dashboard route '{0}' cannot be public")]
    PublicDashboard(String),

    #[error("role {0} is configured but may not open the dashboard")]
    DashboardDenied(Role),
}

/// Permission
///
/// The resolver's answer for a single role/path pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Allow,
    Deny,
}

/// RouteTableFile
///
/// On-disk JSON form of the route table. Role keys are raw strings so an
/// unknown role is reported as a configuration error instead of a serde one.
#[derive(Debug, Default, Deserialize)]
pub struct RouteTableFile {
    #[serde(default)]
    pub public: Vec<String>,
    #[serde(default)]
    pub protected: Vec<String>,
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
}

/// RouteTable
///
/// The immutable route access configuration: the Public set, the Protected
/// set, and the per-role Allowed sets. Built once at startup and shared by
/// reference; all paths are stored normalized.
#[derive(Debug, Clone)]
pub struct RouteTable {
    public: HashSet<String>,
    protected: HashSet<String>,
    allowed: HashMap<Role, HashSet<String>>,
}

impl RouteTable {
    /// new
    ///
    /// Normalizes and validates the three lists. Fails when a path is not
    /// absolute, when a path is both public and protected, or when a
    /// protected path is missing from every role's allowed set. The two
    /// redirect targets are checked too: `/login` may not be protected,
    /// `/dashboard` may not be public, and a protected `/dashboard` must be
    /// open to every role the table mentions.
    pub fn new<P, Q, R, I, S>(public: P, protected: Q, allowed: R) -> Result<Self, RouteTableError>
    where
        P: IntoIterator<Item = S>,
        Q: IntoIterator<Item = S>,
        R: IntoIterator<Item = (Role, I)>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let public = normalize_all(public)?;
        let protected = normalize_all(protected)?;

        let mut allowed_by_role: HashMap<Role, HashSet<String>> = HashMap::new();
        for (role, paths) in allowed {
            allowed_by_role
                .entry(role)
                .or_default()
                .extend(normalize_all(paths)?);
        }

        // Sorted so the reported offender is deterministic.
        let sorted_protected: BTreeSet<&String> = protected.iter().collect();
        for path in sorted_protected {
            if public.contains(path) {
                return Err(RouteTableError::Overlap(path.clone()));
            }
            if !allowed_by_role.values().any(|set| set.contains(path)) {
                return Err(RouteTableError::UnreachableRoute(path.clone()));
            }
        }

        if protected.contains(LOGIN_PATH) {
            return Err(RouteTableError::ProtectedLogin(LOGIN_PATH.to_string()));
        }
        if public.contains(DASHBOARD_PATH) {
            return Err(RouteTableError::PublicDashboard(DASHBOARD_PATH.to_string()));
        }
        if protected.contains(DASHBOARD_PATH) {
            let locked_out = Role::ALL.into_iter().find(|role| {
                allowed_by_role
                    .get(role)
                    .is_some_and(|paths| !paths.contains(DASHBOARD_PATH))
            });
            if let Some(role) = locked_out {
                return Err(RouteTableError::DashboardDenied(role));
            }
        }

        Ok(Self {
            public,
            protected,
            allowed: allowed_by_role,
        })
    }

    /// from_file
    ///
    /// Builds a table from its deserialized JSON form, resolving role keys.
    pub fn from_file(file: RouteTableFile) -> Result<Self, RouteTableError> {
        let mut roles = Vec::with_capacity(file.roles.len());
        for (raw, paths) in file.roles {
            let role = Role::parse(&raw).ok_or(RouteTableError::UnknownRole(raw))?;
            roles.push((role, paths));
        }
        Self::new(file.public, file.protected, roles)
    }

    /// load_json
    ///
    /// Reads a route table from a JSON file on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, crate::config::ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            crate::config::ConfigError::RouteFile {
                path: path.display().to_string(),
                source,
            }
        })?;
        let file: RouteTableFile = serde_json::from_str(&raw).map_err(|source| {
            crate::config::ConfigError::RouteFileFormat {
                path: path.display().to_string(),
                source,
            }
        })?;
        Ok(Self::from_file(file)?)
    }

    /// cms_defaults
    ///
    /// The built-in table for the blog dashboard.
    pub fn cms_defaults() -> Self {
        const EMPLOYEE: &[&str] = &[
            "/dashboard",
            "/posts",
            "/posts/all_posts",
            "/posts/create_post",
            "/tags",
            "/tags/all_tags",
            "/profile",
        ];
        const ADMIN_ONLY: &[&str] = &[
            "/tags/create_tag",
            "/categories",
            "/categories/all_categories",
            "/categories/create_category",
            "/marketing",
            "/seo",
            "/seo/listing",
            "/page-builder",
            "/users",
            "/users/all_users",
        ];
        const SUPER_ADMIN_ONLY: &[&str] = &["/users/create_user"];

        let admin: Vec<&str> = EMPLOYEE.iter().chain(ADMIN_ONLY).copied().collect();
        let super_admin: Vec<&str> = admin.iter().chain(SUPER_ADMIN_ONLY).copied().collect();

        Self {
            public: to_set(&["/login", "/register", "/forgot-password", "/reset-password"]),
            protected: to_set(&super_admin),
            allowed: HashMap::from([
                (Role::SuperAdmin, to_set(&super_admin)),
                (Role::Admin, to_set(&admin)),
                (Role::Employee, to_set(EMPLOYEE)),
            ]),
        }
    }

    /// classify
    ///
    /// Route Classifier: exact membership of the normalized path.
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize_path(path);
        if self.public.contains(&path) {
            RouteClass::Public
        } else if self.protected.contains(&path) {
            RouteClass::Protected
        } else {
            RouteClass::Unclassified
        }
    }

    /// resolve
    ///
    /// Permission Resolver: `None` stands for a missing or unrecognized role
    /// claim and is always denied, as is a role absent from the table.
    pub fn resolve(&self, role: Option<Role>, path: &str) -> Permission {
        let Some(role) = role else {
            return Permission::Deny;
        };
        let path = normalize_path(path);
        match self.allowed.get(&role) {
            Some(paths) if paths.contains(&path) => Permission::Allow,
            _ => Permission::Deny,
        }
    }

    /// The protected routes a role may open, sorted.
    pub fn navigation(&self, role: Role) -> Vec<String> {
        let Some(paths) = self.allowed.get(&role) else {
            return Vec::new();
        };
        let mut routes: Vec<String> = paths
            .iter()
            .filter(|path| self.protected.contains(*path))
            .cloned()
            .collect();
        routes.sort();
        routes
    }
}

/// normalize_path
///
/// Canonical form of a request path, used for matching and for forwarding.
/// Repeated and trailing slashes collapse, backslashes count as separators,
/// percent-escaped unreserved characters are decoded and `.`/`..` segments
/// are resolved without climbing above the root. Matching stays exact after
/// this step.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for raw in path.split(['/', '\\']) {
        let segment = decode_unreserved(raw);
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Decodes `%XX` escapes of RFC 3986 unreserved characters, upper-cases the
/// remaining escapes and re-escapes a stray `%`. The result decodes to the
/// same segment, so normalizing twice changes nothing.
fn decode_unreserved(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escape = bytes
            .get(i + 1..i + 3)
            .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        match escape {
            Some(hex) => {
                let decoded = std::str::from_utf8(hex)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) if is_unreserved(byte) => out.push(byte),
                    _ => {
                        out.push(b'%');
                        out.extend(hex.iter().map(u8::to_ascii_uppercase));
                    }
                }
                i += 3;
            }
            None => {
                out.extend_from_slice(b"%25");
                i += 1;
            }
        }
    }
    // Only ASCII bytes were replaced, so the buffer is still UTF-8.
    String::from_utf8_lossy(&out).into_owned()
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn normalize_all<I, S>(paths: I) -> Result<HashSet<String>, RouteTableError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|raw| {
            let raw = raw.as_ref().trim();
            if raw.starts_with('/') {
                Ok(normalize_path(raw))
            } else {
                Err(RouteTableError::InvalidPath(raw.to_string()))
            }
        })
        .collect()
}

fn to_set(paths: &[&str]) -> HashSet<String> {
    paths.iter().map(|p| normalize_path(p)).collect()
}
