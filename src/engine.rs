use std::sync::Arc;

use crate::{
    auth::Credential,
    config::UnclassifiedPolicy,
    models::{Decision, DenialReason, RouteClass, Verdict},
    policy::{Permission, RouteTable, normalize_path},
};

/// Fixed redirect target for requests that need to sign in.
pub const LOGIN_PATH: &str = "/login";
/// Fixed redirect target for signed-in users who may not see a page.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// DecisionEngine
///
/// Composes the route classifier and the permission resolver into a single
/// verdict per request. Holds only immutable configuration, so one instance
/// is shared by every request through `EngineState`.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    routes: RouteTable,
    unclassified: UnclassifiedPolicy,
}

/// EngineState
///
/// The shared handle stored in the application state.
pub type EngineState = Arc<DecisionEngine>;

impl DecisionEngine {
    pub fn new(routes: RouteTable, unclassified: UnclassifiedPolicy) -> Self {
        Self {
            routes,
            unclassified,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// evaluate
    ///
    /// The request state machine. Rules apply in order:
    /// 1. no token on a protected path redirects to login;
    /// 2. no token elsewhere continues;
    /// 3. an undecodable token redirects to login whatever the path;
    /// 4. a valid token on a public path redirects to the dashboard;
    /// 5. a valid token without permission for a protected path redirects to the dashboard;
    /// 6. a valid token with permission continues;
    /// 7. a valid token on an unclassified path continues.
    ///
    /// Under `UnclassifiedPolicy::Deny`, unclassified paths go through rules
    /// 1, 5 and 6 as if they were protected, except `/login` itself.
    ///
    /// Rule 5 on `/dashboard` would redirect to the same page, so a token
    /// that cannot open the dashboard is sent to `/login` instead.
    pub fn evaluate(&self, credential: &Credential, path: &str) -> Verdict {
        let path = normalize_path(path);
        let class = self.routes.classify(&path);
        let guarded = match class {
            RouteClass::Protected => true,
            RouteClass::Unclassified => {
                self.unclassified == UnclassifiedPolicy::Deny && path != LOGIN_PATH
            }
            RouteClass::Public => false,
        };

        let (decision, reason) = match credential {
            Credential::Absent if guarded => {
                (Decision::RedirectToLogin, Some(DenialReason::MissingCredential))
            }
            Credential::Absent => (Decision::Continue, None),
            Credential::Malformed => (
                Decision::RedirectToLogin,
                Some(DenialReason::MalformedCredential),
            ),
            Credential::Valid(_) if class == RouteClass::Public => (
                Decision::RedirectToDashboard,
                Some(DenialReason::AlreadyAuthenticated),
            ),
            Credential::Valid(claims) if guarded => {
                match self.routes.resolve(claims.role(), &path) {
                    Permission::Allow => (Decision::Continue, None),
                    Permission::Deny if path == DASHBOARD_PATH => (
                        Decision::RedirectToLogin,
                        Some(DenialReason::NoDashboardAccess),
                    ),
                    Permission::Deny => (
                        Decision::RedirectToDashboard,
                        Some(DenialReason::InsufficientPermission),
                    ),
                }
            }
            Credential::Valid(_) => (Decision::Continue, None),
        };

        Verdict {
            decision,
            class,
            reason,
        }
    }

    /// decide
    ///
    /// Shorthand for callers that only need the outcome.
    pub fn decide(&self, credential: &Credential, path: &str) -> Decision {
        self.evaluate(credential, path).decision
    }
}
