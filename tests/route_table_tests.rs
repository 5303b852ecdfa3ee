use cms_gate::{
    config::ConfigError,
    models::{Role, RouteClass},
    policy::{Permission, RouteTable, RouteTableError, RouteTableFile, normalize_path},
};
use std::{collections::HashMap, io::Write};

#[test]
fn test_normalize_path() {
    assert_eq!(normalize_path("/"), "/");
    assert_eq!(normalize_path(""), "/");
    assert_eq!(normalize_path("/posts/"), "/posts");
    assert_eq!(normalize_path("//posts///all_posts/"), "/posts/all_posts");
    assert_eq!(normalize_path("/Posts"), "/Posts");
}

#[test]
fn test_normalize_path_resolves_dot_segments() {
    assert_eq!(normalize_path("/x/../posts"), "/posts");
    assert_eq!(normalize_path("/./posts/./all_posts"), "/posts/all_posts");
    assert_eq!(normalize_path("/../../posts"), "/posts");
    assert_eq!(normalize_path("/x/%2e%2e/posts"), "/posts");
    assert_eq!(normalize_path("/x/%2E%2e/posts"), "/posts");
    assert_eq!(normalize_path("/x/.%2e/posts"), "/posts");
    assert_eq!(normalize_path("/x\\..\\posts"), "/posts");
    // Dots inside a name are not segments.
    assert_eq!(normalize_path("/posts/...x"), "/posts/...x");
}

#[test]
fn test_normalize_path_decodes_unreserved_escapes_only() {
    assert_eq!(normalize_path("/%70osts"), "/posts");
    assert_eq!(normalize_path("/posts%2fall_posts"), "/posts%2Fall_posts");
    assert_eq!(normalize_path("/a%20b"), "/a%20b");
    assert_eq!(normalize_path("/100%"), "/100%25");

    for raw in ["/%%37%30osts", "/x/%2e%2e/posts", "/a%zz/b", "/100%"] {
        let once = normalize_path(raw);
        assert_eq!(normalize_path(&once), once, "{raw}");
    }
}

#[test]
fn test_default_classification() {
    let routes = RouteTable::cms_defaults();
    assert_eq!(routes.classify("/login"), RouteClass::Public);
    assert_eq!(routes.classify("/register/"), RouteClass::Public);
    assert_eq!(routes.classify("/dashboard"), RouteClass::Protected);
    assert_eq!(routes.classify("/page-builder"), RouteClass::Protected);
    // Exact matching only: no prefix inheritance.
    assert_eq!(routes.classify("/posts/42"), RouteClass::Unclassified);
    assert_eq!(routes.classify("/"), RouteClass::Unclassified);
}

#[test]
fn test_resolver_denies_missing_role() {
    let routes = RouteTable::cms_defaults();
    assert_eq!(routes.resolve(None, "/dashboard"), Permission::Deny);
    assert_eq!(routes.resolve(Some(Role::Employee), "/dashboard"), Permission::Allow);
    assert_eq!(routes.resolve(Some(Role::Employee), "/seo"), Permission::Deny);
}

#[test]
fn test_resolver_denies_role_absent_from_table() {
    let routes = RouteTable::new(
        vec!["/login"],
        vec!["/dashboard"],
        vec![(Role::Admin, vec!["/dashboard"])],
    )
    .unwrap();
    assert_eq!(routes.resolve(Some(Role::Admin), "/dashboard"), Permission::Allow);
    assert_eq!(routes.resolve(Some(Role::SuperAdmin), "/dashboard"), Permission::Deny);
    assert!(routes.navigation(Role::SuperAdmin).is_empty());
}

#[test]
fn test_default_table_is_consistent() {
    // Rebuilding the defaults through the validating constructor must pass.
    let routes = RouteTable::cms_defaults();
    let allowed = Role::ALL.map(|role| (role, routes.navigation(role)));
    let protected = routes.navigation(Role::SuperAdmin);
    let rebuilt = RouteTable::new(
        vec!["/login".to_string()],
        protected.clone(),
        allowed,
    );
    assert!(rebuilt.is_ok());
    assert_eq!(protected.len(), 18);
}

#[test]
fn test_navigation_per_role() {
    let routes = RouteTable::cms_defaults();
    let employee = routes.navigation(Role::Employee);
    assert_eq!(
        employee,
        vec![
            "/dashboard",
            "/posts",
            "/posts/all_posts",
            "/posts/create_post",
            "/profile",
            "/tags",
            "/tags/all_tags",
        ]
    );

    let admin = routes.navigation(Role::Admin);
    assert!(admin.contains(&"/categories/all_categories".to_string()));
    assert!(!admin.contains(&"/users/create_user".to_string()));
}

#[test]
fn test_navigation_skips_unprotected_entries() {
    let routes = RouteTable::new(
        Vec::<&str>::new(),
        vec!["/dashboard"],
        vec![(Role::Employee, vec!["/dashboard", "/help"])],
    )
    .unwrap();
    assert_eq!(routes.navigation(Role::Employee), vec!["/dashboard"]);
}

// --- Validation ---

#[test]
fn test_unreachable_protected_route_is_rejected() {
    let result = RouteTable::new(
        vec!["/login"],
        vec!["/dashboard", "/secret"],
        vec![(Role::SuperAdmin, vec!["/dashboard"])],
    );
    assert_eq!(
        result.unwrap_err(),
        RouteTableError::UnreachableRoute("/secret".to_string())
    );
}

#[test]
fn test_public_protected_overlap_is_rejected() {
    let result = RouteTable::new(
        vec!["/login", "/dashboard/"],
        vec!["/dashboard"],
        vec![(Role::Admin, vec!["/dashboard"])],
    );
    assert_eq!(
        result.unwrap_err(),
        RouteTableError::Overlap("/dashboard".to_string())
    );
}

#[test]
fn test_relative_path_is_rejected() {
    let result = RouteTable::new(
        vec!["login"],
        Vec::<&str>::new(),
        Vec::<(Role, Vec<&str>)>::new(),
    );
    assert_eq!(
        result.unwrap_err(),
        RouteTableError::InvalidPath("login".to_string())
    );
}

#[test]
fn test_protected_login_is_rejected() {
    let result = RouteTable::new(
        Vec::<&str>::new(),
        vec!["/login", "/dashboard"],
        vec![(Role::Admin, vec!["/login", "/dashboard"])],
    );
    assert_eq!(
        result.unwrap_err(),
        RouteTableError::ProtectedLogin("/login".to_string())
    );
}

#[test]
fn test_public_dashboard_is_rejected() {
    let result = RouteTable::new(
        vec!["/login", "/dashboard"],
        Vec::<&str>::new(),
        Vec::<(Role, Vec<&str>)>::new(),
    );
    assert_eq!(
        result.unwrap_err(),
        RouteTableError::PublicDashboard("/dashboard".to_string())
    );
}

#[test]
fn test_role_without_dashboard_is_rejected() {
    let result = RouteTable::new(
        vec!["/login"],
        vec!["/dashboard", "/reports"],
        vec![
            (Role::Admin, vec!["/dashboard", "/reports"]),
            (Role::Employee, vec!["/reports"]),
        ],
    );
    assert_eq!(
        result.unwrap_err(),
        RouteTableError::DashboardDenied(Role::Employee)
    );
}

#[test]
fn test_route_file_rejects_unknown_role() {
    let file = RouteTableFile {
        public: vec!["/login".into()],
        protected: vec!["/dashboard".into()],
        roles: HashMap::from([("INTERN".to_string(), vec!["/dashboard".to_string()])]),
    };
    assert_eq!(
        RouteTable::from_file(file).unwrap_err(),
        RouteTableError::UnknownRole("INTERN".to_string())
    );
}

// --- JSON files ---

#[test]
fn test_load_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "public": ["/login"],
            "protected": ["/dashboard", "/posts"],
            "roles": {{
                "ADMIN": ["/dashboard", "/posts"],
                "employee": ["/dashboard"]
            }}
        }}"#
    )
    .unwrap();

    let routes = RouteTable::load_json(file.path()).unwrap();
    assert_eq!(routes.classify("/posts"), RouteClass::Protected);
    assert_eq!(routes.resolve(Some(Role::Employee), "/posts"), Permission::Deny);
    assert_eq!(routes.resolve(Some(Role::Admin), "/posts"), Permission::Allow);
}

#[test]
fn test_load_json_reports_invalid_table() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "public": [], "protected": ["/orphan"], "roles": {{}} }}"#
    )
    .unwrap();

    let err = RouteTable::load_json(file.path()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::RouteTable(RouteTableError::UnreachableRoute(_))
    ));
}

#[test]
fn test_load_json_reports_bad_syntax_and_missing_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();
    assert!(matches!(
        RouteTable::load_json(file.path()).unwrap_err(),
        ConfigError::RouteFileFormat { .. }
    ));

    assert!(matches!(
        RouteTable::load_json("/definitely/not/here.json").unwrap_err(),
        ConfigError::RouteFile { .. }
    ));
}
