use headscale_admin::{
    models::{Profile, Role},
    navigation::{LANDING_ROUTE, default_navigation, guard_route, page_title, visible_entries},
};

fn profile(role: Role) -> Profile {
    Profile {
        username: "someone".to_string(),
        role,
        is_active: true,
        ..Profile::default()
    }
}

fn guard(required: Role, profile: Option<&Profile>) -> (bool, Option<String>) {
    let mut target = None;
    let allowed = guard_route(required, profile, |to| target = Some(to.to_string()));
    (allowed, target)
}

// --- visible_entries ---

#[test]
fn test_non_admin_sees_no_admin_entries() {
    let user = profile(Role::User);
    let entries = visible_entries(default_navigation(), Some(&user));

    assert!(entries.iter().all(|e| !e.admin_only));
    assert_eq!(entries.len(), 6);
}

#[test]
fn test_admin_sees_every_entry_in_order() {
    let admin = profile(Role::Admin);
    let entries = visible_entries(default_navigation(), Some(&admin));

    let routes: Vec<&str> = entries.iter().map(|e| e.route).collect();
    assert_eq!(
        routes,
        vec![
            "/dashboard",
            "/nodes",
            "/routes",
            "/acls",
            "/preauth-keys",
            "/logs",
            "/users"
        ]
    );
}

#[test]
fn test_missing_profile_sees_no_admin_entries() {
    let entries = visible_entries(default_navigation(), None);
    assert!(entries.iter().all(|e| !e.admin_only));
}

#[test]
fn test_visible_entries_preserves_custom_order() {
    let all = default_navigation();
    let reversed: Vec<_> = all.iter().rev().cloned().collect();
    let user = profile(Role::User);

    let entries = visible_entries(&reversed, Some(&user));

    assert_eq!(entries.first().map(|e| e.route), Some("/logs"));
    assert_eq!(entries.last().map(|e| e.route), Some("/dashboard"));
}

// --- guard_route ---

#[test]
fn test_guard_redirects_user_from_admin_route() {
    let user = profile(Role::User);
    let (allowed, target) = guard(Role::Admin, Some(&user));

    assert!(!allowed);
    assert_eq!(target.as_deref(), Some(LANDING_ROUTE));
}

#[test]
fn test_guard_lets_admin_through() {
    let admin = profile(Role::Admin);
    let (allowed, target) = guard(Role::Admin, Some(&admin));

    assert!(allowed);
    assert!(target.is_none());
}

#[test]
fn test_guard_redirects_when_profile_missing() {
    let (allowed, target) = guard(Role::Admin, None);

    assert!(!allowed);
    assert_eq!(target.as_deref(), Some("/dashboard"));
}

#[test]
fn test_user_routes_always_render() {
    assert!(guard(Role::User, None).0);
    assert!(guard(Role::User, Some(&profile(Role::User))).0);
    assert!(guard(Role::User, Some(&profile(Role::Admin))).0);
}

// --- page_title ---

#[test]
fn test_page_title_uses_entry_label() {
    assert_eq!(page_title("/preauth-keys"), "Pre-auth Keys");
    assert_eq!(page_title("/users"), "Users");
}

#[test]
fn test_page_title_defaults_to_dashboard() {
    assert_eq!(page_title("/settings"), "Dashboard");
    assert_eq!(page_title("/"), "Dashboard");
}
