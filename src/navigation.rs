use serde::Serialize;

use crate::models::{Profile, Role};

/// Where the guard sends viewers who may not see a page.
pub const LANDING_ROUTE: &str = "/dashboard";

/// NavigationEntry
///
/// Static descriptor of one sidebar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationEntry {
    pub label: &'static str,
    pub route: &'static str,
    pub icon: &'static str,
    pub admin_only: bool,
}

const fn entry(
    label: &'static str,
    route: &'static str,
    icon: &'static str,
    admin_only: bool,
) -> NavigationEntry {
    NavigationEntry {
        label,
        route,
        icon,
        admin_only,
    }
}

const NAVIGATION: [NavigationEntry; 7] = [
    entry("Dashboard", "/dashboard", "layout-dashboard", false),
    entry("Nodes", "/nodes", "server", false),
    entry("Routes", "/routes", "route", false),
    entry("ACLs", "/acls", "shield", false),
    entry("Pre-auth Keys", "/preauth-keys", "key", false),
    entry("Logs", "/logs", "file-text", false),
    entry("Users", "/users", "users", true),
];

/// The sidebar of the console, in display order.
pub fn default_navigation() -> &'static [NavigationEntry] {
    &NAVIGATION
}

/// visible_entries
///
/// The entries `profile` may see, in configuration order. Admin-only entries are
/// hidden unless the profile is an admin; no profile sees no admin-only entry.
pub fn visible_entries<'a>(
    entries: &'a [NavigationEntry],
    profile: Option<&Profile>,
) -> Vec<&'a NavigationEntry> {
    let is_admin = profile.is_some_and(Profile::is_admin);
    entries
        .iter()
        .filter(|entry| !entry.admin_only || is_admin)
        .collect()
}

/// guard_route
///
/// Decides whether a page requiring `required` may render for `profile`. When it may
/// not, `navigate` is called with the landing route and `false` is returned; the
/// page must render nothing further. Call it on every render: the session can
/// change under a page that has already been shown.
pub fn guard_route<F>(required: Role, profile: Option<&Profile>, navigate: F) -> bool
where
    F: FnOnce(&str),
{
    let allowed = match required {
        Role::User => true,
        Role::Admin => profile.is_some_and(Profile::is_admin),
    };

    if !allowed {
        tracing::debug!(required = required.as_str(), "route guard redirecting");
        navigate(LANDING_ROUTE);
    }
    allowed
}

/// Header title for `path`: the label of the matching entry, "Dashboard" otherwise.
pub fn page_title(path: &str) -> &'static str {
    NAVIGATION
        .iter()
        .find(|entry| entry.route == path)
        .map_or("Dashboard", |entry| entry.label)
}
