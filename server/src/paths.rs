use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::warn;

use shared::types::domain::DOMAIN_ID_SYSTEM;

// ---------------------------------------------------------------------------
// URL reversal and breadcrumb paths
// ---------------------------------------------------------------------------
//
// Every route registers under a name; reversal substitutes `:param`
// segments and prefixes `/d/<domain_id>` for non-system domains.  The
// per-(page, domain) helpers are pure values cached process-wide —
// key cardinality is route count x domain count, growth is accepted.

fn route_table() -> &'static RwLock<HashMap<&'static str, &'static str>> {
    static TABLE: OnceLock<RwLock<HashMap<&'static str, &'static str>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register named route patterns for reversal.  Called once from router
/// construction; re-registering a name with a different pattern is a
/// startup bug and panics.
pub fn register_routes(routes: &[(&'static str, &'static str)]) {
    if let Ok(mut table) = route_table().write() {
        for (name, pattern) in routes {
            if let Some(existing) = table.insert(name, pattern) {
                assert_eq!(
                    existing, *pattern,
                    "route name {:?} registered with conflicting patterns",
                    name
                );
            }
        }
    }
}

/// Build the URL for a named route in a domain, substituting `:param`
/// segments from `params`.
pub fn reverse_url(name: &str, domain_id: &str, params: &[(&str, &str)]) -> String {
    let pattern = route_table()
        .read()
        .ok()
        .and_then(|t| t.get(name).copied());
    let Some(pattern) = pattern else {
        warn!("reverse_url: unknown route name {:?}", name);
        return "/".to_string();
    };

    let mut path = String::new();
    if domain_id != DOMAIN_ID_SYSTEM {
        path.push_str("/d/");
        path.push_str(domain_id);
    }
    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        path.push('/');
        if let Some(param) = segment.strip_prefix(':') {
            match params.iter().find(|(k, _)| *k == param) {
                Some((_, v)) => path.push_str(v),
                None => {
                    warn!("reverse_url: missing param {:?} for route {:?}", param, name);
                    path.push_str(segment);
                }
            }
        } else {
            path.push_str(segment);
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

// ---------------------------------------------------------------------------
// Domain-scoped path helpers
// ---------------------------------------------------------------------------

/// Breadcrumb entry: display name plus an optional link target.
pub type PathComponent = (String, Option<String>);

#[derive(Debug)]
pub struct DomainPaths {
    pub domain_id: String,
    pub page_name: &'static str,
}

impl DomainPaths {
    /// URL reversal scoped to this domain.
    pub fn reverse_url(&self, name: &str, params: &[(&str, &str)]) -> String {
        reverse_url(name, &self.domain_id, params)
    }

    /// Breadcrumbs: the domain main page first, then the given tail.
    pub fn build_path(&self, tail: &[PathComponent]) -> Vec<PathComponent> {
        let mut path = vec![(
            self.domain_id.clone(),
            Some(self.reverse_url("main", &[])),
        )];
        path.extend(tail.iter().cloned());
        path
    }

    /// Default breadcrumbs for the page itself.
    pub fn path_components(&self) -> Vec<PathComponent> {
        self.build_path(&[(self.page_name.to_string(), None)])
    }
}

fn paths_cache() -> &'static RwLock<HashMap<(&'static str, String), Arc<DomainPaths>>> {
    static CACHE: OnceLock<RwLock<HashMap<(&'static str, String), Arc<DomainPaths>>>> =
        OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get (or build and cache) the path helpers for a (page, domain) pair.
pub fn domain_paths(page_name: &'static str, domain_id: &str) -> Arc<DomainPaths> {
    let key = (page_name, domain_id.to_string());
    if let Ok(cache) = paths_cache().read() {
        if let Some(paths) = cache.get(&key) {
            return paths.clone();
        }
    }
    let paths = Arc::new(DomainPaths {
        domain_id: domain_id.to_string(),
        page_name,
    });
    if let Ok(mut cache) = paths_cache().write() {
        cache.insert(key, paths.clone());
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_test_routes() {
        register_routes(&[
            ("main", "/"),
            ("problem_list_detail", "/problemlist/:lid"),
        ]);
    }

    #[test]
    fn system_domain_has_no_prefix() {
        register_test_routes();
        assert_eq!(
            reverse_url("problem_list_detail", DOMAIN_ID_SYSTEM, &[("lid", "3")]),
            "/problemlist/3"
        );
    }

    #[test]
    fn other_domains_get_d_prefix() {
        register_test_routes();
        assert_eq!(
            reverse_url("problem_list_detail", "numeric", &[("lid", "3")]),
            "/d/numeric/problemlist/3"
        );
    }

    #[test]
    fn main_route_reverses_to_root() {
        register_test_routes();
        assert_eq!(reverse_url("main", DOMAIN_ID_SYSTEM, &[]), "/");
        assert_eq!(reverse_url("main", "numeric", &[]), "/d/numeric");
    }

    #[test]
    fn unknown_route_falls_back_to_root() {
        assert_eq!(reverse_url("no_such_route", DOMAIN_ID_SYSTEM, &[]), "/");
    }

    #[test]
    fn build_path_starts_with_domain_main() {
        register_test_routes();
        let paths = domain_paths("problem_list", "numeric");
        let components = paths.path_components();
        assert_eq!(components[0].0, "numeric");
        assert_eq!(components[0].1.as_deref(), Some("/d/numeric"));
        assert_eq!(components[1], ("problem_list".to_string(), None));
    }

    #[test]
    fn domain_paths_are_cached() {
        register_test_routes();
        let a = domain_paths("main", "numeric");
        let b = domain_paths("main", "numeric");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
