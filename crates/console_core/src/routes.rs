/// A dashboard path bound to its template resource and controller name. The
/// template itself is external; this layer only hands out the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub template: &'static str,
    pub controller: &'static str,
}

pub const DEFAULT_PATH: &str = "/";

// First entry is the index route and doubles as the fallback target.
const ROUTES: &[Route] = &[Route {
    path: DEFAULT_PATH,
    template: "/static/html/instance/index.html",
    controller: "index",
}];

pub fn routes() -> &'static [Route] {
    ROUTES
}

/// Unmatched paths redirect to the index route.
pub fn resolve(path: &str) -> &'static Route {
    ROUTES
        .iter()
        .find(|route| route.path == path)
        .unwrap_or(&ROUTES[0])
}
