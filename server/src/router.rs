use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use bytes::Bytes;
use http::request::Parts;
use http_body_util::combinators::BoxBody;
use hyper::{header, Method, Response, StatusCode};
use serde_json::json;
use tracing::warn;

use shared::types::UserFacingError;

use crate::connection::ConnectionFactory;
use crate::context::Context;
use crate::guards::{merge_args, run_guards, sanitize, ArgSchema, ArgSource, Args, Guard};
use crate::operation::OperationTable;
use crate::view::{full, internal_error_response, translate_error, ResponseBody, View};
use crate::{headers, paths, AppState};

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Three endpoint kinds:
//
//   View        — GET pages.  Receives (view, sanitized args).
//   Operation   — POST multiplexed on the `operation` form field; each
//                 operation carries its own guards and schema.
//   Connection  — WebSocket endpoints; the upgrade path in main() owns
//                 these, the body dispatcher never runs them.

type ViewHandler = Box<
    dyn Fn(
            View,
            Args,
        )
            -> Pin<Box<dyn Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send>>
        + Send
        + Sync,
>;

enum Endpoint {
    View(ViewHandler),
    Operation(OperationTable),
    Connection(ConnectionFactory),
}

struct Route {
    name: &'static str,
    method: Method,
    pattern: &'static str,
    guards: Vec<Guard>,
    sources: &'static [ArgSource],
    schema: ArgSchema,
    endpoint: Endpoint,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------
//
// Every route registers under a name for URL reversal, and matches both
// bare (`/problemlist/:lid`, system domain) and domain-prefixed
// (`/d/:domain_id/problemlist/:lid`) forms.

pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn push(&mut self, route: Route) {
        assert!(
            !self
                .routes
                .iter()
                .any(|r| r.name == route.name && r.method == route.method),
            "route {:?} {} registered twice",
            route.name,
            route.method
        );
        paths::register_routes(&[(route.name, route.pattern)]);
        self.routes.push(route);
    }

    /// GET page view.
    pub fn get<F, Fut>(
        mut self,
        name: &'static str,
        pattern: &'static str,
        guards: &[Guard],
        schema: ArgSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(View, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.push(Route {
            name,
            method: Method::GET,
            pattern,
            guards: guards.to_vec(),
            sources: &[ArgSource::Route, ArgSource::Query],
            schema,
            endpoint: Endpoint::View(Box::new(move |view, args| Box::pin(handler(view, args)))),
        });
        self
    }

    /// POST dispatched through an operation table.  Route-level guards
    /// run before operation selection; per-operation guards after.
    pub fn post_operations(
        mut self,
        name: &'static str,
        pattern: &'static str,
        guards: &[Guard],
        operations: OperationTable,
    ) -> Self {
        self.push(Route {
            name,
            method: Method::POST,
            pattern,
            guards: guards.to_vec(),
            sources: &[ArgSource::Route, ArgSource::Query, ArgSource::Form],
            schema: &[],
            endpoint: Endpoint::Operation(operations),
        });
        self
    }

    /// WebSocket endpoint.  Dispatch happens in the upgrade path; see
    /// `match_connection`.
    pub fn connect(
        mut self,
        name: &'static str,
        pattern: &'static str,
        guards: &[Guard],
        factory: ConnectionFactory,
    ) -> Self {
        self.push(Route {
            name,
            method: Method::GET,
            pattern,
            guards: guards.to_vec(),
            sources: &[ArgSource::Route],
            schema: &[],
            endpoint: Endpoint::Connection(factory),
        });
        self
    }

    // ── Path matching ─────────────────────────────────────────────────────

    /// Match a request path against a `:param` pattern, trying the bare
    /// form first and the `/d/:domain_id` prefixed form second.
    fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
        let clean = path.split('?').next().unwrap_or(path);
        if let Some(params) = Self::match_segments(pattern, clean) {
            return Some(params);
        }
        let prefixed = if pattern == "/" {
            "/d/:domain_id".to_string()
        } else {
            format!("/d/:domain_id{}", pattern)
        };
        Self::match_segments(&prefixed, clean)
    }

    fn match_segments(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
        let pattern_segs: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let path_segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if pattern_segs.len() != path_segs.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (pattern_seg, path_seg) in pattern_segs.iter().zip(path_segs.iter()) {
            if let Some(name) = pattern_seg.strip_prefix(':') {
                params.insert(name.to_string(), path_seg.to_string());
            } else if pattern_seg != path_seg {
                return None;
            }
        }
        Some(params)
    }

    /// Find the connection route matching an upgrade request, if any.
    pub fn match_connection(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(&'static str, HashMap<String, String>, Vec<Guard>, ConnectionFactory)> {
        for route in &self.routes {
            let Endpoint::Connection(factory) = &route.endpoint else {
                continue;
            };
            if route.method != *method {
                continue;
            }
            if let Some(params) = Self::match_path(route.pattern, path) {
                return Some((route.name, params, route.guards.clone(), *factory));
            }
        }
        None
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    /// Run one buffered request through the pipeline: context, guards,
    /// argument merge + sanitize, endpoint, error translation, cookie
    /// emission.  Infrastructure failures become generic 500s; this
    /// never returns Err.
    pub async fn dispatch(
        &self,
        parts: Parts,
        body: Bytes,
        state: AppState,
        peer_addr: Option<String>,
    ) -> Response<ResponseBody> {
        let path = parts.uri.path().to_string();

        let matched = self.routes.iter().find_map(|route| {
            if route.method != parts.method {
                return None;
            }
            if matches!(route.endpoint, Endpoint::Connection(_)) {
                return None;
            }
            Self::match_path(route.pattern, &path).map(|params| (route, params))
        });
        let Some((route, mut route_params)) = matched else {
            return not_found(&parts);
        };

        let ctx = match Context::prepare(
            &state,
            &parts,
            &mut route_params,
            route.name,
            peer_addr.as_deref(),
        )
        .await
        {
            Ok(ctx) => ctx,
            Err(err) => return internal_error_response(headers::prefer_json(&parts.headers), &err),
        };
        let view = View::new(ctx);

        let result = self.run_endpoint(route, &view, &route_params, &parts, &body).await;

        let mut response = match result {
            Ok(response) => response,
            Err(err) => match err.downcast_ref::<UserFacingError>() {
                Some(user_err) => translate_error(&view, user_err)
                    .unwrap_or_else(|e| internal_error_response(view.prefer_json(), &e)),
                None => internal_error_response(view.prefer_json(), &err),
            },
        };

        if let Err(err) = view.ctx.emit_cookies(response.headers_mut()) {
            warn!("Failed to emit session cookies: {:?}", err);
        }
        response
    }

    async fn run_endpoint(
        &self,
        route: &Route,
        view: &View,
        route_params: &HashMap<String, String>,
        parts: &Parts,
        body: &Bytes,
    ) -> Result<Response<ResponseBody>> {
        // Unknown domain fails every route before guards or handlers.
        if view.ctx.domain.is_none() {
            return Err(anyhow::anyhow!(UserFacingError::DomainNotFound(
                view.ctx.domain_id.clone()
            )));
        }

        let form = parse_form(parts, body);
        let raw = merge_args(route.sources, route_params, parts.uri.query(), &form);

        run_guards(&view.ctx, &route.guards, &raw)?;

        match &route.endpoint {
            Endpoint::View(handler) => {
                let args = sanitize(route.schema, &raw)?;
                handler(view.clone(), args).await
            }
            Endpoint::Operation(table) => table.dispatch(view.clone(), &raw).await,
            Endpoint::Connection(_) => {
                let mut response = Response::new(full("websocket upgrade required"));
                *response.status_mut() = StatusCode::BAD_REQUEST;
                Ok(response)
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_form(parts: &Parts, body: &Bytes) -> HashMap<String, String> {
    let is_form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return HashMap::new();
    }
    form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn not_found(parts: &Parts) -> Response<ResponseBody> {
    let (content_type, body) = if headers::prefer_json(&parts.headers) {
        (
            "application/json",
            json!({"error": {"name": "NotFoundError", "args": [], "message": "not found"}})
                .to_string(),
        )
    } else {
        (
            "text/html; charset=utf-8",
            "<!doctype html><title>404</title><h1>Not Found</h1>".to_string(),
        )
    };
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, content_type)
        .body(full(body))
        .unwrap_or_else(|_| Response::new(full(Bytes::new())))
}
