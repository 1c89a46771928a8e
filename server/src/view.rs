use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{header, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use shared::types::UserFacingError;

use crate::context::Context;

pub type ResponseBody = BoxBody<Bytes, Infallible>;

pub fn full<T: Into<Bytes>>(body: T) -> ResponseBody {
    Full::new(body.into()).boxed()
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------
//
// A cheap handle handlers receive: the request context plus response
// construction (HTML render, JSON, redirects, content negotiation).
// Cloning shares the context.

#[derive(Clone)]
pub struct View {
    pub ctx: Arc<Context>,
}

impl View {
    pub fn new(ctx: Context) -> Self {
        View { ctx: Arc::new(ctx) }
    }

    pub fn prefer_json(&self) -> bool {
        self.ctx.prefer_json
    }

    /// Render a template to an HTML response.  The render namespace is
    /// the domain context + locale strings + shared UI bindings +
    /// explicit locals, later entries winning.
    pub fn render(
        &self,
        template_name: &str,
        page_title: &str,
        locals: Map<String, Value>,
    ) -> Result<Response<ResponseBody>> {
        self.render_with_status(StatusCode::OK, template_name, page_title, locals)
    }

    pub fn render_with_status(
        &self,
        status: StatusCode,
        template_name: &str,
        page_title: &str,
        locals: Map<String, Value>,
    ) -> Result<Response<ResponseBody>> {
        let mut bindings = Map::new();
        bindings.insert("domain_id".into(), json!(self.ctx.domain_id));
        bindings.insert("page_name".into(), json!(self.ctx.paths.page_name));
        bindings.insert("page_title".into(), json!(page_title));
        bindings.insert(
            "path_components".into(),
            json!(self.ctx.paths.path_components()),
        );
        if let Value::Object(ui) = self.ctx.ui_context() {
            bindings.extend(ui);
        }
        bindings.extend(locals);

        let html = render_template(&self.ctx.state.config.paths.templates_dir, template_name, &bindings);

        let response = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(full(html))
            .map_err(|e| anyhow!("Failed to build HTML response: {}", e))?;
        Ok(response)
    }

    /// Serialize a value and deliver it as a JSON response.
    pub fn json<T: serde::Serialize>(&self, value: &T) -> Result<Response<ResponseBody>> {
        self.json_with_status(StatusCode::OK, value)
    }

    pub fn json_with_status<T: serde::Serialize>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> Result<Response<ResponseBody>> {
        let body = serde_json::to_string(value).context("Failed to serialize response")?;
        let response = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(full(body))
            .map_err(|e| anyhow!("Failed to build JSON response: {}", e))?;
        Ok(response)
    }

    /// 302 redirect: `Location` header, no body.
    pub fn redirect(&self, url: &str) -> Result<Response<ResponseBody>> {
        let response = Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, url)
            .body(full(Bytes::new()))
            .map_err(|e| anyhow!("Failed to build redirect response: {}", e))?;
        Ok(response)
    }

    /// JSON clients get `kwargs` as the body; browsers get a redirect.
    pub fn json_or_redirect(
        &self,
        url: &str,
        kwargs: Map<String, Value>,
    ) -> Result<Response<ResponseBody>> {
        if self.prefer_json() {
            self.json(&Value::Object(kwargs))
        } else {
            self.redirect(url)
        }
    }

    /// The `Referer` header, falling back to the domain main page.
    pub fn referer_or_main(&self) -> String {
        self.ctx
            .request_referer
            .clone()
            .unwrap_or_else(|| self.ctx.reverse_url("main", &[]))
    }
}

// ---------------------------------------------------------------------------
// Error translation
// ---------------------------------------------------------------------------

/// Translate a user-facing error into a response for a prepared view:
/// JSON envelope or rendered error page, status from the error.
pub fn translate_error(view: &View, err: &UserFacingError) -> Result<Response<ResponseBody>> {
    warn!("User facing error: {:?}", err);
    if view.prefer_json() {
        view.json_with_status(err.http_status(), &json!({ "error": err.to_dict() }))
    } else {
        let mut locals = Map::new();
        locals.insert("error".into(), err.to_dict());
        locals.insert(
            "path_components".into(),
            json!(view.ctx.build_path(&[("error".to_string(), None)])),
        );
        locals.insert("page_name".into(), json!("error"));
        view.render_with_status(
            err.http_status(),
            err.template_name(),
            view.ctx.locale.tr("error"),
            locals,
        )
    }
}

/// Response for everything outside the user-facing taxonomy: logged at
/// error severity, generic 500, no internals leaked.
pub fn internal_error_response(prefer_json: bool, err: &anyhow::Error) -> Response<ResponseBody> {
    error!("Unhandled error: {:?}", err);
    let (content_type, body) = if prefer_json {
        (
            "application/json",
            json!({"error": {"name": "InternalServerError", "args": [], "message": "internal server error"}})
                .to_string(),
        )
    } else {
        (
            "text/html; charset=utf-8",
            "<!doctype html><title>500</title><h1>Internal Server Error</h1>".to_string(),
        )
    };
    // Infallible builder inputs; fall back to a bare response if not.
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, content_type)
        .body(full(body))
        .unwrap_or_else(|_| Response::new(full(Bytes::new())))
}

// ---------------------------------------------------------------------------
// Template pass
// ---------------------------------------------------------------------------
//
// The real template engine is an external collaborator.  This is a thin
// `{{ key }}` substitution over files in the configured templates
// directory, with a builtin page when the file is missing so error
// translation always produces *something*.

fn render_template(templates_dir: &str, template_name: &str, bindings: &Map<String, Value>) -> String {
    let source = std::fs::read_to_string(format!("{}/{}", templates_dir, template_name))
        .unwrap_or_else(|_| builtin_page().to_string());
    substitute(&source, bindings)
}

fn builtin_page() -> &'static str {
    "<!doctype html>\n<html><head><title>{{ page_title }}</title></head>\n\
     <body><h1>{{ page_title }}</h1><pre>{{ __bindings__ }}</pre></body></html>\n"
}

fn substitute(source: &str, bindings: &Map<String, Value>) -> String {
    let mut out = source.to_string();
    for (key, value) in bindings {
        let needle = format!("{{{{ {} }}}}", key);
        if !out.contains(&needle) {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&needle, &rendered);
    }
    if out.contains("{{ __bindings__ }}") {
        let dump = serde_json::to_string_pretty(bindings).unwrap_or_default();
        out = out.replace("{{ __bindings__ }}", &dump);
    }
    out
}
