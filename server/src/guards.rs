use std::collections::HashMap;

use anyhow::{anyhow, Result};
use tracing::warn;

use shared::types::UserFacingError;

use crate::context::Context;

// ---------------------------------------------------------------------------
// Request guards
// ---------------------------------------------------------------------------
//
// Guards run between context construction and the handler, in the order
// they are listed on the route.  They raise taxonomy errors; they never
// render output themselves.

#[derive(Debug, Clone, Copy)]
pub enum Guard {
    /// Domain-scoped permission bit(s).
    Perm(u64),
    /// Global privilege bit(s).
    Priv(u64),
    /// Compare the supplied `csrf_token` argument against the derived
    /// token.  Vacuously satisfied without a session: CSRF protection
    /// is tied to session existence.
    Csrf,
}

pub fn run_guards(ctx: &Context, guards: &[Guard], args: &RawArgs) -> Result<()> {
    for guard in guards {
        match guard {
            Guard::Perm(perm) => ctx.check_perm(*perm)?,
            Guard::Priv(priv_bit) => ctx.check_priv(*priv_bit)?,
            Guard::Csrf => {
                let expected = ctx.csrf_token();
                let supplied = args.get("csrf_token").map(String::as_str).unwrap_or("");
                if !expected.is_empty() && supplied != expected {
                    warn!("CSRF token mismatch");
                    return Err(anyhow!(UserFacingError::CsrfToken));
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Argument sources
// ---------------------------------------------------------------------------

/// Where a route pulls handler arguments from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSource {
    Route,
    Query,
    Form,
}

pub type RawArgs = HashMap<String, String>;

/// Merge the requested sources into one argument map.
///
/// Collision precedence is fixed: route > query > form.  Route bindings
/// are part of the URL contract and must not be overridable from the
/// query string or body.
pub fn merge_args(
    sources: &[ArgSource],
    route_params: &HashMap<String, String>,
    query: Option<&str>,
    form: &HashMap<String, String>,
) -> RawArgs {
    let mut args = RawArgs::new();
    if sources.contains(&ArgSource::Form) {
        for (k, v) in form {
            args.insert(k.clone(), v.clone());
        }
    }
    if sources.contains(&ArgSource::Query) {
        if let Some(query) = query {
            for (k, v) in form_urlencoded::parse(query.as_bytes()) {
                args.insert(k.into_owned(), v.into_owned());
            }
        }
    }
    if sources.contains(&ArgSource::Route) {
        for (k, v) in route_params {
            args.insert(k.clone(), v.clone());
        }
    }
    args
}

// ---------------------------------------------------------------------------
// Sanitize: explicit per-argument schema
// ---------------------------------------------------------------------------
//
// Every argument a handler accepts must be declared.  An undeclared
// incoming name is a configuration error (500), never silently passed
// through; a value that fails its conversion is a ValidationError (400).

#[derive(Debug, Clone, Copy)]
pub enum ArgKind {
    Str,
    Int,
    Bool,
    /// Document id within a domain/type namespace.
    DocId,
}

pub type ArgSchema = &'static [(&'static str, ArgKind)];

/// Arguments consumed by the framework itself, exempt from schemas.
const FRAMEWORK_ARGS: &[&str] = &["csrf_token", "operation"];

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Default)]
pub struct Args(HashMap<String, ArgValue>);

impl Args {
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ArgValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Required-argument accessors: absence is a ValidationError.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.get_str(name)
            .ok_or_else(|| anyhow!(UserFacingError::Validation(name.to_string())))
    }

    pub fn require_i64(&self, name: &str) -> Result<i64> {
        self.get_i64(name)
            .ok_or_else(|| anyhow!(UserFacingError::Validation(name.to_string())))
    }

    pub fn require_bool(&self, name: &str) -> Result<bool> {
        self.get_bool(name)
            .ok_or_else(|| anyhow!(UserFacingError::Validation(name.to_string())))
    }
}

/// Coerce raw arguments through the route's schema.
pub fn sanitize(schema: ArgSchema, raw: &RawArgs) -> Result<Args> {
    let mut out = HashMap::new();
    for (name, value) in raw {
        if FRAMEWORK_ARGS.contains(&name.as_str()) {
            continue;
        }
        let Some((_, kind)) = schema.iter().find(|(n, _)| n == name) else {
            // Fail closed: accepting undeclared arguments silently is how
            // the implicit-annotation bug class starts.
            return Err(anyhow!(
                "argument {:?} not declared in route schema",
                name
            ));
        };
        let converted = match kind {
            ArgKind::Str => ArgValue::Str(value.clone()),
            ArgKind::Int | ArgKind::DocId => ArgValue::Int(
                value
                    .parse::<i64>()
                    .map_err(|_| anyhow!(UserFacingError::Validation(name.clone())))?,
            ),
            ArgKind::Bool => ArgValue::Bool(parse_bool(value)),
        };
        out.insert(name.clone(), converted);
    }
    Ok(Args(out))
}

// Checkbox semantics: anything but an explicit negative counts as set.
fn parse_bool(value: &str) -> bool {
    !matches!(value, "" | "0" | "false" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_beats_query_beats_form() {
        let mut route = HashMap::new();
        route.insert("lid".to_string(), "1".to_string());
        let mut form = HashMap::new();
        form.insert("lid".to_string(), "3".to_string());
        form.insert("title".to_string(), "from form".to_string());

        let args = merge_args(
            &[ArgSource::Route, ArgSource::Query, ArgSource::Form],
            &route,
            Some("lid=2&star=true"),
            &form,
        );
        assert_eq!(args.get("lid").map(String::as_str), Some("1"));
        assert_eq!(args.get("star").map(String::as_str), Some("true"));
        assert_eq!(args.get("title").map(String::as_str), Some("from form"));
    }

    #[test]
    fn unlisted_sources_are_ignored() {
        let mut form = HashMap::new();
        form.insert("title".to_string(), "x".to_string());
        let args = merge_args(&[ArgSource::Route], &HashMap::new(), Some("a=1"), &form);
        assert!(args.is_empty());
    }

    #[test]
    fn sanitize_converts_declared_arguments() {
        const SCHEMA: ArgSchema = &[("lid", ArgKind::DocId), ("star", ArgKind::Bool)];
        let mut raw = RawArgs::new();
        raw.insert("lid".to_string(), "42".to_string());
        raw.insert("star".to_string(), "true".to_string());
        let args = sanitize(SCHEMA, &raw).unwrap();
        assert_eq!(args.get_i64("lid"), Some(42));
        assert_eq!(args.get_bool("star"), Some(true));
    }

    #[test]
    fn sanitize_fails_closed_on_undeclared_argument() {
        const SCHEMA: ArgSchema = &[("lid", ArgKind::DocId)];
        let mut raw = RawArgs::new();
        raw.insert("sneaky".to_string(), "x".to_string());
        let err = sanitize(SCHEMA, &raw).unwrap_err();
        // Configuration error, not a user-facing one.
        assert!(err.downcast_ref::<UserFacingError>().is_none());
    }

    #[test]
    fn sanitize_rejects_bad_int_as_validation_error() {
        const SCHEMA: ArgSchema = &[("lid", ArgKind::DocId)];
        let mut raw = RawArgs::new();
        raw.insert("lid".to_string(), "not-a-number".to_string());
        let err = sanitize(SCHEMA, &raw).unwrap_err();
        assert_eq!(
            err.downcast_ref::<UserFacingError>(),
            Some(&UserFacingError::Validation("lid".to_string()))
        );
    }

    #[test]
    fn framework_arguments_bypass_schema() {
        const SCHEMA: ArgSchema = &[];
        let mut raw = RawArgs::new();
        raw.insert("csrf_token".to_string(), "abc".to_string());
        raw.insert("operation".to_string(), "set_star".to_string());
        assert!(sanitize(SCHEMA, &raw).is_ok());
    }

    #[test]
    fn checkbox_bool_parsing() {
        assert!(parse_bool("true"));
        assert!(parse_bool("on"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}
