use http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// User-facing error taxonomy
// ---------------------------------------------------------------------------
//
// These are the only errors the dispatch layer translates into a normal
// HTTP response (status + JSON body or rendered error page).  Everything
// else — store connectivity, response building, programming mistakes —
// stays an `anyhow::Error` and becomes a logged 500.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserFacingError {
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    #[error("document not found: {0}/{1}")]
    DocumentNotFound(String, i64),

    #[error("invalid credentials for {0:?}")]
    Login(String),

    #[error("permission denied: 0b{0:b}")]
    PermissionDenied(u64),

    #[error("privilege denied: 0b{0:b}")]
    PrivilegeDenied(u64),

    #[error("csrf token mismatch")]
    CsrfToken,

    #[error("invalid operation: {0:?}")]
    InvalidOperation(String),

    #[error("invalid value for argument {0:?}")]
    Validation(String),
}

impl UserFacingError {
    /// Wire name, kept stable for JSON clients.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DomainNotFound(_) => "DomainNotFoundError",
            Self::DocumentNotFound(_, _) => "DocumentNotFoundError",
            Self::Login(_) => "LoginError",
            Self::PermissionDenied(_) => "PermissionError",
            Self::PrivilegeDenied(_) => "PrivilegeError",
            Self::CsrfToken => "CsrfTokenError",
            Self::InvalidOperation(_) => "InvalidOperationError",
            Self::Validation(_) => "ValidationError",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::DomainNotFound(_) | Self::DocumentNotFound(_, _) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_)
            | Self::PrivilegeDenied(_)
            | Self::CsrfToken
            | Self::Login(_) => StatusCode::FORBIDDEN,
            Self::InvalidOperation(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Template rendered for browser clients.  One shared error page is
    /// enough for the whole taxonomy today.
    pub fn template_name(&self) -> &'static str {
        "error.html"
    }

    /// Positional arguments carried by the error, as JSON values.
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::DomainNotFound(domain_id) => vec![json!(domain_id)],
            Self::DocumentNotFound(domain_id, doc_id) => vec![json!(domain_id), json!(doc_id)],
            Self::Login(uname) => vec![json!(uname)],
            Self::PermissionDenied(perm) => vec![json!(perm)],
            Self::PrivilegeDenied(priv_bit) => vec![json!(priv_bit)],
            Self::CsrfToken => vec![],
            Self::InvalidOperation(operation) => vec![json!(operation)],
            Self::Validation(field) => vec![json!(field)],
        }
    }

    /// JSON shape sent to `Accept: application/json` clients, under the
    /// top-level `"error"` key.
    pub fn to_dict(&self) -> Value {
        json!({
            "name": self.name(),
            "args": self.args(),
            "message": self.to_string(),
        })
    }
}
