use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::Response;
use tracing::debug;

use shared::types::UserFacingError;

use crate::guards::{run_guards, sanitize, ArgSchema, Args, Guard, RawArgs};
use crate::view::View;

// ---------------------------------------------------------------------------
// Operation table
// ---------------------------------------------------------------------------
//
// A POST endpoint that multiplexes on the `operation` form field.  The
// table is explicit and built at startup; registering the same name
// twice is a wiring bug and panics before the server accepts traffic.
// Missing or unknown operations are user errors, not panics.

type OperationHandler = Box<
    dyn Fn(
            View,
            Args,
        )
            -> Pin<Box<dyn Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send>>
        + Send
        + Sync,
>;

struct Operation {
    guards: Vec<Guard>,
    schema: ArgSchema,
    handler: OperationHandler,
}

pub struct OperationTable {
    operations: HashMap<&'static str, Operation>,
}

impl std::fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTable")
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperationTable {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Register one operation.  Guards run after the route-level guards,
    /// so per-operation permissions stack on top of the view's own.
    pub fn operation<F, Fut>(
        mut self,
        name: &'static str,
        guards: &[Guard],
        schema: ArgSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(View, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        let previous = self.operations.insert(
            name,
            Operation {
                guards: guards.to_vec(),
                schema,
                handler: Box::new(move |view, args| Box::pin(handler(view, args))),
            },
        );
        assert!(
            previous.is_none(),
            "operation {:?} registered twice",
            name
        );
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.operations.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Select and run the operation named by the `operation` argument.
    pub async fn dispatch(
        &self,
        view: View,
        raw: &RawArgs,
    ) -> Result<Response<BoxBody<Bytes, Infallible>>> {
        let name = raw
            .get("operation")
            .map(String::as_str)
            .unwrap_or_default();
        let Some(operation) = self.operations.get(name) else {
            return Err(anyhow!(UserFacingError::InvalidOperation(name.to_string())));
        };
        debug!("Dispatching operation {:?}", name);

        run_guards(&view.ctx, &operation.guards, raw)?;
        let args = sanitize(operation.schema, raw)?;
        (operation.handler)(view, args).await
    }
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_panics() {
        let result = std::panic::catch_unwind(|| {
            OperationTable::new()
                .operation("set_star", &[], &[], |view: View, _| async move {
                    view.json(&serde_json::json!({}))
                })
                .operation("set_star", &[], &[], |view: View, _| async move {
                    view.json(&serde_json::json!({}))
                });
        });
        assert!(result.is_err());
    }

    #[test]
    fn names_are_sorted() {
        let table = OperationTable::new()
            .operation("set_star", &[], &[], |view: View, _| async move {
                view.json(&serde_json::json!({}))
            })
            .operation("add_problem", &[], &[], |view: View, _| async move {
                view.json(&serde_json::json!({}))
            });
        assert_eq!(table.names(), vec!["add_problem", "set_star"]);
    }
}
