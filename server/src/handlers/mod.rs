pub mod auth;
pub mod home;
pub mod problemlist;

use shared::types::domain::{PERM_EDIT_PROBLEM_LIST, PERM_VIEW, PERM_VIEW_PROBLEM_LIST};
use shared::types::user::PRIV_USER_PROFILE;

use crate::guards::{ArgKind, Guard};
use crate::operation::OperationTable;
use crate::router::Router;

/// Assemble the full routing table.  Runs at startup; any wiring
/// mistake (duplicate names, conflicting patterns) panics here, before
/// the listener binds.
pub fn build_router() -> Router {
    Router::new()
        .get("main", "/", &[Guard::Perm(PERM_VIEW)], &[], home::main_view)
        .get("login", "/login", &[], &[], auth::login_view)
        .post_operations(
            "login",
            "/login",
            &[],
            OperationTable::new().operation(
                "login",
                &[Guard::Csrf],
                &[
                    ("uname", ArgKind::Str),
                    ("password", ArgKind::Str),
                    ("remember_me", ArgKind::Bool),
                ],
                auth::login,
            ),
        )
        .post_operations(
            "logout",
            "/logout",
            &[],
            OperationTable::new().operation("logout", &[Guard::Csrf], &[], auth::logout),
        )
        .get(
            "problem_list_detail",
            "/problemlist/:lid",
            &[Guard::Perm(PERM_VIEW_PROBLEM_LIST)],
            &[("lid", ArgKind::DocId)],
            problemlist::detail_view,
        )
        .post_operations(
            "problem_list_detail",
            "/problemlist/:lid",
            &[Guard::Perm(PERM_VIEW_PROBLEM_LIST)],
            OperationTable::new()
                .operation(
                    "add_problem",
                    &[Guard::Csrf, Guard::Perm(PERM_EDIT_PROBLEM_LIST)],
                    &[("lid", ArgKind::DocId), ("pid", ArgKind::DocId)],
                    problemlist::add_problem,
                )
                .operation(
                    "delete_problem",
                    &[Guard::Csrf, Guard::Perm(PERM_EDIT_PROBLEM_LIST)],
                    &[("lid", ArgKind::DocId), ("pid", ArgKind::DocId)],
                    problemlist::delete_problem,
                )
                .operation(
                    "set_star",
                    &[Guard::Csrf, Guard::Priv(PRIV_USER_PROFILE)],
                    &[("lid", ArgKind::DocId), ("star", ArgKind::Bool)],
                    problemlist::set_star,
                ),
        )
        .connect(
            "problem_list_conn",
            "/problemlist-conn",
            &[Guard::Perm(PERM_VIEW_PROBLEM_LIST)],
            problemlist::connection_factory,
        )
}
