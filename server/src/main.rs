use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use http_body_util::BodyExt;
use hyper::header::UPGRADE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::{json, Map};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::router::Router;
use server::view::{full, ResponseBody};
use server::{connection, controller, handlers, store, AppState};
use shared::types::domain::DOMAIN_ID_SYSTEM;

#[derive(Parser, Debug)]
#[command(name = "judge-server", about = "Online judge request core")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (the default when no subcommand is given).
    Serve,

    /// Problem list maintenance, straight through the controller.
    #[command(subcommand)]
    Problemlist(ProblemlistCommand),
}

#[derive(Subcommand, Debug)]
enum ProblemlistCommand {
    /// Create a list and print its id.
    Add {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        title: String,
        content: String,
        owner_uid: i64,
        /// Explicit document id; allocated when omitted.
        #[arg(long)]
        lid: Option<i64>,
    },
    Get {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        lid: i64,
    },
    Set {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        lid: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        lid: i64,
    },
    AddProblem {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        lid: i64,
        pid: i64,
    },
    DeleteProblem {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        lid: i64,
        pid: i64,
    },
    SetStar {
        #[arg(long, default_value = DOMAIN_ID_SYSTEM)]
        domain_id: String,
        lid: i64,
        uid: i64,
        star: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = shared::load_config(&cli.config)?;
    let csrf_key = config
        .auth
        .resolved_csrf_key()
        .ok_or_else(|| anyhow!("No CSRF key configured"))?;

    let pool = SqlitePoolOptions::new()
        .connect(&config.database.url)
        .await
        .context("Failed to open database")?;
    store::init_schema(&pool).await?;

    let state = AppState::new(config, pool, csrf_key);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Problemlist(cmd) => run_problemlist(&state, cmd).await,
    }
}

async fn serve(state: AppState) -> Result<()> {
    let router = Arc::new(handlers::build_router());
    let addr = state.config.server.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await.context("Accept failed")?;
        let io = TokioIo::new(stream);
        let router = router.clone();
        let state = state.clone();
        tokio::task::spawn(async move {
            let peer_addr = peer.ip().to_string();
            let service = service_fn(move |req| {
                handle(req, router.clone(), state.clone(), peer_addr.clone())
            });
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                warn!("Error serving connection: {:?}", err);
            }
        });
    }
}

/// Per-request entry: WebSocket upgrades peel off before the body is
/// buffered; everything else is collected and run through the router.
async fn handle(
    req: Request<hyper::body::Incoming>,
    router: Arc<Router>,
    state: AppState,
    peer_addr: String,
) -> Result<Response<ResponseBody>, Infallible> {
    if req.headers().contains_key(UPGRADE) {
        if let Some((page_name, params, guards, factory)) =
            router.match_connection(req.method(), req.uri().path())
        {
            let response = connection::handle_upgrade(
                req,
                state,
                page_name,
                params,
                guards,
                factory,
                Some(peer_addr),
            )
            .await;
            return Ok(response);
        }
    }

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!("Failed to read request body: {}", err);
            let mut response = Response::new(full("bad request"));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };
    Ok(router.dispatch(parts, body, state, Some(peer_addr)).await)
}

async fn run_problemlist(state: &AppState, cmd: ProblemlistCommand) -> Result<()> {
    let pool = &state.pool;
    let output = match cmd {
        ProblemlistCommand::Add {
            domain_id,
            title,
            content,
            owner_uid,
            lid,
        } => {
            let lid =
                controller::problemlist::add(pool, &domain_id, &title, &content, owner_uid, lid)
                    .await?;
            json!({ "lid": lid })
        }
        ProblemlistCommand::Get { domain_id, lid } => {
            match controller::problemlist::get(pool, &domain_id, lid).await? {
                Some(doc) => json!({
                    "domain_id": doc.domain_id,
                    "lid": doc.doc_id,
                    "owner_uid": doc.owner_uid,
                    "content": doc.content,
                    "fields": doc.fields,
                }),
                None => json!(null),
            }
        }
        ProblemlistCommand::Set {
            domain_id,
            lid,
            title,
            content,
        } => {
            let mut fields = Map::new();
            if let Some(title) = title {
                fields.insert("title".to_string(), json!(title));
            }
            if let Some(content) = content {
                fields.insert("content".to_string(), json!(content));
            }
            let doc = controller::problemlist::set(pool, &domain_id, lid, fields).await?;
            json!({ "updated": doc.is_some() })
        }
        ProblemlistCommand::Delete { domain_id, lid } => {
            let doc = controller::problemlist::delete(pool, &domain_id, lid).await?;
            json!({ "deleted": doc.is_some() })
        }
        ProblemlistCommand::AddProblem {
            domain_id,
            lid,
            pid,
        } => {
            let doc = controller::problemlist::add_problem(pool, &domain_id, lid, pid).await?;
            json!({ "updated": doc.is_some() })
        }
        ProblemlistCommand::DeleteProblem {
            domain_id,
            lid,
            pid,
        } => {
            let doc = controller::problemlist::delete_problem(pool, &domain_id, lid, pid).await?;
            json!({ "updated": doc.is_some() })
        }
        ProblemlistCommand::SetStar {
            domain_id,
            lid,
            uid,
            star,
        } => {
            let status = controller::problemlist::set_star(pool, &domain_id, lid, uid, star).await?;
            json!({ "status": status })
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
