use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{SubsecRound, Utc};
use hwboard_api::{AuthToken, Time, User, Uuid};
use sqlx::migrate::Migrator;

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;

pub use error::Error;
use extractors::*;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Maximum number of database connections
    #[structopt(long, default_value = "8")]
    max_connections: u32,
}

/// The current time, at the precision the database stores
pub fn now() -> Time {
    Utc::now().trunc_subsecs(6)
}

pub async fn create_sqlx_pool(url: &str) -> anyhow::Result<PgPool> {
    create_sqlx_pool_with(url, 8).await
}

async fn create_sqlx_pool_with(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    Ok(PgPool::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("Error opening database {url:?}"))?,
    ))
}

pub async fn app(db: PgPool, admin_token: Option<AuthToken>) -> Router {
    Router::new()
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route("/api/admin/seed-subjects", post(handlers::admin_seed_subjects))
        .route(
            "/api/admin/cleanup-assignments",
            post(handlers::admin_cleanup_assignments),
        )
        .route("/api/delete-user", post(handlers::delete_user))
        .route(
            "/api/topics",
            get(handlers::leaderboard).post(handlers::create_topic),
        )
        .route("/api/topics/recent", get(handlers::recent_topics))
        .route("/api/topics/:id", get(handlers::topic_detail))
        .route("/api/topics/:id/delete", post(handlers::delete_topic))
        .route("/api/topics/:id/pin", post(handlers::pin_topic))
        .route("/api/topics/:id/like", post(handlers::like_topic))
        .route(
            "/api/threads/:kind/:id/comments",
            get(handlers::thread_comments),
        )
        .route(
            "/api/threads/:kind/:id/hot-comments",
            get(handlers::thread_hot_comments),
        )
        .route("/api/comments", post(handlers::create_comment))
        .route("/api/comments/:id/replies", get(handlers::comment_replies))
        .route("/api/comments/:id/delete", post(handlers::delete_comment))
        .route("/api/comments/:id/like", post(handlers::like_comment))
        .route(
            "/api/ratings",
            get(handlers::list_ratings).post(handlers::create_rating),
        )
        .route("/api/ratings/:id", get(handlers::rating_detail))
        .route("/api/ratings/:id/rate", post(handlers::rate))
        .route("/api/ratings/:id/delete", post(handlers::delete_rating))
        .route(
            "/api/ratings/:id/toggle-active",
            post(handlers::toggle_rating_active),
        )
        .route("/api/subjects", get(handlers::list_subjects))
        .route(
            "/api/assignments",
            get(handlers::list_assignments).post(handlers::create_assignment),
        )
        .route("/api/assignments/:id", get(handlers::assignment_detail))
        .route("/api/assignments/:id/edit", post(handlers::edit_assignment))
        .route(
            "/api/assignments/:id/delete",
            post(handlers::delete_assignment),
        )
        .route(
            "/api/assignments/:id/toggle",
            post(handlers::toggle_completion),
        )
        .route("/api/homework", get(handlers::homework))
        .route(
            "/api/hidden-subjects",
            get(handlers::hidden_subjects).post(handlers::set_hidden_subjects),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState { db, admin_token })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let admin_token = std::env::var("ADMIN_TOKEN")
        .ok()
        .map(|t| Uuid::try_parse(&t).map(AuthToken))
        .transpose()
        .context("parsing ADMIN_TOKEN as an auth token")?;
    if admin_token.is_none() {
        tracing::info!("no ADMIN_TOKEN set, only admin sessions can use admin endpoints");
    }

    let db = create_sqlx_pool_with(&db_url, opt.max_connections).await?;
    let mut conn = db.acquire().await.map_err(|e| anyhow!("{e}"))?;
    MIGRATOR
        .run(&mut *conn)
        .await
        .context("applying migrations")?;
    let seeded = hwboard_api::seed_subjects(&mut conn.db(), &User::system_admin())
        .await
        .context("seeding default subjects")??;
    tracing::debug!(seeded, "default subjects are present");
    std::mem::drop(conn);

    let app = app(db, admin_token).await;

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
