use axum::Router;
use sqlx::PgPool;

use crate::Config;

mod health;
mod pipeline;
mod weather;

// ---

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(weather::router())
        .merge(pipeline::router())
        .merge(health::router())
        .with_state((pool, config))
}
