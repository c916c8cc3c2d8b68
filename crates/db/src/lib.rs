use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

pub mod models;

#[derive(Clone)]
pub struct DBService {
    pub pool: PgPool,
}

impl DBService {
    const MAX_CONNECTIONS: u32 = 10;
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connect to Postgres and apply pending migrations
    pub async fn new(database_url: &str) -> Result<DBService, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(Self::MAX_CONNECTIONS)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");

        Ok(DBService { pool })
    }

    pub fn from_pool(pool: PgPool) -> DBService {
        DBService { pool }
    }
}
