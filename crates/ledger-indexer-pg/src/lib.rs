// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use anyhow::anyhow;
use diesel::migration::MigrationVersion;
use diesel::ConnectionError;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::pooled_connection::ManagerConfig;
use diesel_async::AsyncConnection;
use diesel_async::{
    pooled_connection::{
        bb8::{Pool, PooledConnection},
        AsyncDieselConnectionManager,
    },
    AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use futures::FutureExt;
use tracing::info;
use url::Url;

pub use store::PgStore;

mod bind;
mod store;

/// Schema for every latest-state and history table the indexer writes to.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(clap::Args, Debug, Clone)]
pub struct DbArgs {
    /// Number of connections to keep in the pool.
    #[arg(long, default_value_t = Self::default().db_connection_pool_size)]
    pub db_connection_pool_size: u32,

    /// Time spent waiting for a connection from the pool to become available, in milliseconds.
    #[arg(long, default_value_t = Self::default().db_connection_timeout_ms)]
    pub db_connection_timeout_ms: u64,

    #[arg(long)]
    /// Time spent waiting for statements to complete, in milliseconds.
    pub db_statement_timeout_ms: Option<u64>,
}

#[derive(Clone)]
pub struct Db(Pool<AsyncPgConnection>);

/// A connection borrowed from the [Db] pool, returned to it on drop.
pub struct Connection<'a>(PooledConnection<'a, AsyncPgConnection>);

impl DbArgs {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.db_connection_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.db_statement_timeout_ms.map(Duration::from_millis)
    }
}

impl Db {
    /// Construct a new connection pool talking to the database at `database_url`. Instances of
    /// [Db] can be cloned to share access to the same pool.
    pub async fn new(database_url: Url, config: DbArgs) -> anyhow::Result<Self> {
        Ok(Self(pool(database_url, config).await?))
    }

    /// Retrieves a connection from the pool. Can fail with a timeout if a connection cannot be
    /// established before the [DbArgs::connection_timeout] has elapsed.
    pub async fn connect(&self) -> anyhow::Result<Connection<'_>> {
        Ok(Connection(self.0.get().await?))
    }

    /// Statistics about the connection pool
    pub fn state(&self) -> bb8::State {
        self.0.state()
    }

    async fn drop_tables(&self) -> anyhow::Result<()> {
        info!("Dropping all tables...");
        let mut conn = self.connect().await?;
        let drop_all_tables = "
        DO $$ DECLARE
            r RECORD;
        BEGIN
        FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = 'public')
            LOOP
                EXECUTE 'DROP TABLE IF EXISTS ' || quote_ident(r.tablename) || ' CASCADE';
            END LOOP;
        END $$;";
        diesel::sql_query(drop_all_tables)
            .execute(conn.pg())
            .await?;
        info!("Dropped all tables.");
        Ok(())
    }

    /// Bring the schema up to date with [MIGRATIONS].
    pub async fn run_migrations(&self) -> anyhow::Result<Vec<MigrationVersion<'static>>> {
        use diesel_migrations::MigrationHarness;

        info!("Running migrations ...");
        let conn = self.0.dedicated_connection().await?;
        let mut wrapper: AsyncConnectionWrapper<AsyncPgConnection> =
            AsyncConnectionWrapper::from(conn);

        let finished_migrations: Vec<MigrationVersion<'static>> =
            tokio::task::spawn_blocking(move || {
                wrapper
                    .run_pending_migrations(MIGRATIONS)
                    .map(|versions| versions.iter().map(MigrationVersion::as_owned).collect())
            })
            .await?
            .map_err(|e| anyhow!("Failed to run migrations: {:?}", e))?;

        info!(applied = finished_migrations.len(), "Migrations complete.");
        Ok(finished_migrations)
    }
}

impl Default for DbArgs {
    fn default() -> Self {
        Self {
            db_connection_pool_size: 10,
            db_connection_timeout_ms: 60_000,
            db_statement_timeout_ms: None,
        }
    }
}

/// Drop all tables, and optionally re-create the schema from [MIGRATIONS].
pub async fn reset_database(
    database_url: Url,
    db_config: DbArgs,
    skip_migrations: bool,
) -> anyhow::Result<()> {
    let db = Db::new(database_url, db_config).await?;
    db.drop_tables().await?;
    if !skip_migrations {
        db.run_migrations().await?;
    }

    Ok(())
}

impl Connection<'_> {
    /// The underlying Postgres connection, for running diesel queries against.
    pub fn pg(&mut self) -> &mut AsyncPgConnection {
        &mut self.0
    }
}

impl<'a> Deref for Connection<'a> {
    type Target = PooledConnection<'a, AsyncPgConnection>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Connection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

async fn pool(database_url: Url, args: DbArgs) -> anyhow::Result<Pool<AsyncPgConnection>> {
    let statement_timeout = args.statement_timeout();

    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(move |url| {
        async move {
            let mut conn = AsyncPgConnection::establish(url).await?;

            if let Some(timeout) = statement_timeout {
                diesel::sql_query(format!("SET statement_timeout = {}", timeout.as_millis()))
                    .execute(&mut conn)
                    .await
                    .map_err(ConnectionError::CouldntSetupConfiguration)?;
            }

            Ok(conn)
        }
        .boxed()
    });

    let manager = AsyncDieselConnectionManager::new_with_config(database_url.as_str(), config);

    Ok(Pool::builder()
        .max_size(args.db_connection_pool_size)
        .connection_timeout(args.connection_timeout())
        .build(manager)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args() {
        let args = DbArgs::default();
        assert_eq!(args.connection_timeout(), Duration::from_secs(60));
        assert_eq!(args.statement_timeout(), None);

        let args = DbArgs {
            db_statement_timeout_ms: Some(250),
            ..DbArgs::default()
        };
        assert_eq!(args.statement_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn migrations_are_embedded() {
        use diesel::migration::MigrationSource;
        use diesel::pg::Pg;

        let migrations = MigrationSource::<Pg>::migrations(&MIGRATIONS).unwrap();
        assert_eq!(migrations.len(), 1);
    }
}
