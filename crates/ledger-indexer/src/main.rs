// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::Parser;
use ledger_indexer::{
    address::Bech32Prefixes,
    args::{Args, Command},
    client::lcd::LcdClient,
    config::IndexerConfig,
    handlers::genesis::{import_genesis, GenesisDoc},
    metrics::MetricsService,
    telemetry, Indexer,
};
use ledger_indexer_framework::BatchWriter;
use ledger_indexer_pg::{reset_database, Db, PgStore};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Enable tracing, configured by environment variables.
    telemetry::init();

    match args.command {
        Command::Indexer {
            lcd_args,
            config,
            metrics_address,
            skip_migrations,
        } => {
            let config = IndexerConfig::read(config).await?;

            let db = Db::new(args.database_url, args.db_args)
                .await
                .context("Failed to connect to database")?;

            if !skip_migrations {
                db.run_migrations().await?;
            }

            let cancel = CancellationToken::new();
            let metrics = MetricsService::new(metrics_address, Registry::new(), cancel.clone());

            let client = LcdClient::new(lcd_args).context("Failed to create chain client")?;
            let indexer = Indexer::new(
                PgStore::new(db),
                client,
                config,
                metrics.registry(),
                cancel.clone(),
            );

            let h_metrics = metrics.run().await?;
            let h_indexer = indexer.run();

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;

            info!("Received Ctrl-C, shutting down");
            cancel.cancel();

            let _ = h_indexer.await;
            let _ = h_metrics.await;
        }

        Command::ImportGenesis { genesis, config } => {
            let (sync, _) = IndexerConfig::read(config).await?.finish();
            let doc = GenesisDoc::load(&genesis)?;

            let db = Db::new(args.database_url, args.db_args)
                .await
                .context("Failed to connect to database")?;

            import_genesis(
                &PgStore::new(db),
                &BatchWriter::new(sync.max_bind_parameters),
                &doc,
                &Bech32Prefixes::new(&sync.bech32_prefix),
            )
            .await?;
        }

        Command::ResetDatabase { skip_migrations } => {
            reset_database(args.database_url, args.db_args, skip_migrations).await?;
        }

        Command::GenerateConfig => {
            let config = IndexerConfig::example();
            let config_toml = toml::to_string_pretty(&config)
                .context("Failed to serialize default configuration to TOML.")?;

            println!("{config_toml}");
        }
    }

    Ok(())
}
