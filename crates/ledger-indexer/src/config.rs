// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use ledger_indexer_framework::{MAX_BIND_PARAMETERS, PAGE_SIZE};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Configuration as read from a TOML file. Every value is optional, and missing values are
/// filled in from defaults by [IndexerConfig::finish].
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct IndexerConfig {
    /// How data is fetched from the chain and written to the store.
    pub sync: SyncLayer,

    /// Which drivers run.
    pub drivers: DriversLayer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Number of records requested per page.
    pub page_size: u64,

    /// Maximum number of per-validator (or per-account) tasks in flight at once. `0` means no
    /// limit.
    pub dispatch_concurrency: usize,

    /// Maximum number of bind parameters in one statement.
    pub max_bind_parameters: usize,

    /// How often to poll the chain for a new block.
    pub block_interval_ms: u64,

    /// How often to run the full refresh of accounts, delegations and rewards.
    pub refresh_interval_ms: u64,

    /// Human-readable part of account addresses. Validator operator and consensus prefixes are
    /// derived from it.
    pub bech32_prefix: String,
}

/// Drivers can be turned off individually, for chains that lack the corresponding module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriversConfig {
    pub bank: bool,
    pub staking: bool,
    pub distribution: bool,
    pub gov: bool,
    pub evidence: bool,
}

// Configuration layers apply overrides over a base configuration. When reading configs from a
// file, we read them into layer types, and then apply those layers onto an existing configuration
// (such as the default configuration) to `finish()` them.

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SyncLayer {
    pub page_size: Option<u64>,
    pub dispatch_concurrency: Option<usize>,
    pub max_bind_parameters: Option<usize>,
    pub block_interval_ms: Option<u64>,
    pub refresh_interval_ms: Option<u64>,
    pub bech32_prefix: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct DriversLayer {
    pub bank: Option<bool>,
    pub staking: Option<bool>,
    pub distribution: Option<bool>,
    pub gov: Option<bool>,
    pub evidence: Option<bool>,
}

impl IndexerConfig {
    /// Generate an example configuration, with every value set to its default.
    pub fn example() -> Self {
        let SyncConfig {
            page_size,
            dispatch_concurrency,
            max_bind_parameters,
            block_interval_ms,
            refresh_interval_ms,
            bech32_prefix,
        } = SyncConfig::default();

        let DriversConfig {
            bank,
            staking,
            distribution,
            gov,
            evidence,
        } = DriversConfig::default();

        Self {
            sync: SyncLayer {
                page_size: Some(page_size),
                dispatch_concurrency: Some(dispatch_concurrency),
                max_bind_parameters: Some(max_bind_parameters),
                block_interval_ms: Some(block_interval_ms),
                refresh_interval_ms: Some(refresh_interval_ms),
                bech32_prefix: Some(bech32_prefix),
            },
            drivers: DriversLayer {
                bank: Some(bank),
                staking: Some(staking),
                distribution: Some(distribution),
                gov: Some(gov),
                evidence: Some(evidence),
            },
        }
    }

    /// Read the configuration from `path`, or the defaults if there is no file.
    pub async fn read(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse configuration TOML file")
    }

    pub fn finish(self) -> (SyncConfig, DriversConfig) {
        (
            self.sync.finish(SyncConfig::default()),
            self.drivers.finish(DriversConfig::default()),
        )
    }
}

impl SyncConfig {
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl SyncLayer {
    pub fn finish(self, base: SyncConfig) -> SyncConfig {
        SyncConfig {
            page_size: self.page_size.unwrap_or(base.page_size),
            dispatch_concurrency: self
                .dispatch_concurrency
                .unwrap_or(base.dispatch_concurrency),
            max_bind_parameters: self
                .max_bind_parameters
                .unwrap_or(base.max_bind_parameters),
            block_interval_ms: self.block_interval_ms.unwrap_or(base.block_interval_ms),
            refresh_interval_ms: self.refresh_interval_ms.unwrap_or(base.refresh_interval_ms),
            bech32_prefix: self.bech32_prefix.unwrap_or(base.bech32_prefix),
        }
    }
}

impl DriversLayer {
    pub fn finish(self, base: DriversConfig) -> DriversConfig {
        DriversConfig {
            bank: self.bank.unwrap_or(base.bank),
            staking: self.staking.unwrap_or(base.staking),
            distribution: self.distribution.unwrap_or(base.distribution),
            gov: self.gov.unwrap_or(base.gov),
            evidence: self.evidence.unwrap_or(base.evidence),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            dispatch_concurrency: 10,
            max_bind_parameters: MAX_BIND_PARAMETERS,
            block_interval_ms: 5_000,
            refresh_interval_ms: 86_400_000,
            bech32_prefix: "cosmos".to_string(),
        }
    }
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            bank: true,
            staking: true,
            distribution: true,
            gov: true,
            evidence: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config: IndexerConfig = toml::from_str("").unwrap();
        let (sync, drivers) = config.finish();
        assert_eq!(sync, SyncConfig::default());
        assert_eq!(drivers, DriversConfig::default());
    }

    #[test]
    fn layer_overrides_base() {
        let config: IndexerConfig = toml::from_str(
            r#"
            [sync]
            page-size = 50
            bech32-prefix = "osmo"

            [drivers]
            gov = false
            "#,
        )
        .unwrap();

        let (sync, drivers) = config.finish();
        assert_eq!(sync.page_size, 50);
        assert_eq!(sync.bech32_prefix, "osmo");
        assert_eq!(sync.dispatch_concurrency, 10);
        assert!(!drivers.gov);
        assert!(drivers.bank);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<IndexerConfig>("[sync]\npage-sise = 50\n").unwrap_err();
        assert!(err.to_string().contains("page-sise"));
    }

    #[test]
    fn example_round_trips() {
        let example = toml::to_string_pretty(&IndexerConfig::example()).unwrap();
        let config: IndexerConfig = toml::from_str(&example).unwrap();
        assert_eq!(config.finish().0, SyncConfig::default());
    }
}
