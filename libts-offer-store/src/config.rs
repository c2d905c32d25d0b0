// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for [crate::OfferEngine]. Construct with
/// [Default::default] and override fields, or gather overrides from the
/// environment with [EngineConfig::from_env].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Maximum number of offer rows the columnar store will hold. Column
    /// buffers are reserved up front at this size.
    pub offer_capacity: usize,
    /// Rows per executor chunk in streaming execution. Plans with no index
    /// support run at a fifth of this.
    pub chunk_size: usize,
    /// Cap applied to offers-for-hotel results.
    pub max_results_per_hotel: usize,
    /// Heap ceiling the memory governor classifies pressure against.
    pub memory_ceiling_bytes: usize,
    /// Row count above which queries always run streaming-chunked.
    pub streaming_row_threshold: usize,
    /// In-use heap above which queries always run streaming-chunked.
    pub streaming_heap_threshold_bytes: usize,
    /// Worker threads for executor chunk evaluation; 0 evaluates inline.
    pub worker_threads: usize,
    /// Default per-query deadline.
    pub query_timeout: Duration,
    /// Skip malformed records (counted) instead of failing the load.
    pub skip_errors: bool,
    /// Maximum distinct keys per index family; a family that would exceed
    /// this is skipped at build time.
    pub numeric_index_cap: usize,
    /// Query result cache entries; 0 disables the cache.
    pub cache_size: usize,
    /// Apply pressure-driven criteria trimming. Production keeps this on;
    /// tests turn it off to make queries reproducible.
    pub pressure_trim: bool,
    /// Retained parse issues in the load error log.
    pub max_error_log: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            offer_capacity: 100_000_000,
            chunk_size: 10_000,
            max_results_per_hotel: 1_000,
            memory_ceiling_bytes: 8 * GIB,
            streaming_row_threshold: 50_000_000,
            streaming_heap_threshold_bytes: 3 * GIB,
            worker_threads: 0,
            query_timeout: Duration::from_secs(5),
            skip_errors: true,
            numeric_index_cap: 4_096,
            cache_size: 32,
            pressure_trim: true,
            max_error_log: 1_000,
        }
    }
}

const GIB: usize = 1024 * 1024 * 1024;

impl EngineConfig {
    const TS_OFFER_CAPACITY: &'static str = "TS_OFFER_CAPACITY";
    const TS_CHUNK_SIZE: &'static str = "TS_CHUNK_SIZE";
    const TS_MAX_RESULTS_PER_HOTEL: &'static str = "TS_MAX_RESULTS_PER_HOTEL";
    const TS_MEMORY_CEILING_BYTES: &'static str = "TS_MEMORY_CEILING_BYTES";
    const TS_WORKER_THREADS: &'static str = "TS_WORKER_THREADS";
    const TS_QUERY_TIMEOUT_MS: &'static str = "TS_QUERY_TIMEOUT_MS";
    const TS_SKIP_ERRORS: &'static str = "TS_SKIP_ERRORS";
    const TS_NUMERIC_INDEX_CAP: &'static str = "TS_NUMERIC_INDEX_CAP";
    const TS_CACHE_SIZE: &'static str = "TS_CACHE_SIZE";

    /// Reads overrides from `TS_`-prefixed environment variables on top of
    /// the defaults. Unset or unparsable variables keep the default.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            offer_capacity: parse_env(Self::TS_OFFER_CAPACITY).unwrap_or(default.offer_capacity),
            chunk_size: parse_env(Self::TS_CHUNK_SIZE).unwrap_or(default.chunk_size),
            max_results_per_hotel: parse_env(Self::TS_MAX_RESULTS_PER_HOTEL)
                .unwrap_or(default.max_results_per_hotel),
            memory_ceiling_bytes: parse_env(Self::TS_MEMORY_CEILING_BYTES)
                .unwrap_or(default.memory_ceiling_bytes),
            worker_threads: parse_env(Self::TS_WORKER_THREADS).unwrap_or(default.worker_threads),
            query_timeout: parse_env(Self::TS_QUERY_TIMEOUT_MS)
                .map(Duration::from_millis)
                .unwrap_or(default.query_timeout),
            skip_errors: parse_env_bool(Self::TS_SKIP_ERRORS).unwrap_or(default.skip_errors),
            numeric_index_cap: parse_env(Self::TS_NUMERIC_INDEX_CAP)
                .unwrap_or(default.numeric_index_cap),
            cache_size: parse_env(Self::TS_CACHE_SIZE).unwrap_or(default.cache_size),
            ..default
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn parse_env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
