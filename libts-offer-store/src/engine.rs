// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The engine value tying everything together. Lifecycle: create, load
//! (once or more), query (many), drop. A load replaces the dataset
//! wholesale and rebuilds every index; queries take `&self` and are
//! lock-free against the immutable dataset.

use crate::api::{BestHotelOffer, LoadStats, Offer, ProgressEvent, QueryResult, SearchCriteria};
use crate::config::EngineConfig;
use crate::error::{IngestError, QueryError};
use crate::ingest::loader::{LoadedDataset, Loader, ProgressObserver};
use crate::memory::{MemoryGovernor, Pressure};
use crate::query::cache::{criteria_key, QueryCache};
use crate::query::criteria::{apply_pressure_trim, ResolvedCriteria};
use crate::query::executor::{self, QueryContext};
use crate::query::planner;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct OfferEngine {
    config: EngineConfig,
    governor: Arc<MemoryGovernor>,
    best_cache: Arc<QueryCache<QueryResult<BestHotelOffer>>>,
    progress: Option<Box<ProgressObserver>>,
    dataset: Option<LoadedDataset>,
    stats: Option<LoadStats>,
}

impl OfferEngine {
    pub fn new(config: EngineConfig) -> Self {
        let governor = Arc::new(MemoryGovernor::new(config.memory_ceiling_bytes));
        let best_cache = Arc::new(QueryCache::new(config.cache_size));
        let cache = Arc::clone(&best_cache);
        governor.register_release(move || cache.clear());
        // Shed cached results as soon as pressure turns critical instead
        // of waiting for the next forced release.
        let cache = Arc::clone(&best_cache);
        governor.on_threshold(move |pressure| {
            if pressure >= Pressure::Critical {
                cache.clear();
            }
        });
        Self {
            config,
            governor,
            best_cache,
            progress: None,
            dataset: None,
            stats: None,
        }
    }

    /// Installs a coarse progress observer for subsequent loads.
    pub fn with_progress(
        mut self,
        observer: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingests both files and builds indexes. On success the previous
    /// dataset (if any) is dropped and cached query results are
    /// invalidated; on failure the previous dataset stays queryable.
    pub fn load(
        &mut self,
        hotels_path: impl AsRef<Path>,
        offers_path: impl AsRef<Path>,
    ) -> Result<LoadStats, IngestError> {
        let loader = Loader::new(&self.config, self.progress.as_deref());
        let (dataset, stats) = loader.load(hotels_path.as_ref(), offers_path.as_ref())?;
        self.best_cache.clear();
        self.governor.observe(self.in_use_bytes(Some(&dataset)));
        self.dataset = Some(dataset);
        self.stats = Some(stats.clone());
        Ok(stats)
    }

    /// Stats of the last successful load.
    pub fn stats(&self) -> Option<&LoadStats> {
        self.stats.as_ref()
    }

    pub fn pressure(&self) -> Pressure {
        self.governor.pressure()
    }

    /// Q1: the cheapest surviving offer per hotel, ascending by price
    /// then hotel id.
    pub fn best_by_hotel(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<QueryResult<BestHotelOffer>, QueryError> {
        let dataset = self.dataset.as_ref().ok_or(QueryError::NoDataLoaded)?;
        let deadline = self.deadline(criteria);
        let mut resolved = ResolvedCriteria::resolve(criteria, &dataset.interner)?;

        let trim_notices = if self.config.pressure_trim {
            apply_pressure_trim(&mut resolved, self.governor.pressure())
        } else {
            Vec::new()
        };

        // Trimmed criteria are not the caller's criteria; don't serve or
        // store them under the untrimmed key.
        let cacheable = trim_notices.is_empty();
        let key = criteria_key(criteria);
        if cacheable {
            if let Some(hit) = self.best_cache.get(key) {
                return Ok(hit);
            }
        }

        let plan = self.plan(dataset, &resolved);
        let ctx = self.context(dataset);
        let mut result = executor::best_by_hotel(&ctx, &resolved, &plan, deadline)?;
        if !trim_notices.is_empty() {
            let mut notices = trim_notices;
            notices.append(&mut result.notices);
            result.notices = notices;
        }
        if cacheable && result.notices.is_empty() {
            self.best_cache.put(key, result.clone());
        }
        Ok(result)
    }

    /// Q2: all surviving offers of one hotel, ascending by price, capped
    /// at `max_results_per_hotel`.
    pub fn offers_for_hotel(
        &self,
        hotel_id: u32,
        criteria: &SearchCriteria,
    ) -> Result<QueryResult<Offer>, QueryError> {
        let dataset = self.dataset.as_ref().ok_or(QueryError::NoDataLoaded)?;
        let deadline = self.deadline(criteria);
        if !dataset.hotels.contains(hotel_id) {
            return Ok(QueryResult::new(Vec::new()));
        }
        let mut resolved = ResolvedCriteria::resolve(criteria, &dataset.interner)?;
        resolved.hotel_id = Some(hotel_id);

        let trim_notices = if self.config.pressure_trim {
            apply_pressure_trim(&mut resolved, self.governor.pressure())
        } else {
            Vec::new()
        };

        let plan = self.plan(dataset, &resolved);
        let ctx = self.context(dataset);
        let mut result = executor::offers_for_hotel(&ctx, &resolved, &plan, deadline)?;
        if !trim_notices.is_empty() {
            let mut notices = trim_notices;
            notices.append(&mut result.notices);
            result.notices = notices;
        }
        Ok(result)
    }

    fn plan(&self, dataset: &LoadedDataset, resolved: &ResolvedCriteria) -> planner::Plan {
        planner::plan(
            dataset,
            resolved,
            &self.config,
            self.governor.pressure(),
            self.in_use_bytes(Some(dataset)),
        )
    }

    fn context<'d>(&'d self, dataset: &'d LoadedDataset) -> QueryContext<'d> {
        QueryContext {
            dataset,
            config: &self.config,
            governor: &self.governor,
        }
    }

    fn deadline(&self, criteria: &SearchCriteria) -> Instant {
        let timeout = criteria
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.query_timeout);
        Instant::now() + timeout
    }

    fn in_use_bytes(&self, dataset: Option<&LoadedDataset>) -> usize {
        MemoryGovernor::resident_memory_bytes().unwrap_or_else(|| {
            dataset
                .or(self.dataset.as_ref())
                .map(LoadedDataset::memory_bytes)
                .unwrap_or(0)
        })
    }
}
