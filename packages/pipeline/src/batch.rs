//! Runs many cities concurrently.
//!
//! Cities share nothing but the engine client. A failed city is recorded
//! in the report and the batch moves on; the batch itself only fails
//! before any city starts. Export tasks are not awaited.

use std::sync::Arc;

use greenspace_city_models::ResolvedCity;
use greenspace_engine::EngineApi;
use serde::Serialize;

use crate::city::{CityReport, RunOptions, Submission, run_city};
use crate::params::AnalysisParams;
use crate::progress::ProgressCallback;

/// Default number of cities in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Batch-level settings.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Per-city options.
    pub run: RunOptions,
    /// Cities in flight at once (at least 1).
    pub concurrency: usize,
}

/// Outcome of a whole batch, one entry per city sorted by name.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Run tag the batch was submitted under.
    pub run_tag: String,
    /// Per-city outcomes.
    pub cities: Vec<CityReport>,
}

impl BatchReport {
    /// Cities with all three exports accepted.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.cities.iter().filter(|c| c.is_success()).count()
    }

    /// Cities that stopped early.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.cities.len() - self.succeeded()
    }

    /// Every accepted export across all cities.
    pub fn submissions(&self) -> impl Iterator<Item = &Submission> {
        self.cities.iter().flat_map(|c| c.submissions.iter())
    }
}

/// Runs every city in `cities` and collects the outcomes.
pub async fn run_batch(
    engine: &dyn EngineApi,
    params: &AnalysisParams,
    cities: &[ResolvedCity],
    options: &BatchOptions,
    progress: Arc<dyn ProgressCallback>,
) -> BatchReport {
    use futures::stream::{self, StreamExt as _};

    let concurrency = options.concurrency.max(1);
    log::info!(
        "Running {} cities (concurrency={concurrency}, run tag {})",
        cities.len(),
        options.run.run_tag
    );
    progress.set_total(cities.len() as u64);

    let mut reports: Vec<CityReport> = stream::iter(cities.iter().map(|city| {
        let progress = Arc::clone(&progress);
        async move {
            progress.set_message(city.name.clone());
            let report = run_city(engine, params, city, &options.run).await;
            progress.inc(1);
            report
        }
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    reports.sort_by(|a, b| a.city.cmp(&b.city));

    let report = BatchReport {
        run_tag: options.run.run_tag.clone(),
        cities: reports,
    };
    progress.finish(format!(
        "{} cities submitted, {} failed",
        report.succeeded(),
        report.failed()
    ));
    report
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use greenspace_city_models::{BoundarySource, CenterSource, CityOverride, Hemisphere};
    use greenspace_engine::recording::RecordingEngine;

    use super::*;
    use crate::city::CityFailure;
    use crate::progress::null_progress;

    fn city(name: &str) -> ResolvedCity {
        ResolvedCity {
            name: name.to_string(),
            hemisphere: Hemisphere::North,
            boundary: BoundarySource::Dataset,
            center: CenterSource::Dataset,
            tuning: CityOverride::default(),
        }
    }

    fn options(concurrency: usize) -> BatchOptions {
        BatchOptions {
            run: RunOptions {
                run_tag: "20230321".to_string(),
                preflight: false,
            },
            concurrency,
        }
    }

    #[derive(Default)]
    struct Counter {
        total: AtomicU64,
        done: AtomicU64,
    }

    impl ProgressCallback for Counter {
        fn set_total(&self, total: u64) {
            self.total.store(total, Ordering::SeqCst);
        }
        fn inc(&self, delta: u64) {
            self.done.fetch_add(delta, Ordering::SeqCst);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let params = AnalysisParams::default();
        let engine = RecordingEngine::new().with_export_rejection(|description| {
            description
                .contains("_Lagos_")
                .then(|| "permission denied".to_string())
        });
        let cities = [city("Tokyo"), city("Lagos"), city("Accra")];

        let report = run_batch(&engine, &params, &cities, &options(4), null_progress()).await;

        let names: Vec<&str> = report.cities.iter().map(|c| c.city.as_str()).collect();
        assert_eq!(names, vec!["Accra", "Lagos", "Tokyo"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.cities[1].failure,
            Some(CityFailure::ExportRejected { .. })
        ));
        assert_eq!(report.submissions().count(), 6);
        assert_eq!(engine.exports().len(), 6);
    }

    #[tokio::test]
    async fn every_city_gets_three_exports() {
        let params = AnalysisParams::default();
        let engine = RecordingEngine::new();
        let cities = [city("Accra"), city("Dakar")];
        let counter = Arc::new(Counter::default());

        let report = run_batch(&engine, &params, &cities, &options(1), counter.clone()).await;

        for c in &report.cities {
            assert_eq!(c.submissions.len(), 3, "{}", c.city);
        }
        assert_eq!(counter.total.load(Ordering::SeqCst), 2);
        assert_eq!(counter.done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rerun_with_same_tag_reuses_operations() {
        let params = AnalysisParams::default();
        let engine = RecordingEngine::new();
        let cities = [city("Accra")];

        let first = run_batch(&engine, &params, &cities, &options(2), null_progress()).await;
        let second = run_batch(&engine, &params, &cities, &options(2), null_progress()).await;

        let ops = |r: &BatchReport| -> Vec<String> {
            r.submissions().map(|s| s.operation.clone()).collect()
        };
        assert_eq!(ops(&first), ops(&second));
        let digests = |r: &BatchReport| -> Vec<String> {
            r.submissions().map(|s| s.digest.clone()).collect()
        };
        assert_eq!(digests(&first), digests(&second));
    }
}
