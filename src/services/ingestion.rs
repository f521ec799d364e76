//! District/date fan-out against the upstream prayer-times API.
//!
//! Each run gets its own token bucket built from the run's
//! [`RateLimitConfig`]; all runs share one `reqwest::Client`. Districts are
//! processed in groups of `max_concurrent_districts`. Within a district,
//! requests go out in calendar order.

use chrono::NaiveDate;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::http_client::{RetryPolicy, RetryingHttpClient};
use super::progress::ProgressHub;
use super::token_bucket::TokenBucketLimiter;
use super::upstream::{normalize, UpstreamApi, UpstreamEnvelope};
use crate::config::UpstreamConfig;
use crate::error::{AppResult, FetchError};
use crate::models::{
    DistrictError, FetchMode, FetchOptions, FetchReport, FetchRequest, OperationType,
    ProgressStatus, ProgressUpdate, RateLimitConfig, RateLimitPreset, ScheduleEntry,
};

/// Estimated days in a Hijri month, used until the real count is known
pub const HIJRI_MONTH_ESTIMATE: u64 = 30;

/// One upstream call in a district's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedRequest {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
    HijriMonth { year: i32, month: u32 },
}

impl PlannedRequest {
    /// Progress units this request is expected to contribute
    pub fn weight(&self) -> u64 {
        match self {
            PlannedRequest::Day(_) => 1,
            PlannedRequest::Month { year, month } => days_in_month(*year, *month) as u64,
            PlannedRequest::HijriMonth { .. } => HIJRI_MONTH_ESTIMATE,
        }
    }

    fn url(&self, api: &UpstreamApi, district: &str) -> Result<String, FetchError> {
        match *self {
            PlannedRequest::Day(date) => api.day_url(district, date),
            PlannedRequest::Month { year, month } => api.month_url(district, year, month),
            PlannedRequest::HijriMonth { year, month } => api.hijri_url(district, year, month),
        }
    }
}

/// Number of days in a Gregorian month (0 for an invalid month)
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

/// Requests issued for every district, in the order they are sent
pub fn plan_requests(mode: &FetchMode) -> Vec<PlannedRequest> {
    match mode {
        FetchMode::DateRange {
            start_date,
            end_date,
        } => start_date
            .iter_days()
            .take_while(|day| day <= end_date)
            .map(PlannedRequest::Day)
            .collect(),
        FetchMode::MultiMonth { year, months } => months
            .iter()
            .map(|&month| PlannedRequest::Month { year: *year, month })
            .collect(),
        FetchMode::HijriMonth { year, month } => vec![PlannedRequest::HijriMonth {
            year: *year,
            month: *month,
        }],
    }
}

/// Expected progress units for the whole run
pub fn expected_total(options: &FetchOptions) -> u64 {
    let per_district: u64 = plan_requests(&options.mode).iter().map(|r| r.weight()).sum();
    per_district * options.district_names().len() as u64
}

/// Result of an untracked fetch
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Entries of successful districts, each district's entries in calendar order
    pub entries: Vec<ScheduleEntry>,
    pub errors: Vec<DistrictError>,
    pub requests_issued: u64,
    /// Progress units completed when the run stopped
    pub units_completed: u64,
    pub cancelled: bool,
}

/// Shared per-run counters
struct RunCounters<'a> {
    units: AtomicU64,
    requests: AtomicU64,
    on_progress: &'a (dyn Fn(u64, &str) + Send + Sync),
}

/// Sleeps for `delay` unless the run is cancelled first
async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

pub struct IngestionPipeline {
    http: reqwest::Client,
    api: UpstreamApi,
    request_timeout: Duration,
    retry: RetryPolicy,
    hub: ProgressHub,
}

impl IngestionPipeline {
    pub fn new(
        http: reqwest::Client,
        upstream: &UpstreamConfig,
        retry: RetryPolicy,
        hub: ProgressHub,
    ) -> Self {
        Self {
            http,
            api: UpstreamApi::new(upstream),
            request_timeout: upstream.request_timeout,
            retry,
            hub,
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Fetches every district in `options` without touching the hub.
    ///
    /// `on_progress` receives the running unit count and the district that
    /// just advanced it. A failing district is recorded in
    /// [`FetchOutcome::errors`] and its partial results are dropped.
    pub async fn fetch(
        &self,
        options: &FetchOptions,
        rate: RateLimitConfig,
        on_progress: &(dyn Fn(u64, &str) + Send + Sync),
        cancel: &CancellationToken,
    ) -> AppResult<FetchOutcome> {
        options.validate()?;
        rate.validate()?;

        let districts = options.district_names();
        let plan = plan_requests(&options.mode);
        let limiter = Arc::new(TokenBucketLimiter::new(rate.token_bucket));
        let client = RetryingHttpClient::new(self.http.clone(), limiter, self.request_timeout);
        let counters = RunCounters {
            units: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            on_progress,
        };

        log::info!(
            "Fetching {} requests for {} districts ({} at a time)",
            plan.len() * districts.len(),
            districts.len(),
            rate.max_concurrent_districts
        );

        let mut outcome = FetchOutcome::default();
        for (index, group) in districts.chunks(rate.max_concurrent_districts).enumerate() {
            if index > 0 && pause(rate.inter_district_delay, cancel).await.is_err() {
                outcome.cancelled = true;
                break;
            }

            let results = join_all(group.iter().map(|district| {
                self.fetch_district(&client, district, &plan, &rate, &counters, cancel)
            }))
            .await;

            for (district, result) in group.iter().zip(results) {
                match result {
                    Ok(entries) => outcome.entries.extend(entries),
                    Err(FetchError::Cancelled) => outcome.cancelled = true,
                    Err(e) => {
                        log::warn!("District {} failed, dropping its results: {}", district, e);
                        outcome.errors.push(DistrictError {
                            district: district.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if outcome.cancelled || cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
        }

        outcome.requests_issued = counters.requests.load(Ordering::SeqCst);
        outcome.units_completed = counters.units.load(Ordering::SeqCst);

        let stats = client.limiter().stats();
        log::info!(
            "Fetch finished: {} entries, {} district errors, {} requests, {:?} spent waiting for tokens",
            outcome.entries.len(),
            outcome.errors.len(),
            outcome.requests_issued,
            stats.total_wait_time
        );

        Ok(outcome)
    }

    async fn fetch_district(
        &self,
        client: &RetryingHttpClient,
        district: &str,
        plan: &[PlannedRequest],
        rate: &RateLimitConfig,
        counters: &RunCounters<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScheduleEntry>, FetchError> {
        let mut entries = Vec::new();
        let batch_size = rate.batch_size.max(1);
        let total_batches = plan.len().div_ceil(batch_size);

        for (index, request) in plan.iter().enumerate() {
            if index > 0 {
                pause(rate.inter_request_delay, cancel).await?;
            } else if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if index % batch_size == 0 {
                log::debug!(
                    "{}: batch {}/{}",
                    district,
                    index / batch_size + 1,
                    total_batches
                );
            }

            let url = request.url(&self.api, district)?;
            counters.requests.fetch_add(1, Ordering::SeqCst);
            let envelope: UpstreamEnvelope = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = client.fetch_json(&url, &self.retry) => result?,
            };

            let mut received = normalize(&envelope, district)?;
            if let PlannedRequest::Day(date) = request {
                let wanted = date.format("%Y-%m-%d").to_string();
                received.retain(|e| e.date == wanted);
            }

            let units = match request {
                PlannedRequest::HijriMonth { .. } => received.len() as u64,
                _ => request.weight(),
            };
            entries.extend(received);

            let current = counters.units.fetch_add(units, Ordering::SeqCst) + units;
            (counters.on_progress)(current, district);
        }

        Ok(entries)
    }

    /// Runs a fetch tracked by the progress hub.
    ///
    /// Status goes `initializing → fetching → processing → completed`, or
    /// `failed` when every district failed, the run was cancelled, or the
    /// request was invalid. A completed run reports `total` as the units
    /// actually completed, so it always ends at 100%.
    pub async fn run(
        &self,
        request: &FetchRequest,
        default_preset: RateLimitPreset,
    ) -> AppResult<FetchReport> {
        let id = self
            .hub
            .ensure(request.operation_id, OperationType::Fetch, 0)?;

        let rate = request.resolve_rate_limit(default_preset);
        if let Err(e) = request.options.validate().and_then(|_| rate.validate()) {
            self.finish_failed(id, &e.to_string());
            return Err(e);
        }

        let districts = request.options.district_names();
        let approximate = matches!(request.options.mode, FetchMode::HijriMonth { .. });
        let total = expected_total(&request.options);
        self.report(
            id,
            ProgressUpdate::new()
                .total(total)
                .approximate_total(approximate)
                .message(format!("Preparing {} districts", districts.len())),
        );

        let cancel = self.hub.cancellation_token(id)?;
        self.report(
            id,
            ProgressUpdate::new()
                .status(ProgressStatus::Fetching)
                .message("Fetching from upstream"),
        );

        let hub = self.hub.clone();
        let on_progress = move |current: u64, district: &str| {
            if let Err(e) = hub.update(id, ProgressUpdate::new().current(current).district(district))
            {
                log::warn!("Dropped fetch progress update: {}", e);
            }
        };

        let outcome = match self.fetch(&request.options, rate, &on_progress, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.finish_failed(id, &e.to_string());
                return Err(e);
            }
        };

        self.report(
            id,
            ProgressUpdate::new()
                .status(ProgressStatus::Processing)
                .message(format!("Processing {} entries", outcome.entries.len())),
        );

        let all_failed = !districts.is_empty() && outcome.errors.len() == districts.len();
        let finished = if outcome.cancelled {
            self.hub.fail(id, "Fetch cancelled")
        } else if all_failed {
            self.hub
                .fail(id, format!("All {} districts failed", districts.len()))
        } else {
            let mut update = ProgressUpdate::new().status(ProgressStatus::Completed).message(
                format!(
                    "Fetched {} entries ({} of {} districts failed)",
                    outcome.entries.len(),
                    outcome.errors.len(),
                    districts.len()
                ),
            );
            // Failed districts never contribute their units, and Hijri months
            // only contribute the days actually received
            let done = outcome.units_completed;
            update = update.total(done).current(done);
            if approximate {
                update = update.approximate_total(false);
            }
            self.hub.update(id, update)
        };

        let operation = match finished {
            Ok(operation) => operation,
            Err(e) => {
                log::warn!("Could not finish fetch operation: {}", e);
                self.hub.get(id).ok_or(e)?
            }
        };

        Ok(FetchReport {
            operation_id: id,
            status: operation.status,
            requests_issued: outcome.requests_issued,
            entries_fetched: outcome.entries.len(),
            total: operation.total,
            approximate_total: operation.approximate_total,
            errors: outcome.errors,
            entries: outcome.entries,
            upload: None,
        })
    }

    fn report(&self, id: Uuid, update: ProgressUpdate) {
        if let Err(e) = self.hub.update(id, update) {
            log::warn!("Dropped fetch progress update: {}", e);
        }
    }

    fn finish_failed(&self, id: Uuid, message: &str) {
        if let Err(e) = self.hub.fail(id, message) {
            log::warn!("Could not fail fetch operation {}: {}", id, e);
        }
    }
}
