//! Lifecycle of the single in-flight analysis job.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use super::normalize::normalize_report;
use super::validator::JobRequestValidator;
use crate::domain::{
    AnalysisJob, CommentRecord, CrawlReport, ErrorInfo, JobId, JobOutcome, JobState,
    ModerationJobRequest,
};
use crate::error::{ConsistencyReason, ModerationError, ModerationResult};
use crate::observability::Metrics;
use crate::store::{CrawlAnalyzer, ProgressSink};

/// Receives job results before the settled state is published, so observers
/// that see `Settled(_)` also see its effects.
pub trait JobSink: Send + Sync {
    fn on_submitted(&self, _job: &AnalysisJob) {}

    fn on_success(&self, request: &ModerationJobRequest, records: Vec<CommentRecord>);

    fn on_failure(&self, request: &ModerationJobRequest, error: &ErrorInfo);
}

/// Owns `Idle → Submitting → Running → Settled(_)` for one job at a time.
///
/// Observers poll [`Self::snapshot`] or follow [`Self::subscribe`]; the
/// collaborator call runs on its own Tokio task.
#[derive(Clone)]
pub struct AnalysisJobController {
    inner: Arc<Inner>,
}

struct Inner {
    analyzer: Arc<dyn CrawlAnalyzer>,
    metrics: Arc<Metrics>,
    crawl_timeout: Duration,
    sink: Option<Arc<dyn JobSink>>,
    current: watch::Sender<Option<AnalysisJob>>,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    cancel: Option<(JobId, CancellationToken)>,
    records: Option<(JobId, Vec<CommentRecord>)>,
    last_failed: Option<ModerationJobRequest>,
}

impl AnalysisJobController {
    /// Controller that keeps succeeded records for [`Self::take_records`].
    pub fn new(
        analyzer: Arc<dyn CrawlAnalyzer>,
        metrics: Arc<Metrics>,
        crawl_timeout: Duration,
    ) -> Self {
        Self::build(analyzer, metrics, crawl_timeout, None)
    }

    /// Controller that hands every result to `sink` instead.
    pub fn with_sink(
        analyzer: Arc<dyn CrawlAnalyzer>,
        metrics: Arc<Metrics>,
        crawl_timeout: Duration,
        sink: Arc<dyn JobSink>,
    ) -> Self {
        Self::build(analyzer, metrics, crawl_timeout, Some(sink))
    }

    fn build(
        analyzer: Arc<dyn CrawlAnalyzer>,
        metrics: Arc<Metrics>,
        crawl_timeout: Duration,
        sink: Option<Arc<dyn JobSink>>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                analyzer,
                metrics,
                crawl_timeout,
                sink,
                current,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Validates `request` and dispatches it as a fresh job.
    ///
    /// # Errors
    /// `Validation` for a rejected request, `InFlightConflict` while another
    /// job is submitting or running. Neither touches the current job.
    pub fn submit(&self, request: ModerationJobRequest) -> ModerationResult<AnalysisJob> {
        if let Err(reason) = JobRequestValidator::validate(&request) {
            self.inner.metrics.jobs_rejected.inc();
            warn!(?reason, field = reason.field(), "job request rejected");
            return Err(ModerationError::Validation(reason));
        }

        let mut slot = self.inner.lock_slot();
        if let Some(running) = self.inner.in_flight() {
            self.inner.metrics.jobs_rejected.inc();
            warn!(running_job = %running, "job submitted while another is in flight");
            return Err(ModerationError::InFlightConflict { running_job: running });
        }

        let job = AnalysisJob::submitted(request);
        let token = CancellationToken::new();
        slot.cancel = Some((job.id, token.clone()));
        slot.records = None;
        if let Some(sink) = &self.inner.sink {
            sink.on_submitted(&job);
        }
        self.inner.current.send_replace(Some(job.clone()));
        drop(slot);

        self.inner.metrics.jobs_submitted.inc();
        info!(job_id = %job.id, target_url = %job.request.target_url, "analysis job submitted");

        let span = info_span!("analysis_job", job_id = %job.id);
        tokio::spawn(run_job(Arc::clone(&self.inner), job.clone(), token).instrument(span));
        Ok(job)
    }

    /// Latest job, settled or not. `None` until the first submission.
    #[must_use]
    pub fn snapshot(&self) -> Option<AnalysisJob> {
        self.inner.current.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.inner
            .current
            .borrow()
            .as_ref()
            .map_or(JobState::Idle, |job| job.state)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AnalysisJob>> {
        self.inner.current.subscribe()
    }

    /// Waits until job `id` settles. Returns `None` if it was superseded.
    pub async fn wait_settled(&self, id: JobId) -> Option<AnalysisJob> {
        let mut rx = self.subscribe();
        let job = rx
            .wait_for(|job| job.as_ref().is_none_or(|j| j.id != id || j.state.is_settled()))
            .await
            .ok()?
            .clone()?;
        (job.id == id).then_some(job)
    }

    /// Fires the cancellation token of the in-flight job. The job settles as
    /// `Failed` with code `cancelled` once its task observes the token.
    ///
    /// # Errors
    /// `ConsistencyViolation(NoJobInFlight)` when nothing is running.
    pub fn cancel(&self) -> ModerationResult<JobId> {
        let slot = self.inner.lock_slot();
        match (self.inner.in_flight(), slot.cancel.as_ref()) {
            (Some(running), Some((id, token))) if running == *id => {
                token.cancel();
                info!(job_id = %id, "analysis job cancellation requested");
                Ok(running)
            }
            _ => Err(ModerationError::consistency(
                "job",
                ConsistencyReason::NoJobInFlight,
            )),
        }
    }

    /// Resubmits the request of the last failed job as a new job.
    ///
    /// # Errors
    /// `ConsistencyViolation(NoFailedJob)` when there is nothing to retry,
    /// otherwise the same errors as [`Self::submit`].
    pub fn retry(&self) -> ModerationResult<AnalysisJob> {
        let request = self.inner.lock_slot().last_failed.clone();
        let Some(request) = request else {
            return Err(ModerationError::consistency(
                "job",
                ConsistencyReason::NoFailedJob,
            ));
        };
        info!(target_url = %request.target_url, "retrying last failed job");
        self.submit(request)
    }

    /// Hands over the normalized records of a succeeded job, once.
    #[must_use]
    pub fn take_records(&self, id: JobId) -> Option<Vec<CommentRecord>> {
        let mut slot = self.inner.lock_slot();
        match slot.records.take() {
            Some((job_id, records)) if job_id == id => Some(records),
            other => {
                slot.records = other;
                None
            }
        }
    }
}

impl Inner {
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> Option<JobId> {
        self.current
            .borrow()
            .as_ref()
            .filter(|job| job.state.is_in_flight())
            .map(|job| job.id)
    }

    /// Applies `f` to job `id` if it is still the current, unsettled job.
    fn update(&self, id: JobId, f: impl FnOnce(&mut AnalysisJob)) {
        self.current.send_if_modified(|current| match current {
            Some(job) if job.id == id && !job.state.is_settled() => {
                f(job);
                true
            }
            _ => false,
        });
    }
}

struct JobProgress {
    inner: Arc<Inner>,
    id: JobId,
}

impl ProgressSink for JobProgress {
    fn report(&self, stage: &str) {
        self.inner.update(self.id, |job| job.progress = Some(stage.to_string()));
    }
}

async fn run_job(inner: Arc<Inner>, job: AnalysisJob, token: CancellationToken) {
    let started = Instant::now();
    inner.update(job.id, |j| j.state = JobState::Running);

    let progress = JobProgress {
        inner: Arc::clone(&inner),
        id: job.id,
    };
    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => Err(ErrorInfo::new(ErrorInfo::CANCELLED, "job cancelled by operator")),
        result = tokio::time::timeout(
            inner.crawl_timeout,
            inner.analyzer.crawl_and_analyze(&job.request, &progress),
        ) => match result {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(error)) => Err(ErrorInfo::new(ErrorInfo::COLLABORATOR, format!("{error:#}"))),
            Err(_) => Err(ErrorInfo::new(
                ErrorInfo::ABORTED,
                format!("crawl did not finish within {}s", inner.crawl_timeout.as_secs()),
            )),
        },
    };

    inner.metrics.job_duration.observe(started.elapsed().as_secs_f64());
    match outcome {
        Ok(report) => settle_success(&inner, &job, report),
        Err(error) => settle_failure(&inner, &job, error),
    }
}

fn settle_success(inner: &Inner, job: &AnalysisJob, report: CrawlReport) {
    inner.update(job.id, |j| j.progress = Some("normalizing".to_string()));
    let batch = normalize_report(report, &job.request, job.submitted_at);
    let summary = batch.summary;

    {
        let mut slot = inner.lock_slot();
        slot.cancel = None;
        slot.last_failed = None;
        match &inner.sink {
            Some(sink) => sink.on_success(&job.request, batch.records),
            None => slot.records = Some((job.id, batch.records)),
        }
    }
    inner.update(job.id, |j| {
        j.state = JobState::Settled(JobOutcome::Success);
        j.settled_at = Some(Utc::now());
        j.summary = Some(summary);
        j.progress = None;
    });
    inner.metrics.jobs_completed.inc();
    info!(
        total_crawled = summary.total_crawled,
        analyzed = summary.analyzed_count,
        skipped = summary.skipped_count,
        "analysis job succeeded"
    );
}

fn settle_failure(inner: &Inner, job: &AnalysisJob, error: ErrorInfo) {
    {
        let mut slot = inner.lock_slot();
        slot.cancel = None;
        slot.last_failed = Some(job.request.clone());
        if let Some(sink) = &inner.sink {
            sink.on_failure(&job.request, &error);
        }
    }
    warn!(code = %error.code, message = %error.message, "analysis job failed");
    inner.update(job.id, |j| {
        j.state = JobState::Settled(JobOutcome::Failed);
        j.settled_at = Some(Utc::now());
        j.error = Some(error);
        j.progress = None;
    });
    inner.metrics.jobs_failed.inc();
}
