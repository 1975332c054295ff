/// Prometheus metric definitions.
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    // jobs
    pub jobs_submitted: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_rejected: Counter,

    // result set and triage
    pub comments_loaded: Counter,
    pub comments_deleted: Counter,
    pub escalations: Counter,
    pub relabels: Counter,
    pub triage_failures: Counter,

    pub job_duration: Histogram,

    pub loaded_comments: Gauge,
}

impl Metrics {
    /// Registers every collector on `registry`.
    ///
    /// # Errors
    /// Fails when a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            jobs_submitted: register_counter_with_registry!(
                "shield_jobs_submitted_total",
                "Analysis jobs accepted by the controller",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "shield_jobs_completed_total",
                "Analysis jobs that settled successfully",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "shield_jobs_failed_total",
                "Analysis jobs that settled as failed or cancelled",
                registry
            )?,
            jobs_rejected: register_counter_with_registry!(
                "shield_jobs_rejected_total",
                "Job submissions rejected by validation or an in-flight job",
                registry
            )?,
            comments_loaded: register_counter_with_registry!(
                "shield_comments_loaded_total",
                "Comment records loaded into the result set",
                registry
            )?,
            comments_deleted: register_counter_with_registry!(
                "shield_comments_deleted_total",
                "Comment records deleted through triage",
                registry
            )?,
            escalations: register_counter_with_registry!(
                "shield_escalations_total",
                "Authors escalated to the blacklist",
                registry
            )?,
            relabels: register_counter_with_registry!(
                "shield_relabels_total",
                "Records whose derived flags changed after a list update",
                registry
            )?,
            triage_failures: register_counter_with_registry!(
                "shield_triage_failures_total",
                "Triage operations that failed at a collaborator",
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                "shield_job_duration_seconds",
                "Wall time from dispatch to settlement of an analysis job",
                registry
            )?,
            loaded_comments: register_gauge_with_registry!(
                "shield_loaded_comments",
                "Records currently cached in the result set",
                registry
            )?,
        })
    }

    pub fn record_relabels(&self, count: usize) {
        self.relabels.inc_by(as_f64(count));
    }

    pub fn record_loaded(&self, added: usize, cached: usize) {
        self.comments_loaded.inc_by(as_f64(added));
        self.loaded_comments.set(as_f64(cached));
    }

    pub fn record_deleted(&self, deleted: usize, cached: usize) {
        self.comments_deleted.inc_by(as_f64(deleted));
        self.loaded_comments.set(as_f64(cached));
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_on_a_fresh_registry_only_once() {
        let registry = Registry::new();
        assert!(Metrics::new(&registry).is_ok());
        assert!(Metrics::new(&registry).is_err());
    }
}
