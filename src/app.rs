use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    api,
    clients::BackendClient,
    config::{BackendMode, Config},
    moderation::{ModerationSession, session::Collaborators},
    observability::Telemetry,
    store::memory::{
        MemoryBlacklistStore, MemoryBlockedWordStore, MemoryCommentStore, MemoryCrawlAnalyzer,
    },
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    session: Arc<ModerationSession>,
    backend: Option<Arc<BackendClient>>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn session(&self) -> &ModerationSession {
        &self.registry.session
    }

    pub(crate) fn backend(&self) -> Option<&BackendClient> {
        self.registry.backend.as_deref()
    }
}

impl ComponentRegistry {
    /// Installs telemetry, wires the collaborators for the configured mode and
    /// loads the authority lists.
    ///
    /// A list sync failure is logged and left for `/health/ready` to report.
    ///
    /// # Errors
    /// Fails when telemetry cannot be initialized or the backend client cannot be built.
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let (collaborators, backend) = match config.backend() {
            Some(backend_config) if config.backend_mode() == BackendMode::Http => {
                let client = Arc::new(
                    BackendClient::new(backend_config).context("failed to build backend client")?,
                );
                info!(
                    base_url = config.backend_base_url().unwrap_or_default(),
                    "using HTTP backend"
                );
                let collaborators = Collaborators {
                    analyzer: client.clone(),
                    comments: client.clone(),
                    blacklist: client.clone(),
                    blocked_words: client.clone(),
                };
                (collaborators, Some(client))
            }
            _ => {
                info!("using in-memory collaborators");
                (memory_collaborators(), None)
            }
        };

        let registry = Self::assemble(config, telemetry, collaborators, backend);
        if let Err(error) = registry.session.sync_lists().await {
            warn!(error = %error, "initial authority list sync failed");
        }
        Ok(registry)
    }

    /// Registry over caller-supplied collaborators. Skips the initial list sync.
    #[must_use]
    pub fn with_collaborators(
        config: Config,
        telemetry: Telemetry,
        collaborators: Collaborators,
    ) -> Self {
        Self::assemble(config, telemetry, collaborators, None)
    }

    fn assemble(
        config: Config,
        telemetry: Telemetry,
        collaborators: Collaborators,
        backend: Option<Arc<BackendClient>>,
    ) -> Self {
        let session = Arc::new(ModerationSession::new(
            collaborators,
            telemetry.metrics_arc(),
            config.crawl_timeout(),
        ));
        Self {
            config: Arc::new(config),
            telemetry,
            session,
            backend,
        }
    }

    #[must_use]
    pub fn session(&self) -> Arc<ModerationSession> {
        Arc::clone(&self.session)
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

const MEMORY_SAMPLE_COMMENTS: usize = 24;

fn memory_collaborators() -> Collaborators {
    let comments = Arc::new(MemoryCommentStore::new());
    let analyzer = MemoryCrawlAnalyzer::persisting_to(Arc::clone(&comments))
        .with_sample_comments(MEMORY_SAMPLE_COMMENTS);
    Collaborators {
        analyzer: Arc::new(analyzer),
        comments,
        blacklist: Arc::new(MemoryBlacklistStore::new()),
        blocked_words: Arc::new(MemoryBlockedWordStore::new()),
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state).layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;
    use crate::domain::{ModerationJobRequest, Scope};

    #[tokio::test]
    async fn component_registry_builds_in_memory_mode() {
        let config = {
            let _lock = ENV_MUTEX.lock().expect("env mutex");
            // SAFETY: test code adjusts deterministic environment state sequentially.
            unsafe {
                std::env::set_var("SHIELD_BACKEND_MODE", "memory");
                std::env::remove_var("SHIELD_BACKEND_BASE_URL");
                std::env::remove_var("SHIELD_CRAWL_TIMEOUT_SECS");
            }
            let config = Config::from_env().expect("config loads");
            // SAFETY: see above.
            unsafe {
                std::env::remove_var("SHIELD_BACKEND_MODE");
            }
            config
        };
        let registry = ComponentRegistry::build(config)
            .await
            .expect("registry builds");
        let state = AppState::new(registry);

        state.telemetry().record_ready_probe();
        assert!(state.backend().is_none());
        assert!(state.session().current_job().is_none());
        assert!(state.session().blacklist().list().is_empty());
    }

    #[tokio::test]
    async fn memory_mode_jobs_are_stored_for_history() {
        let registry = ComponentRegistry::with_collaborators(
            Config::memory("127.0.0.1:0".parse().expect("addr")),
            Telemetry::metrics_only().expect("telemetry"),
            memory_collaborators(),
        );
        let session = registry.session();
        let start = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).expect("date");
        let end = chrono::NaiveDate::from_ymd_opt(2024, 5, 3).expect("date");

        let job = session
            .submit(ModerationJobRequest::new("https://youtu.be/demo", start, end))
            .expect("job accepted");
        session.wait_settled(job.id).await.expect("job settles");
        assert_eq!(session.page().records.len(), MEMORY_SAMPLE_COMMENTS);

        let loaded = session
            .load_history(Scope::for_url("https://youtu.be/demo"))
            .await
            .expect("history loads");
        assert_eq!(loaded, MEMORY_SAMPLE_COMMENTS);

        let removed = session
            .discard_history("https://youtu.be/demo")
            .await
            .expect("history discarded");
        assert_eq!(removed, MEMORY_SAMPLE_COMMENTS as u64);

        let reloaded = session
            .load_history(Scope::for_url("https://youtu.be/demo"))
            .await
            .expect("history loads");
        assert_eq!(reloaded, 0);
    }
}
