//! Foundry root service - wires the store, classifier, build capability,
//! and every domain service into one handle.
//!
//! Construction goes through [`FoundryBuilder`]; configuration decides
//! the remote backends, injected parts win over configured ones.

use std::sync::Arc;

use tracing::info;

use catalog::{CatalogError, CatalogStore, Result, User, UserTier};
use foundry_agent::{
    BuildCapability, RemoteAnalyzer, RemoteBuilder, SafetyClassifier, SemanticAnalyzer,
};

use crate::admin::AdminService;
use crate::build::{BuildOrchestrator, JobStore, MemoryJobStore};
use crate::config::FoundryConfig;
use crate::feedback::FeedbackService;
use crate::requests::RequestService;
use crate::reviews::ReviewsService;
use crate::subscriptions::SubscriptionService;

/// One fully wired Foundry instance.
///
/// Every domain service shares the same [`CatalogStore`] and the same
/// [`BuildOrchestrator`], so a request approved through [`Foundry::requests`]
/// is the same record the orchestrator later completes.
pub struct Foundry {
    config: FoundryConfig,
    store: CatalogStore,
    orchestrator: Arc<BuildOrchestrator>,
    /// Request lifecycle: submit, screen, approve, reject, vote.
    pub requests: RequestService,
    /// Feedback intake and the rebuild trigger.
    pub feedback: FeedbackService,
    /// Community reviews.
    pub reviews: ReviewsService,
    /// App subscriptions and release notifications.
    pub subscriptions: SubscriptionService,
    /// Tier management and catalog curation.
    pub admin: AdminService,
}

impl Foundry {
    /// Builder with a default configuration.
    pub fn builder(instance: impl Into<String>) -> FoundryBuilder {
        FoundryBuilder::new(instance)
    }

    pub fn config(&self) -> &FoundryConfig {
        &self.config
    }

    /// The shared store. Route handlers read entities through this.
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// The build orchestrator, for job polling and cancellation.
    pub fn orchestrator(&self) -> &Arc<BuildOrchestrator> {
        &self.orchestrator
    }

    /// Seed the first admin account. Refuses once any admin exists, so
    /// a deployed instance cannot be re-seeded into a second superuser.
    pub async fn seed_admin(&self, username: &str) -> Result<User> {
        if self.store.active_admin_count().await > 0 {
            return Err(CatalogError::Conflict(
                "an admin account already exists".to_string(),
            ));
        }
        let admin = self
            .store
            .insert_user(User::new(username, UserTier::Admin))
            .await?;
        info!(username = %username, "seeded initial admin");
        Ok(admin)
    }
}

/// Builds a [`Foundry`] from configuration plus optional injected parts.
///
/// An injected capability, analyzer, store, or job store always wins over
/// what the configuration would construct. Remote backends come from
/// `builder.endpoint` and `safety.analyzer_url`; with neither an endpoint
/// nor an injected capability there is nothing to run builds with, and
/// [`FoundryBuilder::build`] refuses.
pub struct FoundryBuilder {
    config: FoundryConfig,
    store: Option<CatalogStore>,
    capability: Option<Arc<dyn BuildCapability>>,
    analyzer: Option<Arc<dyn SemanticAnalyzer>>,
    jobs: Option<Arc<dyn JobStore>>,
}

impl FoundryBuilder {
    pub fn new(instance: impl Into<String>) -> Self {
        let config = FoundryConfig {
            instance: instance.into(),
            ..FoundryConfig::default()
        };
        Self {
            config,
            store: None,
            capability: None,
            analyzer: None,
            jobs: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: FoundryConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing store instead of starting empty.
    pub fn with_store(mut self, store: CatalogStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Inject a build capability (tests use [`foundry_agent::MockBuilder`]).
    pub fn with_capability(mut self, capability: Arc<dyn BuildCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Inject a semantic analyzer consulted after the safety rules.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SemanticAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Inject a job store (default is in-memory).
    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Set the remote build service endpoint.
    pub fn builder_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.builder.endpoint = Some(endpoint.into());
        self
    }

    /// Set the wall-clock ceiling for one external build call.
    pub fn build_timeout_secs(mut self, secs: u64) -> Self {
        self.config.builder.build_timeout_secs = secs;
        self
    }

    /// Set how many builds may run at once.
    pub fn max_concurrent_builds(mut self, n: usize) -> Self {
        self.config.builder.max_concurrent_builds = n;
        self
    }

    /// Set the directory finished package archives are written to.
    pub fn packages_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.packages.dir = dir.into();
        self
    }

    /// Wire everything up.
    pub fn build(self) -> Result<Foundry> {
        let config = self.config;
        let store = self.store.unwrap_or_default();

        let capability: Arc<dyn BuildCapability> = match self.capability {
            Some(capability) => capability,
            None => match &config.builder.endpoint {
                Some(endpoint) => Arc::new(RemoteBuilder::new(
                    endpoint.clone(),
                    config.builder.api_key.clone(),
                )),
                None => {
                    return Err(CatalogError::Validation(
                        "no build capability: set builder.endpoint or inject one".to_string(),
                    ))
                }
            },
        };

        let analyzer = self.analyzer.or_else(|| {
            if !config.safety.semantic_analysis {
                return None;
            }
            config.safety.analyzer_url.as_ref().map(|url| {
                Arc::new(RemoteAnalyzer::new(
                    url.clone(),
                    config.safety.analyzer_api_key.clone(),
                )) as Arc<dyn SemanticAnalyzer>
            })
        });
        let mut classifier = SafetyClassifier::new();
        if let Some(analyzer) = analyzer {
            classifier = classifier.with_analyzer(analyzer);
        }
        let classifier = Arc::new(classifier);

        let jobs = self
            .jobs
            .unwrap_or_else(|| Arc::new(MemoryJobStore::new()));
        let orchestrator = Arc::new(BuildOrchestrator::new(
            &config,
            store.clone(),
            jobs,
            Arc::clone(&capability),
            Arc::clone(&classifier),
        ));

        let subscriptions = SubscriptionService::new(store.clone());
        info!(instance = %config.instance, "foundry wired");

        Ok(Foundry {
            requests: RequestService::new(
                config.clone(),
                store.clone(),
                Arc::clone(&classifier),
                Arc::clone(&orchestrator),
            ),
            feedback: FeedbackService::new(store.clone(), Arc::clone(&orchestrator)),
            reviews: ReviewsService::new(store.clone()),
            admin: AdminService::new(store.clone(), subscriptions.clone()),
            subscriptions,
            orchestrator,
            store,
            config,
        })
    }
}
