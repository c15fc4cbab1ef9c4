//! Assembles the coordinator, tiers and analyzer from a [`SupervisorConfig`]

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::activity::{ActivityLog, DEFAULT_ACTIVITY_CAPACITY};
use crate::agent::{AgentMonitor, AgentType};
use crate::config::{ConfigError, LocalBackend, SupervisorConfig};
use crate::escalation::engine::{EscalationCoordinator, GuidanceTiers};
use crate::guidance::{
    GuidanceProducer, HumanEscalation, InteractionAnalyzer, LocalModelSupervisor,
    RemoteAccessPreparation, RuleBasedSupervisor, StrongModelConsultant,
};
use crate::llm::{AnthropicClient, ChatClient, ChatError, OpenAiCompatibleClient};
use crate::notify::{LogOnlyNotifier, NotificationSink, WebhookNotifier};

/// A configured supervisor: one shared coordinator plus the passive analyzer
pub struct Supervisor {
    coordinator: Arc<EscalationCoordinator>,
    analyzer: Arc<dyn InteractionAnalyzer>,
    interaction_retention: usize,
}

impl Supervisor {
    pub fn from_config(config: &SupervisorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let activity = Arc::new(ActivityLog::new(
            DEFAULT_ACTIVITY_CAPACITY,
            config.activity_log_path.clone(),
        ));

        let (local, analyzer): (Arc<dyn GuidanceProducer>, Arc<dyn InteractionAnalyzer>) =
            match config.local.backend {
                LocalBackend::RuleBased => {
                    info!("Using rule-based local supervisor");
                    let rules = Arc::new(RuleBasedSupervisor::new());
                    let producer: Arc<dyn GuidanceProducer> = rules.clone();
                    let analyzer: Arc<dyn InteractionAnalyzer> = rules;
                    (producer, analyzer)
                }
                LocalBackend::LocalModel => {
                    let client: Arc<dyn ChatClient> = Arc::new(
                        OpenAiCompatibleClient::new(&config.local.base_url, None, timeout)
                            .map_err(invalid)?,
                    );
                    info!(endpoint = client.endpoint(), model = %config.local.model, "Using local model supervisor");
                    let leo = Arc::new(LocalModelSupervisor::new(client, config.local.model.clone()));
                    let producer: Arc<dyn GuidanceProducer> = leo.clone();
                    let analyzer: Arc<dyn InteractionAnalyzer> = leo;
                    (producer, analyzer)
                }
            };

        let strong_client: Option<Arc<dyn ChatClient>> = match &config.strong.api_key {
            Some(key) => {
                let client: Arc<dyn ChatClient> = Arc::new(
                    AnthropicClient::new(&config.strong.base_url, key, timeout).map_err(invalid)?,
                );
                Some(client)
            }
            None => {
                warn!("No strong model API key configured; consultations will hand off to a human");
                None
            }
        };

        let sink: Arc<dyn NotificationSink> = match &config.notification_webhook {
            Some(url) => Arc::new(
                WebhookNotifier::new(url.clone(), timeout)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            None => Arc::new(LogOnlyNotifier),
        };

        let tiers = GuidanceTiers::new()
            .with(local)
            .with(Arc::new(StrongModelConsultant::new(
                strong_client,
                config.strong.model.clone(),
            )))
            .with(Arc::new(HumanEscalation::new(sink)))
            .with(Arc::new(RemoteAccessPreparation::new(
                config.remote_access_url.clone(),
            )));

        let coordinator = EscalationCoordinator::new(config.coordinator_settings(), tiers)
            .with_activity_log(activity);

        Ok(Self {
            coordinator: Arc::new(coordinator),
            analyzer,
            interaction_retention: config.interaction_retention,
        })
    }

    pub fn coordinator(&self) -> &Arc<EscalationCoordinator> {
        &self.coordinator
    }

    /// Monitor for one agent, sharing this supervisor's coordinator
    pub fn monitor(&self, agent_id: impl Into<String>, agent_type: AgentType) -> AgentMonitor {
        AgentMonitor::new(
            agent_id,
            agent_type,
            self.analyzer.clone(),
            self.coordinator.clone(),
        )
        .with_retention(self.interaction_retention)
    }
}

fn invalid(e: ChatError) -> ConfigError {
    ConfigError::Invalid(e.to_string())
}
