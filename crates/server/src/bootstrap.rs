use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use leadpath_core::clock::SystemClock;
use leadpath_core::config::{AppConfig, ConfigError, LoadOptions};
use leadpath_db::repositories::{SqlDecisionRepository, SqlRuleRepository, SqlSlaTimerRepository};
use leadpath_db::{connect, migrations, DbPool};
use leadpath_engine::{
    ConsentProvider, EventPublisher, RosterProvider, RoutingEngine, TenantContextProvider,
};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    Ok(Application { config, db_pool })
}

/// Wires the routing engine over the SQL repositories. Provider
/// implementations are deployment-specific and injected by the caller.
pub fn build_engine(
    app: &Application,
    tenants: Arc<dyn TenantContextProvider>,
    consent: Arc<dyn ConsentProvider>,
    roster: Arc<dyn RosterProvider>,
    publisher: Arc<dyn EventPublisher>,
) -> Arc<RoutingEngine> {
    Arc::new(RoutingEngine::new(
        Arc::new(SystemClock),
        Arc::new(SqlRuleRepository::new(app.db_pool.clone())),
        Arc::new(SqlDecisionRepository::new(app.db_pool.clone())),
        Arc::new(SqlSlaTimerRepository::new(app.db_pool.clone())),
        tenants,
        consent,
        roster,
        publisher,
        app.config.routing.weights,
        app.config.sweeper.batch_limit,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadpath_core::config::{ConfigOverrides, LoadOptions};
    use leadpath_core::domain::lead::{ConsentState, ConsentStatus, Lead, LeadId, TenantId};
    use leadpath_core::domain::rule::{RoutingRule, RuleId, RuleMode};
    use leadpath_core::quiet_hours::TenantContext;
    use leadpath_core::snapshot::RosterMember;
    use leadpath_core::{AgentId, TeamId};
    use leadpath_engine::{InMemoryConsentDirectory, InMemoryPublisher, InMemoryRoster, InMemoryTenantDirectory};

    use crate::bootstrap::{bootstrap, build_engine};

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_creates_schema_on_fresh_database() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('routing_rules', 'assignments', \
             'assignment_reasons', 'lead_route_events', 'sla_timers')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline routing tables");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_one_routing_cycle() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let tenant_id = TenantId("t-1".to_string());
        let lead_id = LeadId("lead-1".to_string());

        let tenants = InMemoryTenantDirectory::new();
        tenants
            .register(
                tenant_id.clone(),
                TenantContext {
                    timezone: "America/Chicago".to_string(),
                    utc_offset_minutes: -360,
                    quiet_hours_start: None,
                    quiet_hours_end: None,
                    messaging_ready: true,
                },
            )
            .await;
        let consent = InMemoryConsentDirectory::new();
        consent
            .set(
                &tenant_id,
                &lead_id,
                ConsentState { sms: ConsentStatus::Granted, ..ConsentState::default() },
            )
            .await;
        let roster = InMemoryRoster::new();
        roster
            .set_roster(
                &tenant_id,
                vec![RosterMember {
                    agent_id: AgentId("a1".to_string()),
                    full_name: "Agent One".to_string(),
                    team_id: Some(TeamId("team-1".to_string())),
                    round_robin_order: 0,
                    active_tour_count: 1,
                }],
            )
            .await;
        let publisher = Arc::new(InMemoryPublisher::new());

        let engine = build_engine(
            &app,
            Arc::new(tenants),
            Arc::new(consent),
            Arc::new(roster),
            publisher.clone(),
        );

        let now = chrono::Utc::now();
        engine
            .create_rule(RoutingRule {
                id: RuleId("r1".to_string()),
                tenant_id: tenant_id.clone(),
                name: "all leads to team-1".to_string(),
                priority: 1,
                mode: RuleMode::FirstMatch,
                enabled: true,
                conditions_json: String::new(),
                targets_json: r#"[{"kind":"team","team_id":"team-1"}]"#.to_string(),
                fallback_json: None,
                sla_first_touch_minutes: Some(45),
                sla_kept_appointment_minutes: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("create rule");

        let result = engine
            .assign(
                &tenant_id,
                Lead { id: lead_id.clone(), source: Some("zillow".to_string()), buyer_rep: None },
                None,
            )
            .await
            .expect("assign");
        assert_eq!(result.event.assigned_agent_id, Some(AgentId("a1".to_string())));
        assert_eq!(result.timers.len(), 1);
        assert_eq!(publisher.events().len(), 1);

        let touched = engine
            .record_first_touch(&tenant_id, &lead_id, None)
            .await
            .expect("first touch");
        assert_eq!(touched.updated, 1);

        app.db_pool.close().await;
    }
}
