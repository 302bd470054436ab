use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadpath_core::domain::candidate::AgentId;
use leadpath_core::domain::lead::{LeadId, TenantId};
use leadpath_core::domain::rule::RuleId;
use leadpath_core::domain::timer::{SlaTimer, SlaTimerId, SlaTimerStatus, SlaTimerType};

use super::rule::{parse_optional_timestamp, parse_timestamp};
use super::{RepositoryError, SlaTimerRepository};
use crate::DbPool;

pub struct SqlSlaTimerRepository {
    pool: DbPool,
}

impl SqlSlaTimerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TIMER_COLUMNS: &str = "id,
    tenant_id,
    lead_id,
    rule_id,
    assigned_agent_id,
    timer_type,
    status,
    due_at,
    satisfied_at,
    breached_at,
    created_at";

#[async_trait::async_trait]
impl SlaTimerRepository for SqlSlaTimerRepository {
    async fn due_pending(
        &self,
        tenant_id: Option<&TenantId>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SlaTimer>, RepositoryError> {
        let rows = if let Some(tenant_id) = tenant_id {
            sqlx::query(&format!(
                "SELECT {TIMER_COLUMNS}
                 FROM sla_timers
                 WHERE status = 'pending' AND due_at <= ? AND tenant_id = ?
                 ORDER BY due_at ASC
                 LIMIT ?",
            ))
            .bind(now.to_rfc3339())
            .bind(&tenant_id.0)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {TIMER_COLUMNS}
                 FROM sla_timers
                 WHERE status = 'pending' AND due_at <= ?
                 ORDER BY due_at ASC
                 LIMIT ?",
            ))
            .bind(now.to_rfc3339())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(timer_from_row).collect()
    }

    async fn has_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM sla_timers
             WHERE tenant_id = ? AND lead_id = ? AND timer_type = ? AND status = 'pending'",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(timer_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("count")? > 0)
    }

    async fn mark_breached(
        &self,
        timer_id: &SlaTimerId,
        breached_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE sla_timers
             SET status = 'breached', breached_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(breached_at.to_rfc3339())
        .bind(&timer_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn satisfy_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        timer_type: SlaTimerType,
        satisfied_at: DateTime<Utc>,
    ) -> Result<Vec<SlaTimer>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "UPDATE sla_timers
             SET status = 'satisfied', satisfied_at = ?
             WHERE tenant_id = ? AND lead_id = ? AND timer_type = ? AND status = 'pending'
             RETURNING {TIMER_COLUMNS}",
        ))
        .bind(satisfied_at.to_rfc3339())
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(timer_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(timer_from_row).collect()
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<SlaTimer>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TIMER_COLUMNS}
             FROM sla_timers
             WHERE tenant_id = ?
             ORDER BY created_at ASC",
        ))
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(timer_from_row).collect()
    }
}

fn timer_from_row(row: SqliteRow) -> Result<SlaTimer, RepositoryError> {
    let type_raw = row.try_get::<String, _>("timer_type")?;
    let timer_type = SlaTimerType::parse(&type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown timer type `{type_raw}`")))?;
    let status_raw = row.try_get::<String, _>("status")?;
    let status = SlaTimerStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown timer status `{status_raw}`")))?;

    Ok(SlaTimer {
        id: SlaTimerId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        rule_id: row.try_get::<Option<String>, _>("rule_id")?.map(RuleId),
        assigned_agent_id: row.try_get::<Option<String>, _>("assigned_agent_id")?.map(AgentId),
        timer_type,
        status,
        due_at: parse_timestamp("due_at", row.try_get("due_at")?)?,
        satisfied_at: parse_optional_timestamp("satisfied_at", row.try_get("satisfied_at")?)?,
        breached_at: parse_optional_timestamp("breached_at", row.try_get("breached_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use leadpath_core::domain::lead::{LeadId, TenantId};
    use leadpath_core::domain::timer::{SlaTimer, SlaTimerId, SlaTimerStatus, SlaTimerType};

    use super::SqlSlaTimerRepository;
    use crate::repositories::{DecisionRepository, NewDecision, SlaTimerRepository};
    use crate::repositories::decision::SqlDecisionRepository;
    use crate::{connect, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let config = leadpath_core::config::DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
            busy_timeout_ms: 5_000,
        };
        let pool = connect(&config).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn timer(id: &str, lead: &str, due_at: DateTime<Utc>) -> SlaTimer {
        SlaTimer {
            id: SlaTimerId(id.to_string()),
            tenant_id: TenantId("t-1".to_string()),
            lead_id: LeadId(lead.to_string()),
            rule_id: None,
            assigned_agent_id: None,
            timer_type: SlaTimerType::FirstTouch,
            status: SlaTimerStatus::Pending,
            due_at,
            satisfied_at: None,
            breached_at: None,
            created_at: due_at - Duration::minutes(45),
        }
    }

    async fn insert_timers(pool: &DbPool, timers: Vec<SlaTimer>) {
        let decisions = SqlDecisionRepository::new(pool.clone());
        for (index, timer) in timers.into_iter().enumerate() {
            let event = leadpath_core::domain::assignment::LeadRouteEvent {
                id: leadpath_core::domain::assignment::LeadRouteEventId(format!("evt-{index}")),
                tenant_id: timer.tenant_id.clone(),
                lead_id: timer.lead_id.clone(),
                matched_rule_id: None,
                mode: leadpath_core::domain::rule::RuleMode::FirstMatch,
                payload_json: "{}".to_string(),
                candidates: Vec::new(),
                assigned_agent_id: None,
                fallback_used: false,
                reason_codes: Vec::new(),
                sla_due_at: Some(timer.due_at),
                sla_satisfied_at: None,
                sla_breached_at: None,
                actor_user_id: None,
                created_at: timer.created_at,
            };
            decisions
                .record_decision(NewDecision { assignment: None, timers: vec![timer], event })
                .await
                .expect("insert timer");
        }
    }

    #[tokio::test]
    async fn due_pending_returns_only_overdue_pending_timers() {
        let pool = setup_pool().await;
        let repo = SqlSlaTimerRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T10:00:00Z");

        insert_timers(
            &pool,
            vec![
                timer("tmr-due", "lead-1", now - Duration::minutes(1)),
                timer("tmr-future", "lead-2", now + Duration::minutes(30)),
            ],
        )
        .await;

        let due = repo.due_pending(None, now, 100).await.expect("due pending");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, SlaTimerId("tmr-due".to_string()));

        let scoped = repo
            .due_pending(Some(&TenantId("t-other".to_string())), now, 100)
            .await
            .expect("tenant scoped");
        assert!(scoped.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_breached_is_conditional_on_pending_status() {
        let pool = setup_pool().await;
        let repo = SqlSlaTimerRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T10:00:00Z");

        insert_timers(&pool, vec![timer("tmr-1", "lead-1", now - Duration::minutes(1))]).await;

        assert!(repo.mark_breached(&SlaTimerId("tmr-1".to_string()), now).await.expect("breach"));
        // Overlapping sweep: second flip must be a no-op.
        assert!(!repo
            .mark_breached(&SlaTimerId("tmr-1".to_string()), now)
            .await
            .expect("second breach"));

        pool.close().await;
    }

    #[tokio::test]
    async fn satisfy_pending_is_idempotent() {
        let pool = setup_pool().await;
        let repo = SqlSlaTimerRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T10:00:00Z");
        let tenant = TenantId("t-1".to_string());
        let lead = LeadId("lead-1".to_string());

        insert_timers(&pool, vec![timer("tmr-1", "lead-1", now + Duration::minutes(45))]).await;

        let flipped = repo
            .satisfy_pending(&tenant, &lead, SlaTimerType::FirstTouch, now)
            .await
            .expect("satisfy");
        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].id, SlaTimerId("tmr-1".to_string()));
        assert_eq!(flipped[0].status, SlaTimerStatus::Satisfied);
        assert_eq!(flipped[0].satisfied_at, Some(now));

        let second = repo
            .satisfy_pending(&tenant, &lead, SlaTimerType::FirstTouch, now)
            .await
            .expect("second satisfy");
        assert!(second.is_empty());

        assert!(!repo
            .has_pending(&tenant, &lead, SlaTimerType::FirstTouch)
            .await
            .expect("has pending"));

        pool.close().await;
    }

    #[tokio::test]
    async fn satisfied_timer_is_never_swept() {
        let pool = setup_pool().await;
        let repo = SqlSlaTimerRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T10:00:00Z");
        let tenant = TenantId("t-1".to_string());
        let lead = LeadId("lead-1".to_string());

        insert_timers(&pool, vec![timer("tmr-1", "lead-1", now + Duration::minutes(45))]).await;
        repo.satisfy_pending(&tenant, &lead, SlaTimerType::FirstTouch, now)
            .await
            .expect("satisfy");

        let due = repo
            .due_pending(None, now + Duration::hours(2), 100)
            .await
            .expect("due after satisfy");
        assert!(due.is_empty());

        pool.close().await;
    }
}
