use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadpath_core::domain::lead::TenantId;
use leadpath_core::domain::rule::{RoutingRule, RuleId, RuleMode};

use super::{RepositoryError, RuleRepository};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const RULE_COLUMNS: &str = "id,
    tenant_id,
    name,
    priority,
    mode,
    enabled,
    conditions_json,
    targets_json,
    fallback_json,
    sla_first_touch_minutes,
    sla_kept_appointment_minutes,
    created_at,
    updated_at";

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<RoutingRule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS}
             FROM routing_rules
             WHERE tenant_id = ?
             ORDER BY priority ASC, created_at ASC",
        ))
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        rule_id: &RuleId,
    ) -> Result<Option<RoutingRule>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS}
             FROM routing_rules
             WHERE tenant_id = ? AND id = ?",
        ))
        .bind(&tenant_id.0)
        .bind(&rule_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(rule_from_row).transpose()
    }

    async fn create(&self, rule: RoutingRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO routing_rules (
                id,
                tenant_id,
                name,
                priority,
                mode,
                enabled,
                conditions_json,
                targets_json,
                fallback_json,
                sla_first_touch_minutes,
                sla_kept_appointment_minutes,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id.0)
        .bind(&rule.tenant_id.0)
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule.mode.as_str())
        .bind(rule.enabled)
        .bind(&rule.conditions_json)
        .bind(&rule.targets_json)
        .bind(rule.fallback_json.as_deref())
        .bind(rule.sla_first_touch_minutes)
        .bind(rule.sla_kept_appointment_minutes)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, rule: RoutingRule) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE routing_rules SET
                name = ?,
                priority = ?,
                mode = ?,
                enabled = ?,
                conditions_json = ?,
                targets_json = ?,
                fallback_json = ?,
                sla_first_touch_minutes = ?,
                sla_kept_appointment_minutes = ?,
                updated_at = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule.mode.as_str())
        .bind(rule.enabled)
        .bind(&rule.conditions_json)
        .bind(&rule.targets_json)
        .bind(rule.fallback_json.as_deref())
        .bind(rule.sla_first_touch_minutes)
        .bind(rule.sla_kept_appointment_minutes)
        .bind(rule.updated_at.to_rfc3339())
        .bind(&rule.tenant_id.0)
        .bind(&rule.id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(
        &self,
        tenant_id: &TenantId,
        rule_id: &RuleId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM routing_rules WHERE tenant_id = ? AND id = ?")
            .bind(&tenant_id.0)
            .bind(&rule_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn rule_from_row(row: SqliteRow) -> Result<RoutingRule, RepositoryError> {
    let mode_raw = row.try_get::<String, _>("mode")?;
    let mode = RuleMode::parse(&mode_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown rule mode `{mode_raw}`")))?;

    Ok(RoutingRule {
        id: RuleId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        priority: row.try_get("priority")?,
        mode,
        enabled: row.try_get("enabled")?,
        conditions_json: row.try_get("conditions_json")?,
        targets_json: row.try_get("targets_json")?,
        fallback_json: row.try_get("fallback_json")?,
        sla_first_touch_minutes: row.try_get("sla_first_touch_minutes")?,
        sla_kept_appointment_minutes: row.try_get("sla_kept_appointment_minutes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use leadpath_core::domain::lead::TenantId;
    use leadpath_core::domain::rule::{RoutingRule, RuleId, RuleMode};

    use super::SqlRuleRepository;
    use crate::repositories::RuleRepository;
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

    fn rule(id: &str, priority: i64, created_at: DateTime<Utc>) -> RoutingRule {
        RoutingRule {
            id: RuleId(id.to_string()),
            tenant_id: TenantId("t-1".to_string()),
            name: format!("rule {id}"),
            priority,
            mode: RuleMode::FirstMatch,
            enabled: true,
            conditions_json: String::new(),
            targets_json: r#"[{"kind":"agent","agent_id":"a1"}]"#.to_string(),
            fallback_json: Some(r#"{"team_id":"pond-1"}"#.to_string()),
            sla_first_touch_minutes: Some(45),
            sla_kept_appointment_minutes: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn rules_round_trip_and_list_in_priority_order() {
        let pool = setup_pool().await;
        let repo = SqlRuleRepository::new(pool.clone());
        let base = parse_ts("2026-03-01T09:00:00Z");

        // Same priority: creation order breaks the tie.
        repo.create(rule("r-late", 2, base + Duration::seconds(10))).await.expect("create");
        repo.create(rule("r-early", 2, base)).await.expect("create");
        repo.create(rule("r-first", 1, base + Duration::seconds(20))).await.expect("create");

        let listed =
            repo.list_for_tenant(&TenantId("t-1".to_string())).await.expect("list rules");
        let ids: Vec<&str> = listed.iter().map(|rule| rule.id.0.as_str()).collect();
        assert_eq!(ids, vec!["r-first", "r-early", "r-late"]);

        let found = repo
            .find_by_id(&TenantId("t-1".to_string()), &RuleId("r-first".to_string()))
            .await
            .expect("find rule");
        assert_eq!(found.as_ref().map(|rule| rule.priority), Some(1));

        pool.close().await;
    }

    #[tokio::test]
    async fn update_and_delete_report_row_presence() {
        let pool = setup_pool().await;
        let repo = SqlRuleRepository::new(pool.clone());
        let base = parse_ts("2026-03-01T09:00:00Z");

        repo.create(rule("r1", 1, base)).await.expect("create");

        let mut updated = rule("r1", 5, base);
        updated.enabled = false;
        updated.updated_at = base + Duration::minutes(1);
        assert!(repo.update(updated).await.expect("update"));

        let found = repo
            .find_by_id(&TenantId("t-1".to_string()), &RuleId("r1".to_string()))
            .await
            .expect("find rule")
            .expect("rule exists");
        assert_eq!(found.priority, 5);
        assert!(!found.enabled);

        assert!(repo
            .delete(&TenantId("t-1".to_string()), &RuleId("r1".to_string()))
            .await
            .expect("delete"));
        assert!(!repo
            .delete(&TenantId("t-1".to_string()), &RuleId("r1".to_string()))
            .await
            .expect("second delete"));

        pool.close().await;
    }

    #[tokio::test]
    async fn rules_are_tenant_scoped() {
        let pool = setup_pool().await;
        let repo = SqlRuleRepository::new(pool.clone());
        repo.create(rule("r1", 1, parse_ts("2026-03-01T09:00:00Z"))).await.expect("create");

        let other = repo
            .list_for_tenant(&TenantId("t-other".to_string()))
            .await
            .expect("list other tenant");
        assert!(other.is_empty());

        pool.close().await;
    }
}
