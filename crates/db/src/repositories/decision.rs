use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};
use uuid::Uuid;

use leadpath_core::domain::assignment::{
    Assignment, AssignmentId, AssignmentReason, LeadRouteEvent, LeadRouteEventId, RouteCandidate,
};
use leadpath_core::domain::candidate::AgentId;
use leadpath_core::domain::lead::{LeadId, TenantId};
use leadpath_core::domain::rule::{RuleId, RuleMode};
use leadpath_core::domain::timer::SlaTimer;

use super::rule::{parse_optional_timestamp, parse_timestamp};
use super::{DecisionRepository, NewDecision, RepositoryError};
use crate::DbPool;

pub struct SqlDecisionRepository {
    pool: DbPool,
}

impl SqlDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DecisionRepository for SqlDecisionRepository {
    async fn record_decision(&self, decision: NewDecision) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(assignment) = &decision.assignment {
            insert_assignment_tx(&mut tx, assignment).await?;
        }
        for timer in &decision.timers {
            insert_timer_tx(&mut tx, timer).await?;
        }
        insert_event_tx(&mut tx, &decision.event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_assignment_tx(&mut tx, &assignment).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_event_satisfied(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        rule_id: Option<&RuleId>,
        satisfied_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let rule = rule_id.map(|rule_id| rule_id.0.as_str());
        sqlx::query(
            "UPDATE lead_route_events
             SET sla_satisfied_at = ?
             WHERE id = (
                 SELECT id FROM lead_route_events
                 WHERE tenant_id = ? AND lead_id = ?
                   AND (? IS NULL OR matched_rule_id = ?)
                 ORDER BY created_at DESC
                 LIMIT 1
             ) AND sla_satisfied_at IS NULL",
        )
        .bind(satisfied_at.to_rfc3339())
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(rule)
        .bind(rule)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_event_breached(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        rule_id: Option<&RuleId>,
        reason_code: &str,
        breached_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let rule = rule_id.map(|rule_id| rule_id.0.as_str());
        let row = sqlx::query(
            "SELECT id, reason_codes_json FROM lead_route_events
             WHERE tenant_id = ? AND lead_id = ?
               AND (? IS NULL OR matched_rule_id = ?)
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(rule)
        .bind(rule)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(()) };
        let event_id = row.try_get::<String, _>("id")?;
        let mut reason_codes: Vec<String> =
            serde_json::from_str(&row.try_get::<String, _>("reason_codes_json")?)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        if !reason_codes.iter().any(|code| code == reason_code) {
            reason_codes.push(reason_code.to_string());
        }
        let reason_codes_json = serde_json::to_string(&reason_codes)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "UPDATE lead_route_events
             SET sla_breached_at = COALESCE(sla_breached_at, ?),
                 reason_codes_json = ?
             WHERE id = ?",
        )
        .bind(breached_at.to_rfc3339())
        .bind(reason_codes_json)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_events_for_lead(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<LeadRouteEvent>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM lead_route_events
             WHERE tenant_id = ? AND lead_id = ?
             ORDER BY created_at ASC",
        ))
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn list_events_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<LeadRouteEvent>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM lead_route_events
             WHERE tenant_id = ?
             ORDER BY created_at ASC",
        ))
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn list_assignments_for_lead(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, person_id, agent_id, team_id, score, created_at
             FROM assignments
             WHERE tenant_id = ? AND person_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut assignments = Vec::with_capacity(rows.len());
        for row in rows {
            let mut assignment = assignment_from_row(row)?;
            let reason_rows = sqlx::query(
                "SELECT reason_type, description, weight
                 FROM assignment_reasons
                 WHERE assignment_id = ?
                 ORDER BY id ASC",
            )
            .bind(&assignment.id.0)
            .fetch_all(&self.pool)
            .await?;
            assignment.reasons = reason_rows
                .into_iter()
                .map(|row| {
                    Ok(AssignmentReason {
                        reason_type: row.try_get("reason_type")?,
                        description: row.try_get("description")?,
                        weight: row.try_get("weight")?,
                    })
                })
                .collect::<Result<Vec<_>, RepositoryError>>()?;
            assignments.push(assignment);
        }

        Ok(assignments)
    }
}

const EVENT_COLUMNS: &str = "id,
    tenant_id,
    lead_id,
    matched_rule_id,
    mode,
    payload_json,
    candidates_json,
    assigned_agent_id,
    fallback_used,
    reason_codes_json,
    sla_due_at,
    sla_satisfied_at,
    sla_breached_at,
    actor_user_id,
    created_at";

async fn insert_assignment_tx(
    tx: &mut Transaction<'_, Sqlite>,
    assignment: &Assignment,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO assignments (id, tenant_id, person_id, agent_id, team_id, score, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&assignment.id.0)
    .bind(&assignment.tenant_id.0)
    .bind(&assignment.person_id.0)
    .bind(assignment.agent_id.as_ref().map(|agent_id| agent_id.0.as_str()))
    .bind(assignment.team_id.as_ref().map(|team_id| team_id.0.as_str()))
    .bind(assignment.score)
    .bind(assignment.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    for reason in &assignment.reasons {
        sqlx::query(
            "INSERT INTO assignment_reasons (id, assignment_id, reason_type, description, weight)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&assignment.id.0)
        .bind(&reason.reason_type)
        .bind(&reason.description)
        .bind(reason.weight)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn insert_timer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timer: &SlaTimer,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO sla_timers (
            id,
            tenant_id,
            lead_id,
            rule_id,
            assigned_agent_id,
            timer_type,
            status,
            due_at,
            satisfied_at,
            breached_at,
            created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&timer.id.0)
    .bind(&timer.tenant_id.0)
    .bind(&timer.lead_id.0)
    .bind(timer.rule_id.as_ref().map(|rule_id| rule_id.0.as_str()))
    .bind(timer.assigned_agent_id.as_ref().map(|agent_id| agent_id.0.as_str()))
    .bind(timer.timer_type.as_str())
    .bind(timer.status.as_str())
    .bind(timer.due_at.to_rfc3339())
    .bind(timer.satisfied_at.map(|value| value.to_rfc3339()))
    .bind(timer.breached_at.map(|value| value.to_rfc3339()))
    .bind(timer.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_event_tx(
    tx: &mut Transaction<'_, Sqlite>,
    event: &LeadRouteEvent,
) -> Result<(), RepositoryError> {
    let candidates_json = serde_json::to_string(&event.candidates)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let reason_codes_json = serde_json::to_string(&event.reason_codes)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    sqlx::query(
        "INSERT INTO lead_route_events (
            id,
            tenant_id,
            lead_id,
            matched_rule_id,
            mode,
            payload_json,
            candidates_json,
            assigned_agent_id,
            fallback_used,
            reason_codes_json,
            sla_due_at,
            sla_satisfied_at,
            sla_breached_at,
            actor_user_id,
            created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id.0)
    .bind(&event.tenant_id.0)
    .bind(&event.lead_id.0)
    .bind(event.matched_rule_id.as_ref().map(|rule_id| rule_id.0.as_str()))
    .bind(event.mode.as_str())
    .bind(&event.payload_json)
    .bind(candidates_json)
    .bind(event.assigned_agent_id.as_ref().map(|agent_id| agent_id.0.as_str()))
    .bind(event.fallback_used)
    .bind(reason_codes_json)
    .bind(event.sla_due_at.map(|value| value.to_rfc3339()))
    .bind(event.sla_satisfied_at.map(|value| value.to_rfc3339()))
    .bind(event.sla_breached_at.map(|value| value.to_rfc3339()))
    .bind(event.actor_user_id.as_deref())
    .bind(event.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn assignment_from_row(row: SqliteRow) -> Result<Assignment, RepositoryError> {
    Ok(Assignment {
        id: AssignmentId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        person_id: LeadId(row.try_get("person_id")?),
        agent_id: row.try_get::<Option<String>, _>("agent_id")?.map(AgentId),
        team_id: row
            .try_get::<Option<String>, _>("team_id")?
            .map(leadpath_core::domain::candidate::TeamId),
        score: row.try_get("score")?,
        reasons: Vec::new(),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn event_from_row(row: SqliteRow) -> Result<LeadRouteEvent, RepositoryError> {
    let mode_raw = row.try_get::<String, _>("mode")?;
    let mode = RuleMode::parse(&mode_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event mode `{mode_raw}`")))?;
    let candidates: Vec<RouteCandidate> =
        serde_json::from_str(&row.try_get::<String, _>("candidates_json")?)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let reason_codes: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("reason_codes_json")?)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(LeadRouteEvent {
        id: LeadRouteEventId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        matched_rule_id: row.try_get::<Option<String>, _>("matched_rule_id")?.map(RuleId),
        mode,
        payload_json: row.try_get("payload_json")?,
        candidates,
        assigned_agent_id: row.try_get::<Option<String>, _>("assigned_agent_id")?.map(AgentId),
        fallback_used: row.try_get("fallback_used")?,
        reason_codes,
        sla_due_at: parse_optional_timestamp("sla_due_at", row.try_get("sla_due_at")?)?,
        sla_satisfied_at: parse_optional_timestamp(
            "sla_satisfied_at",
            row.try_get("sla_satisfied_at")?,
        )?,
        sla_breached_at: parse_optional_timestamp(
            "sla_breached_at",
            row.try_get("sla_breached_at")?,
        )?,
        actor_user_id: row.try_get("actor_user_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use leadpath_core::domain::assignment::{
        Assignment, AssignmentId, AssignmentReason, LeadRouteEvent, LeadRouteEventId,
    };
    use leadpath_core::domain::candidate::AgentId;
    use leadpath_core::domain::lead::{LeadId, TenantId};
    use leadpath_core::domain::rule::{RuleId, RuleMode};
    use leadpath_core::domain::timer::{SlaTimer, SlaTimerId, SlaTimerStatus, SlaTimerType};

    use super::SqlDecisionRepository;
    use crate::repositories::{DecisionRepository, NewDecision, SlaTimerRepository};
    use crate::repositories::timer::SqlSlaTimerRepository;
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

    fn tenant() -> TenantId {
        TenantId("t-1".to_string())
    }

    fn lead() -> LeadId {
        LeadId("lead-1".to_string())
    }

    fn assignment(created_at: DateTime<Utc>) -> Assignment {
        Assignment {
            id: AssignmentId("asg-1".to_string()),
            tenant_id: tenant(),
            person_id: lead(),
            agent_id: Some(AgentId("a1".to_string())),
            team_id: None,
            score: 0.82,
            reasons: vec![AssignmentReason {
                reason_type: "AGENT_TARGET".to_string(),
                description: "direct agent target".to_string(),
                weight: 0.82,
            }],
            created_at,
        }
    }

    fn event(created_at: DateTime<Utc>) -> LeadRouteEvent {
        event_for("evt-1", "r1", created_at)
    }

    fn event_for(id: &str, rule: &str, created_at: DateTime<Utc>) -> LeadRouteEvent {
        LeadRouteEvent {
            id: LeadRouteEventId(id.to_string()),
            tenant_id: tenant(),
            lead_id: lead(),
            matched_rule_id: Some(RuleId(rule.to_string())),
            mode: RuleMode::FirstMatch,
            payload_json: "{}".to_string(),
            candidates: Vec::new(),
            assigned_agent_id: Some(AgentId("a1".to_string())),
            fallback_used: false,
            reason_codes: vec!["AGENT_TARGET".to_string()],
            sla_due_at: Some(created_at + Duration::minutes(45)),
            sla_satisfied_at: None,
            sla_breached_at: None,
            actor_user_id: None,
            created_at,
        }
    }

    fn timer(created_at: DateTime<Utc>) -> SlaTimer {
        SlaTimer {
            id: SlaTimerId("tmr-1".to_string()),
            tenant_id: tenant(),
            lead_id: lead(),
            rule_id: Some(RuleId("r1".to_string())),
            assigned_agent_id: Some(AgentId("a1".to_string())),
            timer_type: SlaTimerType::FirstTouch,
            status: SlaTimerStatus::Pending,
            due_at: created_at + Duration::minutes(45),
            satisfied_at: None,
            breached_at: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn record_decision_commits_assignment_timers_and_event_together() {
        let pool = setup_pool().await;
        let repo = SqlDecisionRepository::new(pool.clone());
        let timers = SqlSlaTimerRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");

        repo.record_decision(NewDecision {
            assignment: Some(assignment(now)),
            timers: vec![timer(now)],
            event: event(now),
        })
        .await
        .expect("record decision");

        let events = repo.list_events_for_lead(&tenant(), &lead()).await.expect("list events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].assigned_agent_id, Some(AgentId("a1".to_string())));

        let assignments =
            repo.list_assignments_for_lead(&tenant(), &lead()).await.expect("list assignments");
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].reasons.len(), 1);

        assert!(timers
            .has_pending(&tenant(), &lead(), SlaTimerType::FirstTouch)
            .await
            .expect("has pending"));

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_event_id_rolls_back_the_whole_decision() {
        let pool = setup_pool().await;
        let repo = SqlDecisionRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");

        repo.record_decision(NewDecision {
            assignment: None,
            timers: Vec::new(),
            event: event(now),
        })
        .await
        .expect("first decision");

        // Same event id again, but with a fresh assignment: the
        // conflict must roll the assignment back too.
        let result = repo
            .record_decision(NewDecision {
                assignment: Some(assignment(now)),
                timers: Vec::new(),
                event: event(now),
            })
            .await;
        assert!(result.is_err());

        let assignments =
            repo.list_assignments_for_lead(&tenant(), &lead()).await.expect("list assignments");
        assert!(assignments.is_empty(), "rolled-back assignment must not persist");

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_event_breached_appends_reason_code_once() {
        let pool = setup_pool().await;
        let repo = SqlDecisionRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");

        repo.record_decision(NewDecision {
            assignment: None,
            timers: Vec::new(),
            event: event(now),
        })
        .await
        .expect("record decision");

        let rule = RuleId("r1".to_string());
        let breached_at = now + Duration::minutes(46);
        repo.mark_event_breached(&tenant(), &lead(), Some(&rule), "FIRST_TOUCH_BREACHED", breached_at)
            .await
            .expect("mark breached");
        repo.mark_event_breached(&tenant(), &lead(), Some(&rule), "FIRST_TOUCH_BREACHED", breached_at)
            .await
            .expect("mark breached again");

        let events = repo.list_events_for_lead(&tenant(), &lead()).await.expect("list events");
        assert_eq!(events[0].sla_breached_at, Some(breached_at));
        let breach_codes = events[0]
            .reason_codes
            .iter()
            .filter(|code| code.as_str() == "FIRST_TOUCH_BREACHED")
            .count();
        assert_eq!(breach_codes, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_event_satisfied_stamps_latest_event_only_once() {
        let pool = setup_pool().await;
        let repo = SqlDecisionRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");

        repo.record_decision(NewDecision {
            assignment: None,
            timers: Vec::new(),
            event: event(now),
        })
        .await
        .expect("record decision");

        let rule = RuleId("r1".to_string());
        let first_touch = now + Duration::minutes(10);
        repo.mark_event_satisfied(&tenant(), &lead(), Some(&rule), first_touch)
            .await
            .expect("satisfy");
        repo.mark_event_satisfied(&tenant(), &lead(), Some(&rule), now + Duration::minutes(20))
            .await
            .expect("second satisfy");

        let events = repo.list_events_for_lead(&tenant(), &lead()).await.expect("list events");
        assert_eq!(events[0].sla_satisfied_at, Some(first_touch));

        pool.close().await;
    }

    #[tokio::test]
    async fn breach_stamp_lands_on_the_rules_own_event_not_the_newest() {
        let pool = setup_pool().await;
        let repo = SqlDecisionRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T09:00:00Z");

        // First route under r1, then a re-route under r2 appends a
        // newer event for the same lead.
        repo.record_decision(NewDecision {
            assignment: None,
            timers: Vec::new(),
            event: event_for("evt-1", "r1", now),
        })
        .await
        .expect("first decision");
        repo.record_decision(NewDecision {
            assignment: None,
            timers: Vec::new(),
            event: event_for("evt-2", "r2", now + Duration::minutes(5)),
        })
        .await
        .expect("second decision");

        let rule = RuleId("r1".to_string());
        let breached_at = now + Duration::minutes(46);
        repo.mark_event_breached(&tenant(), &lead(), Some(&rule), "FIRST_TOUCH_BREACHED", breached_at)
            .await
            .expect("mark breached");
        repo.mark_event_satisfied(&tenant(), &lead(), Some(&rule), breached_at)
            .await
            .expect("mark satisfied");

        let events = repo.list_events_for_lead(&tenant(), &lead()).await.expect("list events");
        assert_eq!(events[0].sla_breached_at, Some(breached_at));
        assert_eq!(events[0].sla_satisfied_at, Some(breached_at));
        assert_eq!(events[1].sla_breached_at, None, "the newer event keeps its own stamps");
        assert_eq!(events[1].sla_satisfied_at, None);

        pool.close().await;
    }
}
