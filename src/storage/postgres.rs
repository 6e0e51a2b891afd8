use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::domain::{
    ActionRequest, ActionStatus, ActionType, AlertId, AlertType, CaseEvent, CaseEventType, CaseId,
    CaseStatus, CustomerNo, CustomerRiskState, EventId, FraudAlert, FraudCase, Priority,
    RequestId, Severity, WhitelistEntry, WhitelistId, WhitelistType,
};

use super::traits::{
    ActionStore, CaseStore, CounterStore, RequestFilter, RiskStore, WhitelistStore,
};

/// PostgreSQL implementation of the store traits.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgresStore with a connection pool.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Round-trip to the database, used by the readiness check.
    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn parse<T>(value: String, parse: impl Fn(&str) -> Option<T>, column: &str) -> anyhow::Result<T> {
    parse(&value).ok_or_else(|| anyhow!("unexpected {column} value: {value}"))
}

fn whitelist_from_row(row: &PgRow) -> anyhow::Result<WhitelistEntry> {
    Ok(WhitelistEntry {
        id: WhitelistId(row.try_get("id")?),
        entry_type: parse(row.try_get("entry_type")?, WhitelistType::from_str, "entry_type")?,
        value: row.try_get("value")?,
        hard_bypass: row.try_get("hard_bypass")?,
        reason: row.try_get("reason")?,
        created_by: row.try_get("created_by")?,
        ticket_ref: row.try_get("ticket_ref")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> anyhow::Result<FraudAlert> {
    let case_id: Option<uuid::Uuid> = row.try_get("case_id")?;
    Ok(FraudAlert {
        id: AlertId(row.try_get("id")?),
        event_id: EventId::from_string(row.try_get::<String, _>("event_id")?),
        customer_no: CustomerNo::new(row.try_get::<String, _>("customer_no")?),
        alert_type: parse(row.try_get("alert_type")?, AlertType::from_str, "alert_type")?,
        severity: parse(row.try_get("severity")?, Severity::from_str, "severity")?,
        rule_id: row.try_get("rule_id")?,
        evidence: row.try_get("evidence")?,
        case_id: case_id.map(CaseId),
        created_at: row.try_get("created_at")?,
    })
}

fn case_from_row(row: &PgRow) -> anyhow::Result<FraudCase> {
    Ok(FraudCase {
        id: CaseId(row.try_get("id")?),
        customer_no: CustomerNo::new(row.try_get::<String, _>("customer_no")?),
        status: parse(row.try_get("status")?, CaseStatus::from_str, "status")?,
        priority: parse(row.try_get("priority")?, Priority::from_str, "priority")?,
        summary: row.try_get("summary")?,
        evidence: row.try_get("evidence")?,
        opened_at: row.try_get("opened_at")?,
    })
}

fn case_event_from_row(row: &PgRow) -> anyhow::Result<CaseEvent> {
    Ok(CaseEvent {
        id: row.try_get("id")?,
        case_id: CaseId(row.try_get("case_id")?),
        event_type: parse(row.try_get("event_type")?, CaseEventType::from_str, "event_type")?,
        code: row.try_get("code")?,
        actor: row.try_get("actor")?,
        created_at: row.try_get("created_at")?,
        payload: row.try_get("payload")?,
    })
}

fn request_from_row(row: &PgRow) -> anyhow::Result<ActionRequest> {
    let case_id: Option<uuid::Uuid> = row.try_get("case_id")?;
    Ok(ActionRequest {
        id: RequestId(row.try_get("id")?),
        customer_no: CustomerNo::new(row.try_get::<String, _>("customer_no")?),
        case_id: case_id.map(CaseId),
        action_type: parse(row.try_get("action_type")?, ActionType::from_str, "action_type")?,
        status: parse(row.try_get("status")?, ActionStatus::from_str, "status")?,
        requested_by: row.try_get("requested_by")?,
        reason: row.try_get("reason")?,
        requested_at: row.try_get("requested_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        review_note: row.try_get("review_note")?,
        reviewed_at: row.try_get("reviewed_at")?,
        executed_at: row.try_get("executed_at")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl WhitelistStore for PostgresStore {
    async fn find_whitelist(
        &self,
        entry_type: WhitelistType,
        value: &str,
    ) -> anyhow::Result<Option<WhitelistEntry>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM whitelist_entries
            WHERE entry_type = $1 AND value = $2
            "#,
        )
        .bind(entry_type.as_str())
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(whitelist_from_row).transpose()
    }

    async fn replace_whitelist(&self, entry: &WhitelistEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO whitelist_entries
                (id, entry_type, value, hard_bypass, reason, created_by, ticket_ref, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (entry_type, value)
            DO UPDATE SET
                id = EXCLUDED.id,
                hard_bypass = EXCLUDED.hard_bypass,
                reason = EXCLUDED.reason,
                created_by = EXCLUDED.created_by,
                ticket_ref = EXCLUDED.ticket_ref,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(entry.id.0)
        .bind(entry.entry_type.as_str())
        .bind(&entry.value)
        .bind(entry.hard_bypass)
        .bind(&entry.reason)
        .bind(&entry.created_by)
        .bind(&entry.ticket_ref)
        .bind(entry.expires_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_whitelist(&self, id: WhitelistId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM whitelist_entries WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_whitelist(
        &self,
        entry_type: Option<WhitelistType>,
        limit: usize,
    ) -> anyhow::Result<Vec<WhitelistEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM whitelist_entries
            WHERE $1::TEXT IS NULL OR entry_type = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(entry_type.map(|t| t.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(whitelist_from_row).collect()
    }
}

#[async_trait]
impl CaseStore for PostgresStore {
    async fn insert_alert(&self, alert: &FraudAlert) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fraud_alerts
                (id, event_id, customer_no, alert_type, severity, rule_id, evidence, case_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (event_id, rule_id) DO NOTHING
            "#,
        )
        .bind(alert.id.0)
        .bind(alert.event_id.as_str())
        .bind(alert.customer_no.as_str())
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.rule_id)
        .bind(&alert.evidence)
        .bind(alert.case_id.map(|c| c.0))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_alert(
        &self,
        event_id: &EventId,
        rule_id: &str,
    ) -> anyhow::Result<Option<FraudAlert>> {
        let row = sqlx::query("SELECT * FROM fraud_alerts WHERE event_id = $1 AND rule_id = $2")
            .bind(event_id.as_str())
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn set_alert_case(&self, alert_id: AlertId, case_id: CaseId) -> anyhow::Result<()> {
        sqlx::query("UPDATE fraud_alerts SET case_id = $2 WHERE id = $1")
            .bind(alert_id.0)
            .bind(case_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_case(&self, case: &FraudCase) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fraud_cases (id, customer_no, status, priority, summary, evidence, opened_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(case.id.0)
        .bind(case.customer_no.as_str())
        .bind(case.status.as_str())
        .bind(case.priority.as_str())
        .bind(&case.summary)
        .bind(&case.evidence)
        .bind(case.opened_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_case(&self, id: CaseId) -> anyhow::Result<Option<FraudCase>> {
        let row = sqlx::query("SELECT * FROM fraud_cases WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn list_customer_cases(
        &self,
        customer_no: &CustomerNo,
        limit: usize,
    ) -> anyhow::Result<Vec<FraudCase>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM fraud_cases
            WHERE customer_no = $1
            ORDER BY opened_at DESC
            LIMIT $2
            "#,
        )
        .bind(customer_no.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(case_from_row).collect()
    }

    async fn set_case_status(&self, id: CaseId, status: CaseStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE fraud_cases SET status = $2 WHERE id = $1")
            .bind(id.0)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_case_priority(&self, id: CaseId, priority: Priority) -> anyhow::Result<()> {
        sqlx::query("UPDATE fraud_cases SET priority = $2 WHERE id = $1")
            .bind(id.0)
            .bind(priority.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn append_case_event(&self, event: &CaseEvent) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO case_events (id, case_id, event_type, code, actor, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.case_id.0)
        .bind(event.event_type.as_str())
        .bind(&event.code)
        .bind(&event.actor)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_case_events(
        &self,
        case_id: CaseId,
        limit: usize,
    ) -> anyhow::Result<Vec<CaseEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM case_events
            WHERE case_id = $1
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(case_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(case_event_from_row).collect()
    }
}

#[async_trait]
impl ActionStore for PostgresStore {
    async fn insert_request(&self, request: &ActionRequest) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO action_requests
                (id, customer_no, case_id, action_type, status, requested_by, reason,
                 requested_at, reviewed_by, review_note, reviewed_at, executed_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(request.id.0)
        .bind(request.customer_no.as_str())
        .bind(request.case_id.map(|c| c.0))
        .bind(request.action_type.as_str())
        .bind(request.status.as_str())
        .bind(&request.requested_by)
        .bind(&request.reason)
        .bind(request.requested_at)
        .bind(&request.reviewed_by)
        .bind(&request.review_note)
        .bind(request.reviewed_at)
        .bind(request.executed_at)
        .bind(request.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> anyhow::Result<Option<ActionRequest>> {
        let row = sqlx::query("SELECT * FROM action_requests WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn update_request(&self, request: &ActionRequest) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE action_requests SET
                status = $3,
                reviewed_by = $4,
                review_note = $5,
                reviewed_at = $6,
                executed_at = $7,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(request.id.0)
        .bind(request.version)
        .bind(request.status.as_str())
        .bind(&request.reviewed_by)
        .bind(&request.review_note)
        .bind(request.reviewed_at)
        .bind(request.executed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<ActionRequest>> {
        let query = match filter {
            RequestFilter::Customer(customer_no) => sqlx::query(
                r#"
                SELECT * FROM action_requests
                WHERE customer_no = $1
                ORDER BY requested_at DESC
                LIMIT $2
                "#,
            )
            .bind(customer_no.as_str()),
            RequestFilter::Status(status) => sqlx::query(
                r#"
                SELECT * FROM action_requests
                WHERE status = $1
                ORDER BY requested_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.as_str()),
        };

        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }
}

#[async_trait]
impl RiskStore for PostgresStore {
    async fn get_risk(&self, customer_no: &CustomerNo) -> anyhow::Result<Option<CustomerRiskState>> {
        let row = sqlx::query("SELECT * FROM customer_risk_state WHERE customer_no = $1")
            .bind(customer_no.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CustomerRiskState {
            customer_no: CustomerNo::new(row.try_get::<String, _>("customer_no")?),
            credit_blocked: row.try_get("credit_blocked")?,
            block_reason: row.try_get("block_reason")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn put_risk(&self, state: &CustomerRiskState) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_risk_state (customer_no, credit_blocked, block_reason, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_no)
            DO UPDATE SET
                credit_blocked = EXCLUDED.credit_blocked,
                block_reason = EXCLUDED.block_reason,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(state.customer_no.as_str())
        .bind(state.credit_blocked)
        .bind(&state.block_reason)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CounterStore for PostgresStore {
    async fn incr_with_expiry(&self, key: &str, delta: i64, ttl: Duration) -> anyhow::Result<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (key, value, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (key)
            DO UPDATE SET
                value = CASE WHEN counters.expires_at <= now()
                    THEN EXCLUDED.value
                    ELSE counters.value + EXCLUDED.value END,
                expires_at = CASE WHEN counters.expires_at <= now()
                    THEN EXCLUDED.expires_at
                    ELSE counters.expires_at END
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(delta)
        .bind(ttl.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    async fn get_counter(&self, key: &str) -> anyhow::Result<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM counters WHERE key = $1 AND expires_at > now()")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.unwrap_or(0))
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let created: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO counters (key, value, expires_at)
            VALUES ($1, 1, now() + make_interval(secs => $2))
            ON CONFLICT (key)
            DO UPDATE SET value = 1, expires_at = EXCLUDED.expires_at
            WHERE counters.expires_at <= now()
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(created.is_some())
    }

    async fn delete_counter(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM counters WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired_counters(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM counters WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
