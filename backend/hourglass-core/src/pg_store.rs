// src/pg_store.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgQueryResult};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    CallDirection, CallRecord, ChartPoint, KpiTotals, Project, Task, TeamMember, Timesheet,
};
use crate::store::{
    talk_minutes, MemberFilter, ProjectFilter, Repository, StoreError, TaskFilter,
    TimesheetFilter, DUPLICATE_EMAIL, DUPLICATE_WEEK,
};
use crate::week::{hour_start, TimeRange};

const MEMBER_COLUMNS: &str = "id, name, email, role, status, avatar, department, position, \
     join_date, phone, location, skills, bio, is_google_user, password_hash, created_at, updated_at";
const TIMESHEET_COLUMNS: &str = "id, user_id, week_start, week_end, hours, notes, status, \
     submitted_at, approved_at, approved_by, rejection_reason, created_at, updated_at";
const PROJECT_COLUMNS: &str =
    "id, name, client, color, status, team_members, description, created_at, updated_at";
const TASK_COLUMNS: &str = "id, project_id, name, description, status, assigned_to, \
     estimated_hours, created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");

        Ok(Self { pool })
    }
}

/// Turns a unique-constraint failure into `StoreError::Duplicate`.
fn map_unique(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(message.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn touched(result: PgQueryResult) -> bool {
    result.rows_affected() > 0
}

#[async_trait]
impl Repository for PgStore {
    async fn list_members(&self, filter: &MemberFilter) -> Result<Vec<TeamMember>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM team_members WHERE TRUE", MEMBER_COLUMNS));
        if let Some(department) = &filter.department {
            qb.push(" AND department = ").push_bind(department.clone());
        }
        if let Some(role) = filter.role {
            qb.push(" AND role = ").push_bind(role);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR position ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC");

        Ok(qb.build_query_as::<TeamMember>().fetch_all(&self.pool).await?)
    }

    async fn get_member(&self, id: Uuid) -> Result<Option<TeamMember>, StoreError> {
        let sql = format!("SELECT {} FROM team_members WHERE id = $1", MEMBER_COLUMNS);
        Ok(sqlx::query_as::<_, TeamMember>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<TeamMember>, StoreError> {
        let sql = format!("SELECT {} FROM team_members WHERE email = $1", MEMBER_COLUMNS);
        Ok(sqlx::query_as::<_, TeamMember>(&sql)
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_member(&self, m: &TeamMember) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO team_members (id, name, email, role, status, avatar, department, position, \
             join_date, phone, location, skills, bio, is_google_user, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(m.id)
        .bind(&m.name)
        .bind(&m.email)
        .bind(m.role)
        .bind(m.status)
        .bind(&m.avatar)
        .bind(&m.department)
        .bind(&m.position)
        .bind(m.join_date)
        .bind(&m.phone)
        .bind(&m.location)
        .bind(&m.skills)
        .bind(&m.bio)
        .bind(m.is_google_user)
        .bind(&m.password_hash)
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, DUPLICATE_EMAIL))?;
        Ok(())
    }

    async fn update_member(&self, m: &TeamMember) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE team_members SET name = $2, email = $3, role = $4, status = $5, avatar = $6, \
             department = $7, position = $8, join_date = $9, phone = $10, location = $11, \
             skills = $12, bio = $13, is_google_user = $14, password_hash = $15, updated_at = $16 \
             WHERE id = $1",
        )
        .bind(m.id)
        .bind(&m.name)
        .bind(&m.email)
        .bind(m.role)
        .bind(m.status)
        .bind(&m.avatar)
        .bind(&m.department)
        .bind(&m.position)
        .bind(m.join_date)
        .bind(&m.phone)
        .bind(&m.location)
        .bind(&m.skills)
        .bind(&m.bio)
        .bind(m.is_google_user)
        .bind(&m.password_hash)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, DUPLICATE_EMAIL))?;
        Ok(touched(result))
    }

    async fn delete_member(&self, id: Uuid) -> Result<bool, StoreError> {
        // timesheets, approvals and assignments follow the foreign keys;
        // project membership is an array and is cleared by hand
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE projects SET team_members = array_remove(team_members, $1) \
             WHERE $1 = ANY(team_members)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM team_members WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(touched(result))
    }

    async fn list_timesheets(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<Timesheet>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM timesheets WHERE TRUE", TIMESHEET_COLUMNS));
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(from) = filter.week_start_from {
            qb.push(" AND week_start >= ").push_bind(from);
        }
        if let Some(to) = filter.week_start_to {
            qb.push(" AND week_start <= ").push_bind(to);
        }
        qb.push(" ORDER BY week_start DESC");

        Ok(qb.build_query_as::<Timesheet>().fetch_all(&self.pool).await?)
    }

    async fn get_timesheet(&self, id: Uuid) -> Result<Option<Timesheet>, StoreError> {
        let sql = format!("SELECT {} FROM timesheets WHERE id = $1", TIMESHEET_COLUMNS);
        Ok(sqlx::query_as::<_, Timesheet>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_timesheet(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Timesheet>, StoreError> {
        let sql = format!(
            "SELECT {} FROM timesheets WHERE user_id = $1 AND week_start = $2",
            TIMESHEET_COLUMNS
        );
        Ok(sqlx::query_as::<_, Timesheet>(&sql)
            .bind(user_id)
            .bind(week_start)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_timesheet(&self, t: &Timesheet) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO timesheets (id, user_id, week_start, week_end, hours, notes, status, \
             submitted_at, approved_at, approved_by, rejection_reason, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(t.id)
        .bind(t.user_id)
        .bind(t.week_start)
        .bind(t.week_end)
        .bind(&t.hours)
        .bind(&t.notes)
        .bind(t.status)
        .bind(t.submitted_at)
        .bind(t.approved_at)
        .bind(t.approved_by)
        .bind(&t.rejection_reason)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, DUPLICATE_WEEK))?;
        Ok(())
    }

    async fn update_timesheet(&self, t: &Timesheet) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE timesheets SET week_start = $2, week_end = $3, hours = $4, notes = $5, \
             status = $6, submitted_at = $7, approved_at = $8, approved_by = $9, \
             rejection_reason = $10, updated_at = $11 WHERE id = $1",
        )
        .bind(t.id)
        .bind(t.week_start)
        .bind(t.week_end)
        .bind(&t.hours)
        .bind(&t.notes)
        .bind(t.status)
        .bind(t.submitted_at)
        .bind(t.approved_at)
        .bind(t.approved_by)
        .bind(&t.rejection_reason)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, DUPLICATE_WEEK))?;
        Ok(touched(result))
    }

    async fn delete_timesheet(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM timesheets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(touched(result))
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM projects WHERE TRUE", PROJECT_COLUMNS));
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(member) = filter.member {
            qb.push(" AND ").push_bind(member).push(" = ANY(team_members)");
        }
        qb.push(" ORDER BY created_at DESC");

        Ok(qb.build_query_as::<Project>().fetch_all(&self.pool).await?)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let sql = format!("SELECT {} FROM projects WHERE id = $1", PROJECT_COLUMNS);
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_project(&self, p: &Project) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO projects (id, name, client, color, status, team_members, description, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.client)
        .bind(&p.color)
        .bind(p.status)
        .bind(&p.team_members)
        .bind(&p.description)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_project(&self, p: &Project) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE projects SET name = $2, client = $3, color = $4, status = $5, \
             team_members = $6, description = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.client)
        .bind(&p.color)
        .bind(p.status)
        .bind(&p.team_members)
        .bind(&p.description)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(touched(result))
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, StoreError> {
        // tasks go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(touched(result))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tasks WHERE TRUE", TASK_COLUMNS));
        if let Some(project_id) = filter.project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(assigned_to) = filter.assigned_to {
            qb.push(" AND assigned_to = ").push_bind(assigned_to);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        qb.push(" ORDER BY created_at DESC");

        Ok(qb.build_query_as::<Task>().fetch_all(&self.pool).await?)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);
        Ok(sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_task(&self, t: &Task) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks (id, project_id, name, description, status, assigned_to, \
             estimated_hours, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(t.id)
        .bind(t.project_id)
        .bind(&t.name)
        .bind(&t.description)
        .bind(t.status)
        .bind(t.assigned_to)
        .bind(t.estimated_hours)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_task(&self, t: &Task) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET project_id = $2, name = $3, description = $4, status = $5, \
             assigned_to = $6, estimated_hours = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(t.id)
        .bind(t.project_id)
        .bind(&t.name)
        .bind(&t.description)
        .bind(t.status)
        .bind(t.assigned_to)
        .bind(t.estimated_hours)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(touched(result))
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(touched(result))
    }

    async fn record_call(&self, call: &CallRecord) -> Result<bool, StoreError> {
        let inbound: i64 = match call.direction {
            CallDirection::Inbound => 1,
            CallDirection::Outbound => 0,
        };
        // The WHERE clause skips the update when the call id is already in the bucket.
        let result = sqlx::query(
            "INSERT INTO hourly_call_stats (user_id, name, bucket_start, total_dials, inbound_calls, \
             total_talk_time_minutes, call_ids, source, created_at) \
             VALUES ($1, $2, $3, 1, $4, $5, ARRAY[$6::TEXT], 'aircall', NOW()) \
             ON CONFLICT (user_id, bucket_start) DO UPDATE SET \
             total_dials = hourly_call_stats.total_dials + EXCLUDED.total_dials, \
             inbound_calls = hourly_call_stats.inbound_calls + EXCLUDED.inbound_calls, \
             total_talk_time_minutes = hourly_call_stats.total_talk_time_minutes + EXCLUDED.total_talk_time_minutes, \
             call_ids = array_append(hourly_call_stats.call_ids, $6::TEXT), \
             name = COALESCE(hourly_call_stats.name, EXCLUDED.name) \
             WHERE NOT ($6::TEXT = ANY(hourly_call_stats.call_ids))",
        )
        .bind(&call.user_id)
        .bind(&call.name)
        .bind(hour_start(call.started_at))
        .bind(inbound)
        .bind(talk_minutes(call.duration_seconds))
        .bind(&call.id)
        .execute(&self.pool)
        .await?;
        Ok(touched(result))
    }

    async fn call_totals(
        &self,
        range: TimeRange,
        user_id: Option<&str>,
    ) -> Result<KpiTotals, StoreError> {
        let (total_dials, inbound_calls, total_talk_time_minutes): (i64, i64, Decimal) =
            sqlx::query_as(
                "SELECT COALESCE(SUM(total_dials), 0)::BIGINT, \
                 COALESCE(SUM(inbound_calls), 0)::BIGINT, \
                 COALESCE(SUM(total_talk_time_minutes), 0)::NUMERIC \
                 FROM hourly_call_stats \
                 WHERE bucket_start >= $1 AND bucket_start < $2 \
                 AND ($3::TEXT IS NULL OR user_id = $3)",
            )
            .bind(range.start)
            .bind(range.end)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(KpiTotals {
            total_dials,
            total_talk_time_minutes,
            inbound_calls,
        })
    }

    async fn call_series(
        &self,
        range: TimeRange,
        user_id: Option<&str>,
    ) -> Result<Vec<ChartPoint>, StoreError> {
        let rows: Vec<(DateTime<Utc>, i64, Decimal)> = sqlx::query_as(
            "SELECT bucket_start, SUM(total_dials)::BIGINT, SUM(total_talk_time_minutes)::NUMERIC \
             FROM hourly_call_stats \
             WHERE bucket_start >= $1 AND bucket_start < $2 \
             AND ($3::TEXT IS NULL OR user_id = $3) \
             GROUP BY bucket_start ORDER BY bucket_start ASC",
        )
        .bind(range.start)
        .bind(range.end)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, total_dials, total_talk_time_minutes)| ChartPoint {
                timestamp,
                total_dials,
                total_talk_time_minutes,
            })
            .collect())
    }

    async fn purge_call_stats(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM hourly_call_stats WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ada"), "%ada%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
