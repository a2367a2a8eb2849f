// src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CallRecord, ChartPoint, KpiTotals, MemberStatus, Project, ProjectStatus, Role, Task,
    TaskStatus, TeamMember, Timesheet, TimesheetStatus,
};
use crate::week::TimeRange;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Duplicate(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub const DUPLICATE_EMAIL: &str = "Email already exists";
pub const DUPLICATE_WEEK: &str = "Time entry already exists for this week";

#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    pub department: Option<String>,
    pub role: Option<Role>,
    pub status: Option<MemberStatus>,
    /// Case-insensitive substring over name, email and position.
    pub search: Option<String>,
}

impl MemberFilter {
    pub fn matches(&self, member: &TeamMember) -> bool {
        if let Some(department) = &self.department {
            if &member.department != department {
                return false;
            }
        }
        if self.role.is_some_and(|role| role != member.role) {
            return false;
        }
        if self.status.is_some_and(|status| status != member.status) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            return [&member.name, &member.email, &member.position]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimesheetFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<TimesheetStatus>,
    pub week_start_from: Option<NaiveDate>,
    pub week_start_to: Option<NaiveDate>,
}

impl TimesheetFilter {
    pub fn matches(&self, sheet: &Timesheet) -> bool {
        self.user_id.map_or(true, |id| sheet.user_id == id)
            && self.status.map_or(true, |s| sheet.status == s)
            && self.week_start_from.map_or(true, |from| sheet.week_start >= from)
            && self.week_start_to.map_or(true, |to| sheet.week_start <= to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub member: Option<Uuid>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        self.status.map_or(true, |s| project.status == s)
            && self
                .member
                .map_or(true, |m| project.team_members.contains(&m))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.project_id.map_or(true, |p| task.project_id == p)
            && self.assigned_to.map_or(true, |a| task.assigned_to == Some(a))
            && self.status.map_or(true, |s| task.status == s)
    }
}

/// Persistence for every collection the API serves.
///
/// `update_*` and `delete_*` return `false` when the record does not exist.
#[async_trait]
pub trait Repository: Send + Sync {
    // Team members
    async fn list_members(&self, filter: &MemberFilter) -> Result<Vec<TeamMember>, StoreError>;
    async fn get_member(&self, id: Uuid) -> Result<Option<TeamMember>, StoreError>;
    async fn find_member_by_email(&self, email: &str) -> Result<Option<TeamMember>, StoreError>;
    async fn insert_member(&self, member: &TeamMember) -> Result<(), StoreError>;
    async fn update_member(&self, member: &TeamMember) -> Result<bool, StoreError>;
    async fn delete_member(&self, id: Uuid) -> Result<bool, StoreError>;

    // Timesheets
    async fn list_timesheets(&self, filter: &TimesheetFilter)
        -> Result<Vec<Timesheet>, StoreError>;
    async fn get_timesheet(&self, id: Uuid) -> Result<Option<Timesheet>, StoreError>;
    async fn find_timesheet(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Timesheet>, StoreError>;
    async fn insert_timesheet(&self, sheet: &Timesheet) -> Result<(), StoreError>;
    async fn update_timesheet(&self, sheet: &Timesheet) -> Result<bool, StoreError>;
    async fn delete_timesheet(&self, id: Uuid) -> Result<bool, StoreError>;

    // Projects; deleting one removes its tasks
    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, StoreError>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError>;
    async fn update_project(&self, project: &Project) -> Result<bool, StoreError>;
    async fn delete_project(&self, id: Uuid) -> Result<bool, StoreError>;

    // Tasks
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;
    async fn update_task(&self, task: &Task) -> Result<bool, StoreError>;
    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError>;

    // Call statistics
    /// Adds a call to its hourly bucket. Returns `false` if the call id was already counted.
    async fn record_call(&self, call: &CallRecord) -> Result<bool, StoreError>;
    async fn call_totals(
        &self,
        range: TimeRange,
        user_id: Option<&str>,
    ) -> Result<KpiTotals, StoreError>;
    /// Hourly buckets in range summed across users, oldest first.
    async fn call_series(
        &self,
        range: TimeRange,
        user_id: Option<&str>,
    ) -> Result<Vec<ChartPoint>, StoreError>;
    /// Removes buckets created before `cutoff`; returns how many were removed.
    async fn purge_call_stats(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Talk time in minutes for a call of `seconds`.
pub fn talk_minutes(seconds: i64) -> rust_decimal::Decimal {
    (rust_decimal::Decimal::from(seconds.max(0)) / rust_decimal::Decimal::from(60)).round_dp(2)
}
