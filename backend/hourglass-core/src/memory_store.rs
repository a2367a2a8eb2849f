// src/memory_store.rs
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    CallDirection, CallRecord, ChartPoint, HourlyCallStats, KpiTotals, Project, Task,
    TeamMember, Timesheet,
};
use crate::store::{
    talk_minutes, MemberFilter, ProjectFilter, Repository, StoreError, TaskFilter,
    TimesheetFilter, DUPLICATE_EMAIL, DUPLICATE_WEEK,
};
use crate::week::{hour_start, TimeRange};

/// Process-local store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    members: Mutex<HashMap<Uuid, TeamMember>>,
    timesheets: Mutex<HashMap<Uuid, Timesheet>>,
    projects: Mutex<HashMap<Uuid, Project>>,
    tasks: Mutex<HashMap<Uuid, Task>>,
    calls: Mutex<HashMap<(String, DateTime<Utc>), HourlyCallStats>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_range(stats: &HourlyCallStats, range: TimeRange, user_id: Option<&str>) -> bool {
    range.contains(stats.timestamp) && user_id.map_or(true, |u| stats.user_id == u)
}

#[async_trait]
impl Repository for MemoryStore {
    async fn list_members(&self, filter: &MemberFilter) -> Result<Vec<TeamMember>, StoreError> {
        let members = self.members.lock().await;
        let mut found: Vec<TeamMember> =
            members.values().filter(|m| filter.matches(m)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get_member(&self, id: Uuid) -> Result<Option<TeamMember>, StoreError> {
        Ok(self.members.lock().await.get(&id).cloned())
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<TeamMember>, StoreError> {
        let email = email.to_lowercase();
        Ok(self
            .members
            .lock()
            .await
            .values()
            .find(|m| m.email == email)
            .cloned())
    }

    async fn insert_member(&self, member: &TeamMember) -> Result<(), StoreError> {
        let mut members = self.members.lock().await;
        if members.values().any(|m| m.email == member.email) {
            return Err(StoreError::Duplicate(DUPLICATE_EMAIL.into()));
        }
        members.insert(member.id, member.clone());
        Ok(())
    }

    async fn update_member(&self, member: &TeamMember) -> Result<bool, StoreError> {
        let mut members = self.members.lock().await;
        if members
            .values()
            .any(|m| m.id != member.id && m.email == member.email)
        {
            return Err(StoreError::Duplicate(DUPLICATE_EMAIL.into()));
        }
        match members.get_mut(&member.id) {
            Some(existing) => {
                *existing = member.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_member(&self, id: Uuid) -> Result<bool, StoreError> {
        if self.members.lock().await.remove(&id).is_none() {
            return Ok(false);
        }

        let mut sheets = self.timesheets.lock().await;
        sheets.retain(|_, s| s.user_id != id);
        for sheet in sheets.values_mut() {
            if sheet.approved_by == Some(id) {
                sheet.approved_by = None;
            }
        }
        drop(sheets);

        for task in self.tasks.lock().await.values_mut() {
            if task.assigned_to == Some(id) {
                task.assigned_to = None;
            }
        }
        for project in self.projects.lock().await.values_mut() {
            project.team_members.retain(|m| *m != id);
        }
        Ok(true)
    }

    async fn list_timesheets(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<Timesheet>, StoreError> {
        let sheets = self.timesheets.lock().await;
        let mut found: Vec<Timesheet> =
            sheets.values().filter(|s| filter.matches(s)).cloned().collect();
        found.sort_by(|a, b| b.week_start.cmp(&a.week_start));
        Ok(found)
    }

    async fn get_timesheet(&self, id: Uuid) -> Result<Option<Timesheet>, StoreError> {
        Ok(self.timesheets.lock().await.get(&id).cloned())
    }

    async fn find_timesheet(
        &self,
        user_id: Uuid,
        week_start: NaiveDate,
    ) -> Result<Option<Timesheet>, StoreError> {
        Ok(self
            .timesheets
            .lock()
            .await
            .values()
            .find(|s| s.user_id == user_id && s.week_start == week_start)
            .cloned())
    }

    async fn insert_timesheet(&self, sheet: &Timesheet) -> Result<(), StoreError> {
        let mut sheets = self.timesheets.lock().await;
        if sheets
            .values()
            .any(|s| s.user_id == sheet.user_id && s.week_start == sheet.week_start)
        {
            return Err(StoreError::Duplicate(DUPLICATE_WEEK.into()));
        }
        sheets.insert(sheet.id, sheet.clone());
        Ok(())
    }

    async fn update_timesheet(&self, sheet: &Timesheet) -> Result<bool, StoreError> {
        let mut sheets = self.timesheets.lock().await;
        match sheets.get_mut(&sheet.id) {
            Some(existing) => {
                *existing = sheet.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_timesheet(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.timesheets.lock().await.remove(&id).is_some())
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, StoreError> {
        let projects = self.projects.lock().await;
        let mut found: Vec<Project> =
            projects.values().filter(|p| filter.matches(p)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.lock().await.get(&id).cloned())
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.projects
            .lock()
            .await
            .insert(project.id, project.clone());
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> Result<bool, StoreError> {
        let mut projects = self.projects.lock().await;
        match projects.get_mut(&project.id) {
            Some(existing) => {
                *existing = project.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.projects.lock().await.remove(&id).is_some();
        if removed {
            self.tasks.lock().await.retain(|_, t| t.project_id != id);
        }
        Ok(removed)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.lock().await;
        let mut found: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tasks.lock().await.remove(&id).is_some())
    }

    async fn record_call(&self, call: &CallRecord) -> Result<bool, StoreError> {
        let bucket = hour_start(call.started_at);
        let mut calls = self.calls.lock().await;
        let stats = calls
            .entry((call.user_id.clone(), bucket))
            .or_insert_with(|| HourlyCallStats {
                user_id: call.user_id.clone(),
                name: call.name.clone(),
                timestamp: bucket,
                total_dials: 0,
                inbound_calls: 0,
                total_talk_time_minutes: Default::default(),
                call_ids: Vec::new(),
                source: "aircall".to_string(),
                created_at: Utc::now(),
            });

        if stats.call_ids.contains(&call.id) {
            return Ok(false);
        }
        stats.total_dials += 1;
        if call.direction == CallDirection::Inbound {
            stats.inbound_calls += 1;
        }
        stats.total_talk_time_minutes += talk_minutes(call.duration_seconds);
        stats.call_ids.push(call.id.clone());
        if stats.name.is_none() {
            stats.name = call.name.clone();
        }
        Ok(true)
    }

    async fn call_totals(
        &self,
        range: TimeRange,
        user_id: Option<&str>,
    ) -> Result<KpiTotals, StoreError> {
        let calls = self.calls.lock().await;
        Ok(calls
            .values()
            .filter(|s| in_range(s, range, user_id))
            .fold(KpiTotals::default(), |mut acc, s| {
                acc.total_dials += s.total_dials;
                acc.inbound_calls += s.inbound_calls;
                acc.total_talk_time_minutes += s.total_talk_time_minutes;
                acc
            }))
    }

    async fn call_series(
        &self,
        range: TimeRange,
        user_id: Option<&str>,
    ) -> Result<Vec<ChartPoint>, StoreError> {
        let calls = self.calls.lock().await;
        let mut by_hour: BTreeMap<DateTime<Utc>, ChartPoint> = BTreeMap::new();
        for s in calls.values().filter(|s| in_range(s, range, user_id)) {
            let point = by_hour.entry(s.timestamp).or_insert_with(|| ChartPoint {
                timestamp: s.timestamp,
                total_dials: 0,
                total_talk_time_minutes: Default::default(),
            });
            point.total_dials += s.total_dials;
            point.total_talk_time_minutes += s.total_talk_time_minutes;
        }
        Ok(by_hour.into_values().collect())
    }

    async fn purge_call_stats(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut calls = self.calls.lock().await;
        let before = calls.len();
        calls.retain(|_, s| s.created_at >= cutoff);
        Ok((before - calls.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimesheetStatus;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn call(id: &str, user: &str, at: DateTime<Utc>, secs: i64) -> CallRecord {
        CallRecord {
            id: id.into(),
            user_id: user.into(),
            name: Some("Agent".into()),
            started_at: at,
            duration_seconds: secs,
            direction: CallDirection::Outbound,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let a = TeamMember::new("A".into(), "a@example.com".into(), "D".into(), "P".into());
        let b = TeamMember::new("B".into(), "a@example.com".into(), "D".into(), "P".into());
        store.insert_member(&a).await.unwrap();
        match store.insert_member(&b).await {
            Err(StoreError::Duplicate(msg)) => assert_eq!(msg, DUPLICATE_EMAIL),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert!(store
            .find_member_by_email("A@Example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn one_timesheet_per_member_and_week() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let first = Timesheet::new(user, monday, vec![Decimal::ZERO; 7], String::new());
        let second = Timesheet::new(user, monday, vec![Decimal::ONE; 7], String::new());
        store.insert_timesheet(&first).await.unwrap();
        assert!(matches!(
            store.insert_timesheet(&second).await,
            Err(StoreError::Duplicate(_))
        ));

        let other_week = Timesheet::new(
            user,
            monday + Duration::days(7),
            vec![Decimal::ZERO; 7],
            String::new(),
        );
        store.insert_timesheet(&other_week).await.unwrap();

        let listed = store
            .list_timesheets(&TimesheetFilter {
                user_id: Some(user),
                status: Some(TimesheetStatus::Draft),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].week_start, monday + Duration::days(7));
    }

    #[tokio::test]
    async fn deleting_project_removes_its_tasks() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: "Website".into(),
            client: "Acme".into(),
            color: "#3B82F6".into(),
            status: Default::default(),
            team_members: vec![],
            description: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_project(&project).await.unwrap();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: project.id,
            name: "Design".into(),
            description: String::new(),
            status: Default::default(),
            assigned_to: None,
            estimated_hours: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_task(&task).await.unwrap();

        assert!(store.delete_project(project.id).await.unwrap());
        assert!(store.get_task(task.id).await.unwrap().is_none());
        assert!(!store.delete_project(project.id).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_member_cascades_like_the_schema() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ann = TeamMember::new("Ann".into(), "ann@example.com".into(), "D".into(), "P".into());
        let boss =
            TeamMember::new("Boss".into(), "boss@example.com".into(), "D".into(), "P".into());
        store.insert_member(&ann).await.unwrap();
        store.insert_member(&boss).await.unwrap();

        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let own = Timesheet::new(ann.id, monday, vec![Decimal::ONE; 7], String::new());
        let mut reviewed = Timesheet::new(boss.id, monday, vec![Decimal::ONE; 7], String::new());
        reviewed.approved_by = Some(ann.id);
        store.insert_timesheet(&own).await.unwrap();
        store.insert_timesheet(&reviewed).await.unwrap();

        let project = Project {
            id: Uuid::new_v4(),
            name: "Website".into(),
            client: "Acme".into(),
            color: "#3B82F6".into(),
            status: Default::default(),
            team_members: vec![ann.id, boss.id],
            description: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_project(&project).await.unwrap();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: project.id,
            name: "Design".into(),
            description: String::new(),
            status: Default::default(),
            assigned_to: Some(ann.id),
            estimated_hours: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_task(&task).await.unwrap();

        assert!(store.delete_member(ann.id).await.unwrap());

        assert!(store.get_timesheet(own.id).await.unwrap().is_none());
        let reviewed = store.get_timesheet(reviewed.id).await.unwrap().unwrap();
        assert_eq!(reviewed.approved_by, None);
        let task = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(task.assigned_to, None);
        let project = store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(project.team_members, vec![boss.id]);

        assert!(!store.delete_member(ann.id).await.unwrap());
    }

    #[tokio::test]
    async fn calls_are_bucketed_hourly_and_deduplicated() {
        let store = MemoryStore::new();
        let nine = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        assert!(store
            .record_call(&call("c1", "u1", nine + Duration::minutes(5), 120))
            .await
            .unwrap());
        assert!(!store
            .record_call(&call("c1", "u1", nine + Duration::minutes(5), 120))
            .await
            .unwrap());
        store
            .record_call(&call("c2", "u1", nine + Duration::minutes(50), 30))
            .await
            .unwrap();
        store
            .record_call(&call("c3", "u2", nine + Duration::minutes(70), 60))
            .await
            .unwrap();

        let range = TimeRange {
            start: nine,
            end: nine + Duration::hours(2),
        };
        let totals = store.call_totals(range, None).await.unwrap();
        assert_eq!(totals.total_dials, 3);
        assert_eq!(totals.total_talk_time_minutes, dec!(3.5));

        let u1 = store.call_totals(range, Some("u1")).await.unwrap();
        assert_eq!(u1.total_dials, 2);

        let series = store.call_series(range, None).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, nine);
        assert_eq!(series[0].total_dials, 2);
        assert_eq!(series[1].timestamp, nine + Duration::hours(1));
    }

    #[tokio::test]
    async fn purge_drops_old_buckets() {
        let store = MemoryStore::new();
        store
            .record_call(&call("c1", "u1", Utc::now(), 60))
            .await
            .unwrap();
        let removed = store
            .purge_call_stats(Utc::now() - Duration::minutes(13))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        let removed = store
            .purge_call_stats(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
