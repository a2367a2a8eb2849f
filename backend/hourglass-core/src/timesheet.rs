// src/timesheet.rs
//! Timesheet lifecycle: draft -> submitted -> approved | rejected.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Timesheet, TimesheetStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimesheetAction {
    Submit,
    Withdraw,
    Approve,
    Reject,
    Reopen,
}

impl TimesheetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimesheetAction::Submit => "submit",
            TimesheetAction::Withdraw => "withdraw",
            TimesheetAction::Approve => "approve",
            TimesheetAction::Reject => "reject",
            TimesheetAction::Reopen => "reopen",
        }
    }

    /// Actions reserved for reviewers rather than the sheet's owner.
    pub fn is_review(&self) -> bool {
        matches!(
            self,
            TimesheetAction::Approve | TimesheetAction::Reject | TimesheetAction::Reopen
        )
    }
}

impl fmt::Display for TimesheetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown timesheet action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for TimesheetAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(TimesheetAction::Submit),
            "withdraw" => Ok(TimesheetAction::Withdraw),
            "approve" => Ok(TimesheetAction::Approve),
            "reject" => Ok(TimesheetAction::Reject),
            "reopen" => Ok(TimesheetAction::Reopen),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot {action} a timesheet that is {from}")]
pub struct TransitionError {
    pub from: TimesheetStatus,
    pub action: TimesheetAction,
}

impl TimesheetStatus {
    pub fn next(self, action: TimesheetAction) -> Result<TimesheetStatus, TransitionError> {
        use TimesheetAction::*;
        use TimesheetStatus::*;

        match (self, action) {
            (Draft | Rejected, Submit) => Ok(Submitted),
            (Submitted, Withdraw) => Ok(Draft),
            (Submitted, Approve) => Ok(Approved),
            (Submitted, Reject) => Ok(Rejected),
            (Approved | Rejected, Reopen) => Ok(Draft),
            (from, action) => Err(TransitionError { from, action }),
        }
    }

    /// Hours and notes may only change while the sheet is with its owner.
    pub fn is_editable(self) -> bool {
        matches!(self, TimesheetStatus::Draft | TimesheetStatus::Rejected)
    }
}

/// Maps a requested target status from a plain update onto a lifecycle action.
///
/// Returns `Ok(None)` when the sheet is already in the target state.
pub fn action_towards(
    current: TimesheetStatus,
    target: TimesheetStatus,
) -> Result<Option<TimesheetAction>, TransitionError> {
    if current == target {
        return Ok(None);
    }
    let action = match target {
        TimesheetStatus::Submitted => TimesheetAction::Submit,
        TimesheetStatus::Draft if current == TimesheetStatus::Submitted => TimesheetAction::Withdraw,
        TimesheetStatus::Draft => TimesheetAction::Reopen,
        TimesheetStatus::Approved => TimesheetAction::Approve,
        TimesheetStatus::Rejected => TimesheetAction::Reject,
    };
    current.next(action).map(|_| Some(action))
}

impl Timesheet {
    /// Applies `action`, stamping the review fields that go with it.
    pub fn apply(
        &mut self,
        action: TimesheetAction,
        actor: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let next = self.status.next(action)?;

        match action {
            TimesheetAction::Submit => {
                self.submitted_at = Some(now);
                self.rejection_reason = None;
            }
            TimesheetAction::Withdraw => {
                self.submitted_at = None;
            }
            TimesheetAction::Approve => {
                self.approved_at = Some(now);
                self.approved_by = Some(actor);
                self.rejection_reason = None;
            }
            TimesheetAction::Reject => {
                self.rejection_reason = reason.filter(|r| !r.trim().is_empty());
                self.approved_at = None;
                self.approved_by = Some(actor);
            }
            TimesheetAction::Reopen => {
                self.submitted_at = None;
                self.approved_at = None;
                self.approved_by = None;
            }
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
