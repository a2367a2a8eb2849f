// src/validation.rs
use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::AppError;
use crate::week::week_end_of;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // ASCII word characters only; `\w` would admit any Unicode letter
    Regex::new(r"^(?-u:\w)+([.-]?(?-u:\w)+)*@(?-u:\w)+([.-]?(?-u:\w)+)*(\.(?-u:\w){2,3})+$")
        .expect("email pattern compiles")
});
static COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color pattern compiles"));

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_BIO_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 2000;
pub const MAX_DAY_HOURS: u32 = 24;
pub const DAYS_PER_WEEK: usize = 7;
/// Hours are stored with two decimals.
pub const HOURS_SCALE: u32 = 2;
pub const MAX_ESTIMATE_HOURS: u32 = 100_000;

/// Accumulates every rule violation so the client sees them all at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_member_name(v: &mut Violations, name: &str) {
    let name = name.trim();
    v.check(!name.is_empty(), "Name is required");
    v.check(
        name.chars().count() <= MAX_NAME_LEN,
        format!("Name cannot exceed {} characters", MAX_NAME_LEN),
    );
}

pub fn check_email(v: &mut Violations, email: &str) {
    let email = normalize_email(email);
    if email.is_empty() {
        v.push("Email is required");
    } else if !is_valid_email(&email) {
        v.push("Please enter a valid email");
    }
}

pub fn check_required(v: &mut Violations, field: &str, value: &str) {
    v.check(!value.trim().is_empty(), format!("{} is required", field));
}

pub fn check_bio(v: &mut Violations, bio: Option<&str>) {
    if let Some(bio) = bio {
        v.check(
            bio.chars().count() <= MAX_BIO_LEN,
            format!("Bio cannot exceed {} characters", MAX_BIO_LEN),
        );
    }
}

pub fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses the seven per-day values of a timesheet.
///
/// Numbers and numeric strings are accepted; anything else, or a list that is
/// not exactly seven long, is rejected with the same message.
pub fn parse_hours(value: &Value) -> Result<Vec<Decimal>, String> {
    const SHAPE: &str = "Hours must be an array of 7 numbers";

    let items = value.as_array().ok_or_else(|| SHAPE.to_string())?;
    if items.len() != DAYS_PER_WEEK {
        return Err(SHAPE.to_string());
    }
    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .to_string()
                .parse::<Decimal>()
                .ok()
                .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                .ok_or_else(|| SHAPE.to_string()),
            Value::String(s) => s.trim().parse::<Decimal>().map_err(|_| SHAPE.to_string()),
            _ => Err(SHAPE.to_string()),
        })
        .collect()
}

pub fn check_hours(v: &mut Violations, hours: &[Decimal]) {
    if hours.len() != DAYS_PER_WEEK {
        v.push("Hours must be an array of 7 numbers");
        return;
    }
    let max = Decimal::from(MAX_DAY_HOURS);
    for (day, h) in hours.iter().enumerate() {
        if h.is_sign_negative() && !h.is_zero() {
            v.push(format!("Hours for day {} cannot be negative", day + 1));
        } else if *h > max {
            v.push(format!(
                "Hours for day {} cannot exceed {}",
                day + 1,
                MAX_DAY_HOURS
            ));
        } else if h.normalize().scale() > HOURS_SCALE {
            v.push(format!(
                "Hours for day {} can have at most {} decimals",
                day + 1,
                HOURS_SCALE
            ));
        }
    }
}

/// Checks the week bounds and returns the effective week end.
pub fn check_week(v: &mut Violations, start: NaiveDate, end: Option<NaiveDate>) -> NaiveDate {
    v.check(start.weekday() == Weekday::Mon, "Week must start on a Monday");
    let expected = week_end_of(start);
    if let Some(end) = end {
        v.check(end == expected, "Week end must be six days after week start");
    }
    expected
}

pub fn check_notes(v: &mut Violations, notes: &str) {
    v.check(
        notes.chars().count() <= MAX_NOTES_LEN,
        format!("Notes cannot exceed {} characters", MAX_NOTES_LEN),
    );
}

pub fn check_color(v: &mut Violations, color: &str) {
    v.check(
        COLOR_RE.is_match(color),
        "Color must be a hex value like #3B82F6",
    );
}

pub fn check_estimate(v: &mut Violations, estimate: Option<Decimal>) {
    if let Some(est) = estimate {
        v.check(
            !est.is_sign_negative() || est.is_zero(),
            "Estimated hours cannot be negative",
        );
        v.check(
            est <= Decimal::from(MAX_ESTIMATE_HOURS),
            format!("Estimated hours cannot exceed {}", MAX_ESTIMATE_HOURS),
        );
        v.check(
            est.normalize().scale() <= HOURS_SCALE,
            "Estimated hours can have at most 2 decimals",
        );
    }
}
