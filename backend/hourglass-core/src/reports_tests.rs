// src/reports_tests.rs

#[cfg(test)]
mod tests {
    use crate::models::{Timesheet, TimesheetStatus};
    use crate::reports::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sheet(user: Uuid, week_start: NaiveDate, hours: [Decimal; 7]) -> Timesheet {
        Timesheet::new(user, week_start, hours.to_vec(), String::new())
    }

    #[test]
    fn summary_totals_days_months_and_members() {
        let ann = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut approved = sheet(
            ann,
            date(2024, 1, 29),
            [dec!(8), dec!(8), dec!(0), dec!(0), dec!(0), dec!(0), dec!(0)],
        );
        approved.status = TimesheetStatus::Approved;
        let sheets = vec![
            approved,
            sheet(
                ann,
                date(2024, 2, 5),
                [dec!(4), dec!(0), dec!(0), dec!(0), dec!(0), dec!(0), dec!(0)],
            ),
            sheet(
                bob,
                date(2024, 2, 5),
                [dec!(0), dec!(7.5), dec!(0), dec!(0), dec!(0), dec!(0), dec!(2)],
            ),
        ];
        let names = HashMap::from([(ann, "Ann".to_string()), (bob, "Bob".to_string())]);

        let report = summarize(&sheets, &names, dec!(75));

        assert_eq!(report.total_hours, dec!(29.5));
        assert_eq!(report.billable_hours, report.total_hours);
        assert_eq!(report.revenue, dec!(2212.5));

        assert_eq!(report.weekly.len(), 7);
        assert_eq!(report.weekly[0].day, "Mon");
        assert_eq!(report.weekly[0].hours, dec!(12));
        assert_eq!(report.weekly[1].hours, dec!(15.5));
        assert_eq!(report.weekly[6].hours, dec!(2));
        assert!(report.weekly.iter().all(|d| d.target == 8));

        assert_eq!(report.monthly.len(), 2);
        assert_eq!(report.monthly[0].month, "2024-01");
        assert_eq!(report.monthly[0].hours, dec!(16));
        assert_eq!(report.monthly[1].month, "2024-02");
        assert_eq!(report.monthly[1].revenue, dec!(1012.5));

        assert_eq!(report.team[0].name, "Ann");
        assert_eq!(report.team[0].hours, dec!(20));
        assert_eq!(report.team[0].timesheets, 2);
        assert_eq!(report.team[1].name, "Bob");

        assert_eq!(report.status_counts.get("draft"), Some(&2));
        assert_eq!(report.status_counts.get("approved"), Some(&1));
    }

    #[test]
    fn unknown_members_are_labelled() {
        let sheets = vec![sheet(Uuid::new_v4(), date(2024, 3, 4), [dec!(1); 7])];
        let report = summarize(&sheets, &HashMap::new(), dec!(50));
        assert_eq!(report.team[0].name, "Unknown");
    }

    #[test]
    fn empty_summary_is_zero() {
        let report = summarize(&[], &HashMap::new(), dec!(75));
        assert_eq!(report.total_hours, Decimal::ZERO);
        assert_eq!(report.revenue, Decimal::ZERO);
        assert!(report.monthly.is_empty());
        assert!(report.team.is_empty());
    }

    #[test]
    fn dashboard_buckets_by_week_start() {
        let user = Uuid::new_v4();
        let full_week = [dec!(8), dec!(8), dec!(8), dec!(8), dec!(8), dec!(0), dec!(0)];
        let sheets = vec![
            // This week
            sheet(user, date(2024, 5, 13), full_week),
            // Same month
            sheet(user, date(2024, 5, 6), [dec!(2); 7]),
            // Same quarter, previous month
            sheet(user, date(2024, 4, 1), [dec!(1); 7]),
            // Same year, earlier quarter
            sheet(user, date(2024, 1, 8), [dec!(1); 7]),
            // Previous year
            sheet(user, date(2023, 12, 25), [dec!(10); 7]),
        ];

        let totals = dashboard_totals(&sheets, date(2024, 5, 15)).unwrap();

        assert_eq!(totals.week.start, date(2024, 5, 13));
        assert_eq!(totals.week.end, date(2024, 5, 19));
        assert_eq!(totals.week.hours, dec!(40));
        assert_eq!(totals.week_utilization, dec!(100));

        assert_eq!(totals.month.start, date(2024, 5, 1));
        assert_eq!(totals.month.end, date(2024, 5, 31));
        assert_eq!(totals.month.hours, dec!(54));
        assert_eq!(totals.month.timesheets, 2);

        assert_eq!(totals.quarter.start, date(2024, 4, 1));
        assert_eq!(totals.quarter.end, date(2024, 6, 30));
        assert_eq!(totals.quarter.hours, dec!(61));

        assert_eq!(totals.year.start, date(2024, 1, 1));
        assert_eq!(totals.year.end, date(2024, 12, 31));
        assert_eq!(totals.year.hours, dec!(68));
        assert_eq!(totals.year.timesheets, 4);
    }

    #[test]
    fn detail_rows_skip_empty_days() {
        let ann = Uuid::new_v4();
        let sheets = vec![sheet(
            ann,
            date(2024, 2, 5),
            [dec!(8), dec!(0), dec!(3.5), dec!(0), dec!(0), dec!(0), dec!(0)],
        )];
        let members = HashMap::from([(ann, ("Ann".to_string(), "ann@example.com".to_string()))]);

        let rows = detailed_rows(&sheets, &members, dec!(75));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date(2024, 2, 5));
        assert_eq!(rows[1].date, date(2024, 2, 7));
        assert_eq!(rows[1].hours, dec!(3.5));
        assert_eq!(rows[1].email, "ann@example.com");
        assert_eq!(rows[1].status, "draft");
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let rows = vec![DetailRow {
            date: date(2024, 2, 5),
            member: "Ann, Jr.".into(),
            email: "ann@example.com".into(),
            hours: dec!(7.50),
            status: "submitted".into(),
            rate: dec!(75),
        }];

        let body = String::from_utf8(export_csv(&rows).unwrap()).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines[0], "date,member,email,hours,status,rate");
        assert_eq!(lines[1], "2024-02-05,\"Ann, Jr.\",ann@example.com,7.5,submitted,75");
    }
}
