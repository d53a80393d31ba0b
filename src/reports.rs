//! Report aggregation. Nothing here is persisted; every report is recomputed
//! from the session and break rows whose start time falls inside the window.
//! Only ended intervals count toward totals, so a timer that is still running
//! contributes zero until it stops.

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock;
use crate::error::ApiError;
use crate::models::{Break, SessionWithTask};
use crate::timer;

#[derive(Debug, Clone, Copy)]
pub enum ReportWindow {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBreakdown {
    pub name: String,
    pub category: Option<String>,
    pub color: String,
    pub total_time: i64,
    pub session_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBreakdown {
    pub date: NaiveDate,
    pub work_time: i64,
    pub session_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_work_time: i64,
    pub total_break_time: i64,
    pub session_count: usize,
    pub break_count: usize,
    pub task_breakdown: Vec<TaskBreakdown>,
    /// Weekly reports only: one entry per day, start of week to end of week.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_breakdown: Option<Vec<DayBreakdown>>,
    /// Daily reports only: the raw rows, for rendering the day's timeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionWithTask>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaks: Option<Vec<Break>>,
}

pub async fn build_report(
    db: &PgPool,
    user_id: Uuid,
    window: ReportWindow,
    reference: NaiveDate,
) -> Result<Report, ApiError> {
    let (start, end) = match window {
        ReportWindow::Daily => clock::day_bounds(reference),
        ReportWindow::Weekly => clock::week_bounds(reference),
        ReportWindow::Monthly => clock::month_bounds(reference),
    };

    let sessions = timer::sessions_by_date_range(db, user_id, start, end).await?;
    let breaks = timer::breaks_by_date_range(db, user_id, start, end).await?;

    let mut report = aggregate(start, end, &sessions, &breaks);
    match window {
        ReportWindow::Daily => {
            report.sessions = Some(sessions);
            report.breaks = Some(breaks);
        }
        ReportWindow::Weekly => {
            report.daily_breakdown =
                Some(daily_breakdown(clock::week_start(reference), &sessions));
        }
        ReportWindow::Monthly => {}
    }

    Ok(report)
}

/// Totals and per-task grouping over the fetched rows. Unended rows are
/// excluded from totals and the task breakdown but still counted in the raw
/// row counts.
fn aggregate(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    sessions: &[SessionWithTask],
    breaks: &[Break],
) -> Report {
    let total_work_time = sessions
        .iter()
        .filter(|s| s.session.end_time.is_some())
        .map(|s| s.session.duration)
        .sum();
    let total_break_time = breaks
        .iter()
        .filter(|b| b.end_time.is_some())
        .map(|b| b.duration)
        .sum();

    let mut by_task: HashMap<&str, TaskBreakdown> = HashMap::new();
    for session in sessions.iter().filter(|s| s.session.end_time.is_some()) {
        let entry = by_task
            .entry(session.task_name.as_str())
            .or_insert_with(|| TaskBreakdown {
                name: session.task_name.clone(),
                category: session.category.clone(),
                color: session.color.clone(),
                total_time: 0,
                session_count: 0,
            });
        entry.total_time += session.session.duration;
        entry.session_count += 1;
    }

    Report {
        start_date: start,
        end_date: end,
        total_work_time,
        total_break_time,
        session_count: sessions.len(),
        break_count: breaks.len(),
        task_breakdown: by_task.into_values().collect(),
        daily_breakdown: None,
        sessions: None,
        breaks: None,
    }
}

/// Work time and ended-session count for each of the seven days starting at
/// `week_start`.
fn daily_breakdown(week_start: NaiveDate, sessions: &[SessionWithTask]) -> Vec<DayBreakdown> {
    (0..7)
        .map(|offset| {
            let day = week_start + Days::new(offset);
            let (day_start, day_end) = clock::day_bounds(day);
            let mut work_time = 0;
            let mut session_count = 0;
            for session in sessions {
                if session.session.end_time.is_some()
                    && session.session.start_time >= day_start
                    && session.session.start_time <= day_end
                {
                    work_time += session.session.duration;
                    session_count += 1;
                }
            }
            DayBreakdown { date: day, work_time, session_count }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;
    use chrono::Duration;

    fn session_row(
        task: &str,
        start: DateTime<Utc>,
        duration: i64,
        ended: bool,
    ) -> SessionWithTask {
        SessionWithTask {
            session: Session {
                id: Uuid::new_v4(),
                task_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                start_time: start,
                end_time: ended.then(|| start + Duration::seconds(duration)),
                duration: if ended { duration } else { 0 },
                time_limit: None,
                time_limit_reached: false,
                notes: None,
                created_at: start,
            },
            task_name: task.to_string(),
            category: Some("deep work".to_string()),
            color: "#3B82F6".to_string(),
        }
    }

    fn break_row(start: DateTime<Utc>, duration: i64, ended: bool) -> Break {
        Break {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            start_time: start,
            end_time: ended.then(|| start + Duration::seconds(duration)),
            duration: if ended { duration } else { 0 },
            created_at: start,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn single_ended_session_fills_totals_and_breakdown() {
        let day = date(2026, 8, 7);
        let (start, end) = clock::day_bounds(day);
        let sessions = vec![session_row("Writing", clock::start_of_day(day), 1500, true)];

        let report = aggregate(start, end, &sessions, &[]);

        assert_eq!(report.total_work_time, 1500);
        assert_eq!(report.total_break_time, 0);
        assert_eq!(report.session_count, 1);
        assert_eq!(report.task_breakdown.len(), 1);
        assert_eq!(report.task_breakdown[0].name, "Writing");
        assert_eq!(report.task_breakdown[0].total_time, 1500);
        assert_eq!(report.task_breakdown[0].session_count, 1);
    }

    #[test]
    fn active_session_contributes_zero_and_is_excluded_from_breakdown() {
        let day = date(2026, 8, 7);
        let (start, end) = clock::day_bounds(day);
        let sessions = vec![
            session_row("Writing", clock::start_of_day(day), 600, true),
            session_row("Writing", clock::start_of_day(day) + Duration::hours(2), 0, false),
        ];

        let report = aggregate(start, end, &sessions, &[]);

        assert_eq!(report.total_work_time, 600);
        // The raw count still sees both rows.
        assert_eq!(report.session_count, 2);
        assert_eq!(report.task_breakdown[0].session_count, 1);
    }

    #[test]
    fn sessions_group_by_task_name() {
        let day = date(2026, 8, 7);
        let (start, end) = clock::day_bounds(day);
        let t0 = clock::start_of_day(day);
        let sessions = vec![
            session_row("Writing", t0, 300, true),
            session_row("Writing", t0 + Duration::hours(1), 700, true),
            session_row("Review", t0 + Duration::hours(3), 100, true),
        ];

        let mut breakdown = aggregate(start, end, &sessions, &[]).task_breakdown;
        breakdown.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].name, "Review");
        assert_eq!(breakdown[0].total_time, 100);
        assert_eq!(breakdown[1].name, "Writing");
        assert_eq!(breakdown[1].total_time, 1000);
        assert_eq!(breakdown[1].session_count, 2);
    }

    #[test]
    fn ended_breaks_sum_into_break_total() {
        let day = date(2026, 8, 7);
        let (start, end) = clock::day_bounds(day);
        let t0 = clock::start_of_day(day);
        let breaks = vec![
            break_row(t0, 120, true),
            break_row(t0 + Duration::hours(1), 0, false),
        ];

        let report = aggregate(start, end, &[], &breaks);

        assert_eq!(report.total_break_time, 120);
        assert_eq!(report.break_count, 2);
    }

    #[test]
    fn empty_window_yields_zeroed_report() {
        let (start, end) = clock::day_bounds(date(2026, 8, 7));
        let report = aggregate(start, end, &[], &[]);

        assert_eq!(report.total_work_time, 0);
        assert_eq!(report.total_break_time, 0);
        assert!(report.task_breakdown.is_empty());
    }

    #[test]
    fn daily_breakdown_buckets_by_start_day() {
        let sunday = date(2026, 8, 2);
        let sessions = vec![
            session_row("Writing", clock::start_of_day(sunday) + Duration::hours(9), 900, true),
            // Wednesday.
            session_row(
                "Review",
                clock::start_of_day(sunday + Days::new(3)) + Duration::hours(14),
                600,
                true,
            ),
            // Running timer on Wednesday counts for nothing yet.
            session_row(
                "Review",
                clock::start_of_day(sunday + Days::new(3)) + Duration::hours(16),
                0,
                false,
            ),
        ];

        let days = daily_breakdown(sunday, &sessions);

        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, sunday);
        assert_eq!(days[0].work_time, 900);
        assert_eq!(days[0].session_count, 1);
        assert_eq!(days[3].work_time, 600);
        assert_eq!(days[3].session_count, 1);
        assert_eq!(days[6].work_time, 0);
    }
}
