use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use crate::db::models::ApplicationStatus;
use crate::db::{Database, DbError};

pub const TARGET_DEADLINE_ENV: &str = "JOBTRAIL_TARGET_DEADLINE";

const STALE_AFTER_DAYS: i64 = 14;
const TOP_STALE_LIMIT: usize = 5;
const HIGH_FIT_THRESHOLD: f64 = 80.0;
const HISTORY_SAMPLE: usize = 100;

/// Campaign metrics computed from stored data; the oracle narrates these,
/// it never recomputes them.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CampaignMetrics {
    pub total_applications: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub response_rate: f64,
    pub interview_rate: f64,
    pub avg_days_to_response: Option<i64>,
    pub stale_applications: usize,
    pub top_stale_apps: Vec<StaleApplication>,
    pub high_fit_active: usize,
    pub networking_contacts: i64,
    pub overdue_followups: i64,
    pub days_to_deadline: Option<i64>,
    pub weeks_remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StaleApplication {
    pub company: String,
    pub title: Option<String>,
    pub status: String,
    pub fit_score: Option<f64>,
    pub days_since_update: i64,
}

pub fn target_deadline_from_env() -> Option<NaiveDate> {
    let raw = std::env::var(TARGET_DEADLINE_ENV).ok()?;
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(error) => {
            warn!(%error, "ignoring unparseable {TARGET_DEADLINE_ENV}");
            None
        }
    }
}

pub fn compute_metrics(
    db: &Database,
    owner_id: &str,
    now: DateTime<Utc>,
    target_deadline: Option<NaiveDate>,
) -> Result<CampaignMetrics, DbError> {
    let applications = db.list_applications(owner_id)?;
    let history = db.list_status_history(owner_id, HISTORY_SAMPLE)?;

    let total = applications.len();
    let mut status_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for app in &applications {
        *status_breakdown.entry(app.status.to_string()).or_default() += 1;
    }

    let count =
        |status: ApplicationStatus| *status_breakdown.get(&status.to_string()).unwrap_or(&0);
    let responded = count(ApplicationStatus::RecruiterScreen)
        + count(ApplicationStatus::HiringManager)
        + count(ApplicationStatus::Interviews)
        + count(ApplicationStatus::Offer);
    let interviewing = count(ApplicationStatus::Interviews)
        + count(ApplicationStatus::HiringManager)
        + count(ApplicationStatus::Offer);

    let response_rate = rate(responded, total);
    let interview_rate = rate(interviewing, total);

    // Days from applying to the first move off "applied", sampled from the
    // recent history window.
    let mut response_days = Vec::new();
    for entry in &history {
        if entry.previous_status != ApplicationStatus::Applied {
            continue;
        }
        let Some(app) = applications.iter().find(|app| app.id == entry.application_id) else {
            continue;
        };
        let Some(applied_on) = app
            .application_date
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let Ok(changed_at) = DateTime::parse_from_rfc3339(&entry.changed_at) else {
            continue;
        };
        let days = (changed_at.date_naive() - applied_on).num_days();
        if days > 0 {
            response_days.push(days);
        }
    }
    let avg_days_to_response = if response_days.is_empty() {
        None
    } else {
        Some(response_days.iter().sum::<i64>() / response_days.len() as i64)
    };

    let mut stale: Vec<StaleApplication> = applications
        .iter()
        .filter(|app| !app.status.is_terminal())
        .filter_map(|app| {
            let last_update = app
                .status_updated_at
                .as_deref()
                .unwrap_or(&app.updated_at);
            let parsed = DateTime::parse_from_rfc3339(last_update).ok()?;
            let days = (now - parsed.with_timezone(&Utc)).num_days();
            (days >= STALE_AFTER_DAYS).then(|| StaleApplication {
                company: app.company_name.clone(),
                title: app.job_title.clone(),
                status: app.status.to_string(),
                fit_score: app.fit_score,
                days_since_update: days,
            })
        })
        .collect();
    stale.sort_by(|a, b| b.days_since_update.cmp(&a.days_since_update));
    let stale_applications = stale.len();
    stale.truncate(TOP_STALE_LIMIT);

    let high_fit_active = applications
        .iter()
        .filter(|app| !app.status.is_terminal())
        .filter(|app| app.fit_score.unwrap_or(0.0) >= HIGH_FIT_THRESHOLD)
        .count();

    let networking_contacts = db.count_networking_contacts(owner_id)?;
    let overdue_followups =
        db.count_overdue_follow_ups(owner_id, &now.format("%Y-%m-%d").to_string())?;

    let days_to_deadline = target_deadline.map(|deadline| (deadline - now.date_naive()).num_days());
    let weeks_remaining = days_to_deadline.map(|days| (days + 6).div_euclid(7));

    Ok(CampaignMetrics {
        total_applications: total,
        status_breakdown,
        response_rate,
        interview_rate,
        avg_days_to_response,
        stale_applications,
        top_stale_apps: stale,
        high_fit_active,
        networking_contacts,
        overdue_followups,
        days_to_deadline,
        weeks_remaining,
    })
}

fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{compute_metrics, rate};
    use crate::db::models::{
        Application, ApplicationStatus, ChangeSource, Owner, StatusHistoryEntry,
    };
    use crate::db::Database;

    fn temp_db() -> (Database, PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!("jobtrail-insights-{}.db", Uuid::new_v4()));
        let db = Database::open(&path).expect("open db");
        db.insert_owner(&Owner {
            owner_id: "owner-1".to_string(),
            email_address: "owner@example.com".to_string(),
            display_name: None,
            created_at: None,
        })
        .expect("insert owner");
        (db, path)
    }

    fn application(
        id: &str,
        company: &str,
        status: ApplicationStatus,
        fit_score: Option<f64>,
        status_updated_at: &str,
    ) -> Application {
        Application {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            company_name: company.to_string(),
            job_title: Some("SVP".to_string()),
            status,
            application_date: Some("2026-01-01".to_string()),
            location: None,
            salary_min: None,
            salary_max: None,
            company_size: None,
            annual_revenue: None,
            industry: None,
            company_type: None,
            stock_ticker: None,
            company_summary: None,
            source_file: None,
            drive_file_id: None,
            job_description_text: None,
            fit_score,
            fit_analysis: None,
            status_updated_at: Some(status_updated_at.to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: status_updated_at.to_string(),
        }
    }

    #[test]
    fn metrics_cover_rates_staleness_and_deadline() {
        let (db, path) = temp_db();
        db.insert_application(&application(
            "app-1",
            "Acme",
            ApplicationStatus::Interviews,
            Some(85.0),
            "2026-01-10T00:00:00Z",
        ))
        .expect("insert");
        db.insert_application(&application(
            "app-2",
            "Globex",
            ApplicationStatus::Applied,
            Some(60.0),
            "2026-01-02T00:00:00Z",
        ))
        .expect("insert");
        db.insert_application(&application(
            "app-3",
            "Initech",
            ApplicationStatus::Rejected,
            None,
            "2026-01-20T00:00:00Z",
        ))
        .expect("insert");

        db.insert_status_history(&StatusHistoryEntry {
            id: "h1".to_string(),
            owner_id: "owner-1".to_string(),
            application_id: "app-1".to_string(),
            previous_status: ApplicationStatus::Applied,
            new_status: ApplicationStatus::Interviews,
            source: ChangeSource::Email,
            mail_message_id: None,
            notes: None,
            changed_at: "2026-01-08T00:00:00Z".to_string(),
        })
        .expect("insert history");

        let now = Utc.with_ymd_and_hms(2026, 1, 25, 0, 0, 0).unwrap();
        let deadline = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let metrics =
            compute_metrics(&db, "owner-1", now, Some(deadline)).expect("compute metrics");

        assert_eq!(metrics.total_applications, 3);
        assert_eq!(metrics.status_breakdown.get("applied"), Some(&1));
        assert_eq!(metrics.response_rate, 33.3);
        assert_eq!(metrics.interview_rate, 33.3);
        assert_eq!(metrics.avg_days_to_response, Some(7));
        // app-1 (15 days) and app-2 (23 days) are stale; app-3 is terminal.
        assert_eq!(metrics.stale_applications, 2);
        assert_eq!(metrics.top_stale_apps[0].company, "Globex");
        assert_eq!(metrics.high_fit_active, 1);
        assert_eq!(metrics.days_to_deadline, Some(7));
        assert_eq!(metrics.weeks_remaining, Some(1));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn empty_campaign_yields_zero_rates() {
        let (db, path) = temp_db();
        let now = Utc.with_ymd_and_hms(2026, 1, 25, 0, 0, 0).unwrap();
        let metrics = compute_metrics(&db, "owner-1", now, None).expect("compute metrics");

        assert_eq!(metrics.total_applications, 0);
        assert_eq!(metrics.response_rate, 0.0);
        assert_eq!(metrics.avg_days_to_response, None);
        assert_eq!(metrics.days_to_deadline, None);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        assert_eq!(rate(0, 0), 0.0);
    }
}
