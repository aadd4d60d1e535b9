use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use jobtrail::db::models::{
    Application, ApplicationStatus, ChangeSource, CredentialState, Owner, StatusHistoryEntry,
    UnmatchedNotification,
};
use jobtrail::db::Database;
use jobtrail::insights::compute_metrics;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("jobtrail-foundation-it-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp test root");
    root
}

fn owner(id: &str) -> Owner {
    Owner {
        owner_id: id.to_string(),
        email_address: format!("{id}@example.com"),
        display_name: Some(id.to_string()),
        created_at: None,
    }
}

fn application(
    id: &str,
    owner_id: &str,
    company: &str,
    status: ApplicationStatus,
    fit_score: Option<f64>,
) -> Application {
    Application {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        company_name: company.to_string(),
        job_title: Some("VP Revenue Operations".to_string()),
        status,
        application_date: Some("2026-01-02".to_string()),
        location: Some("New York, NY".to_string()),
        salary_min: Some(300_000),
        salary_max: Some(400_000),
        company_size: None,
        annual_revenue: None,
        industry: Some("Technology".to_string()),
        company_type: Some("public".to_string()),
        stock_ticker: None,
        company_summary: None,
        source_file: Some("jd.txt".to_string()),
        drive_file_id: Some(format!("drive-{id}")),
        job_description_text: Some("Long job description".to_string()),
        fit_score,
        fit_analysis: fit_score.map(|score| serde_json::json!({ "fit_score": score })),
        status_updated_at: Some("2026-01-03T00:00:00Z".to_string()),
        created_at: "2026-01-02T00:00:00Z".to_string(),
        updated_at: "2026-01-03T00:00:00Z".to_string(),
    }
}

#[test]
fn foundation_store_and_metrics_integration_smoke_test() {
    let root = temp_root();
    let db = Database::open(&root.join("jobtrail.db")).expect("open db");

    db.insert_owner(&owner("owner-a")).expect("insert owner a");
    db.insert_owner(&owner("owner-b")).expect("insert owner b");

    db.insert_application(&application(
        "app-1",
        "owner-a",
        "Acme",
        ApplicationStatus::Interviews,
        Some(88.0),
    ))
    .expect("insert app-1");
    db.insert_application(&application(
        "app-2",
        "owner-a",
        "Globex",
        ApplicationStatus::Applied,
        None,
    ))
    .expect("insert app-2");
    db.insert_application(&application(
        "app-3",
        "owner-b",
        "Initech",
        ApplicationStatus::Offer,
        Some(91.0),
    ))
    .expect("insert app-3");

    // Ownership scoping: listings never cross owners.
    assert_eq!(db.list_applications("owner-a").expect("list a").len(), 2);
    assert_eq!(db.list_applications("owner-b").expect("list b").len(), 1);

    // Drive-file lookup backs the import dedup.
    assert!(db
        .find_application_by_drive_file("owner-a", "drive-app-1")
        .expect("lookup")
        .is_some());
    assert!(db
        .find_application_by_drive_file("owner-b", "drive-app-1")
        .expect("lookup")
        .is_none());

    db.insert_status_history(&StatusHistoryEntry {
        id: "h1".to_string(),
        owner_id: "owner-a".to_string(),
        application_id: "app-1".to_string(),
        previous_status: ApplicationStatus::Applied,
        new_status: ApplicationStatus::Interviews,
        source: ChangeSource::Email,
        mail_message_id: Some("m1".to_string()),
        notes: Some("Auto-updated from mail label: JH25 - interviews".to_string()),
        changed_at: "2026-01-09T00:00:00Z".to_string(),
    })
    .expect("insert history");

    db.insert_unmatched(&UnmatchedNotification {
        id: "u1".to_string(),
        owner_id: "owner-a".to_string(),
        mail_message_id: "m9".to_string(),
        mail_thread_id: None,
        subject: Some("Interview at Hooli".to_string()),
        sender_email: Some("talent@hooli.com".to_string()),
        sender_name: None,
        snippet: None,
        label_name: "JH25 - interviews".to_string(),
        suggested_status: ApplicationStatus::Interviews,
        received_at: Some("2026-01-10T00:00:00Z".to_string()),
        created_at: None,
    })
    .expect("insert unmatched");

    db.save_credentials(&CredentialState {
        owner_id: "owner-a".to_string(),
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        token_expiry: "2026-02-01T00:00:00Z".to_string(),
        sync_enabled: true,
        last_sync_at: None,
        updated_at: None,
    })
    .expect("save credentials");
    db.mark_sync_completed("owner-a", "2026-01-11T00:00:00Z")
        .expect("stamp completion");

    let stats = db.get_stats().expect("stats");
    assert_eq!(stats.total_owners, 2);
    assert_eq!(stats.total_applications, 3);
    assert_eq!(stats.total_history_entries, 1);
    assert_eq!(stats.total_unmatched, 1);

    let now = Utc.with_ymd_and_hms(2026, 1, 25, 0, 0, 0).unwrap();
    let metrics = compute_metrics(&db, "owner-a", now, None).expect("metrics");
    assert_eq!(metrics.total_applications, 2);
    assert_eq!(metrics.status_breakdown.get("interviews"), Some(&1));
    assert_eq!(metrics.response_rate, 50.0);
    assert_eq!(metrics.avg_days_to_response, Some(7));
    assert_eq!(metrics.high_fit_active, 1);
    // Both owner-a applications have been idle past the staleness window.
    assert_eq!(metrics.stale_applications, 2);

    let history = db.list_status_history("owner-a", 10).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_status, ApplicationStatus::Interviews);

    let _ = std::fs::remove_dir_all(root);
}
