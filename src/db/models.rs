use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rusqlite::{Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked application, ordered by pipeline
/// progression (not strictly linear; rejected/withdrawn sit outside it).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Applied,
    FollowUp,
    RecruiterScreen,
    HiringManager,
    Interviews,
    Offer,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [Self; 8] = [
        Self::Applied,
        Self::FollowUp,
        Self::RecruiterScreen,
        Self::HiringManager,
        Self::Interviews,
        Self::Offer,
        Self::Rejected,
        Self::Withdrawn,
    ];

    /// Statuses excluded from "active pipeline" metrics.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Withdrawn | Self::Offer)
    }
}

impl Display for ApplicationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::FollowUp => "follow_up",
            Self::RecruiterScreen => "recruiter_screen",
            Self::HiringManager => "hiring_manager",
            Self::Interviews => "interviews",
            Self::Offer => "offer",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "applied" => Ok(Self::Applied),
            "follow_up" => Ok(Self::FollowUp),
            "recruiter_screen" => Ok(Self::RecruiterScreen),
            "hiring_manager" => Ok(Self::HiringManager),
            "interviews" => Ok(Self::Interviews),
            "offer" => Ok(Self::Offer),
            "rejected" => Ok(Self::Rejected),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(format!("invalid application status: {other}")),
        }
    }
}

/// Where a status transition came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Manual,
    Email,
    Import,
}

impl Display for ChangeSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Email => write!(f, "email"),
            Self::Import => write!(f, "import"),
        }
    }
}

impl FromStr for ChangeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "email" => Ok(Self::Email),
            "import" => Ok(Self::Import),
            other => Err(format!("invalid change source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Owner {
    pub owner_id: String,
    pub email_address: String,
    pub display_name: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub id: String,
    pub owner_id: String,
    pub company_name: String,
    pub job_title: Option<String>,
    pub status: ApplicationStatus,
    pub application_date: Option<String>,
    pub location: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub company_size: Option<String>,
    pub annual_revenue: Option<String>,
    pub industry: Option<String>,
    pub company_type: Option<String>,
    pub stock_ticker: Option<String>,
    pub company_summary: Option<String>,
    pub source_file: Option<String>,
    pub drive_file_id: Option<String>,
    pub job_description_text: Option<String>,
    pub fit_score: Option<f64>,
    pub fit_analysis: Option<serde_json::Value>,
    pub status_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable audit record; exactly one row per accepted status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub owner_id: String,
    pub application_id: String,
    pub previous_status: ApplicationStatus,
    pub new_status: ApplicationStatus,
    pub source: ChangeSource,
    pub mail_message_id: Option<String>,
    pub notes: Option<String>,
    pub changed_at: String,
}

/// A status-bearing message the matcher could not attach to any application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedNotification {
    pub id: String,
    pub owner_id: String,
    pub mail_message_id: String,
    pub mail_thread_id: Option<String>,
    pub subject: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub snippet: Option<String>,
    pub label_name: String,
    pub suggested_status: ApplicationStatus,
    pub received_at: Option<String>,
    pub created_at: Option<String>,
}

/// Per-owner mail credential record. Read once per sync run, written at most
/// twice (token refresh, then completion stamp).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialState {
    pub owner_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: String,
    pub sync_enabled: bool,
    pub last_sync_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkingContact {
    pub id: String,
    pub owner_id: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub email_address: Option<String>,
    pub next_follow_up_date: Option<String>,
    pub created_at: Option<String>,
}

fn parse_json_value(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
}

fn column_parse_error(raw: &str, err: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        raw.len(),
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
    )
}

fn status_from_column(row: &Row<'_>, column: &str) -> SqlResult<ApplicationStatus> {
    let raw: String = row.get(column)?;
    ApplicationStatus::from_str(&raw).map_err(|e| column_parse_error(&raw, e))
}

impl Owner {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            owner_id: row.get("owner_id")?,
            email_address: row.get("email_address")?,
            display_name: row.get("display_name")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl Application {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            company_name: row.get("company_name")?,
            job_title: row.get("job_title")?,
            status: status_from_column(row, "status")?,
            application_date: row.get("application_date")?,
            location: row.get("location")?,
            salary_min: row.get("salary_min")?,
            salary_max: row.get("salary_max")?,
            company_size: row.get("company_size")?,
            annual_revenue: row.get("annual_revenue")?,
            industry: row.get("industry")?,
            company_type: row.get("company_type")?,
            stock_ticker: row.get("stock_ticker")?,
            company_summary: row.get("company_summary")?,
            source_file: row.get("source_file")?,
            drive_file_id: row.get("drive_file_id")?,
            job_description_text: row.get("job_description_text")?,
            fit_score: row.get("fit_score")?,
            fit_analysis: parse_json_value(row.get("fit_analysis")?),
            status_updated_at: row.get("status_updated_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl StatusHistoryEntry {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        let source_raw: String = row.get("source")?;
        let source =
            ChangeSource::from_str(&source_raw).map_err(|e| column_parse_error(&source_raw, e))?;

        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            application_id: row.get("application_id")?,
            previous_status: status_from_column(row, "previous_status")?,
            new_status: status_from_column(row, "new_status")?,
            source,
            mail_message_id: row.get("mail_message_id")?,
            notes: row.get("notes")?,
            changed_at: row.get("changed_at")?,
        })
    }
}

impl UnmatchedNotification {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            mail_message_id: row.get("mail_message_id")?,
            mail_thread_id: row.get("mail_thread_id")?,
            subject: row.get("subject")?,
            sender_email: row.get("sender_email")?,
            sender_name: row.get("sender_name")?,
            snippet: row.get("snippet")?,
            label_name: row.get("label_name")?,
            suggested_status: status_from_column(row, "suggested_status")?,
            received_at: row.get("received_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl CredentialState {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            owner_id: row.get("owner_id")?,
            access_token: row.get("access_token")?,
            refresh_token: row.get("refresh_token")?,
            token_expiry: row.get("token_expiry")?,
            sync_enabled: row.get("sync_enabled")?,
            last_sync_at: row.get("last_sync_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl NetworkingContact {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            name: row.get("name")?,
            company: row.get("company")?,
            email_address: row.get("email_address")?,
            next_follow_up_date: row.get("next_follow_up_date")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Application, ApplicationStatus, ChangeSource};

    #[test]
    fn status_display_and_parse_round_trip() {
        for status in ApplicationStatus::ALL {
            let parsed: ApplicationStatus =
                status.to_string().parse().expect("parse rendered status");
            assert_eq!(parsed, status);
        }
        assert!("no_such_status".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn change_source_display_and_parse() {
        assert_eq!(ChangeSource::Email.to_string(), "email");
        assert_eq!(
            "import".parse::<ChangeSource>().expect("parse source"),
            ChangeSource::Import
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(ApplicationStatus::Offer.is_terminal());
        assert!(ApplicationStatus::Rejected.is_terminal());
        assert!(ApplicationStatus::Withdrawn.is_terminal());
        assert!(!ApplicationStatus::Interviews.is_terminal());
    }

    #[test]
    fn serde_round_trip_application() {
        let app = Application {
            id: "app-1".to_string(),
            owner_id: "owner-1".to_string(),
            company_name: "Acme".to_string(),
            job_title: Some("VP Sales".to_string()),
            status: ApplicationStatus::RecruiterScreen,
            application_date: Some("2026-01-05".to_string()),
            location: Some("New York, NY".to_string()),
            salary_min: Some(300_000),
            salary_max: Some(400_000),
            company_size: Some("1001-5000".to_string()),
            annual_revenue: Some("$1.2B".to_string()),
            industry: Some("Advertising".to_string()),
            company_type: Some("public".to_string()),
            stock_ticker: Some("ACME".to_string()),
            company_summary: None,
            source_file: None,
            drive_file_id: None,
            job_description_text: Some("Long JD text".to_string()),
            fit_score: Some(87.0),
            fit_analysis: Some(serde_json::json!({"fit_score": 87})),
            status_updated_at: Some("2026-01-10T09:00:00Z".to_string()),
            created_at: "2026-01-05T08:00:00Z".to_string(),
            updated_at: "2026-01-10T09:00:00Z".to_string(),
        };

        let json = serde_json::to_string(&app).expect("serialize application");
        assert!(json.contains("\"recruiter_screen\""));
        let back: Application = serde_json::from_str(&json).expect("deserialize application");
        assert_eq!(back, app);
    }
}
