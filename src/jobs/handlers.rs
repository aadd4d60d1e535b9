use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::db::models::{Application, ApplicationStatus, Owner};
use crate::db::Database;
use crate::drive::{DriveClient, FileContent, DOCX_MIME};
use crate::insights;
use crate::mail::GmailClient;
use crate::oracle::{OracleClient, OracleError, ParsedJobDescription};
use crate::sync::{self, SyncFailure};

const RESUME_FILE_ENV: &str = "JOBTRAIL_RESUME_FILE";

/// A job that could not produce a result payload. Carried to the caller as
/// a structured JSON-RPC error, never as a raw panic.
#[derive(Debug)]
pub struct JobFailure {
    pub message: String,
    pub details: Option<Value>,
}

impl JobFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

impl From<anyhow::Error> for JobFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::new(format!("{error:#}"))
    }
}

impl From<crate::db::DbError> for JobFailure {
    fn from(error: crate::db::DbError) -> Self {
        Self::new(error.to_string())
    }
}

impl From<OracleError> for JobFailure {
    fn from(error: OracleError) -> Self {
        match error {
            OracleError::BadJson { raw, .. } => Self {
                message: "invalid JSON response from oracle".to_string(),
                details: Some(json!({ "rawResponse": raw })),
            },
            other => Self::new(format!("{other:#}")),
        }
    }
}

pub fn job_schemas() -> Vec<Value> {
    vec![
        json!({
            "name": "sync_mail",
            "description": "Reconcile labeled inbox messages against tracked applications",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "owner": {"type": "string"}
                }
            }
        }),
        json!({
            "name": "parse_job_description",
            "description": "Extract structured fields from a job description document",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "documentText": {"type": "string"},
                    "fileName": {"type": "string"},
                    "fileId": {"type": "string"}
                },
                "required": ["documentText"]
            }
        }),
        json!({
            "name": "score_fit",
            "description": "Score candidate/job fit for a tracked application",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "applicationId": {"type": "string"},
                    "jobDescriptionText": {"type": "string"},
                    "resumeText": {"type": "string"}
                },
                "required": ["applicationId"]
            }
        }),
        json!({
            "name": "generate_insights",
            "description": "Compute campaign metrics and ask the oracle for strategic insights",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "owner": {"type": "string"}
                }
            }
        }),
        json!({
            "name": "import_drive_folder",
            "description": "Import job description documents from a drive folder as applications",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "accessToken": {"type": "string"},
                    "folderId": {"type": "string"},
                    "owner": {"type": "string"}
                },
                "required": ["accessToken", "folderId"]
            }
        }),
    ]
}

pub async fn run_job(name: &str, arguments: Value) -> Result<Value, JobFailure> {
    match name {
        "sync_mail" => sync_mail(&arguments).await,
        "parse_job_description" => parse_job_description(&arguments).await,
        "score_fit" => score_fit(&arguments).await,
        "generate_insights" => generate_insights(&arguments).await,
        "import_drive_folder" => import_drive_folder(&arguments).await,
        other => Err(JobFailure::new(format!("unknown job: {other}"))),
    }
}

async fn sync_mail(arguments: &Value) -> Result<Value, JobFailure> {
    let db = open_db()?;
    let owner = resolve_owner(&db, optional_string(arguments, "owner").as_deref())?;
    let gateway = GmailClient::from_env()?;

    match sync::run_sync(&db, &gateway, &owner.owner_id, Utc::now()).await {
        Ok(outcome) => Ok(serde_json::to_value(outcome)
            .context("serialize sync outcome")
            .map_err(JobFailure::from)?),
        // Misconfiguration is user-actionable, not a run error.
        Err(failure) if failure.is_configuration() => Ok(json!({
            "success": false,
            "error": failure.to_string(),
        })),
        Err(failure) => Err(sync_failure_to_job_failure(failure)),
    }
}

fn sync_failure_to_job_failure(failure: SyncFailure) -> JobFailure {
    let details = match &failure {
        SyncFailure::CredentialRefresh(source)
        | SyncFailure::LabelListing(source)
        | SyncFailure::MessageListing(source) => Some(json!({ "details": format!("{source:#}") })),
        _ => None,
    };
    JobFailure {
        message: failure.to_string(),
        details,
    }
}

async fn parse_job_description(arguments: &Value) -> Result<Value, JobFailure> {
    let document_text = required_string(arguments, "documentText")?;
    let file_name = optional_string(arguments, "fileName");
    let file_id = optional_string(arguments, "fileId");

    let oracle = OracleClient::from_env()?;
    let parsed = oracle.parse_job_description(&document_text).await?;

    Ok(parsed_document_payload(
        &parsed,
        Some(crate::oracle::sanitize_text(&document_text)),
        file_id.as_deref(),
        file_name.as_deref(),
    ))
}

async fn score_fit(arguments: &Value) -> Result<Value, JobFailure> {
    let application_id = required_string(arguments, "applicationId")?;
    let db = open_db()?;

    let application = db
        .get_application(&application_id)?
        .ok_or_else(|| JobFailure::new(format!("application not found: {application_id}")))?;

    let job_text = optional_string(arguments, "jobDescriptionText")
        .or_else(|| application.job_description_text.clone())
        .ok_or_else(|| {
            JobFailure::new("no job description text available; pass jobDescriptionText")
        })?;
    let resume_text = resolve_resume_text(optional_string(arguments, "resumeText"))?;

    let oracle = OracleClient::from_env()?;
    let analysis = oracle.score_fit(&job_text, &resume_text).await?;

    let analysis_value = serde_json::to_value(&analysis)
        .context("serialize fit analysis")
        .map_err(JobFailure::from)?;
    db.set_fit_analysis(
        &application_id,
        analysis.fit_score,
        &analysis_value,
        &now_rfc3339(),
    )?;

    Ok(json!({
        "success": true,
        "applicationId": application_id,
        "fitScore": analysis.fit_score,
        "fitAnalysis": analysis_value,
    }))
}

async fn generate_insights(arguments: &Value) -> Result<Value, JobFailure> {
    let db = open_db()?;
    let owner = resolve_owner(&db, optional_string(arguments, "owner").as_deref())?;

    let now = Utc::now();
    let metrics = insights::compute_metrics(
        &db,
        &owner.owner_id,
        now,
        insights::target_deadline_from_env(),
    )?;
    let metrics_value = serde_json::to_value(&metrics)
        .context("serialize campaign metrics")
        .map_err(JobFailure::from)?;

    let oracle = OracleClient::from_env()?;
    let narrative = oracle.generate_insights(&metrics_value).await?;

    let insight_id = Uuid::new_v4().to_string();
    db.insert_insight(
        &insight_id,
        &owner.owner_id,
        &metrics_value,
        &narrative,
        &now.to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;

    Ok(json!({
        "success": true,
        "insightId": insight_id,
        "insights": narrative,
        "metrics": metrics_value,
    }))
}

async fn import_drive_folder(arguments: &Value) -> Result<Value, JobFailure> {
    let access_token = required_string(arguments, "accessToken")?;
    let folder_id = required_string(arguments, "folderId")?;

    let db = open_db()?;
    let owner = resolve_owner(&db, optional_string(arguments, "owner").as_deref())?;
    let drive = DriveClient::new();
    let oracle = OracleClient::from_env()?;

    let files = drive.list_folder(&access_token, &folder_id).await?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut errors: Vec<Value> = Vec::new();

    for file in &files {
        if db.find_application_by_drive_file(&owner.owner_id, &file.id)?.is_some() {
            skipped += 1;
            continue;
        }

        let content = match drive.fetch_content(&access_token, file).await {
            Ok(content) => content,
            Err(error) => {
                warn!(file = %file.name, %error, "drive download failed; file skipped");
                errors.push(json!({ "file": file.name, "error": format!("{error:#}") }));
                continue;
            }
        };

        let parsed = match parse_drive_content(&oracle, file, &content).await {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                skipped += 1;
                errors.push(json!({
                    "file": file.name,
                    "error": "binary format requires the external text-extraction service",
                }));
                continue;
            }
            Err(error) => {
                let failure = JobFailure::from(error);
                errors.push(json!({
                    "file": file.name,
                    "error": failure.message,
                    "details": failure.details,
                }));
                continue;
            }
        };

        let job_description_text = match &content {
            FileContent::Text(text) => Some(crate::oracle::sanitize_text(text)),
            FileContent::Binary { .. } => None,
        };
        db.insert_application(&new_application(&owner.owner_id, file, &parsed, job_description_text))?;
        imported += 1;
    }

    Ok(json!({
        "success": true,
        "filesFound": files.len(),
        "imported": imported,
        "skipped": skipped,
        "errors": errors,
    }))
}

async fn parse_drive_content(
    oracle: &OracleClient,
    file: &crate::drive::DriveFile,
    content: &FileContent,
) -> Result<Option<ParsedJobDescription>, OracleError> {
    match content {
        FileContent::Text(text) => oracle.parse_job_description(text).await.map(Some),
        FileContent::Binary { mime_type, bytes } if mime_type == crate::drive::PDF_MIME => {
            oracle.parse_job_description_pdf(bytes).await.map(Some)
        }
        // Legacy Word extraction is an external collaborator; without it the
        // file is reported, not imported.
        FileContent::Binary { mime_type, .. } if mime_type == DOCX_MIME => Ok(None),
        FileContent::Binary { .. } => {
            warn!(file = %file.name, "unrecognized binary format; file skipped");
            Ok(None)
        }
    }
}

fn new_application(
    owner_id: &str,
    file: &crate::drive::DriveFile,
    parsed: &ParsedJobDescription,
    job_description_text: Option<String>,
) -> Application {
    let now = now_rfc3339();
    Application {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        company_name: parsed
            .company_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        job_title: parsed.job_title.clone(),
        status: ApplicationStatus::Applied,
        application_date: Some(Utc::now().format("%Y-%m-%d").to_string()),
        location: parsed.location.clone(),
        salary_min: parsed.salary_min,
        salary_max: parsed.salary_max,
        company_size: parsed.company_size.clone(),
        annual_revenue: parsed.annual_revenue.clone(),
        industry: parsed.industry.clone(),
        company_type: parsed.company_type.clone(),
        stock_ticker: parsed.stock_ticker.clone(),
        company_summary: parsed.company_summary.clone(),
        source_file: Some(file.name.clone()),
        drive_file_id: Some(file.id.clone()),
        job_description_text,
        fit_score: None,
        fit_analysis: None,
        status_updated_at: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn parsed_document_payload(
    parsed: &ParsedJobDescription,
    job_description_text: Option<String>,
    file_id: Option<&str>,
    file_name: Option<&str>,
) -> Value {
    let mut payload = serde_json::to_value(parsed).unwrap_or_else(|_| json!({}));
    if let Some(map) = payload.as_object_mut() {
        map.insert("job_description_text".to_string(), json!(job_description_text));
        map.insert("google_drive_file_id".to_string(), json!(file_id));
        map.insert("source_file".to_string(), json!(file_name));
        map.insert("parsed_at".to_string(), json!(now_rfc3339()));
    }
    payload
}

fn resolve_resume_text(from_params: Option<String>) -> Result<String, JobFailure> {
    if let Some(text) = from_params {
        return Ok(text);
    }
    if let Ok(path) = std::env::var(RESUME_FILE_ENV) {
        return std::fs::read_to_string(path.trim())
            .with_context(|| format!("read resume file from {RESUME_FILE_ENV}"))
            .map_err(JobFailure::from);
    }
    Err(JobFailure::new(format!(
        "no resume text available; pass resumeText or set {RESUME_FILE_ENV}"
    )))
}

fn open_db() -> Result<Database, JobFailure> {
    let db_path = Database::default_db_path()?;
    Database::open(&db_path).map_err(JobFailure::from)
}

/// Resolve the acting owner: explicit id, or the sole configured owner.
fn resolve_owner(db: &Database, owner_id: Option<&str>) -> Result<Owner, JobFailure> {
    if let Some(owner_id) = owner_id {
        return db
            .get_owner(owner_id)?
            .ok_or_else(|| JobFailure::new(format!("owner not found: {owner_id}")));
    }

    let mut owners = db.list_owners()?;
    match owners.len() {
        0 => Err(JobFailure::new(
            "no owners configured; use 'jobtrail owners add' first",
        )),
        1 => Ok(owners.remove(0)),
        _ => Err(JobFailure::new(
            "multiple owners configured; pass the owner parameter to disambiguate",
        )),
    }
}

fn required_string(arguments: &Value, key: &str) -> Result<String, JobFailure> {
    optional_string(arguments, key)
        .ok_or_else(|| JobFailure::new(format!("missing required param '{key}'")))
}

fn optional_string(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
