use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use self::models::{
    Application, ApplicationStatus, CredentialState, Owner, StatusHistoryEntry,
    UnmatchedNotification,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("json serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub mod migrations;
pub mod models;
pub mod schema;

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_owners: i64,
    pub total_applications: i64,
    pub total_history_entries: i64,
    pub total_unmatched: i64,
    pub applications_by_status: Vec<StatusCount>,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let mut db = Self {
            conn,
            path: path.to_path_buf(),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn initialize(&mut self) -> Result<(), DbError> {
        migrations::migrate(&self.conn)
            .map_err(|e| DbError::Config(format!("migration failed: {e}")))
    }

    pub fn default_db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DbError::Config("failed to determine home directory".to_string()))?;
        Ok(home.join(".jobtrail").join("jobtrail.db"))
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // --- Owners ---

    pub fn insert_owner(&self, owner: &Owner) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO owners (owner_id, email_address, display_name)
            VALUES (?, ?, ?)
            "#,
            params![owner.owner_id, owner.email_address, owner.display_name],
        )?;
        Ok(())
    }

    pub fn get_owner(&self, owner_id: &str) -> Result<Option<Owner>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, email_address, display_name, created_at FROM owners WHERE owner_id = ? LIMIT 1",
        )?;
        let mut rows = stmt.query([owner_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Owner::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_owners(&self) -> Result<Vec<Owner>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, email_address, display_name, created_at FROM owners ORDER BY email_address ASC",
        )?;
        let owners = stmt
            .query_map([], Owner::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }

    // --- Applications ---

    pub fn insert_application(&self, app: &Application) -> Result<(), DbError> {
        let fit_analysis = app
            .fit_analysis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO applications (
                id, owner_id, company_name, job_title, status, application_date,
                location, salary_min, salary_max, company_size, annual_revenue,
                industry, company_type, stock_ticker, company_summary, source_file,
                drive_file_id, job_description_text, fit_score, fit_analysis,
                status_updated_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                app.id,
                app.owner_id,
                app.company_name,
                app.job_title,
                app.status.to_string(),
                app.application_date,
                app.location,
                app.salary_min,
                app.salary_max,
                app.company_size,
                app.annual_revenue,
                app.industry,
                app.company_type,
                app.stock_ticker,
                app.company_summary,
                app.source_file,
                app.drive_file_id,
                app.job_description_text,
                app.fit_score,
                fit_analysis,
                app.status_updated_at,
                app.created_at,
                app.updated_at,
            ],
        )?;

        Ok(())
    }

    pub fn get_application(&self, id: &str) -> Result<Option<Application>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "{APPLICATION_COLUMNS} FROM applications WHERE id = ? LIMIT 1"
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Application::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_applications(&self, owner_id: &str) -> Result<Vec<Application>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "{APPLICATION_COLUMNS} FROM applications WHERE owner_id = ? ORDER BY created_at ASC"
        ))?;
        let apps = stmt
            .query_map([owner_id], Application::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(apps)
    }

    pub fn find_application_by_drive_file(
        &self,
        owner_id: &str,
        drive_file_id: &str,
    ) -> Result<Option<Application>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "{APPLICATION_COLUMNS} FROM applications WHERE owner_id = ? AND drive_file_id = ? LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![owner_id, drive_file_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Application::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Apply an accepted status transition: new status plus both timestamps.
    pub fn update_application_status(
        &self,
        application_id: &str,
        new_status: ApplicationStatus,
        changed_at: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            UPDATE applications
            SET status = ?, status_updated_at = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![new_status.to_string(), changed_at, changed_at, application_id],
        )?;
        Ok(())
    }

    pub fn set_fit_analysis(
        &self,
        application_id: &str,
        fit_score: f64,
        fit_analysis: &serde_json::Value,
        updated_at: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            UPDATE applications
            SET fit_score = ?, fit_analysis = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                fit_score,
                serde_json::to_string(fit_analysis)?,
                updated_at,
                application_id
            ],
        )?;
        Ok(())
    }

    // --- Status history ---

    pub fn insert_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO status_history (
                id, owner_id, application_id, previous_status, new_status,
                source, mail_message_id, notes, changed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.id,
                entry.owner_id,
                entry.application_id,
                entry.previous_status.to_string(),
                entry.new_status.to_string(),
                entry.source.to_string(),
                entry.mail_message_id,
                entry.notes,
                entry.changed_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_status_history(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<StatusHistoryEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, owner_id, application_id, previous_status, new_status,
                   source, mail_message_id, notes, changed_at
            FROM status_history
            WHERE owner_id = ?
            ORDER BY changed_at DESC
            LIMIT ?
            "#,
        )?;
        let entries = stmt
            .query_map(params![owner_id, limit as i64], StatusHistoryEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // --- Unmatched notifications ---

    /// Stage an unmatched notification. Keyed by (owner, message id) so a
    /// re-run over the same inbox does not duplicate rows. Returns whether a
    /// new row was written.
    pub fn insert_unmatched(&self, n: &UnmatchedNotification) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO unmatched_notifications (
                id, owner_id, mail_message_id, mail_thread_id, subject,
                sender_email, sender_name, snippet, label_name,
                suggested_status, received_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, mail_message_id) DO NOTHING
            "#,
            params![
                n.id,
                n.owner_id,
                n.mail_message_id,
                n.mail_thread_id,
                n.subject,
                n.sender_email,
                n.sender_name,
                n.snippet,
                n.label_name,
                n.suggested_status.to_string(),
                n.received_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn list_unmatched(&self, owner_id: &str) -> Result<Vec<UnmatchedNotification>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, owner_id, mail_message_id, mail_thread_id, subject,
                   sender_email, sender_name, snippet, label_name,
                   suggested_status, received_at, created_at
            FROM unmatched_notifications
            WHERE owner_id = ?
            ORDER BY received_at DESC
            "#,
        )?;
        let rows = stmt
            .query_map([owner_id], UnmatchedNotification::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // --- Sync credentials ---

    pub fn get_credentials(&self, owner_id: &str) -> Result<Option<CredentialState>, DbError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT owner_id, access_token, refresh_token, token_expiry,
                   sync_enabled, last_sync_at, updated_at
            FROM sync_credentials
            WHERE owner_id = ?
            LIMIT 1
            "#,
        )?;
        let mut rows = stmt.query([owner_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(CredentialState::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn save_credentials(&self, creds: &CredentialState) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO sync_credentials (
                owner_id, access_token, refresh_token, token_expiry,
                sync_enabled, last_sync_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            ON CONFLICT(owner_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expiry = excluded.token_expiry,
                sync_enabled = excluded.sync_enabled,
                last_sync_at = excluded.last_sync_at,
                updated_at = excluded.updated_at
            "#,
            params![
                creds.owner_id,
                creds.access_token,
                creds.refresh_token,
                creds.token_expiry,
                creds.sync_enabled,
                creds.last_sync_at,
            ],
        )?;
        Ok(())
    }

    pub fn mark_sync_completed(&self, owner_id: &str, completed_at: &str) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            UPDATE sync_credentials
            SET last_sync_at = ?, updated_at = ?
            WHERE owner_id = ?
            "#,
            params![completed_at, completed_at, owner_id],
        )?;
        Ok(())
    }

    // --- Networking contacts (read-side only; creation is a recognized stub) ---

    pub fn count_networking_contacts(&self, owner_id: &str) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM networking_contacts WHERE owner_id = ?",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_overdue_follow_ups(&self, owner_id: &str, now: &str) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM networking_contacts
            WHERE owner_id = ? AND next_follow_up_date IS NOT NULL AND next_follow_up_date < ?
            "#,
            params![owner_id, now],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Insights ---

    pub fn insert_insight(
        &self,
        id: &str,
        owner_id: &str,
        metrics: &serde_json::Value,
        narrative: &serde_json::Value,
        generated_at: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            r#"
            INSERT INTO insights (id, owner_id, metrics, narrative, generated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                id,
                owner_id,
                serde_json::to_string(metrics)?,
                serde_json::to_string(narrative)?,
                generated_at,
            ],
        )?;
        Ok(())
    }

    pub fn latest_insight(
        &self,
        owner_id: &str,
    ) -> Result<Option<(serde_json::Value, serde_json::Value, String)>, DbError> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                r#"
                SELECT metrics, narrative, generated_at FROM insights
                WHERE owner_id = ?
                ORDER BY generated_at DESC
                LIMIT 1
                "#,
                [owner_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((metrics, narrative, generated_at)) => Ok(Some((
                serde_json::from_str(&metrics)?,
                serde_json::from_str(&narrative)?,
                generated_at,
            ))),
        }
    }

    // --- Stats ---

    pub fn get_stats(&self) -> Result<DatabaseStats, DbError> {
        let total_owners: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM owners", [], |row| row.get(0))?;
        let total_applications: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        let total_history_entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM status_history", [], |row| row.get(0))?;
        let total_unmatched: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM unmatched_notifications",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) AS count FROM applications GROUP BY status ORDER BY count DESC",
        )?;
        let applications_by_status = stmt
            .query_map([], |row| {
                Ok(StatusCount {
                    status: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DatabaseStats {
            total_owners,
            total_applications,
            total_history_entries,
            total_unmatched,
            applications_by_status,
        })
    }
}

const APPLICATION_COLUMNS: &str = r#"
    SELECT id, owner_id, company_name, job_title, status, application_date,
           location, salary_min, salary_max, company_size, annual_revenue,
           industry, company_type, stock_ticker, company_summary, source_file,
           drive_file_id, job_description_text, fit_score, fit_analysis,
           status_updated_at, created_at, updated_at
"#;
