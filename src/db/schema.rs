use anyhow::Result;
use rusqlite::Connection;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS owners (
            owner_id TEXT PRIMARY KEY,
            email_address TEXT NOT NULL,
            display_name TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS applications (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES owners(owner_id),
            company_name TEXT NOT NULL,
            job_title TEXT,
            status TEXT NOT NULL CHECK(status IN (
                'applied', 'follow_up', 'recruiter_screen', 'hiring_manager',
                'interviews', 'offer', 'rejected', 'withdrawn'
            )),
            application_date TEXT,
            location TEXT,
            salary_min INTEGER,
            salary_max INTEGER,
            company_size TEXT,
            annual_revenue TEXT,
            industry TEXT,
            company_type TEXT,
            stock_ticker TEXT,
            company_summary TEXT,
            source_file TEXT,
            drive_file_id TEXT,
            job_description_text TEXT,
            fit_score REAL,
            fit_analysis TEXT,
            status_updated_at TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS status_history (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES owners(owner_id),
            application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
            previous_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            source TEXT NOT NULL CHECK(source IN ('manual', 'email', 'import')),
            mail_message_id TEXT,
            notes TEXT,
            changed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS unmatched_notifications (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES owners(owner_id),
            mail_message_id TEXT NOT NULL,
            mail_thread_id TEXT,
            subject TEXT,
            sender_email TEXT,
            sender_name TEXT,
            snippet TEXT,
            label_name TEXT NOT NULL,
            suggested_status TEXT NOT NULL,
            received_at TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            UNIQUE(owner_id, mail_message_id)
        );

        CREATE TABLE IF NOT EXISTS sync_credentials (
            owner_id TEXT PRIMARY KEY REFERENCES owners(owner_id),
            access_token TEXT NOT NULL,
            refresh_token TEXT NOT NULL,
            token_expiry TEXT NOT NULL,
            sync_enabled BOOLEAN NOT NULL DEFAULT true,
            last_sync_at TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS networking_contacts (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES owners(owner_id),
            name TEXT,
            company TEXT,
            email_address TEXT,
            next_follow_up_date TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS insights (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES owners(owner_id),
            metrics TEXT NOT NULL,
            narrative TEXT NOT NULL,
            generated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_applications_owner_id ON applications(owner_id);
        CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
        CREATE INDEX IF NOT EXISTS idx_status_history_application_id ON status_history(application_id);
        CREATE INDEX IF NOT EXISTS idx_status_history_changed_at ON status_history(changed_at);
        CREATE INDEX IF NOT EXISTS idx_unmatched_owner_id ON unmatched_notifications(owner_id);
        "#,
    )?;

    Ok(())
}
