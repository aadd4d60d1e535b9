use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::{Application, ChangeSource, StatusHistoryEntry};
use crate::db::{Database, DbError};
use crate::sync::classify::PendingUpdate;

/// Apply the pending update groups collected over one run. Each group is
/// collapsed to its most recent message (last-message-wins; messages carry
/// no causal ordering beyond receipt time). A transition is applied and
/// audited only when the winning status differs from the stored one, so
/// re-running a sync over the same inbox appends no duplicate history.
///
/// Returns the number of applications whose status actually changed.
pub fn apply_pending_updates(
    db: &Database,
    owner_id: &str,
    applications: &[Application],
    pending_by_application: HashMap<String, Vec<PendingUpdate>>,
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let changed_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut changed = 0;

    for (application_id, mut updates) in pending_by_application {
        let Some(application) = applications.iter().find(|app| app.id == application_id) else {
            warn!(%application_id, "pending updates for unknown application; dropped");
            continue;
        };

        updates.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        let winner = match updates.first() {
            Some(update) => update,
            None => continue,
        };

        if winner.status == application.status {
            continue;
        }

        db.update_application_status(&application_id, winner.status, &changed_at)?;
        db.insert_status_history(&StatusHistoryEntry {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            application_id: application_id.clone(),
            previous_status: application.status,
            new_status: winner.status,
            source: ChangeSource::Email,
            mail_message_id: Some(winner.message_id.clone()),
            notes: Some(transition_note(&winner.status_label, updates.len())),
            changed_at: changed_at.clone(),
        })?;

        info!(
            %application_id,
            company = %application.company_name,
            from = %application.status,
            to = %winner.status,
            "status updated from mail label"
        );
        changed += 1;
    }

    Ok(changed)
}

fn transition_note(status_label: &str, group_size: usize) -> String {
    if group_size > 1 {
        format!(
            "Auto-updated from mail label: {status_label} ({} older messages collapsed)",
            group_size - 1
        )
    } else {
        format!("Auto-updated from mail label: {status_label}")
    }
}
