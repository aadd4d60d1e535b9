use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::models::CredentialState;
use crate::db::{Database, DbError};
use crate::mail::MailGateway;

pub mod classify;
pub mod credentials;
pub mod extract;
pub mod labels;
pub mod matcher;
pub mod reconcile;

use classify::MessageBuckets;
use labels::{LabelCatalog, LabelDiagnostics};

/// Fatal sync failures: credential/configuration level problems that abort
/// the run. Per-message trouble never lands here; it is skipped and the run
/// continues.
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("mail sync is not configured for owner {0}; connect an account first")]
    NotConfigured(String),

    #[error("mail sync is disabled for owner {0}")]
    Disabled(String),

    #[error("credential refresh failed; re-authentication required")]
    CredentialRefresh(#[source] anyhow::Error),

    #[error("listing mailbox labels failed")]
    LabelListing(#[source] anyhow::Error),

    #[error("listing mailbox messages failed")]
    MessageListing(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncFailure {
    /// Configuration problems are user-actionable and reported as structured
    /// payloads; the rest are run errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::Disabled(_))
    }
}

/// Aggregate result of one sync run, in the shape callers receive.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub processed: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub networking_contacts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<LabelDiagnostics>,
}

impl SyncOutcome {
    fn empty_with_diagnostics(diagnostics: LabelDiagnostics) -> Self {
        Self {
            success: false,
            processed: 0,
            matched: 0,
            unmatched: 0,
            networking_contacts: 0,
            debug: Some(diagnostics),
        }
    }
}

/// One end-to-end reconciliation run for a single owner.
///
/// Phases: credential check (refresh when expired, persisting the returned
/// state) → label resolution → paged message listing → per-message
/// classification and grouping → conflict resolution → completion stamp.
/// The credential record is read once and written at most twice.
pub async fn run_sync(
    db: &Database,
    gateway: &dyn MailGateway,
    owner_id: &str,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, SyncFailure> {
    let creds = credentials::load_credentials(db, owner_id)?
        .ok_or_else(|| SyncFailure::NotConfigured(owner_id.to_string()))?;
    if !creds.sync_enabled {
        return Err(SyncFailure::Disabled(owner_id.to_string()));
    }

    let creds = ensure_fresh_credentials(db, gateway, creds, now).await?;

    let provider_labels = gateway
        .list_labels(&creds.access_token)
        .await
        .map_err(SyncFailure::LabelListing)?;
    let catalog = LabelCatalog::resolve(&provider_labels);

    if catalog.is_empty() {
        // Misconfiguration, not a provider failure: report what was
        // expected against what the mailbox actually has.
        warn!(owner_id, "none of the expected labels resolved");
        stamp_completion(db, owner_id, now)?;
        return Ok(SyncOutcome::empty_with_diagnostics(catalog.diagnostics()));
    }
    info!(
        owner_id,
        resolved = catalog.resolved_count(),
        "label catalog resolved"
    );

    let message_ids = collect_message_ids(gateway, &creds, &catalog).await?;
    info!(owner_id, messages = message_ids.len(), "message listing complete");

    let applications = db.list_applications(owner_id)?;
    let mut buckets = MessageBuckets::default();

    for message_id in &message_ids {
        let message = match gateway.get_message(&creds.access_token, message_id).await {
            Ok(message) => message,
            Err(error) => {
                // Transient per-message trouble; the label persists and the
                // message is reconsidered next run.
                warn!(owner_id, %message_id, %error, "message fetch failed; skipped");
                continue;
            }
        };
        buckets.route(&catalog, owner_id, &applications, &message);
    }

    let matched =
        reconcile::apply_pending_updates(db, owner_id, &applications, buckets.pending_by_application, now)?;

    let unmatched = buckets.staged_unmatched.len();
    for notification in &buckets.staged_unmatched {
        db.insert_unmatched(notification)?;
    }

    stamp_completion(db, owner_id, now)?;

    Ok(SyncOutcome {
        success: true,
        processed: buckets.processed,
        matched,
        unmatched,
        networking_contacts: buckets.networking_count,
        debug: None,
    })
}

async fn ensure_fresh_credentials(
    db: &Database,
    gateway: &dyn MailGateway,
    creds: CredentialState,
    now: DateTime<Utc>,
) -> Result<CredentialState, SyncFailure> {
    if !creds.is_expired(now) {
        return Ok(creds);
    }

    info!(owner_id = %creds.owner_id, "access token expired; refreshing");
    let refreshed = gateway
        .refresh_access_token(&creds.refresh_token)
        .await
        .map_err(SyncFailure::CredentialRefresh)?;

    let renewed = creds.with_refreshed(&refreshed, now);
    credentials::save_credentials(db, &renewed)?;
    Ok(renewed)
}

/// Page-cursor loop over the message-id listing. The first page failing is
/// fatal; a later page failing degrades to the ids already collected.
async fn collect_message_ids(
    gateway: &dyn MailGateway,
    creds: &CredentialState,
    catalog: &LabelCatalog,
) -> Result<Vec<String>, SyncFailure> {
    let query = catalog.message_query();
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    let mut page_number = 0u32;

    loop {
        let page = match gateway
            .list_message_ids(&creds.access_token, &query, page_token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(error) if page_number == 0 => return Err(SyncFailure::MessageListing(error)),
            Err(error) => {
                warn!(page_number, %error, "message listing page failed; continuing with partial listing");
                break;
            }
        };

        page_number += 1;
        ids.extend(page.ids);
        info!(page_number, total = ids.len(), "message listing page fetched");

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(ids)
}

fn stamp_completion(db: &Database, owner_id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
    db.mark_sync_completed(owner_id, &now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::SyncOutcome;
    use crate::sync::labels::LabelDiagnostics;

    #[test]
    fn outcome_serializes_in_wire_shape() {
        let outcome = SyncOutcome {
            success: true,
            processed: 4,
            matched: 2,
            unmatched: 1,
            networking_contacts: 1,
            debug: None,
        };
        let json = serde_json::to_value(&outcome).expect("serialize outcome");
        assert_eq!(json["networkingContacts"], 1);
        assert!(json.get("debug").is_none());
    }

    #[test]
    fn diagnostic_outcome_serializes_debug_block() {
        let outcome = SyncOutcome::empty_with_diagnostics(LabelDiagnostics {
            expected_labels: vec!["JH25 - Applied".to_string()],
            available_labels: vec!["Receipts".to_string()],
        });
        let json = serde_json::to_value(&outcome).expect("serialize outcome");
        assert_eq!(json["success"], false);
        assert_eq!(json["debug"]["expectedLabels"][0], "JH25 - Applied");
        assert_eq!(json["debug"]["availableLabels"][0], "Receipts");
    }
}
