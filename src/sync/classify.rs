use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::db::models::{Application, ApplicationStatus, UnmatchedNotification};
use crate::mail::InboxMessage;
use crate::sync::extract::{extract_company, SenderContext};
use crate::sync::labels::LabelCatalog;
use crate::sync::matcher::match_application;

/// How one inbox message was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Carries the networking label; counted, not otherwise processed.
    Networking,
    /// Carries one of the status labels.
    StatusUpdate {
        status: ApplicationStatus,
        label_name: String,
    },
    /// Neither networking nor status-bearing; skipped entirely.
    Unclassifiable,
}

/// One status signal staged against a matched application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub message_id: String,
    pub status: ApplicationStatus,
    pub status_label: String,
    pub received_at: Option<DateTime<Utc>>,
}

/// Accumulated routing state for one sync run.
#[derive(Debug, Default)]
pub struct MessageBuckets {
    pub pending_by_application: HashMap<String, Vec<PendingUpdate>>,
    pub staged_unmatched: Vec<UnmatchedNotification>,
    pub networking_count: usize,
    pub processed: usize,
}

/// Classify a message from its resolved label names. Networking takes
/// precedence; otherwise the first label carrying a status wins.
pub fn classify_message(catalog: &LabelCatalog, message: &InboxMessage) -> Classification {
    let names = catalog.names_for_ids(&message.label_ids);

    if names.iter().any(|name| catalog.is_networking(name)) {
        return Classification::Networking;
    }

    for name in names {
        if let Some(status) = catalog.status_for_name(name) {
            return Classification::StatusUpdate {
                status,
                label_name: name.to_string(),
            };
        }
    }

    Classification::Unclassifiable
}

impl MessageBuckets {
    /// Route one message: count networking, group status updates by the
    /// application they resolve to, and stage anything unresolvable as an
    /// unmatched notification. Unclassifiable messages are not counted.
    pub fn route(
        &mut self,
        catalog: &LabelCatalog,
        owner_id: &str,
        applications: &[Application],
        message: &InboxMessage,
    ) -> Classification {
        let classification = classify_message(catalog, message);

        match &classification {
            Classification::Networking => {
                // Networking-contact extraction is a recognized stub: the
                // counter moves, no contact row is created.
                self.networking_count += 1;
                self.processed += 1;
            }
            Classification::StatusUpdate { status, label_name } => {
                let context = SenderContext {
                    subject: &message.subject,
                    sender_name: &message.sender_name,
                    sender_email: &message.sender_email,
                };
                let matched = extract_company(&context)
                    .and_then(|company| match_application(&company, applications));

                match matched {
                    Some(application) => {
                        self.pending_by_application
                            .entry(application.id.clone())
                            .or_default()
                            .push(PendingUpdate {
                                message_id: message.id.clone(),
                                status: *status,
                                status_label: label_name.clone(),
                                received_at: message.received_at,
                            });
                    }
                    None => {
                        self.staged_unmatched
                            .push(unmatched_notification(owner_id, message, *status, label_name));
                    }
                }
                self.processed += 1;
            }
            Classification::Unclassifiable => {}
        }

        classification
    }
}

fn unmatched_notification(
    owner_id: &str,
    message: &InboxMessage,
    suggested_status: ApplicationStatus,
    label_name: &str,
) -> UnmatchedNotification {
    UnmatchedNotification {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        mail_message_id: message.id.clone(),
        mail_thread_id: message.thread_id.clone(),
        subject: Some(message.subject.clone()).filter(|s| !s.is_empty()),
        sender_email: Some(message.sender_email.clone()).filter(|s| !s.is_empty()),
        sender_name: Some(message.sender_name.clone()).filter(|s| !s.is_empty()),
        snippet: message.snippet.clone(),
        label_name: label_name.to_string(),
        suggested_status,
        received_at: message
            .received_at
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        created_at: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{classify_message, Classification, MessageBuckets};
    use crate::db::models::{Application, ApplicationStatus};
    use crate::mail::{InboxMessage, MailLabel};
    use crate::sync::labels::LabelCatalog;

    fn catalog() -> LabelCatalog {
        LabelCatalog::resolve(&[
            MailLabel {
                id: "L_APPLIED".to_string(),
                name: "JH25 - Applied".to_string(),
            },
            MailLabel {
                id: "L_OFFER".to_string(),
                name: "Inbox/JH25 - Offer".to_string(),
            },
            MailLabel {
                id: "L_NET".to_string(),
                name: "JH25 - Networking".to_string(),
            },
            MailLabel {
                id: "L_MISC".to_string(),
                name: "Receipts".to_string(),
            },
        ])
    }

    fn message(id: &str, label_ids: &[&str], subject: &str, sender_email: &str) -> InboxMessage {
        InboxMessage {
            id: id.to_string(),
            thread_id: Some(format!("thread-{id}")),
            label_ids: label_ids.iter().map(|s| s.to_string()).collect(),
            subject: subject.to_string(),
            sender_name: String::new(),
            sender_email: sender_email.to_string(),
            snippet: Some("snippet".to_string()),
            received_at: Utc.with_ymd_and_hms(2026, 1, 12, 15, 0, 0).single(),
        }
    }

    fn application(id: &str, company: &str) -> Application {
        Application {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            company_name: company.to_string(),
            job_title: None,
            status: ApplicationStatus::Applied,
            application_date: None,
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
            fit_score: None,
            fit_analysis: None,
            status_updated_at: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn networking_label_takes_precedence() {
        let classification = classify_message(
            &catalog(),
            &message("m1", &["L_NET", "L_APPLIED"], "hello", "a@b.com"),
        );
        assert_eq!(classification, Classification::Networking);
    }

    #[test]
    fn nested_status_label_classifies_by_suffix() {
        let classification = classify_message(
            &catalog(),
            &message("m1", &["L_OFFER"], "hello", "a@b.com"),
        );
        assert_eq!(
            classification,
            Classification::StatusUpdate {
                status: ApplicationStatus::Offer,
                label_name: "Inbox/JH25 - Offer".to_string(),
            }
        );
    }

    #[test]
    fn unrelated_labels_are_unclassifiable() {
        let classification =
            classify_message(&catalog(), &message("m1", &["L_MISC"], "hello", "a@b.com"));
        assert_eq!(classification, Classification::Unclassifiable);
    }

    #[test]
    fn networking_message_only_moves_the_counter() {
        let mut buckets = MessageBuckets::default();
        let apps = vec![application("app-1", "Acme")];
        buckets.route(
            &catalog(),
            "owner-1",
            &apps,
            &message("m1", &["L_NET"], "Coffee chat at Acme", "friend@acme.com"),
        );

        assert_eq!(buckets.networking_count, 1);
        assert_eq!(buckets.processed, 1);
        assert!(buckets.pending_by_application.is_empty());
        assert!(buckets.staged_unmatched.is_empty());
    }

    #[test]
    fn status_message_groups_under_matched_application() {
        let mut buckets = MessageBuckets::default();
        let apps = vec![application("app-1", "Acme")];
        buckets.route(
            &catalog(),
            "owner-1",
            &apps,
            &message(
                "m1",
                &["L_OFFER"],
                "Update on your application at Acme Corp",
                "noreply@greenhouse.io",
            ),
        );

        let pending = buckets
            .pending_by_application
            .get("app-1")
            .expect("grouped under matched application");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, ApplicationStatus::Offer);
        assert_eq!(pending[0].status_label, "Inbox/JH25 - Offer");
        assert_eq!(buckets.processed, 1);
        assert!(buckets.staged_unmatched.is_empty());
    }

    #[test]
    fn unresolvable_status_message_is_staged_unmatched() {
        let mut buckets = MessageBuckets::default();
        let apps = vec![application("app-1", "Acme")];
        buckets.route(
            &catalog(),
            "owner-1",
            &apps,
            &message(
                "m1",
                &["L_APPLIED"],
                "Thanks for applying at Initech",
                "careers@initech.com",
            ),
        );

        assert!(buckets.pending_by_application.is_empty());
        assert_eq!(buckets.staged_unmatched.len(), 1);
        let staged = &buckets.staged_unmatched[0];
        assert_eq!(staged.mail_message_id, "m1");
        assert_eq!(staged.label_name, "JH25 - Applied");
        assert_eq!(staged.suggested_status, ApplicationStatus::Applied);
        assert_eq!(staged.received_at.as_deref(), Some("2026-01-12T15:00:00Z"));
    }

    #[test]
    fn unclassifiable_message_is_not_counted() {
        let mut buckets = MessageBuckets::default();
        buckets.route(
            &catalog(),
            "owner-1",
            &[],
            &message("m1", &["L_MISC"], "receipt", "shop@store.com"),
        );

        assert_eq!(buckets.processed, 0);
        assert_eq!(buckets.networking_count, 0);
        assert!(buckets.staged_unmatched.is_empty());
    }

    #[test]
    fn extraction_failure_stages_unmatched() {
        let mut buckets = MessageBuckets::default();
        let apps = vec![application("app-1", "Acme")];
        buckets.route(
            &catalog(),
            "owner-1",
            &apps,
            &message(
                "m1",
                &["L_APPLIED"],
                "Thank you for applying",
                "noreply@greenhouse.io",
            ),
        );

        assert_eq!(buckets.staged_unmatched.len(), 1);
        assert!(buckets.pending_by_application.is_empty());
    }
}
