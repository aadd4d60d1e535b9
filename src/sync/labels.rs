use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::ApplicationStatus;
use crate::mail::MailLabel;

/// The fixed logical label names the tracker looks for, independent of
/// folder nesting on the provider side.
pub const STATUS_LABELS: [(&str, ApplicationStatus); 8] = [
    ("JH25 - Applied", ApplicationStatus::Applied),
    ("JH25 - Follow up", ApplicationStatus::FollowUp),
    ("JH25 - Recruiter Screen", ApplicationStatus::RecruiterScreen),
    ("JH25 - Hiring Manager", ApplicationStatus::HiringManager),
    ("JH25 - interviews", ApplicationStatus::Interviews),
    ("JH25 - Offer", ApplicationStatus::Offer),
    ("JH25-Rejected", ApplicationStatus::Rejected),
    ("JH25 - Withdraw", ApplicationStatus::Withdrawn),
];

pub const NETWORKING_LABEL: &str = "JH25 - Networking";

const MAX_DIAGNOSTIC_LABELS: usize = 50;

/// A provider label matches a logical name when it equals the name or ends
/// with it, so `Folder/JH25 - Offer` resolves the same as `JH25 - Offer`.
pub fn matches_logical(provider_name: &str, logical_name: &str) -> bool {
    provider_name == logical_name || provider_name.ends_with(logical_name)
}

#[derive(Debug, Clone)]
struct ResolvedLabel {
    logical_name: &'static str,
    provider_id: String,
    provider_name: String,
}

/// Mapping between the provider's label catalog and the tracker's logical
/// labels, resolved once per sync run.
#[derive(Debug, Clone)]
pub struct LabelCatalog {
    resolved: Vec<ResolvedLabel>,
    names_by_id: HashMap<String, String>,
    available_names: Vec<String>,
}

/// Diagnostic payload surfaced when none of the expected labels resolve.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelDiagnostics {
    pub expected_labels: Vec<String>,
    pub available_labels: Vec<String>,
}

impl LabelCatalog {
    /// Resolve the expected logical labels against the provider's catalog.
    /// When several provider labels satisfy the suffix rule for one logical
    /// name, the first in listing order wins.
    pub fn resolve(provider_labels: &[MailLabel]) -> Self {
        let mut resolved = Vec::new();

        for (logical_name, _) in STATUS_LABELS {
            if let Some(label) = provider_labels
                .iter()
                .find(|label| matches_logical(&label.name, logical_name))
            {
                resolved.push(ResolvedLabel {
                    logical_name,
                    provider_id: label.id.clone(),
                    provider_name: label.name.clone(),
                });
            }
        }

        if let Some(label) = provider_labels
            .iter()
            .find(|label| matches_logical(&label.name, NETWORKING_LABEL))
        {
            resolved.push(ResolvedLabel {
                logical_name: NETWORKING_LABEL,
                provider_id: label.id.clone(),
                provider_name: label.name.clone(),
            });
        }

        let names_by_id = provider_labels
            .iter()
            .map(|label| (label.id.clone(), label.name.clone()))
            .collect();
        let available_names = provider_labels
            .iter()
            .map(|label| label.name.clone())
            .collect();

        Self {
            resolved,
            names_by_id,
            available_names,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn expected_labels() -> Vec<String> {
        STATUS_LABELS
            .iter()
            .map(|(name, _)| name.to_string())
            .chain(std::iter::once(NETWORKING_LABEL.to_string()))
            .collect()
    }

    pub fn diagnostics(&self) -> LabelDiagnostics {
        LabelDiagnostics {
            expected_labels: Self::expected_labels(),
            available_labels: self
                .available_names
                .iter()
                .take(MAX_DIAGNOSTIC_LABELS)
                .cloned()
                .collect(),
        }
    }

    /// Provider-side names of the resolved labels, used to build the
    /// message listing query.
    pub fn resolved_provider_names(&self) -> Vec<&str> {
        self.resolved
            .iter()
            .map(|label| label.provider_name.as_str())
            .collect()
    }

    /// Disjunction query over every resolved label.
    pub fn message_query(&self) -> String {
        format!("label:({})", self.resolved_provider_names().join(" OR "))
    }

    /// Resolve a message's raw label ids to provider label names.
    pub fn names_for_ids<'a>(&'a self, label_ids: &[String]) -> Vec<&'a str> {
        label_ids
            .iter()
            .filter_map(|id| self.names_by_id.get(id).map(String::as_str))
            .collect()
    }

    /// Whether a provider label name carries the networking label.
    pub fn is_networking(&self, provider_name: &str) -> bool {
        matches_logical(provider_name, NETWORKING_LABEL)
    }

    /// The status implied by a provider label name, if it carries one of the
    /// eight status labels (directly or as a suffix).
    pub fn status_for_name(&self, provider_name: &str) -> Option<ApplicationStatus> {
        STATUS_LABELS
            .iter()
            .find(|(logical_name, _)| matches_logical(provider_name, logical_name))
            .map(|(_, status)| *status)
    }

    /// Logical label name resolved for a provider id, if any.
    pub fn logical_name_for_id(&self, provider_id: &str) -> Option<&'static str> {
        self.resolved
            .iter()
            .find(|label| label.provider_id == provider_id)
            .map(|label| label.logical_name)
    }
}

#[cfg(test)]
mod tests {
    use super::{matches_logical, LabelCatalog, NETWORKING_LABEL};
    use crate::db::models::ApplicationStatus;
    use crate::mail::MailLabel;

    fn label(id: &str, name: &str) -> MailLabel {
        MailLabel {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn exact_and_suffix_names_match() {
        assert!(matches_logical("JH25 - Offer", "JH25 - Offer"));
        assert!(matches_logical("Inbox/JH25 - Offer", "JH25 - Offer"));
        assert!(matches_logical("Job Hunt/2025/JH25 - Offer", "JH25 - Offer"));
        assert!(!matches_logical("JH25 - Offer Letter", "JH25 - Offer"));
        assert!(!matches_logical("Receipts", "JH25 - Offer"));
    }

    #[test]
    fn nested_label_resolves_to_same_status_as_flat() {
        let flat = LabelCatalog::resolve(&[label("L1", "JH25 - Offer")]);
        let nested = LabelCatalog::resolve(&[label("L1", "Inbox/JH25 - Offer")]);

        assert_eq!(
            flat.status_for_name("JH25 - Offer"),
            Some(ApplicationStatus::Offer)
        );
        assert_eq!(
            nested.status_for_name("Inbox/JH25 - Offer"),
            Some(ApplicationStatus::Offer)
        );
        assert_eq!(nested.resolved_count(), 1);
    }

    #[test]
    fn first_provider_label_wins_among_suffix_candidates() {
        let catalog = LabelCatalog::resolve(&[
            label("L1", "Archive/JH25 - Offer"),
            label("L2", "JH25 - Offer"),
        ]);

        assert_eq!(catalog.logical_name_for_id("L1"), Some("JH25 - Offer"));
        assert_eq!(catalog.logical_name_for_id("L2"), None);
    }

    #[test]
    fn unrelated_labels_resolve_to_nothing() {
        let catalog = LabelCatalog::resolve(&[
            label("L1", "Receipts"),
            label("L2", "Travel"),
        ]);
        assert!(catalog.is_empty());

        let diagnostics = catalog.diagnostics();
        assert_eq!(diagnostics.expected_labels.len(), 9);
        assert_eq!(
            diagnostics.available_labels,
            vec!["Receipts".to_string(), "Travel".to_string()]
        );
    }

    #[test]
    fn diagnostics_cap_available_labels_at_fifty() {
        let labels: Vec<MailLabel> = (0..80)
            .map(|i| label(&format!("L{i}"), &format!("Label {i}")))
            .collect();
        let catalog = LabelCatalog::resolve(&labels);
        assert_eq!(catalog.diagnostics().available_labels.len(), 50);
    }

    #[test]
    fn message_query_joins_resolved_names() {
        let catalog = LabelCatalog::resolve(&[
            label("L1", "JH25 - Applied"),
            label("L2", "JH25 - Offer"),
            label("L3", NETWORKING_LABEL),
        ]);
        assert_eq!(
            catalog.message_query(),
            "label:(JH25 - Applied OR JH25 - Offer OR JH25 - Networking)"
        );
    }

    #[test]
    fn names_for_ids_skips_unknown_ids() {
        let catalog = LabelCatalog::resolve(&[label("L1", "JH25 - Applied")]);
        let names =
            catalog.names_for_ids(&["L1".to_string(), "UNKNOWN".to_string()]);
        assert_eq!(names, vec!["JH25 - Applied"]);
    }

    #[test]
    fn networking_label_matches_with_nesting() {
        let catalog = LabelCatalog::resolve(&[label("L1", "Folder/JH25 - Networking")]);
        assert!(catalog.is_networking("Folder/JH25 - Networking"));
        assert!(!catalog.is_networking("JH25 - Applied"));
    }
}
