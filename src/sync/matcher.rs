use crate::db::models::Application;

/// Strip everything but letters and digits and lowercase the rest, so
/// "Sully.ai" and "sullyai" compare equal.
pub fn normalize_company(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Find the stored application a candidate company name refers to.
///
/// Step 1 is case-insensitive equality. Step 2 normalizes both sides and
/// accepts substring containment in either direction. There is no similarity
/// ranking: among several containment hits the first in iteration order
/// wins, which can misattribute when one stored name contains another.
pub fn match_application<'a>(
    candidate: &str,
    applications: &'a [Application],
) -> Option<&'a Application> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Some(app) = applications
        .iter()
        .find(|app| app.company_name.eq_ignore_ascii_case(candidate))
    {
        return Some(app);
    }

    let normalized_candidate = normalize_company(candidate);
    if normalized_candidate.is_empty() {
        return None;
    }

    applications.iter().find(|app| {
        let normalized_stored = normalize_company(&app.company_name);
        if normalized_stored.is_empty() {
            return false;
        }
        normalized_candidate.contains(&normalized_stored)
            || normalized_stored.contains(&normalized_candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::{match_application, normalize_company};
    use crate::db::models::{Application, ApplicationStatus};

    fn app(id: &str, company: &str) -> Application {
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
    fn exact_match_is_case_insensitive() {
        let apps = vec![app("a", "Acme Corp")];
        let hit = match_application("acme corp", &apps).expect("match");
        assert_eq!(hit.id, "a");
    }

    #[test]
    fn stored_name_contained_in_candidate() {
        let apps = vec![app("a", "Acme")];
        let hit = match_application("Acme Corp", &apps).expect("match");
        assert_eq!(hit.id, "a");
    }

    #[test]
    fn candidate_contained_in_stored_name() {
        let apps = vec![app("a", "Acme Corp")];
        let hit = match_application("Acme", &apps).expect("match");
        assert_eq!(hit.id, "a");
    }

    #[test]
    fn normalization_ignores_punctuation() {
        let apps = vec![app("a", "Sully.ai")];
        let hit = match_application("sullyai", &apps).expect("match");
        assert_eq!(hit.id, "a");
    }

    #[test]
    fn exact_hit_beats_earlier_containment_hit() {
        let apps = vec![app("broad", "Acme"), app("narrow", "Acme Corp")];
        let hit = match_application("Acme Corp", &apps).expect("match");
        assert_eq!(hit.id, "narrow");
    }

    #[test]
    fn first_containment_hit_wins() {
        let apps = vec![app("first", "Acme"), app("second", "Acme Labs")];
        let hit = match_application("Acme Labs International", &apps).expect("match");
        assert_eq!(hit.id, "first");
    }

    #[test]
    fn unrelated_candidate_matches_nothing() {
        let apps = vec![app("a", "Acme"), app("b", "Globex")];
        assert!(match_application("Initech", &apps).is_none());
    }

    #[test]
    fn punctuation_only_names_never_match() {
        let apps = vec![app("a", "@&!")];
        assert!(match_application("---", &apps).is_none());
        assert!(match_application("Acme", &apps).is_none());
    }

    #[test]
    fn normalize_company_examples() {
        assert_eq!(normalize_company("Acme, Inc."), "acmeinc");
        assert_eq!(normalize_company("Sully.ai"), "sullyai");
        assert_eq!(normalize_company("&—&"), "");
    }
}
