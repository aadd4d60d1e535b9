use regex::Regex;
use tracing::trace;

/// Sender/subject metadata for one inbox message.
#[derive(Debug, Clone, Copy)]
pub struct SenderContext<'a> {
    pub subject: &'a str,
    pub sender_name: &'a str,
    pub sender_email: &'a str,
}

/// Stopwords that disqualify a subject-pattern capture.
const SUBJECT_STOPWORDS: [&str; 4] = ["the", "a", "an", "your"];

/// Local parts that are machinery rather than a company identity.
const GENERIC_LOCAL_PARTS: [&str; 10] = [
    "noreply",
    "no-reply",
    "info",
    "contact",
    "support",
    "hello",
    "team",
    "recruiter",
    "jobs",
    "careers",
];

/// Applicant-tracking systems that send on behalf of many companies.
const ATS_DOMAINS: [&str; 6] = [
    "myworkday",
    "workday",
    "greenhouse",
    "lever",
    "jobvite",
    "smartrecruiters",
];

const FREE_MAIL_DOMAINS: [&str; 3] = ["gmail.com", "yahoo.com", "outlook.com"];

/// Text following "at"/"for" in a subject, starting with a capital letter.
const SUBJECT_PATTERN: &str = r"\b(?i:at|for)\s+([A-Z][A-Za-z0-9 &]*)";

type Heuristic = fn(&SenderContext<'_>) -> Option<String>;

/// Ordered heuristic chain, most trustworthy first: explicit subject-line
/// mentions beat address parts, and generic ATS/free-mail domains are
/// rejected outright. First non-empty, non-generic result wins.
const HEURISTICS: [(&str, Heuristic); 4] = [
    ("subject-pattern", subject_pattern),
    ("address-local-part", address_local_part),
    ("address-domain", address_domain),
    ("display-name-affiliation", display_name_affiliation),
];

/// Best-guess company name for a message, or None when every heuristic
/// rejects its input.
pub fn extract_company(ctx: &SenderContext<'_>) -> Option<String> {
    for (name, heuristic) in HEURISTICS {
        if let Some(company) = heuristic(ctx) {
            trace!(heuristic = name, company = %company, "company extracted");
            return Some(company);
        }
    }
    None
}

fn subject_pattern(ctx: &SenderContext<'_>) -> Option<String> {
    let re = Regex::new(SUBJECT_PATTERN).ok()?;
    let captured = re.captures(ctx.subject)?.get(1)?.as_str().trim().to_string();
    if captured.is_empty() {
        return None;
    }
    let lowered = captured.to_ascii_lowercase();
    if SUBJECT_STOPWORDS.contains(&lowered.as_str()) {
        return None;
    }
    Some(captured)
}

fn address_local_part(ctx: &SenderContext<'_>) -> Option<String> {
    let (local, _) = ctx.sender_email.split_once('@')?;
    if local.len() <= 2 {
        return None;
    }
    let lowered = local.to_ascii_lowercase();
    if GENERIC_LOCAL_PARTS.iter().any(|term| lowered.contains(term)) {
        return None;
    }
    Some(title_case(local))
}

fn address_domain(ctx: &SenderContext<'_>) -> Option<String> {
    let domain = ctx.sender_email.split('@').nth(1)?;
    let lowered = domain.to_ascii_lowercase();
    if FREE_MAIL_DOMAINS.iter().any(|free| lowered.contains(free)) {
        return None;
    }
    let first_label = lowered.split('.').next()?;
    if first_label.is_empty() || ATS_DOMAINS.contains(&first_label) {
        return None;
    }
    Some(title_case(first_label))
}

fn display_name_affiliation(ctx: &SenderContext<'_>) -> Option<String> {
    let (_, affiliation) = ctx.sender_name.split_once('@')?;
    let trimmed = affiliation.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn title_case(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
