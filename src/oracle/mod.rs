use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_URL_ENV: &str = "JOBTRAIL_ORACLE_URL";
const MODEL_ENV: &str = "JOBTRAIL_ORACLE_MODEL";

const PARSE_MAX_TOKENS: u32 = 4_096;
const SCORE_MAX_TOKENS: u32 = 3_000;
const INSIGHT_MAX_TOKENS: u32 = 4_000;

/// Failures of the LLM boundary. `BadJson` keeps the raw model output so a
/// caller can surface it for diagnosis; none of these abort anything beyond
/// the requesting feature.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed")]
    Request(#[source] anyhow::Error),

    #[error("oracle response contained no text content")]
    EmptyResponse,

    #[error("oracle returned output that is not valid JSON")]
    BadJson {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Structured fields extracted from a job-description document. Everything
/// is optional: the model is told to use null when unsure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParsedJobDescription {
    pub company_name: Option<String>,
    pub company_summary: Option<String>,
    pub job_title: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub location: Option<String>,
    pub company_size: Option<String>,
    pub annual_revenue: Option<String>,
    pub industry: Option<String>,
    pub company_type: Option<String>,
    pub stock_ticker: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FitAnalysis {
    pub fit_score: f64,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub recommendation: Option<String>,
    pub talking_points: Vec<String>,
    pub interview_questions_to_prepare: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OracleClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OracleClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("{API_KEY_ENV} must be set for oracle calls"))?;
        let api_url = env_override(API_URL_ENV).unwrap_or_else(|| ANTHROPIC_API_URL.to_string());
        let model = env_override(MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        })
    }

    pub async fn parse_job_description(
        &self,
        document_text: &str,
    ) -> Result<ParsedJobDescription, OracleError> {
        let prompt = format!(
            "{EXTRACTION_PROMPT}\n\nJob Description Document:\n---\n{}\n---",
            sanitize_text(document_text)
        );
        let raw = self.complete(&prompt, PARSE_MAX_TOKENS).await?;
        parse_oracle_json(&raw)
    }

    /// Parse a PDF job description by attaching the document itself; used
    /// for Drive files that have no plain-text export.
    pub async fn parse_job_description_pdf(
        &self,
        pdf_bytes: &[u8],
    ) -> Result<ParsedJobDescription, OracleError> {
        let content = json!([
            {
                "type": "document",
                "source": {
                    "type": "base64",
                    "media_type": "application/pdf",
                    "data": BASE64_STANDARD.encode(pdf_bytes),
                }
            },
            {"type": "text", "text": EXTRACTION_PROMPT}
        ]);
        let raw = self.complete_blocks(content, PARSE_MAX_TOKENS).await?;
        parse_oracle_json(&raw)
    }

    pub async fn score_fit(
        &self,
        job_text: &str,
        resume_text: &str,
    ) -> Result<FitAnalysis, OracleError> {
        let prompt = format!(
            "{SCORING_PROMPT}\n\nCANDIDATE RESUME:\n{}\n\nJOB DESCRIPTION:\n{}",
            sanitize_text(resume_text),
            sanitize_text(job_text)
        );
        let raw = self.complete(&prompt, SCORE_MAX_TOKENS).await?;
        parse_oracle_json(&raw)
    }

    /// Strategic insights over precomputed campaign metrics. The narrative
    /// shape is the model's; it is stored and returned as free-form JSON.
    pub async fn generate_insights(&self, metrics: &Value) -> Result<Value, OracleError> {
        let rendered = serde_json::to_string_pretty(metrics)
            .map_err(|e| OracleError::Request(anyhow!("render metrics: {e}")))?;
        let prompt = format!("{INSIGHTS_PROMPT}\n\nCURRENT DATA:\n{rendered}");
        let raw = self.complete(&prompt, INSIGHT_MAX_TOKENS).await?;
        parse_oracle_json(&raw)
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, OracleError> {
        self.complete_blocks(Value::String(prompt.to_string()), max_tokens)
            .await
    }

    async fn complete_blocks(
        &self,
        content: Value,
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Request(anyhow!("send oracle request: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::Request(anyhow!("read oracle response: {e}")))?;
        if !status.is_success() {
            return Err(OracleError::Request(anyhow!(
                "oracle request failed: status={status} body={body}"
            )));
        }

        let payload: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| OracleError::Request(anyhow!("decode oracle envelope: {e}")))?;

        payload
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or(OracleError::EmptyResponse)
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Drop null bytes and control characters (keeping tab/newline/CR) that
/// upset JSON parsing and SQLite storage.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\t' || c == '\n' || c == '\r' || !(c.is_control() || c == '\u{7f}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Strip a surrounding markdown code fence, with or without a language tag.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop a language tag such as "json" on the opening fence line.
    match inner.split_once('\n') {
        Some((first_line, body)) if !first_line.trim().contains(' ') => body.trim(),
        _ => inner.trim(),
    }
}

/// Defensive decode of model output into a typed value; malformed output is
/// a reportable error carrying the raw text.
pub fn parse_oracle_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    let cleaned = sanitize_text(strip_code_fence(raw));
    serde_json::from_str(&cleaned).map_err(|source| OracleError::BadJson {
        raw: raw.to_string(),
        source,
    })
}

const EXTRACTION_PROMPT: &str = r#"You are parsing a job description document to extract structured data.

IMPORTANT INSTRUCTIONS:
1. Extract company name, job title, salary, location from the document text
2. For company information (size, revenue, industry, type, stock ticker), use your knowledge; if uncertain, use null
3. Return ONLY valid JSON with no additional text

Return exactly this shape:

{
  "company_name": "string - the actual company name from the job posting",
  "company_summary": "string or null - 2 sentences describing what the company does",
  "job_title": "string - the exact job title from the posting",
  "salary_min": "number or null - minimum salary from posting as integer (e.g., 300000)",
  "salary_max": "number or null - maximum salary from posting as integer",
  "location": "string or null - job location from posting",
  "company_size": "string or null - one of: '1-50', '51-200', '201-500', '501-1000', '1001-5000', '5001-10000', '10000+'",
  "annual_revenue": "string or null - e.g., '$1.2B' or '$500M'",
  "industry": "string or null - primary industry",
  "company_type": "string or null - one of: 'public', 'private', 'startup', 'nonprofit'",
  "stock_ticker": "string or null - if public company"
}

Rules:
- For salary, convert ranges like "$300,000 - $400,000" to integers (300000, 400000)
- Only provide information you are confident about; otherwise use null"#;

const SCORING_PROMPT: &str = r#"You are evaluating job fit for a candidate. Return ONLY valid JSON:

{
  "fit_score": <number 0-100>,
  "strengths": ["specific reason this role matches the candidate's experience", "..."],
  "gaps": ["potential concern or missing qualification", "..."],
  "recommendation": "<one of: 'pursue aggressively', 'strong fit', 'worth pursuing', 'proceed with caution', 'likely not a fit'>",
  "talking_points": ["specific achievement from the resume to highlight for THIS role", "..."],
  "interview_questions_to_prepare": ["likely question based on gaps", "..."]
}

Scoring guidelines:
- 90-100: perfect match, pursue immediately
- 80-89: strong fit, high priority
- 70-79: good fit, worth pursuing
- 60-69: moderate fit, proceed with caution
- below 60: significant gaps, likely not a fit"#;

const INSIGHTS_PROMPT: &str = r#"You are a senior career advisor analyzing a job search campaign from its tracked metrics. Generate strategic insights and return ONLY valid JSON:

{
  "executive_summary": "2-3 sentences on search health and urgency",
  "pipeline_health": {
    "status": "healthy | at_risk | critical",
    "explanation": "why this assessment"
  },
  "whats_working": ["pattern 1", "pattern 2"],
  "whats_not_working": ["pattern 1", "pattern 2"],
  "immediate_actions": [
    {"action": "specific action", "rationale": "why", "priority": "critical | high | medium"}
  ],
  "weekly_targets": {"new_applications": 10, "follow_ups": 5, "networking_conversations": 3},
  "risk_alerts": [{"risk": "specific concern", "mitigation": "what to do"}]
}

Be direct, actionable, and data-driven; no platitudes."#;

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Value,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[cfg(test)]
mod tests {
    use super::{
        parse_oracle_json, sanitize_text, strip_code_fence, FitAnalysis, OracleError,
        ParsedJobDescription,
    };

    #[test]
    fn sanitize_strips_control_characters() {
        let dirty = "Acme\u{0} Corp\u{1}\nline two\t!";
        assert_eq!(sanitize_text(dirty), "Acme Corp\nline two\t!");
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parse_full_job_description() {
        let raw = r#"{
            "company_name": "Acme Corp",
            "job_title": "SVP Revenue",
            "salary_min": 300000,
            "salary_max": 400000,
            "location": "New York, NY",
            "company_size": "1001-5000",
            "industry": "Advertising",
            "company_type": "public",
            "stock_ticker": "ACME"
        }"#;
        let parsed: ParsedJobDescription = parse_oracle_json(raw).expect("parse");
        assert_eq!(parsed.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(parsed.salary_max, Some(400_000));
        assert_eq!(parsed.company_summary, None);
    }

    #[test]
    fn parse_fenced_fit_analysis() {
        let raw = "```json\n{\"fit_score\": 82, \"strengths\": [\"GTM depth\"], \"gaps\": [], \"recommendation\": \"strong fit\"}\n```";
        let parsed: FitAnalysis = parse_oracle_json(raw).expect("parse");
        assert_eq!(parsed.fit_score, 82.0);
        assert_eq!(parsed.strengths, vec!["GTM depth".to_string()]);
        assert!(parsed.talking_points.is_empty());
    }

    #[test]
    fn malformed_output_keeps_raw_for_diagnosis() {
        let raw = "Sure! Here is the JSON you asked for: {oops";
        let error = parse_oracle_json::<ParsedJobDescription>(raw).expect_err("must fail");
        match error {
            OracleError::BadJson { raw: kept, .. } => assert!(kept.contains("oops")),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
