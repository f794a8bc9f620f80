use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::limiter::RateLimiter;
use crate::model::CandidateExtraction;
use crate::settings::Settings;

const SYSTEM_PROMPT: &str =
    "Respond only with a structured JSON object based on the user's input.";
const TEMPERATURE: f32 = 0.15;
const MAX_TOKENS: u32 = 1000;

/// Deterministic extraction prompt for one facility.
pub fn build_prompt(name: &str, body: &str) -> String {
    format!(
        r#"
Extract the following information from the hospital history text below:

- year_opened
- year_closed
- number_of_beds
- number_of_patients
- peak_patient_population

In addition, return a field called hand_check_flag. Set hand_check_flag to 1 if:

- The text talks mostly about a different hospital or institution, not the one in this row; OR
- All extracted fields are null.

Otherwise, set hand_check_flag to 0.

Return the result as a JSON object like:
{{
  "year_opened_LLM": [YEAR or null],
  "year_closed_LLM": [YEAR or null],
  "number_of_beds_LLM": [INTEGER or null],
  "number_of_patients_LLM": [INTEGER or null],
  "peak_patient_population_LLM": [INTEGER or null],
  "hand_check_flag_LLM": 0 or 1
}}

---
Hospital Name: {name}

Text:
"""{body}"""
"#
    )
}

/// A text-completion backend. Returns the assistant message content.
pub trait CompletionService {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError>;
}

/// Chat-completions client (`Authorization: Bearer`).
pub struct CompletionClient {
    client: reqwest::Client,
    url: String,
    key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

impl CompletionClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let key = settings.completion_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: settings.completion_url.clone(),
            key,
            model: settings.model.clone(),
        })
    }
}

impl CompletionService for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        message_content(&body)
    }
}

fn message_content(body: &str) -> Result<String, ExtractionError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or(ExtractionError::NoChoices)
}

/// Remove a surrounding ```json ... ``` (or bare ```) fence.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_completion(content: &str) -> Result<CandidateExtraction, ExtractionError> {
    Ok(serde_json::from_str(strip_code_fence(content))?)
}

/// Run one paced extraction. Never fails: any error yields the fallback.
///
/// Bodies with no text skip the call entirely.
pub async fn extract_candidate(
    service: &impl CompletionService,
    limiter: &impl RateLimiter,
    name: &str,
    url: &str,
    body: &str,
) -> CandidateExtraction {
    if body.trim().is_empty() {
        debug!(facility = name, url, "No body text, using fallback extraction");
        return CandidateExtraction::fallback();
    }

    limiter.acquire().await;
    let prompt = build_prompt(name, body);

    match service.complete(&prompt).await.and_then(|c| parse_completion(&c)) {
        Ok(candidate) => candidate,
        Err(e) => {
            warn!(facility = name, url, error = %e, "Extraction failed, using fallback");
            CandidateExtraction::fallback()
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::limiter::Unpaced;

    struct CannedService {
        reply: Result<&'static str, u16>,
        calls: AtomicUsize,
    }

    impl CannedService {
        fn new(reply: Result<&'static str, u16>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CompletionService for CannedService {
        async fn complete(&self, _prompt: &str) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(s) => Ok(s.to_string()),
                Err(status) => Err(ExtractionError::Status {
                    status,
                    body: "overloaded".into(),
                }),
            }
        }
    }

    const ATHENS_URL: &str = "https://www.asylumprojects.org/index.php/Athens_Lunatic_Asylum";

    const FENCED: &str = "```json\n{\n  \"year_opened_LLM\": 1874,\n  \"year_closed_LLM\": null,\n  \"number_of_beds_LLM\": \"572\",\n  \"number_of_patients_LLM\": null,\n  \"peak_patient_population_LLM\": 1800,\n  \"hand_check_flag_LLM\": 0\n}\n```";

    #[test]
    fn prompt_is_deterministic_and_names_every_field() {
        let a = build_prompt("Athens Lunatic Asylum", "Opened in 1874.");
        assert_eq!(a, build_prompt("Athens Lunatic Asylum", "Opened in 1874."));
        assert!(a.contains("Hospital Name: Athens Lunatic Asylum"));
        assert!(a.contains("\"\"\"Opened in 1874.\"\"\""));
        for field in [
            "year_opened_LLM",
            "year_closed_LLM",
            "number_of_beds_LLM",
            "number_of_patients_LLM",
            "peak_patient_population_LLM",
            "hand_check_flag_LLM",
        ] {
            assert!(a.contains(field), "missing {field}");
        }
    }

    #[test]
    fn fence_variants() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {} "), "{}");
    }

    #[test]
    fn chat_body_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{}"}}]}"#;
        assert_eq!(message_content(body).unwrap(), "{}");
        assert!(matches!(
            message_content(r#"{"choices":[]}"#),
            Err(ExtractionError::NoChoices)
        ));
    }

    #[tokio::test]
    async fn fenced_reply_is_parsed() {
        let service = CannedService::new(Ok(FENCED));
        let c =
            extract_candidate(&service, &Unpaced, "Athens", ATHENS_URL, "Opened in 1874.").await;
        assert_eq!(c.year_opened.as_deref(), Some("1874"));
        assert_eq!(c.bed_count.as_deref(), Some("572"));
        assert_eq!(c.peak_population.as_deref(), Some("1800"));
        assert!(!c.uncertain);
    }

    #[tokio::test]
    async fn http_error_yields_fallback() {
        let service = CannedService::new(Err(429));
        let c = extract_candidate(&service, &Unpaced, "Athens", ATHENS_URL, "text").await;
        assert_eq!(c, CandidateExtraction::fallback());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fallback_warning_names_the_page() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let service = CannedService::new(Err(503));
        extract_candidate(&service, &Unpaced, "Athens", ATHENS_URL, "text").await;

        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("Extraction failed"), "{log}");
        assert!(log.contains(ATHENS_URL), "{log}");
        assert!(log.contains("facility=\"Athens\"") || log.contains("facility=Athens"), "{log}");
    }

    #[tokio::test]
    async fn malformed_reply_yields_fallback() {
        let service = CannedService::new(Ok("I could not find any numbers."));
        let c = extract_candidate(&service, &Unpaced, "Athens", ATHENS_URL, "text").await;
        assert_eq!(c, CandidateExtraction::fallback());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_body_skips_call() {
        let service = CannedService::new(Ok(FENCED));
        let c = extract_candidate(&service, &Unpaced, "Unknown", ATHENS_URL, "  ").await;
        assert_eq!(c, CandidateExtraction::fallback());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }
}
