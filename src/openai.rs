//! Minimal OpenAI-compatible chat-completions client for our use-cases.
//!
//! We only call chat.completions, either blocking (one report string) or
//! streamed (SSE fragments relayed to the UI). Calls are instrumented and log
//! model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log API keys and we keep payload truncations short.

use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{instrument, info};

/// One credential set: key + endpoint + deployment/model name.
/// Deployments run with one or two of these (e.g. paired regional endpoints).
#[derive(Clone)]
pub struct ApiCredentials {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

/// How a credential set is picked for each call. `Random` spreads quota
/// across endpoints; `Primary` pins the first set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionPolicy {
  Primary,
  Random,
}

impl SelectionPolicy {
  pub fn select(&self, n: usize) -> usize {
    match self {
      SelectionPolicy::Primary => 0,
      SelectionPolicy::Random => {
        if n <= 1 { 0 } else { rand::thread_rng().gen_range(0..n) }
      }
    }
  }
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub credentials: Vec<ApiCredentials>,
  pub policy: SelectionPolicy,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  ///
  /// OPENAI_API_KEY_ALT (plus optional _ALT base-url/model overrides) adds a
  /// second credential set; OPENAI_POOL_POLICY = "primary" pins the first.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    let mut credentials =
      vec![ApiCredentials { api_key, base_url: base_url.clone(), model: model.clone() }];
    if let Ok(alt_key) = std::env::var("OPENAI_API_KEY_ALT") {
      credentials.push(ApiCredentials {
        api_key: alt_key,
        base_url: std::env::var("OPENAI_BASE_URL_ALT").unwrap_or(base_url),
        model: std::env::var("OPENAI_MODEL_ALT").unwrap_or(model),
      });
    }

    let policy = match std::env::var("OPENAI_POOL_POLICY").as_deref() {
      Ok("primary") => SelectionPolicy::Primary,
      _ => SelectionPolicy::Random,
    };

    // Grading responses are long; allow well past the interactive default.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(120))
      .build()
      .ok()?;

    Some(Self { client, credentials, policy })
  }

  fn pick(&self) -> &ApiCredentials {
    &self.credentials[self.policy.select(self.credentials.len())]
  }

  /// Blocking chat completion over an arbitrary message sequence.
  /// Returns the first choice's message text.
  #[instrument(level = "info", skip(self, messages), fields(n_messages = messages.len()))]
  pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, String> {
    let creds = self.pick();
    let url = format!("{}/chat/completions", creds.base_url);
    let req = ChatCompletionRequest {
      model: creds.model.clone(),
      messages,
      stream: None,
    };

    let start = std::time::Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "webgrader-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", creds.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, elapsed = ?start.elapsed(), "OpenAI usage");
    }
    let text = body.choices.get(0)
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    Ok(text)
  }

  /// Streaming chat completion. Returns a finite, non-restartable fragment
  /// sequence; the caller pulls fragments and concatenates them.
  #[instrument(level = "info", skip(self, messages), fields(n_messages = messages.len()))]
  pub async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<ChatStream, String> {
    let creds = self.pick();
    let url = format!("{}/chat/completions", creds.base_url);
    let req = ChatCompletionRequest {
      model: creds.model.clone(),
      messages,
      stream: Some(true),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "webgrader-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", creds.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or_else(|| body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let inner = res
      .bytes_stream()
      .map(|r| r.map(|b| b.to_vec()).map_err(|e| e.to_string()))
      .boxed();
    Ok(ChatStream { inner, buffer: String::new(), done: false })
  }

  /// Model-based JS syntax evaluation (checker strategy "model").
  #[instrument(level = "info", skip(self, system, code), fields(code_len = code.len()))]
  pub async fn js_syntax_check(&self, system: &str, code: &str) -> Result<String, String> {
    self
      .chat(vec![ChatMessage::system(system), ChatMessage::user(code)])
      .await
      .map(|t| t.trim().to_string())
  }
}

/// Lazy SSE fragment sequence over a chat-completion response body.
/// Not restartable; after the terminator or a transport error it stays done.
pub struct ChatStream {
  inner: BoxStream<'static, Result<Vec<u8>, String>>,
  buffer: String,
  done: bool,
}

impl ChatStream {
  /// Next text fragment, `Some(Err(_))` exactly once on transport failure,
  /// `None` once the sequence is exhausted.
  pub async fn next_fragment(&mut self) -> Option<Result<String, String>> {
    loop {
      if self.done {
        return None;
      }

      // Drain complete lines already buffered before reading more bytes.
      while let Some(pos) = self.buffer.find('\n') {
        let line = self.buffer[..pos].trim().to_string();
        self.buffer.drain(..=pos);
        match parse_sse_line(&line) {
          SseLine::Done => {
            self.done = true;
            return None;
          }
          SseLine::Delta(text) => return Some(Ok(text)),
          SseLine::Skip => {}
        }
      }

      match self.inner.next().await {
        Some(Ok(chunk)) => match String::from_utf8(chunk) {
          Ok(text) => self.buffer.push_str(&text),
          Err(_) => continue,
        },
        Some(Err(e)) => {
          self.done = true;
          return Some(Err(format!("stream error: {}", e)));
        }
        None => {
          self.done = true;
          return None;
        }
      }
    }
  }
}

enum SseLine {
  Delta(String),
  Done,
  Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
  let data = match line.strip_prefix("data:") {
    Some(d) => d.trim(),
    None => return SseLine::Skip,
  };
  if data == "[DONE]" {
    return SseLine::Done;
  }
  match serde_json::from_str::<ChatCompletionChunk>(data) {
    Ok(chunk) => {
      let text = chunk.choices.get(0)
        .and_then(|c| c.delta.content.clone())
        .unwrap_or_default();
      if text.is_empty() { SseLine::Skip } else { SseLine::Delta(text) }
    }
    Err(_) => SseLine::Skip,
  }
}

// --- Chat DTOs ---

/// Role-tagged request message; the grading pipeline assembles these.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
  pub role: String,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: "system".into(), content: content.into() }
  }
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: "user".into(), content: content.into() }
  }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
  choices: Vec<ChunkChoice>,
}
#[derive(Deserialize)]
struct ChunkChoice { delta: ChunkDelta }
#[derive(Deserialize)]
struct ChunkDelta {
  #[serde(default)] content: Option<String>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sse_delta_lines_yield_content() {
    let line = r#"data: {"choices":[{"delta":{"content":"Score"}}]}"#;
    match parse_sse_line(line) {
      SseLine::Delta(t) => assert_eq!(t, "Score"),
      _ => panic!("expected delta"),
    }
  }

  #[test]
  fn sse_done_and_noise_lines() {
    assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
    assert!(matches!(parse_sse_line(""), SseLine::Skip));
    assert!(matches!(parse_sse_line("event: ping"), SseLine::Skip));
    // role-only first chunk carries no content
    let first = r#"data: {"choices":[{"delta":{}}]}"#;
    assert!(matches!(parse_sse_line(first), SseLine::Skip));
  }

  #[test]
  fn primary_policy_always_picks_first() {
    for _ in 0..10 {
      assert_eq!(SelectionPolicy::Primary.select(2), 0);
    }
  }

  #[test]
  fn random_policy_stays_in_bounds() {
    for _ in 0..50 {
      let i = SelectionPolicy::Random.select(2);
      assert!(i < 2);
    }
    assert_eq!(SelectionPolicy::Random.select(1), 0);
  }

  #[test]
  fn api_error_bodies_unwrap() {
    let body = r#"{"error":{"message":"quota exceeded"}}"#;
    assert_eq!(extract_api_error(body).as_deref(), Some("quota exceeded"));
    assert!(extract_api_error("not json").is_none());
  }
}
