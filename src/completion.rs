//! Streaming chat-completion client (OpenRouter / OpenAI-compatible).
//!
//! [`CompletionClient::stream_chat`] returns the raw upstream response once
//! its headers arrived with a success status. The body is consumed by
//! [`crate::relay`].

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{default_title, CompletionConfig};
use crate::error::{ChatError, ProviderError};
use crate::models::ChatMessage;

const PROVIDER: &str = "completion provider";

/// Characters `encodeURI` leaves alone: alphanumerics, URI reserved
/// characters, unreserved marks and `#`.
const ENCODE_URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.config.idle_timeout_secs)
    }

    fn headers(&self) -> Result<HeaderMap, ChatError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ChatError::Configuration("OPENROUTER_API_KEY is not set".into()))?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
            ChatError::Configuration("OPENROUTER_API_KEY is not a valid header value".into())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let title = match latin1_header(&self.config.title) {
            Some(v) => v,
            None => latin1_header(&default_title())
                .unwrap_or_else(|| HeaderValue::from_static("grounded-chat")),
        };
        headers.insert("x-title", title);

        if let Some(referer) = self
            .config
            .referer
            .as_deref()
            .and_then(|r| latin1_header(&encode_uri(r)))
        {
            headers.insert("http-referer", referer);
        }

        Ok(headers)
    }

    /// Start a streaming completion for `messages`.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Configuration`] when no API key is configured.
    /// - [`ChatError::Upstream`] on transport failure, header timeout, or a
    ///   non-success status (the body text is carried in the error).
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<reqwest::Response, ChatError> {
        let headers = self.headers()?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            stream: true,
        };

        debug!(model = %self.config.model, messages = messages.len(), "requesting completion");
        let request = self.client.post(&url).headers(headers).json(&body).send();
        let response = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), request)
            .await
            .map_err(|_| ProviderError::Timeout(PROVIDER))?
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        info!(model = %self.config.model, "completion stream started");
        Ok(response)
    }
}

/// Keep only Latin-1 characters (no controls) and encode them one byte each.
/// Returns `None` when nothing usable remains.
pub fn latin1_header(value: &str) -> Option<HeaderValue> {
    let bytes: Vec<u8> = value
        .chars()
        .filter(|c| (*c as u32) <= 0xFF && !c.is_control())
        .map(|c| c as u32 as u8)
        .collect();
    let trimmed = bytes.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    HeaderValue::from_bytes(trimmed).ok()
}

/// Percent-encode a full URI the way `encodeURI` does. Characters outside
/// [`ENCODE_URI`] become `%XX` escapes of their UTF-8 bytes.
pub fn encode_uri(value: &str) -> String {
    utf8_percent_encode(value, ENCODE_URI).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: CompletionConfig) -> CompletionClient {
        CompletionClient::new(config).unwrap()
    }

    #[test]
    fn latin1_keeps_accents_and_drops_the_rest() {
        let v = latin1_header("Café 🚀 Bot").unwrap();
        assert_eq!(v.as_bytes(), b"Caf\xe9  Bot");
        assert!(latin1_header("🚀🚀").is_none());
        assert!(latin1_header("   ").is_none());
    }

    #[test]
    fn encode_uri_escapes_non_ascii() {
        assert_eq!(encode_uri("https://exemple.fr/é"), "https://exemple.fr/%C3%A9");
        assert_eq!(encode_uri("https://a.b/c?d=1"), "https://a.b/c?d=1");
    }

    #[test]
    fn encode_uri_escapes_spaces_quotes_and_percent() {
        assert_eq!(
            encode_uri("https://a.b/my page?q=\"x\""),
            "https://a.b/my%20page?q=%22x%22"
        );
        assert_eq!(encode_uri("50%<{|}>"), "50%25%3C%7B%7C%7D%3E");
        assert_eq!(encode_uri("a#b;c,d'(e)*!~"), "a#b;c,d'(e)*!~");
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = client(CompletionConfig::default()).headers().unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
    }

    #[test]
    fn headers_fall_back_to_default_title() {
        let headers = client(CompletionConfig {
            api_key: Some("sk-test".into()),
            title: "🚀".into(),
            referer: Some("https://chat.exemple.fr/été".into()),
            ..CompletionConfig::default()
        })
        .headers()
        .unwrap();

        assert_eq!(headers["x-title"], "grounded-chat");
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(
            headers["http-referer"],
            "https://chat.exemple.fr/%C3%A9t%C3%A9"
        );
    }

    #[test]
    fn referer_is_optional() {
        let headers = client(CompletionConfig {
            api_key: Some("k".into()),
            ..CompletionConfig::default()
        })
        .headers()
        .unwrap();
        assert!(headers.get("http-referer").is_none());
    }
}
