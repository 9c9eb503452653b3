use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct ChatResp {
    choices: Vec<ChatChoice>,
}

// Embedding responses come in two shapes depending on the gateway:
// OpenAI-style { data: [{ embedding: [...] }] } and TEI-native
// { embeddings: [[...]] }. Accept both.
#[derive(Deserialize)]
struct OaEmbedItem {
    embedding: Vec<f64>,
}
#[derive(Deserialize)]
struct OaEmbedResp {
    data: Vec<OaEmbedItem>,
}
#[derive(Deserialize)]
struct TeiEmbedResp {
    embeddings: Vec<Vec<f64>>,
}

/// Client for an OpenAI-compatible gateway providing chat completions and
/// embeddings. Endpoint and models are read from the environment:
/// `OA_LLM_URL` (required), `OA_LLM_MODEL`, `OA_EMBED_MODEL`, and
/// `OA_OPENAI_API_KEY` / `OPENAI_API_KEY` for bearer auth.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    base: String,
    chat_model: String,
    embed_model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("OA_LLM_URL").context("OA_LLM_URL not set")?;
        let chat_model = std::env::var("OA_LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let embed_model = std::env::var("OA_EMBED_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let api_key = std::env::var("OA_OPENAI_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Ok(Self {
            http: Client::new(),
            base,
            chat_model,
            embed_model,
            api_key,
        })
    }

    fn chat_endpoint(&self) -> String {
        // If the configured URL already points at an OpenAI-compatible path,
        // use it as-is; otherwise append the standard path.
        if self.base.contains("/v1/") {
            self.base.clone()
        } else {
            format!("{}/v1/chat/completions", self.base.trim_end_matches('/'))
        }
    }

    fn embed_endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base.trim_end_matches('/'))
    }

    /// Send one prompt as a single-turn chat completion and return the reply
    /// text. An empty or missing reply is an error, never placeholder data.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatReq {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_completion_tokens: Some(4096),
        };
        let mut req = self.http.post(self.chat_endpoint()).json(&body);
        if let Some(k) = &self.api_key {
            req = req.bearer_auth(k);
        }
        let resp = req.send().await.context("completion request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unable to read body".to_string());
            return Err(anyhow!("completion request failed: {} {}", status, body));
        }
        let jr: ChatResp = resp
            .json()
            .await
            .context("failed to parse completion response")?;
        let content = jr
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(extract_content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(anyhow!("completion returned no content"));
        }
        Ok(content.trim().to_string())
    }

    /// Embed one text and return the vector. Accepts both OpenAI-style and
    /// TEI-native response shapes.
    pub async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        #[derive(Serialize)]
        struct EmbedReq<'a> {
            model: &'a str,
            input: [&'a str; 1],
        }
        let mut req = self.http.post(self.embed_endpoint()).json(&EmbedReq {
            model: &self.embed_model,
            input: [text],
        });
        if let Some(k) = &self.api_key {
            req = req.bearer_auth(k);
        }
        let resp = req.send().await.context("embedding request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unable to read body".to_string());
            return Err(anyhow!("embedding request failed: {} {}", status, body));
        }
        let bytes = resp.bytes().await.context("failed to read embedding response")?;
        let vector = if let Ok(o) = serde_json::from_slice::<OaEmbedResp>(&bytes) {
            o.data.into_iter().next().map(|d| d.embedding)
        } else if let Ok(t) = serde_json::from_slice::<TeiEmbedResp>(&bytes) {
            t.embeddings.into_iter().next()
        } else {
            return Err(anyhow!("unrecognized embedding response shape"));
        };
        match vector {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(anyhow!("embedding response contained no vector")),
        }
    }
}

// Chat content is usually a plain string, but some gateways nest it as
// {"content": {"text": "..."}}.
fn extract_content(message: &serde_json::Value) -> Option<String> {
    let content = message.get("content")?;
    if let Some(s) = content.as_str() {
        return Some(s.to_string());
    }
    content
        .get("text")
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
}

/// Render a JSON row object as readable `Key: value` lines, the text form
/// used when embedding stored rows. camelCase and snake_case keys are
/// prettified into capitalized words; null fields are skipped.
pub fn row_to_text(row: &serde_json::Value, table_name: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(name) = table_name {
        out.push_str(&format!("Record from {}:\n", name));
    }
    if let Some(obj) = row.as_object() {
        for (key, value) in obj {
            if value.is_null() {
                continue;
            }
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("{}: {}\n", prettify_key(key), rendered));
        }
    }
    out.trim_end().to_string()
}

fn prettify_key(key: &str) -> String {
    let mut spaced = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch == '_' {
            spaced.push(' ');
        } else if ch.is_uppercase() {
            spaced.push(' ');
            spaced.push(ch);
        } else {
            spaced.push(ch);
        }
    }
    spaced
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_to_text_prettifies_keys_and_skips_nulls() {
        let row = serde_json::json!({
            "order_number": "ORD-1001",
            "totalAmount": 42.5,
            "status": "pending",
            "driver_id": null,
        });
        let text = row_to_text(&row, Some("orders"));
        assert!(text.starts_with("Record from orders:"));
        assert!(text.contains("Order Number: ORD-1001"));
        assert!(text.contains("Total Amount: 42.5"));
        assert!(!text.contains("driver_id"));
        assert!(!text.contains("Driver Id"));
    }

    #[test]
    fn extract_content_handles_nested_text() {
        let plain = serde_json::json!({"role": "assistant", "content": "hello"});
        assert_eq!(extract_content(&plain).as_deref(), Some("hello"));
        let nested = serde_json::json!({"role": "assistant", "content": {"text": "hi"}});
        assert_eq!(extract_content(&nested).as_deref(), Some("hi"));
    }
}
