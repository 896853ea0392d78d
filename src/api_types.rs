use serde::{Deserialize, Serialize};

/* Chat completions (OpenAI-compatible) */

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String, // "system" | "user" | "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/* Talking-avatar video jobs */

#[derive(Debug, Clone, Serialize)]
pub struct TalkRequest<'a> {
    pub source_url: &'a str,
    pub script: TalkScript<'a>,
    pub config: TalkConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct TalkScript<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str, // "text"
    pub input: &'a str,
    pub voice: &'a str,
    pub ssml: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TalkConfig {
    pub stitch: bool,
    pub quality: &'static str, // "720p"
}

#[derive(Debug, Clone, Deserialize)]
pub struct TalkCreated {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TalkStatus {
    #[serde(default)]
    pub status: Option<String>, // "created" | "started" | "done" | "finished" | "failed" ...
    #[serde(default, rename = "resultUrl", alias = "result_url")]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/* Apps Script web-app hook */

#[derive(Debug, Clone, Serialize)]
pub struct WebAppUpload<'a> {
    pub token: &'a str,
    #[serde(rename = "folderId")]
    pub folder_id: &'a str,
    pub filename: &'a str,
    pub content_b64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<WebAppEmail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebAppEmail {
    pub to: Vec<String>,
    pub subject: String,
    #[serde(rename = "htmlBody")]
    pub html_body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebAppReply {
    #[serde(default)]
    pub ok: bool,
}
