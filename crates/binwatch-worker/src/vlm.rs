//! OpenAI-compatible vision-language client.
//!
//! Sends a batch of event frames with the event taxonomy and parses the
//! per-frame labels back out of the reply.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use binwatch_models::{ConfidenceTier, EventType};

use crate::classifier::{FrameVerdict, VisionClassifier, VlmResponse};
use crate::config::VlmConfig;
use crate::error::{WorkerError, WorkerResult};

/// Price per image whose longer side fits in one 1024px tile.
pub const COST_PER_STANDARD_IMAGE: f64 = 0.01;
/// Price per larger image.
pub const COST_PER_HIGH_DETAIL_IMAGE: f64 = 0.03;
const STANDARD_MAX_DIMENSION: u32 = 1024;

/// Estimated cost of sending one image.
///
/// Images that cannot be read are priced as standard.
pub fn image_cost(path: &Path) -> f64 {
    match image::image_dimensions(path) {
        Ok((width, height)) if width.max(height) <= STANDARD_MAX_DIMENSION => {
            COST_PER_STANDARD_IMAGE
        }
        Ok(_) => COST_PER_HIGH_DETAIL_IMAGE,
        Err(_) => COST_PER_STANDARD_IMAGE,
    }
}

/// Chat completions request.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat completions response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// JSON shape the prompt asks the model for.
#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    frames: Vec<RawFrame>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event_type: String,
    #[serde(default)]
    confidence: Option<String>,
}

/// Vision-language classifier backed by the chat completions API.
pub struct OpenAiVisionClient {
    http: Client,
    api_key: String,
    config: VlmConfig,
}

impl OpenAiVisionClient {
    /// Create a client. Fails if no API key is configured.
    pub fn new(config: VlmConfig) -> WorkerResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| WorkerError::config_error("OPENAI_API_KEY not set"))?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    /// Build prompt for the model.
    fn build_prompt(&self, taxonomy: &[EventType], context: &str, frame_count: usize) -> String {
        let categories = taxonomy
            .iter()
            .filter(|t| **t != EventType::NoEvent)
            .map(|t| format!("- \"{}\" ({}): {}", t.as_str(), t.label(), t.guidance()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You are analyzing {frame_count} frames, in chronological order, from a garbage collection video. A garbage bin was detected in each of them.

For each frame, decide which of these events is occurring:
{categories}

If none of them applies, use "no_event".

Context: {context}

Return ONLY a single JSON object with this schema:
{{
  "frames": [
    {{"event_type": "one of the names above or no_event", "confidence": "high|medium|low"}}
  ],
  "description": "What you see across the frames and why the event is occurring"
}}

Return exactly one entry in "frames" per image, in the order the images were given."#
        )
    }

    async fn encode_image(path: &Path) -> WorkerResult<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
    }

    /// Call the chat completions endpoint and return the message text.
    async fn call_api(&self, content: Vec<ContentPart>) -> WorkerResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WorkerError::VlmTimeout(self.config.timeout.as_secs())
                } else {
                    WorkerError::vlm_failed(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::vlm_failed(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::vlm_failed(format!("Failed to parse response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| WorkerError::vlm_failed("No content in response"))
    }
}

#[async_trait]
impl VisionClassifier for OpenAiVisionClient {
    fn estimate_cost(&self, frames: &[PathBuf]) -> f64 {
        frames.iter().map(|f| image_cost(f)).sum()
    }

    async fn classify(
        &self,
        frames: &[PathBuf],
        taxonomy: &[EventType],
        context: &str,
    ) -> WorkerResult<VlmResponse> {
        let mut content = vec![ContentPart::Text {
            text: self.build_prompt(taxonomy, context, frames.len()),
        }];
        for frame in frames {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: Self::encode_image(frame).await?,
                },
            });
        }

        info!(
            model = %self.config.model,
            frames = frames.len(),
            "Calling vision-language model"
        );
        let text = self.call_api(content).await?;
        Ok(parse_reply(&text))
    }
}

/// Strip Markdown code fences around a JSON reply.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn parse_event_type(raw: &str) -> EventType {
    raw.parse().unwrap_or_else(|_| {
        debug!(label = raw, "Unknown event label, treating as no_event");
        EventType::NoEvent
    })
}

fn parse_confidence(raw: Option<&str>) -> ConfidenceTier {
    raw.map(ConfidenceTier::parse_lenient)
        .unwrap_or(ConfidenceTier::Medium)
}

/// Parse a model reply into per-frame verdicts.
///
/// JSON is preferred; anything else is read as the
/// `EVENT_TYPE: / DESCRIPTION: / CONFIDENCE:` line format. The result always
/// carries at least one verdict.
pub fn parse_reply(text: &str) -> VlmResponse {
    if let Ok(reply) = serde_json::from_str::<RawReply>(strip_code_fences(text)) {
        let mut frame_verdicts: Vec<FrameVerdict> = reply
            .frames
            .iter()
            .map(|f| FrameVerdict {
                event_type: parse_event_type(&f.event_type),
                confidence: parse_confidence(f.confidence.as_deref()),
            })
            .collect();

        if frame_verdicts.is_empty() {
            frame_verdicts.push(FrameVerdict {
                event_type: reply
                    .event_type
                    .as_deref()
                    .map(parse_event_type)
                    .unwrap_or(EventType::NoEvent),
                confidence: parse_confidence(reply.confidence.as_deref()),
            });
        }

        return VlmResponse {
            frame_verdicts,
            description: reply.description.unwrap_or_default(),
        };
    }

    parse_line_format(text)
}

fn field<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .trim_start_matches(|c: char| !c.is_ascii_alphabetic())
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

fn parse_line_format(text: &str) -> VlmResponse {
    let event_type = field(text, "EVENT_TYPE")
        .and_then(|v| v.trim_matches(|c| c == '[' || c == ']').parse().ok())
        .or_else(|| {
            let lower = text.to_lowercase();
            EventType::ALL
                .iter()
                .copied()
                .find(|t| lower.contains(&t.label().to_lowercase()))
        })
        .unwrap_or(EventType::NoEvent);

    let description = field(text, "DESCRIPTION")
        .map(str::to_string)
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|l| l.len() > 20)
                .map(str::to_string)
        })
        .unwrap_or_else(|| text.chars().take(200).collect());

    VlmResponse {
        frame_verdicts: vec![FrameVerdict {
            event_type,
            confidence: parse_confidence(field(text, "CONFIDENCE")),
        }],
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> VlmConfig {
        VlmConfig {
            api_key: Some("sk-test".to_string()),
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn chat_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    #[test]
    fn test_parse_json_reply() {
        let reply = parse_reply(
            r#"{"frames": [
                {"event_type": "blocked_access", "confidence": "high"},
                {"event_type": "Blocked access", "confidence": "medium"},
                {"event_type": "parade", "confidence": "low"}
            ], "description": "A van is parked in front of the bin"}"#,
        );
        assert_eq!(reply.frame_verdicts.len(), 3);
        assert_eq!(reply.frame_verdicts[0].event_type, EventType::BlockedAccess);
        assert_eq!(reply.frame_verdicts[1].event_type, EventType::BlockedAccess);
        assert_eq!(reply.frame_verdicts[2].event_type, EventType::NoEvent);
        assert_eq!(reply.frame_verdicts[2].confidence, ConfidenceTier::Low);
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = parse_reply(
            "```json\n{\"event_type\": \"overflow\", \"confidence\": \"high\", \"description\": \"spilling\"}\n```",
        );
        assert_eq!(
            reply.frame_verdicts,
            vec![FrameVerdict {
                event_type: EventType::Overflow,
                confidence: ConfidenceTier::High
            }]
        );
    }

    #[test]
    fn test_parse_line_format() {
        let reply = parse_reply(
            "EVENT_TYPE: Bin missed / not collected\nDESCRIPTION: The truck passes without lifting the bin\nCONFIDENCE: low",
        );
        assert_eq!(reply.frame_verdicts[0].event_type, EventType::MissedCollection);
        assert_eq!(reply.frame_verdicts[0].confidence, ConfidenceTier::Low);
        assert!(!reply.description.is_empty());
    }

    #[test]
    fn test_parse_free_text_falls_back() {
        let reply = parse_reply("I think this shows contamination detected in the recycling.");
        assert_eq!(reply.frame_verdicts[0].event_type, EventType::Contamination);
        assert_eq!(reply.frame_verdicts[0].confidence, ConfidenceTier::Medium);

        let reply = parse_reply("nothing to see");
        assert_eq!(reply.frame_verdicts[0].event_type, EventType::NoEvent);
    }

    #[test]
    fn test_image_cost_by_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let small = write_frame(dir.path(), "small.png", 640, 360);
        let large = write_frame(dir.path(), "large.png", 1920, 1080);

        assert_eq!(image_cost(&small), COST_PER_STANDARD_IMAGE);
        assert_eq!(image_cost(&large), COST_PER_HIGH_DETAIL_IMAGE);
        assert_eq!(image_cost(&dir.path().join("missing.jpg")), COST_PER_STANDARD_IMAGE);
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            OpenAiVisionClient::new(VlmConfig::default()),
            Err(WorkerError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_sends_frames() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                r#"{"frames": [{"event_type": "overflow", "confidence": "high"},
                               {"event_type": "overflow", "confidence": "medium"}],
                    "description": "Lid propped open by bags"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            write_frame(dir.path(), "a.png", 64, 64),
            write_frame(dir.path(), "b.png", 64, 64),
        ];
        let client = OpenAiVisionClient::new(config_for(&server)).unwrap();

        assert!((client.estimate_cost(&frames) - 0.02).abs() < 1e-9);
        let reply = client
            .classify(&frames, EventType::ALL, "Bin visible from 3s to 9s")
            .await
            .unwrap();
        assert_eq!(reply.frame_verdicts.len(), 2);
        assert_eq!(reply.frame_verdicts[0].event_type, EventType::Overflow);
    }

    #[tokio::test]
    async fn test_server_error_is_vlm_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let frames = vec![write_frame(dir.path(), "a.png", 32, 32)];
        let client = OpenAiVisionClient::new(config_for(&server)).unwrap();

        let err = client.classify(&frames, EventType::ALL, "").await.unwrap_err();
        assert!(matches!(err, WorkerError::VlmFailed(ref msg) if msg.contains("upstream down")));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_slow_reply_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_reply("{}"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let frames = vec![write_frame(dir.path(), "a.png", 32, 32)];
        let client = OpenAiVisionClient::new(VlmConfig {
            timeout: Duration::from_secs(1),
            ..config_for(&server)
        })
        .unwrap();

        let err = client.classify(&frames, EventType::ALL, "").await.unwrap_err();
        assert!(matches!(err, WorkerError::VlmTimeout(1)));
    }
}
