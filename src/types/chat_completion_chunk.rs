use serde::{Deserialize, Serialize};

use crate::types::{MessageRole, Usage};

/// Outcome of one content filter category.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilterResult {
    /// Whether the content was filtered.
    #[serde(default)]
    pub filtered: bool,

    /// Whether the category was detected, for detection-only filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected: Option<bool>,
}

/// Content filter outcomes attached to a choice.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilterResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hate: Option<ContentFilterResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_harm: Option<ContentFilterResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sexual: Option<ContentFilterResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violence: Option<ContentFilterResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jailbreak: Option<ContentFilterResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profanity: Option<ContentFilterResult>,
}

impl ContentFilterResults {
    /// Returns true if any category filtered the content.
    pub fn any_filtered(&self) -> bool {
        !self.filtered_categories().is_empty()
    }

    /// Names of the categories that filtered the content, in wire order.
    pub fn filtered_categories(&self) -> Vec<&'static str> {
        [
            ("hate", self.hate),
            ("self_harm", self.self_harm),
            ("sexual", self.sexual),
            ("violence", self.violence),
            ("jailbreak", self.jailbreak),
            ("profanity", self.profanity),
        ]
        .into_iter()
        .filter(|(_, result)| result.is_some_and(|r| r.filtered))
        .map(|(name, _)| name)
        .collect()
    }
}

/// Incremental content carried by a choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Role of the author, usually only on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,

    /// A fragment of the response text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice within a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Index of the choice.
    #[serde(default)]
    pub index: u32,

    /// The incremental content.
    #[serde(default)]
    pub delta: Delta,

    /// Why generation stopped; set only on the terminal chunk.
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Content filter outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filter_results: Option<ContentFilterResults>,
}

/// A single incremental unit of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by all chunks of one completion.
    #[serde(default)]
    pub id: String,

    /// Object type, `chat.completion.chunk`.
    #[serde(default)]
    pub object: String,

    /// Creation time in unix seconds.
    #[serde(default)]
    pub created: i64,

    /// Model that produced the chunk.
    #[serde(default)]
    pub model: String,

    /// Choices carried by this chunk.
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,

    /// Backend fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,

    /// Token usage so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// Build a chunk carrying `content` in its first choice.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            object: "chat.completion.chunk".to_string(),
            choices: vec![CompletionChoice {
                delta: Delta {
                    role: None,
                    content: Some(content.into()),
                },
                ..CompletionChoice::default()
            }],
            ..Self::default()
        }
    }

    /// Build a terminal chunk with the given finish reason and no content.
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            object: "chat.completion.chunk".to_string(),
            choices: vec![CompletionChoice {
                finish_reason: Some(reason.into()),
                ..CompletionChoice::default()
            }],
            ..Self::default()
        }
    }

    /// The content fragment of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// The finish reason of the first choice that has one.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .iter()
            .find_map(|choice| choice.finish_reason.as_deref())
    }

    /// Returns true if this is the terminal chunk of the completion.
    pub fn is_finished(&self) -> bool {
        self.finish_reason().is_some()
    }

    /// Categories flagged by the content filter on any choice.
    pub fn filtered_categories(&self) -> Vec<&'static str> {
        let mut categories: Vec<&'static str> = Vec::new();
        for results in self
            .choices
            .iter()
            .filter_map(|choice| choice.content_filter_results.as_ref())
        {
            for category in results.filtered_categories() {
                if !categories.contains(&category) {
                    categories.push(category);
                }
            }
        }
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "id": "test-completion-id",
            "object": "chat.completion.chunk",
            "created": 1742265411,
            "model": "mercury-coder-small",
            "choices": [{
                "index": 0,
                "delta": {"content": "Hello"},
                "finish_reason": null,
                "content_filter_results": {
                    "hate": {"filtered": false},
                    "self_harm": {"filtered": false},
                    "sexual": {"filtered": false},
                    "violence": {"filtered": false},
                    "jailbreak": {"filtered": false, "detected": false},
                    "profanity": {"filtered": false, "detected": false}
                }
            }],
            "system_fingerprint": "",
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 50,
                "total_tokens": 150
            }
        })
    }

    #[test]
    fn deserialize_full_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_value(sample()).unwrap();
        assert_eq!(chunk.id, "test-completion-id");
        assert_eq!(chunk.content(), Some("Hello"));
        assert!(!chunk.is_finished());
        assert_eq!(chunk.usage, Some(Usage::new(100, 50)));
        let filters = chunk.choices[0].content_filter_results.unwrap();
        assert_eq!(
            filters.jailbreak,
            Some(ContentFilterResult {
                filtered: false,
                detected: Some(false)
            })
        );
        assert!(!filters.any_filtered());
    }

    #[test]
    fn terminal_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "x",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(chunk.content(), None);
        assert_eq!(chunk.finish_reason(), Some("stop"));
        assert!(chunk.is_finished());
    }

    #[test]
    fn role_only_delta() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"role": "assistant"}}]
        }))
        .unwrap();
        assert_eq!(chunk.choices[0].delta.role, Some(MessageRole::Assistant));
        assert_eq!(chunk.content(), None);
    }

    #[test]
    fn constructors() {
        assert_eq!(ChatCompletionChunk::text("4").content(), Some("4"));
        assert!(ChatCompletionChunk::finish("stop").is_finished());
        assert!(ChatCompletionChunk::default().content().is_none());
    }

    #[test]
    fn filtered_content() {
        let results = ContentFilterResults {
            violence: Some(ContentFilterResult {
                filtered: true,
                detected: None,
            }),
            ..ContentFilterResults::default()
        };
        assert!(results.any_filtered());
        assert_eq!(results.filtered_categories(), vec!["violence"]);

        let mut chunk = ChatCompletionChunk::text("...");
        chunk.choices[0].content_filter_results = Some(results);
        assert_eq!(chunk.filtered_categories(), vec!["violence"]);
    }
}
