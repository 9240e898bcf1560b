use crate::chat::{AssistantMessage, BackendCompletion, ChatCompletion, CompletionChoice};
use crate::config::FeatureFlags;
use crate::transforms::wrap_reasoning;

pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Maps a buffered backend completion onto the caller's response shape.
pub fn map_completion(
    resp: BackendCompletion,
    caller_model: &str,
    features: FeatureFlags,
) -> ChatCompletion {
    let choices = resp
        .choices
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, choice)| {
            let message = choice.message.unwrap_or_default();
            let content = message.content.unwrap_or_default();
            let content = match message.reasoning_content.as_deref() {
                Some(reasoning) if features.show_reasoning && !reasoning.is_empty() => {
                    wrap_reasoning(reasoning, &content)
                }
                _ => content,
            };
            CompletionChoice {
                index: choice.index.unwrap_or(position as u32),
                message: AssistantMessage {
                    role: "assistant",
                    content,
                },
                finish_reason: choice.finish_reason,
            }
        })
        .collect();

    ChatCompletion {
        id: completion_id(),
        object: "chat.completion",
        created: chrono::Utc::now().timestamp(),
        model: caller_model.to_string(),
        choices,
        usage: resp.usage.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn backend(raw: Value) -> BackendCompletion {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn maps_plain_completion() {
        let resp = backend(json!({
            "choices": [{"index": 0, "message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }));
        let out = serde_json::to_value(map_completion(resp, "gpt-4o", FeatureFlags::default()))
            .unwrap();
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["model"], "gpt-4o");
        assert!(out["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert_eq!(
            out["choices"],
            json!([{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }])
        );
        assert_eq!(out["usage"]["total_tokens"], 4);
    }

    #[test]
    fn missing_usage_reports_zeroes() {
        let resp = backend(json!({"choices": []}));
        let out = serde_json::to_value(map_completion(resp, "m", FeatureFlags::default())).unwrap();
        assert_eq!(
            out["usage"],
            json!({"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0})
        );
    }

    #[test]
    fn reasoning_is_prepended_only_when_surfaced() {
        let raw = json!({
            "choices": [{
                "message": {"content": "answer", "reasoning_content": "plan"},
                "finish_reason": "stop"
            }]
        });
        let shown = map_completion(
            backend(raw.clone()),
            "m",
            FeatureFlags {
                show_reasoning: true,
                enable_thinking: false,
            },
        );
        assert_eq!(
            shown.choices[0].message.content,
            "<think>\nplan\n</think>\n\nanswer"
        );

        let hidden = map_completion(backend(raw), "m", FeatureFlags::default());
        assert_eq!(hidden.choices[0].message.content, "answer");
    }

    #[test]
    fn missing_index_and_content_are_filled() {
        let resp = backend(json!({
            "choices": [
                {"message": {"content": "a"}},
                {"message": {"content": null}, "finish_reason": "length"}
            ]
        }));
        let out = map_completion(resp, "m", FeatureFlags::default());
        assert_eq!(out.choices[1].index, 1);
        assert_eq!(out.choices[1].message.content, "");
        assert_eq!(out.choices[1].finish_reason.as_deref(), Some("length"));
        assert_eq!(out.choices[0].finish_reason, None);
    }
}
