use crate::chat::{BackendRequest, ChatRequest, ChatTemplateKwargs};
use crate::config::{FeatureFlags, UnknownFieldPolicy};

pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

const CHAT_TEMPLATE_KWARGS: &str = "chat_template_kwargs";

/// Shapes a caller request into what the backend expects.
///
/// Extra top-level fields only survive under [`UnknownFieldPolicy::Preserve`];
/// rejection is the caller's job and is treated like `Ignore` here.
pub fn build_backend_request(
    req: ChatRequest,
    resolved_model: String,
    features: FeatureFlags,
    unknown_fields: UnknownFieldPolicy,
) -> BackendRequest {
    let mut extra_body = match unknown_fields {
        UnknownFieldPolicy::Preserve => req.extra_body,
        UnknownFieldPolicy::Ignore | UnknownFieldPolicy::Reject => Default::default(),
    };
    let chat_template_kwargs = if features.enable_thinking {
        extra_body.remove(CHAT_TEMPLATE_KWARGS);
        Some(ChatTemplateKwargs { thinking: true })
    } else {
        None
    };
    BackendRequest {
        model: resolved_model,
        messages: req.messages,
        temperature: req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stream: req.stream.unwrap_or(false),
        chat_template_kwargs,
        extra_body,
    }
}
