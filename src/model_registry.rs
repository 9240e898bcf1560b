use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

pub const LARGE_BACKEND_MODEL: &str = "meta/llama-3.1-405b-instruct";
pub const MID_BACKEND_MODEL: &str = "meta/llama-3.1-70b-instruct";
pub const SMALL_BACKEND_MODEL: &str = "meta/llama-3.1-8b-instruct";

const MODEL_TABLE: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "meta/llama-3.1-8b-instruct"),
    ("gpt-4", "meta/llama-3.1-405b-instruct"),
    ("gpt-4-turbo", "moonshotai/kimi-k2-instruct"),
    ("gpt-4o", "z-ai/glm5"),
    ("gpt-4o-mini", "meta/llama-3.1-8b-instruct"),
    ("claude-3-opus", "deepseek-ai/deepseek-r1"),
    ("claude-3-sonnet", "openai/gpt-oss-120b"),
    ("gemini-pro", "qwen/qwen3-next-80b-a3b-thinking"),
];

// Ordered; first match wins.
static KEYWORD_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"gpt-4|opus|405b", LARGE_BACKEND_MODEL),
        (r"claude|gemini|70b", MID_BACKEND_MODEL),
    ]
    .into_iter()
    .filter_map(|(pattern, model)| Regex::new(pattern).ok().map(|re| (re, model)))
    .collect()
});

/// Maps caller-facing model names onto backend model ids.
///
/// Exact table entries win; anything else goes through the keyword rules and
/// lands on the small model when nothing matches, so resolution never fails.
#[derive(Clone)]
pub struct ModelRegistry {
    table: Arc<BTreeMap<String, String>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let table = MODEL_TABLE
            .iter()
            .map(|(caller, backend)| (caller.to_string(), backend.to_string()))
            .collect();
        Self {
            table: Arc::new(table),
        }
    }

    pub fn resolve(&self, name: &str) -> String {
        if let Some(backend) = self.table.get(name) {
            return backend.clone();
        }
        let lowered = name.to_lowercase();
        KEYWORD_RULES
            .iter()
            .find(|(re, _)| re.is_match(&lowered))
            .map(|(_, model)| *model)
            .unwrap_or(SMALL_BACKEND_MODEL)
            .to_string()
    }

    /// Caller-facing ids, sorted.
    pub fn list_models(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_entry_beats_keyword_rule() {
        let registry = ModelRegistry::new();
        // "gpt-4o" also matches the large-model keyword.
        assert_eq!(registry.resolve("gpt-4o"), "z-ai/glm5");
        assert_eq!(registry.resolve("gpt-4o-mini"), SMALL_BACKEND_MODEL);
    }

    #[test]
    fn keyword_fallback_is_case_insensitive_and_ordered() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.resolve("GPT-4-32k"), LARGE_BACKEND_MODEL);
        assert_eq!(registry.resolve("claude-opus-next"), LARGE_BACKEND_MODEL);
        assert_eq!(registry.resolve("Claude-Instant"), MID_BACKEND_MODEL);
        assert_eq!(registry.resolve("my-70b-finetune"), MID_BACKEND_MODEL);
        assert_eq!(registry.resolve("llama-405B"), LARGE_BACKEND_MODEL);
    }

    #[test]
    fn unknown_names_resolve_to_small_model() {
        let registry = ModelRegistry::new();
        assert_eq!(registry.resolve(""), SMALL_BACKEND_MODEL);
        assert_eq!(registry.resolve("text-davinci-003"), SMALL_BACKEND_MODEL);
    }

    #[test]
    fn resolution_is_deterministic() {
        let registry = ModelRegistry::new();
        for name in ["gpt-4o", "gemini-1.5", "whatever"] {
            assert_eq!(registry.resolve(name), registry.resolve(name));
        }
    }

    #[test]
    fn list_models_is_sorted_table_keys() {
        let models = ModelRegistry::new().list_models();
        assert_eq!(models.len(), MODEL_TABLE.len());
        let mut sorted = models.clone();
        sorted.sort();
        assert_eq!(models, sorted);
        assert!(models.contains(&"gpt-4o".to_string()));
    }
}
