pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "\n</think>\n\n";

/// Wraps a complete reasoning block ahead of the answer text.
pub fn wrap_reasoning(reasoning: &str, content: &str) -> String {
    let mut out = String::with_capacity(
        THINK_OPEN.len() + reasoning.len() + THINK_CLOSE.len() + content.len(),
    );
    out.push_str(THINK_OPEN);
    out.push_str(reasoning);
    out.push_str(THINK_CLOSE);
    out.push_str(content);
    out
}

/// Tracks whether streamed output currently sits inside an open `<think>`
/// block.
///
/// Owned by exactly one stream. The block opens on the first surfaced
/// reasoning fragment and closes on the next non-empty content fragment.
#[derive(Debug, Default)]
pub struct ThinkSpan {
    in_reasoning: bool,
}

impl ThinkSpan {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.in_reasoning
    }

    /// Merges one delta's reasoning and content fragments into a single
    /// string, emitting markers at span transitions.
    pub fn merge(
        &mut self,
        reasoning: Option<&str>,
        content: Option<&str>,
        show_reasoning: bool,
    ) -> String {
        let mut out = String::new();
        if show_reasoning {
            if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
                if !self.in_reasoning {
                    out.push_str(THINK_OPEN);
                    self.in_reasoning = true;
                }
                out.push_str(reasoning);
            }
        }
        if let Some(content) = content.filter(|c| !c.is_empty()) {
            if self.in_reasoning {
                out.push_str(THINK_CLOSE);
                self.in_reasoning = false;
            }
            out.push_str(content);
        }
        out
    }

    /// Closes a still-open span, returning the marker to emit.
    pub fn close(&mut self) -> Option<&'static str> {
        if self.in_reasoning {
            self.in_reasoning = false;
            Some(THINK_CLOSE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_reasoning_places_markers_around_block() {
        assert_eq!(
            wrap_reasoning("plan", "answer"),
            "<think>\nplan\n</think>\n\nanswer"
        );
    }

    #[test]
    fn span_opens_once_and_closes_on_content() {
        let mut span = ThinkSpan::new();
        assert_eq!(span.merge(Some("a"), None, true), "<think>\na");
        assert!(span.is_open());
        assert_eq!(span.merge(Some("b"), None, true), "b");
        assert_eq!(span.merge(None, Some("c"), true), "\n</think>\n\nc");
        assert!(!span.is_open());
        assert_eq!(span.merge(None, Some("d"), true), "d");
    }

    #[test]
    fn reasoning_and_content_in_one_delta() {
        let mut span = ThinkSpan::new();
        assert_eq!(
            span.merge(Some("r"), Some("c"), true),
            "<think>\nr\n</think>\n\nc"
        );
        assert!(!span.is_open());
    }

    #[test]
    fn empty_fragments_do_not_toggle_span() {
        let mut span = ThinkSpan::new();
        assert_eq!(span.merge(Some(""), None, true), "");
        assert!(!span.is_open());
        span.merge(Some("r"), None, true);
        assert_eq!(span.merge(None, Some(""), true), "");
        assert!(span.is_open());
    }

    #[test]
    fn hidden_reasoning_never_emits_markers() {
        let mut span = ThinkSpan::new();
        assert_eq!(span.merge(Some("r"), None, false), "");
        assert_eq!(span.merge(None, Some("c"), false), "c");
        assert!(!span.is_open());
        assert_eq!(span.close(), None);
    }

    #[test]
    fn close_only_fires_while_open() {
        let mut span = ThinkSpan::new();
        span.merge(Some("r"), None, true);
        assert_eq!(span.close(), Some(THINK_CLOSE));
        assert_eq!(span.close(), None);
    }
}
