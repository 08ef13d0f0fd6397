//! Context budget guard: character-ratio token estimates and deterministic
//! truncation of the initial content.

use crate::constants::{
    DEFAULT_CHARS_PER_TOKEN, DEFAULT_CONTEXT_LIMIT, DEFAULT_INNER_MARGIN, DEFAULT_OUTER_MARGIN,
    TRUNCATION_MARKER,
};
use crate::domain::{ContentBlock, ToolDefinition, Turn};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Context window size in tokens.
    pub limit: usize,
    /// Headroom kept free before the first call.
    pub outer_margin: usize,
    /// Headroom kept free before every later call; crossing it forces finalization.
    pub inner_margin: usize,
    pub chars_per_token: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CONTEXT_LIMIT,
            outer_margin: DEFAULT_OUTER_MARGIN,
            inner_margin: DEFAULT_INNER_MARGIN,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

/// Result of [`ContextBudget::truncate_initial`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub content: String,
    pub truncated: bool,
}

impl ContextBudget {
    pub fn validate(&self) -> Result<(), String> {
        if self.chars_per_token == 0 {
            return Err("chars_per_token must be greater than zero".into());
        }
        if self.outer_margin >= self.limit {
            return Err(format!(
                "outer_margin ({}) must be below context_limit ({})",
                self.outer_margin, self.limit
            ));
        }
        if self.inner_margin >= self.limit {
            return Err(format!(
                "inner_margin ({}) must be below context_limit ({})",
                self.inner_margin, self.limit
            ));
        }
        Ok(())
    }

    fn ratio(&self) -> usize {
        self.chars_per_token.max(1)
    }

    pub fn tokens_for_chars(&self, chars: usize) -> usize {
        chars / self.ratio()
    }

    /// Estimated tokens for a request. Declared tool schemas count too.
    pub fn estimate(&self, system: &str, turns: &[Turn], tools: &[ToolDefinition]) -> usize {
        self.tokens_for_chars(context_chars(system, turns, tools))
    }

    pub fn outer_threshold(&self) -> usize {
        self.limit.saturating_sub(self.outer_margin)
    }

    pub fn inner_threshold(&self) -> usize {
        self.limit.saturating_sub(self.inner_margin)
    }

    /// Checkpoint before a follow-up call. History is never truncated; the
    /// caller finalizes instead.
    pub fn exceeds_inner(&self, system: &str, turns: &[Turn], tools: &[ToolDefinition]) -> bool {
        let estimate = self.estimate(system, turns, tools);
        let exceeded = estimate > self.inner_threshold();
        if exceeded {
            warn!(
                estimate,
                threshold = self.inner_threshold(),
                "Conversation is close to the context limit"
            );
        }
        exceeded
    }

    /// Checkpoint before the first call: shrink `content` so that `system`,
    /// `history`, the content, its `attachments` and `tools` fit under
    /// `limit - outer_margin`. Attachments are never cut.
    ///
    /// Content that already fits is returned unchanged, so applying this to
    /// its own output is a no-op.
    pub fn truncate_initial(
        &self,
        system: &str,
        history: &[Turn],
        content: &str,
        attachments: &[ContentBlock],
        tools: &[ToolDefinition],
    ) -> Truncation {
        let fixed_chars = context_chars(system, history, tools)
            + attachments.iter().map(ContentBlock::char_len).sum::<usize>();
        let content_chars = content.chars().count();
        let threshold = self.outer_threshold();
        let estimate = self.tokens_for_chars(fixed_chars + content_chars);

        if estimate <= threshold {
            return Truncation {
                content: content.to_string(),
                truncated: false,
            };
        }

        let headroom_tokens = threshold.saturating_sub(self.tokens_for_chars(fixed_chars));
        let marker_chars = TRUNCATION_MARKER.chars().count();
        let keep = (headroom_tokens * self.ratio()).saturating_sub(marker_chars);

        let mut truncated: String = content.chars().take(keep).collect();
        truncated.push_str(TRUNCATION_MARKER);

        debug!(
            estimate,
            threshold,
            original_chars = content_chars,
            kept_chars = keep,
            "Truncated initial content to fit the context window"
        );

        Truncation {
            content: truncated,
            truncated: true,
        }
    }
}

fn context_chars(system: &str, turns: &[Turn], tools: &[ToolDefinition]) -> usize {
    system.chars().count()
        + turns.iter().map(Turn::char_len).sum::<usize>()
        + tools.iter().map(ToolDefinition::char_len).sum::<usize>()
}
