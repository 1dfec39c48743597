//! Context fusion: merges retrieved chunks into the outgoing prompt.
//!
//! Layout of a fused prompt:
//! ```text
//! <context>
//! <chunk source="{source_id}">
//! {text}
//! </chunk>
//! ...
//! </context>
//!
//! <question>
//! {prompt}
//! </question>
//! ```
//! With no chunks accepted, the prompt is sent unchanged.

use switchyard_types::config::ContextConfig;
use switchyard_types::request::{AugmentedPrompt, ContextChunk};

/// Pure, deterministic prompt assembler.
#[derive(Debug, Clone)]
pub struct ContextFuser {
    context_window_size: u32,
    min_similarity_threshold: f32,
}

impl ContextFuser {
    pub fn new(context_window_size: u32, min_similarity_threshold: f32) -> Self {
        Self {
            context_window_size,
            min_similarity_threshold,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.context_window_size, config.min_similarity_threshold)
    }

    /// Fuse `chunks` into `prompt`.
    ///
    /// Chunks below the similarity floor are discarded. The rest are ordered
    /// by relevance (descending, ties by `source_id`) and the longest prefix
    /// whose summed `token_estimate` fits the window is kept. Selection stops
    /// at the first chunk that does not fit, so the kept set is always a
    /// prefix of the ranking.
    pub fn fuse(&self, prompt: &str, chunks: &[ContextChunk]) -> AugmentedPrompt {
        let mut eligible: Vec<&ContextChunk> = chunks
            .iter()
            .filter(|c| c.relevance_score >= self.min_similarity_threshold)
            .collect();
        eligible.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        let mut used_tokens: u64 = 0;
        let mut accepted: Vec<ContextChunk> = Vec::with_capacity(eligible.len());
        for chunk in &eligible {
            let next = used_tokens + u64::from(chunk.token_estimate);
            if next > u64::from(self.context_window_size) {
                break;
            }
            used_tokens = next;
            accepted.push((*chunk).clone());
        }
        let truncated = accepted.len() < eligible.len();

        if truncated {
            tracing::debug!(
                eligible = eligible.len(),
                accepted = accepted.len(),
                budget = self.context_window_size,
                "Context truncated to fit window"
            );
        }

        if accepted.is_empty() {
            return AugmentedPrompt {
                final_text: prompt.to_string(),
                chunks_used: accepted,
                truncated,
            };
        }

        let mut sections = Vec::with_capacity(accepted.len() + 2);
        sections.push("<context>".to_string());
        for chunk in &accepted {
            sections.push(format!(
                "<chunk source=\"{}\">\n{}\n</chunk>",
                chunk.source_id,
                chunk.text.trim()
            ));
        }
        sections.push(format!(
            "</context>\n\n<question>\n{}\n</question>",
            prompt.trim()
        ));

        AugmentedPrompt {
            final_text: sections.join("\n"),
            chunks_used: accepted,
            truncated,
        }
    }
}
