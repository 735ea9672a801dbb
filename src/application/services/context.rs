use std::collections::HashMap;

use crate::domain::{
    ConversationState, ConversationTurn, PromptTemplate, RetrievalResult, ScoredChunk, SourceRef,
};

const NO_HISTORY: &str = "No previous conversation";
const SOURCE_SEPARATOR: &str = "\n---\n";

/// Everything the generator needs for one question.
#[derive(Debug, Clone)]
pub struct PromptPayload {
    pub question: String,
    /// Rendered system template.
    pub system: String,
    pub context: String,
    pub chat_history: String,
    /// Hits that made it into `context`, best first.
    pub included: Vec<ScoredChunk>,
    /// Best score of the full retrieval, before any truncation.
    pub top_score: Option<f32>,
    pub dropped_chunks: usize,
    pub clipped: bool,
}

impl PromptPayload {
    pub fn sources(&self) -> Vec<SourceRef> {
        self.included.iter().map(SourceRef::from).collect()
    }

    pub fn truncated(&self) -> bool {
        self.dropped_chunks > 0 || self.clipped
    }
}

/// Merges retrieved chunks and recent history into a bounded prompt.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system: PromptTemplate,
    char_budget: usize,
    history_message_chars: usize,
}

impl ContextAssembler {
    pub fn new(system: PromptTemplate, char_budget: usize, history_message_chars: usize) -> Self {
        Self {
            system,
            char_budget,
            history_message_chars,
        }
    }

    pub fn assemble(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        conversation: &ConversationState,
        max_turns: usize,
    ) -> PromptPayload {
        let (context, included, dropped_chunks, clipped) = self.build_context(retrieval.hits());
        let chat_history = self.format_history(conversation.history(max_turns));

        if dropped_chunks > 0 || clipped {
            tracing::info!(
                budget = self.char_budget,
                dropped_chunks,
                clipped,
                "context truncated to fit budget"
            );
        }

        let system = self.system.render(&HashMap::from([
            ("context", context.as_str()),
            ("chat_history", chat_history.as_str()),
            ("question", question),
        ]));

        PromptPayload {
            question: question.to_string(),
            system,
            context,
            chat_history,
            included,
            top_score: retrieval.top_score(),
            dropped_chunks,
            clipped,
        }
    }

    fn build_context(&self, hits: &[ScoredChunk]) -> (String, Vec<ScoredChunk>, usize, bool) {
        let blocks: Vec<String> = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| format_source(i + 1, hit))
            .collect();

        let separator_len = SOURCE_SEPARATOR.chars().count();
        let mut used = 0;
        let mut keep = 0;
        for block in &blocks {
            let extra = block.chars().count() + if keep > 0 { separator_len } else { 0 };
            if used + extra > self.char_budget {
                break;
            }
            used += extra;
            keep += 1;
        }

        if keep == 0 {
            return match blocks.first() {
                Some(top) => {
                    let clipped: String = top.chars().take(self.char_budget).collect();
                    (clipped, hits[..1].to_vec(), hits.len() - 1, true)
                }
                None => (String::new(), Vec::new(), 0, false),
            };
        }

        (
            blocks[..keep].join(SOURCE_SEPARATOR),
            hits[..keep].to_vec(),
            hits.len() - keep,
            false,
        )
    }

    fn format_history(&self, turns: &[ConversationTurn]) -> String {
        if turns.is_empty() {
            return NO_HISTORY.to_string();
        }

        turns
            .iter()
            .map(|turn| {
                format!(
                    "{}: {}",
                    turn.role.as_str(),
                    clip(&turn.text, self.history_message_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn format_source(n: usize, hit: &ScoredChunk) -> String {
    format!(
        "[Source {n}: {}]\nURL: {}\nContent: {}\n",
        hit.chunk.source_title, hit.chunk.source_url, hit.chunk.text
    )
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ConversationTurn};

    fn hit(id: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(
                id,
                text,
                format!("Title {id}"),
                format!("https://www.postgresql.org/docs/16/{id}.html"),
                0,
            ),
            score,
        }
    }

    fn assembler(budget: usize) -> ContextAssembler {
        let template = PromptTemplate::parse(
            "system",
            "CTX<{context}> HIST<{chat_history}> Q<{question}>",
            &["context", "chat_history"],
        )
        .unwrap();
        ContextAssembler::new(template, budget, 20)
    }

    #[test]
    fn test_sources_in_score_order_with_tags() {
        let retrieval = RetrievalResult::from_hits(vec![hit("b", "second", 0.5), hit("a", "first", 0.9)]);
        let payload = assembler(10_000).assemble("q", &retrieval, &ConversationState::new(), 6);

        assert_eq!(
            payload.context,
            "[Source 1: Title a]\nURL: https://www.postgresql.org/docs/16/a.html\nContent: first\n\
             \n---\n\
             [Source 2: Title b]\nURL: https://www.postgresql.org/docs/16/b.html\nContent: second\n"
        );
        assert_eq!(payload.sources()[0].title, "Title a");
        assert!(!payload.truncated());
        assert!(payload.system.starts_with("CTX<[Source 1"));
        assert!(payload.system.ends_with("HIST<No previous conversation> Q<q>"));
    }

    #[test]
    fn test_drops_lowest_scores_first() {
        let retrieval = RetrievalResult::from_hits(vec![
            hit("a", &"x".repeat(50), 0.9),
            hit("b", &"y".repeat(50), 0.8),
            hit("c", &"z".repeat(50), 0.7),
        ]);
        let one_block = format_source(1, &retrieval.hits()[0]).chars().count();
        let budget = one_block * 2 + SOURCE_SEPARATOR.len() + 5;

        let payload = assembler(budget).assemble("q", &retrieval, &ConversationState::new(), 6);
        assert_eq!(payload.included.len(), 2);
        assert_eq!(payload.dropped_chunks, 1);
        assert!(!payload.clipped);
        assert!(payload.context.chars().count() <= budget);
        assert!(!payload.context.contains("zzz"));
        assert_eq!(payload.top_score, Some(0.9));
    }

    #[test]
    fn test_oversized_top_chunk_is_clipped() {
        let retrieval = RetrievalResult::from_hits(vec![
            hit("a", &"x".repeat(500), 0.9),
            hit("b", "short", 0.1),
        ]);
        let payload = assembler(100).assemble("q", &retrieval, &ConversationState::new(), 6);
        assert!(payload.clipped);
        assert_eq!(payload.dropped_chunks, 1);
        assert_eq!(payload.context.chars().count(), 100);
        assert_eq!(payload.included.len(), 1);
    }

    #[test]
    fn test_history_is_bounded_and_clipped() {
        let mut state = ConversationState::new();
        state.append(ConversationTurn::user("first question"));
        state.append(ConversationTurn::assistant("first answer"));
        state.append(ConversationTurn::user("second question"));
        state.append(ConversationTurn::assistant("a very long answer that exceeds twenty characters"));

        let payload = assembler(1_000).assemble("q", &RetrievalResult::empty(), &state, 2);
        assert_eq!(
            payload.chat_history,
            "User: second question\nAssistant: a very long answer t..."
        );
        assert!(payload.context.is_empty());
        assert_eq!(payload.top_score, None);
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let retrieval = RetrievalResult::from_hits(vec![hit("a", "x", 0.9), hit("b", "y", 0.9)]);
        let state = ConversationState::new();
        let first = assembler(1_000).assemble("q", &retrieval, &state, 6);
        let second = assembler(1_000).assemble("q", &retrieval, &state, 6);
        assert_eq!(first.system, second.system);
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("héllo wörld", 4), "héll...");
        assert_eq!(clip("short", 10), "short");
    }
}
