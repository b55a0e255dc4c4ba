//! Context assembly for the chat layer
//!
//! Turns retrieval hits into a prompt context block with source
//! citations, bounded by the configured token budget. Token accounting
//! is approximate (4 characters per token), which is what the budget is
//! for: keeping retrieval output from crowding out the conversation.

use crate::store::QueryResult;

/// Characters assumed per token for budget accounting
const CHARS_PER_TOKEN: usize = 4;

/// Format query results into a citation-annotated context string
///
/// A zero budget skips retrieval context entirely. Results are consumed
/// in ranking order; a result that would overflow the remaining budget
/// ends assembly rather than being truncated mid-chunk.
pub fn build_context(results: &[QueryResult], threshold_tokens: usize) -> String {
    if threshold_tokens == 0 || results.is_empty() {
        return String::new();
    }

    let budget_chars = threshold_tokens.saturating_mul(CHARS_PER_TOKEN);
    let mut out = String::new();

    for result in results {
        let block = format!(
            "[source: {} ({:.2})]\n{}\n\n",
            result.chunk.document_path,
            result.similarity,
            result.chunk.text.trim()
        );

        if out.len() + block.len() > budget_chars {
            break;
        }
        out.push_str(&block);
    }

    out.trim_end().to_string()
}
