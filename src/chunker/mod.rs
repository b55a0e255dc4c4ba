//! Deterministic document chunking
//!
//! Splits a document into segments sized for the embedding model, breaking
//! at paragraph, heading, and code-fence boundaries before resorting to
//! line or hard splits. The same text and config always produce the same
//! boundaries and hashes; the embedding cache depends on that.

use crate::config::ChunkingConfig;
use crate::source::hash_content;
use regex::Regex;
use std::sync::OnceLock;

/// A bounded segment of a document, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic identity: `{path}#{start}-{end}`
    pub id: String,
    /// Path of the owning document
    pub document_path: String,
    /// Start offset in characters into the normalized document
    pub start_offset: usize,
    /// End offset (exclusive)
    pub end_offset: usize,
    /// The chunk text
    pub text: String,
    /// Digest of the normalized chunk text; cache and dedup key
    pub content_hash: String,
}

/// Block kinds recognized while scanning a document
#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    Paragraph,
    Heading,
    CodeFence,
}

/// A contiguous char range of the document that should not be split
/// mid-way when avoidable
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    end: usize,
    kind: BlockKind,
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#{1,6}\s").expect("static regex"))
}

/// Deterministic splitter configured with a target size and overlap
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split a document into chunks
    ///
    /// Pure function of (text, config): no clock, no randomness, no
    /// external state. Returns an empty vec for blank documents.
    pub fn chunk(&self, document_path: &str, text: &str) -> Vec<Chunk> {
        let normalized = text.replace("\r\n", "\n");
        if normalized.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = normalized.chars().collect();
        let blocks = split_oversized(parse_blocks(&chars), &chars, self.config.chunk_size);

        let mut chunks = Vec::new();
        let mut current_start: Option<usize> = None;
        let mut current_end = 0usize;

        for block in &blocks {
            match current_start {
                None => {
                    let start = self.overlapped_start(&chunks, block.start);
                    current_start = Some(start);
                    current_end = block.end;
                }
                Some(start) => {
                    if block.end - start <= self.config.chunk_size {
                        current_end = block.end;
                    } else {
                        push_chunk(&mut chunks, document_path, &chars, start, current_end);
                        let next_start = self.overlapped_start(&chunks, block.start);
                        current_start = Some(next_start);
                        current_end = block.end;
                    }
                }
            }
        }

        if let Some(start) = current_start {
            push_chunk(&mut chunks, document_path, &chars, start, current_end);
        }

        self.merge_short_tail(&mut chunks, document_path, &chars);

        chunks
    }

    /// Where the next chunk starts, pulled back by the configured overlap
    fn overlapped_start(&self, chunks: &[Chunk], block_start: usize) -> usize {
        let Some(prev) = chunks.last() else {
            return block_start;
        };
        if self.config.chunk_overlap == 0 {
            return block_start;
        }

        let pulled = prev.end_offset.saturating_sub(self.config.chunk_overlap);
        pulled.clamp(prev.start_offset + 1, block_start)
    }

    /// Fold a trailing fragment shorter than `min_chunk_chars` into its
    /// predecessor so retrieval never surfaces a dangling half-sentence
    fn merge_short_tail(&self, chunks: &mut Vec<Chunk>, document_path: &str, chars: &[char]) {
        if chunks.len() < 2 {
            return;
        }

        let last = chunks.last().expect("len checked");
        if last.text.trim().chars().count() >= self.config.min_chunk_chars {
            return;
        }

        let tail_end = last.end_offset;
        chunks.pop();
        let prev = chunks.pop().expect("len checked");
        push_chunk(chunks, document_path, chars, prev.start_offset, tail_end);
    }
}

fn push_chunk(
    chunks: &mut Vec<Chunk>,
    document_path: &str,
    chars: &[char],
    start: usize,
    end: usize,
) {
    debug_assert!(start < end);
    let text: String = chars[start..end].iter().collect();

    chunks.push(Chunk {
        id: format!("{}#{}-{}", document_path, start, end),
        document_path: document_path.to_string(),
        start_offset: start,
        end_offset: end,
        content_hash: hash_content(normalize_for_hash(&text).as_bytes()),
        text,
    });
}

/// Hash-normalization: right-trimmed lines, LF-joined
///
/// Trailing whitespace edits must not invalidate cached embeddings.
fn normalize_for_hash(text: &str) -> String {
    text.lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scan the document into paragraph, heading, and fenced-code blocks
fn parse_blocks(chars: &[char]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph_start: Option<usize> = None;

    let mut offset = 0;
    let lines = line_spans(chars);

    let mut i = 0;
    while i < lines.len() {
        let (line_start, line_end) = lines[i];
        let line: String = chars[line_start..line_end].iter().collect();
        let trimmed = line.trim();

        if let Some(fence) = fence_marker(trimmed) {
            // Close any open paragraph, then consume until the closing fence
            if let Some(start) = paragraph_start.take() {
                blocks.push(Block {
                    start,
                    end: line_start,
                    kind: BlockKind::Paragraph,
                });
            }

            let fence_start = line_start;
            let mut fence_end = line_end;
            i += 1;
            while i < lines.len() {
                let (s, e) = lines[i];
                let inner: String = chars[s..e].iter().collect();
                fence_end = e;
                i += 1;
                if inner.trim().starts_with(fence) {
                    break;
                }
            }
            blocks.push(Block {
                start: fence_start,
                end: fence_end,
                kind: BlockKind::CodeFence,
            });
            continue;
        }

        if trimmed.is_empty() {
            if let Some(start) = paragraph_start.take() {
                blocks.push(Block {
                    start,
                    end: line_start,
                    kind: BlockKind::Paragraph,
                });
            }
        } else if heading_regex().is_match(trimmed) {
            if let Some(start) = paragraph_start.take() {
                blocks.push(Block {
                    start,
                    end: line_start,
                    kind: BlockKind::Paragraph,
                });
            }
            blocks.push(Block {
                start: line_start,
                end: line_end,
                kind: BlockKind::Heading,
            });
        } else if paragraph_start.is_none() {
            paragraph_start = Some(line_start);
        }

        offset = line_end;
        i += 1;
    }

    if let Some(start) = paragraph_start {
        blocks.push(Block {
            start,
            end: chars.len().max(offset),
            kind: BlockKind::Paragraph,
        });
    }

    // Trim trailing separator whitespace off block ends
    for block in &mut blocks {
        while block.end > block.start + 1 && chars[block.end - 1] == '\n' {
            block.end -= 1;
        }
    }

    blocks
}

/// (start, end) char spans of each line, end exclusive of the newline
fn line_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    for (i, c) in chars.iter().enumerate() {
        if *c == '\n' {
            spans.push((start, i));
            start = i + 1;
        }
    }
    if start < chars.len() {
        spans.push((start, chars.len()));
    }

    spans
}

fn fence_marker(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// Split blocks that exceed the chunk size at line boundaries, then hard
/// splits for single over-long lines (unavoidable)
fn split_oversized(blocks: Vec<Block>, chars: &[char], chunk_size: usize) -> Vec<Block> {
    let mut out = Vec::new();

    for block in blocks {
        if block.end - block.start <= chunk_size {
            out.push(block);
            continue;
        }

        if block.kind == BlockKind::CodeFence {
            tracing::debug!(
                "Code fence of {} chars exceeds chunk size {}; splitting",
                block.end - block.start,
                chunk_size
            );
        }

        let mut piece_start = block.start;
        let lines: Vec<(usize, usize)> = line_spans(&chars[block.start..block.end])
            .into_iter()
            .map(|(s, e)| (s + block.start, e + block.start))
            .collect();

        for (line_start, line_end) in lines {
            if line_end - piece_start > chunk_size && line_start > piece_start {
                out.push(Block {
                    start: piece_start,
                    end: line_start,
                    kind: block.kind,
                });
                piece_start = line_start;
            }

            // A single line longer than the chunk size gets hard-split
            while line_end - piece_start > chunk_size {
                out.push(Block {
                    start: piece_start,
                    end: piece_start + chunk_size,
                    kind: block.kind,
                });
                piece_start += chunk_size;
            }
        }

        if piece_start < block.end {
            out.push(Block {
                start: piece_start,
                end: block.end,
                kind: block.kind,
            });
        }
    }

    // Re-trim: line spans exclude newlines, hard splits may not
    for block in &mut out {
        while block.end > block.start + 1 && chars[block.end - 1] == '\n' {
            block.end -= 1;
        }
    }

    out
}
