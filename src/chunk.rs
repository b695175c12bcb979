//! Recursive separator text splitter with overlap.
//!
//! Text is broken into pieces no longer than the chunk size, preferring
//! paragraph breaks, then line breaks, then spaces, and finally a hard cut
//! on character boundaries. Pieces are then merged greedily into chunks;
//! when a chunk is emitted, trailing pieces totalling at most `overlap` are
//! carried into the next one.
//!
//! Lengths are counted in characters. Token-sized specs are converted with
//! a fixed chars-per-token ratio.
//!
//! Each chunk receives a random UUID, its position within the source, and a
//! SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::{ChunkSpec, SizeUnit};
use crate::models::{Chunk, RawDocument};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// A piece of text and the separator that joins it to the piece before it.
struct Piece<'a> {
    text: &'a str,
    sep: &'static str,
}

/// Chunk size and overlap of `spec` in characters.
pub fn char_limits(spec: &ChunkSpec) -> (usize, usize) {
    match spec.unit {
        SizeUnit::Chars => (spec.chunk_size, spec.overlap),
        SizeUnit::Tokens => (
            spec.chunk_size * CHARS_PER_TOKEN,
            spec.overlap * CHARS_PER_TOKEN,
        ),
    }
}

/// Split `text` into ordered chunk texts. Blank input yields no chunks.
pub fn split_text(text: &str, spec: &ChunkSpec) -> Vec<String> {
    let (max_chars, overlap) = char_limits(spec);
    let max_chars = max_chars.max(1);

    let mut pieces = Vec::new();
    split_pieces(text, max_chars, &SEPARATORS, "\n\n", &mut pieces);
    merge_pieces(&pieces, max_chars, overlap)
}

/// Split every document and number the chunks per source, starting at 0.
///
/// Consecutive documents with the same source (the pages of one PDF) share
/// a single sequence; the counter resets when the source changes.
pub fn chunk_documents(docs: &[RawDocument], spec: &ChunkSpec) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Option<&str> = None;
    let mut next_index: i64 = 0;
    for doc in docs {
        if current != Some(doc.source.as_str()) {
            current = Some(doc.source.as_str());
            next_index = 0;
        }
        for text in split_text(&doc.text, spec) {
            chunks.push(make_chunk(doc, next_index, text));
            next_index += 1;
        }
    }
    chunks
}

fn split_pieces<'a>(
    text: &'a str,
    max_chars: usize,
    separators: &[&'static str],
    joiner: &'static str,
    out: &mut Vec<Piece<'a>>,
) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if char_len(trimmed) <= max_chars {
        out.push(Piece {
            text: trimmed,
            sep: joiner,
        });
        return;
    }

    match separators.split_first() {
        Some((sep, rest)) => {
            let mut first = true;
            for part in trimmed.split(sep) {
                if part.trim().is_empty() {
                    continue;
                }
                // The first piece of this block keeps the outer joiner.
                let j = if first { joiner } else { sep };
                first = false;
                split_pieces(part, max_chars, rest, j, out);
            }
        }
        None => {
            let mut start = 0;
            let mut count = 0;
            let mut first = true;
            for (idx, _) in trimmed.char_indices() {
                if count == max_chars {
                    out.push(Piece {
                        text: &trimmed[start..idx],
                        sep: if first { joiner } else { "" },
                    });
                    first = false;
                    start = idx;
                    count = 0;
                }
                count += 1;
            }
            out.push(Piece {
                text: &trimmed[start..],
                sep: if first { joiner } else { "" },
            });
        }
    }
}

fn merge_pieces(pieces: &[Piece<'_>], max_chars: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&Piece<'_>> = Vec::new();

    for piece in pieces {
        if !window.is_empty() && joined_len(&window, Some(piece)) > max_chars {
            chunks.push(join(&window));

            // Keep a tail no longer than `overlap` that still leaves room
            // for the incoming piece.
            while !window.is_empty()
                && (joined_len(&window, None) > overlap
                    || joined_len(&window, Some(piece)) > max_chars)
            {
                window.remove(0);
            }
        }
        window.push(piece);
    }

    if !window.is_empty() {
        chunks.push(join(&window));
    }
    chunks
}

fn joined_len(window: &[&Piece<'_>], next: Option<&Piece<'_>>) -> usize {
    let mut len = 0;
    for (i, p) in window.iter().chain(next.iter()).enumerate() {
        if i > 0 {
            len += char_len(p.sep);
        }
        len += char_len(p.text);
    }
    len
}

fn join(window: &[&Piece<'_>]) -> String {
    let mut out = String::new();
    for (i, p) in window.iter().enumerate() {
        if i > 0 {
            out.push_str(p.sep);
        }
        out.push_str(p.text);
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(doc: &RawDocument, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: doc.source.clone(),
        page: doc.page,
        chunk_index: index,
        text,
        hash,
    }
}
