//! Sliding-window text chunker.
//!
//! Splits file text into overlapping fixed-size windows. A window starts at
//! char offset 0 and each following window starts `size - overlap` chars
//! after the previous one, until the start reaches the end of the text. The
//! last window may be shorter than `size`.
//!
//! Offsets are counted in chars, so a window never splits a code point.
//! Chunking is pure: identical input always yields identical boundaries.

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Chunking parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Window length in chars.
    pub size: usize,
    /// Chars shared by consecutive windows. Must be `< size`.
    pub overlap: usize,
    /// Upper bound on stored chunk text.
    pub max_stored_chars: usize,
    /// Upper bound on the text sent to the embedding provider.
    pub max_embed_chars: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 50,
            max_stored_chars: 2000,
            max_embed_chars: 2000,
        }
    }
}

impl ChunkParams {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::config("chunk size must be > 0"));
        }
        if self.overlap >= self.size {
            return Err(Error::config(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

/// Split `text` into windows of `size` chars overlapping by `overlap`.
///
/// Returns `(start_offset, window_text)` pairs. Empty text yields no
/// windows; text shorter than `size` yields exactly one.
pub fn windows(text: &str, size: usize, overlap: usize) -> Result<Vec<(usize, String)>> {
    if size == 0 || overlap >= size {
        return Err(Error::config(format!(
            "chunk overlap ({}) must be less than chunk size ({})",
            overlap, size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        out.push((start, chars[start..end].iter().collect()));
        start += step;
    }

    Ok(out)
}

/// Chunk file text into [`Chunk`]s with contiguous indices starting at 0.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Result<Vec<Chunk>> {
    params.validate()?;

    let chunks = windows(text, params.size, params.overlap)?
        .into_iter()
        .enumerate()
        .map(|(i, (start, window))| Chunk {
            chunk_index: i as i64,
            start,
            embed_text: truncate_chars(&window, params.max_embed_chars),
            text: truncate_chars(&window, params.max_stored_chars),
        })
        .collect();

    Ok(chunks)
}

/// First `max` chars of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
