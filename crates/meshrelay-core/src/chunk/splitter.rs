//! Whitespace-aware reply splitting.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text is
//! never cut inside a code point.
//!
//! Rules:
//! 1. Greedy fill; break at the last whitespace at or before `max_len`.
//! 2. A single token longer than `max_len` is hard-cut.
//! 3. Whitespace at the seams is dropped.
//! 4. Past `max_chunks`, the last kept chunk ends with [`TRUNCATION_MARKER`].

/// Appended to the final chunk when text was cut off.
pub const TRUNCATION_MARKER: &str = "...";

/// Split `text` into at most `max_chunks` chunks of at most `max_len` chars.
///
/// Empty or whitespace-only text yields no chunks.
pub fn split(text: &str, max_len: usize, max_chunks: usize) -> Vec<String> {
    split_checked(text, max_len, max_chunks).0
}

/// Whether `text` survives [`split`] without truncation.
pub fn fits(text: &str, max_len: usize, max_chunks: usize) -> bool {
    !split_checked(text, max_len, max_chunks).1
}

/// Chunks plus whether anything was cut off.
fn split_checked(text: &str, max_len: usize, max_chunks: usize) -> (Vec<String>, bool) {
    let mut rest = text.trim();
    if rest.is_empty() {
        return (Vec::new(), false);
    }
    if max_len == 0 || max_chunks == 0 {
        return (Vec::new(), true);
    }

    let mut chunks = Vec::new();
    while !rest.is_empty() {
        if chunks.len() == max_chunks {
            if let Some(last) = chunks.last_mut() {
                mark_truncated(last, max_len);
            }
            return (chunks, true);
        }

        if rest.chars().count() <= max_len {
            chunks.push(rest.to_string());
            break;
        }

        // The char right after the window may itself be the break.
        let window = &rest[..byte_offset(rest, max_len + 1)];
        let (chunk, remainder) = match window.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => (&rest[..pos], &rest[pos..]),
            _ => rest.split_at(byte_offset(rest, max_len)),
        };
        chunks.push(chunk.trim_end().to_string());
        rest = remainder.trim_start();
    }

    (chunks, false)
}

/// Byte index of the `n`th char, or the string length if shorter.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

fn mark_truncated(chunk: &mut String, max_len: usize) {
    let marker: String = TRUNCATION_MARKER.chars().take(max_len).collect();
    let keep = max_len - marker.chars().count();
    let body: String = chunk.chars().take(keep).collect();
    *chunk = format!("{}{marker}", body.trim_end());
}
