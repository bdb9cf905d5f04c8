//! Paragraph-boundary text chunker.
//!
//! Splits a document body into paragraph-scale chunks for fine-grained
//! retrieval. Splitting occurs on blank lines, never inside a fenced code
//! block, and adjacent paragraphs are merged until each chunk falls inside a
//! character window. Ordinals are implied by position and are contiguous
//! from zero.

/// Merge paragraphs until a chunk reaches at least this many characters.
pub const MIN_CHUNK_CHARS: usize = 200;
/// Never emit a chunk longer than this; oversized paragraphs are hard-split.
pub const MAX_CHUNK_CHARS: usize = 1500;

/// Split body text into ordered chunks.
///
/// A whitespace-only body yields no chunks; any other body yields at least one.
pub fn chunk_body(body: &str) -> Vec<String> {
    if body.trim().is_empty() {
        return Vec::new();
    }

    let paragraphs = split_paragraphs(body);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in &paragraphs {
        let would_be = if current.is_empty() {
            para.len()
        } else {
            current.len() + 2 + para.len() // +2 for the \n\n separator
        };

        if would_be > MAX_CHUNK_CHARS && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if para.len() > MAX_CHUNK_CHARS {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            hard_split(para, &mut chunks);
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);

        if current.len() >= MIN_CHUNK_CHARS {
            chunks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    if chunks.is_empty() {
        chunks.push(body.trim().to_string());
    }

    chunks
}

/// Split on blank lines, keeping fenced code blocks intact.
fn split_paragraphs(body: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if line.trim().is_empty() && !in_fence {
            if !current.trim().is_empty() {
                paragraphs.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    paragraphs
}

/// Hard-split an oversized paragraph at char boundaries, preferring a
/// newline or space near the limit.
fn hard_split(para: &str, chunks: &mut Vec<String>) {
    let mut remaining = para;
    while !remaining.is_empty() {
        if remaining.len() <= MAX_CHUNK_CHARS {
            chunks.push(remaining.trim().to_string());
            break;
        }

        let mut split_at = floor_char_boundary(remaining, MAX_CHUNK_CHARS);
        if let Some(pos) = remaining[..split_at]
            .rfind('\n')
            .or_else(|| remaining[..split_at].rfind(' '))
        {
            if pos > 0 {
                split_at = pos + 1;
            }
        }

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
