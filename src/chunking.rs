//! Paragraph-first text chunker for extracted content.
//!
//! Three-tier splitting strategy:
//! 1. Split at blank lines and merge paragraphs up to the character budget
//! 2. If a paragraph is still too large, split it at sentence ends
//! 3. Last resort: split an oversize sentence at a char boundary

/// Split `text` into chunks of at most `budget` characters (trimmed).
pub fn chunk_text(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in split_paragraphs(text) {
        if paragraph.chars().count() > budget {
            flush(&mut current, &mut chunks);
            split_large_paragraph(&paragraph, budget, &mut chunks);
            continue;
        }

        let needed = if current.is_empty() {
            paragraph.chars().count()
        } else {
            current.chars().count() + 2 + paragraph.chars().count()
        };
        if needed > budget {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&paragraph);
    }

    flush(&mut current, &mut chunks);
    chunks
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Split text after `.`, `!` or `?` followed by whitespace, keeping the terminator.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_i, next_c)) = chars.peek() {
            if next_c.is_whitespace() {
                let sentence = text[start..next_i].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next_i;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn split_large_paragraph(paragraph: &str, budget: usize, chunks: &mut Vec<String>) {
    let mut current = String::new();

    for sentence in split_sentences(paragraph) {
        let len = sentence.chars().count();
        if len > budget {
            flush(&mut current, chunks);
            split_at_char_budget(sentence, budget, chunks);
            continue;
        }
        let needed = if current.is_empty() {
            len
        } else {
            current.chars().count() + 1 + len
        };
        if needed > budget {
            flush(&mut current, chunks);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    flush(&mut current, chunks);
}

fn split_at_char_budget(text: &str, budget: usize, chunks: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    for piece in chars.chunks(budget) {
        let s: String = piece.iter().collect();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
    }
}
