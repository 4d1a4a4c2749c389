//! Word wrapping for the pixel display

/// Wrap `text` into lines of at most `width` characters
///
/// Lines break at whitespace; a word longer than `width` is split into
/// `width`-sized chunks. Runs of whitespace collapse to a single break.
#[must_use]
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();

        if chars.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let mut chunks = chars.chunks(width).peekable();
            while let Some(chunk) = chunks.next() {
                let chunk: String = chunk.iter().collect();
                if chunks.peek().is_some() {
                    lines.push(chunk);
                } else {
                    // Tail of the split word may share a line with what follows
                    current_len = chunk.chars().count();
                    current = chunk;
                }
            }
            continue;
        }

        let needed = if current.is_empty() {
            chars.len()
        } else {
            current_len + 1 + chars.len()
        };

        if needed > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += chars.len();
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}
