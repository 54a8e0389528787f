use std::cmp::Ordering;
use regex::Regex;

lazy_static::lazy_static! {
    static ref BLOCK_BREAK: Regex =
        Regex::new(r"(?i)</(?:p|h[1-6]|table|section|ul|ol|div|blockquote|pre)\s*>").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)</(?:li|tr|caption)\s*>|<br\s*/?>").unwrap();
    static ref INLINE_TAG: Regex =
        Regex::new(r"(?i)</?(?:b|i|u|em|strong|span|a|sub|sup|mark|small|code)(?:\s[^>]*)?>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
    static ref EXCESS_BLANK_LINES: Regex = Regex::new(r"\n{3,}").unwrap();
}

/// Escape text for inclusion in an HTML fragment.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Resolve the body of an XML/HTML entity reference (`amp`, `#38`, `#x26`).
pub fn resolve_entity(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

/// Replace entity references; unknown ones are left untouched.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| match resolve_entity(&caps[1]) {
            Some(ch) => ch.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Reduce an HTML fragment to its text-only form.
///
/// Block elements end in a blank line and cells are separated by spaces, so
/// tokenizing the result yields the same words as a hand-stripped copy.
pub fn html_to_text(html: &str) -> String {
    let text = BLOCK_BREAK.replace_all(html, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = INLINE_TAG.replace_all(&text, "");
    let text = ANY_TAG.replace_all(&text, " ");
    let text = decode_entities(&text);

    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    let joined = lines.join("\n");
    EXCESS_BLANK_LINES
        .replace_all(joined.trim(), "\n\n")
        .into_owned()
}

/// Order strings so embedded numbers compare by value: `slide2` < `slide10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_num = take_digits(&mut left);
                let r_num = take_digits(&mut right);
                let l_trim = l_num.trim_start_matches('0');
                let r_trim = r_num.trim_start_matches('0');
                let ord = l_trim
                    .len()
                    .cmp(&r_trim.len())
                    .then_with(|| l_trim.cmp(r_trim))
                    .then_with(|| l_num.len().cmp(&r_num.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(ch) = chars.peek().copied() {
        if !ch.is_ascii_digit() {
            break;
        }
        digits.push(ch);
        chars.next();
    }
    digits
}

/// First run of ASCII digits in `text`, if any.
pub fn first_number(text: &str) -> Option<usize> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Human readable size, e.g. `12.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["bytes", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Break text at word boundaries for better readability
pub fn break_at_word_boundary(text: &str, max_chars: usize) -> &str {
    if text.chars().count() <= max_chars {
        return text;
    }

    // First, truncate to max_chars
    let mut truncated_end = 0;
    for (char_count, (byte_idx, _)) in text.char_indices().enumerate() {
        if char_count >= max_chars {
            truncated_end = byte_idx;
            break;
        }
    }

    if truncated_end == 0 {
        return text;
    }

    let truncated_text = &text[..truncated_end];

    // Now try to find a word boundary within the truncated text
    if let Some(last_space_pos) = truncated_text.rfind(char::is_whitespace) {
        let word_boundary_chunk = &truncated_text[..last_space_pos];
        // Only accept the boundary if it keeps a meaningful share of the text
        let min_progress = std::cmp::max(max_chars / 10, 10);
        if word_boundary_chunk.chars().count() >= min_progress {
            return word_boundary_chunk;
        }
    }

    truncated_text
}

/// Cap `text` at `max_chars`, recording a warning when something was cut.
pub fn cap_text(text: String, max_chars: usize, warnings: &mut Vec<String>) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let kept = break_at_word_boundary(&text, max_chars).to_string();
    warnings.push(format!(
        "Content truncated to {} of {} characters",
        kept.chars().count(),
        text.chars().count()
    ));
    kept
}
