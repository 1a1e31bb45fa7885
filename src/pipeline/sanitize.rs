//! Sanitizer: make raw OCR text safe to embed in a JSON-bound prompt.
//!
//! OCR output frequently contains stray backslashes (scanned file paths,
//! LaTeX fragments, table borders). When the LLM echoes that text back
//! inside a JSON string, a lone `\` followed by an arbitrary character is an
//! invalid escape and the whole structured response fails to parse.
//!
//! Two passes, in this order:
//!
//! 1. Drop every backslash not immediately followed by a JSON escape
//!    introducer (`\ " / b f n r t u`), repeated until nothing changes.
//!    Removing one backslash can expose another (`\\\x` → `\\x`), so a single
//!    pass would not be idempotent.
//! 2. Replace literal LF/CR with the two-character sequences `\n` / `\r`.

/// Characters that may legally follow a backslash.
const VALID_ESCAPES: [char; 9] = ['\\', '"', '/', 'b', 'f', 'n', 'r', 't', 'u'];

/// Sanitize raw OCR text before it is rendered into the notes prompt.
///
/// Pure and total: never fails, and `sanitize(sanitize(s)) == sanitize(s)`.
pub fn sanitize(text: &str) -> String {
    let mut current = strip_invalid_backslashes(text);
    loop {
        let next = strip_invalid_backslashes(&current);
        if next.len() == current.len() {
            break;
        }
        current = next;
    }
    escape_line_breaks(&current)
}

/// One left-to-right pass. Each backslash is judged by the character that
/// follows it in the input, so `\\` keeps both characters.
fn strip_invalid_backslashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(next) if VALID_ESCAPES.contains(next) => out.push(c),
                _ => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_line_breaks(input: &str) -> String {
    input.replace('\n', "\\n").replace('\r', "\\r")
}
