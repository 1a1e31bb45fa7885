//! Prompts for LLM-based clinical note segmentation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing the default behaviour (e.g. adding
//!    a new domain label) requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can import and inspect prompts directly
//!    without calling a real LLM.
//!
//! Callers can override the template via
//! [`crate::config::NotesAgentConfig::prompt_template`]; the format
//! instructions are always appended so the response stays parseable.

/// Placeholder replaced with the sanitized OCR text.
pub const CLINICAL_TEXT_PLACEHOLDER: &str = "{clinical_text}";

/// Placeholder replaced with the template itself.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Default segmentation prompt, used when no template is configured.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are a clinical documentation specialist. The text below was extracted by OCR from a single uploaded document that may contain several independent clinical notes (reports, letters, discharge summaries, imaging results).

Follow these rules precisely:

1. SEGMENTATION
   - Split the text into the individual clinical notes it contains
   - Keep the ENTIRE text of each note; do not summarise or paraphrase
   - Preserve the original order of the notes

2. DOMAIN
   - Assign each note exactly one medical domain: Radiology, Urology, Gastroenterology, Orthopedic or Neurology

3. WHAT TO IGNORE
   - Page numbers, fax headers and repeated letterheads that carry no clinical content

Clinical text:
"""
{clinical_text}
""""#;

/// Structured-output instructions appended to every rendered prompt.
pub const FORMAT_INSTRUCTIONS: &str = r#"

Return ONLY a JSON object that conforms to this schema, with no commentary and no markdown fences:

{"type": "object", "properties": {"notes": {"type": "array", "items": {"type": "object", "properties": {"text": {"type": "string", "description": "The entire text of the segmented note"}, "domain": {"type": "string", "description": "The domain (Radiology, Urology, Gastroenterology, Orthopedic, Neurology)"}}, "required": ["text", "domain"]}}}, "required": ["notes"]}"#;

/// Render the full prompt for one document.
///
/// Single pass over `template`: substituted values are never scanned again,
/// so a `{query}` expansion keeps its own placeholders literal.
pub fn render_notes_prompt(template: &str, clinical_text: &str) -> String {
    let mut prompt = String::with_capacity(template.len() + clinical_text.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        prompt.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(CLINICAL_TEXT_PLACEHOLDER) {
            prompt.push_str(clinical_text);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(QUERY_PLACEHOLDER) {
            prompt.push_str(template);
            rest = after;
        } else {
            prompt.push('{');
            rest = &tail[1..];
        }
    }
    prompt.push_str(rest);
    prompt.push_str(FORMAT_INSTRUCTIONS);
    prompt
}
