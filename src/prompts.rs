// prompts.rs

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest excerpt (in characters) sent for translation.
pub const MAX_EXCERPT_CHARS: usize = 500;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<]+?>").unwrap());
static TITLE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"TITLE_CN:\s*(.+)").unwrap());
static EXCERPT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)EXCERPT_CN:\s*(.+)").unwrap());

/// Strips markup and bounds the excerpt before it goes into a prompt.
pub fn clean_excerpt(excerpt: &str) -> String {
    let stripped = HTML_TAG.replace_all(excerpt, "");
    let cleaned: String = stripped.chars().take(MAX_EXCERPT_CHARS).collect();
    if cleaned.is_empty() {
        "No description.".to_string()
    } else {
        cleaned
    }
}

pub fn translation_prompt(title: &str, clean_excerpt: &str) -> String {
    format!(
        "You are a professional translator for game art and game technology articles. Translate
the following article metadata from 80.lv into Simplified Chinese.

Requirements:
1. Keep game development terms (Mesh, Shader, UE5, Workflow and similar) in English or use the
industry-standard translation.
2. Keep the tone concise and professional.
3. Reply strictly in the format below, with nothing before or after it.

TITLE_CN: <translated title>
EXCERPT_CN: <translated excerpt>

Content to translate:
Title: {}
Excerpt: {}",
        title, clean_excerpt
    )
}

/// Extracts the translated title and excerpt from a model reply.
///
/// A missing title falls back to `title`; a missing excerpt falls back to the cleaned
/// excerpt that was sent.
pub fn parse_translation(response: &str, title: &str, clean_excerpt: &str) -> (String, String) {
    let new_title = TITLE_LINE
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| title.to_string());
    let new_excerpt = EXCERPT_BLOCK
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| clean_excerpt.to_string());
    (new_title, new_excerpt)
}
