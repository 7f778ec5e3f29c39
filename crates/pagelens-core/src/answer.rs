//! Extraction of the generated answer from raw model output.
//!
//! Vision-language models commonly return the full token sequence,
//! prompt included. The caller only ever sees what the model added.

use crate::models::GeneratedSequence;

/// Return the newly generated continuation of `sequence`.
///
/// Drops the first `prompt_len` pieces. Only when the model reports no
/// prompt length but marks its output as echoing the prompt is a literal
/// copy of `prompt` stripped from the front. Surrounding whitespace is
/// trimmed.
pub fn continuation(sequence: &GeneratedSequence, prompt: &str) -> String {
    let start = sequence.prompt_len.min(sequence.tokens.len());
    let decoded: String = sequence.tokens[start..].concat();

    let text = decoded.trim_start();
    let prompt = prompt.trim();
    let text = if sequence.prompt_len == 0 && sequence.echoes_prompt && !prompt.is_empty() {
        text.strip_prefix(prompt).unwrap_or(text)
    } else {
        text
    };
    text.trim().to_string()
}
