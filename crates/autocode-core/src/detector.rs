//! Idle detection over captured pane text.
//!
//! The driven CLI emits no structured "done" signal, so whether it is waiting
//! for input is guessed from the last line on screen. This misfires whenever
//! output legitimately ends a line with a prompt glyph, and misses prompts
//! drawn with anything else. Callers bound the damage with retry ceilings.

/// Decides whether the driven tool is waiting for fresh input.
pub trait CompletionDetector: Send + Sync {
    fn is_idle(&self, pane: &str) -> bool;
}

/// Glyphs that end an interactive prompt line.
const PROMPT_GLYPHS: [char; 3] = ['>', '\u{276F}', '$'];

/// Treats the pane as idle when its last non-empty line ends with a prompt
/// glyph (`>`, `❯` or `$`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptGlyphDetector;

impl CompletionDetector for PromptGlyphDetector {
    fn is_idle(&self, pane: &str) -> bool {
        ends_with_prompt(pane)
    }
}

pub fn ends_with_prompt(pane: &str) -> bool {
    pane.lines()
        .map(str::trim_end)
        .rfind(|line| !line.is_empty())
        .and_then(|line| line.chars().last())
        .is_some_and(|c| PROMPT_GLYPHS.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_glyphs_are_idle() {
        assert!(ends_with_prompt("some output\n> "));
        assert!(ends_with_prompt("Welcome\n\u{276F}"));
        assert!(ends_with_prompt("user@host:~/proj$"));
    }

    #[test]
    fn test_trailing_blank_lines_are_skipped() {
        assert!(ends_with_prompt("done\n>\n\n   \n"));
    }

    #[test]
    fn test_busy_output() {
        assert!(!ends_with_prompt("Thinking..."));
        assert!(!ends_with_prompt("> quoted\nstill working"));
        assert!(!ends_with_prompt(""));
        assert!(!ends_with_prompt("\n\n"));
    }

    #[test]
    fn test_known_false_positive() {
        // Output that happens to end in a glyph reads as idle.
        assert!(PromptGlyphDetector.is_idle("cost is 5$"));
    }
}
