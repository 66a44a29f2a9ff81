//! Reference location: find where the rendered text talks about an image.
//!
//! Extraction bundles name figures inconsistently: the Markdown may embed
//! `![](images/fig3.png)`, mention `Figure 3` in prose, or only carry a
//! hash-like file name. [`SubstringLocator`] tries a small set of
//! case-folded keys derived from the file name and takes the first line
//! that contains any of them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One numbered line of a [`ContextWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    /// 1-based line number in the rendered text.
    pub number: usize,
    pub text: String,
}

/// Lines surrounding the first reference to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// 1-based line number of the matching line.
    pub match_line: usize,
    pub lines: Vec<ContextLine>,
}

impl ContextWindow {
    /// `"<n>. <line>"` per line, joined with `\n`.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|l| format!("{}. {}", l.number, l.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Strategy for finding an image's textual reference.
pub trait ReferenceLocator: Send + Sync {
    /// Return the window around the reference to `image_name` in `text`, or
    /// `None` when the text never mentions it.
    fn locate(&self, image_name: &str, text: &str, context_lines: usize) -> Option<ContextWindow>;
}

/// Default locator: case-insensitive substring keys, first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringLocator;

/// `fig3`, `figure_3`, `Fig-12` → the figure number.
static RE_FIGURE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^fig(?:ure)?[\s._-]*(\d+)$").unwrap());

impl SubstringLocator {
    fn keys(image_name: &str) -> Vec<String> {
        let name = image_name.to_lowercase();
        let stem = Path::new(&name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string();

        let mut keys = vec![stem.clone(), name.clone()];
        if !stem.is_empty() {
            keys.push(format!("![{stem}"));
            keys.push(format!("figure {stem}"));
            keys.push(format!("fig. {stem}"));
            keys.push(format!("fig{stem}"));
        }
        keys.retain(|k| !k.is_empty());
        keys
    }

    fn figure_number_pattern(image_name: &str) -> Option<Regex> {
        let stem = Path::new(image_name).file_stem()?.to_str()?;
        let number = RE_FIGURE_LABEL.captures(stem)?.get(1)?.as_str();
        Regex::new(&format!(r"\bfig(?:ure)?\.?\s*{number}\b")).ok()
    }
}

impl ReferenceLocator for SubstringLocator {
    fn locate(&self, image_name: &str, text: &str, context_lines: usize) -> Option<ContextWindow> {
        let keys = Self::keys(image_name);
        let figure = Self::figure_number_pattern(image_name);
        let lines: Vec<&str> = text.lines().collect();

        let hit = lines.iter().position(|line| {
            let folded = line.to_lowercase();
            keys.iter().any(|k| folded.contains(k.as_str()))
                || figure.as_ref().is_some_and(|re| re.is_match(&folded))
        })?;

        let start = hit.saturating_sub(context_lines);
        let end = hit.saturating_add(context_lines).min(lines.len() - 1);
        Some(ContextWindow {
            match_line: hit + 1,
            lines: (start..=end)
                .map(|i| ContextLine {
                    number: i + 1,
                    text: lines[i].to_string(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {i}")).collect()
    }

    #[test]
    fn figure_prose_matches_label_stem() {
        let text = "Intro\n\nFigure 3 shows the loss curve\nMore text";
        let w = SubstringLocator.locate("fig3.png", text, 1).expect("match");
        assert_eq!(w.match_line, 3);
        assert_eq!(
            w.lines.iter().map(|l| l.number).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn figure_number_is_word_bounded() {
        let text = "Figure 30 is unrelated\nSee Fig. 3 for details";
        let w = SubstringLocator.locate("figure_3.jpg", text, 0).expect("match");
        assert_eq!(w.match_line, 2);
    }

    #[test]
    fn first_match_wins() {
        let mut lines = doc(50);
        lines[4] = "![](images/abc123.jpg)".into();
        lines[39] = "as shown in abc123".into();
        let text = lines.join("\n");

        let w = SubstringLocator.locate("abc123.jpg", &text, 2).expect("match");
        assert_eq!(w.match_line, 5);
        assert_eq!(w.lines.first().map(|l| l.number), Some(3));
        assert_eq!(w.lines.last().map(|l| l.number), Some(7));
    }

    #[test]
    fn window_is_clamped() {
        let text = "ABC123 at the top\nsecond\nthird";
        let w = SubstringLocator.locate("abc123.png", text, 10).expect("match");
        assert_eq!(w.match_line, 1);
        assert_eq!(w.lines.len(), 3);
    }

    #[test]
    fn huge_context_covers_whole_document() {
        let text = "intro\nsee plot.png here\noutro";
        let w = SubstringLocator.locate("plot.png", text, usize::MAX).expect("match");
        assert_eq!(w.match_line, 2);
        assert_eq!(
            w.lines.iter().map(|l| l.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn no_reference_is_none() {
        let text = "nothing relevant here\nat all";
        assert!(SubstringLocator.locate("zzz.png", text, 3).is_none());
        assert!(SubstringLocator.locate("zzz.png", "", 3).is_none());
    }

    #[test]
    fn render_numbers_lines() {
        let text = "a\nsee img.png\nc";
        let w = SubstringLocator.locate("img.png", text, 1).expect("match");
        assert_eq!(w.render(), "1. a\n2. see img.png\n3. c");
    }
}
