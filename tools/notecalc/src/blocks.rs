//! Fenced calc block extraction from Markdown

/// A ```` ```calc ```` block and the line its fence opens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcBlock {
    /// Zero-based line of the opening fence, used as the block position
    pub line: u64,
    pub source: String,
}

fn is_calc_fence(line: &str) -> bool {
    line.strip_prefix("```")
        .is_some_and(|info| info.split_whitespace().next() == Some("calc"))
}

/// All calc blocks in document order
///
/// An unterminated block runs to the end of the document.
pub fn extract_blocks(markdown: &str) -> Vec<CalcBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(u64, Vec<&str>)> = None;

    for (index, line) in markdown.lines().enumerate() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if is_calc_fence(trimmed) {
                    current = Some((index as u64, Vec::new()));
                }
            }
            Some((start, lines)) if trimmed.starts_with("```") => {
                blocks.push(CalcBlock {
                    line: start,
                    source: lines.join("\n"),
                });
            }
            Some((start, mut lines)) => {
                lines.push(line);
                current = Some((start, lines));
            }
        }
    }

    if let Some((start, lines)) = current {
        blocks.push(CalcBlock {
            line: start,
            source: lines.join("\n"),
        });
    }
    blocks
}
