//! Prompts for VLM-based figure analysis.
//!
//! The prompt lives here rather than in [`crate::pipeline::vision`] so it can
//! be reviewed and tested without a network client.

/// Template for the per-figure analysis request.
///
/// `{context}` is replaced with the numbered context window around the
/// figure's first textual reference.
pub const FIGURE_ANALYSIS_TEMPLATE: &str = r#"Analyse the following figure from an academic paper, using the surrounding text to interpret it.

**Context from the paper**:
{context}

**Tasks**:
1. **Figure type**: What kind of figure is this? (architecture diagram, flowchart, experimental results, comparison, data visualisation, ...)
2. **Key information**:
   - What is the main conclusion the figure is meant to convey?
   - What do the axes represent? What are the X and Y axes?
   - If this is a comparison, which method performs best and by how much?
3. **Data observations**:
   - What trends are visible? (rising, falling, converging, fluctuating, ...)
   - Are there notable outliers or special cases?
4. **Consistency with the text**:
   - Does the figure support the claims made in the context?
   - Are the authors' inferences from the figure reasonable?
5. **Potential issues**:
   - Is the figure misleading in any way? (truncated Y axis, unusual scales, ...)
   - Are error bars shown where appropriate?
   - Are there enough data points?

Return the analysis in structured Markdown."#;

/// Build the analysis prompt for one figure.
pub fn figure_analysis_prompt(context: &str) -> String {
    FIGURE_ANALYSIS_TEMPLATE.replace("{context}", context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_embedded() {
        let prompt = figure_analysis_prompt("12. Figure 3 shows the loss curve");
        assert!(prompt.contains("12. Figure 3 shows the loss curve"));
        assert!(!prompt.contains("{context}"));
    }
}
