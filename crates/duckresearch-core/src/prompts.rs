//! Prompt templates for the research rounds and the final report.

/// Separates accepted round results in the aggregated text.
pub const ROUND_SEPARATOR: &str = "\n\n--- NEXT RESEARCH ROUND ---\n\n";

const NO_RESULTS_YET: &str = "No results yet";

/// Broad first-round research brief.
pub fn initial_strategy(question: &str) -> String {
    format!(
        "Carry out thorough foundational research on: {question}\n\n\
         Look for:\n\
         - Basic definitions and concepts\n\
         - Current developments and trends\n\
         - Important sources and experts\n\n\
         Use several different search terms and visit multiple relevant web pages."
    )
}

/// Ask the manager agent to plan round `round` from the recent results.
pub fn strategy_planning(question: &str, round: u32, recent_results: &[&str]) -> String {
    let context = match recent_results {
        [] => NO_RESULTS_YET.to_string(),
        results => results.join(" "),
    };
    let previous = round.saturating_sub(1);

    format!(
        "Plan the next search strategy based on the research results so far.\n\n\
         **Original question:** {question}\n\n\
         **Results so far (rounds 1-{previous}):**\n{context}\n\n\
         **Task for round {round}:**\n\
         Identify gaps in the research so far and draft a specific search strategy.\n\
         Which aspects have not been covered well enough?\n\
         Which new search terms or perspectives should be explored?\n\n\
         Write a precise search instruction for the web agent."
    )
}

/// Used when the manager agent could not plan round `round`.
pub fn fallback_strategy(question: &str, round: u32) -> String {
    format!(
        "Carry out complementary research on: {question}\n\n\
         Focus for round {round}:\n\
         - Look for specific details and examples\n\
         - Explore alternative perspectives\n\
         - Find recent studies or statistics\n\
         - Look for practical applications"
    )
}

/// Five-section report over the combined round results.
pub fn analysis(question: &str, combined: &str, rounds: usize) -> String {
    format!(
        "Analyse the following research results from {rounds} research rounds and write a \
         comprehensive, structured report:\n\n\
         **Original question:** {question}\n\n\
         **Combined research results from {rounds} rounds:**\n{combined}\n\n\
         **Task:**\n\
         Write a detailed, well structured report with the following sections:\n\n\
         1. **Executive Summary** - Short summary of the most important findings\n\
         2. **Detailed Analysis** - Thorough examination of the different aspects\n\
         3. **Key Facts** - Important data, figures, and facts\n\
         4. **Sources and Evidence** - List of the sources used\n\
         5. **Conclusions and Recommendations** - Conclusions and practical recommendations\n\n\
         **Format:** The report should be professional, comprehensive, and understandable \
         for non-experts."
    )
}

/// Answer from the manager agent's own knowledge.
pub fn knowledge_fallback(question: &str) -> String {
    format!(
        "Carry out a comprehensive analysis of the following question:\n\n\
         **Question:** {question}\n\n\
         **Task:** Write a detailed report based on your knowledge and the tools available \
         to you. The report should be structured and informative even if no current internet \
         data is available."
    )
}

/// Last-resort answer embedding both failures.
pub fn error_report(primary_error: &str, fallback_error: &str) -> String {
    format!(
        "Sorry, errors occurred during the research.\n\n\
         **Technical details:**\n\
         - Original error: {primary_error}\n\
         - Fallback error: {fallback_error}\n\n\
         **Possible solutions:**\n\
         1. Try rephrasing your question\n\
         2. Check your internet connection\n\
         3. Try again later\n\n\
         If the problem persists, please contact support."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_prompt_embeds_context() {
        let prompt = strategy_planning("q?", 3, &["first", "second"]);
        assert!(prompt.contains("rounds 1-2"));
        assert!(prompt.contains("first second"));
        assert!(prompt.contains("round 3"));

        let empty = strategy_planning("q?", 2, &[]);
        assert!(empty.contains(NO_RESULTS_YET));
    }

    #[test]
    fn analysis_prompt_lists_five_sections() {
        let prompt = analysis("q?", "combined", 2);
        for section in [
            "Executive Summary",
            "Detailed Analysis",
            "Key Facts",
            "Sources and Evidence",
            "Conclusions and Recommendations",
        ] {
            assert!(prompt.contains(section), "missing {section}");
        }
    }
}
