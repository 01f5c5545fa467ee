use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::orchestrator::ResearchOutcome;
use crate::text;

const STRATEGY_PREVIEW_CHARS: usize = 60;

/// Markdown document for a finished research request.
pub fn render_markdown(outcome: &ResearchOutcome) -> String {
    let mut output = String::from("# Research Result\n\n");
    let _ = writeln!(output, "**Question:** {}\n", outcome.session.question);
    output.push_str(outcome.answer.trim());
    output.push_str("\n\n");
    output.push_str(&render_round_summary(outcome));
    output
}

/// Table of executed rounds with their result lengths.
pub fn render_round_summary(outcome: &ResearchOutcome) -> String {
    let session = &outcome.session;
    if session.rounds.is_empty() {
        return format!(
            "### Research Rounds\nNo research rounds recorded (answer path: {}).\n",
            outcome.path.as_str()
        );
    }

    let mut output = String::from("### Research Rounds\n");
    let _ = writeln!(output, "| Round | Characters | Strategy |");
    let _ = writeln!(output, "| --- | --- | --- |");
    for round in &session.rounds {
        let strategy = text::preview(
            &round.strategy.split_whitespace().collect::<Vec<_>>().join(" "),
            STRATEGY_PREVIEW_CHARS,
        )
        .replace('|', "\\|");
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            round.index, round.result_length, strategy
        );
    }
    let _ = writeln!(
        output,
        "\nAccepted rounds: {} of {} (answer path: {})",
        session.accepted_results.len(),
        session.rounds.len(),
        outcome.path.as_str()
    );
    output
}

/// Write the outcome to `path`: Markdown for `.md`, the bare answer otherwise.
pub fn write_report(path: &Path, outcome: &ResearchOutcome) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)
            .with_context(|| format!("failed to create report directory {}", parent.display()))?;
    }

    let is_markdown = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
    let contents = if is_markdown {
        render_markdown(outcome)
    } else {
        format!("{}\n", outcome.answer.trim())
    };

    let mut file = File::create(path)
        .with_context(|| format!("failed to create report file {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write report file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{OutcomePath, ResearchRound, ResearchSession};

    fn outcome() -> ResearchOutcome {
        let mut session = ResearchSession::new("Why are ducks waterproof?");
        session.rounds.push(ResearchRound {
            index: 1,
            strategy: "Research | preen oil".to_string(),
            result: "r".repeat(120),
            result_length: 120,
        });
        session.accepted_results.push("r".repeat(120));
        ResearchOutcome {
            answer: "Preen oil.".to_string(),
            path: OutcomePath::Report,
            session,
        }
    }

    #[test]
    fn markdown_contains_answer_and_round_table() {
        let markdown = render_markdown(&outcome());
        assert!(markdown.starts_with("# Research Result"));
        assert!(markdown.contains("**Question:** Why are ducks waterproof?"));
        assert!(markdown.contains("Preen oil."));
        assert!(markdown.contains("| 1 | 120 | Research \\| preen oil |"));
        assert!(markdown.contains("Accepted rounds: 1 of 1"));
    }

    #[test]
    fn writes_markdown_or_text_by_extension() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let md = temp.path().join("out/report.md");
        let txt = temp.path().join("report.txt");

        write_report(&md, &outcome())?;
        write_report(&txt, &outcome())?;

        assert!(std::fs::read_to_string(&md)?.contains("### Research Rounds"));
        assert_eq!(std::fs::read_to_string(&txt)?, "Preen oil.\n");
        Ok(())
    }
}
