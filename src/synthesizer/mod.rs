//! Answer composition
//!
//! Turns tool output into the final answer text. Passages are handed to the
//! model as the only allowed context; empty output never reaches the model.
//! When the model fails, the answer is built from the raw tool output.

use crate::charts::format_thousands;
use crate::config::{GenerationParams, RetryConfig};
use crate::llm::{LanguageModel, LlmRequest};
use crate::models::{Passage, ToolOutput, TrendStatistics};
use crate::retry::with_backoff;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed reply when no tool output is usable.
pub const NO_INFORMATION_ANSWER: &str =
    "I could not find any relevant information in the indexed reports to answer this question.";

const EXCERPT_CHARS: usize = 300;

const GROUNDED_SYSTEM: &str = "You are a financial intelligence assistant answering questions about company annual reports. \
Answer ONLY from the numbered context passages. Cite the passages you use as [n]. \
If the context does not contain the answer, say so. Keep the answer under 300 words.";

const SUMMARY_SYSTEM: &str = "You are a financial intelligence assistant. \
Summarize the computed figures for the user in plain language. Use only the numbers provided. \
Keep the answer under 150 words.";

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub llm_called: bool,
    /// Model failure behind a degraded answer.
    pub failure: Option<String>,
}

impl Synthesis {
    fn direct(answer: String) -> Self {
        Self {
            answer,
            llm_called: false,
            failure: None,
        }
    }
}

pub struct Synthesizer {
    llm: Arc<dyn LanguageModel>,
    params: GenerationParams,
    retry: RetryConfig,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, params: GenerationParams, retry: RetryConfig) -> Self {
        Self { llm, params, retry }
    }

    pub async fn synthesize(&self, query: &str, output: &ToolOutput) -> Synthesis {
        match output {
            ToolOutput::Empty { tool, reason } => {
                info!(tool = %tool, reason = %reason, "No grounding available, skipping model");
                Synthesis::direct(NO_INFORMATION_ANSWER.to_string())
            }
            ToolOutput::Passages { passages } if passages.is_empty() => {
                Synthesis::direct(NO_INFORMATION_ANSWER.to_string())
            }
            ToolOutput::Passages { passages } => {
                let prompt = grounded_prompt(query, passages);
                self.compose(GROUNDED_SYSTEM, prompt, || excerpt_answer(passages))
                    .await
            }
            ToolOutput::Trend { statistics } => {
                let summary = trend_summary(statistics);
                let prompt = figures_prompt(query, &summary, None);
                self.compose(SUMMARY_SYSTEM, prompt, || summary.clone()).await
            }
            ToolOutput::Chart { artifact } => {
                let summary = trend_summary(&artifact.statistics);
                let prompt = figures_prompt(query, &summary, Some(&artifact.path));
                self.compose(SUMMARY_SYSTEM, prompt, || {
                    format!("Chart saved to {}. {}", artifact.path, summary)
                })
                .await
            }
        }
    }

    async fn compose<F>(&self, system: &str, prompt: String, fallback: F) -> Synthesis
    where
        F: FnOnce() -> String,
    {
        let request = LlmRequest {
            system: system.to_string(),
            prompt,
            params: self.params.clone(),
        };

        let failure = match with_backoff(&self.retry, "synthesis", || self.llm.generate(&request))
            .await
        {
            Ok(response) if !response.text.trim().is_empty() => {
                info!(
                    model = self.llm.model_name(),
                    answer_len = response.text.len(),
                    confidence = response.confidence,
                    "Answer synthesized"
                );
                return Synthesis {
                    answer: response.text.trim().to_string(),
                    llm_called: true,
                    failure: None,
                };
            }
            Ok(_) => "model returned an empty answer".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(error = %failure, "Synthesis degraded to raw tool output");
        Synthesis {
            answer: fallback(),
            llm_called: true,
            failure: Some(failure),
        }
    }
}

fn grounded_prompt(query: &str, passages: &[Passage]) -> String {
    let mut context = String::new();
    for (i, p) in passages.iter().enumerate() {
        let _ = writeln!(
            context,
            "[{}] ({} {}, {}, score {:.2})\n{}\n",
            i + 1,
            p.company,
            p.year,
            p.section_label,
            p.similarity_score,
            p.text.trim()
        );
    }

    format!(
        "Context passages:\n\n{}\nQuestion: {}\n\nAnswer using only the context above and cite passages as [n].",
        context, query
    )
}

fn figures_prompt(query: &str, summary: &str, chart_path: Option<&str>) -> String {
    let mut prompt = format!("Question: {}\n\nComputed figures:\n{}\n", query, summary);
    if let Some(path) = chart_path {
        let _ = writeln!(
            prompt,
            "\nA chart of these figures was saved to {}. Mention that the chart is available.",
            path
        );
    }
    prompt
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Degraded answer: the passages themselves, in rank order.
fn excerpt_answer(passages: &[Passage]) -> String {
    let mut answer = String::from(
        "The answer could not be generated right now. The most relevant report excerpts are:\n",
    );
    for (i, p) in passages.iter().enumerate() {
        let _ = write!(
            answer,
            "\n[{}] {} {} ({}): {}\n",
            i + 1,
            p.company,
            p.year,
            p.section_label,
            excerpt(&p.text)
        );
    }
    answer
}

fn pct(value: f64) -> String {
    format!("{:+.2}%", value)
}

/// Deterministic one-paragraph description of a trend.
pub fn trend_summary(stats: &TrendStatistics) -> String {
    let subject = match &stats.company {
        Some(company) => format!("{} {}", company, stats.metric),
        None => stats.metric.clone(),
    };

    let by_year: Vec<String> = stats
        .values_by_year
        .iter()
        .map(|(year, value)| match stats.yoy_growth_pct.get(year).copied().flatten() {
            Some(growth) => format!("{}: {} ({} YoY)", year, format_thousands(*value), pct(growth)),
            None => format!("{}: {}", year, format_thousands(*value)),
        })
        .collect();

    let mut summary = format!("{} by fiscal year: {}.", subject, by_year.join("; "));

    if let (Some(total), Some(first)) = (stats.total_change_pct, stats.values_by_year.keys().next()) {
        let _ = write!(
            summary,
            " Total change from {} to {}: {}.",
            first,
            stats.latest_year,
            pct(total)
        );
    }
    if let Some(cagr) = stats.cagr_pct {
        let _ = write!(summary, " CAGR: {:.2}%.", cagr);
    }
    let _ = write!(
        summary,
        " Latest ({}): {}.",
        stats.latest_year,
        format_thousands(stats.latest_value)
    );

    summary
}
