//! Research goal - phase checklist over on-disk artifacts.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::AgentState;
use crate::experiment::ExperimentTracker;
use crate::goals::{Goal, GoalResult};

/// Goal that walks the agent through literature → data → analysis → report.
///
/// Done when a literature review exists, at least one dataset was
/// collected, at least one experiment was logged, and a final report was
/// written. Progress is reported as a percentage.
pub struct ResearchGoal {
    topic: String,
    output_dir: String,
}

impl ResearchGoal {
    pub fn new(topic: impl Into<String>) -> Self {
        ResearchGoal {
            topic: topic.into(),
            output_dir: ".retrai/research".to_string(),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<String>) -> Self {
        self.output_dir = output_dir.into();
        self
    }
}

#[async_trait]
impl Goal for ResearchGoal {
    fn name(&self) -> &str {
        "research"
    }

    async fn check(&self, _state: &AgentState, cwd: &Path) -> GoalResult {
        let out = cwd.join(&self.output_dir);

        let lit_review = out.join("literature_review.md");
        let literature_done = lit_review
            .metadata()
            .map(|m| m.is_file() && m.len() > 100)
            .unwrap_or(false);

        let data_dir = out.join("data");
        let data_done = std::fs::read_dir(&data_dir)
            .map(|mut rd| rd.next().is_some())
            .unwrap_or(false);

        let experiments = ExperimentTracker::new(cwd).list(None, None);
        let analysis_done = !experiments.is_empty();

        let report = out.join("report.md");
        let report_done = report
            .metadata()
            .map(|m| m.is_file() && m.len() > 200)
            .unwrap_or(false);

        let phases = [
            ("literature review", literature_done),
            ("data collection", data_done),
            ("analysis", analysis_done),
            ("report", report_done),
        ];
        let completed = phases.iter().filter(|(_, done)| *done).count();
        let pct = completed * 100 / phases.len();
        let status: Vec<String> = phases
            .iter()
            .map(|(name, done)| format!("{}: {}", name, if *done { "done" } else { "missing" }))
            .collect();
        let status_str = status.join(", ");

        let details = json!({
            "phases": {
                "literature_review": literature_done,
                "data_collection": data_done,
                "analysis": analysis_done,
                "report": report_done,
            },
            "percentage": pct,
            "experiments": experiments.len(),
        });

        if completed == phases.len() {
            GoalResult::achieved(format!("Research complete ({}%): {}", pct, status_str))
                .with_details(details)
        } else {
            GoalResult::not_achieved(format!("Research {}% complete: {}", pct, status_str))
                .with_details(details)
        }
    }

    fn system_prompt(&self, _cwd: &Path) -> String {
        let topic = if self.topic.is_empty() {
            "the given topic"
        } else {
            &self.topic
        };
        format!(
            "Your goal is to conduct a complete investigation on: **{topic}**\n\n\
             Follow this research pipeline strictly in order:\n\n\
             ### Phase 1: LITERATURE REVIEW\n\
             - Survey existing material on the topic\n\
             - Write a literature review to `{dir}/literature_review.md`\n\
             - Include titles, authors, key findings, and URLs\n\n\
             ### Phase 2: DATA COLLECTION\n\
             - Download or create relevant datasets\n\
             - Save data files to `{dir}/data/`\n\n\
             ### Phase 3: ANALYSIS\n\
             - Analyze the collected data (`python_exec` works well here)\n\
             - Log EVERY analysis with `experiment_log` (hypothesis, \
               parameters, metrics, result)\n\n\
             ### Phase 4: REPORT\n\
             - Write a comprehensive report to `{dir}/report.md`\n\
             - Structure: Executive Summary, Background, Methodology, \
               Key Findings, Limitations, Conclusions, Next Steps\n\
             - Reference all experiments and literature\n\n\
             ### Rules\n\
             - Complete phases in order\n\
             - Log every experiment for reproducibility\n\
             - Cite every claim with evidence",
            topic = topic,
            dir = self.output_dir,
        )
    }
}
