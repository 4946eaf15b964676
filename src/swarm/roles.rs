//! Specialist roles for swarm worker agents.

/// A specialized role assignable to a swarm worker.
#[derive(Debug, Clone)]
pub struct WorkerRole {
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub preferred_tools: &'static [&'static str],
}

const RESEARCHER: WorkerRole = WorkerRole {
    name: "researcher",
    description: "Literature search, data collection, and exploration",
    system_prompt: "\
You are a **Research Agent** specializing in information gathering and exploration.

Your primary responsibilities:
- Survey existing material and collect relevant sources
- Explore data files to understand their structure and contents
- Summarize findings with citations and links

Research methodology:
1. Start with broad searches to understand the landscape
2. Narrow down to the most relevant sources
3. Extract key findings, methods, and data availability
4. Document sources with full citations
",
    preferred_tools: &["grep_search", "find_files", "file_read", "file_write", "file_list"],
};

const ANALYST: WorkerRole = WorkerRole {
    name: "analyst",
    description: "Statistical analysis, data processing, and hypothesis testing",
    system_prompt: "\
You are a **Data Analyst Agent** specializing in statistical analysis.

Your primary responsibilities:
- Process and clean datasets
- Run exploratory analysis (summary stats, distributions, correlations)
- Log experiments with clear parameters, metrics, and conclusions

Analysis methodology:
1. Always start with data quality assessment
2. Check distributions before choosing methods
3. Report effect sizes alongside significance
4. Log every analysis as an experiment for reproducibility
",
    preferred_tools: &["python_exec", "experiment_log", "experiment_list", "file_read"],
};

const REVIEWER: WorkerRole = WorkerRole {
    name: "reviewer",
    description: "Critical evaluation, methodology checking, and quality assurance",
    system_prompt: "\
You are a **Peer Reviewer Agent** specializing in critical evaluation.

Your primary responsibilities:
- Review methodology and implementations for correctness
- Identify edge cases, biases, and limitations
- Verify reproducibility of results

Review checklist:
1. Is the approach clearly stated and testable?
2. Are the methods appropriate for the problem?
3. Are there confounders or failure modes not accounted for?
4. Are the conclusions supported by the evidence?
",
    preferred_tools: &["file_read", "grep_search", "experiment_list", "git_diff"],
};

const SYNTHESIZER: WorkerRole = WorkerRole {
    name: "synthesizer",
    description: "Combining findings into conclusions and reports",
    system_prompt: "\
You are a **Synthesizer Agent** specializing in integrating findings.

Your primary responsibilities:
- Combine findings from multiple agents
- Write clear, structured reports
- Identify patterns and themes across results
- Suggest next directions based on findings

Writing guidelines:
- Support every claim with evidence
- Distinguish between strong and weak evidence
- Be transparent about limitations
- Prioritize actionable insights
",
    preferred_tools: &["file_read", "file_write", "grep_search", "experiment_list"],
};

const ROLES: &[WorkerRole] = &[RESEARCHER, ANALYST, REVIEWER, SYNTHESIZER];

/// Get a role by name (case-insensitive).
pub fn get_role(name: &str) -> Option<&'static WorkerRole> {
    let lowered = name.to_lowercase();
    ROLES.iter().find(|r| r.name == lowered)
}

/// Names of all available roles.
pub fn list_roles() -> Vec<&'static str> {
    ROLES.iter().map(|r| r.name).collect()
}

/// Full prompt appended to a worker running under a role: the role's
/// system prompt plus its preferred-tool list.
pub fn role_prompt(name: &str) -> String {
    match get_role(name) {
        Some(role) => format!(
            "{}\nPreferred tools: {}",
            role.system_prompt,
            role.preferred_tools.join(", ")
        ),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_four_roles_resolve() {
        for name in ["researcher", "analyst", "reviewer", "synthesizer"] {
            assert!(get_role(name).is_some(), "{} missing", name);
        }
        assert_eq!(list_roles().len(), 4);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(get_role("Researcher").is_some());
        assert!(get_role("ANALYST").is_some());
    }

    #[test]
    fn unknown_role_yields_empty_prompt() {
        assert!(get_role("wizard").is_none());
        assert_eq!(role_prompt("wizard"), "");
    }

    #[test]
    fn role_prompt_includes_tools() {
        let prompt = role_prompt("analyst");
        assert!(prompt.contains("Data Analyst Agent"));
        assert!(prompt.contains("python_exec"));
    }
}
