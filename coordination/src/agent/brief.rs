//! Deterministic next-phase brief and commit-message suggestions

use std::path::Path;

const BRIEF_COMPLETED: usize = 5;
const BRIEF_ISSUES: usize = 3;
const CROWDED_FOCUS: usize = 3;

const GENERAL_GUIDANCE: [&str; 5] = [
    "Focus on testing core functionality before adding new features.",
    "Ensure error handling is robust for production deployment.",
    "Consider breaking down complex tasks into smaller, testable units.",
    "Document any configuration changes for future reference.",
    "Test escalation scenarios to ensure they work as expected.",
];

const SOURCE_EXTENSIONS: [&str; 10] = ["rs", "py", "ts", "tsx", "js", "jsx", "go", "java", "c", "cpp"];

/// Agent state summarized for a phase brief
#[derive(Debug, Clone, Default)]
pub struct BriefInput {
    pub completed: Vec<String>,
    pub current: Vec<String>,
    pub issues: Vec<String>,
    pub project_goals: Vec<String>,
    pub interactions_monitored: usize,
}

fn tail(items: &[String], n: usize) -> &[String] {
    &items[items.len().saturating_sub(n)..]
}

fn bullets(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("- {empty}");
    }
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn contextual_guidance(input: &BriefInput) -> &'static str {
    if !input.issues.is_empty() {
        return "Address detected issues before proceeding with new development.";
    }
    if input.current.len() > CROWDED_FOCUS {
        return "Consider prioritizing tasks to maintain focus and avoid overwhelm.";
    }
    GENERAL_GUIDANCE[input.interactions_monitored % GENERAL_GUIDANCE.len()]
}

/// Markdown brief for the agent's next phase.
pub fn phase_brief(input: &BriefInput) -> String {
    format!(
        "# Next Phase Brief\n\n\
         ## Session Summary\n\
         - **Interactions Monitored**: {monitored}\n\n\
         ## Project Goals\n{goals}\n\n\
         ## Completed\n{completed}\n\n\
         ## Current Focus\n{current}\n\n\
         ## Issues Detected\n{issues}\n\n\
         ## Guidance\n{guidance}\n",
        monitored = input.interactions_monitored,
        goals = bullets(&input.project_goals, "No project goals recorded"),
        completed = bullets(tail(&input.completed, BRIEF_COMPLETED), "No completed tasks in current session"),
        current = bullets(&input.current, "No active tasks specified"),
        issues = bullets(tail(&input.issues, BRIEF_ISSUES), "No significant issues detected"),
        guidance = contextual_guidance(input),
    )
}

/// Conventional-commit message inferred from the changed paths.
pub fn suggest_commit_message(files: &[String]) -> String {
    let lower: Vec<String> = files.iter().map(|f| f.to_lowercase()).collect();
    let any = |pred: &dyn Fn(&str) -> bool| lower.iter().any(|f| pred(f.as_str()));

    let kind = if any(&|f: &str| f.contains("test")) {
        "test"
    } else if any(&|f: &str| f.ends_with(".md")) {
        "docs"
    } else if any(&|f: &str| f.contains("config") || f.contains("setup")) {
        "config"
    } else if any(&|f: &str| {
        Path::new(f)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
    }) {
        "feat"
    } else {
        "chore"
    };

    let scope = match files {
        [only] => Path::new(only)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("system")
            .to_string(),
        _ => "system".to_string(),
    };

    let summary = match kind {
        "test" => "add tests",
        "docs" => "update documentation",
        "config" => "update configuration",
        "feat" => "implement changes",
        _ => "update project structure",
    };
    format!("{kind}({scope}): {summary}")
}
