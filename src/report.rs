//! Markdown status table for the run summary.
use crate::model::SourceStatus;

const MAX_DETAIL_CHARS: usize = 160;

fn icon<P>(status: &SourceStatus<P>) -> &'static str {
    match status {
        SourceStatus::Success { .. } => "✅",
        SourceStatus::Failed { .. } => "❌",
        SourceStatus::Skipped { .. } => "⏭️",
        SourceStatus::Processing => "⏳",
        SourceStatus::NotAttempted => "➖",
    }
}

/// Collapse to a single table-safe line and truncate on a char boundary.
fn cell(text: &str) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let line = line.replace('|', "\\|");
    if line.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = line.chars().take(MAX_DETAIL_CHARS - 1).collect();
        format!("{}…", cut.trim_end_matches('\\'))
    } else {
        line
    }
}

fn row<P>(name: &str, status: &SourceStatus<P>) -> String {
    format!(
        "| {} | {} {} | {} |\n",
        name,
        icon(status),
        status.as_str(),
        cell(status.detail())
    )
}

pub fn render<A, B>(scholar: &SourceStatus<A>, wos: &SourceStatus<B>, wos_requested: bool) -> String {
    let mut out = String::from("## Citation badge update\n\n");
    out.push_str("| Source | Status | Details |\n");
    out.push_str("|--------|--------|---------|\n");
    out.push_str(&row("Google Scholar", scholar));
    out.push_str(&row("Web of Science", wos));
    if !wos_requested {
        out.push_str("\nWeb of Science was not requested for this run.\n");
    }
    out
}
