//! Report synthesis: one document from an [`AggregateReport`].

mod sections;

use crate::markdown::{escape_md_inline, sanitize_heading};
use crate::model::AggregateReport;

use sections::render_result_body;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable document with per-provider sections.
    #[default]
    Markdown,
    /// Pretty-printed JSON carrying every field of the report.
    Structured,
}

pub fn render(report: &AggregateReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Markdown => Ok(render_markdown(report)),
        OutputFormat::Structured => serde_json::to_string_pretty(report),
    }
}

fn render_markdown(report: &AggregateReport) -> String {
    let providers: Vec<_> = report
        .results
        .iter()
        .map(|r| r.provider.display_name())
        .collect();

    let mut out = String::from("# Multi-Provider Search Report\n");
    out.push_str(&format!("_Query: {}_\n", escape_md_inline(&sanitize_heading(&report.query))));
    out.push_str(&format!("_Mode: {}_\n", report.mode));
    out.push_str(&format!(
        "_Generated: {}_\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!("_Providers: {}_\n", providers.join(", ")));
    out.push_str(&format!(
        "_Succeeded: {}/{}_\n\n---\n\n",
        report.success_count,
        report.results.len()
    ));

    for result in &report.results {
        let glyph = if result.is_success() { "✅" } else { "❌" };
        out.push_str(&format!("## {glyph} {}\n\n", result.provider));
        if result.is_success() {
            out.push_str(&render_result_body(result));
        } else {
            out.push_str(result.error_message.as_deref().unwrap_or_default());
        }
        out.push_str("\n\n---\n\n");
    }

    if !report.cross_validated_urls.is_empty() {
        out.push_str("## 🔗 Cross-Validated Sources\n\n");
        for url in &report.cross_validated_urls {
            out.push_str(&format!("- {url}\n"));
        }
        out.push('\n');
    }

    if report.success_count >= 2 {
        out.push_str("## 📊 Cross-Validation Guide\n\n");
        out.push_str(&format!(
            "- {} providers returned results\n",
            report.success_count
        ));
        out.push_str("- ✅ Confirmed: the same claim appears in two or more providers (high confidence)\n");
        out.push_str("- ⚠️ Needs verification: the claim appears in only one provider\n");
        out.push_str("- 🔴 Conflicting: providers disagree; trace the contradiction to its sources\n\n");
    }

    if report.failure_count > 0 {
        out.push_str("## ⚠️ Failed Providers\n\n");
        for result in report.results.iter().filter(|r| !r.is_success()) {
            out.push_str(&format!(
                "- **{}**: {}\n",
                result.provider,
                result.error_message.as_deref().unwrap_or_default()
            ));
        }
        out.push('\n');
    }

    out
}
