// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;

use crate::embedding::index::{SearchHit, VectorIndex};
use crate::pipeline::BuildReport;
use crate::utils::excerpt;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize provenance (cyan)
pub fn colorize_source(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize score (yellow)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.4}", score);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize passage excerpt (dimmed)
pub fn colorize_excerpt(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a heading or label (bold)
pub fn colorize_label(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a warning (yellow bold)
pub fn colorize_warning(text: &str, use_color: bool) -> String {
    if use_color {
        text.yellow().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Render ranked hits as text, one block per hit.
pub fn format_hits(hits: &[SearchHit], excerpt_chars: usize, use_color: bool) -> String {
    let mut out = String::new();
    for (rank, hit) in hits.iter().enumerate() {
        let provenance = format!(
            "{} page {} chunk {}",
            hit.passage.source, hit.passage.page_no, hit.passage.chunk_index
        );
        out.push_str(&format!(
            "{}. [{}] {} {}\n   {}\n",
            rank + 1,
            hit.id,
            colorize_score(hit.score, use_color),
            colorize_source(&provenance, use_color),
            colorize_excerpt(&excerpt(&hit.passage.text, excerpt_chars), use_color),
        ));
    }
    out
}

/// Render a build summary.
pub fn format_build_report(report: &BuildReport, generation: u64, use_color: bool) -> String {
    let mut out = format!(
        "{} {} passages from {} pages ({} total, generation {})\n",
        colorize_label("Indexed", use_color),
        report.passages,
        report.pages,
        report.total_passages,
        generation
    );
    for page in &report.needs_ocr {
        out.push_str(&format!(
            "{} {} page {} has no text and needs OCR\n",
            colorize_warning("skipped:", use_color),
            page.source,
            page.page_no
        ));
    }
    out
}

/// Render index metadata.
pub fn format_index_info(index: &VectorIndex, generation: Option<u64>, use_color: bool) -> String {
    let rows = [
        ("passages", index.len().to_string()),
        ("dimension", index.dimension().to_string()),
        ("model", index.model_id().to_string()),
        ("created_at", index.created_at().to_string()),
        ("updated_at", index.updated_at().to_string()),
        (
            "generation",
            generation.map(|g| g.to_string()).unwrap_or_else(|| "-".to_string()),
        ),
    ];
    rows.iter()
        .map(|(key, value)| format!("{:<11} {}\n", colorize_label(key, use_color), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::chunker::Passage;

    fn hit(id: usize, score: f32, text: &str) -> SearchHit {
        SearchHit {
            id,
            score,
            passage: Passage {
                text: text.to_string(),
                source: "jan.txt".to_string(),
                page_no: 2,
                chunk_index: 1,
            },
        }
    }

    #[test]
    fn hits_render_without_color() {
        let out = format_hits(&[hit(7, 0.91234, "Closing\nbalance 10.00")], 300, false);
        assert_eq!(
            out,
            "1. [7] 0.9123 jan.txt page 2 chunk 1\n   Closing balance 10.00\n"
        );
    }

    #[test]
    fn long_passages_are_cut() {
        let text = "x".repeat(50);
        let out = format_hits(&[hit(0, 1.0, &text)], 10, false);
        assert!(out.contains(&format!("{}...", "x".repeat(10))));
    }

    #[test]
    fn info_lists_metadata() {
        let index = VectorIndex::empty("blake3-hash-8", 8).unwrap();
        let out = format_index_info(&index, Some(3), false);
        assert!(out.contains("passages    0"));
        assert!(out.contains("model       blake3-hash-8"));
        assert!(out.contains("generation  3"));
    }
}
