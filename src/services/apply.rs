//! Rendering of curated knowledge into the guidance document.
//!
//! Only the region between (and including) the markers is owned by the
//! renderer; every byte outside it is preserved exactly.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::adapters::sqlite::EngramRepository;
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::id::short_id;
use crate::domain::models::{KnowledgeItem, KnowledgeKind, WorkingMemory, WorkingMemoryKind};

pub const BEGIN_MARKER: &str = "<!-- BEGIN: LEARNED_PATTERNS -->";
pub const END_MARKER: &str = "<!-- END: LEARNED_PATTERNS -->";

/// Knowledge below this confidence is not rendered.
const MIN_RENDER_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub knowledge_count: usize,
    pub working_memory_count: usize,
    pub rendered: bool,
}

pub struct ApplyService {
    repo: Arc<EngramRepository>,
}

impl ApplyService {
    pub fn new(repo: Arc<EngramRepository>) -> Self {
        Self { repo }
    }

    pub async fn run(&self, guidance_path: &Path, project_id: &str) -> CoreResult<ApplyReport> {
        let items = self
            .repo
            .list_knowledge_items(Some(MIN_RENDER_CONFIDENCE))
            .await?;
        let memories = self.repo.list_working_memory(project_id).await?;

        let original = std::fs::read_to_string(guidance_path).map_err(|_| {
            CoreError::State(format!(
                "guidance document missing: {}",
                guidance_path.display()
            ))
        })?;
        let (region_start, region_end) = locate_markers(&original)?;

        let region = render_region(&items, &memories);
        let updated = format!(
            "{}{}{}",
            &original[..region_start],
            region,
            &original[region_end..]
        );

        let rendered = updated != original;
        if rendered {
            std::fs::write(guidance_path, &updated)?;
            info!(path = %guidance_path.display(), items = items.len(), "guidance document rewritten");
        }

        Ok(ApplyReport {
            knowledge_count: items.len(),
            working_memory_count: memories.len(),
            rendered,
        })
    }
}

/// Byte offsets of the marker region: start of the begin marker through the
/// end of the end marker. Missing or misordered markers are a state error.
pub fn locate_markers(doc: &str) -> CoreResult<(usize, usize)> {
    let begin = doc
        .find(BEGIN_MARKER)
        .ok_or_else(|| CoreError::State(format!("begin marker missing: {BEGIN_MARKER}")))?;
    let end = doc
        .find(END_MARKER)
        .ok_or_else(|| CoreError::State(format!("end marker missing: {END_MARKER}")))?;
    if end < begin {
        return Err(CoreError::State(
            "end marker precedes begin marker".to_string(),
        ));
    }
    Ok((begin, end + END_MARKER.len()))
}

fn feedback_badge(helpful: i64, harmful: i64) -> String {
    let mut parts = Vec::new();
    if helpful > 0 {
        parts.push(format!("+{helpful}"));
    }
    if harmful > 0 {
        parts.push(format!("-{harmful}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("[{}]", parts.join(" "))
    }
}

fn item_line(id: &str, helpful: i64, harmful: i64, text: &str) -> String {
    format!("[#{}]{} {}", short_id(id), feedback_badge(helpful, harmful), text)
}

fn push_section(out: &mut Vec<String>, heading: &str, lines: Vec<String>) {
    if lines.is_empty() {
        return;
    }
    out.push(heading.to_string());
    out.push(String::new());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(String::new());
        }
        out.push(line.clone());
    }
    out.push(String::new());
}

/// Compose the full marker region, markers included.
pub fn render_region(items: &[KnowledgeItem], memories: &[WorkingMemory]) -> String {
    let mut out: Vec<String> = Vec::new();
    out.push(BEGIN_MARKER.to_string());
    out.push(String::new());
    out.push("# Learned Patterns".to_string());
    out.push(String::new());

    let knowledge_lines = |kind: KnowledgeKind| -> Vec<String> {
        items
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| item_line(&i.id, i.helpful, i.harmful, &i.text))
            .collect()
    };
    push_section(&mut out, "## Patterns", knowledge_lines(KnowledgeKind::Pattern));
    push_section(&mut out, "## Facts", knowledge_lines(KnowledgeKind::Fact));
    push_section(&mut out, "## Procedures", knowledge_lines(KnowledgeKind::Procedure));
    push_section(&mut out, "## Decisions", knowledge_lines(KnowledgeKind::Decision));

    if !memories.is_empty() {
        out.push("## Working Memory".to_string());
        out.push(String::new());
        let memory_lines = |kind: WorkingMemoryKind| -> Vec<String> {
            memories
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| item_line(&m.id, 0, 0, &m.content_text))
                .collect()
        };
        push_section(&mut out, "### Summaries", memory_lines(WorkingMemoryKind::Summary));
        push_section(&mut out, "### Invariants", memory_lines(WorkingMemoryKind::Invariant));
        push_section(&mut out, "### Decisions", memory_lines(WorkingMemoryKind::Decision));
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.push(END_MARKER.to_string());
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: KnowledgeKind, text: &str, helpful: i64) -> KnowledgeItem {
        let mut item = KnowledgeItem::new(kind, text, "repo", None, vec![], 0.9).unwrap();
        item.helpful = helpful;
        item
    }

    #[test]
    fn markers_locate_in_order() {
        let doc = format!("prefix\n{BEGIN_MARKER}\nbody\n{END_MARKER}\nsuffix\n");
        let (start, end) = locate_markers(&doc).unwrap();
        assert_eq!(&doc[start..start + BEGIN_MARKER.len()], BEGIN_MARKER);
        assert!(doc[start..end].ends_with(END_MARKER));
    }

    #[test]
    fn missing_end_marker_is_a_state_error() {
        let doc = format!("x\n{BEGIN_MARKER}\ny\n");
        assert_eq!(locate_markers(&doc).unwrap_err().kind(), "StateError");
    }

    #[test]
    fn misordered_markers_are_a_state_error() {
        let doc = format!("{END_MARKER}\n{BEGIN_MARKER}\n");
        assert_eq!(locate_markers(&doc).unwrap_err().kind(), "StateError");
    }

    #[test]
    fn badge_shows_only_positive_counters() {
        assert_eq!(feedback_badge(0, 0), "");
        assert_eq!(feedback_badge(2, 0), "[+2]");
        assert_eq!(feedback_badge(0, 1), "[-1]");
        assert_eq!(feedback_badge(3, 1), "[+3 -1]");
    }

    #[test]
    fn empty_subsections_are_omitted() {
        let items = vec![item(KnowledgeKind::Pattern, "watch the borrow checker", 0)];
        let region = render_region(&items, &[]);
        assert!(region.contains("## Patterns"));
        assert!(!region.contains("## Facts"));
        assert!(!region.contains("## Working Memory"));
        assert!(region.starts_with(BEGIN_MARKER));
        assert!(region.ends_with(END_MARKER));
    }

    #[test]
    fn rendering_is_deterministic() {
        let items = vec![
            item(KnowledgeKind::Pattern, "a", 2),
            item(KnowledgeKind::Fact, "b", 0),
        ];
        assert_eq!(render_region(&items, &[]), render_region(&items, &[]));
    }

    #[test]
    fn item_lines_carry_short_id_and_badge() {
        let item = item(KnowledgeKind::Pattern, "retry flaky tests", 2);
        let region = render_region(&[item.clone()], &[]);
        let expected = format!("[#{}][+2] retry flaky tests", short_id(&item.id));
        assert!(region.contains(&expected));
    }
}
