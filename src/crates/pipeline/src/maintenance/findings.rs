//! Findings: structured observations feeding the resolver
//!
//! The pre-scan and the crawler sub-agents both produce findings; the
//! resolver decides which suggested actions are safe to execute. Field
//! names are camelCase because crawler agents read and write these as
//! JSON.

use serde::{Deserialize, Serialize};
use willow_graph::{LinkId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
}

/// What kind of problem a finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    // Pre-scan kinds (mechanical)
    BrokenLink,
    OrphanNode,
    BrokenParent,
    ExpiredTemporal,
    // Crawler kinds (judgement)
    DuplicateNodes,
    Contradiction,
    LinkIssue,
    MisplacedNode,
    VagueContent,
    OvercrowdedCategory,
    Restructure,
}

/// One observation about the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// `PRE-NNN` for pre-scan findings, `CRAWL-<task>-NNN` for crawlers
    pub id: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_ids: Vec<LinkId>,
    pub suggested_action: String,
}

/// Pull a findings array out of agent output. Crawlers are asked to end
/// with a bare JSON array; anything around it (prose, code fences) is
/// tolerated, and unparseable output means no findings.
pub fn parse_findings(text: &str) -> Vec<Finding> {
    let start = match text.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match text.rfind(']') {
        Some(i) if i >= start => i,
        _ => return Vec::new(),
    };
    serde_json::from_str(&text[start..=end]).unwrap_or_default()
}

/// Reassign finding ids under a prefix: `<prefix>-001`, `<prefix>-002`, ...
pub fn renumber(findings: &mut [Finding], prefix: &str) {
    for (i, finding) in findings.iter_mut().enumerate() {
        finding.id = format!("{}-{:03}", prefix, i + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_findings_tolerates_prose_and_fences() {
        let text = r#"I explored the subtree. Findings:
```json
[{"id":"x","kind":"duplicate_nodes","severity":"warning","summary":"two Alice nodes","nodeIds":["a1","a2"],"suggestedAction":"Merge a2 into a1"}]
```"#;
        let findings = parse_findings(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::DuplicateNodes);
        assert_eq!(findings[0].node_ids.len(), 2);
    }

    #[test]
    fn test_parse_findings_handles_garbage() {
        assert!(parse_findings("no array here").is_empty());
        assert!(parse_findings("[not json]").is_empty());
        assert!(parse_findings("").is_empty());
    }

    #[test]
    fn test_renumber_under_prefix() {
        let mut findings = parse_findings(
            r#"[{"id":"a","kind":"vague_content","severity":"suggestion","summary":"s","suggestedAction":"x"},
                {"id":"b","kind":"contradiction","severity":"critical","summary":"s","suggestedAction":"y"}]"#,
        );
        renumber(&mut findings, "CRAWL-2");
        assert_eq!(findings[0].id, "CRAWL-2-001");
        assert_eq!(findings[1].id, "CRAWL-2-002");
    }
}
