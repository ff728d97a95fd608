//! Pre-scan: mechanical integrity findings, no model involved
//!
//! Runs over the disk-loaded graph before any crawler starts. Findings are
//! numbered `PRE-001` upward in a fixed kind order (broken links first) so
//! identical graphs always produce identical reports.

use crate::maintenance::findings::{Finding, FindingKind, Severity};
use chrono::{DateTime, Utc};
use willow_graph::Graph;

/// Scan `graph` for structural problems and expired validity windows.
pub fn prescan(graph: &Graph, now: DateTime<Utc>) -> Vec<Finding> {
    let mut findings = Vec::new();

    // broken_link: dangling endpoint or self-link.
    let mut links: Vec<_> = graph.links.values().collect();
    links.sort_by(|a, b| a.id.0.cmp(&b.id.0));
    for link in links {
        let from_missing = !graph.nodes.contains_key(&link.from_node);
        let to_missing = !graph.nodes.contains_key(&link.to_node);
        if link.from_node == link.to_node {
            findings.push(Finding {
                id: String::new(),
                kind: FindingKind::BrokenLink,
                severity: Severity::Critical,
                summary: format!("Link {} connects node {} to itself", link.id, link.from_node),
                node_ids: vec![link.from_node.clone()],
                link_ids: vec![link.id.clone()],
                suggested_action: format!("Delete link {}", link.id),
            });
        } else if from_missing || to_missing {
            let missing = if from_missing {
                &link.from_node
            } else {
                &link.to_node
            };
            findings.push(Finding {
                id: String::new(),
                kind: FindingKind::BrokenLink,
                severity: Severity::Critical,
                summary: format!("Link {} references missing node {}", link.id, missing),
                node_ids: Vec::new(),
                link_ids: vec![link.id.clone()],
                suggested_action: format!("Delete link {}", link.id),
            });
        }
    }

    // orphan_node: unreachable from the root via children.
    let reachable = graph.reachable_from_root();
    let mut nodes: Vec<_> = graph.nodes.values().collect();
    nodes.sort_by(|a, b| a.id.0.cmp(&b.id.0));
    for node in &nodes {
        if !reachable.contains(&node.id) {
            findings.push(Finding {
                id: String::new(),
                kind: FindingKind::OrphanNode,
                severity: Severity::Warning,
                summary: format!("Node {} ('{}') is unreachable from the root", node.id, node.content),
                node_ids: vec![node.id.clone()],
                link_ids: Vec::new(),
                suggested_action: format!(
                    "Reattach node {} under an appropriate category or delete it",
                    node.id
                ),
            });
        }
    }

    // broken_parent: missing parent or parent not listing the child.
    for node in &nodes {
        if node.id == graph.root_id {
            continue;
        }
        match &node.parent_id {
            None => findings.push(Finding {
                id: String::new(),
                kind: FindingKind::BrokenParent,
                severity: Severity::Critical,
                summary: format!("Node {} has no parent", node.id),
                node_ids: vec![node.id.clone()],
                link_ids: Vec::new(),
                suggested_action: format!("Reattach node {} under an appropriate parent", node.id),
            }),
            Some(parent_id) => match graph.nodes.get(parent_id) {
                None => findings.push(Finding {
                    id: String::new(),
                    kind: FindingKind::BrokenParent,
                    severity: Severity::Critical,
                    summary: format!(
                        "Node {} references missing parent {}",
                        node.id, parent_id
                    ),
                    node_ids: vec![node.id.clone()],
                    link_ids: Vec::new(),
                    suggested_action: format!(
                        "Reattach node {} under an existing parent",
                        node.id
                    ),
                }),
                Some(parent) if !parent.children.contains(&node.id) => {
                    findings.push(Finding {
                        id: String::new(),
                        kind: FindingKind::BrokenParent,
                        severity: Severity::Critical,
                        summary: format!(
                            "Parent {} does not list child {}",
                            parent_id, node.id
                        ),
                        node_ids: vec![node.id.clone(), parent_id.clone()],
                        link_ids: Vec::new(),
                        suggested_action: format!(
                            "Repair the children list of {parent_id} to include {}",
                            node.id
                        ),
                    });
                }
                Some(_) => {}
            },
        }
    }

    // expired_temporal: validity window already over. Flag only.
    for node in &nodes {
        if let Some(temporal) = &node.temporal {
            if temporal.is_expired(now) {
                findings.push(Finding {
                    id: String::new(),
                    kind: FindingKind::ExpiredTemporal,
                    severity: Severity::Suggestion,
                    summary: format!(
                        "Node {} ('{}') expired at {}",
                        node.id,
                        node.content,
                        temporal.valid_until.as_deref().unwrap_or("?")
                    ),
                    node_ids: vec![node.id.clone()],
                    link_ids: Vec::new(),
                    suggested_action: format!(
                        "Review node {}; mark it historical or update its validity",
                        node.id
                    ),
                });
            }
        }
    }

    for (i, finding) in findings.iter_mut().enumerate() {
        finding.id = format!("PRE-{:03}", i + 1);
    }
    findings
}
