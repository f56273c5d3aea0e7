//! Graphviz DOT text for a tree snapshot.

use std::fmt::Write;

use serde_json::Value;

use super::color::{ColorMap, ROOT_COLOR};
use super::RenderOptions;
use crate::snapshot::{NodeView, TreeSnapshot};

/// Escape `text` for a double-quoted DOT string.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Display text of a state: strings verbatim, everything else as compact JSON.
pub fn state_text(state: &Value) -> String {
    match state {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escape each line and join them with DOT's `\n`.
fn lines(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| escape(p))
        .collect::<Vec<_>>()
        .join("\\n")
}

fn label(node: &NodeView, options: &RenderOptions) -> String {
    if node.is_root {
        return "ROOT".into();
    }
    let mut parts = vec![format!("ID: {}", node.id)];
    if let (true, Some(score)) = (options.show_scores, node.score) {
        parts.push(format!("Score: {:.*}", options.score_precision, score));
    }
    if let Some(state) = &node.state {
        parts.push(truncate(&state_text(state), options.max_label_length));
    }
    lines(&parts)
}

fn tooltip(node: &NodeView) -> String {
    let mut parts = vec![format!("Node ID: {}", node.id)];
    if let Some(score) = node.score {
        parts.push(format!("Score: {:.4}", score));
    }
    if let Some(action) = &node.action {
        parts.push(format!("Action: {}", action));
    }
    if !node.metrics.is_empty() {
        parts.push("Metrics:".into());
        parts.extend(
            node.metrics
                .iter()
                .map(|m| format!("  {}: {}", m.label, m.value)),
        );
    }
    lines(&parts)
}

/// Render `snapshot` as a DOT digraph.
///
/// Nodes appear in snapshot order, followed by one edge per parent/child
/// pair labelled with the producing expansion function.
pub fn to_dot(snapshot: &TreeSnapshot, options: &RenderOptions) -> String {
    let colors = ColorMap::for_bounds(snapshot.score_bounds());
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(
        out,
        "// {}",
        escape(options.title.as_deref().unwrap_or("Tree Visualization"))
    );
    out.push_str("digraph SearchTree {\n");
    if let Some(title) = &options.title {
        let _ = writeln!(
            out,
            "    graph [label=\"{}\", labelloc=\"t\", fontsize=\"16\"];",
            escape(title)
        );
    }
    out.push_str("    node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\"];\n");
    out.push_str("    edge [fontname=\"Helvetica\", fontsize=\"10\"];\n");

    for node in &snapshot.nodes {
        let (fill, font) = match node.score {
            Some(score) if !node.is_root => (colors.hex(score), colors.font_color(score)),
            _ => (ROOT_COLOR.to_string(), "black"),
        };
        let _ = writeln!(
            out,
            "    {} [label=\"{}\", fillcolor=\"{}\", fontcolor=\"{}\", tooltip=\"{}\"];",
            node.id,
            label(node, options),
            fill,
            font,
            tooltip(node)
        );
    }

    for node in &snapshot.nodes {
        let Some(parent) = node.parent else {
            continue;
        };
        let action = node.action.as_deref().unwrap_or("");
        let _ = writeln!(out, "    {} -> {} [label=\"{}\"];", parent, node.id, escape(action));
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StateScore;
    use crate::visualize::Format;
    use mcts::NodeMetric;
    use serde_json::json;

    fn options() -> RenderOptions {
        RenderOptions {
            format: Format::Dot,
            show_scores: true,
            max_label_length: 5,
            title: Some("Search \"demo\"".into()),
            score_precision: 2,
        }
    }

    fn node(id: u32, parent: Option<u32>, state: Option<Value>, score: Option<f64>) -> NodeView {
        NodeView {
            id,
            parent,
            children: Vec::new(),
            depth: parent.map_or(0, |_| 1),
            action: parent.map(|_| "expand".to_string()),
            state,
            score,
            is_root: parent.is_none(),
            created_step: parent.map_or(0, |_| 1),
            metrics: vec![NodeMetric::new("visits", "Visits", "2")],
        }
    }

    fn snapshot() -> TreeSnapshot {
        let nodes = vec![
            node(0, None, None, None),
            node(1, Some(0), Some(json!("start")), Some(0.5)),
            node(2, Some(0), Some(json!({"board": "x\"o"})), Some(0.75)),
        ];
        let state_score_pairs = nodes
            .iter()
            .filter_map(|n| {
                Some(StateScore {
                    state: n.state.clone()?,
                    score: n.score?,
                })
            })
            .collect();
        TreeSnapshot {
            nodes,
            state_score_pairs,
        }
    }

    #[test]
    fn test_escape_and_truncate() {
        assert_eq!(escape("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("héllo wörld", 4), "héll...");
    }

    #[test]
    fn test_labels_and_root() {
        let dot = to_dot(&snapshot(), &options());
        assert!(dot.starts_with("// Search \\\"demo\\\"\ndigraph SearchTree {"));
        assert!(dot.contains("0 [label=\"ROOT\", fillcolor=\"#AAAAAA\""));
        assert!(dot.contains("1 [label=\"ID: 1\\nScore: 0.50\\nstart\""));
        // {"board":"x\"o"} cut to five characters, then escaped
        assert!(dot.contains("ID: 2\\nScore: 0.75\\n{\\\"boa...\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_title_edges_and_tooltips() {
        let dot = to_dot(&snapshot(), &options());
        assert!(dot.contains(
            "graph [label=\"Search \\\"demo\\\"\", labelloc=\"t\", fontsize=\"16\"];"
        ));
        assert!(dot.contains("0 -> 1 [label=\"expand\"];"));
        assert!(dot.contains("0 -> 2 [label=\"expand\"];"));
        assert!(dot.contains(
            "tooltip=\"Node ID: 1\\nScore: 0.5000\\nAction: expand\\nMetrics:\\n  Visits: 2\""
        ));
    }

    #[test]
    fn test_scores_can_be_hidden() {
        let mut opts = options();
        opts.show_scores = false;
        opts.title = None;
        let dot = to_dot(&snapshot(), &opts);
        assert!(dot.contains("1 [label=\"ID: 1\\nstart\""));
        assert!(!dot.contains("labelloc"));
        assert!(dot.starts_with("// Tree Visualization\n"));
    }

    #[test]
    fn test_fill_follows_score_range() {
        let dot = to_dot(&snapshot(), &options());
        // lowest observed score takes the first stop, highest the last
        assert!(dot.contains("fillcolor=\"#440154\", fontcolor=\"white\""));
        assert!(dot.contains("fillcolor=\"#fde725\", fontcolor=\"black\""));
    }
}
