use super::types::{NodeRef, UiSnapshot};

/// Format a snapshot as an indented tree for debugging
///
/// Example output:
/// ```text
/// Window: com.limelight (5 nodes)
/// FrameLayout [0,0][1080,2340]
///   GridView [0,200][1080,2340]
///     RelativeLayout [40,240][520,760] [clickable]
///       TextView "DESKTOP-1" [40,700][520,760]
/// ```
pub fn format_tree(snapshot: &UiSnapshot) -> String {
    let mut lines = vec![format!(
        "Window: {} ({} nodes)",
        snapshot.package().unwrap_or("<unknown>"),
        snapshot.len()
    )];

    for root in snapshot.roots() {
        push_tree_lines(root, 0, &mut lines);
    }

    lines.join("\n")
}

fn push_tree_lines(node: NodeRef<'_>, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}{}", "  ".repeat(depth), format_node(node)));
    for child in node.children() {
        push_tree_lines(child, depth + 1, lines);
    }
}

/// Format a single node on one line
pub fn format_node(node: NodeRef<'_>) -> String {
    let mut parts = vec![node.node().short_class().to_string()];

    if let Some(text) = node.text.as_deref().filter(|t| !t.is_empty()) {
        parts.push(format!("\"{}\"", truncate_str(text, 40)));
    }

    if let Some(desc) = node.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format!("desc=\"{}\"", truncate_str(desc, 40)));
    }

    parts.push(node.bounds.to_string());

    let mut states = Vec::new();
    if node.flags.clickable {
        states.push("clickable");
    }
    if node.flags.editable {
        states.push("editable");
    }
    if !node.flags.enabled {
        states.push("disabled");
    }
    if node.flags.focused {
        states.push("focused");
    }
    if !states.is_empty() {
        parts.push(format!("[{}]", states.join(", ")));
    }

    parts.join(" ")
}

/// List clickable options and visible texts, logged when a locator comes up empty
pub fn format_options(snapshot: &UiSnapshot) -> String {
    let mut lines = vec!["Clickable options:".to_string()];

    let clickables = snapshot.clickable_nodes();
    for (i, node) in clickables.iter().enumerate() {
        let text = node.subtree_text();
        let label = if text.is_empty() {
            "<no text>".to_string()
        } else {
            format!("\"{}\"", truncate_str(&text, 50))
        };
        lines.push(format!(
            "[{}] {} {} {}",
            i + 1,
            node.node().short_class(),
            label,
            node.bounds
        ));
    }
    if clickables.is_empty() {
        lines.push("  (no clickable elements found)".to_string());
    }

    let texts: Vec<&str> = snapshot
        .iter()
        .filter_map(|n| n.node().text.as_deref())
        .filter(|t| !t.trim().is_empty())
        .collect();
    lines.push(format!("Visible texts: {:?}", texts));

    lines.join("\n")
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
