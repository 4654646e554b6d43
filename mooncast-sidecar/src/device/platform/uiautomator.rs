//! Parser for `uiautomator dump` window hierarchies
//!
//! The dump is a flat XML document of nested `<node .../>` elements. Only the
//! attributes the automation engine reads are extracted.

use anyhow::{anyhow, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::device::types::{NodeId, UiNode, UiRect, UiSnapshot};

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<node\b((?:[^>"]|"[^"]*")*?)(/?)>|</node\s*>"#).expect("valid node pattern")
    })
}

fn attribute_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w:.-]*)="([^"]*)""#).expect("valid attribute pattern")
    })
}

fn bounds_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").expect("valid bounds pattern")
    })
}

fn entity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").expect("valid entity pattern")
    })
}

/// Parse a window dump into a snapshot.
///
/// Returns `Ok(None)` when the dump reports that no window is active.
pub fn parse_dump(xml: &str) -> Result<Option<UiSnapshot>> {
    if !xml.contains("<hierarchy") {
        if xml.contains("null root node") || xml.contains("ERROR") || xml.trim().is_empty() {
            return Ok(None);
        }
        return Err(anyhow!(
            "Unrecognised window dump output: {}",
            xml.chars().take(120).collect::<String>()
        ));
    }

    let mut snapshot = UiSnapshot::new(None);
    let mut stack: Vec<NodeId> = Vec::new();

    for caps in tag_pattern().captures_iter(xml) {
        let Some(attrs) = caps.get(1) else {
            stack.pop();
            continue;
        };

        let attributes = parse_attributes(attrs.as_str());
        let node = build_node(&attributes);
        let id = snapshot.push(stack.last().copied(), node);

        let self_closing = caps.get(2).map(|m| m.as_str() == "/").unwrap_or(false);
        if !self_closing {
            stack.push(id);
        }
    }

    if snapshot.is_empty() {
        return Ok(None);
    }

    let package = snapshot.root().and_then(|r| r.package.clone());
    snapshot.set_package(package);
    Ok(Some(snapshot))
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    attribute_pattern()
        .captures_iter(raw)
        .map(|c| (c[1].to_string(), decode_entities(&c[2])))
        .collect()
}

fn build_node(attributes: &HashMap<String, String>) -> UiNode {
    let get = |key: &str| {
        attributes
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
    };
    let flag = |key: &str, default: bool| {
        attributes
            .get(key)
            .map(|v| v == "true")
            .unwrap_or(default)
    };

    let mut node = UiNode::new(get("class").unwrap_or_default());
    node.text = get("text");
    node.description = get("content-desc");
    node.resource_id = get("resource-id");
    node.package = get("package");
    node.bounds = attributes
        .get("bounds")
        .and_then(|b| parse_bounds(b))
        .unwrap_or_default();
    node.flags.clickable = flag("clickable", false);
    node.flags.enabled = flag("enabled", true);
    node.flags.focusable = flag("focusable", false);
    node.flags.focused = flag("focused", false);
    node.flags.visible = flag("visible-to-user", true);
    node.flags.editable = node.class_name.contains("EditText");
    node
}

/// Parse `[left,top][right,bottom]`
pub fn parse_bounds(raw: &str) -> Option<UiRect> {
    let caps = bounds_pattern().captures(raw.trim())?;
    let n = |i: usize| caps[i].parse::<i32>().ok();
    Some(UiRect::new(n(1)?, n(2)?, n(3)?, n(4)?))
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    entity_pattern()
        .replace_all(raw, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(char::from_u32),
                _ => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
