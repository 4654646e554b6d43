//! Element locator heuristics
//!
//! Maps a logical target ("the host tile", "the Desktop control") to a node of
//! a snapshot. Matching is text based where the UI exposes text and falls back
//! to position, size and class when it does not.

use super::tuning::AutomationTuning;
use crate::device::types::{NodeRef, UiSnapshot};

/// Words marking controls that are never the target of a step
pub const EXCLUDED_WORDS: [&str; 3] = ["setting", "menu", "option"];

/// Lightweight layout classes that commonly wrap a label and an icon
pub const LIGHT_CONTAINERS: [&str; 3] = ["LinearLayout", "RelativeLayout", "FrameLayout"];

/// Generic containers, ranked last
pub const GENERIC_CONTAINERS: [&str; 8] = [
    "ViewGroup",
    "View",
    "ConstraintLayout",
    "GridView",
    "ListView",
    "RecyclerView",
    "ScrollView",
    "CardView",
];

/// Confirm controls of the add-host dialog, in priority order
pub const CONFIRM_LABELS: [&str; 3] = ["OK", "Add", "Connect"];

/// Session dialog controls, most specific first
pub const DIALOG_LABELS: [&str; 7] = [
    "resume session",
    "start session",
    "resume",
    "start",
    "continue",
    "connect",
    "ok",
];

/// Broader affirmative vocabulary tried once the dialog labels fail
pub const AFFIRMATIVE_WORDS: [&str; 10] = [
    "resume", "start", "continue", "connect", "ok", "yes", "play", "launch", "accept", "confirm",
];

pub const DESKTOP_LABEL: &str = "Desktop";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    Exact,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    LightContainer,
    Button,
    Plain,
    GenericContainer,
}

pub fn classify(class_name: &str) -> ClassKind {
    let short = class_name.rsplit('.').next().unwrap_or(class_name);
    if LIGHT_CONTAINERS.contains(&short) {
        ClassKind::LightContainer
    } else if GENERIC_CONTAINERS.contains(&short) {
        ClassKind::GenericContainer
    } else if short.contains("Button") {
        ClassKind::Button
    } else {
        ClassKind::Plain
    }
}

/// Ranking tier of a match, lower is better.
///
/// Exact matches always outrank partial ones. Among exact matches a light
/// container wins over a plain widget, and generic containers come last.
/// Among partial matches explicit buttons come first.
pub fn rank_tier(kind: MatchKind, class: ClassKind) -> u8 {
    match (kind, class) {
        (MatchKind::Exact, ClassKind::LightContainer) => 0,
        (MatchKind::Exact, ClassKind::Button) | (MatchKind::Exact, ClassKind::Plain) => 1,
        (MatchKind::Exact, ClassKind::GenericContainer) => 2,
        (MatchKind::Contains, ClassKind::Button) => 3,
        (MatchKind::Contains, ClassKind::Plain) => 4,
        (MatchKind::Contains, _) => 5,
    }
}

/// Text search parameters
#[derive(Debug, Clone, Copy)]
pub struct TextQuery<'q> {
    pub needle: &'q str,
    pub case_sensitive: bool,
    pub clickable_only: bool,
    pub exclude_unrelated: bool,
    pub exact_only: bool,
}

impl<'q> TextQuery<'q> {
    pub fn new(needle: &'q str) -> Self {
        Self {
            needle,
            case_sensitive: false,
            clickable_only: false,
            exclude_unrelated: true,
            exact_only: false,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn clickable_only(mut self) -> Self {
        self.clickable_only = true;
        self
    }

    pub fn exact_only(mut self) -> Self {
        self.exact_only = true;
        self
    }

    pub fn include_unrelated(mut self) -> Self {
        self.exclude_unrelated = false;
        self
    }
}

/// A matched node with its ranking keys
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub node: NodeRef<'a>,
    pub kind: MatchKind,
    pub tier: u8,
    /// Position in document order
    pub order: usize,
}

/// How a step's target was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMethod {
    Position,
    Editable,
    Text,
    CaseVariant,
    LabelAncestor,
    GridItem,
    Container,
    FirstTextual,
    Icon,
    Affirmative,
}

#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub node: NodeRef<'a>,
    pub method: LocateMethod,
}

impl<'a> Located<'a> {
    fn new(node: NodeRef<'a>, method: LocateMethod) -> Self {
        Self { node, method }
    }
}

fn normalize(value: &str, case_sensitive: bool) -> String {
    let trimmed = value.trim();
    if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Substring test; needles of three characters or fewer must match a whole word
fn text_contains(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    if needle.chars().count() > 3 {
        return haystack.contains(needle);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle)
}

fn own_values<'a>(node: &NodeRef<'a>) -> impl Iterator<Item = &'a str> {
    let node = node.node();
    [node.text.as_deref(), node.description.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn has_own_label(node: &NodeRef<'_>, pred: impl Fn(&str) -> bool) -> bool {
    own_values(node).any(pred)
}

/// Match a node against a query, checking own text and description, then the
/// text of its descendants
pub fn match_node(node: NodeRef<'_>, query: &TextQuery<'_>) -> Option<MatchKind> {
    let needle = normalize(query.needle, query.case_sensitive);
    if needle.is_empty() {
        return None;
    }

    let own: Vec<String> = own_values(&node)
        .map(|v| normalize(v, query.case_sensitive))
        .collect();
    if own.iter().any(|v| *v == needle) {
        return Some(MatchKind::Exact);
    }

    let has_children = node.child_count() > 0;
    // Label text is usually rendered by a child of the clickable container
    if has_children && node.flags.clickable {
        let descendant_exact = node.descendants().iter().any(|d| {
            own_values(d).any(|v| normalize(v, query.case_sensitive) == needle)
        });
        if descendant_exact {
            return Some(MatchKind::Exact);
        }
    }

    if query.exact_only {
        return None;
    }

    if own.iter().any(|v| text_contains(v, &needle)) {
        return Some(MatchKind::Contains);
    }
    if has_children {
        let subtree = normalize(&node.subtree_text(), query.case_sensitive);
        if text_contains(&subtree, &needle) {
            return Some(MatchKind::Contains);
        }
    }

    None
}

/// True when the node or its descendants mention an unrelated control
pub fn is_excluded(node: NodeRef<'_>) -> bool {
    let text = node.subtree_text().to_lowercase();
    let resource = node
        .resource_id
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    EXCLUDED_WORDS
        .iter()
        .any(|w| text.contains(w) || resource.contains(w))
}

/// All nodes matching `query`, best first
pub fn find_by_text<'a>(snapshot: &'a UiSnapshot, query: &TextQuery<'_>) -> Vec<Candidate<'a>> {
    let mut candidates: Vec<Candidate<'a>> = snapshot
        .iter()
        .enumerate()
        .filter(|(_, n)| !query.clickable_only || n.flags.clickable)
        .filter_map(|(order, node)| {
            let kind = match_node(node, query)?;
            if query.exclude_unrelated && is_excluded(node) {
                return None;
            }
            Some(Candidate {
                node,
                kind,
                tier: rank_tier(kind, classify(&node.class_name)),
                order,
            })
        })
        .collect();

    candidates.sort_by_key(|c| (c.tier, c.order));
    candidates
}

pub fn best_by_text<'a>(snapshot: &'a UiSnapshot, query: &TextQuery<'_>) -> Option<NodeRef<'a>> {
    find_by_text(snapshot, query).first().map(|c| c.node)
}

/// The `position`-th (1-based) clickable node in document order
pub fn nth_clickable(snapshot: &UiSnapshot, position: usize) -> Option<NodeRef<'_>> {
    position
        .checked_sub(1)
        .and_then(|i| snapshot.clickable_nodes().get(i).copied())
}

pub fn is_square_icon(node: NodeRef<'_>, tuning: &AutomationTuning) -> bool {
    tuning.is_icon_sized(node.bounds.width(), node.bounds.height())
}

/// Text-free control that looks like an icon
pub fn is_icon_only(node: NodeRef<'_>, tuning: &AutomationTuning) -> bool {
    let short = node.node().short_class();
    node.is_text_free()
        && (short == "ImageButton" || short == "ImageView" || is_square_icon(node, tuning))
}

/// First editable field in document order
pub fn first_editable(snapshot: &UiSnapshot) -> Option<NodeRef<'_>> {
    snapshot
        .iter()
        .find(|n| n.flags.editable || n.node().short_class() == "EditText")
}

/// Whether any node's short class equals `short_class`
pub fn contains_class(snapshot: &UiSnapshot, short_class: &str) -> bool {
    snapshot.iter().any(|n| n.node().short_class() == short_class)
}

/// The node itself if clickable, else the nearest clickable ancestor within `depth` levels
pub fn clickable_ancestor<'a>(node: NodeRef<'a>, depth: usize) -> Option<NodeRef<'a>> {
    if node.flags.clickable {
        return Some(node);
    }
    node.ancestors(depth).into_iter().find(|a| a.flags.clickable)
}

/// Icon-only add control at its configured position
pub fn locate_add_button<'a>(
    snapshot: &'a UiSnapshot,
    tuning: &AutomationTuning,
) -> Option<Located<'a>> {
    nth_clickable(snapshot, tuning.add_button_position)
        .map(|n| Located::new(n, LocateMethod::Position))
}

pub fn locate_address_field(snapshot: &UiSnapshot) -> Option<Located<'_>> {
    first_editable(snapshot).map(|n| Located::new(n, LocateMethod::Editable))
}

/// OK / Add / Connect control, exact labels before partial ones
pub fn locate_confirm_button(snapshot: &UiSnapshot) -> Option<Located<'_>> {
    let exact = CONFIRM_LABELS
        .iter()
        .find_map(|label| best_by_text(snapshot, &TextQuery::new(label).exact_only()));
    exact
        .or_else(|| {
            CONFIRM_LABELS
                .iter()
                .find_map(|label| best_by_text(snapshot, &TextQuery::new(label)))
        })
        .map(|n| Located::new(n, LocateMethod::Text))
}

fn push_unique<'a>(out: &mut Vec<Located<'a>>, node: NodeRef<'a>, method: LocateMethod) {
    if !out.iter().any(|l| l.node.id() == node.id()) {
        out.push(Located::new(node, method));
    }
}

/// Host tile candidates, by name first and then by structure.
///
/// Each fallback contributes at most one candidate; the engine tries them in
/// order when activation of an earlier one fails.
pub fn host_candidates<'a>(
    snapshot: &'a UiSnapshot,
    host_name: Option<&str>,
    tuning: &AutomationTuning,
) -> Vec<Located<'a>> {
    let mut out = Vec::new();

    if let Some(host) = host_name {
        for candidate in find_by_text(snapshot, &TextQuery::new(host)) {
            if candidate.kind == MatchKind::Exact {
                push_unique(&mut out, candidate.node, LocateMethod::Text);
            }
        }
        if out.is_empty() {
            tracing::debug!("Host {:?} not found by exact text", host);
            if let Some(partial) = best_by_text(snapshot, &TextQuery::new(host)) {
                push_unique(&mut out, partial, LocateMethod::Text);
            }
        }
    }

    let grid_item = snapshot
        .iter()
        .filter(|n| n.node().short_class() == "GridView")
        .find_map(|grid| grid.descendants().into_iter().find(|d| d.flags.clickable));
    if let Some(node) = grid_item {
        push_unique(&mut out, node, LocateMethod::GridItem);
    }

    let clickables = snapshot.clickable_nodes();

    let container = clickables.iter().copied().find(|n| {
        matches!(
            classify(&n.class_name),
            ClassKind::LightContainer | ClassKind::GenericContainer
        ) && !n.is_text_free()
            && !is_excluded(*n)
    });
    if let Some(node) = container {
        push_unique(&mut out, node, LocateMethod::Container);
    }

    let textual = clickables
        .iter()
        .copied()
        .find(|n| !is_icon_only(*n, tuning) && !is_excluded(*n));
    if let Some(node) = textual {
        push_unique(&mut out, node, LocateMethod::FirstTextual);
    }

    out
}

/// "Desktop" entry candidates of the app list, most specific first
pub fn desktop_candidates<'a>(
    snapshot: &'a UiSnapshot,
    tuning: &AutomationTuning,
) -> Vec<Located<'a>> {
    let mut out = Vec::new();
    let clickables = snapshot.clickable_nodes();

    if let Some(node) = clickables
        .iter()
        .find(|n| has_own_label(n, |v| v == DESKTOP_LABEL))
    {
        push_unique(&mut out, *node, LocateMethod::Text);
    }

    if let Some(node) = clickables
        .iter()
        .find(|n| has_own_label(n, |v| v.eq_ignore_ascii_case(DESKTOP_LABEL)))
    {
        push_unique(&mut out, *node, LocateMethod::CaseVariant);
    }

    let via_label = snapshot
        .iter()
        .filter(|n| has_own_label(n, |v| v.eq_ignore_ascii_case(DESKTOP_LABEL)))
        .find_map(|label| clickable_ancestor(label, tuning.ancestor_search_depth));
    if let Some(node) = via_label {
        push_unique(&mut out, node, LocateMethod::LabelAncestor);
    }

    if let Some(node) = clickables.iter().find(|n| {
        n.node().short_class() == "ImageButton" || is_square_icon(**n, tuning)
    }) {
        push_unique(&mut out, *node, LocateMethod::Icon);
    }

    if let Some(node) = clickables
        .iter()
        .find(|n| classify(&n.class_name) == ClassKind::LightContainer)
    {
        push_unique(&mut out, *node, LocateMethod::Container);
    }

    out
}

/// Best session-dialog control among clickables, ranked by
/// (tier, label priority, document order)
pub fn locate_dialog_button(snapshot: &UiSnapshot) -> Option<Located<'_>> {
    let mut best: Option<((u8, usize, usize), NodeRef<'_>)> = None;

    for (order, node) in snapshot.clickable_nodes().into_iter().enumerate() {
        if is_excluded(node) {
            continue;
        }
        let rank = DIALOG_LABELS
            .iter()
            .enumerate()
            .filter_map(|(index, label)| {
                match_node(node, &TextQuery::new(label))
                    .map(|kind| (rank_tier(kind, classify(&node.class_name)), index, order))
            })
            .min();

        if let Some(rank) = rank {
            if best.as_ref().map(|(b, _)| rank < *b).unwrap_or(true) {
                best = Some((rank, node));
            }
        }
    }

    best.map(|(_, node)| Located::new(node, LocateMethod::Text))
}

/// Whether any visible text still looks like the session dialog
pub fn dialog_present(snapshot: &UiSnapshot) -> bool {
    locate_dialog_button(snapshot).is_some()
}

/// Clickable targets for any node mentioning an affirmative word, in document order
pub fn affirmative_candidates<'a>(
    snapshot: &'a UiSnapshot,
    tuning: &AutomationTuning,
) -> Vec<Located<'a>> {
    let mut out: Vec<Located<'a>> = Vec::new();
    for node in snapshot.iter() {
        let mentions = own_values(&node).any(|v| {
            let v = v.to_lowercase();
            AFFIRMATIVE_WORDS.iter().any(|w| text_contains(&v, w))
        });
        if !mentions || is_excluded(node) {
            continue;
        }
        if let Some(target) = clickable_ancestor(node, tuning.ancestor_search_depth) {
            push_unique(&mut out, target, LocateMethod::Affirmative);
        }
    }
    out
}
