//! Click chain
//!
//! Activating a control is attempted through an ordered list of strategies,
//! stopping at the first one the platform accepts. Each attempt's outcome is
//! kept in the returned report.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::device::platform::AccessibilityProvider;
use crate::device::types::{NodeAction, NodeId, NodeRef, UiSnapshot};

/// One way of activating a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickStrategy {
    /// Click the node itself
    Direct,
    /// Click the parent if it is clickable
    Parent,
    /// Focus the node, wait, click it again
    FocusThenDirect,
    /// Click the grandparent if it is clickable
    Grandparent,
    /// Click any clickable sibling
    Sibling,
}

/// Default chain, evaluated left to right
pub const CLICK_CHAIN: [ClickStrategy; 5] = [
    ClickStrategy::Direct,
    ClickStrategy::Parent,
    ClickStrategy::FocusThenDirect,
    ClickStrategy::Grandparent,
    ClickStrategy::Sibling,
];

impl std::fmt::Display for ClickStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClickStrategy::Direct => "direct",
            ClickStrategy::Parent => "parent",
            ClickStrategy::FocusThenDirect => "focus_then_direct",
            ClickStrategy::Grandparent => "grandparent",
            ClickStrategy::Sibling => "sibling",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    /// The platform answered but declined the action
    Refused,
    /// Strategy not applicable to this node
    Skipped { reason: String },
    /// The provider returned an error
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: ClickStrategy,
    /// Node the action was sent to, if any
    pub target: Option<NodeId>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationReport {
    pub attempts: Vec<StrategyAttempt>,
}

impl ActivationReport {
    pub fn succeeded(&self) -> bool {
        self.winning_strategy().is_some()
    }

    pub fn winning_strategy(&self) -> Option<ClickStrategy> {
        self.attempts
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Succeeded)
            .map(|a| a.strategy)
    }
}

/// Runs the click chain against an accessibility provider
#[derive(Clone)]
pub struct ClickExecutor {
    provider: Arc<dyn AccessibilityProvider>,
    chain: Vec<ClickStrategy>,
    focus_settle: Duration,
}

impl ClickExecutor {
    pub fn new(provider: Arc<dyn AccessibilityProvider>, focus_settle: Duration) -> Self {
        Self {
            provider,
            chain: CLICK_CHAIN.to_vec(),
            focus_settle,
        }
    }

    /// Activate `node`, returning at the first strategy that succeeds
    pub async fn activate(&self, snapshot: &UiSnapshot, node: NodeId) -> ActivationReport {
        let mut report = ActivationReport::default();
        let Some(target) = snapshot.get(node) else {
            report.attempts.push(StrategyAttempt {
                strategy: ClickStrategy::Direct,
                target: None,
                outcome: AttemptOutcome::Skipped {
                    reason: "node not in snapshot".to_string(),
                },
            });
            return report;
        };

        for strategy in &self.chain {
            let attempt = self.attempt(*strategy, snapshot, target).await;
            tracing::debug!(
                "Click strategy {} on {:?}: {:?}",
                strategy,
                target,
                attempt.outcome
            );
            let done = attempt.outcome == AttemptOutcome::Succeeded;
            report.attempts.push(attempt);
            if done {
                break;
            }
        }

        report
    }

    /// Single direct click without fallbacks
    pub async fn click(&self, snapshot: &UiSnapshot, node: NodeId) -> bool {
        match self
            .provider
            .perform_action(snapshot, node, NodeAction::Click)
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Click on node {} failed: {}", node.0, e);
                false
            }
        }
    }

    async fn attempt(
        &self,
        strategy: ClickStrategy,
        snapshot: &UiSnapshot,
        node: NodeRef<'_>,
    ) -> StrategyAttempt {
        match strategy {
            ClickStrategy::Direct => self.send(strategy, snapshot, node.id()).await,
            ClickStrategy::Parent => match node.parent() {
                Some(parent) if parent.flags.clickable => {
                    self.send(strategy, snapshot, parent.id()).await
                }
                Some(_) => skipped(strategy, "parent not clickable"),
                None => skipped(strategy, "no parent"),
            },
            ClickStrategy::FocusThenDirect => {
                if let Err(e) = self
                    .provider
                    .perform_action(snapshot, node.id(), NodeAction::Focus)
                    .await
                {
                    return StrategyAttempt {
                        strategy,
                        target: Some(node.id()),
                        outcome: AttemptOutcome::Failed {
                            error: e.to_string(),
                        },
                    };
                }
                tokio::time::sleep(self.focus_settle).await;
                self.send(strategy, snapshot, node.id()).await
            }
            ClickStrategy::Grandparent => match node.parent().and_then(|p| p.parent()) {
                Some(grandparent) if grandparent.flags.clickable => {
                    self.send(strategy, snapshot, grandparent.id()).await
                }
                Some(_) => skipped(strategy, "grandparent not clickable"),
                None => skipped(strategy, "no grandparent"),
            },
            ClickStrategy::Sibling => {
                let siblings: Vec<NodeId> = node
                    .siblings()
                    .into_iter()
                    .filter(|s| s.flags.clickable)
                    .map(|s| s.id())
                    .collect();
                if siblings.is_empty() {
                    return skipped(strategy, "no clickable sibling");
                }

                let mut last = None;
                for sibling in siblings {
                    let attempt = self.send(strategy, snapshot, sibling).await;
                    if attempt.outcome == AttemptOutcome::Succeeded {
                        return attempt;
                    }
                    last = Some(attempt);
                }
                last.unwrap_or_else(|| skipped(strategy, "no clickable sibling"))
            }
        }
    }

    async fn send(
        &self,
        strategy: ClickStrategy,
        snapshot: &UiSnapshot,
        target: NodeId,
    ) -> StrategyAttempt {
        let outcome = match self
            .provider
            .perform_action(snapshot, target, NodeAction::Click)
            .await
        {
            Ok(true) => AttemptOutcome::Succeeded,
            Ok(false) => AttemptOutcome::Refused,
            Err(e) => AttemptOutcome::Failed {
                error: e.to_string(),
            },
        };

        StrategyAttempt {
            strategy,
            target: Some(target),
            outcome,
        }
    }
}

fn skipped(strategy: ClickStrategy, reason: &str) -> StrategyAttempt {
    StrategyAttempt {
        strategy,
        target: None,
        outcome: AttemptOutcome::Skipped {
            reason: reason.to_string(),
        },
    }
}
