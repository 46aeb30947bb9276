//! Pre-commit hooks
//!
//! External collaborators can inspect every proposed change before it is
//! validated and committed, and either let it through (optionally rewritten)
//! or veto it. Hooks run synchronously, in registration order.

use crate::error::{RegaliaError, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Which field a change targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Color,
    Nickname,
    Prefix,
    Suffix,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Color => "color",
            ChangeKind::Nickname => "nickname",
            ChangeKind::Prefix => "prefix",
            ChangeKind::Suffix => "suffix",
        })
    }
}

/// A change as seen by hooks. `new == None` clears the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeProposal {
    pub id: Uuid,
    pub kind: ChangeKind,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl ChangeProposal {
    /// The field had no value before this change
    pub fn is_initial(&self) -> bool {
        self.old.is_none()
    }
}

/// A hook's verdict on a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    /// Continue; `Some` replaces the proposed value
    Allow(Option<String>),
    /// Abort the change with a reason
    Veto(String),
}

impl HookDecision {
    pub fn allow() -> Self {
        HookDecision::Allow(None)
    }

    pub fn rewrite(value: impl Into<String>) -> Self {
        HookDecision::Allow(Some(value.into()))
    }

    pub fn veto(reason: impl Into<String>) -> Self {
        HookDecision::Veto(reason.into())
    }
}

pub trait PreCommitHook: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn before_change(&self, proposal: &ChangeProposal) -> HookDecision;
}

impl<F> PreCommitHook for F
where
    F: Fn(&ChangeProposal) -> HookDecision + Send + Sync,
{
    fn before_change(&self, proposal: &ChangeProposal) -> HookDecision {
        self(proposal)
    }
}

/// Ordered list of registered hooks
#[derive(Default)]
pub struct HookChain {
    hooks: RwLock<Vec<Arc<dyn PreCommitHook>>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: Arc<dyn PreCommitHook>) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pass the proposal through every hook; returns the final proposal
    pub fn run(&self, mut proposal: ChangeProposal) -> Result<ChangeProposal> {
        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for hook in hooks {
            match hook.before_change(&proposal) {
                HookDecision::Allow(None) => {}
                HookDecision::Allow(Some(rewritten)) => {
                    debug!(
                        "Hook {} rewrote {} change for {}",
                        hook.name(),
                        proposal.kind,
                        proposal.id
                    );
                    proposal.new = Some(rewritten);
                }
                HookDecision::Veto(reason) => {
                    debug!(
                        "Hook {} vetoed {} change for {}: {}",
                        hook.name(),
                        proposal.kind,
                        proposal.id,
                        reason
                    );
                    return Err(RegaliaError::VetoedByHook(reason));
                }
            }
        }

        Ok(proposal)
    }
}
