//! Tool approval rendezvous.
//!
//! When an agent wants to run a dangerous tool it parks on a one-shot
//! channel keyed by `(trace_id, call_id)`. The HTTP facade resolves the
//! entry with a decision; `redirect` additionally stores a replacement
//! instruction the agent reads on resumption. Entries are deleted on
//! resolution or on session abort, and duplicate replies are rejected.

use dashmap::{DashMap, DashSet};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
    ApproveForSession,
    Redirect,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::ApproveForSession => "approve_for_session",
            Self::Redirect => "redirect",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "deny" => Some(Self::Deny),
            "approve_for_session" => Some(Self::ApproveForSession),
            "redirect" => Some(Self::Redirect),
            _ => None,
        }
    }
}

/// What the waiting agent does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Approved,
    Denied,
    /// Approved, and the tool is auto-approved for the rest of the session.
    ApprovedForSession,
    /// Denied; the agent should follow the replacement instruction instead.
    Redirected(String),
    /// The session was aborted while waiting.
    Aborted,
}

struct Pending {
    tool_name: String,
    tx: oneshot::Sender<Resolution>,
}

/// Process-scoped approval, redirect, and session-grant tables.
#[derive(Default)]
pub struct ApprovalTable {
    pending: DashMap<(String, String), Pending>,
    redirects: DashMap<String, String>,
    session_grants: DashSet<(String, String)>,
}

impl ApprovalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this tool was granted `approve_for_session` earlier under the
    /// same trace id. Consulted before registering a rendezvous.
    pub fn has_session_grant(&self, trace_id: &str, tool_name: &str) -> bool {
        self.session_grants.contains(&(trace_id.to_string(), tool_name.to_string()))
    }

    /// Register a pending approval. Must happen before the
    /// `tool_approval_request` event is published, so a reply can never race
    /// the registration.
    pub fn register_pending(
        &self,
        trace_id: &str,
        call_id: &str,
        tool_name: &str,
    ) -> oneshot::Receiver<Resolution> {
        let key = (trace_id.to_string(), call_id.to_string());
        let (tx, rx) = oneshot::channel();
        self.pending.insert(key, Pending { tool_name: tool_name.to_string(), tx });
        rx
    }

    /// Wait for the decision, an abort, or the timeout. Timeout behaves
    /// exactly like `deny`.
    pub async fn await_decision(
        &self,
        trace_id: &str,
        call_id: &str,
        tool_name: &str,
        rx: oneshot::Receiver<Resolution>,
        abort: &CancellationToken,
        timeout: Duration,
    ) -> Resolution {
        let key = (trace_id.to_string(), call_id.to_string());

        let resolution = tokio::select! {
            result = rx => result.unwrap_or(Resolution::Denied),
            () = abort.cancelled() => {
                self.pending.remove(&key);
                Resolution::Aborted
            }
            () = tokio::time::sleep(timeout) => {
                self.pending.remove(&key);
                tracing::warn!(trace_id, call_id, "approval timed out, treating as deny");
                Resolution::Denied
            }
        };

        if let Resolution::ApprovedForSession = &resolution {
            self.session_grants.insert((trace_id.to_string(), tool_name.to_string()));
        }
        resolution
    }

    /// Register and wait in one step.
    pub async fn request(
        &self,
        trace_id: &str,
        call_id: &str,
        tool_name: &str,
        abort: &CancellationToken,
        timeout: Duration,
    ) -> Resolution {
        let rx = self.register_pending(trace_id, call_id, tool_name);
        self.await_decision(trace_id, call_id, tool_name, rx, abort, timeout).await
    }

    /// Resolve a pending approval. Deletion is atomic with the waiter's
    /// read: the entry is removed before the decision is sent, so a
    /// duplicate reply finds nothing and is rejected.
    pub fn resolve(
        &self,
        trace_id: &str,
        call_id: &str,
        decision: Decision,
        message: Option<String>,
    ) -> DomainResult<()> {
        if decision == Decision::Redirect && message.as_deref().map_or(true, str::is_empty) {
            return Err(DomainError::InvalidRequest(
                "message is required when decision is 'redirect'".to_string(),
            ));
        }

        let key = (trace_id.to_string(), call_id.to_string());
        let (_, pending) = self.pending.remove(&key).ok_or_else(|| DomainError::ApprovalNotFound {
            trace_id: trace_id.to_string(),
            call_id: call_id.to_string(),
        })?;

        let resolution = match decision {
            Decision::Approve => Resolution::Approved,
            Decision::Deny => Resolution::Denied,
            Decision::ApproveForSession => Resolution::ApprovedForSession,
            Decision::Redirect => {
                let instruction = message.unwrap_or_default();
                self.redirects.insert(trace_id.to_string(), instruction.clone());
                Resolution::Redirected(instruction)
            }
        };

        let tool = pending.tool_name;
        if pending.tx.send(resolution).is_err() {
            // Waiter is gone (aborted between remove and send); the entry is
            // already deleted, nothing more to do.
            tracing::debug!(trace_id, call_id, tool, "approval resolved after waiter left");
        }
        Ok(())
    }

    /// Take the stored redirect instruction for a trace, if any.
    pub fn take_redirect(&self, trace_id: &str) -> Option<String> {
        self.redirects.remove(trace_id).map(|(_, v)| v)
    }

    /// Drop all state for a trace on session abort.
    pub fn clear_trace(&self, trace_id: &str) {
        self.pending.retain(|(t, _), _| t != trace_id);
        self.redirects.remove(trace_id);
        self.session_grants.retain(|(t, _)| t != trace_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
