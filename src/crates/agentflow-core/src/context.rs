//! Ambient per-task context, propagated explicitly across suspension
//! points via a `tokio::task_local!` stack rather than a thread-local.
//!
//! The one rule that makes this safe under concurrency: a task spawned
//! with `tokio::spawn` does **not** inherit the parent's scope
//! automatically. Code that spawns a child task and wants the child to see
//! (an extension of) the parent's scope must capture the scope explicitly
//! and re-enter it with [`ScopedContext::scope`] inside the spawned future.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseContext {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub id: String,
}

/// A delta to merge into the currently active context for the dynamic
/// extent of a scoped block. `None` fields leave the corresponding part of
/// the parent context untouched.
#[derive(Debug, Clone, Default)]
pub struct ContextDelta {
    pub phase: Option<PhaseContext>,
    pub task: Option<TaskContext>,
    pub agent: Option<AgentContext>,
}

/// The ambient context attached to every signal emitted within its scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedContext {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentContext>,
}

impl ScopedContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: None,
            task: None,
            agent: None,
        }
    }

    fn merged(&self, delta: &ContextDelta) -> Self {
        Self {
            session_id: self.session_id.clone(),
            phase: delta.phase.clone().or_else(|| self.phase.clone()),
            task: delta.task.clone().or_else(|| self.task.clone()),
            agent: delta.agent.clone().or_else(|| self.agent.clone()),
        }
    }
}

tokio::task_local! {
    static CURRENT: RefCell<ScopedContext>;
}

/// Reads the context active in the current task, or a bare session-only
/// context if no scope has been entered yet on this task.
pub fn current(session_id: &str) -> ScopedContext {
    CURRENT
        .try_with(|c| c.borrow().clone())
        .unwrap_or_else(|_| ScopedContext::new(session_id))
}

/// Runs `fut` with `delta` merged into whatever context is active on the
/// calling task, restoring the prior context once `fut` completes. Must be
/// called again (not inherited) after every `tokio::spawn`.
pub async fn scoped<F, Fut, T>(base: &ScopedContext, delta: ContextDelta, fut: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let next = CURRENT
        .try_with(|c| c.borrow().merged(&delta))
        .unwrap_or_else(|_| base.merged(&delta));
    CURRENT.scope(RefCell::new(next), fut()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_scopes_merge_without_clobbering_siblings() {
        let base = ScopedContext::new("s1");
        scoped(
            &base,
            ContextDelta {
                task: Some(TaskContext { id: "ta".into() }),
                ..Default::default()
            },
            || async {
                assert_eq!(current("s1").task.unwrap().id, "ta");
            },
        )
        .await;

        scoped(
            &base,
            ContextDelta {
                task: Some(TaskContext { id: "tb".into() }),
                ..Default::default()
            },
            || async {
                assert_eq!(current("s1").task.unwrap().id, "tb");
            },
        )
        .await;
    }

    #[tokio::test]
    async fn concurrent_scopes_do_not_leak_across_tasks() {
        let base = ScopedContext::new("s1");
        let a = scoped(
            &base,
            ContextDelta {
                task: Some(TaskContext { id: "TA".into() }),
                ..Default::default()
            },
            || async {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                current("s1").task.unwrap().id
            },
        );
        let b = scoped(
            &base,
            ContextDelta {
                task: Some(TaskContext { id: "TB".into() }),
                ..Default::default()
            },
            || async { current("s1").task.unwrap().id },
        );
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra, "TA");
        assert_eq!(rb, "TB");
    }
}
