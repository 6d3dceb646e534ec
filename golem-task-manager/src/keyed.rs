// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{ContinuationBridge, TaskHandle};
use crate::key::TaskKey;
use crate::model::{SubmitMode, TaskPriority};
use crate::node::{NodeId, TaskNode};

/// Partitions submitted work by [`TaskKey`] into independent chains.
///
/// Each key owns a singly-linked chain of task nodes whose head is the
/// currently-active (or about-to-activate) task. Submissions choose between
/// [`SubmitMode::DropCurrent`], which supersedes every in-flight and pending
/// task of the key, and [`SubmitMode::WaitInCurrent`], which appends behind
/// them. A process-wide `running` gate defers activation of new heads until
/// it is switched on.
///
/// Across distinct keys no ordering is implied; chains progress
/// independently and in parallel.
#[derive(Clone, Default)]
pub struct KeyedTaskManager {
    inner: Arc<KeyedInner>,
}

struct KeyedInner {
    state: Mutex<KeyedState>,
}

struct KeyedState {
    heads: HashMap<TaskKey, Arc<TaskNode>>,
    running: bool,
}

impl Default for KeyedInner {
    fn default() -> Self {
        KeyedInner {
            state: Mutex::new(KeyedState {
                heads: HashMap::new(),
                running: true,
            }),
        }
    }
}

impl KeyedTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits an operation under `key` and returns its handle immediately.
    ///
    /// The operation receives the task's [`CancellationToken`] and is
    /// expected to observe it. The handle resolves with the operation's
    /// value, the error it raised, or [`TaskError::Cancelled`] when the task
    /// was superseded, cancelled, or observed cancellation at resolution
    /// time.
    ///
    /// Racing submissions serialize at the manager's state lock; their lock
    /// acquisition order is the only ordering guarantee between them.
    ///
    /// [`TaskError::Cancelled`]: crate::TaskError::Cancelled
    pub fn submit<R, F, Fut>(
        &self,
        label: impl Into<String>,
        key: TaskKey,
        mode: SubmitMode,
        priority: TaskPriority,
        op: F,
    ) -> TaskHandle<R>
    where
        R: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let label = label.into();
        let cancellation = CancellationToken::new();
        let (bridge, handle) = ContinuationBridge::pair(cancellation.clone());

        let inner = Arc::clone(&self.inner);
        let loopback_key = key.clone();
        let token = cancellation.clone();
        let node = TaskNode::new(
            label.clone(),
            priority,
            cancellation,
            Box::new(move |node| {
                Box::pin(async move {
                    let result = if token.is_cancelled() {
                        None
                    } else {
                        Some(op(token.clone()).await)
                    };
                    let completed = match node.upgrade() {
                        Some(node) => (!node.mark_finished()).then(|| node.id()),
                        // already reclaimed, nothing to advance
                        None => None,
                    };
                    if let Some(id) = completed {
                        inner.advance(&loopback_key, id);
                    }
                    bridge.resolve(result, &token);
                })
            }),
        );
        debug!(
            node = %node.id(),
            label = %label,
            ?mode,
            "submitting keyed task"
        );

        let (to_activate, superseded) = {
            let mut state = self.inner.state.lock().unwrap();
            match mode {
                SubmitMode::DropCurrent => {
                    let previous = state.heads.insert(key, Arc::clone(&node));
                    (state.running.then_some(node), previous)
                }
                SubmitMode::WaitInCurrent => match state.heads.get(&key) {
                    Some(head) => {
                        head.endpoint().add_next(node);
                        (None, None)
                    }
                    None => {
                        state.heads.insert(key, Arc::clone(&node));
                        (state.running.then_some(node), None)
                    }
                },
            }
        };
        if let Some(previous) = superseded {
            previous.for_each(|stale| stale.invalidate());
        }
        if let Some(node) = to_activate {
            node.activate();
        }
        handle
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().unwrap().running
    }

    /// Toggles the process-wide gate. Switching it on activates every key's
    /// head; heads that already ran are left alone.
    pub fn set_running(&self, running: bool) {
        let to_activate = {
            let mut state = self.inner.state.lock().unwrap();
            let resumed = running && !state.running;
            state.running = running;
            if resumed {
                state.heads.values().cloned().collect()
            } else {
                Vec::new()
            }
        };
        if !to_activate.is_empty() {
            debug!(heads = to_activate.len(), "resuming keyed task manager");
        }
        for head in to_activate {
            head.activate();
        }
    }

    /// Whether any chain currently exists for `key`.
    pub fn is_running_for(&self, key: &TaskKey) -> bool {
        self.inner.state.lock().unwrap().heads.contains_key(key)
    }

    /// Invalidates every node of the key's chain and forgets the key.
    /// Unknown keys are a no-op.
    pub fn cancel(&self, key: &TaskKey) {
        let removed = self.inner.state.lock().unwrap().heads.remove(key);
        if let Some(head) = removed {
            debug!(node = %head.id(), "cancelling keyed task chain");
            head.for_each(|node| node.invalidate());
        }
    }

    /// Invalidates every node of every chain. Safe to call at any moment,
    /// including concurrently with in-flight submissions, and idempotent.
    pub fn cancel_all(&self) {
        let removed: Vec<_> = {
            let mut state = self.inner.state.lock().unwrap();
            state.heads.drain().map(|(_, head)| head).collect()
        };
        if !removed.is_empty() {
            debug!(chains = removed.len(), "cancelling all keyed task chains");
        }
        for head in removed {
            head.for_each(|node| node.invalidate());
        }
    }

    /// Awaits quiescence of every chain, including work submitted while
    /// draining.
    pub async fn wait_until_all_processed(&self) {
        loop {
            let heads: Vec<_> = {
                let state = self.inner.state.lock().unwrap();
                state.heads.values().cloned().collect()
            };
            if heads.is_empty() {
                return;
            }
            for head in heads {
                head.endpoint().wait().await;
            }
            // let the finished heads' advance steps land before re-checking
            tokio::task::yield_now().await;
        }
    }
}

impl KeyedInner {
    /// Completion loopback: advances the key's chain past `completed`.
    ///
    /// Tolerant by design: a missing head means the completion raced a
    /// cancel, and a head other than the completed node means a newer
    /// drop-current submission owns the chain now. Both are left alone.
    fn advance(&self, key: &TaskKey, completed: NodeId) {
        let to_activate = {
            let mut state = self.state.lock().unwrap();
            let Some(head) = state.heads.get(key) else {
                return;
            };
            if head.id() != completed {
                return;
            }
            match head.next() {
                Some(next) => {
                    state.heads.insert(key.clone(), Arc::clone(&next));
                    state.running.then_some(next)
                }
                None => {
                    state.heads.remove(key);
                    None
                }
            }
        };
        if let Some(next) = to_activate {
            next.activate();
        }
    }
}
