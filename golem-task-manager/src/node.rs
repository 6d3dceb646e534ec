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

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, Instrument};

use crate::model::TaskPriority;

/// Stable identity of a [`TaskNode`], unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces the spawned future of a node, given a weak reference back to the
/// node so a finished node can be reclaimed while its future is still
/// pending drop.
pub(crate) type OperationFactory =
    Box<dyn FnOnce(Weak<TaskNode>) -> BoxFuture<'static, ()> + Send + 'static>;

/// A chain element wrapping one deferred asynchronous operation.
///
/// The node guards at-most-once activation, exposes cooperative cancellation
/// through invalidation, and signals a completion-or-invalidation event that
/// any number of waiters may await. Flags are monotonic: once `activated`,
/// `finished` or `invalidated` is set it is never cleared, and at least one
/// of the terminal flags is set before waiters are woken.
pub(crate) struct TaskNode {
    id: NodeId,
    label: String,
    priority: TaskPriority,
    cancellation: CancellationToken,
    // terminal event; waiters subscribe, wakes are level-triggered
    completion: watch::Sender<bool>,
    state: Mutex<NodeState>,
}

struct NodeState {
    activated: bool,
    finished: bool,
    invalidated: bool,
    factory: Option<OperationFactory>,
    running_task: Option<JoinHandle<()>>,
    next: Option<Arc<TaskNode>>,
}

impl TaskNode {
    pub(crate) fn new(
        label: String,
        priority: TaskPriority,
        cancellation: CancellationToken,
        factory: OperationFactory,
    ) -> Arc<TaskNode> {
        Arc::new(TaskNode {
            id: NodeId::next(),
            label,
            priority,
            cancellation,
            completion: watch::Sender::new(false),
            state: Mutex::new(NodeState {
                activated: false,
                finished: false,
                invalidated: false,
                factory: Some(factory),
                running_task: None,
                next: None,
            }),
        })
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Spawns the node's operation on the runtime, at most once.
    ///
    /// A node that is already activated, already invalidated, or already
    /// holds a running task is left alone, so racing calls are harmless.
    pub(crate) fn activate(self: &Arc<Self>) {
        let factory = {
            let mut state = self.state.lock().unwrap();
            if state.activated || state.invalidated || state.running_task.is_some() {
                return;
            }
            state.activated = true;
            state.factory.take()
        };
        let Some(factory) = factory else {
            return;
        };
        debug!(node = %self.id, label = %self.label, "activating task node");
        let span = debug_span!(
            "task",
            node = %self.id,
            label = %self.label,
            priority = ?self.priority,
        );
        // the factory runs outside the node lock
        let future = factory(Arc::downgrade(self));
        let handle = tokio::spawn(future.instrument(span));
        self.state.lock().unwrap().running_task = Some(handle);
    }

    /// Requests cooperative cancellation and wakes all waiters; idempotent.
    ///
    /// A node invalidated before activation will never run: its factory is
    /// released here, which resolves the caller's handle as cancelled.
    pub(crate) fn invalidate(&self) {
        let released_factory = {
            let mut state = self.state.lock().unwrap();
            if state.invalidated {
                return;
            }
            state.invalidated = true;
            state.factory.take()
        };
        debug!(node = %self.id, label = %self.label, "invalidating task node");
        self.cancellation.cancel();
        self.completion.send_replace(true);
        // user captures are dropped outside the lock
        drop(released_factory);
    }

    /// Marks the node finished and wakes waiters.
    ///
    /// Returns whether the node had already been invalidated, in which case
    /// a newer submission owns the chain and the caller must not advance it.
    pub(crate) fn mark_finished(&self) -> bool {
        let invalidated = {
            let mut state = self.state.lock().unwrap();
            state.finished = true;
            state.invalidated
        };
        self.completion.send_replace(true);
        invalidated
    }

    /// Links `next` behind this node. The slot is write-once; overwriting it
    /// is a programming error.
    pub(crate) fn add_next(&self, next: Arc<TaskNode>) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(
            state.next.is_none(),
            "task node {} already has a successor",
            self.id
        );
        if state.next.is_some() {
            error!(node = %self.id, "attempted to overwrite a task node successor");
            return;
        }
        state.next = Some(next);
    }

    pub(crate) fn next(&self) -> Option<Arc<TaskNode>> {
        self.state.lock().unwrap().next.clone()
    }

    /// The last node reachable over `next` links, possibly this node itself.
    pub(crate) fn endpoint(self: &Arc<Self>) -> Arc<TaskNode> {
        let mut current = Arc::clone(self);
        while let Some(next) = current.next() {
            current = next;
        }
        current
    }

    /// Applies `f` to every node of the chain starting at this node.
    pub(crate) fn for_each(self: &Arc<Self>, mut f: impl FnMut(&Arc<TaskNode>)) {
        let mut current = Arc::clone(self);
        loop {
            f(&current);
            match current.next() {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    /// Suspends until the node is finished or invalidated; returns
    /// immediately if it already is.
    pub(crate) async fn wait(&self) {
        let mut receiver = self.completion.subscribe();
        let _ = receiver.wait_for(|terminal| *terminal).await;
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("activated", &state.activated)
            .field("finished", &state.finished)
            .field("invalidated", &state.invalidated)
            .field("has_next", &state.next.is_some())
            .finish()
    }
}
