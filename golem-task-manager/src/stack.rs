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

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{ContinuationBridge, TaskHandle};
use crate::model::TaskPriority;
use crate::node::{NodeId, TaskNode};

/// Published occupancy snapshot of a [`StackScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackCounters {
    pub waiting: usize,
    pub executing: usize,
}

/// LIFO scheduler with a ceiling on concurrently executing tasks.
///
/// New submissions go to the front of the waiting line, so whenever capacity
/// frees up the most recently submitted waiting task runs next. With a
/// ceiling of one and submissions A, B, C in quick succession, A runs first
/// (activated on submission), then C, then B.
#[derive(Clone)]
pub struct StackScheduler {
    inner: Arc<StackInner>,
}

struct StackInner {
    state: Mutex<StackState>,
    counters: watch::Sender<StackCounters>,
}

struct StackState {
    waiting: VecDeque<Arc<TaskNode>>,
    executing: Vec<Arc<TaskNode>>,
    max_concurrent: usize,
}

impl StackScheduler {
    /// Creates a scheduler running at most `max_concurrent` tasks at a time;
    /// a ceiling of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        StackScheduler {
            inner: Arc::new(StackInner {
                state: Mutex::new(StackState {
                    waiting: VecDeque::new(),
                    executing: Vec::new(),
                    max_concurrent: max_concurrent.max(1),
                }),
                counters: watch::Sender::new(StackCounters::default()),
            }),
        }
    }

    /// Submits an operation and returns its handle immediately. The task is
    /// preferred over every currently waiting task once capacity allows.
    pub fn submit<R, F, Fut>(
        &self,
        label: impl Into<String>,
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
                    // an executing node leaves the scheduler whatever its
                    // terminal state, so the counters stay balanced
                    if let Some(node) = node.upgrade() {
                        node.mark_finished();
                        inner.complete(node.id());
                    }
                    bridge.resolve(result, &token);
                })
            }),
        );
        debug!(node = %node.id(), label = %label, "submitting stack task");

        {
            let mut state = self.inner.state.lock().unwrap();
            state.waiting.push_front(node);
            self.inner.publish(&state);
        }
        self.inner.drain();
        handle
    }

    /// Invalidates every waiting and executing task. Waiting tasks never
    /// activate; executing ones drain out cooperatively.
    pub fn cancel_all(&self) {
        let (waiting, executing) = {
            let mut state = self.inner.state.lock().unwrap();
            let waiting = std::mem::take(&mut state.waiting);
            let executing = state.executing.clone();
            self.inner.publish(&state);
            (waiting, executing)
        };
        if !waiting.is_empty() || !executing.is_empty() {
            debug!(
                waiting = waiting.len(),
                executing = executing.len(),
                "cancelling stack scheduler"
            );
        }
        for node in waiting.iter().chain(executing.iter()) {
            node.invalidate();
        }
    }

    /// Awaits the instant at which no task is waiting and none is executing.
    pub async fn wait_until_all_processed(&self) {
        let mut receiver = self.inner.counters.subscribe();
        let _ = receiver
            .wait_for(|counters| counters.waiting == 0 && counters.executing == 0)
            .await;
    }

    /// The currently published occupancy.
    pub fn counters(&self) -> StackCounters {
        *self.inner.counters.borrow()
    }
}

impl StackInner {
    fn publish(&self, state: &StackState) {
        self.counters.send_replace(StackCounters {
            waiting: state.waiting.len(),
            executing: state.executing.len(),
        });
    }

    /// Moves waiting tasks into execution, newest first, while below the
    /// ceiling.
    fn drain(&self) {
        let to_activate = {
            let mut state = self.state.lock().unwrap();
            let mut batch = Vec::new();
            while state.executing.len() < state.max_concurrent {
                let Some(node) = state.waiting.pop_front() else {
                    break;
                };
                state.executing.push(Arc::clone(&node));
                batch.push(node);
            }
            if !batch.is_empty() {
                self.publish(&state);
            }
            batch
        };
        for node in to_activate {
            node.activate();
        }
    }

    fn complete(&self, completed: NodeId) {
        {
            let mut state = self.state.lock().unwrap();
            state.executing.retain(|node| node.id() != completed);
            self.publish(&state);
        }
        self.drain();
    }
}
