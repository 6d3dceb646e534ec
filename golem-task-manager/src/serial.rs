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

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{ContinuationBridge, TaskHandle};
use crate::model::TaskPriority;
use crate::node::{NodeId, TaskNode};

/// A single logical FIFO stream of tasks.
///
/// The head of the chain is the currently-active (or about-to-activate)
/// node; everything behind it waits in submission order.
#[derive(Clone, Default)]
pub struct SerialTaskQueue {
    inner: Arc<SerialInner>,
}

#[derive(Default)]
struct SerialInner {
    head: Mutex<Option<Arc<TaskNode>>>,
}

impl SerialTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation at the end of the stream and returns its handle
    /// immediately. The operation runs once everything submitted before it
    /// reached a terminal state.
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
                    let completed = match node.upgrade() {
                        Some(node) => (!node.mark_finished()).then(|| node.id()),
                        None => None,
                    };
                    if let Some(id) = completed {
                        inner.advance(id);
                    }
                    bridge.resolve(result, &token);
                })
            }),
        );
        debug!(node = %node.id(), label = %label, "submitting serial task");

        let to_activate = {
            let mut head = self.inner.head.lock().unwrap();
            match head.as_ref() {
                Some(current) => {
                    current.endpoint().add_next(node);
                    None
                }
                None => {
                    *head = Some(Arc::clone(&node));
                    Some(node)
                }
            }
        };
        if let Some(node) = to_activate {
            node.activate();
        }
        handle
    }

    pub fn has_work(&self) -> bool {
        self.inner.head.lock().unwrap().is_some()
    }

    /// Invalidates every queued and running task and empties the stream.
    pub fn cancel_all(&self) {
        let removed = self.inner.head.lock().unwrap().take();
        if let Some(head) = removed {
            debug!(node = %head.id(), "cancelling serial task queue");
            head.for_each(|node| node.invalidate());
        }
    }

    /// Awaits completion of everything queued at the moment of the call;
    /// tasks appended afterwards are not covered.
    pub async fn wait_until_current_drained(&self) {
        let endpoint = {
            let head = self.inner.head.lock().unwrap();
            head.as_ref().map(TaskNode::endpoint)
        };
        if let Some(endpoint) = endpoint {
            endpoint.wait().await;
        }
    }

    /// Awaits quiescence, observing head transitions until the head slot is
    /// empty. Tasks appended during draining are waited for too.
    pub async fn wait_until_all_drained(&self) {
        loop {
            let head = { self.inner.head.lock().unwrap().clone() };
            match head {
                None => return,
                Some(head) => {
                    head.wait().await;
                    // let the finished head's advance step land
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

impl SerialInner {
    /// Promotes the completed head's successor, or empties the stream if the
    /// completed node was the tail. Stale completions are ignored.
    fn advance(&self, completed: NodeId) {
        let to_activate = {
            let mut head = self.head.lock().unwrap();
            match head.as_ref() {
                Some(current) if current.id() == completed => match current.next() {
                    Some(next) => {
                        *head = Some(Arc::clone(&next));
                        Some(next)
                    }
                    None => {
                        *head = None;
                        None
                    }
                },
                _ => None,
            }
        };
        if let Some(next) = to_activate {
            next.activate();
        }
    }
}
