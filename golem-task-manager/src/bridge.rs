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

use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// One-shot sink tying a submission's [`TaskHandle`] to the operation's
/// resolution site.
///
/// Only the first resume takes effect; later resumes are discarded. A bridge
/// dropped without a prior resume resumes with [`TaskError::Cancelled`], so
/// no handle is ever left unresolved by coordinator teardown.
pub(crate) struct ContinuationBridge<R> {
    resolver: Mutex<Option<oneshot::Sender<Result<R, TaskError>>>>,
}

impl<R> ContinuationBridge<R> {
    /// Creates the bridge together with the handle it resolves.
    pub(crate) fn pair(cancellation: CancellationToken) -> (ContinuationBridge<R>, TaskHandle<R>) {
        let (sender, receiver) = oneshot::channel();
        (
            ContinuationBridge {
                resolver: Mutex::new(Some(sender)),
            },
            TaskHandle {
                receiver,
                cancellation,
            },
        )
    }

    pub(crate) fn resume(&self, outcome: Result<R, TaskError>) {
        if let Some(resolver) = self.resolver.lock().unwrap().take() {
            // the receiver is gone when the caller dropped the handle
            let _ = resolver.send(outcome);
        }
    }

    /// Maps an operation outcome to the handle's resolution.
    ///
    /// `None` stands for an operation that never ran. A cancellation
    /// observed at resolution time wins over both success and failure.
    pub(crate) fn resolve(
        &self,
        result: Option<anyhow::Result<R>>,
        cancellation: &CancellationToken,
    ) {
        let outcome = match result {
            None => Err(TaskError::Cancelled),
            Some(_) if cancellation.is_cancelled() => Err(TaskError::Cancelled),
            Some(Ok(value)) => Ok(value),
            Some(Err(error)) => Err(TaskError::Failed(error)),
        };
        self.resume(outcome);
    }
}

impl<R> Drop for ContinuationBridge<R> {
    fn drop(&mut self) {
        if let Some(resolver) = self.resolver.get_mut().unwrap().take() {
            let _ = resolver.send(Err(TaskError::Cancelled));
        }
    }
}

/// Caller-side awaitable bound one-to-one with a submission.
///
/// The handle resolves exactly once: with the operation's value, with the
/// error it raised, or with [`TaskError::Cancelled`]. Dropping the handle
/// without awaiting it detaches the operation, which keeps running. Dropping
/// the future returned by [`TaskHandle::value`] before it resolves requests
/// cancellation of the underlying operation instead.
pub struct TaskHandle<R> {
    receiver: oneshot::Receiver<Result<R, TaskError>>,
    cancellation: CancellationToken,
}

impl<R> TaskHandle<R> {
    /// Awaits the task's resolution.
    pub async fn value(self) -> Result<R, TaskError> {
        let TaskHandle {
            receiver,
            cancellation,
        } = self;
        let guard = CancelOnDrop {
            cancellation,
            armed: true,
        };
        let outcome = match receiver.await {
            Ok(outcome) => outcome,
            // resolution side dropped unresolved
            Err(_) => Err(TaskError::Cancelled),
        };
        guard.disarm();
        outcome
    }

    /// Requests cooperative cancellation of the underlying operation.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

struct CancelOnDrop {
    cancellation: CancellationToken,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancellation.cancel();
        }
    }
}
