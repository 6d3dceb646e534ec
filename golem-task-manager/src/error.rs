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

/// Terminal outcome of a submitted task, observed through its [`TaskHandle`].
///
/// A failing operation never poisons its coordinator: the chain or stack
/// advances after any terminal state exactly as if the operation had
/// succeeded.
///
/// [`TaskHandle`]: crate::TaskHandle
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task was invalidated before or while running, or its result was
    /// delivered after cancellation had been observed.
    #[error("task was cancelled")]
    Cancelled,

    /// The operation itself failed; the error is forwarded verbatim.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}
