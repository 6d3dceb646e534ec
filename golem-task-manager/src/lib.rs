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

//! In-process coordinators for asynchronous task orchestration.
//!
//! Fire-and-forget asynchronous operations are routed through one of three
//! coordinators, each imposing well-defined ordering, concurrency and
//! cancellation semantics on the tokio runtime:
//!
//! - [`KeyedTaskManager`] partitions work by [`TaskKey`] into independent
//!   chains with drop-current / wait-in-current submission modes and a
//!   run/pause gate,
//! - [`SerialTaskQueue`] serializes tasks within one logical stream,
//! - [`StackScheduler`] prefers the newest submission under a configurable
//!   concurrency ceiling.
//!
//! Every submission returns a [`TaskHandle`] that resolves exactly once:
//! with the operation's value, with the error it raised, or with
//! [`TaskError::Cancelled`]. Operations receive a [`CancellationToken`] and
//! are expected to observe it; cancellation is always cooperative.

pub mod error;
pub mod key;
pub mod keyed;
pub mod model;
pub mod serial;
pub mod stack;

mod bridge;
mod node;

pub use bridge::TaskHandle;
pub use error::TaskError;
pub use key::TaskKey;
pub use keyed::KeyedTaskManager;
pub use model::{SubmitMode, TaskPriority};
pub use serial::SerialTaskQueue;
pub use stack::{StackCounters, StackScheduler};

pub use tokio_util::sync::CancellationToken;
