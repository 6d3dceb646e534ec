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

/// How a submission relates to work already queued under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Invalidate every node currently linked under the key (head and queued
    /// successors) and install the new task as the head.
    DropCurrent,
    /// Append the new task at the end of the key's chain; it runs once all
    /// earlier tasks of that key reached a terminal state.
    WaitInCurrent,
}

/// Advisory priority forwarded with a submission.
///
/// Recorded on the task's tracing span; the coordinators derive no ordering
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}
