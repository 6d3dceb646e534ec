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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use assert2::let_assert;
use task_manager::{CancellationToken, StackCounters, StackScheduler, TaskError, TaskPriority};
use test_r::{test, test_dep};
use tokio::time::sleep;

test_r::enable!();

#[derive(Debug)]
pub struct Tracing;

#[test_dep]
fn tracing() -> Tracing {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Tracing
}

type Records = Arc<Mutex<Vec<String>>>;

fn records() -> Records {
    Arc::new(Mutex::new(Vec::new()))
}

fn recorded(records: &Records) -> Vec<String> {
    records.lock().unwrap().clone()
}

#[test]
async fn ceiling_one_prefers_the_newest_waiting_task(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(1);
    let records = records();

    let mut handles = Vec::new();
    for label in ["A", "B", "C"] {
        let records = Arc::clone(&records);
        handles.push(scheduler.submit(label, TaskPriority::Medium, move |_token| async move {
            sleep(Duration::from_millis(120)).await;
            records.lock().unwrap().push(label.to_string());
            Ok(())
        }));
    }

    for handle in handles {
        assert!(handle.value().await.is_ok());
    }
    assert_eq!(recorded(&records), vec!["A", "C", "B"]);
}

#[test]
async fn ceiling_two_drains_in_lifo_order(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(2);
    let records = records();

    let durations = [("1", 250u64), ("2", 300), ("3", 300), ("4", 300), ("5", 150)];
    let mut handles = Vec::new();
    for (label, duration) in durations {
        let records = Arc::clone(&records);
        handles.push(scheduler.submit(label, TaskPriority::Medium, move |_token| async move {
            sleep(Duration::from_millis(duration)).await;
            records.lock().unwrap().push(label.to_string());
            Ok(())
        }));
    }

    for handle in handles {
        assert!(handle.value().await.is_ok());
    }
    assert_eq!(recorded(&records), vec!["1", "2", "5", "4", "3"]);
}

#[test]
async fn executing_tasks_never_exceed_the_ceiling(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..6 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        handles.push(scheduler.submit(
            format!("op-{i}"),
            TaskPriority::Medium,
            move |_token| async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(40)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
        ));
    }

    for handle in handles {
        assert!(handle.value().await.is_ok());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[test]
async fn zero_ceiling_is_treated_as_one(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(0);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..3 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        handles.push(scheduler.submit(
            format!("op-{i}"),
            TaskPriority::Medium,
            move |_token| async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
        ));
    }

    for handle in handles {
        assert!(handle.value().await.is_ok());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
async fn drain_wait_is_immediate_when_idle(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(3);

    tokio::time::timeout(
        Duration::from_millis(100),
        scheduler.wait_until_all_processed(),
    )
    .await
    .unwrap();
    assert_eq!(scheduler.counters(), StackCounters::default());
}

#[test]
async fn drain_wait_observes_all_work_completing(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(2);
    let records = records();

    for i in 0..5 {
        let records = Arc::clone(&records);
        let _handle: task_manager::TaskHandle<()> = scheduler.submit(
            format!("op-{i}"),
            TaskPriority::Medium,
            move |_token| async move {
                sleep(Duration::from_millis(30)).await;
                records.lock().unwrap().push(i.to_string());
                Ok(())
            },
        );
    }

    tokio::time::timeout(Duration::from_secs(2), scheduler.wait_until_all_processed())
        .await
        .unwrap();
    assert_eq!(recorded(&records).len(), 5);
    assert_eq!(scheduler.counters(), StackCounters::default());
}

#[test]
async fn cancel_all_prevents_waiting_tasks_from_starting(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(1);
    let records = records();

    let mut handles = Vec::new();
    for i in 0..3 {
        let records = Arc::clone(&records);
        handles.push(scheduler.submit(
            format!("op-{i}"),
            TaskPriority::Medium,
            move |token: CancellationToken| async move {
                tokio::select! {
                    _ = sleep(Duration::from_millis(300)) => {
                        records.lock().unwrap().push(i.to_string());
                    }
                    _ = token.cancelled() => {}
                }
                Ok(())
            },
        ));
    }

    sleep(Duration::from_millis(50)).await;
    scheduler.cancel_all();

    tokio::time::timeout(Duration::from_secs(1), scheduler.wait_until_all_processed())
        .await
        .unwrap();
    for handle in handles {
        let_assert!(Err(error) = handle.value().await);
        assert!(error.is_cancelled());
    }
    assert!(recorded(&records).is_empty());
    assert_eq!(scheduler.counters(), StackCounters::default());
}

#[test]
async fn failing_task_frees_its_execution_slot(_tracing: &Tracing) {
    let scheduler = StackScheduler::new(1);
    let records = records();

    let failing: task_manager::TaskHandle<()> =
        scheduler.submit("failing", TaskPriority::Medium, |_token| async move {
            Err(anyhow!("boom"))
        });
    let following = {
        let records = Arc::clone(&records);
        scheduler.submit("following", TaskPriority::Medium, move |_token| async move {
            records.lock().unwrap().push("after".to_string());
            Ok(())
        })
    };

    let_assert!(Err(TaskError::Failed(error)) = failing.value().await);
    assert_eq!(error.to_string(), "boom");
    assert!(following.value().await.is_ok());
    assert_eq!(recorded(&records), vec!["after"]);
    assert_eq!(scheduler.counters(), StackCounters::default());
}
