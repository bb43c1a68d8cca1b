//! Scripted boundaries shared by the scenario tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt;
use futures::StreamExt;
use genroute::{
    GenError, JobBoard, Notification, Notifications, Provider, ProviderCall, ProviderInfo,
    StatusQuery, SubmitResponse, Task, TaskId, TaskStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every call and fails the models it was told to fail
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    calls: Mutex<Vec<ProviderCall>>,
    // model name -> failure code
    failures: HashMap<String, String>,
    next_id: AtomicI64,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    pub fn failing(mut self, model: &str, code: &str) -> Self {
        self.failures.insert(model.to_string(), code.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        Arc::new(ProviderInfo {
            id: "scripted".to_string(),
            name: "Scripted".to_string(),
        })
    }

    async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(code) = self.failures.get(&call.model) {
            return Err(GenError::provider_with_code("upstream failure", code.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitResponse {
            task_ids: vec![TaskId(id)],
        })
    }
}

/// Answers every status query with the same list, whatever was asked
#[derive(Debug, Default)]
pub struct FixedBoard {
    tasks: Mutex<Vec<Task>>,
    fail: Mutex<bool>,
    queries: AtomicUsize,
}

impl FixedBoard {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    pub fn set(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn fail_queries(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBoard for FixedBoard {
    async fn query(&self, _query: StatusQuery) -> Result<Vec<Task>, GenError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(GenError::provider("status service unavailable"));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }
}

/// Answers like [`FixedBoard`] after a delay
#[derive(Debug)]
pub struct SlowBoard {
    inner: FixedBoard,
    delay: Duration,
}

impl SlowBoard {
    pub fn new(tasks: Vec<Task>, delay: Duration) -> Self {
        Self {
            inner: FixedBoard::new(tasks),
            delay,
        }
    }

    pub fn queries(&self) -> usize {
        self.inner.queries()
    }
}

#[async_trait]
impl JobBoard for SlowBoard {
    async fn query(&self, query: StatusQuery) -> Result<Vec<Task>, GenError> {
        tokio::time::sleep(self.delay).await;
        self.inner.query(query).await
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn task(id: i64, status: TaskStatus, secs: i64) -> Task {
    let mut task = Task::new(id, status);
    task.created_at = Some(at(secs));
    task.tool = Some("video".to_string());
    task.prompt = Some(format!("prompt {}", id));
    task
}

/// Notifications delivered so far, without waiting
pub fn drain(notifications: &mut Notifications) -> Vec<Notification> {
    let mut notes = Vec::new();
    while let Some(Some(note)) = notifications.next().now_or_never() {
        notes.push(note);
    }
    notes
}
