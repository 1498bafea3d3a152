//! Execution Pool
//!
//! Fans a batch of named calls across worker threads, each owning its own
//! session. Calls are dealt round-robin into one batch per worker; a worker
//! runs its batch in order and results are collected by call id.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::binary::{BinaryType, Value};
use crate::config::ClientConfig;
use crate::error::{Result, ThinError};
use crate::protocol::{Command, Reply};

use super::session::Session;

/// One named call
#[derive(Debug, Clone, PartialEq)]
pub struct PoolTask {
    /// Method name, e.g. `cache_put`
    pub method: String,

    /// Positional arguments
    pub args: Vec<Value>,

    pub key_type: Option<BinaryType>,
    pub value_type: Option<BinaryType>,
}

impl PoolTask {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            key_type: None,
            value_type: None,
        }
    }

    pub fn with_key_type(mut self, ty: BinaryType) -> Self {
        self.key_type = Some(ty);
        self
    }

    pub fn with_value_type(mut self, ty: BinaryType) -> Self {
        self.value_type = Some(ty);
        self
    }

    /// Validate the call and build its command
    pub fn to_command(&self) -> Result<Command> {
        let mut command = Command::from_call(&self.method, &self.args)?;
        if let Some(ty) = self.key_type {
            command = command.with_key_type(ty);
        }
        if let Some(ty) = self.value_type {
            command = command.with_value_type(ty);
        }
        Ok(command)
    }
}

/// Result of one call, echoed with its inputs
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub method: String,
    pub args: Vec<Value>,
    pub result: Reply,
}

struct Job {
    id: String,
    task: PoolTask,
    command: Command,
}

/// Runs calls on `threads` independent sessions
pub struct ExecutionPool {
    threads: usize,
    config: ClientConfig,
}

impl ExecutionPool {
    pub fn new(threads: usize, config: ClientConfig) -> Result<Self> {
        if threads == 0 {
            return Err(ThinError::PoolArgument("pool needs at least one thread".to_string()));
        }
        Ok(Self { threads, config })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run every call and collect the outcomes by id
    ///
    /// All calls are validated before any connection is opened. The first
    /// worker error (in worker order) is returned.
    pub fn execute(&self, tasks: Vec<(String, PoolTask)>) -> Result<HashMap<String, TaskOutcome>> {
        let total = tasks.len();
        let mut seen = HashSet::with_capacity(total);
        let mut batches: Vec<Vec<Job>> = (0..self.threads).map(|_| Vec::new()).collect();

        for (idx, (id, task)) in tasks.into_iter().enumerate() {
            if !seen.insert(id.clone()) {
                return Err(ThinError::PoolArgument(format!("duplicate operation id {}", id)));
            }
            let command = task.to_command()?;
            batches[idx % self.threads].push(Job { id, task, command });
        }

        tracing::debug!(threads = self.threads, tasks = total, "Running pool");

        let results = Mutex::new(HashMap::with_capacity(total));
        let outcomes = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .into_iter()
                .enumerate()
                .filter(|(_, batch)| !batch.is_empty())
                .map(|(worker, batch)| {
                    let results = &results;
                    let config = &self.config;
                    scope.spawn(move |_| run_batch(worker, config, batch, results))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ThinError::Worker("pool worker panicked".to_string())))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| ThinError::Worker("pool worker panicked".to_string()))?;

        for outcome in outcomes {
            outcome?;
        }
        Ok(results.into_inner())
    }
}

fn run_batch(
    worker: usize,
    config: &ClientConfig,
    batch: Vec<Job>,
    results: &Mutex<HashMap<String, TaskOutcome>>,
) -> Result<()> {
    let mut session = Session::open(config.clone())?;
    tracing::debug!(worker, tasks = batch.len(), "Pool worker connected");

    for job in batch {
        let result = session.execute(&job.command).map_err(|e| {
            tracing::warn!(worker, id = %job.id, "Pool call failed: {}", e);
            e
        })?;
        results.lock().insert(
            job.id,
            TaskOutcome {
                method: job.task.method,
                args: job.task.args,
                result,
            },
        );
    }

    session.disconnect();
    Ok(())
}

/// Flatten outcomes into one list, ordered by call id
///
/// List-shaped results are spliced in element by element; everything else
/// contributes one value.
pub fn flatten_results(results: &HashMap<String, TaskOutcome>) -> Vec<Value> {
    let mut ids: Vec<&String> = results.keys().collect();
    ids.sort();

    let mut flat = Vec::new();
    for id in ids {
        match results[id].result.clone().into_value() {
            Value::List(items) => flat.extend(items),
            other => flat.push(other),
        }
    }
    flat
}
