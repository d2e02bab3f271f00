//! Processes, threads and tasks accumulated from all profiles of one run.

use crate::record::LogRecord;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use vptr2sym::SymbolTable;

#[derive(Debug, Clone, Serialize)]
pub struct Process {
    pub id: u64,
    pub name: String,
    #[serde(skip)]
    pub start: i64,
    /// load address of the traced library, 0 until read from the memory maps
    #[serde(skip)]
    pub mem_offset: u64,
}

impl Process {
    pub fn new(id: u64, name: impl Into<String>, start: i64) -> Self {
        Process { id, name: name.into(), start, mem_offset: 0 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub timestamp: i64,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub name: String,
    pub source_event_id: u64,
    pub source_event_type: Option<u32>,
    pub process_id: u64,
    pub process_name: String,
    pub thread_id: u64,
    pub thread_name: String,
    pub parent_task_id: u64,
    pub labels: Vec<Label>,
    pub dispatch: i64,
    pub begin: i64,
    pub end: i64,
    pub latency: i64,
    pub execution_time: i64,
    #[serde(skip)]
    pub vptr: u64,
}

impl Task {
    fn update_latency(&mut self) {
        if self.dispatch > 0 && self.begin > 0 {
            self.latency = self.begin - self.dispatch;
        }
    }

    fn update_execution_time(&mut self) {
        if self.begin > 0 && self.end > 0 {
            self.execution_time = self.end - self.begin;
        }
    }
}

/// All state of one conversion run.
///
/// Tasks keep the order in which they were first referenced, which is the
/// tie breaker when sorting by dispatch time later.
#[derive(Debug, Default)]
pub struct TraceData {
    pub processes: BTreeMap<u64, Process>,
    pub threads: BTreeMap<u64, Thread>,
    pub tasks: IndexMap<u64, Task>,
}

impl TraceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&mut self, process: Process) {
        self.processes.insert(process.id, process);
    }

    /// Register a named thread, replacing whatever was known about it.
    pub fn add_thread(&mut self, id: u64, name: impl Into<String>) {
        self.threads.insert(id, Thread { id, name: name.into() });
    }

    /// Apply one log record; `process_id` owns tasks first seen here.
    pub fn apply(&mut self, record: &LogRecord, process_id: u64) {
        let task_id = record.task_id();
        let processes = &self.processes;
        let task = self.tasks.entry(task_id).or_insert_with(|| Task {
            id: task_id,
            process_id,
            process_name: processes.get(&process_id).map(|p| p.name.clone()).unwrap_or_default(),
            ..Task::default()
        });

        match record {
            LogRecord::Dispatch {
                time,
                source_event_id,
                source_event_type,
                parent_task_id,
                ..
            } => {
                task.dispatch = *time;
                task.source_event_id = *source_event_id;
                task.source_event_type = Some(*source_event_type);
                task.parent_task_id = *parent_task_id;
                task.update_latency();
                task.update_execution_time();
            }
            LogRecord::Begin { time, process_id: began_in, thread_id, .. } => {
                if *began_in != task.process_id {
                    debug!(
                        "task {} began in process {} but belongs to {}",
                        task_id, began_in, task.process_id
                    );
                }
                task.begin = *time;
                task.update_latency();
                task.update_execution_time();
                // threads without metadata still show up, just unnamed
                let thread = self
                    .threads
                    .entry(*thread_id)
                    .or_insert_with(|| Thread { id: *thread_id, name: String::new() });
                task.thread_id = thread.id;
                task.thread_name = thread.name.clone();
            }
            LogRecord::End { time, .. } => {
                task.end = *time;
                task.update_execution_time();
            }
            LogRecord::Label { time, text, .. } => {
                task.labels.push(Label { timestamp: *time, label: text.clone() });
            }
            LogRecord::Vptr { address, .. } => {
                task.vptr = *address;
            }
        }
    }

    /// Name every task whose vtable pointer falls into a mapped library.
    ///
    /// Tasks without a pointer, or whose process has no known library base,
    /// keep an empty name, as do pointers below the first symbol.
    pub fn resolve_task_names(&mut self, symbols: &SymbolTable) {
        let mut unresolved = 0;
        for task in self.tasks.values_mut() {
            if task.vptr == 0 || task.process_id == 0 {
                continue;
            }
            let base = match self.processes.get(&task.process_id) {
                Some(process) if process.mem_offset != 0 => process.mem_offset,
                _ => continue,
            };
            match symbols.resolve(task.vptr, base) {
                Some(name) => task.name = name.to_string(),
                None => unresolved += 1,
            }
        }
        if unresolved > 0 {
            warn!("{} task vtable pointers fell outside the symbol table", unresolved);
        }
    }

    /// Drop tasks that only wrap or dequeue other tasks.
    pub fn remove_tasks_named(&mut self, names: &BTreeSet<String>) {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !names.contains(&task.name));
        debug!("removed {} wrapper tasks", before - self.tasks.len());
    }
}
