//! Reading the per-process profiles and memory map snapshots.
//!
//! A profile is named `profile_<pid>_<process name>.txt` and holds
//!
//! ```text
//! {
//!   "tasktracer": {
//!     "data": [<log line>, <log line>, ...],
//!     "threads": [{"tid": ..., "name": ...}, ...],
//!     "start": ...
//!   }
//! }
//! ```

use crate::error::{Error, ParseError, Result};
use crate::record::{parse_line, split_fields};
use crate::trace::{Process, TraceData};
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct ProfileFile {
    tasktracer: TaskTracerProfile,
}

#[derive(Deserialize)]
struct TaskTracerProfile {
    data: Vec<LogEntry>,
    threads: Vec<ThreadInfo>,
    start: i64,
}

#[derive(Deserialize)]
struct ThreadInfo {
    tid: u64,
    name: String,
}

/// A log line either as recorded or already split into its fields.
#[derive(Deserialize)]
#[serde(untagged)]
enum LogEntry {
    Line(String),
    Fields(Vec<serde_json::Value>),
}

impl LogEntry {
    fn into_line(self) -> std::result::Result<String, ParseError> {
        match self {
            LogEntry::Line(line) => Ok(line),
            LogEntry::Fields(fields) => {
                let mut tokens = Vec::with_capacity(fields.len());
                for value in &fields {
                    match value {
                        serde_json::Value::String(s) => tokens.push(s.clone()),
                        serde_json::Value::Number(n) => tokens.push(n.to_string()),
                        other => {
                            return Err(ParseError::new(format!(
                                "Extract error: unexpected log field {}",
                                other
                            ))
                            .at(&serde_json::Value::Array(fields.clone()).to_string()))
                        }
                    }
                }
                Ok(tokens.join(" "))
            }
        }
    }
}

/// Split `profile_3810_b2g.txt` into (3810, "b2g").
pub fn parse_profile_filename(filename: &str) -> std::result::Result<(u64, String), ParseError> {
    split_profile_filename(filename).map_err(|e| e.at(filename))
}

fn split_profile_filename(filename: &str) -> std::result::Result<(u64, String), ParseError> {
    let name = split_fields(filename, '.', 1, Some(1))?[0];
    // the process name itself may contain '_'
    let parts = split_fields(name, '_', 2, Some(2))?;
    let pid = parts[1]
        .parse()
        .map_err(|_| ParseError::new(format!("Extract error: bad process id '{}'", parts[1])))?;
    Ok((pid, parts[2].to_string()))
}

fn is_profile(filename: &str) -> bool {
    filename.starts_with("profile_") && filename.ends_with(".txt")
}

/// Sorted names of the regular entries in `dir`.
fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => warn!("skipping non UTF-8 file name {:?}", name),
        }
    }
    names.sort();
    Ok(names)
}

/// Parse one profile's JSON text into `trace` on behalf of process `pid`.
pub fn read_profile(
    trace: &mut TraceData,
    pid: u64,
    process_name: &str,
    json: &str,
    path: &Path,
) -> Result<()> {
    let profile: ProfileFile = serde_json::from_str(json)
        .map_err(|source| Error::Profile { path: path.to_path_buf(), source })?;
    let profile = profile.tasktracer;

    trace.add_process(Process::new(pid, process_name, profile.start));
    for thread in profile.threads {
        trace.add_thread(thread.tid, thread.name);
    }

    debug!("{}: {} log lines", path.display(), profile.data.len());
    for entry in profile.data {
        let record = parse_line(&entry.into_line()?)?;
        trace.apply(&record, pid);
    }
    Ok(())
}

/// Read every `profile_*.txt` in `dir`.
pub fn read_profiles(trace: &mut TraceData, dir: &Path) -> Result<()> {
    for filename in list_dir(dir)? {
        if !is_profile(&filename) {
            continue;
        }
        println!("Parsing {}...", filename);
        let (pid, process_name) = parse_profile_filename(&filename)?;
        let path = dir.join(&filename);
        let json = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        read_profile(trace, pid, &process_name, &json, &path)?;
    }
    Ok(())
}

/// Set each process's library load address from `<prefix>_<pid>` snapshots
/// of its /proc/<pid>/maps.
pub fn read_mmaps(trace: &mut TraceData, dir: &Path, library: &str) -> Result<()> {
    for filename in list_dir(dir)? {
        let (_, pid) = filename
            .rsplit_once('_')
            .ok_or_else(|| ParseError::new("Extract error: no '_'").at(&filename))?;
        let process = match pid.parse().ok().and_then(|pid: u64| trace.processes.get_mut(&pid)) {
            Some(process) => process,
            None => {
                debug!("ignoring memory map {} of an untraced process", filename);
                continue;
            }
        };
        let path: PathBuf = dir.join(&filename);
        let maps = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        match vptr2sym::find_library_base(&maps, library)? {
            Some(base) => {
                debug!("{} loaded at {:#x} in process {}", library, base, process.id);
                process.mem_offset = base;
            }
            None => warn!("{} is not mapped in {}", library, filename),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_filename_gives_pid_and_name() {
        assert_eq!(
            parse_profile_filename("profile_3810_b2g.txt").unwrap(),
            (3810, "b2g".to_string())
        );
        assert_eq!(
            parse_profile_filename("profile_4021_Built_in_Keyboard.txt").unwrap(),
            (4021, "Built_in_Keyboard".to_string())
        );
    }

    #[test]
    fn malformed_profile_filenames_fail() {
        let err = parse_profile_filename("profile_3810.txt").unwrap_err();
        assert_eq!(err.line.as_deref(), Some("profile_3810.txt"));
        assert!(parse_profile_filename("profile_b2g_3810.txt").is_err());
        assert!(parse_profile_filename("profile_3810_b2g").is_err());
    }

    #[test]
    fn only_profile_txt_files_are_read() {
        assert!(is_profile("profile_1_b2g.txt"));
        assert!(!is_profile("profile_1_b2g.json"));
        assert!(!is_profile("trace_1_b2g.txt"));
    }

    #[test]
    fn pre_split_entries_are_joined() {
        let json = r#"{"tasktracer": {
            "data": ["0 7 1000 3 1 5", [1, 7, 1200, 3810, 3811], ["3", "7", "1300", "\"a b\""]],
            "threads": [{"tid": 3811, "name": "Compositor"}],
            "start": 900
        }}"#;
        let mut trace = TraceData::new();
        read_profile(&mut trace, 3810, "b2g", json, Path::new("profile_3810_b2g.txt")).unwrap();
        let task = &trace.tasks[&7];
        assert_eq!(task.latency, 200);
        assert_eq!(task.thread_name, "Compositor");
        assert_eq!(task.labels[0].label, "a b");
        assert_eq!(trace.processes[&3810].start, 900);
    }

    #[test]
    fn bad_line_aborts_the_profile() {
        let json = r#"{"tasktracer": {
            "data": ["0 7 1000 3 1 5", "9 1 2"], "threads": [], "start": 0
        }}"#;
        let mut trace = TraceData::new();
        let err = read_profile(&mut trace, 1, "b2g", json, Path::new("p")).unwrap_err();
        match err {
            Error::Parse(e) => assert_eq!(e.line.as_deref(), Some("9 1 2")),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!trace.tasks.contains_key(&1));
    }
}
