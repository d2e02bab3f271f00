use crate::error::{Error, Result};
use crate::timeline::Timeline;
use crate::trace::{Process, Task, Thread};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct TraceJson<'a> {
    begin: i64,
    end: i64,
    processes: Vec<&'a Process>,
    threads: Vec<&'a Thread>,
    tasks: &'a [Task],
}

pub fn write_json<W: Write>(
    writer: W,
    timeline: &Timeline,
    processes: &BTreeMap<u64, Process>,
    threads: &BTreeMap<u64, Thread>,
) -> serde_json::Result<()> {
    let json = TraceJson {
        begin: timeline.begin,
        end: timeline.end,
        processes: processes.values().collect(),
        threads: threads.values().collect(),
        tasks: &timeline.tasks,
    };
    serde_json::to_writer_pretty(writer, &json)
}

pub fn write_json_file(
    path: &Path,
    timeline: &Timeline,
    processes: &BTreeMap<u64, Process>,
    threads: &BTreeMap<u64, Thread>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_json(&mut writer, timeline, processes, threads)
        .map_err(|source| Error::Output { path: path.to_path_buf(), source })?;
    writer.flush().map_err(|e| Error::io(path, e))
}
