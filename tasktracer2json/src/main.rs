//! Convert Gecko TaskTracer profiles into one JSON timeline of tasks.
//!
//! The profiles of all processes are read from one directory, task vtable
//! pointers are named using the memory maps of each process and the symbols
//! of libxul.so, and the result is written to `tasktracer_data.json`.

mod error;
mod input;
mod output;
mod record;
mod timeline;
mod trace;

use clap::Parser;
use error::Result;
use log::info;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use trace::TraceData;
use vptr2sym::{ElfSymbolSource, ListingSymbolSource, NmSymbolSource, SymbolSource};

const LIBRARY_NAME: &str = "libxul.so";
const NM_NAME: &str = "arm-linux-androideabi-nm";

/// Tasks that only wrap or dequeue other tasks; they'd show up as noise
/// around the tasks they run.
const WRAPPER_TASK_NAMES: [&str; 2] =
    ["vtable for mozilla::ipc::DoWorkRunnable", "vtable for nsTimerEvent"];

#[derive(Parser, Debug)]
#[clap(version, about = "Convert TaskTracer profiles to a JSON task timeline")]
struct Args {
    /// Directory holding the profile_<pid>_<name>.txt files
    #[clap(long, env = "ANDROID_BUILD_TOP", parse(from_os_str))]
    log_dir: PathBuf,

    /// Directory holding <prefix>_<pid> snapshots of /proc/<pid>/maps
    #[clap(long, default_value = "/tmp/mmap", parse(from_os_str))]
    mmap_dir: PathBuf,

    /// Gecko object directory; libxul.so is taken from <objdir>/dist/bin
    #[clap(long, env = "GECKO_OBJDIR", parse(from_os_str), required_unless_present = "library")]
    objdir: Option<PathBuf>,

    /// Path of libxul.so, overriding --objdir
    #[clap(long, parse(from_os_str))]
    library: Option<PathBuf>,

    /// Toolchain directory containing arm-linux-androideabi-nm; without it
    /// symbols are read from the library directly
    #[clap(long, env = "ANDROID_EABI_TOOLCHAIN", parse(from_os_str))]
    toolchain: Option<PathBuf>,

    /// Pre-generated "<hex address> <type> <demangled name>" listing to use
    /// instead of reading the library
    #[clap(long, parse(from_os_str))]
    symbols: Option<PathBuf>,

    /// Additional task name to drop from the output (repeatable)
    #[clap(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,

    #[clap(long, short, default_value = "tasktracer_data.json", parse(from_os_str))]
    output: PathBuf,
}

/// Everything a conversion run needs, resolved from the command line.
struct Config {
    log_dir: PathBuf,
    mmap_dir: PathBuf,
    library: PathBuf,
    library_name: String,
    ignored_names: BTreeSet<String>,
    output: PathBuf,
}

impl Args {
    fn library(&self) -> PathBuf {
        match (&self.library, &self.objdir) {
            (Some(library), _) => library.clone(),
            (None, Some(objdir)) => objdir.join("dist").join("bin").join(LIBRARY_NAME),
            // clap enforces one of the two
            (None, None) => PathBuf::from(LIBRARY_NAME),
        }
    }

    fn config(&self) -> Config {
        let library = self.library();
        let library_name = library
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| LIBRARY_NAME.to_string());
        let ignored_names = WRAPPER_TASK_NAMES
            .iter()
            .map(|name| name.to_string())
            .chain(self.ignore.iter().cloned())
            .collect();
        Config {
            log_dir: self.log_dir.clone(),
            mmap_dir: self.mmap_dir.clone(),
            library,
            library_name,
            ignored_names,
            output: self.output.clone(),
        }
    }

    fn symbol_source(&self, library: &Path) -> Box<dyn SymbolSource> {
        if let Some(path) = &self.symbols {
            Box::new(ListingSymbolSource { path: path.clone() })
        } else if let Some(toolchain) = &self.toolchain {
            Box::new(NmSymbolSource { nm: toolchain.join(NM_NAME), library: library.to_path_buf() })
        } else {
            Box::new(ElfSymbolSource { library: library.to_path_buf() })
        }
    }
}

/// Run the whole conversion. Returns the number of tasks written, or `None`
/// if there was nothing to write.
fn convert(config: &Config, symbols: &dyn SymbolSource) -> Result<Option<usize>> {
    let mut trace = TraceData::new();
    input::read_profiles(&mut trace, &config.log_dir)?;
    println!("\n{} tasks have been created successfully.", trace.tasks.len());

    println!("\nRetrieving task name...");
    input::read_mmaps(&mut trace, &config.mmap_dir, &config.library_name)?;
    let table = symbols.load()?;
    info!("loaded {} symbols", table.len());
    trace.resolve_task_names(&table);
    trace.remove_tasks_named(&config.ignored_names);

    let origin = match timeline::earliest_start(&trace.processes) {
        Some(origin) if !trace.tasks.is_empty() => origin,
        _ => return Ok(None),
    };

    let TraceData { processes, threads, tasks } = trace;
    let timeline = timeline::build(tasks, origin);
    output::write_json_file(&config.output, &timeline, &processes, &threads)?;
    Ok(Some(timeline.tasks.len()))
}

fn run(args: Args) -> Result<()> {
    let config = args.config();
    let symbols = args.symbol_source(&config.library);

    println!("=====================================================");
    println!("Input log path: {}", config.log_dir.display());
    println!("Input mmap path: {}", config.mmap_dir.display());
    println!("{} path: {}", config.library_name, config.library.display());
    if let Some(toolchain) = &args.toolchain {
        println!("nm path: {}", toolchain.join(NM_NAME).display());
    }
    println!("Output: {}", config.output.display());
    println!("=====================================================");

    if let Some(count) = convert(&config, symbols.as_ref())? {
        println!(
            "\nDone! {} tasks have been written to {} successfully.",
            count,
            config.output.display()
        );
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use vptr2sym::{Symbol, SymbolTable};

    struct FixedSymbols(Vec<Symbol>);

    impl SymbolSource for FixedSymbols {
        fn load(&self) -> vptr2sym::Result<SymbolTable> {
            Ok(SymbolTable::new(self.0.clone()))
        }
    }

    fn symbols() -> FixedSymbols {
        FixedSymbols(vec![
            Symbol::new(0x100, "vtable for nsTimerEvent"),
            Symbol::new(0x200, "vtable for nsAppShell"),
            Symbol::new(0x300, "vtable for nsThread"),
        ])
    }

    fn config(root: &Path) -> Config {
        let args = Args::parse_from([
            "tasktracer2json",
            "--log-dir",
            root.join("logs").to_str().unwrap(),
            "--mmap-dir",
            root.join("mmap").to_str().unwrap(),
            "--library",
            "/nonexistent/dist/bin/libxul.so",
            "--output",
            root.join("out.json").to_str().unwrap(),
        ]);
        args.config()
    }

    fn write(path: PathBuf, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn converts_a_two_process_trace() {
        let root = tempfile::tempdir().unwrap();
        write(
            root.path().join("logs/profile_100_b2g.txt"),
            r#"{"tasktracer": {
                "data": [
                    "0 1 1010 0 1 0",
                    "4 1 40000250",
                    "1 1 1020 100 101",
                    "3 1 1025 \"hello world\"",
                    "2 1 1030",
                    "0 2 1010 0 1 1",
                    "4 2 40000110",
                    "1 2 1040 100 101",
                    "2 2 1050",
                    "0 3 1010 0 1 1"
                ],
                "threads": [{"tid": 101, "name": "Main"}],
                "start": 1000
            }}"#,
        );
        write(
            root.path().join("logs/profile_200_Homescreen.txt"),
            r#"{"tasktracer": {
                "data": ["0 4 1005 0 1 0", "1 4 1060 200 201"],
                "threads": [],
                "start": 1002
            }}"#,
        );
        write(root.path().join("logs/notes.txt"), "ignored");
        write(
            root.path().join("mmap/mmap_100"),
            "00008000-0000a000 r-xp 00000000 1f:01 331 /system/b2g/b2g\n\
             40000000-42000000 r-xp 00000000 1f:01 412 /system/b2g/libxul.so\n",
        );
        write(root.path().join("mmap/mmap_999"), "garbage");

        let config = config(root.path());
        let written = convert(&config, &symbols()).unwrap();
        assert_eq!(written, Some(3));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&config.output).unwrap()).unwrap();
        assert_eq!(json["begin"], 0);
        assert_eq!(json["end"], 60);
        assert_eq!(json["processes"].as_array().unwrap().len(), 2);
        assert_eq!(
            json["threads"],
            serde_json::json!([
                {"id": 101, "name": "Main"},
                {"id": 201, "name": ""}
            ])
        );

        let tasks = json["tasks"].as_array().unwrap();
        // task 2 is a timer wrapper and was dropped; 1 and 3 tie on dispatch
        let ids: Vec<u64> = tasks.iter().map(|t| t["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![4, 1, 3]);

        let first = &tasks[1];
        assert_eq!(first["name"], "vtable for nsAppShell");
        assert_eq!(first["processName"], "b2g");
        assert_eq!(first["threadName"], "Main");
        assert_eq!(first["dispatch"], 10);
        assert_eq!(first["begin"], 20);
        assert_eq!(first["end"], 30);
        assert_eq!(first["latency"], 10);
        assert_eq!(first["executionTime"], 10);
        assert_eq!(
            first["labels"],
            serde_json::json!([{"timestamp": 1025, "label": "hello world"}])
        );

        let never_ran = &tasks[2];
        assert_eq!(never_ran["begin"], 60);
        assert_eq!(never_ran["end"], 60);
        assert_eq!(never_ran["threadName"], "");

        let unfinished = &tasks[0];
        assert_eq!(unfinished["processName"], "Homescreen");
        assert_eq!(unfinished["name"], "");
        assert_eq!(unfinished["dispatch"], 5);
        assert_eq!(unfinished["begin"], 60);
        assert_eq!(unfinished["end"], 60);
    }

    #[test]
    fn parse_error_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        write(
            root.path().join("logs/profile_100_b2g.txt"),
            r#"{"tasktracer": {
                "data": ["0 1 1010 0 1 0", "9 1 2"], "threads": [], "start": 1000
            }}"#,
        );
        fs::create_dir_all(root.path().join("mmap")).unwrap();

        let config = config(root.path());
        let err = convert(&config, &symbols()).unwrap_err();
        assert!(err.to_string().contains("@line: '9 1 2'"));
        assert!(!config.output.exists());
    }

    #[test]
    fn no_tasks_means_no_output() {
        let root = tempfile::tempdir().unwrap();
        write(
            root.path().join("logs/profile_100_b2g.txt"),
            r#"{"tasktracer": {"data": [], "threads": [], "start": 1000}}"#,
        );
        fs::create_dir_all(root.path().join("mmap")).unwrap();

        let config = config(root.path());
        assert_eq!(convert(&config, &symbols()).unwrap(), None);
        assert!(!config.output.exists());
    }

    #[test]
    fn default_ignore_list_can_be_extended() {
        let args = Args::parse_from([
            "tasktracer2json",
            "--log-dir",
            "logs",
            "--objdir",
            "/objdir",
            "--ignore",
            "vtable for nsRunnable",
        ]);
        let config = args.config();
        assert_eq!(config.library, PathBuf::from("/objdir/dist/bin/libxul.so"));
        assert_eq!(config.library_name, "libxul.so");
        assert_eq!(config.ignored_names.len(), 3);
        assert!(config.ignored_names.contains("vtable for mozilla::ipc::DoWorkRunnable"));
        assert!(config.ignored_names.contains("vtable for nsRunnable"));
    }

    #[test]
    fn unset_paths_fall_back_to_fixed_locations() {
        let args =
            Args::parse_from(["tasktracer2json", "--log-dir", "logs", "--objdir", "/objdir"]);
        let config = args.config();
        assert_eq!(config.mmap_dir, PathBuf::from("/tmp/mmap"));
        assert_eq!(config.output, PathBuf::from("tasktracer_data.json"));
        assert_eq!(config.ignored_names.len(), WRAPPER_TASK_NAMES.len());
    }
}
