use crate::{Error, Result};

/// Find the load address of `library` in a /proc/<pid>/maps snapshot.
///
/// The first mapping whose line mentions the library wins; its start address
/// is the hex text before the first '-'. Returns `Ok(None)` when the library
/// isn't mapped at all.
pub fn find_library_base(maps: &str, library: &str) -> Result<Option<u64>> {
    let line = match maps.lines().find(|line| line.contains(library)) {
        Some(line) => line,
        None => return Ok(None),
    };
    let (start, _) = line
        .split_once('-')
        .ok_or_else(|| Error::parse("Extract error: no '-'", line))?;
    let base = u64::from_str_radix(start.trim(), 16)
        .map_err(|_| Error::parse(format!("Extract error: bad address '{}'", start), line))?;
    Ok(Some(base))
}
