//! TaskTracer log lines.
//!
//! Every line starts with a one digit log type followed by space separated
//! fields:
//!
//! ```text
//! 0 taskId dispatch sourceEventId sourceEventType parentTaskId   DISPATCH
//! 1 taskId begin processId threadId                              BEGIN
//! 2 taskId end                                                   END
//! 3 taskId timestamp "label"                                     LABEL
//! 4 taskId vptr                                                  VPTR
//! ```

use crate::error::ParseError;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Dispatch {
        task_id: u64,
        time: i64,
        source_event_id: u64,
        source_event_type: u32,
        parent_task_id: u64,
    },
    Begin {
        task_id: u64,
        time: i64,
        process_id: u64,
        thread_id: u64,
    },
    End {
        task_id: u64,
        time: i64,
    },
    Label {
        task_id: u64,
        time: i64,
        text: String,
    },
    Vptr {
        task_id: u64,
        address: u64,
    },
}

impl LogRecord {
    pub fn task_id(&self) -> u64 {
        match *self {
            LogRecord::Dispatch { task_id, .. }
            | LogRecord::Begin { task_id, .. }
            | LogRecord::End { task_id, .. }
            | LogRecord::Label { task_id, .. }
            | LogRecord::Vptr { task_id, .. } => task_id,
        }
    }
}

/// Split `text` on `delim`, failing if the delimiter is missing or occurs
/// fewer than `min_splits` times. With `max_splits` the tail is left
/// unsplit, like `str::splitn`.
pub fn split_fields(
    text: &str,
    delim: char,
    min_splits: usize,
    max_splits: Option<usize>,
) -> Result<Vec<&str>, ParseError> {
    let found = text.matches(delim).count();
    if found == 0 {
        return Err(ParseError::new(format!("Extract error: no '{}'", delim)));
    }
    if found < min_splits {
        return Err(ParseError::new(format!("Extract error: not enough '{}'", delim)));
    }
    Ok(match max_splits {
        Some(n) => text.splitn(n + 1, delim).collect(),
        None => text.split(delim).collect(),
    })
}

fn field<T: FromStr>(token: &str, what: &str) -> Result<T, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::new(format!("Verify error: bad {} '{}'", what, token)))
}

fn hex_field(token: &str, what: &str) -> Result<u64, ParseError> {
    let digits = token.strip_prefix("0x").unwrap_or(token);
    u64::from_str_radix(digits, 16)
        .map_err(|_| ParseError::new(format!("Verify error: bad {} '{}'", what, token)))
}

/// Number of fields after the log type, or `None` for an unknown type.
fn expected_fields(log_type: u8) -> Option<usize> {
    match log_type {
        0 => Some(5),
        1 => Some(4),
        2 => Some(2),
        3 => Some(3),
        4 => Some(2),
        _ => None,
    }
}

/// Parse one log line. Errors carry the offending line.
pub fn parse_line(line: &str) -> Result<LogRecord, ParseError> {
    let line = line.trim();
    parse_fields(line).map_err(|e| e.at(line))
}

fn parse_fields(line: &str) -> Result<LogRecord, ParseError> {
    let head = split_fields(line, ' ', 1, Some(1))?;
    let (log_type, remain) = (head[0], head[1]);

    let code = log_type
        .parse::<u8>()
        .ok()
        .filter(|code| expected_fields(*code).is_some())
        .ok_or_else(|| ParseError::new(format!("Verify error: invalid log type '{}'", log_type)))?;
    let expected = expected_fields(code).unwrap_or_default();

    if code == 3 {
        // the label text may contain spaces, only taskId and timestamp are split off
        let tokens = split_fields(remain, ' ', expected - 1, Some(expected - 1))?;
        return Ok(LogRecord::Label {
            task_id: field(tokens[0], "taskId")?,
            time: field(tokens[1], "timestamp")?,
            text: tokens[2].replace('"', ""),
        });
    }

    let tokens = split_fields(remain, ' ', expected - 1, None)?;
    if tokens.len() != expected {
        return Err(ParseError::new("Verify error: incomplete information"));
    }
    let task_id = field(tokens[0], "taskId")?;
    Ok(match code {
        0 => LogRecord::Dispatch {
            task_id,
            time: field(tokens[1], "dispatch time")?,
            source_event_id: field(tokens[2], "sourceEventId")?,
            source_event_type: field(tokens[3], "sourceEventType")?,
            parent_task_id: field(tokens[4], "parentTaskId")?,
        },
        1 => LogRecord::Begin {
            task_id,
            time: field(tokens[1], "begin time")?,
            process_id: field(tokens[2], "processId")?,
            thread_id: field(tokens[3], "threadId")?,
        },
        2 => LogRecord::End { task_id, time: field(tokens[1], "end time")? },
        _ => LogRecord::Vptr { task_id, address: hex_field(tokens[1], "vptr")? },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_log_type() {
        assert_eq!(
            parse_line("0 7 1000 3 1 5").unwrap(),
            LogRecord::Dispatch {
                task_id: 7,
                time: 1000,
                source_event_id: 3,
                source_event_type: 1,
                parent_task_id: 5
            }
        );
        assert_eq!(
            parse_line("1 7 1200 3810 3811\n").unwrap(),
            LogRecord::Begin { task_id: 7, time: 1200, process_id: 3810, thread_id: 3811 }
        );
        assert_eq!(parse_line("2 7 1500").unwrap(), LogRecord::End { task_id: 7, time: 1500 });
        assert_eq!(
            parse_line("4 7 4a2c5f10").unwrap(),
            LogRecord::Vptr { task_id: 7, address: 0x4a2c5f10 }
        );
        assert_eq!(
            parse_line("4 7 0x10").unwrap(),
            LogRecord::Vptr { task_id: 7, address: 0x10 }
        );
    }

    #[test]
    fn label_keeps_embedded_spaces() {
        let record = parse_line("3 7 1000 \"hello world\"").unwrap();
        assert_eq!(
            record,
            LogRecord::Label { task_id: 7, time: 1000, text: "hello world".to_string() }
        );
        assert_eq!(record.task_id(), 7);
    }

    #[test]
    fn unknown_log_type_is_rejected() {
        let err = parse_line("9 1 2").unwrap_err();
        assert_eq!(err.msg, "Verify error: invalid log type '9'");
        assert_eq!(err.line.as_deref(), Some("9 1 2"));
        assert!(parse_line("x 1 2").is_err());
    }

    #[test]
    fn field_count_must_match_exactly() {
        // too few: caught before splitting
        let err = parse_line("0 7 1000 3").unwrap_err();
        assert_eq!(err.msg, "Extract error: not enough ' '");
        // too many
        let err = parse_line("2 7 1500 9").unwrap_err();
        assert_eq!(err.msg, "Verify error: incomplete information");
        // no delimiter at all
        let err = parse_line("2 7").unwrap_err();
        assert_eq!(err.msg, "Extract error: no ' '");
        assert!(parse_line("3 7 1000").is_err());
        assert!(parse_line("2").is_err());
    }

    #[test]
    fn non_numeric_fields_are_parse_errors() {
        let err = parse_line("2 7 soon").unwrap_err();
        assert_eq!(err.msg, "Verify error: bad end time 'soon'");
        assert!(parse_line("4 7 xyz").is_err());
    }

    #[test]
    fn split_fields_limits_splits() {
        assert_eq!(split_fields("a b c d", ' ', 2, Some(2)).unwrap(), vec!["a", "b", "c d"]);
        assert_eq!(split_fields("profile_1_b2g", '_', 0, None).unwrap().len(), 3);
        assert!(split_fields("abc", '_', 0, None).is_err());
    }
}
