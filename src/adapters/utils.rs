//! Shared helpers for the host adapters.
//!
//! [`run_command`] runs one external program on a helper thread and hands
//! the result back to the executor through an `embassy-sync` [`Signal`],
//! so a slow `nmcli` never stalls the link task.
//!
//! ```text
//!  executor task ── spawn thread ──▶ Command::spawn
//!       │                               │ try_wait / kill on deadline
//!       └──── Signal::wait ◀── signal ──┘
//! ```

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::debug;

use crate::app::commands::{OUTPUT_LIMIT, truncate_output};
use crate::app::ports::SystemError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout, else stderr, else `rc=N`; capped at the output limit.
    pub fn text(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        let text = if !out.is_empty() {
            out.to_string()
        } else if !err.is_empty() {
            err.to_string()
        } else {
            format!("rc={}", self.code.unwrap_or(-1))
        };
        truncate_output(&text, OUTPUT_LIMIT)
    }

    /// `Ok(text)` on exit status 0, `Err(Failed(text))` otherwise.
    pub fn into_result(self) -> Result<String, SystemError> {
        let text = self.text();
        if self.success() {
            Ok(text)
        } else {
            Err(SystemError::Failed(text))
        }
    }
}

type Completion = Signal<CriticalSectionRawMutex, Result<CommandOutput, SystemError>>;

/// Run `program args..` with a hard deadline. The process is killed when
/// the deadline passes.
pub async fn run_command(
    program: &'static str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, SystemError> {
    let done: Arc<Completion> = Arc::new(Signal::new());
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();

    let signal = done.clone();
    let spawned = thread::Builder::new()
        .name(format!("exec-{program}"))
        .spawn(move || signal.signal(run_blocking(program, &args, timeout)));
    if let Err(e) = spawned {
        return Err(SystemError::Io(e.to_string()));
    }

    done.wait().await
}

fn run_blocking(
    program: &'static str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, SystemError> {
    debug!("EXEC: {} {}", program, args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SystemError::NotFound(program),
            _ => SystemError::Io(e.to_string()),
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SystemError::Timeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(SystemError::Io(e.to_string())),
        }
    };

    let collect = |reader: Option<thread::JoinHandle<String>>| {
        reader.and_then(|r| r.join().ok()).unwrap_or_default()
    };
    Ok(CommandOutput {
        code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// First executable among `candidates`, searching `PATH` for bare names.
pub fn resolve_binary(candidates: &[&'static str]) -> Option<&'static str> {
    candidates.iter().copied().find(|candidate| {
        if candidate.starts_with('/') {
            is_executable(std::path::Path::new(candidate))
        } else {
            std::env::var_os("PATH").is_some_and(|paths| {
                std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(candidate)))
            })
        }
    })
}

fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// First dotted-quad IPv4 address in `text`.
pub fn first_ipv4(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find(|token| token.parse::<std::net::Ipv4Addr>().is_ok())
        .map(str::to_string)
}

/// Split one `nmcli -t` line into at most `fields` fields.
///
/// A backslash escapes the next character; once `fields - 1` separators
/// have been seen the rest of the line is the last field.
pub fn split_terse(line: &str, fields: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(fields);
    let mut buf = String::new();
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            buf.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ':' && out.len() + 1 < fields {
            out.push(core::mem::take(&mut buf));
        } else {
            buf.push(ch);
        }
    }
    out.push(buf);
    out
}
