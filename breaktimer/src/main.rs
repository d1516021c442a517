use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dirs::home_dir;
use serde::Serialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const LOCK_DIR_ENV: &str = "BREAKTIMER_LOCK_DIR";
const LOCK_FILE_NAME: &str = "breaktimer.pid";

#[derive(Parser, Debug)]
#[command(name = "breaktimer", version, about = "Typing break reminder helper")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Start {
        #[arg(long, default_value_t = 180)]
        interval_sec: u64,
        #[arg(long, default_value_t = false)]
        once: bool,
        #[arg(long)]
        notify_command: Option<String>,
    },
    Status,
}

#[derive(Debug, Error)]
enum BreakError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("another break reminder is already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("{0}")]
    Process(String),
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

/// Elapsed wall-clock time since the last (re)start. Real time rather than
/// a monotonic clock: a suspended machine still counts toward the break.
#[derive(Debug, Clone)]
struct BreakTimer {
    start_time: DateTime<Utc>,
}

impl BreakTimer {
    fn start() -> Self {
        Self {
            start_time: Utc::now(),
        }
    }

    fn restart(&mut self) {
        self.start_time = Utc::now();
    }

    fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}

/// Single-instance ownership through an exclusive pid file. Whoever holds
/// the file is the master; a lock whose recorded pid is gone is stale and
/// gets reclaimed.
#[derive(Debug)]
struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    fn acquire(path: &Path) -> Result<Self, BreakError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    writeln!(file, "{}", std::process::id())?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    match read_lock_pid(path) {
                        Some(pid) if process_alive(pid) => {
                            return Err(BreakError::AlreadyRunning(pid))
                        }
                        _ => {
                            // Stale or unreadable owner; reclaim and retry.
                            fs::remove_file(path)?;
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(BreakError::Process(format!(
            "could not acquire lock {}",
            path.display()
        )))
    }

    fn stop(mut self) -> Result<(), BreakError> {
        self.released = true;
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_lock_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn process_alive(pid: u32) -> bool {
    // Prefer procfs where it exists; `kill -0` covers the rest.
    if Path::new("/proc").is_dir() {
        return Path::new("/proc").join(pid.to_string()).exists();
    }
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn lock_file_path() -> PathBuf {
    let dir = match env::var(LOCK_DIR_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => {
            let mut base = home_dir().unwrap_or_else(|| PathBuf::from("."));
            base.push(".config");
            base.push("breaktimer");
            base
        }
    };
    dir.join(LOCK_FILE_NAME)
}

fn main() -> Result<(), BreakError> {
    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Start {
            interval_sec,
            once,
            notify_command,
        } => handle_start(json, interval_sec, once, notify_command.as_deref()),
        Commands::Status => handle_status(json),
    };

    if let Err(err) = result {
        if json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), BreakError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ReminderEvent {
    event: &'static str,
    reminder: u64,
    elapsed_sec: i64,
}

fn emit_reminder(json: bool, reminder: u64, elapsed_sec: i64, notify_command: Option<&str>) {
    if json {
        let event = ReminderEvent {
            event: "break",
            reminder,
            elapsed_sec,
        };
        if let Ok(text) = serde_json::to_string(&event) {
            println!("{}", text);
        }
    } else {
        println!("time for a typing break ({elapsed_sec}s at the keyboard)");
    }
    if let Some(command) = notify_command {
        // Fire-and-forget; a failed notifier never stops the reminder loop.
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(err) = spawned {
            eprintln!("notify command failed: {err}");
        }
    }
}

fn handle_start(
    json: bool,
    interval_sec: u64,
    once: bool,
    notify_command: Option<&str>,
) -> Result<(), BreakError> {
    let lock = InstanceLock::acquire(&lock_file_path())?;
    let mut timer = BreakTimer::start();
    let mut reminders = 0u64;
    loop {
        if timer.elapsed_secs() >= interval_sec as i64 {
            reminders += 1;
            emit_reminder(json, reminders, timer.elapsed_secs(), notify_command);
            if once {
                break;
            }
            timer.restart();
        }
        thread::sleep(Duration::from_secs(1));
    }
    lock.stop()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusResult {
    active: bool,
    pid: Option<u32>,
    lock_path: String,
}

fn handle_status(json: bool) -> Result<(), BreakError> {
    let path = lock_file_path();
    let pid = read_lock_pid(&path);
    let active = pid.map(process_alive).unwrap_or(false);
    let status = StatusResult {
        active,
        pid: if active { pid } else { None },
        lock_path: path.to_string_lossy().to_string(),
    };
    if json {
        print_json(&JsonResult {
            ok: true,
            result: Some(status),
            error: None,
        })?;
    } else if active {
        println!("break reminder running (pid {})", status.pid.unwrap_or(0));
    } else {
        println!("no break reminder running");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn timer_started_secs_ago(secs: i64) -> BreakTimer {
        BreakTimer {
            start_time: Utc::now() - chrono::Duration::seconds(secs),
        }
    }

    #[test]
    fn timer_starts_near_zero() {
        let timer = BreakTimer::start();
        assert!((0..=1).contains(&timer.elapsed_secs()));
    }

    #[test]
    fn timer_measures_wall_clock_seconds() {
        let timer = timer_started_secs_ago(10);
        assert!(timer.elapsed_secs() >= 10);
    }

    #[test]
    fn timer_restart_rebases() {
        let mut timer = timer_started_secs_ago(10);
        timer.restart();
        assert!(timer.elapsed_secs() < 10);
    }

    #[test]
    fn lock_acquire_makes_this_process_the_master() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_lock_pid(&path), Some(std::process::id()));

        // The recorded pid is this (live) process, so a second acquire
        // must report the existing master.
        let err = InstanceLock::acquire(&path).unwrap_err();
        match err {
            BreakError::AlreadyRunning(pid) => assert_eq!(pid, std::process::id()),
            other => panic!("unexpected error: {other}"),
        }

        lock.stop().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn lock_reclaims_stale_owner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        fs::write(&path, "999999999\n").unwrap();

        let lock = InstanceLock::acquire(&path).expect("stale lock should be reclaimed");
        assert_eq!(read_lock_pid(&path), Some(std::process::id()));
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn lock_reclaims_garbage_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        fs::write(&path, "not-a-pid\n").unwrap();

        let lock = InstanceLock::acquire(&path).expect("garbage lock should be reclaimed");
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn dropping_the_lock_releases_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        {
            let _lock = InstanceLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
        let _relock = InstanceLock::acquire(&path).unwrap();
    }

    #[test]
    fn lock_pid_parsing_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        assert_eq!(read_lock_pid(&path), None);
        fs::write(&path, "garbage").unwrap();
        assert_eq!(read_lock_pid(&path), None);
        fs::write(&path, " 4321 \n").unwrap();
        assert_eq!(read_lock_pid(&path), Some(4321));
    }
}
