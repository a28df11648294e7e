use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicU8, Ordering},
        mpsc::{self, Sender},
        OnceLock,
    },
    thread,
};

use crate::utility::app_root_dir;

/* =========================
   GLOBAL STATE
   ========================= */

static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Warn as u8);
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_TX: OnceLock<Sender<String>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl Level {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

/* =========================
   PUBLIC API
   ========================= */

/// Starts the writer thread. A second call is ignored; use `set_level` to
/// apply the configured level afterwards.
pub fn init(debug: bool, level: &str) {
    set_level(debug, level);

    let path = log_path().clone();
    let (tx, rx) = mpsc::channel::<String>();
    if LOG_TX.set(tx).is_err() {
        return;
    }

    let spawned = thread::Builder::new().name("log-writer".into()).spawn(move || {
        if let Some(dir) = path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("[SWITCHER] Cannot open log file {}: {e}", path.display());
                return;
            }
        };

        while let Ok(line) = rx.recv() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    });

    if let Err(e) = spawned {
        eprintln!("[SWITCHER] Cannot start log writer: {e}");
    }
}

pub fn set_level(debug: bool, level: &str) {
    THRESHOLD.store(threshold_for(debug, level) as u8, Ordering::Relaxed);
}

/// `debug` raises the threshold to at least DEBUG. Unknown names mean INFO.
fn threshold_for(debug: bool, level: &str) -> Level {
    let parsed = Level::parse(level);
    if debug {
        Level::Debug.max(parsed.unwrap_or(Level::Debug))
    } else {
        parsed.unwrap_or(Level::Info)
    }
}

#[inline]
pub fn should_log(level: Level) -> bool {
    level <= Level::Warn || level as u8 <= THRESHOLD.load(Ordering::Relaxed)
}

pub fn log_file() -> &'static PathBuf {
    log_path()
}

/* =========================
   INTERNAL
   ========================= */

#[inline]
pub fn enqueue(level: Level, msg: String) {
    if let Some(tx) = LOG_TX.get() {
        let _ = tx.send(format_line(&timestamp(), level, &msg));
    }
}

fn format_line(ts: &str, level: Level, msg: &str) -> String {
    let msg = msg.strip_prefix("[SWITCHER]").map(str::trim_start).unwrap_or(msg);
    format!("{ts} [{}] [SWITCHER] {msg}", level.as_str())
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::Level::Debug) {
            $crate::logging::enqueue(
                $crate::logging::Level::Debug,
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log($crate::logging::Level::Info) {
            $crate::logging::enqueue(
                $crate::logging::Level::Info,
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            $crate::logging::Level::Warn,
            format!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            $crate::logging::Level::Error,
            format!($($arg)*)
        );
    }};
}

/* =========================
   PATH
   ========================= */

fn log_path() -> &'static PathBuf {
    LOG_PATH.get_or_init(|| app_root_dir().join("switcher.log"))
}
