//! Log setup: timestamped lines to stderr and to the log file.
//!
//! Every module logs through the `log` facade. `init` installs `env_logger`
//! with a `[HH:MM:SS.mmm] LEVEL target: message` format and a writer that
//! copies each line into `<logs_dir>/drug_capture.log`.

use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::str::FromStr;

use crate::paths;

const LOG_FILE_NAME: &str = "drug_capture.log";

/// Writes to stderr and, when it could be opened, to the log file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // A failing log file must not take console logging down with it
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

fn level_filter(level: &str) -> LevelFilter {
    LevelFilter::from_str(level).unwrap_or(LevelFilter::Info)
}

/// Installs the global logger. `level` is used unless `RUST_LOG` is set.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(level: &str) {
    let file = paths::ensure_directories().ok().and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(paths::get_logs_dir().join(LOG_FILE_NAME))
            .ok()
    });

    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}: {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(TeeWriter { file })));

    let _ = builder.try_init();
    set_level(level);
}

/// Changes the active level after startup. Ignored when `RUST_LOG` is set.
pub fn set_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    log::set_max_level(level_filter(level));
}

/// Routes panics through the logger so they land in the log file too.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();
        log::error!("[PANIC]{} {}", location, msg);
    }));
}
