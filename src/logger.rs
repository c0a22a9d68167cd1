use std::io::{self, IsTerminal, Write};

use log::{Level, LevelFilter, Metadata, Record};

pub const LOG_ENV: &str = "MIKU_EXT2_LOG";

struct StderrLogger {
    color: bool,
}

static LOGGER_COLOR: StderrLogger = StderrLogger { color: true };
static LOGGER_PLAIN: StderrLogger = StderrLogger { color: false };

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut err = io::stderr().lock();
        let _ = if self.color {
            let code: u8 = match record.level() {
                Level::Error => 31,
                Level::Warn => 93,
                Level::Info => 34,
                Level::Debug => 32,
                Level::Trace => 90,
            };
            writeln!(err, "\x1b[{code}m[{:>5}] {}\x1b[0m", record.level(), record.args())
        } else {
            writeln!(err, "[{:>5}] {}", record.level(), record.args())
        };
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Level named by `value`, `warn` when unset or unrecognised.
pub fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Warn)
}

/// Installs the stderr logger with the level from `MIKU_EXT2_LOG`.
/// Later calls keep the first logger.
pub fn init() {
    let level = parse_level(std::env::var(LOG_ENV).ok().as_deref());
    let color = io::stderr().is_terminal();
    let logger: &'static StderrLogger = if color { &LOGGER_COLOR } else { &LOGGER_PLAIN };

    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}
