//! Stderr logger for the `log` facade.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::{stderr, Write};
use std::time::Instant;

/// Environment variable overriding the `-v` level (`error`, `warn`, `info`,
/// `debug`, `trace` or `off`).
pub const LOG_ENV: &str = "LUNA_LOG";

struct StderrLogger {
    level: LevelFilter,
    start: Instant,
}

impl Log for StderrLogger {
    #[inline(always)]
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        let mut stderr = stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:>9.3}s {:<5} {}] {}",
            elapsed,
            record.level(),
            record.target(),
            record.args()
        );
        let _ = stderr.flush();
    }

    #[inline(always)]
    fn flush(&self) {}
}

/// Level for `-v` repeated `verbosity` times.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the logger. `LUNA_LOG` wins over `-v` when it parses.
pub fn init(verbosity: u8) -> anyhow::Result<()> {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or_else(|| level_for(verbosity));

    log::set_boxed_logger(Box::new(StderrLogger {
        level,
        start: Instant::now(),
    }))
    .map_err(|e| anyhow::anyhow!("unable to install logger: {}", e))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(9), LevelFilter::Trace);
    }
}
