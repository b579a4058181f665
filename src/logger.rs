use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

use crate::config::LoggingConfig;
use crate::errors::DbError;
use crate::utils::oplog::OPS_TARGET;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Builds the log4rs configuration without installing it.
///
/// With a directory, application lines go to `app.log` and op lines to `ops.log`, both rolled
/// at 10 MiB keeping `retention` files. Without one, everything goes to the console.
///
/// # Errors
/// Returns `DbError::Config` if an appender or the configuration cannot be built.
pub fn build_config(cfg: &LoggingConfig) -> Result<Config, DbError> {
    let lvl = parse_level(&cfg.level);
    let builder = match &cfg.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let app = rolling_appender(dir, "app", cfg.retention)?;
            let ops = rolling_appender(dir, "ops", cfg.retention)?;
            Config::builder()
                .appender(Appender::builder().build("app", Box::new(app)))
                .appender(Appender::builder().build("ops", Box::new(ops)))
                .logger(Logger::builder().appender("ops").additive(false).build(OPS_TARGET, lvl))
        }
        None => {
            let console =
                ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(PATTERN))).build();
            Config::builder().appender(Appender::builder().build("app", Box::new(console)))
        }
    };
    builder
        .build(Root::builder().appender("app").build(lvl))
        .map_err(|e| DbError::Config(e.to_string()))
}

fn rolling_appender(
    dir: &Path,
    stem: &str,
    retention: usize,
) -> Result<RollingFileAppender, DbError> {
    let keep = u32::try_from(retention.max(1)).unwrap_or(u32::MAX);
    let pattern = dir.join(format!("{stem}.{{}}.log"));
    let roller = FixedWindowRoller::builder()
        .build(&pattern.display().to_string(), keep)
        .map_err(|e| DbError::Config(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))
        .map_err(DbError::from)
}

/// Installs logging for the process. A second call fails since log4rs can only be installed once.
///
/// # Errors
/// Returns `DbError::Config` when the configuration is invalid or a logger is already set.
pub fn init(cfg: &LoggingConfig) -> Result<(), DbError> {
    let config = build_config(cfg)?;
    log4rs::init_config(config).map_err(|e| DbError::Config(e.to_string()))?;
    log::info!("logging initialized at level {}", cfg.level);
    Ok(())
}
