use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable consulted for the log level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Logs against the `phase` span, used by the orchestrator for progress lines.
#[macro_export]
macro_rules! phase {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "phase", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::phase!(level = INFO, $($msg),*)
    };
}

/// Logs against the `wire` span, used for protocol-level chatter.
#[macro_export]
macro_rules! wire {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "wire", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::wire!(level = TRACE, $($msg),*)
    };
}

/// Resolves the level filter from an optional raw value, falling back to
/// `default` (with a note on stderr) when the value cannot be parsed.
pub fn level_from(raw: Option<&str>, default: LevelFilter) -> LevelFilter {
    raw.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Installs the global subscriber. Output goes to stderr so that stdout only
/// carries the run report.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var(LOG_LEVEL_ENV).ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("mailprobe")
                })),
        )
        .init();
}
