//! Installs the process-wide [`log`] subscriber. The simulator core only ever logs through the
//! `log` facade (`log::{trace,debug,info,warn,error}!`); this module owns the one sink that's in
//! scope here (see `SPEC_FULL.md`'s Logging section) — a structured-record writer living outside
//! the core is explicitly out of scope.

use std::io::Write;

use log::LevelFilter;
use once_cell::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs an [`env_logger`] subscriber. Safe to call more than once; only the first call has
/// an effect. `level` overrides `RUST_LOG` when given (this is `--log-level` on the CLI).
pub fn init(level: Option<LevelFilter>) {
    INIT.get_or_init(|| {
        let mut builder = env_logger::Builder::new();
        match level {
            Some(level) => {
                builder.filter_level(level);
            }
            None => {
                builder.parse_env("RUST_LOG");
            }
        }
        builder.format(|buf, record| {
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("main");
            match crate::core::worker::active_host_display_name() {
                Some(host) => writeln!(
                    buf,
                    "{} [{thread_name}] {} {}: {}",
                    buf.timestamp_micros(),
                    host,
                    record.level(),
                    record.args()
                ),
                None => writeln!(
                    buf,
                    "{} [{thread_name}] {}: {}",
                    buf.timestamp_micros(),
                    record.level(),
                    record.args()
                ),
            }
        });
        builder.init();
    });
}

/// Should a log line at `level`, attributed to the currently-active host, actually be emitted?
/// A host's log-level override (§3's "log-level override") can only narrow the global filter,
/// never widen it, matching the documented per-host override semantics.
pub fn host_log_enabled(level: log::Level) -> bool {
    if !log::log_enabled!(level) {
        return false;
    }
    match crate::core::worker::active_host_log_override() {
        Some(override_level) => level <= override_level,
        None => true,
    }
}

/// Log at `level`, honoring the active host's log-level override. Prefer this over calling
/// `log::log!` directly from code that runs inside a host's event (i.e. almost everywhere in
/// `host/`).
#[macro_export]
macro_rules! host_log {
    ($level:expr, $($arg:tt)+) => {
        if $crate::core::logger::host_log_enabled($level) {
            log::log!($level, $($arg)+);
        }
    };
}
