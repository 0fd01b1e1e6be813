use crate::config::LogConfig;
use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Once, RwLock};

static ENABLED: AtomicBool = AtomicBool::new(true);

#[inline(always)]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst)
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst)
}

/// Global logger whose sink can be replaced at runtime.
///
/// `log` allows installing a logger only once per process, so the switcher is
/// installed instead and forwards records to the current sink. Hosts embedding
/// the engine (and tests) swap the sink with [`LoggerSwitcher::switch`].
pub struct LoggerSwitcher {
    sink: RwLock<Option<Box<dyn Log>>>,
    installed: Once,
}

pub static LOGGER_SWITCHER: Lazy<LoggerSwitcher> = Lazy::new(|| LoggerSwitcher {
    sink: RwLock::new(None),
    installed: Once::new(),
});

impl LoggerSwitcher {
    /// Replace current sink and max level filter.
    pub fn switch(&'static self, logger: impl Log + 'static, filter: LevelFilter) {
        self.installed.call_once(|| {
            if log::set_logger(self).is_err() {
                eprintln!("rdbg: global logger already installed, log records are not captured");
            }
        });
        if let Ok(mut sink) = self.sink.write() {
            *sink = Some(Box::new(logger));
        }
        log::set_max_level(filter);
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if !is_enabled() {
            return false;
        }
        self.sink
            .read()
            .map(|sink| sink.as_ref().is_some_and(|l| l.enabled(metadata)))
            .unwrap_or(false)
    }

    fn log(&self, record: &Record) {
        if !is_enabled() {
            return;
        }
        if let Ok(sink) = self.sink.read() {
            if let Some(logger) = sink.as_ref() {
                logger.log(record);
            }
        }
    }

    fn flush(&self) {
        if let Ok(sink) = self.sink.read() {
            if let Some(logger) = sink.as_ref() {
                logger.flush();
            }
        }
    }
}

/// Install an env_logger sink configured from `config`.
///
/// `RUST_LOG` is honored, an explicit filter from configuration overrides it.
pub fn init(config: &LogConfig) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(filter) = config.filter.as_deref() {
        builder.parse_filters(filter);
    }
    let logger = builder.build();
    let filter = logger.filter();
    LOGGER_SWITCHER.switch(logger, filter);
}
