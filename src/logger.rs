use chrono::Local;
use log::{Record, Metadata};

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

pub fn init() -> Result<(), log::SetLoggerError> {
    let logger = sentry_log::SentryLogger::with_dest(Logger);

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(log::LevelFilter::Info);

    Ok(())
}
