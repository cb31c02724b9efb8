use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Install the process-wide logger. Must be called once, before any
/// worker is started.
pub fn init_logging(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    Builder::new()
        .filter_level(level)
        .parse_env(Env::default().filter("RUST_LOG"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {:>28} - {:>5} - {}",
                buf.timestamp_millis(),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .init();
}
