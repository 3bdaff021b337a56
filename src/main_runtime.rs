use adaptive_options::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Console logging plus a daily rolling file when a log directory is usable.
///
/// `RUST_LOG` wins over the configured level. The file directory comes from
/// `ADAPTIVE_LOG_DIR`, then `logging.dir`.
pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},adaptive_options=debug", logging.level))
    });

    let log_dir = std::env::var("ADAPTIVE_LOG_DIR")
        .ok()
        .map(std::path::PathBuf::from)
        .or_else(|| logging.dir.clone());

    // `tracing_appender::rolling::daily` panics (abort in release) if it cannot
    // create the initial file, so writability is checked first.
    let file_layer = log_dir.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            return None;
        }
        let test_path = dir.join(".adaptive_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(dir, "adaptive-options.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Flushes on drop; the process lives as long as the subscriber
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir.display(),
                    e
                );
                None
            }
        }
    });

    // Logs go to stderr so command output on stdout stays valid JSON
    // Built per branch: each layer sits at a different depth in the stack
    macro_rules! console_layer {
        () => {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
        };
    }
    let (plain_console, json_console) = if logging.json {
        (None, Some(console_layer!().json()))
    } else {
        (Some(console_layer!()), None)
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(plain_console)
        .with(json_console)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/adaptive-options.log", dir.display());
    }
}
