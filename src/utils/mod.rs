// src/utils/mod.rs
//! Shared glue: logging setup and log-message hygiene helpers.

use log::info;

/// Initializes the process-wide logger.
///
/// Call once at binary startup; library code only emits through the `log`
/// facade and never configures logging itself.
pub fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("sqlx", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized.");
    Ok(())
}

/// Truncates a backend error message before it is quoted in a log line.
///
/// Backend errors can embed whole payloads; log lines carry at most `max`
/// characters of them.
pub fn truncate_msg(msg: &str, max: usize) -> String {
    if msg.len() <= max {
        return msg.to_string();
    }
    let mut end = max;
    while end > 0 && !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through() {
        assert_eq!(truncate_msg("connection refused", 120), "connection refused");
    }

    #[test]
    fn long_messages_are_cut() {
        let long = "x".repeat(300);
        let cut = truncate_msg(&long, 120);
        assert_eq!(cut.len(), 123);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let msg = "héllo wörld héllo wörld";
        let cut = truncate_msg(msg, 7);
        assert!(cut.ends_with("..."));
    }
}
