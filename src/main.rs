//! Interactive driver: feeds stdin lines to the engine as transcripts.
//!
//! Each line is `text` or `text|confidence` (default confidence 0.9).
//! Commands: `!tp`, `!fp`, `!stats`, `!status`, `!phrases`, `!quit`.
//! An optional first argument names a JSON config file.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use wakeword_engine::{init_tracing, WakeWordConfig, WakeWordEngine};

const DEFAULT_CONFIDENCE: f64 = 0.9;

fn load_config() -> Result<WakeWordConfig, String> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read config {path}: {e}"))?;
            serde_json::from_str(&raw).map_err(|e| format!("failed to parse config {path}: {e}"))
        }
        None => Ok(WakeWordConfig::default()),
    }
}

fn parse_line(line: &str) -> (&str, f64) {
    match line.rsplit_once('|') {
        Some((text, conf)) => match conf.trim().parse::<f64>() {
            Ok(c) => (text, c),
            Err(_) => (line, DEFAULT_CONFIDENCE),
        },
        None => (line, DEFAULT_CONFIDENCE),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{s}"),
        Err(e) => error!(error = %e, "failed to serialize output"),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };
    let engine = match WakeWordEngine::new(config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    engine.register_callback(|event| {
        info!(id = %event.id, phrase = %event.phrase, "callback_notified");
        Ok(())
    });
    engine.start_listening(None);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        let line = line.trim();
        match line {
            "" => continue,
            "!quit" => break,
            "!tp" => engine.report_true_positive(),
            "!fp" => engine.report_false_positive(),
            "!stats" => print_json(&engine.get_stats()),
            "!status" => print_json(&engine.get_listening_status()),
            "!phrases" => print_json(&engine.thresholds()),
            _ => {
                let (text, confidence) = parse_line(line);
                match engine.check_text_for_wake_word(text, confidence) {
                    Some(event) => print_json(&event),
                    None => println!("null"),
                }
            }
        }
    }

    engine.stop_listening().await;
    print_json(&engine.get_stats());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("hey autobot|0.4"), ("hey autobot", 0.4));
        assert_eq!(parse_line("hey autobot"), ("hey autobot", DEFAULT_CONFIDENCE));
        assert_eq!(parse_line("a|b"), ("a|b", DEFAULT_CONFIDENCE));
    }
}
