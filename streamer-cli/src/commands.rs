//! Line commands read from stdin, and event formatting.

use streamer_ipc::{StreamCommand, StreamEvent};

/// One parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Start the profile's stream again after a stop.
    Start,
    Command(StreamCommand),
    Quit,
}

/// Parse a line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match line.to_ascii_lowercase().as_str() {
        "start" => Ok(Some(Input::Start)),
        "quit" | "exit" => Ok(Some(Input::Quit)),
        other => other.parse().map(|command| Some(Input::Command(command))),
    }
}

pub fn describe(event: &StreamEvent) -> String {
    match event {
        StreamEvent::MetricsUpdate(metrics) => format!(
            "metrics: {} kbps, {:.1} fps, {} dropped, {}, up {}s",
            metrics.bitrate_kbps,
            metrics.fps,
            metrics.dropped_frames,
            metrics.connection_quality.as_str(),
            metrics.uptime_seconds
        ),
        StreamEvent::Error { kind, message } => format!("error ({kind:?}): {message}"),
        StreamEvent::StatusChange(status) => format!("status: {status:?}"),
    }
}

pub const HELP: &str = "commands: pause | resume | stop | start | metrics | quit";

#[cfg(test)]
mod tests {
    use super::*;
    use streamer_ipc::{ErrorKind, StreamMetrics, StreamStatus};

    #[test]
    fn test_parse_lines() {
        assert_eq!(parse_line("  \n"), Ok(None));
        assert_eq!(parse_line("START"), Ok(Some(Input::Start)));
        assert_eq!(parse_line("exit"), Ok(Some(Input::Quit)));
        assert_eq!(
            parse_line("pause"),
            Ok(Some(Input::Command(StreamCommand::Pause)))
        );
        assert_eq!(
            parse_line("metrics"),
            Ok(Some(Input::Command(StreamCommand::GetMetrics)))
        );
        assert!(parse_line("record").is_err());
    }

    #[test]
    fn test_describe_events() {
        assert_eq!(
            describe(&StreamEvent::StatusChange(StreamStatus::Paused)),
            "status: Paused"
        );
        assert_eq!(
            describe(&StreamEvent::Error {
                kind: ErrorKind::ConnectionFailed,
                message: "refused".into(),
            }),
            "error (ConnectionFailed): refused"
        );
        assert!(describe(&StreamEvent::MetricsUpdate(StreamMetrics::idle())).starts_with("metrics: 0 kbps"));
    }
}
