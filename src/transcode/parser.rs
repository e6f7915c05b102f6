//! Parser for ffmpeg `-progress` output

use std::time::Duration;

use super::traits::TranscodeStats;

/// Incremental parser for the `key=value` blocks ffmpeg writes with `-progress`
///
/// Each block ends with a `progress=continue` or `progress=end` line, at which
/// point the accumulated statistics are emitted.
#[derive(Debug, Default)]
pub struct StatsParser {
    current: TranscodeStats,
}

impl StatsParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line; returns the statistics when a block completes
    pub fn feed_line(&mut self, line: &str) -> Option<TranscodeStats> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            "frame" => self.current.frame = value.parse().unwrap_or(self.current.frame),
            "fps" => self.current.fps = value.parse().unwrap_or(self.current.fps),
            "bitrate" => self.current.bitrate = value.to_string(),
            "speed" => self.current.speed = value.to_string(),
            // out_time_ms is in microseconds as well; out_time_us is preferred when present
            "out_time_us" | "out_time_ms" => {
                if let Ok(micros) = value.parse::<u64>() {
                    self.current.out_time = Duration::from_micros(micros);
                }
            }
            "out_time" => {
                if let Some(time) = parse_timestamp(value) {
                    self.current.out_time = time;
                }
            }
            "progress" => {
                self.current.finished = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }

        None
    }
}

/// Parse `HH:MM:SS.micros` as printed by ffmpeg
fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut parts = value.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let last = parts.next()?;
    let (seconds, fraction) = last.split_once('.').unwrap_or((last, ""));
    let seconds: u64 = seconds.parse().ok()?;

    // Right-pad or truncate the fraction to nanoseconds
    let mut nanos = 0u32;
    for (i, digit) in fraction.chars().chain(std::iter::repeat('0')).take(9).enumerate() {
        let d = digit.to_digit(10)?;
        nanos += d * 10u32.pow(8 - i as u32);
    }

    Some(Duration::new(hours * 3600 + minutes * 60 + seconds, nanos))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "frame=48\n\
fps=23.98\n\
stream_0_0_q=28.0\n\
bitrate= 812.4kbits/s\n\
total_size=204848\n\
out_time_us=2016000\n\
out_time_ms=2016000\n\
out_time=00:00:02.016000\n\
dup_frames=0\n\
drop_frames=0\n\
speed=1.93x\n\
progress=continue\n";

    #[test]
    fn test_parses_progress_block() {
        let mut parser = StatsParser::new();
        let reports: Vec<_> = BLOCK.lines().filter_map(|l| parser.feed_line(l)).collect();

        assert_eq!(reports.len(), 1);
        let stats = &reports[0];
        assert_eq!(stats.frame, 48);
        assert!((stats.fps - 23.98).abs() < f64::EPSILON);
        assert_eq!(stats.bitrate, "812.4kbits/s");
        assert_eq!(stats.speed, "1.93x");
        assert_eq!(stats.out_time, Duration::from_millis(2016));
        assert!(!stats.finished);
    }

    #[test]
    fn test_end_block_marks_finished_and_keeps_state() {
        let mut parser = StatsParser::new();
        for line in BLOCK.lines() {
            parser.feed_line(line);
        }
        parser.feed_line("frame=96");
        let last = parser.feed_line("progress=end").unwrap();
        assert!(last.finished);
        assert_eq!(last.frame, 96);
        assert_eq!(last.speed, "1.93x");
    }

    #[test]
    fn test_ignores_noise_and_bad_values() {
        let mut parser = StatsParser::new();
        assert!(parser.feed_line("").is_none());
        assert!(parser.feed_line("not a key value line").is_none());
        parser.feed_line("frame=12");
        parser.feed_line("frame=N/A");
        parser.feed_line("out_time=N/A");
        let stats = parser.feed_line("progress=continue").unwrap();
        assert_eq!(stats.frame, 12);
        assert_eq!(stats.out_time, Duration::ZERO);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("01:02:03.500000"),
            Some(Duration::from_millis(3_723_500))
        );
        assert_eq!(parse_timestamp("-00:00:01.0"), None);
        assert_eq!(parse_timestamp("garbage"), None);
    }
}
