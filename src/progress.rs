//! Batch progress reporting.
//!
//! Progress goes to stderr so stdout stays parseable. Human mode prints one
//! line per file; JSON mode prints one object per line:
//!
//! ```json
//! {"event":"progress","phase":"processing","n":3,"total":12,"file":"reviews/a.txt"}
//! ```

use std::io::Write;

#[derive(Clone, Debug)]
pub enum BatchProgressEvent {
    Discovering { root: String },
    Processing { n: u64, total: u64, file: String },
}

pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: BatchProgressEvent);
}

pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Discovering { root } => {
                format!("batch {}  discovering...\n", root)
            }
            BatchProgressEvent::Processing { n, total, file } => format!(
                "batch  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                file
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            BatchProgressEvent::Processing { n, total, file } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "file": file
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human output when stderr is a terminal, otherwise silent.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
