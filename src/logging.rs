//! Tracing setup.
//!
//! While the terminal UI owns the screen, log lines go to an in-memory
//! [`LogBuffer`] that the UI renders as its log console. Otherwise they go to
//! stderr. `RUST_LOG` overrides the default level either way.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_CAPACITY: usize = 500;

/// Bounded, shared ring of formatted log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: &str) {
        let Ok(mut lines) = self.lines.lock() else {
            return;
        };
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Most recent `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().skip(lines.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }
}

pub struct LogBufferWriter {
    buffer: LogBuffer,
}

impl io::Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            self.buffer.push(line.trim_end());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LogSink {
    Stderr,
    Buffer(LogBuffer),
}

/// Installs the global subscriber. Calling it twice keeps the first one.
pub fn init_tracing(default_level: &str, sink: LogSink) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let result = match sink {
        LogSink::Stderr => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .with(filter)
            .try_init(),
        LogSink::Buffer(buffer) => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(buffer),
            )
            .with(filter)
            .try_init(),
    };
    if let Err(err) = result {
        tracing::debug!("tracing already initialised: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn buffer_keeps_the_newest_lines() {
        let buffer = LogBuffer::with_capacity(2);
        buffer.push("one");
        buffer.push("two");
        buffer.push("three");
        assert_eq!(buffer.tail(10), ["two", "three"]);
        assert_eq!(buffer.tail(1), ["three"]);
    }

    #[test]
    fn writer_splits_lines() {
        let buffer = LogBuffer::default();
        let mut writer = buffer.make_writer();
        writer.write_all(b"INFO first\n\nWARN second\n").unwrap();
        assert_eq!(buffer.tail(5), ["INFO first", "WARN second"]);
    }

    #[test]
    fn events_reach_the_buffer() {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_ansi(false)
                .without_time()
                .with_writer(buffer.clone()),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("skipping rule");
        });
        let lines = buffer.tail(1);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].ends_with("skipping rule"));
    }
}
