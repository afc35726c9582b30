//! Logger minimal pour le runtime
//!
//! Implements the `log` facade on top of a board-provided byte sink
//! (usually a blocking UART write). Records are formatted as
//! `[LEVEL] message\n` into a stack buffer, so logging never touches the arena.

use core::fmt::{self, Write};

use ek_types::{EkError, ErrorCode, Result};
use log::{Level, LevelFilter, Metadata, Record};
use spin::Mutex;

/// Longest line handed to the sink, newline included.
pub const LINE_MAX: usize = 160;

/// Byte sink for formatted log lines.
pub type LogSink = fn(&[u8]);

/// Logger forwarding to a registered [`LogSink`]
struct SinkLogger {
    sink: Mutex<Option<LogSink>>,
}

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Copy the fn pointer out so the sink runs without the lock held.
        let Some(sink) = *self.sink.lock() else {
            return;
        };

        let mut buf = [0u8; LINE_MAX];
        let len = format_record(&mut buf, record.level(), record.args());
        sink(&buf[..len]);
    }

    fn flush(&self) {}
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// Render one log line into `buf`, returning its length. A line that does
/// not fit is cut and still ends with `\n`.
pub fn format_record(buf: &mut [u8], level: Level, args: &fmt::Arguments<'_>) -> usize {
    let mut writer = BufferWriter::new(&mut *buf);
    let _ = write!(writer, "[{}] {}\n", level_str(level), args);
    let (len, truncated) = (writer.len(), writer.is_truncated());
    if truncated && len > 0 {
        buf[len - 1] = b'\n';
    }
    len
}

/// Simple buffer writer for formatting without alloc
///
/// Output past the end of the buffer is dropped and the writer remembers it
/// was truncated; formatting itself never fails.
pub struct BufferWriter<'a> {
    buffer: &'a mut [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        BufferWriter {
            buffer,
            pos: 0,
            truncated: false,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }
}

impl fmt::Write for BufferWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buffer.len() - self.pos;
        let to_write = bytes.len().min(remaining);

        if to_write > 0 {
            self.buffer[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }
        if to_write < bytes.len() {
            self.truncated = true;
        }

        Ok(())
    }
}

/// Global logger instance
static LOGGER: SinkLogger = SinkLogger {
    sink: Mutex::new(None),
};

/// Install the logger with `sink` as output.
///
/// Call once, early. A second call (or a call after another `log`
/// implementation was installed) fails and leaves the current logger alone.
pub fn init(sink: LogSink, level: LevelFilter) -> Result<()> {
    log::set_logger(&LOGGER)
        .map_err(|_| EkError::with_message(ErrorCode::Unknown, "logger already set"))?;
    *LOGGER.sink.lock() = Some(sink);
    log::set_max_level(level);
    Ok(())
}
