use std::io::{self, Write};
use std::sync::LazyLock;

use chrono::Local;
use log::kv::{self, Key, Value, VisitSource};
use log::{Level, LevelFilter, Log};
#[cfg(all(unix, feature = "journald"))]
use systemd_journal_logger::{JournalLog, connected_to_journal, current_exe_identifier};

/// A simple logger that writes messages to `stderr`, or to the systemd journal when running under it.
///
/// Colour support is automatically provided by the [`anstream`] crate.
pub struct Logger {
    filter: LevelFilter,
    timestamps: bool,
    #[cfg(all(unix, feature = "journald"))]
    journald: Option<JournalLog>,
}

/// Timestamp format for log output. Format is `Jul 08 2001 14:46:23`.
static TIMESTAMP_FMT: LazyLock<&'static [chrono::format::Item<'static>]> = LazyLock::new(|| {
    chrono::format::StrftimeItems::new("%b %d %Y %H:%M:%S")
        .parse_to_owned()
        .unwrap_or_default()
        .leak()
});

/// Predefined styles for log levels, matching the colours `journalctl` uses for the same priorities.
#[rustfmt::skip]
mod styles {
    use anstyle::{Ansi256Color, AnsiColor, Color, Style};

    pub const TRACE: Style = Style::new().fg_color(Some(ansi256(245)));
    pub const DEBUG: Style = Style::new().fg_color(None);
    pub const INFO: Style  = Style::new().fg_color(None).bold();
    pub const WARN: Style  = Style::new().fg_color(Some(ansi256(185))).bold();
    pub const ERROR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))).bold();

    /// Style for the `key=value` fields appended after a message.
    pub const FIELDS: Style = Style::new().fg_color(Some(ansi256(245)));

    const fn ansi256(color: u8) -> Color {
        Color::Ansi256(Ansi256Color(color))
    }
}

impl Logger {
    /// Creates a new logger instance.
    ///
    /// Timestamps are dropped regardless of `timestamps` when logging to journald, which adds its own.
    pub fn new(level: LevelFilter, timestamps: bool) -> Self {
        #[cfg(all(unix, feature = "journald"))]
        let mut timestamps = timestamps;

        #[cfg(all(unix, feature = "journald"))]
        let journald = init_journald().inspect(|_| timestamps = false);

        Self {
            filter: level,
            timestamps,
            #[cfg(all(unix, feature = "journald"))]
            journald,
        }
    }

    /// Installs this logger as the one used by the `log` macros.
    pub fn init(self) -> Result<(), log::SetLoggerError> {
        let level = self.filter;
        log::set_boxed_logger(Box::new(self)).map(|_| log::set_max_level(level))
    }

    /// Fallible version of [`Log::log`] to enable the use of `?` within.
    fn try_log(&self, record: &log::Record) -> io::Result<()> {
        // Only log our own messages; reqwest and friends have their own logging that is just noise here.
        if !record.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return Ok(());
        }

        if !self.enabled(record.metadata()) {
            return Ok(());
        }

        // journald stores key/value fields natively, so records go there untouched.
        #[cfg(all(unix, feature = "journald"))]
        if let Some(journald) = self.journald.as_ref() {
            return journald.journal_send(record);
        }

        // Render fields up front so a formatting error can't leave half a line behind.
        let mut fields = String::new();
        record
            .key_values()
            .visit(&mut FieldWriter(&mut fields))
            .map_err(|err| io::Error::other(err.to_string()))?;

        let mut output = anstream::stderr().lock();

        #[rustfmt::skip]
        let (style, tag) = match record.level() {
            Level::Trace => (styles::TRACE, "[trace]"),
            Level::Debug => (styles::DEBUG, "[debug]"),
            Level::Info  => ( styles::INFO, "[info]"),
            Level::Warn  => ( styles::WARN, "[warn]"),
            Level::Error => (styles::ERROR, "[error]"),
        };

        if self.timestamps {
            let timestamp = Local::now().format_with_items(TIMESTAMP_FMT.iter());
            write!(output, "{timestamp} ")?;
        }

        if !record.target().is_empty() {
            write!(output, "{} ", record.target())?;
        }

        write!(output, "{style}{tag} {}{style:#}", record.args())?;

        if !fields.is_empty() {
            write!(output, " {}{fields}{:#}", styles::FIELDS, styles::FIELDS)?;
        }

        writeln!(output)?;
        output.flush()?;
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &log::Record) {
        let _ = self.try_log(record);
    }

    fn flush(&self) {
        let _ = anstream::stderr().flush();

        #[cfg(all(unix, feature = "journald"))]
        if let Some(journald) = self.journald.as_ref() {
            <JournalLog as Log>::flush(journald);
        }
    }
}

/// Renders a record's structured fields as space-separated `key=value` pairs.
struct FieldWriter<'a>(&'a mut String);

impl<'kvs> VisitSource<'kvs> for FieldWriter<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        use std::fmt::Write as _;

        if !self.0.is_empty() {
            self.0.push(' ');
        }
        write!(self.0, "{key}={value}").map_err(|_| kv::Error::msg("failed to format field"))
    }
}

#[cfg(all(unix, feature = "journald"))]
fn init_journald() -> Option<JournalLog> {
    if connected_to_journal() {
        let identifier = current_exe_identifier().unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let logger = JournalLog::empty()
            .ok()?
            .with_syslog_identifier(identifier)
            .add_extra_field("version", env!("CARGO_PKG_VERSION"));
        Some(logger)
    } else {
        None
    }
}
