use crate::config::{AppConfig, LoggingLevelsConfig};
use regex::Regex;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

struct RedactingWriter<W> {
    inner: W,
    patterns: Vec<(Regex, String)>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = redact(&s, &self.patterns);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Stdout carries command output, so logs go to stderr.
struct RedactingMakeWriter {
    patterns: Vec<(Regex, String)>,
}

impl<'a> fmt::MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stderr>;

    fn make_writer(&self) -> Self::Writer {
        RedactingWriter {
            inner: io::stderr(),
            patterns: self.patterns.clone(),
        }
    }
}

fn redact(input: &str, patterns: &[(Regex, String)]) -> String {
    let mut redacted = input.to_string();
    for (re, replacement) in patterns {
        redacted = re.replace_all(&redacted, replacement.as_str()).to_string();
    }
    redacted
}

/// Most verbose level enabled in config.
fn level_from(levels: &LoggingLevelsConfig, verbose: bool) -> &'static str {
    if verbose || levels.debug {
        return "debug";
    }
    let mut level = "off";
    if levels.critical || levels.error {
        level = "error";
    }
    if levels.warning {
        level = "warn";
    }
    if levels.info {
        level = "info";
    }
    level
}

fn compile_patterns(config: &AppConfig) -> Vec<(Regex, String)> {
    let mut patterns = Vec::new();
    if config.logging.redaction.enabled {
        for p in &config.logging.redaction.patterns {
            match Regex::new(&p.regex) {
                Ok(re) => patterns.push((re, p.placeholder.clone())),
                Err(e) => eprintln!("warning: ignoring redaction pattern {}: {}", p.name, e),
            }
        }
    }
    patterns
}

pub fn init_logging(config: &AppConfig) {
    let level = level_from(&config.logging.levels, config.logging.verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let show_file = config.logging.format.location.show_file;
    let show_line = config.logging.format.location.show_line;
    let make_writer = RedactingMakeWriter {
        patterns: compile_patterns(config),
    };

    // Use Layer::boxed() to unify the types of the branches
    let fmt_layer = if config.logging.format.json {
        fmt::layer()
            .json()
            .with_writer(make_writer)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed()
    } else if !config.logging.format.show_time {
        fmt::layer()
            .with_writer(make_writer)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .with_thread_ids(false)
            .without_time()
            .boxed()
    } else {
        fmt::layer()
            .with_writer(make_writer)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .with_thread_ids(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
