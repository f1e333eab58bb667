// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{Args, ValueEnum};
use owo_colors::{OwoColorize, Style, style};
use std::{
    fmt,
    io::{self, BufWriter, Write},
    sync::Once,
};
use tracing::{Event, Level, Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log lines with this target are printed without an `error:`/`warning:` heading.
pub(crate) const NO_HEADING: &str = "gotest_explorer::no_heading";

/// The environment variable that controls log filtering, in `tracing_subscriber` `Targets` syntax.
pub(crate) const LOG_ENV: &str = "GOTEST_EXPLORER_LOG";

pub(crate) mod clap_styles {
    use clap::builder::{
        Styles,
        styling::{AnsiColor, Effects},
    };

    pub(crate) const fn style() -> Styles {
        let heading = AnsiColor::Green.on_default().effects(Effects::BOLD);
        let literal = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
        Styles::styled()
            .header(heading)
            .usage(heading)
            .literal(literal)
            .placeholder(AnsiColor::Cyan.on_default())
            .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
            .valid(literal)
            .invalid(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    }
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, global = true, env = "GOTEST_EXPLORER_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "GOTEST_EXPLORER_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Installs the stderr logger and returns the resolved output settings.
    pub(crate) fn init(self) -> OutputContext {
        let OutputOpts { verbose, color } = self;
        init_logging(color.should_colorize(supports_color::Stream::Stderr));
        OutputContext { verbose, color }
    }
}

/// Output settings shared by every command.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns the styles used for error reports on stderr.
    pub fn stderr_styles(&self) -> StderrStyles {
        if self.color.should_colorize(supports_color::Stream::Stderr) {
            StderrStyles {
                bold: style().bold(),
            }
        } else {
            StderrStyles::default()
        }
    }

    pub(crate) fn stdout_colorized(&self) -> bool {
        self.color.should_colorize(supports_color::Stream::Stdout)
    }
}

/// When to produce colored output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    /// Color when the stream is a terminal that supports it.
    #[default]
    Auto,

    /// Always color.
    Always,

    /// Never color.
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Styles for messages printed to stderr outside of logging.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
}

static INIT_LOGGER: Once = Once::new();

fn init_logging(colorize: bool) {
    INIT_LOGGER.call_once(|| {
        let value = std::env::var(LOG_ENV).unwrap_or_default();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(HeadingFormatter { colorize })
            .with_writer(io::stderr)
            .with_filter(log_targets(&value));

        tracing_subscriber::registry().with(layer).init();
    });
}

/// Parses the log filter, falling back to `info` when it is empty or invalid.
fn log_targets(value: &str) -> Targets {
    let fallback = || Targets::new().with_default(LevelFilter::INFO);
    if value.is_empty() {
        return fallback();
    }
    value.parse().unwrap_or_else(|err| {
        eprintln!("warning: ignoring invalid {LOG_ENV} value `{value}`: {err}");
        fallback()
    })
}

/// Prints each event as `<level>: <fields>`, cargo style.
struct HeadingFormatter {
    colorize: bool,
}

impl HeadingFormatter {
    fn heading(level: Level) -> (&'static str, Style) {
        match level {
            Level::ERROR => ("error", style().red().bold()),
            Level::WARN => ("warning", style().yellow().bold()),
            Level::INFO => ("info", style().bold()),
            Level::DEBUG => ("debug", style().bold()),
            Level::TRACE => ("trace", style().dimmed()),
        }
    }
}

impl<S, N> FormatEvent<S, N> for HeadingFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != NO_HEADING {
            let (heading, heading_style) = Self::heading(*metadata.level());
            let heading_style = if self.colorize {
                heading_style
            } else {
                Style::new()
            };
            write!(writer, "{}: ", heading.style(heading_style))?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Where command output goes.
#[derive(Default)]
pub enum OutputWriter {
    /// The process's stdout.
    #[default]
    Stdout,

    /// An in-memory buffer.
    #[cfg(test)]
    Captured(Vec<u8>),
}

impl OutputWriter {
    /// Returns a buffered writer; callers flush it when done.
    pub(crate) fn stdout_writer(&mut self) -> Box<dyn Write + '_> {
        match self {
            Self::Stdout => Box::new(BufWriter::new(io::stdout().lock())),
            #[cfg(test)]
            Self::Captured(buf) => Box::new(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captured_writer_collects_output() {
        let mut output = OutputWriter::Captured(Vec::new());
        {
            let mut writer = output.stdout_writer();
            writeln!(writer, "ok  example.com/foo").unwrap();
            writer.flush().unwrap();
        }
        let OutputWriter::Captured(buf) = output else {
            panic!("expected captured output");
        };
        assert_eq!(String::from_utf8(buf).unwrap(), "ok  example.com/foo\n");
    }

    #[test]
    fn explicit_color_choices_ignore_the_terminal() {
        assert!(Color::Always.should_colorize(supports_color::Stream::Stdout));
        assert!(!Color::Never.should_colorize(supports_color::Stream::Stderr));

        let context = OutputContext {
            verbose: false,
            color: Color::Never,
        };
        assert!(!context.stdout_colorized());
        assert_eq!(
            format!("{}", "x".style(context.stderr_styles().bold)),
            "x"
        );
    }

    #[test]
    fn log_filter_falls_back_to_info() {
        for value in ["", "not a filter=?"] {
            let targets = log_targets(value);
            assert!(targets.would_enable("gotest_runner", &Level::INFO), "{value:?}");
            assert!(!targets.would_enable("gotest_runner", &Level::DEBUG), "{value:?}");
        }

        let targets = log_targets("gotest_runner=trace");
        assert!(targets.would_enable("gotest_runner::runner", &Level::TRACE));
        assert!(!targets.would_enable("gotest_explorer", &Level::ERROR));
    }

    #[test]
    fn headings_follow_cargo_wording() {
        let headings: Vec<_> = [Level::ERROR, Level::WARN, Level::INFO]
            .into_iter()
            .map(|level| HeadingFormatter::heading(level).0)
            .collect();
        assert_eq!(headings, ["error", "warning", "info"]);
    }
}
