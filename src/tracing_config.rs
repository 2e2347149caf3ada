//! Tracing subscriber setup for the server binary
//!
//! The library only emits events; the binary installs the subscriber.
//! Events from the `log` macros used in backend internals are bridged
//! into the same subscriber.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Human-readable console output with colors
    #[default]
    Console,
    /// Compact console output without colors, for CI and containers
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "pretty" => Ok(Self::Console),
            "compact" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported log format '{other}'")),
        }
    }
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Output to stderr
    #[default]
    Console,
    /// Output to a daily rotated file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Output to both console and file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it last
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directives, overriding both `RUST_LOG` and verbosity
    pub env_filter: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to a level directive
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Default directives: the verbosity level, with noisy HTTP internals capped
    #[must_use]
    pub fn default_directives(&self) -> String {
        let level = self.verbosity_to_filter();
        if self.verbosity >= 2 {
            level.to_string()
        } else {
            format!("{level},hyper=warn,reqwest=warn,ort=warn")
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let filter = match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.default_directives()))?,
        };

        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();
        let layers: Vec<BoxedLayer> = match &self.output {
            TracingOutput::Console => vec![Self::console_layer(self.format)],
            #[cfg(feature = "tracing-files")]
            TracingOutput::File(path) => {
                let (layer, file_guard) = Self::file_layer(self.format, path);
                guard._file_guard = Some(file_guard);
                vec![layer]
            },
            #[cfg(feature = "tracing-files")]
            TracingOutput::Both(path) => {
                let (layer, file_guard) = Self::file_layer(self.format, path);
                guard._file_guard = Some(file_guard);
                vec![Self::console_layer(self.format), layer]
            },
        };

        Registry::default().with(layers).with(filter).try_init()?;
        Ok(guard)
    }

    fn console_layer(format: TracingFormat) -> BoxedLayer {
        match format {
            TracingFormat::Console => fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .boxed(),
            TracingFormat::Compact => fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .compact()
                .boxed(),
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
        }
    }

    #[cfg(feature = "tracing-files")]
    fn file_layer(
        format: TracingFormat,
        path: &std::path::Path,
    ) -> (BoxedLayer, tracing_appender::non_blocking::WorkerGuard) {
        use tracing_appender::{non_blocking, rolling};

        let file_appender = rolling::daily(
            path.parent().unwrap_or_else(|| std::path::Path::new(".")),
            path.file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("imgly-segment-api.log")),
        );
        let (writer, guard) = non_blocking(file_appender);

        let layer = match format {
            TracingFormat::Console | TracingFormat::Compact => fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .compact()
                .boxed(),
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
        };
        (layer, guard)
    }
}
