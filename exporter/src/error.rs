use export::error::ExportError;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type ExporterResult<T> = Result<T, ExporterError>;

/// Backtrace captured when a non-export error is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the exporter binary.
///
/// [`ExportError`] already renders its own backtrace, so only the other variants carry one.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("configuration error: {0}")]
    Config(#[source] Box<dyn StdError + Send + Sync>, CapturedBacktrace),

    #[error("i/o error: {0}")]
    Io(#[source] std::io::Error, CapturedBacktrace),
}

impl ExporterError {
    pub fn config<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        ExporterError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    pub fn category(&self) -> &'static str {
        match self {
            ExporterError::Export(_) => "export error",
            ExporterError::Config(_, _) => "configuration error",
            ExporterError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ExporterError::Export(_) => None,
            ExporterError::Config(_, captured) => Some(&captured.0),
            ExporterError::Io(_, captured) => Some(&captured.0),
        }
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("exporter failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        // Aggregates list every worker failure in their own rendering.
        if !matches!(self, ExporterError::Export(err) if err.errors().is_some()) {
            let mut source = StdError::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err, CapturedBacktrace::capture())
    }
}
