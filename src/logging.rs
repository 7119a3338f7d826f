//! # Logging
//!
//! Tracing setup. Log lines pass through a censoring writer so the
//! platform token never reaches the log output

use clap::ValueEnum;
use eyre::Context;
use std::{fmt::Display, fs::File, io, path::PathBuf, sync::Arc};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    EnvFilter,
    fmt::MakeWriter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// The level of logging that should be made
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
    }
}

/// The formatting of the logs
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A sensitive value that must be replaced before a log line is written
pub struct CensorItem {
    pub sensitive: String,
    pub replacement: &'static str,
}

pub struct LogOptions {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Write logs to this file instead of stderr
    pub file: Option<PathBuf>,
    /// Disable terminal formatting in the log output
    pub plain: bool,
    pub censor: Vec<CensorItem>,
}

/// Initialize the logging and indicator layers
pub fn init_logging(options: LogOptions) -> eyre::Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("repo_sweep={}", options.level).parse()?)
        .add_directive("hyper_util=info".parse()?)
        .add_directive("reqwest=info".parse()?);

    let censor = Arc::new(options.censor);

    match options.file {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("could not open log file {}", path.display()))?;
            let writer = CensoredMakeWriter::new(Arc::new(file), censor);

            match options.format {
                LogFormat::Text => tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_line_number(false)
                            .with_target(false)
                            .with_file(false)
                            .with_writer(writer),
                    )
                    .init(),
                LogFormat::Json => tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init(),
            }
        }
        None => match options.format {
            LogFormat::Text => {
                let indicatif_layer = IndicatifLayer::new();
                let writer =
                    CensoredMakeWriter::new(indicatif_layer.get_stderr_writer(), censor);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(!options.plain)
                            .with_line_number(false)
                            .with_target(false)
                            .with_file(false)
                            .with_writer(writer),
                    )
                    .with(indicatif_layer)
                    .init()
            }
            LogFormat::Json => {
                let indicatif_layer = IndicatifLayer::new();
                let writer =
                    CensoredMakeWriter::new(indicatif_layer.get_stderr_writer(), censor);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .with(indicatif_layer)
                    .init()
            }
        },
    }

    Ok(())
}

/// Wraps another writer factory so every produced writer censors
/// sensitive values
#[derive(Clone)]
pub struct CensoredMakeWriter<M> {
    inner: M,
    censor: Arc<Vec<CensorItem>>,
}

impl<M> CensoredMakeWriter<M> {
    pub fn new(inner: M, censor: Arc<Vec<CensorItem>>) -> CensoredMakeWriter<M> {
        CensoredMakeWriter { inner, censor }
    }
}

impl<'a, M> MakeWriter<'a> for CensoredMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = CensoredWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        CensoredWriter {
            inner: self.inner.make_writer(),
            censor: Arc::clone(&self.censor),
        }
    }
}

pub struct CensoredWriter<W> {
    inner: W,
    censor: Arc<Vec<CensorItem>>,
}

impl<W: io::Write> io::Write for CensoredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut line = String::from_utf8_lossy(buf).into_owned();
        for item in self.censor.iter() {
            line = line.replace(&item.sensitive, item.replacement);
        }

        self.inner.write_all(line.as_bytes())?;

        // Report the original length, censoring may have changed it
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::{CensorItem, CensoredWriter};
    use std::{io::Write, sync::Arc};

    #[test]
    fn test_censored_writer_replaces_sensitive_values() {
        let mut buffer = Vec::new();
        let mut writer = CensoredWriter {
            inner: &mut buffer,
            censor: Arc::new(vec![CensorItem {
                sensitive: "super-secret".to_string(),
                replacement: "<TOKEN>",
            }]),
        };

        writer
            .write_all(b"cloning https://super-secret@example.com/repo.git")
            .unwrap();
        drop(writer);

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "cloning https://<TOKEN>@example.com/repo.git"
        );
    }

    #[test]
    fn test_censored_writer_passes_clean_lines() {
        let mut buffer = Vec::new();
        let mut writer = CensoredWriter {
            inner: &mut buffer,
            censor: Arc::new(Vec::new()),
        };

        writer.write_all(b"nothing to hide").unwrap();
        drop(writer);

        assert_eq!(buffer, b"nothing to hide");
    }
}
