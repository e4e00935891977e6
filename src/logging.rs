use indicatif::ProgressBar;
use std::io::{self, Write};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `verbose`.
///
/// Every line is written with `progress` suspended, so log output and the bar
/// share stderr without tearing each other.
pub fn init_tracing(verbose: bool, progress: &ProgressBar) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressWriter::new(progress.clone(), io::stderr))
        .init();
}

/// `MakeWriter` that clears a progress bar around every write to `inner`.
#[derive(Debug, Clone)]
pub struct ProgressWriter<M> {
    progress: ProgressBar,
    inner: M,
}

impl<M> ProgressWriter<M> {
    pub fn new(progress: ProgressBar, inner: M) -> Self {
        Self { progress, inner }
    }
}

pub struct SuspendedWriter<'a, M> {
    progress: &'a ProgressBar,
    inner: &'a M,
}

impl<'a, M: MakeWriter<'a>> Write for SuspendedWriter<'a, M> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner: &'a M = self.inner;
        self.progress
            .suspend(|| inner.make_writer().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner: &'a M = self.inner;
        inner.make_writer().flush()
    }
}

impl<'a, M: MakeWriter<'a> + 'a> MakeWriter<'a> for ProgressWriter<M> {
    type Writer = SuspendedWriter<'a, M>;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedWriter {
            progress: &self.progress,
            inner: &self.inner,
        }
    }
}

/// In-memory log sink for asserting on emitted lines.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct LogBuffer(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

#[cfg(test)]
impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Routes events on the current thread into this buffer until the guard drops.
    pub(crate) fn capture(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

#[cfg(test)]
impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
