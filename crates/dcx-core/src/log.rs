//! The log sink recipe output is routed through

use dcx_provider::{LineCallback, OutputLine};
use std::fmt;
use std::sync::Arc;

/// A `(message) -> ()` callback shared by every task of a recipe.
///
/// Parallel hook commands call it concurrently. Every message is also
/// emitted as a `tracing` event.
#[derive(Clone)]
pub struct LogSink {
    callback: Arc<dyn Fn(&str) + Send + Sync>,
}

impl LogSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A sink that only forwards to `tracing`
    pub fn tracing_only() -> Self {
        Self::new(|_| {})
    }

    pub fn log(&self, message: &str) {
        tracing::info!(target: "dcx::recipe", "{}", message);
        (self.callback)(message);
    }

    /// Output-line callback that logs each line prefixed with `[tag]`
    pub fn tagged(&self, tag: &str) -> LineCallback {
        let sink = self.clone();
        let prefix = format!("[{}] ", tag);
        Arc::new(move |line: &OutputLine| sink.log(&format!("{}{}", prefix, line.line)))
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::tracing_only()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcx_provider::OutputStream;
    use std::sync::Mutex;

    #[test]
    fn test_tagged_prefixes_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = LogSink::new(move |m| sink_seen.lock().unwrap().push(m.to_string()));

        let callback = sink.tagged("build");
        callback(&OutputLine {
            stream: OutputStream::Stderr,
            line: "Step 1/3".to_string(),
        });
        sink.log("plain");

        assert_eq!(*seen.lock().unwrap(), vec!["[build] Step 1/3", "plain"]);
    }
}
