use anyhow::Context;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Wire traffic log: every message in and out as a line.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<std::fs::File>>,
}

impl FileTracer {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open wire trace file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn incoming(&self, line: &str) {
        self.line("<-", line)
    }

    pub fn outgoing(&self, line: &str) {
        self.line("->", line)
    }

    fn line(&self, direction: &str, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            _ = writeln!(file, "{direction} {}", text.trim_end_matches('\n'));
        }
    }
}
