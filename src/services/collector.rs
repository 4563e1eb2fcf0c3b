use std::fmt::Write as _;

use tokio::sync::Mutex;

/// Append-only sink for response sizes, shared by one request's fetch tasks.
///
/// Sizes are kept in the order they were added, which for the orchestrator
/// means completion order, not the order of the input URLs.
#[derive(Debug, Default)]
pub struct ResultCollector {
    sizes: Mutex<Vec<usize>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the buffer for an expected number of results.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sizes: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Append one size.
    pub async fn add(&self, size: usize) {
        self.sizes.lock().await.push(size);
    }

    /// Number of sizes recorded so far.
    pub async fn len(&self) -> usize {
        self.sizes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sizes.lock().await.is_empty()
    }

    /// Copy of the recorded sizes in insertion order.
    pub async fn sizes(&self) -> Vec<usize> {
        self.sizes.lock().await.clone()
    }

    /// One decimal size per line, `\n`-separated, no trailing newline.
    pub async fn render(&self) -> String {
        render_sizes(&self.sizes.lock().await)
    }
}

fn render_sizes(sizes: &[usize]) -> String {
    let mut out = String::with_capacity(sizes.len() * 8);
    for (i, size) in sizes.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Writing to a String cannot fail
        let _ = write!(out, "{size}");
    }
    out
}
