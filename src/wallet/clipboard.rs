use async_trait::async_trait;
use parking_lot::Mutex;

/// Write-only clipboard used for copying displayed addresses
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Keeps the last copied text in memory
#[derive(Default)]
pub struct MemoryClipboard {
    last: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<String> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn write_text(&self, text: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!text.is_empty(), "nothing to copy");
        *self.last.lock() = Some(text.to_string());
        Ok(())
    }
}
