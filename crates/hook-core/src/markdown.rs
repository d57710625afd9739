//! The `HOOK.md` contract: a pure, pluggable `hook -> bytes` renderer
//! consumed by [`crate::store::Store`]. Implementation is out of scope —
//! only the contract matters here. Errors are logged and swallowed; the
//! canonical `hook.json` is the only artifact that must never be lost.

use crate::types::Hook;

pub trait MarkdownGenerator: Send + Sync {
    fn render(&self, hook: &Hook) -> anyhow::Result<Vec<u8>>;
}

/// Writes nothing. Used where no caller-supplied renderer is configured;
/// `Store` then skips the `HOOK.md` write entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMarkdown;

impl MarkdownGenerator for NoMarkdown {
    fn render(&self, _hook: &Hook) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
