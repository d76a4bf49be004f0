//! Size-capped capture of container output streams

/// Accumulates bytes up to a fixed limit and counts what was dropped.
#[derive(Debug)]
pub struct CappedBuffer {
    data: Vec<u8>,
    limit: usize,
    omitted: usize,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            omitted: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        let taken = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..taken]);
        self.omitted += chunk.len() - taken;
    }

    pub fn is_truncated(&self) -> bool {
        self.omitted > 0
    }

    /// Decode as UTF-8 (lossy) and append the truncation marker if needed.
    pub fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.omitted > 0 {
            text.push_str(&truncation_marker(self.omitted));
        }
        text
    }
}

pub fn truncation_marker(omitted: usize) -> String {
    format!("\n[... output truncated: {} bytes omitted]", omitted)
}
