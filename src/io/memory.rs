use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;

use super::ReadAt;

/// Random access over an archive already held in memory, such as the
/// concatenated chunks of a generation run
pub struct MemoryReader {
    data: Bytes,
}

impl MemoryReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let start = usize::try_from(offset)?;
        let Some(end) = start.checked_add(buf.len()).filter(|&end| end <= self.data.len()) else {
            bail!(
                "read of {} bytes at {} past end of {}-byte archive",
                buf.len(),
                offset,
                self.data.len()
            );
        };
        buf.copy_from_slice(&self.data[start..end]);
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
