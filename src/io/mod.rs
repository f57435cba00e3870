//! Random access byte sources for reading archives back.

mod local;
mod memory;

pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::Result;
use async_trait::async_trait;

/// Positioned reads over a complete archive
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Fill `buf` from `offset`; fails rather than returning a short read
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the source in bytes
    fn size(&self) -> u64;
}
