//! Range-based byte access for remote rasters.
//!
//! COGs are laid out so that a reader touching only the IFD headers and the
//! chunks under a tile footprint never needs the whole file. This module
//! provides that access pattern over local files and HTTP URLs, plus a
//! buffered `Read + Seek` cursor so the TIFF decoder can be driven without
//! issuing one network round trip per small read.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tiler_common::{TilerError, TilerResult};

/// Byte ranges are fetched in blocks of this size and kept for the lifetime
/// of the dataset handle (one request).
const BLOCK_SIZE: u64 = 64 * 1024;

/// Trait for reading byte ranges from any source.
pub trait RangeReader: Send + Sync {
    /// Read a range of bytes from the source.
    fn read_range(&self, offset: u64, length: usize) -> TilerResult<Vec<u8>>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Human-readable identifier for this source (for logging/errors).
    fn identifier(&self) -> &str;
}

/// Local file range reader.
#[derive(Debug)]
pub struct LocalRangeReader {
    path: PathBuf,
    size: u64,
}

impl LocalRangeReader {
    pub fn new(path: impl AsRef<Path>) -> TilerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path)
            .map_err(|e| TilerError::SourceUnreachable(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }
}

impl RangeReader for LocalRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> TilerResult<Vec<u8>> {
        let mut file = File::open(&self.path)
            .map_err(|e| TilerError::SourceUnreachable(format!("{}: {}", self.path.display(), e)))?;
        file.seek(SeekFrom::Start(offset))?;
        // Short reads at EOF are expected for the final block.
        let available = self.size.saturating_sub(offset).min(length as u64) as usize;
        let mut buffer = vec![0u8; available];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        self.path.to_str().unwrap_or("<invalid path>")
    }
}

/// HTTP range reader for remote COG files.
///
/// Uses a blocking client; callers run the whole pipeline inside
/// `spawn_blocking`. Timeouts surface as `SourceUnreachable`.
#[derive(Debug)]
pub struct HttpRangeReader {
    url: String,
    size: u64,
    client: reqwest::blocking::Client,
}

impl HttpRangeReader {
    pub fn new(url: &str) -> TilerResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TilerError::SourceUnreachable(e.to_string()))?;

        // File size via HEAD request; also validates reachability up front.
        let response = client
            .head(url)
            .send()
            .map_err(|e| TilerError::SourceUnreachable(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(TilerError::SourceUnreachable(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        // Range math needs the real size; a server that won't declare it
        // cannot serve partial reads.
        let size = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                TilerError::SourceUnreachable(format!("{}: no Content-Length in HEAD response", url))
            })?;

        Ok(Self {
            url: url.to_string(),
            size,
            client,
        })
    }
}

impl RangeReader for HttpRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> TilerResult<Vec<u8>> {
        let range = format!("bytes={}-{}", offset, offset + length as u64 - 1);
        let response = self
            .client
            .get(&self.url)
            .header("Range", range)
            .send()
            .map_err(|e| TilerError::SourceUnreachable(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(TilerError::SourceUnreachable(format!(
                "{}: HTTP {}",
                self.url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| TilerError::SourceUnreachable(format!("{}: {}", self.url, e)))?;
        Ok(bytes.to_vec())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.url
    }
}

/// Create a range reader from a path or URL.
pub fn create_range_reader(source: &str) -> TilerResult<Arc<dyn RangeReader>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(Arc::new(HttpRangeReader::new(source)?))
    } else {
        Ok(Arc::new(LocalRangeReader::new(source)?))
    }
}

/// Block cache shared by all cursors over one dataset handle.
pub type BlockCache = Arc<Mutex<HashMap<u64, Arc<Vec<u8>>>>>;

/// A `Read + Seek` view over a `RangeReader`, fetching aligned blocks and
/// caching them in the dataset-scoped `BlockCache`. This is what the TIFF
/// decoder is driven with.
pub struct RangeCursor {
    reader: Arc<dyn RangeReader>,
    cache: BlockCache,
    pos: u64,
}

impl RangeCursor {
    pub fn new(reader: Arc<dyn RangeReader>, cache: BlockCache) -> Self {
        Self {
            reader,
            cache,
            pos: 0,
        }
    }

    fn lock_cache(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<u64, Arc<Vec<u8>>>>> {
        self.cache
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "block cache lock poisoned"))
    }

    fn block(&self, index: u64) -> io::Result<Arc<Vec<u8>>> {
        if let Some(block) = self.lock_cache()?.get(&index) {
            return Ok(Arc::clone(block));
        }

        let offset = index * BLOCK_SIZE;
        let length = BLOCK_SIZE.min(self.reader.size().saturating_sub(offset)) as usize;
        if length == 0 {
            return Ok(Arc::new(Vec::new()));
        }
        let data = self
            .reader
            .read_range(offset, length)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let block = Arc::new(data);
        self.lock_cache()?.insert(index, Arc::clone(&block));
        Ok(block)
    }
}

impl Read for RangeCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.reader.size();
        if self.pos >= size || buf.is_empty() {
            return Ok(0);
        }

        let block_index = self.pos / BLOCK_SIZE;
        let within = (self.pos % BLOCK_SIZE) as usize;
        let block = self.block(block_index)?;
        if within >= block.len() {
            return Ok(0);
        }

        let n = buf.len().min(block.len() - within);
        buf[..n].copy_from_slice(&block[within..within + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RangeCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.reader.size() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start",
            ));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}
