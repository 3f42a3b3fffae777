//! Dump source resolution and decoding.
//!
//! An [`Origin`] names where a dump comes from (remote URL, local file or an
//! inline SQL snippet). [`DumpSource`] turns it into a stream of UTF-8 lines,
//! transparently decompressing gzip, bzip2, xz and zstd input.

use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Timeout for fetching a remote dump.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Compression format detected from the origin name's suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression from a file name or URL. Query strings and
    /// fragments on URLs are ignored.
    pub fn from_name(name: &str) -> Self {
        let name = name
            .split(['?', '#'])
            .next()
            .unwrap_or(name)
            .to_ascii_lowercase();
        let ext = name.rsplit_once('.').map(|(_, ext)| ext);

        match ext {
            Some("gz" | "gzip") => Compression::Gzip,
            Some("bz2" | "bzip2") => Compression::Bzip2,
            Some("xz" | "lzma") => Compression::Xz,
            Some("zst" | "zstd") => Compression::Zstd,
            _ => Compression::None,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::from_name(&path.to_string_lossy())
    }

    pub fn is_compressed(&self) -> bool {
        *self != Compression::None
    }

    /// Wrap a reader with the matching decompressor
    pub fn wrap_reader<'a>(
        &self,
        reader: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>, SourceError> {
        Ok(match self {
            Compression::None => reader,
            Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader).map_err(
                |source| SourceError::Decompression {
                    compression: *self,
                    source,
                },
            )?),
        })
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::Xz => write!(f, "xz"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

/// Errors raised while resolving or reading a dump source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("dump source not found: {0}")]
    NotFound(String),

    #[error("dump is not valid UTF-8 at line {line}")]
    Decode { line: u64 },

    #[error("failed to decompress {compression} data: {source}")]
    Decompression {
        compression: Compression,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read dump: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a dump comes from. Resolved once when a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    RemoteUrl {
        url: String,
        compression: Compression,
    },
    LocalPath {
        path: PathBuf,
        compression: Compression,
    },
    InlineText(String),
}

impl Origin {
    /// Classify a source string: `http(s)://` is remote, an existing file is
    /// local, anything else is taken as literal SQL.
    pub fn resolve(source: &str) -> Self {
        let lower = source.trim_start().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = source.trim().to_string();
            return Origin::RemoteUrl {
                compression: Compression::from_name(&url),
                url,
            };
        }

        let path = Path::new(source);
        if !source.contains('\n') && path.is_file() {
            return Origin::LocalPath {
                path: path.to_path_buf(),
                compression: Compression::from_path(path),
            };
        }

        Origin::InlineText(source.to_string())
    }

    pub fn compression(&self) -> Compression {
        match self {
            Origin::RemoteUrl { compression, .. } | Origin::LocalPath { compression, .. } => {
                *compression
            }
            Origin::InlineText(_) => Compression::None,
        }
    }

    /// Short human-readable label
    pub fn describe(&self) -> String {
        match self {
            Origin::RemoteUrl { url, .. } => url.clone(),
            Origin::LocalPath { path, .. } => path.display().to_string(),
            Origin::InlineText(text) => format!("inline SQL ({} bytes)", text.len()),
        }
    }
}

/// Decoded line stream over a dump.
///
/// Lines keep their line terminator. The underlying file handle or
/// decompressor is released when the source is dropped.
pub struct DumpSource {
    reader: Box<dyn BufRead>,
    compression: Compression,
    bytes_read: u64,
    line_number: u64,
    raw: Vec<u8>,
}

impl DumpSource {
    /// Open an origin for reading.
    pub fn open(origin: &Origin) -> Result<Self, SourceError> {
        match origin {
            Origin::RemoteUrl { url, compression } => Self::fetch(url, *compression),
            Origin::LocalPath { path, compression } => Self::open_file(path, *compression),
            Origin::InlineText(text) => {
                info!("using inline SQL text as source");
                Ok(Self::inline(text.clone()))
            }
        }
    }

    /// Wrap literal SQL text.
    pub fn inline(text: impl Into<String>) -> Self {
        Self::from_reader(Cursor::new(text.into().into_bytes()), Compression::None)
    }

    /// Wrap a reader. Read errors are reported as [`SourceError::Decompression`]
    /// unless `compression` is [`Compression::None`].
    pub fn from_reader<R: BufRead + 'static>(reader: R, compression: Compression) -> Self {
        Self {
            reader: Box::new(reader),
            compression,
            bytes_read: 0,
            line_number: 0,
            raw: Vec::with_capacity(4096),
        }
    }

    fn open_file(path: &Path, compression: Compression) -> Result<Self, SourceError> {
        info!(path = %path.display(), %compression, "reading SQL file");
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
            _ => SourceError::Io(e),
        })?;
        let reader = compression.wrap_reader(Box::new(file))?;
        Ok(Self::from_reader(
            BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            compression,
        ))
    }

    fn fetch(url: &str, compression: Compression) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Self::download(&client, url, compression)
    }

    fn download(
        client: &reqwest::blocking::Client,
        url: &str,
        compression: Compression,
    ) -> Result<Self, SourceError> {
        info!(url, %compression, "downloading SQL dump");
        let network = |message: String| SourceError::Network {
            url: url.to_string(),
            message,
        };

        let response = client.get(url).send().map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(network(format!("server responded with {status}")));
        }

        let body = response.bytes().map_err(|e| network(e.to_string()))?;

        // Remote bodies are already in memory; inflate eagerly so a corrupt
        // archive fails before any statement runs.
        let decoded = if compression.is_compressed() {
            let mut reader = compression.wrap_reader(Box::new(Cursor::new(body)))?;
            let mut out = Vec::new();
            reader
                .read_to_end(&mut out)
                .map_err(|source| SourceError::Decompression {
                    compression,
                    source,
                })?;
            out
        } else {
            body.to_vec()
        };

        Ok(Self::from_reader(Cursor::new(decoded), Compression::None))
    }

    /// Read the next line into `line`, replacing its contents. Returns
    /// `false` once the stream is exhausted.
    pub fn read_line(&mut self, line: &mut String) -> Result<bool, SourceError> {
        line.clear();
        self.raw.clear();

        let n = self
            .reader
            .read_until(b'\n', &mut self.raw)
            .map_err(|source| match self.compression {
                Compression::None => SourceError::Io(source),
                compression => SourceError::Decompression {
                    compression,
                    source,
                },
            })?;
        if n == 0 {
            return Ok(false);
        }

        self.bytes_read += n as u64;
        self.line_number += 1;

        let mut bytes = self.raw.as_slice();
        if self.line_number == 1 {
            bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| SourceError::Decode {
            line: self.line_number,
        })?;
        line.push_str(text);
        Ok(true)
    }

    /// Decoded bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

impl std::fmt::Debug for DumpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpSource")
            .field("compression", &self.compression)
            .field("bytes_read", &self.bytes_read)
            .field("line_number", &self.line_number)
            .finish()
    }
}
