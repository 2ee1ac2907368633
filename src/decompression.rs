use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

type GzipReader = BufReader<MultiGzDecoder<File>>;
type ZstdReader = BufReader<zstd::Decoder<'static, BufReader<File>>>;
type PlainReader = BufReader<File>;

/// Input encoding, chosen purely from the file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
    Plain,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("gz") => Compression::Gzip,
            Some("zst") => Compression::Zstd,
            _ => Compression::Plain,
        }
    }
}

/// Streaming decompression wrapper that implements BufRead
pub enum DecompressionReader {
    Gzip(GzipReader),
    /// zstd::Decoder needs BufRead input and provides Read output
    Zstd(ZstdReader),
    Plain(PlainReader),
}

impl std::fmt::Debug for DecompressionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecompressionReader::Gzip(_) => write!(f, "DecompressionReader::Gzip"),
            DecompressionReader::Zstd(_) => write!(f, "DecompressionReader::Zstd"),
            DecompressionReader::Plain(_) => write!(f, "DecompressionReader::Plain"),
        }
    }
}

impl BufRead for DecompressionReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            DecompressionReader::Gzip(reader) => reader.fill_buf(),
            DecompressionReader::Zstd(reader) => reader.fill_buf(),
            DecompressionReader::Plain(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            DecompressionReader::Gzip(reader) => reader.consume(amt),
            DecompressionReader::Zstd(reader) => reader.consume(amt),
            DecompressionReader::Plain(reader) => reader.consume(amt),
        }
    }
}

impl Read for DecompressionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressionReader::Gzip(reader) => reader.read(buf),
            DecompressionReader::Zstd(reader) => reader.read(buf),
            DecompressionReader::Plain(reader) => reader.read(buf),
        }
    }
}

impl DecompressionReader {
    /// Open `path`, decompressing `.gz` and `.zst` files on the fly.
    pub fn open<P: AsRef<Path>>(path: P, buffer_size: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let reader = match Compression::from_path(path) {
            // Multi-member aware: rotated logs are frequently concatenated gzip streams
            Compression::Gzip => DecompressionReader::Gzip(BufReader::with_capacity(
                buffer_size,
                MultiGzDecoder::new(file),
            )),
            Compression::Zstd => DecompressionReader::Zstd(BufReader::with_capacity(
                buffer_size,
                zstd::Decoder::new(file)?,
            )),
            Compression::Plain => {
                DecompressionReader::Plain(BufReader::with_capacity(buffer_size, file))
            }
        };

        Ok(reader)
    }

    pub fn compression(&self) -> Compression {
        match self {
            DecompressionReader::Gzip(_) => Compression::Gzip,
            DecompressionReader::Zstd(_) => Compression::Zstd,
            DecompressionReader::Plain(_) => Compression::Plain,
        }
    }
}
