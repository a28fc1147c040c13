use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where the bytes of one analysis come from: text pasted by the caller,
/// or a stored upload opened as a byte stream (optionally gzipped).
#[derive(Debug, Clone)]
pub enum LogSource {
    Inline(String),
    Upload { key: PathBuf },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("source upload does not exist: {0}")]
    MissingUpload(PathBuf),
    #[error("invalid gzip stream: {0}")]
    InvalidGzip(std::io::Error),
    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncatedBy {
    Lines,
    Bytes,
}

impl TruncatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruncatedBy::Lines => "line_limit",
            TruncatedBy::Bytes => "byte_limit",
        }
    }
}

enum Inner<'a> {
    Inline(std::str::Lines<'a>),
    Plain(BufReader<File>),
    Gzip(BufReader<GzDecoder<File>>),
}

/// Pull-based line reader with two independent ceilings. Once either ceiling
/// is crossed the reader stops yielding and reports the truncation reason;
/// the line that crossed the ceiling is withheld. Byte accounting covers the
/// raw undecoded bytes of each line including its terminator.
pub struct LineReader<'a> {
    inner: Inner<'a>,
    max_lines: usize,
    max_bytes: u64,
    lines_read: usize,
    bytes_read: u64,
    truncated: Option<TruncatedBy>,
}

fn is_gzip(key: &Path, file: &mut File) -> Result<bool, ReadError> {
    let by_suffix = key
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if by_suffix {
        return Ok(true);
    }

    let mut header = [0u8; 2];
    let read = file.read(&mut header)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(read == 2 && header == [0x1f, 0x8b])
}

impl<'a> LineReader<'a> {
    pub fn open(source: &'a LogSource, max_lines: usize, max_bytes: u64) -> Result<Self, ReadError> {
        let inner = match source {
            LogSource::Inline(content) => Inner::Inline(content.lines()),
            LogSource::Upload { key } => {
                if !key.exists() {
                    return Err(ReadError::MissingUpload(key.clone()));
                }
                let mut file = File::open(key)?;
                if is_gzip(key, &mut file)? {
                    Inner::Gzip(BufReader::new(GzDecoder::new(file)))
                } else {
                    Inner::Plain(BufReader::new(file))
                }
            }
        };
        Ok(Self {
            inner,
            max_lines,
            max_bytes,
            lines_read: 0,
            bytes_read: 0,
            truncated: None,
        })
    }

    /// Truncation reason, populated once `next_line` has returned `None`
    /// because a ceiling was crossed.
    pub fn truncation(&self) -> Option<TruncatedBy> {
        self.truncated
    }

    pub fn next_line(&mut self) -> Result<Option<String>, ReadError> {
        if self.truncated.is_some() {
            return Ok(None);
        }

        let raw = match &mut self.inner {
            Inner::Inline(lines) => lines.next().map(|line| {
                let mut bytes = line.as_bytes().to_vec();
                bytes.push(b'\n');
                bytes
            }),
            Inner::Plain(reader) => read_raw_line(reader)?,
            Inner::Gzip(reader) => {
                read_raw_line(reader).map_err(|err| match err {
                    ReadError::Io(io) => ReadError::InvalidGzip(io),
                    other => other,
                })?
            }
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        self.bytes_read += raw.len() as u64;
        if self.bytes_read > self.max_bytes {
            self.truncated = Some(TruncatedBy::Bytes);
            return Ok(None);
        }

        self.lines_read += 1;
        if self.lines_read > self.max_lines {
            self.truncated = Some(TruncatedBy::Lines);
            return Ok(None);
        }

        let decoded = String::from_utf8_lossy(&raw);
        Ok(Some(decoded.trim_end_matches(['\r', '\n']).to_string()))
    }
}

fn read_raw_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, ReadError> {
    let mut buf = Vec::new();
    let read = reader.read_until(b'\n', &mut buf)?;
    if read == 0 {
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}
