//! Segment file format shared by partial and merged segments.
//!
//! A segment is a run of records sorted by term:
//!
//! ```text
//! u32 LE term length | term bytes | u32 LE payload length | payload
//! ```
//!
//! The payload is the bincode encoding of the term's posting list. Directory
//! extents point at the payload, so a lookup is one seek and one read.

use crate::directory::Extent;
use crate::error::{IndexError, Result};
use crate::index::{Posting, PostingList};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub fn encode_postings(postings: &[Posting]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(postings)?)
}

pub fn decode_postings(bytes: &[u8]) -> Result<PostingList> {
    Ok(bincode::deserialize(bytes)?)
}

pub struct SegmentWriter {
    out: BufWriter<File>,
    path: PathBuf,
    position: u64,
    last_term: Option<String>,
}

impl SegmentWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(f),
            path: path.to_path_buf(),
            position: 0,
            last_term: None,
        })
    }

    /// Append one record and return the extent of its payload.
    pub fn write_record(&mut self, term: &str, postings: &[Posting]) -> Result<Extent> {
        if let Some(prev) = &self.last_term {
            if prev.as_str() >= term {
                return Err(IndexError::Corrupt(format!(
                    "{}: term {term:?} written after {prev:?}",
                    self.path.display()
                )));
            }
        }
        let payload = encode_postings(postings)?;
        let term_len = u32::try_from(term.len())
            .map_err(|_| IndexError::Corrupt(format!("term too long: {} bytes", term.len())))?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| IndexError::Corrupt(format!("posting list for {term:?} too large")))?;

        self.out.write_all(&term_len.to_le_bytes())?;
        self.out.write_all(term.as_bytes())?;
        self.out.write_all(&payload_len.to_le_bytes())?;
        let offset = self.position + 8 + term.len() as u64;
        self.out.write_all(&payload)?;
        self.position = offset + payload.len() as u64;
        self.last_term = Some(term.to_string());
        Ok(Extent { offset, len: payload.len() as u64 })
    }

    /// Flush buffers and fsync. Returns the total bytes written.
    pub fn finish(self) -> Result<u64> {
        let f = self.out.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
        f.sync_all()?;
        Ok(self.position)
    }
}

/// Sequential reader over a segment; holds at most one record at a time.
pub struct SegmentReader {
    input: BufReader<File>,
    path: PathBuf,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        Ok(Self { input: BufReader::new(f), path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn next_record(&mut self) -> Result<Option<(String, PostingList)>> {
        let term_len = match read_u32_or_eof(&mut self.input)? {
            Some(n) => n as usize,
            None => return Ok(None),
        };
        let mut term = vec![0u8; term_len];
        self.input.read_exact(&mut term)?;
        let term = String::from_utf8(term)
            .map_err(|_| IndexError::Corrupt(format!("{}: term is not utf-8", self.path.display())))?;
        let payload_len = read_u32_or_eof(&mut self.input)?.ok_or_else(|| {
            IndexError::Corrupt(format!("{}: truncated record for {term:?}", self.path.display()))
        })?;
        let mut payload = vec![0u8; payload_len as usize];
        self.input.read_exact(&mut payload)?;
        let postings = decode_postings(&payload)?;
        Ok(Some((term, postings)))
    }
}

fn read_u32_or_eof<R: Read>(r: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(IndexError::Io(ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u32::from_le_bytes(buf)))
}

/// Read exactly one payload from an open segment file.
pub fn read_payload(file: &mut File, extent: Extent) -> Result<PostingList> {
    file.seek(SeekFrom::Start(extent.offset))?;
    let mut buf = vec![0u8; extent.len as usize];
    file.read_exact(&mut buf)?;
    decode_postings(&buf)
}
