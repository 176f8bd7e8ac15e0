//! Streaming entry reader.
//!
//! Opening an entry validates its local header, optionally verifies a
//! password, and hands back an [`EntryReader`] implementing [`Read`]. The
//! byte pipeline between the archive and the caller has three states: a
//! `raw` buffer of ciphertext/compressed bytes pulled from the stream (read
//! ahead in capped chunks), a `decoded` buffer of bytes already inflated and
//! waiting to be handed to the caller, and an `eof` flag once both are
//! drained and the stream has nothing left to give. These states are kept
//! distinct rather than merged into one buffer because the decoder may
//! consume less raw input than it's given (DEFLATE can leave an
//! "unconsumed tail" that must carry over to the next pull) while still
//! producing more decoded output than fits in a single caller-supplied
//! slice.

use std::io::{self, Read, Seek, SeekFrom};

use flate2::{Decompress, FlushDecompress, Status};

use crate::codec::{LocalFileHeader, FLAG_DATA_DESCRIPTOR};
use crate::decrypt::Decrypter;
use crate::entry::{Entry, Method};
use crate::error::{Error, Result};
use crate::scanner::{self, Directory};

/// Upper bound on how much ciphertext/compressed data is pulled from the
/// underlying stream in one top-up, independent of the caller's read size.
const READ_AHEAD_CAP: usize = 64 * 1024;

/// Owns the archive stream and its parsed directory; opens entries for
/// streaming, decrypted, decompressed reads.
pub struct Reader<R> {
    source: R,
    dir: Directory,
    password: Option<Vec<u8>>,
}

impl<R: Read + Seek> Reader<R> {
    pub fn new(mut source: R) -> Result<Self> {
        let stream_len = source.seek(SeekFrom::End(0))?;
        let dir = scanner::scan(&mut source, stream_len)?;
        Ok(Reader {
            source,
            dir,
            password: None,
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.dir.entries
    }

    pub fn by_name(&self, name: &str) -> Option<&Entry> {
        self.dir.find(name)
    }

    pub fn comment(&self) -> &[u8] {
        &self.dir.comment
    }

    /// Unwrap the reader, giving the caller back the underlying stream.
    pub fn into_inner(self) -> R {
        self.source
    }

    pub fn set_password(&mut self, password: impl Into<Vec<u8>>) {
        self.password = Some(password.into());
    }

    pub fn open_entry<'a>(&'a mut self, name: &str) -> Result<EntryReader<'a, R>> {
        let password = self.password.clone();
        self.open_entry_with_password(name, password.as_deref())
    }

    pub fn open_entry_with_password<'a>(
        &'a mut self,
        name: &str,
        password: Option<&[u8]>,
    ) -> Result<EntryReader<'a, R>> {
        let entry = self
            .dir
            .find(name)
            .ok_or_else(|| Error::Corrupt(format!("no such entry: {}", name)))?
            .clone();
        EntryReader::open(&mut self.source, entry, password)
    }

    /// Read every entry fully, verifying CRC-32, and return the name of the
    /// first entry that fails, or `None` if the whole archive checks out.
    pub fn testzip(&mut self) -> Result<Option<String>> {
        let names: Vec<String> = self.dir.entries.iter().map(|e| e.name.clone()).collect();
        for name in names {
            if name.ends_with('/') {
                continue;
            }
            let mut entry_reader = self.open_entry(&name)?;
            let mut sink = [0u8; 8192];
            loop {
                match entry_reader.read(&mut sink) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        log::debug!("testzip: entry {:?} failed: {}", name, e);
                        return Ok(Some(name));
                    }
                }
            }
        }
        Ok(None)
    }
}

enum Inflater {
    Stored,
    Deflated(Box<Decompress>),
}

/// Streaming reader over one archive entry's decompressed, decrypted bytes.
pub struct EntryReader<'a, R> {
    source: &'a mut R,
    entry: Entry,
    compressed_remaining: u64,
    raw: Vec<u8>,
    raw_pos: usize,
    decoded: Vec<u8>,
    decoded_pos: usize,
    inflater: Inflater,
    decrypter: Option<Decrypter>,
    crc: crc32fast::Hasher,
    produced: u64,
    finished: bool,
    verified: bool,
}

impl<'a, R: Read + Seek> EntryReader<'a, R> {
    fn open(source: &'a mut R, entry: Entry, password: Option<&[u8]>) -> Result<Self> {
        source.seek(SeekFrom::Start(entry.header_offset))?;
        let local = LocalFileHeader::read(source)?;
        let mut local_name = vec![0u8; local.name_len as usize];
        source.read_exact(&mut local_name)?;
        let mut local_extra = vec![0u8; local.extra_len as usize];
        source.read_exact(&mut local_extra)?;
        if local_name != entry.raw_name {
            return Err(Error::Corrupt(format!(
                "local header name for {:?} does not match central directory",
                entry.name
            )));
        }

        let mut compressed_remaining = entry.compressed_size;
        let decrypter = if entry.is_encrypted() {
            let password = password.ok_or(Error::BadPassword)?;
            let mut header = [0u8; 12];
            source.read_exact(&mut header)?;
            compressed_remaining = compressed_remaining
                .checked_sub(12)
                .ok_or_else(|| Error::Corrupt("encrypted entry shorter than header".into()))?;

            let expected = if entry.flags & FLAG_DATA_DESCRIPTOR != 0 {
                (entry.modified.to_dos().time >> 8) as u8
            } else {
                (entry.crc32 >> 24) as u8
            };
            let keys = Decrypter::new(password);
            Some(keys.verify_header(&mut header, expected)?)
        } else {
            None
        };

        let inflater = match entry.method {
            Method::Stored => Inflater::Stored,
            Method::Deflated => Inflater::Deflated(Box::new(Decompress::new(false))),
            Method::Other(m) => {
                return Err(Error::Unsupported(format!(
                    "compression method {} is not supported",
                    m
                )))
            }
        };

        Ok(EntryReader {
            source,
            entry,
            compressed_remaining,
            raw: Vec::new(),
            raw_pos: 0,
            decoded: Vec::new(),
            decoded_pos: 0,
            inflater,
            decrypter,
            crc: crc32fast::Hasher::new(),
            produced: 0,
            finished: false,
            verified: false,
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Iterate entry contents as lines. `universal` enables `\r`/`\r\n`/`\n`
    /// splitting; when disabled only `\n` terminates a line.
    pub fn lines(&mut self, universal: bool) -> Lines<'_, 'a, R> {
        Lines {
            reader: self,
            universal,
            pending: Vec::new(),
            exhausted: false,
        }
    }

    fn top_up_raw(&mut self) -> Result<()> {
        if self.raw_pos > 0 {
            self.raw.drain(0..self.raw_pos);
            self.raw_pos = 0;
        }
        if self.compressed_remaining == 0 {
            return Ok(());
        }
        let want = self.compressed_remaining.min(READ_AHEAD_CAP as u64) as usize;
        let mut chunk = vec![0u8; want];
        self.source.read_exact(&mut chunk)?;
        self.compressed_remaining -= want as u64;
        if let Some(dec) = &mut self.decrypter {
            dec.decrypt_buf(&mut chunk);
        }
        self.raw.extend_from_slice(&chunk);
        Ok(())
    }

    /// Advance the pipeline by one step, appending newly decoded bytes to
    /// `self.decoded`. Returns `true` once both buffers are drained and the
    /// underlying stream is exhausted.
    fn pump(&mut self) -> Result<bool> {
        if self.raw_pos == self.raw.len() {
            self.top_up_raw()?;
        }

        match &mut self.inflater {
            Inflater::Stored => {
                if self.raw_pos == self.raw.len() {
                    return Ok(true);
                }
                let take = self.raw.len() - self.raw_pos;
                self.decoded.extend_from_slice(&self.raw[self.raw_pos..]);
                self.raw_pos += take;
                Ok(false)
            }
            Inflater::Deflated(inflater) => {
                if self.raw_pos == self.raw.len() && self.compressed_remaining == 0 {
                    let mut out = vec![0u8; READ_AHEAD_CAP];
                    let before_out = inflater.total_out();
                    let status = inflater
                        .decompress(&[], &mut out, FlushDecompress::Finish)
                        .map_err(|e| Error::Corrupt(format!("deflate finish failed: {}", e)))?;
                    let produced = (inflater.total_out() - before_out) as usize;
                    self.decoded.extend_from_slice(&out[..produced]);
                    if produced == 0 && !matches!(status, Status::StreamEnd) {
                        return Err(Error::Corrupt(format!(
                            "deflate stream for {:?} ended before reaching its end marker",
                            self.entry.name
                        )));
                    }
                    return Ok(matches!(status, Status::StreamEnd) && produced == 0);
                }

                let mut out = vec![0u8; READ_AHEAD_CAP];
                let before_in = inflater.total_in();
                let before_out = inflater.total_out();
                let status = inflater
                    .decompress(&self.raw[self.raw_pos..], &mut out, FlushDecompress::None)
                    .map_err(|e| Error::Corrupt(format!("deflate error: {}", e)))?;
                let consumed = (inflater.total_in() - before_in) as usize;
                let produced = (inflater.total_out() - before_out) as usize;
                self.raw_pos += consumed;
                self.decoded.extend_from_slice(&out[..produced]);
                Ok(matches!(status, Status::StreamEnd))
            }
        }
    }

    fn verify_crc(&self) -> Result<()> {
        let actual = self.crc.clone().finalize();
        if actual != self.entry.crc32 {
            return Err(Error::Corrupt(format!(
                "CRC mismatch for {:?}: expected {:08x}, got {:08x}",
                self.entry.name, self.entry.crc32, actual
            )));
        }
        if self.produced != self.entry.uncompressed_size {
            return Err(Error::Corrupt(format!(
                "size mismatch for {:?}: expected {} bytes, produced {}",
                self.entry.name, self.entry.uncompressed_size, self.produced
            )));
        }
        Ok(())
    }
}

impl<'a, R: Read + Seek> EntryReader<'a, R> {
    fn ensure_verified(&mut self) -> io::Result<()> {
        if self.finished && !self.verified {
            self.verified = true;
            self.verify_crc()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        Ok(())
    }
}

impl<'a, R: Read + Seek> Read for EntryReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished && self.decoded_pos == self.decoded.len() {
            self.ensure_verified()?;
            return Ok(0);
        }
        while self.decoded_pos == self.decoded.len() && !self.finished {
            let done = self
                .pump()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            if done {
                self.finished = true;
            }
        }
        let available = &self.decoded[self.decoded_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.crc.update(&buf[..n]);
        self.produced += n as u64;
        self.decoded_pos += n;

        if n == 0 && self.finished {
            self.ensure_verified()?;
        }
        Ok(n)
    }
}

/// Line iterator over an [`EntryReader`], with optional universal newline
/// handling (`\r`, `\n`, and `\r\n` all terminate a line).
pub struct Lines<'r, 'a, R> {
    reader: &'r mut EntryReader<'a, R>,
    universal: bool,
    pending: Vec<u8>,
    exhausted: bool,
}

impl<'r, 'a, R: Read + Seek> Iterator for Lines<'r, 'a, R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted && self.pending.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.pending);
        loop {
            let mut byte = [0u8; 1];
            match self.reader.read(&mut byte) {
                Ok(0) => {
                    self.exhausted = true;
                    return if line.is_empty() { None } else { Some(Ok(line)) };
                }
                Ok(_) => {
                    let b = byte[0];
                    if !self.universal {
                        line.push(b);
                        if b == b'\n' {
                            return Some(Ok(line));
                        }
                        continue;
                    }
                    if b == b'\n' {
                        line.push(b);
                        return Some(Ok(line));
                    }
                    if b == b'\r' {
                        // A lone \r also ends a line, but a \r\n pair must
                        // collapse to a single break; peek one byte ahead to
                        // decide, stashing it for the next line if it turns
                        // out to belong there.
                        let mut next = [0u8; 1];
                        match self.reader.read(&mut next) {
                            Ok(0) => {
                                self.exhausted = true;
                                line.push(b'\n');
                                return Some(Ok(line));
                            }
                            Ok(_) => {
                                line.push(b'\n');
                                if next[0] != b'\n' {
                                    self.pending.push(next[0]);
                                }
                                return Some(Ok(line));
                            }
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    line.push(b);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
