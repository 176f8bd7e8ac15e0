//! Archive facade: unifies [`Reader`] and [`Writer`] behind one open/close
//! lifecycle and selects read, write, or append mode at construction.
//!
//! Read mode scans the directory once and is read-only thereafter. Write
//! mode starts at stream position zero with an empty directory. Append
//! mode tries to read an existing directory first; on success the stream is
//! seeked back to the start of the old central directory so `close`
//! overwrites it with the merged one, and on `NotAZip` it falls back to
//! writing from the current end of stream, exactly as if the caller had
//! asked for write mode over a non-empty-but-not-a-zip stream.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::entry::{Entry, Method, Modified};
use crate::error::{Error, Result};
use crate::reader::{EntryReader, Reader};
use crate::scanner;
use crate::writer::Writer;

enum Inner<S> {
    Reading(Reader<S>),
    Writing(Writer<S>),
}

/// An open PKZIP archive, either for reading or for writing/appending.
pub struct Archive<S> {
    inner: Inner<S>,
    closed: bool,
}

impl Archive<File> {
    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_in(File::open(path)?)
    }

    /// Create (truncating) a file for writing.
    pub fn create(path: impl AsRef<Path>, allow_zip64: bool) -> Result<Self> {
        Self::create_in(File::create(path)?, allow_zip64)
    }

    /// Open a file in append mode: existing entries are preserved and new
    /// ones are added after them.
    pub fn append(path: impl AsRef<Path>, allow_zip64: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::append_in(file, allow_zip64)
    }
}

impl<S: Read + Write + Seek> Archive<S> {
    /// Open an in-memory or otherwise caller-provided stream for reading.
    pub fn open_in(stream: S) -> Result<Self> {
        Ok(Archive {
            inner: Inner::Reading(Reader::new(stream)?),
            closed: false,
        })
    }

    /// Start a fresh archive over a caller-provided stream.
    pub fn create_in(stream: S, allow_zip64: bool) -> Result<Self> {
        Ok(Archive {
            inner: Inner::Writing(Writer::new(stream, allow_zip64)),
            closed: false,
        })
    }

    /// Append mode over a caller-provided stream: scan for an existing
    /// directory, and either resume from it or fall back to starting fresh
    /// if the stream isn't a zip yet.
    pub fn append_in(mut stream: S, allow_zip64: bool) -> Result<Self> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        match scanner::scan(&mut stream, stream_len) {
            Ok(dir) => {
                stream.seek(SeekFrom::Start(dir.cd_start))?;
                let writer = Writer::resume(stream, allow_zip64, dir.entries, dir.comment);
                Ok(Archive {
                    inner: Inner::Writing(writer),
                    closed: false,
                })
            }
            Err(Error::NotAZip) => {
                stream.seek(SeekFrom::End(0))?;
                Ok(Archive {
                    inner: Inner::Writing(Writer::new(stream, allow_zip64)),
                    closed: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.inner, Inner::Reading(_))
    }

    pub fn is_writing(&self) -> bool {
        matches!(self.inner, Inner::Writing(_))
    }

    fn reader(&self) -> Result<&Reader<S>> {
        if self.closed {
            return Err(Error::Closed);
        }
        match &self.inner {
            Inner::Reading(r) => Ok(r),
            Inner::Writing(_) => Err(Error::Unsupported(
                "operation requires an archive opened for reading".into(),
            )),
        }
    }

    fn reader_mut(&mut self) -> Result<&mut Reader<S>> {
        if self.closed {
            return Err(Error::Closed);
        }
        match &mut self.inner {
            Inner::Reading(r) => Ok(r),
            Inner::Writing(_) => Err(Error::Unsupported(
                "operation requires an archive opened for reading".into(),
            )),
        }
    }

    fn writer_mut(&mut self) -> Result<&mut Writer<S>> {
        if self.closed {
            return Err(Error::Closed);
        }
        match &mut self.inner {
            Inner::Writing(w) => Ok(w),
            Inner::Reading(_) => Err(Error::Unsupported(
                "operation requires an archive opened for writing or appending".into(),
            )),
        }
    }

    pub fn entries(&self) -> Result<&[Entry]> {
        Ok(self.reader()?.entries())
    }

    pub fn by_name(&self, name: &str) -> Result<Option<&Entry>> {
        Ok(self.reader()?.by_name(name))
    }

    pub fn comment(&self) -> Result<&[u8]> {
        Ok(self.reader()?.comment())
    }

    pub fn set_password(&mut self, password: impl Into<Vec<u8>>) -> Result<()> {
        self.reader_mut()?.set_password(password);
        Ok(())
    }

    pub fn open_entry<'a>(&'a mut self, name: &str) -> Result<EntryReader<'a, S>> {
        self.reader_mut()?.open_entry(name)
    }

    pub fn open_entry_with_password<'a>(
        &'a mut self,
        name: &str,
        password: Option<&[u8]>,
    ) -> Result<EntryReader<'a, S>> {
        self.reader_mut()?.open_entry_with_password(name, password)
    }

    pub fn testzip(&mut self) -> Result<Option<String>> {
        self.reader_mut()?.testzip()
    }

    pub fn write_bytes(
        &mut self,
        name: &str,
        data: &[u8],
        method: Method,
        modified: Modified,
    ) -> Result<()> {
        self.writer_mut()?.write_bytes(name, data, method, modified)
    }

    pub fn write_dir(&mut self, name: &str) -> Result<()> {
        self.writer_mut()?.write_dir(name)
    }

    pub fn write_reader<Src: Read>(
        &mut self,
        name: &str,
        src: Src,
        uncompressed_len: u64,
        method: Method,
        modified: Modified,
    ) -> Result<()> {
        self.writer_mut()?
            .write_reader(name, src, uncompressed_len, method, modified)
    }

    pub fn write_path(
        &mut self,
        fs_path: &Path,
        archive_name: Option<&str>,
        method: Method,
    ) -> Result<()> {
        self.writer_mut()?.write_path(fs_path, archive_name, method)
    }

    pub fn set_comment(&mut self, comment: Vec<u8>) -> Result<()> {
        self.writer_mut()?.set_comment(comment)
    }

    /// Idempotent. In write/append mode, flushes the central directory and
    /// EOCD on the first call. In read mode, there is nothing to flush —
    /// this only marks the archive closed so later operations fail with
    /// [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Inner::Writing(w) = &mut self.inner {
            w.close()?;
        }
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Unwrap the archive, giving the caller back the underlying stream.
    /// In write/append mode this does not implicitly [`close`](Archive::close)
    /// — an unclosed archive yields a corrupt (or stale) directory.
    pub fn into_inner(self) -> S {
        match self.inner {
            Inner::Reading(r) => r.into_inner(),
            Inner::Writing(w) => w.into_inner(),
        }
    }
}
