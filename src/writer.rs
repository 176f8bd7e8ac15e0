//! Streaming archive writer.
//!
//! Each entry's local header is written with provisional zero CRC/sizes,
//! the compressed payload follows in 8 KiB chunks, and the true CRC and
//! compressed size are patched back into the header once both are known.
//! Entries whose uncompressed size or header offset already exceed 32 bits
//! get a ZIP64 extra field reserved up front (so the local header's layout
//! is fixed before any payload byte is written); DEFLATE can never inflate
//! by more than a small constant overhead, so a prediction based on
//! uncompressed size is safe for the one field that's otherwise unknown
//! until compression finishes.
//!
//! Closing patches nothing further: it only appends the central directory
//! and EOCD (promoting to ZIP64 itself when entry count or directory size
//! demands it) and is idempotent. There is no `Drop`-based auto-close —
//! finalizing an archive is a caller-visible action, not something that
//! should happen implicitly when a value goes out of scope.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::codec::{CentralDirHeader, EndOfCentralDir, Zip64EndOfCentralDir, Zip64EocdLocator};
use crate::entry::{encode_name, normalize_archive_name, Entry, Method, Modified};
use crate::error::{Error, Result};
use crate::extra::{
    build_extra_block, offset_needs_zip64, sizes_need_zip64, SENTINEL_32, ZIP64_LIMIT,
};

const WRITE_CHUNK: usize = 8 * 1024;

pub struct Writer<W> {
    output: W,
    entries: Vec<Entry>,
    seen_names: HashSet<String>,
    comment: Vec<u8>,
    allow_zip64: bool,
    closed: bool,
}

impl<W: Write + Seek> Writer<W> {
    pub fn new(output: W, allow_zip64: bool) -> Self {
        Writer {
            output,
            entries: Vec::new(),
            seen_names: HashSet::new(),
            comment: Vec::new(),
            allow_zip64,
            closed: false,
        }
    }

    /// Build a writer that resumes an archive opened in append mode: the
    /// stream is already positioned at the start of the old central
    /// directory (so new entries get appended before it and `close`
    /// overwrites it with the merged directory), and the entries already
    /// on disk are preserved so they appear in the new directory too.
    pub(crate) fn resume(
        output: W,
        allow_zip64: bool,
        entries: Vec<Entry>,
        comment: Vec<u8>,
    ) -> Self {
        let seen_names = entries.iter().map(|e| e.name.clone()).collect();
        Writer {
            output,
            entries,
            seen_names,
            comment,
            allow_zip64,
            closed: false,
        }
    }

    /// Unwrap the writer, giving the caller back the underlying stream.
    /// Does not implicitly [`close`](Writer::close) — an unclosed writer
    /// yields a corrupt archive.
    pub fn into_inner(self) -> W {
        self.output
    }

    /// Set the archive comment, truncating to the 65535-byte field it's
    /// stored in rather than rejecting anything longer.
    pub fn set_comment(&mut self, mut comment: Vec<u8>) -> Result<()> {
        comment.truncate(u16::MAX as usize);
        self.comment = comment;
        Ok(())
    }

    /// Write a directory entry (zero-length, trailing slash, DOS directory
    /// attribute bit set).
    pub fn write_dir(&mut self, name: &str) -> Result<()> {
        self.write_entry(name, Cursor::new(&[][..]), 0, Method::Stored, Modified::epoch(), true)
    }

    /// Write a complete file entry (the `writestr` equivalent: the whole
    /// payload is supplied up front rather than streamed incrementally).
    pub fn write_bytes(
        &mut self,
        name: &str,
        data: &[u8],
        method: Method,
        modified: Modified,
    ) -> Result<()> {
        self.write_entry(name, Cursor::new(data), data.len() as u64, method, modified, false)
    }

    /// Write an entry whose payload is supplied incrementally by `src`
    /// rather than held in memory all at once, with the uncompressed length
    /// already known (e.g. from a `stat` or a caller-tracked counter). The
    /// same path [`Writer::write_path`] takes for on-disk files, generalized
    /// to any [`Read`] source.
    pub fn write_reader<Src: Read>(
        &mut self,
        name: &str,
        src: Src,
        uncompressed_len: u64,
        method: Method,
        modified: Modified,
    ) -> Result<()> {
        self.write_entry(name, src, uncompressed_len, method, modified, false)
    }

    /// Add a file from the local filesystem, mirroring the original
    /// `ZipFile.write(filename)`: the archive name defaults to the path
    /// (normalized), the modification time comes from the file's mtime, and
    /// the uncompressed size is known upfront from `stat` so the ZIP64
    /// reservation decision can be made before the local header is emitted.
    pub fn write_path(
        &mut self,
        fs_path: &Path,
        archive_name: Option<&str>,
        method: Method,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        let metadata = fs_path.metadata()?;
        let name = archive_name
            .map(str::to_string)
            .unwrap_or_else(|| fs_path.to_string_lossy().into_owned());
        let modified = Modified::from_system_time(metadata.modified()?)?;

        if metadata.is_dir() {
            return self.write_entry(&name, Cursor::new(&[][..]), 0, Method::Stored, modified, true);
        }

        let file = File::open(fs_path)?;
        self.write_entry(&name, file, metadata.len(), method, modified, false)
    }

    fn write_entry<Src: Read>(
        &mut self,
        name: &str,
        mut src: Src,
        uncompressed_len: u64,
        method: Method,
        modified: Modified,
        is_dir: bool,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }

        let normalized = normalize_archive_name(name, is_dir);
        if !self.seen_names.insert(normalized.clone()) {
            log::warn!("duplicate entry name written: {:?}", normalized);
        }

        let header_offset = self.output.stream_position()?;
        let predicted_zip64 = self.ensure_writable(uncompressed_len, header_offset)?;

        let (raw_name, utf8) = encode_name(&normalized);
        let extract_version: u16 = if predicted_zip64 { 45 } else { 20 };
        let mut flags = 0u16;
        if utf8 {
            flags |= crate::codec::FLAG_UTF8;
        }

        // Local ZIP64 extra carries only the two size fields (no header
        // offset — that slot belongs to the central directory's copy).
        let local_extra = if predicted_zip64 {
            let mut block = Vec::with_capacity(20);
            block.extend_from_slice(&crate::codec::ZIP64_EXTRA_TAG.to_le_bytes());
            block.extend_from_slice(&16u16.to_le_bytes());
            block.extend_from_slice(&uncompressed_len.to_le_bytes());
            block.extend_from_slice(&0u64.to_le_bytes()); // compressed size, patched after streaming
            block
        } else {
            Vec::new()
        };

        let local = crate::codec::LocalFileHeader {
            extract_version,
            flags,
            method: method.to_u16(),
            mod_time: modified.to_dos(),
            crc32: 0,
            compressed_size: if predicted_zip64 { SENTINEL_32 } else { 0 },
            uncompressed_size: if predicted_zip64 {
                SENTINEL_32
            } else {
                uncompressed_len as u32
            },
            name_len: raw_name.len() as u16,
            extra_len: local_extra.len() as u16,
        };
        local.write(&mut self.output)?;
        self.output.write_all(&raw_name)?;
        self.output.write_all(&local_extra)?;

        let (crc32, compressed_size) = self.stream_payload(&mut src, method)?;

        if !predicted_zip64 && compressed_size > ZIP64_LIMIT {
            return Err(Error::TooLarge);
        }

        self.patch_header(
            header_offset,
            raw_name.len() as u64,
            crc32,
            compressed_size,
            predicted_zip64,
        )?;

        let central_extra = build_extra_block(uncompressed_len, compressed_size, header_offset);
        let entry = Entry {
            name: normalized,
            raw_name,
            modified,
            method,
            flags,
            crc32,
            compressed_size,
            uncompressed_size: uncompressed_len,
            header_offset,
            extra: central_extra,
            comment: Vec::new(),
            create_system: 0,
            create_version: 20,
            extract_version,
            internal_attr: 0,
            external_attr: if is_dir { 0x10 } else { 0 },
            disk_start: 0,
            reserved: 0,
        };
        self.entries.push(entry);
        Ok(())
    }

    /// Returns whether the entry's local header must reserve ZIP64 extra
    /// space, erroring `TooLarge` when it would need to but ZIP64 isn't
    /// enabled for this archive. Promotion is decided against the
    /// conservative `ZIP64_LIMIT` (2^31-1), not the fields' true 32-bit
    /// wire limit — matching the reference writer, which pushes an entry
    /// into ZIP64 well before its fields would actually overflow.
    fn ensure_writable(&self, uncompressed_len: u64, header_offset: u64) -> Result<bool> {
        let needs_zip64 =
            uncompressed_len > ZIP64_LIMIT || offset_needs_zip64(header_offset);
        if needs_zip64 && !self.allow_zip64 {
            return Err(Error::TooLarge);
        }
        Ok(needs_zip64)
    }

    /// Stream `src` through the CRC and (for DEFLATED) the compressor in
    /// fixed-size chunks, writing each chunk's output to `self.output` as it
    /// is produced. `src` is read to EOF regardless of its ultimate length,
    /// so this path serves both in-memory buffers (via a `Cursor`) and
    /// filesystem files opened by [`Writer::write_path`].
    fn stream_payload<Src: Read>(&mut self, src: &mut Src, method: Method) -> Result<(u32, u64)> {
        let mut crc = crc32fast::Hasher::new();
        let mut compressed_size = 0u64;
        let mut buf = vec![0u8; WRITE_CHUNK];

        match method {
            Method::Stored => loop {
                let n = src.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                crc.update(&buf[..n]);
                self.output.write_all(&buf[..n])?;
                compressed_size += n as u64;
            },
            Method::Deflated => {
                let mut compressor = Compress::new(Compression::default(), false);
                let mut out = vec![0u8; WRITE_CHUNK];
                loop {
                    let n = src.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    crc.update(&buf[..n]);
                    compressed_size += self.drain_compress(
                        &mut compressor,
                        &buf[..n],
                        &mut out,
                        FlushCompress::None,
                    )?;
                }
                compressed_size +=
                    self.drain_compress(&mut compressor, &[], &mut out, FlushCompress::Finish)?;
            }
            Method::Other(m) => {
                return Err(Error::Unsupported(format!(
                    "compression method {} is not supported for writing",
                    m
                )))
            }
        }

        Ok((crc.finalize(), compressed_size))
    }

    fn drain_compress(
        &mut self,
        compressor: &mut Compress,
        input: &[u8],
        out: &mut [u8],
        flush: FlushCompress,
    ) -> Result<u64> {
        let mut written = 0u64;
        let mut input_pos = 0usize;
        loop {
            let before_in = compressor.total_in();
            let before_out = compressor.total_out();
            let status = compressor
                .compress(&input[input_pos..], out, flush)
                .map_err(|e| Error::Corrupt(format!("deflate compression failed: {}", e)))?;
            let consumed = (compressor.total_in() - before_in) as usize;
            let produced = (compressor.total_out() - before_out) as usize;
            input_pos += consumed;
            if produced > 0 {
                self.output.write_all(&out[..produced])?;
                written += produced as u64;
            }
            let made_progress = consumed > 0 || produced > 0;
            let input_exhausted = input_pos >= input.len();
            match status {
                Status::StreamEnd => break,
                _ if input_exhausted && !matches!(flush, FlushCompress::Finish) => break,
                _ if input_exhausted && matches!(flush, FlushCompress::Finish) && !made_progress => {
                    break
                }
                _ => continue,
            }
        }
        Ok(written)
    }

    /// Patch the CRC and compressed size back into an already-written
    /// local header, restoring the stream position afterward. When the
    /// entry reserved ZIP64 extra space, the 32-bit header fields stay at
    /// their sentinel value and the real compressed size goes into that
    /// extra block's second slot instead.
    fn patch_header(
        &mut self,
        header_offset: u64,
        raw_name_len: u64,
        crc32: u32,
        compressed_size: u64,
        predicted_zip64: bool,
    ) -> Result<()> {
        let return_pos = self.output.stream_position()?;

        self.output.seek(SeekFrom::Start(header_offset + 14))?;
        self.output.write_all(&crc32.to_le_bytes())?;
        if !predicted_zip64 {
            self.output
                .write_all(&(compressed_size as u32).to_le_bytes())?;
        } else {
            // Local header layout: 30 fixed bytes + name + extra. The
            // extra's ZIP64 block is tag(2) + len(2) + uncompressed(8),
            // then the compressed-size slot we need to patch.
            let compressed_slot =
                header_offset + crate::codec::LOCAL_HEADER_FIXED_SIZE + raw_name_len + 4 + 8;
            self.output.seek(SeekFrom::Start(compressed_slot))?;
            self.output.write_all(&compressed_size.to_le_bytes())?;
        }

        self.output.seek(SeekFrom::Start(return_pos))?;
        Ok(())
    }

    /// Closes the archive: writes the central directory and EOCD (promoting
    /// to ZIP64 when the entry count or directory size demands it).
    /// Calling this more than once is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let cd_offset = self.output.stream_position()?;
        for entry in &self.entries {
            // Sentinel decisions must track the same ZIP64_LIMIT-based
            // promotion that built `entry.extra`, not the fields' raw
            // magnitude: a size like 2^31 fits a u32 fine but is still
            // promoted (see `sizes_need_zip64`), and the fixed-header field
            // must show the sentinel whenever the extra block carries the
            // override, or a reader has no signal to consult it.
            let size_promoted = sizes_need_zip64(entry.uncompressed_size, entry.compressed_size);
            let offset_promoted = offset_needs_zip64(entry.header_offset);
            let header = CentralDirHeader {
                create_version: ((entry.create_system as u16) << 8)
                    | (entry.create_version & 0xff),
                extract_version: entry.extract_version,
                flags: entry.flags,
                method: entry.method.to_u16(),
                mod_time: entry.modified.to_dos(),
                crc32: entry.crc32,
                compressed_size: if size_promoted {
                    SENTINEL_32
                } else {
                    entry.compressed_size as u32
                },
                uncompressed_size: if size_promoted {
                    SENTINEL_32
                } else {
                    entry.uncompressed_size as u32
                },
                name_len: entry.raw_name.len() as u16,
                extra_len: entry.extra.len() as u16,
                comment_len: entry.comment.len() as u16,
                disk_start: entry.disk_start,
                internal_attr: entry.internal_attr,
                external_attr: entry.external_attr,
                local_header_offset: if offset_promoted {
                    SENTINEL_32
                } else {
                    entry.header_offset as u32
                },
            };
            header.write(&mut self.output)?;
            self.output.write_all(&entry.raw_name)?;
            self.output.write_all(&entry.extra)?;
            self.output.write_all(&entry.comment)?;
        }
        let cd_size = self.output.stream_position()? - cd_offset;

        let need_zip64 = self.entries.len() > u16::MAX as usize
            || cd_size > u32::MAX as u64
            || cd_offset > u32::MAX as u64;

        if need_zip64 && !self.allow_zip64 {
            return Err(Error::TooLarge);
        }

        if need_zip64 {
            let zip64_eocd_offset = self.output.stream_position()?;
            let zip64 = Zip64EndOfCentralDir {
                create_version: 45,
                extract_version: 45,
                disk_number: 0,
                cd_start_disk: 0,
                cd_entries_this_disk: self.entries.len() as u64,
                cd_entries_total: self.entries.len() as u64,
                cd_size,
                cd_offset,
            };
            zip64.write(&mut self.output)?;

            let locator = Zip64EocdLocator {
                cd_start_disk: 0,
                zip64_eocd_offset,
                total_disks: 1,
            };
            locator.write(&mut self.output)?;
        }

        let entry_count_field = if need_zip64 {
            0xFFFFu16
        } else {
            self.entries.len() as u16
        };
        let eocd = EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            cd_entries_this_disk: entry_count_field,
            cd_entries_total: entry_count_field,
            cd_size: sentinel_or_u32(cd_size),
            cd_offset: sentinel_or_u32(cd_offset),
            comment_len: self.comment.len() as u16,
        };
        eocd.write(&mut self.output)?;
        self.output.write_all(&self.comment)?;

        self.output.flush()?;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn sentinel_or_u32(v: u64) -> u32 {
    if v > u32::MAX as u64 {
        SENTINEL_32
    } else {
        v as u32
    }
}
