//! Locates the end-of-central-directory record and parses the central
//! directory into a normalized [`Directory`].

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::codec::{
    read_bytes, CentralDirHeader, EndOfCentralDir, Zip64EndOfCentralDir, Zip64EocdLocator,
    CENTRAL_DIR_FIXED_SIZE, EOCD_FIXED_SIZE, EOCD_SIG, ZIP64_EOCD_FIXED_SIZE,
    ZIP64_EOCD_LOCATOR_SIZE,
};
use crate::entry::{decode_name, Entry, Method, Modified};
use crate::error::{Error, Result};
use crate::extra::promote_from_extra;

/// Maximum trailing region searched for the EOCD signature: the largest
/// possible archive comment (65535) plus the fixed EOCD size.
const MAX_EOCD_SEARCH: u64 = 65535 + EOCD_FIXED_SIZE;

/// Parsed archive directory: an ordered sequence of entries plus a
/// name -> index map. Lookup by name returns the last-inserted match.
pub struct Directory {
    pub entries: Vec<Entry>,
    pub comment: Vec<u8>,
    /// Physical byte offset at which the central directory begins, with
    /// any prepended-bytes shift already folded in. Used by append mode to
    /// seek the writer back to the point where the old directory starts so
    /// it gets overwritten by the new one at close.
    pub cd_start: u64,
    by_name: HashMap<String, usize>,
}

impl Directory {
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn empty() -> Self {
        Directory {
            entries: Vec::new(),
            comment: Vec::new(),
            cd_start: 0,
            by_name: HashMap::new(),
        }
    }

    fn push(&mut self, entry: Entry) {
        let idx = self.entries.len();
        self.by_name.insert(entry.name.clone(), idx);
        self.entries.push(entry);
    }
}

struct RawEocd {
    /// Physical offset of whatever immediately follows the central
    /// directory on disk (EOCD, or the ZIP64 EOCD record when present).
    position: u64,
    cd_entries_total: u64,
    cd_size: u64,
    cd_offset: u64,
    comment: Vec<u8>,
}

/// Locate and parse the directory of a seekable archive stream of known
/// length. `stream_len` must equal the stream's total byte length.
pub fn scan<R: Read + Seek>(r: &mut R, stream_len: u64) -> Result<Directory> {
    let raw = find_eocd(r, stream_len)?;

    // concat accounts for arbitrary bytes prepended to the archive: the
    // directory's own offset/size fields describe the file as it was
    // written, while `raw.position` is where that directory actually
    // ends up physically once a prefix shifts everything.
    let concat = raw.position as i64 - raw.cd_size as i64 - raw.cd_offset as i64;

    let cd_start = (raw.cd_offset as i64 + concat) as u64;
    r.seek(SeekFrom::Start(cd_start))?;
    let cd_bytes = read_bytes(r, raw.cd_size as usize)?;
    let mut cursor: &[u8] = &cd_bytes;

    let mut dir = Directory {
        entries: Vec::with_capacity(raw.cd_entries_total as usize),
        comment: raw.comment,
        cd_start,
        by_name: HashMap::with_capacity(raw.cd_entries_total as usize),
    };

    loop {
        if cursor.is_empty() {
            break;
        }
        if cursor.len() < CENTRAL_DIR_FIXED_SIZE as usize {
            return Err(Error::Corrupt("truncated central directory record".into()));
        }
        let header = match CentralDirHeader::read(&mut cursor)? {
            Some(h) => h,
            None => return Err(Error::Corrupt("bad central directory signature".into())),
        };

        let raw_name = read_bytes(&mut cursor, header.name_len as usize)
            .map_err(|e| Error::Corrupt(format!("short name field: {}", e)))?;
        let extra = read_bytes(&mut cursor, header.extra_len as usize)
            .map_err(|e| Error::Corrupt(format!("short extra field: {}", e)))?;
        let comment = read_bytes(&mut cursor, header.comment_len as usize)
            .map_err(|e| Error::Corrupt(format!("short comment field: {}", e)))?;

        let utf8 = header.flags & crate::codec::FLAG_UTF8 != 0;
        let name = decode_name(&raw_name, utf8);

        let (uncompressed_size, compressed_size, header_offset) = promote_from_extra(
            &extra,
            header.uncompressed_size,
            header.compressed_size,
            header.local_header_offset,
        )?;

        let entry = Entry {
            name,
            raw_name,
            modified: Modified::from_dos(header.mod_time),
            method: Method::from_u16(header.method),
            flags: header.flags,
            crc32: header.crc32,
            compressed_size,
            uncompressed_size,
            header_offset: (header_offset as i64 + concat) as u64,
            extra,
            comment,
            create_system: (header.create_version >> 8) as u8,
            create_version: header.create_version & 0xff,
            extract_version: header.extract_version,
            internal_attr: header.internal_attr,
            external_attr: header.external_attr,
            disk_start: header.disk_start,
            reserved: 0,
        };
        log::trace!(
            "scanned entry {:?} offset={} method={:?}",
            entry.name,
            entry.header_offset,
            entry.method
        );
        dir.push(entry);
    }

    Ok(dir)
}

fn find_eocd<R: Read + Seek>(r: &mut R, stream_len: u64) -> Result<RawEocd> {
    if stream_len >= EOCD_FIXED_SIZE {
        r.seek(SeekFrom::Start(stream_len - EOCD_FIXED_SIZE))?;
        let tail = read_bytes(r, EOCD_FIXED_SIZE as usize)?;
        if tail[0..4] == EOCD_SIG.to_le_bytes() && tail[20..22] == [0, 0] {
            let eocd = EndOfCentralDir::parse(&tail)?;
            return finish_eocd(r, stream_len - EOCD_FIXED_SIZE, eocd, Vec::new());
        }
    }

    let search_window = stream_len.min(MAX_EOCD_SEARCH);
    let search_start = stream_len - search_window;
    r.seek(SeekFrom::Start(search_start))?;
    let buf = read_bytes(r, search_window as usize)?;

    let sig = EOCD_SIG.to_le_bytes();
    let found = buf
        .windows(4)
        .rposition(|w| w == sig)
        .ok_or(Error::NotAZip)?;

    if found + EOCD_FIXED_SIZE as usize > buf.len() {
        return Err(Error::Corrupt("EOCD record runs past end of stream".into()));
    }
    let fixed = &buf[found..found + EOCD_FIXED_SIZE as usize];
    let eocd = EndOfCentralDir::parse(fixed)?;
    let comment = buf[found + EOCD_FIXED_SIZE as usize..].to_vec();
    if eocd.comment_len as usize != comment.len() {
        return Err(Error::NotAZip);
    }

    let eocd_position = search_start + found as u64;
    finish_eocd(r, eocd_position, eocd, comment)
}

/// `trailer_start` is the physical on-disk offset at which whatever
/// structure immediately follows the central directory begins — the
/// classic EOCD when there's no ZIP64, the ZIP64 EOCD record otherwise.
/// Comparing it against the (possibly stale, pre-concat) offset the
/// directory itself reports is how `concat` falls out: bytes prepended to
/// the archive after it was written shift every physical offset by a
/// constant, but never change what the directory *says* about itself.
fn finish_eocd<R: Read + Seek>(
    r: &mut R,
    eocd_position: u64,
    eocd: EndOfCentralDir,
    comment: Vec<u8>,
) -> Result<RawEocd> {
    let mut cd_entries_total = eocd.cd_entries_total as u64;
    let mut cd_size = eocd.cd_size as u64;
    let mut cd_offset = eocd.cd_offset as u64;
    let mut trailer_start = eocd_position;

    if let Some(locator_offset) = eocd_position.checked_sub(ZIP64_EOCD_LOCATOR_SIZE) {
        r.seek(SeekFrom::Start(locator_offset))?;
        let buf = read_bytes(r, ZIP64_EOCD_LOCATOR_SIZE as usize)?;
        if let Some(locator) = Zip64EocdLocator::parse(&buf)? {
            if locator.total_disks > 1 || locator.cd_start_disk != 0 {
                return Err(Error::Unsupported(
                    "multi-disk archives are not supported".into(),
                ));
            }
            // Seek to the ZIP64 EOCD by its physical position relative to
            // the locator, not by the offset the locator declares: bytes
            // prepended to the whole archive shift every physical position
            // by the same constant, but the locator's own stored offset
            // field still reflects the file as it was originally written.
            // The record always sits immediately before its own locator
            // (no "zip64 extensible data" is assumed), so deriving its
            // position this way keeps the scan correct under prepending.
            let zip64_eocd_physical_start = locator_offset
                .checked_sub(ZIP64_EOCD_FIXED_SIZE)
                .ok_or_else(|| Error::Corrupt("ZIP64 EOCD runs before start of stream".into()))?;
            r.seek(SeekFrom::Start(zip64_eocd_physical_start))?;
            let zip64 = Zip64EndOfCentralDir::parse(r)?;
            cd_entries_total = zip64.cd_entries_total;
            cd_size = zip64.cd_size;
            cd_offset = zip64.cd_offset;
            trailer_start = zip64_eocd_physical_start;
        }
    }

    Ok(RawEocd {
        position: trailer_start,
        cd_entries_total,
        cd_size,
        cd_offset,
        comment,
    })
}
