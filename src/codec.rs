//! Fixed little-endian record layouts for the PKZIP container format.
//!
//! Every struct here is bit-exact with the wire layout described by the
//! format specification (APPNOTE.TXT). Parsing failures are always
//! structural: a short buffer or a signature mismatch.

use std::io::{self, Read, Write};

pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
pub const CENTRAL_DIR_SIG: u32 = 0x0201_4b50;
pub const EOCD_SIG: u32 = 0x0605_4b50;
pub const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
pub const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0607_4b50;
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

pub const EOCD_FIXED_SIZE: u64 = 22;
pub const ZIP64_EOCD_LOCATOR_SIZE: u64 = 20;
pub const ZIP64_EOCD_FIXED_SIZE: u64 = 56;
pub const CENTRAL_DIR_FIXED_SIZE: u64 = 46;
pub const LOCAL_HEADER_FIXED_SIZE: u64 = 30;

/// Flag bit: payload is encrypted with traditional PKZIP encryption.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// Flag bit: sizes/CRC are stored in a data descriptor after the payload.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Flag bit: the name/comment are UTF-8 rather than CP437.
pub const FLAG_UTF8: u16 = 1 << 11;

fn io_err(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, msg.into())
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn read_bytes<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// MS-DOS (date, time) pair, as packed in local/central headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosTime {
    pub date: u16,
    pub time: u16,
}

impl DosTime {
    /// Pack a (year, month, day, hour, minute, second) tuple. `year` must be
    /// >= 1980; callers validate before reaching here.
    pub fn from_parts(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Self {
        let date = ((year - 1980) << 9) | (month << 5) | day;
        let time = (hour << 11) | (minute << 5) | (second / 2);
        DosTime { date, time }
    }

    pub fn to_parts(self) -> (u16, u16, u16, u16, u16, u16) {
        let year = (self.date >> 9) + 1980;
        let month = (self.date >> 5) & 0xF;
        let day = self.date & 0x1F;
        let hour = self.time >> 11;
        let minute = (self.time >> 5) & 0x3F;
        let second = (self.time & 0x1F) * 2;
        (year, month, day, hour, minute, second)
    }
}

/// Local file header, fixed 30-byte portion.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub extract_version: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: DosTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

impl LocalFileHeader {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let sig = read_u32(r)?;
        if sig != LOCAL_FILE_HEADER_SIG {
            return Err(io_err(format!(
                "bad local file header signature: 0x{:08x}",
                sig
            )));
        }
        let extract_version = read_u16(r)?;
        let flags = read_u16(r)?;
        let method = read_u16(r)?;
        let time = read_u16(r)?;
        let date = read_u16(r)?;
        let crc32 = read_u32(r)?;
        let compressed_size = read_u32(r)?;
        let uncompressed_size = read_u32(r)?;
        let name_len = read_u16(r)?;
        let extra_len = read_u16(r)?;
        Ok(LocalFileHeader {
            extract_version,
            flags,
            method,
            mod_time: DosTime { date, time },
            crc32,
            compressed_size,
            uncompressed_size,
            name_len,
            extra_len,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&LOCAL_FILE_HEADER_SIG.to_le_bytes())?;
        w.write_all(&self.extract_version.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&self.method.to_le_bytes())?;
        w.write_all(&self.mod_time.time.to_le_bytes())?;
        w.write_all(&self.mod_time.date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&self.name_len.to_le_bytes())?;
        w.write_all(&self.extra_len.to_le_bytes())?;
        Ok(())
    }
}

/// Central directory record, fixed 46-byte portion.
#[derive(Debug, Clone)]
pub struct CentralDirHeader {
    pub create_version: u16,
    pub extract_version: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: DosTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
    pub comment_len: u16,
    pub disk_start: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub local_header_offset: u32,
}

impl CentralDirHeader {
    /// Read the fixed portion. Returns `None` (rather than erroring) when
    /// the signature doesn't match, so callers can detect the end of the
    /// central directory without a dedicated sentinel.
    pub fn read<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let mut sig_buf = [0u8; 4];
        r.read_exact(&mut sig_buf)?;
        let sig = u32::from_le_bytes(sig_buf);
        if sig != CENTRAL_DIR_SIG {
            return Ok(None);
        }
        let create_version = read_u16(r)?;
        let extract_version = read_u16(r)?;
        let flags = read_u16(r)?;
        let method = read_u16(r)?;
        let time = read_u16(r)?;
        let date = read_u16(r)?;
        let crc32 = read_u32(r)?;
        let compressed_size = read_u32(r)?;
        let uncompressed_size = read_u32(r)?;
        let name_len = read_u16(r)?;
        let extra_len = read_u16(r)?;
        let comment_len = read_u16(r)?;
        let disk_start = read_u16(r)?;
        let internal_attr = read_u16(r)?;
        let external_attr = read_u32(r)?;
        let local_header_offset = read_u32(r)?;
        Ok(Some(CentralDirHeader {
            create_version,
            extract_version,
            flags,
            method,
            mod_time: DosTime { date, time },
            crc32,
            compressed_size,
            uncompressed_size,
            name_len,
            extra_len,
            comment_len,
            disk_start,
            internal_attr,
            external_attr,
            local_header_offset,
        }))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&CENTRAL_DIR_SIG.to_le_bytes())?;
        w.write_all(&self.create_version.to_le_bytes())?;
        w.write_all(&self.extract_version.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&self.method.to_le_bytes())?;
        w.write_all(&self.mod_time.time.to_le_bytes())?;
        w.write_all(&self.mod_time.date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&self.name_len.to_le_bytes())?;
        w.write_all(&self.extra_len.to_le_bytes())?;
        w.write_all(&self.comment_len.to_le_bytes())?;
        w.write_all(&self.disk_start.to_le_bytes())?;
        w.write_all(&self.internal_attr.to_le_bytes())?;
        w.write_all(&self.external_attr.to_le_bytes())?;
        w.write_all(&self.local_header_offset.to_le_bytes())?;
        Ok(())
    }
}

/// Classic end-of-central-directory record, fixed 22-byte portion.
#[derive(Debug, Clone)]
pub struct EndOfCentralDir {
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub cd_entries_this_disk: u16,
    pub cd_entries_total: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDir {
    pub fn parse(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < EOCD_FIXED_SIZE as usize {
            return Err(io_err("short EOCD buffer"));
        }
        let mut r = buf;
        let sig = read_u32(&mut r)?;
        if sig != EOCD_SIG {
            return Err(io_err("bad EOCD signature"));
        }
        Ok(EndOfCentralDir {
            disk_number: read_u16(&mut r)?,
            cd_start_disk: read_u16(&mut r)?,
            cd_entries_this_disk: read_u16(&mut r)?,
            cd_entries_total: read_u16(&mut r)?,
            cd_size: read_u32(&mut r)?,
            cd_offset: read_u32(&mut r)?,
            comment_len: read_u16(&mut r)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&EOCD_SIG.to_le_bytes())?;
        w.write_all(&self.disk_number.to_le_bytes())?;
        w.write_all(&self.cd_start_disk.to_le_bytes())?;
        w.write_all(&self.cd_entries_this_disk.to_le_bytes())?;
        w.write_all(&self.cd_entries_total.to_le_bytes())?;
        w.write_all(&self.cd_size.to_le_bytes())?;
        w.write_all(&self.cd_offset.to_le_bytes())?;
        w.write_all(&self.comment_len.to_le_bytes())?;
        Ok(())
    }
}

/// ZIP64 end-of-central-directory locator, fixed 20-byte record.
#[derive(Debug, Clone)]
pub struct Zip64EocdLocator {
    pub cd_start_disk: u32,
    pub zip64_eocd_offset: u64,
    pub total_disks: u32,
}

impl Zip64EocdLocator {
    pub fn parse(buf: &[u8]) -> io::Result<Option<Self>> {
        if buf.len() < ZIP64_EOCD_LOCATOR_SIZE as usize {
            return Ok(None);
        }
        let mut r = buf;
        let sig = read_u32(&mut r)?;
        if sig != ZIP64_EOCD_LOCATOR_SIG {
            return Ok(None);
        }
        Ok(Some(Zip64EocdLocator {
            cd_start_disk: read_u32(&mut r)?,
            zip64_eocd_offset: read_u64(&mut r)?,
            total_disks: read_u32(&mut r)?,
        }))
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&ZIP64_EOCD_LOCATOR_SIG.to_le_bytes())?;
        w.write_all(&self.cd_start_disk.to_le_bytes())?;
        w.write_all(&self.zip64_eocd_offset.to_le_bytes())?;
        w.write_all(&self.total_disks.to_le_bytes())?;
        Ok(())
    }
}

/// ZIP64 end-of-central-directory record, fixed 56-byte portion.
#[derive(Debug, Clone)]
pub struct Zip64EndOfCentralDir {
    pub create_version: u16,
    pub extract_version: u16,
    pub disk_number: u32,
    pub cd_start_disk: u32,
    pub cd_entries_this_disk: u64,
    pub cd_entries_total: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EndOfCentralDir {
    pub fn parse<R: Read>(r: &mut R) -> io::Result<Self> {
        let sig = read_u32(r)?;
        if sig != ZIP64_EOCD_SIG {
            return Err(io_err("bad ZIP64 EOCD signature"));
        }
        let _record_size = read_u64(r)?;
        Ok(Zip64EndOfCentralDir {
            create_version: read_u16(r)?,
            extract_version: read_u16(r)?,
            disk_number: read_u32(r)?,
            cd_start_disk: read_u32(r)?,
            cd_entries_this_disk: read_u64(r)?,
            cd_entries_total: read_u64(r)?,
            cd_size: read_u64(r)?,
            cd_offset: read_u64(r)?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&ZIP64_EOCD_SIG.to_le_bytes())?;
        // size of remaining record: fixed fields below sum to 44 bytes.
        w.write_all(&44u64.to_le_bytes())?;
        w.write_all(&self.create_version.to_le_bytes())?;
        w.write_all(&self.extract_version.to_le_bytes())?;
        w.write_all(&self.disk_number.to_le_bytes())?;
        w.write_all(&self.cd_start_disk.to_le_bytes())?;
        w.write_all(&self.cd_entries_this_disk.to_le_bytes())?;
        w.write_all(&self.cd_entries_total.to_le_bytes())?;
        w.write_all(&self.cd_size.to_le_bytes())?;
        w.write_all(&self.cd_offset.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn dos_time_round_trips() {
        let dt = DosTime::from_parts(2023, 6, 15, 13, 45, 30);
        assert_eq!(dt.to_parts(), (2023, 6, 15, 13, 45, 30));
    }

    #[test]
    fn local_header_round_trips() {
        let hdr = LocalFileHeader {
            extract_version: 20,
            flags: 0,
            method: 8,
            mod_time: DosTime::from_parts(2020, 1, 1, 0, 0, 0),
            crc32: 0xdead_beef,
            compressed_size: 10,
            uncompressed_size: 20,
            name_len: 5,
            extra_len: 0,
        };
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let parsed = LocalFileHeader::read(&mut cursor).unwrap();
        assert_eq!(parsed.crc32, 0xdead_beef);
        assert_eq!(parsed.compressed_size, 10);
        assert_eq!(parsed.name_len, 5);
    }

    #[test]
    fn central_dir_header_rejects_bad_signature() {
        let mut cursor = Cursor::new(vec![0u8; 46]);
        let parsed = CentralDirHeader::read(&mut cursor).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn eocd_round_trips() {
        let eocd = EndOfCentralDir {
            disk_number: 0,
            cd_start_disk: 0,
            cd_entries_this_disk: 3,
            cd_entries_total: 3,
            cd_size: 123,
            cd_offset: 456,
            comment_len: 0,
        };
        let mut buf = Vec::new();
        eocd.write(&mut buf).unwrap();
        assert_eq!(buf.len(), EOCD_FIXED_SIZE as usize);
        let parsed = EndOfCentralDir::parse(&buf).unwrap();
        assert_eq!(parsed.cd_entries_total, 3);
        assert_eq!(parsed.cd_offset, 456);
    }
}
