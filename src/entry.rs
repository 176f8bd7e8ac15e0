//! The `Entry` record: one archive member, and the name-encoding rules
//! shared by the scanner and the writer.

use crate::codec::{DosTime, FLAG_UTF8};
use crate::error::{Error, Result};

/// Compression method. Other values may be read but not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
    Other(u16),
}

impl Method {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => Method::Stored,
            8 => Method::Deflated,
            other => Method::Other(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Method::Stored => 0,
            Method::Deflated => 8,
            Method::Other(v) => v,
        }
    }
}

/// (year, month, day, hour, minute, second), with year >= 1980 and second
/// rounded down to an even number (MS-DOS granularity is two seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modified {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl Modified {
    pub fn new(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Result<Self> {
        if year < 1980 {
            return Err(Error::InvalidArgument(format!(
                "modification year {} is before 1980",
                year
            )));
        }
        Ok(Modified {
            year,
            month,
            day,
            hour,
            minute,
            second: second - (second % 2),
        })
    }

    /// Derive a `Modified` stamp from a filesystem mtime, mirroring the
    /// original `time.localtime(st.st_mtime)[:6]`. Dates before 1980 (the
    /// DOS epoch) are clamped up rather than rejected, since the caller
    /// didn't choose this timestamp directly — unlike [`Modified::new`],
    /// which rejects an explicit pre-1980 year outright.
    pub fn from_system_time(t: std::time::SystemTime) -> Result<Self> {
        use chrono::{Datelike, Timelike};
        let utc: chrono::DateTime<chrono::Utc> = t.into();
        let year = utc.year();
        if year < 1980 {
            return Ok(Modified::epoch());
        }
        let second = utc.second() as u16;
        Ok(Modified {
            year: year as u16,
            month: utc.month() as u16,
            day: utc.day() as u16,
            hour: utc.hour() as u16,
            minute: utc.minute() as u16,
            second: second - (second % 2),
        })
    }

    pub fn epoch() -> Self {
        Modified {
            year: 1980,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    pub(crate) fn from_dos(dos: DosTime) -> Self {
        let (year, month, day, hour, minute, second) = dos.to_parts();
        Modified {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub(crate) fn to_dos(self) -> DosTime {
        DosTime::from_parts(self.year, self.month, self.day, self.hour, self.minute, self.second)
    }
}

/// One archive member, read-only once produced by the scanner or finalized
/// by the writer.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub raw_name: Vec<u8>,
    pub modified: Modified,
    pub method: Method,
    pub flags: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub header_offset: u64,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
    pub create_system: u8,
    pub create_version: u16,
    pub extract_version: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub disk_start: u16,
    pub reserved: u16,
}

impl Entry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & crate::codec::FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & crate::codec::FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8_name(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Decode a raw stored name per spec: CP437 unless flag bit 11 is set, in
/// which case UTF-8. Names are trimmed at the first NUL byte, and any OS
/// path separator in the source bytes never needs translating here because
/// bytes are stored archive-side with `/` already.
pub fn decode_name(raw: &[u8], utf8: bool) -> String {
    let trimmed = match raw.iter().position(|&b| b == 0) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    if utf8 {
        String::from_utf8_lossy(trimmed).into_owned()
    } else {
        decode_cp437(trimmed)
    }
}

/// Encode a name for writing: ASCII when possible (no flag bit), else UTF-8
/// with flag bit 11 set.
pub fn encode_name(name: &str) -> (Vec<u8>, bool) {
    if name.is_ascii() {
        (name.as_bytes().to_vec(), false)
    } else {
        (name.as_bytes().to_vec(), true)
    }
}

/// Normalize a caller-supplied archive path: strip a Windows drive prefix,
/// strip leading separators, and replace the OS-native separator with `/`.
pub fn normalize_archive_name(name: &str, is_dir: bool) -> String {
    let without_drive = match name.find(':') {
        Some(idx) if idx == 1 => &name[idx + 1..],
        _ => name,
    };
    let forward = without_drive.replace('\\', "/");
    let stripped = forward.trim_start_matches('/');
    let mut normalized = stripped.to_string();
    if is_dir && !normalized.ends_with('/') && !normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// CP437 (IBM PC) decode table for byte values 0x80..=0xFF; 0x00..=0x7F map
/// to themselves (CP437 is ASCII-compatible in that range).
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', 'É', 'æ', 'Æ',
    'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', 'á', 'í', 'ó', 'ú', 'ñ', 'Ñ',
    'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕',
    '╣', '║', '╗', '╝', '╜', '╛', '┐', '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦',
    '╠', '═', '╬', '╧', '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐',
    '▀', 'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', '≡', '±',
    '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}
