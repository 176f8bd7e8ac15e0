use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use tempfile::tempdir;

// Crafts a minimal ZIP64 archive on disk by hand: a local file header and
// payload, a central directory record carrying sentinel 32-bit sizes with
// the real values promoted from a ZIP64 extra block, a ZIP64 EOCD record
// and locator, and a classic EOCD with sentinel placeholders. Then confirms
// pkzip-core reads it back with the sizes promoted.
#[test]
fn read_zip64_crafted() {
    use pkzip_core::Archive;

    let dir = tempdir().unwrap();
    let path = dir.path().join("zip64_test.zip");
    let mut f = File::create(&path).unwrap();

    let data = b"hello";
    let crc = crc32fast::hash(data);

    let local_header_offset = f.stream_position().unwrap();
    f.write_all(&[0x50, 0x4b, 0x03, 0x04]).unwrap();
    f.write_all(&[20, 0]).unwrap(); // version needed
    f.write_all(&[0, 0]).unwrap(); // flags
    f.write_all(&[0, 0]).unwrap(); // method: stored
    f.write_all(&[0, 0, 0, 0]).unwrap(); // mod time/date
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
    f.write_all(&(5u16).to_le_bytes()).unwrap(); // name len
    f.write_all(&0u16.to_le_bytes()).unwrap(); // extra len
    f.write_all(b"a.txt").unwrap();
    f.write_all(data).unwrap();

    let cd_start = f.stream_position().unwrap();
    f.write_all(&[0x50, 0x4b, 0x01, 0x02]).unwrap();
    f.write_all(&[20, 0]).unwrap(); // version made by
    f.write_all(&[20, 0]).unwrap(); // version needed
    f.write_all(&[0, 0]).unwrap(); // flags
    f.write_all(&[0, 0]).unwrap(); // method
    f.write_all(&[0, 0, 0, 0]).unwrap(); // mod time/date
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // compressed size sentinel
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // uncompressed size sentinel
    f.write_all(&(5u16).to_le_bytes()).unwrap(); // name len
    f.write_all(&(28u16).to_le_bytes()).unwrap(); // extra len: tag(2)+len(2)+3*u64(24)
    f.write_all(&0u16.to_le_bytes()).unwrap(); // comment len
    f.write_all(&0u16.to_le_bytes()).unwrap(); // disk start
    f.write_all(&0u16.to_le_bytes()).unwrap(); // internal attrs
    f.write_all(&0u32.to_le_bytes()).unwrap(); // external attrs
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // header offset sentinel
    f.write_all(b"a.txt").unwrap();
    f.write_all(&0x0001u16.to_le_bytes()).unwrap(); // ZIP64 extra tag
    f.write_all(&(24u16).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap(); // uncompressed
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap(); // compressed
    f.write_all(&local_header_offset.to_le_bytes()).unwrap(); // header offset

    let cd_end = f.stream_position().unwrap();
    let cd_size = cd_end - cd_start;

    let zip64_eocd_start = f.stream_position().unwrap();
    f.write_all(&[0x50, 0x4b, 0x06, 0x06]).unwrap();
    f.write_all(&(44u64).to_le_bytes()).unwrap();
    f.write_all(&[20, 0]).unwrap();
    f.write_all(&[20, 0]).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&(1u64).to_le_bytes()).unwrap();
    f.write_all(&(1u64).to_le_bytes()).unwrap();
    f.write_all(&cd_size.to_le_bytes()).unwrap();
    f.write_all(&cd_start.to_le_bytes()).unwrap();

    f.write_all(&[0x50, 0x4b, 0x06, 0x07]).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&zip64_eocd_start.to_le_bytes()).unwrap();
    f.write_all(&1u32.to_le_bytes()).unwrap(); // total disks

    f.write_all(&[0x50, 0x4b, 0x05, 0x06]).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFu16.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFu16.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap(); // comment len

    f.flush().unwrap();

    let mut archive = Archive::open(&path).expect("should open crafted zip64");
    let entries = archive.entries().unwrap().to_vec();
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.name, "a.txt");
    assert_eq!(e.uncompressed_size, data.len() as u64);
    assert_eq!(e.compressed_size, data.len() as u64);
    assert_eq!(e.header_offset, local_header_offset);

    let mut out = Vec::new();
    archive.open_entry("a.txt").unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

/// Same crafted ZIP64 archive as `read_zip64_crafted`, but built in memory
/// with arbitrary bytes prepended ahead of it. The ZIP64 EOCD locator's own
/// `zip64_eocd_offset` field is written as if the archive started at byte 0,
/// so a reader that trusts that field directly would seek to the wrong
/// place; finding the record by its physical position relative to the
/// locator is what keeps this correct.
#[test]
fn read_zip64_crafted_with_prepended_bytes() {
    use pkzip_core::Archive;

    let prefix = b"garbage bytes prepended ahead of the real archive".to_vec();
    let mut buf = prefix.clone();
    let mut f = Cursor::new(&mut buf);
    f.set_position(prefix.len() as u64);

    // Build the archive as if it started at offset 0, matching what a
    // writer would have produced before anything was prepended.
    let mut archive_only = Vec::new();
    {
        let mut f = Cursor::new(&mut archive_only);

        let data = b"hello";
        let crc = crc32fast::hash(data);

        let local_header_offset = f.stream_position().unwrap();
        f.write_all(&[0x50, 0x4b, 0x03, 0x04]).unwrap();
        f.write_all(&[20, 0]).unwrap();
        f.write_all(&[0, 0]).unwrap();
        f.write_all(&[0, 0]).unwrap();
        f.write_all(&[0, 0, 0, 0]).unwrap();
        f.write_all(&crc.to_le_bytes()).unwrap();
        f.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&(5u16).to_le_bytes()).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
        f.write_all(b"a.txt").unwrap();
        f.write_all(data).unwrap();

        let cd_start = f.stream_position().unwrap();
        f.write_all(&[0x50, 0x4b, 0x01, 0x02]).unwrap();
        f.write_all(&[20, 0]).unwrap();
        f.write_all(&[20, 0]).unwrap();
        f.write_all(&[0, 0]).unwrap();
        f.write_all(&[0, 0]).unwrap();
        f.write_all(&[0, 0, 0, 0]).unwrap();
        f.write_all(&crc.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
        f.write_all(&(5u16).to_le_bytes()).unwrap();
        f.write_all(&(28u16).to_le_bytes()).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
        f.write_all(b"a.txt").unwrap();
        f.write_all(&0x0001u16.to_le_bytes()).unwrap();
        f.write_all(&(24u16).to_le_bytes()).unwrap();
        f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
        f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
        f.write_all(&local_header_offset.to_le_bytes()).unwrap();

        let cd_end = f.stream_position().unwrap();
        let cd_size = cd_end - cd_start;

        let zip64_eocd_start = f.stream_position().unwrap();
        f.write_all(&[0x50, 0x4b, 0x06, 0x06]).unwrap();
        f.write_all(&(44u64).to_le_bytes()).unwrap();
        f.write_all(&[20, 0]).unwrap();
        f.write_all(&[20, 0]).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&(1u64).to_le_bytes()).unwrap();
        f.write_all(&(1u64).to_le_bytes()).unwrap();
        f.write_all(&cd_size.to_le_bytes()).unwrap();
        f.write_all(&cd_start.to_le_bytes()).unwrap();

        f.write_all(&[0x50, 0x4b, 0x06, 0x07]).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        // Written as though the archive started at its own byte 0 — this is
        // the stale value a naive reader would wrongly trust once bytes are
        // prepended ahead of the whole file.
        f.write_all(&zip64_eocd_start.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();

        f.write_all(&[0x50, 0x4b, 0x05, 0x06]).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFu16.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFu16.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
        f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
        f.write_all(&0u16.to_le_bytes()).unwrap();
    }

    let prefix_len = prefix.len() as u64;
    f.write_all(&archive_only).unwrap();
    drop(f);

    let mut archive = Archive::open_in(Cursor::new(buf)).expect("should open prepended zip64");
    let entries = archive.entries().unwrap().to_vec();
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.name, "a.txt");
    assert_eq!(e.uncompressed_size, 5);
    assert_eq!(e.compressed_size, 5);
    assert_eq!(e.header_offset, prefix_len);

    let mut out = Vec::new();
    archive.open_entry("a.txt").unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, b"hello");
}
