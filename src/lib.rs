//! # pkzip-core
//!
//! A streaming codec for the PKZIP container format: directory scanning
//! (including the ZIP64 large-file extension), traditional PKZIP
//! decryption, and byte-compatible archive writing.
//!
//! The crate is synchronous and single-threaded: every operation acts on
//! an [`Archive`] whose underlying stream must be seekable, and callers
//! serialize their own access to it. See [`Archive`] for the read/write/
//! append entry points.
//!
//! ## Reading
//!
//! ```no_run
//! use pkzip_core::Archive;
//! use std::io::Read;
//!
//! let mut archive = Archive::open("archive.zip")?;
//! for entry in archive.entries()? {
//!     println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//! }
//!
//! let mut out = Vec::new();
//! archive.open_entry("file.txt")?.read_to_end(&mut out)?;
//! # Ok::<(), pkzip_core::Error>(())
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use pkzip_core::{Archive, Method, Modified};
//!
//! let mut archive = Archive::create("output.zip", false)?;
//! archive.write_bytes("hello.txt", b"Hello, world!", Method::Deflated, Modified::epoch())?;
//! archive.close()?;
//! # Ok::<(), pkzip_core::Error>(())
//! ```

pub mod archive;
pub mod codec;
pub mod decrypt;
pub mod entry;
pub mod error;
pub mod extra;
pub mod reader;
pub mod scanner;
pub mod writer;

pub use archive::Archive;
pub use entry::{Entry, Method, Modified};
pub use error::{Error, Result};
pub use reader::{EntryReader, Lines, Reader};
pub use writer::Writer;
