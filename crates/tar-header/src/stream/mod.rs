//! Member-level decoding with offsets.
//!
//! A member may be preceded by metadata entries: GNU `L` (long name) and `K`
//! (long link), and PAX `x` records that can carry a path, link path, size,
//! ownership, times and a sparse map. The decoders here merge such a group
//! into one [`TarEntry`] that also records where the group starts and where
//! the content starts. PAX `g` entries are skipped.
//!
//! - [`TarStreamParser`] walks a whole archive through any [`std::io::Read`].
//! - [`decode_at`] decodes the single group at a known offset through
//!   [`ReadAt`](crate::ReadAt), leaving any shared cursor alone.
//!
//! Sizes read from the archive are checked against [`Limits`] before
//! anything is allocated for them.
//!
//! # Example
//!
//! ```
//! use tar_header::stream::{decode_at, Limits, TarStreamParser};
//!
//! # let archive: Vec<u8> = {
//! #     let mut b = tar::Builder::new(Vec::new());
//! #     let mut h = tar::Header::new_ustar();
//! #     h.set_size(5);
//! #     h.set_mode(0o644);
//! #     b.append_data(&mut h, "hello.txt", &b"hello"[..]).unwrap();
//! #     b.into_inner().unwrap()
//! # };
//! let mut parser = TarStreamParser::new(archive.as_slice(), Limits::default());
//! let entry = parser.next_entry().unwrap().unwrap();
//! assert_eq!(entry.header_offset, 0);
//! assert_eq!(entry.data_offset, 512);
//!
//! let again = decode_at(archive.as_slice(), entry.header_offset, &Limits::default()).unwrap();
//! assert_eq!(again.path, entry.path);
//! ```

mod decode;
mod entry;
mod error;
mod limits;
mod parser;
mod source;

pub use decode::decode_at;
pub use entry::TarEntry;
pub use error::{Result, StreamError};
pub use limits::Limits;
pub use parser::TarStreamParser;
