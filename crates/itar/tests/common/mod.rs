//! Helpers for writing test archives.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// One member of a generated archive.
#[derive(Clone, Copy, Debug)]
pub enum Member<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
    Symlink(&'a str, &'a str),
    Hardlink(&'a str, &'a str),
}

/// A tar archive holding `members`, in order.
pub fn tar_bytes(members: &[Member<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for member in members {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(1_700_000_000);
        match *member {
            Member::File(path, data) => {
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                header.set_entry_type(tar::EntryType::Regular);
                builder.append_data(&mut header, path, data).unwrap();
            }
            Member::Dir(path) => {
                header.set_mode(0o755);
                header.set_size(0);
                header.set_entry_type(tar::EntryType::Directory);
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
            Member::Symlink(path, target) => {
                header.set_mode(0o777);
                header.set_size(0);
                header.set_entry_type(tar::EntryType::Symlink);
                builder.append_link(&mut header, path, target).unwrap();
            }
            Member::Hardlink(path, target) => {
                header.set_mode(0o644);
                header.set_size(0);
                header.set_entry_type(tar::EntryType::Link);
                builder.append_link(&mut header, path, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

/// Write an archive of `members` to `path`.
pub fn write_tar(path: &Path, members: &[Member<'_>]) -> PathBuf {
    std::fs::write(path, tar_bytes(members)).unwrap();
    path.to_path_buf()
}

/// The three-shard set used by several tests.
pub fn three_shards() -> [Vec<Member<'static>>; 3] {
    [
        vec![
            Member::File("a.txt", b"hello"),
            Member::File("b.txt", b"world"),
            Member::File("dir/c.txt", b"!"),
        ],
        vec![
            Member::File("c.txt", b"foo"),
            Member::File("d.txt", b"bar"),
            Member::File("dir/e.txt", b"baz"),
        ],
        vec![
            Member::File("f.txt", b"foo_f"),
            Member::File("g.txt", b"bar_g"),
            Member::File("dir2/h.txt", b"baz_h"),
        ],
    ]
}

/// Contents of the regular files among `members`.
pub fn files<'a>(members: &[Member<'a>]) -> Vec<(&'a str, &'a [u8])> {
    members
        .iter()
        .filter_map(|m| match *m {
            Member::File(path, data) => Some((path, data)),
            _ => None,
        })
        .collect()
}
