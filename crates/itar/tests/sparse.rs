//! Sparse members: PAX sparse files are expanded, old GNU sparse files are
//! refused.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use itar::{Error, IndexedTar, OpenOptions, ShardDescriptor, ShardSet, ShardSource, SparseRange};

fn append_file(builder: &mut tar::Builder<Vec<u8>>, path: &str, content: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_mode(0o644);
    header.set_size(content.len() as u64);
    header.set_entry_type(tar::EntryType::Regular);
    builder.append_data(&mut header, path, content).unwrap();
}

/// `disk.img`: 12 bytes, "AAA" at 2 and "BB" at 8, in PAX 1.0 form.
fn sparse_archive() -> Vec<u8> {
    let mut body = b"2\n2\n3\n8\n2\n".to_vec();
    body.resize(512, 0);
    body.extend_from_slice(b"AAABB");

    let mut builder = tar::Builder::new(Vec::new());
    append_file(&mut builder, "before.txt", b"before");
    builder
        .append_pax_extensions([
            ("GNU.sparse.major", b"1".as_slice()),
            ("GNU.sparse.minor", b"0".as_slice()),
            ("GNU.sparse.name", b"disk.img".as_slice()),
            ("GNU.sparse.realsize", b"12".as_slice()),
        ])
        .unwrap();
    append_file(&mut builder, "GNUSparseFile.0/disk.img", &body);
    append_file(&mut builder, "after.txt", b"after");
    builder.into_inner().unwrap()
}

fn open_single(bytes: Vec<u8>) -> IndexedTar {
    let sources = vec![Arc::new(bytes) as Arc<dyn ShardSource>];
    let index = itar::build(ShardDescriptor::Single, &sources).unwrap();
    IndexedTar::from_sources(index, sources, &OpenOptions::new()).unwrap()
}

#[test]
fn test_sparse_member_reads_expanded() {
    let archive = open_single(sparse_archive());

    let entry = archive.entry("disk.img").unwrap();
    assert_eq!(
        entry.record.sparse.as_deref(),
        Some(
            [
                SparseRange { offset: 2, length: 3 },
                SparseRange { offset: 8, length: 2 },
            ]
            .as_slice()
        )
    );
    assert_eq!(archive.read("disk.img").unwrap(), b"\0\0AAA\0\0\0BB\0\0");
    assert_eq!(archive.read("after.txt").unwrap(), b"after");
    assert_eq!(archive.read("before.txt").unwrap(), b"before");

    let mut reader = archive.open_member("disk.img").unwrap();
    assert_eq!(reader.size(), 12);
    reader.seek(SeekFrom::Start(7)).unwrap();
    let mut buf = [0xff; 3];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"\0BB");

    archive.verify("disk.img").unwrap();
    let info = archive.info("disk.img").unwrap();
    assert!(info.is_sparse());
    assert_eq!(info.size, 12);
}

#[test]
fn test_sparse_survives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sp.tar"), sparse_archive()).unwrap();
    let index_path = dir.path().join("sp.itar");
    let built = itar::create(&index_path, &ShardSet::detect(&index_path).unwrap()).unwrap();
    assert_eq!(itar::load(&index_path).unwrap(), built);

    let archive = OpenOptions::new()
        .thread_safe(true)
        .open(&index_path)
        .unwrap();
    assert_eq!(archive.read("disk.img").unwrap(), b"\0\0AAA\0\0\0BB\0\0");
}

#[test]
fn test_old_gnu_sparse_is_unsupported() {
    let mut builder = tar::Builder::new(Vec::new());
    append_file(&mut builder, "ok.txt", b"fine");
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::GNUSparse);
    header.set_size(4);
    builder
        .append_data(&mut header, "holes.img", b"data".as_slice())
        .unwrap();
    let bytes = builder.into_inner().unwrap();

    let sources = vec![Arc::new(bytes) as Arc<dyn ShardSource>];
    let err = itar::build(ShardDescriptor::Single, &sources).unwrap_err();
    match err {
        Error::UnsupportedFormat { member, offset, .. } => {
            assert_eq!(member, "holes.img");
            assert_eq!(offset, 1024);
        }
        other => panic!("unexpected error: {other}"),
    }
}
