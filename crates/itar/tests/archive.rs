//! Building, persisting and reading single and sharded archives.

mod common;

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use itar::{
    Error, IndexedTar, OpenOptions, Payload, ShardDescriptor, ShardSet, ShardSource, ShardedIndex,
};

use common::{files, tar_bytes, three_shards, write_tar, Member};

fn write_three(dir: &std::path::Path) -> Vec<PathBuf> {
    three_shards()
        .iter()
        .enumerate()
        .map(|(i, members)| write_tar(&dir.join(format!("set-{i}.tar")), members))
        .collect()
}

#[test]
fn test_single_archive_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let members = [
        Member::Dir("dir/"),
        Member::File("dir/one.txt", b"one"),
        Member::File("big.bin", &[0x5a; 70_000]),
        Member::File("empty", b""),
    ];
    write_tar(&dir.path().join("single.tar"), &members);

    let index_path = dir.path().join("single.itar");
    let set = ShardSet::detect(&index_path).unwrap();
    assert_eq!(set, ShardSet::Single(dir.path().join("single.tar")));
    let index = itar::create(&index_path, &set).unwrap();
    assert_eq!(index.shards(), &ShardDescriptor::Single);

    let archive = itar::open(&index_path).unwrap();
    assert_eq!(archive.len().unwrap(), 4);
    // directory names lose their trailing slash
    assert!(archive.contains("dir").unwrap());
    assert!(!archive.contains("dir/").unwrap());
    assert_eq!(archive.entry("dir").unwrap().record.payload, Payload::Size(0));
    archive.verify("dir").unwrap();
    for (name, data) in files(&members) {
        assert_eq!(archive.read(name).unwrap(), data, "{name}");
        assert_eq!(archive.entry(name).unwrap().shard_id, None);
    }

    let mut reader = archive.open_member("big.bin").unwrap();
    assert!(reader.is_buffered());
    assert_eq!(reader.size(), 70_000);
    reader.seek(SeekFrom::End(-3)).unwrap();
    let mut tail = Vec::new();
    reader.read_to_end(&mut tail).unwrap();
    assert_eq!(tail, vec![0x5a; 3]);
}

#[test]
fn test_sharded_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_three(dir.path());
    let index_path = dir.path().join("set.itar");

    let set = ShardSet::detect(&index_path).unwrap();
    assert_eq!(set, ShardSet::Sharded(paths.clone()));
    let built = itar::create(&index_path, &set).unwrap();
    assert_eq!(
        built.shards(),
        &ShardDescriptor::Sharded(vec!["set-0.tar".into(), "set-1.tar".into(), "set-2.tar".into()])
    );

    let loaded = itar::load(&index_path).unwrap();
    assert_eq!(loaded, built);

    let archive = itar::open(&index_path).unwrap();
    let shards = three_shards();
    let expected_names = shards
        .iter()
        .flat_map(|members| files(members).into_iter().map(|(name, _)| name))
        .collect::<Vec<_>>();
    assert_eq!(archive.names().unwrap().collect::<Vec<_>>(), expected_names);

    for (i, members) in shards.iter().enumerate() {
        for (name, data) in files(members) {
            assert_eq!(archive.read(name).unwrap(), data);
            assert_eq!(archive.entry(name).unwrap().shard_id, Some(i as u32));

            let info = archive.info(name).unwrap();
            assert_eq!(info.path_lossy(), name);
            assert_eq!(info.size, data.len() as u64);
        }
    }
    assert!(archive.verify_all().unwrap().is_empty());
}

#[test]
fn test_offsets_match_layout() {
    let shards = [
        tar_bytes(&[Member::File("x.txt", b"some"), Member::File("y.txt", b"files")]),
        tar_bytes(&[Member::File("a.txt", b"foo"), Member::File("b.txt", b"bar")]),
    ];
    let sources = shards
        .into_iter()
        .map(|bytes| Arc::new(bytes) as Arc<dyn ShardSource>)
        .collect::<Vec<_>>();
    let index = itar::build(
        ShardDescriptor::Sharded(vec!["s-0.tar".into(), "s-1.tar".into()]),
        &sources,
    )
    .unwrap();

    let summary = index
        .iter()
        .map(|(name, e)| {
            (
                name.to_string(),
                e.shard_id,
                e.record.header_offset,
                e.record.data_offset,
                e.record.payload.clone(),
            )
        })
        .collect::<Vec<_>>();
    similar_asserts::assert_eq!(
        summary,
        vec![
            ("x.txt".to_string(), Some(0), 0, 512, Payload::Size(4)),
            ("y.txt".to_string(), Some(0), 1024, 1536, Payload::Size(5)),
            ("a.txt".to_string(), Some(1), 0, 512, Payload::Size(3)),
            ("b.txt".to_string(), Some(1), 1024, 1536, Payload::Size(3)),
        ]
    );

    let archive = IndexedTar::from_sources(index, sources, &OpenOptions::new()).unwrap();
    let reader = archive.open_member("y.txt").unwrap();
    assert!(!reader.is_buffered());
}

#[test]
fn test_links_across_shards() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_tar(
        &dir.path().join("links-0.tar"),
        &[
            Member::File("file1.txt", b"data1"),
            Member::File("bar/file2.txt", b"data2"),
        ],
    );
    let second = write_tar(
        &dir.path().join("links-1.tar"),
        &[
            Member::Symlink("link1.txt", "file1.txt"),
            Member::Hardlink("hard1.txt", "file1.txt"),
            Member::Symlink("crosslink.txt", "../file1.txt"),
            Member::Symlink("foo/link2.txt", "../bar/file2.txt"),
            Member::Symlink("chain.txt", "link1.txt"),
        ],
    );
    let index_path = dir.path().join("links.itar");
    let set = ShardSet::from_paths(&index_path, vec![first, second]).unwrap();
    let index = itar::create(&index_path, &set).unwrap();

    let payload = |name: &str| index.get(name).unwrap().record.payload.clone();
    assert_eq!(payload("link1.txt"), Payload::Target("file1.txt".into()));
    assert_eq!(payload("hard1.txt"), Payload::Target("file1.txt".into()));
    assert_eq!(payload("crosslink.txt"), Payload::Target("../file1.txt".into()));
    assert_eq!(payload("foo/link2.txt"), Payload::Target("foo/../bar/file2.txt".into()));

    let archive = itar::open(&index_path).unwrap();
    assert_eq!(archive.read("link1.txt").unwrap(), b"data1");
    assert_eq!(archive.read("hard1.txt").unwrap(), b"data1");
    assert_eq!(archive.read("chain.txt").unwrap(), b"data1");

    let err = archive.open_member("crosslink.txt").unwrap_err();
    assert!(matches!(err, Error::NotFound(ref name) if name == "../file1.txt"), "{err}");
    // not normalised, so this one dangles too
    assert!(matches!(
        archive.open_member("foo/link2.txt"),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        archive.open_member("missing"),
        Err(Error::NotFound(_))
    ));

    // verify does not compare link payloads
    assert!(archive.verify_all().unwrap().is_empty());
}

#[test]
fn test_link_cycle_is_bounded() {
    let bytes = tar_bytes(&[
        Member::Symlink("a", "b"),
        Member::Symlink("b", "a"),
        Member::Symlink("self", "self"),
    ]);
    let sources = vec![Arc::new(bytes) as Arc<dyn ShardSource>];
    let index = itar::build(ShardDescriptor::Single, &sources).unwrap();
    let options = OpenOptions::new().max_link_depth(5);
    let archive = IndexedTar::from_sources(index, sources, &options).unwrap();

    for name in ["a", "self"] {
        let err = archive.open_member(name).unwrap_err();
        assert!(
            matches!(err, Error::LinkCycle { name: ref opened, limit: 5 } if opened == name),
            "{err}"
        );
    }
}

#[test]
fn test_reading_touches_only_the_owning_shard() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_three(dir.path());
    let index_path = dir.path().join("set.itar");
    itar::create(&index_path, &ShardSet::Sharded(paths.clone())).unwrap();

    // shards that are never read need not exist
    std::fs::remove_file(&paths[0]).unwrap();
    std::fs::remove_file(&paths[2]).unwrap();
    let archive = itar::open(&index_path).unwrap();
    assert_eq!(archive.read("d.txt").unwrap(), b"bar");
    assert!(matches!(archive.read("a.txt"), Err(Error::Io(_))));
}

#[test]
fn test_relocated_shards() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_three(dir.path());
    let index_path = dir.path().join("set.itar");
    itar::create(&index_path, &ShardSet::Sharded(paths.clone())).unwrap();

    let moved = tempfile::tempdir().unwrap();
    let relocated = paths
        .iter()
        .map(|path| {
            let to = moved.path().join(path.file_name().unwrap());
            std::fs::rename(path, &to).unwrap();
            to
        })
        .collect::<Vec<_>>();

    assert!(itar::open(&index_path).unwrap().read("f.txt").is_err());
    let archive = OpenOptions::new()
        .shards(relocated.clone())
        .thread_safe(true)
        .open(&index_path)
        .unwrap();
    assert_eq!(archive.read("f.txt").unwrap(), b"foo_f");

    let err = OpenOptions::new()
        .shards(relocated[..2].to_vec())
        .open(&index_path)
        .unwrap_err();
    assert!(matches!(err, Error::Layout(_)));
}

#[test]
fn test_create_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_three(dir.path());
    let index_path = dir.path().join("set.itar");
    let set = ShardSet::detect(&index_path).unwrap();

    let first = itar::create(&index_path, &set).unwrap();
    let second = itar::create(&index_path, &set).unwrap();
    assert_eq!(first, second);
    assert_eq!(itar::load(&index_path).unwrap(), first);
}

#[test]
fn test_duplicate_names_last_wins() {
    let shards = [
        tar_bytes(&[Member::File("dup", b"first"), Member::File("dup", b"second")]),
        tar_bytes(&[Member::File("other", b"x"), Member::File("dup", b"third")]),
    ];
    let sources = shards
        .into_iter()
        .map(|bytes| Arc::new(bytes) as Arc<dyn ShardSource>)
        .collect::<Vec<_>>();
    let descriptor = ShardDescriptor::Sharded(vec!["d-0.tar".into(), "d-1.tar".into()]);
    let index = itar::build(descriptor, &sources).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("dup").unwrap().shard_id, Some(1));

    let archive = IndexedTar::from_sources(index, sources, &OpenOptions::new()).unwrap();
    assert_eq!(archive.read("dup").unwrap(), b"third");
}

#[test]
fn test_close() {
    let dir = tempfile::tempdir().unwrap();
    write_tar(&dir.path().join("c.tar"), &[Member::File("foo.txt", b"hello")]);
    let index_path = dir.path().join("c.itar");
    itar::create(&index_path, &ShardSet::detect(&index_path).unwrap()).unwrap();

    let mut archive = itar::open(&index_path).unwrap();
    let mut reader = archive.open_member("foo.txt").unwrap();
    archive.close();
    archive.close();
    assert!(archive.is_closed());

    assert!(matches!(archive.contains("foo.txt"), Err(Error::UseAfterClose)));
    assert!(matches!(archive.len(), Err(Error::UseAfterClose)));
    assert!(matches!(archive.open_member("foo.txt"), Err(Error::UseAfterClose)));
    assert!(matches!(archive.info("foo.txt"), Err(Error::UseAfterClose)));
    assert!(matches!(archive.verify("foo.txt"), Err(Error::UseAfterClose)));
    assert!(matches!(archive.verify_all(), Err(Error::UseAfterClose)));

    // a reader handed out earlier still works
    let mut data = String::new();
    reader.read_to_string(&mut data).unwrap();
    assert_eq!(data, "hello");
}

#[test]
fn test_external_sources_outlive_close() {
    let bytes = Arc::new(tar_bytes(&[Member::File("k", b"v")]));
    let source: Arc<dyn ShardSource> = bytes.clone();
    let index = ShardedIndex::build(
        ShardDescriptor::Single,
        &[Arc::clone(&source)],
        &itar::BuildOptions::new().parallel(false),
    )
    .unwrap();
    let mut archive =
        IndexedTar::from_sources(index, vec![Arc::clone(&source)], &OpenOptions::new()).unwrap();
    assert_eq!(archive.read("k").unwrap(), b"v");
    archive.close();
    assert_eq!(Arc::strong_count(&bytes), 3);
    drop(archive);
    assert_eq!(Arc::strong_count(&bytes), 2);
}

#[test]
fn test_explicit_single_numbered_shard() {
    let dir = tempfile::tempdir().unwrap();
    let shard = write_tar(&dir.path().join("race-0.tar"), &[Member::File("a.txt", b"hello")]);
    let index_path = dir.path().join("race.itar");

    assert!(ShardSet::detect(&index_path).is_err());
    let set = ShardSet::from_paths(&index_path, vec![shard]).unwrap();
    let index = itar::create(&index_path, &set).unwrap();
    assert_eq!(index.get("a.txt").unwrap().shard_id, Some(0));
    assert_eq!(itar::open(&index_path).unwrap().read("a.txt").unwrap(), b"hello");
}

#[test]
fn test_misnamed_shards_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_tar(&dir.path().join("x-1.tar"), &[Member::File("a", b"")]);
    let b = write_tar(&dir.path().join("x-0.tar"), &[Member::File("b", b"")]);
    let err = ShardSet::from_paths(&dir.path().join("x.itar"), vec![a, b]).unwrap_err();
    assert!(matches!(err, Error::Layout(_)));
}
