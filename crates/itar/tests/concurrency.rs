//! Concurrent member reads against one shared shard handle.
//!
//! With seek-based handles two threads can move the shared file offset
//! between each other's seek and read, so reads come back with the wrong
//! bytes. With `pread(2)` handles they never do.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use itar::{IndexedTar, OpenOptions, ShardSet};

use common::{write_tar, Member};

const FILES: [(&str, &[u8]); 2] = [("a.txt", b"hello"), ("b.txt", b"world")];
const THREADS_PER_FILE: usize = 2;

/// Read both members from several threads until `budget` runs out, or
/// until the first corrupted read if `stop_on_corruption` is set. Returns
/// the number of corrupted reads.
fn corrupted_reads(archive: &IndexedTar, budget: Duration, stop_on_corruption: bool) -> usize {
    let corrupted = AtomicUsize::new(0);
    let deadline = Instant::now() + budget;
    std::thread::scope(|s| {
        for (name, expected) in FILES {
            for _ in 0..THREADS_PER_FILE {
                let corrupted = &corrupted;
                s.spawn(move || {
                    while Instant::now() < deadline {
                        if stop_on_corruption && corrupted.load(Ordering::Relaxed) > 0 {
                            break;
                        }
                        for _ in 0..1000 {
                            // a read error is a corrupted read as well
                            match archive.read(name) {
                                Ok(data) if data == expected => {}
                                _ => {
                                    corrupted.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                    }
                });
            }
        }
    });
    corrupted.into_inner()
}

fn race_index(dir: &std::path::Path) -> std::path::PathBuf {
    let shard = write_tar(
        &dir.join("race_shard-0.tar"),
        &FILES.map(|(name, data)| Member::File(name, data)),
    );
    let index_path = dir.join("race_shard.itar");
    itar::create(
        &index_path,
        &ShardSet::from_paths(&index_path, vec![shard]).unwrap(),
    )
    .unwrap();
    index_path
}

fn enough_cpus() -> bool {
    std::thread::available_parallelism().is_ok_and(|n| n.get() >= 2)
}

#[test]
fn test_seek_mode_races() {
    if !enough_cpus() {
        eprintln!("skipping: needs at least two CPUs");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let index_path = race_index(dir.path());

    // unbuffered, so every read is one seek and one read on the shared file
    let archive = OpenOptions::new()
        .buffer_capacity(0)
        .open(&index_path)
        .unwrap();
    let corrupted = corrupted_reads(&archive, Duration::from_secs(30), true);
    assert!(corrupted > 0, "expected corrupted reads with a shared file offset");
}

#[test]
fn test_pread_mode_is_race_free() {
    let dir = tempfile::tempdir().unwrap();
    let index_path = race_index(dir.path());

    let archive = OpenOptions::new()
        .thread_safe(true)
        .buffer_capacity(0)
        .open(&index_path)
        .unwrap();
    assert_eq!(corrupted_reads(&archive, Duration::from_secs(2), false), 0);

    let buffered = OpenOptions::new().thread_safe(true).open(&index_path).unwrap();
    assert_eq!(corrupted_reads(&buffered, Duration::from_secs(1), false), 0);
}
