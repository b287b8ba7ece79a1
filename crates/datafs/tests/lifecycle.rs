//! Tests for the store lifecycle, capability gating and strict mode

use std::io::{Read, Write};

use similar_asserts::assert_eq;

use datafs::{
    test::MemoryFs, Capability, Capacity, DataFs, DataFsError, LifecycleState, Metadata, OpenMode,
};

fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_implicit_init_runs_once() {
    let backend = MemoryFs::new();
    let counters = backend.counters();
    let store = DataFs::new(backend, false);

    assert_eq!(store.state(), LifecycleState::Uninitialized);
    assert_eq!(counters.init(), 0);

    store.isfile("a").unwrap();
    assert_eq!(store.state(), LifecycleState::Initialized);
    assert_eq!(store.iter_names().unwrap().count(), 0);
    store.init().unwrap();
    store.init().unwrap();
    assert_eq!(counters.init(), 1);
}

#[test]
fn test_close_is_idempotent() {
    let backend = MemoryFs::new();
    let counters = backend.counters();
    let store = DataFs::new(backend, false);

    store.init().unwrap();
    store.close().unwrap();
    store.close().unwrap();
    assert_eq!(store.state(), LifecycleState::Closed);
    assert_eq!(counters.close(), 1);

    drop(store);
    assert_eq!(counters.close(), 1);
}

#[test]
fn test_failed_init_is_retried() {
    let backend = MemoryFs::new();
    backend.insert("a", b"data");
    backend.fail_init(true);
    let counters = backend.counters();
    let store = DataFs::new(backend.clone(), false);

    let err = store.isfile("a").unwrap_err();
    assert!(err.to_string().contains("injected init failure"), "{err}");
    assert_eq!(store.state(), LifecycleState::Uninitialized);
    assert_eq!(counters.io(), 0);

    backend.fail_init(false);
    assert!(store.isfile("a").unwrap());
    assert_eq!(store.state(), LifecycleState::Initialized);
    assert_eq!(counters.init(), 2);
}

#[test]
fn test_close_without_init_skips_backend() {
    let backend = MemoryFs::new();
    let counters = backend.counters();
    let store = DataFs::new(backend, false);

    store.close().unwrap();
    assert!(store.is_closed());
    assert_eq!(counters.init(), 0);
    assert_eq!(counters.close(), 0);
}

#[test]
fn test_operations_after_close() {
    let backend = MemoryFs::new();
    backend.insert("a", b"data");
    let counters = backend.counters();
    let store = DataFs::new(backend, false);
    store.close().unwrap();

    assert!(store.init().unwrap_err().is_illegal_state());
    assert!(store.iter_names().err().unwrap().is_illegal_state());
    assert!(store.sample_names(1).err().unwrap().is_illegal_state());
    assert!(store
        .open("a", OpenMode::Read)
        .unwrap_err()
        .is_illegal_state());
    assert!(store.isfile("a").unwrap_err().is_illegal_state());
    assert!(store.list_meta("a").unwrap_err().is_illegal_state());
    assert!(store.get_meta("a", &["k"]).unwrap_err().is_illegal_state());
    assert!(store
        .put_meta("a", &Metadata::new())
        .unwrap_err()
        .is_illegal_state());
    assert!(store.clear_meta("a").unwrap_err().is_illegal_state());
    assert_eq!(counters.io(), 0);
}

#[test]
fn test_capability_gating_does_no_io() {
    let backend = MemoryFs::with_capacity(Capacity::empty());
    backend.insert("a", b"data");
    let counters = backend.counters();
    let store = DataFs::new(backend, false);

    let expect = |err: DataFsError, capability: Capability| match err {
        DataFsError::Unsupported {
            capability: Some(missing),
            ..
        } => assert_eq!(missing, capability),
        other => panic!("unexpected {other:?}"),
    };

    expect(
        store.open("a", OpenMode::Read).unwrap_err(),
        Capability::ReadData,
    );
    expect(
        store.open("a", OpenMode::Write).unwrap_err(),
        Capability::WriteData,
    );
    expect(store.isfile("a").unwrap_err(), Capability::ReadData);
    expect(store.list_meta("a").unwrap_err(), Capability::ReadMeta);
    expect(store.get_meta("a", &[]).unwrap_err(), Capability::ReadMeta);
    expect(
        store.put_meta("a", &Metadata::new()).unwrap_err(),
        Capability::WriteMeta,
    );
    expect(store.clear_meta("a").unwrap_err(), Capability::WriteMeta);

    assert_eq!(counters.io(), 0);
    assert_eq!(counters.init(), 0);
    assert_eq!(store.state(), LifecycleState::Uninitialized);

    // enumeration needs no capability
    let names: Vec<_> = store.iter_names().unwrap().map(Result::unwrap).collect();
    assert_eq!(names, vec!["a"]);
}

#[test]
fn test_partial_capacity() {
    let backend = MemoryFs::with_capacity(Capacity::new([
        Capability::ReadData,
        Capability::ReadMeta,
    ]));
    backend.insert("a", b"data");
    let store = DataFs::new(backend, false);

    let mut contents = String::new();
    store
        .open("a", OpenMode::Read)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "data");
    assert!(store.list_meta("a").unwrap().is_empty());

    assert!(store.open("a", OpenMode::Write).unwrap_err().is_unsupported());
    assert!(store.clear_meta("a").unwrap_err().is_unsupported());
}

#[test]
fn test_close_force_closes_handles() {
    let backend = MemoryFs::new();
    backend.insert("r", b"read me");
    let store = DataFs::new(backend.clone(), false);

    let mut reader = store.open("r", OpenMode::Read).unwrap();
    let mut writer = store.open("w", OpenMode::Write).unwrap();
    writer.write_all(b"unflushed").unwrap();
    assert_eq!(store.active_files(), 2);

    store.close().unwrap();
    assert_eq!(store.active_files(), 0);
    assert!(reader.is_closed());
    assert!(writer.is_closed());

    // the forced close flushed the writer
    assert_eq!(backend.contents("w").unwrap(), b"unflushed");

    assert!(reader.read(&mut [0u8; 4]).is_err());
    assert!(writer.write(b"more").is_err());
    reader.close().unwrap();
}

#[test]
fn test_caller_close_deregisters() {
    let store = DataFs::new(MemoryFs::new(), false);
    let mut a = store.open("a", OpenMode::Write).unwrap();
    let b = store.open("b", OpenMode::Write).unwrap();
    assert_eq!(store.active_files(), 2);

    a.close().unwrap();
    assert_eq!(store.active_files(), 1);
    drop(b);
    assert_eq!(store.active_files(), 0);
}

#[test]
fn test_close_reports_failures() {
    let backend = MemoryFs::new();
    backend.fail_flush("bad");
    let counters = backend.counters();
    let store = DataFs::new(backend.clone(), false);

    let mut good = store.open("good", OpenMode::Write).unwrap();
    good.write_all(b"kept").unwrap();
    let bad = store.open("bad", OpenMode::Write).unwrap();

    match store.close().unwrap_err() {
        DataFsError::CloseFailed(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "bad");
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(store.is_closed());
    assert!(good.is_closed());
    assert!(bad.is_closed());
    assert_eq!(backend.contents("good").unwrap(), b"kept");
    assert_eq!(counters.close(), 1);

    // already closed, nothing left to report
    store.close().unwrap();
}

#[test]
fn test_backend_close_failure() {
    let backend = MemoryFs::new();
    backend.fail_close(true);
    let store = DataFs::new(backend, false);
    store.init().unwrap();

    let err = store.close().unwrap_err();
    assert!(err.to_string().contains("injected close failure"), "{err}");
    assert!(store.is_closed());
    store.close().unwrap();
}

#[test]
fn test_close_reports_handle_and_backend_failures() {
    let backend = MemoryFs::new();
    backend.fail_flush("bad");
    backend.fail_close(true);
    let counters = backend.counters();
    let store = DataFs::new(backend, false);

    let _bad = store.open("bad", OpenMode::Write).unwrap();

    match store.close().unwrap_err() {
        DataFsError::CloseFailed(failures) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].0, "bad");
            assert_eq!(failures[1].0, "<memory backend>");
            assert!(failures[1].1.to_string().contains("injected close failure"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(store.is_closed());
    assert_eq!(counters.close(), 1);
}

#[test]
fn test_metadata_crud() {
    let backend = MemoryFs::new();
    backend.insert("obj", b"");
    let store = DataFs::new(backend, true);

    store
        .put_meta(
            "obj",
            &meta(&[("kind", "report".into()), ("rows", 2.into())]),
        )
        .unwrap();
    assert_eq!(
        store.list_meta("obj").unwrap().into_iter().collect::<Vec<_>>(),
        vec!["kind", "rows"]
    );
    assert_eq!(
        store.get_meta("obj", &["rows", "absent"]).unwrap(),
        meta(&[("rows", 2.into())])
    );

    store
        .put_meta("obj", &meta(&[("rows", 3.into())]))
        .unwrap();
    assert_eq!(
        store.get_meta("obj", &["kind", "rows"]).unwrap(),
        meta(&[("kind", "report".into()), ("rows", 3.into())])
    );

    store.clear_meta("obj").unwrap();
    assert!(store.list_meta("obj").unwrap().is_empty());

    assert!(store.list_meta("missing").unwrap_err().is_not_found());
}

#[test]
fn test_strict_mode_validation() {
    let backend = MemoryFs::new();
    backend.insert("obj", b"");
    let counters = backend.counters();
    let strict = DataFs::new(backend.clone(), true);

    for name in ["", "/abs", "../up", "a//b", "a/./b"] {
        assert!(
            matches!(
                strict.open(name, OpenMode::Write),
                Err(DataFsError::InvalidArgument(_))
            ),
            "{name:?} accepted"
        );
        assert!(matches!(
            strict.isfile(name),
            Err(DataFsError::InvalidArgument(_))
        ));
    }
    assert!(matches!(
        strict.put_meta("obj", &meta(&[("", 1.into())])),
        Err(DataFsError::InvalidArgument(_))
    ));
    assert!(matches!(
        strict.get_meta("obj", &["bad\nkey"]),
        Err(DataFsError::InvalidArgument(_))
    ));
    assert_eq!(counters.io(), 0);
    // rejected before the backend was ever set up
    assert_eq!(counters.init(), 0);
    assert_eq!(strict.state(), LifecycleState::Uninitialized);

    // the same calls go straight to the backend when not strict
    let lenient = DataFs::new(backend.clone(), false);
    assert!(!lenient.isfile("../up").unwrap());
    lenient.open("a//b", OpenMode::Write).unwrap().close().unwrap();
    assert!(backend.contents("a//b").is_some());
    lenient.put_meta("obj", &meta(&[("", 1.into())])).unwrap();
}

#[test]
fn test_sample_names() {
    let backend = MemoryFs::new();
    for name in ["a", "b", "c", "d"] {
        backend.insert(name, b"");
    }
    let store = DataFs::new(backend, false);

    let mut sample: Vec<_> = store
        .sample_names(2)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    sample.sort();
    sample.dedup();
    assert_eq!(sample.len(), 2);

    let mut all: Vec<_> = store
        .sample_names(10)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    all.sort();
    assert_eq!(all, vec!["a", "b", "c", "d"]);

    assert_eq!(store.sample_names(0).unwrap().count(), 0);
}

#[test]
fn test_clone_is_independent() {
    let backend = MemoryFs::new();
    let counters = backend.counters();
    let store = DataFs::new(backend.clone(), true);

    let mut held = store.open("x", OpenMode::Write).unwrap();
    let clone = store.try_clone().unwrap();
    assert!(!clone.strict());
    assert_eq!(clone.capacity(), store.capacity());
    assert_eq!(clone.state(), LifecycleState::Uninitialized);
    assert_eq!(clone.active_files(), 0);

    clone.close().unwrap();
    assert!(!held.is_closed());
    held.write_all(b"still open").unwrap();
    held.close().unwrap();
    assert_eq!(backend.contents("x").unwrap(), b"still open");

    // a closed store can still be cloned
    store.close().unwrap();
    let again = store.try_clone().unwrap();
    assert!(again.isfile("x").unwrap());
    assert_eq!(counters.init(), 2);
}
