//! Custom assertions on output directories

use std::collections::BTreeMap;
use std::path::Path;

/// Every file in `dir`, by name
pub fn dir_contents(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .expect("output dir readable")
        .map(|entry| {
            let entry = entry.expect("dir entry");
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).expect("file readable"),
            )
        })
        .collect()
}

/// Assert `dir` holds exactly `expected`, byte for byte
pub fn assert_dir_holds(dir: &Path, expected: &[(String, Vec<u8>)]) {
    let actual = dir_contents(dir);
    let expected: BTreeMap<String, Vec<u8>> = expected.iter().cloned().collect();
    assert_eq!(
        actual.keys().collect::<Vec<_>>(),
        expected.keys().collect::<Vec<_>>(),
        "unexpected files in {}",
        dir.display()
    );
    for (name, bytes) in &expected {
        assert_eq!(&actual[name], bytes, "content mismatch for {name}");
    }
}

/// Assert no staging files were left behind
pub fn assert_no_partial_files(dir: &Path) {
    let leftovers: Vec<String> = dir_contents(dir)
        .into_keys()
        .filter(|name| name.ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "partial files left: {leftovers:?}");
}
