//! Trace discovery and naming.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    metadata::metadata_path,
};

/// A directory is a trace root iff it directly holds a regular `metadata`
/// file.
pub fn is_trace_root<P: AsRef<Path>>(path: P) -> bool {
    metadata_path(path).is_file()
}

fn canonical_trace_path(path: &Path) -> Result<PathBuf> {
    let real = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;

    if real.parent().is_none() {
        return Err(Error::RootTrace);
    }

    Ok(real)
}

/// Recursively looks for trace roots below `start`. Trace roots are not
/// searched further, and directories we may not read are skipped.
pub fn find_traces<P: AsRef<Path>>(start: P) -> Result<BTreeSet<PathBuf>> {
    let start = start.as_ref();
    let mut found = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut worklist = vec![start.to_path_buf()];

    while let Some(path) = worklist.pop() {
        if is_trace_root(&path) {
            let trace = canonical_trace_path(&path)?;
            tracing::debug!("found trace `{}`", trace.display());
            found.insert(trace);
            continue;
        }

        if !path.is_dir() {
            continue;
        }

        // Symbolic links may loop back to a directory we already walked.
        if let Ok(real) = fs::canonicalize(&path) {
            if !visited.insert(real) {
                continue;
            }
        }

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::warn!("cannot open directory `{}`: {}: continuing", path.display(), e);
                continue;
            }
            Err(e) => return Err(Error::io(&path, e)),
        };

        let mut sub_paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| Error::io(&path, e))?;
        sub_paths.sort();

        // Reversed so that entries are popped in name order.
        worklist.extend(sub_paths.into_iter().rev());
    }

    if found.is_empty() {
        return Err(Error::NoTraces(start.to_path_buf()));
    }

    Ok(found)
}

/// Names every trace after its path, minus the longest prefix common to all
/// paths that ends with a separator.
pub fn derive_names(paths: &BTreeSet<PathBuf>) -> BTreeMap<PathBuf, String> {
    let strings: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let bytes: Vec<&[u8]> = strings.iter().map(|s| s.as_bytes()).collect();

    let mut chars_to_strip = 0;
    let mut at = 0;

    'outer: loop {
        let mut common = None;

        for b in &bytes {
            let Some(&this) = b.get(at) else {
                break 'outer;
            };

            match common {
                None => common = Some(this),
                Some(c) if c != this => break 'outer,
                Some(_) => {}
            }
        }

        match common {
            None => break,
            Some(b'/') => chars_to_strip = at + 1,
            Some(_) => {}
        }

        at += 1;
    }

    paths
        .iter()
        .zip(strings.iter())
        .map(|(path, s)| (path.clone(), s[chars_to_strip..].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(paths: &[&str]) -> Vec<String> {
        let set: BTreeSet<PathBuf> = paths.iter().map(PathBuf::from).collect();
        derive_names(&set).into_values().collect()
    }

    #[test]
    fn test_derive_names() {
        assert_eq!(names(&["/a/b/c/t1", "/a/b/c/t2"]), vec!["t1", "t2"]);
        assert_eq!(names(&["/a/b/x/t", "/a/b/y/t"]), vec!["x/t", "y/t"]);
        assert_eq!(names(&["/home/user/trace"]), vec!["trace"]);
        assert_eq!(names(&["/a/tr", "/a/tr2"]), vec!["tr", "tr2"]);
        assert_eq!(names(&["/a/b", "/a/b/c"]), vec!["b", "b/c"]);
    }

    fn make_trace(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("metadata"), "{}").unwrap();
    }

    #[test]
    fn test_find_traces() {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();

        make_trace(&root.join("t1"));
        make_trace(&root.join("sub/t2"));
        make_trace(&root.join("t1/nested"));
        fs::create_dir_all(root.join("nothing/here")).unwrap();
        fs::write(root.join("stray"), b"x").unwrap();

        let found = find_traces(&root).unwrap();
        let expected: BTreeSet<PathBuf> = [root.join("sub/t2"), root.join("t1")].into();
        assert_eq!(found, expected);

        let named = derive_names(&found);
        assert_eq!(named[&root.join("t1")], "t1");
        assert_eq!(named[&root.join("sub/t2")], "sub/t2");
    }

    #[test]
    fn test_find_single_trace_canonicalized() {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        make_trace(&root.join("t"));

        let found = find_traces(root.join("t/../t/")).unwrap();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![root.join("t")]);
    }

    #[test]
    fn test_no_traces() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("empty")).unwrap();

        assert!(matches!(find_traces(tmp.path()), Err(Error::NoTraces(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_traces_skips_symlink_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();

        make_trace(&root.join("t1"));
        make_trace(&root.join("sub/t2"));
        std::os::unix::fs::symlink(root.join("sub"), root.join("sub/loop")).unwrap();

        let found = find_traces(&root).unwrap();
        let expected: BTreeSet<PathBuf> = [root.join("sub/t2"), root.join("t1")].into();
        assert_eq!(found, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_traces_skips_unreadable_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();

        make_trace(&root.join("t1"));
        make_trace(&root.join("locked/t2"));
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permissions do not apply to root.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let found = find_traces(&root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let expected: BTreeSet<PathBuf> = [root.join("t1")].into();
        assert_eq!(found.unwrap(), expected);
    }
}
