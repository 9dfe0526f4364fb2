//! Accumulating observed paths, and reducing them to the final report.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Directories whose contents are left out of the report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IgnoreRoots {
    // Each root ends in exactly one `/`.
    roots: Vec<Vec<u8>>,
}

impl IgnoreRoots {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|root| with_trailing_slash(root.as_ref().as_os_str()))
            .collect();

        Self { roots }
    }

    /// Return the first root containing `path`, if any.
    ///
    /// A root contains itself and everything beneath it. Containment is a byte prefix test
    /// on slash-terminated forms, so `/tmp` contains `/tmp` and `/tmp/x`, but not `/tmpfs`.
    pub fn root_of(&self, path: &Path) -> Option<&Path> {
        let path = with_trailing_slash(path.as_os_str());

        self.roots
            .iter()
            .find(|root| path.starts_with(root))
            .map(|root| Path::new(OsStr::from_bytes(root)))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.root_of(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn with_trailing_slash(path: &OsStr) -> Vec<u8> {
    let mut bytes = path.as_bytes().to_vec();

    while bytes.len() > 1 && bytes.ends_with(b"/") {
        bytes.pop();
    }

    if !bytes.ends_with(b"/") {
        bytes.push(b'/');
    }

    bytes
}

/// Set of absolute paths observed while tracing.
///
/// Paths are compared as raw bytes, so `/a//b` and `/a/b` are distinct entries.
#[derive(Clone, Debug, Default)]
pub struct PathSet {
    paths: BTreeSet<OsString>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path`. Returns `true` if it had not been seen before.
    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path.into_os_string())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Drop paths that no longer exist or lie under an ignore root, and return the rest,
    /// sorted bytewise.
    pub fn finish(self, ignore: &IgnoreRoots) -> Vec<PathBuf> {
        let mut report = Vec::with_capacity(self.paths.len());

        // `BTreeSet<OsString>` iterates in bytewise order.
        for path in self.paths {
            let path = PathBuf::from(path);

            if let Some(root) = ignore.root_of(&path) {
                info!(?path, ?root, "ignoring path under ignore root");
                continue;
            }

            if let Err(err) = fs::metadata(&path) {
                info!(?path, %err, "ignoring inaccessible path");
                continue;
            }

            report.push(path);
        }

        debug!(paths = report.len(), "finished path report");

        report
    }
}

impl Extend<PathBuf> for PathSet {
    fn extend<T: IntoIterator<Item = PathBuf>>(&mut self, iter: T) {
        for path in iter {
            self.insert(path);
        }
    }
}

impl FromIterator<PathBuf> for PathSet {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Write `paths` one per line, as raw bytes.
pub fn write_report<W: std::io::Write>(mut out: W, paths: &[PathBuf]) -> std::io::Result<()> {
    for path in paths {
        out.write_all(path.as_os_str().as_bytes())?;
        out.write_all(b"\n")?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_repeated_insert_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(dir.path(), "a");

        let mut set = PathSet::new();
        assert!(set.insert(file.clone()));
        assert!(!set.insert(file.clone()));
        assert!(!set.insert(file.clone()));
        assert_eq!(set.len(), 1);

        assert_eq!(set.finish(&IgnoreRoots::default()), vec![file]);
    }

    #[test]
    fn test_missing_paths_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let kept = touch(dir.path(), "kept");
        let gone = touch(dir.path(), "gone");
        fs::remove_file(&gone).unwrap();

        let set: PathSet = vec![kept.clone(), gone].into_iter().collect();

        assert_eq!(set.finish(&IgnoreRoots::default()), vec![kept]);
    }

    #[test]
    fn test_report_sorted_bytewise() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        let nested = touch(&dir.path().join("a"), "b");
        let dashed = touch(dir.path(), "a-c");
        let upper = touch(dir.path(), "Z");

        let set: PathSet = vec![nested.clone(), dashed.clone(), upper.clone()].into_iter().collect();

        // `-` sorts before `/`, which sorts before letters.
        assert_eq!(set.finish(&IgnoreRoots::default()), vec![upper, dashed, nested]);
    }

    #[test]
    fn test_ignore_root_contains_descendants_and_itself() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ignored");
        fs::create_dir(&root).unwrap();
        let inside = touch(&root, "x");
        let sibling = touch(dir.path(), "ignored-not");

        let ignore = IgnoreRoots::new([&root]);
        assert!(ignore.contains(&root));
        assert!(ignore.contains(&inside));
        assert!(!ignore.contains(&sibling));
        assert!(!ignore.contains(dir.path()));

        let set: PathSet = vec![root, inside, sibling.clone()].into_iter().collect();
        assert_eq!(set.finish(&ignore), vec![sibling]);
    }

    #[test]
    fn test_ignore_root_trailing_slashes() {
        let slashed = IgnoreRoots::new(["/tmp/"]);
        let bare = IgnoreRoots::new(["/tmp"]);

        for ignore in [&slashed, &bare] {
            assert!(ignore.contains(Path::new("/tmp")));
            assert!(ignore.contains(Path::new("/tmp/")));
            assert!(ignore.contains(Path::new("/tmp/a/b")));
            assert!(!ignore.contains(Path::new("/tmpfs")));
            assert!(!ignore.contains(Path::new("/")));
        }

        assert_eq!(bare.root_of(Path::new("/tmp/x")), Some(Path::new("/tmp/")));
    }

    #[test]
    fn test_root_ignores_everything() {
        let ignore = IgnoreRoots::new(["/"]);
        assert!(ignore.contains(Path::new("/")));
        assert!(ignore.contains(Path::new("/etc/hostname")));
    }

    #[test]
    fn test_write_report() {
        let mut out = vec![];
        write_report(&mut out, &["/a".into(), "/b/c".into()]).unwrap();
        assert_eq!(out, b"/a\n/b/c\n");
    }

    #[test]
    fn test_non_utf8_paths_kept() {
        let dir = tempfile::tempdir().unwrap();
        let name = OsStr::from_bytes(b"caf\xe9");
        let path = dir.path().join(name);
        fs::write(&path, b"").unwrap();

        let set: PathSet = std::iter::once(path.clone()).collect();
        assert_eq!(set.finish(&IgnoreRoots::default()), vec![path]);
    }
}
