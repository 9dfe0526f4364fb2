//! Turning a raw path argument into an absolute path.

use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

/// Make `candidate` absolute, resolving it under the directory returned by `base` if it is
/// relative.
///
/// `base` is only called for relative candidates. Returns `None` for candidates too vague to
/// be useful (``, `.`, `..`), or if a needed base is unknown.
pub fn absolutize<F>(candidate: &Path, base: F) -> Option<PathBuf>
where
    F: FnOnce() -> Option<PathBuf>,
{
    if is_degenerate(candidate) {
        return None;
    }

    if candidate.is_absolute() {
        return Some(candidate.to_owned());
    }

    let base = base()?;

    Some(join_lexically(&base, candidate))
}

fn is_degenerate(candidate: &Path) -> bool {
    let bytes = candidate.as_os_str().as_bytes();
    matches!(bytes, b"" | b"." | b"..")
}

/// Join `rel` onto `base` and clean the result without touching the filesystem.
///
/// `.` components are dropped, and `..` removes the preceding component, but never climbs
/// above the root. Symlinks are not followed, so this may differ from the path the kernel
/// would resolve.
pub fn join_lexically(base: &Path, rel: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");

    for component in base.components().chain(rel.components()) {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            Component::Normal(name) => out.push(name),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(candidate: &str, base: &str) -> Option<PathBuf> {
        absolutize(Path::new(candidate), || Some(base.into()))
    }

    #[test]
    fn test_degenerate_candidates_dropped() {
        for candidate in ["", ".", ".."] {
            assert_eq!(abs(candidate, "/home/u/proj"), None);
            assert_eq!(absolutize(Path::new(candidate), || None), None);
        }
    }

    #[test]
    fn test_absolute_candidate_ignores_base() {
        let called = std::cell::Cell::new(false);

        let path = absolutize(Path::new("/etc/hostname"), || {
            called.set(true);
            Some("/home/u/proj".into())
        });

        assert_eq!(path, Some("/etc/hostname".into()));
        assert!(!called.get());
    }

    #[test]
    fn test_absolute_candidate_verbatim() {
        assert_eq!(abs("/usr/lib/../lib64/libc.so.6", "/"), Some("/usr/lib/../lib64/libc.so.6".into()));
    }

    #[test]
    fn test_relative_candidate_joined() {
        assert_eq!(abs("data.txt", "/home/u/proj"), Some("/home/u/proj/data.txt".into()));
        assert_eq!(abs("./src/main.rs", "/home/u/proj"), Some("/home/u/proj/src/main.rs".into()));
        assert_eq!(abs("../other/x", "/home/u/proj"), Some("/home/u/other/x".into()));
        assert_eq!(abs("a//b/.", "/home/u/proj"), Some("/home/u/proj/a/b".into()));
        assert_eq!(abs("./", "/home/u/proj"), Some("/home/u/proj".into()));
    }

    #[test]
    fn test_relative_candidate_without_base() {
        assert_eq!(absolutize(Path::new("data.txt"), || None), None);
    }

    #[test]
    fn test_join_never_climbs_above_root() {
        assert_eq!(join_lexically(Path::new("/a"), Path::new("../../../b")), PathBuf::from("/b"));
        assert_eq!(join_lexically(Path::new("/"), Path::new("..")), PathBuf::from("/"));
    }
}
