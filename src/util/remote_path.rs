//! Remote path arithmetic.
//!
//! Remote paths are always absolute, `/`-separated strings regardless of the
//! client platform, so everything here is plain string manipulation with no
//! local filesystem access.

/// Normalize a remote path syntactically:
/// - collapse repeated separators
/// - remove `.` components
/// - resolve `..` where possible (never past the root)
/// - strip the trailing slash except for the root itself
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            seg => out.push(seg),
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out.join("/"))
    }
}

/// Join a base path and a child component, normalizing the result.
/// An absolute `child` is coerced to be relative to `base`.
pub fn join(base: &str, child: &str) -> String {
    normalize(&format!("{}/{}", base, child))
}

/// Parent directory of a canonical path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Final component of a canonical path. The root has no basename.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Rewrite `path` from one root namespace into another, e.g.
/// `/home/alice/farm` with roots `/home` -> `/render` becomes
/// `/render/alice/farm`. Returns `None` when `path` is not under `from_root`.
pub fn rewrite_root(path: &str, from_root: &str, to_root: &str) -> Option<String> {
    let path = normalize(path);
    let from_root = normalize(from_root);
    let rest = if from_root == "/" {
        path.as_str()
    } else if path == from_root {
        ""
    } else {
        path.strip_prefix(&format!("{}/", from_root))?
    };
    Some(join(&normalize(to_root), rest))
}
