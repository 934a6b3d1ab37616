//! Virtual path canonicalization.
//!
//! Virtual paths are plain strings, never host paths. The canonical form
//! starts with `/`, has no repeated `/`, and has no trailing `/` except for
//! the root itself. Every key stored by a backend is canonical, so string
//! equality is path equality.

/// The root path.
pub const ROOT: &str = "/";

/// Canonicalize a path.
///
/// Prefixes `/` if missing, collapses runs of `/`, and strips a trailing `/`
/// unless the result is the root. Never fails.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Returns true if the path is the root.
pub fn is_root(path: &str) -> bool {
    normalize(path) == ROOT
}

/// Parent of a canonical path, `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT.to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => Some(ROOT.to_string()),
    }
}

/// Last segment of a path, empty for the root.
pub fn file_name(path: &str) -> String {
    let path = normalize(path);
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Every prefix of the path from the first segment down to the path itself.
///
/// `/a/b/c` yields `["/a", "/a/b", "/a/b/c"]`; the root yields nothing.
pub fn ancestors(path: &str) -> Vec<String> {
    let path = normalize(path);
    let mut result = Vec::new();
    let mut current = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        result.push(current.clone());
    }
    result
}

/// Join a child path onto a base, producing a canonical path.
pub fn join(base: &str, child: &str) -> String {
    normalize(&format!("{}/{}", base, child))
}

/// Canonical form with a trailing slash, as used for mount points.
///
/// The root stays `/`.
pub fn mount_path(path: &str) -> String {
    let path = normalize(path);
    if path == ROOT {
        path
    } else {
        format!("{}/", path)
    }
}

/// Listing prefix for a directory: `path + "/"`, or `/` for the root.
pub fn child_prefix(path: &str) -> String {
    mount_path(path)
}
