//! Path normalization shared by manifests and the storage provider.

/// Normalize a storage path.
///
/// Strips one leading `/` and maps `./` to the root (empty string). Only a
/// trailing `/` marks a directory.
pub fn normalize(path: &str) -> String {
    let s = path.strip_prefix('/').unwrap_or(path);
    if s == "./" {
        return String::new();
    }
    s.to_string()
}

/// Whether a normalized file path stays below the storage root: non-empty,
/// no empty, `.` or `..` components, no backslashes.
pub fn is_contained(path: &str) -> bool {
    let rel = path.strip_suffix('/').unwrap_or(path);
    !rel.is_empty()
        && !rel.contains('\\')
        && rel.split('/').all(|c| !c.is_empty() && c != "." && c != "..")
}

/// Directory part of `path` including the trailing `/`, without a leading `/`.
pub fn dirname(path: &str) -> &str {
    let dir = match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    };
    dir.strip_prefix('/').unwrap_or(dir)
}

/// Final component of `path`.
pub fn filename(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Join a normalized directory prefix (empty or ending in `/`) and a relative path.
pub fn join(dir: &str, path: &str) -> String {
    let path = path.strip_prefix('/').unwrap_or(path);
    if dir.is_empty() {
        return path.to_string();
    }
    if dir.ends_with('/') {
        format!("{dir}{path}")
    } else {
        format!("{dir}/{path}")
    }
}
