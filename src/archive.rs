//! Inner archive staging: the `.tar.gz` carried as the container payload.
//!
//! # Packing
//! [`pack_directory`] walks the source tree in file-name order (symlinks are
//! stored as links, never followed) and records every entry under a single
//! top-level name, `etc` by default.  The root directory itself is recorded
//! first, as the device's own backups do.
//!
//! # Extraction
//! [`extract_archive`] refuses any entry whose path, or whose link target,
//! would land outside the extraction root.  The check happens before the
//! entry is unpacked, so nothing is written for a rejected entry.  Parents
//! are resolved on disk, so links unpacked by earlier entries are followed
//! the same way the filesystem will follow them.

use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;
use walkdir::WalkDir;

use crate::error::{ContainerError, Result};
use crate::gzip;

/// Top-level directory name used by the device.
pub const DEFAULT_ROOT_NAME: &str = "etc";

// ── ExtractedEntry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    HardLink,
    Other,
}

impl From<EntryType> for EntryKind {
    fn from(t: EntryType) -> Self {
        match t {
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink   => EntryKind::Symlink,
            EntryType::Link      => EntryKind::HardLink,
            _                    => EntryKind::Other,
        }
    }
}

/// One entry written to disk by [`extract_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Path as recorded in the archive, relative to the extraction root.
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
}

// ── Packing ───────────────────────────────────────────────────────────────────

/// Archive `source` under `root_name` and gzip it at `level`.
pub fn pack_directory(source: &Path, root_name: &str, level: u32) -> Result<Vec<u8>> {
    let unavailable = |path: &Path, err: io::Error| ContainerError::SourceUnavailable {
        path:   path.to_path_buf(),
        source: err,
    };

    let root = Path::new(root_name);
    if root_name.is_empty() || !root.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(unavailable(
            root,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "archive root name must be a non-empty relative path of plain names",
            ),
        ));
    }

    let meta = fs::metadata(source).map_err(|e| unavailable(source, e))?;
    if !meta.is_dir() {
        return Err(unavailable(
            source,
            io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut builder = tar::Builder::new(gzip::encoder(Vec::new(), level));
    builder.follow_symlinks(false);

    for ent in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let ent = ent.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            let msg = e.to_string();
            let io = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other(msg));
            ContainerError::SourceUnavailable { path, source: io }
        })?;

        let rel = ent.path().strip_prefix(source).map_err(|_| {
            unavailable(
                ent.path(),
                io::Error::new(io::ErrorKind::InvalidInput, "path is outside the source directory"),
            )
        })?;
        let name = root.join(rel);

        let appended = if ent.file_type().is_dir() {
            builder.append_dir(&name, ent.path())
        } else {
            builder.append_path_with_name(ent.path(), &name)
        };
        appended.map_err(|e| unavailable(ent.path(), e))?;
    }

    builder
        .into_inner()
        .and_then(|enc| enc.finish())
        .map_err(|e| ContainerError::io("finishing the inner archive", e))
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Unpack `payload` into `dest`.
///
/// `payload` is normally gzip-compressed; an uncompressed tar stream is
/// accepted as well.
pub fn extract_archive(payload: &[u8], dest: &Path) -> Result<Vec<ExtractedEntry>> {
    fs::create_dir_all(dest)
        .map_err(|e| ContainerError::io(format!("creating {}", dest.display()), e))?;
    let root = fs::canonicalize(dest)
        .map_err(|e| ContainerError::io(format!("resolving {}", dest.display()), e))?;

    let reader: Box<dyn Read + '_> = if gzip::is_gzip(payload) {
        Box::new(GzDecoder::new(payload))
    } else {
        Box::new(payload)
    };
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| ContainerError::inner(None, e.to_string()))?;

    let mut extracted = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| ContainerError::inner(None, e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| ContainerError::inner(None, e.to_string()))?
            .into_owned();
        let entry_type = entry.header().entry_type();

        if !is_plain_relative(&path) {
            return Err(ContainerError::inner(Some(path), "entry path escapes the extraction root"));
        }
        let parent = resolve_in_root(&root, Path::new(""), path.parent().unwrap_or_else(|| Path::new("")))
            .ok_or_else(|| ContainerError::inner(Some(path.clone()), "entry parent resolves outside the extraction root"))?;
        check_link_target(&entry, &root, &path, &parent, entry_type)?;

        let size = entry.header().size().unwrap_or(0);
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| ContainerError::inner(Some(path.clone()), e.to_string()))?;
        if !unpacked {
            return Err(ContainerError::inner(Some(path), "entry path escapes the extraction root"));
        }
        extracted.push(ExtractedEntry { path, kind: entry_type.into(), size });
    }
    Ok(extracted)
}

/// Resolve `rel` from `base` (both relative to `root`) the way the
/// filesystem will: symlinks already on disk are followed, components that do
/// not exist yet are taken as written.  `None` when the walk leaves `root` or
/// meets a dangling link.
fn resolve_in_root(root: &Path, base: &Path, rel: &Path) -> Option<PathBuf> {
    let mut current = base.to_path_buf();
    for comp in rel.components() {
        match comp {
            Component::Normal(name) => {
                current.push(name);
                let on_disk = root.join(&current);
                let is_link = fs::symlink_metadata(&on_disk)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false);
                if is_link {
                    let real = fs::canonicalize(&on_disk).ok()?;
                    current = real.strip_prefix(root).ok()?.to_path_buf();
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !current.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(current)
}

fn check_link_target<R: Read>(
    entry: &tar::Entry<'_, R>,
    root: &Path,
    path: &Path,
    parent: &Path,
    entry_type: EntryType,
) -> Result<()> {
    if !matches!(entry_type, EntryType::Symlink | EntryType::Link) {
        return Ok(());
    }
    let target = entry
        .link_name()
        .map_err(|e| ContainerError::inner(Some(path.to_path_buf()), e.to_string()))?
        .ok_or_else(|| ContainerError::inner(Some(path.to_path_buf()), "link entry without a target"))?;

    let safe = if entry_type == EntryType::Link {
        // Hard link targets are archive paths, relative to the root.
        is_plain_relative(&target) && resolve_in_root(root, Path::new(""), &target).is_some()
    } else {
        resolve_in_root(root, parent, &target).is_some()
    };
    if safe {
        Ok(())
    } else {
        Err(ContainerError::inner(
            Some(path.to_path_buf()),
            format!("link target {} escapes the extraction root", target.display()),
        ))
    }
}

/// True when `path` is relative and never climbs out of its starting point.
fn is_plain_relative(path: &Path) -> bool {
    resolves_within(Path::new(""), path)
}

/// True when `target`, resolved lexically from directory `base`, stays under
/// the root that `base` is relative to.
fn resolves_within(base: &Path, target: &Path) -> bool {
    let mut depth: usize = 0;
    for comp in base.components().chain(target.components()) {
        match comp {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_paths() {
        assert!(is_plain_relative(Path::new("etc/config")));
        assert!(is_plain_relative(Path::new("./etc/a/../b")));
        assert!(!is_plain_relative(Path::new("../etc")));
        assert!(!is_plain_relative(Path::new("etc/../../x")));
        assert!(!is_plain_relative(Path::new("/etc/passwd")));
    }

    #[test]
    fn link_targets_resolve_from_parent() {
        assert!(resolves_within(Path::new("etc/sub"), Path::new("../other")));
        assert!(resolves_within(Path::new("etc"), Path::new("..")));
        assert!(!resolves_within(Path::new("etc"), Path::new("../..")));
        assert!(!resolves_within(Path::new("etc"), Path::new("/tmp")));
    }

    #[test]
    fn entry_type_maps_to_kind() {
        assert_eq!(EntryKind::from(EntryType::Regular), EntryKind::File);
        assert_eq!(EntryKind::from(EntryType::Directory), EntryKind::Directory);
        assert_eq!(EntryKind::from(EntryType::Symlink), EntryKind::Symlink);
        assert_eq!(EntryKind::from(EntryType::Fifo), EntryKind::Other);
    }

    #[test]
    fn pack_records_root_then_children_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.conf"), b"b").unwrap();
        fs::write(dir.path().join("a.conf"), b"a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.conf"), b"c").unwrap();

        let payload = pack_directory(dir.path(), DEFAULT_ROOT_NAME, gzip::DEFAULT_LEVEL).unwrap();
        let tar_bytes = gzip::decompress(&payload).unwrap();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        assert_eq!(names, ["etc", "etc/a.conf", "etc/b.conf", "etc/sub", "etc/sub/c.conf"]);
    }

    #[test]
    fn pack_rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = pack_directory(&dir.path().join("absent"), "etc", 6).unwrap_err();
        assert!(matches!(err, ContainerError::SourceUnavailable { .. }));
    }

    #[test]
    fn pack_rejects_file_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = pack_directory(&file, "etc", 6).unwrap_err();
        assert!(matches!(err, ContainerError::SourceUnavailable { .. }));
    }

    #[test]
    fn pack_rejects_unusable_root_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["", "../x", "/abs", ".", "etc/../.."] {
            match pack_directory(dir.path(), name, 6).unwrap_err() {
                ContainerError::SourceUnavailable { path, source } => {
                    assert_eq!(path, PathBuf::from(name));
                    assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
                }
                other => panic!("unexpected error for {name:?}: {other}"),
            }
        }
        assert!(pack_directory(dir.path(), "config/etc", 6).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_follows_links_on_disk() {
        let root = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(root.path()).unwrap();
        fs::create_dir_all(root.join("etc/sub")).unwrap();
        std::os::unix::fs::symlink(".", root.join("etc/here")).unwrap();
        std::os::unix::fs::symlink("sub", root.join("etc/down")).unwrap();

        assert_eq!(resolve_in_root(&root, Path::new(""), Path::new("etc/here")), Some(PathBuf::from("etc")));
        assert_eq!(
            resolve_in_root(&root, Path::new(""), Path::new("etc/down/new")),
            Some(PathBuf::from("etc/sub/new"))
        );
        assert_eq!(resolve_in_root(&root, Path::new("etc"), Path::new("here/../..")), None);
        assert_eq!(resolve_in_root(&root, Path::new("etc"), Path::new("down/../..")), Some(PathBuf::new()));
        assert_eq!(resolve_in_root(&root, Path::new(""), Path::new("..")), None);
    }

    #[test]
    fn extract_accepts_uncompressed_tar() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "etc/hosts", &b"hosts"[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let dest = tempfile::tempdir().unwrap();
        let entries = extract_archive(&tar_bytes, dest.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(fs::read(dest.path().join("etc/hosts")).unwrap(), b"hosts");
    }

    #[test]
    fn extract_rejects_garbage() {
        let dest = tempfile::tempdir().unwrap();
        let err = extract_archive(&[0x55u8; 700], dest.path()).unwrap_err();
        assert!(matches!(err, ContainerError::InnerArchive { .. }));
    }
}
