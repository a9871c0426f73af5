use std::io::{Read, Seek};

use log::debug;
use serde::Serialize;

use super::boot_sector::DiskGeometry;
use super::dir::{DirLocation, DirectoryIter};
use super::entry::{DirectoryEntry, EntryKind};
use super::sector::SectorReader;
use crate::error::{FatError, Result};

/// Outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolvedTarget {
    /// The root directory itself.
    Root,
    /// An entry together with the directory that contains it.
    Entry {
        entry: DirectoryEntry,
        parent: DirLocation,
    },
}

impl ResolvedTarget {
    pub fn is_directory(&self) -> bool {
        match self {
            ResolvedTarget::Root => true,
            ResolvedTarget::Entry { entry, .. } => entry.is_directory(),
        }
    }

    /// Location to traverse when the target is a directory.
    pub fn directory_location(&self) -> Option<DirLocation> {
        match self {
            ResolvedTarget::Root => Some(DirLocation::Root),
            ResolvedTarget::Entry { entry, .. } if entry.is_directory() => {
                Some(DirLocation::of_entry(entry))
            }
            ResolvedTarget::Entry { .. } => None,
        }
    }
}

/// Split a path on `/` or `\`, dropping empty components.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|c| !c.is_empty())
}

/// Walk `path` from the root directory down to its target entry.
pub fn resolve<R: Read + Seek>(
    sectors: &mut SectorReader<R>,
    geometry: &DiskGeometry,
    path: &str,
) -> Result<ResolvedTarget> {
    let mut target = ResolvedTarget::Root;
    let mut walked = String::new();

    for component in components(path) {
        let dir = target
            .directory_location()
            .ok_or_else(|| FatError::NotADirectory(display_path(&walked)))?;
        walked.push('/');
        walked.push_str(component);

        // The fixed root has no dot entries of its own
        if dir == DirLocation::Root && (component == "." || component == "..") {
            target = ResolvedTarget::Root;
            continue;
        }

        let found = find_in_directory(sectors, geometry, dir, component)?
            .ok_or_else(|| FatError::NotFound(walked.clone()))?;
        target = if found.is_dot_entry() && found.starting_cluster == 0 {
            ResolvedTarget::Root
        } else {
            ResolvedTarget::Entry {
                entry: found,
                parent: dir,
            }
        };
    }

    debug!("resolved {path:?} -> {target:?}");
    Ok(target)
}

/// Scan one directory for a file or subdirectory matching `name`.
fn find_in_directory<R: Read + Seek>(
    sectors: &mut SectorReader<R>,
    geometry: &DiskGeometry,
    dir: DirLocation,
    name: &str,
) -> Result<Option<DirectoryEntry>> {
    for entry in DirectoryIter::new(sectors, geometry, dir) {
        let entry = entry?;
        if matches!(entry.kind, EntryKind::File | EntryKind::Directory) && entry.matches_name(name)
        {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

fn display_path(walked: &str) -> String {
    if walked.is_empty() {
        "/".to_string()
    } else {
        walked.to_string()
    }
}
