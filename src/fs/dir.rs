use std::io::{Read, Seek};
use std::ops::Range;

use serde::Serialize;

use super::boot_sector::DiskGeometry;
use super::chain::ChainCursor;
use super::entry::{decode_entry, DirectoryEntry, EntryOutcome, DIR_ENTRY_SIZE};
use super::sector::{SectorReader, SECTOR_SIZE};
use crate::error::Result;

const SLOTS_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_SIZE;

/// Where a directory's entries live on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DirLocation {
    /// Fixed root directory region following the FATs.
    Root,
    /// Subdirectory whose chain starts at this cluster.
    Cluster(u32),
}

impl DirLocation {
    /// Location of the directory a `Subdirectory` entry points at.
    /// `..` entries store cluster 0 when their parent is the root; any other
    /// entry keeps its cluster so the chain walk can reject it.
    pub fn of_entry(entry: &DirectoryEntry) -> Self {
        if entry.is_dot_entry() && entry.starting_cluster == 0 {
            DirLocation::Root
        } else {
            DirLocation::Cluster(entry.starting_cluster as u32)
        }
    }
}

enum Source {
    Root {
        next_sector: u64,
        remaining_slots: u32,
    },
    Chain {
        cursor: ChainCursor,
        pending: Range<u64>,
    },
}

/// Lazy iterator over the live entries of one directory, in on-disk order.
///
/// Deleted slots are skipped; the first end-of-directory slot ends the
/// sequence. Errors end the sequence after being yielded once.
pub struct DirectoryIter<'a, R> {
    sectors: &'a mut SectorReader<R>,
    geometry: &'a DiskGeometry,
    source: Source,
    buf: [u8; SECTOR_SIZE],
    slot: usize,
    done: bool,
}

impl<'a, R: Read + Seek> DirectoryIter<'a, R> {
    pub fn new(
        sectors: &'a mut SectorReader<R>,
        geometry: &'a DiskGeometry,
        location: DirLocation,
    ) -> Self {
        let source = match location {
            DirLocation::Root => Source::Root {
                next_sector: geometry.first_root_sector as u64,
                remaining_slots: geometry.root_entry_count as u32,
            },
            DirLocation::Cluster(cluster) => Source::Chain {
                cursor: ChainCursor::new(cluster),
                pending: 0..0,
            },
        };
        Self {
            sectors,
            geometry,
            source,
            buf: [0u8; SECTOR_SIZE],
            slot: SLOTS_PER_SECTOR,
            done: false,
        }
    }

    /// Load the next directory sector into the buffer. `false` when exhausted.
    fn load_next_sector(&mut self) -> Result<bool> {
        let sector = match &mut self.source {
            Source::Root { next_sector, .. } => {
                let n = *next_sector;
                *next_sector += 1;
                n
            }
            Source::Chain { cursor, pending } => {
                if pending.is_empty() {
                    match cursor.advance(self.sectors, self.geometry)? {
                        Some(cluster) => *pending = self.geometry.cluster_sectors(cluster),
                        None => return Ok(false),
                    }
                }
                let n = pending.start;
                pending.start += 1;
                n
            }
        };
        self.sectors.read_sector_into(sector, &mut self.buf)?;
        self.slot = 0;
        Ok(true)
    }

    fn next_entry(&mut self) -> Result<Option<DirectoryEntry>> {
        loop {
            if let Source::Root { remaining_slots, .. } = &mut self.source {
                if *remaining_slots == 0 {
                    return Ok(None);
                }
            }
            if self.slot == SLOTS_PER_SECTOR && !self.load_next_sector()? {
                return Ok(None);
            }
            if let Source::Root { remaining_slots, .. } = &mut self.source {
                *remaining_slots -= 1;
            }

            let off = self.slot * DIR_ENTRY_SIZE;
            self.slot += 1;
            match decode_entry(&self.buf[off..off + DIR_ENTRY_SIZE])? {
                EntryOutcome::Stop => return Ok(None),
                EntryOutcome::Skip => continue,
                EntryOutcome::Entry(entry) => return Ok(Some(entry)),
            }
        }
    }
}

impl<R: Read + Seek> Iterator for DirectoryIter<'_, R> {
    type Item = Result<DirectoryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_entry();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result.transpose()
    }
}
