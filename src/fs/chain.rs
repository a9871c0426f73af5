use std::collections::HashSet;
use std::io::{Read, Seek};

use log::trace;

use super::boot_sector::DiskGeometry;
use super::fat_table::{next_cluster, ClusterLink};
use super::sector::SectorReader;
use crate::error::{FatError, Result};

#[derive(Debug, Clone, Copy)]
enum State {
    /// Start cluster not yet yielded.
    Start(u32),
    /// Last yielded cluster; its FAT entry is read on the next step.
    After(u32),
    Done,
}

/// Position within a cluster chain, independent of any reader borrow.
///
/// Each step performs at most one FAT lookup. Revisiting a cluster or leaving
/// the data region ends the walk with `CorruptChain`.
#[derive(Debug, Clone)]
pub struct ChainCursor {
    state: State,
    visited: HashSet<u32>,
}

impl ChainCursor {
    pub fn new(start_cluster: u32) -> Self {
        Self {
            state: State::Start(start_cluster),
            visited: HashSet::new(),
        }
    }

    /// Produce the next cluster of the chain, or `None` once the end marker is reached.
    pub fn advance<R: Read + Seek>(
        &mut self,
        sectors: &mut SectorReader<R>,
        geometry: &DiskGeometry,
    ) -> Result<Option<u32>> {
        let result = self.step(sectors, geometry);
        if !matches!(result, Ok(Some(_))) {
            self.state = State::Done;
        }
        result
    }

    fn step<R: Read + Seek>(
        &mut self,
        sectors: &mut SectorReader<R>,
        geometry: &DiskGeometry,
    ) -> Result<Option<u32>> {
        let cluster = match self.state {
            State::Done => return Ok(None),
            State::Start(start) => start,
            State::After(prev) => match next_cluster(sectors, geometry, prev)? {
                ClusterLink::Next(next) => next,
                ClusterLink::EndOfChain => return Ok(None),
                ClusterLink::Free => {
                    return Err(FatError::corrupt_chain(prev, "links to a free cluster"))
                }
                ClusterLink::Reserved => {
                    return Err(FatError::corrupt_chain(
                        prev,
                        "links to a reserved or bad cluster",
                    ))
                }
            },
        };

        if cluster < 2 || cluster > geometry.max_cluster() {
            return Err(FatError::corrupt_chain(
                cluster,
                format!("outside data region 2..={}", geometry.max_cluster()),
            ));
        }
        if !self.visited.insert(cluster) {
            return Err(FatError::corrupt_chain(cluster, "cycle detected"));
        }

        trace!("chain step -> cluster {cluster}");
        self.state = State::After(cluster);
        Ok(Some(cluster))
    }
}

/// Lazy iterator over the clusters of a chain.
pub struct ClusterChain<'a, R> {
    sectors: &'a mut SectorReader<R>,
    geometry: &'a DiskGeometry,
    cursor: ChainCursor,
}

impl<'a, R: Read + Seek> ClusterChain<'a, R> {
    pub fn new(
        sectors: &'a mut SectorReader<R>,
        geometry: &'a DiskGeometry,
        start_cluster: u32,
    ) -> Self {
        Self {
            sectors,
            geometry,
            cursor: ChainCursor::new(start_cluster),
        }
    }
}

impl<R: Read + Seek> Iterator for ClusterChain<'_, R> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.advance(self.sectors, self.geometry).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::boot_sector::parse_boot_sector;
    use crate::fs::boot_sector::tests::make_boot_sector;
    use std::io::Cursor;

    /// Small FAT16 volume: 4 sectors/cluster, 512 root entries, 8 sectors per FAT.
    fn fat16_with_links(links: &[(u16, u16)]) -> (SectorReader<Cursor<Vec<u8>>>, DiskGeometry) {
        let mut boot = make_boot_sector(4, 1, 2, 512, 0, 32);
        boot[0x20..0x24].copy_from_slice(&20480u32.to_le_bytes());
        let geom = parse_boot_sector(&boot).unwrap();
        let mut image = vec![0u8; 20480 * 512];
        image[..512].copy_from_slice(&boot);
        let fat = 512;
        image[fat..fat + 4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]);
        for &(cluster, value) in links {
            let off = fat + cluster as usize * 2;
            image[off..off + 2].copy_from_slice(&value.to_le_bytes());
        }
        (SectorReader::new(Cursor::new(image), 0), geom)
    }

    fn walk(links: &[(u16, u16)], start: u32) -> Result<Vec<u32>> {
        let (mut sectors, geom) = fat16_with_links(links);
        ClusterChain::new(&mut sectors, &geom, start).collect()
    }

    #[test]
    fn test_geometry_is_fat16() {
        let (_, geom) = fat16_with_links(&[]);
        assert_eq!(geom.fat_type, crate::fs::boot_sector::FatType::Fat16);
    }

    #[test]
    fn test_simple_chain() {
        assert_eq!(walk(&[(5, 6), (6, 0xFFFF)], 5).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_single_cluster() {
        assert_eq!(walk(&[(9, 0xFFF8)], 9).unwrap(), vec![9]);
    }

    #[test]
    fn test_cycle_detected() {
        let err = walk(&[(5, 6), (6, 5)], 5).unwrap_err();
        assert!(matches!(err, FatError::CorruptChain { cluster: 5, .. }));
    }

    #[test]
    fn test_self_loop_detected() {
        assert!(matches!(
            walk(&[(7, 7)], 7),
            Err(FatError::CorruptChain { cluster: 7, .. })
        ));
    }

    #[test]
    fn test_invalid_start_cluster() {
        assert!(matches!(walk(&[], 0), Err(FatError::CorruptChain { cluster: 0, .. })));
        assert!(matches!(walk(&[], 1), Err(FatError::CorruptChain { cluster: 1, .. })));
    }

    #[test]
    fn test_link_out_of_range() {
        assert!(matches!(
            walk(&[(5, 0xF000)], 5),
            Err(FatError::CorruptChain { cluster: 0xF000, .. })
        ));
    }

    #[test]
    fn test_link_to_free_cluster() {
        assert!(matches!(
            walk(&[(5, 6)], 5),
            Err(FatError::CorruptChain { cluster: 6, .. })
        ));
    }

    #[test]
    fn test_bad_cluster_marker() {
        assert!(matches!(
            walk(&[(5, 0xFFF7)], 5),
            Err(FatError::CorruptChain { cluster: 5, .. })
        ));
    }

    #[test]
    fn test_lazy_first_step() {
        // The start cluster is yielded before its FAT entry is consulted
        let (mut sectors, geom) = fat16_with_links(&[(5, 0)]);
        let mut chain = ClusterChain::new(&mut sectors, &geom, 5);
        assert_eq!(chain.next().unwrap().unwrap(), 5);
        assert!(chain.next().unwrap().is_err());
        assert!(chain.next().is_none());
    }
}
