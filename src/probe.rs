//! Filesystem signature probes.
//!
//! A probe looks for the on-disk marker of one filesystem at the start of a partition. Probes only
//! read; the result is used to label the record and to pick its legacy system id.

use alloc::{boxed::Box, vec::Vec};
use core::fmt;

use crate::{mbr::MbrPartitionType, Disk, PartitionRecord};

/// Filesystem recognized inside a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filesystem {
    Fat12,
    Fat16,
    Fat32,
    Ntfs,
    Jfs,
    ReiserFs,
    Ext2,
    Cramfs,
    Xfs,
}

impl Filesystem {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fat12 => "FAT12",
            Self::Fat16 => "FAT16",
            Self::Fat32 => "FAT32",
            Self::Ntfs => "NTFS",
            Self::Jfs => "JFS",
            Self::ReiserFs => "ReiserFS",
            Self::Ext2 => "ext2",
            Self::Cramfs => "cramfs",
            Self::Xfs => "XFS",
        }
    }

    /// System id a legacy table would give a partition holding this filesystem.
    #[must_use]
    pub fn legacy_type(self) -> MbrPartitionType {
        match self {
            Self::Fat12 => MbrPartitionType::DOSFat12,
            Self::Fat16 => MbrPartitionType::DOS331Fat16,
            Self::Fat32 => MbrPartitionType::Fat32,
            Self::Ntfs => MbrPartitionType::NTFS,
            Self::Jfs | Self::ReiserFs | Self::Ext2 | Self::Cramfs | Self::Xfs => {
                MbrPartitionType::LinuxNative
            }
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The probe did not find its marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no {0} marker")]
pub struct NotRecognized(pub &'static str);

pub trait ContentProbe {
    fn name(&self) -> &'static str;

    fn probe(
        &self,
        disk: &mut dyn Disk,
        partition: &PartitionRecord,
        verbose: bool,
    ) -> Result<Filesystem, NotRecognized>;
}

/// Reads `buf.len()` bytes at `offset` within the partition.
///
/// A read past the end of the partition, a device error or a short read all count as "marker not
/// found".
fn read_in(
    disk: &mut dyn Disk,
    partition: &PartitionRecord,
    offset: u64,
    buf: &mut [u8],
    probe: &'static str,
) -> Result<(), NotRecognized> {
    let len = buf.len() as u64;
    let start = offset
        .checked_add(len)
        .filter(|&end| end <= partition.size)
        .and_then(|_| partition.offset.checked_add(offset))
        .ok_or(NotRecognized(probe))?;

    match disk.pread(buf, start) {
        Ok(count) if count == buf.len() => Ok(()),
        _ => Err(NotRecognized(probe)),
    }
}

/// FAT12/16/32 boot sector.
pub struct FatProbe;

impl ContentProbe for FatProbe {
    fn name(&self) -> &'static str {
        "FAT"
    }

    fn probe(
        &self,
        disk: &mut dyn Disk,
        partition: &PartitionRecord,
        _verbose: bool,
    ) -> Result<Filesystem, NotRecognized> {
        let mut sector = [0u8; 512];
        read_in(disk, partition, 0, &mut sector, self.name())?;

        if sector[510..512] != [0x55, 0xAA] {
            return Err(NotRecognized(self.name()));
        }

        if &sector[0x52..0x57] == b"FAT32" {
            return Ok(Filesystem::Fat32);
        }

        match &sector[0x36..0x3B] {
            b"FAT12" => Ok(Filesystem::Fat12),
            b"FAT16" => Ok(Filesystem::Fat16),
            _ => Err(NotRecognized(self.name())),
        }
    }
}

pub struct NtfsProbe;

impl ContentProbe for NtfsProbe {
    fn name(&self) -> &'static str {
        "NTFS"
    }

    fn probe(
        &self,
        disk: &mut dyn Disk,
        partition: &PartitionRecord,
        _verbose: bool,
    ) -> Result<Filesystem, NotRecognized> {
        let mut oem_id = [0u8; 8];
        read_in(disk, partition, 3, &mut oem_id, self.name())?;

        if &oem_id == b"NTFS    " {
            Ok(Filesystem::Ntfs)
        } else {
            Err(NotRecognized(self.name()))
        }
    }
}

/// Probe matching a fixed byte string at a fixed offset in the partition.
pub struct MagicProbe {
    name: &'static str,
    offset: u64,
    magics: &'static [&'static [u8]],
    filesystem: Filesystem,
}

impl MagicProbe {
    pub const JFS: Self = Self {
        name: "JFS",
        offset: 0x8000,
        magics: &[b"JFS1"],
        filesystem: Filesystem::Jfs,
    };

    pub const REISERFS: Self = Self {
        name: "Reiser",
        offset: 0x10000 + 52,
        magics: &[b"ReIsEr2Fs", b"ReIsEr3Fs", b"ReIsErFs"],
        filesystem: Filesystem::ReiserFs,
    };

    /// Superblock magic `0xEF53` at 1024 + 56, little-endian.
    pub const EXT2: Self = Self {
        name: "EXT2",
        offset: 0x400 + 56,
        magics: &[&[0x53, 0xEF]],
        filesystem: Filesystem::Ext2,
    };

    /// `0x28CD3D45`, little-endian, at the start of the image.
    pub const CRAMFS: Self = Self {
        name: "cramfs",
        offset: 0,
        magics: &[&[0x45, 0x3D, 0xCD, 0x28]],
        filesystem: Filesystem::Cramfs,
    };

    pub const XFS: Self = Self {
        name: "XFS",
        offset: 0,
        magics: &[b"XFSB"],
        filesystem: Filesystem::Xfs,
    };
}

impl ContentProbe for MagicProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn probe(
        &self,
        disk: &mut dyn Disk,
        partition: &PartitionRecord,
        verbose: bool,
    ) -> Result<Filesystem, NotRecognized> {
        let longest = self.magics.iter().map(|magic| magic.len()).max().unwrap_or(0);
        let mut window = [0u8; 16];
        let window = &mut window[..longest];

        read_in(disk, partition, self.offset, window, self.name)?;

        if self.magics.iter().any(|magic| window.starts_with(magic)) {
            if verbose {
                tracing::debug!(probe = self.name, offset = partition.offset, "marker found");
            }
            Ok(self.filesystem)
        } else {
            Err(NotRecognized(self.name))
        }
    }
}

/// Ordered list of probes; the first one that recognizes the content wins.
pub struct ProbeChain {
    probes: Vec<Box<dyn ContentProbe>>,
}

impl ProbeChain {
    /// A chain with no probes: nothing is ever recognized.
    #[must_use]
    pub fn empty() -> Self {
        Self { probes: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, probe: impl ContentProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.probes.iter().map(|probe| probe.name())
    }

    pub fn run(
        &self,
        disk: &mut dyn Disk,
        partition: &PartitionRecord,
        verbose: bool,
    ) -> Option<Filesystem> {
        self.probes.iter().find_map(|probe| {
            probe
                .probe(disk, partition, verbose)
                .inspect_err(|err| tracing::trace!(offset = partition.offset, "{err}"))
                .ok()
        })
    }
}

impl Default for ProbeChain {
    fn default() -> Self {
        Self::empty()
            .with(FatProbe)
            .with(NtfsProbe)
            .with(MagicProbe::JFS)
            .with(MagicProbe::REISERFS)
            .with(MagicProbe::EXT2)
            .with(MagicProbe::CRAMFS)
            .with(MagicProbe::XFS)
    }
}

impl fmt::Debug for ProbeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use crate::{testing::mem_disk, Disk, PartitionRecord, TableFormat};

    use super::{Filesystem, ProbeChain};

    const PART_OFFSET: u64 = 1 << 20;

    fn record() -> PartitionRecord {
        let mut part = PartitionRecord::new(TableFormat::Gpt);
        part.offset = PART_OFFSET;
        part.size = 1 << 20;
        part
    }

    fn probe_with(marker: &[u8], at: u64) -> Option<Filesystem> {
        let mut disk = mem_disk(4 << 20, 512);
        disk.pwrite(marker, PART_OFFSET + at).unwrap();

        ProbeChain::default().run(&mut disk, &record(), true)
    }

    #[test]
    pub fn recognizes_fat_boot_sectors() {
        let mut sector = [0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xAA;
        sector[0x52..0x5A].copy_from_slice(b"FAT32   ");
        assert_eq!(probe_with(&sector, 0), Some(Filesystem::Fat32));

        let mut sector = [0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xAA;
        sector[0x36..0x3E].copy_from_slice(b"FAT16   ");
        assert_eq!(probe_with(&sector, 0), Some(Filesystem::Fat16));
    }

    #[test]
    pub fn recognizes_magic_markers() {
        assert_eq!(probe_with(b"NTFS    ", 3), Some(Filesystem::Ntfs));
        assert_eq!(probe_with(b"JFS1", 0x8000), Some(Filesystem::Jfs));
        assert_eq!(probe_with(b"ReIsEr2Fs", 0x10034), Some(Filesystem::ReiserFs));
        assert_eq!(probe_with(&[0x53, 0xEF], 0x438), Some(Filesystem::Ext2));
        assert_eq!(probe_with(b"XFSB", 0), Some(Filesystem::Xfs));
    }

    #[test]
    pub fn blank_partition_matches_nothing() {
        assert_eq!(probe_with(&[], 0), None);
    }

    #[test]
    pub fn markers_past_partition_end_are_ignored() {
        let mut disk = mem_disk(4 << 20, 512);
        disk.pwrite(b"JFS1", PART_OFFSET + 0x8000).unwrap();

        let mut part = record();
        part.size = 0x4000;
        assert_eq!(ProbeChain::default().run(&mut disk, &part, false), None);
    }

    #[test]
    pub fn partitions_at_the_end_of_the_address_space() {
        let mut disk = mem_disk(4 << 20, 512);

        let mut part = record();
        part.offset = u64::MAX - 2;
        assert_eq!(ProbeChain::default().run(&mut disk, &part, true), None);
    }

    #[test]
    pub fn default_chain_order() {
        let names: Vec<_> = ProbeChain::default().names().collect();

        assert_eq!(
            names,
            ["FAT", "NTFS", "JFS", "Reiser", "EXT2", "cramfs", "XFS"]
        );
    }
}
