//! MBR (_Master Boot Record_) partion table handling
//!
//! Legacy structure used to store partition information on hard drives, stored on the first
//! logical block of the drive.
//!
//! It limits the number of partition to 4 (without using _EBR_), and the partition sizes to 2 Terabytes at most.
//!
//! Besides the codec, this module is the legacy ("i386") backend of the table contract: it reads
//! the four primary slots into a [`PartitionList`] and writes a list back to sector 0. The GPT
//! writer goes through it to emit the protective MBR.

use alloc::{format, vec};

use zerocopy::{byteorder::little_endian, FromBytes, IntoBytes};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    le_field_accessors, Disk, IoError, PartitionList, PartitionRecord, ReadOptions, Report,
    Status, TableFormat, WriteOptions,
};

/// Size of the *MBR* header, in bytes.
pub const MBR_BOOTSTRAP_SIZE: usize = 446;

/// Magic boot signature for the *MBR* header (little-endian format).
pub const MBR_MAGIC_LE: u16 = 0xaa55;

/// Number of primary slots.
pub const MBR_SLOTS: usize = 4;

/// CHS tuple used when an address does not fit the 1023/254/63 geometry.
const CHS_OVERFLOW: [u8; 3] = [0xFE, 0xFF, 0xFF];

const CHS_HEADS: u64 = 255;
const CHS_SECTORS: u64 = 63;

/// The Master Boot Record is the first sector of a storage device that
/// contains important metadata, including bootstrap code, a partition
/// table, and a boot signature.
///
/// This structure provides methods for reading, writing, and manipulating
/// these fields.
///
/// # Examples
///
/// ```
/// use gptrescue::Mbr;
///
/// let mbr = Mbr::new();
///
/// mbr.check_validity().unwrap();
/// assert!(mbr.bootcode().iter().all(|&b| b == 0));
/// ```
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct Mbr {
    bootstrap: [u8; MBR_BOOTSTRAP_SIZE],

    /// Partition table for this `Mbr`.
    ///
    /// The partition table contains entries describing up to four primary partitions
    /// in the Master Boot Record (MBR).
    pub partitions: [MbrPartition; MBR_SLOTS],

    boot_sig: little_endian::U16,
}

assert_eq_size!(Mbr, [u8; 0x200]);
assert_eq_align!(Mbr, u8);

/// Error type when dealing with [`Mbr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MbrError {
    /// A buffer too small was provided.
    #[error("buffer too small for a master boot record")]
    InvalidBufferSize,

    /// The signature field in this [`Mbr`] contains an invalid value.
    #[error("invalid MBR boot signature")]
    InvalidSignature,

    /// Sector 0 could not be read in full.
    #[error("short read on sector 0")]
    ShortRead,

    /// Sector 0 could not be written in full.
    #[error("failed to write sector 0")]
    WriteFailed,

    #[error(transparent)]
    Io(#[from] IoError),
}

impl Mbr {
    /// Creates a new, empty (but valid) MBR.
    ///
    /// # Examples
    ///
    /// ```
    /// use gptrescue::Mbr;
    ///
    /// let mbr = Mbr::new();
    /// mbr.check_validity().unwrap();
    /// ```
    pub fn new() -> Self {
        Self {
            bootstrap: [0u8; MBR_BOOTSTRAP_SIZE],
            partitions: [MbrPartition::default(); MBR_SLOTS],
            boot_sig: MBR_MAGIC_LE.into(),
        }
    }

    /// Reads the MBR from a raw bytes buffer.
    ///
    /// This creates a copy, and does not operate in-place.
    ///
    /// # Examples
    ///
    /// ```
    /// use gptrescue::Mbr;
    ///
    /// let mut mbr_buf = [0u8; 0x200];
    /// mbr_buf[0x1FF] = 0xaa;
    /// mbr_buf[0x1FE] = 0x55;
    ///
    /// Mbr::parse_from_buf(&mbr_buf).unwrap();
    /// ```
    pub fn parse_from_buf(buf: &[u8]) -> Result<Self, MbrError> {
        let (mbr, _) = Mbr::read_from_prefix(buf).map_err(|_| MbrError::InvalidBufferSize)?;

        mbr.check_validity()?;

        Ok(mbr)
    }

    /// Writes this MBR to a mutable bytes buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use gptrescue::Mbr;
    ///
    /// let mut mbr_buf = [0u8; 0x200];
    ///
    /// let mbr = Mbr::new();
    /// mbr.write(&mut mbr_buf).unwrap();
    /// ```
    pub fn write(&self, buf: &mut [u8]) -> Result<(), MbrError> {
        self.write_to_prefix(buf)
            .map_err(|_| MbrError::InvalidBufferSize)
    }

    /// Returns the bootstrap code contained in this MBR.
    ///
    /// The bootstrap code, is the executable code stored in the first 446 bytes
    /// of a Master Boot Record (MBR). It is kept untouched when the partition
    /// table is rewritten.
    pub fn bootcode(&self) -> &[u8] {
        &self.bootstrap
    }

    /// Checks if this MBR is valid (correct signature, ...).
    ///
    /// Returns an error describing what is wrong if it's not a valid MBR.
    pub fn check_validity(&self) -> Result<(), MbrError> {
        if !self.check_signature() {
            return Err(MbrError::InvalidSignature);
        }

        Ok(())
    }

    #[inline]
    fn check_signature(&self) -> bool {
        self.boot_sig.get() == MBR_MAGIC_LE
    }
}

impl Default for Mbr {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents an individual partition entry in an MBR partition table.
///
/// The MBR partition table can contain up to four such entries, each describing
/// a primary partition's attributes, location, and size. This struct is designed
/// to match the exact layout of an MBR partition entry on disk.
///
/// # Examples
///
/// ```
/// use gptrescue::Mbr;
/// use gptrescue::mbr::MbrPartitionType;
///
/// let mut mbr = Mbr::new();
///
/// mbr.partitions[0].set_sectors_count(1024);
/// mbr.partitions[0].set_partition_type(MbrPartitionType::LinuxNative);
///
/// assert!(mbr.partitions[0].is_used());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
    Unaligned,
)]
#[repr(C)]
pub struct MbrPartition {
    attributes: u8,

    chs_start: [u8; 3],
    part_type: u8,
    chs_last: [u8; 3],

    start_lba: little_endian::U32,
    sectors_count: little_endian::U32,
}

assert_eq_size!(MbrPartition, [u8; 0x10]);

impl MbrPartition {
    /// Returns `true` if this entry corresponds to a valid partition.
    pub fn is_used(&self) -> bool {
        self.part_type != 0 && self.sectors_count.get() != 0
    }

    /// Returns the [`MbrPartitionType`] for this partition.
    ///
    /// It is intended to specify the filesystem contained in this partition, but there is no clear
    /// standard.
    #[inline]
    pub fn partition_type(&self) -> MbrPartitionType {
        self.part_type.into()
    }

    /// Sets the [`MbrPartitionType`] for this partition.
    #[inline]
    pub fn set_partition_type(&mut self, part_type: MbrPartitionType) {
        self.part_type = part_type.into();
    }

    /// Fills both CHS tuples from the LBA range this entry covers.
    pub fn set_chs_from_lba(&mut self, first_lba: u64, last_lba: u64) {
        self.chs_start = lba_to_chs(first_lba);
        self.chs_last = lba_to_chs(last_lba);
    }

    #[must_use]
    pub fn chs_start(&self) -> [u8; 3] {
        self.chs_start
    }

    #[must_use]
    pub fn chs_last(&self) -> [u8; 3] {
        self.chs_last
    }

    le_field_accessors!(start_lba, set_start_lba, u32);
    le_field_accessors!(sectors_count, set_sectors_count, u32);
}

/// Converts an LBA to the packed (head, sector|cylinder-high, cylinder-low) tuple of a 255×63
/// geometry, saturating when the cylinder does not fit in 10 bits.
fn lba_to_chs(lba: u64) -> [u8; 3] {
    let cylinder = lba / (CHS_HEADS * CHS_SECTORS);
    if cylinder > 1023 {
        return CHS_OVERFLOW;
    }

    let head = (lba / CHS_SECTORS) % CHS_HEADS;
    let sector = lba % CHS_SECTORS + 1;

    [
        head as u8,
        (sector as u8) | (((cylinder >> 2) as u8) & 0xC0),
        cylinder as u8,
    ]
}

/// Known partition IDs for various filesystems, used in MBR partition entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MbrPartitionType {
    #[default]
    Empty,
    DOSFat12,
    XenixRoot,
    XenixUsr,
    DOS3Fat16,
    Extended,
    DOS331Fat16,
    NTFS,
    Fat32,
    Fat32LBA,
    DOSFat16LBA,
    ExtendedLBA,
    LinuxSwap,
    LinuxNative,
    LinuxExtended,
    LinuxLVM,
    BSDI,
    OpenBSD,
    MacOSX,
    MacOSXBoot,
    MacOSXHFS,
    LUKS,
    GPT,
    EFI,
    Unknown(u8),
}

impl MbrPartitionType {
    /// Display name of this system id, `None` for ids without a well-known meaning.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::Empty => "Empty",
            Self::DOSFat12 => "FAT12",
            Self::XenixRoot => "XENIX root",
            Self::XenixUsr => "XENIX /usr",
            Self::DOS3Fat16 => "FAT16 <32M",
            Self::Extended => "Extended",
            Self::DOS331Fat16 => "FAT16 >32M",
            Self::NTFS => "HPFS - NTFS",
            Self::Fat32 => "FAT32",
            Self::Fat32LBA => "FAT32 LBA",
            Self::DOSFat16LBA => "FAT16 LBA",
            Self::ExtendedLBA => "Extended LBA",
            Self::LinuxSwap => "Linux Swap",
            Self::LinuxNative => "Linux",
            Self::LinuxExtended => "Linux extended",
            Self::LinuxLVM => "Linux LVM",
            Self::BSDI => "BSD/OS",
            Self::OpenBSD => "OpenBSD",
            Self::MacOSX => "Darwin UFS",
            Self::MacOSXBoot => "Darwin boot",
            Self::MacOSXHFS => "HFS",
            Self::LUKS => "Linux LUKS",
            Self::GPT => "EFI GPT",
            Self::EFI => "EFI (FAT-12/16/32)",
            Self::Unknown(_) => return None,
        };

        Some(name)
    }
}

impl From<MbrPartitionType> for u8 {
    fn from(value: MbrPartitionType) -> Self {
        match value {
            MbrPartitionType::Empty => 0,
            MbrPartitionType::DOSFat12 => 1,
            MbrPartitionType::XenixRoot => 2,
            MbrPartitionType::XenixUsr => 3,
            MbrPartitionType::DOS3Fat16 => 4,
            MbrPartitionType::Extended => 5,
            MbrPartitionType::DOS331Fat16 => 6,
            MbrPartitionType::NTFS => 7,
            MbrPartitionType::Fat32 => 0xB,
            MbrPartitionType::Fat32LBA => 0xC,
            MbrPartitionType::DOSFat16LBA => 0xE,
            MbrPartitionType::ExtendedLBA => 0xF,
            MbrPartitionType::LinuxSwap => 0x82,
            MbrPartitionType::LinuxNative => 0x83,
            MbrPartitionType::LinuxExtended => 0x85,
            MbrPartitionType::LinuxLVM => 0x8E,
            MbrPartitionType::BSDI => 0x9F,
            MbrPartitionType::OpenBSD => 0xA6,
            MbrPartitionType::MacOSX => 0xA8,
            MbrPartitionType::MacOSXBoot => 0xAB,
            MbrPartitionType::MacOSXHFS => 0xAF,
            MbrPartitionType::LUKS => 0xE8,
            MbrPartitionType::GPT => 0xEE,
            MbrPartitionType::EFI => 0xEF,
            MbrPartitionType::Unknown(id) => id,
        }
    }
}

impl From<u8> for MbrPartitionType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Empty,
            1 => Self::DOSFat12,
            2 => Self::XenixRoot,
            3 => Self::XenixUsr,
            4 => Self::DOS3Fat16,
            5 => Self::Extended,
            6 => Self::DOS331Fat16,
            7 => Self::NTFS,
            0xB => Self::Fat32,
            0xC => Self::Fat32LBA,
            0xE => Self::DOSFat16LBA,
            0xF => Self::ExtendedLBA,
            0x82 => Self::LinuxSwap,
            0x83 => Self::LinuxNative,
            0x85 => Self::LinuxExtended,
            0x8E => Self::LinuxLVM,
            0x9F => Self::BSDI,
            0xA6 => Self::OpenBSD,
            0xA8 => Self::MacOSX,
            0xAB => Self::MacOSXBoot,
            0xAF => Self::MacOSXHFS,
            0xE8 => Self::LUKS,
            0xEE => Self::GPT,
            0xEF => Self::EFI,
            id => Self::Unknown(id),
        }
    }
}

/// Reads the four primary slots of sector 0.
///
/// Every used slot becomes an active record whose ordinal is its slot number.
pub fn read_table(
    disk: &mut dyn Disk,
    options: &ReadOptions,
    report: &mut Report,
) -> Result<PartitionList, MbrError> {
    let sector_size = disk.sector_size();
    let mut sector = vec![0u8; sector_size as usize];

    if disk.pread(&mut sector, 0)? != sector.len() {
        return Err(MbrError::ShortRead);
    }

    let mbr = Mbr::parse_from_buf(&sector).inspect_err(|err| report.error(format!("{err}")))?;

    let mut list = PartitionList::new();
    for (slot, entry) in (1u32..).zip(mbr.partitions.iter()) {
        if !entry.is_used() {
            continue;
        }

        let mut part = PartitionRecord::new(TableFormat::I386);
        part.order = slot;
        part.legacy_type = entry.partition_type();
        part.offset = u64::from(entry.start_lba()) * u64::from(sector_size);
        part.size = u64::from(entry.sectors_count()) * u64::from(sector_size);
        part.status = Status::Primary;

        check_part(disk, &mut part, options, report);

        report.info(format!("{part}"));
        if list.insert(part).is_err() {
            report.warn(format!("MBR: slot {slot} duplicates another entry, ignored."));
        }
    }

    Ok(list)
}

/// Writes the non-deleted records with an ordinal in 1..=4 to the matching slot of sector 0.
///
/// The bootstrap code and whatever follows the first 512 bytes of the sector are preserved when
/// sector 0 already holds a valid MBR.
pub fn write_table(
    disk: &mut dyn Disk,
    list: &PartitionList,
    options: &WriteOptions,
    report: &mut Report,
) -> Result<(), MbrError> {
    if options.read_only {
        return Ok(());
    }

    tracing::debug!(align = options.align, "legacy slots are written as given");

    let sector_size = disk.sector_size();
    let sector_bytes = u64::from(sector_size);
    let mut sector = vec![0u8; sector_size as usize];

    let mut mbr = match disk.pread(&mut sector, 0) {
        Ok(count) if count == sector.len() => Mbr::parse_from_buf(&sector).unwrap_or_else(|_| {
            sector.fill(0);
            Mbr::new()
        }),
        _ => {
            sector.fill(0);
            Mbr::new()
        }
    };

    mbr.partitions = [MbrPartition::default(); MBR_SLOTS];

    for part in list.iter().filter(|part| part.status != Status::Deleted) {
        let Some(slot) = usize::try_from(part.order)
            .ok()
            .filter(|order| (1..=MBR_SLOTS).contains(order))
        else {
            continue;
        };

        let first_lba = part.offset / sector_bytes;
        let sectors = part.size / sector_bytes;
        let last_lba = (first_lba + sectors).saturating_sub(1);

        let entry = &mut mbr.partitions[slot - 1];
        entry.set_partition_type(part.legacy_type);
        entry.set_start_lba(u32::try_from(first_lba).unwrap_or(u32::MAX));
        entry.set_sectors_count(u32::try_from(sectors).unwrap_or(u32::MAX));
        entry.set_chs_from_lba(first_lba, last_lba);

        if options.verbose {
            report.info(format!(
                "MBR: slot {slot} type {:#04x} start {first_lba} sectors {sectors}",
                u8::from(part.legacy_type)
            ));
        }
    }

    mbr.write(&mut sector)?;

    if disk.pwrite(&sector, 0)? != sector.len() {
        return Err(MbrError::WriteFailed);
    }

    disk.sync()?;

    Ok(())
}

/// Gives ordinals 1..=4 to the first known records, in list order. Later records are untouched.
pub fn assign_order(list: &mut PartitionList) {
    let known = list
        .iter_mut()
        .filter(|part| part.size > 0 && is_part_known(part));

    for (order, part) in (1..=MBR_SLOTS as u32).zip(known) {
        part.order = order;
    }
}

pub fn is_part_known(partition: &PartitionRecord) -> bool {
    partition.legacy_type != MbrPartitionType::Empty
}

/// Runs the content probes on a legacy record and records what they found.
pub fn check_part(
    disk: &mut dyn Disk,
    partition: &mut PartitionRecord,
    options: &ReadOptions,
    report: &mut Report,
) -> bool {
    match options.probes.run(disk, partition, options.verbose) {
        Some(filesystem) => {
            partition.content = Some(filesystem);
            true
        }
        None => {
            if options.verbose {
                report.info(format!("MBR: no known filesystem in slot {}", partition.order));
            }
            false
        }
    }
}
