use alloc::vec::Vec;

use uuid::Uuid;
use zerocopy::{byteorder::little_endian, FromBytes, FromZeros, IntoBytes};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{crc32, guid, le_field_accessors, CRC32_SEED};

use super::GptError;

pub const GPT_SIG: &[u8; 8] = b"EFI PART";

/// Revision 1.0.
pub const GPT_REVISION: u32 = 0x0001_0000;

/// Size of the header fields covered by this structure.
pub const GPT_HEADER_SIZE: u32 = 92;

/// Space the UEFI specification reserves, at least, for each entry array.
pub const MIN_ENTRY_ARRAY_SIZE: u64 = 16384;

const MAX_ENTRIES: u32 = 4096;
const MIN_ENTRY_SIZE: u32 = 128;
const MAX_ENTRY_SIZE: u32 = 4096;

/// Byte range of the `checksum` field.
const CHECKSUM_RANGE: core::ops::Range<usize> = 16..20;

/// What made a header fail its integrity checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HeaderFault {
    #[error("invalid header size ({0})")]
    Size(u32),

    #[error("invalid header checksum (stored {stored:#010x}, computed {computed:#010x})")]
    Checksum { stored: u32, computed: u32 },

    #[error("invalid LBA self location ({0})")]
    SelfLba(u64),

    #[error("invalid LBA start/end location ({first} >= {last})")]
    UsableRange { first: u64, last: u64 },

    #[error("invalid number ({0}) of partition entries")]
    EntryCount(u32),

    #[error("invalid partition entry size ({0})")]
    EntrySize(u32),
}

/// GPT header, as found on LBA 1 (primary) and on the last LBA of the disk (backup).
///
/// The on-disk header may be larger than these 92 bytes; the rest of the sector is reserved and
/// still covered by the header checksum.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct GptHeader {
    /// Identifies EFI-compatible partition table header.
    /// Should contain the string "EFI PART".
    signature: [u8; 8],

    /// Revision number for this header.
    revision: little_endian::U32,

    /// Size of the header in bytes.
    size: little_endian::U32,

    /// CRC32 checksum for the header.
    checksum: little_endian::U32,
    reserved: little_endian::U32,

    /// The LBA that contains this structure.
    lba: little_endian::U64,

    /// The LBA of the alternate `GPT` header.
    alternate_lba: little_endian::U64,

    /// First logical block that may be used by a partition.
    first_usable_lba: little_endian::U64,

    /// Last logical block that may be used by a partition.
    last_usable_lba: little_endian::U64,

    /// GUID used to identify the disk.
    guid: [u8; 16],

    /// Starting LBA of the GUID Partition Entry array.
    partition_start_lba: little_endian::U64,

    /// Number of partitions entries in the GUID Partition Entry array.
    partition_entries_count: little_endian::U32,

    /// Size in bytes of each entry in the GUID Partition Entry array.
    partition_entry_size: little_endian::U32,

    /// CRC32 of the GUID Partition Entry array.
    partition_entries_checksum: little_endian::U32,
}

assert_eq_size!(GptHeader, [u8; 0x5C]);
assert_eq_align!(GptHeader, u8);

impl GptHeader {
    /// Blank revision 1.0 header: signature, revision and size set, everything else zeroed.
    #[must_use]
    pub fn new() -> Self {
        let mut header = Self::new_zeroed();

        header.signature = *GPT_SIG;
        header.set_revision(GPT_REVISION);
        header.set_size(GPT_HEADER_SIZE);

        header
    }

    /// Decodes the header at the start of `raw` and checks its signature.
    pub fn parse(raw: &[u8]) -> Result<Self, GptError> {
        let (header, _) = Self::read_from_prefix(raw).map_err(|_| GptError::ShortRead)?;

        if &header.signature != GPT_SIG {
            return Err(GptError::InvalidSignature);
        }

        Ok(header)
    }

    /// Checks size, checksum, self location and usable range against the raw sector the header
    /// was decoded from.
    pub fn check_integrity(&self, raw_sector: &[u8]) -> Result<(), HeaderFault> {
        let size = self.size();
        let covered = usize::try_from(size)
            .ok()
            .filter(|&covered| covered >= GPT_HEADER_SIZE as usize && covered <= raw_sector.len())
            .ok_or(HeaderFault::Size(size))?;

        let computed = checksum_of(&raw_sector[..covered]);
        if computed != self.checksum() {
            return Err(HeaderFault::Checksum {
                stored: self.checksum(),
                computed,
            });
        }

        if self.lba() != 1 {
            return Err(HeaderFault::SelfLba(self.lba()));
        }

        if self.first_usable_lba() >= self.last_usable_lba() {
            return Err(HeaderFault::UsableRange {
                first: self.first_usable_lba(),
                last: self.last_usable_lba(),
            });
        }

        Ok(())
    }

    /// Size in bytes of the entry array this header describes.
    pub fn entry_array_size(&self) -> Result<u64, GptError> {
        let count = self.partition_entries_count();
        if count == 0 || count > MAX_ENTRIES {
            return Err(GptError::CorruptHeader(HeaderFault::EntryCount(count)));
        }

        let entry_size = self.partition_entry_size();
        if entry_size % 8 != 0 || !(MIN_ENTRY_SIZE..=MAX_ENTRY_SIZE).contains(&entry_size) {
            return Err(GptError::CorruptHeader(HeaderFault::EntrySize(entry_size)));
        }

        let size = u64::from(count) * u64::from(entry_size);
        if size < MIN_ENTRY_ARRAY_SIZE {
            return Err(GptError::EntryArrayTooSmall(size as u32));
        }

        Ok(size)
    }

    /// Byte offset of the entry array, once checked to lie between the header sector and the
    /// first usable LBA.
    pub fn entry_array_offset(&self, sector_size: u32, array_size: u64) -> Result<u64, GptError> {
        let sector_size = u64::from(sector_size);

        let offset = self
            .partition_start_lba()
            .checked_mul(sector_size)
            .ok_or(GptError::EntryArrayMisplaced)?;
        let header_end = self.lba().saturating_add(1).saturating_mul(sector_size);
        let first_usable = self
            .first_usable_lba()
            .checked_mul(sector_size)
            .ok_or(GptError::EntryArrayMisplaced)?;

        if offset < header_end
            || offset >= first_usable
            || offset.saturating_add(array_size) > first_usable
        {
            return Err(GptError::EntryArrayMisplaced);
        }

        Ok(offset)
    }

    /// Checksum of this header with its checksum field cleared.
    ///
    /// Only covers the 92 bytes of this structure; headers read from disk are checked against
    /// their whole declared size instead.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        let mut snapshot = *self;
        snapshot.set_checksum(0);

        crc32(snapshot.as_bytes(), CRC32_SEED)
    }

    /// Stores the entry array checksum, then the header checksum.
    pub fn seal(&mut self, entries_checksum: u32) {
        self.set_partition_entries_checksum(entries_checksum);
        self.set_checksum(self.compute_checksum());
    }

    #[must_use]
    pub fn signature(&self) -> &[u8; 8] {
        &self.signature
    }

    #[must_use]
    pub fn disk_guid(&self) -> Uuid {
        guid::from_disk(self.guid)
    }

    pub fn set_disk_guid(&mut self, disk_guid: &Uuid) {
        self.guid = guid::to_disk(disk_guid);
    }

    le_field_accessors!(revision, set_revision, u32);
    le_field_accessors!(size, set_size, u32);
    le_field_accessors!(checksum, set_checksum, u32);
    le_field_accessors!(reserved, u32);
    le_field_accessors!(lba, set_lba, u64);
    le_field_accessors!(alternate_lba, set_alternate_lba, u64);
    le_field_accessors!(first_usable_lba, set_first_usable_lba, u64);
    le_field_accessors!(last_usable_lba, set_last_usable_lba, u64);
    le_field_accessors!(partition_start_lba, set_partition_start_lba, u64);
    le_field_accessors!(partition_entries_count, set_partition_entries_count, u32);
    le_field_accessors!(partition_entry_size, set_partition_entry_size, u32);
    le_field_accessors!(
        partition_entries_checksum,
        set_partition_entries_checksum,
        u32
    );
}

impl Default for GptHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of a raw header, with the bytes of its checksum field taken as zero.
#[must_use]
pub fn checksum_of(raw_header: &[u8]) -> u32 {
    let mut snapshot: Vec<u8> = raw_header.to_vec();
    if let Some(field) = snapshot.get_mut(CHECKSUM_RANGE) {
        field.fill(0);
    }

    crc32(&snapshot, CRC32_SEED)
}
