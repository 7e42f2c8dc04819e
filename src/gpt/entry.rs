use alloc::string::String;

use uuid::Uuid;
use zerocopy::{byteorder::little_endian, FromBytes, FromZeros};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{guid, le_field_accessors, GuidSource, PartitionRecord, Status, TableFormat};

use super::protective;

/// Number of UTF-16 code units available for a partition name.
pub const GPT_NAME_UNITS: usize = 36;

/// Entry of the GUID Partition Entry array.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct GptEntry {
    /// Defines the purpose and type of this partition.
    type_guid: [u8; 16],

    /// GUID unique for every partition entry.
    partition_guid: [u8; 16],

    /// Starting LBA of this partition.
    start_lba: little_endian::U64,

    /// Last LBA of this partition, inclusive.
    last_lba: little_endian::U64,

    /// Partition's attributes bits.
    attributes: little_endian::U64,

    /// Null-terminated UTF-16LE name of this partition.
    partition_name: [little_endian::U16; GPT_NAME_UNITS],
}

assert_eq_size!(GptEntry, [u8; 0x80]);
assert_eq_align!(GptEntry, u8);

impl GptEntry {
    /// Decodes the entry stored at the start of an array slot. Slots may be larger than the entry
    /// itself; the extra bytes are ignored.
    #[must_use]
    pub fn decode(slot: &[u8]) -> Option<Self> {
        Self::read_from_prefix(slot).ok().map(|(entry, _)| entry)
    }

    /// Encodes a record for the on-disk table.
    ///
    /// A nil unique GUID is replaced by a fresh one from `guids`. Attributes are always cleared.
    pub fn from_record(
        partition: &PartitionRecord,
        sector_size: u32,
        guids: &mut dyn GuidSource,
    ) -> Self {
        let sector_size = u64::from(sector_size);
        let mut entry = Self::new_zeroed();

        entry.set_type_guid(&partition.type_guid);

        let unique_guid = if guid::is_unused(&partition.unique_guid) {
            guids.generate()
        } else {
            partition.unique_guid
        };
        entry.set_unique_guid(&unique_guid);

        entry.set_start_lba(partition.offset / sector_size);
        entry.set_last_lba(partition.end().saturating_sub(1) / sector_size);
        entry.set_name(&partition.name);

        entry
    }

    /// Record for the entry in slot `order` (1-based).
    ///
    /// `None` when the byte range of the entry does not fit in 64 bits.
    #[must_use]
    pub fn to_record(&self, order: u32, sector_size: u32) -> Option<PartitionRecord> {
        let sector_size = u64::from(sector_size);
        let offset = self.start_lba().checked_mul(sector_size)?;
        let end = self.last_lba().checked_add(1)?.checked_mul(sector_size)?;

        let mut partition = PartitionRecord::new(TableFormat::Gpt);
        partition.order = order;
        partition.type_guid = self.type_guid();
        partition.unique_guid = self.unique_guid();
        partition.offset = offset;
        partition.size = end.saturating_sub(offset);
        partition.name = self.name();
        partition.status = Status::Primary;
        partition.legacy_type = protective::legacy_type_for(&partition.type_guid);

        Some(partition)
    }

    /// An entry describes a partition when its type is set and it spans more than one block.
    #[must_use]
    pub fn is_used(&self) -> bool {
        !guid::is_unused(&self.type_guid()) && self.start_lba() < self.last_lba()
    }

    #[must_use]
    pub fn type_guid(&self) -> Uuid {
        guid::from_disk(self.type_guid)
    }

    pub fn set_type_guid(&mut self, type_guid: &Uuid) {
        self.type_guid = guid::to_disk(type_guid);
    }

    #[must_use]
    pub fn unique_guid(&self) -> Uuid {
        guid::from_disk(self.partition_guid)
    }

    pub fn set_unique_guid(&mut self, unique_guid: &Uuid) {
        self.partition_guid = guid::to_disk(unique_guid);
    }

    /// Partition name, up to the first NUL. Invalid UTF-16 is replaced, not rejected.
    #[must_use]
    pub fn name(&self) -> String {
        let units = self
            .partition_name
            .iter()
            .map(|unit| unit.get())
            .take_while(|&unit| unit != 0);

        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    /// Stores `name`, truncated to the units that fit. Unused units are zeroed.
    pub fn set_name(&mut self, name: &str) {
        self.partition_name = [little_endian::U16::ZERO; GPT_NAME_UNITS];

        for (unit, code) in self.partition_name.iter_mut().zip(name.encode_utf16()) {
            unit.set(code);
        }
    }

    le_field_accessors!(start_lba, set_start_lba, u64);
    le_field_accessors!(last_lba, set_last_lba, u64);
    le_field_accessors!(attributes, u64);
}

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use uuid::Uuid;
    use zerocopy::IntoBytes;

    use crate::{guid, testing::SequentialGuids, PartitionRecord, Status, TableFormat};

    use super::GptEntry;

    fn record() -> PartitionRecord {
        let mut part = PartitionRecord::new(TableFormat::Gpt);
        part.type_guid = guid::MS_BASIC_DATA;
        part.offset = 1 << 20;
        part.size = 64 << 20;
        part.name = "Basic data partition".to_string();
        part
    }

    #[test]
    pub fn entry_from_record() {
        let mut guids = SequentialGuids::default();
        let entry = GptEntry::from_record(&record(), 512, &mut guids);

        assert_eq!(entry.start_lba(), 2048);
        assert_eq!(entry.last_lba(), 2048 + 131072 - 1);
        assert_eq!(entry.attributes(), 0);
        assert_eq!(entry.unique_guid(), Uuid::from_u128(1));
        assert_eq!(entry.name(), "Basic data partition");
        assert_eq!(&entry.as_bytes()[..4], &[0xa2, 0xa0, 0xd0, 0xeb]);

        let part = entry.to_record(7, 512).unwrap();
        assert_eq!(part.order, 7);
        assert_eq!(part.offset, 1 << 20);
        assert_eq!(part.size, 64 << 20);
        assert_eq!(part.status, Status::Primary);
        assert_eq!(part.type_guid, guid::MS_BASIC_DATA);
    }

    #[test]
    pub fn unique_guid_is_kept_when_set() {
        let mut part = record();
        part.unique_guid = Uuid::from_u128(0xfeed);

        let entry = GptEntry::from_record(&part, 512, &mut SequentialGuids::default());
        assert_eq!(entry.unique_guid(), Uuid::from_u128(0xfeed));
    }

    #[test]
    pub fn names_are_truncated_and_lossy() {
        let mut entry = GptEntry::from_record(&record(), 512, &mut SequentialGuids::default());

        entry.set_name("a name that is much longer than thirty-six units");
        assert_eq!(entry.name(), "a name that is much longer than thir");

        entry.set_name("short");
        assert_eq!(entry.name(), "short");

        entry.partition_name[1].set(0xD800);
        assert_eq!(entry.name(), "s\u{FFFD}ort");
    }

    #[test]
    pub fn unaddressable_ranges_have_no_record() {
        let mut entry = GptEntry::from_record(&record(), 512, &mut SequentialGuids::default());

        entry.set_start_lba(1 << 56);
        entry.set_last_lba((1 << 56) + 100);
        assert!(entry.is_used());
        assert!(entry.to_record(1, 512).is_none());

        entry.set_start_lba(0x10);
        entry.set_last_lba(u64::MAX);
        assert!(entry.to_record(1, 512).is_none());
    }

    #[test]
    pub fn single_block_entries_are_unused() {
        let mut entry = GptEntry::from_record(&record(), 512, &mut SequentialGuids::default());
        assert!(entry.is_used());

        entry.set_last_lba(entry.start_lba());
        assert!(!entry.is_used());

        entry.set_last_lba(entry.start_lba() + 1);
        entry.set_type_guid(&guid::UNUSED);
        assert!(!entry.is_used());
    }
}
