//! In-memory partition list shared by every table format.

use alloc::{string::String, vec::Vec};
use core::fmt;

use uuid::Uuid;

use crate::{
    gpt, guid, mbr, mbr::MbrPartitionType, structure, Disk, Error, Filesystem, GuidSource,
    ReadOptions, Report, WriteOptions,
};

/// Whether a record is meant to be written back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    Primary,
    #[default]
    Deleted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("P"),
            Self::Deleted => f.write_str("D"),
        }
    }
}

/// Partition table layout a record belongs to.
///
/// Every table operation is reachable from here, so callers that only know which format they are
/// dealing with at runtime do not need to branch themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableFormat {
    Gpt,
    I386,
}

impl TableFormat {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Gpt => "EFI GPT",
            Self::I386 => "Intel",
        }
    }

    pub fn read_table(
        self,
        disk: &mut dyn Disk,
        options: &ReadOptions,
        report: &mut Report,
    ) -> Result<PartitionList, Error> {
        match self {
            Self::Gpt => Ok(gpt::read_table(disk, options, report)?),
            Self::I386 => Ok(mbr::read_table(disk, options, report)?),
        }
    }

    pub fn write_table(
        self,
        disk: &mut dyn Disk,
        list: &PartitionList,
        options: &WriteOptions,
        guids: &mut dyn GuidSource,
        report: &mut Report,
    ) -> Result<(), Error> {
        match self {
            Self::Gpt => Ok(gpt::write_table(disk, list, options, guids, report)?),
            Self::I386 => Ok(mbr::write_table(disk, list, options, report)?),
        }
    }

    pub fn assign_order(self, list: &mut PartitionList) {
        match self {
            Self::Gpt => structure::assign_order(list),
            Self::I386 => mbr::assign_order(list),
        }
    }

    /// Runs the content probes on `partition`. Returns `true` if one of them recognized it.
    pub fn check_part(
        self,
        disk: &mut dyn Disk,
        partition: &mut PartitionRecord,
        options: &ReadOptions,
        report: &mut Report,
    ) -> bool {
        match self {
            Self::Gpt => gpt::check_part(disk, partition, options, report),
            Self::I386 => mbr::check_part(disk, partition, options, report),
        }
    }

    #[must_use]
    pub fn type_name(self, partition: &PartitionRecord) -> &'static str {
        let name = match self {
            Self::Gpt => guid::lookup_type_name(&partition.type_guid),
            Self::I386 => partition.legacy_type.name(),
        };

        name.unwrap_or("Unknown")
    }

    #[must_use]
    pub fn is_part_known(self, partition: &PartitionRecord) -> bool {
        match self {
            Self::Gpt => gpt::is_part_known(partition),
            Self::I386 => mbr::is_part_known(partition),
        }
    }

    pub fn next_status(self, partition: &mut PartitionRecord) {
        structure::next_status(partition);
    }

    /// Returns `true` if the list has conflicting records.
    #[must_use]
    pub fn test_structure(self, list: &PartitionList) -> bool {
        structure::detect_conflicts(list)
    }

    pub fn init_structure(self, list: &mut PartitionList) {
        structure::rebuild_structure(list);
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One partition, as recovered from a table or entered by the user.
///
/// Offsets and sizes are in bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionRecord {
    /// 1-based slot in the on-disk table, 0 when not assigned yet.
    pub order: u32,
    pub type_guid: Uuid,
    pub unique_guid: Uuid,
    pub offset: u64,
    pub size: u64,
    pub name: String,
    pub status: Status,
    pub format: TableFormat,
    /// System id used when the record is described in a legacy table.
    pub legacy_type: MbrPartitionType,
    /// Filesystem found by the content probes.
    pub content: Option<Filesystem>,
}

impl PartitionRecord {
    #[must_use]
    pub fn new(format: TableFormat) -> Self {
        Self {
            order: 0,
            type_guid: guid::UNUSED,
            unique_guid: guid::UNUSED,
            offset: 0,
            size: 0,
            name: String::new(),
            status: Status::default(),
            format,
            legacy_type: MbrPartitionType::Empty,
            content: None,
        }
    }

    /// First byte past the partition.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Returns `true` if both byte ranges share at least one byte.
    #[must_use]
    pub fn overlaps(&self, other: &PartitionRecord) -> bool {
        self.size > 0 && other.size > 0 && self.offset < other.end() && other.offset < self.end()
    }

    fn same_slot(&self, other: &PartitionRecord) -> bool {
        self.offset == other.offset
            && self.size == other.size
            && self.type_guid == other.type_guid
            && self.legacy_type == other.legacy_type
    }
}

impl fmt::Display for PartitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>2} {} {:<16} {:>12} {:>12}",
            self.order,
            self.status,
            self.format.type_name(self),
            self.offset,
            self.size
        )?;

        if let Some(content) = self.content {
            write!(f, " {content}")?;
        }

        if !self.name.is_empty() {
            write!(f, " [{}]", self.name)?;
        }

        Ok(())
    }
}

/// The record is already in the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("partition already listed")]
pub struct DuplicatePartition;

/// Records of one disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionList {
    parts: Vec<PartitionRecord>,
}

impl PartitionList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, PartitionRecord> {
        self.parts.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, PartitionRecord> {
        self.parts.iter_mut()
    }

    /// Inserts `part`, keeping the list ordered by offset then size.
    ///
    /// A record with the same offset, size and types as one already present is rejected.
    pub fn insert(&mut self, part: PartitionRecord) -> Result<(), DuplicatePartition> {
        if self.parts.iter().any(|known| known.same_slot(&part)) {
            return Err(DuplicatePartition);
        }

        let at = self
            .parts
            .partition_point(|known| (known.offset, known.size) <= (part.offset, part.size));
        self.parts.insert(at, part);

        Ok(())
    }

    /// Appends `part` without reordering.
    pub fn push(&mut self, part: PartitionRecord) {
        self.parts.push(part);
    }

    pub fn remove(&mut self, index: usize) -> Option<PartitionRecord> {
        (index < self.parts.len()).then(|| self.parts.remove(index))
    }

    /// Copy of the list, ordered by offset then size.
    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|part| (part.offset, part.size));

        Self { parts }
    }

    /// Returns `true` if two neighbouring non-empty records intersect.
    ///
    /// Only meaningful on an offset-ordered list, where it finds every intersection.
    #[must_use]
    pub fn is_overlapping(&self) -> bool {
        let mut previous: Option<&PartitionRecord> = None;

        for part in self.parts.iter().filter(|part| part.size > 0) {
            if previous.is_some_and(|prev| prev.end() > part.offset) {
                return true;
            }
            previous = Some(part);
        }

        false
    }
}

impl<'a> IntoIterator for &'a PartitionList {
    type Item = &'a PartitionRecord;
    type IntoIter = core::slice::Iter<'a, PartitionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<PartitionRecord> for PartitionList {
    fn from_iter<I: IntoIterator<Item = PartitionRecord>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}
