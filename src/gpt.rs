//! GUID Partition Table reader and writer.
//!
//! Reading validates the primary header on LBA 1 and its entry array before turning the in-use
//! entries into records. Any inconsistency rejects the whole table: a recovery tool must not trust
//! half of a corrupt GPT.
//!
//! Writing regenerates a fresh table from a record list: a 128-entry array and header on LBA 1
//! and 2.., their backup copies at the end of the disk, then the protective MBR.

use alloc::{format, vec};

use uuid::Uuid;
use zerocopy::IntoBytes;

use crate::{
    crc32, guid, structure, Disk, GuidSource, IoError, MbrError, PartitionList, PartitionRecord,
    ReadOptions, Report, Status, TableFormat, WriteOptions, CRC32_SEED,
};

mod entry;
mod header;
pub mod protective;

pub use entry::{GptEntry, GPT_NAME_UNITS};
pub use header::{
    checksum_of, GptHeader, HeaderFault, GPT_HEADER_SIZE, GPT_REVISION, GPT_SIG,
    MIN_ENTRY_ARRAY_SIZE,
};

/// Entries written in a regenerated table.
pub const GPT_WRITE_ENTRIES: u32 = 128;

/// Size of an entry in a regenerated table.
pub const GPT_WRITE_ENTRY_SIZE: u32 = 128;

const GPT_HEADER_LBA: u64 = 1;

/// Error type when dealing with a [`GptHeader`] and its entry array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GptError {
    #[error("Bad GPT partition, invalid signature.")]
    InvalidSignature,

    #[error("Bad GPT partition, {0}.")]
    CorruptHeader(HeaderFault),

    #[error("GPT: A minimum of 16,384 bytes of space must be reserved for the GUID Partition Entry array (found {0}).")]
    EntryArrayTooSmall(u32),

    #[error("GPT: The primary GUID Partition Entry array must be located after the primary GUID Partition Table Header and end before the FirstUsableLBA.")]
    EntryArrayMisplaced,

    #[error("Bad GPT partition entries, invalid checksum (expected {expected:#010x}, computed {computed:#010x}).")]
    EntryArrayChecksumMismatch { expected: u32, computed: u32 },

    #[error("GPT: short read")]
    ShortRead,

    #[error("GPT: write failed")]
    WriteFailed,

    #[error("GPT: the disk is too small for a GUID Partition Table")]
    DiskTooSmall,

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("GPT: protective MBR: {0}")]
    ProtectiveMbr(MbrError),
}

impl From<HeaderFault> for GptError {
    fn from(fault: HeaderFault) -> Self {
        Self::CorruptHeader(fault)
    }
}

/// Reads and validates the primary GPT of `disk`.
///
/// Every in-use entry becomes a primary record whose ordinal is its slot number. Anomalies that do
/// not prevent reading the table, and the records found, go to `report`.
#[tracing::instrument(skip_all)]
pub fn read_table(
    disk: &mut dyn Disk,
    options: &ReadOptions,
    report: &mut Report,
) -> Result<PartitionList, GptError> {
    read_table_inner(disk, options, report).inspect_err(|err| report.error(format!("{err}")))
}

fn read_table_inner(
    disk: &mut dyn Disk,
    options: &ReadOptions,
    report: &mut Report,
) -> Result<PartitionList, GptError> {
    let sector_size = disk.sector_size();
    let mut sector = vec![0u8; sector_size as usize];

    if disk.pread(&mut sector, GPT_HEADER_LBA * u64::from(sector_size))? != sector.len() {
        return Err(GptError::ShortRead);
    }

    let header = GptHeader::parse(&sector)?;

    log_header(disk, &header, options.verbose, report);

    header.check_integrity(&sector)?;

    if header.revision() != GPT_REVISION {
        report.warn("GPT: Warning - not revision 1.0");
    }

    if header.reserved() != 0 {
        report.warn("GPT: Warning - __reserved!=0");
    }

    let array_size = header.entry_array_size()?;
    let array_offset = header.entry_array_offset(sector_size, array_size)?;

    let array_len = usize::try_from(array_size).map_err(|_| GptError::EntryArrayMisplaced)?;
    let mut entries = vec![0u8; array_len];
    if disk.pread(&mut entries, array_offset)? != entries.len() {
        return Err(GptError::ShortRead);
    }

    let computed = crc32(&entries, CRC32_SEED);
    if computed != header.partition_entries_checksum() {
        return Err(GptError::EntryArrayChecksumMismatch {
            expected: header.partition_entries_checksum(),
            computed,
        });
    }

    let mut list = PartitionList::new();
    let slots = entries.chunks_exact(header.partition_entry_size() as usize);

    for (order, slot) in (1u32..).zip(slots) {
        let Some(entry) = GptEntry::decode(slot).filter(GptEntry::is_used) else {
            continue;
        };

        let Some(mut partition) = entry.to_record(order, sector_size) else {
            tracing::debug!(order, "GPT entry past the addressable range skipped");
            continue;
        };
        check_part(disk, &mut partition, options, report);

        report.info(format!("{partition}"));
        if list.insert(partition).is_err() {
            tracing::debug!(order, "duplicate GPT entry dropped");
        }
    }

    Ok(list)
}

fn log_header(disk: &dyn Disk, header: &GptHeader, verbose: bool, report: &mut Report) {
    tracing::debug!(
        size = header.size(),
        lba = header.lba(),
        alternate_lba = header.alternate_lba(),
        first_usable_lba = header.first_usable_lba(),
        last_usable_lba = header.last_usable_lba(),
        table_lba = header.partition_start_lba(),
        entries = header.partition_entries_count(),
        entry_size = header.partition_entry_size(),
        "GPT header"
    );

    if !verbose {
        return;
    }

    report.info(format!("hdr_size={}", header.size()));
    report.info(format!("hdr_lba_self={}", header.lba()));
    report.info(format!(
        "hdr_lba_alt={} (expected {})",
        header.alternate_lba(),
        disk.last_lba()
    ));
    report.info(format!("hdr_lba_start={}", header.first_usable_lba()));
    report.info(format!("hdr_lba_end={}", header.last_usable_lba()));
    report.info(format!("hdr_lba_table={}", header.partition_start_lba()));
    report.info(format!("hdr_entries={}", header.partition_entries_count()));
    report.info(format!("hdr_entsz={}", header.partition_entry_size()));
}

/// Block positions of a regenerated table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Layout {
    first_usable_lba: u64,
    last_usable_lba: u64,
    last_lba: u64,
    backup_table_lba: u64,
}

impl Layout {
    fn for_disk(disk: &dyn Disk, array_size: u64) -> Result<Self, GptError> {
        let sector_size = u64::from(disk.sector_size());
        let last_byte = disk
            .disk_size()
            .checked_sub(1)
            .ok_or(GptError::DiskTooSmall)?;

        let first_usable_lba = GPT_HEADER_LBA + 1 + array_size.div_ceil(sector_size);
        let backup_table_lba = last_byte
            .checked_sub(array_size)
            .ok_or(GptError::DiskTooSmall)?
            / sector_size;
        let last_usable_lba = backup_table_lba
            .checked_sub(1)
            .ok_or(GptError::DiskTooSmall)?;

        if first_usable_lba >= last_usable_lba {
            return Err(GptError::DiskTooSmall);
        }

        Ok(Self {
            first_usable_lba,
            last_usable_lba,
            last_lba: last_byte / sector_size,
            backup_table_lba,
        })
    }
}

fn write_exact(disk: &mut dyn Disk, buf: &[u8], lba: u64) -> Result<(), GptError> {
    let offset = lba * u64::from(disk.sector_size());

    match disk.pwrite(buf, offset) {
        Ok(count) if count == buf.len() => Ok(()),
        _ => Err(GptError::WriteFailed),
    }
}

/// Writes `list` as a new primary and backup GPT, then the protective MBR.
///
/// Records with an ordinal in 1..=128 go to the matching slot, others are not written. The
/// primary copy is complete on disk before the backup is started; a failed write stops there and
/// leaves what was already written.
#[tracing::instrument(skip_all)]
pub fn write_table(
    disk: &mut dyn Disk,
    list: &PartitionList,
    options: &WriteOptions,
    guids: &mut dyn GuidSource,
    report: &mut Report,
) -> Result<(), GptError> {
    if options.read_only {
        return Ok(());
    }

    tracing::debug!(align = options.align, "alignment is not applied to GPT layouts");

    let sector_size = disk.sector_size();
    let sector_len = sector_size as usize;
    let entry_size = GPT_WRITE_ENTRY_SIZE as usize;
    let array_size = u64::from(GPT_WRITE_ENTRIES * GPT_WRITE_ENTRY_SIZE);

    let layout = Layout::for_disk(disk, array_size)?;

    let mut entries = vec![0u8; GPT_WRITE_ENTRIES as usize * entry_size];
    for partition in list.iter() {
        let Some(slot) = usize::try_from(partition.order)
            .ok()
            .filter(|order| (1..=GPT_WRITE_ENTRIES as usize).contains(order))
        else {
            continue;
        };

        let entry = GptEntry::from_record(partition, sector_size, guids);
        entries[(slot - 1) * entry_size..slot * entry_size].copy_from_slice(entry.as_bytes());
    }

    let mut header = GptHeader::new();
    header.set_lba(GPT_HEADER_LBA);
    header.set_alternate_lba(layout.last_lba);
    header.set_first_usable_lba(layout.first_usable_lba);
    header.set_last_usable_lba(layout.last_usable_lba);
    header.set_disk_guid(&guids.generate());
    header.set_partition_start_lba(GPT_HEADER_LBA + 1);
    header.set_partition_entries_count(GPT_WRITE_ENTRIES);
    header.set_partition_entry_size(GPT_WRITE_ENTRY_SIZE);
    header.seal(crc32(&entries, CRC32_SEED));

    if options.verbose {
        report.info(format!(
            "GPT: first usable LBA {}, last usable LBA {}, backup header at LBA {}",
            layout.first_usable_lba, layout.last_usable_lba, layout.last_lba
        ));
    }

    let mut sector = vec![0u8; sector_len];
    header
        .write_to_prefix(&mut sector)
        .map_err(|_| GptError::WriteFailed)?;

    write_exact(disk, &entries, header.partition_start_lba())?;
    write_exact(disk, &sector, GPT_HEADER_LBA)?;

    header.set_lba(layout.last_lba);
    header.set_alternate_lba(GPT_HEADER_LBA);
    header.set_partition_start_lba(layout.backup_table_lba);
    header.seal(header.partition_entries_checksum());

    sector.fill(0);
    header
        .write_to_prefix(&mut sector)
        .map_err(|_| GptError::WriteFailed)?;

    write_exact(disk, &entries, layout.backup_table_lba)?;
    write_exact(disk, &sector, layout.last_lba)?;

    protective::write_protective_mbr(disk, list, report).map_err(GptError::ProtectiveMbr)?;

    disk.sync()?;

    Ok(())
}

/// Returns `true` if the record has a partition type.
#[must_use]
pub fn is_part_known(partition: &PartitionRecord) -> bool {
    !guid::is_unused(&partition.type_guid)
}

/// Runs the content probes on Microsoft data and reserved partitions.
///
/// Other types are accepted as they are. Returns `false` only when a probed partition matched none
/// of the probes.
pub fn check_part(
    disk: &mut dyn Disk,
    partition: &mut PartitionRecord,
    options: &ReadOptions,
    report: &mut Report,
) -> bool {
    if partition.type_guid != guid::MS_BASIC_DATA && partition.type_guid != guid::MS_RESERVED {
        return true;
    }

    match options.probes.run(disk, partition, options.verbose) {
        Some(filesystem) => {
            partition.content = Some(filesystem);
            partition.legacy_type = filesystem.legacy_type();
            true
        }
        None => {
            report.info("No FAT, NTFS, EXT2, JFS, Reiser, cramfs or XFS marker");
            tracing::warn!(order = partition.order, "check_part failed for partition");
            false
        }
    }
}

/// Why [`add_partition`] refused a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddPartitionError {
    #[error("the ending sector is before the starting sector")]
    EmptyRange,

    #[error("a partition type is required")]
    UnknownType,

    #[error("the partition does not fit on the disk")]
    OutOfDisk,

    #[error("the partition is already listed")]
    Duplicate,
}

/// Adds a partition covering LBAs `first_lba..=last_lba` to `list`.
///
/// The new record is primary unless it conflicts with the records already listed, in which case it
/// is added as deleted. Returns the status it was given.
pub fn add_partition(
    disk: &dyn Disk,
    list: &mut PartitionList,
    first_lba: u64,
    last_lba: u64,
    type_guid: Uuid,
) -> Result<Status, AddPartitionError> {
    if last_lba < first_lba {
        return Err(AddPartitionError::EmptyRange);
    }

    if guid::is_unused(&type_guid) {
        return Err(AddPartitionError::UnknownType);
    }

    if first_lba == 0 || last_lba > disk.last_lba() {
        return Err(AddPartitionError::OutOfDisk);
    }

    let sector_size = u64::from(disk.sector_size());

    let mut partition = PartitionRecord::new(TableFormat::Gpt);
    partition.type_guid = type_guid;
    partition.legacy_type = protective::legacy_type_for(&type_guid);
    partition.offset = first_lba * sector_size;
    partition.size = (last_lba - first_lba + 1) * sector_size;

    partition.status = Status::Primary;

    let mut updated = list.clone();
    updated
        .insert(partition.clone())
        .map_err(|_| AddPartitionError::Duplicate)?;

    if structure::detect_conflicts(&updated) {
        partition.status = Status::Deleted;
    }

    let status = partition.status;
    list.insert(partition).map_err(|_| AddPartitionError::Duplicate)?;

    Ok(status)
}
