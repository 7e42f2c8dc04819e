//! Legacy view of a GPT disk.
//!
//! Tools that only understand MBR must see the disk as fully allocated, so sector 0 gets a single
//! 0xEE partition covering everything after itself. Disks laid out for Boot Camp also expose the
//! Mac, Linux and Windows partitions in slots 2 to 4 so the legacy firmware can boot them.

use uuid::Uuid;

use crate::{
    guid, mbr, mbr::MbrPartitionType, Disk, MbrError, PartitionList, PartitionRecord, Report,
    Status, TableFormat, WriteOptions,
};

static LEGACY_HINTS: &[(Uuid, MbrPartitionType)] = &[
    (guid::MAC_HFS, MbrPartitionType::MacOSXHFS),
    (guid::LINUX_DATA, MbrPartitionType::LinuxNative),
    (guid::LINUX_RAID, MbrPartitionType::LinuxNative),
    (guid::LINUX_SWAP, MbrPartitionType::LinuxSwap),
    (guid::LINUX_LVM, MbrPartitionType::LinuxLVM),
    (guid::EFI_SYSTEM, MbrPartitionType::EFI),
];

/// System id a legacy table would use for a GPT partition type.
#[must_use]
pub fn legacy_type_for(type_guid: &Uuid) -> MbrPartitionType {
    LEGACY_HINTS
        .iter()
        .find(|(known, _)| known == type_guid)
        .map_or(MbrPartitionType::Empty, |&(_, legacy_type)| legacy_type)
}

fn protective_entry(offset: u64, size: u64) -> PartitionRecord {
    let mut part = PartitionRecord::new(TableFormat::I386);
    part.order = 1;
    part.legacy_type = MbrPartitionType::GPT;
    part.offset = offset;
    part.size = size;
    part.status = Status::Primary;
    part
}

fn legacy_copy(part: &PartitionRecord, order: u32) -> PartitionRecord {
    let mut copy = part.clone();
    copy.format = TableFormat::I386;
    copy.order = order;
    copy.status = Status::Primary;
    copy
}

/// Legacy records describing `list` on `disk`.
#[must_use]
pub fn protective_layout(disk: &dyn Disk, list: &PartitionList) -> PartitionList {
    let sector_size = u64::from(disk.sector_size());
    let disk_size = disk.disk_size();

    let mut mac = None;
    let mut linux = None;
    let mut windows = None;

    for part in list {
        if mac.is_none() && part.legacy_type == MbrPartitionType::MacOSXHFS {
            mac = Some(part);
        } else if linux.is_none() && part.legacy_type == MbrPartitionType::LinuxNative {
            linux = Some(part);
        } else if windows.is_none() && part.legacy_type == MbrPartitionType::NTFS {
            windows = Some(part);
        }
    }

    let mut layout = PartitionList::new();

    let Some(mac) = mac.filter(|_| linux.is_some() || windows.is_some()) else {
        layout.push(protective_entry(
            sector_size,
            disk_size.saturating_sub(sector_size),
        ));
        return layout;
    };

    let mut efi_end = disk_size;
    for (order, part) in [(2, Some(mac)), (3, linux), (4, windows)] {
        if let Some(part) = part {
            layout.push(legacy_copy(part, order));
            efi_end = efi_end.min(part.offset);
        }
    }

    layout.push(protective_entry(
        sector_size,
        efi_end.saturating_sub(sector_size),
    ));

    layout
}

/// Writes the protective MBR for `list` to sector 0.
pub fn write_protective_mbr(
    disk: &mut dyn Disk,
    list: &PartitionList,
    report: &mut Report,
) -> Result<(), MbrError> {
    let layout = protective_layout(disk, list);

    mbr::write_table(disk, &layout, &WriteOptions::new(), report)
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use crate::{
        guid, mbr::MbrPartitionType, testing::mem_disk, PartitionList, PartitionRecord, Status,
        TableFormat,
    };

    use super::{legacy_type_for, protective_layout};

    const MIB: u64 = 1 << 20;

    fn gpt_record(legacy_type: MbrPartitionType, offset: u64, size: u64) -> PartitionRecord {
        let mut part = PartitionRecord::new(TableFormat::Gpt);
        part.type_guid = guid::MS_BASIC_DATA;
        part.legacy_type = legacy_type;
        part.offset = offset;
        part.size = size;
        part
    }

    fn slots(layout: &PartitionList) -> Vec<(u32, u8, u64, u64)> {
        let mut slots: Vec<_> = layout
            .iter()
            .map(|p| (p.order, u8::from(p.legacy_type), p.offset, p.size))
            .collect();
        slots.sort_unstable();
        slots
    }

    #[test]
    pub fn default_layout_covers_the_disk() {
        let disk = mem_disk(64 * MIB as usize, 512);

        let mut list = PartitionList::new();
        list.insert(gpt_record(MbrPartitionType::LinuxNative, MIB, 8 * MIB))
            .unwrap();

        let layout = protective_layout(&disk, &list);
        assert_eq!(slots(&layout), [(1, 0xEE, 512, 64 * MIB - 512)]);
        assert!(layout.iter().all(|p| p.status == Status::Primary));
    }

    #[test]
    pub fn mac_alone_keeps_default_layout() {
        let disk = mem_disk(64 * MIB as usize, 512);

        let mut list = PartitionList::new();
        list.insert(gpt_record(MbrPartitionType::MacOSXHFS, MIB, 8 * MIB))
            .unwrap();

        assert_eq!(slots(&protective_layout(&disk, &list)).len(), 1);
    }

    #[test]
    pub fn dual_boot_layout() {
        let disk = mem_disk(64 * MIB as usize, 512);

        let mut list = PartitionList::new();
        list.insert(gpt_record(MbrPartitionType::EFI, 20 * 512, 200 * 512))
            .unwrap();
        list.insert(gpt_record(MbrPartitionType::MacOSXHFS, 4 * MIB, 20 * MIB))
            .unwrap();
        list.insert(gpt_record(MbrPartitionType::NTFS, 40 * MIB, 20 * MIB))
            .unwrap();
        list.insert(gpt_record(MbrPartitionType::LinuxNative, 24 * MIB, 16 * MIB))
            .unwrap();
        list.insert(gpt_record(MbrPartitionType::LinuxNative, 60 * MIB, MIB))
            .unwrap();

        let layout = protective_layout(&disk, &list);
        assert_eq!(
            slots(&layout),
            [
                (1, 0xEE, 512, 4 * MIB - 512),
                (2, 0xAF, 4 * MIB, 20 * MIB),
                (3, 0x83, 24 * MIB, 16 * MIB),
                (4, 0x07, 40 * MIB, 20 * MIB),
            ]
        );
        assert!(layout
            .iter()
            .all(|p| p.format == TableFormat::I386 && p.status == Status::Primary));
    }

    #[test]
    pub fn dual_boot_layout_without_linux() {
        let disk = mem_disk(64 * MIB as usize, 512);

        let mut list = PartitionList::new();
        list.insert(gpt_record(MbrPartitionType::MacOSXHFS, 8 * MIB, 20 * MIB))
            .unwrap();
        list.insert(gpt_record(MbrPartitionType::NTFS, 30 * MIB, 20 * MIB))
            .unwrap();

        assert_eq!(
            slots(&protective_layout(&disk, &list)),
            [
                (1, 0xEE, 512, 8 * MIB - 512),
                (2, 0xAF, 8 * MIB, 20 * MIB),
                (4, 0x07, 30 * MIB, 20 * MIB),
            ]
        );
    }

    #[test]
    pub fn legacy_hints_from_type_guids() {
        assert_eq!(legacy_type_for(&guid::MAC_HFS), MbrPartitionType::MacOSXHFS);
        assert_eq!(legacy_type_for(&guid::LINUX_DATA), MbrPartitionType::LinuxNative);
        assert_eq!(legacy_type_for(&guid::EFI_SYSTEM), MbrPartitionType::EFI);
        assert_eq!(legacy_type_for(&guid::MS_BASIC_DATA), MbrPartitionType::Empty);
    }
}
