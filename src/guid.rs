//! GUIDs as stored in GPT structures, and the table of well-known partition types.
//!
//! GPT stores GUIDs in the mixed-endian EFI layout: the first three groups are little-endian, the
//! last two are kept in byte order. [`from_disk`] and [`to_disk`] convert between that layout and
//! [`Uuid`], so comparing and copying identifiers is plain `==` and `Copy` on the decoded value.

use uuid::{uuid, Uuid};

/// Type GUID of an unused entry. Never part of the type table.
pub const UNUSED: Uuid = Uuid::nil();

pub const EFI_SYSTEM: Uuid = uuid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b");
pub const MBR: Uuid = uuid!("024dee41-33e7-11d3-9d69-0008c781f39f");
pub const FREEBSD: Uuid = uuid!("516e7cb4-6ecf-11d6-8ff8-00022d09712b");
pub const FREEBSD_SWAP: Uuid = uuid!("516e7cb5-6ecf-11d6-8ff8-00022d09712b");
pub const FREEBSD_UFS: Uuid = uuid!("516e7cb6-6ecf-11d6-8ff8-00022d09712b");
pub const FREEBSD_VINUM: Uuid = uuid!("516e7cb8-6ecf-11d6-8ff8-00022d09712b");
pub const MS_RESERVED: Uuid = uuid!("e3c9e316-0b5c-4db8-817d-f92df00215ae");
pub const MS_BASIC_DATA: Uuid = uuid!("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7");
pub const MS_LDM_METADATA: Uuid = uuid!("5808c8aa-7e8f-42e0-85d2-e1e90434cfb3");
pub const MS_LDM_DATA: Uuid = uuid!("af9b60a0-1431-4f62-bc68-3311714a69ad");
pub const LINUX_DATA: Uuid = uuid!("0fc63daf-8483-4772-8e79-3d69d8477de4");
pub const LINUX_RAID: Uuid = uuid!("a19d880f-05fc-4d3b-a006-743f0f84911e");
pub const LINUX_SWAP: Uuid = uuid!("0657fd6d-a4ab-43c4-84e5-0933c84b4f4f");
pub const LINUX_LVM: Uuid = uuid!("e6d6d379-f507-44c2-a23c-238f2a3df928");
pub const LINUX_RESERVED: Uuid = uuid!("8da63339-0007-60c0-c436-083ac8230908");
pub const HPUX_DATA: Uuid = uuid!("75894c1e-3aeb-11d3-b7c1-7b03a0000000");
pub const HPUX_SERVICE: Uuid = uuid!("e2a1e728-32e3-11d6-a682-7b03a0000000");
pub const MAC_HFS: Uuid = uuid!("48465300-0000-11aa-aa11-00306543ecac");
pub const MAC_UFS: Uuid = uuid!("55465300-0000-11aa-aa11-00306543ecac");
pub const MAC_RAID: Uuid = uuid!("52414944-0000-11aa-aa11-00306543ecac");
pub const MAC_RAID_OFFLINE: Uuid = uuid!("52414944-5f4f-11aa-aa11-00306543ecac");
pub const MAC_BOOT: Uuid = uuid!("426f6f74-0000-11aa-aa11-00306543ecac");
pub const MAC_LABEL: Uuid = uuid!("4c616265-6c00-11aa-aa11-00306543ecac");
pub const MAC_TV_RECOVERY: Uuid = uuid!("5265636f-7665-11aa-aa11-00306543ecac");
pub const SOLARIS_BOOT: Uuid = uuid!("6a82cb45-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_ROOT: Uuid = uuid!("6a85cf4d-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_SWAP: Uuid = uuid!("6a87c46f-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_BACKUP: Uuid = uuid!("6a8b642b-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_USR: Uuid = uuid!("6a898cc3-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_VAR: Uuid = uuid!("6a8ef2e9-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_HOME: Uuid = uuid!("6a90ba39-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_EFI_ALTSCTR: Uuid = uuid!("6a9283a5-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_RESERVED1: Uuid = uuid!("6a945a3b-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_RESERVED2: Uuid = uuid!("6a9630d1-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_RESERVED3: Uuid = uuid!("6a980767-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_RESERVED4: Uuid = uuid!("6a96237f-1dd2-11b2-99a6-080020736631");
pub const SOLARIS_RESERVED5: Uuid = uuid!("6a8d2ac7-1dd2-11b2-99a6-080020736631");

static GPT_TYPES: &[(Uuid, &str)] = &[
    (EFI_SYSTEM, "EFI System"),
    (MBR, "MBR"),
    (FREEBSD, "FreeBSD"),
    (FREEBSD_SWAP, "FreeBSD Swap"),
    (FREEBSD_UFS, "FreeBSD UFS"),
    (FREEBSD_VINUM, "FreeBSD Vinum"),
    (MS_RESERVED, "MS Reserved"),
    (MS_BASIC_DATA, "MS Data"),
    (MS_LDM_METADATA, "MS LDM MetaData"),
    (MS_LDM_DATA, "MS LDM Data"),
    (LINUX_DATA, "Linux Data"),
    (LINUX_RAID, "Linux Raid"),
    (LINUX_SWAP, "Linux Swap"),
    (LINUX_LVM, "Linux LVM"),
    (LINUX_RESERVED, "Linux Reserved"),
    (HPUX_DATA, "HPUX Data"),
    (HPUX_SERVICE, "HPUX Service"),
    (MAC_HFS, "Mac HFS"),
    (MAC_UFS, "Mac UFS"),
    (MAC_RAID, "Mac Raid"),
    (MAC_RAID_OFFLINE, "Mac Raid (Offline)"),
    (MAC_BOOT, "Mac Boot"),
    (MAC_LABEL, "Mac Label"),
    (MAC_TV_RECOVERY, "Mac TV Recovery"),
    (SOLARIS_BOOT, "Solaris /boot"),
    (SOLARIS_ROOT, "Solaris /"),
    (SOLARIS_SWAP, "Solaris Swap"),
    (SOLARIS_BACKUP, "Solaris Backup"),
    (SOLARIS_USR, "Solaris /usr"),
    (SOLARIS_VAR, "Solaris /var"),
    (SOLARIS_HOME, "Solaris /home"),
    (SOLARIS_EFI_ALTSCTR, "Solaris EFI Alt."),
    (SOLARIS_RESERVED1, "Solaris Reserved1"),
    (SOLARIS_RESERVED2, "Solaris Reserved2"),
    (SOLARIS_RESERVED3, "Solaris Reserved3"),
    (SOLARIS_RESERVED4, "Solaris Reserved4"),
    (SOLARIS_RESERVED5, "Solaris Reserved5"),
];

/// Decodes a GUID from its 16 on-disk bytes.
#[must_use]
pub fn from_disk(bytes: [u8; 16]) -> Uuid {
    Uuid::from_bytes_le(bytes)
}

/// Encodes a GUID into its 16 on-disk bytes.
#[must_use]
pub fn to_disk(guid: &Uuid) -> [u8; 16] {
    guid.to_bytes_le()
}

#[must_use]
pub fn is_unused(guid: &Uuid) -> bool {
    guid.is_nil()
}

/// Human-readable name of a partition type GUID, if it is a known one.
///
/// # Examples
///
/// ```
/// use gptrescue::guid;
///
/// assert_eq!(guid::lookup_type_name(&guid::MS_BASIC_DATA), Some("MS Data"));
/// assert_eq!(guid::lookup_type_name(&guid::UNUSED), None);
/// ```
#[must_use]
pub fn lookup_type_name(type_guid: &Uuid) -> Option<&'static str> {
    GPT_TYPES
        .iter()
        .find(|(known, _)| known == type_guid)
        .map(|&(_, name)| name)
}

/// Every known partition type, in display order.
#[must_use]
pub fn known_types() -> &'static [(Uuid, &'static str)] {
    GPT_TYPES
}

/// Source of fresh identifiers for disks and partitions.
pub trait GuidSource {
    fn generate(&mut self) -> Uuid;
}

/// Random (version 4) identifiers from the platform generator.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomGuids;

#[cfg(feature = "std")]
impl GuidSource for RandomGuids {
    fn generate(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn guid_disk_layout_is_mixed_endian() {
        let raw = [
            0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11, 0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e,
            0xc9, 0x3b,
        ];

        assert_eq!(from_disk(raw), EFI_SYSTEM);
        assert_eq!(to_disk(&EFI_SYSTEM), raw);
    }

    #[test]
    pub fn type_table_lookup() {
        assert_eq!(lookup_type_name(&EFI_SYSTEM), Some("EFI System"));
        assert_eq!(lookup_type_name(&MAC_HFS), Some("Mac HFS"));
        assert_eq!(lookup_type_name(&SOLARIS_RESERVED5), Some("Solaris Reserved5"));
        assert_eq!(lookup_type_name(&Uuid::from_u128(0x1234)), None);
    }

    #[test]
    pub fn unused_sentinel_is_not_a_type() {
        assert!(is_unused(&UNUSED));
        assert!(lookup_type_name(&UNUSED).is_none());
        assert!(known_types().iter().all(|(guid, _)| !is_unused(guid)));
    }
}
