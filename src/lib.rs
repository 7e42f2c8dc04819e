//! GUID Partition Table detection, validation and regeneration for partition recovery.
//!
//! The crate reads a GPT header and its entry array from an injected [`Disk`], turns the in-use
//! entries into a [`PartitionList`], checks that list for structural conflicts and writes it back
//! as a primary/backup GPT pair plus a protective MBR.
//!
//! ```
//! use std::io::Cursor;
//!
//! use gptrescue::{gpt, guid, PartitionList, PartitionRecord, RandomGuids, Report, StreamDisk};
//! use gptrescue::{ReadOptions, Status, TableFormat, WriteOptions};
//!
//! let mut disk = StreamDisk::new(Cursor::new(vec![0u8; 8 << 20]), 512).unwrap();
//! let mut report = Report::new();
//!
//! let mut list = PartitionList::new();
//! let mut part = PartitionRecord::new(TableFormat::Gpt);
//! part.type_guid = guid::LINUX_DATA;
//! part.offset = 1 << 20;
//! part.size = 4 << 20;
//! part.status = Status::Primary;
//! list.insert(part).unwrap();
//! gptrescue::structure::assign_order(&mut list);
//!
//! gpt::write_table(&mut disk, &list, &WriteOptions::new(), &mut RandomGuids, &mut report).unwrap();
//!
//! let found = gpt::read_table(&mut disk, &ReadOptions::new(), &mut report).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

#![no_std]

#[macro_use]
extern crate static_assertions;

mod crc;
pub mod disk;
pub mod gpt;
pub mod guid;
pub mod mbr;
pub mod options;
pub mod partition;
pub mod probe;
pub mod report;
pub mod structure;

pub use crc::{crc32, CRC32_SEED};
pub use disk::{Disk, StreamDisk};
pub use gpt::{GptEntry, GptError, GptHeader, HeaderFault};
#[cfg(feature = "std")]
pub use guid::RandomGuids;
pub use guid::GuidSource;
pub use mbr::{Mbr, MbrError, MbrPartition};
pub use options::{ReadOptions, WriteOptions};
pub use partition::{PartitionList, PartitionRecord, Status, TableFormat};
pub use probe::{ContentProbe, Filesystem, ProbeChain};
pub use report::{Diagnostic, Report, Severity};

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
pub use std::io::Read as DiskRead;

#[cfg(feature = "std")]
pub use std::io::Write as DiskWrite;

#[cfg(feature = "std")]
pub use std::io::Seek as DiskSeek;

#[cfg(feature = "std")]
pub use std::io::SeekFrom;

/// Failure reported by the underlying device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("device seek failed")]
    Seek,
    #[error("device read failed")]
    Read,
    #[error("device write failed")]
    Write,
    #[error("device flush failed")]
    Flush,
}

/// Error returned by the format-independent [`TableFormat`] entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Gpt(#[from] GptError),
    #[error(transparent)]
    Mbr(#[from] MbrError),
}

#[cfg(not(feature = "std"))]
pub trait DiskRead {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;
}

#[cfg(not(feature = "std"))]
pub trait DiskWrite {
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError>;

    fn flush(&mut self) -> Result<(), IoError>;
}

#[cfg(not(feature = "std"))]
pub enum SeekFrom {
    Start(u64),
    End(i64),
    Current(i64),
}

#[cfg(not(feature = "std"))]
pub trait DiskSeek {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, IoError>;
}

macro_rules! le_field_accessors {
    ($field:ident, $type:ty) => {
        #[must_use]
        pub fn $field(&self) -> $type {
            self.$field.get()
        }
    };
    ($field:ident, $field_setter:ident, $type:ty) => {
        #[must_use]
        pub fn $field(&self) -> $type {
            self.$field.get()
        }

        pub fn $field_setter(&mut self, value: $type) {
            self.$field.set(value)
        }
    };
}

pub(crate) use le_field_accessors;

#[cfg(test)]
pub(crate) mod testing {
    use std::{io::Cursor, vec, vec::Vec};

    use uuid::Uuid;

    use crate::{Disk, GuidSource, IoError, StreamDisk};

    pub type MemDisk = StreamDisk<Cursor<Vec<u8>>>;

    pub fn mem_disk(size: usize, sector_size: u32) -> MemDisk {
        StreamDisk::new(Cursor::new(vec![0u8; size]), sector_size).unwrap()
    }

    /// Deterministic GUIDs: 1, 2, 3, ...
    #[derive(Default)]
    pub struct SequentialGuids(pub u128);

    impl GuidSource for SequentialGuids {
        fn generate(&mut self) -> Uuid {
            self.0 += 1;
            Uuid::from_u128(self.0)
        }
    }

    /// Wraps a disk and keeps track of every write, failing once `budget` writes are spent.
    pub struct RecordingDisk<D> {
        pub inner: D,
        pub writes: Vec<(u64, usize)>,
        pub budget: Option<usize>,
        pub synced: bool,
    }

    impl<D: Disk> RecordingDisk<D> {
        pub fn new(inner: D) -> Self {
            Self {
                inner,
                writes: Vec::new(),
                budget: None,
                synced: false,
            }
        }

        pub fn failing_after(inner: D, budget: usize) -> Self {
            Self {
                budget: Some(budget),
                ..Self::new(inner)
            }
        }
    }

    impl<D: Disk> Disk for RecordingDisk<D> {
        fn sector_size(&self) -> u32 {
            self.inner.sector_size()
        }

        fn disk_size(&self) -> u64 {
            self.inner.disk_size()
        }

        fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, IoError> {
            self.inner.pread(buf, offset)
        }

        fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, IoError> {
            if self.budget == Some(self.writes.len()) {
                return Ok(0);
            }

            self.writes.push((offset, buf.len()));
            self.inner.pwrite(buf, offset)
        }

        fn sync(&mut self) -> Result<(), IoError> {
            self.synced = true;
            self.inner.sync()
        }
    }
}
