//! Sector access to the device being inspected.
//!
//! Every table operation goes through the [`Disk`] capability. [`StreamDisk`] provides it for any
//! seekable stream, such as a disk image file or an in-memory buffer.

use crate::{DiskRead, DiskSeek, DiskWrite, IoError, SeekFrom};

/// Random access to a block device.
///
/// Reads and writes may be short: the returned count is the number of bytes actually transferred,
/// and callers decide whether a short transfer is fatal.
pub trait Disk {
    /// Size of a logical block, in bytes. Every LBA to byte conversion uses it.
    fn sector_size(&self) -> u32;

    /// Size of the device, in bytes.
    fn disk_size(&self) -> u64;

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, IoError>;

    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, IoError>;

    fn sync(&mut self) -> Result<(), IoError>;

    /// Index of the last addressable logical block.
    fn last_lba(&self) -> u64 {
        self.disk_size().saturating_sub(1) / u64::from(self.sector_size())
    }
}

/// [`Disk`] backed by a seekable stream.
///
/// The device size is taken from the stream length when the disk is created; transfers never go
/// past it.
pub struct StreamDisk<D> {
    device_mapping: D,
    sector_size: u32,
    disk_size: u64,
}

impl<D> StreamDisk<D>
where
    D: DiskRead + DiskWrite + DiskSeek,
{
    pub fn new(mut device_mapping: D, sector_size: u32) -> Result<Self, IoError> {
        let disk_size = device_mapping
            .seek(SeekFrom::End(0))
            .map_err(|_| IoError::Seek)?;

        Ok(Self {
            device_mapping,
            sector_size,
            disk_size,
        })
    }

    pub fn into_inner(self) -> D {
        self.device_mapping
    }

    fn clamp(&self, len: usize, offset: u64) -> usize {
        let remaining = self.disk_size.saturating_sub(offset);

        usize::try_from(remaining).map_or(len, |remaining| len.min(remaining))
    }
}

impl<D> Disk for StreamDisk<D>
where
    D: DiskRead + DiskWrite + DiskSeek,
{
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn disk_size(&self) -> u64 {
        self.disk_size
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, IoError> {
        let len = self.clamp(buf.len(), offset);
        if len == 0 {
            return Ok(0);
        }

        self.device_mapping
            .seek(SeekFrom::Start(offset))
            .map_err(|_| IoError::Seek)?;

        let mut bytes_read = 0;
        while bytes_read < len {
            let count = self
                .device_mapping
                .read(&mut buf[bytes_read..len])
                .map_err(|_| IoError::Read)?;

            if count == 0 {
                break;
            }

            bytes_read += count;
        }

        Ok(bytes_read)
    }

    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize, IoError> {
        let len = self.clamp(buf.len(), offset);
        if len == 0 {
            return Ok(0);
        }

        self.device_mapping
            .seek(SeekFrom::Start(offset))
            .map_err(|_| IoError::Seek)?;

        let mut bytes_written = 0;
        while bytes_written < len {
            let count = self
                .device_mapping
                .write(&buf[bytes_written..len])
                .map_err(|_| IoError::Write)?;

            if count == 0 {
                break;
            }

            bytes_written += count;
        }

        Ok(bytes_written)
    }

    fn sync(&mut self) -> Result<(), IoError> {
        self.device_mapping.flush().map_err(|_| IoError::Flush)
    }
}
