//! Durable storage: the block-filesystem seam plus everything persisted on it
//!
//! The device keeps three kinds of files on its internal flash filesystem:
//!
//! - `/sys_config.bin`: postcard-encoded [`crate::config::SystemConfig`]
//! - `/fusion_state.bin`: the fusion engine's fixed-size calibration blob
//! - `/log_NNN.csv`: append-only telemetry recordings
//!
//! Filesystem operations are synchronous and blocking. Open files are scoped
//! handles: dropping one closes it, so every exit path releases the file.

pub mod calibration;
pub mod telemetry;

use alloc::vec::Vec;
use core::fmt::Write;

use crate::error::StorageError;

/// Longest file name (including the leading slash) the core ever produces.
pub const MAX_NAME_LEN: usize = 32;

pub const CONFIG_FILE: &str = "/sys_config.bin";
pub const CALIBRATION_FILE: &str = "/fusion_state.bin";

/// Extension of telemetry recordings.
pub const LOG_EXTENSION: &str = ".csv";

pub type FileName = heapless::String<MAX_NAME_LEN>;

/// How a file is opened. Writes never seek; append mode always writes at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWriteCreateOrTruncate,
    ReadWriteCreateOrAppend,
}

/// An open file handle. Closed when dropped.
pub trait StorageFile {
    /// Read up to `buf.len()` bytes, returning how many were read (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write the whole slice.
    fn write(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Current length of the file in bytes.
    fn length(&self) -> u32;
}

/// Directory entry returned by [`Storage::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: FileName,
    pub size: u32,
}

/// Block-filesystem abstraction over the device's flash.
pub trait Storage {
    type File<'a>: StorageFile
    where
        Self: 'a;

    fn exists(&mut self, name: &str) -> bool;

    fn open(&mut self, name: &str, mode: Mode) -> Result<Self::File<'_>, StorageError>;

    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    fn list_files(&mut self, dir: &str) -> Result<Vec<FileInfo>, StorageError>;
}

/// Replace the contents of `name` with `data`.
pub fn write_file<S: Storage>(storage: &mut S, name: &str, data: &[u8]) -> Result<(), StorageError> {
    let mut file = storage.open(name, Mode::ReadWriteCreateOrTruncate)?;
    file.write(data)
}

/// Read `name` into `buf`, returning the number of bytes read.
///
/// Stops at EOF or when `buf` is full, whichever comes first.
pub fn read_file<S: Storage>(
    storage: &mut S,
    name: &str,
    buf: &mut [u8],
) -> Result<usize, StorageError> {
    let mut file = storage.open(name, Mode::ReadOnly)?;
    read_into(&mut file, buf)
}

/// Fill `buf` from an open file, returning the number of bytes read.
pub fn read_into<F: StorageFile>(file: &mut F, buf: &mut [u8]) -> Result<usize, StorageError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Name of the telemetry recording with the given index, e.g. `/log_007.csv`.
pub fn log_file_name(index: u32) -> FileName {
    let mut name = FileName::new();
    // "/log_" + at most 10 digits + ".csv" always fits in 32 bytes
    write!(&mut name, "/log_{:03}{}", index, LOG_EXTENSION).ok();
    name
}

/// True for names the remote endpoint may list or delete: a bare `.csv`
/// file in the root directory.
pub fn is_recording_name(name: &str) -> bool {
    let bare = name.strip_prefix('/').unwrap_or(name);
    !bare.is_empty()
        && bare.ends_with(LOG_EXTENSION)
        && bare.len() > LOG_EXTENSION.len()
        && !bare.contains('/')
        && !bare.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStorage;

    #[test]
    fn test_log_file_name_is_zero_padded() {
        assert_eq!(log_file_name(7).as_str(), "/log_007.csv");
        assert_eq!(log_file_name(1234).as_str(), "/log_1234.csv");
    }

    #[test]
    fn test_recording_name_filter() {
        assert!(is_recording_name("/log_001.csv"));
        assert!(is_recording_name("log_001.csv"));
        assert!(!is_recording_name("/sys_config.bin"));
        assert!(!is_recording_name("/../etc/x.csv"));
        assert!(!is_recording_name("/sub/x.csv"));
        assert!(!is_recording_name("/.csv"));
    }

    #[test]
    fn test_write_then_read_file() {
        let mut storage = MemStorage::default();
        write_file(&mut storage, "/a.bin", &[1, 2, 3]).unwrap();
        write_file(&mut storage, "/a.bin", &[9]).unwrap();

        let mut buf = [0u8; 8];
        let n = read_file(&mut storage, "/a.bin", &mut buf).unwrap();
        assert_eq!(&buf[..n], &[9]);
        assert_eq!(
            read_file(&mut storage, "/missing", &mut buf),
            Err(StorageError::NotFound)
        );
    }
}
