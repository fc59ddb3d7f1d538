//! File base device.
//!
//! Wraps `std::fs::File` behind the device interface. Mode flags map
//! onto `OpenOptions` the way fopen modes map onto `O_*` bits: `w`
//! creates and truncates, `a` creates and appends, `x` with `w`
//! requests exclusive creation.

use std::fs::{File, OpenOptions};
use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::path::Path;

use crate::device::{parse_mode, Backend, Device, Mode, Whence};
use crate::errno::{Errno, Result};

/// File-descriptor backend.
#[derive(Debug)]
pub struct FileStream {
    file: File,
}

impl FileStream {
    /// Open `path` with fopen-style `mode_str`.
    pub fn open(path: &Path, mode_str: &str) -> Result<Device<FileStream>> {
        let mode = parse_mode(mode_str)?;
        let file = open_options(&mode)
            .open(path)
            .map_err(|e| Errno::from_io(&e))?;
        Ok(Device::with_mode(FileStream { file }, mode))
    }

    /// Wrap an already-open file.
    pub fn from_file(file: File, mode_str: &str) -> Result<Device<FileStream>> {
        Ok(Device::with_mode(FileStream { file }, parse_mode(mode_str)?))
    }
}

fn open_options(mode: &Mode) -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.read(mode.readable).write(mode.writable);
    if mode.append {
        opts.append(true);
    }
    if mode.truncate {
        opts.truncate(true);
    }
    if mode.create {
        if mode.exclusive {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    opts
}

impl Backend for FileStream {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Errno::from_io(&e)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.file.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Errno::from_io_or(&e, Errno::WriteFault)),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| Errno::from_io_or(&e, Errno::WriteFault))
    }

    fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Start => {
                if off < 0 {
                    return Err(Errno::InvalidArgument);
                }
                SeekFrom::Start(off as u64)
            }
            Whence::Current => SeekFrom::Current(off),
            Whence::End => SeekFrom::End(off),
        };
        self.file
            .seek(target)
            .map_err(|e| Errno::from_io_or(&e, Errno::NotSeekable))
    }

    fn tell(&mut self) -> Result<u64> {
        self.file
            .stream_position()
            .map_err(|e| Errno::from_io_or(&e, Errno::NotSeekable))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
