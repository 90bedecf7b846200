//! Public, C-ABI-friendly surface over [`crate::fat`]: the shell and the VM
//! syscall layer both go through here rather than touching the entry table
//! directly.

use crate::fat::{self, ListEntry, OpenMode, SeekFrom as FatSeekFrom, VfsError, VfsHandle, VfsResult};

pub const FS_TYPE_UNKNOWN: u8 = 0;
pub const FS_TYPE_DIRECTORY: u8 = 1;
pub const FS_TYPE_FILE: u8 = 2;

pub const USER_PATH_MAX: usize = fat::MAX_PATH;
pub const USER_NAME_MAX: usize = fat::MAX_NAME;

pub const USER_FS_OPEN_CREAT: u32 = 1 << 0;
pub const USER_FS_OPEN_APPEND: u32 = 1 << 1;

#[derive(Clone, Copy)]
#[repr(C)]
pub struct UserFsEntry {
    pub name: [u8; USER_NAME_MAX],
    pub type_: u8,
    pub size: u32,
}

impl UserFsEntry {
    pub fn new() -> Self {
        Self {
            name: [0; USER_NAME_MAX],
            type_: FS_TYPE_UNKNOWN,
            size: 0,
        }
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

fn attr_to_type(attr: u8) -> u8 {
    if attr == fat::ATTR_DIRECTORY {
        FS_TYPE_DIRECTORY
    } else {
        FS_TYPE_FILE
    }
}

/// Brings the filesystem up; idempotent.
pub fn vfs_init() -> VfsResult<()> {
    fat::fs_init()
}

pub fn vfs_is_initialized() -> bool {
    fat::is_initialized()
}

pub struct OpenHandle(VfsHandle);

impl OpenHandle {
    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        fat::read(&mut self.0, buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        fat::write(&mut self.0, buf)
    }

    pub fn seek(&mut self, offset: i64, whence: SeekWhence) -> VfsResult<u32> {
        let from = match whence {
            SeekWhence::Start => FatSeekFrom::Start,
            SeekWhence::Current => FatSeekFrom::Current,
            SeekWhence::End => FatSeekFrom::End,
        };
        fat::seek(&mut self.0, offset, from)
    }

    pub fn size(&self) -> u32 {
        self.0.size()
    }

    pub fn position(&self) -> u32 {
        self.0.position()
    }
}

#[derive(Clone, Copy)]
pub enum SeekWhence {
    Start,
    Current,
    End,
}

/// Opens `path`. `create` requests write-mode creation semantics (truncate
/// if the file already exists); pass `false` for a plain read-only open.
pub fn vfs_open(path: &[u8], create: bool) -> VfsResult<OpenHandle> {
    let mode = if create { OpenMode::Write } else { OpenMode::Read };
    fat::open(path, mode).map(OpenHandle)
}

pub fn vfs_open_mode(path: &[u8], mode: OpenMode) -> VfsResult<OpenHandle> {
    fat::open(path, mode).map(OpenHandle)
}

pub fn vfs_stat(path: &[u8]) -> VfsResult<(u8, u32)> {
    fat::stat(path).map(|(attr, size)| (attr_to_type(attr), size))
}

pub fn vfs_mkdir(path: &[u8]) -> VfsResult<()> {
    fat::mkdir(path)
}

pub fn vfs_rmdir(path: &[u8]) -> VfsResult<()> {
    fat::rmdir(path)
}

pub fn vfs_unlink(path: &[u8]) -> VfsResult<()> {
    fat::delete(path)
}

pub fn vfs_exists(path: &[u8]) -> bool {
    fat::exists(path)
}

pub fn vfs_is_directory(path: &[u8]) -> VfsResult<bool> {
    fat::is_directory(path)
}

pub fn vfs_list(path: &[u8], out: &mut [UserFsEntry]) -> VfsResult<usize> {
    let mut scratch: [ListEntry; 32] = core::array::from_fn(|_| ListEntry {
        name: [0; fat::MAX_NAME],
        name_len: 0,
        attr: fat::ATTR_FILE,
        size: 0,
    });
    let cap = out.len().min(scratch.len());
    let count = fat::list_directory(path, &mut scratch[..cap])?;
    for i in 0..count {
        let mut entry = UserFsEntry::new();
        let name = scratch[i].name();
        let n = name.len().min(entry.name.len());
        entry.name[..n].copy_from_slice(&name[..n]);
        entry.type_ = attr_to_type(scratch[i].attr);
        entry.size = scratch[i].size;
        out[i] = entry;
    }
    Ok(count)
}

pub fn vfs_chdir(path: &[u8]) -> VfsResult<()> {
    fat::chdir(path)
}

pub fn vfs_get_current_dir(out: &mut [u8]) -> usize {
    fat::get_current_dir(out)
}

/// Translates a [`VfsError`] into the boolean/null surface the shell and the
/// VM syscall layer present to their own callers.
pub fn is_out_of_space(err: VfsError) -> bool {
    matches!(err, VfsError::OutOfSpace | VfsError::TableFull)
}
