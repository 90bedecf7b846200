//! Flat, path-keyed filesystem backed by an in-memory FAT-shaped cluster
//! chain. Directory entries live in their own table rather than as on-disk
//! 32-byte records; the FAT array only tracks cluster-to-cluster links.
//!
//! Cluster 0 is the reserved media descriptor, cluster 1 the end-of-chain
//! marker, cluster 2 the root directory. Both the entry table and the
//! cluster pool are guarded by a single `IrqMutex`: callers must not touch
//! either from interrupt context.

#![allow(dead_code)]

use drift_lib::IrqMutex;

use crate::blockdev::{BlockDevice, MemoryBlockDevice};

pub const CLUSTER_SIZE: usize = 4096;
pub const MAX_CLUSTERS: usize = 1024;
pub const MAX_ENTRIES: usize = 256;
pub const MAX_PATH: usize = 256;
pub const MAX_NAME: usize = 64;

pub const CLUSTER_MEDIA_DESCRIPTOR: u32 = 0;
pub const CLUSTER_EOC: u32 = 1;
pub const CLUSTER_ROOT: u32 = 2;

pub const ATTR_FILE: u8 = 0;
pub const ATTR_DIRECTORY: u8 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VfsError {
    NotFound,
    AlreadyExists,
    NotDirectory,
    IsDirectory,
    InvalidPath,
    OutOfSpace,
    TableFull,
    InvalidArgument,
    NotInitialized,
}

pub type VfsResult<T> = Result<T, VfsError>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekFrom {
    Start,
    Current,
    End,
}

#[derive(Clone, Copy)]
struct DirEntry {
    in_use: bool,
    attr: u8,
    path_len: u16,
    path: [u8; MAX_PATH],
    name_len: u16,
    name: [u8; MAX_NAME],
    parent_len: u16,
    parent: [u8; MAX_PATH],
    first_cluster: u32,
    size: u32,
}

impl DirEntry {
    const fn empty() -> Self {
        Self {
            in_use: false,
            attr: ATTR_FILE,
            path_len: 0,
            path: [0; MAX_PATH],
            name_len: 0,
            name: [0; MAX_NAME],
            parent_len: 0,
            parent: [0; MAX_PATH],
            first_cluster: 0,
            size: 0,
        }
    }

    fn path(&self) -> &[u8] {
        &self.path[..self.path_len as usize]
    }

    fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    fn parent(&self) -> &[u8] {
        &self.parent[..self.parent_len as usize]
    }

    fn is_directory(&self) -> bool {
        self.attr == ATTR_DIRECTORY
    }
}

/// An open file's cursor. Matches this filesystem's acknowledged limitation:
/// `seek` repositions `position` but does not re-walk the cluster chain, so
/// a seek across a cluster boundary only behaves correctly if the caller
/// stays within the cluster the handle was already positioned at.
pub struct VfsHandle {
    entry: usize,
    cluster: u32,
    position: u32,
    size: u32,
    mode: OpenMode,
}

impl VfsHandle {
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

struct FatState {
    initialized: bool,
    device: Option<MemoryBlockDevice>,
    fat: [u32; MAX_CLUSTERS],
    next_free_cluster: u32,
    entries: [DirEntry; MAX_ENTRIES],
    cwd_len: u16,
    cwd: [u8; MAX_PATH],
}

impl FatState {
    const fn new() -> Self {
        Self {
            initialized: false,
            device: None,
            fat: [CLUSTER_EOC; MAX_CLUSTERS],
            next_free_cluster: 3,
            entries: [DirEntry::empty(); MAX_ENTRIES],
            cwd_len: 1,
            cwd: {
                let mut buf = [0u8; MAX_PATH];
                buf[0] = b'/';
                buf
            },
        }
    }

    fn cwd(&self) -> &[u8] {
        &self.cwd[..self.cwd_len as usize]
    }

    fn alloc_cluster(&mut self) -> VfsResult<u32> {
        let span = (MAX_CLUSTERS - 3) as u32;
        let start = self.next_free_cluster.max(3);
        for step in 0..span {
            let cluster = 3 + (start - 3 + step) % span;
            if self.fat[cluster as usize] == CLUSTER_EOC && !self.cluster_in_use(cluster) {
                self.next_free_cluster = cluster + 1;
                return Ok(cluster);
            }
        }
        Err(VfsError::OutOfSpace)
    }

    fn cluster_in_use(&self, cluster: u32) -> bool {
        self.entries.iter().any(|e| {
            if !e.in_use {
                return false;
            }
            let mut cur = e.first_cluster;
            while cur != CLUSTER_EOC && (cur as usize) < MAX_CLUSTERS {
                if cur == cluster {
                    return true;
                }
                cur = self.fat[cur as usize];
            }
            false
        })
    }

    fn free_chain(&mut self, first: u32) {
        let mut cur = first;
        while cur != CLUSTER_EOC && (cur as usize) < MAX_CLUSTERS {
            let next = self.fat[cur as usize];
            self.fat[cur as usize] = CLUSTER_EOC;
            cur = next;
        }
    }

    fn cluster_offset(cluster: u32) -> u64 {
        cluster as u64 * CLUSTER_SIZE as u64
    }

    fn find_entry(&self, path: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.in_use && e.path() == path)
    }

    fn find_free_slot(&self) -> VfsResult<usize> {
        self.entries
            .iter()
            .position(|e| !e.in_use)
            .ok_or(VfsError::TableFull)
    }

    fn read_cluster(&self, cluster: u32, buf: &mut [u8]) -> VfsResult<()> {
        let device = self.device.as_ref().ok_or(VfsError::NotInitialized)?;
        device
            .read_at(Self::cluster_offset(cluster), buf)
            .map_err(|_| VfsError::InvalidArgument)
    }

    fn write_cluster(&mut self, cluster: u32, buf: &[u8]) -> VfsResult<()> {
        let device = self.device.as_mut().ok_or(VfsError::NotInitialized)?;
        device
            .write_at(Self::cluster_offset(cluster), buf)
            .map_err(|_| VfsError::InvalidArgument)
    }
}

unsafe impl Send for FatState {}

static FAT_STATE: IrqMutex<FatState> = IrqMutex::new(FatState::new());

/// Brings up the cluster pool and seeds the root directory entry. Safe to
/// call more than once; later calls are a no-op.
pub fn fs_init() -> VfsResult<()> {
    let mut state = FAT_STATE.lock();
    if state.initialized {
        return Ok(());
    }
    let device = MemoryBlockDevice::allocate(MAX_CLUSTERS * CLUSTER_SIZE)
        .ok_or(VfsError::OutOfSpace)?;
    state.device = Some(device);
    state.fat[CLUSTER_MEDIA_DESCRIPTOR as usize] = CLUSTER_MEDIA_DESCRIPTOR;
    state.fat[CLUSTER_EOC as usize] = CLUSTER_EOC;
    state.fat[CLUSTER_ROOT as usize] = CLUSTER_EOC;

    let mut root = DirEntry::empty();
    root.in_use = true;
    root.attr = ATTR_DIRECTORY;
    root.path[0] = b'/';
    root.path_len = 1;
    root.first_cluster = CLUSTER_ROOT;
    state.entries[0] = root;

    state.initialized = true;
    Ok(())
}

pub fn is_initialized() -> bool {
    FAT_STATE.lock().initialized
}

fn copy_into(dst: &mut [u8], src: &[u8]) -> VfsResult<u16> {
    if src.len() > dst.len() {
        return Err(VfsError::InvalidPath);
    }
    dst[..src.len()].copy_from_slice(src);
    Ok(src.len() as u16)
}

pub fn canonicalize(cwd: &[u8], path: &[u8], out: &mut [u8; MAX_PATH]) -> VfsResult<usize> {
    let mut stack: [&[u8]; 64] = [&[]; 64];
    let mut depth = 0usize;

    let absolute = path.first() == Some(&b'/');
    let base: &[u8] = if absolute { b"/" } else { cwd };

    for comp in base.split(|&b| b == b'/').filter(|c| !c.is_empty()) {
        if depth >= stack.len() {
            return Err(VfsError::InvalidPath);
        }
        stack[depth] = comp;
        depth += 1;
    }
    for comp in path.split(|&b| b == b'/').filter(|c| !c.is_empty()) {
        if comp == b"." {
            continue;
        }
        if comp == b".." {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth >= stack.len() {
            return Err(VfsError::InvalidPath);
        }
        stack[depth] = comp;
        depth += 1;
    }

    out[0] = b'/';
    let mut len = 1usize;
    for (i, comp) in stack[..depth].iter().enumerate() {
        if i > 0 || len > 1 {
            if len >= out.len() {
                return Err(VfsError::InvalidPath);
            }
            out[len] = b'/';
            len += 1;
        }
        if len + comp.len() > out.len() {
            return Err(VfsError::InvalidPath);
        }
        out[len..len + comp.len()].copy_from_slice(comp);
        len += comp.len();
    }
    Ok(len)
}

fn split_parent(path: &[u8]) -> (&[u8], &[u8]) {
    if path == b"/" {
        return (b"/", b"/");
    }
    match path.iter().rposition(|&b| b == b'/') {
        Some(0) => (b"/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (b"/", path),
    }
}

fn resolve(cwd: &[u8], path: &[u8]) -> VfsResult<([u8; MAX_PATH], usize)> {
    let mut buf = [0u8; MAX_PATH];
    let len = canonicalize(cwd, path, &mut buf)?;
    Ok((buf, len))
}

pub fn open(path: &[u8], mode: OpenMode) -> VfsResult<VfsHandle> {
    let mut state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let cwd_copy = {
        let mut b = [0u8; MAX_PATH];
        let l = state.cwd_len as usize;
        b[..l].copy_from_slice(&state.cwd[..l]);
        (b, l)
    };
    let (buf, len) = resolve(&cwd_copy.0[..cwd_copy.1], path)?;
    let norm = &buf[..len];

    if let Some(idx) = state.find_entry(norm) {
        if state.entries[idx].is_directory() {
            return Err(VfsError::IsDirectory);
        }
        let first_cluster = state.entries[idx].first_cluster;
        let size = state.entries[idx].size;

        match mode {
            OpenMode::Read => Ok(VfsHandle {
                entry: idx,
                cluster: first_cluster,
                position: 0,
                size,
                mode,
            }),
            OpenMode::Write => {
                state.free_chain_if_not_root(first_cluster);
                let entry = &mut state.entries[idx];
                entry.size = 0;
                Ok(VfsHandle {
                    entry: idx,
                    cluster: entry.first_cluster,
                    position: 0,
                    size: 0,
                    mode,
                })
            }
            OpenMode::Append => Ok(VfsHandle {
                entry: idx,
                cluster: first_cluster,
                position: size,
                size,
                mode,
            }),
        }
    } else {
        if mode == OpenMode::Read {
            return Err(VfsError::NotFound);
        }
        let (parent_path, name) = split_parent(norm);
        let parent_idx = state.find_entry(parent_path).ok_or(VfsError::NotFound)?;
        if !state.entries[parent_idx].is_directory() {
            return Err(VfsError::NotDirectory);
        }
        let first_cluster = state.alloc_cluster()?;
        let slot = state.find_free_slot()?;

        let mut entry = DirEntry::empty();
        entry.in_use = true;
        entry.attr = ATTR_FILE;
        entry.path_len = copy_into(&mut entry.path, norm)?;
        entry.name_len = copy_into(&mut entry.name, name)?;
        entry.parent_len = copy_into(&mut entry.parent, parent_path)?;
        entry.first_cluster = first_cluster;
        entry.size = 0;
        state.entries[slot] = entry;

        Ok(VfsHandle {
            entry: slot,
            cluster: first_cluster,
            position: 0,
            size: 0,
            mode,
        })
    }
}

impl FatState {
    fn free_chain_if_not_root(&mut self, first: u32) {
        if first != CLUSTER_ROOT {
            self.free_chain(first);
        }
    }
}

pub fn read(handle: &mut VfsHandle, buf: &mut [u8]) -> VfsResult<usize> {
    let mut state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let remaining = handle.size.saturating_sub(handle.position) as usize;
    let to_read = buf.len().min(remaining);
    if to_read == 0 {
        return Ok(0);
    }

    let mut done = 0usize;
    let mut cluster = handle.cluster;
    let mut offset_in_cluster = (handle.position as usize) % CLUSTER_SIZE;

    let mut scratch = [0u8; CLUSTER_SIZE];
    while done < to_read {
        state.read_cluster(cluster, &mut scratch)?;
        let chunk = (CLUSTER_SIZE - offset_in_cluster).min(to_read - done);
        buf[done..done + chunk]
            .copy_from_slice(&scratch[offset_in_cluster..offset_in_cluster + chunk]);
        done += chunk;
        handle.position += chunk as u32;

        if offset_in_cluster + chunk == CLUSTER_SIZE && done < to_read {
            let next = state.fat[cluster as usize];
            if next == CLUSTER_EOC {
                break;
            }
            cluster = next;
            offset_in_cluster = 0;
        } else {
            offset_in_cluster += chunk;
        }
    }
    handle.cluster = cluster;
    Ok(done)
}

pub fn write(handle: &mut VfsHandle, buf: &[u8]) -> VfsResult<usize> {
    if handle.mode == OpenMode::Read {
        return Err(VfsError::InvalidArgument);
    }
    let mut state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }

    let mut done = 0usize;
    let mut cluster = handle.cluster;
    let mut offset_in_cluster = (handle.position as usize) % CLUSTER_SIZE;

    let mut scratch = [0u8; CLUSTER_SIZE];
    while done < buf.len() {
        let chunk = (CLUSTER_SIZE - offset_in_cluster).min(buf.len() - done);
        if offset_in_cluster != 0 || chunk != CLUSTER_SIZE {
            state.read_cluster(cluster, &mut scratch)?;
        }
        scratch[offset_in_cluster..offset_in_cluster + chunk]
            .copy_from_slice(&buf[done..done + chunk]);
        state.write_cluster(cluster, &scratch)?;
        done += chunk;
        handle.position += chunk as u32;

        if offset_in_cluster + chunk == CLUSTER_SIZE && done < buf.len() {
            let next = state.fat[cluster as usize];
            let next = if next == CLUSTER_EOC {
                let new_cluster = state.alloc_cluster()?;
                state.fat[cluster as usize] = new_cluster;
                new_cluster
            } else {
                next
            };
            cluster = next;
            offset_in_cluster = 0;
        } else {
            offset_in_cluster += chunk;
        }
    }

    handle.cluster = cluster;
    handle.size = handle.size.max(handle.position);
    state.entries[handle.entry].size = handle.size;
    Ok(done)
}

pub fn seek(handle: &mut VfsHandle, offset: i64, whence: SeekFrom) -> VfsResult<u32> {
    let base = match whence {
        SeekFrom::Start => 0i64,
        SeekFrom::Current => handle.position as i64,
        SeekFrom::End => handle.size as i64,
    };
    let target = (base + offset).clamp(0, handle.size as i64);
    handle.position = target as u32;
    Ok(handle.position)
}

pub fn mkdir(path: &[u8]) -> VfsResult<()> {
    let mut state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let cwd_copy = {
        let mut b = [0u8; MAX_PATH];
        let l = state.cwd_len as usize;
        b[..l].copy_from_slice(&state.cwd[..l]);
        (b, l)
    };
    let (buf, len) = resolve(&cwd_copy.0[..cwd_copy.1], path)?;
    let norm = &buf[..len];

    if state.find_entry(norm).is_some() {
        return Err(VfsError::AlreadyExists);
    }
    let (parent_path, name) = split_parent(norm);
    let parent_idx = state.find_entry(parent_path).ok_or(VfsError::NotFound)?;
    if !state.entries[parent_idx].is_directory() {
        return Err(VfsError::NotDirectory);
    }

    let first_cluster = state.alloc_cluster()?;
    let slot = state.find_free_slot()?;
    let mut entry = DirEntry::empty();
    entry.in_use = true;
    entry.attr = ATTR_DIRECTORY;
    entry.path_len = copy_into(&mut entry.path, norm)?;
    entry.name_len = copy_into(&mut entry.name, name)?;
    entry.parent_len = copy_into(&mut entry.parent, parent_path)?;
    entry.first_cluster = first_cluster;
    state.entries[slot] = entry;
    Ok(())
}

fn remove(path: &[u8], require_dir: Option<bool>) -> VfsResult<()> {
    let mut state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let cwd_copy = {
        let mut b = [0u8; MAX_PATH];
        let l = state.cwd_len as usize;
        b[..l].copy_from_slice(&state.cwd[..l]);
        (b, l)
    };
    let (buf, len) = resolve(&cwd_copy.0[..cwd_copy.1], path)?;
    let norm = &buf[..len];
    if norm == b"/" {
        return Err(VfsError::InvalidArgument);
    }

    let idx = state.find_entry(norm).ok_or(VfsError::NotFound)?;
    let is_dir = state.entries[idx].is_directory();
    if let Some(expect_dir) = require_dir {
        if expect_dir != is_dir {
            return if is_dir {
                Err(VfsError::IsDirectory)
            } else {
                Err(VfsError::NotDirectory)
            };
        }
    }
    if is_dir {
        let has_children = state.entries.iter().any(|e| e.in_use && e.parent() == norm);
        if has_children {
            return Err(VfsError::InvalidArgument);
        }
    }

    let first_cluster = state.entries[idx].first_cluster;
    state.free_chain(first_cluster);
    state.entries[idx] = DirEntry::empty();
    Ok(())
}

pub fn rmdir(path: &[u8]) -> VfsResult<()> {
    remove(path, Some(true))
}

pub fn delete(path: &[u8]) -> VfsResult<()> {
    remove(path, Some(false))
}

pub fn exists(path: &[u8]) -> bool {
    stat(path).is_ok()
}

pub fn is_directory(path: &[u8]) -> VfsResult<bool> {
    stat(path).map(|(attr, _)| attr == ATTR_DIRECTORY)
}

pub fn stat(path: &[u8]) -> VfsResult<(u8, u32)> {
    let state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let cwd = state.cwd();
    let (buf, len) = resolve(cwd, path)?;
    let idx = state.find_entry(&buf[..len]).ok_or(VfsError::NotFound)?;
    Ok((state.entries[idx].attr, state.entries[idx].size))
}

pub struct ListEntry {
    pub name: [u8; MAX_NAME],
    pub name_len: usize,
    pub attr: u8,
    pub size: u32,
}

impl ListEntry {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

pub fn list_directory(path: &[u8], out: &mut [ListEntry]) -> VfsResult<usize> {
    let state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let cwd = state.cwd();
    let (buf, len) = resolve(cwd, path)?;
    let norm = &buf[..len];
    let dir_idx = state.find_entry(norm).ok_or(VfsError::NotFound)?;
    if !state.entries[dir_idx].is_directory() {
        return Err(VfsError::NotDirectory);
    }

    let mut count = 0usize;
    for entry in state.entries.iter() {
        if count >= out.len() {
            break;
        }
        if !entry.in_use || entry.parent() != norm {
            continue;
        }
        let mut item = ListEntry {
            name: [0u8; MAX_NAME],
            name_len: entry.name().len(),
            attr: entry.attr,
            size: entry.size,
        };
        item.name[..entry.name().len()].copy_from_slice(entry.name());
        out[count] = item;
        count += 1;
    }
    Ok(count)
}

pub fn chdir(path: &[u8]) -> VfsResult<()> {
    let mut state = FAT_STATE.lock();
    if !state.initialized {
        return Err(VfsError::NotInitialized);
    }
    let cwd_copy = {
        let mut b = [0u8; MAX_PATH];
        let l = state.cwd_len as usize;
        b[..l].copy_from_slice(&state.cwd[..l]);
        (b, l)
    };
    let (buf, len) = resolve(&cwd_copy.0[..cwd_copy.1], path)?;
    let norm = &buf[..len];
    let idx = state.find_entry(norm).ok_or(VfsError::NotFound)?;
    if !state.entries[idx].is_directory() {
        return Err(VfsError::NotDirectory);
    }
    state.cwd[..len].copy_from_slice(norm);
    state.cwd_len = len as u16;
    Ok(())
}

pub fn get_current_dir(out: &mut [u8]) -> usize {
    let state = FAT_STATE.lock();
    let cwd = state.cwd();
    let n = cwd.len().min(out.len());
    out[..n].copy_from_slice(&cwd[..n]);
    n
}
