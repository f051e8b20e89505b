use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};

use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::error::{MmvError, MmvResult};

/// The shared memory-mapped region backing one writer.
///
/// Structural sections are written once through `write_bytes` while the
/// generation markers disagree; afterwards only value slots change, each via
/// a single aligned store through the cached data pointer. The mapping is
/// kept alive behind the mutex for the lifetime of the region; the pointer
/// loads stay lock-free.
#[derive(Debug)]
pub struct MappedRegion {
    path: PathBuf,
    mmap: Mutex<MmapMut>,
    data: AtomicPtr<u8>,
    len: usize,
}

unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Create (or truncate) the backing file at `len` bytes and map it.
    pub fn create(path: &Path, len: usize) -> MmvResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| MmvError::startup(format!("create {}: {err}", path.display())))?;
        file.set_len(len as u64)
            .map_err(|err| MmvError::startup(format!("size {}: {err}", path.display())))?;
        let mut mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|err| MmvError::startup(format!("map {}: {err}", path.display())))?
        };
        let data = mmap.as_mut_ptr();
        Ok(Self {
            path: path.to_path_buf(),
            mmap: Mutex::new(mmap),
            data: AtomicPtr::new(data),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn checked_ptr(&self, offset: usize, width: usize) -> MmvResult<*mut u8> {
        if offset
            .checked_add(width)
            .map(|end| end > self.len)
            .unwrap_or(true)
        {
            return Err(MmvError::invalid_state(format!(
                "write of {width} bytes at {offset} outside the {} byte region",
                self.len
            )));
        }
        let ptr = self.data.load(Ordering::Acquire);
        if ptr.is_null() {
            return Err(MmvError::invalid_state("region memory unmapped"));
        }
        Ok(unsafe { ptr.add(offset) })
    }

    /// Bulk write during the build phase.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> MmvResult<()> {
        let ptr = self.checked_ptr(offset, bytes.len())?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
        Ok(())
    }

    /// Single aligned 4-byte store, visible to a mapped reader as one unit.
    pub fn store_u32(&self, offset: usize, value: u32) -> MmvResult<()> {
        let ptr = self.checked_ptr(offset, 4)?;
        debug_assert_eq!(offset % 4, 0);
        unsafe {
            (*(ptr as *const AtomicU32)).store(value, Ordering::Release);
        }
        Ok(())
    }

    /// Single aligned 8-byte store, visible to a mapped reader as one unit.
    pub fn store_u64(&self, offset: usize, value: u64) -> MmvResult<()> {
        let ptr = self.checked_ptr(offset, 8)?;
        debug_assert_eq!(offset % 8, 0);
        unsafe {
            (*(ptr as *const AtomicU64)).store(value, Ordering::Release);
        }
        Ok(())
    }

    /// Flush the whole mapping to the backing file.
    pub fn flush(&self) -> MmvResult<()> {
        self.mmap.lock().flush()?;
        Ok(())
    }

    /// Flush a prefix of the mapping, used after the final marker store.
    pub fn flush_range(&self, offset: usize, len: usize) -> MmvResult<()> {
        self.mmap.lock().flush_range(offset, len)?;
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        self.data.store(ptr::null_mut(), Ordering::Release);
    }
}
