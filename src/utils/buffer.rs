use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Read-only view over the content of a file
pub trait Buffer: Send + Sync {
    fn data(&'_ self) -> &'_ [u8];

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Stores the data in memory
pub struct MemoryBuffer {
    data: Vec<u8>,
}

impl MemoryBuffer {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::options().read(true).open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        Ok(Self { data })
    }
}

impl Buffer for MemoryBuffer {
    fn data(&'_ self) -> &'_ [u8] {
        &self.data
    }
}

/// Uses a memory map
pub struct MmapBuffer {
    mmap: Option<Mmap>,
}

impl MmapBuffer {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options().read(true).open(path)?;

        // Empty files cannot be mapped
        if file.metadata()?.len() == 0 {
            return Ok(Self { mmap: None });
        }

        // The index files are not modified once the merge is over
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self { mmap: Some(mmap) })
    }
}

impl Buffer for MmapBuffer {
    fn data(&'_ self) -> &'_ [u8] {
        match &self.mmap {
            Some(mmap) => &mmap[..],
            None => &[],
        }
    }
}

/// Opens a file either in memory or through a memory map
pub fn open_buffer(path: &Path, in_memory: bool) -> Result<Box<dyn Buffer>> {
    Ok(if in_memory {
        Box::new(MemoryBuffer::open(path)?)
    } else {
        Box::new(MmapBuffer::open(path)?)
    })
}
