//! Byte regions backing the graph collections.
//!
//! A data set is one byte run holding several *collections*: regions
//! described by a [`CollectionHeader`] and addressed either by record
//! index (fixed width records) or by byte offset (bit packed streams).
//! Collections hand out [`Window`] borrows; a window is copied from and
//! dropped before the next borrow, so a file backed region never pins
//! more than one buffer at a time.

use std::path::Path;
use std::sync::Arc;
use std::{fmt, fs};

use log::debug;
use positioned_io::{RandomAccessFile, ReadAt};

use crate::types::GraphError;

//------------ CollectionHeader ----------------------------------------------

/// Location and shape of one collection inside the data set.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CollectionHeader {
    /// Position of the first collection byte.
    pub start: u32,
    /// Number of bytes that form the collection.
    pub length: u32,
    /// Number of records in the collection.
    pub count: u32,
}

impl CollectionHeader {
    /// Size in bytes of one record. Zero for an empty collection.
    pub fn element_size(&self) -> u32 {
        if self.count == 0 {
            0
        } else {
            self.length / self.count
        }
    }

    /// The same region addressed by byte rather than by record, used for
    /// bit packed streams.
    pub(crate) fn byte_indexed(mut self) -> Self {
        self.count = self.length;
        self
    }
}

//------------ Window --------------------------------------------------------

/// A scoped borrow of collection bytes.
///
/// Memory backed collections lend a slice of the shared data; file
/// backed collections hand over the buffer that was read. Dropping the
/// window releases the borrow.
pub enum Window<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl std::ops::Deref for Window<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Window::Borrowed(bytes) => bytes,
            Window::Owned(bytes) => bytes,
        }
    }
}

//------------ MemoryReader --------------------------------------------------

/// Sequential reader over an in-memory data set.
///
/// Collections are created at the reader's current position and advance
/// it past their region. Graph headers may point back into regions that
/// were already consumed; callers creating such collections save and
/// restore the position around the creation.
#[derive(Clone, Debug)]
pub struct MemoryReader {
    data: Arc<[u8]>,
    current: usize,
}

impl MemoryReader {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        MemoryReader {
            data: data.into(),
            current: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.current
    }

    pub fn set_position(&mut self, position: usize) {
        self.current = position;
    }
}

//------------ FileSource ----------------------------------------------------

/// Configuration for collections created from a file.
#[derive(Copy, Clone, Debug, Default)]
pub struct CollectionConfig {
    /// Read the whole region into memory at creation instead of issuing
    /// a positional read per borrow.
    pub loaded: bool,
}

/// A file backing one or more collections.
///
/// Reads are positional, so a single source serves any number of
/// concurrent borrows without seeking or a pool of handles.
#[derive(Clone)]
pub struct FileSource {
    file: Arc<RandomAccessFile>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        Ok(FileSource {
            file: Arc::new(RandomAccessFile::open(path)?),
        })
    }

    pub fn from_file(file: fs::File) -> Result<Self, GraphError> {
        Ok(FileSource {
            file: Arc::new(RandomAccessFile::try_new(file)?),
        })
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileSource").finish_non_exhaustive()
    }
}

//------------ Collection ----------------------------------------------------

enum Backing {
    /// A region of the shared in-memory data; `start` is an offset into
    /// the run.
    Memory(Arc<[u8]>),
    /// A region of a file; `start` is a file offset.
    File(Arc<RandomAccessFile>),
}

/// One collection region with record and byte addressed access.
pub struct Collection {
    backing: Backing,
    start: u64,
    length: u32,
    count: u32,
    element_size: u32,
}

impl Collection {
    /// Creates a collection at the reader's current position and
    /// advances the reader past its region.
    pub fn from_reader(
        reader: &mut MemoryReader,
        header: CollectionHeader,
    ) -> Result<Self, GraphError> {
        let start = reader.position();
        let end = start
            .checked_add(header.length as usize)
            .ok_or(GraphError::CorruptData)?;
        if end > reader.data.len() {
            return Err(GraphError::CorruptData);
        }
        reader.set_position(end);
        Ok(Collection {
            backing: Backing::Memory(reader.data.clone()),
            start: start as u64,
            length: header.length,
            count: header.count,
            element_size: header.element_size(),
        })
    }

    /// Creates a collection over the file region the header describes. A
    /// loaded configuration reads the region into memory once; otherwise
    /// every borrow is a positional read.
    pub fn from_file(
        source: &FileSource,
        header: CollectionHeader,
        config: CollectionConfig,
    ) -> Result<Self, GraphError> {
        let backing = if config.loaded {
            let mut data = vec![0; header.length as usize];
            source.file.read_exact_at(u64::from(header.start), &mut data)?;
            debug!(
                "loaded collection region start={} length={}",
                header.start, header.length
            );
            Backing::Memory(data.into())
        } else {
            Backing::File(source.file.clone())
        };
        Ok(Collection {
            start: match &backing {
                Backing::Memory(_) => 0,
                Backing::File(_) => u64::from(header.start),
            },
            backing,
            length: header.length,
            count: header.count,
            element_size: header.element_size(),
        })
    }

    /// Number of records in the collection.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Size in bytes of one record.
    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    /// Borrows the record at `index`.
    pub fn record(&self, index: u32) -> Result<Window<'_>, GraphError> {
        if index >= self.count || self.element_size == 0 {
            return Err(GraphError::CorruptData);
        }
        self.window_at(
            u64::from(index) * u64::from(self.element_size),
            self.element_size,
        )
    }

    /// Borrows `length` bytes starting at byte `offset` of the region.
    pub fn window(
        &self,
        offset: u32,
        length: u32,
    ) -> Result<Window<'_>, GraphError> {
        self.window_at(u64::from(offset), length)
    }

    fn window_at(
        &self,
        offset: u64,
        length: u32,
    ) -> Result<Window<'_>, GraphError> {
        if offset + u64::from(length) > u64::from(self.length) {
            return Err(GraphError::CorruptData);
        }
        match &self.backing {
            Backing::Memory(data) => {
                let start = (self.start + offset) as usize;
                Ok(Window::Borrowed(&data[start..start + length as usize]))
            }
            Backing::File(file) => {
                let mut buf = vec![0; length as usize];
                file.read_exact_at(self.start + offset, &mut buf)?;
                Ok(Window::Owned(buf))
            }
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Collection")
            .field("start", &self.start)
            .field("length", &self.length)
            .field("count", &self.count)
            .field("element_size", &self.element_size)
            .finish_non_exhaustive()
    }
}
