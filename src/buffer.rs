//! Buffer instances attached to channels.

use crate::error::Result;
use crate::registry::Registry;
use crate::sysfs::ObjectDir;

/// Kind of a buffer, resolved from the channel-set's `current_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// `kmalloc` buffer
    Kmalloc,
    /// `vmalloc` buffer
    Vmalloc,
    /// Any other buffer type
    Generic,
}

/// A channel's buffer directory.
#[derive(Debug, Clone)]
pub struct Buffer {
    kind: BufferKind,
    dir: ObjectDir,
}

impl Buffer {
    /// Buffer of `kind` over a scanned directory.
    pub fn new(kind: BufferKind, dir: ObjectDir) -> Self {
        Self { kind, dir }
    }

    /// Registry with the buffer types the framework ships.
    pub fn registry() -> Registry<Buffer> {
        let mut registry = Registry::new(|dir| Buffer::new(BufferKind::Generic, dir));
        registry
            .register("kmalloc", |dir| Buffer::new(BufferKind::Kmalloc, dir))
            .register("vmalloc", |dir| Buffer::new(BufferKind::Vmalloc, dir));
        registry
    }

    /// Buffer kind.
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Underlying sysfs object.
    pub fn dir(&self) -> &ObjectDir {
        &self.dir
    }

    /// Whether the buffer exposes a `flush` attribute.
    pub fn can_flush(&self) -> bool {
        self.dir.has("flush")
    }

    /// Discard buffered blocks. A no-op for buffers without `flush`.
    pub fn flush(&self) -> Result<()> {
        match self.dir.get("flush") {
            Some(attr) => attr.write(1),
            None => Ok(()),
        }
    }

    /// `max-buffer-len`: maximum number of blocks.
    pub fn max_len(&self) -> Result<i64> {
        self.dir.attribute("max-buffer-len")?.read_int()
    }

    /// Set `max-buffer-len`.
    pub fn set_max_len(&self, len: u32) -> Result<()> {
        self.dir.attribute("max-buffer-len")?.write(len)
    }

    /// `allocated-buffer-len`: blocks currently allocated.
    pub fn allocated_len(&self) -> Result<i64> {
        self.dir.attribute("allocated-buffer-len")?.read_int()
    }

    /// `prefer-new`: drop old blocks instead of new ones when full.
    pub fn prefers_new(&self) -> Result<bool> {
        self.dir.attribute("prefer-new")?.read_bool()
    }
}
