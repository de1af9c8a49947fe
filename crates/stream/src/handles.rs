use std::collections::{hash_map::Entry, HashMap};

use log::trace;

use crate::{content::ContentId, Result, StreamError};

pub type Handle = u32;

/// First handle assigned in every epoch (`baseWireHandle` in the protocol).
pub const BASE_WIRE_HANDLE: Handle = 0x7E_0000;

/// Handle-to-content bindings for the current epoch, plus the archived
/// tables of every epoch closed by a stream reset.
#[derive(Debug)]
pub struct HandleTable {
    current: HashMap<Handle, ContentId>,
    archived: Vec<HashMap<Handle, ContentId>>,
    next: Handle,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            current: HashMap::new(),
            archived: Vec::new(),
            next: BASE_WIRE_HANDLE,
        }
    }

    /// Returns the next handle in first-appearance order.
    pub fn alloc(&mut self) -> Handle {
        let handle = self.next;
        self.next += 1;
        handle
    }

    /// Binds a handle; rebinding within an epoch is a stream defect.
    pub fn bind(&mut self, handle: Handle, content: ContentId) -> Result<()> {
        match self.current.entry(handle) {
            Entry::Occupied(_) => Err(StreamError::HandleRebound(handle)),
            Entry::Vacant(entry) => {
                entry.insert(content);
                Ok(())
            }
        }
    }

    /// Resolves against the current epoch only.
    pub fn resolve(&self, handle: Handle) -> Result<ContentId> {
        self.current
            .get(&handle)
            .copied()
            .ok_or(StreamError::UnboundHandle(handle))
    }

    /// Archives a non-empty current table and restarts the counter.
    pub fn reset(&mut self) {
        trace!("reset ordered");
        if !self.current.is_empty() {
            self.archived.push(std::mem::take(&mut self.current));
        }
        self.next = BASE_WIRE_HANDLE;
    }

    /// Archives whatever the final epoch holds, at end of stream.
    pub fn archive_remaining(&mut self) {
        if !self.current.is_empty() {
            self.archived.push(std::mem::take(&mut self.current));
        }
    }

    pub fn current(&self) -> &HashMap<Handle, ContentId> {
        &self.current
    }

    pub fn archived(&self) -> &[HashMap<Handle, ContentId>] {
        &self.archived
    }

    pub(crate) fn into_epochs(self) -> Vec<HashMap<Handle, ContentId>> {
        self.archived
    }
}
