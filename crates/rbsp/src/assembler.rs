//! Rebuilding a file from per-lump providers.
//!
//! An [`Assembler`] has one slot per lump. Each slot borrows a
//! [`LumpProvider`]; the same provider may fill several slots. Assembly writes
//! the header, then every lump back-to-back in directory order with no
//! padding, then patches the directory.

use std::fmt;

use log::{debug, trace};
use rayon::prelude::*;

use crate::error::{BspError, Result};
use crate::qfiles::{Header, Lump, LumpIndex, HEADER_LUMPS, HEADER_SIZE};
use crate::reader::Reader;

/// Produces the final bytes of one or more lumps.
///
/// Implementations return [`BspError::UnprovidableLump`] for lumps they were
/// not built to serve.
pub trait LumpProvider: Sync {
    fn generate_lump(&self, index: LumpIndex) -> Result<Vec<u8>>;
}

/// Passes every lump of a [`Reader`] through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct ReaderLumpProvider<'a> {
    reader: Reader<'a>,
}

impl<'a> ReaderLumpProvider<'a> {
    pub fn new(reader: Reader<'a>) -> Self {
        Self { reader }
    }
}

impl<'a> From<Reader<'a>> for ReaderLumpProvider<'a> {
    fn from(reader: Reader<'a>) -> Self {
        Self::new(reader)
    }
}

impl LumpProvider for ReaderLumpProvider<'_> {
    fn generate_lump(&self, index: LumpIndex) -> Result<Vec<u8>> {
        Ok(self.reader.lump_bytes(index)?.to_vec())
    }
}

// ============================================================
// Assembler
// ============================================================

#[derive(Clone, Copy, Default)]
pub struct Assembler<'a> {
    providers: [Option<&'a dyn LumpProvider>; HEADER_LUMPS],
}

impl fmt::Debug for Assembler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set: Vec<&str> = LumpIndex::ALL
            .iter()
            .filter(|lump| self.providers[lump.index()].is_some())
            .map(|lump| lump.name())
            .collect();
        f.debug_struct("Assembler").field("set", &set).finish()
    }
}

impl<'a> Assembler<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An assembler with every slot filled by `provider`.
    pub fn with_default(provider: &'a dyn LumpProvider) -> Self {
        Self {
            providers: [Some(provider); HEADER_LUMPS],
        }
    }

    pub fn set(&mut self, index: LumpIndex, provider: &'a dyn LumpProvider) -> &mut Self {
        self.providers[index.index()] = Some(provider);
        self
    }

    pub fn set_all(&mut self, provider: &'a dyn LumpProvider) -> &mut Self {
        self.providers = [Some(provider); HEADER_LUMPS];
        self
    }

    pub fn clear(&mut self, index: LumpIndex) -> &mut Self {
        self.providers[index.index()] = None;
        self
    }

    pub fn get(&self, index: LumpIndex) -> Option<&'a dyn LumpProvider> {
        self.providers[index.index()]
    }

    /// Lumps that have no provider yet.
    pub fn missing(&self) -> Vec<LumpIndex> {
        LumpIndex::ALL
            .into_iter()
            .filter(|lump| self.providers[lump.index()].is_none())
            .collect()
    }

    fn check_complete(&self) -> Result<()> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(BspError::IncompleteAssemblerConfiguration { missing });
        }
        Ok(())
    }

    fn generate(&self, index: LumpIndex) -> Result<Vec<u8>> {
        match self.providers[index.index()] {
            Some(provider) => provider.generate_lump(index),
            None => Err(BspError::IncompleteAssemblerConfiguration {
                missing: vec![index],
            }),
        }
    }

    /// Builds the file, generating lumps one after another.
    ///
    /// Fails before allocating anything if a slot is empty.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        self.check_complete()?;
        let mut layout = Layout::new();
        for index in LumpIndex::ALL {
            let bytes = self.generate(index)?;
            layout.append(index, &bytes)?;
        }
        Ok(layout.finish())
    }

    /// Same output as [`Assembler::assemble`], but lumps are generated on the
    /// rayon pool. Offsets are still assigned in directory order.
    pub fn assemble_parallel(&self) -> Result<Vec<u8>> {
        self.check_complete()?;
        let lumps = LumpIndex::ALL[..]
            .par_iter()
            .map(|&index| self.generate(index))
            .collect::<Result<Vec<_>>>()?;
        let mut layout = Layout::new();
        for (index, bytes) in LumpIndex::ALL.into_iter().zip(&lumps) {
            layout.append(index, bytes)?;
        }
        Ok(layout.finish())
    }
}

// ============================================================
// Layout
// ============================================================

struct Layout {
    header: Header,
    bytes: Vec<u8>,
}

impl Layout {
    fn new() -> Self {
        Self {
            header: Header::default(),
            // placeholder until every lump is placed
            bytes: vec![0; HEADER_SIZE],
        }
    }

    fn append(&mut self, index: LumpIndex, lump: &[u8]) -> Result<()> {
        let offset = self.bytes.len();
        let too_large = || BspError::LumpTooLarge {
            lump: index,
            offset,
            len: lump.len(),
        };
        let end = offset.checked_add(lump.len()).ok_or_else(too_large)?;
        i32::try_from(end).map_err(|_| too_large())?;
        self.header.lumps[index.index()] = Lump {
            offset: i32::try_from(offset).map_err(|_| too_large())?,
            size: i32::try_from(lump.len()).map_err(|_| too_large())?,
        };
        trace!("lump {} at {} ({} bytes)", index, offset, lump.len());
        self.bytes.extend_from_slice(lump);
        Ok(())
    }

    fn finish(mut self) -> Vec<u8> {
        self.bytes[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&self.header));
        debug!("assembled {} byte bsp", self.bytes.len());
        self.bytes
    }
}

// =============================================================================
// Tests
// =============================================================================
