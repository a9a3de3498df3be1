//! Zero-copy access to an RBSP buffer.
//!
//! A [`Reader`] borrows the caller's bytes and hands out bounds-checked views.
//! The directory is validated once when the reader is bound to a buffer and
//! every span is checked again against the real buffer length, so a corrupt
//! directory surfaces as [`BspError::MalformedDirectory`] instead of a bad
//! slice.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;
use log::{debug, trace, warn};

use crate::config::ReaderOptions;
use crate::entities::{self, Entity};
use crate::error::{BspError, Result};
use crate::qfiles::{
    Brush, BrushSide, DrawVert, Fog, Header, Leaf, Lightgrid, Lightmap, Lump, LumpIndex, Model,
    Node, Plane, Shader, Surface, HEADER_LUMPS, HEADER_SIZE, IDENT, VERSION,
};
use crate::text;
use crate::vis::{Visibility, VisibilityCluster};

// ============================================================
// LumpView
// ============================================================

/// A borrowed run of `T` records inside a lump.
///
/// The bytes are not assumed to be aligned for `T`; records are copied out
/// with unaligned loads.
pub struct LumpView<'a, T> {
    bytes: &'a [u8],
    _marker: PhantomData<T>,
}

impl<T> Clone for LumpView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LumpView<'_, T> {}

impl<T> fmt::Debug for LumpView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LumpView")
            .field("records", &(self.bytes.len() / size_of::<T>().max(1)))
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl<'a, T: Pod> LumpView<'a, T> {
    /// `bytes.len()` must be a non-zero multiple of `size_of::<T>()` or empty;
    /// [`Reader::get_data_span`] guarantees this.
    fn new(bytes: &'a [u8]) -> Self {
        debug_assert!(size_of::<T>() > 0 && bytes.len() % size_of::<T>() == 0);
        Self {
            bytes,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() / size_of::<T>()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies out record `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        let stride = size_of::<T>();
        let start = index.checked_mul(stride)?;
        let end = start.checked_add(stride)?;
        self.bytes.get(start..end).map(bytemuck::pod_read_unaligned)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + 'a {
        self.bytes
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    /// Raw bytes of the view.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Borrows the records in place when the lump happens to be aligned.
    pub fn try_as_slice(&self) -> Option<&'a [T]> {
        bytemuck::try_cast_slice(self.bytes).ok()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

// ============================================================
// Reader
// ============================================================

/// Read-only view over a caller-owned RBSP buffer.
///
/// Cheap to copy; holds the borrowed slice and the options it was checked
/// with.
#[derive(Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
    options: ReaderOptions,
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("len", &self.data.len())
            .field("options", &self.options)
            .finish()
    }
}

impl<'a> Reader<'a> {
    /// Binds a reader to `data` after checking the header and directory.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Self::with_options(data, ReaderOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: ReaderOptions) -> Result<Self> {
        validate(data, &options)?;
        debug!("bound reader to {} byte bsp", data.len());
        Ok(Self { data, options })
    }

    /// Re-points the reader at another buffer, checked with the same options.
    /// On error the reader keeps its previous buffer.
    pub fn rebase(&mut self, data: &'a [u8]) -> Result<()> {
        *self = Self::with_options(data, self.options)?;
        Ok(())
    }

    #[inline]
    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    /// The whole underlying buffer.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn header(&self) -> Header {
        bytemuck::pod_read_unaligned(&self.data[..HEADER_SIZE])
    }

    /// Directory entry for `index`.
    pub fn get_lump(&self, index: LumpIndex) -> Lump {
        read_lump(self.data, index)
    }

    /// Bounds-checked bytes of a lump.
    pub fn lump_bytes(&self, index: LumpIndex) -> Result<&'a [u8]> {
        let lump = self.get_lump(index);
        lump_range(lump, index, self.data.len()).map(|range| &self.data[range])
    }

    /// A typed view of `index` starting `element_offset` records in.
    ///
    /// Fails if the lump leaves the buffer, if its size is not a multiple of
    /// `size_of::<T>()`, or if `element_offset` is past the last record.
    pub fn get_data_span<T: Pod>(
        &self,
        index: LumpIndex,
        element_offset: usize,
    ) -> Result<LumpView<'a, T>> {
        let bytes = self.lump_bytes(index)?;
        let stride = size_of::<T>();
        if stride == 0 || bytes.len() % stride != 0 {
            return Err(BspError::InvalidLumpSize {
                lump: index,
                size: bytes.len(),
                stride,
            });
        }
        let count = bytes.len() / stride;
        if element_offset > count {
            return Err(BspError::ElementOffsetOutOfRange {
                lump: index,
                offset: element_offset,
                count,
            });
        }
        Ok(LumpView::new(&bytes[element_offset * stride..]))
    }

    /// Raw bytes of a text lump, ending at the first NUL or at the declared
    /// size.
    pub fn get_string_bytes(&self, index: LumpIndex) -> Result<&'a [u8]> {
        let bytes = self.lump_bytes(index)?;
        match bytes.iter().position(|&b| b == 0) {
            Some(nul) => {
                if bytes[nul + 1..].iter().any(|&b| b != 0) {
                    warn!("lump {} has data after its terminator", index);
                }
                Ok(&bytes[..nul])
            }
            None => Ok(bytes),
        }
    }

    /// A text lump decoded byte-per-character; borrowed when it is ASCII.
    pub fn get_string_view(&self, index: LumpIndex) -> Result<Cow<'a, str>> {
        Ok(text::decode(self.get_string_bytes(index)?))
    }

    // ============================================================
    // Checks
    // ============================================================

    #[inline]
    pub fn has_visibility(&self) -> bool {
        self.get_lump(LumpIndex::Visibility).size != 0
    }

    // ============================================================
    // Entities
    // ============================================================

    pub fn entities(&self) -> Result<Cow<'a, str>> {
        self.get_string_view(LumpIndex::Entities)
    }

    pub fn entities_parsed(&self) -> Result<Vec<Entity>> {
        let text = self.get_string_bytes(LumpIndex::Entities)?;
        Ok(entities::parse(text)?)
    }

    // ============================================================
    // Record lumps
    // ============================================================

    pub fn shaders(&self) -> Result<LumpView<'a, Shader>> {
        self.get_data_span(LumpIndex::Shaders, 0)
    }

    pub fn planes(&self) -> Result<LumpView<'a, Plane>> {
        self.get_data_span(LumpIndex::Planes, 0)
    }

    pub fn nodes(&self) -> Result<LumpView<'a, Node>> {
        self.get_data_span(LumpIndex::Nodes, 0)
    }

    pub fn leafs(&self) -> Result<LumpView<'a, Leaf>> {
        self.get_data_span(LumpIndex::Leafs, 0)
    }

    pub fn leaf_surfaces(&self) -> Result<LumpView<'a, i32>> {
        self.get_data_span(LumpIndex::LeafSurfaces, 0)
    }

    pub fn leaf_brushes(&self) -> Result<LumpView<'a, i32>> {
        self.get_data_span(LumpIndex::LeafBrushes, 0)
    }

    pub fn models(&self) -> Result<LumpView<'a, Model>> {
        self.get_data_span(LumpIndex::Models, 0)
    }

    pub fn brushes(&self) -> Result<LumpView<'a, Brush>> {
        self.get_data_span(LumpIndex::Brushes, 0)
    }

    pub fn brush_sides(&self) -> Result<LumpView<'a, BrushSide>> {
        self.get_data_span(LumpIndex::BrushSides, 0)
    }

    pub fn draw_verts(&self) -> Result<LumpView<'a, DrawVert>> {
        self.get_data_span(LumpIndex::DrawVerts, 0)
    }

    pub fn draw_indexes(&self) -> Result<LumpView<'a, i32>> {
        self.get_data_span(LumpIndex::DrawIndexes, 0)
    }

    pub fn fogs(&self) -> Result<LumpView<'a, Fog>> {
        self.get_data_span(LumpIndex::Fogs, 0)
    }

    pub fn surfaces(&self) -> Result<LumpView<'a, Surface>> {
        self.get_data_span(LumpIndex::Surfaces, 0)
    }

    pub fn lightmaps(&self) -> Result<LumpView<'a, Lightmap>> {
        self.get_data_span(LumpIndex::Lightmaps, 0)
    }

    pub fn lightgrid(&self) -> Result<LumpView<'a, Lightgrid>> {
        self.get_data_span(LumpIndex::Lightgrid, 0)
    }

    pub fn light_array(&self) -> Result<LumpView<'a, u16>> {
        self.get_data_span(LumpIndex::LightArray, 0)
    }

    // ============================================================
    // Visibility
    // ============================================================

    pub fn visibility(&self) -> Result<Visibility<'a>> {
        Visibility::parse(self.lump_bytes(LumpIndex::Visibility)?)
    }

    pub fn visibility_cluster(&self, index: usize) -> Result<VisibilityCluster<'a>> {
        self.visibility()?.cluster(index)
    }
}

// ============================================================
// Header validation
// ============================================================

fn read_lump(data: &[u8], index: LumpIndex) -> Lump {
    let base = 8 + index.index() * size_of::<Lump>();
    bytemuck::pod_read_unaligned(&data[base..base + size_of::<Lump>()])
}

fn lump_range(lump: Lump, index: LumpIndex, buffer_len: usize) -> Result<std::ops::Range<usize>> {
    let offset = i64::from(lump.offset);
    let size = i64::from(lump.size);
    let malformed = || BspError::MalformedDirectory {
        lump: index,
        offset,
        size,
        buffer_len,
    };
    if offset < 0 || size < 0 || offset + size > buffer_len as i64 {
        return Err(malformed());
    }
    let start = usize::try_from(offset).map_err(|_| malformed())?;
    let end = usize::try_from(offset + size).map_err(|_| malformed())?;
    Ok(start..end)
}

fn validate(data: &[u8], options: &ReaderOptions) -> Result<()> {
    if data.len() < HEADER_SIZE {
        return Err(BspError::Truncated {
            len: data.len(),
            needed: HEADER_SIZE,
        });
    }

    let ident = [data[0], data[1], data[2], data[3]];
    if ident != IDENT {
        return Err(BspError::BadMagic(ident));
    }

    let version = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != VERSION {
        if options.check_version {
            return Err(BspError::UnexpectedVersion(version));
        }
        warn!("accepting unknown bsp version {}", version);
    }

    let mut ranges = Vec::with_capacity(HEADER_LUMPS);
    for index in LumpIndex::ALL {
        let range = lump_range(read_lump(data, index), index, data.len())?;
        trace!("lump {}: {}..{}", index, range.start, range.end);
        if !range.is_empty() {
            ranges.push((range, index));
        }
    }

    ranges.sort_by_key(|(range, _)| range.start);
    for pair in ranges.windows(2) {
        let (first, first_index) = &pair[0];
        let (second, second_index) = &pair[1];
        if second.start < first.end {
            if !options.allow_overlapping_lumps {
                return Err(BspError::OverlappingLumps {
                    first: *first_index,
                    second: *second_index,
                });
            }
            warn!("lumps {} and {} overlap", first_index, second_index);
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
