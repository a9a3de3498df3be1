//! Potentially visible set: the VISIBILITY lump.
//!
//! The lump is an 8-byte [`VisibilityHeader`] followed by one row of
//! `cluster_bytes` bytes per cluster. Bit `b` of row `a` is set when cluster
//! `a` can see cluster `b`. Rows are stored uncompressed.

use log::warn;

use crate::assembler::LumpProvider;
use crate::error::{BspError, Result};
use crate::qfiles::{LumpIndex, VisibilityHeader, VISIBILITY_HEADER_SIZE};
use crate::reader::Reader;

#[inline]
fn test_bit(row: &[u8], cluster: usize) -> bool {
    // byte cluster / 8, bit cluster % 8
    row.get(cluster >> 3)
        .is_some_and(|byte| (byte >> (cluster & 7)) & 1 != 0)
}

fn header_dims(header: &VisibilityHeader) -> Result<(usize, usize)> {
    let clusters = usize::try_from(header.clusters).map_err(|_| {
        BspError::InvalidVisibility(format!("negative cluster count {}", header.clusters))
    })?;
    let cluster_bytes = usize::try_from(header.cluster_bytes).map_err(|_| {
        BspError::InvalidVisibility(format!("negative row size {}", header.cluster_bytes))
    })?;
    Ok((clusters, cluster_bytes))
}

// ============================================================
// Borrowed view
// ============================================================

/// The VISIBILITY lump as borrowed from a [`Reader`].
#[derive(Debug, Clone, Copy)]
pub struct Visibility<'a> {
    pub header: VisibilityHeader,
    /// The cluster matrix, everything after the header.
    pub data: &'a [u8],
}

impl<'a> Visibility<'a> {
    pub fn parse(lump: &'a [u8]) -> Result<Self> {
        if lump.len() < VISIBILITY_HEADER_SIZE {
            return Err(BspError::InvalidVisibility(format!(
                "lump is {} bytes, header needs {}",
                lump.len(),
                VISIBILITY_HEADER_SIZE
            )));
        }
        let header: VisibilityHeader =
            bytemuck::pod_read_unaligned(&lump[..VISIBILITY_HEADER_SIZE]);
        let (clusters, cluster_bytes) = header_dims(&header)?;
        let data = &lump[VISIBILITY_HEADER_SIZE..];
        if clusters.saturating_mul(cluster_bytes) > data.len() {
            warn!(
                "visibility declares {} x {} bytes but holds {}",
                clusters,
                cluster_bytes,
                data.len()
            );
        }
        Ok(Self { header, data })
    }

    #[inline]
    pub fn clusters(&self) -> usize {
        self.header.clusters.max(0) as usize
    }

    #[inline]
    pub fn cluster_bytes(&self) -> usize {
        self.header.cluster_bytes.max(0) as usize
    }

    /// Row of `index`: exactly `cluster_bytes` bytes at `index * cluster_bytes`.
    pub fn cluster(&self, index: usize) -> Result<VisibilityCluster<'a>> {
        let clusters = self.clusters();
        if index >= clusters {
            return Err(BspError::ClusterOutOfRange {
                cluster: index,
                clusters,
            });
        }
        let row = self.cluster_bytes();
        let start = index * row;
        self.data
            .get(start..start + row)
            .map(|data| VisibilityCluster { data })
            .ok_or_else(|| {
                BspError::InvalidVisibility(format!("row {} runs past the end of the lump", index))
            })
    }

    /// Shorthand for `cluster(from)?.can_see(to)`.
    pub fn can_see(&self, from: usize, to: usize) -> Result<bool> {
        Ok(self.cluster(from)?.can_see(to))
    }
}

/// One row of the visibility matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityCluster<'a> {
    data: &'a [u8],
}

impl<'a> VisibilityCluster<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Whether this cluster can see `other_cluster`. Clusters beyond the row
    /// (`>= cluster_bytes * 8`) are never visible.
    #[inline]
    pub fn can_see(&self, other_cluster: usize) -> bool {
        test_bit(self.data, other_cluster)
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Indexes of every set bit, in ascending order.
    pub fn visible_clusters(&self) -> impl Iterator<Item = usize> + 'a {
        let data = self.data;
        (0..data.len() * 8).filter(move |&c| test_bit(data, c))
    }
}

// ============================================================
// Owned copy
// ============================================================

/// Editable copy of the VISIBILITY lump.
///
/// The default value stands for a map without visibility and serializes to
/// an empty lump. A value built by [`VisibilityData::new`] or copied from a
/// lump always writes its header, even when it describes zero clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityData {
    pub header: VisibilityHeader,
    pub data: Vec<u8>,
    present: bool,
}

impl VisibilityData {
    /// All-clear matrix for `clusters` clusters. Rows are padded to a multiple
    /// of 8 bytes the way map compilers lay them out.
    pub fn new(clusters: usize) -> Self {
        let cluster_bytes = (clusters.div_ceil(8) + 7) & !7;
        Self {
            header: VisibilityHeader {
                clusters: clusters as i32,
                cluster_bytes: cluster_bytes as i32,
            },
            data: vec![0; clusters * cluster_bytes],
            present: true,
        }
    }

    pub fn from_view(view: &Visibility<'_>) -> Self {
        Self {
            header: view.header,
            data: view.data.to_vec(),
            present: true,
        }
    }

    /// Copies the lump out of `reader`; an empty lump gives an empty value.
    pub fn from_reader(reader: &Reader<'_>) -> Result<Self> {
        if !reader.has_visibility() {
            return Ok(Self::default());
        }
        Ok(Self::from_view(&reader.visibility()?))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.present && self.header == VisibilityHeader::default() && self.data.is_empty()
    }

    fn row_range(&self, cluster: usize) -> Result<std::ops::Range<usize>> {
        let (clusters, cluster_bytes) = header_dims(&self.header)?;
        if cluster >= clusters {
            return Err(BspError::ClusterOutOfRange { cluster, clusters });
        }
        let start = cluster * cluster_bytes;
        let end = start + cluster_bytes;
        if end > self.data.len() {
            return Err(BspError::InvalidVisibility(format!(
                "row {} runs past the end of the matrix",
                cluster
            )));
        }
        Ok(start..end)
    }

    pub fn cluster(&self, index: usize) -> Result<VisibilityCluster<'_>> {
        let range = self.row_range(index)?;
        Ok(VisibilityCluster::new(&self.data[range]))
    }

    pub fn can_see(&self, from: usize, to: usize) -> Result<bool> {
        Ok(self.cluster(from)?.can_see(to))
    }

    pub fn set_visible(&mut self, from: usize, to: usize, visible: bool) -> Result<()> {
        let range = self.row_range(from)?;
        let row = &mut self.data[range];
        let clusters = self.header.clusters.max(0) as usize;
        let byte = row.get_mut(to >> 3).ok_or(BspError::ClusterOutOfRange {
            cluster: to,
            clusters,
        })?;
        let bit = 1u8 << (to & 7);
        if visible {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut bytes = Vec::with_capacity(VISIBILITY_HEADER_SIZE + self.data.len());
        bytes.extend_from_slice(bytemuck::bytes_of(&self.header));
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

impl LumpProvider for VisibilityData {
    fn generate_lump(&self, index: LumpIndex) -> Result<Vec<u8>> {
        if index != LumpIndex::Visibility {
            return Err(BspError::UnprovidableLump(index));
        }
        Ok(self.serialize())
    }
}

// =============================================================================
// Tests
// =============================================================================
