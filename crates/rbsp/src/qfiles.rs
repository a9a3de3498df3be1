//! On-disk structures of the RBSP map format.
//!
//! Every record here is `#[repr(C)]` with no padding and derives
//! [`bytemuck::Pod`], so its byte image is exactly its file image. Records are
//! never borrowed in place out of a file buffer: lumps are packed without
//! alignment, so all decoding goes through unaligned copies (see
//! [`crate::reader::LumpView`]).

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::error::BspError;

#[cfg(target_endian = "big")]
compile_error!("RBSP records are decoded as native little-endian values");

// ============================================================
// Constants
// ============================================================

/// BSP magic: "RBSP"
pub const IDENT: [u8; 4] = *b"RBSP";
/// The only known version.
pub const VERSION: i32 = 1;

/// Fixed length of shader and fog paths, including the NUL padding.
pub const PATH_LENGTH: usize = 64;

/// Light styles per surface / vertex.
pub const LIGHTSTYLES: usize = 4;

pub const LIGHTMAP_DIM: usize = 128;
pub const LIGHTMAP_PIXELS: usize = LIGHTMAP_DIM * LIGHTMAP_DIM;
pub const LIGHTMAP_CHANNELS: usize = 3;
pub const LIGHTMAP_BYTES: usize = LIGHTMAP_PIXELS * LIGHTMAP_CHANNELS;

pub const LIGHTGRID_SIZE: [f32; 3] = [64.0, 64.0, 128.0];

pub const HEADER_LUMPS: usize = 18;
pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();

// ============================================================
// Lump directory
// ============================================================

/// Position of a lump in the header directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum LumpIndex {
    Entities = 0,
    Shaders = 1,
    Planes = 2,
    Nodes = 3,
    Leafs = 4,
    LeafSurfaces = 5,
    LeafBrushes = 6,
    Models = 7,
    Brushes = 8,
    BrushSides = 9,
    DrawVerts = 10,
    DrawIndexes = 11,
    Fogs = 12,
    Surfaces = 13,
    Lightmaps = 14,
    Lightgrid = 15,
    Visibility = 16,
    LightArray = 17,
}

impl LumpIndex {
    /// All lumps in directory order.
    pub const ALL: [LumpIndex; HEADER_LUMPS] = [
        LumpIndex::Entities,
        LumpIndex::Shaders,
        LumpIndex::Planes,
        LumpIndex::Nodes,
        LumpIndex::Leafs,
        LumpIndex::LeafSurfaces,
        LumpIndex::LeafBrushes,
        LumpIndex::Models,
        LumpIndex::Brushes,
        LumpIndex::BrushSides,
        LumpIndex::DrawVerts,
        LumpIndex::DrawIndexes,
        LumpIndex::Fogs,
        LumpIndex::Surfaces,
        LumpIndex::Lightmaps,
        LumpIndex::Lightgrid,
        LumpIndex::Visibility,
        LumpIndex::LightArray,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            LumpIndex::Entities => "entities",
            LumpIndex::Shaders => "shaders",
            LumpIndex::Planes => "planes",
            LumpIndex::Nodes => "nodes",
            LumpIndex::Leafs => "leafs",
            LumpIndex::LeafSurfaces => "leafsurfaces",
            LumpIndex::LeafBrushes => "leafbrushes",
            LumpIndex::Models => "models",
            LumpIndex::Brushes => "brushes",
            LumpIndex::BrushSides => "brushsides",
            LumpIndex::DrawVerts => "drawverts",
            LumpIndex::DrawIndexes => "drawindexes",
            LumpIndex::Fogs => "fogs",
            LumpIndex::Surfaces => "surfaces",
            LumpIndex::Lightmaps => "lightmaps",
            LumpIndex::Lightgrid => "lightgrid",
            LumpIndex::Visibility => "visibility",
            LumpIndex::LightArray => "lightarray",
        }
    }

    /// Size of one record in this lump, or `None` for lumps that are not a
    /// plain record array (entity text, visibility).
    pub fn record_size(self) -> Option<usize> {
        use std::mem::size_of;
        let size = match self {
            LumpIndex::Entities | LumpIndex::Visibility => return None,
            LumpIndex::Shaders => size_of::<Shader>(),
            LumpIndex::Planes => size_of::<Plane>(),
            LumpIndex::Nodes => size_of::<Node>(),
            LumpIndex::Leafs => size_of::<Leaf>(),
            LumpIndex::LeafSurfaces | LumpIndex::LeafBrushes | LumpIndex::DrawIndexes => {
                size_of::<i32>()
            }
            LumpIndex::Models => size_of::<Model>(),
            LumpIndex::Brushes => size_of::<Brush>(),
            LumpIndex::BrushSides => size_of::<BrushSide>(),
            LumpIndex::DrawVerts => size_of::<DrawVert>(),
            LumpIndex::Fogs => size_of::<Fog>(),
            LumpIndex::Surfaces => size_of::<Surface>(),
            LumpIndex::Lightmaps => size_of::<Lightmap>(),
            LumpIndex::Lightgrid => size_of::<Lightgrid>(),
            LumpIndex::LightArray => size_of::<u16>(),
        };
        Some(size)
    }
}

impl TryFrom<usize> for LumpIndex {
    type Error = BspError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        LumpIndex::ALL
            .get(index)
            .copied()
            .ok_or(BspError::InvalidLumpIndex(index))
    }
}

impl fmt::Display for LumpIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Lump {
    /// Byte offset from the start of the file, not from the end of the header.
    pub offset: i32,
    pub size: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Header {
    pub ident: [u8; 4],
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

impl Default for Header {
    fn default() -> Self {
        Self {
            ident: IDENT,
            version: VERSION,
            lumps: [Lump::default(); HEADER_LUMPS],
        }
    }
}

// ============================================================
// Records
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Shader {
    /// NUL padded unless the path fills all 64 bytes.
    pub shader: [u8; PATH_LENGTH],
    pub surface_flags: i32,
    pub content_flags: i32,
}

impl Shader {
    /// Path bytes up to the first NUL.
    pub fn path_bytes(&self) -> &[u8] {
        trim_path(&self.shader)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Plane {
    pub normal: [f32; 3],
    pub dist: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Node {
    pub plane: i32,
    /// Node index if >= 0, otherwise `-(leaf + 1)`.
    pub children: [i32; 2],
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Leaf {
    /// Visibility cluster, -1 if outside.
    pub cluster: i32,
    pub area: i32,
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
    pub first_surface: i32,
    pub num_surfaces: i32,
    pub first_brush: i32,
    pub num_brushes: i32,
}

/// Model 0 is the static world, the rest are movers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Model {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub first_surface: i32,
    pub num_surfaces: i32,
    pub first_brush: i32,
    pub num_brushes: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Brush {
    pub first_side: i32,
    pub num_sides: i32,
    pub shader: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct BrushSide {
    pub plane: i32,
    pub shader: i32,
    /// Written by compilers, ignored by games.
    pub surface: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawVert {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    pub lightmap: [[f32; 2]; LIGHTSTYLES],
    pub normal: [f32; 3],
    pub color: [[u8; 4]; LIGHTSTYLES],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Fog {
    pub shader: [u8; PATH_LENGTH],
    pub brush: i32,
    /// Brush side index, or -1 if none.
    pub visible_side: i32,
}

impl Fog {
    pub fn shader_path(&self) -> &[u8] {
        trim_path(&self.shader)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SurfaceType {
    Bad = 0,
    Planar = 1,
    Patch = 2,
    TriangleSoup = 3,
    Flare = 4,
}

impl TryFrom<i32> for SurfaceType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SurfaceType::Bad),
            1 => Ok(SurfaceType::Planar),
            2 => Ok(SurfaceType::Patch),
            3 => Ok(SurfaceType::TriangleSoup),
            4 => Ok(SurfaceType::Flare),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Surface {
    pub shader: i32,
    pub fog: i32,
    /// See [`SurfaceType`]; kept raw so unknown tags survive a rewrite.
    pub surface_type: i32,
    pub vert_idx: i32,
    pub vert_count: i32,
    pub index_idx: i32,
    pub index_count: i32,
    pub lightmap_styles: [u8; LIGHTSTYLES],
    pub vertex_styles: [u8; LIGHTSTYLES],
    pub lightmap: [i32; LIGHTSTYLES],
    pub lightmap_x: [i32; LIGHTSTYLES],
    pub lightmap_y: [i32; LIGHTSTYLES],
    pub lightmap_width: i32,
    pub lightmap_height: i32,
    /// Flare origin for flares, unused otherwise.
    pub lightmap_origin: [f32; 3],
    // flare: color and normal in [0] and [2]; patch: bounds in [0] and [1]
    pub lightmap_vectors: [[f32; 3]; 3],
    pub patch_width: i32,
    pub patch_height: i32,
}

impl Surface {
    pub fn kind(&self) -> Option<SurfaceType> {
        SurfaceType::try_from(self.surface_type).ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Lightmap {
    pub pixels: [[Color; LIGHTMAP_DIM]; LIGHTMAP_DIM],
}

impl Lightmap {
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Color {
        self.pixels[y][x]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        self.pixels[y][x] = color;
    }
}

impl Default for Lightmap {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

impl fmt::Debug for Lightmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lightmap")
            .field("dim", &LIGHTMAP_DIM)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Lightgrid {
    pub ambient: [Color; LIGHTSTYLES],
    pub direct: [Color; LIGHTSTYLES],
    pub styles: [u8; LIGHTSTYLES],
    /// Direction of the direct light, packed as two angles.
    pub latitude: u8,
    pub longitude: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct VisibilityHeader {
    pub clusters: i32,
    /// Bytes per cluster row; `clusters * cluster_bytes` bytes follow.
    pub cluster_bytes: i32,
}

pub const VISIBILITY_HEADER_SIZE: usize = std::mem::size_of::<VisibilityHeader>();

fn trim_path(path: &[u8; PATH_LENGTH]) -> &[u8] {
    let end = path.iter().position(|&b| b == 0).unwrap_or(PATH_LENGTH);
    &path[..end]
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    // =========================================================================
    // Struct size verification
    // =========================================================================

    #[test]
    fn size_of_header() {
        // ident(4) + version(4) + 18 * Lump(8) = 152
        assert_eq!(size_of::<Header>(), 152);
        assert_eq!(HEADER_SIZE, 8 + HEADER_LUMPS * size_of::<Lump>());
    }

    #[test]
    fn size_of_lump() {
        assert_eq!(size_of::<Lump>(), 8);
    }

    #[test]
    fn size_of_records() {
        assert_eq!(size_of::<Shader>(), 72);
        assert_eq!(size_of::<Plane>(), 16);
        assert_eq!(size_of::<Node>(), 36);
        assert_eq!(size_of::<Leaf>(), 48);
        assert_eq!(size_of::<Model>(), 40);
        assert_eq!(size_of::<Brush>(), 12);
        assert_eq!(size_of::<BrushSide>(), 12);
        assert_eq!(size_of::<DrawVert>(), 80);
        assert_eq!(size_of::<Fog>(), 72);
        assert_eq!(size_of::<Surface>(), 148);
        assert_eq!(size_of::<Color>(), 3);
        assert_eq!(size_of::<Lightmap>(), LIGHTMAP_BYTES);
        assert_eq!(size_of::<Lightgrid>(), 30);
        assert_eq!(size_of::<VisibilityHeader>(), 8);
    }

    // =========================================================================
    // Directory order
    // =========================================================================

    #[test]
    fn lump_order_is_fixed() {
        assert_eq!(LumpIndex::ALL.len(), HEADER_LUMPS);
        for (i, lump) in LumpIndex::ALL.iter().enumerate() {
            assert_eq!(lump.index(), i);
            assert_eq!(LumpIndex::try_from(i).unwrap(), *lump);
        }
        assert_eq!(LumpIndex::Entities.index(), 0);
        assert_eq!(LumpIndex::Shaders.index(), 1);
        assert_eq!(LumpIndex::Planes.index(), 2);
        assert_eq!(LumpIndex::Visibility.index(), 16);
        assert_eq!(LumpIndex::LightArray.index(), 17);
    }

    #[test]
    fn lump_index_out_of_range() {
        assert!(matches!(
            LumpIndex::try_from(18usize),
            Err(BspError::InvalidLumpIndex(18))
        ));
    }

    #[test]
    fn header_layout() {
        let mut header = Header::default();
        header.lumps[1] = Lump {
            offset: 152,
            size: 72,
        };
        let bytes = bytemuck::bytes_of(&header);
        assert_eq!(&bytes[0..4], b"RBSP");
        assert_eq!(&bytes[4..8], &1i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &152i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &72i32.to_le_bytes());
    }

    #[test]
    fn shader_path_stops_at_nul() {
        let mut shader = Shader::zeroed();
        shader.shader[..8].copy_from_slice(b"textures");
        assert_eq!(shader.path_bytes(), b"textures");

        shader.shader = [b'a'; PATH_LENGTH];
        assert_eq!(shader.path_bytes().len(), PATH_LENGTH);
    }

    #[test]
    fn surface_kind() {
        let mut surface = Surface::default();
        surface.surface_type = 2;
        assert_eq!(surface.kind(), Some(SurfaceType::Patch));
        surface.surface_type = 9;
        assert_eq!(surface.kind(), None);
    }
}
