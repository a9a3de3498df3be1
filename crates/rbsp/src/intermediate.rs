//! Owned, editable copies of lumps.
//!
//! Each collection deep-copies its lump out of a [`Reader`], behaves like a
//! `Vec` of its record type (through `Deref`/`DerefMut`) and serializes back to
//! the on-disk bytes in the same order. Order matters: other lumps refer to
//! records by position.

use std::mem::size_of;
use std::ops::{Deref, DerefMut};

use bytemuck::Pod;
use log::trace;
use rayon::prelude::*;

use crate::assembler::LumpProvider;
use crate::entities::{self, Entity};
use crate::error::{BspError, Result};
use crate::qfiles::{
    self, Brush, BrushSide, DrawVert, Fog, Leaf, Lightgrid, Lightmap, LumpIndex, Model, Node,
    Plane, Surface, PATH_LENGTH,
};
use crate::reader::{LumpView, Reader};
use crate::text;

/// Record count above which copies out of a reader are split across threads.
const PARALLEL_LUMP_THRESHOLD: usize = 4096;

fn copy_records<T: Pod + Send>(view: LumpView<'_, T>) -> Vec<T> {
    if let Some(records) = view.try_as_slice() {
        return records.to_vec();
    }
    if view.len() >= PARALLEL_LUMP_THRESHOLD {
        view.as_bytes()
            .par_chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    } else {
        view.iter().collect()
    }
}

macro_rules! collection_traits {
    ($name:ident, $item:ty) => {
        impl Deref for $name {
            type Target = Vec<$item>;

            fn deref(&self) -> &Vec<$item> {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Vec<$item> {
                &mut self.0
            }
        }

        impl From<Vec<$item>> for $name {
            fn from(items: Vec<$item>) -> Self {
                Self(items)
            }
        }

        impl FromIterator<$item> for $name {
            fn from_iter<I: IntoIterator<Item = $item>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }

        impl IntoIterator for $name {
            type Item = $item;
            type IntoIter = std::vec::IntoIter<$item>;

            fn into_iter(self) -> Self::IntoIter {
                self.0.into_iter()
            }
        }
    };
}

/// A collection of fixed-layout records whose byte image is written as is.
macro_rules! record_array {
    ($(#[$meta:meta])* $name:ident, $record:ty, $lump:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name(Vec<$record>);

        impl $name {
            pub const LUMP: LumpIndex = $lump;

            pub fn new() -> Self {
                Self(Vec::new())
            }

            pub fn from_view(view: LumpView<'_, $record>) -> Self {
                trace!("copying {} records of {}", view.len(), Self::LUMP);
                Self(copy_records(view))
            }

            pub fn from_reader(reader: &Reader<'_>) -> Result<Self> {
                let view = reader.get_data_span::<$record>(Self::LUMP, 0)?;
                Ok(Self::from_view(view))
            }

            pub fn serialize(&self) -> Vec<u8> {
                bytemuck::cast_slice::<$record, u8>(&self.0).to_vec()
            }

            pub fn into_inner(self) -> Vec<$record> {
                self.0
            }
        }

        collection_traits!($name, $record);

        impl LumpProvider for $name {
            fn generate_lump(&self, index: LumpIndex) -> Result<Vec<u8>> {
                if index != Self::LUMP {
                    return Err(BspError::UnprovidableLump(index));
                }
                Ok(self.serialize())
            }
        }
    };
}

record_array!(PlaneArray, Plane, LumpIndex::Planes);
record_array!(NodeArray, Node, LumpIndex::Nodes);
record_array!(LeafArray, Leaf, LumpIndex::Leafs);
record_array!(
    /// Surface indexes referenced by leafs.
    LeafSurfaceArray,
    i32,
    LumpIndex::LeafSurfaces
);
record_array!(
    /// Brush indexes referenced by leafs.
    LeafBrushArray,
    i32,
    LumpIndex::LeafBrushes
);
record_array!(ModelArray, Model, LumpIndex::Models);
record_array!(BrushArray, Brush, LumpIndex::Brushes);
record_array!(BrushSideArray, BrushSide, LumpIndex::BrushSides);
record_array!(VertexArray, DrawVert, LumpIndex::DrawVerts);
record_array!(
    /// Triangle indexes, relative to a surface's first vertex.
    IndexArray,
    i32,
    LumpIndex::DrawIndexes
);
record_array!(FogArray, Fog, LumpIndex::Fogs);
record_array!(SurfaceArray, Surface, LumpIndex::Surfaces);
record_array!(LightmapArray, Lightmap, LumpIndex::Lightmaps);
record_array!(LightgridArray, Lightgrid, LumpIndex::Lightgrid);
record_array!(LightArray, u16, LumpIndex::LightArray);

// ============================================================
// Entities
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityArray(Vec<Entity>);

impl EntityArray {
    pub const LUMP: LumpIndex = LumpIndex::Entities;

    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn parse<T: AsRef<[u8]> + ?Sized>(text: &T) -> Result<Self> {
        Ok(Self(entities::parse(text)?))
    }

    pub fn from_reader(reader: &Reader<'_>) -> Result<Self> {
        Self::parse(reader.get_string_bytes(Self::LUMP)?)
    }

    pub fn stringify(&self) -> String {
        entities::stringify(&self.0)
    }

    /// Entity text plus the NUL terminator the lump is stored with. Fails if a
    /// key or value holds `"`, NUL or a character above U+00FF.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut bytes = entities::encode(&self.0)?;
        bytes.push(0);
        Ok(bytes)
    }

    pub fn find_by_classname<'s>(
        &'s self,
        classname: &'s str,
    ) -> impl Iterator<Item = &'s Entity> {
        self.0.iter().filter(move |ent| {
            ent.classname()
                .is_some_and(|c| c.eq_ignore_ascii_case(classname))
        })
    }

    pub fn into_inner(self) -> Vec<Entity> {
        self.0
    }
}

collection_traits!(EntityArray, Entity);

impl LumpProvider for EntityArray {
    fn generate_lump(&self, index: LumpIndex) -> Result<Vec<u8>> {
        if index != Self::LUMP {
            return Err(BspError::UnprovidableLump(index));
        }
        self.serialize()
    }
}

// ============================================================
// Shaders
// ============================================================

/// A shader entry with its path as an owned string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shader {
    pub path: String,
    pub surface_flags: i32,
    pub content_flags: i32,
}

impl Shader {
    pub fn new(path: impl Into<String>, surface_flags: i32, content_flags: i32) -> Self {
        Self {
            path: path.into(),
            surface_flags,
            content_flags,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderArray(Vec<Shader>);

impl ShaderArray {
    pub const LUMP: LumpIndex = LumpIndex::Shaders;

    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Copies each path up to its NUL terminator, one character per byte.
    pub fn from_view(view: LumpView<'_, qfiles::Shader>) -> Self {
        view.iter()
            .map(|raw| {
                let path = text::decode(raw.path_bytes());
                Shader::new(path, raw.surface_flags, raw.content_flags)
            })
            .collect()
    }

    pub fn from_reader(reader: &Reader<'_>) -> Result<Self> {
        Ok(Self::from_view(reader.shaders()?))
    }

    /// Case-insensitive lookup by path.
    pub fn find(&self, path: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|shader| shader.path.eq_ignore_ascii_case(path))
    }

    /// Index of `path`, appending a new entry with the given flags if absent.
    pub fn find_or_insert(&mut self, path: &str, surface_flags: i32, content_flags: i32) -> usize {
        if let Some(index) = self.find(path) {
            return index;
        }
        self.0.push(Shader::new(path, surface_flags, content_flags));
        self.0.len() - 1
    }

    /// Paths shorter than 64 bytes are NUL padded, a 64 byte path fills the
    /// field with no terminator, and anything longer is an error. So is a path
    /// that would not read back the same: one holding NUL or a character
    /// above U+00FF.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.0.len() * size_of::<qfiles::Shader>());
        for (index, shader) in self.0.iter().enumerate() {
            let invalid = || BspError::InvalidShaderPath {
                index,
                path: shader.path.clone(),
            };
            if shader.path.contains('\0') {
                return Err(invalid());
            }
            let path = text::encode(&shader.path).map_err(|_| invalid())?;
            if path.len() > PATH_LENGTH {
                return Err(BspError::PathTooLong {
                    index,
                    len: path.len(),
                    limit: PATH_LENGTH,
                });
            }
            let mut raw = qfiles::Shader {
                shader: [0; PATH_LENGTH],
                surface_flags: shader.surface_flags,
                content_flags: shader.content_flags,
            };
            raw.shader[..path.len()].copy_from_slice(&path);
            bytes.extend_from_slice(bytemuck::bytes_of(&raw));
        }
        Ok(bytes)
    }

    pub fn into_inner(self) -> Vec<Shader> {
        self.0
    }
}

collection_traits!(ShaderArray, Shader);

impl LumpProvider for ShaderArray {
    fn generate_lump(&self, index: LumpIndex) -> Result<Vec<u8>> {
        if index != Self::LUMP {
            return Err(BspError::UnprovidableLump(index));
        }
        self.serialize()
    }
}

// =============================================================================
// Tests
// =============================================================================
