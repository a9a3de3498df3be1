//! RBSP map container: read a compiled map in place, edit lumps as owned
//! collections, and write a new file from any mix of sources.
//!
//! ```no_run
//! use rbsp::{Assembler, EntityArray, Reader, ReaderLumpProvider};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("maps/q3dm1.bsp")?;
//! let reader = Reader::new(&bytes)?;
//! let passthrough = ReaderLumpProvider::new(reader);
//!
//! let mut entities = EntityArray::from_reader(&reader)?;
//! entities[0].insert("message", "edited");
//!
//! let mut assembler = Assembler::with_default(&passthrough);
//! assembler.set(EntityArray::LUMP, &entities);
//! let _out = assembler.assemble()?;
//! # Ok(())
//! # }
//! ```

pub mod qfiles;
pub mod text;
pub mod error;
pub mod config;
pub mod reader;
pub mod vis;
pub mod entities;
pub mod intermediate;
pub mod assembler;

pub use assembler::{Assembler, LumpProvider, ReaderLumpProvider};
pub use config::ReaderOptions;
pub use entities::{
    Entity, EntityEncodeError, EntityEncodeErrorKind, EntityParseError, EntityParseErrorKind,
};
pub use error::{BspError, Result};
pub use intermediate::{
    BrushArray, BrushSideArray, EntityArray, FogArray, IndexArray, LeafArray, LeafBrushArray,
    LeafSurfaceArray, LightArray, LightgridArray, LightmapArray, ModelArray, NodeArray,
    PlaneArray, ShaderArray, SurfaceArray, VertexArray,
};
pub use qfiles::LumpIndex;
pub use reader::{LumpView, Reader};
pub use vis::{Visibility, VisibilityCluster, VisibilityData};
