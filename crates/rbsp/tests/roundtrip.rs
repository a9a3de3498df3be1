//! Whole-file read, edit and rebuild of a synthetic map with every lump filled.

use rbsp::qfiles::{
    Brush, BrushSide, Color, DrawVert, Fog, Header, Leaf, Lightgrid, Lightmap, Lump, Model, Node,
    Plane, Shader, Surface, SurfaceType, HEADER_LUMPS, HEADER_SIZE, PATH_LENGTH,
};
use rbsp::{
    Assembler, BrushArray, BrushSideArray, BspError, EntityArray, FogArray, IndexArray, LeafArray,
    LeafBrushArray, LeafSurfaceArray, LightArray, LightgridArray, LightmapArray, LumpIndex,
    LumpProvider, ModelArray, NodeArray, PlaneArray, Reader, ReaderLumpProvider, ShaderArray,
    SurfaceArray, VertexArray, VisibilityData,
};

const ENTITIES: &str = "{\n\"classname\" \"worldspawn\"\n\"message\" \"test map\"\n}\n\
                        {\n\"classname\" \"light\"\n\"origin\" \"0 0 64\"\n}\n";

const LIT: Color = Color {
    r: 10,
    g: 20,
    b: 30,
};

fn path(s: &str) -> [u8; PATH_LENGTH] {
    let mut out = [0; PATH_LENGTH];
    out[..s.len()].copy_from_slice(s.as_bytes());
    out
}

fn bytes<T: bytemuck::Pod>(records: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(records).to_vec()
}

fn planes() -> Vec<Plane> {
    vec![
        Plane {
            normal: [1.0, 0.0, 0.0],
            dist: 128.0,
        },
        Plane {
            normal: [0.0, 1.0, 0.0],
            dist: -64.0,
        },
        Plane {
            normal: [0.0, 0.0, 1.0],
            dist: 0.5,
        },
    ]
}

/// Lump contents indexed by directory slot.
fn sample_lumps() -> Vec<Vec<u8>> {
    let mut entities = ENTITIES.as_bytes().to_vec();
    entities.push(0);

    let shaders = [
        Shader {
            shader: path("textures/base/floor"),
            surface_flags: 0,
            content_flags: 1,
        },
        Shader {
            shader: path("textures/base/wall"),
            surface_flags: 0x10,
            content_flags: 1,
        },
    ];
    let nodes = [Node {
        plane: 0,
        children: [-1, -2],
        mins: [-64; 3],
        maxs: [64; 3],
    }];
    let leafs = [
        Leaf {
            cluster: 0,
            first_surface: 0,
            num_surfaces: 1,
            ..Default::default()
        },
        Leaf {
            cluster: 1,
            first_surface: 1,
            num_surfaces: 1,
            ..Default::default()
        },
    ];
    let models = [Model {
        mins: [-64.0; 3],
        maxs: [64.0; 3],
        num_surfaces: 2,
        num_brushes: 1,
        ..Default::default()
    }];
    let brushes = [Brush {
        first_side: 0,
        num_sides: 2,
        shader: 1,
    }];
    let brush_sides = [
        BrushSide {
            plane: 0,
            shader: 1,
            surface: -1,
        },
        BrushSide {
            plane: 1,
            shader: 1,
            surface: -1,
        },
    ];
    let verts: Vec<DrawVert> = (0..4)
        .map(|i| DrawVert {
            pos: [i as f32, 0.0, 0.0],
            uv: [0.25 * i as f32, 1.0],
            normal: [0.0, 0.0, 1.0],
            color: [[255; 4]; 4],
            ..Default::default()
        })
        .collect();
    let indexes: [i32; 6] = [0, 1, 2, 2, 1, 3];
    let fogs = [Fog {
        shader: path("textures/fog/thick"),
        brush: 0,
        visible_side: -1,
    }];
    let surfaces = [
        Surface {
            shader: 0,
            fog: -1,
            surface_type: SurfaceType::Planar as i32,
            vert_count: 4,
            index_count: 6,
            ..Default::default()
        },
        Surface {
            shader: 1,
            fog: 0,
            surface_type: SurfaceType::Patch as i32,
            patch_width: 3,
            patch_height: 3,
            ..Default::default()
        },
    ];
    let mut lightmap = Lightmap::default();
    lightmap.set_pixel(5, 7, LIT);
    let lightgrid = [
        Lightgrid {
            latitude: 12,
            longitude: 200,
            ..Default::default()
        },
        Lightgrid {
            ambient: [Color { r: 1, g: 2, b: 3 }; 4],
            ..Default::default()
        },
    ];
    // 2 clusters, 8-byte rows; each cluster sees itself, 0 also sees 1
    let mut visibility = Vec::new();
    visibility.extend_from_slice(&2i32.to_le_bytes());
    visibility.extend_from_slice(&8i32.to_le_bytes());
    visibility.extend_from_slice(&[0b11, 0, 0, 0, 0, 0, 0, 0]);
    visibility.extend_from_slice(&[0b10, 0, 0, 0, 0, 0, 0, 0]);
    let light_array: [u16; 3] = [0, 1, 0xffff];

    let lumps = vec![
        entities,
        bytes(&shaders),
        bytes(&planes()),
        bytes(&nodes),
        bytes(&leafs),
        bytes(&[0i32, 1]),
        bytes(&[0i32]),
        bytes(&models),
        bytes(&brushes),
        bytes(&brush_sides),
        bytes(&verts),
        bytes(&indexes),
        bytes(&fogs),
        bytes(&surfaces),
        bytemuck::bytes_of(&lightmap).to_vec(),
        bytes(&lightgrid),
        visibility,
        bytes(&light_array),
    ];
    assert_eq!(lumps.len(), HEADER_LUMPS);
    lumps
}

/// Lays lumps out in directory order with `slack` filler bytes before each.
fn pack(lumps: &[Vec<u8>], slack: usize) -> Vec<u8> {
    let mut header = Header::default();
    let mut out = vec![0u8; HEADER_SIZE];
    for (slot, lump) in lumps.iter().enumerate() {
        out.resize(out.len() + slack, 0xcd);
        header.lumps[slot] = Lump {
            offset: out.len() as i32,
            size: lump.len() as i32,
        };
        out.extend_from_slice(lump);
    }
    out[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
    out
}

#[test]
fn passthrough_is_byte_identical() {
    let input = pack(&sample_lumps(), 0);
    let reader = Reader::new(&input).unwrap();
    let provider = ReaderLumpProvider::new(reader);
    let assembler = Assembler::with_default(&provider);
    assert_eq!(assembler.assemble().unwrap(), input);
    assert_eq!(assembler.assemble_parallel().unwrap(), input);
}

#[test]
fn provider_returns_each_span() {
    let lumps = sample_lumps();
    let input = pack(&lumps, 0);
    let provider = ReaderLumpProvider::from(Reader::new(&input).unwrap());
    for index in LumpIndex::ALL {
        assert_eq!(
            provider.generate_lump(index).unwrap(),
            lumps[index.index()],
            "{}",
            index
        );
    }
}

#[test]
fn typed_views() {
    let input = pack(&sample_lumps(), 0);
    let reader = Reader::new(&input).unwrap();

    assert_eq!(reader.entities().unwrap(), ENTITIES);
    let ents = reader.entities_parsed().unwrap();
    assert_eq!(ents.len(), 2);
    assert_eq!(ents[1].get("origin"), Some("0 0 64"));

    let shaders = reader.shaders().unwrap();
    assert_eq!(shaders.len(), 2);
    let wall = shaders.get(1).unwrap();
    assert_eq!(wall.path_bytes(), b"textures/base/wall");

    assert_eq!(reader.planes().unwrap().to_vec(), planes());
    assert_eq!(reader.draw_verts().unwrap().len(), 4);
    assert_eq!(
        reader.draw_indexes().unwrap().to_vec(),
        vec![0, 1, 2, 2, 1, 3]
    );
    let fog = reader.fogs().unwrap().get(0).unwrap();
    assert_eq!(fog.shader_path(), b"textures/fog/thick");

    let surfaces = reader.surfaces().unwrap();
    let planar = surfaces.get(0).unwrap();
    assert_eq!(planar.kind(), Some(SurfaceType::Planar));
    let patch = surfaces.get(1).unwrap();
    assert_eq!(patch.kind(), Some(SurfaceType::Patch));

    let lightmap = reader.lightmaps().unwrap().get(0).unwrap();
    assert_eq!(lightmap.pixel(5, 7), LIT);
    assert_eq!(lightmap.pixel(7, 5), Color::default());

    assert_eq!(reader.lightgrid().unwrap().len(), 2);
    assert_eq!(reader.light_array().unwrap().to_vec(), vec![0, 1, 0xffff]);

    assert!(reader.has_visibility());
    let vis = reader.visibility().unwrap();
    assert_eq!(vis.clusters(), 2);
    assert!(vis.can_see(0, 1).unwrap());
    assert!(!vis.can_see(1, 0).unwrap());
    assert!(reader.visibility_cluster(1).unwrap().can_see(1));
}

#[test]
fn promoted_collections_reassemble() {
    let input = pack(&sample_lumps(), 0);
    let reader = Reader::new(&input).unwrap();

    let entities = EntityArray::from_reader(&reader).unwrap();
    let shaders = ShaderArray::from_reader(&reader).unwrap();
    let planes = PlaneArray::from_reader(&reader).unwrap();
    let nodes = NodeArray::from_reader(&reader).unwrap();
    let leafs = LeafArray::from_reader(&reader).unwrap();
    let leaf_surfaces = LeafSurfaceArray::from_reader(&reader).unwrap();
    let leaf_brushes = LeafBrushArray::from_reader(&reader).unwrap();
    let models = ModelArray::from_reader(&reader).unwrap();
    let brushes = BrushArray::from_reader(&reader).unwrap();
    let brush_sides = BrushSideArray::from_reader(&reader).unwrap();
    let verts = VertexArray::from_reader(&reader).unwrap();
    let indexes = IndexArray::from_reader(&reader).unwrap();
    let fogs = FogArray::from_reader(&reader).unwrap();
    let surfaces = SurfaceArray::from_reader(&reader).unwrap();
    let lightmaps = LightmapArray::from_reader(&reader).unwrap();
    let lightgrid = LightgridArray::from_reader(&reader).unwrap();
    let visibility = VisibilityData::from_reader(&reader).unwrap();
    let light_array = LightArray::from_reader(&reader).unwrap();

    let mut assembler = Assembler::new();
    assembler
        .set(LumpIndex::Entities, &entities)
        .set(LumpIndex::Shaders, &shaders)
        .set(LumpIndex::Planes, &planes)
        .set(LumpIndex::Nodes, &nodes)
        .set(LumpIndex::Leafs, &leafs)
        .set(LumpIndex::LeafSurfaces, &leaf_surfaces)
        .set(LumpIndex::LeafBrushes, &leaf_brushes)
        .set(LumpIndex::Models, &models)
        .set(LumpIndex::Brushes, &brushes)
        .set(LumpIndex::BrushSides, &brush_sides)
        .set(LumpIndex::DrawVerts, &verts)
        .set(LumpIndex::DrawIndexes, &indexes)
        .set(LumpIndex::Fogs, &fogs)
        .set(LumpIndex::Surfaces, &surfaces)
        .set(LumpIndex::Lightmaps, &lightmaps)
        .set(LumpIndex::Lightgrid, &lightgrid)
        .set(LumpIndex::Visibility, &visibility)
        .set(LumpIndex::LightArray, &light_array);
    assert!(assembler.missing().is_empty());
    assert_eq!(assembler.assemble().unwrap(), input);
}

#[test]
fn edits_are_written_back() {
    let input = pack(&sample_lumps(), 0);
    let reader = Reader::new(&input).unwrap();
    let passthrough = ReaderLumpProvider::new(reader);

    let mut entities = EntityArray::from_reader(&reader).unwrap();
    entities[0].insert("message", "edited");
    entities[0].insert("music", "track1");

    let mut shaders = ShaderArray::from_reader(&reader).unwrap();
    assert_eq!(shaders.find_or_insert("TEXTURES/BASE/WALL", 0, 0), 1);
    assert_eq!(shaders.find_or_insert("textures/sky/stars", 4, 0), 2);

    let mut assembler = Assembler::with_default(&passthrough);
    assembler
        .set(EntityArray::LUMP, &entities)
        .set(ShaderArray::LUMP, &shaders);
    let output = assembler.assemble().unwrap();

    let edited = Reader::new(&output).unwrap();
    let ents = edited.entities_parsed().unwrap();
    assert_eq!(ents[0].get("message"), Some("edited"));
    assert_eq!(ents[0].get("music"), Some("track1"));
    assert_eq!(ents[1], reader.entities_parsed().unwrap()[1]);

    let edited_shaders = edited.shaders().unwrap();
    assert_eq!(edited_shaders.len(), 3);
    let sky = edited_shaders.get(2).unwrap();
    assert_eq!(sky.path_bytes(), b"textures/sky/stars");
    assert_eq!(sky.surface_flags, 4);

    for index in LumpIndex::ALL.into_iter().skip(2) {
        assert_eq!(
            edited.lump_bytes(index).unwrap(),
            reader.lump_bytes(index).unwrap(),
            "{}",
            index
        );
    }
}

#[test]
fn slack_is_removed_on_rebuild() {
    let lumps = sample_lumps();
    let tight = pack(&lumps, 0);
    let loose = pack(&lumps, 3);
    assert!(loose.len() > tight.len());

    let reader = Reader::new(&loose).unwrap();
    // offsets are no longer 4-aligned, so records are read unaligned
    assert_eq!(reader.planes().unwrap().to_vec(), planes());

    let provider = ReaderLumpProvider::new(reader);
    let rebuilt = Assembler::with_default(&provider).assemble().unwrap();
    assert_eq!(rebuilt, tight);

    let promoted = PlaneArray::from_reader(&reader).unwrap();
    assert_eq!(promoted.into_inner(), planes());
}

#[test]
fn corrupt_directory_is_rejected() {
    let mut input = pack(&sample_lumps(), 0);
    let bad = Lump {
        offset: input.len() as i32 - 4,
        size: 16,
    };
    let at = HEADER_SIZE - HEADER_LUMPS * 8 + LumpIndex::Planes.index() * 8;
    input[at..at + 8].copy_from_slice(bytemuck::bytes_of(&bad));

    match Reader::new(&input) {
        Err(BspError::MalformedDirectory { lump, .. }) => assert_eq!(lump, LumpIndex::Planes),
        other => panic!(
            "expected a malformed directory, got {:?}",
            other.map(|_| ())
        ),
    }
}

#[test]
fn long_shader_path_fails_assembly() {
    let input = pack(&sample_lumps(), 0);
    let reader = Reader::new(&input).unwrap();
    let passthrough = ReaderLumpProvider::new(reader);

    let mut shaders = ShaderArray::from_reader(&reader).unwrap();
    shaders.find_or_insert(&"x".repeat(PATH_LENGTH + 1), 0, 0);
    let mut assembler = Assembler::with_default(&passthrough);
    assembler.set(ShaderArray::LUMP, &shaders);
    assert!(matches!(
        assembler.assemble(),
        Err(BspError::PathTooLong {
            index: 2,
            len: 65,
            limit: 64
        })
    ));
}

#[test]
fn zero_cluster_visibility_is_kept() {
    let mut lumps = sample_lumps();
    lumps[LumpIndex::Visibility.index()] = vec![0; 8];
    let input = pack(&lumps, 0);
    let reader = Reader::new(&input).unwrap();
    let passthrough = ReaderLumpProvider::new(reader);

    let visibility = VisibilityData::from_reader(&reader).unwrap();
    assert_eq!(visibility.header.clusters, 0);
    let mut assembler = Assembler::with_default(&passthrough);
    assembler.set(LumpIndex::Visibility, &visibility);
    let output = assembler.assemble().unwrap();
    assert_eq!(output, input);
    let rebuilt = Reader::new(&output).unwrap();
    assert_eq!(rebuilt.get_lump(LumpIndex::Visibility).size, 8);
}

#[test]
fn latin1_entities_survive_promotion() {
    let mut lumps = sample_lumps();
    lumps[LumpIndex::Entities.index()] = b"{\n\"message\" \"caf\xe9\"\n}\n\0".to_vec();
    let input = pack(&lumps, 0);
    let reader = Reader::new(&input).unwrap();
    let passthrough = ReaderLumpProvider::new(reader);

    let entities = EntityArray::from_reader(&reader).unwrap();
    assert_eq!(entities[0].get("message"), Some("caf\u{e9}"));
    let mut assembler = Assembler::with_default(&passthrough);
    assembler.set(EntityArray::LUMP, &entities);
    assert_eq!(assembler.assemble().unwrap(), input);
}
