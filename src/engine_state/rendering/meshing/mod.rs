//! Mesh generation for chunk rendering.
//!
//! This module turns the blocks of one chunk into a [`ChunkMesh`]: one quad
//! for every visible block face, shaded with per-corner ambient occlusion.
//!
//! # Architecture
//! - `MeshBuilder`: Entry point, owns the per-side face tables
//! - `face`: Corner geometry, occlusion levels and the diagonal split
//! - `neighborhood`: The 3×3×3 block window around the block being meshed
//! - `mesh`: The vertex and index buffers of a finished mesh
//!
//! # Border First
//! Blocks on the chunk border need their neighbors from adjacent chunks,
//! which may not be loaded yet. The builder meshes those blocks first and
//! gives up as soon as one neighbor is pending, so an incomplete mesh never
//! pays for its interior.
//!
//! # Performance Considerations
//! - Interior neighborhoods are read straight from the grid, no accessor calls
//! - Only occupied blocks are visited, via the grid's occupancy bitmap
//! - Face tables are computed once per builder

use cgmath::Point3;

use crate::engine_state::voxels::block::BlockCatalog;
use crate::engine_state::voxels::chunk::BlockGrid;
use crate::engine_state::voxels::coords::{chunk_origin, ChunkIndex};
use crate::engine_state::voxels::window_cache::BlockAccess;

use super::vertex::Vertex;

pub mod face;
mod mesh;
pub mod neighborhood;

pub use mesh::{ChunkMesh, QUAD_INDEX_PATTERN};

use face::{brightness, diagonal_order, rotated_uv, FaceGeometry};
use neighborhood::{is_border, Neighborhood};

/// Builds chunk meshes against a block catalog.
pub struct MeshBuilder<'a> {
    catalog: &'a BlockCatalog,
    faces: [FaceGeometry; 6],
    ambient_occlusion: bool,
}

impl<'a> MeshBuilder<'a> {
    /// Creates a builder with ambient occlusion enabled.
    pub fn new(catalog: &'a BlockCatalog) -> Self {
        Self {
            catalog,
            faces: FaceGeometry::all(),
            ambient_occlusion: true,
        }
    }

    /// Enables or disables ambient occlusion. Disabled, every vertex has
    /// brightness 1.0 and every quad uses the default diagonal.
    pub fn with_ambient_occlusion(mut self, enabled: bool) -> Self {
        self.ambient_occlusion = enabled;
        self
    }

    /// Meshes the chunk at `index` whose blocks are `grid`.
    ///
    /// # Arguments
    /// * `grid` - The chunk's blocks
    /// * `index` - The chunk's index, used to place border lookups
    /// * `access` - Resolves blocks in neighboring chunks
    ///
    /// # Returns
    /// The mesh in chunk-local coordinates, or `None` if a neighboring chunk
    /// the border needs is still pending
    pub fn build(
        &self,
        grid: &BlockGrid,
        index: ChunkIndex,
        access: &impl BlockAccess,
    ) -> Option<ChunkMesh> {
        let mut mesh = ChunkMesh::new();
        if grid.is_empty() {
            return Some(mesh);
        }
        let origin = chunk_origin(index);

        for (local, _) in grid.occupied().filter(|(local, _)| is_border(*local)) {
            let neighborhood = Neighborhood::border(grid, origin, local, access)?;
            self.mesh_block(&mut mesh, local, &neighborhood);
        }
        for (local, _) in grid.occupied().filter(|(local, _)| !is_border(*local)) {
            let neighborhood = Neighborhood::interior(grid, local);
            self.mesh_block(&mut mesh, local, &neighborhood);
        }

        Some(mesh)
    }

    fn mesh_block(&self, mesh: &mut ChunkMesh, local: Point3<i32>, neighborhood: &Neighborhood) {
        let block = neighborhood.center();
        let Some(definition) = self.catalog.definition(block) else {
            return;
        };

        for face in &self.faces {
            if !face.is_visible(neighborhood, self.catalog) {
                continue;
            }
            let Some(layer) = self.catalog.texture_layer(block, face.side) else {
                continue;
            };
            let rotation = definition.texture_rotation(face.side);

            let levels = if self.ambient_occlusion {
                face.occlusion(neighborhood, self.catalog)
            } else {
                [3; 4]
            };

            let corners = diagonal_order(levels).map(|corner| {
                let offset = face.corners[corner].offset;
                Vertex {
                    position: [
                        local.x as f32 + offset[0],
                        local.y as f32 + offset[1],
                        local.z as f32 + offset[2],
                    ],
                    normal: face.normal,
                    uv: rotated_uv(corner, rotation),
                    layer,
                    brightness: brightness(levels[corner]),
                }
            });
            mesh.push_quad(corners);
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Vector3};

    use super::*;
    use crate::engine_state::voxels::block::{BlockId, BlockSide, AIR};
    use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
    use crate::engine_state::voxels::coords::BlockIndex;

    const GRASS: BlockId = 1;
    const STONE: BlockId = 3;
    const WOOD: BlockId = 5;
    const GLASS: BlockId = 6;

    fn air_outside(_: BlockIndex) -> Option<BlockId> {
        Some(AIR)
    }

    fn build(grid: &BlockGrid) -> ChunkMesh {
        let catalog = BlockCatalog::builtin();
        MeshBuilder::new(&catalog)
            .build(grid, Point3::new(0, 0, 0), &air_outside)
            .unwrap()
    }

    fn vector(v: [f32; 3]) -> Vector3<f32> {
        Vector3::new(v[0], v[1], v[2])
    }

    #[test]
    fn empty_chunk_has_no_geometry() {
        let mesh = build(&BlockGrid::empty());
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn isolated_block_has_six_unshaded_faces() {
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(5, 5, 5), STONE);
        let mesh = build(&grid);

        assert_eq!(mesh.quad_count(), 6);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert!(mesh.vertices.iter().all(|vertex| vertex.brightness == 1.0));

        let catalog = BlockCatalog::builtin();
        for (quad, side) in mesh.quads().zip(BlockSide::all()) {
            let normal = side.normal();
            let expected = [normal.x as f32, normal.y as f32, normal.z as f32];
            for vertex in quad {
                assert_eq!(vertex.normal, expected);
                assert_eq!(Some(vertex.layer), catalog.texture_layer(STONE, side));
                for axis in 0..3 {
                    let relative = vertex.position[axis] - 5.0;
                    assert!(relative == 0.0 || relative == 1.0);
                }
            }
        }
    }

    #[test]
    fn triangles_face_outwards() {
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(5, 5, 5), STONE);
        grid.set(Point3::new(6, 5, 6), STONE);
        grid.set(Point3::new(5, 4, 6), STONE);
        let mesh = build(&grid);

        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| &mesh.vertices[triangle[i] as usize]);
            let winding = (vector(b.position) - vector(a.position))
                .cross(vector(c.position) - vector(a.position));
            assert!(winding.dot(vector(a.normal)) > 0.0);
        }
    }

    #[test]
    fn enclosed_block_is_hidden() {
        let mut grid = BlockGrid::empty();
        for x in 4..7 {
            for y in 4..7 {
                for z in 4..7 {
                    grid.set(Point3::new(x, y, z), STONE);
                }
            }
        }
        let mesh = build(&grid);

        // Only the outer shell of the 3×3×3 cube: 9 quads per side.
        assert_eq!(mesh.quad_count(), 6 * 9);
        let center = Vector3::new(5.5, 5.5, 5.5);
        for quad in mesh.quads() {
            let centroid = quad
                .iter()
                .fold(Vector3::new(0.0, 0.0, 0.0), |sum, vertex| sum + vector(vertex.position))
                / 4.0;
            assert!((centroid - center).magnitude() > 1.0);
        }
    }

    #[test]
    fn same_kind_of_non_solid_block_is_culled() {
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(5, 5, 5), GLASS);
        grid.set(Point3::new(6, 5, 5), GLASS);
        assert_eq!(build(&grid).quad_count(), 10);

        // Glass does not hide the stone behind it, but stone hides glass.
        grid.set(Point3::new(6, 5, 5), STONE);
        assert_eq!(build(&grid).quad_count(), 11);
    }

    #[test]
    fn diagonal_occluder_darkens_its_own_corner() {
        // Corners run counter-clockwise from (-u, -v) in each side's tangent frame.
        let signs = [(-1, -1), (1, -1), (1, 1), (-1, 1)];
        let center = Point3::new(5, 5, 5);

        for side in BlockSide::all() {
            let normal = side.normal();
            let (u, v) = side.tangents();
            let doubled = signs.map(|(su, sv)| normal + u * su + v * sv);
            let positions = doubled.map(|d| {
                [
                    5.0 + (d.x + 1) as f32 / 2.0,
                    5.0 + (d.y + 1) as f32 / 2.0,
                    5.0 + (d.z + 1) as f32 / 2.0,
                ]
            });

            for (occluded, offset) in doubled.iter().enumerate() {
                let mut grid = BlockGrid::empty();
                grid.set(center, STONE);
                grid.set(center + *offset, STONE);
                let mesh = build(&grid);

                let expected_normal = [normal.x as f32, normal.y as f32, normal.z as f32];
                let face = mesh
                    .quads()
                    .find(|quad| {
                        quad[0].normal == expected_normal
                            && quad
                                .iter()
                                .all(|vertex| vertex.position.iter().all(|&c| (5.0..=6.0).contains(&c)))
                    })
                    .unwrap();

                for corner in 0..4 {
                    let vertex = face
                        .iter()
                        .find(|vertex| vertex.position == positions[corner])
                        .unwrap();
                    let expected = if corner == occluded { brightness(2) } else { 1.0 };
                    assert_eq!(vertex.brightness, expected, "{:?} corner {} of {}", side, corner, occluded);
                }

                // Darkening corner 0 or 2 moves the split onto the 1-3 diagonal.
                let first = if occluded % 2 == 0 { 1 } else { 0 };
                assert_eq!(face[0].position, positions[first], "{:?} occluder {}", side, occluded);
            }
        }
    }

    #[test]
    fn diagonal_follows_occlusion() {
        // A single block diagonally above corner 0 of the top face darkens
        // only that corner, which flips the split to the other diagonal.
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(5, 5, 5), STONE);
        grid.set(Point3::new(4, 4, 6), STONE);
        let mesh = build(&grid);

        let top = mesh
            .quads()
            .find(|quad| quad[0].normal == [0.0, 0.0, 1.0] && quad[0].position[2] == 6.0 && quad[0].position[0] >= 5.0)
            .unwrap();
        // Slot 0 holds corner 1 (+x, -y) when flipped.
        assert_eq!(top[0].position, [6.0, 5.0, 6.0]);
        assert_eq!(top[2].position, [5.0, 5.0, 6.0]);
        assert_eq!(top[2].brightness, brightness(2));

        let again = build(&grid);
        assert_eq!(mesh, again);
    }

    #[test]
    fn disabled_occlusion_is_flat() {
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(5, 5, 5), STONE);
        grid.set(Point3::new(4, 4, 6), STONE);
        let catalog = BlockCatalog::builtin();
        let mesh = MeshBuilder::new(&catalog)
            .with_ambient_occlusion(false)
            .build(&grid, Point3::new(0, 0, 0), &air_outside)
            .unwrap();

        assert!(mesh.vertices.iter().all(|vertex| vertex.brightness == 1.0));
    }

    #[test]
    fn side_textures_and_rotation_come_from_the_catalog() {
        let catalog = BlockCatalog::builtin();
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(5, 5, 5), GRASS);
        grid.set(Point3::new(8, 8, 8), WOOD);
        let mesh = build(&grid);

        let grass_top = catalog.texture_layer(GRASS, BlockSide::TOP).unwrap();
        let grass_side = catalog.texture_layer(GRASS, BlockSide::EAST).unwrap();
        assert_ne!(grass_top, grass_side);
        assert!(mesh.vertices.iter().any(|vertex| vertex.layer == grass_top));
        assert!(mesh.vertices.iter().any(|vertex| vertex.layer == grass_side));

        let wood_side = catalog.texture_layer(WOOD, BlockSide::EAST).unwrap();
        let wood_east = mesh
            .quads()
            .find(|quad| quad[0].layer == wood_side && quad[0].normal == [1.0, 0.0, 0.0])
            .unwrap();
        // Rotated a quarter turn: slot 0 is corner 0, whose uv is UV corner 3.
        assert_eq!(wood_east[0].uv, rotated_uv(0, 1));
        assert_eq!(wood_east[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn pending_neighbor_defers_the_mesh() {
        let catalog = BlockCatalog::builtin();
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(0, 5, 5), STONE);
        let pending_west = |global: BlockIndex| -> Option<BlockId> {
            if global.x < 0 {
                None
            } else {
                Some(AIR)
            }
        };

        let builder = MeshBuilder::new(&catalog);
        assert!(builder.build(&grid, Point3::new(0, 0, 0), &pending_west).is_none());

        // Nothing on the border: the pending neighbor is never asked for.
        let mut interior = BlockGrid::empty();
        interior.set(Point3::new(5, 5, 5), STONE);
        assert!(builder.build(&interior, Point3::new(0, 0, 0), &pending_west).is_some());
    }

    #[test]
    fn border_faces_see_the_neighboring_chunk() {
        let catalog = BlockCatalog::builtin();
        let mut grid = BlockGrid::empty();
        grid.set(Point3::new(CHUNK_DIMENSION - 1, 5, 5), STONE);
        let index = Point3::new(2, 0, 0);
        let east_edge = (index.x + 1) * CHUNK_DIMENSION;
        let stone_east = |global: BlockIndex| -> Option<BlockId> {
            Some(if global.x == east_edge { STONE } else { AIR })
        };

        let mesh = MeshBuilder::new(&catalog).build(&grid, index, &stone_east).unwrap();
        assert_eq!(mesh.quad_count(), 5);
        assert!(mesh
            .vertices
            .iter()
            .all(|vertex| vertex.normal != [1.0, 0.0, 0.0]));
        // Local coordinates regardless of where the chunk is.
        assert!(mesh.vertices.iter().all(|vertex| vertex.position[0] <= CHUNK_DIMENSION as f32));
    }
}
