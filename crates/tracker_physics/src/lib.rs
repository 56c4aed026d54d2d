use bevy::prelude::*;
use rapier3d::prelude as rapier;
use rapier::nalgebra::{DMatrix, Point3, Vector3};
use tracker_core::{RayHit, SurfaceMask, TerrainProbe};

/// Rapier group for terrain colliders.
pub const TERRAIN_GROUP: rapier::Group = rapier::Group::GROUP_1;
/// Rapier group for everything the tracker must ignore.
pub const OBSTACLE_GROUP: rapier::Group = rapier::Group::GROUP_2;

pub struct TerrainPhysicsPlugin;

impl Plugin for TerrainPhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TerrainWorld>()
            .add_systems(Startup, check_terrain_configured);
    }
}

/// Static collision world answering terrain ray queries.
#[derive(Resource)]
pub struct TerrainWorld {
    pub rigid_body_set: rapier::RigidBodySet,
    pub collider_set: rapier::ColliderSet,
    pub query_pipeline: rapier::QueryPipeline,
    terrain_colliders: usize,
}

impl TerrainWorld {
    pub fn new() -> Self {
        Self {
            rigid_body_set: rapier::RigidBodySet::new(),
            collider_set: rapier::ColliderSet::new(),
            query_pipeline: rapier::QueryPipeline::new(),
            terrain_colliders: 0,
        }
    }

    /// Number of colliders classified as terrain.
    pub fn terrain_collider_count(&self) -> usize {
        self.terrain_colliders
    }

    /// Axis-aligned terrain box centered at `center`.
    pub fn insert_terrain_cuboid(
        &mut self,
        center: Vec3,
        half_extents: Vec3,
    ) -> rapier::ColliderHandle {
        let collider =
            rapier::ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
                .translation(to_vector(center));
        self.insert(collider, TERRAIN_GROUP)
    }

    /// Heightfield terrain. `heights[(row, col)]` run along z then x.
    ///
    /// `size` is the total extent of the field; `origin` its center.
    pub fn insert_terrain_heightfield(
        &mut self,
        heights: DMatrix<f32>,
        size: Vec3,
        origin: Vec3,
    ) -> rapier::ColliderHandle {
        let collider = rapier::ColliderBuilder::heightfield(heights, to_vector(size))
            .translation(to_vector(origin));
        self.insert(collider, TERRAIN_GROUP)
    }

    /// Non-terrain box, invisible to the tracker.
    pub fn insert_obstacle(
        &mut self,
        center: Vec3,
        half_extents: Vec3,
    ) -> rapier::ColliderHandle {
        let collider =
            rapier::ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
                .translation(to_vector(center));
        self.insert(collider, OBSTACLE_GROUP)
    }

    fn insert(
        &mut self,
        builder: rapier::ColliderBuilder,
        group: rapier::Group,
    ) -> rapier::ColliderHandle {
        let collider = builder
            .collision_groups(rapier::InteractionGroups::new(group, rapier::Group::ALL))
            .build();
        let handle = self.collider_set.insert(collider);
        if group.contains(TERRAIN_GROUP) {
            self.terrain_colliders += 1;
        }
        self.query_pipeline.update(&self.collider_set);
        handle
    }
}

impl Default for TerrainWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainProbe for TerrainWorld {
    fn cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: SurfaceMask,
    ) -> Option<RayHit> {
        let ray = rapier::Ray::new(to_point(origin), to_vector(direction));

        // Solid casts report zero distance for a collider enclosing the origin.
        let mut nearest: Option<rapier::RayIntersection> = None;
        self.query_pipeline.intersections_with_ray(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            mask_filter(mask),
            |_, intersection| {
                let closer = nearest
                    .map_or(true, |best| intersection.time_of_impact < best.time_of_impact);
                if intersection.time_of_impact > 0.0 && closer {
                    nearest = Some(intersection);
                }
                true
            },
        );

        nearest.map(|intersection| to_hit(&ray, intersection))
    }

    fn cast_through(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: SurfaceMask,
    ) -> Option<RayHit> {
        let ray = rapier::Ray::new(to_point(origin), to_vector(direction));
        let (_, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            false,
            mask_filter(mask),
        )?;
        Some(to_hit(&ray, intersection))
    }
}

fn mask_filter(mask: SurfaceMask) -> rapier::QueryFilter<'static> {
    let groups = rapier::InteractionGroups::new(
        rapier::Group::ALL,
        rapier::Group::from_bits_truncate(mask.bits()),
    );
    rapier::QueryFilter::new().groups(groups)
}

fn to_hit(ray: &rapier::Ray, intersection: rapier::RayIntersection) -> RayHit {
    let point = ray.point_at(intersection.time_of_impact);
    RayHit {
        point: Vec3::new(point.x, point.y, point.z),
        normal: Vec3::new(
            intersection.normal.x,
            intersection.normal.y,
            intersection.normal.z,
        ),
        distance: intersection.time_of_impact,
    }
}

/// Warn once at startup if nothing is classified as terrain.
fn check_terrain_configured(terrain: Res<TerrainWorld>) {
    if terrain.terrain_collider_count() == 0 {
        warn!("No terrain colliders registered; trackers will hold their starting height");
    } else {
        info!(
            "Terrain world ready with {} terrain collider(s)",
            terrain.terrain_collider_count()
        );
    }
}

fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

fn to_point(v: Vec3) -> Point3<f32> {
    Point3::new(v.x, v.y, v.z)
}
