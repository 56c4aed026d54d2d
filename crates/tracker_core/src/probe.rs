//! Terrain ray query contract.
//!
//! The stabilizer never owns world geometry. It asks a [`TerrainProbe`] for the
//! first surface along a ray, restricted to a [`SurfaceMask`]. Implementations
//! are read-only from the tracker's point of view.

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

/// Bitmask selecting which surface classes a ray may hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceMask(pub u32);

impl SurfaceMask {
    /// Ground, hills, buildings: everything the vehicle drives on or bumps into.
    pub const TERRAIN: SurfaceMask = SurfaceMask(1 << 0);
    /// Anything that is not terrain (other bodies, props, the vehicle itself).
    pub const OBSTACLE: SurfaceMask = SurfaceMask(1 << 1);
    pub const ALL: SurfaceMask = SurfaceMask(u32::MAX);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn intersects(self, other: SurfaceMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for SurfaceMask {
    fn default() -> Self {
        Self::TERRAIN
    }
}

/// First surface crossing along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space hit point
    pub point: Vec3,
    /// Surface normal at the hit point (unit length)
    pub normal: Vec3,
    /// Distance from the ray origin to `point`
    pub distance: f32,
}

/// Ray intersection against classified world geometry.
///
/// `direction` is expected to be unit length.
pub trait TerrainProbe {
    /// First surface the ray enters.
    ///
    /// A solid that already contains the origin is ignored, so a ray starting
    /// inside terrain only hits other solids further along.
    fn cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: SurfaceMask,
    ) -> Option<RayHit>;

    /// Like [`TerrainProbe::cast`], except a ray whose origin is inside a solid
    /// reports the point where it leaves that solid.
    fn cast_through(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: SurfaceMask,
    ) -> Option<RayHit>;
}

impl<T: TerrainProbe + ?Sized> TerrainProbe for &T {
    fn cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: SurfaceMask,
    ) -> Option<RayHit> {
        (**self).cast(origin, direction, max_distance, mask)
    }

    fn cast_through(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: SurfaceMask,
    ) -> Option<RayHit> {
        (**self).cast_through(origin, direction, max_distance, mask)
    }
}
