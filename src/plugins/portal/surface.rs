use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use super::geometry::{normalize_or, orientation_from_normal, SurfaceKind};
use crate::plugins::physics::obstacle::Aabb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalId {
    A,
    B,
}

impl PortalId {
    /// Fixed processing order, for traversal and rendering alike.
    pub const ALL: [PortalId; 2] = [PortalId::A, PortalId::B];

    pub const fn index(self) -> usize {
        match self {
            PortalId::A => 0,
            PortalId::B => 1,
        }
    }

    pub const fn other(self) -> PortalId {
        match self {
            PortalId::A => PortalId::B,
            PortalId::B => PortalId::A,
        }
    }

    /// Value written to the stencil buffer by this portal's mask.
    pub const fn stencil_ref(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn color(self) -> Color {
        match self {
            PortalId::A => Color::rgb(1., 0.55, 0.1),
            PortalId::B => Color::rgb(0.15, 0.5, 1.),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Dot product with world up above which a portal counts as a floor or ceiling.
    pub vertical_threshold: f32,
    /// Vertical semi-axis of the aperture.
    pub radius: f32,
    /// Width over height of the aperture, at most 1.
    pub aspect_ratio: f32,
    /// Distance kept between the portal footprint and the edges of the face it sits on.
    pub placement_edge_margin: f32,
    /// Offset along the surface normal, avoids z-fighting with the wall.
    pub surface_offset: f32,
    /// Near plane distance of the virtual cameras.
    pub virtual_near: f32,
    /// Offset of the oblique clip plane in front of the exit portal.
    pub clip_plane_offset: f32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            vertical_threshold: 0.7,
            radius: 1.,
            aspect_ratio: 0.6,
            placement_edge_margin: 0.1,
            surface_offset: 0.001,
            virtual_near: 0.02,
            clip_plane_offset: 0.005,
        }
    }
}

/// Raycast hit a portal is being shot at.
#[derive(Debug, Clone, Copy)]
pub struct PortalHit {
    pub point: Vec3,
    pub normal: Vec3,
    /// Direction of the shot, orients portals placed on floors and ceilings.
    pub view_direction: Vec3,
    /// Bounds of the obstacle that was hit.
    pub surface: Aabb,
    pub portalable: bool,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    #[error("surface does not accept portals")]
    NotPortalable,
    #[error("portal would hang over the edge of the surface")]
    TooNearEdge,
    #[error("portal would overlap portal {0:?}")]
    OverlapsPortal(PortalId),
    #[error("surface normal is degenerate")]
    DegenerateNormal,
}

/// A placed, oriented, elliptical window. Local +Z is the outward normal.
#[derive(Debug, Clone)]
pub struct PortalSurface {
    pub id: PortalId,
    pub center: Vec3,
    pub orientation: Quat,
    pub radius: f32,
    pub aspect_ratio: f32,
    pub linked: Option<PortalId>,
    pub is_placed: bool,
}

impl PortalSurface {
    pub fn new(id: PortalId, radius: f32, aspect_ratio: f32) -> Self {
        PortalSurface {
            id,
            center: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            radius,
            aspect_ratio: aspect_ratio.clamp(f32::EPSILON, 1.),
            linked: None,
            is_placed: false,
        }
    }

    pub fn normal(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.center).with_rotation(self.orientation)
    }

    pub fn kind(&self, threshold: f32) -> SurfaceKind {
        SurfaceKind::from_normal(self.normal(), threshold)
    }

    /// Horizontal and vertical semi-axes of the aperture.
    pub fn semi_axes(&self) -> Vec2 {
        Vec2::new(self.radius * self.aspect_ratio, self.radius)
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.center).dot(self.normal())
    }

    /// Offset of `point` from the center, in portal plane coordinates (right, up).
    pub fn planar_offset(&self, point: Vec3) -> Vec2 {
        let d = point - self.center;
        Vec2::new(d.dot(self.right()), d.dot(self.up()))
    }

    /// Whether `point`, projected on the portal plane, lies inside the aperture scaled by
    /// `forgiveness`.
    pub fn within_aperture(&self, point: Vec3, forgiveness: f32) -> bool {
        let e = self.planar_offset(point) / (self.semi_axes() * forgiveness);
        e.length_squared() <= 1.
    }

    pub fn try_place_at(&mut self, hit: &PortalHit, config: &PortalConfig) -> Result<(), PlacementError> {
        if !hit.portalable {
            return Err(PlacementError::NotPortalable);
        }
        let normal = normalize_or(hit.normal, Vec3::ZERO);
        if normal == Vec3::ZERO {
            return Err(PlacementError::DegenerateNormal);
        }

        let up_hint = match SurfaceKind::from_normal(normal, config.vertical_threshold) {
            SurfaceKind::Wall => Vec3::Y,
            // Top of the portal faces away from the shooter.
            SurfaceKind::Floor | SurfaceKind::Ceiling => {
                let horizontal = Vec3::new(hit.view_direction.x, 0., hit.view_direction.z);
                normalize_or(horizontal, Vec3::NEG_Z)
            }
        };
        let orientation = orientation_from_normal(normal, up_hint);

        let semi = self.semi_axes();
        let right = orientation * Vec3::X;
        let up = orientation * Vec3::Y;
        let half = hit.surface.half_extents();
        let offset = hit.point - hit.surface.center();
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            // The face we are on has no extent along its normal.
            if axis.dot(normal).abs() > 0.5 {
                continue;
            }
            let footprint = semi.x * right.dot(axis).abs() + semi.y * up.dot(axis).abs();
            let limit = half.dot(axis) - footprint - config.placement_edge_margin;
            if offset.dot(axis).abs() > limit {
                return Err(PlacementError::TooNearEdge);
            }
        }

        self.center = hit.point + normal * config.surface_offset;
        self.orientation = orientation;
        self.is_placed = true;
        Ok(())
    }

    /// Place the portal on a surface hit. Returns false, leaving the portal untouched, when the
    /// surface cannot hold it.
    pub fn place_at(&mut self, hit: &PortalHit, config: &PortalConfig) -> bool {
        self.try_place_at(hit, config).is_ok()
    }

    pub fn link(&mut self, other: PortalId) {
        if other != self.id {
            self.linked = Some(other);
        }
    }

    pub fn reset(&mut self) {
        self.is_placed = false;
        self.linked = None;
        self.center = Vec3::ZERO;
        self.orientation = Quat::IDENTITY;
    }

    fn overlaps(&self, other: &PortalSurface) -> bool {
        if !self.is_placed || !other.is_placed {
            return false;
        }
        let coplanar = self.normal().dot(other.normal()) > 0.99
            && self.signed_distance(other.center).abs() < 0.05;
        coplanar && self.center.distance(other.center) < self.radius + other.radius
    }
}

/// Both portals, owning the surfaces. Links are handles into this pair.
#[derive(Debug, Clone, Resource)]
pub struct PortalPair {
    portals: [PortalSurface; 2],
}

impl PortalPair {
    pub fn new(config: &PortalConfig) -> Self {
        PortalPair {
            portals: PortalId::ALL
                .map(|id| PortalSurface::new(id, config.radius, config.aspect_ratio)),
        }
    }

    /// A pair already linked to each other, becomes active once both are placed.
    pub fn linked_pair(config: &PortalConfig) -> Self {
        let mut pair = Self::new(config);
        pair.link(PortalId::A, PortalId::B);
        pair
    }

    pub fn get(&self, id: PortalId) -> &PortalSurface {
        &self.portals[id.index()]
    }

    pub fn get_mut(&mut self, id: PortalId) -> &mut PortalSurface {
        &mut self.portals[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortalSurface> {
        self.portals.iter()
    }

    /// Place a portal, refusing spots that overlap the other one.
    pub fn place(
        &mut self,
        id: PortalId,
        hit: &PortalHit,
        config: &PortalConfig,
    ) -> Result<(), PlacementError> {
        let mut candidate = self.get(id).clone();
        candidate.try_place_at(hit, config)?;
        if candidate.overlaps(self.get(id.other())) {
            return Err(PlacementError::OverlapsPortal(id.other()));
        }
        *self.get_mut(id) = candidate;
        Ok(())
    }

    pub fn link(&mut self, a: PortalId, b: PortalId) {
        self.get_mut(a).link(b);
        self.get_mut(b).link(a);
    }

    /// The entry portal and its exit, when both are placed and linked.
    pub fn linked(&self, entry: PortalId) -> Option<(&PortalSurface, &PortalSurface)> {
        let portal = self.get(entry);
        let exit = self.get(portal.linked?);
        (portal.is_placed && exit.is_placed).then_some((portal, exit))
    }

    pub fn reset(&mut self) {
        for portal in &mut self.portals {
            portal.reset();
        }
        self.link(PortalId::A, PortalId::B);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Aabb {
        Aabb::new(Vec3::new(-6., 0., -6.5), Vec3::new(6., 4., -6.))
    }

    fn floor() -> Aabb {
        Aabb::new(Vec3::new(-6., -0.5, -6.), Vec3::new(6., 0., 6.))
    }

    fn wall_hit(point: Vec3) -> PortalHit {
        PortalHit {
            point,
            normal: Vec3::Z,
            view_direction: Vec3::NEG_Z,
            surface: wall(),
            portalable: true,
        }
    }

    #[test]
    fn places_on_wall_facing_out() {
        let config = PortalConfig::default();
        let mut portal = PortalSurface::new(PortalId::A, 1., 0.6);
        assert!(portal.place_at(&wall_hit(Vec3::new(0., 1.5, -6.)), &config));
        assert!(portal.is_placed);
        assert!(portal.normal().abs_diff_eq(Vec3::Z, 1e-5));
        assert!(portal.up().abs_diff_eq(Vec3::Y, 1e-5));
        assert!(portal.center.abs_diff_eq(Vec3::new(0., 1.5, -5.999), 1e-5));
    }

    #[test]
    fn floor_portal_top_faces_away() {
        let config = PortalConfig::default();
        let mut portal = PortalSurface::new(PortalId::B, 1., 0.6);
        let hit = PortalHit {
            point: Vec3::new(1., 0., 1.),
            normal: Vec3::Y,
            view_direction: Vec3::new(1., -1., 0.).normalize(),
            surface: floor(),
            portalable: true,
        };
        assert!(portal.place_at(&hit, &config));
        assert_eq!(portal.kind(config.vertical_threshold), SurfaceKind::Floor);
        assert!(portal.up().abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn rejects_unportalable_and_edges() {
        let config = PortalConfig::default();
        let mut portal = PortalSurface::new(PortalId::A, 1., 0.6);

        let mut hit = wall_hit(Vec3::new(0., 1.5, -6.));
        hit.portalable = false;
        assert_eq!(
            portal.try_place_at(&hit, &config),
            Err(PlacementError::NotPortalable)
        );

        // Portal is two meters tall, the wall four.
        let hit = wall_hit(Vec3::new(0., 0.5, -6.));
        assert_eq!(
            portal.try_place_at(&hit, &config),
            Err(PlacementError::TooNearEdge)
        );
        let hit = wall_hit(Vec3::new(5.6, 2., -6.));
        assert_eq!(
            portal.try_place_at(&hit, &config),
            Err(PlacementError::TooNearEdge)
        );
        assert!(!portal.is_placed);

        let mut hit = wall_hit(Vec3::new(0., 2., -6.));
        hit.normal = Vec3::ZERO;
        assert_eq!(
            portal.try_place_at(&hit, &config),
            Err(PlacementError::DegenerateNormal)
        );
    }

    #[test]
    fn pair_rejects_overlap() {
        let config = PortalConfig::default();
        let mut pair = PortalPair::linked_pair(&config);
        assert!(pair
            .place(PortalId::A, &wall_hit(Vec3::new(0., 2., -6.)), &config)
            .is_ok());
        assert_eq!(
            pair.place(PortalId::B, &wall_hit(Vec3::new(1., 2., -6.)), &config),
            Err(PlacementError::OverlapsPortal(PortalId::A))
        );
        assert!(!pair.get(PortalId::B).is_placed);
        assert!(pair
            .place(PortalId::B, &wall_hit(Vec3::new(3., 2., -6.)), &config)
            .is_ok());
        // Moving a portal never collides with itself.
        assert!(pair
            .place(PortalId::A, &wall_hit(Vec3::new(-0.5, 2., -6.)), &config)
            .is_ok());
    }

    #[test]
    fn linked_requires_both_placed() {
        let config = PortalConfig::default();
        let mut pair = PortalPair::new(&config);
        pair.place(PortalId::A, &wall_hit(Vec3::new(-3., 2., -6.)), &config)
            .unwrap();
        pair.place(PortalId::B, &wall_hit(Vec3::new(3., 2., -6.)), &config)
            .unwrap();
        assert!(pair.linked(PortalId::A).is_none());

        pair.link(PortalId::A, PortalId::B);
        let (entry, exit) = pair.linked(PortalId::B).unwrap();
        assert_eq!((entry.id, exit.id), (PortalId::B, PortalId::A));

        pair.reset();
        assert!(pair.linked(PortalId::A).is_none());
        assert_eq!(pair.get(PortalId::A).linked, Some(PortalId::B));
    }

    #[test]
    fn aperture_is_elliptical() {
        let mut portal = PortalSurface::new(PortalId::A, 1., 0.5);
        portal.is_placed = true;
        assert!(portal.within_aperture(Vec3::new(0., 0.95, 0.3), 1.));
        assert!(!portal.within_aperture(Vec3::new(0.6, 0., 0.), 1.));
        assert!(portal.within_aperture(Vec3::new(0.55, 0., 0.), 1.15));
    }
}
