use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::{
    obstacle::{Aabb, Chamber, Obstacle},
    *,
};

const SLAB_THICKNESS: f32 = 0.5;

fn spawn_obstacle(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    material: Handle<StandardMaterial>,
    name: &str,
    obstacle: Obstacle,
    group: Group,
) {
    let half = obstacle.bounds.half_extents();
    commands
        .spawn(PbrBundle {
            mesh: meshes.add(shape::Box::new(half.x * 2., half.y * 2., half.z * 2.).into()),
            material,
            transform: Transform::from_translation(obstacle.bounds.center()),
            ..default()
        })
        .insert((
            Name::from(name),
            obstacle,
            RigidBody::Fixed,
            Collider::cuboid(half.x, half.y, half.z),
            CollisionGroups::new(group, ALL_GROUPS),
        ));
}

/// Setup a closed test room of `size` by `size` meters and `height` meters high: a portalable
/// floor, ceiling and four walls, a bare pillar and a portalable platform.
pub fn make_test_chamber(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    size: f32,
    height: f32,
) -> Chamber {
    let portalable = materials.add(StandardMaterial::from(Color::rgb(0.82, 0.82, 0.8)));
    let bare = materials.add(StandardMaterial::from(Color::rgb(0.3, 0.3, 0.33)));
    let half = size / 2.;
    let t = SLAB_THICKNESS;
    let chamber = Chamber {
        bounds: Aabb::new(Vec3::new(-half, 0., -half), Vec3::new(half, height, half)),
    };

    let slabs = [
        ("Floor", Vec3::new(-half, -t, -half), Vec3::new(half, 0., half), GROUND_GROUP),
        ("Ceiling", Vec3::new(-half, height, -half), Vec3::new(half, height + t, half), WALLS_GROUP),
        ("Wall_North", Vec3::new(-half, 0., -half - t), Vec3::new(half, height, -half), WALLS_GROUP),
        ("Wall_South", Vec3::new(-half, 0., half), Vec3::new(half, height, half + t), WALLS_GROUP),
        ("Wall_West", Vec3::new(-half - t, 0., -half), Vec3::new(-half, height, half), WALLS_GROUP),
        ("Wall_East", Vec3::new(half, 0., -half), Vec3::new(half + t, height, half), WALLS_GROUP),
    ];
    for (name, min, max, group) in slabs {
        let obstacle = Obstacle {
            bounds: Aabb::new(min, max),
            portalable: true,
            solid: true,
        };
        spawn_obstacle(commands, meshes, portalable.clone(), name, obstacle, group);
    }

    let pillar = Obstacle {
        bounds: Aabb::new(
            Vec3::new(-half * 0.5 - 0.5, 0., -half * 0.5 - 0.5),
            Vec3::new(-half * 0.5 + 0.5, height, -half * 0.5 + 0.5),
        ),
        portalable: false,
        solid: true,
    };
    spawn_obstacle(commands, meshes, bare, "Pillar", pillar, WALLS_GROUP);

    let platform = Obstacle {
        bounds: Aabb::new(
            Vec3::new(half * 0.3, 0., half * 0.3),
            Vec3::new(half * 0.8, 1., half * 0.8),
        ),
        portalable: true,
        solid: true,
    };
    spawn_obstacle(commands, meshes, portalable, "Platform", platform, GROUND_GROUP);

    commands.insert_resource(chamber);
    chamber
}
