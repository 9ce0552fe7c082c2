use std::path::Path;

use bevy::prelude::*;
use image::RgbaImage;
use thiserror::Error;

use crate::plugins::render::{recorder::PortalFrame, software::SoftwareTarget};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("frame of {0}x{1} pixels has no area")]
    EmptyFrame(u32, u32),
    #[error("color buffer does not match a {0}x{1} image")]
    BufferSize(u32, u32),
    #[error("could not write the frame image: {0}")]
    Image(#[from] image::ImageError),
}

/// Copy the colour buffer of a software target into an image.
pub fn frame_image(target: &SoftwareTarget) -> Result<RgbaImage, DumpError> {
    let (width, height) = (target.width(), target.height());
    let data = target.color().iter().flatten().copied().collect::<Vec<_>>();
    RgbaImage::from_raw(width, height, data).ok_or(DumpError::BufferSize(width, height))
}

/// Replay a recorded portal frame on the CPU and save it as an image.
pub fn dump_frame<P: AsRef<Path>>(
    frame: &PortalFrame,
    size: UVec2,
    out_path: P,
) -> Result<(), DumpError> {
    if size.x == 0 || size.y == 0 {
        return Err(DumpError::EmptyFrame(size.x, size.y));
    }
    let mut target = SoftwareTarget::new(size.x, size.y);
    frame.replay(&mut target);
    frame_image(&target)?.save(out_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;

    use super::*;
    use crate::plugins::{
        physics::obstacle::Aabb,
        render::{
            device::{ClearFlags, RenderDevice, ScenePass},
            mesh::RenderScene,
            recorder::RenderCommand,
        },
    };

    #[test]
    fn empty_frames_are_rejected() {
        let frame = PortalFrame::default();
        let path = std::env::temp_dir().join("lost_portal_empty.png");
        assert!(matches!(
            dump_frame(&frame, UVec2::new(0, 10), &path),
            Err(DumpError::EmptyFrame(0, 10))
        ));
    }

    #[test]
    fn dumped_frame_is_a_png_of_the_requested_size() {
        let mut scene = RenderScene::default();
        scene.push(Aabb::new(Vec3::splat(-1.), Vec3::ONE), Color::RED);
        let camera = crate::plugins::render::device::CameraView::new(
            &Transform::from_xyz(0., 0., 5.),
            Mat4::perspective_rh_gl(1., 2., 0.1, 100.),
        );
        let frame = PortalFrame {
            scene,
            commands: vec![
                RenderCommand::Clear(ClearFlags::all()),
                RenderCommand::DrawScene {
                    camera,
                    pass: ScenePass::Main,
                },
            ],
            virtual_cameras: [None, None],
        };

        let mut target = SoftwareTarget::new(40, 20);
        frame.replay(&mut target);
        let image = frame_image(&target).unwrap();
        assert_eq!(image.dimensions(), (40, 20));
        assert_eq!(image.get_pixel(20, 10).0, [255, 0, 0, 255]);
        assert_eq!(target.state(), Default::default());

        let path = std::env::temp_dir().join("lost_portal_dump_test.png");
        dump_frame(&frame, UVec2::new(40, 20), &path).unwrap();
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (40, 20));
        let _ = std::fs::remove_file(&path);
    }
}
