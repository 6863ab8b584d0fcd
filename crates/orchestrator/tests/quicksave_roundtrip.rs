use std::f32::consts::PI;

use orchestrator::quicksave::{self, QuickLoadChanges};
use orchestrator::{Camera, PolygonalLight, SceneState};

fn triangle(offset: f32) -> PolygonalLight {
    let mut light = PolygonalLight::default();
    light.header.translation = [offset, 2.0, 3.5];
    light.header.rotation_angles = [0.25 * PI, 0.1, -0.7];
    light.header.scaling_x = 0.5;
    light.header.scaling_y = 2.0;
    light.header.radiant_flux = [10.0, 8.0, 6.5];
    light.vertices = vec![[0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [0.3, 0.9, 0.0, 0.0]];
    light.update();
    light
}

#[test]
fn quicksave_round_trip_is_bit_exact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scene.save");

    let mut textured = triangle(-1.0);
    textured.texture_path = Some("data/light_textures/stained_glass.png".into());
    textured.header.texturing = 1;
    let scene = SceneState {
        camera: Camera {
            position_world_space: [1.0e-3, -42.25, 7.0],
            rotation_x: 0.5,
            rotation_z: -3.0,
            speed: 0.1,
            ..Camera::default()
        },
        lights: vec![textured, triangle(4.0), PolygonalLight::default()],
    };

    quicksave::save(&path, &scene).expect("save");
    let loaded = quicksave::load(&path).expect("load");

    assert_eq!(
        bytemuck::bytes_of(&loaded.camera),
        bytemuck::bytes_of(&scene.camera)
    );
    assert_eq!(loaded.lights.len(), 3);
    for (original, restored) in scene.lights.iter().zip(&loaded.lights) {
        assert_eq!(restored.vertex_count(), original.vertex_count());
        assert_eq!(restored.header.vertex_count as usize, original.vertices.len());
        assert_eq!(restored.texture_path, original.texture_path);
        let original_bits: Vec<u32> = original.vertices.iter().flatten().map(|v| v.to_bits()).collect();
        let restored_bits: Vec<u32> = restored.vertices.iter().flatten().map(|v| v.to_bits()).collect();
        assert_eq!(restored_bits, original_bits);
        assert_eq!(bytemuck::bytes_of(&restored.header), bytemuck::bytes_of(&original.header));
    }
    assert_eq!(QuickLoadChanges::between(&scene, &loaded), QuickLoadChanges::default());
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = quicksave::load(&dir.path().join("absent.save")).unwrap_err();
    assert!(matches!(err, quicksave::QuicksaveError::Io { .. }));
}
