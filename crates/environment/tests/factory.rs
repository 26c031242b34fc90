use environment::{
    encode_jpeg, encode_png, BuiltinFactory, Controller, EnvError, EnvironmentFactory,
    EnvironmentKind, EnvironmentSpec, Keys, Quality, UserInput,
};
use serde_json::json;
use std::fs;

fn load_specs() -> Vec<EnvironmentSpec> {
    let json = fs::read_to_string("tests/data/specs.json").unwrap();
    serde_json::from_str(&json).unwrap()
}

#[test]
fn parse_family_specs() {
    let specs = load_specs();
    assert_eq!(specs.len(), 2);

    assert!(specs[0].sync);
    assert_eq!(specs[0].max_episode_steps, Some(100));
    match &specs[0].kind {
        EnvironmentKind::RollingSphere(config) => {
            assert_eq!(config.force_scale, 5.0);
            // Unset fields fall back to their defaults.
            assert_eq!(config.position_limit, 5.0);
        }
        other => panic!("unexpected family {}", other.family()),
    }

    assert!(!specs[1].sync);
    assert_eq!(specs[1].kind.family(), "stick_balance");
}

#[test]
fn builtin_factory_creates_every_family() {
    for spec in load_specs() {
        let mut env = BuiltinFactory.create(&spec).unwrap();
        let first = env.reset().unwrap();
        assert!(first.first());
        assert_eq!(first.reward, None);

        let specs = env.specs().unwrap();
        assert_eq!(specs.reward.shape, Vec::<usize>::new());
        assert_eq!(specs.discount.maximum, Some(1.0));

        let image = env.render().unwrap();
        assert_eq!(image.pixels.len(), (image.width * image.height * 3) as usize);

        env.close().unwrap();
        assert_eq!(env.reset(), Err(EnvError::Closed));
    }
}

#[test]
fn sphere_maps_arrow_keys_to_force() {
    let spec = &load_specs()[0];
    let mut env = BuiltinFactory.create(spec).unwrap();
    env.reset().unwrap();

    assert_eq!(env.keys_to_action(&Keys::new()).unwrap(), None);

    let keys = Keys::from([("Right".to_string(), 1.0)]);
    let action = env.keys_to_action(&keys).unwrap().unwrap();
    assert_eq!(action, json!(5.0));

    let ts = env.step(&action).unwrap();
    assert!(ts.mid());
    assert!((ts.reward.unwrap() - 0.1).abs() < 1e-6);
    assert_eq!(env.step_info(), Some(json!({ "steps": 1 })));
}

#[test]
fn sphere_cameras() {
    let spec = &load_specs()[0];
    let mut env = BuiltinFactory.create(spec).unwrap();
    env.reset().unwrap();
    let side = env.render().unwrap();

    let camera = env.set_camera(1).unwrap().unwrap();
    assert_eq!(camera.name, "top");
    assert_ne!(env.render().unwrap(), side);

    assert_eq!(env.set_camera(7).unwrap(), None);
}

#[test]
fn stick_reads_spacemouse_axis() {
    let spec = &load_specs()[1];
    let mut env = BuiltinFactory.create(spec).unwrap();
    env.reset().unwrap();

    let keys = Keys::from([("Axis0".to_string(), -0.5), ("Right".to_string(), 1.0)]);
    let spacemouse = UserInput::new(keys.clone(), Controller::SpaceMouse);
    assert_eq!(env.map_input(&spacemouse).unwrap(), Some(json!(-5.0)));

    let keyboard = UserInput::new(keys, Controller::Default);
    assert_eq!(env.map_input(&keyboard).unwrap(), Some(json!(10.0)));

    // Without input the stick env still produces an action.
    assert_eq!(env.keys_to_action(&Keys::new()).unwrap(), Some(json!(0.0)));
}

#[test]
fn rendered_frames_encode() {
    let spec = &load_specs()[1];
    let mut env = BuiltinFactory.create(spec).unwrap();
    env.reset().unwrap();
    let image = env.render().unwrap();
    let low = encode_jpeg(&image, Quality::Low).unwrap();
    let high = encode_jpeg(&image, Quality::High).unwrap();
    assert!(!low.is_empty() && !high.is_empty());
    assert!(!encode_png(&image).unwrap().is_empty());
}
