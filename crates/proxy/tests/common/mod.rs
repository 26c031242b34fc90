use environment::{EnvironmentKind, EnvironmentSpec, RollingSphereConfig, StickBalanceConfig};

pub fn sphere_spec() -> EnvironmentSpec {
    EnvironmentSpec {
        id: "sphere".into(),
        name: "Rolling sphere".into(),
        sync: true,
        max_episode_steps: Some(5),
        kind: EnvironmentKind::RollingSphere(RollingSphereConfig::default()),
    }
}

pub fn stick_spec() -> EnvironmentSpec {
    EnvironmentSpec {
        id: "stick".into(),
        name: "Stick balance".into(),
        sync: false,
        max_episode_steps: None,
        kind: EnvironmentKind::StickBalance(StickBalanceConfig { seed: 11, ..StickBalanceConfig::default() }),
    }
}
