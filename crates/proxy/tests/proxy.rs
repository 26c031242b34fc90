mod common;

use common::{sphere_spec, stick_spec};
use environment::{BuiltinFactory, Controller, EnvError, Environment, EnvironmentFactory, Keys, UserInput};
use proxy::{
    serve, Command, Endpoint, EnvironmentProxy, ProxiedFactory, ProxyConfig, Reply, ThreadWorker,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn thread_factory() -> ProxiedFactory {
    ProxiedFactory::thread(Arc::new(BuiltinFactory), ProxyConfig::default())
}

/// Drives a local and a proxied environment with the same calls and
/// expects identical answers.
#[test]
fn proxied_env_matches_local_env() {
    for spec in [sphere_spec(), stick_spec()] {
        let mut local = BuiltinFactory.create(&spec).unwrap();
        let mut remote = thread_factory().create(&spec).unwrap();

        assert_eq!(remote.observation_spec(), local.observation_spec());
        assert_eq!(remote.action_spec(), local.action_spec());
        assert_eq!(remote.metadata(), local.metadata());
        assert_eq!(remote.reset(), local.reset());
        assert_eq!(remote.render(), local.render());

        let keys = Keys::from([("Right".to_string(), 1.0)]);
        assert_eq!(remote.keys_to_action(&keys), local.keys_to_action(&keys));
        let input = UserInput::new(keys, Controller::SpaceMouse);
        assert_eq!(remote.map_input(&input), local.map_input(&input));

        for _ in 0..8 {
            assert_eq!(remote.step(&json!(1.0)), local.step(&json!(1.0)));
        }
        assert_eq!(remote.set_camera(1), local.set_camera(1));
        assert_eq!(remote.step(&json!("left")), local.step(&json!("left")));
        assert_eq!(remote.close(), local.close());
        assert_eq!(remote.reset(), local.reset());
    }
}

#[test]
fn remote_errors_keep_their_kind() {
    let mut env = thread_factory().create(&sphere_spec()).unwrap();
    env.reset().unwrap();
    let err = env.step(&json!({ "force": 1 })).unwrap_err();
    assert!(matches!(err, EnvError::InvalidAction(_)));
    // The proxy survives failures inside the worker.
    assert!(env.step(&json!(0.5)).unwrap().mid());
}

#[test]
fn commands_before_init_fail() {
    let (local, remote) = Endpoint::pair();
    let worker = thread::spawn(move || serve(&remote, &BuiltinFactory));

    local.send(&Command::Reset).unwrap();
    match local.recv::<Reply>().unwrap() {
        Reply::Err(envelope) => assert_eq!(envelope.into_error(), EnvError::NotInitialized),
        Reply::Ok(v) => panic!("unexpected value {v}"),
    }

    local.send(&Command::Init(sphere_spec())).unwrap();
    assert_eq!(local.recv::<Reply>().unwrap(), Reply::Ok(Value::Null));

    local.send(&Command::Quit).unwrap();
    assert_eq!(local.recv::<Reply>().unwrap(), Reply::Ok(Value::Bool(true)));
    assert!(worker.join().unwrap().is_ok());
}

#[test]
fn malformed_commands_are_answered() {
    let (local, remote) = Endpoint::pair();
    let worker = thread::spawn(move || serve(&remote, &BuiltinFactory));
    local.send(&json!({ "op": "JUMP" })).unwrap();
    assert!(matches!(local.recv::<Reply>().unwrap(), Reply::Err(_)));
    drop(local);
    assert!(worker.join().unwrap().is_err());
}

#[test]
fn silent_worker_times_out_and_breaks_the_proxy() {
    let (local, remote) = Endpoint::pair();
    // Answers INIT, then never replies again.
    let worker = thread::spawn(move || {
        let _ = remote.recv_line();
        remote.send(&Reply::Ok(Value::Null)).unwrap();
        while remote.recv_line().is_ok() {}
    });
    let config = ProxyConfig {
        recv_timeout: Duration::from_millis(50),
        termination_timeout: Duration::from_millis(50),
    };
    let mut env = EnvironmentProxy::connect(
        local,
        Some(Box::new(ThreadWorker::new(worker))),
        &sphere_spec(),
        config,
    )
    .unwrap();

    let err = env.reset().unwrap_err();
    assert_eq!(err, EnvError::Timeout(Duration::from_millis(50)));
    assert!(err.is_fatal());
    assert!(env.is_broken());

    // Later calls fail fast without touching the channel.
    assert!(matches!(env.render(), Err(EnvError::Channel(_))));
}

#[test]
fn dropping_the_proxy_stops_the_worker() {
    let (local, remote) = Endpoint::pair();
    let worker = thread::spawn(move || {
        let _ = serve(&remote, &BuiltinFactory);
    });
    let env = EnvironmentProxy::connect(
        local,
        Some(Box::new(ThreadWorker::new(worker))),
        &stick_spec(),
        ProxyConfig::default(),
    )
    .unwrap();
    drop(env);
}
