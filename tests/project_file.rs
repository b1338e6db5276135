//! Project files: building a pipeline from disk and capturing it back.

mod common;

use common::{wait_for_state, wait_until};
use frameflow::config::{KernelConfig, ProjectFile};
use frameflow::pipeline::{Kernel, LifecycleState, ParameterValue, SequentialKernel};
use frameflow::ErrorKind;

fn demo() -> ProjectFile {
    ProjectFile::new("roundtrip")
        .with_module("PatternSource", "camera")
        .with_parameter("width", ParameterValue::Int(16))
        .with_parameter("height", ParameterValue::Int(8))
        .with_parameter("frames", ParameterValue::Int(3))
        .with_module("Invert", "negative")
        .with_parameter("enabled", ParameterValue::Bool(false))
        .with_module("NullSink", "sink")
        .with_connection("camera.out", "negative.in")
        .with_connection("negative.out", "sink.in")
}

#[test]
fn test_save_load_apply_capture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("demo.ffproj");
    demo().save(&path).unwrap();

    let loaded = ProjectFile::load(&path).unwrap();
    assert_eq!(loaded, demo());

    let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
    loaded.apply(&kernel).unwrap();

    let camera = kernel.get_module("camera").unwrap();
    assert_eq!(camera.parameter_value("width"), Some(ParameterValue::Int(16)));
    let negative = kernel.get_module("negative").unwrap();
    assert!(negative.input("in").unwrap().is_connected());

    let captured = ProjectFile::capture(&kernel, "roundtrip");
    assert_eq!(captured.connections, loaded.connections);
    let labels: Vec<_> = captured.modules.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["camera", "negative", "sink"]);
    assert_eq!(
        captured.modules[1].parameters.get("enabled"),
        Some(&ParameterValue::Bool(false))
    );

    let notifier = kernel.notifier();
    kernel.init().unwrap();
    wait_for_state(&notifier, LifecycleState::Initialized);
    kernel.start().unwrap();
    let last = wait_for_state(&notifier, LifecycleState::Stopped);
    assert_eq!(last.frame, 3);
    assert!(!last.is_exception_raised());
}

#[test]
fn test_apply_rejects_bad_parameter() {
    let project = ProjectFile::new("bad")
        .with_module("PatternSource", "camera")
        .with_parameter("width", ParameterValue::Text("wide".into()));
    let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
    let err = project.apply(&kernel).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[test]
fn test_apply_rejects_unknown_kind_and_slot() {
    let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
    let unknown = ProjectFile::new("p").with_module("Sharpen", "s");
    assert_eq!(unknown.apply(&kernel).unwrap_err().kind(), ErrorKind::CreateModule);

    let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
    let bad_slot = ProjectFile::new("p")
        .with_module("PatternSource", "camera")
        .with_module("NullSink", "sink")
        .with_connection("camera.missing", "sink.in");
    assert_eq!(bad_slot.apply(&kernel).unwrap_err().kind(), ErrorKind::InvalidSlot);
}

#[test]
fn test_unconnected_invert_fails_init() {
    let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
    ProjectFile::new("p")
        .with_module("Invert", "lonely")
        .apply(&kernel)
        .unwrap();
    let notifier = kernel.notifier();
    kernel.init().unwrap();
    let state = wait_until(&notifier, |s| s.is_exception_raised());
    assert_eq!(state.exception().unwrap().kind(), ErrorKind::NotConnectedSlot);
    assert_eq!(state.state, LifecycleState::Uninitialized);
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ffproj");
    std::fs::write(&path, "{ \"modules\": [ { \"kind\": 3 } ] }").unwrap();
    assert_eq!(ProjectFile::load(&path).unwrap_err().kind(), ErrorKind::Config);
    assert_eq!(
        ProjectFile::load(dir.path().join("missing.ffproj")).unwrap_err().kind(),
        ErrorKind::Config
    );
}
