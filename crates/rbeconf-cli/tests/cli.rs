use std::fs::{self, File};
use std::io::Read;

use assert_cmd::cargo::cargo_bin_cmd;
use tar::Archive;

mod common;

use common::{parse_json, FakeToolchain};

fn rbeconf() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("rbeconf");
    for var in [
        "RBECONF_BAZEL_VERSION",
        "RBECONF_TOOLCHAIN_CONTAINER",
        "RBECONF_CONTAINER_BACKEND",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn help_lists_the_main_flags() {
    let assert = rbeconf().arg("--help").assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 help");
    for flag in [
        "--bazel-version",
        "--toolchain-container",
        "--output-tarball",
        "--output-src-root",
        "--cpp-env",
        "--container-backend",
    ] {
        assert!(output.contains(flag), "help is missing {flag}: {output}");
    }
}

#[test]
fn missing_options_are_reported_together() {
    let assert = rbeconf().arg("--json").assert().code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "UserError");
    assert_eq!(payload["details"]["code"], "RBE110");
    let problems = payload["details"]["problems"].as_array().expect("problems");
    assert_eq!(problems.len(), 3, "{problems:?}");
}

#[test]
fn escaping_config_path_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = rbeconf()
        .args(["--bazel-version", "4.2.0"])
        .args(["--toolchain-container", "gcr.io/rbe/toolchain:latest"])
        .arg("--output-src-root")
        .arg(temp.path())
        .args(["--output-config-path", "../outside"])
        .assert()
        .code(1);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("../outside"), "{stderr}");
    assert!(stderr.contains("RBE110"), "{stderr}");
}

#[test]
fn malformed_cpp_env_is_rejected_by_the_parser() {
    rbeconf().args(["--cpp-env", "NOVALUE"]).assert().failure().code(2);
}

#[cfg(target_os = "linux")]
#[test]
fn java_only_run_writes_tarball_and_manifest() {
    let fake = FakeToolchain::new();
    let tarball = fake.path().join("out").join("configs.tar");
    let manifest = fake.path().join("out").join("manifest.txt");

    let assert = rbeconf()
        .arg("--json")
        .args(["--bazel-version", "4.0.0"])
        .args(["--toolchain-container", "gcr.io/rbe/toolchain:latest"])
        .args(["--generate-cpp-configs", "false"])
        .arg("--output-tarball")
        .arg(&tarball)
        .arg("--output-manifest")
        .arg(&manifest)
        .arg("--sandbox-workdir")
        .arg(fake.sandbox_workdir())
        .env("RBECONF_CONTAINER_BACKEND", &fake.engine)
        .assert()
        .success();

    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "Ok");
    assert_eq!(payload["details"]["resolved_image"], common::resolved_image());
    assert_eq!(payload["details"]["cpp_configs"], false);

    let mut archive = Archive::new(File::open(&tarball).expect("tarball"));
    let mut names = Vec::new();
    let mut java_build = String::new();
    for entry in archive.entries().expect("entries") {
        let mut entry = entry.expect("entry");
        let name = entry.path().expect("path").display().to_string();
        if name == "java/BUILD" {
            entry.read_to_string(&mut java_build).expect("java build");
        }
        names.push(name);
    }
    assert_eq!(names, vec!["java/BUILD", "config/BUILD"]);
    assert!(java_build.contains("java_runtime("), "{java_build}");
    assert!(!java_build.contains("local_java_runtime"), "{java_build}");
    assert!(java_build.contains(&fake.java_home.display().to_string()));

    let manifest = fs::read_to_string(&manifest).expect("manifest");
    assert_eq!(manifest.lines().count(), 5);
    assert!(manifest.contains(&format!("ImageDigest={}\n", "c".repeat(64))));
    assert_eq!(
        payload["details"]["tarball_sha256"].as_str(),
        manifest
            .lines()
            .last()
            .and_then(|line| line.strip_prefix("ConfigsTarballDigest="))
    );

    let calls = fake.calls();
    assert_eq!(calls.first().map(String::as_str), Some("pull gcr.io/rbe/toolchain:latest"));
    assert_eq!(calls.last(), Some(&format!("stop -t 0 {}", common::CONTAINER_ID)));
}

#[cfg(target_os = "linux")]
#[test]
fn unavailable_engine_is_a_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = rbeconf()
        .arg("--json")
        .args(["--bazel-version", "4.2.0"])
        .args(["--toolchain-container", "gcr.io/rbe/toolchain:latest"])
        .arg("--output-tarball")
        .arg(temp.path().join("configs.tar"))
        .args(["--container-backend", "/bin/false"])
        .assert()
        .code(2);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "Failure");
    assert_eq!(payload["details"]["code"], "RBE101");
    assert_eq!(payload["details"]["stage"], "start toolchain container");
    assert!(!temp.path().join("configs.tar").exists());
}
