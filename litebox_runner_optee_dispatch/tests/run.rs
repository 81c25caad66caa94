// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use litebox_runner_optee_dispatch::commands::parse_uuid;
use litebox_runner_optee_dispatch::loader::FsTaLoader;
use litebox_runner_optee_dispatch::ta_image::TaImageFile;

const ECHO_TA: &str = "8aaaf200-2450-11e4-abe2-0002a5d5c51b";
const COUNTER_TA: &str = "5b9e0e40-2636-11e1-ad9e-0002a5d5c51b";

/// A TA directory holding the images of the built-in apps.
fn ta_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let loader = FsTaLoader::new(dir.path());
    for (uuid, app) in [(ECHO_TA, "echo"), (COUNTER_TA, "counter")] {
        let uuid = parse_uuid(uuid).unwrap();
        std::fs::write(
            loader.image_path(&uuid),
            TaImageFile::new(uuid, app).build(),
        )
        .unwrap();
    }
    dir
}

fn run(name: &str, extra_args: &[&str]) {
    let binary_path = std::env::var("NEXTEST_BIN_EXE_litebox_runner_optee_dispatch")
        .unwrap_or_else(|_| env!("CARGO_BIN_EXE_litebox_runner_optee_dispatch").to_string());
    let dir = ta_dir();

    let mut command = std::process::Command::new(&binary_path);
    command
        .arg(dir.path())
        .arg(format!("tests/{name}-cmds.json"))
        .args(extra_args);
    println!("Running `{command:?}`");
    let status = command.status().unwrap_or_else(|err| {
        panic!("Failed to run litebox_runner_optee_dispatch against {name}: {err}")
    });
    assert!(
        status.success(),
        "failed to run litebox_runner_optee_dispatch against {name}: {status}",
    );
}

#[test]
fn test_runner_echo_ta() {
    run("echo-ta", &["--preload", ECHO_TA]);
}

#[test]
fn test_runner_lazy_load() {
    run("counter-ta", &[]);
}

#[test]
fn test_runner_rejects() {
    run("rejects", &["--preload", ECHO_TA, "--max-sessions", "1"]);
}

#[test]
fn test_runner_without_lazy_load() {
    run("no-lazy-load", &["--no-lazy-load", "--scratch-slots", "1"]);
}
