//! Helpers for running the `neuroshift` binary in tests.

#![allow(dead_code)]

use serde::de::DeserializeOwned;
use std::process::{Command, Output};

pub fn run_cli(args: &[String], envs: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_neuroshift"));
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    command.output().expect("run neuroshift")
}

pub fn assert_cli_success(output: &Output, args: &[String]) {
    assert!(
        output.status.success(),
        "neuroshift {:?} failed\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn run_cli_json<T: DeserializeOwned>(args: &[String], envs: &[(&str, &str)]) -> T {
    let output = run_cli(args, envs);
    assert_cli_success(&output, args);
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "neuroshift {:?} printed invalid JSON: {}\n{}",
            args,
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
