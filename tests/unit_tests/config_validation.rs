// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use vchannel_dispatch::cfg::config::ServerConfig;

fn minimal_yaml(extra: &str) -> String {
    format!(
        "logging:\n  level: \"info\"\n  output: \"stdout\"\n{extra}",
    )
}

#[test]
fn defaults_pass_validation() {
    let mut cfg: ServerConfig =
        serde_yaml::from_str(&minimal_yaml("")).expect("minimal config should parse");
    cfg.validate_and_normalize().expect("defaults should validate");

    assert_eq!(cfg.dispatcher.queue_capacity, 256);
    assert_eq!(cfg.smartcard.max_readers, 10);
    assert_eq!(cfg.smartcard.initial_buf_size, 270);
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let mut cfg: ServerConfig = serde_yaml::from_str(&minimal_yaml(
        "dispatcher:\n  queue_capacity: 0\n",
    ))
    .expect("config should parse");
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn zero_max_readers_is_rejected() {
    let mut cfg: ServerConfig = serde_yaml::from_str(&minimal_yaml(
        "smartcard:\n  max_readers: 0\n",
    ))
    .expect("config should parse");
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn zero_initial_buf_size_is_rejected() {
    let mut cfg: ServerConfig = serde_yaml::from_str(&minimal_yaml(
        "smartcard:\n  initial_buf_size: 0\n",
    ))
    .expect("config should parse");
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn overridden_values_round_trip_through_yaml() {
    let cfg: ServerConfig = serde_yaml::from_str(&minimal_yaml(
        "smartcard:\n  max_readers: 4\n  initial_buf_size: 512\n",
    ))
    .expect("config should parse");
    assert_eq!(cfg.smartcard.max_readers, 4);
    assert_eq!(cfg.smartcard.initial_buf_size, 512);
}
