mod common;

use std::fs;
use std::process::Command;

use ark_savegame::{Property, PropertyBag, PropertyValue, SaveArchive};

use common::{foo_world, name, scratch_dir};

fn ark_tool(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ark-tool")).args(args).output().expect("run ark-tool")
}

#[test]
fn test_to_json_and_back() {
    let dir = scratch_dir("cli");
    let mut bag = PropertyBag::new(name("PrimalLocalProfile", 0));
    bag.properties.push(Property::new("PlayerName", PropertyValue::Str("Survivor".into())));
    let original = bag.to_bytes().unwrap();
    let input = dir.join("LocalPlayer.sav");
    fs::write(&input, &original).unwrap();

    let json = dir.join("LocalPlayer.json");
    let output = ark_tool(&["to-json", input.to_str().unwrap(), "--output", json.to_str().unwrap(), "--pretty"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value = serde_json::from_slice(&fs::read(&json).unwrap()).unwrap();
    assert_eq!(value["format"], "bag");

    let rebuilt = dir.join("Rebuilt.sav");
    let output = ark_tool(&["from-json", json.to_str().unwrap(), rebuilt.to_str().unwrap(), "--mmap"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read(&rebuilt).unwrap(), original);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_classes_lists_counts() {
    let dir = scratch_dir("cli-classes");
    let input = dir.join("TheIsland.ark");
    fs::write(&input, foo_world(9).to_bytes().unwrap()).unwrap();

    let output = ark_tool(&["classes", input.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Foo_C"));
    assert!(stdout.contains("FooComponent_C"));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_failure_reports_error_kind() {
    let dir = scratch_dir("cli-broken");
    let input = dir.join("Broken.arkprofile");
    fs::write(&input, [1, 0]).unwrap();

    let output = ark_tool(&["to-json", input.to_str().unwrap()]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.lines().any(|line| line.starts_with("error[")), "{stderr}");
    fs::remove_dir_all(&dir).unwrap();
}
