use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("wmprefs");
    Command::new(path)
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

fn write_config(root: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let system_dir = root.join("system");
    let user_dir = root.join("user");
    fs::create_dir_all(&system_dir).unwrap();
    fs::create_dir_all(&user_dir).unwrap();
    let config_path = root.join("config.yaml");
    fs::write(
        &config_path,
        format!(
            "version: 1\npaths:\n  system_dir: {}\n  user_dir: {}\n",
            system_dir.display(),
            user_dir.display()
        ),
    )
    .unwrap();
    (config_path, system_dir, user_dir)
}

fn write_entry(dir: &Path, file: &str, body: &str) {
    fs::write(dir.join(file), body).unwrap();
}

#[test]
fn list_reports_sorted_validated_registry() {
    let dir = tempdir().unwrap();
    let (config_path, system_dir, user_dir) = write_config(dir.path());
    // `sh` is on every search path; the missing binary entry must be dropped.
    write_entry(
        &system_dir,
        "shwm.desktop",
        "[Desktop Entry]\nName=Shell WM\nExec=sh\n",
    );
    write_entry(
        &system_dir,
        "ghost.desktop",
        "[Desktop Entry]\nName=Ghost\nExec=wmprefs-test-missing-binary\n",
    );
    write_entry(
        &user_dir,
        "zeta.desktop",
        "[Desktop Entry]\nName=Zeta\nExec=zeta-wm\n",
    );
    write_entry(
        &user_dir,
        "alpha.desktop",
        "[Desktop Entry]\nName=Alpha\nExec=alpha-wm\n",
    );

    let output = bin()
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    let names: Vec<&str> = value["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|wm| wm["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Alpha", "Shell WM", "Zeta"]);
    assert!(value["result"][0]["user_installed"].as_bool().unwrap());
    assert!(!value["result"][1]["user_installed"].as_bool().unwrap());
}

#[test]
fn list_human_output_mentions_empty_registry() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, _user_dir) = write_config(dir.path());

    bin()
        .arg("--config")
        .arg(&config_path)
        .arg("list")
        .assert()
        .success()
        .stdout(contains("no window managers found"));
}

#[test]
fn current_matches_identify_name() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    write_entry(
        &user_dir,
        "marco.desktop",
        "[Desktop Entry]\nName=Marco WM\nExec=marco\nX-Test-WMName=marco-reported\nX-Test-WMSettingsModule=marco-module\n",
    );

    let output = bin()
        .env("WMPREFS_WM_NAME", "marco-reported")
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("current")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert_eq!(value["result"]["reported"].as_str().unwrap(), "marco-reported");
    assert_eq!(
        value["result"]["matched"]["name"].as_str().unwrap(),
        "Marco WM"
    );
    assert_eq!(
        value["result"]["settings_module"]["module"].as_str().unwrap(),
        "marco-module"
    );
}

#[test]
fn current_falls_back_to_display_name() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    write_entry(
        &user_dir,
        "metacity.desktop",
        "[Desktop Entry]\nName=Metacity\nExec=metacity\n",
    );

    let output = bin()
        .env("WMPREFS_WM_NAME", "Metacity")
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("current")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(
        value["result"]["matched"]["name"].as_str().unwrap(),
        "Metacity"
    );
    assert!(value["result"]["settings_module"].is_null());
}

#[test]
fn current_with_unknown_wm_is_not_an_error() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, _user_dir) = write_config(dir.path());

    let output = bin()
        .env("WMPREFS_WM_NAME", "unregistered-wm")
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("current")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert!(value["result"]["matched"].is_null());
}

#[test]
fn configure_error_names_the_window_manager() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    write_entry(
        &user_dir,
        "bare.desktop",
        "[Desktop Entry]\nName=Bare\nExec=bare-wm\nX-Test-WMName=bare-reported\n",
    );

    bin()
        .env("WMPREFS_WM_NAME", "bare-reported")
        .arg("--config")
        .arg(&config_path)
        .arg("configure")
        .assert()
        .failure()
        .stderr(contains(
            "window manager \"bare-reported\" has not registered a configuration tool",
        ));
}

#[test]
fn configure_json_error_envelope() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, _user_dir) = write_config(dir.path());

    let output = bin()
        .env("WMPREFS_WM_NAME", "nobody-home")
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("configure")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(!value["ok"].as_bool().unwrap());
    assert!(value["error"].as_str().unwrap().contains("nobody-home"));
}

#[cfg(unix)]
#[test]
fn configure_spawns_registered_tool() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    let tool = dir.path().join("fake-settings");
    fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
    write_entry(
        &user_dir,
        "tooled.desktop",
        &format!(
            "[Desktop Entry]\nName=Tooled\nExec=tooled-wm\nX-Test-WMName=tooled-reported\nConfigExec={} --page one\n",
            tool.display()
        ),
    );

    let output = bin()
        .env("WMPREFS_WM_NAME", "tooled-reported")
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("configure")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert!(value["result"]["command"]
        .as_str()
        .unwrap()
        .contains("fake-settings"));
}

#[test]
fn select_by_name_reports_without_launching() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    write_entry(
        &user_dir,
        "beta.desktop",
        "[Desktop Entry]\nName=Beta\nExec=beta-wm --replace\n",
    );

    let output = bin()
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("select")
        .arg("Beta")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(
        value["result"]["window_manager"]["name"].as_str().unwrap(),
        "Beta"
    );
    assert!(!value["result"]["launched"].as_bool().unwrap());
}

#[test]
fn select_unknown_name_fails() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    write_entry(
        &user_dir,
        "beta.desktop",
        "[Desktop Entry]\nName=Beta\nExec=beta-wm\n",
    );

    bin()
        .arg("--config")
        .arg(&config_path)
        .arg("select")
        .arg("Gamma")
        .assert()
        .failure()
        .stderr(contains("unknown window manager \"Gamma\""));
}

#[test]
fn select_interactive_requires_a_tty() {
    let dir = tempdir().unwrap();
    let (config_path, _system_dir, user_dir) = write_config(dir.path());
    write_entry(
        &user_dir,
        "beta.desktop",
        "[Desktop Entry]\nName=Beta\nExec=beta-wm\n",
    );

    bin()
        .arg("--config")
        .arg(&config_path)
        .arg("select")
        .assert()
        .failure()
        .stderr(contains("requires a TTY"));
}

#[test]
fn show_resolves_a_basename_in_the_scan_directories() {
    let dir = tempdir().unwrap();
    let (config_path, system_dir, _user_dir) = write_config(dir.path());
    write_entry(
        &system_dir,
        "shwm.desktop",
        "[Desktop Entry]\nName=Shell WM\nExec=sh\nX-Test-WMName=shwm\n",
    );

    let output = bin()
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .arg("show")
        .arg("shwm.desktop")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["result"]["name"].as_str().unwrap(), "Shell WM");
    assert_eq!(value["result"]["identify_name"].as_str().unwrap(), "shwm");

    bin()
        .arg("--config")
        .arg(&config_path)
        .arg("show")
        .arg("missing.desktop")
        .assert()
        .failure()
        .stderr(contains("no desktop entry found"));
}

#[test]
fn config_init_creates_and_preserves_existing() {
    let dir = tempdir().unwrap();
    let config_dir = dir.path().join("config");

    let output = bin()
        .env("WMPREFS_CONFIG_DIR", &config_dir)
        .arg("--json")
        .arg("config")
        .arg("init")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert!(value["result"]["created"].as_bool().unwrap());

    let config_path = config_dir.join("config.yaml");
    assert!(config_path.exists());

    fs::write(&config_path, "sentinel: true\n").unwrap();

    let output = bin()
        .env("WMPREFS_CONFIG_DIR", &config_dir)
        .arg("--json")
        .arg("config")
        .arg("init")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(!value["result"]["created"].as_bool().unwrap());
    assert_eq!(
        fs::read_to_string(&config_path).unwrap(),
        "sentinel: true\n"
    );
}

#[test]
fn config_validate_rejects_unknown_fields() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "version: 1\nunknown_field: true\npaths:\n  system_dir: /usr/share/wm-properties\n",
    )
    .unwrap();

    bin()
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .arg("validate")
        .assert()
        .failure()
        .stderr(contains("unknown field"));
}

#[test]
fn config_validate_accepts_generated_default() {
    let dir = tempdir().unwrap();
    let config_dir = dir.path().join("config");

    bin()
        .env("WMPREFS_CONFIG_DIR", &config_dir)
        .arg("config")
        .arg("init")
        .assert()
        .success();

    bin()
        .env("WMPREFS_CONFIG_DIR", &config_dir)
        .arg("config")
        .arg("validate")
        .assert()
        .success()
        .stdout(contains("config ok"));
}
