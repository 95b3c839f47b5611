//! CLI tests driving the vaultkeeper binary.

mod support;

use std::fs;

use predicates::prelude::*;
use support::*;

#[test]
fn test_secret_set_get() {
    let t = Test::new();
    assert_success(&t.set("stripe.api_key", "sk_test_123"));
    let output = t.get("stripe.api_key");
    assert_success(&output);
    assert_eq!(stdout(&output).trim(), "sk_test_123");
}

#[test]
fn test_secret_get_missing() {
    let t = Test::new();
    let output = t.get("missing");
    assert_failure(&output);
    assert_stderr_contains(&output, "secret 'missing' not found or expired");
    assert_stderr_contains(&output, "vaultkeeper secret list");
}

#[test]
fn test_secret_expired_via_ttl() {
    let t = Test::new();
    assert_success(&t.run(&["secret", "set", "otp", "1234", "--ttl-days", "0"]));
    assert_failure(&t.get("otp"));
}

#[test]
fn test_secret_list_json() {
    let t = Test::new();
    for (name, value) in STANDARD_SECRETS {
        assert_success(&t.set(name, value));
    }
    let output = t.run(&["secret", "list", "--json"]);
    assert_success(&output);

    let list: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), STANDARD_SECRETS.len());
    assert!(names.contains(&"stripe.api_key"));
    assert!(!stdout(&output).contains("sk_live_51H8abc"));
}

#[test]
fn test_secret_rm() {
    let t = Test::new();
    assert_success(&t.set("k", "v"));
    let output = t.run(&["secret", "rm", "k"]);
    assert_success(&output);
    assert_stdout_contains(&output, "removed");
    assert_failure(&t.get("k"));
}

#[test]
fn test_secret_rotate() {
    let t = Test::new();
    assert_success(&t.set("k", "v"));
    let output = t.run(&["secret", "rotate"]);
    assert_success(&output);
    assert_stdout_contains(&output, "rotation not due");

    assert_success(&t.run(&["secret", "rotate", "--force"]));
    assert_eq!(stdout(&t.get("k")).trim(), "v");
}

#[test]
fn test_secret_migrate() {
    let t = Test::new();
    let legacy = t.root().join("settings.json");
    fs::write(&legacy, LEGACY_CONFIG).unwrap();

    let output = t.run(&["secret", "migrate", legacy.to_str().unwrap()]);
    assert_success(&output);
    assert_stdout_contains(&output, "migrated 3 secrets");
    assert_eq!(stdout(&t.get("settings.stripe.api_key")).trim(), "sk_live_legacy");
}

#[test]
fn test_key_generate_and_list() {
    let t = Test::new();
    assert_success(&t.generate("db"));
    assert_success(&t.run(&["key", "generate", "kdf", "--kind", "salt"]));

    let output = t.run(&["key", "list", "--json"]);
    assert_success(&output);
    let list: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[0]["name"], "db");
    assert_eq!(list[0]["key_type"], "symmetric");
    assert!(!stdout(&output).contains("\"key\""));
}

#[test]
fn test_key_generate_duplicate_fails() {
    let t = Test::new();
    assert_success(&t.generate("db"));
    let output = t.generate("db");
    assert_failure(&output);
    assert_stderr_contains(&output, "already exists");
}

#[test]
fn test_key_rotate() {
    let t = Test::new();
    assert_success(&t.generate("db"));
    let output = t.run(&["key", "rotate", "db"]);
    assert_success(&output);
    assert_stdout_contains(&output, "db_old_");
}

#[test]
fn test_key_rotate_missing() {
    t_missing_key(&["key", "rotate", "ghost"]);
}

#[test]
fn test_key_destroy_missing() {
    t_missing_key(&["key", "destroy", "ghost"]);
}

#[test]
fn test_key_destroy_archived_name_rejected() {
    let t = Test::new();
    assert_success(&t.generate("db"));
    let output = t.run(&["key", "rotate", "db"]);
    assert_success(&output);
    let archived = stdout(&output)
        .split_whitespace()
        .find(|word| word.contains("db_old_"))
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .unwrap()
        .to_string();

    let output = t.run(&["key", "destroy", &archived]);
    assert_failure(&output);
    assert_stderr_contains(&output, "no active key found");

    let help = t.run(&["key", "destroy", "--help"]);
    assert_success(&help);
    assert_stdout_contains(&help, "Name of an active key");
    assert!(!stdout(&help).contains("archived names included"));
}

fn t_missing_key(args: &[&str]) {
    let t = Test::new();
    let output = t.run(args);
    assert_failure(&output);
    assert_stderr_contains(&output, "no active key found for 'ghost'");
}

#[test]
fn test_key_backup_restore() {
    let t = Test::new();
    assert_success(&t.generate("db"));
    assert_success(&t.run(&["key", "backup"]));

    let backup = t.root().join("backup");
    let share = |i: u8| backup.join(format!("key_share_{i}.bin"));
    for i in 1..=5 {
        assert!(share(i).exists());
    }

    let (a, b, c) = (share(1), share(3), share(5));
    let output = t.run(&[
        "key",
        "restore",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
        c.to_str().unwrap(),
    ]);
    assert_success(&output);
    assert_stdout_contains(&output, "1 keys loaded");

    let output = t.run(&["key", "restore", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert_failure(&output);
    assert_stderr_contains(&output, "not enough shares");
}

#[test]
fn test_audit_verify() {
    let t = Test::new();
    assert_success(&t.set("k", "v"));
    assert_success(&t.generate("db"));

    t.cmd()
        .args(["audit", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all entries verified"));

    let log = t.root().join("audit.log");
    let text = fs::read_to_string(&log).unwrap();
    fs::write(&log, text.replacen("SECRET_STORED", "SECRET_REMOVED", 1)).unwrap();

    t.cmd()
        .args(["audit", "verify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HMAC mismatch"));
}

#[test]
fn test_seal_unseal_round_trip() {
    let t = Test::new();
    let input = t.home.path().join("notes.txt");
    let sealed = t.home.path().join("notes.sealed");
    let opened = t.home.path().join("notes.out");
    fs::write(&input, "quarterly numbers").unwrap();

    t.cmd()
        .env("SEAL_PW", "correct horse")
        .args(["seal", input.to_str().unwrap(), sealed.to_str().unwrap()])
        .args(["--password-env", "SEAL_PW"])
        .assert()
        .success();
    assert_file_lacks(&sealed, "quarterly");

    t.cmd()
        .env("SEAL_PW", "wrong horse")
        .args(["unseal", sealed.to_str().unwrap(), opened.to_str().unwrap()])
        .args(["--password-env", "SEAL_PW"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("decryption failed"));

    t.cmd()
        .env("SEAL_PW", "correct horse")
        .args(["unseal", sealed.to_str().unwrap(), opened.to_str().unwrap()])
        .args(["--password-env", "SEAL_PW"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&opened).unwrap(), "quarterly numbers");
}

#[test]
fn test_invalid_config_rejected() {
    let t = Test::new();
    fs::write(
        t.root().join("vaultkeeper.toml"),
        "[keys]\nshamir_threshold = 1\n",
    )
    .unwrap();
    let output = t.generate("db");
    assert_failure(&output);
    assert_stderr_contains(&output, "keys.shamir_threshold");
}

#[test]
fn test_completions() {
    Test::new()
        .cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vaultkeeper"));
}
