//! Full workflow integration tests.
//!
//! These tests verify complete end-to-end workflows through the binary.

mod support;
use support::*;

#[test]
fn test_full_operator_workflow() {
    let t = Test::new();

    // Store
    for (name, value) in STANDARD_SECRETS {
        assert_success(&t.set(name, value));
    }

    // List
    let output = t.run(&["secret", "list"]);
    assert_success(&output);
    assert_stdout_contains(&output, "4 secrets");
    for (name, _) in STANDARD_SECRETS {
        assert_stdout_contains(&output, name);
    }

    // Keys
    assert_success(&t.generate("db"));
    assert_success(&t.run(&["key", "rotate", "db"]));
    let output = t.run(&["key", "list"]);
    assert_success(&output);
    assert_stdout_contains(&output, "2 keys");
    assert_stdout_contains(&output, "archived");

    // Vault rotation
    assert_success(&t.run(&["secret", "rotate", "--force"]));
    for (name, value) in STANDARD_SECRETS {
        let output = t.get(name);
        assert_success(&output);
        assert_eq!(stdout(&output).trim(), *value);
    }

    // Audit trail is intact and free of plaintext
    let output = t.run(&["audit", "verify"]);
    assert_success(&output);
    for (_, value) in STANDARD_SECRETS {
        assert_file_lacks(t.layout().audit_log(), value);
    }
}

#[test]
fn test_disaster_recovery_workflow() {
    let t = Test::new();
    assert_success(&t.generate("db"));
    assert_success(&t.generate("cache"));
    assert_success(&t.run(&["key", "backup"]));

    // Lose the master key
    std::fs::remove_file(t.layout().master_key()).unwrap();

    let shares: Vec<String> = [2u8, 4, 5]
        .iter()
        .map(|i| t.layout().share_file(*i).display().to_string())
        .collect();
    let mut args = vec!["key", "restore"];
    args.extend(shares.iter().map(String::as_str));

    let output = t.run(&args);
    assert_success(&output);
    assert_stdout_contains(&output, "2 keys loaded");

    let keys = t.keys();
    assert!(keys.get_key("db").unwrap().is_some());
    assert!(keys.get_key("cache").unwrap().is_some());
}

#[test]
fn test_rotation_preserves_all_secrets() {
    let t = Test::new();
    let secrets: Vec<(String, String)> = (1..=10)
        .map(|i| (format!("service_{i}.token"), format!("value_{i}")))
        .collect();
    for (name, value) in &secrets {
        assert_success(&t.set(name, value));
    }

    assert_success(&t.run(&["secret", "rotate", "--force"]));
    assert_success(&t.run(&["secret", "rotate", "--force"]));

    for (name, value) in &secrets {
        let output = t.get(name);
        assert_success(&output);
        assert_eq!(stdout(&output).trim(), value);
    }
}
