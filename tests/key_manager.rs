//! KeyManager tests: lifecycle, persistence and threshold backup.

mod support;

use std::fs;

use support::*;
use vaultkeeper::core::cipher::{self, aead};
use vaultkeeper::core::config::Config;
use vaultkeeper::core::keys::{shamir, KeyMaterial, KeyType};
use vaultkeeper::error::{Error, KeyError};

#[test]
fn test_generated_keys_persist_across_reopen() {
    let t = Test::new();
    let key = t.keys().generate_symmetric_key("db").unwrap();
    let salt = t.keys().generate_salt("kdf_salt").unwrap();
    assert_eq!(salt.len(), 32);

    let keys = t.keys();
    assert_eq!(keys.symmetric_key("db").unwrap().unwrap(), key);
    assert_eq!(keys.salt("kdf_salt").unwrap().unwrap(), salt);
    assert_eq!(keys.list_keys().len(), 2);
}

#[test]
fn test_key_files_are_encrypted() {
    let t = Test::new();
    let key = t.keys().generate_symmetric_key("db").unwrap();
    let path = t.layout().key_file("db");
    let raw = fs::read(&path).unwrap();
    assert_eq!(raw[0], 0x01);
    assert_file_lacks(&path, &hex::encode(&key[..]));
    assert_file_lacks(&path, "symmetric");
}

#[test]
fn test_rotation_yields_new_material_and_keeps_old() {
    let t = Test::new();
    let keys = t.keys();
    let before = keys.generate_symmetric_key("k").unwrap();
    let archived = keys.rotate_key("k").unwrap();
    assert!(archived.starts_with("k_old_"));

    let after = keys.symmetric_key("k").unwrap().unwrap();
    assert_ne!(before, after);

    let old = keys.get_record(&archived).unwrap();
    assert!(!old.active);
    assert!(old.rotated_at.is_some());
    match &old.material {
        KeyMaterial::Symmetric { key } => assert_eq!(&key[..], &before[..]),
        other => panic!("unexpected material {other:?}"),
    }
    assert_eq!(keys.generations("k"), vec![archived]);
}

#[test]
fn test_repeated_rotation_keeps_every_generation() {
    let t = Test::new();
    let keys = t.keys();
    keys.generate_salt("s").unwrap();
    let a = keys.rotate_key("s").unwrap();
    let b = keys.rotate_key("s").unwrap();
    assert_ne!(a, b);
    assert_eq!(keys.generations("s").len(), 2);
    assert_eq!(keys.get_key("s").unwrap().unwrap().key_type(), KeyType::Salt);
}

#[test]
fn test_rotate_missing_key() {
    let t = Test::new();
    let err = t.keys().rotate_key("nope").unwrap_err();
    assert!(matches!(err, Error::Key(KeyError::NotFound(_))));
}

#[test]
fn test_duplicate_generate_rejected() {
    let t = Test::new();
    let keys = t.keys();
    keys.generate_symmetric_key("db").unwrap();
    let err = keys.generate_symmetric_key("db").unwrap_err();
    assert!(matches!(err, Error::Key(KeyError::AlreadyExists(_))));
}

#[test]
fn test_get_key_rotates_when_due() {
    let mut config = Config::default();
    config.keys.rotation_interval_days = 0;
    let t = Test::with_config(config);
    let keys = t.keys();
    let before = keys.generate_symmetric_key("db").unwrap();

    let after = keys.symmetric_key("db").unwrap().unwrap();
    assert_ne!(before, after);
    assert!(!keys.generations("db").is_empty());
}

#[test]
fn test_destroyed_key_not_returned() {
    let t = Test::new();
    let keys = t.keys();
    keys.generate_symmetric_key("tmp").unwrap();
    keys.destroy_key("tmp").unwrap();
    assert!(keys.get_key("tmp").unwrap().is_none());

    let record = t.keys().get_record("tmp").unwrap();
    assert!(record.is_destroyed());
    assert!(t.audit_actions().contains(&"KEY_DESTROYED".to_string()));
}

#[test]
fn test_unknown_key_type_is_unsupported_for_rotation() {
    let t = Test::new();
    t.keys();

    // Write a record with a type tag this crate does not know.
    let master = cipher::key_from_slice(&fs::read(t.layout().master_key()).unwrap()).unwrap();
    let record = serde_json::json!({
        "name": "legacy",
        "type": "argon2_salt",
        "salt": "00ff",
        "created_at": "2024-01-01T00:00:00Z",
        "active": true
    });
    let blob = aead::seal_blob(&master, b"legacy", record.to_string().as_bytes()).unwrap();
    fs::write(t.layout().key_file("legacy"), blob).unwrap();

    let keys = t.keys();
    assert!(keys.get_key("legacy").unwrap().is_none());
    let err = keys.rotate_key("legacy").unwrap_err();
    assert!(matches!(err, Error::Key(KeyError::UnsupportedType(tag)) if tag == "argon2_salt"));
}

#[test]
fn test_invalid_key_names_rejected() {
    let t = Test::new();
    let keys = t.keys();
    for name in ["", "../escape", ".hidden", "with space"] {
        let err = keys.generate_symmetric_key(name).unwrap_err();
        assert!(matches!(err, Error::Key(KeyError::InvalidName { .. })), "{name:?}");
    }
}

#[test]
fn test_backup_three_of_five_then_restore() {
    let t = Test::new();
    let keys = t.keys();
    let db = keys.generate_symmetric_key("db").unwrap();
    keys.generate_salt("salt").unwrap();
    let archived = keys.rotate_key("db").unwrap();
    let current = keys.symmetric_key("db").unwrap().unwrap();

    let shares = keys.backup_keys().unwrap();
    assert_eq!(shares.len(), 5);

    let count = keys
        .restore_from_backup(&[&shares[3], &shares[0], &shares[4]])
        .unwrap();
    assert_eq!(count, 3);

    // Every record still decrypts with the restored master.
    let reopened = t.keys();
    assert_eq!(reopened.symmetric_key("db").unwrap().unwrap(), current);
    assert!(reopened.salt("salt").unwrap().is_some());
    match &reopened.get_record(&archived).unwrap().material {
        KeyMaterial::Symmetric { key } => assert_eq!(&key[..], &db[..]),
        other => panic!("unexpected material {other:?}"),
    }
    assert!(t.audit_actions().contains(&"KEYS_RESTORED".to_string()));
}

#[test]
fn test_restore_with_too_few_shares() {
    let t = Test::new();
    let keys = t.keys();
    let shares = keys.backup_keys().unwrap();
    let err = keys.restore_from_backup(&shares[..2]).unwrap_err();
    assert!(matches!(err, Error::Key(KeyError::Threshold { required: 3, provided: 2 })));
    assert!(t.audit_actions().contains(&"KEYS_RESTORE_FAILED".to_string()));
}

#[test]
fn test_fewer_than_threshold_shares_do_not_reconstruct() {
    let t = Test::new();
    let keys = t.keys();
    let shares = keys.backup_keys().unwrap();
    let master = fs::read(t.layout().master_key()).unwrap();

    let parsed: Vec<shamir::Share> = shares
        .iter()
        .map(|p| shamir::Share::from_bytes(&fs::read(p).unwrap()).unwrap())
        .collect();
    let partial = shamir::reconstruct(&parsed[..2]).unwrap();
    assert_ne!(&partial[..], &master[..]);
    let full = shamir::reconstruct(&parsed[2..]).unwrap();
    assert_eq!(&full[..], &master[..]);
}

#[test]
fn test_lost_master_key_recovered_from_shares() {
    let t = Test::new();
    let (key, shares) = {
        let keys = t.keys();
        let key = keys.generate_symmetric_key("db").unwrap();
        (key, keys.backup_keys().unwrap())
    };
    fs::remove_file(t.layout().master_key()).unwrap();

    let keys = t.keys();
    assert!(keys.get_key("db").unwrap().is_none());
    assert!(t.audit_actions().contains(&"MASTER_CHECK_FAILED".to_string()));

    keys.restore_from_backup(&shares[..3]).unwrap();
    assert_eq!(keys.symmetric_key("db").unwrap().unwrap(), key);
}

#[test]
fn test_master_key_file_owner_only() {
    let t = Test::new();
    t.keys();
    let master = fs::read(t.layout().master_key()).unwrap();
    assert_eq!(master.len(), 32);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(t.layout().master_key())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_second_instance_cannot_overwrite_active_key() {
    let t = Test::new();
    let a = t.keys();
    let b = t.keys();

    let key = a.generate_symmetric_key("db").unwrap();
    let err = b.generate_symmetric_key("db").unwrap_err();
    assert!(matches!(err, Error::Key(KeyError::AlreadyExists(_))));

    assert_eq!(t.keys().symmetric_key("db").unwrap().unwrap(), key);
    assert_eq!(b.symmetric_key("db").unwrap().unwrap(), key);
}

#[test]
fn test_rotation_by_other_instance_is_visible() {
    let t = Test::new();
    let a = t.keys();
    let b = t.keys();

    let old = a.generate_symmetric_key("db").unwrap();
    let archived = b.rotate_key("db").unwrap();
    let new = b.symmetric_key("db").unwrap().unwrap();
    assert_ne!(new, old);

    assert_eq!(a.symmetric_key("db").unwrap().unwrap(), new);
    assert!(a.get_key(&archived).unwrap().is_none());
    assert!(!a.get_record(&archived).unwrap().active);
    assert_eq!(t.keys().generations("db"), vec![archived]);

    // Rotating again from the first instance archives the second generation.
    a.rotate_key("db").unwrap();
    assert_eq!(t.keys().generations("db").len(), 2);
}

#[test]
fn test_destroy_by_other_instance_is_visible() {
    let t = Test::new();
    let a = t.keys();
    let b = t.keys();

    a.generate_symmetric_key("db").unwrap();
    b.destroy_key("db").unwrap();

    assert!(a.get_key("db").unwrap().is_none());
    let err = a.destroy_key("db").unwrap_err();
    assert!(matches!(err, Error::Key(KeyError::NotFound(_))));
}
