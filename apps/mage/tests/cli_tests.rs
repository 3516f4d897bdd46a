//! Command tests against temporary redb databases.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use mage::cli::{
    Cli, Commands, NewPerson, PersonChanges, Settings, cmd_decode_key, cmd_init, cmd_status,
    create_person, execute, load_person, open_persister, update_person,
};
use mage::config::{Backend, Config};
use mage_core::{Key, MageError};
use tempfile::{TempDir, tempdir};

fn redb_settings() -> (TempDir, Settings) {
    let temp = tempdir().expect("temp dir");
    let settings = Settings {
        database: temp.path().join("mage.db"),
        backend: Backend::Redb,
        cache_capacity: 16,
        json_mode: true,
    };
    (temp, settings)
}

fn ada() -> NewPerson {
    NewPerson {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        age: 36,
        street: "12 Analytical Row".to_string(),
        city: "London".to_string(),
        token: Some("secret".to_string()),
    }
}

// =============================================================================
// PERSON OPERATIONS
// =============================================================================

#[test]
fn test_create_then_show_in_new_process() {
    let (_temp, settings) = redb_settings();

    let created = {
        let persister = open_persister(&settings).expect("open");
        create_person(&persister, ada()).expect("create")
    };
    assert_eq!(created.id, Some(1));
    assert_eq!(created.home.id, Some(1));
    assert_eq!(created.key, Some(Key::new("Person", 1).encode()));

    let persister = open_persister(&settings).expect("reopen");
    let loaded = load_person(&persister, 1).expect("show");
    assert_eq!(loaded.name, "Ada");
    assert_eq!(loaded.home.city, "London");
    assert_eq!(loaded.token, None);
}

#[test]
fn test_update_rewrites_person_and_address() {
    let (_temp, settings) = redb_settings();
    {
        let persister = open_persister(&settings).expect("open");
        create_person(&persister, ada()).expect("create");
    }

    {
        let persister = open_persister(&settings).expect("open");
        let updated = update_person(
            &persister,
            1,
            PersonChanges {
                city: Some("Paris".to_string()),
                age: Some(37),
                ..PersonChanges::default()
            },
        )
        .expect("update");
        assert_eq!(updated.home.id, Some(1));
        assert_eq!(updated.age, 37);
    }

    let persister = open_persister(&settings).expect("open");
    let loaded = load_person(&persister, 1).expect("show");
    assert_eq!(loaded.home.city, "Paris");
    assert_eq!(loaded.name, "Ada");
    assert_eq!(
        persister.store().kind_counts().expect("counts"),
        vec![("Address".to_string(), 1), ("Person".to_string(), 1)]
    );
}

#[test]
fn test_show_unknown_id_fails() {
    let (_temp, settings) = redb_settings();
    let persister = open_persister(&settings).expect("open");
    let err = load_person(&persister, 99).expect_err("absent");
    assert!(matches!(err, MageError::EntityNotFound(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_memory_backend_is_volatile() {
    let settings = Settings {
        database: "unused.db".into(),
        backend: Backend::Memory,
        cache_capacity: 4,
        json_mode: false,
    };
    {
        let persister = open_persister(&settings).expect("open");
        create_person(&persister, ada()).expect("create");
        assert!(!persister.store().is_persistent());
    }
    let persister = open_persister(&settings).expect("open");
    assert!(load_person(&persister, 1).is_err());
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_init_refuses_existing_database_without_force() {
    let (_temp, settings) = redb_settings();
    cmd_init(&settings, false).expect("first init");
    assert!(settings.database.exists());

    let err = cmd_init(&settings, false).expect_err("exists");
    assert!(matches!(err, MageError::InvalidState(_)));
    cmd_init(&settings, true).expect("forced init");
}

#[test]
fn test_force_init_clears_data() {
    let (_temp, settings) = redb_settings();
    {
        let persister = open_persister(&settings).expect("open");
        create_person(&persister, ada()).expect("create");
    }
    cmd_init(&settings, true).expect("forced init");

    let persister = open_persister(&settings).expect("open");
    assert!(persister.store().kind_counts().expect("counts").is_empty());
}

#[test]
fn test_status_and_decode_key() {
    let (_temp, settings) = redb_settings();
    cmd_status(&settings).expect("status");
    cmd_decode_key(&settings, &Key::new("Person", 3).encode()).expect("decode");
    assert!(matches!(
        cmd_decode_key(&settings, "***"),
        Err(MageError::InvalidKey(_))
    ));
}

#[test]
fn test_execute_parsed_create() {
    let (temp, _) = redb_settings();
    let db = temp.path().join("cli.db");
    let cli = Cli::parse_from([
        "mage",
        "--database",
        db.to_str().expect("utf-8 path"),
        "--json-mode",
        "create",
        "--name",
        "Grace",
        "--age",
        "85",
        "--city",
        "Arlington",
    ]);
    assert!(matches!(cli.command, Some(Commands::Create { .. })));
    execute(cli, &Config::default()).expect("execute");

    let settings = Settings {
        database: db,
        backend: Backend::Redb,
        cache_capacity: 1,
        json_mode: false,
    };
    let persister = open_persister(&settings).expect("open");
    let loaded = load_person(&persister, 1).expect("show");
    assert_eq!(loaded.name, "Grace");
    assert_eq!(loaded.age, 85);
    assert_eq!(loaded.home.city, "Arlington");
}
