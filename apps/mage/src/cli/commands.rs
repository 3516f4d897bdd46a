//! # CLI Command Implementations
//!
//! Each `cmd_*` opens the configured store, runs one engine operation and
//! prints the result. The `*_person` functions hold the engine calls and
//! return plain values so they can be tested without capturing stdout.

use super::Settings;
use crate::config::Backend;
use crate::demo::{Address, Person};
use mage_core::{Key, MageError, MemoryCache, MemoryStore, Persister, RedbStore, StorageBackend};

/// The persister every command runs against.
pub type AppPersister = Persister<StorageBackend, MemoryCache>;

/// Open the configured backend.
pub fn open_persister(settings: &Settings) -> Result<AppPersister, MageError> {
    let store = match settings.backend {
        Backend::Redb => StorageBackend::Persistent(RedbStore::open(&settings.database)?),
        Backend::Memory => StorageBackend::InMemory(MemoryStore::new()),
    };
    Ok(Persister::new(
        store,
        MemoryCache::with_capacity(settings.cache_capacity),
    ))
}

fn print_json(output: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

// =============================================================================
// PERSON OPERATIONS
// =============================================================================

/// Fields of a person to create.
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    pub age: i64,
    pub street: String,
    pub city: String,
    pub token: Option<String>,
}

/// Fields to change on an existing person. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PersonChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i64>,
    pub street: Option<String>,
    pub city: Option<String>,
}

impl PersonChanges {
    fn apply(self, person: &mut Person) {
        if let Some(name) = self.name {
            person.name = name;
        }
        if let Some(email) = self.email {
            person.email = email;
        }
        if let Some(age) = self.age {
            person.age = age;
        }
        if let Some(street) = self.street {
            person.home.street = street;
        }
        if let Some(city) = self.city {
            person.home.city = city;
        }
    }
}

/// Create a person and their address in one transaction.
pub fn create_person(persister: &AppPersister, new: NewPerson) -> Result<Person, MageError> {
    let mut person = Person {
        name: new.name,
        email: new.email,
        age: new.age,
        home: Address {
            street: new.street,
            city: new.city,
            ..Address::default()
        },
        token: new.token,
        ..Person::default()
    };
    persister.register(&mut person)?;
    persister.create(&mut person)?;
    person.sync_ids();
    Ok(person)
}

/// Load a person and their address.
pub fn load_person(persister: &AppPersister, id: i64) -> Result<Person, MageError> {
    let mut person = Person::default();
    persister.modelable_from_id(&mut person, id)?;
    person.sync_ids();
    Ok(person)
}

/// Load, change and rewrite a person and their address.
pub fn update_person(
    persister: &AppPersister,
    id: i64,
    changes: PersonChanges,
) -> Result<Person, MageError> {
    let mut person = load_person(persister, id)?;
    changes.apply(&mut person);
    persister.update(&mut person)?;
    person.sync_ids();
    Ok(person)
}

fn print_person(person: &Person, verb: &str, json_mode: bool) {
    if json_mode {
        print_json(&serde_json::json!({ "status": verb, "person": person }));
        return;
    }

    println!("Person {}", verb);
    println!("================");
    println!("Id:      {}", person.id.unwrap_or(-1));
    println!("Key:     {}", person.key.as_deref().unwrap_or("-"));
    println!("Name:    {}", person.name);
    println!("Email:   {}", person.email);
    println!("Age:     {}", person.age);
    println!(
        "Home:    {}, {} (address {})",
        person.home.street,
        person.home.city,
        person.home.id.unwrap_or(-1)
    );
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), MageError> {
    let db_path = &settings.database;

    match settings.backend {
        Backend::Memory => {
            println!("Memory backend keeps nothing on disk; nothing to initialize");
        }
        Backend::Redb => {
            if db_path.exists() {
                if !force {
                    return Err(MageError::InvalidState(
                        "Database already exists. Use --force to overwrite.".to_string(),
                    ));
                }
                std::fs::remove_file(db_path).map_err(|e| {
                    MageError::IoError(format!("Cannot remove {}: {}", db_path.display(), e))
                })?;
            }
            let _store = RedbStore::open(db_path)?;
            tracing::info!(path = %db_path.display(), "initialized database");
            println!("Initialized new redb database at {:?}", db_path);
        }
    }

    Ok(())
}

// =============================================================================
// PERSON COMMANDS
// =============================================================================

/// Create a person.
pub fn cmd_create(settings: &Settings, new: NewPerson) -> Result<(), MageError> {
    let persister = open_persister(settings)?;
    let person = create_person(&persister, new)?;
    print_person(&person, "created", settings.json_mode);
    Ok(())
}

/// Show a person.
pub fn cmd_show(settings: &Settings, id: i64) -> Result<(), MageError> {
    let persister = open_persister(settings)?;
    let person = load_person(&persister, id)?;
    print_person(&person, "found", settings.json_mode);
    Ok(())
}

/// Update a person.
pub fn cmd_update(settings: &Settings, id: i64, changes: PersonChanges) -> Result<(), MageError> {
    let persister = open_persister(settings)?;
    let person = update_person(&persister, id, changes)?;
    print_person(&person, "updated", settings.json_mode);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show entity counts per kind.
pub fn cmd_status(settings: &Settings) -> Result<(), MageError> {
    let persister = open_persister(settings)?;
    let counts = persister.store().kind_counts()?;
    let total: usize = counts.iter().map(|(_, n)| n).sum();

    if settings.json_mode {
        let kinds: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(kind, n)| (kind.clone(), serde_json::Value::from(*n)))
            .collect();
        print_json(&serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "backend": settings.backend.as_str(),
            "persistent": persister.store().is_persistent(),
            "entities": total,
            "kinds": kinds,
            "described_types": persister.registry().len(),
        }));
        return Ok(());
    }

    println!("Mage Store Status");
    println!("=================");
    println!("Database: {:?}", settings.database);
    println!("Backend:  {}", settings.backend.as_str());
    println!();
    println!("Entities: {}", total);
    for (kind, n) in &counts {
        println!("  {:<12} {}", kind, n);
    }

    Ok(())
}

// =============================================================================
// DECODE-KEY COMMAND
// =============================================================================

/// Decode an encoded key.
pub fn cmd_decode_key(settings: &Settings, encoded: &str) -> Result<(), MageError> {
    let key = Key::decode(encoded)?;

    if settings.json_mode {
        print_json(&serde_json::json!({
            "key": encoded,
            "kind": key.kind(),
            "id": key.id(),
        }));
        return Ok(());
    }

    println!("Kind: {}", key.kind());
    println!("Id:   {}", key.id());
    Ok(())
}
