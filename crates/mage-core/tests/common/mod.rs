//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use mage_core::{
    Cache, Datastore, Entity, FieldDef, Key, MageError, MemoryCache, MemoryStore, Modelable,
    Persister, Record, Structure, TransactionOptions, Value,
};
use std::cell::Cell;

// =============================================================================
// ADDRESS
// =============================================================================

pub static ADDRESS: Structure = Structure::new(
    "Address",
    &[FieldDef::value("street", ""), FieldDef::value("city", "noindex")],
);

#[derive(Debug, Default)]
pub struct Address {
    pub record: Record,
    pub street: String,
    pub city: String,
}

impl Address {
    pub fn new(street: &str, city: &str) -> Self {
        Self {
            street: street.to_string(),
            city: city.to_string(),
            ..Self::default()
        }
    }
}

impl Modelable for Address {
    fn structure(&self) -> &'static Structure {
        &ADDRESS
    }
    fn record(&self) -> &Record {
        &self.record
    }
    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
    fn save_field(&self, index: usize) -> Option<Value> {
        match index {
            0 => Some(self.street.clone().into()),
            1 => Some(self.city.clone().into()),
            _ => None,
        }
    }
    fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError> {
        match index {
            0 => self.street = value.into_text("street")?,
            1 => self.city = value.into_text("city")?,
            _ => {}
        }
        Ok(())
    }
}

// =============================================================================
// PERSON
// =============================================================================

pub static PERSON: Structure = Structure::new(
    "Person",
    &[
        FieldDef::value("name", "search"),
        FieldDef::value("email", ""),
        FieldDef::value("age", ""),
        FieldDef::reference("home", ""),
        FieldDef::value("token", "skip"),
        FieldDef::value("bio", "noindex,future"),
    ],
);

pub const HOME: usize = 3;

#[derive(Debug, Default)]
pub struct Person {
    pub record: Record,
    pub name: String,
    pub email: String,
    pub age: i64,
    pub home: Address,
    pub token: String,
    pub bio: String,
}

impl Person {
    pub fn sample() -> Self {
        Self {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            age: 36,
            home: Address::new("12 Analytical Row", "London"),
            token: "secret".to_string(),
            bio: "Wrote the first program.".to_string(),
            ..Self::default()
        }
    }
}

impl Modelable for Person {
    fn structure(&self) -> &'static Structure {
        &PERSON
    }
    fn record(&self) -> &Record {
        &self.record
    }
    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
    fn save_field(&self, index: usize) -> Option<Value> {
        match index {
            0 => Some(self.name.clone().into()),
            1 => Some(self.email.clone().into()),
            2 => Some(self.age.into()),
            4 => Some(self.token.clone().into()),
            5 => Some(self.bio.clone().into()),
            _ => None,
        }
    }
    fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError> {
        match index {
            0 => self.name = value.into_text("name")?,
            1 => self.email = value.into_text("email")?,
            2 => self.age = value.into_int("age")?,
            4 => self.token = value.into_text("token")?,
            5 => self.bio = value.into_text("bio")?,
            _ => {}
        }
        Ok(())
    }
    fn reference(&self, index: usize) -> Option<&dyn Modelable> {
        (index == HOME).then_some(&self.home as &dyn Modelable)
    }
    fn reference_mut(&mut self, index: usize) -> Option<&mut dyn Modelable> {
        (index == HOME).then_some(&mut self.home as &mut dyn Modelable)
    }
}

// =============================================================================
// CACHES
// =============================================================================

/// A cache whose every call fails.
#[derive(Debug, Default)]
pub struct BrokenCache {
    pub calls: Cell<usize>,
}

impl Cache for BrokenCache {
    fn get(&self, _key: &str) -> Result<Vec<u8>, MageError> {
        self.calls.set(self.calls.get() + 1);
        Err(MageError::CacheError("cache unreachable".to_string()))
    }

    fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), MageError> {
        self.calls.set(self.calls.get() + 1);
        Err(MageError::CacheError("cache unreachable".to_string()))
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub fn memory_persister() -> Persister<MemoryStore, MemoryCache> {
    Persister::new(MemoryStore::new(), MemoryCache::new())
}

/// Write `entity` straight to the store, bypassing the persister.
pub fn seed<S: Datastore>(store: &S, key: &Key, entity: &Entity) {
    store
        .run_in_transaction(TransactionOptions::cross_group(), &mut |txn| {
            txn.put(key, entity).map(|_| ())
        })
        .expect("seed store");
}

pub fn registered_person<S: Datastore, C: Cache>(persister: &Persister<S, C>) -> Person {
    let mut person = Person::sample();
    persister.register(&mut person).expect("register");
    person
}
