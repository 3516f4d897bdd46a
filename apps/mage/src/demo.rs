//! # Demo Model
//!
//! The record types the CLI manages: a `Person` owning a home `Address`.

use mage_core::{FieldDef, MageError, Modelable, Record, Structure, Value};
use serde::Serialize;

static ADDRESS: Structure = Structure::new(
    "Address",
    &[FieldDef::value("street", ""), FieldDef::value("city", "noindex")],
);

#[derive(Debug, Default, Serialize)]
pub struct Address {
    #[serde(skip)]
    pub record: Record,
    pub id: Option<i64>,
    pub street: String,
    pub city: String,
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

static PERSON: Structure = Structure::new(
    "Person",
    &[
        FieldDef::value("name", "search"),
        FieldDef::value("email", ""),
        FieldDef::value("age", ""),
        FieldDef::reference("home", ""),
        FieldDef::value("token", "skip"),
    ],
);

const HOME: usize = 3;

#[derive(Debug, Default, Serialize)]
pub struct Person {
    #[serde(skip)]
    pub record: Record,
    pub id: Option<i64>,
    pub key: Option<String>,
    pub name: String,
    pub email: String,
    pub age: i64,
    pub home: Address,
    /// Session-only value; never stored.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Person {
    /// Copy the record ids into the serializable `id`/`key` fields.
    pub fn sync_ids(&mut self) {
        self.id = self.record.id();
        self.key = self.record.encoded_key();
        self.home.id = self.home.record.id();
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
            4 => self.token.clone().map(Value::from),
            _ => None,
        }
    }
    fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError> {
        match index {
            0 => self.name = value.into_text("name")?,
            1 => self.email = value.into_text("email")?,
            2 => self.age = value.into_int("age")?,
            4 => self.token = Some(value.into_text("token")?),
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
