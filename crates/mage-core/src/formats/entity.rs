//! # Entity Format
//!
//! Flattens a registered modelable into the store's `Entity` and back.
//!
//! Layout:
//! - one property per non-skip `Value` field
//! - one `ref_<field>` property holding `Value::Key` per registered,
//!   keyed reference
//!
//! Skip fields are never written and never touched on load.

use crate::primitives::REF_PREFIX;
use crate::record::Modelable;
use crate::schema::{Descriptor, FieldKind};
use crate::{Entity, MageError, Property, Value};
use std::sync::Arc;

/// Name of the property that stores the key of reference `field`.
#[must_use]
pub fn reference_property(field: &str) -> String {
    format!("{}{}", REF_PREFIX, field)
}

/// Descriptor of a registered modelable.
pub(crate) fn descriptor_of(modelable: &dyn Modelable) -> Result<Arc<Descriptor>, MageError> {
    let record = modelable.record();
    match record.descriptor() {
        Some(descriptor) if record.is_registered() => Ok(Arc::clone(descriptor)),
        _ => Err(MageError::InvalidState(format!(
            "{} is not registered",
            modelable.structure().name
        ))),
    }
}

/// Build the entity for a registered modelable.
pub fn to_entity(modelable: &dyn Modelable) -> Result<Entity, MageError> {
    let descriptor = descriptor_of(modelable)?;
    let references = modelable.record().references();
    let mut properties = Vec::with_capacity(descriptor.fields().len());

    for (index, field) in descriptor.fields().iter().enumerate() {
        let directive = field.directive();
        if directive.is_skip() {
            continue;
        }

        match field.kind() {
            FieldKind::Value => {
                if let Some(value) = modelable.save_field(index) {
                    properties.push(Property::new(field.name(), value, directive.is_indexed()));
                }
            }
            FieldKind::Reference => {
                if !references.contains(index) {
                    continue;
                }
                let Some(reference) = modelable.reference(index) else {
                    continue;
                };
                let record = reference.record();
                if !record.is_registered() {
                    continue;
                }
                if let Some(key) = record.key() {
                    properties.push(Property::new(
                        reference_property(field.name()),
                        Value::Key(key.clone()),
                        directive.is_indexed(),
                    ));
                }
            }
        }
    }

    Ok(Entity::new(descriptor.name(), properties))
}

/// Populate a registered modelable from a stored entity.
///
/// `ref_` properties restore the keys of registered references so they can
/// be read in turn. Unknown properties are ignored.
pub fn load_entity(modelable: &mut dyn Modelable, entity: Entity) -> Result<(), MageError> {
    let descriptor = descriptor_of(modelable)?;
    let references = modelable.record().references().clone();

    for property in entity.into_properties() {
        if let Some(index) = reference_index(&descriptor, &property.name) {
            if !references.contains(index) {
                continue;
            }
            let key = property.value.into_key(&property.name)?;
            if let Some(reference) = modelable.reference_mut(index)
                && reference.record().is_registered()
            {
                reference.record_mut().set_key(Some(key));
            }
            continue;
        }

        let Some(index) = descriptor.position(&property.name) else {
            tracing::trace!(
                structure = descriptor.name(),
                property = %property.name,
                "ignoring unknown property"
            );
            continue;
        };
        let Some(field) = descriptor.field(index) else {
            continue;
        };
        if field.directive().is_skip() || field.kind() != FieldKind::Value {
            continue;
        }
        modelable.load_field(index, property.value)?;
    }

    Ok(())
}

/// Index of the reference field a `ref_` property belongs to.
fn reference_index(descriptor: &Descriptor, property: &str) -> Option<usize> {
    let field = property.strip_prefix(REF_PREFIX)?;
    let index = descriptor.position(field)?;
    descriptor
        .field(index)
        .filter(|f| f.kind() == FieldKind::Reference && !f.directive().is_skip())
        .map(|_| index)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::registrar::Registrar;
    use crate::schema::{FieldDef, Structure, StructureRegistry};
    use crate::Key;

    static TAG: Structure = Structure::new("Tag", &[FieldDef::value("label", "")]);

    #[derive(Default)]
    struct Tag {
        record: Record,
        label: String,
    }

    impl Modelable for Tag {
        fn structure(&self) -> &'static Structure {
            &TAG
        }
        fn record(&self) -> &Record {
            &self.record
        }
        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }
        fn save_field(&self, index: usize) -> Option<Value> {
            (index == 0).then(|| self.label.clone().into())
        }
        fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError> {
            if index == 0 {
                self.label = value.into_text("label")?;
            }
            Ok(())
        }
    }

    static POST: Structure = Structure::new(
        "Post",
        &[
            FieldDef::value("title", ""),
            FieldDef::value("draft", "skip"),
            FieldDef::value("body", "noindex"),
            FieldDef::reference("tag", ""),
            FieldDef::value("views", ""),
        ],
    );

    #[derive(Default)]
    struct Post {
        record: Record,
        title: String,
        draft: String,
        body: String,
        tag: Tag,
        views: Option<i64>,
    }

    impl Modelable for Post {
        fn structure(&self) -> &'static Structure {
            &POST
        }
        fn record(&self) -> &Record {
            &self.record
        }
        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }
        fn save_field(&self, index: usize) -> Option<Value> {
            match index {
                0 => Some(self.title.clone().into()),
                1 => Some(self.draft.clone().into()),
                2 => Some(self.body.clone().into()),
                4 => self.views.map(Value::Int),
                _ => None,
            }
        }
        fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError> {
            match index {
                0 => self.title = value.into_text("title")?,
                1 => self.draft = value.into_text("draft")?,
                2 => self.body = value.into_text("body")?,
                4 => self.views = Some(value.into_int("views")?),
                _ => {}
            }
            Ok(())
        }
        fn reference(&self, index: usize) -> Option<&dyn Modelable> {
            (index == 3).then_some(&self.tag as &dyn Modelable)
        }
        fn reference_mut(&mut self, index: usize) -> Option<&mut dyn Modelable> {
            (index == 3).then_some(&mut self.tag as &mut dyn Modelable)
        }
    }

    fn registered_post() -> Post {
        let registry = StructureRegistry::new();
        let mut post = Post {
            title: "Hello".to_string(),
            draft: "secret".to_string(),
            body: "long text".to_string(),
            ..Post::default()
        };
        Registrar::new(&registry)
            .register(&mut post)
            .expect("register");
        post
    }

    #[test]
    fn unregistered_is_invalid_state() {
        let post = Post::default();
        assert!(matches!(
            to_entity(&post),
            Err(MageError::InvalidState(_))
        ));
    }

    #[test]
    fn skip_fields_are_not_written() {
        let post = registered_post();
        let entity = to_entity(&post).expect("entity");
        assert_eq!(entity.kind(), "Post");
        assert!(entity.property("draft").is_none());
        assert_eq!(
            entity.property("title").map(|p| &p.value),
            Some(&Value::from("Hello"))
        );
        assert!(!entity.property("body").expect("body").indexed);
        // no key on the tag yet, and views is None
        assert!(entity.property("ref_tag").is_none());
        assert!(entity.property("views").is_none());
    }

    #[test]
    fn keyed_reference_is_written_as_key() {
        let mut post = registered_post();
        post.tag.record_mut().set_key(Some(Key::new("Tag", 11)));
        let entity = to_entity(&post).expect("entity");
        assert_eq!(
            entity.property("ref_tag").map(|p| &p.value),
            Some(&Value::Key(Key::new("Tag", 11)))
        );
    }

    #[test]
    fn unregistered_reference_is_not_written() {
        let mut post = registered_post();
        post.tag = Tag::default();
        post.tag.record_mut().set_key(Some(Key::new("Tag", 11)));
        let entity = to_entity(&post).expect("entity");
        assert!(entity.property("ref_tag").is_none());
    }

    #[test]
    fn load_restores_values_and_reference_key() {
        let mut source = registered_post();
        source.tag.record_mut().set_key(Some(Key::new("Tag", 2)));
        source.views = Some(10);
        let entity = to_entity(&source).expect("entity");

        let mut target = registered_post();
        target.title.clear();
        target.draft = "local".to_string();
        load_entity(&mut target, entity).expect("load");

        assert_eq!(target.title, "Hello");
        assert_eq!(target.body, "long text");
        assert_eq!(target.views, Some(10));
        assert_eq!(target.draft, "local");
        assert_eq!(target.tag.record().id(), Some(2));
    }

    #[test]
    fn load_ignores_skip_and_unknown_properties() {
        let mut post = registered_post();
        let entity = Entity::new(
            "Post",
            vec![
                Property::new("draft", Value::from("overwritten"), true),
                Property::new("legacy_column", Value::Int(1), true),
            ],
        );
        load_entity(&mut post, entity).expect("load");
        assert_eq!(post.draft, "secret");
    }

    #[test]
    fn load_type_mismatch_fails() {
        let mut post = registered_post();
        let entity = Entity::new(
            "Post",
            vec![Property::new("title", Value::Int(3), true)],
        );
        assert!(matches!(
            load_entity(&mut post, entity),
            Err(MageError::FieldType { .. })
        ));
    }
}
