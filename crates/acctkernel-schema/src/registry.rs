//! Process-wide registry mapping `event_type` to a version-keyed map of
//! [`EventSchema`]. Populated once at startup from the compiled config
//! pack; read-only thereafter (§5: registries are startup-time state).

use std::collections::HashMap;

use thiserror::Error;

use crate::schema::EventSchema;

#[derive(Debug, Error)]
pub enum SchemaRegistryError {
    #[error("schema {event_type}:v{version} is already registered")]
    AlreadyRegistered { event_type: String, version: u32 },
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, HashMap<u32, EventSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: EventSchema) -> Result<(), SchemaRegistryError> {
        let versions = self.schemas.entry(schema.event_type.clone()).or_default();
        if versions.contains_key(&schema.version) {
            return Err(SchemaRegistryError::AlreadyRegistered {
                event_type: schema.event_type,
                version: schema.version,
            });
        }
        versions.insert(schema.version, schema);
        Ok(())
    }

    pub fn get(&self, event_type: &str, version: u32) -> Option<&EventSchema> {
        self.schemas.get(event_type)?.get(&version)
    }

    /// The highest registered version for an event type.
    pub fn latest(&self, event_type: &str) -> Option<&EventSchema> {
        let versions = self.schemas.get(event_type)?;
        let latest_key = versions.keys().max()?;
        versions.get(latest_key)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_version_is_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(EventSchema::new("ap.invoice_received", 1, vec![])).unwrap();
        let err = registry.register(EventSchema::new("ap.invoice_received", 1, vec![])).unwrap_err();
        assert!(matches!(err, SchemaRegistryError::AlreadyRegistered { .. }));
    }

    #[test]
    fn latest_picks_highest_version() {
        let mut registry = SchemaRegistry::new();
        registry.register(EventSchema::new("ap.invoice_received", 1, vec![])).unwrap();
        registry.register(EventSchema::new("ap.invoice_received", 2, vec![])).unwrap();
        assert_eq!(registry.latest("ap.invoice_received").unwrap().version, 2);
    }
}
