//! Device-local store of known missions, keyed by mission id

use super::MissionConfiguration;
use crate::errors::ConfigurationError;
use serde_json::Value;
use tracing::warn;

/// Ordered collection of missions with unique ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionDatabase {
    missions: Vec<MissionConfiguration>,
}

impl MissionDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a database document (a JSON array of missions)
    ///
    /// Entries that fail to decode are skipped with a warning, as are later
    /// entries repeating an id already loaded.
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ConfigurationError::Database {
            reason: e.to_string(),
        })?;
        let entries = value.as_array().ok_or_else(|| ConfigurationError::Database {
            reason: "mission database is not a JSON array".to_string(),
        })?;

        let mut database = MissionDatabase::new();
        for (index, entry) in entries.iter().enumerate() {
            match MissionConfiguration::from_json_value(entry) {
                Ok(mission) if database.get(&mission.id).is_some() => {
                    warn!(index, mission_id = %mission.id, "Skipping duplicate mission in database");
                }
                Ok(mission) => database.missions.push(mission),
                Err(e) => warn!(index, error = %e, "Skipping unreadable mission in database"),
            }
        }
        Ok(database)
    }

    pub fn to_json(&self) -> String {
        Value::Array(
            self.missions
                .iter()
                .map(MissionConfiguration::to_json_value)
                .collect(),
        )
        .to_string()
    }

    /// Insert or replace by mission id; returns the replaced mission
    pub fn upsert(&mut self, mission: MissionConfiguration) -> Option<MissionConfiguration> {
        match self.missions.iter_mut().find(|m| m.id == mission.id) {
            Some(slot) => Some(std::mem::replace(slot, mission)),
            None => {
                self.missions.push(mission);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&MissionConfiguration> {
        self.missions.iter().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<MissionConfiguration> {
        let index = self.missions.iter().position(|m| m.id == id)?;
        Some(self.missions.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MissionConfiguration> {
        self.missions.iter()
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_array_document() {
        assert!(matches!(
            MissionDatabase::from_json(r#"{"id": "{m}"}"#),
            Err(ConfigurationError::Database { .. })
        ));
        assert!(MissionDatabase::from_json("nope").is_err());
    }

    #[test]
    fn test_upsert_by_id() {
        let mut db = MissionDatabase::new();
        let mut mission = MissionConfiguration::new("{m1}", "first");
        assert!(db.upsert(mission.clone()).is_none());

        mission.name = "renamed".to_string();
        let replaced = db.upsert(mission).unwrap();
        assert_eq!(replaced.name, "first");
        assert_eq!(db.len(), 1);
        assert_eq!(db.get("{m1}").unwrap().name, "renamed");

        db.upsert(MissionConfiguration::new("{m2}", "second"));
        assert_eq!(db.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["{m1}", "{m2}"]);
        assert!(db.remove("{m1}").is_some());
        assert!(db.remove("{m1}").is_none());
    }

    #[test]
    fn test_skips_unreadable_entries() {
        let text = r#"[{"id": "{good}"}, {"name": "no id"}, 5, {"id": "{good}", "name": "dup"}]"#;
        let db = MissionDatabase::from_json(text).unwrap();
        assert_eq!(db.len(), 1);
        assert!(db.get("{good}").unwrap().name.is_empty());
    }

    #[test]
    fn test_document_round_trip() {
        let mut db = MissionDatabase::new();
        db.upsert(MissionConfiguration::sample("one"));
        db.upsert(MissionConfiguration::sample("two"));
        let again = MissionDatabase::from_json(&db.to_json()).unwrap();
        assert_eq!(again.len(), 2);
        for (a, b) in db.iter().zip(again.iter()) {
            assert!(a.same_definition(b));
        }
    }
}
