//! Pairing tokens.
//!
//! A pairing token carries everything a new device needs to join a school:
//! the registry, the time table, the metadata and the remote configuration.
//! It is the UTF-8 JSON of a [`PairingPayload`] encoded as standard base64, so
//! it travels as a single line through QR codes and copy/paste.

use crate::{
    error::Result, EntityProfile, Error, School, SchoolMetadata, ScheduleStore, Student, TimeSlot,
};
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};

/// Version tag written into every token.
pub const PAIRING_VERSION: &str = "v2";

/// Where the shared school document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Base URL of the realtime store
    pub url: String,
    pub school_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Bootstrap snapshot handed to a joining device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    pub v: String,
    pub school_name: String,
    pub academic_year: String,
    pub entities: Vec<EntityProfile>,
    pub students: Vec<Student>,
    pub time_slots: Vec<TimeSlot>,
    pub master_id: Option<String>,
    pub remote_config: Option<RemoteConfig>,
    pub primary_color: Option<String>,
}

/// Lenient shape used for decoding; only `schoolName` and `entities` are
/// required.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    v: Option<String>,
    school_name: Option<String>,
    #[serde(default)]
    academic_year: String,
    entities: Option<Vec<EntityProfile>>,
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    time_slots: Vec<TimeSlot>,
    #[serde(default)]
    master_id: Option<String>,
    #[serde(default)]
    remote_config: Option<RemoteConfig>,
    #[serde(default)]
    primary_color: Option<String>,
}

impl PairingPayload {
    /// Build a payload from the live school state.
    pub fn from_school(school: &School, remote_config: Option<RemoteConfig>) -> Self {
        Self {
            v: PAIRING_VERSION.to_string(),
            school_name: school.metadata.school_name.clone(),
            academic_year: school.metadata.academic_year.clone(),
            entities: school.store.entities().to_vec(),
            students: school.students.clone(),
            time_slots: school.time_slots.clone(),
            master_id: school.metadata.master_id.clone(),
            remote_config,
            primary_color: school.metadata.primary_color.clone(),
        }
    }

    /// Turn the payload into local school state.
    pub fn into_school(self) -> School {
        let mut school = School {
            metadata: SchoolMetadata {
                school_name: self.school_name,
                academic_year: self.academic_year,
                primary_color: self.primary_color,
                master_id: self.master_id,
            },
            store: ScheduleStore::from_entities(self.entities),
            students: self.students,
            ..School::default()
        };
        school.set_time_slots(self.time_slots);
        school
    }

    /// Encode as a single-line token. Identical payloads give identical
    /// tokens.
    pub fn encode(&self) -> Result<String> {
        let json =
            serde_json::to_string(self).map_err(|e| Error::InvalidToken(e.to_string()))?;
        Ok(general_purpose::STANDARD.encode(json.as_bytes()))
    }

    /// Decode a token, ignoring surrounding whitespace.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(token.trim())
            .map_err(|e| Error::InvalidToken(format!("not base64: {e}")))?;
        let json =
            String::from_utf8(bytes).map_err(|e| Error::InvalidToken(format!("not UTF-8: {e}")))?;
        let raw: RawPayload = serde_json::from_str(&json)
            .map_err(|e| Error::InvalidToken(format!("not a pairing payload: {e}")))?;

        if let Some(v) = raw.v.as_deref() {
            if v != PAIRING_VERSION {
                return Err(Error::InvalidToken(format!("unsupported version: {v}")));
            }
        }
        let school_name = raw
            .school_name
            .ok_or_else(|| Error::InvalidToken("missing schoolName".to_string()))?;
        let entities = raw
            .entities
            .ok_or_else(|| Error::InvalidToken("missing entities".to_string()))?;

        Ok(Self {
            v: PAIRING_VERSION.to_string(),
            school_name,
            academic_year: raw.academic_year,
            entities,
            students: raw.students,
            time_slots: raw.time_slots,
            master_id: raw.master_id,
            remote_config: raw.remote_config,
            primary_color: raw.primary_color,
        })
    }
}
