//! Twin identity resolution
//!
//! Entities from the source graph carry their own id plus a list of
//! identities. When one of those identities names an existing Willow twin,
//! that twin id is used so the sync updates it instead of creating a copy.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::vocabulary::TWIN_ID_URN_PREFIX;
use crate::value_objects::value_text;

/// How a source entity maps onto a twin
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TwinMapping {
    /// Id of the entity in the source graph
    pub mapped_id: String,
    /// Id of an existing Willow twin, when the entity carries one
    pub willow_id: Option<String>,
}

impl TwinMapping {
    /// Id of the twin the entity becomes
    pub fn twin_id(&self) -> &str {
        self.willow_id.as_deref().unwrap_or(&self.mapped_id)
    }
}

/// Resolve the twin mapping of a source element; `None` if it has no `id`
pub fn get_twin_id(element: &Value, willow_connector_id: &str) -> Option<TwinMapping> {
    let mapped_id = match element.get("id")? {
        Value::String(id) => id.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };

    let identities = element
        .get("identities")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let org_scoped = identities.iter().filter_map(|identity| {
        if identity.get("scope").and_then(Value::as_str) != Some("ORG") {
            return None;
        }
        let id = identity
            .get("value")
            .and_then(Value::as_str)?
            .strip_prefix(TWIN_ID_URN_PREFIX)?;
        Some((id, parse_date_created(identity)?))
    });

    let willow_id = latest(org_scoped).or_else(|| {
        let connector_scoped = identities.iter().filter_map(|identity| {
            if identity.get("scopeId").map(value_text).as_deref() != Some(willow_connector_id) {
                return None;
            }
            let id = identity.get("value").and_then(Value::as_str)?;
            if Uuid::parse_str(id).is_ok() {
                return None;
            }
            Some((id, parse_date_created(identity)?))
        });
        latest(connector_scoped)
    });

    Some(TwinMapping {
        mapped_id,
        willow_id,
    })
}

/// Id with the most recent creation date; the first one wins a tie
fn latest<'a>(candidates: impl Iterator<Item = (&'a str, DateTime<Utc>)>) -> Option<String> {
    candidates
        .fold(None::<(&str, DateTime<Utc>)>, |best, candidate| match best {
            Some(best) if best.1 >= candidate.1 => Some(best),
            _ => Some(candidate),
        })
        .map(|(id, _)| id.to_string())
}

fn parse_date_created(identity: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp(identity.get("dateCreated")?.as_str()?)
}

/// Parse an RFC 3339 timestamp, or a naive one taken as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Millisecond UTC form used in `mappedIds`
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
