use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Deserializes a field that may be present with any JSON value, including `null`.
///
/// Missing fields fall back to `None` through `#[serde(default)]`, while a present `null` is
/// kept as `Some(Value::Null)`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One analytics session as delivered by the vendor, one per line of an export file.
///
/// Nested collections are typed; every other top-level attribute is kept verbatim in
/// [`SessionRecord::attributes`] in file order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, deserialize_with = "present")]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub user_attributes: Map<String, Value>,
    #[serde(default)]
    pub experiments: Vec<ExperimentRecord>,
    #[serde(default)]
    pub states: Vec<StateRecord>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl SessionRecord {
    /// Returns a scalar session attribute by its source name.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRecord {
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub variant_id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    #[serde(default, deserialize_with = "present")]
    pub state_id: Option<Value>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, deserialize_with = "present")]
    pub event_id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub time: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default)]
    pub info: Option<Value>,
    #[serde(default)]
    pub time_until_first_for_user: Option<Value>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}
