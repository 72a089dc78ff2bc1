use serde_json::Value;

/// Value of a single column of a derived row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Null,
    Integer(i64),
    Bool(bool),
    Text(&'a str),
    /// A value copied verbatim from the session record.
    Json(&'a Value),
}

impl<'a> From<&'a Value> for Cell<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::String(text) => Cell::Text(text),
            Value::Bool(value) => Cell::Bool(*value),
            value => Cell::Json(value),
        }
    }
}

impl<'a> From<Option<&'a Value>> for Cell<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        value.map_or(Cell::Null, Cell::from)
    }
}

/// A derived row that answers the value of a named column.
///
/// Column order comes from the schema registry, so rows only need lookup by name. `None`
/// means the row does not carry the column at all.
pub trait Row {
    fn cell(&self, column: &str) -> Option<Cell<'_>>;
}

/// One user attribute of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAttributeRow {
    pub session_id: i64,
    pub name: String,
    pub value: Value,
}

impl Row for UserAttributeRow {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "sessionId" => Some(Cell::Integer(self.session_id)),
            "name" => Some(Cell::Text(&self.name)),
            "value" => Some(Cell::from(&self.value)),
            _ => None,
        }
    }
}

/// Membership of a session in an experiment variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRow {
    pub session_id: i64,
    pub experiment_id: Value,
    pub variant_id: Value,
}

impl Row for ExperimentRow {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "sessionId" => Some(Cell::Integer(self.session_id)),
            "experimentId" => Some(Cell::from(&self.experiment_id)),
            "variantId" => Some(Cell::from(&self.variant_id)),
            _ => None,
        }
    }
}

/// One event fired during a state of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub session_id: i64,
    pub state_id: Value,
    pub event_id: Value,
    pub event_name: Value,
    pub start: Value,
    pub value: Value,
    pub info: Option<Value>,
    pub time_until_first_for_user: Option<Value>,
}

impl Row for EventRow {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "sessionId" => Some(Cell::Integer(self.session_id)),
            "stateId" => Some(Cell::from(&self.state_id)),
            "eventId" => Some(Cell::from(&self.event_id)),
            "eventName" => Some(Cell::from(&self.event_name)),
            "start" => Some(Cell::from(&self.start)),
            "value" => Some(Cell::from(&self.value)),
            "info" => Some(Cell::from(self.info.as_ref())),
            "timeUntilFirstForUser" => Some(Cell::from(self.time_until_first_for_user.as_ref())),
            _ => None,
        }
    }
}

/// One parameter of an event, keyed by the event rather than the session.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParameterRow {
    pub event_id: Value,
    pub name: String,
    pub value: Value,
}

impl Row for EventParameterRow {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "eventId" => Some(Cell::from(&self.event_id)),
            "name" => Some(Cell::Text(&self.name)),
            "value" => Some(Cell::from(&self.value)),
            _ => None,
        }
    }
}

/// Scalar attributes of a session, keyed by destination column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionRow {
    pub session_id: i64,
    pub fields: Vec<(String, Value)>,
}

impl SessionRow {
    /// Returns the value stored for a destination column.
    pub fn field(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

impl Row for SessionRow {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        match column {
            "sessionId" => Some(Cell::Integer(self.session_id)),
            column => self.field(column).map(Cell::from),
        }
    }
}

/// Row of the state table.
///
/// The vendor format carries no state payload worth keeping, so no state row can exist.
/// The destination still reserves a table for it.
#[derive(Debug, Clone, PartialEq)]
pub enum StateRow {}

impl Row for StateRow {
    fn cell(&self, _column: &str) -> Option<Cell<'_>> {
        match *self {}
    }
}

/// Every row derived from a single session record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecomposedSession {
    pub user_attributes: Vec<UserAttributeRow>,
    pub experiments: Vec<ExperimentRow>,
    pub events: Vec<EventRow>,
    pub event_parameters: Vec<EventParameterRow>,
    pub sessions: Vec<SessionRow>,
    pub states: Vec<StateRow>,
}
