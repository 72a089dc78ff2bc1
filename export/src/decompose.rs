//! Pure extraction of flat rows from one session record.

use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::types::{
    DecomposedSession, EventParameterRow, EventRow, ExperimentRow, SessionRecord, SessionRow,
    StateRow, UserAttributeRow,
};

/// Destination column names whose value is read from a differently named source field.
const SESSION_FIELD_RENAMES: [(&str, &str); 5] = [
    ("timezoneOffset", "timezoneOffsetSeconds"),
    ("osName", "systemName"),
    ("osVersion", "systemVersion"),
    ("userStart", "firstRun"),
    ("start", "time"),
];

/// Session columns that are never emitted, whatever the schema declares.
const SESSION_DROPPED_FIELDS: [&str; 2] = ["lat", "lon"];

const SESSION_ID_COLUMN: &str = "sessionId";

const IS_DEVELOPER_COLUMN: &str = "isDeveloper";

/// Coerces a JSON value holding an integer or a numeric string into an `i64`.
pub fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Returns the integer session identifier of a record.
///
/// A missing identifier, or one that is not an integer, is a hard error for the record.
pub fn session_id(record: &SessionRecord) -> ExportResult<i64> {
    let Some(value) = &record.session_id else {
        bail!(ErrorKind::InvalidData, "Session record has no session id");
    };

    match coerce_integer(value) {
        Some(session_id) => Ok(session_id),
        None => bail!(
            ErrorKind::InvalidData,
            "Session id is not an integer",
            value
        ),
    }
}

/// Returns a required field or fails with [`ErrorKind::InvalidData`].
fn required(value: &Option<Value>, field: &'static str, session_id: i64) -> ExportResult<Value> {
    match value {
        Some(value) => Ok(value.clone()),
        None => bail!(
            ErrorKind::InvalidData,
            "Session record is missing a required field",
            format!("field `{field}` in session {session_id}")
        ),
    }
}

/// One row per user attribute, in file order.
pub fn extract_user_attributes(record: &SessionRecord) -> ExportResult<Vec<UserAttributeRow>> {
    if record.user_attributes.is_empty() {
        return Ok(Vec::new());
    }

    let session_id = session_id(record)?;

    Ok(record
        .user_attributes
        .iter()
        .map(|(name, value)| UserAttributeRow {
            session_id,
            name: name.clone(),
            value: value.clone(),
        })
        .collect())
}

/// Always empty: the vendor format has no state payload worth keeping.
pub fn extract_states(_record: &SessionRecord) -> Vec<StateRow> {
    Vec::new()
}

/// One row per experiment the session took part in, in list order.
pub fn extract_experiments(record: &SessionRecord) -> ExportResult<Vec<ExperimentRow>> {
    if record.experiments.is_empty() {
        return Ok(Vec::new());
    }

    let session_id = session_id(record)?;

    record
        .experiments
        .iter()
        .map(|experiment| {
            Ok(ExperimentRow {
                session_id,
                experiment_id: required(&experiment.id, "id", session_id)?,
                variant_id: required(&experiment.variant_id, "variantId", session_id)?,
            })
        })
        .collect()
}

/// One row per event across all states, plus one row per event parameter.
///
/// States are walked in list order, then their events in list order. Parameters follow file
/// order and are keyed by the event id.
pub fn extract_events(
    record: &SessionRecord,
) -> ExportResult<(Vec<EventRow>, Vec<EventParameterRow>)> {
    let mut events = Vec::new();
    let mut event_parameters = Vec::new();

    if record.states.iter().all(|state| state.events.is_empty()) {
        return Ok((events, event_parameters));
    }

    let session_id = session_id(record)?;

    for state in &record.states {
        for event in &state.events {
            let event_id = required(&event.event_id, "eventId", session_id)?;

            events.push(EventRow {
                session_id,
                state_id: required(&state.state_id, "stateId", session_id)?,
                event_id: event_id.clone(),
                event_name: required(&event.name, "name", session_id)?,
                start: required(&event.time, "time", session_id)?,
                value: required(&event.value, "value", session_id)?,
                info: event.info.clone(),
                time_until_first_for_user: event.time_until_first_for_user.clone(),
            });

            event_parameters.extend(event.parameters.iter().map(|(name, value)| {
                EventParameterRow {
                    event_id: event_id.clone(),
                    name: name.clone(),
                    value: value.clone(),
                }
            }));
        }
    }

    Ok((events, event_parameters))
}

/// Selects and renames the scalar session attributes declared in `session_columns`.
///
/// Missing attributes become `null`, except `isDeveloper` which defaults to `false`.
/// `lat` and `lon` are never emitted.
pub fn extract_session<S: AsRef<str>>(
    record: &SessionRecord,
    session_columns: &[S],
) -> ExportResult<SessionRow> {
    let session_id = session_id(record)?;

    let mut fields = Vec::with_capacity(session_columns.len());
    for column in session_columns {
        let column = column.as_ref();
        if column == SESSION_ID_COLUMN || SESSION_DROPPED_FIELDS.contains(&column) {
            continue;
        }

        let source_name = SESSION_FIELD_RENAMES
            .iter()
            .find(|(destination, _)| *destination == column)
            .map_or(column, |(_, source)| *source);

        let value = match record.attribute(source_name) {
            Some(value) => value.clone(),
            None if column == IS_DEVELOPER_COLUMN => Value::Bool(false),
            None => Value::Null,
        };
        fields.push((column.to_string(), value));
    }

    if !fields.iter().any(|(name, _)| name == IS_DEVELOPER_COLUMN) {
        let is_developer = record
            .attribute(IS_DEVELOPER_COLUMN)
            .cloned()
            .unwrap_or(Value::Bool(false));
        fields.push((IS_DEVELOPER_COLUMN.to_string(), is_developer));
    }

    Ok(SessionRow { session_id, fields })
}

/// Runs all six extractions over one record.
pub fn decompose<S: AsRef<str>>(
    record: &SessionRecord,
    session_columns: &[S],
) -> ExportResult<DecomposedSession> {
    let session = extract_session(record, session_columns)?;
    let (events, event_parameters) = extract_events(record)?;

    Ok(DecomposedSession {
        user_attributes: extract_user_attributes(record)?,
        experiments: extract_experiments(record)?,
        events,
        event_parameters,
        sessions: vec![session],
        states: extract_states(record),
    })
}
