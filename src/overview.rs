//! Gradebook snapshot: assignment columns and every student's cells in them.

use std::collections::BTreeMap;

use color_eyre::Result;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{AssignmentRecord, StudentAssignment, StudentRecord, error::ParserError, session::Session};

const ASSIGNMENT_SOURCE: &str = "resource/x-bb-assignment";

#[derive(Debug, Deserialize)]
struct Snapshot {
	#[serde(rename = "colDefs")]
	col_defs: Vec<Map<String, Value>>,
	rows: Vec<Vec<Map<String, Value>>>,
}

/// Fetch the instructor gradebook JSON and split it into assignments and students, both keyed by id.
pub async fn read_overview<S: Session>(session: &S) -> Result<(BTreeMap<String, AssignmentRecord>, BTreeMap<String, StudentRecord>)> {
	let url = session.url(&format!("/webapps/gradebook/do/instructor/getJSONData?course_id={}", session.course_id()));
	let response = session.get(&url).await?;
	let snapshot: Snapshot = response.json()?;
	let fail = |message: String| -> color_eyre::Report { ParserError::new(message, response.clone()).into() };

	let mut assignments = BTreeMap::new();
	for mut column in snapshot.col_defs {
		if column.get("src").and_then(Value::as_str) != Some(ASSIGNMENT_SOURCE) {
			continue;
		}
		let id = column.remove("id").as_ref().and_then(text).ok_or_else(|| fail("Assignment column without an id".to_owned()))?;
		let name = column.remove("name").or_else(|| column.remove("nm")).as_ref().and_then(text).unwrap_or_default();
		let src = column.remove("src").as_ref().and_then(text).unwrap_or_default();
		assignments.insert(id.clone(), AssignmentRecord { id, name, src, extra: column });
	}

	let mut students = BTreeMap::new();
	for (i, row) in snapshot.rows.iter().enumerate() {
		let head = row.first().ok_or_else(|| fail(format!("Gradebook row {i} is empty")))?;
		let id = head.get("uid").and_then(text).ok_or_else(|| fail(format!("Gradebook row {i} has no uid")))?;
		let available = head.get("avail").is_some_and(truthy);

		let cells: BTreeMap<String, &Map<String, Value>> = row.iter().filter_map(|cell| Some((text(cell.get("c")?)?, cell))).collect();
		let field = |key: &str| cells.get(key).and_then(|cell| cell.get("v")).and_then(text);
		let required = |key: &str| field(key).ok_or_else(|| fail(format!("Gradebook row {i} (user {id}) has no {key} cell")));

		let assignments_of_student = assignments
			.keys()
			.filter_map(|a| {
				let cell = cells.get(a)?;
				Some((a.clone(), StudentAssignment {
					score: cell.get("v").cloned().unwrap_or(Value::Null),
					needs_grading: cell.get("ng").is_some_and(truthy),
					attempts: None,
				}))
			})
			.collect();

		let student = StudentRecord {
			first_name: required("FN")?,
			last_name: required("LN")?,
			username: required("UN")?,
			student_number: required("SI")?,
			last_access: field("LA"),
			id: id.clone(),
			available,
			assignments: assignments_of_student,
		};
		students.insert(id, student);
	}

	tracing::debug!(assignments = assignments.len(), students = students.len(), "read gradebook overview");
	Ok((assignments, students))
}

/// Ids and names come as strings or bare numbers depending on the column.
fn text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(a) => !a.is_empty(),
		Value::Object(o) => !o.is_empty(),
	}
}
