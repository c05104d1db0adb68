use std::{collections::BTreeMap, fmt};

use derive_new::new;
use serde::{Deserialize, Serialize};

pub mod attempt;
pub mod config;
pub mod datatable;
pub mod elementtext;
pub mod error;
pub mod form;
pub mod groups;
pub mod overview;
#[cfg(feature = "xdg")]
pub mod persist;
pub mod session;
pub mod submit;

pub use error::ParserError;
pub use session::{BbSession, Response, Session};

/// A downloadable file, as linked from an attempt page
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, new)]
pub struct FileLink {
	/// Name shown on the page
	pub filename: String,
	/// Absolute URL
	pub download_link: String,
}

/// Everything the grading page shows about one attempt
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct AttemptRecord {
	/// Inline submission text, as Markdown
	pub submission: Option<String>,
	/// Student comments, as Markdown
	pub comments: Option<String>,
	pub files: Vec<FileLink>,
	/// Current grade; `None` until one is entered
	pub score: Option<f64>,
	/// Feedback text currently stored on the attempt
	pub feedback: String,
	pub feedback_files: Vec<FileLink>,
}

/// A gradebook column that belongs to an assignment
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AssignmentRecord {
	pub id: String,
	pub name: String,
	/// Column source, `resource/x-bb-assignment` for assignments
	pub src: String,
	/// Remaining keys of the column definition, as sent by the server
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One student's cell in an assignment column
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StudentAssignment {
	/// Score exactly as the gradebook reports it (number, numeric string, or empty)
	pub score: serde_json::Value,
	pub needs_grading: bool,
	/// Not part of the gradebook snapshot; filled in once attempts are fetched
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub attempts: Option<Vec<AttemptRecord>>,
}

impl StudentAssignment {
	/// Numeric score, if the gradebook has one
	pub fn score_value(&self) -> Option<f64> {
		match &self.score {
			serde_json::Value::Number(n) => n.as_f64(),
			serde_json::Value::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StudentRecord {
	pub id: String,
	pub first_name: String,
	pub last_name: String,
	pub username: String,
	pub student_number: String,
	pub last_access: Option<String>,
	pub available: bool,
	/// Keyed by assignment id; only assignments the student has a cell for
	pub assignments: BTreeMap<String, StudentAssignment>,
}

impl StudentRecord {
	pub fn name(&self) -> String {
		format!("{} {}", self.first_name, self.last_name)
	}
}

/// A course group, as referenced from the roster
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, new)]
pub struct GroupRef {
	pub name: String,
	pub id: String,
}

/// A user's row in the group inventory
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GroupMembership {
	pub username: String,
	pub first_name: String,
	pub last_name: String,
	pub role: String,
	pub groups: Vec<GroupRef>,
}

impl fmt::Display for AttemptRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.score {
			Some(score) => writeln!(f, "Score: {score}")?,
			None => writeln!(f, "Score: (not graded)")?,
		}
		if let Some(submission) = &self.submission {
			writeln!(f, "\nSubmission:\n{submission}")?;
		}
		if let Some(comments) = &self.comments {
			writeln!(f, "\nComments:\n{comments}")?;
		}
		if !self.files.is_empty() {
			writeln!(f, "\nFiles:")?;
			for file in &self.files {
				writeln!(f, "  - {} <{}>", file.filename, file.download_link)?;
			}
		}
		if !self.feedback.is_empty() {
			writeln!(f, "\nFeedback:\n{}", self.feedback)?;
		}
		if !self.feedback_files.is_empty() {
			writeln!(f, "\nFeedback files:")?;
			for file in &self.feedback_files {
				writeln!(f, "  - {} <{}>", file.filename, file.download_link)?;
			}
		}
		Ok(())
	}
}
