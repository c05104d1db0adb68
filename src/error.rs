//! Contract failures: the scraped markup no longer matches what the parsers expect.

use std::fmt;

use derive_new::new;
use thiserror::Error;

use crate::session::{FileUpload, Response};

/// Raised whenever a page or JSON document violates the structure the scrapers rely on.
///
/// Always carries the offending response; grade submissions additionally attach the exact outgoing payload, so a failed
/// POST can be replayed or fixed up by hand.
#[derive(Debug, Error)]
pub struct ParserError {
	pub message: String,
	pub response: Response,
	pub payload: Option<Payload>,
}

impl ParserError {
	pub fn new(message: impl Into<String>, response: Response) -> Self {
		Self {
			message: message.into(),
			response,
			payload: None,
		}
	}

	pub fn with_payload(mut self, payload: Payload) -> Self {
		self.payload = Some(payload);
		self
	}
}

impl fmt::Display for ParserError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (at {})", self.message, self.response.url)?;
		if let Some(payload) = &self.payload {
			write!(f, "\n{payload}")?;
		}
		Ok(())
	}
}

/// Shape of a multipart POST: ordered form fields plus the file parts that went with them.
#[derive(Clone, Debug, Default, PartialEq, new)]
pub struct Payload {
	pub fields: Vec<(String, String)>,
	pub files: Vec<StagedFile>,
}

/// File part of a [Payload], without its contents
#[derive(Clone, Debug, PartialEq, new)]
pub struct StagedFile {
	pub field: String,
	pub filename: String,
	pub size: usize,
}

impl From<&FileUpload> for StagedFile {
	fn from(upload: &FileUpload) -> Self {
		Self::new(upload.field.clone(), upload.filename.clone(), upload.bytes.len())
	}
}

impl fmt::Display for Payload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Post data:")?;
		for (name, value) in &self.fields {
			writeln!(f, "  {name:?}: {value:?}")?;
		}
		write!(f, "Files:")?;
		for file in &self.files {
			write!(f, "\n  {:?}: {:?} ({} bytes)", file.field, file.filename, file.size)?;
		}
		Ok(())
	}
}
