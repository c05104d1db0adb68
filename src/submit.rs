//! Grade submission by replaying the attempt page's own form.

use std::{path::PathBuf, sync::LazyLock};

use color_eyre::{
	Result,
	eyre::{WrapErr, eyre},
};
use scraper::Selector;

use crate::{
	attempt::attempt_url,
	elementtext::{element_text_content, selector},
	error::{ParserError, Payload, StagedFile},
	form::{FormState, read_form},
	session::{FileUpload, Response, Session},
};

const FORM_ID: &str = "currentAttempt_form";
const SUBMIT_PATH: &str = "/webapps/assignment//gradeGroupAssignment/submit";

static BAD_MESSAGE: LazyLock<Selector> = LazyLock::new(|| selector("span#badMsg1"));
static GOOD_MESSAGE: LazyLock<Selector> = LazyLock::new(|| selector("span#goodMsg1"));

/// Set the grade and feedback of an attempt, attaching `attachments` as feedback files.
///
/// The form is always fetched anew: it carries single-use tokens tied to the GET that rendered it. On any failure the error
/// holds the exact payload that was (or would have been) posted.
pub async fn submit_grade<S: Session>(
	session: &S,
	attempt_id: &str,
	is_group_attempt: bool,
	grade: f64,
	feedback_text: &str,
	attachments: &[PathBuf],
) -> Result<()> {
	let page = session.get(&attempt_url(session, attempt_id, is_group_attempt)).await?;
	let mut form = read_form(&page.document(), FORM_ID).ok_or_else(|| ParserError::new(format!("No <form id={FORM_ID}>"), page.clone()))?;

	form.set("grade", grade.to_string());
	form.set("feedbacktext", feedback_text);

	let mut files = Vec::with_capacity(attachments.len().max(1));
	for (i, path) in attachments.iter().enumerate() {
		let base = path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.ok_or_else(|| eyre!("Attachment {} has no file name", path.display()))?;
		let bytes = tokio::fs::read(path).await.wrap_err_with(|| format!("Failed to read attachment {}", path.display()))?;
		stage_attachment(&mut form, &mut files, i, base, bytes);
	}
	if files.is_empty() {
		// The endpoint only accepts multipart/form-data, which needs at least one file part
		files.push(FileUpload::new("dummy".into(), "dummy".into(), Vec::new()));
	}

	let payload = Payload::new(form.pairs().to_vec(), files.iter().map(StagedFile::from).collect());
	let response = match session.post(&session.url(SUBMIT_PATH), form.pairs(), files).await {
		Ok(response) => response,
		Err(e) => {
			tracing::error!(%payload, "grade submission request failed");
			return Err(e.wrap_err(format!("Submitting grade for attempt {attempt_id} failed")));
		}
	};
	classify(response, payload)
}

/// Append one feedback-file metadata block, and the file part it refers to.
fn stage_attachment(form: &mut FormState, files: &mut Vec<FileUpload>, position: usize, base: String, bytes: Vec<u8>) {
	form.extend([
		("feedbackFiles_attachmentType", "L"),
		("feedbackFiles_fileId", "new"),
		("feedbackFiles_artifactFileId", "undefined"),
		("feedbackFiles_artifactType", "undefined"),
		("feedbackFiles_artifactTypeResourceKey", "undefined"),
		("feedbackFiles_linkTitle", base.as_str()),
	]);
	files.push(FileUpload::new(format!("feedbackFiles_LocalFile{position}"), base, bytes));
}

fn classify(response: Response, payload: Payload) -> Result<()> {
	let document = response.document();
	if let Some(bad) = document.select(&BAD_MESSAGE).next() {
		let message = format!("badMsg1: {}", element_text_content(bad));
		return Err(ParserError::new(message, response).with_payload(payload).into());
	}
	match document.select(&GOOD_MESSAGE).next() {
		Some(good) => {
			tracing::info!(url = %response.url, "goodMsg1: {}", element_text_content(good));
			Ok(())
		}
		None => Err(ParserError::new("No goodMsg1 in POST response", response).with_payload(payload).into()),
	}
}
