//! Attempt-detail pages: submission text, comments, files, current grade and feedback.

use std::{
	path::{Path, PathBuf},
	sync::LazyLock,
};

use color_eyre::{
	Result,
	eyre::{WrapErr, eyre},
};
use scraper::{ElementRef, Selector};

use crate::{
	AttemptRecord, FileLink,
	elementtext::{element_text_content, element_to_markdown, form_field_value, selector},
	error::ParserError,
	session::{Response, Session},
};

static SUBMISSION_TEXT: LazyLock<Selector> = LazyLock::new(|| selector("div#submissionTextView"));
static COMMENTS: LazyLock<Selector> = LazyLock::new(|| selector("div#currentAttempt_comments"));
static COMMENT: LazyLock<Selector> = LazyLock::new(|| selector("div.vtbegenerated"));
static SUBMISSION_LIST: LazyLock<Selector> = LazyLock::new(|| selector("ul#currentAttempt_submissionList"));
static DOWNLOAD_BUTTON: LazyLock<Selector> = LazyLock::new(|| selector("a.dwnldBtn"));
static INLINE_TEXT_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("a#currentAttempt_attemptFilesubmissionText"));
static GRADE: LazyLock<Selector> = LazyLock::new(|| selector("input#currentAttempt_grade"));
static FEEDBACK_TEXT: LazyLock<Selector> = LazyLock::new(|| selector("#feedbacktext"));
static FEEDBACK_FILES: LazyLock<Selector> = LazyLock::new(|| selector("tbody#feedbackFiles_table_body"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));

/// Grading page of an individual or group attempt
pub fn attempt_url<S: Session>(session: &S, attempt_id: &str, is_group_attempt: bool) -> String {
	let param = if is_group_attempt { "groupAttemptId" } else { "attempt_id" };
	session.url(&format!("/webapps/assignment/gradeAssignmentRedirector?course_id={}&{param}={attempt_id}", session.course_id()))
}

/// Fetch and parse one attempt. Read-only.
pub async fn read_attempt<S: Session>(session: &S, attempt_id: &str, is_group_attempt: bool) -> Result<AttemptRecord> {
	let response = session.get(&attempt_url(session, attempt_id, is_group_attempt)).await?;
	parse_attempt(&response)
}

pub fn parse_attempt(response: &Response) -> Result<AttemptRecord> {
	let document = response.document();
	let fail = |message: String| -> color_eyre::Report { ParserError::new(message, response.clone()).into() };

	let submission = document.select(&SUBMISSION_TEXT).next().map(element_to_markdown);

	let comments = match document.select(&COMMENTS).next() {
		None => None,
		Some(container) => {
			let comments: Vec<String> = container.select(&COMMENT).map(element_to_markdown).collect();
			if comments.is_empty() {
				return Err(fail("Page contains currentAttempt_comments, but it contains no comments".to_owned()));
			}
			Some(comments.join("\n\n"))
		}
	};

	let list = document.select(&SUBMISSION_LIST).next().ok_or_else(|| fail("No currentAttempt_submissionList".to_owned()))?;
	let mut files = Vec::new();
	for item in list.children().filter_map(ElementRef::wrap) {
		let filename = element_text_content(item);
		if let Some(button) = item.select(&DOWNLOAD_BUTTON).next() {
			let href = button.attr("href").ok_or_else(|| fail(format!("Download button for {filename:?} has no href")))?;
			files.push(FileLink::new(filename, response.join(href)?));
		} else if item.select(&INLINE_TEXT_ITEM).next().is_some() {
			// This entry stands for the inline submission text
			if submission.as_deref().is_none_or(str::is_empty) {
				return Err(fail(format!("{filename:?} in file list, but no accompanying submission text contents")));
			}
		} else {
			return Err(fail(format!("No download link for file {filename:?}")));
		}
	}

	let score = match document.select(&GRADE).next().map(form_field_value) {
		None => None,
		Some(raw) => match raw.trim().parse::<f64>() {
			Ok(score) => Some(score),
			Err(_) if raw.trim().is_empty() => None,
			Err(_) => return Err(fail(format!("Couldn't parse currentAttempt_grade: {raw:?}"))),
		},
	};

	let feedback = document.select(&FEEDBACK_TEXT).next().map(form_field_value).unwrap_or_default();

	let mut feedback_files = Vec::new();
	if let Some(body) = document.select(&FEEDBACK_FILES).next() {
		for (i, row) in body.children().filter_map(ElementRef::wrap).enumerate() {
			let link = row.select(&LINK).next().ok_or_else(|| fail(format!("feedbackFiles_table_body row {i}: no link")))?;
			let href = link.attr("href").ok_or_else(|| fail(format!("feedbackFiles_table_body row {i}: link has no href")))?;
			feedback_files.push(FileLink::new(element_text_content(link), response.join(href)?));
		}
	}

	Ok(AttemptRecord {
		submission,
		comments,
		files,
		score,
		feedback,
		feedback_files,
	})
}

/// Save each file into `dir` under its own name. Returns the written paths, in order.
pub async fn download_files<S: Session>(session: &S, files: &[FileLink], dir: &Path) -> Result<Vec<PathBuf>> {
	tokio::fs::create_dir_all(dir).await.wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
	let mut written = Vec::with_capacity(files.len());
	for file in files {
		// Only the final component, so a crafted name cannot escape `dir`
		let name = Path::new(&file.filename)
			.file_name()
			.ok_or_else(|| eyre!("Refusing to save {:?}: not a file name", file.filename))?;
		let path = dir.join(name);
		let bytes = session.download(&file.download_link).await?;
		tokio::fs::write(&path, &bytes).await.wrap_err_with(|| format!("Failed to write {}", path.display()))?;
		tracing::debug!(path = %path.display(), size = bytes.len(), "saved attempt file");
		written.push(path);
	}
	Ok(written)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;
	use crate::session::testing::{BASE, FakeSession};

	const ATTEMPT: &str = "/webapps/assignment/gradeAssignmentRedirector?course_id=_56503_1&attempt_id=_9_1";

	const FULL: &str = r##"<html><body>
		<div id="submissionTextView"><p>My <strong>answer</strong></p></div>
		<div id="currentAttempt_comments">
			<div class="vtbegenerated"><p>First comment</p></div>
			<div class="vtbegenerated"><p>Second</p></div>
		</div>
		<ul id="currentAttempt_submissionList">
			<li><a id="currentAttempt_attemptFilesubmissionText" href="#">Submission Text</a></li>
			<li><span>handin.pdf</span> <a class="dwnldBtn" href="/webapps/assignment/download?attempt_id=_9_1&amp;fileName=handin.pdf"></a></li>
		</ul>
		<form id="currentAttempt_form">
			<input type="text" id="currentAttempt_grade" name="grade" value="1.00">
			<textarea id="feedbacktext" name="feedbacktext">Well done</textarea>
		</form>
		<table><tbody id="feedbackFiles_table_body">
			<tr><td><a href="/bbcswebdav/xid-77_1">notes.txt</a></td><td>12 KB</td></tr>
		</tbody></table>
	</body></html>"##;

	fn parse(html: &str) -> Result<AttemptRecord> {
		parse_attempt(&Response::new(format!("{BASE}{ATTEMPT}").parse().unwrap(), 200, html))
	}

	fn parser_error(html: &str) -> String {
		let err = parse(html).unwrap_err();
		err.downcast_ref::<ParserError>().expect("ParserError").message.clone()
	}

	#[tokio::test]
	async fn reads_full_attempt() {
		let session = FakeSession::new().page(ATTEMPT, FULL);
		let attempt = read_attempt(&session, "_9_1", false).await.unwrap();
		assert_eq!(attempt, AttemptRecord {
			submission: Some("My **answer**".into()),
			comments: Some("First comment\n\nSecond".into()),
			files: vec![FileLink::new(
				"handin.pdf".into(),
				"https://bb.example/webapps/assignment/download?attempt_id=_9_1&fileName=handin.pdf".into()
			)],
			score: Some(1.0),
			feedback: "Well done".into(),
			feedback_files: vec![FileLink::new("notes.txt".into(), "https://bb.example/bbcswebdav/xid-77_1".into())],
		});
	}

	#[tokio::test]
	async fn group_attempts_use_their_own_url() {
		let session = FakeSession::new().page("/webapps/assignment/gradeAssignmentRedirector?course_id=_56503_1&groupAttemptId=_4_1", FULL);
		assert!(read_attempt(&session, "_4_1", true).await.is_ok());
	}

	#[test]
	fn minimal_page() {
		let attempt = parse(r#"<ul id="currentAttempt_submissionList"></ul>"#).unwrap();
		assert_eq!(attempt, AttemptRecord::default());
	}

	#[rstest]
	#[case::empty("")]
	#[case::blank("   ")]
	fn blank_score_is_absent(#[case] value: &str) {
		let html = format!(r#"<ul id="currentAttempt_submissionList"></ul><input id="currentAttempt_grade" value="{value}">"#);
		assert_eq!(parse(&html).unwrap().score, None);
	}

	#[test]
	fn comments_container_without_comments() {
		let html = r#"<div id="currentAttempt_comments"><p>stray</p></div><ul id="currentAttempt_submissionList"></ul>"#;
		assert!(parser_error(html).contains("contains no comments"));
	}

	#[rstest]
	#[case::no_submission_list("<div></div>", "No currentAttempt_submissionList")]
	#[case::unknown_list_item(r#"<ul id="currentAttempt_submissionList"><li>mystery.zip</li></ul>"#, "No download link for file \"mystery.zip\"")]
	#[case::inline_text_without_text(
		r#"<ul id="currentAttempt_submissionList"><li><a id="currentAttempt_attemptFilesubmissionText">Submission Text</a></li></ul>"#,
		"\"Submission Text\" in file list"
	)]
	#[case::non_numeric_score(
		r#"<ul id="currentAttempt_submissionList"></ul><input id="currentAttempt_grade" value="Complete">"#,
		"Couldn't parse currentAttempt_grade: \"Complete\""
	)]
	#[case::feedback_row_without_link(
		r#"<ul id="currentAttempt_submissionList"></ul><table><tbody id="feedbackFiles_table_body"><tr><td><a href="/a">a</a></td></tr><tr><td>b</td></tr></tbody></table>"#,
		"feedbackFiles_table_body row 1: no link"
	)]
	fn contract_violations(#[case] html: &str, #[case] message: &str) {
		let got = parser_error(html);
		assert!(got.starts_with(message), "{got}");
	}

	#[tokio::test]
	async fn downloads_into_directory() {
		let session = FakeSession::new().page("/bbcswebdav/xid-77_1", "file body");
		let dir = tempfile::tempdir().unwrap();
		let files = [FileLink::new("../notes.txt".into(), format!("{BASE}/bbcswebdav/xid-77_1"))];
		let written = download_files(&session, &files, dir.path()).await.unwrap();
		assert_eq!(written, [dir.path().join("notes.txt")]);
		assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), "file body");
	}
}
