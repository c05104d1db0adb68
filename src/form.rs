//! Scraped form state, replayed field for field with only the fields we care about changed.

use std::{collections::HashMap, sync::LazyLock};

use scraper::{Html, Selector};
use thiserror::Error;

use crate::elementtext::{form_field_value, selector};

static FORMS: LazyLock<Selector> = LazyLock::new(|| selector("form"));
static FIELDS: LazyLock<Selector> = LazyLock::new(|| selector("input[name], textarea[name]"));

#[derive(Debug, Error, PartialEq, Eq)]
#[error("form has no field named {name:?}")]
pub struct MissingFieldError {
	pub name: String,
}

/// Ordered `(name, value)` pairs of one `<form>`, as a browser would serialize them.
///
/// Names may repeat. Lookups and [set](FormState::set) address the *last* occurrence of a name, while every occurrence stays
/// in the serialized output; [extend](FormState::extend) is the only way to add another occurrence of a name.
///
/// Not `Clone`: the server embeds single-use tokens, so each submission must start from a freshly read form.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FormState {
	fields: Vec<(String, String)>,
	index: HashMap<String, usize>,
}

impl FormState {
	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut state = Self::default();
		state.extend(pairs);
		state
	}

	pub fn get(&self, name: &str) -> Result<&str, MissingFieldError> {
		self.index
			.get(name)
			.map(|&i| self.fields[i].1.as_str())
			.ok_or_else(|| MissingFieldError { name: name.to_owned() })
	}

	pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
		self.get(name).unwrap_or(default)
	}

	/// Overwrite the tracked occurrence of `name` in place, or append it if the form has no such field.
	pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		match self.index.get(&name) {
			Some(&i) => self.fields[i].1 = value.into(),
			None => {
				self.index.insert(name.clone(), self.fields.len());
				self.fields.push((name, value.into()));
			}
		}
	}

	/// Append every pair as a new occurrence, even when the name is already present.
	pub fn extend<I, K, V>(&mut self, pairs: I)
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		for (name, value) in pairs {
			let name = name.into();
			self.index.insert(name.clone(), self.fields.len());
			self.fields.push((name, value.into()));
		}
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Fields in serialization order
	pub fn pairs(&self) -> &[(String, String)] {
		&self.fields
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn into_pairs(self) -> Vec<(String, String)> {
		self.fields
	}
}

/// Read every named `<input>` and `<textarea>` of `form#form_id`, hidden and disabled ones included, in document order.
///
/// A `<textarea>` contributes its text content, which is what a browser submits for it; inputs contribute their `value`
/// attribute. `None` if the page has no such form.
pub fn read_form(document: &Html, form_id: &str) -> Option<FormState> {
	let form = document.select(&FORMS).find(|f| f.attr("id") == Some(form_id))?;
	let pairs = form.select(&FIELDS).filter_map(|field| {
		let name = field.attr("name").filter(|n| !n.is_empty())?;
		let value = match field.value().name() {
			"textarea" => form_field_value(field),
			_ => field.attr("value").unwrap_or_default().to_owned(),
		};
		Some((name.to_owned(), value))
	});
	Some(FormState::from_pairs(pairs))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	const PAGE: &str = r#"<html><body>
		<form id="other"><input name="q" value="ignored"></form>
		<form id="currentAttempt_form" method="post">
			<input type="hidden" name="blackboard.platform.security.NonceUtil.nonce" value="abc-123">
			<input type="hidden" name="course_id" value="_56503_1">
			<input type="text" name="grade" id="currentAttempt_grade" value="">
			<input type="hidden" name="attempt_id" value="_1_1">
			<textarea name="feedbacktext" id="feedbacktext">Old feedback</textarea>
			<input type="hidden" name="dup" value="first">
			<input type="checkbox" name="dup" value="second" disabled>
			<input type="submit" value="Submit">
		</form></body></html>"#;

	fn form() -> FormState {
		read_form(&Html::parse_document(PAGE), "currentAttempt_form").unwrap()
	}

	#[test]
	fn reads_named_fields_in_document_order() {
		let expected: Vec<(String, String)> = [
			("blackboard.platform.security.NonceUtil.nonce", "abc-123"),
			("course_id", "_56503_1"),
			("grade", ""),
			("attempt_id", "_1_1"),
			("feedbacktext", "Old feedback"),
			("dup", "first"),
			("dup", "second"),
		]
		.into_iter()
		.map(|(k, v)| (k.to_owned(), v.to_owned()))
		.collect();
		assert_eq!(form().into_pairs(), expected);
	}

	#[test]
	fn unmodified_state_reserializes_identically() {
		let direct: Vec<(String, String)> = form().into_pairs();
		let replayed = FormState::from_pairs(form().into_pairs());
		assert_eq!(replayed.pairs(), direct.as_slice());
	}

	#[test]
	fn textarea_replays_its_text_content() {
		let doc = Html::parse_document(r#"<form id="f"><textarea name="notes" value="attr">Kept
as typed</textarea></form>"#);
		let form = read_form(&doc, "f").unwrap();
		assert_eq!(form.get("notes"), Ok("Kept\nas typed"));
	}

	#[test]
	fn missing_form() {
		assert!(read_form(&Html::parse_document(PAGE), "nope").is_none());
	}

	#[test]
	fn duplicate_names_resolve_to_last_occurrence() {
		let mut form = form();
		assert_eq!(form.get("dup"), Ok("second"));
		form.set("dup", "patched");
		assert_eq!(form.pairs()[5], ("dup".to_owned(), "first".to_owned()));
		assert_eq!(form.pairs()[6], ("dup".to_owned(), "patched".to_owned()));
	}

	#[test]
	fn set_existing_keeps_count_and_position() {
		let mut form = form();
		let before = form.len();
		form.set("grade", "1");
		assert_eq!(form.len(), before);
		assert_eq!(form.pairs()[2], ("grade".to_owned(), "1".to_owned()));
	}

	#[test]
	fn set_absent_appends_one() {
		let mut form = form();
		let before = form.len();
		form.set("new_field", "x");
		assert_eq!(form.len(), before + 1);
		assert_eq!(form.pairs().last().unwrap(), &("new_field".to_owned(), "x".to_owned()));
		assert_eq!(form.get("new_field"), Ok("x"));
	}

	#[test]
	fn extend_appends_and_lookups_see_last() {
		let mut form = form();
		let before = form.len();
		form.extend([("feedbackFiles_linkTitle", "a.pdf"), ("feedbackFiles_fileId", "new"), ("feedbackFiles_linkTitle", "b.pdf")]);
		assert_eq!(form.len(), before + 3);
		assert_eq!(form.get("feedbackFiles_linkTitle"), Ok("b.pdf"));
		let titles: Vec<&str> = form.iter().filter(|(k, _)| *k == "feedbackFiles_linkTitle").map(|(_, v)| v).collect();
		assert_eq!(titles, ["a.pdf", "b.pdf"]);
	}

	#[test]
	fn get_missing_field() {
		let form = form();
		assert_eq!(form.get("nope"), Err(MissingFieldError { name: "nope".into() }));
		assert_eq!(form.get_or("nope", "fallback"), "fallback");
	}
}
