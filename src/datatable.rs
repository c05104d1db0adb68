//! Paginated Blackboard list widgets, read page by page into one logical table.

use std::{collections::HashSet, sync::LazyLock};

use color_eyre::Result;
use scraper::{ElementRef, Selector};

use crate::{
	elementtext::{element_text_content, selector},
	error::ParserError,
	session::{Response, Session},
};

static TABLES: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static NEXT_PAGE: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[id$="_nextpage_top"], a[id$="_nextpage_bot"], a[title="Next Page"]"#));

/// Header keys and rows of every page, plus the last response for diagnostics
#[derive(Debug)]
pub struct Datatable<T> {
	pub response: Response,
	pub keys: Vec<String>,
	/// Each row holds exactly `keys.len()` cells
	pub rows: Vec<Vec<T>>,
}

impl<T> Datatable<T> {
	/// Position of the column with the given key
	pub fn column(&self, key: &str) -> Result<usize> {
		match self.keys.iter().position(|k| k == key) {
			Some(i) => Ok(i),
			None => Err(ParserError::new(format!("Datatable has no column {key:?} (columns: {:?})", self.keys), self.response.clone()).into()),
		}
	}
}

/// Default cell extraction: the cell's whitespace-normalized text.
pub fn cell_text(cell: ElementRef<'_>) -> String {
	element_text_content(cell)
}

/// Read the table `table#table_id` starting at `url`, following its "next page" links until the last page.
///
/// `extract(key, cell, row_so_far)` turns each cell into a value; it sees the values already extracted for the row, so later
/// columns may depend on earlier ones. Paging stops when a page has no next-page link or yields no rows.
pub async fn read_table<S, T, F>(session: &S, url: &str, table_id: &str, mut extract: F) -> Result<Datatable<T>>
where
	S: Session,
	F: FnMut(&str, ElementRef<'_>, &[T]) -> Result<T>,
{
	let mut url = url.to_owned();
	let mut visited = HashSet::new();
	let mut keys: Option<Vec<String>> = None;
	let mut rows = Vec::new();

	loop {
		visited.insert(url.clone());
		let response = session.get(&url).await?;
		let page = read_page(&response, table_id, &mut extract)?;
		tracing::debug!(%url, rows = page.rows.len(), next = ?page.next, "datatable page");

		match &keys {
			Some(first) if *first != page.keys =>
				return Err(ParserError::new(format!("Columns of {table_id} changed between pages: {first:?} then {:?}", page.keys), response).into()),
			Some(_) => {}
			None => keys = Some(page.keys.clone()),
		}

		let page_rows = page.rows.len();
		rows.extend(page.rows);
		let next = match page.next {
			Some(next) if page_rows > 0 => next,
			_ => return Ok(Datatable { response, keys: page.keys, rows }),
		};
		if visited.contains(&next) {
			return Err(ParserError::new(format!("Pagination of {table_id} loops back to {next}"), response).into());
		}
		url = next;
	}
}

struct Page<T> {
	keys: Vec<String>,
	rows: Vec<Vec<T>>,
	next: Option<String>,
}

fn read_page<T, F>(response: &Response, table_id: &str, extract: &mut F) -> Result<Page<T>>
where
	F: FnMut(&str, ElementRef<'_>, &[T]) -> Result<T>,
{
	let document = response.document();
	let fail = |message: String| -> color_eyre::Report { ParserError::new(message, response.clone()).into() };

	let table = document.select(&TABLES).find(|t| t.attr("id") == Some(table_id)).ok_or_else(|| fail(format!("No <table id={table_id}>")))?;
	let keys = own_rows(table, "thead").flat_map(row_cells).filter(|c| c.value().name() == "th").map(|th| column_key(response, th)).collect::<Vec<_>>();
	if keys.is_empty() {
		return Err(fail(format!("<table id={table_id}> has no header row")));
	}

	let mut rows = Vec::new();
	for (i, tr) in own_rows(table, "tbody").enumerate() {
		let cells: Vec<ElementRef> = row_cells(tr).collect();
		if is_placeholder(&cells, keys.len()) {
			continue;
		}
		if cells.len() != keys.len() {
			return Err(fail(format!("Row {i} of {table_id} has {} cells, header has {}", cells.len(), keys.len())));
		}
		let mut row = Vec::with_capacity(keys.len());
		for (key, cell) in keys.iter().zip(cells) {
			match extract(key.as_str(), cell, row.as_slice()) {
				Ok(value) => row.push(value),
				Err(e) if e.downcast_ref::<ParserError>().is_some() => return Err(e),
				Err(e) => return Err(fail(format!("Row {i} of {table_id}, column {key:?}: {e}"))),
			}
		}
		rows.push(row);
	}

	let next = match document.select(&NEXT_PAGE).find_map(|a| a.attr("href")).filter(|href| !href.starts_with("javascript:") && *href != "#") {
		Some(href) => Some(response.join(href)?),
		None => None,
	};
	Ok(Page { keys, rows, next })
}

/// Rows of the table's own `section` elements, leaving tables nested in cells alone
fn own_rows<'a>(table: ElementRef<'a>, section: &'static str) -> impl Iterator<Item = ElementRef<'a>> {
	table
		.children()
		.filter_map(ElementRef::wrap)
		.filter(move |e| e.value().name() == section)
		.flat_map(|s| s.children().filter_map(ElementRef::wrap).filter(|e| e.value().name() == "tr"))
}

fn row_cells(tr: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
	tr.children().filter_map(ElementRef::wrap).filter(|c| matches!(c.value().name(), "td" | "th"))
}

/// Sortable columns carry their key in the `sortCol` parameter of the header link; the others are known by their title.
fn column_key(response: &Response, th: ElementRef<'_>) -> String {
	th.select(&LINKS)
		.filter_map(|a| response.url.join(a.attr("href")?).ok())
		.find_map(|url| url.query_pairs().find(|(k, _)| k == "sortCol").map(|(_, v)| v.into_owned()))
		.unwrap_or_else(|| element_text_content(th))
}

/// The single full-width "no items" row of an empty list
fn is_placeholder(cells: &[ElementRef], columns: usize) -> bool {
	columns > 1 && cells.len() == 1 && cells[0].attr("colspan").is_some()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;
	use crate::session::testing::FakeSession;

	const TABLE: &str = "userGroupList_datatable";

	fn page(rows: &[[&str; 3]], next: Option<&str>) -> String {
		let body: String = rows.iter().map(|[a, b, c]| format!("<tr><th>{a}</th><td>{b}</td><td><span>{c}</span></td></tr>")).collect();
		let paging = next.map(|href| format!(r#"<a id="listContainer_nextpage_top" href="{href}">Next</a>"#)).unwrap_or_default();
		format!(
			r#"<html><body>{paging}<table id="{TABLE}"><thead><tr>
				<th><a href="/webapps/list?sortCol=userorgroupname&amp;sortDir=ASCENDING">Username</a></th>
				<th><a href="/webapps/list?sortCol=firstname&amp;sortDir=ASCENDING">First Name</a></th>
				<th>Role</th>
			</tr></thead><tbody>{body}</tbody></table></body></html>"#
		)
	}

	fn text_hook(_: &str, cell: ElementRef<'_>, _: &[String]) -> Result<String> {
		Ok(cell_text(cell))
	}

	fn rows(rows: &[[&str; 3]]) -> Vec<Vec<String>> {
		rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
	}

	const P1: [[&str; 3]; 2] = [["au1", "Ada", "Student"], ["au2", "Bo", "Student"]];
	const P2: [[&str; 3]; 2] = [["au3", "Cy", "Teaching Assistant"], ["au4", "Di", "Student"]];
	const P3: [[&str; 3]; 1] = [["au5", "Ed", "Instructor"]];

	#[tokio::test]
	async fn single_page() {
		let session = FakeSession::new().page("/list", page(&P1, None));
		let table = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap();
		assert_eq!(table.keys, ["userorgroupname", "firstname", "Role"]);
		assert_eq!(table.rows, rows(&P1));
		assert_eq!(table.column("Role").unwrap(), 2);
	}

	#[tokio::test]
	async fn pages_concatenate_in_order() {
		let session = FakeSession::new()
			.page("/list", page(&P1, Some("/list?startIndex=2")))
			.page("/list?startIndex=2", page(&P2, Some("list?startIndex=4")))
			.page("/list?startIndex=4", page(&P3, None));
		let table = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap();

		let mut expected = rows(&P1);
		expected.extend(rows(&P2));
		expected.extend(rows(&P3));
		assert_eq!(table.rows, expected);
		assert_eq!(session.requested.borrow().len(), 3);
		assert_eq!(table.response.url.as_str(), "https://bb.example/list?startIndex=4");
	}

	#[tokio::test]
	async fn empty_page_ends_paging() {
		let session = FakeSession::new()
			.page("/list", page(&P1, Some("/list?startIndex=2")))
			.page("/list?startIndex=2", page(&[], Some("/list?startIndex=4")));
		let table = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap();
		assert_eq!(table.rows, rows(&P1));
		assert_eq!(session.requested.borrow().len(), 2);
	}

	#[tokio::test]
	async fn hook_sees_row_so_far() {
		let session = FakeSession::new().page("/list", page(&P1, None));
		let table = read_table(&session, "https://bb.example/list", TABLE, |key, cell, row: &[String]| {
			Ok(match key {
				"Role" => format!("{}:{}", row[0], cell_text(cell)),
				_ => cell_text(cell),
			})
		})
		.await
		.unwrap();
		assert_eq!(table.rows[1][2], "au2:Student");
	}

	#[tokio::test]
	async fn placeholder_row_is_skipped() {
		let html = page(&[], None).replace("<tbody></tbody>", r#"<tbody><tr><td colspan="3">No items found.</td></tr></tbody>"#);
		let session = FakeSession::new().page("/list", html);
		let table = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap();
		assert!(table.rows.is_empty());
	}

	#[rstest]
	#[case::missing_table(page(&P1, None).replace(TABLE, "other_table"), "No <table id=userGroupList_datatable>")]
	#[case::short_row(page(&P1, None).replace("<td><span>Student</span></td></tr><tr>", "</tr><tr>"), "Row 0 of userGroupList_datatable has 2 cells")]
	#[case::pagination_loop(page(&P1, Some("/list")), "Pagination of userGroupList_datatable loops back")]
	#[case::no_header(format!(r#"<table id="{TABLE}"><tbody><tr><td>au1</td></tr></tbody></table>"#), "<table id=userGroupList_datatable> has no header row")]
	#[tokio::test]
	async fn malformed_tables(#[case] html: String, #[case] message: &str) {
		let session = FakeSession::new().page("/list", html);
		let err = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap_err();
		let err = err.downcast_ref::<ParserError>().expect("ParserError");
		assert!(err.message.starts_with(message), "{}", err.message);
		assert_eq!(err.response.url.as_str(), "https://bb.example/list");
	}

	#[tokio::test]
	async fn columns_must_not_change_between_pages() {
		let session = FakeSession::new()
			.page("/list", page(&P1, Some("/list?startIndex=2")))
			.page("/list?startIndex=2", page(&P2, None).replace("sortCol=firstname", "sortCol=givenname"));
		let err = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap_err();
		let err = err.downcast_ref::<ParserError>().expect("ParserError");
		assert!(err.message.starts_with("Columns of userGroupList_datatable changed between pages"), "{}", err.message);
		assert_eq!(err.response.url.as_str(), "https://bb.example/list?startIndex=2");
	}

	#[tokio::test]
	async fn nested_tables_stay_inside_their_cell() {
		let nested = "<table><thead><tr><th>x</th></tr></thead><tbody><tr><td>y</td><td>z</td></tr></tbody></table>";
		let session = FakeSession::new().page("/list", page(&P1, None).replace("<span>Student</span>", nested));
		let table = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap();
		assert_eq!(table.keys, ["userorgroupname", "firstname", "Role"]);
		assert_eq!(table.rows.len(), 2);
		assert_eq!(table.rows[0][2], "xyz");
	}

	#[tokio::test]
	async fn hook_failure_keeps_the_page() {
		let session = FakeSession::new().page("/list", page(&P1, None));
		let err = read_table(&session, "https://bb.example/list", TABLE, |key, cell, _: &[String]| match key {
			"Role" => color_eyre::eyre::bail!("unexpected role markup"),
			_ => Ok(cell_text(cell)),
		})
		.await
		.unwrap_err();
		let err = err.downcast_ref::<ParserError>().expect("ParserError");
		assert_eq!(err.message, r#"Row 0 of userGroupList_datatable, column "Role": unexpected role markup"#);
		assert!(err.response.body.contains("au1"));
	}

	#[tokio::test]
	async fn unknown_column() {
		let session = FakeSession::new().page("/list", page(&P1, None));
		let table = read_table(&session, "https://bb.example/list", TABLE, text_hook).await.unwrap();
		assert!(table.column("Groups").unwrap_err().downcast_ref::<ParserError>().is_some());
	}
}
