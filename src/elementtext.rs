//! Projections of an HTML subtree into plain text, Markdown, or a form field's current value.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Node, Selector};

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static OPTION: LazyLock<Selector> = LazyLock::new(|| selector("option"));

/// Parse a selector written into the source.
pub(crate) fn selector(css: &'static str) -> Selector {
	Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// All text under `element`, whitespace runs collapsed to single spaces.
pub fn element_text_content(element: ElementRef<'_>) -> String {
	let text: String = element.text().collect();
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The value a browser would submit for this `<input>`, `<textarea>` or `<select>`.
pub fn form_field_value(element: ElementRef<'_>) -> String {
	match element.value().name() {
		"textarea" => element.text().collect(),
		"select" => {
			let mut options = element.select(&OPTION);
			let chosen = element.select(&OPTION).find(|o| o.attr("selected").is_some()).or_else(|| options.next());
			chosen.map(|o| o.attr("value").map(str::to_owned).unwrap_or_else(|| element_text_content(o))).unwrap_or_default()
		}
		_ => element.attr("value").unwrap_or_default().to_owned(),
	}
}

/// Render `element` as Markdown, keeping emphasis, links, lists, headings and line breaks.
pub fn element_to_markdown(element: ElementRef<'_>) -> String {
	let mut md = Markdown::default();
	md.children(element);
	let out: Vec<&str> = md.out.lines().map(str::trim_end).collect();
	BLANK_LINES.replace_all(&out.join("\n"), "\n\n").trim().to_owned()
}

#[derive(Default)]
struct Markdown {
	out: String,
	lists: Vec<Option<usize>>,
	in_pre: bool,
}

impl Markdown {
	fn children(&mut self, element: ElementRef<'_>) {
		for child in element.children() {
			match child.value() {
				Node::Text(text) => self.text(text),
				Node::Element(_) =>
					if let Some(child) = ElementRef::wrap(child) {
						self.element(child);
					},
				_ => {}
			}
		}
	}

	fn text(&mut self, text: &str) {
		if self.in_pre {
			self.out.push_str(text);
			return;
		}
		for (i, word) in text.split_whitespace().enumerate() {
			if i > 0 || text.starts_with(char::is_whitespace) {
				self.space();
			}
			self.out.push_str(word);
		}
		// Also covers whitespace-only nodes between inline elements
		if text.ends_with(char::is_whitespace) {
			self.space();
		}
	}

	fn space(&mut self) {
		if !self.out.is_empty() && !self.out.ends_with([' ', '\n']) {
			self.out.push(' ');
		}
	}

	fn newline(&mut self) {
		let trimmed = self.out.trim_end_matches(' ').len();
		self.out.truncate(trimmed);
		self.out.push('\n');
	}

	fn block(&mut self) {
		let trimmed = self.out.trim_end_matches([' ', '\n']).len();
		self.out.truncate(trimmed);
		if !self.out.is_empty() {
			self.out.push_str("\n\n");
		}
	}

	fn wrapped(&mut self, element: ElementRef<'_>, marker: &str) {
		if element.text().all(|t| t.trim().is_empty()) {
			return;
		}
		self.out.push_str(marker);
		let start = self.out.len();
		self.children(element);
		// Markdown emphasis may not end on whitespace
		let inner = self.out[start..].trim_end().len();
		let trailing = self.out.len() - start - inner;
		self.out.truncate(start + inner);
		self.out.push_str(marker);
		if trailing > 0 {
			self.out.push(' ');
		}
	}

	fn element(&mut self, element: ElementRef<'_>) {
		let name = element.value().name();
		match name {
			"script" | "style" | "head" => {}
			"br" => self.newline(),
			"strong" | "b" => self.wrapped(element, "**"),
			"em" | "i" => self.wrapped(element, "*"),
			"code" | "tt" if !self.in_pre => self.wrapped(element, "`"),
			"a" => match element.attr("href") {
				Some(href) if !href.starts_with("javascript:") => {
					let label = element_text_content(element);
					self.space_if_glued();
					if label.is_empty() || label == href {
						self.out.push_str(&format!("<{href}>"));
					} else {
						self.out.push_str(&format!("[{label}]({href})"));
					}
				}
				_ => self.children(element),
			},
			"img" =>
				if let Some(src) = element.attr("src") {
					self.out.push_str(&format!("![{}]({src})", element.attr("alt").unwrap_or_default()));
				},
			"h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
				self.block();
				let level = name[1..].parse::<usize>().unwrap_or(1);
				self.out.push_str(&"#".repeat(level));
				self.out.push(' ');
				self.children(element);
				self.block();
			}
			"pre" => {
				self.block();
				self.out.push_str("```\n");
				self.in_pre = true;
				self.children(element);
				self.in_pre = false;
				self.newline();
				self.out.push_str("```");
				self.block();
			}
			"ul" | "ol" => {
				if self.lists.is_empty() {
					self.block();
				} else {
					self.newline();
				}
				self.lists.push((name == "ol").then_some(0));
				for item in element.children().filter_map(ElementRef::wrap) {
					if item.value().name() == "li" {
						self.item(item);
					} else {
						self.element(item);
					}
				}
				self.lists.pop();
				if self.lists.is_empty() {
					self.block();
				}
			}
			"li" => self.item(element),
			"p" | "div" | "blockquote" | "section" | "article" | "table" | "tr" | "hr" => {
				self.block();
				self.children(element);
				self.block();
			}
			_ => self.children(element),
		}
	}

	fn item(&mut self, item: ElementRef<'_>) {
		if !self.out.is_empty() && !self.out.ends_with('\n') {
			self.newline();
		}
		let depth = self.lists.len().saturating_sub(1);
		let marker = match self.lists.last_mut() {
			Some(Some(n)) => {
				*n += 1;
				format!("{n}. ")
			}
			_ => "- ".to_owned(),
		};
		self.out.push_str(&"  ".repeat(depth));
		self.out.push_str(&marker);
		self.children(item);
		let trimmed = self.out.trim_end_matches([' ', '\n']).len();
		self.out.truncate(trimmed);
		self.out.push('\n');
	}

	fn space_if_glued(&mut self) {
		if self.out.ends_with(|c: char| c.is_alphanumeric()) {
			self.out.push(' ');
		}
	}
}
