//! Keeps the pages that failed to parse, so the failure can be reproduced later.

use std::path::PathBuf;

use color_eyre::{Result, eyre::eyre};
use v_utils::{log, xdg_state_dir};

use crate::session::Response;

/// Write `response.body` under the state dir, named after the time and the URL it came from.
pub fn save_response_html(response: &Response) -> Result<PathBuf> {
	let html_dir = xdg_state_dir!("persist_htmls");
	std::fs::create_dir_all(&html_dir).map_err(|e| eyre!("Failed to create HTML dir: {}", e))?;

	let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
	let filepath = html_dir.join(format!("{}_{}.html", timestamp, file_label(response)));

	std::fs::write(&filepath, &response.body).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;

	log!("Saved response body to: {}", filepath.display());
	Ok(filepath)
}

/// Host, path and query of the response URL, reduced to filename-safe characters
fn file_label(response: &Response) -> String {
	let url = &response.url;
	let label = format!("{}{}{}", url.host_str().unwrap_or_default(), url.path(), url.query().map(|q| format!("?{q}")).unwrap_or_default());
	label.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}
