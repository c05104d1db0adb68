use v_utils::macros::{MyConfigPrimitives, Settings};

#[derive(Clone, Debug, Default, MyConfigPrimitives, Settings)]
pub struct AppConfig {
	/// Scheme and host of the Blackboard installation (default: https://bb.au.dk)
	#[settings(default = default_base_url())]
	pub base_url: String,
	/// Course id as it appears in `course_id=` parameters, e.g. `_56503_1`
	pub course_id: String,
	/// `Cookie` header of a logged-in browser session
	pub cookie: String,
	#[settings(default = default_user_agent())]
	pub user_agent: String,
	/// Per-request timeout in seconds (default: 30)
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	/// Submit grades without asking for confirmation
	#[serde(default)]
	pub auto_submit: bool,
}

fn default_base_url() -> String {
	"https://bb.au.dk".to_owned()
}

fn default_user_agent() -> String {
	format!("bbfetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
	30
}
