use std::path::PathBuf;

use bbfetch::{
	BbSession, ParserError,
	attempt::{download_files, read_attempt},
	config::{AppConfig, SettingsFlags},
	groups::read_groups,
	overview::read_overview,
	submit::submit_grade,
};
use clap::{Args, Parser, Subcommand};
use color_eyre::{Result, eyre::WrapErr};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use v_utils::{elog, io::{ConfirmResult, confirmation}, log};

#[derive(Parser)]
#[command(name = "bbfetch")]
#[command(about = "Read submissions from and post grades to a Blackboard Learn course", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Command,
	#[clap(flatten)]
	settings: SettingsFlags,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Gradebook snapshot: assignments and students
	Overview,
	/// Show one attempt
	Attempt(AttemptArgs),
	/// Save the files of one attempt into a directory
	Download {
		#[clap(flatten)]
		attempt: AttemptArgs,
		dir: PathBuf,
	},
	/// Set grade and feedback of one attempt
	Submit {
		#[clap(flatten)]
		attempt: AttemptArgs,
		grade: f64,
		#[arg(long, conflicts_with = "feedback_file")]
		feedback: Option<String>,
		/// Read feedback text from a file
		#[arg(long)]
		feedback_file: Option<PathBuf>,
		/// Attach a feedback file (repeatable)
		#[arg(long = "attach")]
		attachments: Vec<PathBuf>,
		/// Don't ask for confirmation
		#[arg(short, long)]
		yes: bool,
	},
	/// Course roster with group memberships
	Groups,
}

#[derive(Debug, Args)]
struct AttemptArgs {
	attempt_id: String,
	/// The id is a group attempt id
	#[arg(long)]
	group: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	let config = AppConfig::try_build(cli.settings)?;
	let session = BbSession::new(&config)?;

	let result = run(cli.command, &config, &session).await;
	if let Err(e) = &result {
		if let Some(parser_error) = e.downcast_ref::<ParserError>() {
			persist(parser_error);
		}
	}
	result
}

async fn run(command: Command, config: &AppConfig, session: &BbSession) -> Result<()> {
	match command {
		Command::Overview => {
			let (assignments, students) = read_overview(session).await?;
			log!("{} assignments, {} students", assignments.len(), students.len());
			print_json(&serde_json::json!({ "assignments": assignments, "students": students }))
		}
		Command::Attempt(AttemptArgs { attempt_id, group }) => print_json(&read_attempt(session, &attempt_id, group).await?),
		Command::Download { attempt, dir } => {
			let record = read_attempt(session, &attempt.attempt_id, attempt.group).await?;
			if record.files.is_empty() {
				log!("Attempt {} has no files", attempt.attempt_id);
				return Ok(());
			}
			for path in download_files(session, &record.files, &dir).await? {
				log!("Saved {}", path.display());
			}
			Ok(())
		}
		Command::Submit {
			attempt,
			grade,
			feedback,
			feedback_file,
			attachments,
			yes,
		} => {
			let feedback = match feedback_file {
				Some(path) => tokio::fs::read_to_string(&path).await.wrap_err_with(|| format!("Failed to read {}", path.display()))?,
				None => feedback.unwrap_or_default(),
			};

			let current = read_attempt(session, &attempt.attempt_id, attempt.group).await?;
			eprintln!("{current}");
			log!("New grade: {grade}, {} attachment(s)", attachments.len());
			if !feedback.is_empty() {
				log!("New feedback:\n{feedback}");
			}
			if !config.auto_submit && !yes && confirmation("Submit this grade?").flush().await != ConfirmResult::Yes {
				log!("Not submitted.");
				return Ok(());
			}

			submit_grade(session, &attempt.attempt_id, attempt.group, grade, &feedback, &attachments).await?;
			log!("Grade submitted for attempt {}", attempt.attempt_id);
			Ok(())
		}
		Command::Groups => print_json(&read_groups(session).await?),
	}
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[cfg(feature = "xdg")]
fn persist(parser_error: &ParserError) {
	if let Err(e) = bbfetch::persist::save_response_html(&parser_error.response) {
		elog!("Couldn't keep offending response: {e}");
	}
}

#[cfg(not(feature = "xdg"))]
fn persist(parser_error: &ParserError) {
	elog!("Offending response from {} not kept (built without `xdg`)", parser_error.response.url);
}
