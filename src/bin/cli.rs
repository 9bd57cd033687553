// CLI binary: printing and exiting on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use resolve_pilot::error::AppError;
use resolve_pilot::registry::execute::execute_tool_call;
use resolve_pilot::registry::{catalog, CommandOutput};
use resolve_pilot::remote::fake::FakeResolve;
use resolve_pilot::remote::Transport;
use resolve_pilot::state::{self, AppState};
use resolve_pilot::{logging, paths, settings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "resolve-pilot-cli", about = "Resolve Pilot headless CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Run against an in-memory editor seeded with demo media
    #[arg(long, global = true)]
    demo: bool,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connection, logic generation, current project and timeline
    Status,
    /// Build a timeline from a cut list file
    Build {
        cut_list: PathBuf,
        /// Insert a composition for every placeholder row
        #[arg(long)]
        placeholders: bool,
        /// Replace an existing timeline with the same name
        #[arg(long)]
        replace: bool,
        /// Video track for clips
        #[arg(long)]
        track: Option<i64>,
        /// Frame rate for this build (defaults to the timeline setting)
        #[arg(long)]
        fps: Option<f64>,
    },
    /// Validate a cut list file without touching the editor
    Validate { cut_list: PathBuf },
    /// Reload the session logic profile
    Reload,
    /// List available tools (or help for one topic)
    Tools { topic: Option<String> },
    /// Print the effective settings (file plus environment overrides)
    Config {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
    /// Run any tool by name with JSON params
    Run {
        name: String,
        /// JSON object with the tool's params
        params: Option<String>,
    },
}

// ── State initialization ─────────────────────────────────────────

fn initialize_state(config_dir: Option<PathBuf>, demo: bool) -> Arc<AppState> {
    let app_config_dir = config_dir.unwrap_or_else(paths::default_app_config_dir);
    let loaded = settings::load_effective(&app_config_dir);
    let transport: Box<dyn Transport> = if demo {
        Box::new(FakeResolve::demo())
    } else {
        state::bridge_transport(&loaded).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            process::exit(1);
        })
    };
    let state = AppState::connect(app_config_dir, loaded, transport).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });
    Arc::new(state)
}

// ── Command building ─────────────────────────────────────────────

/// Map a subcommand to a (tool name, params) pair.
fn tool_call(cmd: &Commands) -> (String, Value) {
    match cmd {
        Commands::Status => ("get_status".to_string(), json!({})),
        Commands::Reload => ("reload_logic".to_string(), json!({})),
        Commands::Validate { cut_list } => (
            "validate_cut_list".to_string(),
            json!({ "path": cut_list.to_string_lossy() }),
        ),
        Commands::Build {
            cut_list,
            placeholders,
            replace,
            track,
            fps,
        } => {
            let mut params = json!({
                "path": cut_list.to_string_lossy(),
                "insert_placeholder_composition": placeholders,
                "on_existing": if *replace { "replace" } else { "fail" },
            });
            if let Some(track) = track {
                params["track_index"] = json!(track);
            }
            if let Some(fps) = fps {
                params["fps"] = json!(fps);
            }
            ("build_timeline".to_string(), params)
        }
        Commands::Run { name, params } => {
            let params = match params.as_deref() {
                None => json!({}),
                Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                    eprintln!("Error: params are not valid JSON: {e}");
                    process::exit(2);
                }),
            };
            (name.clone(), params)
        }
        // Handled before state is built.
        Commands::Tools { .. } | Commands::Config { .. } => (String::new(), Value::Null),
    }
}

// ── Output formatting ────────────────────────────────────────────

fn print_output(output: &CommandOutput, raw_json: bool) {
    if raw_json {
        let json = json!({
            "message": output.message,
            "result": output.result,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    println!("{}", output.message);

    // Data commands also print the data, unless it is the message itself.
    let result_json = serde_json::to_value(&output.result).unwrap_or(Value::Null);
    if let Some(data) = result_json.get("data") {
        match data {
            Value::Null | Value::String(_) => {}
            Value::Array(_) | Value::Object(_) => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
            other => println!("{other}"),
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    logging::init("warn");
    let cli = Cli::parse();

    if let Commands::Tools { topic } = &cli.command {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&catalog::to_json_schema()).unwrap_or_default()
            );
        } else {
            println!("{}", catalog::help_text(topic.as_deref()));
        }
        return;
    }

    if let Commands::Config { save } = &cli.command {
        let app_config_dir = cli
            .config_dir
            .clone()
            .unwrap_or_else(paths::default_app_config_dir);
        let effective = settings::load_effective(&app_config_dir);
        println!("{}", serde_json::to_string_pretty(&effective).unwrap_or_default());
        if *save {
            if let Err(e) = settings::save_settings(&app_config_dir, &effective) {
                let err = AppError::SettingsSaveError {
                    message: e.to_string(),
                };
                eprintln!("Error: {err}");
                process::exit(1);
            }
            eprintln!(
                "Saved to {}",
                paths::settings_path(&app_config_dir).display()
            );
        }
        return;
    }

    let state = initialize_state(cli.config_dir, cli.demo);
    let (name, params) = tool_call(&cli.command);

    match execute_tool_call(&state, "cli", &name, &params) {
        Ok(output) => print_output(&output, cli.json),
        Err(e) => {
            if cli.json {
                let body = json!({ "error": e, "message": e.to_string() });
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            } else {
                eprintln!("Error: {e}");
            }
            process::exit(1);
        }
    }
}
