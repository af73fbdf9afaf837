//! Rusty Circuit CLI
//!
//! Runs a sketch against a circuit, prints the host script a sketch
//! transpiles to, or grades a submitted event log.

use clap::{Parser, Subcommand};
use rusty_circuit::console::{ConsoleApp, ConsoleConfig};
use rusty_circuit::event::{LogRecord, SessionMessage, SessionOutput};
use rusty_circuit::sketch::transpile;
use rusty_circuit::{grade, init_logging, CircuitDescription, EngineConfig, GradeRequest, Simulator};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::info;

#[derive(Parser)]
#[command(name = "rusty_circuit")]
#[command(about = "Breadboard circuit simulator and behavior grader")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sketch against a circuit
    Run {
        /// Circuit description (JSON)
        #[arg(long)]
        circuit: PathBuf,

        /// Sketch source file
        #[arg(long)]
        sketch: PathBuf,

        /// Print records as JSON lines instead of opening the console view
        #[arg(long)]
        headless: bool,

        /// Stop the session after this many milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Write the collected raw log here (usable as grading input)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the host script a sketch transpiles to
    Transpile {
        /// Sketch source file
        sketch: PathBuf,
    },

    /// Grade a submitted log against an expected one
    Grade {
        /// Expected events (canonical or raw, JSON array)
        #[arg(long)]
        expected: PathBuf,

        /// Submitted raw log (JSON array)
        #[arg(long)]
        submitted: PathBuf,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(EngineConfig::from_json_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn read_json(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Print records as JSON lines until the session ends, the duration runs
/// out or Ctrl+C is pressed.
async fn run_headless(
    simulator: &Simulator,
    key: &rusty_circuit::SessionKey,
    messages: &mut mpsc::UnboundedReceiver<SessionMessage>,
    duration: Option<Duration>,
) -> Result<Vec<LogRecord>, Box<dyn std::error::Error>> {
    let mut history = Vec::new();
    let deadline = duration.map(|d| Instant::now() + d);
    let expired = async {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expired);

    loop {
        tokio::select! {
            _ = &mut expired => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            message = messages.recv() => match message {
                Some(message) => {
                    let finished = message.output == SessionOutput::Finished;
                    println!("{}", serde_json::to_string(&message)?);
                    if let SessionOutput::Record(record) = message.output {
                        history.push(record);
                    }
                    if finished {
                        return Ok(history);
                    }
                }
                None => return Ok(history),
            },
        }
    }

    simulator.stop(key).await;
    while let Ok(message) = messages.try_recv() {
        println!("{}", serde_json::to_string(&message)?);
        if let SessionOutput::Record(record) = message.output {
            history.push(record);
        }
    }
    Ok(history)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            circuit,
            sketch,
            headless,
            duration_ms,
            output,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            // The console owns the terminal; only warnings go to stderr there.
            init_logging(if headless { config.log_level.as_str() } else { "warn" });

            let description = CircuitDescription::from_json_file(&circuit)?;
            let source = fs::read_to_string(&sketch)
                .map_err(|e| format!("Failed to read {}: {}", sketch.display(), e))?;
            let key = rusty_circuit::SessionKey::from("cli");
            let duration = duration_ms.map(Duration::from_millis);

            let (simulator, mut messages) = Simulator::new(config);
            if let Err(e) = simulator.start(key.clone(), &description, &source) {
                eprintln!("Failed to start session: {}", e);
                return Ok(ExitCode::FAILURE);
            }

            let history = if headless {
                run_headless(&simulator, &key, &mut messages, duration).await?
            } else {
                let mut app = ConsoleApp::new(
                    simulator.clone(),
                    key.clone(),
                    &description,
                    ConsoleConfig::default(),
                );
                app.run(messages, duration).await?;
                app.history().to_vec()
            };

            if let Some(path) = output {
                fs::write(&path, serde_json::to_string_pretty(&history)?)
                    .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
                info!("wrote {} records to {}", history.len(), path.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Transpile { sketch } => {
            let source = fs::read_to_string(&sketch)
                .map_err(|e| format!("Failed to read {}: {}", sketch.display(), e))?;
            print!("{}", transpile(&source));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Grade {
            expected,
            submitted,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(&config.log_level);

            let request = GradeRequest {
                expected_canonical: read_json(&expected)?,
                submitted_raw: read_json(&submitted)?,
            };
            let response = grade(&request, &config);
            println!("{}", serde_json::to_string(&response)?);
            Ok(if response.pass {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
