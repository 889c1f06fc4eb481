//! PodcastAI CLI - two-speaker podcast generator
//!
//! Writes a dialogue script from a topic file, then voices it and stitches
//! the clips into one episode.

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use podcastai_core::dialogue::TurnOutcome;
use podcastai_core::{
    AssemblyEvent, AudioAssembler, Config, DialogueEngine, OpenAiCompletion, OutlineGenerator,
    PodcastError, Script, ScriptEvent, Segment, create_synthesizer, markup, tts,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "podcastai",
    version,
    about = "PodcastAI - Generate two-speaker podcast episodes",
    long_about = "A CLI tool that drafts a podcast script from a topic file using OpenAI-compatible APIs and voices it with OpenAI or ElevenLabs speech."
)]
struct Cli {
    /// Configuration file (defaults to ./podcastai.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draft an outline and dialogue script from a topic file
    Write {
        /// Markdown file describing the topic
        #[arg(short, long, value_name = "FILE")]
        topic: PathBuf,

        /// Script output path (defaults to the topic file with a .ssml extension)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Seed for pauses and transitions
        #[arg(long, value_name = "N")]
        seed: Option<u64>,
    },
    /// Synthesize every utterance of a script and build the episode
    Generate {
        /// Script file (.ssml)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Speech service: openai or elevenlabs
        #[arg(short, long, value_name = "SERVICE")]
        service: Option<String>,

        #[arg(short = 'd', long, default_value = "generated", value_name = "DIR")]
        output_dir: PathBuf,
    },
    /// Rebuild the episode from clips already generated for a script
    Compile {
        /// Script file (.ssml)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[arg(short = 'd', long, default_value = "generated", value_name = "DIR")]
        output_dir: PathBuf,
    },
    /// Write the script and generate the episode in one go
    Produce {
        #[arg(short, long, value_name = "FILE")]
        topic: PathBuf,

        #[arg(short, long, value_name = "SERVICE")]
        service: Option<String>,

        #[arg(short = 'd', long, default_value = "generated", value_name = "DIR")]
        output_dir: PathBuf,

        #[arg(long, value_name = "N")]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), PodcastError> {
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Write {
            topic,
            output,
            seed,
        } => {
            let script = write_script(&config, &topic, seed).await?;
            let output = output.unwrap_or_else(|| default_script_path(&topic));
            save_script(&script, &output)?;
        }
        Command::Generate {
            input,
            service,
            output_dir,
        } => {
            generate(&config, &input, service.as_deref(), &output_dir).await?;
        }
        Command::Compile { input, output_dir } => {
            let (stem, segments) = load_script(&input)?;
            let assembler = assembler_for(&config, &output_dir, &stem);
            print_banner("Compiling", &input);
            let path = assembler.compile(&segments)?;
            print_done(&path);
        }
        Command::Produce {
            topic,
            service,
            output_dir,
            seed,
        } => {
            let script = write_script(&config, &topic, seed).await?;
            fs::create_dir_all(&output_dir)?;
            let script_path = output_dir.join(format!("{}.ssml", file_stem(&topic)));
            save_script(&script, &script_path)?;
            generate(&config, &script_path, service.as_deref(), &output_dir).await?;
        }
    }

    Ok(())
}

/// `topics/rag.md` is written to `topics/rag.ssml`.
fn default_script_path(topic: &Path) -> PathBuf {
    topic.with_extension("ssml")
}

fn read_topic(path: &Path) -> Result<String, PodcastError> {
    let content = fs::read_to_string(path).map_err(|e| PodcastError::InvalidTopic {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if content.trim().is_empty() {
        return Err(PodcastError::InvalidTopic {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    Ok(content)
}

async fn write_script(
    config: &Config,
    topic_path: &Path,
    seed: Option<u64>,
) -> Result<Script, PodcastError> {
    let topic = read_topic(topic_path)?;
    let completion =
        Arc::new(OpenAiCompletion::from_env()?.with_max_retries(config.completion_max_retries));
    let outline = OutlineGenerator::new(completion.clone(), &config.outline_model);

    print_banner("Writing", topic_path);

    let mut engine =
        DialogueEngine::from_config(completion, config, topic).with_callback(create_script_callback());
    if let Some(seed) = seed {
        engine = engine.with_seed(seed);
    }

    engine.write(&outline).await
}

fn save_script(script: &Script, path: &Path) -> Result<(), PodcastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, script.to_markup())?;
    info!(path = %path.display(), turns = script.turn_count(), "script saved");
    println!("{} {}", "Script saved to".bright_green(), path.display());
    Ok(())
}

/// Read and parse a script, rejecting anything that is not an existing `.ssml` file.
fn load_script(path: &Path) -> Result<(String, Vec<Segment>), PodcastError> {
    if path.extension().and_then(|e| e.to_str()) != Some("ssml") {
        return Err(PodcastError::InvalidScript {
            path: path.to_path_buf(),
            reason: "expected a .ssml file".to_string(),
        });
    }
    if !path.is_file() {
        return Err(PodcastError::InvalidScript {
            path: path.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }

    let segments = markup::parse(&fs::read_to_string(path)?)?;
    Ok((file_stem(path), segments))
}

async fn generate(
    config: &Config,
    input: &Path,
    service: Option<&str>,
    output_dir: &Path,
) -> Result<(), PodcastError> {
    let (stem, segments) = load_script(input)?;
    let service = service.unwrap_or(config.tts.service.as_str());
    let synthesizer = create_synthesizer(service, &config.tts)?;

    print_banner("Generating", input);
    println!(
        "{} {} ({})",
        "Service:".bold(),
        synthesizer.name().bright_white(),
        tts::available_services().join(", ").dimmed()
    );

    let assembler = assembler_for(config, output_dir, &stem);
    let path = assembler.assemble(&segments, synthesizer.as_ref()).await?;
    print_done(&path);
    Ok(())
}

fn assembler_for(config: &Config, output_dir: &Path, stem: &str) -> AudioAssembler {
    AudioAssembler::new(output_dir.join(stem), stem, config.tts.sample_rate)
        .with_format(config.tts.export_format)
        .with_callback(create_assembly_callback())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("podcast")
        .to_string()
}

fn print_banner(action: &str, path: &Path) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "PodcastAI".bold(), action)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!("{} {}", "File:".bold(), path.display().to_string().bright_white());
    println!();
}

fn print_done(path: &Path) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "  {} {}",
        "Podcast saved to".bright_green().bold(),
        path.display()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

/// Create a callback that prints script events to the console.
fn create_script_callback() -> Box<dyn Fn(ScriptEvent) + Send + Sync> {
    Box::new(move |event| match event {
        ScriptEvent::OutlineReady { outline, sections } => {
            println!("{}", format!("Outline ({} sections):", sections).bold());
            for line in outline.lines() {
                println!("  {}", line.dimmed());
            }
        }
        ScriptEvent::SectionStart { number, heading } => {
            println!();
            println!("{}", "─".repeat(70).bright_magenta());
            println!(
                "{}",
                format!("  Section {}: {}", number, heading)
                    .bright_magenta()
                    .bold()
            );
            println!("{}", "─".repeat(70).bright_magenta());
            println!();
        }
        ScriptEvent::TurnStart {
            speaker,
            global_index,
            total,
        } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                speaker.bright_cyan().bold(),
                format!("({}/{})", global_index + 1, total).dimmed()
            );
        }
        ScriptEvent::TurnComplete { outcome, .. } => {
            let wrapped = textwrap(outcome.text(), 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            if let TurnOutcome::Transitioned(_) = outcome {
                println!("  {}", "(transition: responses kept repeating)".yellow());
            }
        }
        ScriptEvent::Pause { seconds } => {
            println!("  {}", format!("[pause {:.1}s]", seconds).dimmed());
            println!();
        }
        ScriptEvent::ScriptEnd { turns } => {
            println!();
            println!("{}", format!("Script complete: {} turns.", turns).bright_green());
        }
    })
}

/// Create a callback that prints assembly progress to the console.
fn create_assembly_callback() -> Box<dyn Fn(AssemblyEvent) + Send + Sync> {
    Box::new(move |event| match event {
        AssemblyEvent::SegmentStart {
            position,
            total,
            voice,
        } => {
            print!(
                "{} {} {} ",
                "▶".bright_cyan(),
                format!("[{}/{}]", position, total).dimmed(),
                voice.bright_cyan()
            );
        }
        AssemblyEvent::ClipReady { path, seconds } => {
            println!(
                "{} {}",
                format!("{:.1}s", seconds).green(),
                path.display().to_string().dimmed()
            );
        }
        AssemblyEvent::PauseAdded { seconds } => {
            println!("  {}", format!("[pause {:.1}s]", seconds).dimmed());
        }
        AssemblyEvent::Exported { seconds, .. } => {
            println!();
            println!(
                "{}",
                format!("Episode length: {:.1}s", seconds).bright_green()
            );
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
