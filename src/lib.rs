pub mod cli;
pub mod editor;
pub mod model;
pub mod processor;
pub mod project;
pub mod workspace;
pub mod writer;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::Command;
use model::Locale;
use processor::{BuildOptions, Phase, PlayerEvent};
use project::Project;
use workspace::{BuildReport, Workspace};

pub fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.verbose);

    let temp = args
        .temp
        .unwrap_or_else(|| std::env::temp_dir().join("zeile"));
    let workspace = Workspace::new(args.derived_data, temp);

    match args.command {
        Command::New { name, dir, locale } => {
            let project = Project::create(&dir, &name, locale)
                .with_context(|| format!("Creating project {name}"))?;
            println!("{}", project.root().display());
        }
        Command::Build { project } => {
            let project = load_project(&project)?;
            let report = workspace.build(&project)?;
            finish_build(&report)?;
        }
        Command::Check {
            file,
            preceding,
            locale,
            assets,
        } => check(&file, &preceding, locale, assets)?,
        Command::Pack { project, output } => {
            let project = load_project(&project)?;
            let report = workspace.pack(&project, &output)?;
            finish_build(&report)?;
        }
        Command::Extract { archive, output } => {
            let bytes =
                std::fs::read(&archive).with_context(|| format!("Reading {}", archive.display()))?;
            writer::archive::extract(&bytes, &output)
                .with_context(|| format!("Extracting {}", archive.display()))?;
            println!("{}", output.display());
        }
        Command::Play {
            story,
            assets,
            choose,
        } => {
            let mut opened = workspace
                .open_story(&story)
                .with_context(|| format!("Opening {}", story.display()))?;
            if let Some(assets) = assets {
                opened = opened.with_asset_root(assets);
            }
            play(opened.player(), choose)?;
        }
        Command::Dump { story, out } => {
            let ir = writer::bin::load(&story)?;
            match out {
                Some(dir) => {
                    for path in workspace::export_debug(&ir, &dir)? {
                        println!("{}", path.display());
                    }
                }
                None => print!("{}", writer::text::plain_text(&ir)),
            }
        }
        Command::Complete {
            file,
            index,
            locale,
            assets,
        } => {
            let code = read_source(&file)?;
            let items = processor::complete_code(&code, index, locale, assets.as_deref());
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("ZEILE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_project(path: &Path) -> anyhow::Result<Project> {
    Project::load(path).with_context(|| format!("Loading project {}", path.display()))
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn finish_build(report: &BuildReport) -> anyhow::Result<()> {
    for (file, diagnostic) in report.diagnostics.iter() {
        println!("{file}:{diagnostic}");
    }
    match &report.output {
        Some(output) => {
            println!("{}", output.display());
            Ok(())
        }
        None => bail!(
            "build of {} failed with {} error(s)",
            report.project,
            report.errors()
        ),
    }
}

fn check(
    file: &Path,
    preceding: &[PathBuf],
    locale: Locale,
    assets: Option<PathBuf>,
) -> anyhow::Result<()> {
    let before: Vec<(String, String)> = preceding
        .iter()
        .map(|p| Ok((file_label(p), read_source(p)?)))
        .collect::<anyhow::Result<_>>()?;
    let phases: Vec<Phase> = before.iter().map(|(n, s)| Phase::new(n, s)).collect();
    let source = read_source(file)?;

    let mut options = BuildOptions::for_locale(locale);
    options.asset_folder = assets;
    let diagnostics = processor::generate_diagnostics(&phases, &source, &options);

    let label = file_label(file);
    for diagnostic in &diagnostics {
        println!("{label}:{diagnostic}");
    }
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity.is_blocking())
        .count();
    if errors > 0 {
        bail!("{label}: {errors} error(s)");
    }
    Ok(())
}

fn play(mut player: processor::Player, answers: Vec<usize>) -> anyhow::Result<()> {
    let mut answers = answers.into_iter();
    let mut stdin = io::stdin().lock().lines();
    loop {
        let event = player.advance()?;
        debug!(?event, "player event");
        match event {
            PlayerEvent::Dialogue { speaker, text } => println!("{speaker}: {text}"),
            PlayerEvent::Narration { text } => println!("{text}"),
            PlayerEvent::Background { image } => println!("[background {}]", image.display_path()),
            PlayerEvent::Music { track } => println!("[music {}]", track.display_path()),
            PlayerEvent::Wait { milliseconds } => println!("[wait {milliseconds}ms]"),
            PlayerEvent::Show {
                character,
                model,
                position,
            } => match model {
                Some(model) => println!(
                    "[show {character} at {} as {}]",
                    position.name(),
                    model.display_path()
                ),
                None => println!("[show {character} at {}]", position.name()),
            },
            PlayerEvent::Hide { character } => println!("[hide {character}]"),
            PlayerEvent::Motion { character, motion } => {
                println!("[{character} motion {}]", motion.display_path())
            }
            PlayerEvent::Expression {
                character,
                expression,
            } => println!("[{character} expression {}]", expression.display_path()),
            PlayerEvent::Choice { options } => {
                for (i, option) in options.iter().enumerate() {
                    println!("  {i}) {option}");
                }
                let index = match answers.next() {
                    Some(index) => index,
                    None => {
                        let line = stdin
                            .next()
                            .ok_or_else(|| anyhow!("input ended at a choice"))??;
                        line.trim()
                            .parse()
                            .with_context(|| format!("'{}' is not a choice number", line.trim()))?
                    }
                };
                player.choose(index)?;
            }
            PlayerEvent::Finished => return Ok(()),
        }
    }
}
