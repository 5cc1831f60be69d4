use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use slidecast_core::{
    Backend, ConcatOutcome, Ffmpeg, GlobalConfig, KeyPool, Language, LocalBackend, RemoteBackend,
    RemoteConfig, SlidecastError, SplitStrategy, Synthesizer, TrackSpec, build_video,
    config_path, format_batch_report, format_duration, format_track_report, generate_narration,
    get_deck_path, get_language_dir, load_config, run_track, run_tracks, save_config,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// CLI wrapper for Language (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliLanguage {
    Ja,
    En,
}

impl From<CliLanguage> for Language {
    fn from(cli: CliLanguage) -> Self {
        match cli {
            CliLanguage::Ja => Language::Ja,
            CliLanguage::En => Language::En,
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum CliSplit {
    #[default]
    Structural,
    Lines,
}

impl From<CliSplit> for SplitStrategy {
    fn from(cli: CliSplit) -> Self {
        match cli {
            CliSplit::Structural => SplitStrategy::Structural,
            CliSplit::Lines => SplitStrategy::Lines,
        }
    }
}

#[derive(Parser)]
#[command(name = "slidecast")]
#[command(about = "Turn markdown slide decks with speaker notes into narrated videos")]
struct Cli {
    /// Increase log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct TtsArgs {
    /// Use the remote generative TTS API instead of the local service
    #[arg(long)]
    remote: bool,

    /// Local TTS service URL (defaults to KOKOVOX_URL or http://localhost:5108)
    #[arg(long)]
    tts_url: Option<String>,

    /// How slide boundaries are found in the markdown
    #[arg(long, value_enum, default_value = "structural")]
    split: CliSplit,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize one audio file per slide from speaker notes
    Tts {
        /// Markdown deck
        file: PathBuf,

        #[arg(short, long, value_enum)]
        lang: CliLanguage,

        /// Output directory (defaults to the deck's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        tts: TtsArgs,
    },

    /// Encode per-slide clips and the combined video for each language
    Video {
        #[arg(short, long, value_enum, value_delimiter = ',', default_values = ["ja", "en"])]
        lang: Vec<CliLanguage>,

        /// Root of the rendered slide images, one `<lang>` directory each
        #[arg(long, default_value = "dist")]
        slides: PathBuf,

        /// Root of the narration audio, one `<lang>` directory each
        #[arg(long, default_value = "dist")]
        audio: PathBuf,

        /// Root of the clips and combined videos, one `<lang>` directory each
        #[arg(short, long, default_value = "dist")]
        output: PathBuf,
    },

    /// Narration, clips and combined video from `slide-<lang>.md`
    Build {
        #[arg(short, long, value_enum, value_delimiter = ',', default_values = ["ja", "en"])]
        lang: Vec<CliLanguage>,

        /// Directory holding the `slide-<lang>.md` decks
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Output root, one `<lang>` directory each
        #[arg(long, default_value = "dist")]
        dist: PathBuf,

        #[command(flatten)]
        tts: TtsArgs,
    },

    /// Manage the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyField {
    ApiKey,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListField {
    ApiKeys,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file location
    Path,
    /// Replace all saved API keys with one key
    Set {
        #[arg(value_enum)]
        field: KeyField,
        value: String,
    },
    /// Add an API key for rotation
    Add {
        #[arg(value_enum)]
        field: KeyField,
        value: String,
    },
    /// Show saved API keys, masked
    List {
        #[arg(value_enum)]
        field: ListField,
    },
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancel the token on Ctrl+C. Running encoder processes finish on their own.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} Cancelling...", style("!").yellow().bold());
            token.cancel();
        }
    });
    cancel
}

async fn create_backend(args: &TtsArgs) -> Result<Backend> {
    if args.remote {
        let config = load_config().await?;
        let pool = KeyPool::from_env(&config)?;
        Ok(Backend::Remote(RemoteBackend::new(
            Arc::new(pool),
            RemoteConfig::default(),
        )))
    } else {
        let backend = match &args.tts_url {
            Some(url) => LocalBackend::new(url.clone()),
            None => LocalBackend::from_env(),
        };
        Ok(Backend::Local(backend))
    }
}

async fn prepare_backend(backend: &Backend, cancel: &CancellationToken) -> Result<()> {
    let step_start = Instant::now();
    let spinner = create_spinner(&format!("Checking {} TTS backend...", backend.name()));
    let result = backend.prepare(cancel).await;
    spinner.finish_and_clear();
    result?;
    println!(
        "{} TTS backend ready ({}) {}",
        style("✓").green().bold(),
        backend.name(),
        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
    );
    Ok(())
}

async fn run_tts(
    file: PathBuf,
    lang: CliLanguage,
    output: Option<PathBuf>,
    args: TtsArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let language: Language = lang.into();
    let output_dir = output.unwrap_or_else(|| match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    });

    println!("{} {}", style("Deck:").dim(), file.display());
    println!("{} {}", style("Output:").dim(), output_dir.display());

    let backend = create_backend(&args).await?;
    prepare_backend(&backend, &cancel).await?;

    let step_start = Instant::now();
    let spinner = create_spinner(&format!("Synthesizing {} narration...", language));
    let result = generate_narration(
        &backend,
        &file,
        &output_dir,
        language,
        args.split.into(),
        &cancel,
    )
    .await;
    spinner.finish_and_clear();
    let report = result?;

    println!(
        "{} Narration generated {}",
        style("✓").green().bold(),
        style(format!("[{}]", format_duration(step_start.elapsed()))).dim()
    );
    print!("{}", format_batch_report("Audio", &report));
    Ok(())
}

async fn run_video(
    languages: Vec<Language>,
    slides: PathBuf,
    audio: PathBuf,
    output: PathBuf,
    cancel: CancellationToken,
) -> Result<()> {
    let media = Ffmpeg::from_env();
    let (media, slides, audio, output, cancel) = (&media, &slides, &audio, &output, &cancel);

    let step_start = Instant::now();
    let spinner = create_spinner("Encoding clips...");
    let result = run_tracks(&languages, |language| async move {
        let (clips, combined) = build_video(
            media,
            &get_language_dir(slides, language),
            &get_language_dir(audio, language),
            &get_language_dir(output, language),
            language,
            cancel,
        )
        .await?;
        Ok::<_, SlidecastError>((language, clips, combined))
    })
    .await;
    spinner.finish_and_clear();

    for (language, clips, combined) in result? {
        println!("{}", style(format!("[{}]", language)).cyan().bold());
        print!("{}", format_batch_report("Clips", &clips));
        match combined {
            ConcatOutcome::Created(path) => println!(
                "{} Video: {}",
                style("✓").green().bold(),
                style(path.display()).cyan()
            ),
            ConcatOutcome::Skipped => println!("{}", style("Video: skipped (no clips)").dim()),
        }
    }

    println!(
        "\n{} {}",
        style("Total time:").dim(),
        style(format_duration(step_start.elapsed())).cyan().bold()
    );
    Ok(())
}

async fn run_build(
    languages: Vec<Language>,
    root: PathBuf,
    dist: PathBuf,
    args: TtsArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let backend = create_backend(&args).await?;
    prepare_backend(&backend, &cancel).await?;

    let media = Ffmpeg::from_env();
    let strategy: SplitStrategy = args.split.into();
    let (backend, media, root, dist, cancel) = (&backend, &media, &root, &dist, &cancel);

    let step_start = Instant::now();
    let spinner = create_spinner(&format!("Building {} track(s)...", languages.len()));
    let result = run_tracks(&languages, |language| {
        let output_dir = get_language_dir(dist, language);
        let spec = TrackSpec {
            language,
            deck: get_deck_path(root, language),
            slides_dir: output_dir.clone(),
            output_dir,
            strategy,
        };
        async move { run_track(backend, media, &spec, cancel).await }
    })
    .await;
    spinner.finish_and_clear();

    for report in result? {
        print!("{}", format_track_report(&report));
    }

    println!(
        "\n{} {}",
        style("Total time:").dim(),
        style(format_duration(step_start.elapsed())).cyan().bold()
    );
    Ok(())
}

async fn run_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", config_path().display()),
        ConfigAction::Set {
            field: KeyField::ApiKey,
            value,
        } => {
            let mut config = load_config().await?;
            config.set_api_key(&value)?;
            let path = save_config(&config).await?;
            println!("{} API key saved to {}", style("✓").green().bold(), path.display());
        }
        ConfigAction::Add {
            field: KeyField::ApiKey,
            value,
        } => {
            let mut config = load_config().await?;
            config.add_api_key(&value)?;
            let path = save_config(&config).await?;
            println!(
                "{} API key added ({} total) to {}",
                style("✓").green().bold(),
                config.google_api_keys.len(),
                path.display()
            );
        }
        ConfigAction::List {
            field: ListField::ApiKeys,
        } => print_keys(&load_config().await?),
    }
    Ok(())
}

fn print_keys(config: &GlobalConfig) {
    let masked = config.masked_keys();
    if masked.is_empty() {
        println!("{}", style("No API keys saved").dim());
        return;
    }
    for (i, key) in masked.iter().enumerate() {
        println!("{:>2}. {}", i + 1, key);
    }
}

fn dedup_languages(lang: Vec<CliLanguage>) -> Vec<Language> {
    let mut languages: Vec<Language> = Vec::new();
    for language in lang.into_iter().map(Language::from) {
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    languages
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();
    init_tracing(cli.verbose);

    if let Err(e) = dotenv
        && !e.not_found()
    {
        tracing::warn!(error = %e, "Failed to load .env");
    }

    if !matches!(cli.command, Command::Config { .. }) {
        println!(
            "\n{}  {}\n",
            style("slidecast").cyan().bold(),
            style("Narrated slide videos").dim()
        );
    }

    let cancel = cancel_on_ctrl_c();
    let result = match cli.command {
        Command::Tts {
            file,
            lang,
            output,
            tts,
        } => run_tts(file, lang, output, tts, cancel).await,
        Command::Video {
            lang,
            slides,
            audio,
            output,
        } => run_video(dedup_languages(lang), slides, audio, output, cancel).await,
        Command::Build {
            lang,
            root,
            dist,
            tts,
        } => run_build(dedup_languages(lang), root, dist, tts, cancel).await,
        Command::Config { action } => run_config(action)
            .await
            .with_context(|| format!("config file: {}", config_path().display())),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
