use anyhow::{bail, Context, Result};
use boxrun_core::config::{load_settings, SandboxSettings, SettingsLoader};
use boxrun_core::runtimes::profile::builtin_profiles;
use boxrun_core::tools::render_result;
use boxrun_core::{ContainerLifecycleManager, DefaultRuntimes, RuntimeRegistry};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(name = "boxrun", author, version = "0.1.0", about = "Run untrusted code in disposable sandbox containers")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, global = true, help = "Sandbox settings file (YAML)")]
    config: Option<PathBuf>,

    #[clap(long, short, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a source file in a sandbox
    Run {
        /// Source file to execute
        file: PathBuf,

        #[clap(long, help = "Language runtime (inferred from the file extension if omitted)")]
        language: Option<String>,

        #[clap(long, help = "Timeout in seconds (1-300)")]
        timeout: Option<u64>,

        #[clap(long, help = "Test file to run against the source with the language's test harness")]
        tests: Option<PathBuf>,

        #[clap(long, help = "Print the full execution result as JSON")]
        json: bool,
    },
    /// List registered language runtimes
    Languages,
    /// Show container engine status
    Status,
    /// Build the execution images ahead of the first run
    Prepare {
        #[clap(long, help = "Only prepare this language's image")]
        language: Option<String>,

        #[clap(long, help = "Rebuild even if a current image exists")]
        force: bool,
    },
    /// Remove containers left behind by earlier runs
    Cleanup {
        #[clap(long, help = "Only remove containers created from this image")]
        image: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results only.
    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Warn);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .target(env_logger::Target::Stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => load_settings(path)
            .await
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => SettingsLoader::from_env().context("Invalid sandbox settings in environment")?,
    };

    let manager = Arc::new(
        ContainerLifecycleManager::connect(&settings).context("Failed to connect to the container engine")?,
    );

    match cli.command {
        Commands::Run {
            file,
            language,
            timeout,
            tests,
            json,
        } => {
            let registry = DefaultRuntimes::create_registry(manager, &settings)?;
            let success = run_file(&registry, &file, language, timeout, tests, json).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Languages => list_languages(manager, &settings),
        Commands::Status => show_status(&manager).await,
        Commands::Prepare { language, force } => prepare_images(&manager, &settings, language, force).await,
        Commands::Cleanup { image } => {
            let removed = manager.cleanup_stale_containers(image.as_deref()).await?;
            println!("Removed {} stale container(s)", removed);
            Ok(())
        }
    }
}

fn infer_language(file: &Path) -> Option<&'static str> {
    match file.extension()?.to_str()? {
        "py" => Some("python"),
        "js" | "mjs" | "cjs" => Some("javascript"),
        _ => None,
    }
}

async fn run_file(
    registry: &RuntimeRegistry,
    file: &Path,
    language: Option<String>,
    timeout: Option<u64>,
    tests: Option<PathBuf>,
    json: bool,
) -> Result<bool> {
    let language = match language {
        Some(language) => language,
        None => match infer_language(file) {
            Some(language) => language.to_string(),
            None => bail!(
                "Cannot infer the language of {}; pass --language ({})",
                file.display(),
                registry.languages().join(", ")
            ),
        },
    };

    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let runtime = registry.resolve(&language)?;

    let result = match tests {
        Some(tests_path) => {
            if timeout.is_some() {
                log::warn!("--timeout is ignored with --tests; the runtime timeout applies");
            }
            let test_code = tokio::fs::read_to_string(&tests_path)
                .await
                .with_context(|| format!("Failed to read {}", tests_path.display()))?;
            runtime.run_with_tests(&code, &test_code).await
        }
        None => runtime.run(&code, timeout).await,
    };

    let result = match result {
        Ok(result) => result,
        Err(e) if e.is_request_error() => bail!("{}", e.user_message()),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let effective_timeout = timeout.unwrap_or_else(|| runtime.config().timeout_seconds());
        println!("{}", render_result(&result, effective_timeout));
    }
    Ok(result.success)
}

fn list_languages(manager: Arc<ContainerLifecycleManager>, settings: &SandboxSettings) -> Result<()> {
    let registry = DefaultRuntimes::create_registry(manager, settings)?;
    for language in registry.languages() {
        let runtime = registry.resolve(&language)?;
        let config = runtime.config();
        println!(
            "{:<12} image={} timeout={}s memory={} network={}",
            language,
            config.image(),
            config.timeout_seconds(),
            config.memory_limit(),
            if config.network_enabled() { "bridge" } else { "none" }
        );
    }
    Ok(())
}

async fn show_status(manager: &ContainerLifecycleManager) -> Result<()> {
    if !manager.is_available().await {
        println!("Container engine: unavailable");
        std::process::exit(1);
    }

    let stats = manager.engine_stats().await?;
    println!("Container engine: available");
    println!("Seccomp profile:  {}", manager.policy().seccomp_profile_path().display());
    println!("Containers:       {} running, {} stopped", stats.containers_running, stats.containers_stopped);
    println!("Images:           {}", stats.images);
    println!("CPUs:             {}", stats.cpus);
    println!("Memory:           {} MiB", stats.memory_total / (1024 * 1024));

    let images = manager.list_images(None).await?;
    if images.is_empty() {
        println!("Sandbox images:   none built yet");
    } else {
        println!("Sandbox images:   {}", images.join(", "));
    }
    Ok(())
}

async fn prepare_images(
    manager: &ContainerLifecycleManager,
    settings: &SandboxSettings,
    language: Option<String>,
    force: bool,
) -> Result<()> {
    let profiles: Vec<_> = builtin_profiles()
        .iter()
        .filter(|profile| language.as_deref().map_or(true, |language| profile.language == language))
        .collect();
    if profiles.is_empty() {
        bail!("Unsupported language: {}", language.unwrap_or_default());
    }

    for profile in profiles {
        let config = settings.runtime_config(profile)?;
        // Overridden images have no trusted definition and are only checked.
        let definition = (config.image() == profile.image).then_some(&profile.image_definition);
        manager
            .ensure_image(config.image(), definition, force)
            .await
            .with_context(|| format!("Failed to prepare image {}", config.image()))?;
        println!("{:<12} {}", profile.language, config.image());
    }
    Ok(())
}
