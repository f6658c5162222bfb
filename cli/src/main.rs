use clap::Parser;
use std::path::Path;
use taskweave_cli::commands::{self, cli, jobs};
use taskweave_cli::http;
use taskweave_core::api::{AppConfig, CliError, JobError, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    let controller = commands::build_controller(&cfg)?;

    match args.command {
        cli::Commands::Run(run_args) => jobs::handle_run(run_args, &controller).await,
        cli::Commands::Status(status_args) => jobs::handle_status(status_args, &controller).await,
        cli::Commands::Answer(answer_args) => jobs::handle_answer(answer_args, &controller).await,
        cli::Commands::Interrupt(interrupt_args) => {
            jobs::handle_interrupt(interrupt_args, &controller).await
        }
        cli::Commands::Resume(resume_args) => jobs::handle_resume(resume_args, &controller).await,
        cli::Commands::Serve(serve_args) => {
            http::handle_serve(serve_args, &cfg, controller).await?;
            Ok(0)
        }
    }
}

fn load_config(path: Option<&str>) -> Result<AppConfig, CliError> {
    let loaded = match path {
        Some(p) => taskweave_core::config::load_from_path(Path::new(p)).map(|mut cfg| {
            taskweave_core::config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
            cfg
        }),
        None => taskweave_core::config::load_default(),
    };
    loaded.map_err(|e| CliError::Config(e.to_string()))
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: succeeded, 1: job failed, 2: awaiting clarification (see commands::jobs)
    // 11: config error
    // 20: io / command error
    // 30: unknown job
    // 31: job in the wrong state for the request
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Job(je) => match je {
            JobError::NotFound(_) => 30,
            JobError::InvalidState { .. } | JobError::Disconnected(_) => 31,
            JobError::Store(_) => 20,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("taskweave"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("taskweave.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
