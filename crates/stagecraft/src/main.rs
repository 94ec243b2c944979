mod fetch;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, error::ErrorKind};
use clap_complete::{
    generate,
    shells::{Bash, Fish, Zsh},
};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use stagecraft_core::Error;
use stagecraft_core::compile::compile_all;
use stagecraft_core::context::{LocalContext, StaticCredentials};
use stagecraft_core::diagnostics::TracingDiagnostics;
use stagecraft_core::exit_code::ExitCode;
use stagecraft_core::overlay::{OverlaySource, apply as apply_overlay};
use stagecraft_core::reverse::reverse;
use stagecraft_core::spec::Specification;

use crate::fetch::HttpFetch;

const LONG_ABOUT: &str = "Compile YAML build specifications into multi-stage Dockerfiles, reverse-compile Dockerfiles into specifications, and merge environment overlays into a specification.\n\nBuild file paths and generated YAML go to stdout; logs go to stderr.";

const AFTER_HELP: &str = "Examples:\n  stagecraft compile -f build.yaml\n  stagecraft compile -f build.yaml --overlay prod.yaml --context ./app\n  stagecraft reverse -f Dockerfile --image acme/app --tag 1.0\n  stagecraft overlay -f build.yaml --overlay prod.yaml\n  STAGECRAFT_LOG_LEVEL=debug stagecraft compile -f build.yaml";

fn main() {
    let code = match run() {
        Ok(()) => ExitCode::Success,
        Err(app_error) => {
            if !app_error.message.is_empty() {
                eprintln!("{}", app_error.message);
            }
            app_error.code
        }
    };
    std::process::exit(code.as_i32());
}

#[derive(Debug)]
struct AppError {
    code: ExitCode,
    message: String,
}

impl AppError {
    fn usage(message: impl Into<String>) -> Self {
        Self {
            code: ExitCode::Usage,
            message: message.into(),
        }
    }
}

impl From<Error> for AppError {
    fn from(value: Error) -> Self {
        Self {
            code: ExitCode::from(&value),
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Compile a specification into one Dockerfile per build step")]
    Compile {
        #[arg(
            short = 'f',
            long = "file",
            env = "STAGECRAFT_FILE",
            value_name = "PATH",
            help = "Specification to compile"
        )]
        file: PathBuf,

        #[arg(
            long = "overlay",
            env = "STAGECRAFT_OVERLAY",
            value_name = "PATH",
            help = "Overlay merged into the specification first",
            long_help = "Overlay merged into the specification before compiling. Sequence items labelled with metadata.labels.overlay are matched against the base item carrying the same label."
        )]
        overlay: Option<PathBuf>,

        #[arg(
            long = "context",
            env = "STAGECRAFT_CONTEXT",
            value_name = "DIR",
            default_value = ".",
            help = "Build context directory",
            long_help = "Build context directory. Path steps are resolved against it and generated Dockerfile.* files are written into it."
        )]
        context: PathBuf,
    },

    #[command(about = "Reverse-compile a Dockerfile into a specification")]
    Reverse {
        #[arg(
            short = 'f',
            long = "file",
            value_name = "PATH",
            help = "Read the Dockerfile from a file path",
            long_help = "Read the Dockerfile from PATH. If omitted, ./Dockerfile is used."
        )]
        file: Option<PathBuf>,

        #[arg(
            long = "stdin",
            conflicts_with = "file",
            help = "Read the Dockerfile from stdin"
        )]
        stdin: bool,

        #[arg(long = "image", value_name = "NAME", help = "Image name of the build step")]
        image: String,

        #[arg(
            long = "tag",
            value_name = "TAG",
            default_value = "",
            help = "Image tag of the build step"
        )]
        tag: String,
    },

    #[command(about = "Merge an overlay into a specification and print the result")]
    Overlay {
        #[arg(
            short = 'f',
            long = "file",
            env = "STAGECRAFT_FILE",
            value_name = "PATH",
            help = "Base specification"
        )]
        file: PathBuf,

        #[arg(
            long = "overlay",
            env = "STAGECRAFT_OVERLAY",
            value_name = "PATH",
            help = "Overlay to merge"
        )]
        overlay: PathBuf,
    },

    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum, value_name = "SHELL")]
        shell: CompletionShell,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Debug, Parser)]
#[command(
    name = "stagecraft",
    version,
    about = "Compile build specifications into Dockerfiles and back",
    long_about = LONG_ABOUT,
    after_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Print debug details to stderr",
        long_help = "Log at debug level to stderr, including every resolved stage and written build file. Ignored when --log-level or RUST_LOG is set."
    )]
    verbose: bool,

    #[arg(
        long = "log-level",
        env = "STAGECRAFT_LOG_LEVEL",
        global = true,
        value_name = "LEVEL",
        help = "Log level: trace, debug, info, warn or error"
    )]
    log_level: Option<String>,
}

fn run() -> Result<(), AppError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                print!("{err}");
                return Ok(());
            }
            return Err(AppError::usage(err.to_string()));
        }
    };

    init_logging(&cli)?;
    execute(cli.command)
}

fn init_logging(cli: &Cli) -> Result<(), AppError> {
    let level = match (&cli.log_level, cli.verbose) {
        (Some(level), _) => parse_level(level)?,
        (None, true) => Level::DEBUG,
        (None, false) => Level::WARN,
    };

    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        let level = level.as_str().to_ascii_lowercase();
        EnvFilter::new(format!(
            "stagecraft={level},stagecraft_core={level},reqwest=warn"
        ))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn parse_level(input: &str) -> Result<Level, AppError> {
    match input.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(AppError::usage(format!(
            "invalid log level '{input}'; valid levels: trace, debug, info, warn, error"
        ))),
    }
}

fn execute(command: Commands) -> Result<(), AppError> {
    match command {
        Commands::Compile {
            file,
            overlay,
            context,
        } => compile(&file, overlay.as_deref(), context),
        Commands::Reverse {
            file,
            stdin,
            image,
            tag,
        } => reverse_dockerfile(file.as_deref(), stdin, &image, &tag),
        Commands::Overlay { file, overlay } => {
            let merged = merge_overlay(&file, &overlay)?;
            write_stdout(&merged)
        }
        Commands::Completion { shell } => write_completion(shell),
    }
}

fn compile(file: &Path, overlay: Option<&Path>, context: PathBuf) -> Result<(), AppError> {
    let text = match overlay {
        Some(overlay) => merge_overlay(file, overlay)?,
        None => std::fs::read_to_string(file).map_err(Error::from)?,
    };
    let spec = Specification::from_yaml(&text)?;
    tracing::debug!(
        steps = spec.steps.len(),
        templates = spec.templates.len(),
        "loaded specification"
    );

    let fetcher = HttpFetch::new(StaticCredentials);
    let paths = compile_all(
        &spec,
        &LocalContext::new(context),
        &fetcher,
        &TracingDiagnostics,
    )?;

    let mut out = String::new();
    for path in paths {
        out.push_str(&path.display().to_string());
        out.push('\n');
    }
    write_stdout(&out)
}

fn merge_overlay(file: &Path, overlay: &Path) -> Result<String, AppError> {
    let base = match std::fs::read(file) {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(Error::from(err).into()),
    };
    let source = OverlaySource::from_path(overlay)?;
    tracing::debug!(overlay = %overlay.display(), "applying overlay");
    Ok(apply_overlay(base.as_deref(), &source)?)
}

fn reverse_dockerfile(
    file: Option<&Path>,
    stdin: bool,
    image: &str,
    tag: &str,
) -> Result<(), AppError> {
    if image.trim().is_empty() {
        return Err(AppError::usage("--image cannot be empty"));
    }

    let input = if stdin {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .map_err(Error::from)?;
        input
    } else {
        let path = file.unwrap_or(Path::new("Dockerfile"));
        std::fs::read_to_string(path).map_err(Error::from)?
    };

    let yaml = reverse(&input, image, tag, &TracingDiagnostics)?;
    write_stdout(&yaml)
}

fn write_stdout(text: &str) -> Result<(), AppError> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes()).map_err(Error::from)?;
    stdout.flush().map_err(Error::from)?;
    Ok(())
}

fn write_completion(shell: CompletionShell) -> Result<(), AppError> {
    let mut command = Cli::command();
    let mut stdout = std::io::stdout().lock();
    match shell {
        CompletionShell::Bash => generate(Bash, &mut command, "stagecraft", &mut stdout),
        CompletionShell::Zsh => generate(Zsh, &mut command, "stagecraft", &mut stdout),
        CompletionShell::Fish => generate(Fish, &mut command, "stagecraft", &mut stdout),
    }
    stdout.flush().map_err(Error::from).map_err(AppError::from)
}
