use rag_evaluator::api;
use rag_evaluator::commands::{CommandFlow, CommandHandler};
use rag_evaluator::config::{setup_env, AppConfig, AzureOpenAIConfig};
use rag_evaluator::database::Database;
use rag_evaluator::session::EvalSession;
use std::net::SocketAddr;
use std::path::PathBuf;
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use rustyline::history::DefaultHistory;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Auto-evaluate retrieval-augmented QA over a PDF", long_about = None)]
struct Args {
    /// Serve the HTTP API instead of the terminal UI
    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "3000")]
    port: u16,

    /// Azure OpenAI configuration file, relative to the work dir
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Directory holding key.txt, uploads and indexes
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// SQLite file for evaluation history
    #[arg(long, default_value = "data/evaluator.db")]
    db: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize colored output
    colored::control::set_override(true);

    // Parse command line arguments
    let args = Args::parse();

    if args.api {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    // Load key.txt / .env before reading the config
    setup_env(&args.work_dir)?;

    let config_path = args.work_dir.join(&args.config);
    let openai = AzureOpenAIConfig::load(&config_path)?;
    let config = AppConfig::new(openai, args.work_dir.clone());

    let db = Database::new(args.work_dir.join(&args.db)).await?;
    let session = EvalSession::new(config).with_database(db);

    if args.api {
        run_api_server(&args, session).await
    } else {
        run_cli_mode(session).await
    }
}

async fn run_cli_mode(session: EvalSession) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut command_handler = CommandHandler::new(session);

    // Show initial help menu
    command_handler.handle_command("help").await?;

    // Initialize rustyline editor
    let mut rl = Editor::<(), DefaultHistory>::new()?;

    // Main input loop
    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let input = line.trim();
                let _ = rl.add_history_entry(input);

                match command_handler.handle_command(input).await {
                    Ok(CommandFlow::Exit) => break,
                    Ok(CommandFlow::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_api_server(args: &Args, session: EvalSession) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("Starting API server on {}", addr);

    let app = api::create_api(session);

    let listener = TcpListener::bind(&addr).await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!("Ready to accept connections on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}
