use clap::Parser;
use softlight_agent::browser::chrome::{ChromeDriver, ConnectionMode};
use softlight_agent::planner::{CliPlanner, StepPlanner};
use softlight_agent::session::{CaptureConfig, CaptureSession};
use softlight_agent::step::CapturedStep;
use softlight_agent::PageAnalyzer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use warp::Filter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8090)]
    port: u16,

    /// Path to the Chrome executable (auto-download otherwise)
    #[arg(long)]
    chrome_path: Option<String>,

    /// Launch Chrome with --no-sandbox (Linux AppArmor workaround)
    #[arg(long)]
    no_sandbox: bool,

    /// Run Chrome headless (manual login is not possible headless)
    #[arg(long)]
    headless: bool,

    /// Connect to an already-running Chrome on this debug port instead of
    /// launching one
    #[arg(long)]
    debug_port: Option<u16>,

    /// Root directory for per-session capture artifacts
    #[arg(long, default_value = "dataset")]
    output_dir: PathBuf,

    /// Path to the Claude CLI used for step planning
    #[arg(long, default_value = "claude")]
    claude_path: String,

    /// Claude model override (e.g. "sonnet")
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct TaskRequest {
    app: String,
    instruction: String,
}

#[derive(Debug, serde::Serialize)]
struct TaskResponse {
    status: String,
    app: String,
    instruction: String,
    steps: Vec<CapturedStep>,
}

/// Everything a task run needs, constructed once at startup and injected.
struct AppState {
    planner: CliPlanner,
    session: CaptureSession,
    launch: LaunchOptions,
    /// One document session at a time; requests queue here.
    session_lock: Mutex<()>,
}

#[derive(Debug, Clone)]
struct LaunchOptions {
    chrome_path: Option<String>,
    no_sandbox: bool,
    headless: bool,
    debug_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    log::info!("Starting Softlight Agent on port {}", args.port);

    let mut planner = CliPlanner::new().with_claude_path(args.claude_path.clone());
    if let Some(model) = args.model.clone() {
        planner = planner.with_model(model);
    }

    let config = CaptureConfig {
        output_root: args.output_dir.clone(),
        ..CaptureConfig::default()
    };

    let state = Arc::new(AppState {
        planner,
        session: CaptureSession::new(PageAnalyzer::new(), config),
        launch: LaunchOptions {
            chrome_path: args.chrome_path.clone(),
            no_sandbox: args.no_sandbox,
            headless: args.headless,
            debug_port: args.debug_port,
        },
        session_lock: Mutex::new(()),
    });

    // Health check endpoint
    let health =
        warp::path("health").map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    let state_filter = warp::any().map(move || state.clone());

    let run_task = warp::path!("tasks" / "run")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter)
        .and_then(handle_run_task);

    let routes = health.or(run_task);

    // Bind manually to handle "port in use" error gracefully
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            log::info!("Listening on http://{}", addr);
            warp::serve(routes)
                .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await;
        }
        Err(e) => {
            log::error!("Failed to bind to port {}: {}", args.port, e);
            eprintln!(
                "Error: Port {} is already in use or unavailable.",
                args.port
            );
            std::process::exit(1);
        }
    }
}

async fn handle_run_task(
    req: TaskRequest,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, warp::Rejection> {
    log::info!(
        "Received task for {}: {}",
        req.app,
        req.instruction
    );

    // One session at a time; the document is exclusively owned for the run.
    let _guard = state.session_lock.lock().await;

    let driver = match launch_driver(&state.launch).await {
        Ok(driver) => driver,
        Err(e) => {
            log::error!("Failed to acquire browser: {}", e);
            let step = CapturedStep::terminal(
                "browser_setup",
                &format!("{} browser failed", req.app),
                e.to_string(),
            );
            return Ok(warp::reply::json(&TaskResponse {
                status: "completed".to_string(),
                app: req.app,
                instruction: req.instruction,
                steps: vec![step],
            }));
        }
    };

    let steps = state
        .session
        .run(
            Box::new(driver),
            &state.planner as &dyn StepPlanner,
            &req.app,
            &req.instruction,
        )
        .await;

    Ok(warp::reply::json(&TaskResponse {
        status: "completed".to_string(),
        app: req.app,
        instruction: req.instruction,
        steps,
    }))
}

async fn launch_driver(options: &LaunchOptions) -> softlight_agent::Result<ChromeDriver> {
    if let Some(port) = options.debug_port {
        return ChromeDriver::connect_debug_port(port).await;
    }

    ChromeDriver::new(ConnectionMode::Sandboxed {
        chrome_path: options.chrome_path.clone(),
        no_sandbox: options.no_sandbox,
        headless: options.headless,
    })
    .await
}
