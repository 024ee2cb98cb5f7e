//!
//! WorkLocus CLI binary
//! --------------------
//! Signs in against the WorkLocus backend, keeps the credential pair in a
//! session file, and issues authenticated API calls or gate navigations with
//! transparent credential renewal.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Url;
use tracing_subscriber::{EnvFilter, fmt};

use worklocus::cli::output::render;
use worklocus::cli::{default_gate_url, session_file_path, Command, Console};
use worklocus::client::{LogoutReason, ReqwestTransport};
use worklocus::config::{ApiConfig, GateConfig};
use worklocus::identity::{FileSessionStore, SharedSessionStore};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--api <url>] [--gate <url>] [--session <file>] <command> [args]\n\nCommands:\n  login <email> <password>       sign in and store the session\n  whoami                         show the signed-in user\n  menu                           list the console sections your role may open\n  logout                         forget the stored session\n  get <path>                     authenticated GET against the API\n  delete <path>                  authenticated DELETE\n  post <path> [json]             authenticated POST with an optional JSON body\n  patch <path> [json]            authenticated PATCH with an optional JSON body\n  open <path>                    navigate to a console page through the gate\n\nExamples:\n  {program} login admin@worklocus.io secret\n  {program} get /api/projects\n  {program} open /admin/payroll\n\nEnvironment:\n  WORKLOCUS_API_URL, WORKLOCUS_GATE_URL, WORKLOCUS_SESSION_FILE,\n  WORKLOCUS_REQUEST_TIMEOUT_SECS, WORKLOCUS_OUTPUT=json"
    );
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut api = ApiConfig::from_env();
    let mut gate = default_gate_url();
    let mut session_file = session_file_path();
    let mut words: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api" | "--gate" | "--session" => {
                if i + 1 >= args.len() { eprintln!("{} requires a value", args[i]); print_usage(&program); std::process::exit(2); }
                let value = args[i + 1].clone();
                match args[i].as_str() {
                    "--api" => api.base_url = value,
                    "--gate" => gate = value,
                    _ => session_file = value.into(),
                }
                i += 2; continue;
            }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            _ => { words.push(args[i].clone()); i += 1; }
        }
    }

    let cmd = match Command::parse(&words) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            print_usage(&program);
            std::process::exit(2);
        }
    };

    let transport = ReqwestTransport::new(&api).with_context(|| format!("invalid API address {}", api.base_url))?;
    let gate_url = Url::parse(&gate).with_context(|| format!("invalid gate address {}", gate))?;
    let store: SharedSessionStore = Arc::new(FileSessionStore::open(&session_file));
    let mut console = Console::new(Arc::new(transport), store, GateConfig::default().permissions, gate_url);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;
    let result = rt.block_on(console.run(cmd));

    if let Some(LogoutReason::SessionExpired) = console.take_logout() {
        eprintln!("Your session has expired. Please log in again.");
    }
    match result {
        Ok(val) => {
            println!("{}", render(&val));
            Ok(())
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}
