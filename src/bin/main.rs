//! breez-cli - node session from the command line
//!
//! Commands:
//!   breez-cli seed [--words N]             → {"mnemonic": "...", "node_id": "..."}
//!   breez-cli connect [--listen]           → node state; --listen prints events until Ctrl+C
//!   breez-cli recover                      → recover_node + init_services + start, node state
//!   breez-cli node-info                    → node state
//!   breez-cli sign <message>               → {"signature": "...", "node_id": "..."}
//!   breez-cli check <message> <pubkey> <signature>
//!   breez-cli forget                       → remove stored credentials
//!
//! Configuration (flags win over env):
//!   --mnemonic, -m      BREEZ_MNEMONIC
//!   --working-dir, -d   BREEZ_WORKING_DIR (default: <data dir>/breez-cli)
//!   --api-key           BREEZ_API_KEY
//!   --invite-code       BREEZ_INVITE_CODE
//!   --env               BREEZ_ENV (production|staging)
//!   --network, -n       BREEZ_NETWORK (bitcoin|testnet|signet|regtest)
//!
//! Output is JSON, pretty-printed on a tty. Errors go to stderr as
//! {"error": "..."} with exit code 1.

use anyhow::{anyhow, bail, Context, Result};
use breez_sdk_core::logging::init_logging;
use breez_sdk_core::signer::NodeSigner;
use breez_sdk_core::{
    default_config, generate_mnemonic, install_signal_handlers, mnemonic_to_seed, BreezEvent,
    BreezServices, Config, ConnectRequest, CredentialStore, EnvironmentType, EventListener,
    Network, NodeConfig, SdkError, Seed,
};
use serde_json::{json, Value};
use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("breez-cli {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("seed") => cmd_seed(&opts),
        Some("check") => cmd_check(&opts),
        Some("forget") => cmd_forget(&opts),
        Some(cmd @ ("connect" | "recover" | "node-info" | "sign")) => run_async(cmd, &opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || io::stdout().is_terminal();
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{e:#}")}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    args: Vec<String>,
    mnemonic: Option<String>,
    working_dir: Option<String>,
    api_key: Option<String>,
    invite_code: Option<String>,
    env: Option<String>,
    network: Option<String>,
    words: Option<usize>,
    listen: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let next = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--listen" => opts.listen = true,
                "--mnemonic" | "-m" if next.is_some() => { opts.mnemonic = next; i += 1; }
                "--working-dir" | "-d" if next.is_some() => { opts.working_dir = next; i += 1; }
                "--api-key" if next.is_some() => { opts.api_key = next; i += 1; }
                "--invite-code" if next.is_some() => { opts.invite_code = next; i += 1; }
                "--env" if next.is_some() => { opts.env = next; i += 1; }
                "--network" | "-n" if next.is_some() => { opts.network = next; i += 1; }
                "--words" | "-w" if next.is_some() => {
                    opts.words = next.and_then(|s| s.parse().ok());
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.args = positional;

        // Environment variables (lower priority than CLI args)
        let from_env = |key: &str| env::var(key).ok().filter(|s| !s.trim().is_empty());
        opts.mnemonic = opts.mnemonic.or_else(|| from_env("BREEZ_MNEMONIC"));
        opts.working_dir = opts.working_dir.or_else(|| from_env("BREEZ_WORKING_DIR"));
        opts.api_key = opts.api_key.or_else(|| from_env("BREEZ_API_KEY"));
        opts.invite_code = opts.invite_code.or_else(|| from_env("BREEZ_INVITE_CODE"));
        opts.env = opts.env.or_else(|| from_env("BREEZ_ENV"));
        opts.network = opts.network.or_else(|| from_env("BREEZ_NETWORK"));

        opts
    }

    fn seed(&self) -> Result<Seed> {
        let phrase = self.mnemonic.as_deref().context("--mnemonic or BREEZ_MNEMONIC is required")?;
        Ok(mnemonic_to_seed(phrase)?)
    }

    fn network(&self) -> Result<Network> {
        match self.network.as_deref() {
            None => Ok(Network::Bitcoin),
            Some(name) => Ok(name.parse()?),
        }
    }

    fn config(&self) -> Result<Config> {
        let env_type = match self.env.as_deref() {
            None => EnvironmentType::Production,
            Some(name) => name.parse()?,
        };
        let node_config = NodeConfig::greenlight(None, self.invite_code.clone())?;
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|d| d.join("breez-cli").to_string_lossy().into_owned())
                .unwrap_or_else(|| ".".to_string()),
        };
        let config = default_config(env_type, self.api_key.clone().unwrap_or_default(), node_config)
            .with_network(self.network()?)
            .with_working_dir(working_dir);
        config.validate()?;
        Ok(config)
    }
}

fn print_usage() {
    println!(
        r#"breez-cli - Lightning node session

USAGE:
    breez-cli <command> [args] [options]

COMMANDS:
    seed                          Generate a new mnemonic
    connect                       Connect (recover or register) and print node state
    recover                       Recover credentials, init and start, print node state
    node-info                     Print node state
    sign <message>                Sign a message with the node key
    check <message> <pubkey> <signature>
                                  Verify a signed message
    forget                        Remove stored credentials for this node

OPTIONS:
    --mnemonic, -m <words>        BIP39 mnemonic (env: BREEZ_MNEMONIC)
    --working-dir, -d <path>      Credentials directory (env: BREEZ_WORKING_DIR)
    --api-key <key>               Service API key (env: BREEZ_API_KEY)
    --invite-code <code>          Registration invite code (env: BREEZ_INVITE_CODE)
    --env <env>                   production|staging (env: BREEZ_ENV)
    --network, -n <net>           bitcoin|testnet|signet|regtest (env: BREEZ_NETWORK)
    --words, -w <n>               Mnemonic length for `seed` (12|15|18|21|24)
    --listen                      Keep `connect` running and print events
    --pretty                      Pretty-print JSON
    --version, -V                 Print version

LOGGING:
    BREEZ_SDK_LOG=debug           Log filter, wins over RUST_LOG
                                  (default: warn,breez_sdk_core=info,breez_cli=info)
    BREEZ_SDK_LOG_JSON=1          JSON log lines on stderr

EXAMPLES:
    breez-cli seed --words 24
    breez-cli connect -m "repeat hawk combine ..." --network regtest
    breez-cli sign "hello" -m "repeat hawk combine ..."
"#
    );
}

fn cmd_seed(opts: &ParsedArgs) -> Result<Value> {
    let mnemonic = generate_mnemonic(opts.words.unwrap_or(12))?;
    let node_id = NodeSigner::new(&mnemonic_to_seed(&mnemonic)?)?.node_id_hex();
    Ok(json!({"mnemonic": mnemonic, "node_id": node_id}))
}

fn cmd_check(opts: &ParsedArgs) -> Result<Value> {
    let [message, pubkey, signature] = opts.args.as_slice() else {
        bail!("Usage: breez-cli check <message> <pubkey> <signature>");
    };
    Ok(json!({"valid": BreezServices::check_message(message, pubkey, signature)}))
}

fn cmd_forget(opts: &ParsedArgs) -> Result<Value> {
    let config = opts.config()?;
    let store = CredentialStore::new(&config.working_dir, config.network, &opts.seed()?)?;
    store.clear()?;
    Ok(json!({"removed": store.path().display().to_string()}))
}

fn run_async(command: &str, opts: &ParsedArgs) -> Result<Value> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    rt.block_on(async {
        match command {
            "connect" => cmd_connect(opts).await,
            "recover" => cmd_recover(opts).await,
            "node-info" => cmd_node_info(opts).await,
            "sign" => cmd_sign(opts).await,
            other => Err(anyhow!("Unknown command: {}", other)),
        }
    })
}

/// Prints each event as one JSON line on stdout.
struct PrintListener;

impl EventListener for PrintListener {
    fn on_event(&self, e: BreezEvent) {
        let line = serde_json::to_string(&e).unwrap_or_else(|_| format!("{e:?}"));
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

async fn connect(opts: &ParsedArgs) -> Result<Arc<BreezServices>> {
    let req = ConnectRequest::new(opts.config()?, opts.seed()?);
    Ok(BreezServices::connect(req, Box::new(PrintListener)).await?)
}

async fn cmd_connect(opts: &ParsedArgs) -> Result<Value> {
    let sdk = connect(opts).await?;
    let state = sdk.node_info().await?;

    if opts.listen {
        let shutdown = install_signal_handlers();
        let mut rx = shutdown.subscribe();
        println!("{}", serde_json::to_string(&state)?);
        info!(node_id = %state.id, "Listening for events, Ctrl+C to stop");
        loop {
            tokio::select! {
                _ = rx.recv() => break,
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    if !sdk.is_connected().await {
                        warn!(node_id = %state.id, "Session ended");
                        return Ok(serde_json::to_value(state)?);
                    }
                }
            }
        }
    }

    sdk.stop().await?;
    Ok(serde_json::to_value(state)?)
}

async fn cmd_recover(opts: &ParsedArgs) -> Result<Value> {
    let config = opts.config()?;
    let seed = opts.seed()?;
    let creds = match BreezServices::recover_node(config.network, &seed).await {
        Ok(creds) => creds,
        Err(SdkError::Connection(reason)) => {
            info!("Recovery failed ({reason}), registering");
            let NodeConfig::Greenlight { config: gl } = &config.node_config;
            BreezServices::register_node(config.network, &seed, None, gl.invite_code.clone()).await?
        }
        Err(e) => return Err(e.into()),
    };

    let sdk = BreezServices::init_services(config, &seed, creds, Box::new(PrintListener)).await?;
    sdk.start().await?;
    let state = sdk.node_info().await?;
    sdk.stop().await?;
    Ok(serde_json::to_value(state)?)
}

async fn cmd_node_info(opts: &ParsedArgs) -> Result<Value> {
    let sdk = connect(opts).await?;
    let state = sdk.sync().await?;
    sdk.stop().await?;
    Ok(serde_json::to_value(state)?)
}

async fn cmd_sign(opts: &ParsedArgs) -> Result<Value> {
    let message = opts.args.join(" ");
    if message.is_empty() {
        bail!("Usage: breez-cli sign <message>");
    }
    let sdk = connect(opts).await?;
    let signature = sdk.sign_message(&message).await?;
    let node_id = sdk.node_id();
    sdk.stop().await?;
    Ok(json!({"message": message, "signature": signature, "node_id": node_id}))
}
