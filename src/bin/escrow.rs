use escrow_client::{
    config::{Config, DEFAULT_CONFIG_PATH},
    keystore::FileKeyStore,
    EscrowClient
};
use solana_client::nonblocking::rpc_client::RpcClient;
use std::{process::ExitCode, str::FromStr};


const USAGE: &str = "usage: escrow <store|setup|initialize|exchange|cancel|balances|config>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Store,
    Setup,
    Initialize,
    Exchange,
    Cancel,
    Balances,
    WriteConfig
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "store" => Self::Store,
            "setup" => Self::Setup,
            "initialize" => Self::Initialize,
            "exchange" => Self::Exchange,
            "cancel" => Self::Cancel,
            "balances" => Self::Balances,
            "config" => Self::WriteConfig,
            other => return Err(format!("unknown command `{other}`"))
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command: Command = match std::env::args().nth(1).as_deref().map(Command::from_str) {
        Some(Ok(command)) => command,
        Some(Err(e)) => {
            log::error!("{}", e);
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        },
        None => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_missing_address() => {
            log::warn!("Skipping {:?}: {}", command, e);
            ExitCode::SUCCESS
        },
        Err(e) => {
            log::error!("{:?} failed: {}", command, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> escrow_client::error::Result<()> {
    if command == Command::WriteConfig {
        return Config::write_default(DEFAULT_CONFIG_PATH);
    }

    let config: Config = Config::load()?;
    log::info!("Connecting to RPC: {}", config.rpc_url);
    log::info!("Escrow program: {}", config.escrow_program_id);

    let rpc_client: RpcClient = RpcClient::new_with_commitment(
        config.rpc_url.clone(),
        config.confirmation.commitment()
    );
    let store: FileKeyStore = FileKeyStore::new(config.keys_dir.clone());
    let client = EscrowClient::new(config, rpc_client, store);

    match command {
        Command::Store => {
            client.store_keypairs()?;
        },
        Command::Setup => {
            client.setup().await?;
        },
        Command::Initialize => {
            let outcome = client.initialize_escrow().await?;
            log::info!("Escrow {} initialized: {}", outcome.escrow_account, outcome.signature);
        },
        Command::Exchange => {
            let outcome = client.exchange_escrow().await?;
            log::info!("Escrow exchanged: {}", outcome.signature);
        },
        Command::Cancel => {
            let outcome = client.cancel_escrow().await?;
            log::info!("Escrow cancelled: {}", outcome.signature);
        },
        Command::Balances => {
            client.balances().await?;
        },
        Command::WriteConfig => {}
    }

    Ok(())
}
