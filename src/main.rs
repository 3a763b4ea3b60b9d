use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use dice_game::{
    chain::RestClient,
    client::{
        self,
        AppConfig,
        WalletConfig,
    },
    config::{
        ConfigOverrides,
        GameConfig,
        NetworkTarget,
    },
    deployment::{
        self,
        DeploymentEnv,
        DeploymentRecord,
        DeploymentStore,
    },
    payload::AccountAddress,
    submitter::{
        TransactionSubmitter,
        cancel_pair,
    },
    ui,
    wallets::{
        list_wallets,
        resolve_wallet_dir,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "dice-game",
    about = "Bet high or low on a six-sided die against an on-chain house",
    version,
    group(
        ArgGroup::new("network")
            .args(["devnet", "testnet", "local"])
            .required(false)
    )
)]
struct Args {
    /// Use Aptos devnet
    #[arg(long)]
    devnet: bool,

    /// Use Aptos testnet (default)
    #[arg(long)]
    testnet: bool,

    /// Use a local node
    #[arg(long)]
    local: bool,

    /// Override the fullnode REST URL
    #[arg(long)]
    node_url: Option<String>,

    /// Keystore wallet name; without it the game starts disconnected
    #[arg(long)]
    wallet: Option<String>,

    /// Override the wallet directory (defaults to ~/.aptos/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Address the DiceGame module is published under
    #[arg(long)]
    module_address: Option<String>,

    /// Account holding the house bankroll (defaults to the module address)
    #[arg(long)]
    house_owner: Option<String>,

    /// House edge used by init-house
    #[arg(long)]
    house_edge: Option<u64>,

    /// Seconds to wait for a transaction to confirm
    #[arg(long)]
    confirm_timeout_secs: Option<u64>,

    /// Event type suffix whose `roll` field settles bets on chain
    #[arg(long)]
    settlement_event: Option<String>,

    /// Start in the compact layout
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play interactively (default)
    Play,
    /// Submit initialize_house and wait for it to confirm
    InitHouse,
    /// Store the module address and house parameters for this network
    RecordDeployment {
        /// Coin decimals of the staked asset
        #[arg(long)]
        coin_decimals: Option<u8>,
    },
    /// List keystore wallets
    Wallets,
}

impl Args {
    fn env(&self) -> DeploymentEnv {
        if self.devnet {
            DeploymentEnv::Dev
        } else if self.local {
            DeploymentEnv::Local
        } else {
            DeploymentEnv::Test
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            node_url: self.node_url.clone(),
            module_address: self.module_address.clone(),
            house_owner: self.house_owner.clone(),
            house_edge_percent: self.house_edge,
            confirmation_timeout: self.confirm_timeout_secs.map(Duration::from_secs),
            settlement_event: self.settlement_event.clone(),
        }
    }

    fn wallet_config(&self) -> Result<WalletConfig> {
        match &self.wallet {
            Some(name) => Ok(WalletConfig::Keystore {
                name: name.clone(),
                dir: resolve_wallet_dir(self.wallet_dir.as_deref())?,
            }),
            None => Ok(WalletConfig::None),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _log_guard = client::init_tracing();
    let args = Args::parse();
    deployment::ensure_structure()?;

    let env = args.env();
    let store = DeploymentStore::new(env)?;
    match &args.command {
        None | Some(Command::Play) => {
            let game = load_config(&args, &store)?;
            let layout = if args.compact {
                ui::Layout::Compact
            } else {
                ui::Layout::Dashboard
            };
            client::run_app(AppConfig {
                game,
                wallet: args.wallet_config()?,
                layout,
            })
            .await
        }
        Some(Command::InitHouse) => init_house(&args, &store).await,
        Some(Command::RecordDeployment { coin_decimals }) => {
            record_deployment(&args, &store, *coin_decimals)
        }
        Some(Command::Wallets) => {
            let dir = resolve_wallet_dir(args.wallet_dir.as_deref())?;
            let wallets = list_wallets(&dir)?;
            if wallets.is_empty() {
                println!("No wallets found in {}", dir.display());
            }
            for w in wallets {
                println!("{}\t{}", w.name, w.path.display());
            }
            Ok(())
        }
    }
}

fn load_config(args: &Args, store: &DeploymentStore) -> Result<GameConfig> {
    let record = store.load()?;
    GameConfig::resolve(args.env(), &args.overrides(), record.as_ref())
}

async fn init_house(args: &Args, store: &DeploymentStore) -> Result<()> {
    let game = load_config(args, store)?;
    let wallet_config = args.wallet_config()?;
    if matches!(wallet_config, WalletConfig::None) {
        return Err(eyre!("init-house needs --wallet"));
    }
    let node = RestClient::new(game.network.url())?;
    let chain_id = node
        .chain_id()
        .await
        .wrap_err_with(|| format!("node at {} is unreachable", node.base_url()))?;
    info!(chain_id, "node reachable");
    let wallet = client::connect_wallet(&wallet_config, &node)?;
    let submitter = TransactionSubmitter::new(Arc::new(game), Arc::new(wallet), Arc::new(node));

    let (cancel, token) = cancel_pair();
    let submit = submitter.initialize_house(token);
    tokio::pin!(submit);
    let settlement = tokio::select! {
        res = &mut submit => res,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            submit.await
        }
    }
    .wrap_err("initialize_house failed")?;

    println!(
        "House initialized with {}% edge in {}",
        submitter.config().house_edge_percent,
        settlement.handle
    );
    Ok(())
}

fn record_deployment(
    args: &Args,
    store: &DeploymentStore,
    coin_decimals: Option<u8>,
) -> Result<()> {
    let raw = args
        .module_address
        .as_deref()
        .ok_or_else(|| eyre!("record-deployment needs --module-address"))?;
    let module_address: AccountAddress = raw.parse().map_err(|e: String| eyre!(e))?;
    let node_url = args
        .node_url
        .clone()
        .unwrap_or_else(|| NetworkTarget::for_env(args.env(), None).url().to_string());

    let mut record = DeploymentRecord::new(module_address.to_string(), node_url);
    record.house_owner = match args.house_owner.as_deref() {
        Some(raw) => Some(
            raw.parse::<AccountAddress>()
                .map_err(|e| eyre!(e))?
                .to_string(),
        ),
        None => None,
    };
    record.house_edge_percent = args.house_edge;
    record.coin_decimals = coin_decimals;
    record.settlement_event = args.settlement_event.clone();

    // validate before persisting
    GameConfig::resolve(args.env(), &ConfigOverrides::default(), Some(&record))?;
    store.save(&record)?;
    info!(env = %args.env(), module = %module_address, "deployment recorded");
    println!(
        "Recorded {} deployment at {}",
        args.env(),
        store.path().display()
    );
    Ok(())
}
