//! Command line front end of the junction wallet client.

pub mod config;

use core::num::NonZeroU32;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use junction_client::request::{
    AddSignerRequest, BroadcastRequest, CreatePsbtRequest, CreateWalletRequest, EnterPinRequest,
    NodeCredentials, PromptTarget, PsbtOutput, SignPsbtRequest,
};
use junction_wallet_domain::{
    settings::RpcSettings,
    wallet::{Network, Wallet},
};
use junction_wallet_engine::{Backend, Started, WalletEngine, view};
use serde_json::{Value, json};

/// Parsed command line.
#[derive(Debug, Parser)]
#[command(author, version, about = "Coordinate multisig signing with hardware wallets", long_about = None)]
pub struct Cli {
    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// The subcommands of [`Cli`].
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List attached hardware devices
    Devices,
    /// List wallets with their pending PSBTs
    Wallets,
    /// List the transactions of a wallet
    History(WalletArgs),
    /// List the unspent outputs of a wallet
    Coins(WalletArgs),
    /// Show how far a PSBT is from broadcast and where each signer stands
    Status(PsbtArgs),
    /// Create a wallet
    CreateWallet(CreateWalletArgs),
    /// Add an attached device to a wallet as a signer
    AddSigner(AddSignerArgs),
    /// Show the PIN matrix on a locked device
    Prompt(PromptArgs),
    /// Send the PIN for the prompted device
    Unlock {
        /// The PIN, as positions on the device matrix
        #[arg(long)]
        pin: String,
    },
    /// Cancel the pending PIN prompt
    CancelPrompt,
    /// Create a PSBT spending from a wallet
    CreatePsbt(CreatePsbtArgs),
    /// Sign a PSBT with an attached device
    Sign(SignArgs),
    /// Broadcast a fully signed PSBT
    Broadcast(PsbtArgs),
    /// Show the backend settings
    Settings,
    /// Replace the node connection settings
    SetSettings(RpcArgs),
    /// List the nodes known to the backend
    Nodes,
    /// Derive the next receive address of a wallet
    Address {
        /// The wallet name
        #[arg(long)]
        wallet: String,
    },
    /// Print the attached devices every time they change, until interrupted
    Watch,
}

/// Addresses one wallet.
#[derive(Debug, Args)]
pub struct WalletArgs {
    /// The wallet name
    #[arg(long)]
    pub wallet: String,
}

/// Addresses one PSBT of a wallet.
#[derive(Debug, Args)]
pub struct PsbtArgs {
    /// The wallet name
    #[arg(long)]
    pub wallet: String,

    /// The index of the PSBT in the wallet
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}

/// Arguments of [`Command::CreateWallet`].
#[derive(Debug, Args)]
pub struct CreateWalletArgs {
    /// The wallet name
    #[arg(long)]
    pub name: String,

    /// Signatures required to spend
    #[arg(short, long)]
    pub m: NonZeroU32,

    /// Total number of signers
    #[arg(short, long)]
    pub n: NonZeroU32,

    /// The network, backend default when absent
    #[arg(long, value_enum)]
    pub network: Option<NetworkArg>,

    /// Node connection, backend default when absent
    #[command(flatten)]
    pub node: WalletNodeArgs,
}

/// Node connection of a new wallet. Either all four flags or none.
#[derive(Debug, Clone, Default, Args)]
pub struct WalletNodeArgs {
    /// RPC user
    #[arg(long, requires_all = ["password", "host", "port"])]
    pub user: Option<String>,

    /// RPC password
    #[arg(long, requires_all = ["user", "host", "port"])]
    pub password: Option<String>,

    /// Node host
    #[arg(long, requires_all = ["user", "password", "port"])]
    pub host: Option<String>,

    /// Node RPC port
    #[arg(long, requires_all = ["user", "password", "host"])]
    pub port: Option<String>,
}

impl WalletNodeArgs {
    /// The credentials, when every flag was given.
    pub fn credentials(self) -> Option<NodeCredentials> {
        let Self { user: Some(user), password: Some(password), host: Some(host), port: Some(port) } = self else {
            return None;
        };

        Some(NodeCredentials::builder().host(host).port(port).user(user).password(password).build())
    }
}

/// Arguments of [`Command::AddSigner`].
#[derive(Debug, Args)]
pub struct AddSignerArgs {
    /// The wallet name
    #[arg(long)]
    pub wallet: String,

    /// Display name of the new signer
    #[arg(long)]
    pub name: String,

    /// Fingerprint of the device
    #[arg(long)]
    pub device: String,
}

/// Arguments of [`Command::Prompt`].
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PromptArgs {
    /// Prompt the locked device of this wallet
    #[arg(long)]
    pub wallet: Option<String>,

    /// Prompt the device at this path
    #[arg(long)]
    pub path: Option<String>,
}

/// Arguments of [`Command::CreatePsbt`].
#[derive(Debug, Args)]
pub struct CreatePsbtArgs {
    /// The wallet name
    #[arg(long)]
    pub wallet: String,

    /// A recipient as `<address>=<btc>`, repeatable
    #[arg(long = "to", value_name = "ADDRESS=BTC", required = true)]
    pub outputs: Vec<String>,

    /// Deduct the fee from the outputs
    #[arg(long, default_value_t = false)]
    pub subtract_fees: bool,
}

/// Arguments of [`Command::Sign`].
#[derive(Debug, Args)]
pub struct SignArgs {
    /// The PSBT to sign
    #[command(flatten)]
    pub psbt: PsbtArgs,

    /// Fingerprint of the signing device
    #[arg(long)]
    pub device: String,
}

/// Node RPC connection details.
#[derive(Debug, Clone, Args)]
pub struct RpcArgs {
    /// RPC user
    #[arg(long)]
    pub user: String,

    /// RPC password
    #[arg(long)]
    pub password: String,

    /// Node host
    #[arg(long)]
    pub host: String,

    /// Node RPC port
    #[arg(long)]
    pub port: String,
}

/// Network accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum NetworkArg {
    /// Bitcoin mainnet
    Mainnet,
    /// Bitcoin testnet
    Testnet,
    /// Local regtest
    Regtest,
}

impl From<NetworkArg> for Network {
    fn from(network: NetworkArg) -> Self {
        match network {
            NetworkArg::Mainnet => Self::Mainnet,
            NetworkArg::Testnet => Self::Testnet,
            NetworkArg::Regtest => Self::Regtest,
        }
    }
}

/// Runs a one-shot command, returning what to print.
///
/// [`Command::Watch`] is long-running and handled by the binary.
pub async fn execute<B>(engine: &WalletEngine<B, Started>, command: Command) -> anyhow::Result<Value>
where
    B: Backend,
{
    let counting = engine.config().signature_counting();

    let output = match command {
        Command::Devices => serde_json::to_value(engine.refresh_devices().await?)?,
        Command::Wallets => serde_json::to_value(engine.refresh_wallets().await?)?,
        Command::History(WalletArgs { wallet }) => {
            let wallets = engine.refresh_wallets().await?;
            serde_json::to_value(find_wallet(&wallets, &wallet)?.history())?
        },
        Command::Coins(WalletArgs { wallet }) => {
            let wallets = engine.refresh_wallets().await?;
            serde_json::to_value(find_wallet(&wallets, &wallet)?.coins())?
        },
        Command::Status(PsbtArgs { wallet, index }) => {
            engine.refresh_devices().await?;
            engine.refresh_wallets().await?;

            let state = engine.state();
            let status = view::psbt_status(&state, &wallet, index, counting)
                .ok_or_else(|| anyhow!("psbt {index} of wallet {wallet} not found"))?;
            let signers = view::signer_statuses(&state, &wallet, index, counting).unwrap_or_default();

            json!({
                "stage": status.stage,
                "signatures_remaining": status.signatures_remaining,
                "broadcast_permitted": view::broadcast_permitted(&state, &wallet, index, counting),
                "signers": signers.iter().map(signer_row).collect::<Vec<_>>(),
            })
        },
        Command::CreateWallet(CreateWalletArgs { name, m, n, network, node }) => {
            engine.refresh_wallets().await?;

            let request = CreateWalletRequest::builder()
                .name(name)
                .m(m)
                .n(n)
                .maybe_network(network.map(Network::from))
                .maybe_node(node.credentials())
                .build()?;

            serde_json::to_value(engine.create_wallet(request).await?)?
        },
        Command::AddSigner(AddSignerArgs { wallet, name, device }) => {
            engine.refresh_devices().await?;
            engine.refresh_wallets().await?;

            let request =
                AddSignerRequest::builder().wallet_name(wallet).signer_name(name).device_id(device).build()?;

            serde_json::to_value(engine.add_signer(request).await?)?
        },
        Command::Prompt(PromptArgs { wallet, path }) => {
            let target = match (wallet, path) {
                (Some(wallet), _) => PromptTarget::Wallet(wallet),
                (None, Some(path)) => PromptTarget::Device(path),
                (None, None) => return Err(anyhow!("either --wallet or --path is required")),
            };

            engine.prompt_pin(target).await?;
            json!({ "prompted": true })
        },
        Command::Unlock { pin } => {
            let request = EnterPinRequest::new(pin)?;

            serde_json::to_value(engine.enter_pin(request).await?)?
        },
        Command::CancelPrompt => {
            engine.cancel_prompt().await?;
            json!({ "cancelled": true })
        },
        Command::CreatePsbt(CreatePsbtArgs { wallet, outputs, subtract_fees }) => {
            let outputs = outputs
                .iter()
                .map(|output| parse_output(output, subtract_fees))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let request = CreatePsbtRequest::builder().wallet_name(wallet).outputs(outputs).build()?;

            serde_json::to_value(engine.create_psbt(request).await?)?
        },
        Command::Sign(SignArgs { psbt: PsbtArgs { wallet, index }, device }) => {
            engine.refresh_devices().await?;
            engine.refresh_wallets().await?;

            let request = SignPsbtRequest::builder().wallet_name(wallet).device_id(device).index(index).build();
            let status = engine.sign(request).await?;

            json!({ "stage": status.stage, "signatures_remaining": status.signatures_remaining })
        },
        Command::Broadcast(PsbtArgs { wallet, index }) => {
            engine.refresh_wallets().await?;

            let request = BroadcastRequest::builder().wallet_name(wallet).index(index).build();
            let receipt = engine.broadcast(request).await?;

            json!({ "txid": receipt.txid() })
        },
        Command::Settings => {
            let settings = engine.refresh_settings().await?;
            json!({ "settings": settings, "valid": settings.is_valid() })
        },
        Command::SetSettings(RpcArgs { user, password, host, port }) => {
            let rpc = RpcSettings::builder().user(user).password(password).host(host).port(port).build();
            let settings = engine.update_settings(rpc).await?;

            json!({ "settings": settings, "valid": settings.is_valid() })
        },
        Command::Nodes => serde_json::to_value(engine.refresh_nodes().await?)?,
        Command::Address { wallet } => json!({ "address": engine.generate_address(&wallet).await? }),
        Command::Watch => return Err(anyhow!("watch is not a one-shot command")),
    };

    Ok(output)
}

fn find_wallet<'w>(wallets: &'w [Wallet], name: &str) -> anyhow::Result<&'w Wallet> {
    wallets.iter().find(|wallet| wallet.name() == name).ok_or_else(|| anyhow!("wallet {name} not found"))
}

fn parse_output(output: &str, subtract_fees: bool) -> anyhow::Result<PsbtOutput> {
    let (address, btc) = output
        .split_once('=')
        .with_context(|| format!("output {output} is not of the form <address>=<btc>"))?;
    let btc = btc.parse().with_context(|| format!("invalid amount in output {output}"))?;

    Ok(PsbtOutput::builder().address(address).btc(btc).subtract_fees(subtract_fees).build())
}

fn signer_row(row: &view::SignerRow) -> Value {
    let (status, detail) = match &row.status {
        view::SignerStatus::Signed => ("signed", Value::Null),
        view::SignerStatus::DidNotSign => ("did_not_sign", Value::Null),
        view::SignerStatus::Signing => ("signing", Value::Null),
        view::SignerStatus::Ready(device) => ("ready", json!({ "path": device.path() })),
        view::SignerStatus::NeedsUnlock(method) => ("needs_unlock", json!({ "unlock": method.to_string() })),
    };

    json!({
        "name": row.signer.name(),
        "fingerprint": row.signer.fingerprint(),
        "type": row.signer.device_type(),
        "status": status,
        "detail": detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_are_parsed_from_address_and_amount() {
        let output = parse_output("tb1qrecipient=0.25", true).unwrap();

        assert_eq!(output, PsbtOutput::builder().address("tb1qrecipient").btc(0.25).subtract_fees(true).build());
        assert!(parse_output("tb1qrecipient", false).is_err());
        assert!(parse_output("tb1qrecipient=lots", false).is_err());
    }

    #[test]
    fn sign_arguments_are_parsed() {
        let cli = Cli::try_parse_from(["junction", "sign", "--wallet", "vault", "--index", "2", "--device", "f00dbabe"])
            .unwrap();

        let Command::Sign(SignArgs { psbt, device }) = cli.command else {
            panic!("expected sign command");
        };
        assert_eq!(psbt.wallet, "vault");
        assert_eq!(psbt.index, 2);
        assert_eq!(device, "f00dbabe");
    }

    #[test]
    fn prompt_requires_exactly_one_target() {
        assert!(Cli::try_parse_from(["junction", "prompt"]).is_err());
        assert!(Cli::try_parse_from(["junction", "prompt", "--wallet", "vault", "--path", "usb:1"]).is_err());
        assert!(Cli::try_parse_from(["junction", "prompt", "--path", "usb:1"]).is_ok());
    }

    #[test]
    fn wallet_node_is_optional_but_complete() {
        let cli = Cli::try_parse_from(["junction", "create-wallet", "--name", "vault", "-m", "2", "-n", "3"]).unwrap();
        let Command::CreateWallet(args) = cli.command else {
            panic!("expected create-wallet command");
        };
        assert!(args.node.credentials().is_none());

        assert!(
            Cli::try_parse_from(["junction", "create-wallet", "--name", "vault", "-m", "2", "-n", "3", "--host", "x"])
                .is_err()
        );

        let cli = Cli::try_parse_from([
            "junction", "create-wallet", "--name", "vault", "-m", "2", "-n", "3", "--user", "rpc", "--password",
            "hunter2", "--host", "localhost", "--port", "18443",
        ])
        .unwrap();
        let Command::CreateWallet(args) = cli.command else {
            panic!("expected create-wallet command");
        };
        let node = args.node.credentials().expect("all node flags were given").dissolve();
        assert_eq!(node.host, "localhost");
        assert_eq!(node.port, "18443");
        assert_eq!(node.user, "rpc");
        assert_eq!(node.password, "hunter2");
    }

    #[test]
    fn settings_node_is_required() {
        assert!(Cli::try_parse_from(["junction", "set-settings", "--host", "localhost"]).is_err());
    }
}
