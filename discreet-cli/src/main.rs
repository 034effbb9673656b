//! # Discreet CLI
//!
//! Command-line interface for building Discreet Log Contract terms, printing
//! oracle announcements and running the full two-party protocol in process.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use discreet_core::{
    bitcoin::{Network, ScriptBuf},
    fee::{fund_fee_per_input, required_amount},
    parse_deals_csv, utils::*,
    Builder, Conditions, DlcError, FileStore, LocalOracle, MemoryWallet, Oracle,
    OracleAnnouncement, Party, PartyPair,
};
use log::info;

#[derive(Parser)]
#[command(name = "discreet")]
#[command(about = "Two-party Discreet Log Contracts on Bitcoin")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build contract conditions from amounts and a deals CSV
    Conditions {
        /// First party deposit (sats)
        #[arg(long)]
        deposit_first: u64,
        /// Second party deposit (sats)
        #[arg(long)]
        deposit_second: u64,
        /// Funding feerate (sat/vbyte)
        #[arg(long, default_value = "10")]
        fund_feerate: u64,
        /// Redemption feerate (sat/vbyte)
        #[arg(long, default_value = "10")]
        redeem_feerate: u64,
        /// Refund block height
        #[arg(long)]
        refund_locktime: u32,
        /// Fixing time (Unix timestamp)
        #[arg(long)]
        fixing_time: u64,
        /// CSV file, one deal per line: amount_first,amount_second,msg_hex[,msg_hex...]
        #[arg(long)]
        deals: PathBuf,
        /// Write the conditions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the announcement of a seed-derived oracle
    Oracle {
        /// Oracle seed (32 bytes hex)
        #[arg(long)]
        seed: String,
        /// Fixing time (Unix timestamp)
        #[arg(long)]
        fixing_time: u64,
        /// Number of nonce slots
        #[arg(long, default_value = "1")]
        slots: usize,
    },
    /// Run both parties through the protocol and print every transaction
    Run {
        /// Conditions JSON file
        #[arg(short, long)]
        conditions: PathBuf,
        /// Oracle seed (32 bytes hex)
        #[arg(long)]
        oracle_seed: String,
        /// Oracle announcement JSON, as printed by `discreet oracle`. Defaults
        /// to the announcement of the seeded oracle.
        #[arg(long)]
        oracle_announcement: Option<PathBuf>,
        /// Seed both demo wallets are derived from (32 bytes hex)
        #[arg(long)]
        wallet_seed: String,
        /// Payout address of the first party. A wallet address when omitted.
        #[arg(long)]
        payout_first: Option<String>,
        /// Payout address of the second party. A wallet address when omitted.
        #[arg(long)]
        payout_second: Option<String>,
        /// Attested outcome, comma-separated hex messages. Refunds when omitted.
        #[arg(long)]
        outcome: Option<String>,
        /// Network (bitcoin, testnet, signet, regtest)
        #[arg(short, long, default_value = "regtest")]
        network: String,
        /// Directory to store the contract record in
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

/// Raw arguments of `run`.
struct RunArgs {
    conditions: PathBuf,
    oracle_seed: String,
    oracle_announcement: Option<PathBuf>,
    wallet_seed: String,
    payout_first: Option<String>,
    payout_second: Option<String>,
    outcome: Option<String>,
    network: String,
    store: Option<PathBuf>,
}

/// Settings of one `run` invocation.
struct RunConfig {
    conditions: Conditions,
    oracle_seed: [u8; 32],
    announcement: Option<OracleAnnouncement>,
    wallet_seed: [u8; 32],
    payouts: PartyPair<Option<ScriptBuf>>,
    outcome: Option<Vec<Vec<u8>>>,
    network: Network,
    store: Option<PathBuf>,
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

impl RunConfig {
    fn new(args: RunArgs) -> Result<Self> {
        let network = parse_network(&args.network)?;
        let payout = |address: Option<String>| {
            address
                .map(|a| parse_address(&a, network).map(|a| a.script_pubkey()))
                .transpose()
        };
        let announcement = args
            .oracle_announcement
            .map(|path| -> Result<OracleAnnouncement> {
                serde_json::from_str(&read_file(&path)?)
                    .with_context(|| format!("Invalid announcement in {}", path.display()))
            })
            .transpose()?;
        let outcome = args
            .outcome
            .map(|o| {
                o.split(',')
                    .map(|m| hex::decode(m.trim()))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .transpose()
            .context("Outcome messages must be hex")?;

        Ok(Self {
            conditions: Conditions::from_json(&read_file(&args.conditions)?)?,
            oracle_seed: parse_seed(&args.oracle_seed)?,
            announcement,
            wallet_seed: parse_seed(&args.wallet_seed)?,
            payouts: PartyPair::new(payout(args.payout_first)?, payout(args.payout_second)?),
            outcome,
            network,
            store: args.store,
        })
    }
}

fn parse_seed(seed: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(seed).context("Seed must be hex")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("Seed must be 32 bytes, got {}", b.len()))
}

fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        match e.downcast_ref::<DlcError>() {
            Some(dlc) => eprintln!("{} [{}]: {e:#}", "Error".red().bold(), dlc.kind()),
            None => eprintln!("{}: {e:#}", "Error".red().bold()),
        }
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Conditions {
            deposit_first,
            deposit_second,
            fund_feerate,
            redeem_feerate,
            refund_locktime,
            fixing_time,
            deals,
            output,
        } => {
            let csv = fs::read_to_string(&deals)
                .with_context(|| format!("Failed to read {}", deals.display()))?;
            let conditions = Conditions::new(
                fixing_time,
                PartyPair::new(deposit_first, deposit_second),
                fund_feerate,
                redeem_feerate,
                refund_locktime,
                parse_deals_csv(&csv)?,
            )?;
            let json = conditions.to_json()?;

            match output {
                Some(path) => {
                    fs::write(&path, &json)?;
                    println!("{}: {}", "Conditions written".green().bold(), path.display());
                    println!("{}: {}", "Deals".yellow().bold(), conditions.deals.len());
                    println!(
                        "{}: {}",
                        "Fixing Time".yellow().bold(),
                        format_timestamp(conditions.fixing_time)
                    );
                }
                None => println!("{json}"),
            }
        }

        Commands::Oracle {
            seed,
            fixing_time,
            slots,
        } => {
            let oracle = LocalOracle::new(parse_seed(&seed)?, slots);
            let announcement = oracle.public_material(fixing_time)?;
            println!("{}", serde_json::to_string_pretty(&announcement)?);
        }

        Commands::Run {
            conditions,
            oracle_seed,
            oracle_announcement,
            wallet_seed,
            payout_first,
            payout_second,
            outcome,
            network,
            store,
        } => {
            let config = RunConfig::new(RunArgs {
                conditions,
                oracle_seed,
                oracle_announcement,
                wallet_seed,
                payout_first,
                payout_second,
                outcome,
                network,
                store,
            })?;
            run_protocol(config)?;
        }
    }

    Ok(())
}

/// Demo wallet of `party`, seeded with the wallet seed followed by the party
/// byte and holding one coin that covers its share.
fn funded_wallet(config: &RunConfig, party: Party) -> Result<MemoryWallet> {
    let mut seed = config.wallet_seed.to_vec();
    seed.push(party as u8);
    let mut wallet = MemoryWallet::new(&seed, config.network)?;
    let conditions = &config.conditions;
    wallet.fund(required_amount(conditions, party) + fund_fee_per_input(conditions) + 100_000)?;
    Ok(wallet)
}

fn print_tx(label: &str, txid: impl std::fmt::Display, hex: String) {
    println!("{}: {}", label.yellow().bold(), txid.to_string().cyan());
    println!("{hex}");
    println!();
}

fn run_protocol(config: RunConfig) -> Result<()> {
    let conditions = &config.conditions;
    let mut oracle = LocalOracle::new(config.oracle_seed, conditions.max_messages());
    let mut a = Builder::new(Party::First, conditions.clone(), funded_wallet(&config, Party::First)?)?;
    let mut b = Builder::new(Party::Second, conditions.clone(), funded_wallet(&config, Party::Second)?)?;

    println!("{}", "Running contract protocol...".green().bold());
    println!("{}", "═".repeat(50).bright_black());

    for builder in [&mut a, &mut b] {
        builder.prepare_pubkey()?;
        let payout = config.payouts[builder.party()].clone();
        builder.prepare_funding_to(payout)?;
    }
    let offer_a = a.public_offer()?;
    let offer_b = b.public_offer()?;
    a.accept_public_offer(offer_b)?;
    b.accept_public_offer(offer_a)?;
    info!("Public offers exchanged");

    let announcement = match &config.announcement {
        Some(announcement) => announcement.clone(),
        None => oracle.public_material(conditions.fixing_time)?,
    };
    a.commit_oracle(&announcement)?;
    b.commit_oracle(&announcement)?;

    let sigs_a = a.sign_contract()?;
    let sigs_b = b.sign_contract()?;
    a.accept_signatures(sigs_b)?;
    b.accept_signatures(sigs_a)?;

    let fund_a = a.sign_funding()?;
    let fund_b = b.sign_funding()?;
    a.accept_funding(fund_b)?;
    b.accept_funding(fund_a)?;

    let contract_id = a.contract_id()?;
    println!("{}: {}", "Contract ID".yellow().bold(), contract_id.to_string().cyan());
    println!("{}: {}", "Oracle PubKey".yellow().bold(), announcement.pubkey);
    println!(
        "{}: {}",
        "Fixing Time".yellow().bold(),
        format_timestamp(conditions.fixing_time)
    );
    println!("{}", "═".repeat(50).bright_black());
    println!();

    if let Some(dir) = &config.store {
        let mut store = FileStore::open(dir)?;
        a.save(&mut store)?;
        println!("{}: {}", "Contract stored in".green().bold(), dir.display());
    }

    let funding = a.funding_tx()?;
    a.broadcast_funding()?;
    print_tx("Funding", funding.compute_txid(), tx_hex(&funding));

    match config.outcome {
        Some(messages) => {
            let Some(deal) = conditions.find_deal(&messages) else {
                bail!("Outcome matches no deal");
            };
            oracle.attest(conditions.fixing_time, messages)?;
            let attestation = oracle.signed_messages(conditions.fixing_time)?;
            a.fix_deal(&attestation)?;
            b.fix_deal(&attestation)?;

            let winner = if conditions.deals[deal].amount(Party::First) > 0 {
                &mut a
            } else {
                &mut b
            };
            let cet = winner.signed_cet()?;
            let closing = winner.closing_tx()?;
            winner.settle()?;

            println!(
                "{} {} ({} party executes)",
                "Settled deal".green().bold(),
                deal,
                winner.party()
            );
            print_tx("CET", cet.compute_txid(), tx_hex(&cet));
            print_tx("Closing", closing.compute_txid(), tx_hex(&closing));
        }
        None => {
            let refund = a.refund_tx()?;
            a.refund()?;
            println!(
                "{} at height {}",
                "Refunded".green().bold(),
                conditions.refund_locktime
            );
            print_tx("Refund", refund.compute_txid(), tx_hex(&refund));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use discreet_core::{bitcoin::Address, Deal, Wallet};

    use super::*;

    fn run_args(dir: &Path) -> RunArgs {
        let conditions = Conditions::new(
            now_timestamp() + 3_600,
            PartyPair::new(100_000_000, 100_000_000),
            5,
            5,
            850_000,
            vec![
                Deal::new(200_000_000, 0, vec![vec![1]]),
                Deal::new(0, 200_000_000, vec![vec![0]]),
            ],
        )
        .unwrap();
        let path = dir.join("conditions.json");
        fs::write(&path, conditions.to_json().unwrap()).unwrap();

        RunArgs {
            conditions: path,
            oracle_seed: "11".repeat(32),
            oracle_announcement: None,
            wallet_seed: "22".repeat(32),
            payout_first: None,
            payout_second: None,
            outcome: Some("01".to_string()),
            network: "regtest".to_string(),
            store: None,
        }
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed(&"11".repeat(32)).unwrap(), [0x11; 32]);
        assert!(parse_seed("1111").is_err());
        assert!(parse_seed("zz").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "discreet",
            "run",
            "--conditions",
            "conditions.json",
            "--oracle-seed",
            "00",
            "--wallet-seed",
            "01",
            "--payout-first",
            "bcrt1q",
            "--outcome",
            "01",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run { outcome: Some(_), payout_first: Some(_), payout_second: None, .. }
        ));
        assert!(Cli::try_parse_from(["discreet", "run", "--conditions", "c.json", "--oracle-seed", "00"]).is_err());
    }

    #[test]
    fn test_run_config_reads_addresses_and_announcement() {
        let dir = tempfile::tempdir().unwrap();
        let payout: Address = MemoryWallet::new(&[5u8; 32], Network::Regtest)
            .unwrap()
            .new_address()
            .unwrap();
        let announcement = LocalOracle::new([3u8; 32], 1).public_material(7).unwrap();
        let announcement_path = dir.path().join("oracle.json");
        fs::write(&announcement_path, serde_json::to_string(&announcement).unwrap()).unwrap();

        let mut args = run_args(dir.path());
        args.payout_second = Some(payout.to_string());
        args.oracle_announcement = Some(announcement_path);
        let config = RunConfig::new(args).unwrap();

        assert_eq!(config.payouts.first, None);
        assert_eq!(config.payouts.second, Some(payout.script_pubkey()));
        assert_eq!(config.announcement, Some(announcement));
        assert_eq!(config.outcome, Some(vec![vec![1]]));
        assert_ne!(config.wallet_seed, config.oracle_seed);
    }

    #[test]
    fn test_run_config_rejects_foreign_network_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = run_args(dir.path());
        args.payout_first = Some("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string());
        assert!(RunConfig::new(args).is_err());
    }

    #[test]
    fn test_demo_wallets_differ_per_party() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::new(run_args(dir.path())).unwrap();
        let mut first = funded_wallet(&config, Party::First).unwrap();
        let mut second = funded_wallet(&config, Party::Second).unwrap();

        assert_ne!(first.new_pubkey().unwrap(), second.new_pubkey().unwrap());
        assert!(first.balance() > required_amount(&config.conditions, Party::First));
    }
}
