use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use card_duel::ledger::{Address, LedgerClient, Plaintext};
use card_duel::local::{LocalStack, LOCAL_CONTRACT_ADDRESS};
use card_duel::reveal::WalletSigner;
use card_duel::session::{Outcome, RoundResult, Scoreboard};
use card_duel::SessionConfig;

const LOG_TARGET: &str = "bin::card_duel_demo";

#[derive(Debug, Parser)]
#[command(name = "card_duel_demo")]
#[command(about = "Play one encrypted card duel against the system", long_about = None)]
struct Args {
    /// RNG seed for deals, wallet keys and reveal keypairs
    #[arg(long, env = "CARD_DUEL_RNG_SEED")]
    seed: Option<u64>,

    /// Hand slots to play, in order (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "0,1,2,3,4")]
    order: Vec<u8>,

    /// Game contract address; defaults to the local deployment
    #[arg(long, env = "CARD_DUEL_CONTRACT_ADDRESS")]
    contract_address: Option<Address>,

    /// Print the final summary as JSON and emit JSON logs
    #[arg(long, env = "CARD_DUEL_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    player: Address,
    hand: Vec<Option<Plaintext>>,
    rounds: Vec<RoundResult>,
    scoreboard: Scoreboard,
    outcome: Outcome,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;

    let mut config = SessionConfig::from_env().context("invalid session configuration")?;
    config.rng_seed = args.seed.or(config.rng_seed);
    config.contract_address = Some(
        args.contract_address
            .or(config.contract_address)
            .unwrap_or(LOCAL_CONTRACT_ADDRESS),
    );

    let stack = LocalStack::spawn(config).context("failed to build local stack")?;
    stack.connect_wallet();
    let session = &stack.session;
    let player = stack.wallet.address();

    session
        .start_game()
        .await
        .context("Failed to start the game")?;
    let hand: Vec<Option<Plaintext>> = session.hand().iter().map(|card| card.value).collect();
    if !args.json {
        println!("Your hand: {}", render(&hand));
    }

    for index in &args.order {
        if let Err(err) = session.play_card(*index).await {
            warn!(target: LOG_TARGET, index, status = %err.status_message(), "move rejected");
            if !args.json {
                println!("Slot {index}: {}", err.status_message());
            }
            continue;
        }
        let remaining = stack
            .client
            .remaining_rounds(player)
            .await
            .context("failed to query remaining rounds")?;
        if let (Some(round), false) = (session.round_results().last(), args.json) {
            println!(
                "Round {}: you {} vs system {} -> {:?} ({remaining} left)",
                round.round,
                render_one(round.player_card),
                render_one(round.system_card),
                round.outcome
            );
        }
    }

    if session.game_view().active {
        info!(target: LOG_TARGET, "order did not finish the game");
    } else if !session.outcome().is_decided() {
        session
            .refresh_reveals()
            .await
            .context("final scores could not be decrypted")?;
    }

    let summary = Summary {
        player,
        hand,
        rounds: session.round_results(),
        scoreboard: session.scoreboard(),
        outcome: session.outcome(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Final score: you {} - system {}",
            render_one(summary.scoreboard.player),
            render_one(summary.scoreboard.system)
        );
        if let Some(line) = session.status().headline() {
            println!("{line}");
        }
    }

    stack.shutdown().await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn render_one(value: Option<Plaintext>) -> String {
    value.map_or_else(|| "?".to_string(), |value| value.to_string())
}

fn render(values: &[Option<Plaintext>]) -> String {
    values
        .iter()
        .map(|value| render_one(*value))
        .collect::<Vec<_>>()
        .join(" ")
}
