//! Operator CLI for the anchoring engine.

use std::collections::VecDeque;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use vote_anchor::chain::{ChainConfig, RegistryClient};
use vote_anchor::crypto::{generate_commitment, DEFAULT_SERVER_SALT};
use vote_anchor::domain::Commitment;
use vote_anchor::infra::{
    drive_vote, AnchorWorkerConfig, AnchoringOrchestrator, CommitmentRegistry, PgVoteLedger,
    SweepReport, VoteLedger,
};

fn print_help() {
    eprintln!(
        "\
vote-anchor-admin

USAGE:
  vote-anchor-admin <command> [options]

COMMANDS:
  migrate               Run database migrations
  anchor-pending        Re-drive unfinished votes through the anchoring engine
  chain-status          Show chain client account, balance and registry
  verify-commitment     Check whether a commitment exists on-chain
  generate-commitment   Compute a commitment locally (no chain interaction)

COMMON OPTIONS:
  --database-url <postgres_url>   (defaults to env DATABASE_URL)

anchor-pending OPTIONS:
  --count <n>                     Process at most n votes (default: 10)
  --all                           Process every unfinished vote
  --vote-id <uuid>                Process a single vote
  --include-failed                Also re-drive failed votes inside their
                                  attempt budget

verify-commitment OPTIONS:
  --commitment <0xhex>            (required) 66-character commitment

generate-commitment OPTIONS:
  --secret <string>               (required) Voter secret
  --election-id <uuid>            (required)
  --candidate-id <uuid>           (required)
  --salt <string>                 (default: the built-in server salt)
"
    );
}

struct Args {
    flags: std::collections::HashMap<String, String>,
    switches: std::collections::HashSet<String>,
}

impl Args {
    fn parse(mut raw: VecDeque<String>) -> anyhow::Result<Self> {
        let mut flags = std::collections::HashMap::new();
        let mut switches = std::collections::HashSet::new();

        while let Some(arg) = raw.pop_front() {
            let Some(name) = arg.strip_prefix("--") else {
                anyhow::bail!("unexpected argument: {arg}");
            };

            match raw.front() {
                Some(value) if !value.starts_with("--") => {
                    let value = raw.pop_front().expect("peeked");
                    flags.insert(name.to_string(), value);
                }
                _ => {
                    switches.insert(name.to_string());
                }
            }
        }

        Ok(Self { flags, switches })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> anyhow::Result<&str> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("--{name} is required"))
    }

    fn has(&self, name: &str) -> bool {
        self.switches.contains(name)
    }
}

async fn connect_pool(args: &Args) -> anyhow::Result<sqlx::PgPool> {
    let database_url = match args.get("database-url") {
        Some(url) => url.to_string(),
        None => std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("set --database-url or DATABASE_URL"))?,
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    Ok(pool)
}

async fn cmd_migrate(args: Args) -> anyhow::Result<()> {
    let pool = connect_pool(&args).await?;
    vote_anchor::migrations::run_postgres(&pool).await?;
    println!("migrations applied");
    Ok(())
}

async fn cmd_chain_status() -> anyhow::Result<()> {
    let config = ChainConfig::require_env()?;
    let client = RegistryClient::connect(config).await?;

    let balance = client.balance().await?;
    println!("account:  {}", client.account_address());
    println!("registry: {}", client.registry_address());
    println!("chain id: {}", client.chain_id());
    println!("balance:  {:.6} native ({} wei)", balance.native, balance.wei);
    Ok(())
}

async fn cmd_verify_commitment(args: Args) -> anyhow::Result<()> {
    let commitment: Commitment = args.require("commitment")?.parse()?;

    let config = ChainConfig::require_env()?;
    let client = RegistryClient::connect(config).await?;

    if client.has_commitment(&commitment).await? {
        let block = client.commitment_block(&commitment).await?;
        let sender = client.commitment_sender(&commitment).await?;
        println!("commitment {commitment} exists");
        if let Some(block) = block {
            println!("  block:  {block}");
        }
        if let Some(sender) = sender {
            println!("  sender: {sender}");
        }
    } else {
        println!("commitment {commitment} not found on-chain");
    }
    Ok(())
}

fn cmd_generate_commitment(args: Args) -> anyhow::Result<()> {
    let secret = args.require("secret")?;
    let election_id: Uuid = args.require("election-id")?.parse()?;
    let candidate_id: Uuid = args.require("candidate-id")?.parse()?;
    let salt = args.get("salt").unwrap_or(DEFAULT_SERVER_SALT);

    let commitment = generate_commitment(secret, &election_id, &candidate_id, salt)?;
    println!("{commitment}");
    Ok(())
}

async fn cmd_anchor_pending(args: Args) -> anyhow::Result<()> {
    let pool = connect_pool(&args).await?;
    let ledger = Arc::new(PgVoteLedger::new(pool));

    let chain_config = ChainConfig::require_env()?;
    let confirm_timeout = chain_config.confirm_timeout;
    let client = Arc::new(RegistryClient::connect(chain_config).await?);

    println!("connected as {}", client.account_address());
    let balance = client.balance().await?;
    println!("account balance: {:.6} native", balance.native);

    let orchestrator = AnchoringOrchestrator::new(
        ledger.clone() as Arc<dyn VoteLedger>,
        Some(client as Arc<dyn CommitmentRegistry>),
        confirm_timeout,
    );

    let worker_config = AnchorWorkerConfig::from_env();
    let include_failed = args.has("include-failed");

    let votes = if let Some(vote_id) = args.get("vote-id") {
        let vote_id: Uuid = vote_id.parse()?;
        let vote = ledger
            .vote(vote_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("vote not found: {vote_id}"))?;
        if !vote.onchain_status.needs_anchor() {
            anyhow::bail!(
                "vote {vote_id} is already settled ({})",
                vote.onchain_status
            );
        }
        vec![vote]
    } else {
        let limit = if args.has("all") {
            i64::MAX
        } else {
            args.get("count")
                .map(|c| c.parse::<i64>())
                .transpose()?
                .unwrap_or(10)
        };
        ledger
            .votes_needing_anchor(limit, include_failed, worker_config.retry.max_attempts)
            .await?
    };

    if votes.is_empty() {
        println!("no unfinished votes to process");
        return Ok(());
    }

    println!("processing {} vote(s)...", votes.len());

    let mut report = SweepReport::default();
    for vote in votes {
        print!("  {} ({}) ... ", vote.id, vote.onchain_status);
        let result = drive_vote(&orchestrator, &worker_config.retry, vote.id).await;
        match &result {
            Ok(outcome) => println!("{outcome:?}"),
            Err(err) => println!("error: {err}"),
        }
        report.tally(&result);
    }

    println!(
        "done: {} processed, {} anchored, {} already on-chain, {} awaiting, {} rejected, {} errors",
        report.processed,
        report.anchored,
        report.already_onchain,
        report.awaiting,
        report.rejected,
        report.errors
    );

    if report.failures() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut raw: VecDeque<String> = std::env::args().skip(1).collect();

    let Some(command) = raw.pop_front() else {
        print_help();
        std::process::exit(2);
    };

    let args = Args::parse(raw)?;

    match command.as_str() {
        "migrate" => cmd_migrate(args).await,
        "anchor-pending" => cmd_anchor_pending(args).await,
        "chain-status" => cmd_chain_status().await,
        "verify-commitment" => cmd_verify_commitment(args).await,
        "generate-commitment" => cmd_generate_commitment(args),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("unknown command: {other}\n");
            print_help();
            std::process::exit(2);
        }
    }
}
