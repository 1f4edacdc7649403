//! verbum CLI: wordmap-weighted ownership economy engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use verbum::collab::TextUnit;
use verbum::config::EconomyConfig;
use verbum::engine::{Engine, EngineConfig};
use verbum::ids::{ContentHash, DomainId, RunId, UserId};
use verbum::ledger::Tier;
use verbum::market::MedallionKind;
use verbum::paths::VerbumPaths;
use verbum::payout::PayoutType;
use verbum::settlement::ClaimRequest;

#[derive(Parser)]
#[command(name = "verbum", version, about = "Wordmap-weighted ownership economy engine")]
struct Cli {
    /// Data directory for persistent storage (also holds economy.toml).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Economy config file (TOML). Defaults to the XDG config location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and write a default economy config.
    Init,

    /// Show engine info and statistics.
    Info,

    /// Ingest a text unit into a contributor's wordmap.
    Ingest {
        #[arg(long)]
        user: UserId,
        /// Identifier of the content unit (e.g. a recording id).
        #[arg(long)]
        unit_id: String,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// Read the text from a file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Wipe a contributor's wordmap.
    Reset { user: UserId },

    /// Show a domain wordmap.
    Wordmap { domain: DomainId },

    /// Compare two domain wordmaps.
    Compare { a: DomainId, b: DomainId },

    /// Score a candidate text against several domains.
    Score {
        /// Comma-separated domain ids.
        #[arg(long, value_delimiter = ',')]
        domains: Vec<DomainId>,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Unlock a domain for a user.
    Unlock {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        domain: DomainId,
        /// explorer, contributor or patron.
        #[arg(long)]
        tier: Tier,
    },

    /// Claim a reward for a generated artifact.
    Claim {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        domain: DomainId,
        /// Content hash of the artifact (idempotency key).
        #[arg(long)]
        hash: ContentHash,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Lower a user's share of a domain (admin).
    Revoke {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        domain: DomainId,
        /// New ownership percentage.
        #[arg(long)]
        pct: f64,
        #[arg(long)]
        reason: String,
    },

    /// List a user's domains.
    Domains { user: UserId },

    /// Record stakeholder activity.
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },

    /// Recompute a stakeholder's weight.
    Weights { user: UserId },

    /// Run a weighted distribution.
    Distribute {
        /// Unique run id; a completed run is never executed twice.
        #[arg(long)]
        run: RunId,
        /// Pool in minor units. Omit with `--type yield` to use the treasury yield pool.
        #[arg(long)]
        pool: Option<u64>,
        /// revenue, yield or sponsor.
        #[arg(long = "type", default_value = "revenue")]
        payout_type: PayoutType,
    },

    /// Medallion market operations.
    Medallion {
        #[command(subcommand)]
        action: MedallionAction,
    },

    /// Treasury operations.
    Treasury {
        #[command(subcommand)]
        action: TreasuryAction,
    },

    /// Show the ownership audit trail of a domain.
    Audit { domain: DomainId },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// A resolved prediction.
    Prediction {
        user: UserId,
        #[arg(long)]
        incorrect: bool,
    },
    /// One interaction.
    Interaction { user: UserId },
    /// A contribution, optionally matched to a sponsor.
    Contribution {
        user: UserId,
        #[arg(long)]
        sponsor: bool,
    },
}

#[derive(Subcommand)]
enum MedallionAction {
    /// Current price of a medallion type.
    Price { kind: MedallionKind },
    /// Mint a medallion at the current price.
    Mint {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        kind: MedallionKind,
    },
    /// Award an earned medallion.
    Award { user: UserId },
    /// Stake toward the cheapest available medallion.
    Stake {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        amount: u64,
    },
    /// List a medallion for sale.
    List {
        id: u64,
        #[arg(long)]
        seller: UserId,
        #[arg(long)]
        ask: u64,
    },
    /// Withdraw a listing.
    Delist {
        id: u64,
        #[arg(long)]
        seller: UserId,
    },
    /// Buy a listed medallion.
    Buy {
        id: u64,
        #[arg(long)]
        buyer: UserId,
    },
    /// Record a resolved outcome for a medallion's holder.
    Outcome {
        id: u64,
        #[arg(long)]
        crashed: bool,
    },
    /// Revoke a medallion.
    Revoke {
        id: u64,
        #[arg(long)]
        reason: String,
    },
    /// Supply and price per type.
    Supply,
    /// Open listings, cheapest first.
    Listings,
}

#[derive(Subcommand)]
enum TreasuryAction {
    /// Deposit into the treasury.
    Deposit { amount: u64 },
    /// Show the treasury balance and yield pool.
    Show,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn read_text(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(file)) => std::fs::read_to_string(&file).into_diagnostic(),
        (None, None) => miette::bail!("provide the text with --text or --file"),
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(ref dir) => VerbumPaths::rooted(dir),
        None => VerbumPaths::resolve()?,
    };
    let config_file = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let economy = if config_file.exists() {
        EconomyConfig::load(&config_file)?
    } else {
        EconomyConfig::default()
    };
    let config = EngineConfig {
        data_dir: Some(paths.data_dir.clone()),
        economy,
    };

    if let Commands::Init = cli.command {
        paths.ensure_dirs()?;
        if !config_file.exists() {
            config.economy.save(&config_file)?;
        }
        let engine = Engine::new(config)?;
        println!("Initialized verbum at {}", paths.data_dir.display());
        println!("Config: {}", config_file.display());
        println!("{}", engine.info());
        return Ok(());
    }

    let engine = Engine::new(config)?;

    match cli.command {
        Commands::Init => {}

        Commands::Info => {
            println!("{}", engine.info());
        }

        Commands::Ingest {
            user,
            unit_id,
            text,
            file,
        } => {
            let text = read_text(text, file)?;
            let report = engine.ingest(TextUnit {
                unit_id,
                user,
                text,
            })?;
            print_json(&report)?;
        }

        Commands::Reset { user } => {
            let domains = engine.reset_contributor_wordmap(&user)?;
            print_json(&domains)?;
        }

        Commands::Wordmap { domain } => {
            print_json(&engine.wordmap(&domain)?)?;
        }

        Commands::Compare { a, b } => {
            print_json(&engine.compare(&a, &b)?)?;
        }

        Commands::Score {
            domains,
            text,
            file,
        } => {
            let text = read_text(text, file)?;
            print_json(&engine.score_across_domains(&text, &domains))?;
        }

        Commands::Unlock { user, domain, tier } => {
            print_json(&engine.unlock(&user, &domain, tier)?)?;
        }

        Commands::Claim {
            user,
            domain,
            hash,
            text,
            file,
            content_type,
        } => {
            let text = read_text(text, file)?;
            let outcome = engine.claim_reward(ClaimRequest {
                user,
                domain,
                content_hash: hash,
                text,
                content_type,
            })?;
            print_json(&outcome)?;
        }

        Commands::Revoke {
            user,
            domain,
            pct,
            reason,
        } => {
            print_json(&engine.revoke_ownership(&user, &domain, pct, &reason)?)?;
        }

        Commands::Domains { user } => {
            print_json(&engine.user_domains(&user))?;
        }

        Commands::Activity { action } => {
            let stats = match action {
                ActivityAction::Prediction { user, incorrect } => {
                    engine.record_prediction(&user, !incorrect)?
                }
                ActivityAction::Interaction { user } => engine.record_interaction(&user)?,
                ActivityAction::Contribution { user, sponsor } => {
                    engine.record_contribution(&user, sponsor)?
                }
            };
            print_json(&stats)?;
        }

        Commands::Weights { user } => {
            print_json(&engine.update_weights(&user)?)?;
        }

        Commands::Distribute {
            run,
            pool,
            payout_type,
        } => {
            let shares = match (pool, payout_type) {
                (Some(pool), payout_type) => engine.distribute_payout(&run, pool, payout_type)?,
                (None, PayoutType::Yield) => engine.distribute_yield(&run)?,
                (None, _) => miette::bail!("--pool is required for {payout_type} distributions"),
            };
            print_json(&shares)?;
        }

        Commands::Medallion { action } => match action {
            MedallionAction::Price { kind } => {
                print_json(&engine.medallion_price(kind))?;
            }
            MedallionAction::Mint { user, kind } => {
                print_json(&engine.mint_medallion(&user, kind)?)?;
            }
            MedallionAction::Award { user } => {
                print_json(&engine.award_earned(&user)?)?;
            }
            MedallionAction::Stake { user, amount } => {
                print_json(&engine.stake_toward_medallion(&user, amount)?)?;
            }
            MedallionAction::List { id, seller, ask } => {
                let id = Engine::medallion_id(id)?;
                print_json(&engine.list_medallion(id, &seller, ask)?)?;
            }
            MedallionAction::Delist { id, seller } => {
                let id = Engine::medallion_id(id)?;
                print_json(&engine.delist_medallion(id, &seller)?)?;
            }
            MedallionAction::Buy { id, buyer } => {
                let id = Engine::medallion_id(id)?;
                print_json(&engine.buy_medallion(id, &buyer)?)?;
            }
            MedallionAction::Outcome { id, crashed } => {
                let id = Engine::medallion_id(id)?;
                print_json(&engine.record_medallion_outcome(id, crashed)?)?;
            }
            MedallionAction::Revoke { id, reason } => {
                let id = Engine::medallion_id(id)?;
                print_json(&engine.revoke_medallion(id, &reason)?)?;
            }
            MedallionAction::Supply => {
                print_json(&engine.medallion_supply())?;
            }
            MedallionAction::Listings => {
                print_json(&engine.medallion_listings())?;
            }
        },

        Commands::Treasury { action } => match action {
            TreasuryAction::Deposit { amount } => {
                print_json(&engine.treasury_deposit(amount)?)?;
            }
            TreasuryAction::Show => {
                print_json(&engine.treasury())?;
            }
        },

        Commands::Audit { domain } => {
            print_json(&engine.audit_log(&domain))?;
        }
    }

    Ok(())
}
