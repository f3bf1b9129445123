// Integrity Verify CLI
//
// Command-line interface over the verification library.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use integrity_verify::api::{ConfigManager, ReportFormat, ReportFormatter, Verifier, VerifyOptions};
use integrity_verify::artifact::LoaderSource;
use integrity_verify::storage::{calculate_erc7201_base_slot, slot_hex};
use integrity_verify::EthersCrypto;

/// Integrity Verify - deployed contract integrity checker
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the contracts listed in a configuration file
    Verify {
        /// Path to the JSON configuration file
        #[clap(short, long)]
        config: PathBuf,

        /// Only verify the contract with this name
        #[clap(long)]
        contract: Option<String>,

        /// Only verify contracts on this chain
        #[clap(long)]
        chain: Option<String>,

        #[clap(long)]
        skip_bytecode: bool,

        #[clap(long)]
        skip_abi: bool,

        #[clap(long)]
        skip_state: bool,

        /// Show matched constructor arguments and per-check detail
        #[clap(short, long)]
        verbose: bool,

        /// Output format (text, json)
        #[clap(short, long, default_value = "text")]
        format: String,

        /// Output file path
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the ERC-7201 base slot of a namespace id
    Slot {
        /// Namespace id, e.g. "example.main"
        namespace_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            config,
            contract,
            chain,
            skip_bytecode,
            skip_abi,
            skip_state,
            verbose,
            format,
            output,
        } => {
            let verifier_config = ConfigManager::load_from_file(&config).context("Failed to load configuration")?;

            let mut options = VerifyOptions::builder()
                .verbose(verbose)
                .skip_bytecode(skip_bytecode)
                .skip_abi(skip_abi)
                .skip_state(skip_state);
            if let Some(name) = contract {
                options = options.contract_filter(name);
            }
            if let Some(chain) = chain {
                options = options.chain_filter(chain);
            }
            let options = options.build();

            // Artifact and schema paths are relative to the config file
            let base_dir = config
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let verifier = Verifier::new(LoaderSource::filesystem(base_dir));

            let summary = verifier.verify_all(&verifier_config, &options).await;

            let report_format = match format.to_lowercase().as_str() {
                "json" => ReportFormat::Json,
                _ => ReportFormat::Text,
            };

            if let Some(output_path) = output {
                ReportFormatter::save_to_file(&summary, &output_path, report_format)
                    .context("Failed to save report")?;
                println!("Report saved to {:?}", output_path);
            } else {
                let report = match report_format {
                    ReportFormat::Json => ReportFormatter::to_json(&summary)?,
                    ReportFormat::Text => ReportFormatter::to_text(&summary),
                };
                println!("{}", report);
            }

            if !summary.all_passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Slot { namespace_id } => {
            let slot = calculate_erc7201_base_slot(&EthersCrypto, &namespace_id);
            println!("{}", slot_hex(&slot));
            Ok(())
        }
    }
}
