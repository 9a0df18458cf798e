//! Proxmox VE VM provisioning CLI (pvevm)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;

use pvevm::commands::{CreateArgs, CreateCommand, ListKeysCommand};
use pvevm::config::ProvisionConfig;
use pve_vm_keys::FsKeyStore;

#[derive(Parser)]
#[command(name = "pvevm")]
#[command(about = "Create cloud-init VMs on a Proxmox VE host")]
#[command(version, disable_version_flag = true)]
#[command(long_about = "
Create cloud-init VMs on a Proxmox VE host

Every VM parameter can be given as a flag. Missing or invalid values are asked
for interactively; with --non-interactive (or without a terminal) they are
fatal instead.

Examples:
  pvevm                                          # Ask for everything
  pvevm --id 105 --name web1 --ram 4 --cores 2 \\
        --disk-size 20 --storage local-lvm --user admin \\
        --ubuntu-version noble --use-ssh-key ops --dhcp
  pvevm --ip 10.0.0.5 --gateway-ip 10.0.0.1 --dns-servers '1.1.1.1 8.8.8.8'
  pvevm --dry-run -y ...                         # Print qm commands only
  pvevm --list-ssh-keys                          # Show available SSH keys
  pvevm --print-config                           # Show effective configuration
")]
struct Cli {
    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Enable verbose output
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// List available SSH keys and exit
    #[arg(long)]
    list_ssh_keys: bool,

    #[command(flatten)]
    create: CreateArgs,
}

async fn run(cli: &Cli) -> Result<()> {
    let config = ProvisionConfig::load(cli.config.as_deref())?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if cli.list_ssh_keys {
        let key_store = FsKeyStore::with_keygen(&config.key_store_dir, &config.ssh_keygen_path);
        return ListKeysCommand::new(Arc::new(key_store)).execute();
    }

    let cmd = CreateCommand::from_config(config, &cli.create)?;
    cmd.execute(&cli.create).await.map(drop)
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    // Initialize logging based on verbosity
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(&cli).await {
        Ok(()) => {
            log::info!("Command completed successfully");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);

            // Print error chain if in verbose mode
            if cli.verbose || cli.debug {
                for cause in e.chain().skip(1) {
                    eprintln!("  Caused by: {}", cause);
                }
            }
            std::process::exit(1);
        }
    }
}
