use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use packhorse::application::Backup;
use packhorse::cli::{Args, Commands, SaveOpts};
use packhorse::config::Config;
use packhorse::storage::swift::SwiftSettings;
use packhorse::storage::{StorageConfig, WriteParams};
use packhorse::{archive, naming};

fn main() {
    let args = Args::parse();

    if let Err(err) = initialize_logging(args.verbose) {
        eprintln!("failed to initialize logging: {:#}", err);
        process::exit(1);
    }

    if let Err(err) = run(&args) {
        error!("{:#}", err);
        process::exit(1);
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        log_level,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Save(opts) => run_save(opts),
    }
}

/// Validate the configuration, then perform the backup. Everything that can
/// be rejected without touching the network or the filesystem is rejected
/// here first.
fn run_save(opts: &SaveOpts) -> Result<()> {
    let backup_name =
        naming::derive_backup_name(&opts.resources, opts.name.as_deref(), &opts.format)
            .context("configure backup name")?;

    let archiver = archive::identify(&backup_name).context("identify archiver")?;

    let storage_config = load_storage_config(opts)?;
    let storage = storage_config.build().context("configure storage")?;

    let mut write_params = storage_config.write_params();
    apply_write_param_flags(&mut write_params, opts);
    write_params.set_name(&backup_name);

    info!("Creating new backup: {}", backup_name);

    let backup = Backup::new(storage, archiver);
    let cancel = CancellationToken::new();

    let runtime = Runtime::new().context("build tokio runtime")?;
    runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling backup");
                interrupt.cancel();
            }
        });

        match backup.save(&cancel, &opts.resources, &write_params).await {
            Ok(()) => {
                info!("Backup saved as {}", backup_name);
                Ok(())
            }
            Err(_) if cancel.is_cancelled() => {
                info!("Backup cancelled");
                Ok(())
            }
            Err(err) => Err(err.context("perform backup")),
        }
    })
}

/// Resolve the storage configuration from the config file, the --storage
/// flag, or both (in which case they must agree).
fn load_storage_config(opts: &SaveOpts) -> Result<StorageConfig> {
    match (&opts.config, opts.storage) {
        (Some(path), selected) => {
            let config = Config::from_yaml_file(path)?;
            if let Some(kind) = selected {
                if config.storage.kind() != kind {
                    bail!(
                        "--storage {} does not match the {} storage configured in {}",
                        kind,
                        config.storage.kind(),
                        path.display()
                    );
                }
            }
            Ok(config.storage)
        }
        (None, Some(kind)) => Ok(match kind {
            packhorse::storage::StorageKind::Swift => {
                StorageConfig::Swift(SwiftSettings::default())
            }
        }),
        (None, None) => bail!("no storage configured: pass --config or --storage"),
    }
}

fn apply_write_param_flags(params: &mut WriteParams, opts: &SaveOpts) {
    match params {
        WriteParams::Swift(swift) => {
            if let Some(container) = &opts.swift_container {
                swift.container = container.clone();
            }
            if let Some(hash) = &opts.swift_hash {
                swift.hash = Some(hash.clone());
            }
            if let Some(content_type) = &opts.swift_content_type {
                swift.content_type = Some(content_type.clone());
            }
        }
    }
}
