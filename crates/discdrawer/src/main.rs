//! `ddraw` - CLI for discdrawer
//!
//! This binary maintains the disc catalog and runs interactive throw
//! measurements against the configured location provider.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use discdrawer::cli::measure::{self, SessionEnd};
use discdrawer::cli::{
    Cli, Command, ConfigCommand, DiscCommand, MeasureCommand, StatsCommand, ThrowsCommand,
};
use discdrawer::config::{InhibitorKind, ProviderKind};
use discdrawer::position::{simulated, GpsdProvider};
use discdrawer::power::{NoopIdleTimer, SystemdInhibitor};
use discdrawer::{
    init_logging, Config, DiscRef, Error, IdleTimer, LocationProvider, MeasurementSession,
    NewDisc, PositionSource, SqliteThrowStore, Storage, Units,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let command = match cli.command {
        // config commands report on broken configuration instead of failing on it
        Command::Config(config_cmd) => return handle_config(cli.config, config_cmd),
        command => command,
    };

    let config = Config::load_from(cli.config)?;

    match command {
        Command::Disc(disc_cmd) => handle_disc(&config, disc_cmd),
        Command::Measure(measure_cmd) => handle_measure(&config, measure_cmd).await,
        Command::Throws(throws_cmd) => handle_throws(&config, throws_cmd),
        Command::Stats(stats_cmd) => handle_stats(&config, &stats_cmd),
        Command::Config(_) => Ok(()),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening catalog at {}", path.display()))
}

fn handle_disc(config: &Config, cmd: DiscCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let units = config.display.units;

    match cmd {
        DiscCommand::Add(args) => {
            let disc = storage.insert_disc(&NewDisc::from(args))?;
            println!("Added disc #{}: {}", disc.id, disc.fields.name);
        }
        DiscCommand::Edit(args) => {
            let disc_ref = DiscRef::new(args.id);
            let disc = storage
                .get_disc(disc_ref)?
                .ok_or_else(|| Error::not_found("disc", args.id))?;
            let disc = storage.update_disc(disc_ref, &args.apply(disc.fields))?;
            println!("Updated disc #{}: {}", disc.id, disc.fields.name);
        }
        DiscCommand::List { in_bag, json } => {
            let discs = storage.list_discs(in_bag)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&discs)?);
            } else if discs.is_empty() {
                println!("No discs in the catalog. Add one with `ddraw disc add`.");
            } else {
                println!(
                    "{:>4}  {:<20} {:<14} {:<10} {:<18} {}",
                    "ID", "NAME", "MANUFACTURER", "PLASTIC", "FLIGHT", "BAG"
                );
                for disc in &discs {
                    println!(
                        "{:>4}  {:<20} {:<14} {:<10} {:<18} {}",
                        disc.id,
                        disc.fields.name,
                        disc.manufacturer_or_na(),
                        disc.plastic_or_na(),
                        disc.flight_numbers(),
                        if disc.fields.in_bag { "yes" } else { "" }
                    );
                }
            }
        }
        DiscCommand::Show { id, json } => {
            let disc_ref = DiscRef::new(id);
            let disc = storage
                .get_disc(disc_ref)?
                .ok_or_else(|| Error::not_found("disc", id))?;
            let throws = storage.throws_for_disc(disc_ref)?;

            if json {
                let value = serde_json::json!({ "disc": disc, "throws": throws });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("{} (#{})", disc.fields.name, disc.id);
            println!("  Manufacturer: {}", disc.manufacturer_or_na());
            println!("  Plastic:      {}", disc.plastic_or_na());
            println!("  Type:         {}", disc.disc_type());
            println!("  Flight:       {}", disc.flight_numbers());
            if let Some(weight) = disc.fields.weight {
                println!("  Weight:       {weight} g");
            }
            println!("  Condition:    {}", disc.condition());
            println!("  Stability:    {}", disc.stability());
            println!("  In bag:       {}", disc.fields.in_bag);
            println!();
            if throws.is_empty() {
                println!("No measured throws yet.");
            } else {
                println!("Throws:");
                for throw in &throws {
                    println!(
                        "  #{:<4} {:>12}  {}",
                        throw.id,
                        units.format_distance(throw.distance_m),
                        throw.thrown_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        DiscCommand::Remove { id } => {
            if storage.delete_disc(DiscRef::new(id))? {
                println!("Removed disc #{id} and its throws.");
            } else {
                return Err(Error::not_found("disc", id).into());
            }
        }
    }
    Ok(())
}

fn build_provider(
    config: &Config,
    cmd: &MeasureCommand,
) -> anyhow::Result<Arc<dyn LocationProvider>> {
    if let Some(track) = &cmd.simulate {
        let interval = cmd
            .interval_ms
            .map_or_else(|| config.simulated_interval(), Duration::from_millis);
        return Ok(Arc::new(simulated::from_track_file(track, interval)?));
    }

    match config.location.provider {
        ProviderKind::Gpsd => Ok(Arc::new(GpsdProvider::new(config.gpsd()))),
        ProviderKind::Simulated => {
            let track = config
                .location
                .simulated_track
                .as_ref()
                .context("location.simulated_track is not set")?;
            Ok(Arc::new(simulated::from_track_file(
                track,
                config.simulated_interval(),
            )?))
        }
    }
}

fn idle_timer(config: &Config) -> Arc<dyn IdleTimer> {
    if !config.session.keep_awake {
        return Arc::new(NoopIdleTimer);
    }
    match config.session.inhibitor {
        InhibitorKind::Systemd => Arc::new(SystemdInhibitor::new()),
        InhibitorKind::None => Arc::new(NoopIdleTimer),
    }
}

async fn handle_measure(config: &Config, cmd: MeasureCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let disc_ref = DiscRef::new(cmd.disc_id);
    let disc = storage
        .get_disc(disc_ref)?
        .ok_or_else(|| Error::not_found("disc", cmd.disc_id))?;
    let units = cmd.units.map_or(config.display.units, Units::from);

    let provider = build_provider(config, &cmd)?;
    let source = Arc::new(PositionSource::new(provider));
    let store = Arc::new(SqliteThrowStore::new(storage));

    println!(
        "Measuring a throw with {} ({}) using {}",
        disc.fields.name,
        disc.manufacturer_or_na(),
        source.provider_name()
    );
    println!("Press Enter to mark, q then Enter to quit.");

    let faults = source.faults();
    let mut session = MeasurementSession::open(disc_ref, source, store, idle_timer(config));
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    match measure::run(&mut session, faults, input, &mut stdout, units).await? {
        SessionEnd::Saved(_) => {}
        SessionEnd::Discarded => {
            session.discard();
            println!("Measurement discarded.");
        }
    }
    Ok(())
}

fn handle_throws(config: &Config, cmd: ThrowsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        ThrowsCommand::List { disc, limit, json } => {
            let throws = match disc {
                Some(id) => {
                    let mut throws = storage.throws_for_disc(DiscRef::new(id))?;
                    throws.sort_by(|a, b| b.distance_m.total_cmp(&a.distance_m));
                    throws.truncate(limit.unwrap_or(usize::MAX));
                    throws
                }
                None => storage.list_throws(limit)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&throws)?);
                return Ok(());
            }
            if throws.is_empty() {
                println!("No measured throws.");
                return Ok(());
            }

            let names: HashMap<DiscRef, String> = storage
                .list_discs(false)?
                .into_iter()
                .map(|d| (d.id, d.fields.name))
                .collect();
            let units = config.display.units;
            println!(
                "{:>5}  {:<20} {:>12}  {}",
                "ID", "DISC", "DISTANCE", "THROWN"
            );
            for throw in &throws {
                println!(
                    "{:>5}  {:<20} {:>12}  {}",
                    throw.id,
                    names.get(&throw.disc).map_or("?", String::as_str),
                    units.format_distance(throw.distance_m),
                    throw.thrown_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ThrowsCommand::Delete { id } => {
            if storage.delete_throw(id)? {
                println!("Deleted throw #{id}.");
            } else {
                return Err(Error::not_found("throw", id).into());
            }
        }
    }
    Ok(())
}

fn handle_stats(config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if cmd.json {
        let value = serde_json::json!({
            "database_path": storage.path(),
            "total_discs": stats.total_discs,
            "discs_in_bag": stats.discs_in_bag,
            "total_throws": stats.total_throws,
            "longest_throw": stats.longest_throw,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let units = config.display.units;
    println!("ddraw stats");
    println!("-----------");
    println!("Database:      {}", storage.path().display());
    println!("Discs:         {} ({} in bag)", stats.total_discs, stats.discs_in_bag);
    println!("Throws:        {}", stats.total_throws);
    if let Some(longest) = &stats.longest_throw {
        println!(
            "Longest throw: {} (disc #{})",
            units.format_distance(longest.distance_m),
            longest.disc
        );
    }
    println!("Size:          {} bytes", stats.db_size_bytes);
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Location]");
                println!("  Provider:           {}", config.location.provider);
                println!(
                    "  gpsd:               {}:{}",
                    config.location.gpsd_host, config.location.gpsd_port
                );
                println!("  Min fix mode:       {}", config.location.min_fix_mode);
                println!("  Reconnect delay:    {:?}", config.reconnect_delay());
                if let Some(track) = &config.location.simulated_track {
                    println!("  Simulated track:    {}", track.display());
                }
                println!();
                println!("[Session]");
                println!("  Keep awake:         {}", config.session.keep_awake);
                println!("  Inhibitor:          {:?}", config.session.inhibitor);
                println!();
                println!("[Display]");
                println!("  Units:              {}", config.display.units);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
