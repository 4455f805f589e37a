use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use wildgrid_core::{
    DeathCause, Environment, Species, TerrainData, WildgridConfig, standard_blueprints,
};

/// Built-in island: a lake, two rock outcrops, and open meadow ringed by sea.
const ISLAND: &str = "
    ~~~~~~~~~~~~~~~~~~~~~~~~
    ~......................~
    ~......................~
    ~...##.................~
    ~...##.........~~......~
    ~..............~~~.....~
    ~...............~~.....~
    ~......................~
    ~......................~
    ~..........#...........~
    ~..........#...........~
    ~......................~
    ~......................~
    ~......................~
    ~.....~~...............~
    ~.....~~.......##......~
    ~......................~
    ~......................~
    ~......................~
    ~......................~
    ~......................~
    ~......................~
    ~......................~
    ~~~~~~~~~~~~~~~~~~~~~~~~
";

#[derive(Parser, Debug)]
#[command(
    name = "wildgrid",
    version,
    about = "Run a headless grid-world ecosystem and log how it evolves"
)]
struct Cli {
    /// RNG seed; omit for a different world every run.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 3000)]
    ticks: u64,

    /// ASCII terrain file (`~` water, `.` open, `#` blocked); uses the
    /// built-in island when omitted.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Grass patches to seed.
    #[arg(long, default_value_t = 60)]
    grass: u32,

    /// Rabbits to seed.
    #[arg(long, default_value_t = 18)]
    rabbits: u32,

    /// Foxes to seed.
    #[arg(long, default_value_t = 4)]
    foxes: u32,

    /// Ticks between logged population summaries; 0 disables them.
    #[arg(long, default_value_t = 200)]
    summary_interval: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let text = match &cli.map {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read terrain map {}", path.display()))?,
        None => ISLAND.to_owned(),
    };
    let terrain = TerrainData::from_ascii(&text).context("failed to parse terrain map")?;

    let config = WildgridConfig {
        rng_seed: cli.seed,
        ..WildgridConfig::default()
    };
    let mut env = Environment::new(&terrain, &standard_blueprints(), config)
        .context("failed to build the world")?;

    info!(size = env.grid().size(), seed = ?cli.seed, "world built");
    for line in env.relationships().describe() {
        info!("{line}");
    }

    let report = env.populate(&[
        (Species::Grass, cli.grass),
        (Species::Rabbit, cli.rabbits),
        (Species::Fox, cli.foxes),
    ]);
    info!(spawned = report.spawned, "world seeded");
    if report.exhausted > 0 {
        warn!(
            exhausted = report.exhausted,
            "ran out of open tiles while seeding"
        );
    }

    for _ in 0..cli.ticks {
        env.step();
        let tick = env.tick().0;
        if cli.summary_interval > 0 && tick.is_multiple_of(cli.summary_interval) {
            log_summary(&env);
        }
        if env.population_of(Species::Rabbit) == 0 && env.population_of(Species::Fox) == 0 {
            info!(tick, "every creature has died; stopping early");
            break;
        }
    }

    log_summary(&env);
    for species in Species::ALL {
        for cause in DeathCause::ALL {
            let count = env.death_count(species, cause);
            if count > 0 {
                info!("{count} {species} death(s) from {cause}");
            }
        }
    }
    Ok(())
}

fn log_summary(env: &Environment) {
    info!(
        tick = env.tick().0,
        grass = env.population_of(Species::Grass),
        rabbits = env.population_of(Species::Rabbit),
        foxes = env.population_of(Species::Fox),
        births = env.births(),
        deaths = env.deaths(),
        "population"
    );
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
