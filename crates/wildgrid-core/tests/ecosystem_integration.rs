//! Whole-world runs: seeded replays, the spawn/death ledger, and the food
//! chain working end to end without any scripted scenario driving it.

use wildgrid_core::{
    Coord, DeathCause, Environment, Species, TerrainData, WildgridConfig, standard_blueprints,
};

/// 20x20 field with a two-tile water strip down each side, so every open
/// tile is within view range of a shore.
const POND_FIELD: &str = "
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
    ~~................~~
";

fn field_config(seed: u64) -> WildgridConfig {
    WildgridConfig {
        rng_seed: Some(seed),
        tree_probability: 0.0,
        ..WildgridConfig::default()
    }
}

fn field_world(config: WildgridConfig) -> Environment {
    let terrain = TerrainData::from_ascii(POND_FIELD).expect("field terrain parses");
    Environment::new(&terrain, &standard_blueprints(), config).expect("world builds")
}

#[test]
fn identical_seeds_replay_identical_histories() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let config = WildgridConfig {
            rng_seed: Some(42),
            tree_probability: 0.15,
            ..WildgridConfig::default()
        };
        let mut env = field_world(config);
        env.populate(&[
            (Species::Grass, 30),
            (Species::Rabbit, 8),
            (Species::Fox, 2),
        ]);
        for _ in 0..300 {
            env.step();
        }
        let history: Vec<_> = env.history().copied().collect();
        runs.push((history, env.populations(), env.births(), env.deaths()));
    }

    assert!(!runs[0].0.is_empty(), "the run recorded history snapshots");
    assert_eq!(runs[0], runs[1], "same seed, same world, same evolution");
}

#[test]
fn spawn_and_death_ledgers_reconcile() {
    let mut env = field_world(field_config(7));
    let report = env.populate(&[
        (Species::Grass, 40),
        (Species::Rabbit, 10),
        (Species::Fox, 3),
    ]);
    assert_eq!(report.exhausted, 0, "the field has room for the seed counts");

    let mut grass_respawns = 0u64;
    for _ in 0..600 {
        if env.step().grass_spawned.is_some() {
            grass_respawns += 1;
        }
    }

    let live = u64::from(env.populations().iter().sum::<u32>());
    assert_eq!(
        u64::from(report.spawned) + grass_respawns + env.births(),
        live + env.deaths(),
        "every entity that ever existed is either alive or in the death tallies"
    );
}

#[test]
fn hungry_rabbits_graze_grass_to_death() {
    let mut env = field_world(field_config(11));
    env.populate(&[(Species::Grass, 30)]);

    let spots = [Coord::new(5, 5), Coord::new(10, 10), Coord::new(15, 14)];
    for spot in spots {
        let rabbit = env.spawn(Species::Rabbit, spot, None).expect("rabbit spawns");
        env.creature_mut(rabbit)
            .expect("rabbit has creature state")
            .set_needs(0.5, 0.1, 0.0);
    }

    for _ in 0..400 {
        env.step();
    }

    assert!(
        env.death_count(Species::Grass, DeathCause::Eaten) > 0,
        "sustained grazing exhausts at least one grass patch"
    );
    assert_eq!(
        env.death_count(Species::Rabbit, DeathCause::Hunger),
        0,
        "a grazing rabbit in a full meadow does not starve"
    );
    assert_eq!(
        env.death_count(Species::Rabbit, DeathCause::Thirst),
        0,
        "shore water keeps grazers alive"
    );
}

#[test]
fn a_fox_takes_down_an_adjacent_rabbit() {
    let mut env = field_world(field_config(3));
    let rabbit = env
        .spawn(Species::Rabbit, Coord::new(10, 10), None)
        .expect("rabbit spawns");
    env.spawn(Species::Fox, Coord::new(11, 10), None)
        .expect("fox spawns");

    env.step();

    assert_eq!(env.death_count(Species::Rabbit, DeathCause::Eaten), 1);
    assert_eq!(env.population_of(Species::Rabbit), 0);
    assert!(
        env.entity(rabbit).is_none(),
        "an eaten rabbit leaves the arena at the end-of-tick commit"
    );
    assert_eq!(env.population_of(Species::Fox), 1);
}
