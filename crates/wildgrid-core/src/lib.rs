//! Core simulation state for wildgrid.
//!
//! The crate is organised around one [`Environment`] value per world: it owns
//! the entity arena, the per-species spatial maps, the precomputed terrain
//! caches, and the seeded RNG, and it is the single gateway creatures use for
//! sensing and registration. There is no global state; two worlds built from
//! the same terrain, blueprints, and seed evolve identically.

pub mod creature;
pub mod environment;
pub mod terrain;

use std::fmt;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, new_key_type};
use thiserror::Error;

pub use creature::{CachedPath, CreatureAction, CreatureState, MoveState, Pregnancy};
pub use environment::{Environment, SpawnReport, Surroundings, TickReport, TickSummary};
pub use terrain::{TerrainData, TerrainError, WorldGrid};
pub use wildgrid_geom::{Coord, GridMask};
pub use wildgrid_genes::{Genes, Sex};
use wildgrid_index::IndexError;

/// Sensing radius for every creature, in tiles.
pub const MAX_VIEW_DISTANCE: i32 = 10;

/// Number of species the ecosystem tracks.
pub const SPECIES_COUNT: usize = 3;

new_key_type! {
    /// Stable handle for every living thing in the world.
    pub struct EntityId;
}

/// Secondary storage keyed by [`EntityId`].
pub type EntityMap<T> = SecondaryMap<EntityId, T>;

/// The species populating the grid. Each carries a distinct bit so diets can
/// be expressed as masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Species {
    Grass = 1,
    Rabbit = 1 << 1,
    Fox = 1 << 2,
}

impl Species {
    pub const ALL: [Species; SPECIES_COUNT] = [Species::Grass, Species::Rabbit, Species::Fox];

    #[must_use]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Dense index derived from the bit position, for per-species arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        (self as u32).trailing_zeros() as usize
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Species::Grass => "grass",
            Species::Rabbit => "rabbit",
            Species::Fox => "fox",
        })
    }
}

/// Bitmask of species, used for diets and relationship queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct SpeciesSet(u32);

impl SpeciesSet {
    pub const EMPTY: SpeciesSet = SpeciesSet(0);

    #[must_use]
    pub const fn single(species: Species) -> Self {
        SpeciesSet(species.bit())
    }

    #[must_use]
    pub const fn with(self, species: Species) -> Self {
        SpeciesSet(self.0 | species.bit())
    }

    #[must_use]
    pub const fn contains(self, species: Species) -> bool {
        self.0 & species.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Species present in the set, in [`Species::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = Species> {
        Species::ALL
            .into_iter()
            .filter(move |&species| self.contains(species))
    }
}

impl FromIterator<Species> for SpeciesSet {
    fn from_iter<T: IntoIterator<Item = Species>>(iter: T) -> Self {
        iter.into_iter().fold(SpeciesSet::EMPTY, SpeciesSet::with)
    }
}

/// Discrete simulation step counter.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// World-space position of a tile centre.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    #[must_use]
    pub fn sqr_distance(self, other: Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Why an entity died. Indexes the coordinator's death counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeathCause {
    Hunger,
    Thirst,
    Eaten,
}

impl DeathCause {
    pub const ALL: [DeathCause; 3] = [DeathCause::Hunger, DeathCause::Thirst, DeathCause::Eaten];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DeathCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeathCause::Hunger => "hunger",
            DeathCause::Thirst => "thirst",
            DeathCause::Eaten => "eaten",
        })
    }
}

/// How a species is embodied: rooted plants with a finite supply, or mobile
/// creatures driven by the behavior state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Plant,
    Creature,
}

/// Per-entity body state.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityBody {
    Plant(PlantBody),
    Creature(CreatureBody),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantBody {
    /// Remaining supply; the plant dies of [`DeathCause::Eaten`] at zero.
    pub amount: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatureBody {
    pub sex: Sex,
}

/// One living thing on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub species: Species,
    pub coord: Coord,
    pub alive: bool,
    pub body: EntityBody,
}

impl Entity {
    #[must_use]
    pub const fn is_creature(&self) -> bool {
        matches!(self.body, EntityBody::Creature(_))
    }

    #[must_use]
    pub const fn sex(&self) -> Option<Sex> {
        match &self.body {
            EntityBody::Creature(body) => Some(body.sex),
            EntityBody::Plant(_) => None,
        }
    }
}

/// Recipe for building entities of one species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesBlueprint {
    pub species: Species,
    pub body: BodyKind,
    /// Species this one eats; empty for plants.
    pub diet: SpeciesSet,
    /// Loci carried by creature genomes.
    pub gene_count: usize,
}

/// The stock grass / rabbit / fox food chain.
#[must_use]
pub fn standard_blueprints() -> Vec<SpeciesBlueprint> {
    vec![
        SpeciesBlueprint {
            species: Species::Grass,
            body: BodyKind::Plant,
            diet: SpeciesSet::EMPTY,
            gene_count: 0,
        },
        SpeciesBlueprint {
            species: Species::Rabbit,
            body: BodyKind::Creature,
            diet: SpeciesSet::single(Species::Grass),
            gene_count: 1,
        },
        SpeciesBlueprint {
            species: Species::Fox,
            body: BodyKind::Creature,
            diet: SpeciesSet::single(Species::Rabbit),
            gene_count: 1,
        },
    ]
}

/// Predator/prey relations, derived once from blueprint diets and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    prey: [SpeciesSet; SPECIES_COUNT],
    predators: [SpeciesSet; SPECIES_COUNT],
}

impl Relationships {
    #[must_use]
    pub fn from_blueprints(blueprints: &[SpeciesBlueprint]) -> Self {
        let mut prey = [SpeciesSet::EMPTY; SPECIES_COUNT];
        let mut predators = [SpeciesSet::EMPTY; SPECIES_COUNT];
        for blueprint in blueprints {
            prey[blueprint.species.index()] = blueprint.diet;
            for eaten in blueprint.diet.iter() {
                predators[eaten.index()] = predators[eaten.index()].with(blueprint.species);
            }
        }
        Self { prey, predators }
    }

    /// Species that `species` eats.
    #[must_use]
    pub fn prey_of(&self, species: Species) -> SpeciesSet {
        self.prey[species.index()]
    }

    /// Species that eat `species`.
    #[must_use]
    pub fn predators_of(&self, species: Species) -> SpeciesSet {
        self.predators[species.index()]
    }

    /// One line per species, for startup logging.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        Species::ALL
            .into_iter()
            .map(|species| {
                let eats = list_or_nothing(self.prey_of(species));
                let eaten_by = list_or_nothing(self.predators_of(species));
                format!("{species} eats {eats}; eaten by {eaten_by}")
            })
            .collect()
    }
}

fn list_or_nothing(set: SpeciesSet) -> String {
    let names: Vec<String> = set.iter().map(|species| species.to_string()).collect();
    if names.is_empty() {
        "nothing".to_owned()
    } else {
        names.join(", ")
    }
}

/// Errors raised while building a world.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Terrain(#[from] TerrainError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Tunable parameters for a world. `Default` is the balanced baseline;
/// [`WildgridConfig::validate`] rejects configurations the simulation cannot
/// run with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WildgridConfig {
    /// Seed for the world RNG; `None` draws one from entropy.
    pub rng_seed: Option<u64>,
    /// Simulated seconds advanced per tick.
    pub time_step: f32,
    /// Side length of the square regions backing each species map.
    pub region_size: u32,
    /// Chance that an open tile grows a tree (blocking) at build time.
    pub tree_probability: f64,
    /// Seconds between grass respawn attempts.
    pub grass_respawn_interval: f32,
    /// Chance that a due respawn attempt actually spawns.
    pub grass_spawn_chance: f64,
    /// Seconds between decision-step evaluations while idle.
    pub time_between_action_choices: f32,
    /// Movement speed in tiles per second.
    pub move_speed: f32,
    pub time_to_death_by_hunger: f32,
    pub time_to_death_by_thirst: f32,
    pub time_to_max_reproductive_urge: f32,
    /// Need level past which the current activity is abandoned for the
    /// competing one.
    pub critical_need_threshold: f32,
    /// Seconds a full meal takes.
    pub eat_duration: f32,
    /// Seconds a full drink takes.
    pub drink_duration: f32,
    /// Seconds mating takes.
    pub reproduce_duration: f32,
    /// Seconds of gestation before a birth.
    pub pregnant_duration: f32,
    /// Supply drained from a plant per unit of hunger restored.
    pub plant_depletion_rate: f32,
    /// Chance a wandering creature keeps its heading.
    pub forward_move_bias: f64,
    /// Neighbour samples drawn when the heading is not kept.
    pub wander_sample_count: u32,
    /// Ticks between history snapshots; zero disables the history.
    pub history_interval: u64,
    /// Bounded length of the summary history.
    pub history_capacity: usize,
}

impl Default for WildgridConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            time_step: 0.1,
            region_size: 10,
            tree_probability: 0.1,
            grass_respawn_interval: 5.0,
            grass_spawn_chance: 0.8,
            time_between_action_choices: 1.0,
            move_speed: 1.5,
            time_to_death_by_hunger: 200.0,
            time_to_death_by_thirst: 200.0,
            time_to_max_reproductive_urge: 120.0,
            critical_need_threshold: 0.7,
            eat_duration: 10.0,
            drink_duration: 6.0,
            reproduce_duration: 6.0,
            pregnant_duration: 15.0,
            plant_depletion_rate: 8.0,
            forward_move_bias: 0.2,
            wander_sample_count: 3,
            history_interval: 10,
            history_capacity: 256,
        }
    }
}

impl WildgridConfig {
    /// Checks every invariant the simulation relies on.
    pub fn validate(&self) -> Result<(), EnvironmentError> {
        if self.time_step <= 0.0 {
            return Err(EnvironmentError::InvalidConfig("time_step must be positive"));
        }
        if self.region_size == 0 {
            return Err(EnvironmentError::InvalidConfig("region_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.tree_probability) {
            return Err(EnvironmentError::InvalidConfig(
                "tree_probability must lie in [0, 1]",
            ));
        }
        if self.grass_respawn_interval <= 0.0 {
            return Err(EnvironmentError::InvalidConfig(
                "grass_respawn_interval must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.grass_spawn_chance) {
            return Err(EnvironmentError::InvalidConfig(
                "grass_spawn_chance must lie in [0, 1]",
            ));
        }
        if self.time_between_action_choices <= 0.0 {
            return Err(EnvironmentError::InvalidConfig(
                "time_between_action_choices must be positive",
            ));
        }
        if self.move_speed <= 0.0 {
            return Err(EnvironmentError::InvalidConfig("move_speed must be positive"));
        }
        if self.time_to_death_by_hunger <= 0.0
            || self.time_to_death_by_thirst <= 0.0
            || self.time_to_max_reproductive_urge <= 0.0
        {
            return Err(EnvironmentError::InvalidConfig(
                "need growth times must be positive",
            ));
        }
        if !(0.0 < self.critical_need_threshold && self.critical_need_threshold < 1.0) {
            return Err(EnvironmentError::InvalidConfig(
                "critical_need_threshold must lie in (0, 1)",
            ));
        }
        if self.eat_duration <= 0.0
            || self.drink_duration <= 0.0
            || self.reproduce_duration <= 0.0
            || self.pregnant_duration <= 0.0
        {
            return Err(EnvironmentError::InvalidConfig(
                "interaction durations must be positive",
            ));
        }
        if self.plant_depletion_rate <= 0.0 {
            return Err(EnvironmentError::InvalidConfig(
                "plant_depletion_rate must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.forward_move_bias) {
            return Err(EnvironmentError::InvalidConfig(
                "forward_move_bias must lie in [0, 1]",
            ));
        }
        if self.wander_sample_count == 0 {
            return Err(EnvironmentError::InvalidConfig(
                "wander_sample_count must be positive",
            ));
        }
        if self.history_interval > 0 && self.history_capacity == 0 {
            return Err(EnvironmentError::InvalidConfig(
                "history_capacity must be positive while the history is enabled",
            ));
        }
        Ok(())
    }

    /// RNG seeded from the config, or from entropy when no seed is pinned.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}
