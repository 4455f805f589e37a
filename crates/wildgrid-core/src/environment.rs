//! The environment coordinator. One [`Environment`] owns every piece of
//! shared simulation state — the entity arena, the per-species region maps,
//! the terrain caches, counters, and the world RNG — and creatures reach all
//! of it exclusively through the sensing and registration methods here, so a
//! single owner serializes every spatial mutation.

use std::collections::VecDeque;

use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use wildgrid_geom::{Coord, tile_is_visible};
use wildgrid_genes::Genes;
use wildgrid_index::RegionMap;

use crate::creature::{CreatureAction, CreatureState};
use crate::terrain::{TerrainData, WorldGrid};
use crate::{
    BodyKind, CreatureBody, DeathCause, Entity, EntityBody, EntityId, EntityMap, EnvironmentError,
    MAX_VIEW_DISTANCE, PlantBody, Relationships, SPECIES_COUNT, Species, SpeciesBlueprint,
    SpeciesSet, Tick, WildgridConfig,
};

/// What a single [`Environment::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    pub births: u32,
    pub deaths: u32,
    pub grass_spawned: Option<Coord>,
}

/// Outcome of bulk seeding. `exhausted` counts requests that could not be
/// placed, either because the open tiles ran out or because the species has
/// no blueprint; it is a warning for the caller, never an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpawnReport {
    pub spawned: u32,
    pub exhausted: u32,
}

/// Diagnostics snapshot of what can be sensed from one tile.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Surroundings {
    pub nearest_food_source: Option<EntityId>,
    pub nearest_water_tile: Option<Coord>,
}

/// Population snapshot kept in the bounded history ring. Birth and death
/// counts are cumulative totals at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub populations: [u32; SPECIES_COUNT],
    pub births: u64,
    pub deaths: u64,
}

/// The simulation world.
#[derive(Debug, Clone)]
pub struct Environment {
    grid: WorldGrid,
    config: WildgridConfig,
    relationships: Relationships,
    blueprints: [Option<SpeciesBlueprint>; SPECIES_COUNT],
    entities: SlotMap<EntityId, Entity>,
    creatures: EntityMap<CreatureState>,
    species_maps: Vec<RegionMap<EntityId>>,
    /// Deterministic per-tick processing order: insertion order, compacted
    /// as entities despawn.
    order: Vec<EntityId>,
    rng: SmallRng,
    tick: Tick,
    clock: f64,
    grass_clock: f32,
    populations: [u32; SPECIES_COUNT],
    deaths: [[u64; DeathCause::ALL.len()]; SPECIES_COUNT],
    total_births: u64,
    total_deaths: u64,
    pending_despawn: Vec<EntityId>,
    history: VecDeque<TickSummary>,
}

impl Environment {
    /// Builds a world from terrain, species blueprints, and config. The
    /// config seeds the RNG, which then drives the tree scatter, so the
    /// whole world shape is a function of `(terrain, blueprints, config)`.
    pub fn new(
        terrain: &TerrainData,
        blueprints: &[SpeciesBlueprint],
        config: WildgridConfig,
    ) -> Result<Self, EnvironmentError> {
        config.validate()?;
        terrain.validate()?;
        let mut rng = config.seeded_rng();
        let grid = WorldGrid::build(terrain, config.tree_probability, &mut rng);

        let mut slots = [None; SPECIES_COUNT];
        for blueprint in blueprints {
            slots[blueprint.species.index()] = Some(*blueprint);
        }
        let mut species_maps = Vec::with_capacity(SPECIES_COUNT);
        for _ in 0..SPECIES_COUNT {
            species_maps.push(RegionMap::new(grid.size(), config.region_size)?);
        }

        Ok(Self {
            relationships: Relationships::from_blueprints(blueprints),
            blueprints: slots,
            entities: SlotMap::with_key(),
            creatures: EntityMap::new(),
            species_maps,
            order: Vec::new(),
            rng,
            tick: Tick::zero(),
            clock: 0.0,
            grass_clock: 0.0,
            populations: [0; SPECIES_COUNT],
            deaths: [[0; DeathCause::ALL.len()]; SPECIES_COUNT],
            total_births: 0,
            total_deaths: 0,
            pending_despawn: Vec::new(),
            history: VecDeque::new(),
            grid,
            config,
        })
    }

    /// Creates an entity of `species` at `coord` and registers it in its
    /// species map, the processing order, and the population count. Plants
    /// start with a full supply; creatures take the supplied genes or roll
    /// fresh ones, and pick their first action immediately rather than
    /// idling until the first scheduled choice. Returns `None` for a
    /// species without a blueprint.
    pub fn spawn(
        &mut self,
        species: Species,
        coord: Coord,
        genes: Option<Genes>,
    ) -> Option<EntityId> {
        let blueprint = self.blueprints[species.index()]?;
        let id = match blueprint.body {
            BodyKind::Plant => self.entities.insert(Entity {
                species,
                coord,
                alive: true,
                body: EntityBody::Plant(PlantBody { amount: 1.0 }),
            }),
            BodyKind::Creature => {
                let genes =
                    genes.unwrap_or_else(|| Genes::random(blueprint.gene_count, &mut self.rng));
                let id = self.entities.insert(Entity {
                    species,
                    coord,
                    alive: true,
                    body: EntityBody::Creature(CreatureBody { sex: genes.sex }),
                });
                self.creatures.insert(id, CreatureState::new(genes));
                id
            }
        };
        self.species_maps[species.index()].insert(id, coord);
        self.order.push(id);
        self.populations[species.index()] += 1;

        if let Some(mut state) = self.creatures.remove(id) {
            state.decide(id, self);
            self.creatures.insert(id, state);
        }
        Some(id)
    }

    /// Seeds the world: for every `(species, count)` pair, spawns that many
    /// entities at distinct random open tiles.
    pub fn populate(&mut self, seeds: &[(Species, u32)]) -> SpawnReport {
        let mut open: Vec<Coord> = self.grid.walkable_coords().to_vec();
        let mut report = SpawnReport::default();
        for &(species, count) in seeds {
            let known = self.blueprints[species.index()].is_some();
            for _ in 0..count {
                if !known || open.is_empty() {
                    report.exhausted += 1;
                    continue;
                }
                let pick = self.rng.random_range(0..open.len());
                let coord = open.swap_remove(pick);
                if self.spawn(species, coord, None).is_some() {
                    report.spawned += 1;
                }
            }
        }
        report
    }

    /// Commits a completed movement: updates the entity's coord and shifts
    /// its species-map record. Called exactly once per finished animation,
    /// never mid-flight.
    pub fn register_move(&mut self, id: EntityId, to: Coord) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        if !entity.alive {
            return;
        }
        entity.coord = to;
        self.species_maps[entity.species.index()].shift(id, to);
    }

    /// Takes `id` out of play. Guarded by the alive flag, so a second
    /// registration is a no-op. The species-map entry goes immediately —
    /// same-tick sensing can never return the dead entity — while arena
    /// cleanup waits for the end of the tick.
    pub fn register_death(&mut self, id: EntityId, cause: DeathCause) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        if !entity.alive {
            return;
        }
        entity.alive = false;
        let species = entity.species;
        self.species_maps[species.index()].remove(id);
        self.populations[species.index()] -= 1;
        self.deaths[species.index()][cause.index()] += 1;
        self.total_deaths += 1;
        self.pending_despawn.push(id);
    }

    /// Spawns a newborn and counts the birth. Used by pregnant creatures;
    /// external callers seed populations through [`Environment::spawn`] and
    /// [`Environment::populate`] instead.
    pub(crate) fn spawn_birth(
        &mut self,
        species: Species,
        coord: Coord,
        genes: Genes,
    ) -> Option<EntityId> {
        let id = self.spawn(species, coord, Some(genes))?;
        self.total_births += 1;
        Some(id)
    }

    /// Closest visible shore tile from `coord`, re-checked against the
    /// sensing radius via the world-space tile centres.
    #[must_use]
    pub fn sense_water(&self, coord: Coord) -> Option<Coord> {
        let water = self.grid.closest_visible_water(coord)?;
        let within = match (self.grid.tile_centre(coord), self.grid.tile_centre(water)) {
            (Some(a), Some(b)) => {
                a.sqr_distance(b) <= (MAX_VIEW_DISTANCE * MAX_VIEW_DISTANCE) as f32
            }
            _ => false,
        };
        within.then_some(water)
    }

    /// Best visible food for `seeker` standing at `coord`. Candidates are
    /// every entity of every species in the seeker's diet within the sensing
    /// radius, ordered ascending by `preference`; the first one with a clear
    /// line of sight wins, so a preferred-but-hidden source is passed over.
    pub fn sense_food(
        &self,
        coord: Coord,
        seeker: EntityId,
        preference: impl Fn(&Entity, &Entity) -> f32,
    ) -> Option<EntityId> {
        let seeker_entity = self.entities.get(seeker)?;
        let diet = self.relationships.prey_of(seeker_entity.species);
        let mut candidates: Vec<EntityId> = Vec::new();
        for species in diet.iter() {
            candidates
                .extend(self.species_maps[species.index()].all_within(coord, MAX_VIEW_DISTANCE as u32));
        }
        candidates.retain(|&id| id != seeker);
        candidates.sort_by_key(|&id| OrderedFloat(preference(seeker_entity, &self.entities[id])));
        candidates
            .into_iter()
            .find(|&id| tile_is_visible(self.grid.mask(), coord, self.entities[id].coord))
    }

    /// Default food preference: squared distance between the two coords.
    #[must_use]
    pub fn distance_preference(seeker: &Entity, candidate: &Entity) -> f32 {
        seeker.coord.sqr_distance(candidate.coord) as f32
    }

    /// Same-species, opposite-sex creatures within the sensing radius that
    /// are themselves looking for a mate. No line-of-sight filter.
    #[must_use]
    pub fn sense_potential_mates(&self, coord: Coord, seeker: EntityId) -> Vec<EntityId> {
        let Some(seeker_entity) = self.entities.get(seeker) else {
            return Vec::new();
        };
        let Some(sex) = seeker_entity.sex() else {
            return Vec::new();
        };
        let wanted = sex.opposite();
        self.species_maps[seeker_entity.species.index()]
            .all_within(coord, MAX_VIEW_DISTANCE as u32)
            .into_iter()
            .filter(|&id| id != seeker)
            .filter(|&id| self.entities[id].sex() == Some(wanted))
            .filter(|&id| {
                self.creatures
                    .get(id)
                    .is_some_and(|state| state.action() == CreatureAction::SearchingForMate)
            })
            .collect()
    }

    /// Combined diagnostics snapshot: nearest member of any species in
    /// `diet`, plus the nearest visible water, both from `coord`.
    #[must_use]
    pub fn sense(&self, coord: Coord, diet: SpeciesSet) -> Surroundings {
        let mut nearest: Option<(i32, EntityId)> = None;
        for species in diet.iter() {
            if let Some(id) =
                self.species_maps[species.index()].nearest_within(coord, MAX_VIEW_DISTANCE as u32)
            {
                let distance = self.entities[id].coord.sqr_distance(coord);
                if nearest.is_none_or(|(best, _)| distance < best) {
                    nearest = Some((distance, id));
                }
            }
        }
        Surroundings {
            nearest_food_source: nearest.map(|(_, id)| id),
            nearest_water_tile: self.sense_water(coord),
        }
    }

    /// Uniform random walkable neighbour, or `coord` itself at a dead end.
    pub fn next_tile_random(&mut self, coord: Coord) -> Coord {
        let Self { grid, rng, .. } = self;
        let neighbours = grid.walkable_neighbours(coord);
        if neighbours.is_empty() {
            coord
        } else {
            neighbours[rng.random_range(0..neighbours.len())]
        }
    }

    /// Heading-biased wander step. With probability `forward_move_bias` the
    /// straight-ahead tile (`previous` through `coord`, extrapolated) is
    /// kept when walkable; otherwise a handful of random neighbours are
    /// sampled with replacement and the one best aligned with the current
    /// heading wins, first sample keeping ties. Without a usable heading
    /// this degenerates to [`Environment::next_tile_random`].
    pub fn next_tile_weighted(&mut self, coord: Coord, previous: Coord) -> Coord {
        if !previous.is_valid() || previous == coord {
            return self.next_tile_random(coord);
        }
        let Self {
            grid, rng, config, ..
        } = self;
        let neighbours = grid.walkable_neighbours(coord);
        if neighbours.is_empty() {
            return coord;
        }
        // The bias roll happens before the walkability check, so a blocked
        // straight-ahead tile still costs the roll.
        if rng.random_bool(config.forward_move_bias) {
            let ahead = coord + (coord - previous);
            if grid.is_walkable(ahead) {
                return ahead;
            }
        }
        let heading = normalize(coord - previous);
        let mut best = neighbours[rng.random_range(0..neighbours.len())];
        let mut best_score = dot(heading, normalize(best - coord));
        for _ in 1..config.wander_sample_count {
            let sample = neighbours[rng.random_range(0..neighbours.len())];
            let score = dot(heading, normalize(sample - coord));
            if score > best_score {
                best = sample;
                best_score = score;
            }
        }
        best
    }

    /// Takes one bite of up to `bite` hunger-units from `target`. Plants
    /// deplete by `plant_depletion_rate` supply per unit and die of
    /// [`DeathCause::Eaten`] when exhausted; creature prey is killed
    /// outright, yielding the whole bite. Returns the amount actually
    /// consumed, which is zero when the target is already gone.
    pub fn consume_from(&mut self, target: EntityId, bite: f32) -> f32 {
        let depletion = self.config.plant_depletion_rate;
        let Some(entity) = self.entities.get_mut(target) else {
            return 0.0;
        };
        if !entity.alive {
            return 0.0;
        }
        let (consumed, killed) = match &mut entity.body {
            EntityBody::Plant(plant) => {
                let consumed = bite.min(plant.amount / depletion);
                plant.amount -= consumed * depletion;
                (consumed, plant.amount <= 0.0)
            }
            EntityBody::Creature(_) => (bite, true),
        };
        if killed {
            self.register_death(target, DeathCause::Eaten);
        }
        consumed
    }

    /// Advances the world one tick: grass respawn, every creature in
    /// processing order, despawn commit, then the history snapshot.
    pub fn step(&mut self) -> TickReport {
        self.tick = self.tick.next();
        self.clock += f64::from(self.config.time_step);
        let births_before = self.total_births;
        let deaths_before = self.total_deaths;

        let grass_spawned = self.stage_grass_respawn();
        self.stage_creatures();
        self.stage_despawn_commit();
        self.stage_history();

        TickReport {
            tick: self.tick,
            births: (self.total_births - births_before) as u32,
            deaths: (self.total_deaths - deaths_before) as u32,
            grass_spawned,
        }
    }

    /// Every `grass_respawn_interval` seconds, one roll of
    /// `grass_spawn_chance` for a new grass entity at a random open tile.
    fn stage_grass_respawn(&mut self) -> Option<Coord> {
        self.grass_clock += self.config.time_step;
        if self.grass_clock < self.config.grass_respawn_interval {
            return None;
        }
        self.grass_clock -= self.config.grass_respawn_interval;
        if !self.rng.random_bool(self.config.grass_spawn_chance) {
            return None;
        }
        let coord = {
            let Self { grid, rng, .. } = self;
            let open = grid.walkable_coords();
            if open.is_empty() {
                return None;
            }
            open[rng.random_range(0..open.len())]
        };
        self.spawn(Species::Grass, coord, None).map(|_| coord)
    }

    /// Steps every creature over a snapshot of the processing order, so
    /// newborns joining mid-tick are first stepped next tick. Each state is
    /// checked out of the map for its step; sensing during the step sees
    /// every other creature normally.
    fn stage_creatures(&mut self) {
        let dt = self.config.time_step;
        let queue = self.order.clone();
        for id in queue {
            if !self.entities.get(id).is_some_and(|entity| entity.alive) {
                continue;
            }
            let Some(mut state) = self.creatures.remove(id) else {
                continue;
            };
            state.step(id, dt, self);
            self.creatures.insert(id, state);
        }
    }

    fn stage_despawn_commit(&mut self) {
        if self.pending_despawn.is_empty() {
            return;
        }
        for id in self.pending_despawn.drain(..) {
            self.entities.remove(id);
            self.creatures.remove(id);
        }
        self.order.retain(|id| self.entities.contains_key(*id));
    }

    fn stage_history(&mut self) {
        let interval = self.config.history_interval;
        if interval == 0 || !self.tick.0.is_multiple_of(interval) {
            return;
        }
        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TickSummary {
            tick: self.tick,
            populations: self.populations,
            births: self.total_births,
            deaths: self.total_deaths,
        });
    }

    #[must_use]
    pub fn population_of(&self, species: Species) -> u32 {
        self.populations[species.index()]
    }

    /// Live population per species, indexed by [`Species::index`].
    #[must_use]
    pub const fn populations(&self) -> [u32; SPECIES_COUNT] {
        self.populations
    }

    #[must_use]
    pub fn death_count(&self, species: Species, cause: DeathCause) -> u64 {
        self.deaths[species.index()][cause.index()]
    }

    /// Total births since the world was built.
    #[must_use]
    pub const fn births(&self) -> u64 {
        self.total_births
    }

    /// Total deaths since the world was built, across causes.
    #[must_use]
    pub const fn deaths(&self) -> u64 {
        self.total_deaths
    }

    /// The entity behind a handle. Entities that died this tick remain
    /// readable (with `alive == false`) until the end-of-tick commit.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Behavioral state of a creature, for display reads.
    #[must_use]
    pub fn creature(&self, id: EntityId) -> Option<&CreatureState> {
        self.creatures.get(id)
    }

    /// Mutable behavioral state, for external drivers scripting scenarios.
    pub fn creature_mut(&mut self, id: EntityId) -> Option<&mut CreatureState> {
        self.creatures.get_mut(id)
    }

    /// Live members of `species` within `radius` tiles of `coord`.
    #[must_use]
    pub fn entities_within(&self, species: Species, coord: Coord, radius: u32) -> Vec<EntityId> {
        self.species_maps[species.index()].all_within(coord, radius)
    }

    #[must_use]
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Simulated seconds elapsed since the world was built.
    #[must_use]
    pub const fn elapsed_seconds(&self) -> f64 {
        self.clock
    }

    #[must_use]
    pub const fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    #[must_use]
    pub const fn relationships(&self) -> &Relationships {
        &self.relationships
    }

    #[must_use]
    pub const fn config(&self) -> &WildgridConfig {
        &self.config
    }

    /// The world RNG, for deterministic external sampling.
    pub fn rng_mut(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

fn normalize(step: Coord) -> (f32, f32) {
    let length = ((step.x * step.x + step.y * step.y) as f32).sqrt();
    if length == 0.0 {
        (0.0, 0.0)
    } else {
        (step.x as f32 / length, step.y as f32 / length)
    }
}

fn dot(a: (f32, f32), b: (f32, f32)) -> f32 {
    a.0 * b.0 + a.1 * b.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, POCKETS};
    use crate::{Sex, standard_blueprints};

    fn genes(sex: Sex) -> Genes {
        Genes {
            sex,
            values: vec![0.5],
        }
    }

    #[test]
    fn spawn_registers_everywhere() {
        let mut env = testkit::pond_world(7);
        let id = env
            .spawn(Species::Rabbit, Coord::new(5, 5), None)
            .expect("rabbit blueprint exists");

        assert_eq!(env.population_of(Species::Rabbit), 1);
        let entity = env.entity(id).expect("entity is readable");
        assert_eq!(entity.species, Species::Rabbit);
        assert_eq!(entity.coord, Coord::new(5, 5));
        assert!(entity.alive);
        assert_eq!(
            env.entities_within(Species::Rabbit, Coord::new(5, 5), 1),
            vec![id]
        );
        // No food anywhere, so the first decision lands on exploring.
        let state = env.creature(id).expect("creature state exists");
        assert_eq!(state.action(), CreatureAction::Exploring);
    }

    #[test]
    fn spawn_without_blueprint_is_refused() {
        let blueprints = standard_blueprints();
        let terrain = TerrainData::from_ascii(testkit::DRY_MEADOW).expect("fixture terrain parses");
        let mut env = Environment::new(&terrain, &blueprints[..1], testkit::config(3))
            .expect("world builds");
        assert!(env.spawn(Species::Fox, Coord::new(2, 2), None).is_none());
        assert_eq!(env.population_of(Species::Fox), 0);
    }

    #[test]
    fn populate_uses_distinct_tiles_and_reports_exhaustion() {
        let mut env = testkit::dry_world(11);
        let report = env.populate(&[(Species::Grass, 20), (Species::Rabbit, 5)]);
        assert_eq!(report.spawned, 25);
        assert_eq!(report.exhausted, 0);
        assert_eq!(env.population_of(Species::Grass), 20);
        assert_eq!(env.population_of(Species::Rabbit), 5);

        let centre = Coord::new(8, 8);
        let mut coords: Vec<Coord> = env
            .entities_within(Species::Grass, centre, 32)
            .into_iter()
            .chain(env.entities_within(Species::Rabbit, centre, 32))
            .map(|id| env.entity(id).expect("spawned entity exists").coord)
            .collect();
        coords.sort();
        coords.dedup();
        assert_eq!(coords.len(), 25, "seeding never stacks entities");

        let tiny = TerrainData::from_ascii("...\n...\n...").expect("fixture terrain parses");
        let mut cramped =
            Environment::new(&tiny, &standard_blueprints(), testkit::config(11)).expect("world builds");
        let report = cramped.populate(&[(Species::Grass, 12)]);
        assert_eq!(report.spawned, 9);
        assert_eq!(report.exhausted, 3);
    }

    #[test]
    fn register_move_shifts_the_species_map() {
        let mut env = testkit::dry_world(5);
        let id = env
            .spawn(Species::Grass, Coord::new(2, 2), None)
            .expect("grass spawns");
        env.register_move(id, Coord::new(13, 2));

        assert_eq!(env.entity(id).expect("entity exists").coord, Coord::new(13, 2));
        assert!(env.entities_within(Species::Grass, Coord::new(2, 2), 3).is_empty());
        assert_eq!(
            env.entities_within(Species::Grass, Coord::new(13, 2), 0),
            vec![id]
        );
    }

    #[test]
    fn death_is_immediate_for_sensing_and_idempotent() {
        let mut env = testkit::dry_world(5);
        let victim = env
            .spawn(Species::Rabbit, Coord::new(4, 4), Some(genes(Sex::Male)))
            .expect("rabbit spawns");
        env.spawn(Species::Rabbit, Coord::new(6, 4), Some(genes(Sex::Male)))
            .expect("rabbit spawns");

        env.register_death(victim, DeathCause::Hunger);
        assert_eq!(env.population_of(Species::Rabbit), 1);
        assert_eq!(env.death_count(Species::Rabbit, DeathCause::Hunger), 1);
        // Same tick, before any step: radius queries no longer see it.
        assert!(!env
            .entities_within(Species::Rabbit, Coord::new(4, 4), 2)
            .contains(&victim));
        // Readable until the commit, flagged dead.
        assert!(!env.entity(victim).expect("still readable").alive);

        env.register_death(victim, DeathCause::Thirst);
        assert_eq!(env.death_count(Species::Rabbit, DeathCause::Thirst), 0);
        assert_eq!(env.deaths(), 1);

        env.step();
        assert!(env.entity(victim).is_none(), "commit drops the arena entry");
    }

    #[test]
    fn sense_water_is_bounded_by_view_distance() {
        let env = testkit::pond_world(5);
        assert_eq!(env.sense_water(Coord::new(3, 5)), Some(Coord::new(1, 5)));
        assert_eq!(env.sense_water(Coord::new(14, 5)), None);
    }

    #[test]
    fn sense_food_passes_over_hidden_sources() {
        let walled = "
            .........
            .........
            .........
            .........
            ....#....
            .........
            .........
            .........
            .........
        ";
        let terrain = TerrainData::from_ascii(walled).expect("fixture terrain parses");
        let mut env =
            Environment::new(&terrain, &standard_blueprints(), testkit::config(2)).expect("world builds");
        // Closer grass hidden behind the rock, farther grass in the open.
        let hidden = env
            .spawn(Species::Grass, Coord::new(4, 3), None)
            .expect("grass spawns");
        let open = env
            .spawn(Species::Grass, Coord::new(8, 6), None)
            .expect("grass spawns");
        let eater = env
            .spawn(Species::Rabbit, Coord::new(4, 6), Some(genes(Sex::Male)))
            .expect("rabbit spawns");

        let sensed = env.sense_food(Coord::new(4, 6), eater, Environment::distance_preference);
        assert_eq!(sensed, Some(open), "distance preferred {hidden:?} but sight wins");
    }

    #[test]
    fn sense_food_honours_the_preference_function() {
        let mut env = testkit::dry_world(9);
        let near = env
            .spawn(Species::Grass, Coord::new(6, 5), None)
            .expect("grass spawns");
        let far = env
            .spawn(Species::Grass, Coord::new(10, 5), None)
            .expect("grass spawns");
        let eater = env
            .spawn(Species::Rabbit, Coord::new(5, 5), Some(genes(Sex::Male)))
            .expect("rabbit spawns");
        let coord = env.entity(eater).expect("rabbit exists").coord;

        assert_eq!(
            env.sense_food(coord, eater, Environment::distance_preference),
            Some(near)
        );
        // Inverted preference: the farthest candidate scores lowest.
        assert_eq!(
            env.sense_food(coord, eater, |seeker: &Entity, candidate: &Entity| {
                -Environment::distance_preference(seeker, candidate)
            }),
            Some(far)
        );
    }

    #[test]
    fn mutual_mate_sensing_is_symmetric_and_sex_filtered() {
        let terrain = TerrainData::from_ascii(POCKETS).expect("fixture terrain parses");
        let mut env =
            Environment::new(&terrain, &standard_blueprints(), testkit::config(4)).expect("world builds");
        let female = env
            .spawn(Species::Rabbit, Coord::new(3, 4), Some(genes(Sex::Female)))
            .expect("rabbit spawns");
        let male = env
            .spawn(Species::Rabbit, Coord::new(1, 1), Some(genes(Sex::Male)))
            .expect("rabbit spawns");
        let other_male = env
            .spawn(Species::Rabbit, Coord::new(7, 1), Some(genes(Sex::Male)))
            .expect("rabbit spawns");
        for id in [female, male, other_male] {
            env.creature_mut(id)
                .expect("creature state exists")
                .set_action(CreatureAction::SearchingForMate);
        }

        let from_female = env.sense_potential_mates(Coord::new(3, 4), female);
        assert!(from_female.contains(&male));
        assert!(from_female.contains(&other_male));
        let from_male = env.sense_potential_mates(Coord::new(1, 1), male);
        assert_eq!(from_male, vec![female], "same-sex candidates are filtered");
    }

    #[test]
    fn sense_snapshot_spans_multiple_species() {
        let mut env = testkit::pond_world(6);
        let grass = env
            .spawn(Species::Grass, Coord::new(6, 5), None)
            .expect("grass spawns");
        env.spawn(Species::Rabbit, Coord::new(9, 5), Some(genes(Sex::Male)))
            .expect("rabbit spawns");

        let diet = SpeciesSet::single(Species::Grass).with(Species::Rabbit);
        let snapshot = env.sense(Coord::new(5, 5), diet);
        assert_eq!(snapshot.nearest_food_source, Some(grass));
        assert_eq!(snapshot.nearest_water_tile, Some(Coord::new(1, 5)));

        let empty = env.sense(Coord::new(5, 5), SpeciesSet::single(Species::Fox));
        assert_eq!(empty.nearest_food_source, None);
    }

    #[test]
    fn weighted_wander_with_full_bias_goes_straight() {
        let config = WildgridConfig {
            forward_move_bias: 1.0,
            ..testkit::config(8)
        };
        let terrain = TerrainData::from_ascii(testkit::DRY_MEADOW).expect("fixture terrain parses");
        let mut env =
            Environment::new(&terrain, &standard_blueprints(), config).expect("world builds");

        for _ in 0..32 {
            assert_eq!(
                env.next_tile_weighted(Coord::new(5, 5), Coord::new(4, 5)),
                Coord::new(6, 5)
            );
        }
        // Straight ahead runs off the east edge; the sampled fallback still
        // returns a walkable neighbour.
        let fallback = env.next_tile_weighted(Coord::new(15, 5), Coord::new(14, 5));
        assert!(env.grid().is_walkable(fallback));
        assert!(fallback.are_neighbours(Coord::new(15, 5)));

        // No heading at all degenerates to a uniform step.
        let step = env.next_tile_weighted(Coord::new(5, 5), Coord::INVALID);
        assert!(step.are_neighbours(Coord::new(5, 5)));
    }

    #[test]
    fn consume_depletes_plants_and_kills_prey_outright() {
        let mut env = testkit::dry_world(3);
        let grass = env
            .spawn(Species::Grass, Coord::new(2, 2), None)
            .expect("grass spawns");

        // Depletion rate 8: a 0.05 bite drains 0.4 supply.
        assert_eq!(env.consume_from(grass, 0.05), 0.05);
        assert_eq!(env.consume_from(grass, 0.05), 0.05);
        let last = env.consume_from(grass, 0.05);
        assert!((last - 0.025).abs() < 1e-6, "only the remainder is served");
        assert_eq!(env.death_count(Species::Grass, DeathCause::Eaten), 1);
        assert_eq!(env.consume_from(grass, 0.05), 0.0, "a dead source serves nothing");

        let prey = env
            .spawn(Species::Rabbit, Coord::new(4, 4), Some(genes(Sex::Male)))
            .expect("rabbit spawns");
        assert_eq!(env.consume_from(prey, 0.01), 0.01);
        assert_eq!(env.death_count(Species::Rabbit, DeathCause::Eaten), 1);
        assert_eq!(env.population_of(Species::Rabbit), 0);
    }

    #[test]
    fn grass_respawns_on_the_configured_cadence() {
        let config = WildgridConfig {
            grass_respawn_interval: 1.0,
            grass_spawn_chance: 1.0,
            ..testkit::config(12)
        };
        let terrain = TerrainData::from_ascii(testkit::DRY_MEADOW).expect("fixture terrain parses");
        let mut env =
            Environment::new(&terrain, &standard_blueprints(), config).expect("world builds");

        // time_step 0.25: the interval elapses every fourth tick.
        for tick in 1..=8u64 {
            let report = env.step();
            assert_eq!(
                report.grass_spawned.is_some(),
                tick.is_multiple_of(4),
                "tick {tick}"
            );
        }
        assert_eq!(env.population_of(Species::Grass), 2);
    }

    #[test]
    fn history_ring_is_bounded() {
        let config = WildgridConfig {
            history_interval: 2,
            history_capacity: 3,
            ..testkit::config(1)
        };
        let terrain = TerrainData::from_ascii(testkit::DRY_MEADOW).expect("fixture terrain parses");
        let mut env =
            Environment::new(&terrain, &standard_blueprints(), config).expect("world builds");
        env.populate(&[(Species::Rabbit, 2)]);

        for _ in 0..10 {
            env.step();
        }
        let ticks: Vec<u64> = env.history().map(|summary| summary.tick.0).collect();
        assert_eq!(ticks, vec![6, 8, 10]);
        let last = env.history().last().expect("history is non-empty");
        assert_eq!(last.populations[Species::Rabbit.index()], 2);
    }
}
