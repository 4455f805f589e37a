//! Per-creature behavior: need accrual, the action state machine, movement
//! animation, path caching, and pregnancy. A [`CreatureState`] is stepped by
//! the environment once per tick and calls back into it for every sensing
//! query and every spatial registration; it never touches the maps itself.

use std::f32::consts::FRAC_1_SQRT_2;
use std::fmt;

use wildgrid_geom::{Coord, find_path};
use wildgrid_genes::{Genes, Sex};

use crate::environment::Environment;
use crate::{DeathCause, EntityId};

/// What a creature is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureAction {
    Exploring,
    GoingToFood,
    Eating,
    GoingToWater,
    Drinking,
    SearchingForMate,
    GoingToMate,
    Reproducing,
}

impl fmt::Display for CreatureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreatureAction::Exploring => "exploring",
            CreatureAction::GoingToFood => "going to food",
            CreatureAction::Eating => "eating",
            CreatureAction::GoingToWater => "going to water",
            CreatureAction::Drinking => "drinking",
            CreatureAction::SearchingForMate => "searching for mate",
            CreatureAction::GoingToMate => "going to mate",
            CreatureAction::Reproducing => "reproducing",
        })
    }
}

/// Movement interpolation between two tiles. `from` keeps the last move's
/// source after arrival; extrapolating through the current tile is what
/// gives the wander its heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveState {
    pub from: Coord,
    pub to: Coord,
    pub progress: f32,
    /// 1 for cardinal steps, 1/sqrt(2) for diagonals.
    pub speed_factor: f32,
    pub active: bool,
}

impl Default for MoveState {
    fn default() -> Self {
        Self {
            from: Coord::INVALID,
            to: Coord::INVALID,
            progress: 0.0,
            speed_factor: 1.0,
            active: false,
        }
    }
}

/// A path under execution. `target` is the coord the path was computed for,
/// kept separately because a path to an unwalkable destination (shoreline
/// water) legally ends on an adjacent tile instead.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPath {
    pub steps: Vec<Coord>,
    /// Index of the next step to hand out.
    pub cursor: usize,
    pub target: Coord,
}

/// Gestation in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pregnancy {
    pub sire: EntityId,
    pub elapsed: f32,
}

/// Full behavioral state of one creature.
#[derive(Debug, Clone)]
pub struct CreatureState {
    genes: Genes,
    hunger: f32,
    thirst: f32,
    reproductive_urge: f32,
    action: CreatureAction,
    move_state: MoveState,
    food_target: Option<EntityId>,
    water_target: Option<Coord>,
    mate_target: Option<EntityId>,
    path: Option<CachedPath>,
    time_since_choice: f32,
    pregnancy: Option<Pregnancy>,
}

impl CreatureState {
    pub(crate) fn new(genes: Genes) -> Self {
        Self {
            genes,
            hunger: 0.0,
            thirst: 0.0,
            reproductive_urge: 0.0,
            action: CreatureAction::Exploring,
            move_state: MoveState::default(),
            food_target: None,
            water_target: None,
            mate_target: None,
            path: None,
            time_since_choice: 0.0,
            pregnancy: None,
        }
    }

    #[must_use]
    pub const fn action(&self) -> CreatureAction {
        self.action
    }

    #[must_use]
    pub const fn hunger(&self) -> f32 {
        self.hunger
    }

    #[must_use]
    pub const fn thirst(&self) -> f32 {
        self.thirst
    }

    #[must_use]
    pub const fn reproductive_urge(&self) -> f32 {
        self.reproductive_urge
    }

    #[must_use]
    pub const fn sex(&self) -> Sex {
        self.genes.sex
    }

    #[must_use]
    pub const fn genes(&self) -> &Genes {
        &self.genes
    }

    #[must_use]
    pub const fn is_pregnant(&self) -> bool {
        self.pregnancy.is_some()
    }

    #[must_use]
    pub const fn is_moving(&self) -> bool {
        self.move_state.active
    }

    #[must_use]
    pub const fn move_state(&self) -> &MoveState {
        &self.move_state
    }

    #[must_use]
    pub const fn food_target(&self) -> Option<EntityId> {
        self.food_target
    }

    #[must_use]
    pub const fn water_target(&self) -> Option<Coord> {
        self.water_target
    }

    #[must_use]
    pub const fn mate_target(&self) -> Option<EntityId> {
        self.mate_target
    }

    #[must_use]
    pub const fn cached_path(&self) -> Option<&CachedPath> {
        self.path.as_ref()
    }

    /// Driver hook: pins the three need levels, each clamped to [0, 1].
    pub fn set_needs(&mut self, hunger: f32, thirst: f32, reproductive_urge: f32) {
        self.hunger = hunger.clamp(0.0, 1.0);
        self.thirst = thirst.clamp(0.0, 1.0);
        self.reproductive_urge = reproductive_urge.clamp(0.0, 1.0);
    }

    /// Driver hook: overrides the current action. Cached targets and paths
    /// are left untouched.
    pub fn set_action(&mut self, action: CreatureAction) {
        self.action = action;
    }

    /// Advances this creature by `dt` seconds. Needs accrue first (births
    /// fire here), then either the movement animation runs or interactions
    /// and the scheduled decision do; the terminal-need check comes last.
    pub(crate) fn step(&mut self, id: EntityId, dt: f32, env: &mut Environment) {
        self.accrue_needs(id, dt, env);
        self.time_since_choice += dt;

        if self.move_state.active {
            self.animate_move(id, dt, env);
        } else {
            self.handle_interactions(dt, env);
            if self.time_since_choice >= env.config().time_between_action_choices {
                self.decide(id, env);
            }
        }

        if self.hunger >= 1.0 {
            env.register_death(id, DeathCause::Hunger);
        } else if self.thirst >= 1.0 {
            env.register_death(id, DeathCause::Thirst);
        }
    }

    fn accrue_needs(&mut self, id: EntityId, dt: f32, env: &mut Environment) {
        let config = env.config();
        self.hunger += dt / config.time_to_death_by_hunger;
        self.thirst += dt / config.time_to_death_by_thirst;
        self.reproductive_urge =
            (self.reproductive_urge + dt / config.time_to_max_reproductive_urge).min(1.0);

        if let Some(pregnancy) = &mut self.pregnancy {
            pregnancy.elapsed += dt;
        }
        if let Some(pregnancy) = self.pregnancy
            && pregnancy.elapsed > env.config().pregnant_duration
        {
            self.pregnancy = None;
            self.give_birth(id, pregnancy.sire, env);
        }
    }

    /// Exactly one offspring per completed pregnancy, and only while the
    /// sire is still a live creature; otherwise the pregnancy has already
    /// been cleared and nothing spawns.
    fn give_birth(&mut self, id: EntityId, sire: EntityId, env: &mut Environment) {
        let Some(mother) = env.entity(id) else {
            return;
        };
        let (species, coord) = (mother.species, mother.coord);
        if !env.entity(sire).is_some_and(|entity| entity.alive) {
            return;
        }
        let Some(sire_genes) = env.creature(sire).map(|state| state.genes().clone()) else {
            return;
        };
        let genes = Genes::inherited(&self.genes, &sire_genes, env.rng_mut());
        env.spawn_birth(species, coord, genes);
    }

    fn animate_move(&mut self, id: EntityId, dt: f32, env: &mut Environment) {
        self.move_state.progress += dt * env.config().move_speed * self.move_state.speed_factor;
        if self.move_state.progress < 1.0 {
            return;
        }
        let to = self.move_state.to;
        self.move_state.active = false;
        self.move_state.progress = 0.0;
        env.register_move(id, to);
        // Re-decide straight away instead of waiting out the choice timer.
        self.decide(id, env);
    }

    /// The decision policy: food over water over mate, with sticky-activity
    /// guards so a creature mid-meal or mid-drink is not peeled away by a
    /// marginally higher competing need below the critical threshold.
    pub(crate) fn decide(&mut self, id: EntityId, env: &mut Environment) {
        self.time_since_choice = 0.0;
        let sticky_eating = self.action == CreatureAction::Eating
            && self.hunger > 0.0
            && self
                .food_target
                .is_some_and(|target| env.entity(target).is_some_and(|entity| entity.alive))
            && self.thirst < env.config().critical_need_threshold;
        let sticky_drinking = self.action == CreatureAction::Drinking && self.thirst > 0.0;

        if self.hunger >= self.thirst || sticky_eating {
            self.seek_food(id, env);
        } else if self.thirst >= self.reproductive_urge || sticky_drinking {
            self.seek_water(id, env);
        } else {
            self.seek_mate(id, env);
        }
        self.act(id, env);
    }

    fn seek_food(&mut self, id: EntityId, env: &mut Environment) {
        let Some(coord) = env.entity(id).map(|entity| entity.coord) else {
            return;
        };
        match env.sense_food(coord, id, Environment::distance_preference) {
            Some(target) => {
                self.action = CreatureAction::GoingToFood;
                self.food_target = Some(target);
            }
            None => {
                self.action = CreatureAction::Exploring;
                self.food_target = None;
            }
        }
    }

    fn seek_water(&mut self, id: EntityId, env: &mut Environment) {
        let Some(coord) = env.entity(id).map(|entity| entity.coord) else {
            return;
        };
        match env.sense_water(coord) {
            Some(water) => {
                self.action = CreatureAction::GoingToWater;
                self.water_target = Some(water);
            }
            None => {
                self.action = CreatureAction::Exploring;
                self.water_target = None;
            }
        }
    }

    /// Takes the nearest candidate by squared distance, first encountered
    /// keeping ties, so mate choice is deterministic.
    fn seek_mate(&mut self, id: EntityId, env: &mut Environment) {
        let Some(coord) = env.entity(id).map(|entity| entity.coord) else {
            return;
        };
        let mut nearest: Option<(i32, EntityId)> = None;
        for candidate in env.sense_potential_mates(coord, id) {
            let Some(entity) = env.entity(candidate) else {
                continue;
            };
            let distance = entity.coord.sqr_distance(coord);
            if nearest.is_none_or(|(best, _)| distance < best) {
                nearest = Some((distance, candidate));
            }
        }
        match nearest {
            Some((_, mate)) => {
                self.action = CreatureAction::GoingToMate;
                self.mate_target = Some(mate);
            }
            None => {
                self.action = CreatureAction::SearchingForMate;
                self.mate_target = None;
            }
        }
    }

    /// Dispatches on the freshly chosen action: wander, or close in on the
    /// current target and switch to its interaction state when adjacent.
    /// Targets are revalidated here, at the point of use; anything stale
    /// degrades to exploration instead of stalling.
    fn act(&mut self, id: EntityId, env: &mut Environment) {
        let Some(coord) = env.entity(id).map(|entity| entity.coord) else {
            return;
        };
        match self.action {
            CreatureAction::Exploring | CreatureAction::SearchingForMate => {
                self.wander_step(coord, env);
            }
            CreatureAction::GoingToFood => {
                let goal = self.food_target.and_then(|target| {
                    env.entity(target)
                        .filter(|entity| entity.alive)
                        .map(|entity| entity.coord)
                });
                match goal {
                    Some(goal) if coord.are_neighbours(goal) => {
                        self.action = CreatureAction::Eating;
                    }
                    Some(goal) => self.advance_along_path(coord, goal, env),
                    None => {
                        self.food_target = None;
                        self.action = CreatureAction::Exploring;
                        self.wander_step(coord, env);
                    }
                }
            }
            CreatureAction::GoingToWater => match self.water_target {
                Some(goal) if coord.are_neighbours(goal) => {
                    self.action = CreatureAction::Drinking;
                }
                Some(goal) => self.advance_along_path(coord, goal, env),
                None => {
                    self.action = CreatureAction::Exploring;
                    self.wander_step(coord, env);
                }
            },
            CreatureAction::GoingToMate => {
                let goal = self.mate_target.and_then(|mate| {
                    env.entity(mate)
                        .filter(|entity| entity.alive)
                        .map(|entity| entity.coord)
                });
                match goal {
                    Some(goal) if coord.are_neighbours(goal) => {
                        self.action = CreatureAction::Reproducing;
                        self.begin_reproducing(env);
                    }
                    Some(goal) => self.advance_along_path(coord, goal, env),
                    None => {
                        self.mate_target = None;
                        self.action = CreatureAction::SearchingForMate;
                        self.wander_step(coord, env);
                    }
                }
            }
            CreatureAction::Eating | CreatureAction::Drinking | CreatureAction::Reproducing => {}
        }
    }

    /// Starting a pregnancy is idempotent; one already under way is kept.
    fn begin_reproducing(&mut self, env: &Environment) {
        if self.sex() != Sex::Female || self.pregnancy.is_some() {
            return;
        }
        let Some(sire) = self.mate_target else {
            return;
        };
        if env.entity(sire).is_some_and(|entity| entity.alive) {
            self.pregnancy = Some(Pregnancy { sire, elapsed: 0.0 });
        }
    }

    fn wander_step(&mut self, coord: Coord, env: &mut Environment) {
        let next = env.next_tile_weighted(coord, self.move_state.from);
        if next != coord {
            self.start_move(coord, next);
        }
    }

    /// One step toward `goal`, recomputing the cached path first whenever
    /// the staleness predicate says it no longer fits.
    fn advance_along_path(&mut self, coord: Coord, goal: Coord, env: &mut Environment) {
        if self.path_is_stale(goal) {
            self.path = find_path(env.grid().mask(), coord, goal).map(|steps| CachedPath {
                steps,
                cursor: 0,
                target: goal,
            });
        }
        let Some(path) = &mut self.path else {
            // Unreachable target: drift this tick instead of stalling.
            self.wander_step(coord, env);
            return;
        };
        let Some(&next) = path.steps.get(path.cursor) else {
            // Exhausted without reaching adjacency (the target moved on);
            // force a fresh computation next tick.
            self.path = None;
            return;
        };
        path.cursor += 1;
        self.start_move(coord, next);
    }

    /// A cached path is reused only while it is mid-execution toward the
    /// same declared target and its last handed-out step matches where the
    /// creature was just headed; anything else means recompute.
    fn path_is_stale(&self, goal: Coord) -> bool {
        let Some(path) = &self.path else {
            return true;
        };
        if path.target != goal {
            return true;
        }
        if path.cursor == 0 || path.cursor >= path.steps.len() {
            return true;
        }
        path.steps[path.cursor - 1] != self.move_state.to
    }

    fn start_move(&mut self, from: Coord, to: Coord) {
        let diagonal = from.x != to.x && from.y != to.y;
        self.move_state = MoveState {
            from,
            to,
            progress: 0.0,
            speed_factor: if diagonal { FRAC_1_SQRT_2 } else { 1.0 },
            active: true,
        };
    }

    /// Interaction states drain their matching need each idle tick. Eating
    /// routes through the environment's consume capability, so plant supply
    /// and prey kills stay with the single owner of that state.
    fn handle_interactions(&mut self, dt: f32, env: &mut Environment) {
        match self.action {
            CreatureAction::Eating => {
                if let Some(target) = self.food_target {
                    let bite = self.hunger.min(dt / env.config().eat_duration);
                    let consumed = env.consume_from(target, bite);
                    self.hunger -= consumed;
                    if !env.entity(target).is_some_and(|entity| entity.alive) {
                        self.food_target = None;
                    }
                }
            }
            CreatureAction::Drinking => {
                self.thirst = (self.thirst - dt / env.config().drink_duration).max(0.0);
            }
            CreatureAction::Reproducing => {
                self.reproductive_urge =
                    (self.reproductive_urge - dt / env.config().reproduce_duration).max(0.0);
            }
            _ => {}
        }
    }
}
