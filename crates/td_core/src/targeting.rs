//! Tower target selection and firing.
//!
//! Runs once per tick after the spatial index is rebuilt. Each tower first
//! runs its auxiliary timers (frost nova, meteor), which ignore the shot
//! cooldown, then picks a target among the creeps in range and fires with
//! the strategy of its [`AttackKind`].

use crate::combat::{apply_damage, apply_status, Dot};
use crate::components::{
    Bullet, BulletPayload, Creep, CreepId, TargetingMode, Tower, TowerId, TowerMods,
    METEOR_PERIOD,
};
use crate::content::{AttackKind, StatusKind, TowerKind};
use crate::events::GameEvent;
use crate::math::Vec2;
use crate::particles::ParticleSink;
use crate::rng::SimRng;
use crate::spatial::CreepIndex;
use crate::state::Counters;

/// Probability that a direct or chain shot connects.
pub const ACCURACY: f64 = 0.98;

const NOVA_PERIOD: f64 = 4.5;
const NOVA_RANGE_FRACTION: f64 = 0.7;

const TRACER_SPEED: f64 = 520.0;
const PIERCE_REACH: f64 = 50.0;
const PIERCE_WIDTH: f64 = 10.0;
const PIERCE_DAMAGE: f64 = 0.7;
const POISON_SPREAD_RADIUS: f64 = 48.0;

const CHAIN_RANGE: f64 = 70.0;
const CHAIN_DAMAGE: f64 = 0.6;
const CHAIN_STUN: f64 = 0.25;
const CHAIN_DOT_DURATION: f64 = 1.5;

const SPLASH_SPEED: f64 = 260.0;
const SPLASH_APEX: f64 = 12.0;
const SPLASH_RADIUS: f64 = 34.0;
const SIEGE_SPEED: f64 = 170.0;
const SIEGE_APEX: f64 = 48.0;
const SIEGE_RADIUS: f64 = 52.0;
const WIDE_SPLASH_BONUS: f64 = 24.0;

/// Everything a tower can touch while firing.
///
/// Borrowed field by field from the simulation state so that towers can be
/// iterated mutably alongside it.
#[derive(Debug)]
pub struct Battlefield<'a> {
    /// Creeps, in id order.
    pub creeps: &'a mut [Creep],
    /// Spatial index built from `creeps` this tick.
    pub index: &'a CreepIndex,
    /// Projectiles in flight.
    pub bullets: &'a mut Vec<Bullet>,
    /// Cosmetic sink.
    pub particles: &'a mut ParticleSink,
    /// Gameplay random stream.
    pub rng: &'a mut SimRng,
    /// Shot, hit and combo tallies.
    pub counters: &'a mut Counters,
    /// Buffered events.
    pub events: &'a mut Vec<GameEvent>,
}

/// Who is dealing damage.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    /// Tower credited.
    pub tower: TowerId,
    /// Damage element.
    pub element: TowerKind,
    /// Status applied with the damage.
    pub status: Option<StatusKind>,
    /// Modifiers of the tower.
    pub mods: &'a TowerMods,
}

impl<'a> Source<'a> {
    fn of(tower: &'a Tower) -> Self {
        Self {
            tower: tower.id,
            element: tower.kind,
            status: tower.status,
            mods: &tower.mods,
        }
    }
}

impl Battlefield<'_> {
    /// Damage one creep and apply the source's status.
    ///
    /// Sets kill credit, emits `CreepDamage` and any combo that fires.
    /// Returns the damage dealt.
    pub fn strike(&mut self, idx: usize, src: &Source<'_>, raw: f64) -> f64 {
        let Some(creep) = self.creeps.get_mut(idx) else {
            return 0.0;
        };
        let shred = creep.status.res_shred;
        let dealt = apply_damage(creep, raw, src.element, shred);
        creep.last_hit_by = Some(src.tower);
        self.events.push(GameEvent::CreepDamage {
            creep: creep.id,
            kind: creep.kind,
            amount: dealt,
            element: src.element,
            tower: src.tower,
        });
        if let Some(status) = src.status {
            self.afflict(idx, src, status);
        }
        dealt
    }

    /// Apply a status without damage, recording any combo.
    pub fn afflict(&mut self, idx: usize, src: &Source<'_>, status: StatusKind) {
        let Some(creep) = self.creeps.get_mut(idx) else {
            return;
        };
        if let Some(combo) = apply_status(creep, status, src.mods) {
            self.counters.combos += 1;
            self.events.push(GameEvent::Combo {
                creep: creep.id,
                combo,
                tower: src.tower,
            });
        }
    }

    fn hit_event(&mut self, tower: TowerId) {
        self.events.push(GameEvent::Hit { tower });
    }
}

/// Pick a target among candidate creep indices.
///
/// Candidates must be in ascending index order, which is spawn order.
#[must_use]
pub fn select_target(
    mode: TargetingMode,
    cycle_last: Option<CreepId>,
    creeps: &[Creep],
    candidates: &[usize],
) -> Option<usize> {
    match mode {
        TargetingMode::First => candidates.iter().copied().fold(None, |best, i| match best {
            Some(b) if creeps[i].progress() <= creeps[b].progress() => Some(b),
            _ => Some(i),
        }),
        TargetingMode::Last => candidates.iter().copied().fold(None, |best, i| match best {
            Some(b) if creeps[i].progress() >= creeps[b].progress() => Some(b),
            _ => Some(i),
        }),
        TargetingMode::Cycle => {
            let mut ordered = candidates.to_vec();
            ordered.sort_by(|&a, &b| {
                creeps[a]
                    .progress()
                    .total_cmp(&creeps[b].progress())
                    .then_with(|| creeps[a].id.cmp(&creeps[b].id))
            });
            let next = cycle_last
                .and_then(|last| ordered.iter().position(|&i| creeps[i].id == last))
                .map_or(0, |pos| (pos + 1) % ordered.len());
            ordered.get(next).copied()
        }
    }
}

/// Fire every tower for one step.
pub fn fire_towers(towers: &mut [Tower], field: &mut Battlefield<'_>, dt: f64) {
    for tower in towers.iter_mut().filter(|t| !t.ghost) {
        if tower.mods.nova {
            frost_nova(tower, field, dt);
        }
        if tower.mods.meteors {
            meteor(tower, field, dt);
        }

        if tower.cooldown > 0.0 {
            tower.cooldown -= dt;
            continue;
        }

        let candidates = field.index.query(field.creeps, tower.pos, tower.range);
        let Some(target) =
            select_target(tower.targeting, tower.cycle_last, field.creeps, &candidates)
        else {
            continue;
        };

        field.counters.shots += 1;
        field.events.push(GameEvent::Shot { tower: tower.id });
        tower.cooldown = 1.0 / tower.fire_rate;
        tower.cycle_last = Some(field.creeps[target].id);

        let damage = tower.effective_damage();
        match tower.attack {
            AttackKind::Direct => fire_direct(tower, target, damage, field),
            AttackKind::Chain => fire_chain(tower, target, damage, field),
            AttackKind::Splash => {
                let radius = SPLASH_RADIUS + blast_bonus(&tower.mods);
                launch(tower, target, damage, SPLASH_SPEED, SPLASH_APEX, radius, field);
            }
            AttackKind::Siege => {
                let radius = SIEGE_RADIUS + blast_bonus(&tower.mods);
                launch(tower, target, damage, SIEGE_SPEED, SIEGE_APEX, radius, field);
            }
        }
    }
}

fn blast_bonus(mods: &TowerMods) -> f64 {
    mods.aoe + if mods.splash { WIDE_SPLASH_BONUS } else { 0.0 }
}

fn frost_nova(tower: &mut Tower, field: &mut Battlefield<'_>, dt: f64) {
    tower.nova_timer -= dt;
    if tower.nova_timer > 0.0 {
        return;
    }
    tower.nova_timer = NOVA_PERIOD * tower.mods.nova_frequency;
    let radius = tower.range * NOVA_RANGE_FRACTION;
    let src = Source::of(tower);
    for idx in field.index.query(field.creeps, tower.pos, radius) {
        field.afflict(idx, &src, StatusKind::Chill);
    }
    field.particles.nova(tower.pos, radius);
}

fn meteor(tower: &mut Tower, field: &mut Battlefield<'_>, dt: f64) {
    tower.meteor_timer -= dt;
    if tower.meteor_timer > 0.0 {
        return;
    }
    tower.meteor_timer = METEOR_PERIOD;
    let candidates = field.index.query(field.creeps, tower.pos, tower.range);
    let Some(target) = select_target(tower.targeting, tower.cycle_last, field.creeps, &candidates)
    else {
        return;
    };
    let src = Source::of(tower);
    field.strike(target, &src, tower.damage);
    field.hit_event(tower.id);
    let pos = field.creeps[target].pos;
    field.particles.impact(pos, 12.0, tower.kind);
}

/// Accuracy roll, then damage and status to the target. Returns whether
/// the shot connected.
fn bolt(tower: &Tower, target: usize, damage: f64, field: &mut Battlefield<'_>) -> bool {
    if field.rng.next_f64() >= ACCURACY {
        return false;
    }
    field.counters.hits += 1;
    field.hit_event(tower.id);
    let src = Source::of(tower);
    field.strike(target, &src, damage);
    true
}

fn fire_direct(tower: &Tower, target: usize, damage: f64, field: &mut Battlefield<'_>) {
    if bolt(tower, target, damage, field) {
        if tower.mods.pierce > 0 {
            pierce(tower, target, damage, field);
        }
        if tower.mods.poison_spread {
            spread_poison(tower, target, field);
        }
    }
    let to = field.creeps[target].pos;
    tracer(tower, to, field);
}

fn pierce(tower: &Tower, target: usize, damage: f64, field: &mut Battlefield<'_>) {
    let aim = field.creeps[target].pos - tower.pos;
    let len = aim.length();
    if len == 0.0 {
        return;
    }
    let dir = aim.scale(1.0 / len);
    let src = Source::of(tower);
    let mut remaining = tower.mods.pierce;
    for idx in field.index.query(field.creeps, tower.pos, len + PIERCE_REACH) {
        if idx == target {
            continue;
        }
        let rel = field.creeps[idx].pos - tower.pos;
        let proj = rel.dot(dir);
        let perp = (rel.x * dir.y - rel.y * dir.x).abs();
        if proj <= 0.0 || proj >= len + PIERCE_REACH || perp >= PIERCE_WIDTH {
            continue;
        }
        field.strike(idx, &src, damage * PIERCE_DAMAGE);
        field.hit_event(tower.id);
        remaining -= 1;
        if remaining == 0 {
            break;
        }
    }
}

fn spread_poison(tower: &Tower, target: usize, field: &mut Battlefield<'_>) {
    let origin = field.creeps[target].pos;
    let neighbor = nearest(field, origin, POISON_SPREAD_RADIUS, |i| i != target);
    if let Some(idx) = neighbor {
        field.afflict(idx, &Source::of(tower), StatusKind::Poison);
    }
}

/// Nearest targetable creep within `radius`, lowest index on ties.
fn nearest(
    field: &Battlefield<'_>,
    origin: Vec2,
    radius: f64,
    keep: impl Fn(usize) -> bool,
) -> Option<usize> {
    field
        .index
        .query(field.creeps, origin, radius)
        .into_iter()
        .filter(|&i| keep(i))
        .min_by(|&a, &b| {
            let da = field.creeps[a].pos.distance_squared(origin);
            let db = field.creeps[b].pos.distance_squared(origin);
            da.total_cmp(&db).then(a.cmp(&b))
        })
}

fn fire_chain(tower: &Tower, target: usize, damage: f64, field: &mut Battlefield<'_>) {
    let hit = bolt(tower, target, damage, field);
    let to = field.creeps[target].pos;
    tracer(tower, to, field);
    if !hit {
        return;
    }

    let src = Source::of(tower);
    let reach = CHAIN_RANGE + tower.mods.chain_range;
    let bounce_damage = if tower.mods.singularity {
        damage
    } else {
        damage * CHAIN_DAMAGE
    };
    let mut struck = vec![target];
    let mut last = target;
    for _ in 0..=tower.mods.chain_bounce {
        let origin = field.creeps[last].pos;
        let Some(next) = nearest(field, origin, reach, |i| !struck.contains(&i)) else {
            break;
        };
        field.strike(next, &src, bounce_damage);
        let creep = &mut field.creeps[next];
        if tower.mods.stun_chain {
            creep.status.stun = creep.status.stun.max(CHAIN_STUN);
        }
        if tower.mods.light_dot > 0.0 {
            creep.status.lightning = Some(Dot {
                remaining: CHAIN_DOT_DURATION,
                dps: tower.mods.light_dot,
            });
        }
        field.hit_event(tower.id);
        struck.push(next);
        last = next;
    }
}

fn tracer(tower: &Tower, to: Vec2, field: &mut Battlefield<'_>) {
    let aim = to - tower.pos;
    let dist = aim.length();
    let ttl = dist / TRACER_SPEED;
    field.bullets.push(Bullet {
        payload: BulletPayload::Tracer,
        pos: tower.pos,
        vel: aim.normalize().scale(TRACER_SPEED),
        ttl,
        flight_time: ttl,
        apex: 0.0,
        height: 0.0,
        source: tower.id,
        element: tower.kind,
        damage: 0.0,
        status: None,
        mods: TowerMods::default(),
    });
}

fn launch(
    tower: &Tower,
    target: usize,
    damage: f64,
    speed: f64,
    apex: f64,
    radius: f64,
    field: &mut Battlefield<'_>,
) {
    let aim = field.creeps[target].pos - tower.pos;
    let ttl = aim.length() / speed;
    field.bullets.push(Bullet {
        payload: BulletPayload::Area { radius },
        pos: tower.pos,
        vel: aim.normalize().scale(speed),
        ttl,
        flight_time: ttl,
        apex,
        height: 0.0,
        source: tower.id,
        element: tower.kind,
        damage,
        status: tower.status,
        mods: tower.mods.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Behavior, CreepType};
    use crate::math::Cell;

    struct Arena {
        creeps: Vec<Creep>,
        index: CreepIndex,
        bullets: Vec<Bullet>,
        particles: ParticleSink,
        rng: SimRng,
        counters: Counters,
        events: Vec<GameEvent>,
    }

    impl Arena {
        fn new(positions: &[(f64, f64)]) -> Self {
            let creeps = positions
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| {
                    let mut c = Creep::new(
                        CreepId(i as u32 + 1),
                        CreepType::Grunt,
                        1,
                        1000.0,
                        40.0,
                        5,
                        Behavior::Linear,
                        vec![Vec2::new(x, y), Vec2::new(x + 1000.0, y)],
                    );
                    c.offset = x;
                    c
                })
                .collect();
            Self {
                creeps,
                index: CreepIndex::new(768.0, 512.0),
                bullets: Vec::new(),
                particles: ParticleSink::new(1),
                rng: SimRng::new(42),
                counters: Counters::default(),
                events: Vec::new(),
            }
        }

        fn fire(&mut self, towers: &mut [Tower], dt: f64) {
            self.index.rebuild(&self.creeps);
            let mut field = Battlefield {
                creeps: &mut self.creeps,
                index: &self.index,
                bullets: &mut self.bullets,
                particles: &mut self.particles,
                rng: &mut self.rng,
                counters: &mut self.counters,
                events: &mut self.events,
            };
            fire_towers(towers, &mut field, dt);
        }
    }

    fn tower_at(kind: TowerKind, pos: Vec2) -> Tower {
        let mut t = Tower::new(TowerId(1), kind, Cell::containing(pos));
        t.pos = pos;
        t
    }

    #[test]
    fn test_first_and_last() {
        let arena = Arena::new(&[(100.0, 100.0), (140.0, 100.0), (120.0, 100.0)]);
        let all = [0, 1, 2];
        assert_eq!(
            select_target(TargetingMode::First, None, &arena.creeps, &all),
            Some(1)
        );
        assert_eq!(
            select_target(TargetingMode::Last, None, &arena.creeps, &all),
            Some(0)
        );
    }

    #[test]
    fn test_first_ties_go_to_spawn_order() {
        let arena = Arena::new(&[(100.0, 100.0), (100.0, 120.0)]);
        assert_eq!(
            select_target(TargetingMode::First, None, &arena.creeps, &[0, 1]),
            Some(0)
        );
        assert_eq!(
            select_target(TargetingMode::Last, None, &arena.creeps, &[0, 1]),
            Some(0)
        );
    }

    #[test]
    fn test_cycle_rotates_and_wraps() {
        let arena = Arena::new(&[(120.0, 100.0), (100.0, 100.0), (140.0, 100.0)]);
        let all = [0, 1, 2];
        let pick = |last| select_target(TargetingMode::Cycle, last, &arena.creeps, &all);
        // Ordered by progress: 1, 0, 2.
        assert_eq!(pick(None), Some(1));
        assert_eq!(pick(Some(CreepId(2))), Some(0));
        assert_eq!(pick(Some(CreepId(1))), Some(2));
        assert_eq!(pick(Some(CreepId(3))), Some(1));
        // Last target gone: restart from the lowest.
        assert_eq!(pick(Some(CreepId(99))), Some(1));
    }

    #[test]
    fn test_cooldown_gates_firing() {
        let mut arena = Arena::new(&[(150.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Archer, Vec2::new(100.0, 100.0))];
        arena.fire(&mut towers, 0.1);
        assert_eq!(arena.counters.shots, 1);
        assert!((towers[0].cooldown - 1.0 / 1.1).abs() < 1e-9);

        arena.fire(&mut towers, 0.1);
        assert_eq!(arena.counters.shots, 1);
        assert!(arena
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::Shot { tower } if *tower == TowerId(1))));
    }

    #[test]
    fn test_out_of_range_holds_fire() {
        let mut arena = Arena::new(&[(400.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Archer, Vec2::new(100.0, 100.0))];
        arena.fire(&mut towers, 0.1);
        assert_eq!(arena.counters.shots, 0);
        assert_eq!(towers[0].cooldown, 0.0);
    }

    #[test]
    fn test_ghost_never_fires() {
        let mut arena = Arena::new(&[(150.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Archer, Vec2::new(100.0, 100.0))];
        towers[0].ghost = true;
        arena.fire(&mut towers, 0.1);
        assert_eq!(arena.counters.shots, 0);
    }

    #[test]
    fn test_direct_hit_spawns_tracer() {
        let mut arena = Arena::new(&[(150.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Archer, Vec2::new(100.0, 100.0))];
        arena.fire(&mut towers, 0.1);
        assert_eq!(arena.bullets.len(), 1);
        assert_eq!(arena.bullets[0].payload, BulletPayload::Tracer);
        if arena.counters.hits == 1 {
            assert!((arena.creeps[0].hp - 991.0).abs() < 1e-9);
            assert_eq!(arena.creeps[0].last_hit_by, Some(TowerId(1)));
        }
    }

    #[test]
    fn test_pierce_line() {
        // Target at 50px, one creep behind it on the line, one off it.
        let mut arena = Arena::new(&[(150.0, 100.0), (180.0, 105.0), (170.0, 130.0)]);
        let mut tower = tower_at(TowerKind::Archer, Vec2::new(100.0, 100.0));
        tower.mods.pierce = 2;
        arena.index.rebuild(&arena.creeps);
        let mut field = Battlefield {
            creeps: &mut arena.creeps,
            index: &arena.index,
            bullets: &mut arena.bullets,
            particles: &mut arena.particles,
            rng: &mut arena.rng,
            counters: &mut arena.counters,
            events: &mut arena.events,
        };
        pierce(&tower, 0, 10.0, &mut field);
        assert!((arena.creeps[1].hp - 993.0).abs() < 1e-9);
        assert_eq!(arena.creeps[2].hp, 1000.0);
    }

    #[test]
    fn test_chain_bounces_to_nearest_unhit() {
        let mut arena = Arena::new(&[(150.0, 100.0), (250.0, 100.0), (200.0, 100.0)]);
        let mut tower = tower_at(TowerKind::Light, Vec2::new(100.0, 100.0));
        tower.mods.chain_bounce = 1;
        arena.index.rebuild(&arena.creeps);
        let mut field = Battlefield {
            creeps: &mut arena.creeps,
            index: &arena.index,
            bullets: &mut arena.bullets,
            particles: &mut arena.particles,
            rng: &mut arena.rng,
            counters: &mut arena.counters,
            events: &mut arena.events,
        };
        fire_chain(&tower, 0, 10.0, &mut field);
        if arena.counters.hits == 1 {
            // 150 -> 200 -> 250, 60% each bounce.
            assert!((arena.creeps[2].hp - 994.0).abs() < 1e-9);
            assert!((arena.creeps[1].hp - 994.0).abs() < 1e-9);
        } else {
            assert_eq!(arena.creeps[2].hp, 1000.0);
        }
    }

    #[test]
    fn test_splash_radius_includes_aoe() {
        let mut arena = Arena::new(&[(150.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Fire, Vec2::new(100.0, 100.0))];
        towers[0].mods.aoe = 20.0;
        towers[0].mods.splash = true;
        arena.fire(&mut towers, 0.1);
        let bullet = &arena.bullets[0];
        assert_eq!(bullet.payload, BulletPayload::Area { radius: 78.0 });
        assert!((bullet.ttl - 50.0 / 260.0).abs() < 1e-9);
        assert_eq!(bullet.apex, 12.0);
    }

    #[test]
    fn test_nova_ignores_cooldown() {
        let mut arena = Arena::new(&[(150.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Ice, Vec2::new(100.0, 100.0))];
        towers[0].mods.nova = true;
        towers[0].cooldown = 5.0;
        arena.fire(&mut towers, 0.1);
        assert!(arena.creeps[0].status.chill.is_some());
        assert!((towers[0].nova_timer - 4.5).abs() < 1e-9);
        assert_eq!(arena.counters.shots, 0);
    }

    #[test]
    fn test_meteor_strikes_on_timer() {
        let mut arena = Arena::new(&[(150.0, 100.0)]);
        let mut towers = vec![tower_at(TowerKind::Fire, Vec2::new(100.0, 100.0))];
        towers[0].mods.meteors = true;
        towers[0].cooldown = 100.0;
        for _ in 0..37 {
            arena.fire(&mut towers, 0.1);
        }
        assert_eq!(arena.creeps[0].hp, 1000.0);
        arena.fire(&mut towers, 0.1);
        arena.fire(&mut towers, 0.1);
        // Grunts resist fire by 0.1.
        assert!((arena.creeps[0].hp - (1000.0 - 22.0 * 0.9)).abs() < 1e-6);
        assert!(arena.creeps[0].status.burn.is_some());
    }
}
