//! Cosmetic particle sink.
//!
//! Combat writes short-lived visual records here; renderers read them.
//! The sink owns its own RNG stream derived from the session seed, so
//! spawning or dropping particles never shifts gameplay draws.

use serde::{Deserialize, Serialize};

use crate::content::{CreepType, TowerKind};
use crate::math::Vec2;
use crate::rng::SimRng;

/// Maximum live particles. Further spawns are dropped.
pub const MAX_PARTICLES: usize = 1024;

/// Mixed into the session seed for the cosmetic stream.
const COSMETIC_SEED_SALT: u32 = 0x9E37_79B9;

/// Ring growth in pixels per second.
const RING_GROWTH: f64 = 60.0;

/// Alpha lost per second.
const FADE_RATE: f64 = 2.0;

/// Particle geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// Expanding circle outline.
    Ring,
    /// Moving dot.
    Spark,
}

/// One visual record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Geometry.
    pub shape: Shape,
    /// Pixel position.
    pub pos: Vec2,
    /// Pixels per second.
    pub vel: Vec2,
    /// Radius for rings.
    pub radius: f64,
    /// Opacity in `[0, 1]`.
    pub alpha: f64,
    /// Seconds left.
    pub ttl: f64,
    /// RGB color.
    pub color: u32,
}

/// Look of a projectile impact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactStyle {
    /// RGB color.
    pub color: u32,
    /// Lifetime in seconds.
    pub ttl: f64,
    /// Number of sparks around the ring.
    pub sparks: u32,
}

impl ImpactStyle {
    /// Style for an element. Unlisted elements get the plain style.
    #[must_use]
    pub const fn for_kind(kind: TowerKind) -> Self {
        match kind {
            TowerKind::Fire => Self {
                color: 0xFF_6B_35,
                ttl: 0.25,
                sparks: 6,
            },
            TowerKind::Ice => Self {
                color: 0x7D_D3_FC,
                ttl: 0.3,
                sparks: 4,
            },
            TowerKind::Light => Self {
                color: 0xFD_E0_47,
                ttl: 0.15,
                sparks: 3,
            },
            TowerKind::Poison => Self {
                color: 0x86_EF_AC,
                ttl: 0.35,
                sparks: 2,
            },
            _ => Self {
                color: kind.color(),
                ttl: 0.18,
                sparks: 0,
            },
        }
    }
}

/// Bounded particle buffer with its own RNG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSink {
    rng: SimRng,
    items: Vec<Particle>,
}

impl Default for ParticleSink {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ParticleSink {
    /// Empty sink whose stream is derived from the session seed.
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            rng: SimRng::new(seed ^ COSMETIC_SEED_SALT),
            items: Vec::new(),
        }
    }

    /// Live particles.
    #[must_use]
    pub fn items(&self) -> &[Particle] {
        &self.items
    }

    /// Number of live particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no particles are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a particle unless the sink is full.
    pub fn push(&mut self, particle: Particle) {
        if self.items.len() < MAX_PARTICLES {
            self.items.push(particle);
        }
    }

    fn ring(&mut self, pos: Vec2, radius: f64, color: u32, ttl: f64) {
        self.push(Particle {
            shape: Shape::Ring,
            pos,
            vel: Vec2::ZERO,
            radius,
            alpha: 1.0,
            ttl,
            color,
        });
    }

    fn sparks(&mut self, pos: Vec2, count: u32, min_speed: f64, spread: f64, color: u32, ttl: f64) {
        for _ in 0..count {
            let angle = self.rng.next_f64() * std::f64::consts::TAU;
            let speed = min_speed + self.rng.next_f64() * spread;
            self.push(Particle {
                shape: Shape::Spark,
                pos,
                vel: Vec2::new(angle.cos() * speed, angle.sin() * speed),
                radius: 0.0,
                alpha: 1.0,
                ttl,
                color,
            });
        }
    }

    /// Impact of a projectile or blast.
    pub fn impact(&mut self, pos: Vec2, radius: f64, kind: TowerKind) {
        let style = ImpactStyle::for_kind(kind);
        self.ring(pos, radius, style.color, style.ttl);
        self.sparks(pos, style.sparks, 40.0, 60.0, style.color, style.ttl);
    }

    /// Death effect for a creep.
    pub fn death(&mut self, pos: Vec2, kind: CreepType) {
        match kind {
            CreepType::Boss => {
                self.ring(pos, 0.0, 0x94_A3_B8, 0.4);
                self.sparks(pos, 24, 60.0, 80.0, 0xF8_FF_00, 0.6);
            }
            _ => self.ring(pos, 0.0, 0x94_A3_B8, 0.4),
        }
    }

    /// Frost nova pulse.
    pub fn nova(&mut self, pos: Vec2, radius: f64) {
        self.ring(pos, radius, 0xBA_E6_FD, 0.3);
    }

    /// Age, move and fade every particle; drop the expired ones.
    pub fn update(&mut self, dt: f64) {
        for p in &mut self.items {
            if p.shape == Shape::Ring {
                p.radius += RING_GROWTH * dt;
            }
            p.pos = p.pos + p.vel.scale(dt);
            p.alpha -= FADE_RATE * dt;
            p.ttl -= dt;
        }
        self.items.retain(|p| p.ttl > 0.0 && p.alpha > 0.0);
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
