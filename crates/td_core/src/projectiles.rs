//! Projectile flight and landing.

use crate::components::{Bullet, BulletPayload};
use crate::content::StatusKind;
use crate::events::GameEvent;
use crate::navigation::arc_height;
use crate::targeting::{Battlefield, Source};

const CATACLYSM_BONUS: f64 = 1.5;
const BURN_SPREAD_FACTOR: f64 = 1.5;
const TRACER_IMPACT_RADIUS: f64 = 4.0;

/// Move every bullet and resolve the ones that arrive this step.
pub fn update_bullets(field: &mut Battlefield<'_>, dt: f64) {
    let mut flying = std::mem::take(&mut *field.bullets);
    flying.retain_mut(|bullet| {
        bullet.ttl -= dt;
        bullet.pos = bullet.pos + bullet.vel.scale(dt);
        let p = if bullet.flight_time > 0.0 {
            ((bullet.flight_time - bullet.ttl) / bullet.flight_time).clamp(0.0, 1.0)
        } else {
            1.0
        };
        bullet.height = arc_height(bullet.apex, p);
        if bullet.ttl > 0.0 {
            return true;
        }
        land(bullet, field);
        false
    });
    *field.bullets = flying;
}

fn land(bullet: &Bullet, field: &mut Battlefield<'_>) {
    match bullet.payload {
        BulletPayload::Tracer => {
            field
                .particles
                .impact(bullet.pos, TRACER_IMPACT_RADIUS, bullet.element);
        }
        BulletPayload::Area { radius } => {
            explode(bullet, radius, field);
            field.particles.impact(bullet.pos, radius, bullet.element);
        }
    }
}

fn explode(bullet: &Bullet, radius: f64, field: &mut Battlefield<'_>) {
    let src = Source {
        tower: bullet.source,
        element: bullet.element,
        status: bullet.status,
        mods: &bullet.mods,
    };
    let victims = field.index.query(field.creeps, bullet.pos, radius);
    for &idx in &victims {
        let burning = field.creeps[idx].status.burn.is_some();
        let damage = if bullet.mods.cataclysm && burning {
            bullet.damage * CATACLYSM_BONUS
        } else {
            bullet.damage
        };
        field.strike(idx, &src, damage);
    }
    if !victims.is_empty() {
        field.counters.hits += 1;
        field.events.push(GameEvent::Hit {
            tower: bullet.source,
        });
    }

    if bullet.mods.burn_spread {
        let reach = radius * BURN_SPREAD_FACTOR;
        for idx in field.index.query(field.creeps, bullet.pos, reach) {
            if !victims.contains(&idx) {
                field.afflict(idx, &src, StatusKind::Burn);
            }
        }
    }
}
