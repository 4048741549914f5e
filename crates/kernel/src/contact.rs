//! Pairwise overlap response for unit-radius particles.

use crate::particle::Particle;

/// Fraction of the overlap removed per contact.
pub const RESPONSE_COEF: f32 = 1.0;

/// Squared distances at or below this are treated as coincident and skipped.
pub const COINCIDENT_EPS: f32 = 1.0e-4;

/// Push two overlapping particles apart along the line joining them.
///
/// Both particles move by the same amount in opposite directions, so the
/// midpoint of the pair is preserved. A single call removes the overlap
/// only partially; repeated sub-steps do the rest. Returns `true` if a
/// correction was applied.
#[inline]
pub fn resolve(a: &mut Particle, b: &mut Particle) -> bool {
    let d = a.position - b.position;
    let dist2 = d.length_squared();
    if dist2 < 1.0 && dist2 > COINCIDENT_EPS {
        let dist = dist2.sqrt();
        let delta = RESPONSE_COEF * 0.5 * (1.0 - dist);
        let correction = d / dist * delta;
        a.position += correction;
        b.position -= correction;
        true
    } else {
        false
    }
}
