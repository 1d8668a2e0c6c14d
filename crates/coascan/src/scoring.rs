//! Trust score: `clamp(100 - sum(severity * 5), 0, 100)`.

use crate::model::Flag;

pub const MAX_SCORE: u8 = 100;

/// Points deducted per unit of flag severity.
pub const PENALTY_PER_SEVERITY: u64 = 5;

pub fn trust_score(flags: &[Flag]) -> u8 {
    let penalty = flags.iter().fold(0u64, |acc, flag| {
        acc.saturating_add(u64::from(flag.severity).saturating_mul(PENALTY_PER_SEVERITY))
    });
    let score = u64::from(MAX_SCORE).saturating_sub(penalty);
    // Never above MAX_SCORE, so the narrowing is lossless.
    score as u8
}
