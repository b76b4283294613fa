//! Attack resolution shared by shooting, overwatch and melee.
//!
//! Each attack rolls to hit, to wound and to save; unsaved attacks are
//! allocated to an already wounded model first, and excess damage on a
//! slain model is lost.

use serde::{Deserialize, Serialize};

use crate::board::{ChangeSet, UnitId, UnitStatus, WeaponProfile};
use crate::dice::DiceRoller;
use crate::error::StateError;

/// One weapon firing or striking with a number of attacks.
#[derive(Debug, Clone)]
pub struct AttackPool<'w> {
    pub weapon: &'w WeaponProfile,
    pub attacks: u32,
}

/// Totals from resolving a set of attack pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSummary {
    pub attacks: u32,
    pub hits: u32,
    pub wounds: u32,
    pub unsaved: u32,
    pub damage: u32,
    pub slain: u32,
}

/// D6 result needed to wound, from strength against toughness.
pub fn wound_target(strength: u8, toughness: u8) -> u8 {
    let (s, t) = (u16::from(strength), u16::from(toughness));
    if s >= t * 2 {
        2
    } else if s > t {
        3
    } else if s == t {
        4
    } else if s * 2 <= t {
        6
    } else {
        5
    }
}

/// D6 result needed to save, or `None` if armour penetration leaves no save.
pub fn save_target(save: u8, armour_penetration: u8) -> Option<u8> {
    let needed = save.saturating_add(armour_penetration);
    (needed <= 6).then_some(needed.max(2))
}

/// A natural 1 always fails; a natural 6 always succeeds.
fn succeeds(roll: u8, needed: u8) -> bool {
    roll != 1 && (roll == 6 || roll >= needed)
}

/// Resolves attack pools against `target`, recording every mutation and
/// die into `set`. `hit_on` overrides the weapons' skill, as overwatch does.
pub fn resolve_attacks(
    set: &mut ChangeSet,
    dice: &mut dyn DiceRoller,
    pools: &[AttackPool<'_>],
    target: &UnitId,
    hit_on: Option<u8>,
) -> Result<AttackSummary, StateError> {
    let mut summary = AttackSummary::default();
    for pool in pools {
        if pool.attacks == 0 {
            continue;
        }
        let (toughness, save) = {
            let unit = set
                .state()
                .unit(target)
                .ok_or_else(|| StateError::UnknownUnit(target.to_string()))?;
            if !unit.models.iter().any(|m| m.alive) {
                break;
            }
            (unit.profile.toughness, unit.profile.save)
        };
        let weapon = pool.weapon;
        summary.attacks = summary.attacks.saturating_add(pool.attacks);

        let hit_rolls = dice.roll_d6s(pool.attacks as usize);
        set.record_dice(&hit_rolls);
        let needed = hit_on.unwrap_or(weapon.skill);
        let hits = hit_rolls.iter().filter(|r| succeeds(**r, needed)).count();
        summary.hits += hits as u32;

        let wound_rolls = dice.roll_d6s(hits);
        set.record_dice(&wound_rolls);
        let to_wound = wound_target(weapon.strength, toughness);
        let wounds = wound_rolls.iter().filter(|r| succeeds(**r, to_wound)).count();
        summary.wounds += wounds as u32;

        let save_rolls = dice.roll_d6s(wounds);
        set.record_dice(&save_rolls);
        let to_save = save_target(save, weapon.armour_penetration);
        let unsaved = save_rolls
            .iter()
            .filter(|r| match to_save {
                Some(n) => !succeeds(**r, n),
                None => true,
            })
            .count();
        summary.unsaved += unsaved as u32;

        for _ in 0..unsaved {
            match allocate(set, target, weapon.damage)? {
                Some((dealt, slain)) => {
                    summary.damage += dealt;
                    if slain {
                        summary.slain += 1;
                    }
                }
                None => break,
            }
        }
    }

    let destroyed = set
        .state()
        .unit(target)
        .is_some_and(|u| u.status == UnitStatus::Deployed && !u.models.iter().any(|m| m.alive));
    if destroyed {
        set.set_status(target, UnitStatus::Destroyed)?;
        set.note(format!("unit '{target}' was destroyed"));
    }
    Ok(summary)
}

/// Applies one unsaved attack. Returns damage dealt and whether the model
/// died, or `None` if no model is left alive.
fn allocate(set: &mut ChangeSet, target: &UnitId, damage: u32) -> Result<Option<(u32, bool)>, StateError> {
    let choice = {
        let unit = set
            .state()
            .unit(target)
            .ok_or_else(|| StateError::UnknownUnit(target.to_string()))?;
        let max = unit.profile.wounds;
        unit.models
            .iter()
            .filter(|m| m.alive)
            .find(|m| m.wounds < max)
            .or_else(|| unit.models.iter().find(|m| m.alive))
            .map(|m| (m.id.clone(), m.wounds))
    };
    let Some((model, wounds)) = choice else {
        return Ok(None);
    };
    let dealt = damage.min(wounds);
    let left = wounds - dealt;
    set.set_wounds(target, &model, left)?;
    if left == 0 {
        set.set_alive(target, &model, false)?;
    }
    Ok(Some((dealt, left == 0)))
}
