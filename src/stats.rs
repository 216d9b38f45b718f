//! Pure projections over the current hunt collection.
//!
//! Everything user-visible that is derived from state lives here and is
//! recomputed from scratch on every call. Nothing in this module mutates or
//! caches; rendering layers call [`project`] after each state change.

use serde::{Deserialize, Serialize};

use crate::hunt::HuntRecord;

/// Aggregates derived from the full hunt collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HuntStats {
    /// Total hunts ever started (active + found).
    pub hunts_started: usize,
    /// Hunts not yet completed.
    pub active_hunts: usize,
    /// Completed hunts.
    pub shinies_found: usize,
    /// Sum of encounter counters across all hunts.
    pub total_encounters: u64,
    /// Mean encounters per completed hunt, rounded. `None` until the first
    /// shiny is found.
    pub avg_encounters: Option<u64>,
    /// Completed hunt with the fewest encounters.
    pub luckiest: Option<HuntExtreme>,
    /// Completed hunt with the most encounters.
    pub longest: Option<HuntExtreme>,
}

/// A completed hunt singled out by its encounter count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntExtreme {
    /// Species of the hunt.
    pub species_name: String,
    /// Encounters when the shiny was found.
    pub encounter_count: u64,
}

impl HuntExtreme {
    fn from_record(rec: &HuntRecord) -> Self {
        Self {
            species_name: rec.species_name.clone(),
            encounter_count: rec.encounter_count,
        }
    }
}

/// Recomputes all aggregates from the given records.
pub fn project<'a, I>(records: I) -> HuntStats
where
    I: IntoIterator<Item = &'a HuntRecord>,
{
    let mut stats = HuntStats::default();
    let mut found_encounters: u64 = 0;
    let mut luckiest: Option<&HuntRecord> = None;
    let mut longest: Option<&HuntRecord> = None;

    for rec in records {
        stats.hunts_started += 1;
        stats.total_encounters += rec.encounter_count;

        if rec.completed {
            stats.shinies_found += 1;
            found_encounters += rec.encounter_count;
            if luckiest.is_none_or(|m| rec.encounter_count < m.encounter_count) {
                luckiest = Some(rec);
            }
            if longest.is_none_or(|m| rec.encounter_count > m.encounter_count) {
                longest = Some(rec);
            }
        } else {
            stats.active_hunts += 1;
        }
    }

    if stats.shinies_found > 0 {
        stats.avg_encounters =
            Some((found_encounters as f64 / stats.shinies_found as f64).round() as u64);
    }
    stats.luckiest = luckiest.map(HuntExtreme::from_record);
    stats.longest = longest.map(HuntExtreme::from_record);
    stats
}

/// Base shiny odds denominator for a game, or `None` when the game has no
/// shiny mechanic.
pub fn shiny_odds(game: &str) -> Option<u32> {
    match game {
        "Red/Blue" | "Yellow" => None,
        "Gold/Silver" | "Crystal" | "Ruby/Sapphire" | "Emerald" | "FireRed/LeafGreen"
        | "Diamond/Pearl" | "Platinum" | "HeartGold/SoulSilver" | "Black/White"
        | "Black 2/White 2" => Some(8192),
        "X/Y" | "Omega Ruby/Alpha Sapphire" | "Sun/Moon" | "Ultra Sun/Ultra Moon"
        | "Sword/Shield" | "Brilliant Diamond/Shining Pearl" | "Legends: Arceus"
        | "Scarlet/Violet" => Some(4096),
        _ => None,
    }
}

/// Cumulative chance, in percent, of having seen at least one shiny after
/// `count` encounters at `1/odds` per encounter.
pub fn cumulative_chance(count: u64, odds: u32) -> f64 {
    if odds == 0 || count == 0 {
        return 0.0;
    }
    (1.0 - (1.0 - 1.0 / f64::from(odds)).powi(count.min(i32::MAX as u64) as i32)) * 100.0
}

/// Progress toward an encounter target, clamped to 100.
pub fn progress_percent(count: u64, target: u64) -> u8 {
    if target == 0 {
        return 0;
    }
    (((count as f64 / target as f64) * 100.0).round() as u64).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HuntId;

    fn rec(id: u64, count: u64, completed: bool) -> HuntRecord {
        HuntRecord {
            id: HuntId::Server(id),
            species_name: format!("species-{id}"),
            game: "Sword/Shield".to_string(),
            sprite_url: String::new(),
            types: vec![],
            encounter_count: count,
            target_count: None,
            completed,
            completed_at: completed.then_some(1),
            started_at: 0,
        }
    }

    #[test]
    fn aggregates_over_mixed_collection() {
        let records = vec![rec(1, 100, true), rec(2, 50, false), rec(3, 300, true)];
        let stats = project(&records);

        assert_eq!(stats.hunts_started, 3);
        assert_eq!(stats.active_hunts, 1);
        assert_eq!(stats.shinies_found, 2);
        assert_eq!(stats.total_encounters, 450);
        assert_eq!(stats.avg_encounters, Some(200));
        assert_eq!(stats.luckiest.expect("luckiest").encounter_count, 100);
        assert_eq!(stats.longest.expect("longest").encounter_count, 300);
    }

    #[test]
    fn empty_collection_projects_defaults() {
        let stats = project([]);
        assert_eq!(stats, HuntStats::default());
    }

    #[test]
    fn odds_and_progress_helpers() {
        assert_eq!(shiny_odds("Yellow"), None);
        assert_eq!(shiny_odds("Crystal"), Some(8192));
        assert_eq!(shiny_odds("Scarlet/Violet"), Some(4096));
        assert_eq!(shiny_odds("unknown game"), None);

        assert_eq!(cumulative_chance(0, 4096), 0.0);
        let halfway = cumulative_chance(2839, 4096);
        assert!(halfway > 49.0 && halfway < 51.0);

        assert_eq!(progress_percent(0, 100), 0);
        assert_eq!(progress_percent(50, 100), 50);
        assert_eq!(progress_percent(500, 100), 100);
    }
}
