//! Faction standings towards the player.
//!
//! Standings live in [-100, 100] and map to a diplomacy tag through fixed
//! thresholds. Every change is recorded in a bounded history and published
//! to listeners. The table can be saved to and loaded from a host
//! [`KeyValueStore`] as a small JSON blob.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{EventBus, ListenerId};
use crate::game::constants::faction::{
    ENEMY_THRESHOLD, FRIENDLY_THRESHOLD, HISTORY_LEN, MAX_STANDING, MIN_STANDING,
};
use crate::game::persistence::{KeyValueStore, PersistenceError};

/// Factions known to the AI tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Federation,
    Empire,
    FreeTraders,
    MiningGuild,
    Pirates,
    Neutral,
}

impl Faction {
    pub const COUNT: usize = 6;

    pub const ALL: [Faction; Faction::COUNT] = [
        Faction::Federation,
        Faction::Empire,
        Faction::FreeTraders,
        Faction::MiningGuild,
        Faction::Pirates,
        Faction::Neutral,
    ];

    /// Dense index for per-faction arrays
    pub fn index(&self) -> usize {
        match self {
            Faction::Federation => 0,
            Faction::Empire => 1,
            Faction::FreeTraders => 2,
            Faction::MiningGuild => 3,
            Faction::Pirates => 4,
            Faction::Neutral => 5,
        }
    }

    /// Key used in persisted blobs
    pub fn key(&self) -> &'static str {
        match self {
            Faction::Federation => "federation",
            Faction::Empire => "empire",
            Faction::FreeTraders => "free_traders",
            Faction::MiningGuild => "mining_guild",
            Faction::Pirates => "pirates",
            Faction::Neutral => "neutral",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Faction::Federation => "Terran Federation",
            Faction::Empire => "Vorlath Empire",
            Faction::FreeTraders => "Free Trader Consortium",
            Faction::MiningGuild => "Mining Guild",
            Faction::Pirates => "Crimson Pirates",
            Faction::Neutral => "Neutral",
        }
    }

    /// Standing at the start of a campaign
    pub fn initial_standing(&self) -> i32 {
        match self {
            Faction::Federation => 40,
            Faction::Empire => 0,
            Faction::FreeTraders => 10,
            Faction::MiningGuild => 15,
            Faction::Pirates => -75,
            Faction::Neutral => 0,
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Diplomatic tag derived from a standing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diplomacy {
    Enemy,
    Neutral,
    Friendly,
}

impl Diplomacy {
    pub fn from_standing(faction: Faction, standing: i32) -> Self {
        if faction == Faction::Neutral {
            return Diplomacy::Neutral;
        }
        if standing <= ENEMY_THRESHOLD {
            Diplomacy::Enemy
        } else if standing >= FRIENDLY_THRESHOLD {
            Diplomacy::Friendly
        } else {
            Diplomacy::Neutral
        }
    }

    pub fn is_enemy(&self) -> bool {
        matches!(self, Diplomacy::Enemy)
    }
}

/// Published whenever a standing actually changes
#[derive(Debug, Clone, PartialEq)]
pub struct StandingChange {
    pub faction: Faction,
    pub old_standing: i32,
    pub new_standing: i32,
    pub old_diplomacy: Diplomacy,
    pub new_diplomacy: Diplomacy,
    pub reason: String,
}

impl StandingChange {
    pub fn diplomacy_changed(&self) -> bool {
        self.old_diplomacy != self.new_diplomacy
    }
}

/// One recorded standing change
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub faction: Faction,
    pub delta: i32,
    pub standing: i32,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Persisted form of the table
#[derive(Debug, Serialize, Deserialize)]
struct StandingsBlob {
    standings: BTreeMap<String, i64>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// Faction standings with history and change notifications
pub struct FactionTable {
    standings: [i32; Faction::COUNT],
    history: VecDeque<HistoryEntry>,
    listeners: EventBus<StandingChange>,
}

impl FactionTable {
    pub fn new() -> Self {
        Self {
            standings: Self::initial_table(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            listeners: EventBus::new(),
        }
    }

    fn initial_table() -> [i32; Faction::COUNT] {
        let mut table = [0; Faction::COUNT];
        for faction in Faction::ALL {
            table[faction.index()] = faction.initial_standing();
        }
        table
    }

    pub fn standing(&self, faction: Faction) -> i32 {
        self.standings[faction.index()]
    }

    /// Standing by persisted key; unknown keys read as 0
    pub fn standing_by_key(&self, key: &str) -> i32 {
        Faction::from_key(key).map_or(0, |f| self.standing(f))
    }

    pub fn diplomacy(&self, faction: Faction) -> Diplomacy {
        Diplomacy::from_standing(faction, self.standing(faction))
    }

    /// Diplomacy of every faction, indexed by [`Faction::index`]
    pub fn diplomacy_array(&self) -> [Diplomacy; Faction::COUNT] {
        let mut out = [Diplomacy::Neutral; Faction::COUNT];
        for faction in Faction::ALL {
            out[faction.index()] = self.diplomacy(faction);
        }
        out
    }

    pub fn all_diplomacy(&self) -> BTreeMap<Faction, Diplomacy> {
        Faction::ALL.iter().map(|&f| (f, self.diplomacy(f))).collect()
    }

    pub fn all_standings(&self) -> BTreeMap<Faction, i32> {
        Faction::ALL.iter().map(|&f| (f, self.standing(f))).collect()
    }

    /// Most recent changes, oldest first
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Adjust a standing by `delta`, clamped to the valid range.
    /// Returns the change when the standing actually moved.
    pub fn modify(&mut self, faction: Faction, delta: i32, reason: &str) -> Option<StandingChange> {
        let target = self.standing(faction).saturating_add(delta);
        self.apply(faction, target, reason)
    }

    /// Set an absolute standing, clamped to the valid range
    pub fn set_standing(&mut self, faction: Faction, value: i32, reason: &str) -> Option<StandingChange> {
        self.apply(faction, value, reason)
    }

    fn apply(&mut self, faction: Faction, value: i32, reason: &str) -> Option<StandingChange> {
        let old = self.standing(faction);
        let new = value.clamp(MIN_STANDING, MAX_STANDING);
        if new == old {
            return None;
        }

        self.standings[faction.index()] = new;

        if self.history.len() >= HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            faction,
            delta: new - old,
            standing: new,
            reason: reason.to_string(),
            at: Utc::now(),
        });

        let change = StandingChange {
            faction,
            old_standing: old,
            new_standing: new,
            old_diplomacy: Diplomacy::from_standing(faction, old),
            new_diplomacy: Diplomacy::from_standing(faction, new),
            reason: reason.to_string(),
        };

        if change.diplomacy_changed() {
            info!(
                faction = faction.key(),
                "Diplomacy with {} is now {:?} ({} -> {}, {})",
                faction,
                change.new_diplomacy,
                old,
                new,
                reason
            );
        } else {
            debug!(faction = faction.key(), old, new, "Standing changed: {}", reason);
        }

        self.listeners.publish(&change);
        Some(change)
    }

    /// Restore the initial table. History is kept.
    pub fn reset(&mut self) {
        for faction in Faction::ALL {
            self.apply(faction, faction.initial_standing(), "reset");
        }
    }

    pub fn on_standing_changed<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&StandingChange) -> anyhow::Result<()> + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Write the table as JSON under `key`
    pub fn save(&self, store: &mut dyn KeyValueStore, key: &str) -> Result<(), PersistenceError> {
        let blob = StandingsBlob {
            standings: Faction::ALL
                .iter()
                .map(|f| (f.key().to_string(), i64::from(self.standing(*f))))
                .collect(),
            saved_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&blob)?;
        store.set(key, json)?;
        debug!("Saved faction standings under '{}'", key);
        Ok(())
    }

    /// Load the table from `key`.
    ///
    /// Unknown factions are ignored and missing ones take their initial
    /// standing. Returns false, leaving the table untouched, when nothing is
    /// stored or the blob is corrupt.
    pub fn load(&mut self, store: &dyn KeyValueStore, key: &str) -> bool {
        let Some(json) = store.get(key) else {
            debug!("No faction standings stored under '{}'", key);
            return false;
        };

        let blob: StandingsBlob = match serde_json::from_str(&json) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Corrupt faction standings under '{}': {}", key, e);
                return false;
            }
        };

        let mut loaded = Self::initial_table();
        for (name, value) in &blob.standings {
            match Faction::from_key(name) {
                Some(faction) => {
                    loaded[faction.index()] =
                        (*value).clamp(i64::from(MIN_STANDING), i64::from(MAX_STANDING)) as i32;
                }
                None => debug!("Ignoring unknown faction '{}' in stored standings", name),
            }
        }

        for faction in Faction::ALL {
            self.apply(faction, loaded[faction.index()], "load");
        }

        info!(
            "Loaded faction standings from '{}' (saved {})",
            key,
            blob.saved_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
        true
    }
}

impl Default for FactionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FactionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactionTable")
            .field("standings", &self.all_standings())
            .field("history", &self.history.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::persistence::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_initial_table() {
        let table = FactionTable::new();
        assert_eq!(table.standing(Faction::Federation), 40);
        assert_eq!(table.standing(Faction::Pirates), -75);
        assert_eq!(table.diplomacy(Faction::Federation), Diplomacy::Friendly);
        assert_eq!(table.diplomacy(Faction::Pirates), Diplomacy::Enemy);
        assert_eq!(table.diplomacy(Faction::MiningGuild), Diplomacy::Neutral);
    }

    #[test]
    fn test_diplomacy_thresholds() {
        let cases = [
            (-26, Diplomacy::Enemy),
            (-25, Diplomacy::Enemy),
            (-24, Diplomacy::Neutral),
            (0, Diplomacy::Neutral),
            (24, Diplomacy::Neutral),
            (25, Diplomacy::Friendly),
            (26, Diplomacy::Friendly),
        ];
        for (standing, expected) in cases {
            assert_eq!(Diplomacy::from_standing(Faction::Empire, standing), expected, "{}", standing);
            assert_eq!(Diplomacy::from_standing(Faction::Neutral, standing), Diplomacy::Neutral);
        }
    }

    #[test]
    fn test_modify_clamps_and_records() {
        let mut table = FactionTable::new();
        let change = table.modify(Faction::Pirates, -500, "massacre").unwrap();
        assert_eq!(change.new_standing, -100);
        assert_eq!(table.standing(Faction::Pirates), -100);
        assert!(table.modify(Faction::Pirates, -1, "again").is_none());
        assert_eq!(table.history().count(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut table = FactionTable::new();
        for i in 0..(HISTORY_LEN + 20) {
            let delta = if i % 2 == 0 { 1 } else { -1 };
            table.modify(Faction::Empire, delta, "tick");
        }
        assert_eq!(table.history().count(), HISTORY_LEN);
    }

    #[test]
    fn test_listeners_only_on_change() {
        let mut table = FactionTable::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        table.on_standing_changed(move |c| {
            sink.borrow_mut().push((c.faction, c.new_diplomacy));
            Ok(())
        });

        table.modify(Faction::Empire, 0, "noop");
        table.modify(Faction::Empire, -30, "border incident");
        assert_eq!(*seen.borrow(), vec![(Faction::Empire, Diplomacy::Enemy)]);
    }

    #[test]
    fn test_standing_by_key() {
        let table = FactionTable::new();
        assert_eq!(table.standing_by_key("federation"), 40);
        assert_eq!(table.standing_by_key("klingons"), 0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = MemoryStore::new();
        let mut table = FactionTable::new();
        table.modify(Faction::Empire, -40, "war");
        table.modify(Faction::FreeTraders, 30, "trade deal");
        table.save(&mut store, "standings").unwrap();

        let mut restored = FactionTable::new();
        assert!(restored.load(&store, "standings"));
        assert_eq!(restored.all_standings(), table.all_standings());
    }

    #[test]
    fn test_load_corrupt_leaves_table() {
        let mut store = MemoryStore::new();
        store.set("standings", "{not json".to_string()).unwrap();
        let mut table = FactionTable::new();
        table.modify(Faction::Empire, 10, "gift");
        let before = table.all_standings();
        assert!(!table.load(&store, "standings"));
        assert_eq!(table.all_standings(), before);
        assert!(!table.load(&store, "missing"));
    }

    #[test]
    fn test_load_partial_and_unknown_keys() {
        let mut store = MemoryStore::new();
        store
            .set("standings", r#"{"standings":{"empire":-60,"klingons":5}}"#.to_string())
            .unwrap();
        let mut table = FactionTable::new();
        table.modify(Faction::Federation, -10, "drift");
        assert!(table.load(&store, "standings"));
        assert_eq!(table.standing(Faction::Empire), -60);
        assert_eq!(table.standing(Faction::Federation), 40);
    }

    #[test]
    fn test_reset() {
        let mut table = FactionTable::new();
        table.modify(Faction::MiningGuild, 50, "rescue");
        table.reset();
        assert_eq!(table.standing(Faction::MiningGuild), 15);
    }
}
