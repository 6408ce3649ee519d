use crate::domain::model::{HierarchyNode, Membership, Player};
use crate::domain::query::Column;
use crate::utils::error::{Result, StatsError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;

pub const PLAYERS_FILE: &str = "players.csv";
pub const MEMBERSHIPS_FILE: &str = "memberships.csv";
pub const SECTIONS_FILE: &str = "sections.csv";
pub const DISTRICTS_FILE: &str = "districts.csv";
pub const AREAS_FILE: &str = "areas.csv";

/// Players, their memberships, and hierarchy display names, indexed for
/// the joins the aggregates need.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    players: Vec<Player>,
    memberships: Vec<Membership>,
    names: HashMap<Column, HashMap<String, String>>,
    player_index: HashMap<String, usize>,
    memberships_by_player: HashMap<String, Vec<usize>>,
}

impl Dataset {
    pub fn new(players: Vec<Player>, memberships: Vec<Membership>) -> Self {
        let player_index = players
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        let mut memberships_by_player: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, m) in memberships.iter().enumerate() {
            memberships_by_player.entry(m.player_id.clone()).or_default().push(i);
        }
        Self {
            players,
            memberships,
            names: HashMap::new(),
            player_index,
            memberships_by_player,
        }
    }

    /// Attaches display names for one hierarchy level.
    pub fn with_names(mut self, level: Column, nodes: Vec<HierarchyNode>) -> Self {
        self.names
            .insert(level, nodes.into_iter().map(|n| (n.id, n.name)).collect());
        self
    }

    /// Loads the dataset from CSV files in `dir`. Players and memberships are
    /// required; the name files are optional.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let players: Vec<Player> = read_csv(&dir.join(PLAYERS_FILE))?;
        let memberships: Vec<Membership> = read_csv(&dir.join(MEMBERSHIPS_FILE))?;

        let mut dataset = Dataset::new(players, memberships);
        for (level, file) in [
            (Column::SectionId, SECTIONS_FILE),
            (Column::DistrictId, DISTRICTS_FILE),
            (Column::AreaId, AREAS_FILE),
        ] {
            let path = dir.join(file);
            if path.exists() {
                dataset = dataset.with_names(level, read_csv(&path)?);
            } else {
                tracing::debug!("No {} in {}; {} names will be empty", file, dir.display(), level.name());
            }
        }

        tracing::info!(
            "Loaded {} players and {} memberships from {}",
            dataset.players.len(),
            dataset.memberships.len(),
            dir.display()
        );
        Ok(dataset)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn memberships(&self) -> &[Membership] {
        &self.memberships
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.player_index.get(id).map(|&i| &self.players[i])
    }

    pub fn memberships_of(&self, player_id: &str) -> impl Iterator<Item = &Membership> {
        self.memberships_by_player
            .get(player_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.memberships[i])
    }

    pub fn name_of(&self, level: Column, id: &str) -> Option<&str> {
        self.names.get(&level)?.get(id).map(String::as_str)
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| StatsError::DatasetError {
        message: format!("cannot open {}: {}", path.display(), e),
    })?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}
