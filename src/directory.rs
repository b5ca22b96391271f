use std::path::Path;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use crate::model::{MemberId, RoomId, TrainerId};

/// Existence checks against the club's member/trainer/room registry. The
/// scheduler calls these before taking any lock.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    async fn member_exists(&self, id: MemberId) -> bool;
    async fn trainer_exists(&self, id: TrainerId) -> bool;
    async fn room_exists(&self, id: RoomId) -> bool;
}

/// Seed file format for [`StaticDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub members: Vec<MemberId>,
    #[serde(default)]
    pub trainers: Vec<TrainerId>,
    #[serde(default)]
    pub rooms: Vec<RoomId>,
}

/// In-memory registry. Registration itself happens elsewhere; this only
/// mirrors which ids exist.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    members: DashSet<MemberId>,
    trainers: DashSet<TrainerId>,
    rooms: DashSet<RoomId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: &DirectorySeed) -> Self {
        let dir = Self::new();
        seed.members.iter().for_each(|&id| dir.add_member(id));
        seed.trainers.iter().for_each(|&id| dir.add_trainer(id));
        seed.rooms.iter().for_each(|&id| dir.add_room(id));
        dir
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let seed: DirectorySeed = serde_json::from_str(json)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn add_member(&self, id: MemberId) {
        self.members.insert(id);
    }

    pub fn add_trainer(&self, id: TrainerId) {
        self.trainers.insert(id);
    }

    pub fn add_room(&self, id: RoomId) {
        self.rooms.insert(id);
    }

    pub fn remove_member(&self, id: MemberId) {
        self.members.remove(&id);
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.members.len(), self.trainers.len(), self.rooms.len())
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn member_exists(&self, id: MemberId) -> bool {
        self.members.contains(&id)
    }

    async fn trainer_exists(&self, id: TrainerId) -> bool {
        self.trainers.contains(&id)
    }

    async fn room_exists(&self, id: RoomId) -> bool {
        self.rooms.contains(&id)
    }
}
