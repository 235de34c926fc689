//! Record stores: SQLite on disk, or a mutex-guarded map in memory.
//!
//! Schema:
//!
//! ```sql
//! players          (id TEXT PRIMARY KEY, name, team, points, aggression, counter_aggression,
//!                   punished, punished_deadline_ms, encounters_completed, containers_opened,
//!                   last_seen, created_at, updated_at)
//! game_rounds      (id INTEGER PRIMARY KEY AUTOINCREMENT, started_at, ended_at,
//!                   winning_team, total_players, duration_seconds)
//! team_scores      (round_id, team, points, aggression, counter_aggression, members)
//! placed_entities  (round_id, category, world, x, y, z, kind, created_at)
//! ```
//!
//! Timestamps are stored as epoch seconds. Placement rows are unique per
//! (round, category, location).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Row, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::error::{Result, RushError};
use crate::ledger::{PlayerProfile, TeamStanding};
use crate::services::{EntityCategory, RecordStore};
use crate::types::{Area, BlockPos, PlayerId, Round, RoundId, TeamColor, WorldId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    team                 TEXT,
    points               INTEGER NOT NULL DEFAULT 0,
    aggression           INTEGER NOT NULL DEFAULT 0,
    counter_aggression   INTEGER NOT NULL DEFAULT 0,
    punished             INTEGER NOT NULL DEFAULT 0,
    punished_deadline_ms INTEGER,
    encounters_completed INTEGER NOT NULL DEFAULT 0,
    containers_opened    INTEGER NOT NULL DEFAULT 0,
    last_seen            INTEGER NOT NULL,
    created_at           INTEGER NOT NULL,
    updated_at           INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_players_points ON players(points DESC);

CREATE TABLE IF NOT EXISTS game_rounds (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at       INTEGER NOT NULL,
    ended_at         INTEGER,
    winning_team     TEXT,
    total_players    INTEGER NOT NULL DEFAULT 0,
    duration_seconds INTEGER
);

CREATE TABLE IF NOT EXISTS team_scores (
    round_id           INTEGER NOT NULL REFERENCES game_rounds(id) ON DELETE CASCADE,
    team               TEXT NOT NULL,
    points             INTEGER NOT NULL,
    aggression         INTEGER NOT NULL,
    counter_aggression INTEGER NOT NULL,
    members            INTEGER NOT NULL,
    PRIMARY KEY (round_id, team)
);

CREATE TABLE IF NOT EXISTS placed_entities (
    round_id   INTEGER NOT NULL,
    category   TEXT NOT NULL,
    world      INTEGER NOT NULL,
    x          INTEGER NOT NULL,
    y          INTEGER NOT NULL,
    z          INTEGER NOT NULL,
    kind       TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (round_id, category, world, x, y, z)
);
CREATE INDEX IF NOT EXISTS idx_placed_round ON placed_entities(round_id);
CREATE INDEX IF NOT EXISTS idx_placed_area ON placed_entities(category, world, x, z);
";

fn to_epoch(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed [`RecordStore`].
pub struct SqliteStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(std::time::Duration::from_millis(u64::from(config.busy_timeout_ms)))?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Record store opened");

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Load a round row.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] on SQLite failures.
    pub fn load_round(&self, id: RoundId) -> Result<Option<Round>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, started_at, ended_at, winning_team, total_players, duration_seconds
             FROM game_rounds WHERE id = ?1",
        )?;
        let round = stmt
            .query_row(params![id.0], |row| {
                let winner: Option<String> = row.get(3)?;
                let duration: Option<i64> = row.get(5)?;
                Ok(Round {
                    id: Some(RoundId(row.get(0)?)),
                    started_at: from_epoch(row.get(1)?),
                    ended_at: row.get::<_, Option<i64>>(2)?.map(from_epoch),
                    winning_team: winner.as_deref().and_then(TeamColor::parse),
                    total_players: row.get(4)?,
                    duration_seconds: duration.and_then(|d| u64::try_from(d).ok()),
                })
            })
            .optional()?;
        Ok(round)
    }

    /// Final standings persisted for a round, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] on SQLite failures.
    pub fn load_team_scores(&self, id: RoundId) -> Result<Vec<TeamStanding>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT team, points, aggression, counter_aggression, members
             FROM team_scores WHERE round_id = ?1 ORDER BY points DESC, team",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut standings = Vec::new();
        for row in rows {
            let (team, points, aggression, counter_aggression, members) = row?;
            let Some(team) = TeamColor::parse(&team) else {
                warn!(%team, "Skipping team score with unknown color");
                continue;
            };
            standings.push(TeamStanding {
                team,
                points,
                aggression,
                counter_aggression,
                members: usize::try_from(members).unwrap_or_default(),
            });
        }
        Ok(standings)
    }

    /// Number of placement rows.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] on SQLite failures.
    pub fn placed_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM placed_entities", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Online backup to `dest_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and dropping the one
    /// beyond `backup_count`.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] or [`RushError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }
        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension().map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    /// Database path (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// `PRAGMA integrity_check`.
    ///
    /// # Errors
    ///
    /// Returns [`RushError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<(String, PlayerProfile)> {
    let id: String = row.get(0)?;
    let team: Option<String> = row.get(2)?;
    let deadline_ms: Option<i64> = row.get(7)?;
    let profile = PlayerProfile {
        id: PlayerId(Uuid::nil()),
        name: row.get(1)?,
        team: team.as_deref().and_then(TeamColor::parse),
        points: row.get(3)?,
        aggression: row.get(4)?,
        counter_aggression: row.get(5)?,
        punished: row.get(6)?,
        punished_until: None,
        punished_deadline: deadline_ms.and_then(DateTime::from_timestamp_millis),
        encounters_completed: row.get(8)?,
        containers_opened: row.get(9)?,
        last_seen: from_epoch(row.get(10)?),
        created_at: from_epoch(row.get(11)?),
        updated_at: from_epoch(row.get(12)?),
    };
    Ok((id, profile))
}

const PROFILE_COLUMNS: &str = "id, name, team, points, aggression, counter_aggression, punished, \
     punished_deadline_ms, encounters_completed, containers_opened, last_seen, created_at, updated_at";

impl RecordStore for SqliteStore {
    fn create_round(&self, round: &Round) -> Result<RoundId> {
        self.conn.execute(
            "INSERT INTO game_rounds (started_at, ended_at, winning_team, total_players, duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                to_epoch(round.started_at),
                round.ended_at.map(to_epoch),
                round.winning_team.map(TeamColor::as_str),
                round.total_players,
                round.duration_seconds.and_then(|d| i64::try_from(d).ok()),
            ],
        )?;
        let id = RoundId(self.conn.last_insert_rowid());
        debug!(round = %id, "Round row created");
        Ok(id)
    }

    fn update_round(&self, round: &Round) -> Result<()> {
        let id = round.id.ok_or(RushError::RoundNotPersisted)?;
        self.conn.execute(
            "UPDATE game_rounds SET ended_at = ?2, winning_team = ?3, total_players = ?4,
                 duration_seconds = ?5
             WHERE id = ?1",
            params![
                id.0,
                round.ended_at.map(to_epoch),
                round.winning_team.map(TeamColor::as_str),
                round.total_players,
                round.duration_seconds.and_then(|d| i64::try_from(d).ok()),
            ],
        )?;
        Ok(())
    }

    fn save_team_scores(&self, round: RoundId, standings: &[TeamStanding]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO team_scores (round_id, team, points, aggression, counter_aggression, members)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(round_id, team) DO UPDATE SET
                    points = excluded.points,
                    aggression = excluded.aggression,
                    counter_aggression = excluded.counter_aggression,
                    members = excluded.members",
            )?;
            for s in standings {
                stmt.execute(params![
                    round.0,
                    s.team.as_str(),
                    s.points,
                    s.aggression,
                    s.counter_aggression,
                    i64::try_from(s.members).unwrap_or(i64::MAX),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_player_profile(&self, p: &PlayerProfile) -> Result<()> {
        let start = Instant::now();
        self.conn.execute(
            "INSERT INTO players (id, name, team, points, aggression, counter_aggression, punished,
                 punished_deadline_ms, encounters_completed, containers_opened, last_seen, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                team = excluded.team,
                points = excluded.points,
                aggression = excluded.aggression,
                counter_aggression = excluded.counter_aggression,
                punished = excluded.punished,
                punished_deadline_ms = excluded.punished_deadline_ms,
                encounters_completed = excluded.encounters_completed,
                containers_opened = excluded.containers_opened,
                last_seen = excluded.last_seen,
                updated_at = excluded.updated_at",
            params![
                p.id.0.to_string(),
                p.name,
                p.team.map(TeamColor::as_str),
                p.points,
                p.aggression,
                p.counter_aggression,
                p.punished,
                p.punished_deadline.map(|d| d.timestamp_millis()),
                p.encounters_completed,
                p.containers_opened,
                to_epoch(p.last_seen),
                to_epoch(p.created_at),
                to_epoch(p.updated_at),
            ],
        )?;
        debug!(player = %p.id, elapsed_us = start.elapsed().as_micros(), "Saved player profile");
        Ok(())
    }

    fn load_player_profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {PROFILE_COLUMNS} FROM players WHERE id = ?1"))?;
        let row = stmt
            .query_row(params![player.0.to_string()], profile_from_row)
            .optional()?;
        Ok(row.map(|(_, mut profile)| {
            profile.id = player;
            profile
        }))
    }

    fn top_players_by_points(&self, limit: usize) -> Result<Vec<PlayerProfile>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {PROFILE_COLUMNS} FROM players ORDER BY points DESC, name LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], profile_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            let (id, mut profile) = row?;
            match Uuid::parse_str(&id) {
                Ok(uuid) => {
                    profile.id = PlayerId(uuid);
                    out.push(profile);
                }
                Err(_) => warn!(%id, "Skipping player row with invalid UUID"),
            }
        }
        Ok(out)
    }

    fn record_placed_entity(&self, round: RoundId, category: EntityCategory, pos: BlockPos, kind: &str) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO placed_entities (round_id, category, world, x, y, z, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                round.0,
                category.as_str(),
                pos.world.0,
                pos.x,
                pos.y,
                pos.z,
                kind,
                to_epoch(Utc::now()),
            ])?;
        Ok(())
    }

    fn delete_placed_entities_not_in_round(
        &self,
        round: RoundId,
        category: EntityCategory,
        area: &Area,
    ) -> Result<Vec<BlockPos>> {
        let tx = self.conn.unchecked_transaction()?;
        let filter = "category = ?1 AND round_id != ?2 AND world = ?3
                      AND x >= ?4 AND x < ?5 AND z >= ?6 AND z < ?7";
        let category = category.as_str();
        let args = params![category, round.0, area.world.0, area.min_x, area.max_x, area.min_z, area.max_z];

        let mut stale = Vec::new();
        {
            let mut stmt = tx.prepare(&format!("SELECT DISTINCT world, x, y, z FROM placed_entities WHERE {filter}"))?;
            let rows = stmt.query_map(args, |row| {
                Ok(BlockPos::new(WorldId(row.get(0)?), row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            for row in rows {
                stale.push(row?);
            }
        }
        tx.execute(&format!("DELETE FROM placed_entities WHERE {filter}"), args)?;
        tx.commit()?;
        stale.sort_unstable();
        Ok(stale)
    }
}

/// Adds `.optional()` to `rusqlite::Result`, mapping `QueryReturnedNoRows` to `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    rounds: Vec<Round>,
    team_scores: HashMap<RoundId, Vec<TeamStanding>>,
    players: HashMap<PlayerId, PlayerProfile>,
    placed: HashMap<(RoundId, EntityCategory, BlockPos), String>,
    failing: bool,
}

/// In-memory [`RecordStore`] for hosts without disk and for tests.
///
/// [`MemoryStore::set_failing`] makes every call fail, which lets callers
/// exercise their persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated outages.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Stored round.
    #[must_use]
    pub fn round(&self, id: RoundId) -> Option<Round> {
        self.inner.lock().rounds.iter().find(|r| r.id == Some(id)).cloned()
    }

    /// Number of stored rounds.
    #[must_use]
    pub fn round_count(&self) -> usize {
        self.inner.lock().rounds.len()
    }

    /// Stored standings of a round.
    #[must_use]
    pub fn team_scores(&self, id: RoundId) -> Vec<TeamStanding> {
        self.inner.lock().team_scores.get(&id).cloned().unwrap_or_default()
    }

    /// Stored profile.
    #[must_use]
    pub fn profile(&self, player: PlayerId) -> Option<PlayerProfile> {
        self.inner.lock().players.get(&player).cloned()
    }

    /// Number of placement rows.
    #[must_use]
    pub fn placed_count(&self) -> usize {
        self.inner.lock().placed.len()
    }

    fn guard(inner: &MemoryInner) -> Result<()> {
        if inner.failing {
            Err(RushError::Io(std::io::Error::other("record store offline")))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for MemoryStore {
    fn create_round(&self, round: &Round) -> Result<RoundId> {
        let mut inner = self.inner.lock();
        Self::guard(&inner)?;
        let id = RoundId(i64::try_from(inner.rounds.len()).unwrap_or(i64::MAX) + 1);
        let mut stored = round.clone();
        stored.id = Some(id);
        inner.rounds.push(stored);
        Ok(id)
    }

    fn update_round(&self, round: &Round) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::guard(&inner)?;
        let id = round.id.ok_or(RushError::RoundNotPersisted)?;
        let slot = inner
            .rounds
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(RushError::RoundNotPersisted)?;
        *slot = round.clone();
        Ok(())
    }

    fn save_team_scores(&self, round: RoundId, standings: &[TeamStanding]) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::guard(&inner)?;
        inner.team_scores.insert(round, standings.to_vec());
        Ok(())
    }

    fn upsert_player_profile(&self, profile: &PlayerProfile) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::guard(&inner)?;
        inner.players.insert(profile.id, profile.clone());
        Ok(())
    }

    fn load_player_profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>> {
        let inner = self.inner.lock();
        Self::guard(&inner)?;
        Ok(inner.players.get(&player).cloned())
    }

    fn top_players_by_points(&self, limit: usize) -> Result<Vec<PlayerProfile>> {
        let inner = self.inner.lock();
        Self::guard(&inner)?;
        let mut all: Vec<PlayerProfile> = inner.players.values().cloned().collect();
        all.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
        all.truncate(limit);
        Ok(all)
    }

    fn record_placed_entity(&self, round: RoundId, category: EntityCategory, pos: BlockPos, kind: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::guard(&inner)?;
        inner.placed.entry((round, category, pos)).or_insert_with(|| kind.to_string());
        Ok(())
    }

    fn delete_placed_entities_not_in_round(
        &self,
        round: RoundId,
        category: EntityCategory,
        area: &Area,
    ) -> Result<Vec<BlockPos>> {
        let mut inner = self.inner.lock();
        Self::guard(&inner)?;
        let mut stale: Vec<BlockPos> = inner
            .placed
            .keys()
            .filter(|(r, c, pos)| *r != round && *c == category && area.contains(pos))
            .map(|(_, _, pos)| *pos)
            .collect();
        inner
            .placed
            .retain(|(r, c, pos), _| !(*r != round && *c == category && area.contains(pos)));
        stale.sort_unstable();
        stale.dedup();
        Ok(stale)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Vec<Box<dyn RecordStore>> {
        vec![
            Box::new(SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open")),
            Box::new(MemoryStore::new()),
        ]
    }

    #[test]
    fn round_lifecycle() {
        for store in stores() {
            let mut round = Round::begin(6);
            let id = store.create_round(&round).expect("create");
            round.id = Some(id);
            round.finish(Some(TeamColor::Green));
            store.update_round(&round).expect("update");
            assert!(store.update_round(&Round::begin(1)).is_err(), "unpersisted round");
        }
    }

    #[test]
    fn sqlite_round_round_trip() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let mut round = Round::begin(4);
        let id = store.create_round(&round).expect("create");
        round.id = Some(id);
        round.finish(None);
        store.update_round(&round).expect("update");

        let loaded = store.load_round(id).expect("load").expect("row");
        assert_eq!(loaded.total_players, 4);
        assert!(loaded.ended_at.is_some());
        assert_eq!(loaded.winning_team, None);
        assert!(store.load_round(RoundId(999)).expect("load").is_none());
    }

    #[test]
    fn profiles_upsert_and_rank() {
        for store in stores() {
            let mut a = PlayerProfile::new(PlayerId::new(), "alice");
            let mut b = PlayerProfile::new(PlayerId::new(), "bob");
            a.points = 10;
            b.points = 30;
            b.team = Some(TeamColor::Yellow);
            b.punished = true;
            let deadline = DateTime::from_timestamp_millis(1_900_000_000_123).expect("valid");
            b.punished_deadline = Some(deadline);
            store.upsert_player_profile(&a).expect("a");
            store.upsert_player_profile(&b).expect("b");
            a.points = 50;
            store.upsert_player_profile(&a).expect("a again");

            let top = store.top_players_by_points(5).expect("top");
            assert_eq!(top.len(), 2);
            assert_eq!(top[0].id, a.id);
            assert_eq!(top[0].points, 50);

            let loaded = store.load_player_profile(b.id).expect("load").expect("row");
            assert_eq!(loaded.team, Some(TeamColor::Yellow));
            assert!(loaded.punished);
            assert_eq!(loaded.punished_deadline, Some(deadline));
            assert!(store.load_player_profile(PlayerId::new()).expect("load").is_none());
        }
    }

    #[test]
    fn team_scores_are_stored() {
        let store = SqliteStore::open_in_memory(&PersistenceConfig::default()).expect("open");
        let id = store.create_round(&Round::begin(2)).expect("create");
        let standings = vec![
            TeamStanding { team: TeamColor::Blue, points: 40, aggression: 1, counter_aggression: 0, members: 1 },
            TeamStanding { team: TeamColor::Green, points: 10, aggression: 0, counter_aggression: 1, members: 1 },
        ];
        store.save_team_scores(id, &standings).expect("save");
        store.save_team_scores(id, &standings).expect("save twice");
        assert_eq!(store.load_team_scores(id).expect("load"), standings);
    }

    #[test]
    fn stale_placements_are_deleted_by_area() {
        for store in stores() {
            let world = WorldId(0);
            let inside_old = BlockPos::new(world, 3, 64, 3);
            let inside_new = BlockPos::new(world, 4, 64, 4);
            let outside_old = BlockPos::new(world, 40, 64, 40);
            store.record_placed_entity(RoundId(1), EntityCategory::Container, inside_old, "chest").expect("r");
            store.record_placed_entity(RoundId(1), EntityCategory::Container, inside_old, "chest").expect("dup");
            store.record_placed_entity(RoundId(2), EntityCategory::Container, inside_new, "barrel").expect("r");
            store.record_placed_entity(RoundId(1), EntityCategory::Container, outside_old, "chest").expect("r");
            store.record_placed_entity(RoundId(1), EntityCategory::RescueNpc, inside_old, "npc").expect("r");

            let area = BlockPos::new(world, 0, 64, 0).chunk().area();
            let stale = store
                .delete_placed_entities_not_in_round(RoundId(2), EntityCategory::Container, &area)
                .expect("delete");
            assert_eq!(stale, vec![inside_old]);
            let again = store
                .delete_placed_entities_not_in_round(RoundId(2), EntityCategory::Container, &area)
                .expect("delete");
            assert!(again.is_empty());
        }
    }

    #[test]
    fn failing_memory_store_reports_errors() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.create_round(&Round::begin(1)).is_err());
        store.set_failing(false);
        assert!(store.create_round(&Round::begin(1)).is_ok());
    }

    #[test]
    fn file_store_backup_and_integrity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rush.db");
        let config = PersistenceConfig { backup_count: 2, ..PersistenceConfig::default() };
        let store = SqliteStore::open(&path, &config).expect("open");
        store.create_round(&Round::begin(3)).expect("create");
        assert!(store.integrity_check().expect("check"));

        store.create_rotating_backup().expect("backup 1");
        store.create_rotating_backup().expect("backup 2");
        store.create_rotating_backup().expect("backup 3");
        assert!(dir.path().join("rush.db.bak.1").exists());
        assert!(dir.path().join("rush.db.bak.2").exists());
        assert!(!dir.path().join("rush.db.bak.3").exists());

        let copy = SqliteStore::open(dir.path().join("rush.db.bak.1"), &config).expect("reopen");
        assert!(copy.load_round(RoundId(1)).expect("load").is_some());
    }
}
