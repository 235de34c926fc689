//! Point economy ledger: player profiles, team aggregates, balances.
//!
//! The ledger is an arena keyed by [`PlayerId`] and [`TeamColor`]. Every
//! mutation goes through its methods, which also record which profiles are
//! dirty so the owner can flush them to the record store after each handler.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{PlayerId, TeamColor, Tick};

// ---------------------------------------------------------------------------
// PlayerProfile
// ---------------------------------------------------------------------------

/// Persistent per-player record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Player identity.
    pub id: PlayerId,
    /// Last known display name.
    pub name: String,
    /// Current team membership.
    pub team: Option<TeamColor>,
    /// Point balance, never negative.
    pub points: i64,
    /// Kills dealt.
    pub aggression: u32,
    /// Kills suffered.
    pub counter_aggression: u32,
    /// Punished flag.
    pub punished: bool,
    /// Tick at which the punished status expires. Only meaningful to the
    /// process that set it; the store keeps `punished_deadline` instead.
    #[serde(skip)]
    pub punished_until: Option<Tick>,
    /// Wall-clock expiry of the punished status, as persisted.
    pub punished_deadline: Option<DateTime<Utc>>,
    /// Rescue encounters won.
    pub encounters_completed: u32,
    /// Game containers opened.
    pub containers_opened: u32,
    /// Last session start or end.
    pub last_seen: DateTime<Utc>,
    /// First contact.
    pub created_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
}

impl PlayerProfile {
    /// Fresh profile for a first-time player.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            team: None,
            points: 0,
            aggression: 0,
            counter_aggression: 0,
            punished: false,
            punished_until: None,
            punished_deadline: None,
            encounters_completed: 0,
            containers_opened: 0,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the punished status is in force at `now`.
    #[must_use]
    pub fn is_punished_at(&self, now: Tick) -> bool {
        self.punished && self.punished_until.is_some_and(|until| now < until)
    }

    /// Derive `punished_deadline` from the tick deadline as seen at tick `now`.
    pub fn stamp_deadline(&mut self, now: Tick, ticks_per_second: u32) {
        let tps = u64::from(ticks_per_second.max(1));
        self.punished_deadline = self.punished_until.map(|until| {
            let left_ms = until.saturating_sub(now).saturating_mul(1000) / tps;
            let left = TimeDelta::try_milliseconds(i64::try_from(left_ms).unwrap_or(i64::MAX))
                .unwrap_or(TimeDelta::MAX);
            Utc::now().checked_add_signed(left).unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
    }

    /// Rebuild the tick deadline from `punished_deadline` after a load. A
    /// deadline already in the past maps to `now`, so the next sweep clears it.
    pub fn restore_deadline(&mut self, now: Tick, ticks_per_second: u32) {
        let tps = u64::from(ticks_per_second.max(1));
        self.punished_until = self.punished_deadline.map(|deadline| {
            let left_ms = (deadline - Utc::now()).num_milliseconds().max(0);
            let left = u64::try_from(left_ms).unwrap_or(0).saturating_mul(tps).div_ceil(1000);
            now.saturating_add(left)
        });
    }
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// Round-scoped team aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Team color.
    pub color: TeamColor,
    /// Balance, floor-clamped at zero.
    pub points: i64,
    /// Kills dealt by members.
    pub aggression: u32,
    /// Kills suffered by members.
    pub counter_aggression: u32,
    /// Current members.
    pub members: BTreeSet<PlayerId>,
}

impl Team {
    fn new(color: TeamColor) -> Self {
        Self {
            color,
            points: 0,
            aggression: 0,
            counter_aggression: 0,
            members: BTreeSet::new(),
        }
    }

    fn add_points(&mut self, amount: i64) {
        self.points = self.points.saturating_add(amount).max(0);
    }

    fn reset(&mut self) {
        *self = Self::new(self.color);
    }

    fn standing(&self) -> TeamStanding {
        TeamStanding {
            team: self.color,
            points: self.points,
            aggression: self.aggression,
            counter_aggression: self.counter_aggression,
            members: self.members.len(),
        }
    }
}

/// Snapshot of one team's aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStanding {
    /// Team color.
    pub team: TeamColor,
    /// Balance.
    pub points: i64,
    /// Kills dealt.
    pub aggression: u32,
    /// Kills suffered.
    pub counter_aggression: u32,
    /// Member count.
    pub members: usize,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Arena of cached player profiles and team aggregates.
#[derive(Debug, Clone)]
pub struct Ledger {
    players: HashMap<PlayerId, PlayerProfile>,
    teams: BTreeMap<TeamColor, Team>,
    dirty: BTreeSet<PlayerId>,
}

impl Ledger {
    /// Empty ledger with every team present and empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            teams: TeamColor::ALL.into_iter().map(|c| (c, Team::new(c))).collect(),
            dirty: BTreeSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Cache a profile (loaded or freshly created).
    pub fn insert_profile(&mut self, profile: PlayerProfile) {
        if let Some(team) = profile.team.and_then(|t| self.teams.get_mut(&t)) {
            team.members.insert(profile.id);
        }
        self.players.insert(profile.id, profile);
    }

    /// Evict a profile from the cache, returning it for a final flush.
    pub fn remove_profile(&mut self, player: PlayerId) -> Option<PlayerProfile> {
        self.dirty.remove(&player);
        let profile = self.players.remove(&player)?;
        for team in self.teams.values_mut() {
            team.members.remove(&player);
        }
        Some(profile)
    }

    /// Cached profile.
    #[must_use]
    pub fn profile(&self, player: PlayerId) -> Option<&PlayerProfile> {
        self.players.get(&player)
    }

    /// Mutable access to a profile; marks it dirty.
    pub fn profile_mut(&mut self, player: PlayerId) -> Option<&mut PlayerProfile> {
        let profile = self.players.get_mut(&player)?;
        profile.updated_at = Utc::now();
        self.dirty.insert(player);
        Some(profile)
    }

    /// Stamp the wall-clock punishment deadline ahead of a save, without
    /// marking the profile dirty.
    pub fn stamp_for_save(&mut self, player: PlayerId, now: Tick, ticks_per_second: u32) -> Option<&PlayerProfile> {
        let profile = self.players.get_mut(&player)?;
        profile.stamp_deadline(now, ticks_per_second);
        Some(profile)
    }

    /// Whether the player is cached.
    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    /// Every cached profile.
    pub fn profiles(&self) -> impl Iterator<Item = &PlayerProfile> {
        self.players.values()
    }

    /// Number of cached profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no profile is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Take the set of profiles mutated since the last call.
    pub fn take_dirty(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Points & counters
    // ------------------------------------------------------------------

    /// Credit (or debit) a player and their team. Both balances are
    /// floor-clamped at zero. Returns the player's new balance.
    pub fn add_points(&mut self, player: PlayerId, amount: i64) -> Option<i64> {
        let profile = self.profile_mut(player)?;
        profile.points = profile.points.saturating_add(amount).max(0);
        let balance = profile.points;
        let team = profile.team;
        if let Some(team) = team.and_then(|t| self.teams.get_mut(&t)) {
            team.add_points(amount);
        }
        Some(balance)
    }

    /// Credit a team directly.
    pub fn add_team_points(&mut self, team: TeamColor, amount: i64) {
        if let Some(team) = self.teams.get_mut(&team) {
            team.add_points(amount);
        }
    }

    /// Count a kill: aggression for the attacker, counter-aggression for the victim,
    /// mirrored on their teams. Returns `false` if either player is unknown.
    pub fn record_aggression(&mut self, attacker: PlayerId, victim: PlayerId) -> bool {
        if !self.contains(attacker) || !self.contains(victim) {
            return false;
        }
        let attacker_team = self.profile_mut(attacker).and_then(|p| {
            p.aggression += 1;
            p.team
        });
        let victim_team = self.profile_mut(victim).and_then(|p| {
            p.counter_aggression += 1;
            p.team
        });
        if let Some(team) = attacker_team.and_then(|t| self.teams.get_mut(&t)) {
            team.aggression += 1;
        }
        if let Some(team) = victim_team.and_then(|t| self.teams.get_mut(&t)) {
            team.counter_aggression += 1;
        }
        true
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// Distribute `participants` round-robin over the playable teams after
    /// shuffling them. Existing memberships are cleared first.
    pub fn distribute<R: Rng + ?Sized>(
        &mut self,
        participants: &[PlayerId],
        rng: &mut R,
    ) -> Vec<(PlayerId, TeamColor)> {
        for team in self.teams.values_mut() {
            team.members.clear();
        }
        let mut order: Vec<PlayerId> =
            participants.iter().copied().filter(|p| self.contains(*p)).collect();
        order.shuffle(rng);

        let mut assignments = Vec::with_capacity(order.len());
        for (i, player) in order.into_iter().enumerate() {
            let color = TeamColor::PLAYABLE[i % TeamColor::PLAYABLE.len()];
            self.assign(player, color);
            assignments.push((player, color));
        }
        assignments
    }

    /// Put a player on a team, leaving any previous one.
    pub fn assign(&mut self, player: PlayerId, color: TeamColor) {
        for team in self.teams.values_mut() {
            team.members.remove(&player);
        }
        if let Some(profile) = self.profile_mut(player) {
            profile.team = Some(color);
            if let Some(team) = self.teams.get_mut(&color) {
                team.members.insert(player);
            }
        }
    }

    /// Team a player belongs to.
    #[must_use]
    pub fn team_of(&self, player: PlayerId) -> Option<TeamColor> {
        self.players.get(&player).and_then(|p| p.team)
    }

    /// Team aggregate.
    #[must_use]
    pub fn team(&self, color: TeamColor) -> Option<&Team> {
        self.teams.get(&color)
    }

    /// Clear every cached player's balance and punished status.
    pub fn reset_balances(&mut self) {
        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            if let Some(p) = self.profile_mut(id) {
                p.points = 0;
                p.punished = false;
                p.punished_until = None;
                p.punished_deadline = None;
            }
        }
    }

    /// Reset every team aggregate and drop all memberships.
    pub fn reset_teams(&mut self) {
        for team in self.teams.values_mut() {
            team.reset();
        }
        let members: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.team.is_some())
            .map(|p| p.id)
            .collect();
        for id in members {
            if let Some(p) = self.profile_mut(id) {
                p.team = None;
            }
        }
    }

    /// The team with the strictly highest balance; `None` if two or more share it.
    #[must_use]
    pub fn winner(&self) -> Option<TeamColor> {
        let max = self.teams.values().map(|t| t.points).max()?;
        let mut leaders = self.teams.values().filter(|t| t.points == max);
        let first = leaders.next()?;
        if leaders.next().is_some() {
            None
        } else {
            Some(first.color)
        }
    }

    /// Whether two or more teams share the highest balance (or there are no teams).
    #[must_use]
    pub fn is_tie(&self) -> bool {
        let Some(max) = self.teams.values().map(|t| t.points).max() else {
            return true;
        };
        self.teams.values().filter(|t| t.points == max).count() > 1
    }

    /// Standings of the playable teams, best first.
    #[must_use]
    pub fn standings(&self) -> Vec<TeamStanding> {
        let mut standings: Vec<TeamStanding> = self
            .teams
            .values()
            .filter(|t| !t.color.is_reserved())
            .map(Team::standing)
            .collect();
        standings.sort_by(|a, b| b.points.cmp(&a.points).then(a.team.cmp(&b.team)));
        standings
    }

    /// Sum of all team balances.
    #[must_use]
    pub fn total_points(&self) -> i64 {
        self.teams.values().map(|t| t.points).sum()
    }

    /// Playable team with the fewest members (lowest color on ties).
    #[must_use]
    pub fn smallest_team(&self) -> TeamColor {
        TeamColor::PLAYABLE
            .into_iter()
            .min_by_key(|c| self.teams.get(c).map_or(0, |t| t.members.len()))
            .unwrap_or(TeamColor::Blue)
    }

    /// Cached profiles ordered by points, highest first.
    #[must_use]
    pub fn top_players(&self, limit: usize) -> Vec<&PlayerProfile> {
        let mut all: Vec<&PlayerProfile> = self.players.values().collect();
        all.sort_by(|a, b| b.points.cmp(&a.points).then(a.name.cmp(&b.name)));
        all.truncate(limit);
        all
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ledger_with(n: usize) -> (Ledger, Vec<PlayerId>) {
        let mut ledger = Ledger::new();
        let ids: Vec<PlayerId> = (0..n).map(|_| PlayerId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            ledger.insert_profile(PlayerProfile::new(*id, format!("p{i}")));
        }
        (ledger, ids)
    }

    #[test]
    fn points_flow_to_team_and_clamp() {
        let (mut ledger, ids) = ledger_with(1);
        ledger.assign(ids[0], TeamColor::Green);
        assert_eq!(ledger.add_points(ids[0], 30), Some(30));
        assert_eq!(ledger.team(TeamColor::Green).map(|t| t.points), Some(30));
        assert_eq!(ledger.add_points(ids[0], -100), Some(0));
        assert_eq!(ledger.team(TeamColor::Green).map(|t| t.points), Some(0));
    }

    #[test]
    fn punishment_deadline_survives_a_clock_restart() {
        let mut profile = PlayerProfile::new(PlayerId::new(), "p");
        profile.punished = true;
        profile.punished_until = Some(20_360);
        profile.stamp_deadline(20_000, 2);
        let deadline = profile.punished_deadline.expect("stamped");
        let secs = (deadline - Utc::now()).num_seconds();
        assert!((178..=180).contains(&secs), "{secs}s left");

        // A fresh process counts ticks from zero again.
        profile.punished_until = None;
        profile.restore_deadline(0, 2);
        let until = profile.punished_until.expect("restored");
        assert!((356..=360).contains(&until), "until {until}");
        assert!(profile.is_punished_at(0));
    }

    #[test]
    fn lapsed_deadline_restores_as_expired() {
        let mut profile = PlayerProfile::new(PlayerId::new(), "p");
        profile.punished = true;
        profile.punished_deadline = Some(Utc::now() - TimeDelta::minutes(5));
        profile.restore_deadline(40, 20);
        assert_eq!(profile.punished_until, Some(40));
        assert!(!profile.is_punished_at(40));

        profile.punished_until = None;
        profile.stamp_deadline(40, 20);
        assert_eq!(profile.punished_deadline, None);
    }

    #[test]
    fn unknown_player_gets_nothing() {
        let (mut ledger, _) = ledger_with(0);
        assert_eq!(ledger.add_points(PlayerId::new(), 10), None);
        assert_eq!(ledger.total_points(), 0);
    }

    #[test]
    fn distribution_is_balanced_and_skips_reserved() {
        let (mut ledger, ids) = ledger_with(10);
        let mut rng = StdRng::seed_from_u64(7);
        let assignments = ledger.distribute(&ids, &mut rng);
        assert_eq!(assignments.len(), 10);
        let sizes: Vec<usize> = TeamColor::PLAYABLE
            .iter()
            .map(|c| ledger.team(*c).map_or(0, |t| t.members.len()))
            .collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert!(sizes.iter().max().unwrap_or(&0) - sizes.iter().min().unwrap_or(&0) <= 1);
        assert!(ledger.team(TeamColor::RESERVED).map_or(true, |t| t.members.is_empty()));
    }

    #[test]
    fn redistribution_clears_old_membership() {
        let (mut ledger, ids) = ledger_with(4);
        for id in &ids {
            ledger.assign(*id, TeamColor::Blue);
        }
        let mut rng = StdRng::seed_from_u64(1);
        ledger.distribute(&ids, &mut rng);
        assert!(ledger.team(TeamColor::Blue).map_or(0, |t| t.members.len()) <= 2);
    }

    #[test]
    fn winner_requires_strict_maximum() {
        let (mut ledger, ids) = ledger_with(3);
        ledger.assign(ids[0], TeamColor::Blue);
        ledger.assign(ids[1], TeamColor::Green);
        ledger.assign(ids[2], TeamColor::Yellow);

        assert_eq!(ledger.winner(), None, "all zero is a tie");
        assert!(ledger.is_tie());

        ledger.add_points(ids[0], 50);
        ledger.add_points(ids[1], 50);
        assert_eq!(ledger.winner(), None);
        assert!(ledger.is_tie());

        ledger.add_points(ids[1], 1);
        assert_eq!(ledger.winner(), Some(TeamColor::Green));
        assert!(!ledger.is_tie());
    }

    #[test]
    fn aggression_mirrors_to_teams() {
        let (mut ledger, ids) = ledger_with(2);
        ledger.assign(ids[0], TeamColor::Blue);
        ledger.assign(ids[1], TeamColor::Yellow);
        assert!(ledger.record_aggression(ids[0], ids[1]));
        assert_eq!(ledger.profile(ids[0]).map(|p| p.aggression), Some(1));
        assert_eq!(ledger.profile(ids[1]).map(|p| p.counter_aggression), Some(1));
        assert_eq!(ledger.team(TeamColor::Blue).map(|t| t.aggression), Some(1));
        assert_eq!(ledger.team(TeamColor::Yellow).map(|t| t.counter_aggression), Some(1));
        assert!(!ledger.record_aggression(ids[0], PlayerId::new()));
    }

    #[test]
    fn resets_clear_round_state() {
        let (mut ledger, ids) = ledger_with(2);
        ledger.assign(ids[0], TeamColor::Blue);
        ledger.add_points(ids[0], 40);
        if let Some(p) = ledger.profile_mut(ids[1]) {
            p.punished = true;
            p.punished_until = Some(100);
        }
        ledger.reset_balances();
        ledger.reset_teams();
        assert_eq!(ledger.profile(ids[0]).map(|p| p.points), Some(0));
        assert_eq!(ledger.profile(ids[0]).and_then(|p| p.team), None);
        assert_eq!(ledger.profile(ids[1]).map(|p| p.punished), Some(false));
        assert_eq!(ledger.total_points(), 0);
    }

    #[test]
    fn mutations_mark_dirty_once() {
        let (mut ledger, ids) = ledger_with(1);
        ledger.take_dirty();
        ledger.add_points(ids[0], 1);
        ledger.add_points(ids[0], 1);
        assert_eq!(ledger.take_dirty(), vec![ids[0]]);
        assert!(ledger.take_dirty().is_empty());
    }

    #[test]
    fn standings_are_sorted_and_exclude_reserved() {
        let (mut ledger, ids) = ledger_with(2);
        ledger.assign(ids[0], TeamColor::Yellow);
        ledger.add_points(ids[0], 9);
        let standings = ledger.standings();
        assert_eq!(standings.len(), 3);
        assert_eq!(standings[0].team, TeamColor::Yellow);
        assert!(standings.iter().all(|s| !s.team.is_reserved()));
    }
}
