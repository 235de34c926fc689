//! Punished status: cumulative, capped, time-bound marking of aggressors.
//!
//! Deadlines live on the [`PlayerProfile`](crate::ledger::PlayerProfile) as
//! tick numbers and are stored as wall-clock instants, so a punishment keeps
//! its remaining time across a restart.
//!
//! The tracker only remembers the last victim of each punished attacker: an
//! attack on a different victim re-announces, a repeat attack on the same
//! victim extends silently. The memory resets when the punishment expires.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::{Hostility, PunishmentConfig};
use crate::error::Rejection;
use crate::ledger::Ledger;
use crate::types::{PlayerId, TeamColor, Tick};

/// Result of a punishment trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punishment {
    /// The victim was already punished; attacking them carries no penalty.
    Exempt,
    /// The attacker is (now) punished until `until`.
    Marked {
        /// New deadline.
        until: Tick,
        /// Whether the attacker was not punished before this trigger.
        first: bool,
        /// Whether the trigger should be broadcast.
        announce: bool,
    },
}

/// Applies, extends and expires the punished status.
#[derive(Debug, Clone)]
pub struct PunishmentTracker {
    base: Tick,
    cap: Tick,
    hostility: Hostility,
    last_victim: HashMap<PlayerId, PlayerId>,
}

impl PunishmentTracker {
    /// Build from config, converting seconds to ticks.
    #[must_use]
    pub fn new(config: &PunishmentConfig, ticks_per_second: u32) -> Self {
        let tps = u64::from(ticks_per_second.max(1));
        Self {
            base: config.base_duration_seconds.saturating_mul(tps),
            cap: config.cap_seconds.saturating_mul(tps),
            hostility: config.hostility,
            last_victim: HashMap::new(),
        }
    }

    /// Base duration in ticks.
    #[must_use]
    pub fn base(&self) -> Tick {
        self.base
    }

    /// Absolute cap in ticks, measured from the moment of each trigger.
    #[must_use]
    pub fn cap(&self) -> Tick {
        self.cap
    }

    /// Whether an attack between these teams may hurt at all.
    #[must_use]
    pub fn allows(&self, attacker: Option<TeamColor>, victim: Option<TeamColor>) -> bool {
        match self.hostility {
            Hostility::AnyTeam => true,
            Hostility::CrossTeam => !matches!((attacker, victim), (Some(a), Some(v)) if a == v),
        }
    }

    /// Handle `attacker` damaging `victim` at `now`.
    ///
    /// # Errors
    ///
    /// [`Rejection::SelfTarget`], [`Rejection::UnknownPlayer`], or
    /// [`Rejection::FriendlyFire`] when the hostility rule forbids the attack.
    pub fn trigger(
        &mut self,
        ledger: &mut Ledger,
        attacker: PlayerId,
        victim: PlayerId,
        now: Tick,
    ) -> Result<Punishment, Rejection> {
        if attacker == victim {
            return Err(Rejection::SelfTarget);
        }
        let (Some(a), Some(v)) = (ledger.profile(attacker), ledger.profile(victim)) else {
            return Err(Rejection::UnknownPlayer);
        };
        if !self.allows(a.team, v.team) {
            return Err(Rejection::FriendlyFire);
        }
        if v.is_punished_at(now) {
            return Ok(Punishment::Exempt);
        }

        let ceiling = now.saturating_add(self.cap);
        let first = !a.is_punished_at(now);
        let until = if first {
            now.saturating_add(self.base).min(ceiling)
        } else {
            a.punished_until
                .unwrap_or(now)
                .saturating_add(self.base)
                .min(ceiling)
        };

        let previous = self.last_victim.insert(attacker, victim);
        let announce = first || previous != Some(victim);

        if let Some(profile) = ledger.profile_mut(attacker) {
            profile.punished = true;
            profile.punished_until = Some(until);
        }

        if first {
            info!(%attacker, %victim, until, "Player punished");
        } else {
            debug!(%attacker, %victim, until, announce, "Punishment extended");
        }
        Ok(Punishment::Marked { until, first, announce })
    }

    /// Clear every punished status whose deadline has passed. Returns the
    /// players restored to normal state.
    pub fn sweep(&mut self, ledger: &mut Ledger, now: Tick) -> Vec<PlayerId> {
        let expired: Vec<PlayerId> = ledger
            .profiles()
            .filter(|p| p.punished && p.punished_until.is_none_or(|until| until <= now))
            .map(|p| p.id)
            .collect();
        for player in &expired {
            if let Some(profile) = ledger.profile_mut(*player) {
                profile.punished = false;
                profile.punished_until = None;
            }
            self.last_victim.remove(player);
            info!(%player, "Punishment expired");
        }
        expired
    }

    /// Whether `player` is punished at `now`.
    #[must_use]
    pub fn is_punished(&self, ledger: &Ledger, player: PlayerId, now: Tick) -> bool {
        ledger.profile(player).is_some_and(|p| p.is_punished_at(now))
    }

    /// Whether `player` may equip protective gear.
    #[must_use]
    pub fn can_equip_protective(&self, ledger: &Ledger, player: PlayerId, now: Tick) -> bool {
        !self.is_punished(ledger, player, now)
    }

    /// Ticks left on a punishment.
    #[must_use]
    pub fn remaining(&self, ledger: &Ledger, player: PlayerId, now: Tick) -> Option<Tick> {
        let profile = ledger.profile(player)?;
        if !profile.is_punished_at(now) {
            return None;
        }
        profile.punished_until.map(|until| until - now)
    }

    /// Forget the victim history.
    pub fn clear(&mut self) {
        self.last_victim.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PlayerProfile;

    fn setup(hostility: Hostility) -> (PunishmentTracker, Ledger, [PlayerId; 4]) {
        let config = PunishmentConfig {
            base_duration_seconds: 180,
            cap_seconds: 600,
            sweep_interval_seconds: 1,
            hostility,
        };
        let tracker = PunishmentTracker::new(&config, 1);
        let mut ledger = Ledger::new();
        let ids = [PlayerId::new(), PlayerId::new(), PlayerId::new(), PlayerId::new()];
        for (i, id) in ids.iter().enumerate() {
            ledger.insert_profile(PlayerProfile::new(*id, format!("p{i}")));
        }
        ledger.assign(ids[0], TeamColor::Blue);
        ledger.assign(ids[1], TeamColor::Green);
        ledger.assign(ids[2], TeamColor::Yellow);
        ledger.assign(ids[3], TeamColor::Blue);
        (tracker, ledger, ids)
    }

    #[test]
    fn first_trigger_marks_for_base_duration() {
        let (mut t, mut ledger, [att, a, _, _]) = setup(Hostility::CrossTeam);
        let out = t.trigger(&mut ledger, att, a, 10).expect("trigger");
        assert_eq!(out, Punishment::Marked { until: 190, first: true, announce: true });
        assert!(t.is_punished(&ledger, att, 10));
        assert!(!t.can_equip_protective(&ledger, att, 10));
    }

    #[test]
    fn announces_when_the_victim_changes() {
        let (mut t, mut ledger, [att, a, b, _]) = setup(Hostility::CrossTeam);
        let mut announced = Vec::new();
        let mut last_until = 0;
        for (now, victim) in [(0, a), (1, a), (2, b), (3, a), (4, b)] {
            let Punishment::Marked { until, announce, .. } =
                t.trigger(&mut ledger, att, victim, now).expect("trigger")
            else {
                panic!("expected marked");
            };
            assert!(until > last_until);
            assert!(until - now <= t.cap());
            last_until = until;
            announced.push(announce);
        }
        assert_eq!(announced, vec![true, false, true, true, true]);
    }

    #[test]
    fn expiry_resets_the_last_victim() {
        let (mut t, mut ledger, [att, a, _, _]) = setup(Hostility::CrossTeam);
        t.trigger(&mut ledger, att, a, 0).expect("trigger");
        assert_eq!(t.sweep(&mut ledger, 180), vec![att]);
        assert!(matches!(
            t.trigger(&mut ledger, att, a, 181),
            Ok(Punishment::Marked { first: true, announce: true, .. })
        ));
    }

    #[test]
    fn extension_is_clamped_to_cap_from_now() {
        let (mut t, mut ledger, [att, a, _, _]) = setup(Hostility::CrossTeam);
        for now in 0..10 {
            t.trigger(&mut ledger, att, a, now).expect("trigger");
            let left = t.remaining(&ledger, att, now).expect("punished");
            assert!(left <= 600);
        }
        assert_eq!(t.remaining(&ledger, att, 9), Some(600));
    }

    #[test]
    fn punished_victims_are_exempt() {
        let (mut t, mut ledger, [att, a, b, _]) = setup(Hostility::CrossTeam);
        t.trigger(&mut ledger, a, b, 0).expect("trigger");
        assert_eq!(t.trigger(&mut ledger, att, a, 1), Ok(Punishment::Exempt));
        assert!(!t.is_punished(&ledger, att, 1));
    }

    #[test]
    fn same_team_attacks_depend_on_hostility() {
        let (mut t, mut ledger, [att, _, _, mate]) = setup(Hostility::CrossTeam);
        assert_eq!(t.trigger(&mut ledger, att, mate, 0), Err(Rejection::FriendlyFire));
        let (mut t, mut ledger, [att, _, _, mate]) = setup(Hostility::AnyTeam);
        assert!(matches!(
            t.trigger(&mut ledger, att, mate, 0),
            Ok(Punishment::Marked { first: true, .. })
        ));
    }

    #[test]
    fn self_and_unknown_are_rejected() {
        let (mut t, mut ledger, [att, _, _, _]) = setup(Hostility::CrossTeam);
        assert_eq!(t.trigger(&mut ledger, att, att, 0), Err(Rejection::SelfTarget));
        assert_eq!(
            t.trigger(&mut ledger, att, PlayerId::new(), 0),
            Err(Rejection::UnknownPlayer)
        );
    }

    #[test]
    fn sweep_restores_expired_players() {
        let (mut t, mut ledger, [att, a, _, _]) = setup(Hostility::CrossTeam);
        t.trigger(&mut ledger, att, a, 0).expect("trigger");
        assert!(t.sweep(&mut ledger, 179).is_empty());
        assert_eq!(t.sweep(&mut ledger, 180), vec![att]);
        assert!(!t.is_punished(&ledger, att, 180));
        assert_eq!(ledger.profile(att).and_then(|p| p.punished_until), None);
        // Next offence after expiry counts as a first one again.
        assert!(matches!(
            t.trigger(&mut ledger, att, a, 200),
            Ok(Punishment::Marked { first: true, until: 380, .. })
        ));
    }
}
