//! One-way notifications to the presentation layer.
//!
//! Subsystems describe what happened as a [`Notice`]; the host decides how
//! to show it (chat, title, action bar, sound). Delivery never blocks and
//! never fails from the caller's point of view.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::encounter::EncounterEnd;
use crate::ledger::TeamStanding;
use crate::orchestrator::Phase;
use crate::types::{ActorHandle, PlayerId, RoundId, TeamColor, Tick};

/// Why points were awarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    /// A consumed item was converted.
    Consumption,
    /// A rescue encounter was won.
    Rescue,
    /// A privileged encounter was defeated.
    PrivilegedBonus,
    /// Awarded directly by a host handler.
    Direct,
}

/// Something the presentation layer may want to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The orchestrator changed phase.
    PhaseChanged {
        /// Previous phase.
        from: Phase,
        /// New phase.
        to: Phase,
    },
    /// Countdown announcement.
    CountdownTick {
        /// Seconds until the round starts.
        seconds_left: u64,
    },
    /// Countdown could not start or was cancelled.
    InsufficientPlayers {
        /// Participants online.
        online: usize,
        /// Participants required.
        required: usize,
    },
    /// A round entered Active.
    RoundStarted {
        /// Store-assigned id, if persisted.
        round: Option<RoundId>,
        /// Participants distributed.
        players: u32,
    },
    /// A participant was assigned to a team.
    TeamAssigned {
        /// Participant.
        player: PlayerId,
        /// Team.
        team: TeamColor,
    },
    /// Remaining-time announcement during Active.
    TimeRemaining {
        /// Seconds until the round ends.
        seconds: u64,
    },
    /// The round ended.
    RoundEnded {
        /// Store-assigned id, if persisted.
        round: Option<RoundId>,
        /// Winner; `None` on a tie.
        winner: Option<TeamColor>,
        /// Final standings, best first.
        standings: Vec<TeamStanding>,
    },
    /// Cooldown began.
    CooldownStarted {
        /// Seconds until Waiting.
        seconds: u64,
    },
    /// Points were credited.
    PointsAwarded {
        /// Recipient.
        player: PlayerId,
        /// Amount credited.
        amount: i64,
        /// Where the points came from.
        source: PointSource,
        /// Balance after the credit.
        balance: i64,
    },
    /// A trapped container hurt a participant.
    ContainerTrapped {
        /// Participant.
        player: PlayerId,
        /// Damage dealt.
        damage: f64,
    },
    /// An idle rescue NPC calls a nearby participant.
    HelpRequest {
        /// Participant being called.
        player: PlayerId,
        /// NPC.
        npc: ActorHandle,
        /// NPC display name.
        name: String,
    },
    /// A rescue encounter started.
    EncounterStarted {
        /// Participant.
        player: PlayerId,
        /// Tier of the NPC.
        tier: u8,
        /// Waves to survive.
        waves: u32,
        /// Seconds allowed.
        duration_seconds: u64,
    },
    /// A wave spawned.
    WaveSpawned {
        /// Participant.
        player: PlayerId,
        /// 1-based wave number.
        wave: u32,
        /// Total waves.
        total: u32,
        /// Monsters actually spawned.
        monsters: u32,
    },
    /// Per-second encounter progress.
    EncounterProgress {
        /// Participant.
        player: PlayerId,
        /// Waves spawned so far.
        wave: u32,
        /// Total waves.
        total: u32,
        /// Live monsters.
        monsters_left: usize,
        /// Seconds until failure.
        seconds_left: u64,
    },
    /// The participant drifted into the warning band.
    DistanceWarning {
        /// Participant.
        player: PlayerId,
    },
    /// A rescue encounter was won.
    EncounterWon {
        /// Participant.
        player: PlayerId,
        /// Tier of the NPC.
        tier: u8,
        /// Points granted.
        reward: i64,
    },
    /// A rescue encounter ended without reward.
    EncounterLost {
        /// Participant.
        player: PlayerId,
        /// Failure or abandonment.
        end: EncounterEnd,
    },
    /// A participant became or stayed punished.
    PunishmentApplied {
        /// Punished participant.
        attacker: PlayerId,
        /// Victim of the attack.
        victim: PlayerId,
        /// Tick the status now expires at.
        until: Tick,
        /// Whether this was the first trigger.
        first: bool,
    },
    /// Punished status expired.
    PunishmentExpired {
        /// Participant.
        player: PlayerId,
    },
    /// A privileged encounter appeared.
    PrivilegedSpawned {
        /// Participant who triggered it.
        player: PlayerId,
        /// Spawned actor.
        actor: ActorHandle,
        /// Actor type.
        type_id: String,
    },
    /// A privileged spawn request was dropped because the cap is reached.
    PrivilegedSuppressed {
        /// Participant who triggered it.
        player: PlayerId,
    },
    /// A privileged encounter was defeated.
    PrivilegedDefeated {
        /// Defeater.
        by: PlayerId,
        /// Bonus granted.
        bonus: i64,
    },
}

/// Fire-and-forget sink for notices.
pub trait Notifier {
    /// Deliver a notice. Must not block.
    fn notify(&self, notice: Notice);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}

/// Collects notices in memory until the host drains them.
#[derive(Debug, Clone, Default)]
pub struct BufferedNotifier {
    inner: Arc<Mutex<Vec<Notice>>>,
}

impl BufferedNotifier {
    /// Create an empty buffer. Clones share the same buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered notice.
    #[must_use]
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Copy of the buffered notices.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notice> {
        self.inner.lock().clone()
    }

    /// Number of buffered notices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Notifier for BufferedNotifier {
    fn notify(&self, notice: Notice) {
        self.inner.lock().push(notice);
    }
}

/// Forwards notices to an async presentation task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the presentation task.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // A closed receiver means presentation shut down first; gameplay continues.
        let _ = self.tx.send(notice);
    }
}
