//! Runtime context: owns the session, the pulse scheduler, and the
//! roster, and drives everything from the pulse loop.
//!
//! The context is created at startup and replaced wholesale when the
//! relay mandates a restart; nothing network-facing lives in globals.

use std::time::Duration;

use tokio::time;
use tracing::{info, warn};

use trellis_core::{Scheduler, Settings, PULSES_PER_MINUTE, PULSES_PER_SECOND};
use trellis_net::{PlayerRoster, RelayEvent, Session, SessionConfig, TcpTransport};

use crate::roster::LocalRoster;

/// Seconds added to a relay-announced downtime so every client does not
/// reconnect at the same instant.
const RESTART_FUZZ_SECS: u64 = 10;

/// Connection-scoped tasks; cleared whenever the session is torn down.
const CAT_NET: &str = "net";
/// Tasks that survive a session teardown.
const CAT_WATCHDOG: &str = "watchdog";

/// Work the pulse loop knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    PumpInbound,
    PumpOutbound,
    RefreshPresence,
    LivenessCheck,
    Rebuild,
}

pub struct Context {
    settings: Settings,
    session: Session,
    scheduler: Scheduler<Task>,
    roster: LocalRoster,
    /// Set while a relay-mandated restart window is open.
    restart_pending: bool,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        let session = Session::new(session_config(&settings));
        let roster = LocalRoster::new(settings.players.clone());
        let mut context = Self {
            settings,
            session,
            scheduler: Scheduler::new(),
            roster,
            restart_pending: false,
        };
        context.register_tasks(false);
        context
    }

    /// Register background tasks. Connection-scoped tasks (the pumps and
    /// the presence refresh) always get fresh registrations; the liveness
    /// watchdog is registered once at startup and survives restarts, so
    /// restart mode skips it rather than duplicate it.
    fn register_tasks(&mut self, restart: bool) {
        self.scheduler.clear_category(CAT_NET);
        self.scheduler.schedule_recurring(CAT_NET, 1, Task::PumpInbound);
        self.scheduler.schedule_recurring(CAT_NET, 1, Task::PumpOutbound);
        self.scheduler
            .schedule_recurring(CAT_NET, 5 * PULSES_PER_MINUTE, Task::RefreshPresence);
        if !restart {
            self.scheduler.schedule_recurring(
                CAT_WATCHDOG,
                30 * PULSES_PER_SECOND,
                Task::LivenessCheck,
            );
        }
    }

    /// Run the pulse loop until the process is stopped.
    pub async fn run(&mut self) {
        self.connect().await;
        let mut pulse = time::interval(Duration::from_millis(1000 / PULSES_PER_SECOND));
        loop {
            pulse.tick().await;
            for task in self.scheduler.tick() {
                self.run_task(task).await;
            }
        }
    }

    async fn connect(&mut self) {
        match TcpTransport::dial(&self.settings.relay.addr).await {
            Ok(transport) => self.session.connect(Box::new(transport)),
            Err(e) => {
                warn!(addr = %self.settings.relay.addr, error = %e, "Could not reach relay")
            }
        }
    }

    async fn run_task(&mut self, task: Task) {
        match task {
            Task::PumpInbound => {
                if let Some(event) = self.session.pump_inbound(&self.roster) {
                    self.handle_event(event);
                }
            }
            Task::PumpOutbound => self.session.pump_outbound(),
            Task::RefreshPresence => {
                if self.session.is_authenticated() {
                    self.session.players_status_query(None);
                }
            }
            Task::LivenessCheck => {
                if !self.session.is_connected() && !self.restart_pending {
                    info!("Session down, reconnecting");
                    self.connect().await;
                }
            }
            Task::Rebuild => {
                self.restart_pending = false;
                self.session = Session::new(session_config(&self.settings));
                self.register_tasks(true);
                self.connect().await;
            }
        }
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Restart { downtime_secs } => self.begin_restart(downtime_secs),
            RelayEvent::Broadcast {
                channel,
                name,
                game,
                message,
            } => {
                self.announce(&format!("[{}] {}@{}: {}", channel, name, game, message));
            }
            RelayEvent::PlayerSignedIn { name, game } => {
                self.announce(&format!("{} has signed into {}.", name, game));
            }
            RelayEvent::PlayerSignedOut { name, game } => {
                self.announce(&format!("{} has signed out of {}.", name, game));
            }
            RelayEvent::GameConnected { game } => {
                self.announce(&format!("{} connected to the network.", game));
            }
            RelayEvent::GameDisconnected { game } => {
                self.announce(&format!("{} disconnected from the network.", game));
            }
            RelayEvent::TellReceived {
                from_name,
                from_game,
                to_name,
                sent_at,
                message,
            } => {
                let line = format!(
                    "{}@{} tells you: {} (sent {})",
                    from_name, from_game, message, sent_at
                );
                if !self.roster.deliver(&to_name, &line) {
                    info!(player = %to_name, "Dropping tell for unknown player");
                }
            }
            RelayEvent::TellFailed {
                from_name,
                to_name,
                to_game,
                error,
            } => {
                let line = format!(
                    "Your tell to {}@{} could not be delivered: {}",
                    to_name, to_game, error
                );
                self.roster.deliver(&from_name, &line);
            }
            RelayEvent::GameStatus(report) => {
                info!(
                    game = %report.game,
                    display_name = %report.display_name,
                    players_online = report.players_online_count,
                    "Game status"
                );
            }
            RelayEvent::GameStatusFailed { game, error } => {
                warn!(game = ?game, error = %error, "Game status query failed");
            }
        }
    }

    /// Relay-mandated restart: tear the session down and schedule a
    /// wholesale rebuild once the announced downtime (plus fuzz) passes.
    fn begin_restart(&mut self, downtime_secs: u64) {
        info!(downtime_secs, "Relay restart: suspending session");
        self.session.disconnect();
        self.scheduler.clear_category(CAT_NET);
        self.restart_pending = true;
        let delay = (downtime_secs + RESTART_FUZZ_SECS) * PULSES_PER_SECOND;
        self.scheduler.schedule_once(CAT_WATCHDOG, delay, Task::Rebuild);
    }

    fn announce(&self, text: &str) {
        for player in self.roster.online_players() {
            self.roster.deliver(&player, text);
        }
    }
}

fn session_config(settings: &Settings) -> SessionConfig {
    SessionConfig {
        client_id: settings.identity.client_id.clone(),
        client_secret: settings.identity.client_secret.clone(),
        supports: settings.supports.clone(),
        channels: settings.channels.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        user_agent: settings.identity.user_agent.clone(),
    }
}
