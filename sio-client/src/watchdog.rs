//! The liveness watchdog: a one-shot timer armed after the handshake and
//! re-armed on every server PING. Expiry raises an `Error` event and
//! nothing else; closing the connection stays the application's call.
//!
//! Arming and cancelling bump an epoch under the session lock, and the
//! expiry path re-checks that epoch under the same lock before doing
//! anything. A `Delay` that fires after a cancel therefore observes a
//! stale epoch and becomes a no-op, which is what makes cancellation
//! synchronous from the caller's point of view.

use std::sync::Weak;
use std::time::Duration;

use futures::{channel::mpsc, select, FutureExt, StreamExt};
use futures_timer::Delay;

use crate::session;
use crate::Inner;

pub(crate) struct Watchdog {
    commands: mpsc::UnboundedSender<Command>,
}

pub(crate) enum Command {
    Arm { epoch: u64, duration: Duration },
}

impl Watchdog {
    pub fn new(commands: mpsc::UnboundedSender<Command>) -> Watchdog {
        Watchdog { commands }
    }

    pub fn channel() -> (mpsc::UnboundedSender<Command>, mpsc::UnboundedReceiver<Command>) {
        mpsc::unbounded()
    }

    /// Schedules (or reschedules) the one-shot. The send can only fail if
    /// the client is being torn down, in which case firing is moot anyway.
    pub fn arm(&self, epoch: u64, duration: Duration) {
        let _ = self.commands.unbounded_send(Command::Arm { epoch, duration });
    }
}

/// The timer task. Ends when the client goes away (the command channel
/// closes with it) or when an expiry finds the client already dropped.
pub(crate) async fn run(inner: Weak<Inner>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut pending: Option<(u64, Delay)> = None;
    loop {
        match pending.take() {
            Some((epoch, delay)) => {
                let mut delay = delay.fuse();
                select! {
                    _ = delay => {
                        match inner.upgrade() {
                            Some(inner) => session::liveness_expired(&inner, epoch),
                            None => return,
                        }
                    }
                    command = commands.next() => {
                        match command {
                            Some(Command::Arm { epoch, duration }) => {
                                pending = Some((epoch, Delay::new(duration)));
                            }
                            None => return,
                        }
                    }
                }
            }
            None => match commands.next().await {
                Some(Command::Arm { epoch, duration }) => {
                    pending = Some((epoch, Delay::new(duration)));
                }
                None => return,
            },
        }
    }
}

/// Bumps the epoch and schedules the timer. Callers hold the session lock.
pub(crate) fn arm(inner: &Inner, session: &mut session::Session, duration: Duration) {
    session.liveness.epoch += 1;
    session.liveness.armed = true;
    session.liveness.duration = Some(duration);
    inner.watchdog.arm(session.liveness.epoch, duration);
}

/// Invalidates any scheduled expiry. Callers hold the session lock; once
/// it is released no expiry for an earlier arming can fire.
pub(crate) fn cancel(session: &mut session::Session) {
    session.liveness.epoch += 1;
    session.liveness.armed = false;
}
