//! Task that owns a [`SignalingSession`] and serializes everything touching it.
//!
//! Commands from [`SessionHandle`]s, engine events, grace timers and
//! statistics polls are all processed on one task, one at a time. Timers and
//! polls run concurrently but only their results are applied on the task.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::engine::{EngineEnvelope, EngineFactory, IceServer};
use super::session_config::SessionConfig;
use super::session_description::SessionDescription;
use super::session_error::{Result, SessionError};
use super::signaling_session::{
    AnalysisTrigger, GraceTimer, PolledStats, SessionSnapshot, SignalingSession,
};
use super::signaling_state::SessionRole;

const COMMAND_QUEUE_DEPTH: usize = 32;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Initialize {
        role: SessionRole,
        servers: Vec<IceServer>,
        reply: Reply<Result<()>>,
    },
    CreateOffer {
        reply: Reply<Result<SessionDescription>>,
    },
    AcceptOffer {
        offer: String,
        reply: Reply<Result<SessionDescription>>,
    },
    AcceptAnswer {
        answer: String,
        reply: Reply<Result<()>>,
    },
    RemoteCandidate {
        descriptor: String,
        reply: Reply<Result<()>>,
    },
    RefreshDiagnostics {
        reply: Reply<Result<()>>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Reset {
        reply: Reply<()>,
    },
}

enum Completion {
    Stats(PolledStats),
    Grace(GraceTimer),
}

/// Owns the session; run it with [`SessionDriver::run`].
pub struct SessionDriver {
    session: SignalingSession,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<EngineEnvelope>,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
    /// Caller waiting for the local description to leave its grace period.
    awaiting_description: Option<Reply<Result<SessionDescription>>>,
    /// Manual refreshes waiting on their statistics poll, with the poll's epoch.
    awaiting_refresh: Vec<(u64, Reply<Result<()>>)>,
}

impl SessionDriver {
    pub fn new(config: SessionConfig, factory: Arc<dyn EngineFactory>) -> (Self, SessionHandle) {
        let (session, events) = SignalingSession::with_event_channel(config, factory);
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let driver = Self {
            session,
            commands,
            events,
            pending: FuturesUnordered::new(),
            awaiting_description: None,
            awaiting_refresh: Vec::new(),
        };
        (driver, SessionHandle { commands: tx })
    }

    /// Spawns the driver on the current runtime.
    pub fn spawn(config: SessionConfig, factory: Arc<dyn EngineFactory>) -> SessionHandle {
        let (driver, handle) = Self::new(config, factory);
        tokio::spawn(driver.run());
        handle
    }

    /// Processes input until every handle is dropped, then resets the session.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(envelope) = self.events.recv() => {
                    if let Some(trigger) = self.session.handle_event(envelope) {
                        self.schedule_poll(trigger);
                    }
                }
                Some(completion) = self.pending.next(), if !self.pending.is_empty() => {
                    self.complete(completion).await;
                }
            }
        }

        debug!("All session handles dropped, shutting down");
        self.abandon_pending();
        self.session.reset().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize {
                role,
                servers,
                reply,
            } => {
                let _ = reply.send(self.session.initialize(role, &servers).await);
            }
            Command::CreateOffer { reply } => match self.session.create_offer().await {
                Ok(timer) => self.await_grace(timer, reply),
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Command::AcceptOffer { offer, reply } => match self.session.accept_offer(&offer).await {
                Ok(timer) => self.await_grace(timer, reply),
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Command::AcceptAnswer { answer, reply } => {
                let _ = reply.send(self.session.accept_answer(&answer).await);
            }
            Command::RemoteCandidate { descriptor, reply } => {
                let _ = reply.send(self.session.on_remote_candidate_received(&descriptor).await);
            }
            Command::RefreshDiagnostics { reply } => {
                match self.session.require_stats_poll(AnalysisTrigger::Manual) {
                    Ok(poll) => {
                        self.awaiting_refresh.push((self.session.epoch(), reply));
                        self.pending.push(poll.run().map(Completion::Stats).boxed());
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Reset { reply } => {
                self.abandon_pending();
                self.session.reset().await;
                let _ = reply.send(());
            }
        }
    }

    fn await_grace(&mut self, timer: GraceTimer, reply: Reply<Result<SessionDescription>>) {
        debug!("Holding local description for {:?}", timer.delay());
        self.awaiting_description = Some(reply);
        self.pending
            .push(timer.elapsed().map(Completion::Grace).boxed());
    }

    fn schedule_poll(&mut self, trigger: AnalysisTrigger) {
        if let Some(poll) = self.session.stats_poll(trigger) {
            debug!("Polling statistics after {:?}", trigger);
            self.pending.push(poll.run().map(Completion::Stats).boxed());
        }
    }

    async fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Stats(polled) => {
                let epoch = polled.epoch;
                let manual = polled.trigger == AnalysisTrigger::Manual;
                self.session.apply_stats(polled);

                if manual {
                    let waiting = self
                        .awaiting_refresh
                        .iter()
                        .position(|(pending, _)| *pending == epoch);
                    if let Some(index) = waiting {
                        let (_, reply) = self.awaiting_refresh.remove(index);
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            Completion::Grace(timer) => {
                let exposed = match self.session.expose_local_description(timer).await {
                    Ok(Some(description)) => Ok(description),
                    Ok(None) => return,
                    Err(err) => Err(err),
                };
                if let Some(reply) = self.awaiting_description.take() {
                    let _ = reply.send(exposed);
                }
            }
        }
    }

    fn abandon_pending(&mut self) {
        if let Some(reply) = self.awaiting_description.take() {
            info!("Abandoning local description still in its grace period");
            let _ = reply.send(Err(SessionError::Abandoned));
        }
        for (_, reply) in self.awaiting_refresh.drain(..) {
            info!("Abandoning diagnostics refresh still waiting on statistics");
            let _ = reply.send(Err(SessionError::Abandoned));
        }
    }
}

/// Cloneable front end of a [`SessionDriver`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Initialize { .. } => "Initialize",
            Command::CreateOffer { .. } => "CreateOffer",
            Command::AcceptOffer { .. } => "AcceptOffer",
            Command::AcceptAnswer { .. } => "AcceptAnswer",
            Command::RemoteCandidate { .. } => "RemoteCandidate",
            Command::RefreshDiagnostics { .. } => "RefreshDiagnostics",
            Command::Snapshot { .. } => "Snapshot",
            Command::Reset { .. } => "Reset",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Abandoned)?;
        rx.await.map_err(|_| SessionError::Abandoned)
    }

    pub async fn initialize(&self, role: SessionRole, servers: Vec<IceServer>) -> Result<()> {
        self.request(|reply| Command::Initialize {
            role,
            servers,
            reply,
        })
        .await?
    }

    /// Resolves once the offer has collected candidates for the grace period.
    pub async fn create_offer(&self) -> Result<SessionDescription> {
        self.request(|reply| Command::CreateOffer { reply }).await?
    }

    /// Resolves with the answer once its grace period has elapsed.
    pub async fn accept_offer(&self, offer: impl Into<String>) -> Result<SessionDescription> {
        let offer = offer.into();
        self.request(|reply| Command::AcceptOffer { offer, reply })
            .await?
    }

    pub async fn accept_answer(&self, answer: impl Into<String>) -> Result<()> {
        let answer = answer.into();
        self.request(|reply| Command::AcceptAnswer { answer, reply })
            .await?
    }

    pub async fn add_remote_candidate(&self, descriptor: impl Into<String>) -> Result<()> {
        let descriptor = descriptor.into();
        self.request(|reply| Command::RemoteCandidate { descriptor, reply })
            .await?
    }

    pub async fn refresh_diagnostics(&self) -> Result<()> {
        self.request(|reply| Command::RefreshDiagnostics { reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }
}
