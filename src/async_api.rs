use crate::fetcher::FetchOutcome;
use crate::params::Dimension;
use crate::presenter::PreviewView;
use crate::session::Session;
use crate::{Error, PreviewConfig, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    SetPending(Dimension, f64, oneshot::Sender<Result<f64>>),
    Commit(Dimension, oneshot::Sender<Result<FetchOutcome>>),
    Nudge(Dimension, f64, oneshot::Sender<Result<FetchOutcome>>),
    SelectYear(String, oneshot::Sender<Result<FetchOutcome>>),
    Refresh(oneshot::Sender<Result<FetchOutcome>>),
    Fragment(oneshot::Sender<String>),
    View(oneshot::Sender<PreviewView>),
    Close(oneshot::Sender<()>),
}

/// An async-friendly session handle backed by a dedicated worker thread.
///
/// The worker thread owns the `Session` and runs its blocking network calls,
/// so async callers never block their runtime. Commands are processed one at a
/// time in the order they were sent.
#[derive(Clone)]
pub struct AsyncSession {
    cmd_tx: Sender<Command>,
}

impl AsyncSession {
    /// Connect to the configured services on a background thread.
    pub async fn connect(config: PreviewConfig) -> Result<Self> {
        Self::spawn(move || Session::connect(config)).await
    }

    /// Wrap an already built session.
    pub async fn from_session(session: Session) -> Result<Self> {
        Self::spawn(move || Ok(session)).await
    }

    async fn spawn<F>(init: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Session> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let session = match init() {
                Ok(s) => s,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::SetPending(dim, value, resp) => {
                        let _ = resp.send(session.set_pending(dim, value));
                    }
                    Command::Commit(dim, resp) => {
                        let _ = resp.send(session.commit(dim));
                    }
                    Command::Nudge(dim, delta, resp) => {
                        let _ = resp.send(session.nudge(dim, delta));
                    }
                    Command::SelectYear(label, resp) => {
                        let _ = resp.send(session.select_year(&label));
                    }
                    Command::Refresh(resp) => {
                        let _ = resp.send(session.refresh());
                    }
                    Command::Fragment(resp) => {
                        let _ = resp.send(session.fragment());
                    }
                    Command::View(resp) => {
                        let _ = resp.send(session.view());
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(());
                        break;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;
        Ok(Self { cmd_tx })
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Other("session worker has shut down".into()))
    }

    pub async fn set_pending(&self, dim: Dimension, value: f64) -> Result<f64> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SetPending(dim, value, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("SetPending canceled: {}", e)))?
    }

    pub async fn commit(&self, dim: Dimension) -> Result<FetchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Commit(dim, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Commit canceled: {}", e)))?
    }

    pub async fn nudge(&self, dim: Dimension, delta: f64) -> Result<FetchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Nudge(dim, delta, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Nudge canceled: {}", e)))?
    }

    pub async fn select_year(&self, label: &str) -> Result<FetchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SelectYear(label.to_string(), tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("SelectYear canceled: {}", e)))?
    }

    pub async fn refresh(&self) -> Result<FetchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Refresh(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Refresh canceled: {}", e)))?
    }

    pub async fn fragment(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Fragment(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Fragment canceled: {}", e)))
    }

    pub async fn view(&self) -> Result<PreviewView> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::View(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("View canceled: {}", e)))
    }

    /// Stop the worker thread. Other clones of this handle stop working too.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))
    }
}
