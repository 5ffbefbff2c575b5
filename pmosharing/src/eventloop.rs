//! Boucle d'évènements mono-thread du moteur de partage.
//!
//! Toutes les mutations des bases miroir et tous les messages UI passent par
//! ce thread. Les threads clients exécutent leurs appels bloquants puis
//! postent exactement une continuation (succès ou erreur) ici : c'est le
//! rendez-vous "run-and-dispatch-result" entre le thread réseau et le
//! backend.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::error::{Error, Result};

type Task = Box<dyn FnOnce() + Send>;

enum Control {
    Run { label: String, task: Task },
    Schedule(TimerEntry),
    Shutdown,
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    label: String,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Jeton d'annulation d'un appel différé.
///
/// Le timer reste actif si le jeton est simplement lâché ; seul
/// [`TimerGuard::cancel`] le neutralise.
#[derive(Debug, Clone)]
pub struct TimerGuard {
    cancelled: Arc<AtomicBool>,
}

impl TimerGuard {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Inner {
    join: Mutex<Option<JoinHandle<()>>>,
    seq: Mutex<u64>,
}

/// Handle clonable vers la boucle d'évènements.
#[derive(Clone)]
pub struct EventLoop {
    tx: Sender<Control>,
    inner: Arc<Inner>,
}

impl EventLoop {
    /// Démarre le thread de la boucle.
    pub fn start() -> Self {
        let (tx, rx) = unbounded::<Control>();

        let join = thread::Builder::new()
            .name("Sharing Event Loop".to_string())
            .spawn(move || {
                let mut timers: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();

                loop {
                    // Purger les timers échus avant de bloquer.
                    let now = Instant::now();
                    loop {
                        let due = matches!(timers.peek(), Some(Reverse(entry)) if entry.deadline <= now);
                        if !due {
                            break;
                        }
                        let Reverse(entry) = timers.pop().unwrap();
                        if !entry.cancelled.load(Ordering::SeqCst) {
                            debug!(label = %entry.label, "event loop: timer fired");
                            (entry.task)();
                        }
                    }

                    let received = match timers.peek() {
                        Some(Reverse(next)) => {
                            let timeout = next.deadline.saturating_duration_since(Instant::now());
                            match rx.recv_timeout(timeout) {
                                Ok(control) => control,
                                Err(RecvTimeoutError::Timeout) => continue,
                                Err(RecvTimeoutError::Disconnected) => return,
                            }
                        }
                        None => match rx.recv() {
                            Ok(control) => control,
                            Err(_) => return,
                        },
                    };

                    match received {
                        Control::Run { label, task } => {
                            debug!(label = %label, "event loop: call");
                            task();
                        }
                        Control::Schedule(entry) => {
                            timers.push(Reverse(entry));
                        }
                        Control::Shutdown => return,
                    }
                }
            })
            .expect("failed to spawn event loop thread");

        Self {
            tx,
            inner: Arc::new(Inner {
                join: Mutex::new(Some(join)),
                seq: Mutex::new(0),
            }),
        }
    }

    /// Poste une closure à exécuter sur le thread de la boucle.
    ///
    /// Les closures s'exécutent dans l'ordre d'enfilement.
    pub fn call<F>(&self, label: &str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sent = self.tx.send(Control::Run {
            label: label.to_string(),
            task: Box::new(task),
        });
        if sent.is_err() {
            warn!(label = %label, "event loop: call after shutdown dropped");
        }
    }

    /// Poste une closure différée et annulable.
    pub fn call_later<F>(&self, delay: Duration, label: &str, task: F) -> TimerGuard
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = TimerGuard {
            cancelled: cancelled.clone(),
        };

        let seq = {
            let mut seq = self.inner.seq.lock().unwrap();
            *seq += 1;
            *seq
        };

        let sent = self.tx.send(Control::Schedule(TimerEntry {
            deadline: Instant::now() + delay,
            seq,
            label: label.to_string(),
            cancelled,
            task: Box::new(task),
        }));
        if sent.is_err() {
            warn!(label = %label, "event loop: call_later after shutdown dropped");
        }

        guard
    }

    /// Exécute `work` sur un thread dédié puis poste exactement une des deux
    /// continuations avec le résultat lié.
    ///
    /// La continuation est enfilée avant que le thread ne se termine ; pour
    /// un appelant donné les continuations arrivent donc dans l'ordre des
    /// travaux terminés.
    pub fn call_in_thread<T, W, S, E>(&self, label: &str, work: W, on_success: S, on_error: E)
    where
        T: Send + 'static,
        W: FnOnce() -> Result<T> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let event_loop = self.clone();
        let label = label.to_string();
        let warn_label = label.clone();

        let spawned = thread::Builder::new()
            .name(label.clone())
            .spawn(move || match work() {
                Ok(value) => {
                    let cb_label = format!("result callback ({label})");
                    event_loop.call(&cb_label, move || on_success(value));
                }
                Err(err) => {
                    debug!(label = %label, error = %err, "worker failed");
                    let cb_label = format!("error callback ({label})");
                    event_loop.call(&cb_label, move || on_error(err));
                }
            });

        if spawned.is_err() {
            warn!(label = %warn_label, "failed to spawn worker thread");
        }
    }

    /// Arrête la boucle après les closures déjà enfilées.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Control::Shutdown);
        if let Some(join) = self.inner.join.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}
