use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use tokio::sync::{Barrier, Notify};

use rundag::dag::CapabilityTag;
use rundag::exec::{SharedUnit, Unit, UnitFuture};

/// Something a fake unit did, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Finished(String),
}

/// Shared log of unit starts/finishes plus a concurrency gauge.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&self, name: &str) {
        self.events.lock().unwrap().push(Event::Started(name.to_string()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
    }

    fn finish(&self, name: &str) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Finished(name.to_string()));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Names of started units, in start order.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Started(name) => Some(name),
                Event::Finished(_) => None,
            })
            .collect()
    }

    pub fn was_started(&self, name: &str) -> bool {
        self.index_of(&Event::Started(name.to_string())).is_some()
    }

    pub fn index_of(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// `unit` started only after `prerequisite` finished.
    pub fn started_after_finished(&self, unit: &str, prerequisite: &str) -> bool {
        match (
            self.index_of(&Event::Started(unit.to_string())),
            self.index_of(&Event::Finished(prerequisite.to_string())),
        ) {
            (Some(started), Some(finished)) => started > finished,
            _ => false,
        }
    }

    /// Highest number of units observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    Fail(String),
    Panic,
    Hang,
}

/// A scriptable unit that records what it does into a [`Recorder`].
#[derive(Debug, Clone)]
pub struct FakeUnit {
    name: String,
    kind: String,
    provides: BTreeSet<CapabilityTag>,
    recorder: Recorder,
    delay: Duration,
    behaviour: Behaviour,
    barrier: Option<Arc<Barrier>>,
    notify_on_start: Option<Arc<Notify>>,
    wait_for: Option<Arc<Notify>>,
}

impl FakeUnit {
    pub fn new(name: &str, kind: &str, recorder: &Recorder) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            provides: BTreeSet::from([kind.to_string()]),
            recorder: recorder.clone(),
            delay: Duration::from_millis(0),
            behaviour: Behaviour::Succeed,
            barrier: None,
            notify_on_start: None,
            wait_for: None,
        }
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.behaviour = Behaviour::Fail(message.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    /// Never finishes.
    pub fn hanging(mut self) -> Self {
        self.behaviour = Behaviour::Hang;
        self
    }

    pub fn also_provides(mut self, tag: &str) -> Self {
        self.provides.insert(tag.to_string());
        self
    }

    /// Wait on `barrier` after starting; only passes once enough units are
    /// running at the same time.
    pub fn barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn notify_on_start(mut self, notify: Arc<Notify>) -> Self {
        self.notify_on_start = Some(notify);
        self
    }

    /// Block after starting until `notify` fires.
    pub fn wait_for(mut self, notify: Arc<Notify>) -> Self {
        self.wait_for = Some(notify);
        self
    }

    pub fn shared<C: Send + Sync + 'static>(self) -> SharedUnit<C> {
        Arc::new(self)
    }
}

impl<C: Send + Sync + 'static> Unit<C> for FakeUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn provides(&self) -> BTreeSet<CapabilityTag> {
        self.provides.clone()
    }

    fn execute(&self, _context: Arc<C>) -> UnitFuture<'_> {
        Box::pin(async move {
            self.recorder.start(&self.name);

            if let Some(ref notify) = self.notify_on_start {
                notify.notify_one();
            }
            if let Some(ref barrier) = self.barrier {
                barrier.wait().await;
            }
            if let Some(ref notify) = self.wait_for {
                notify.notified().await;
            }
            if matches!(self.behaviour, Behaviour::Hang) {
                std::future::pending::<()>().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.recorder.finish(&self.name);

            match &self.behaviour {
                Behaviour::Succeed | Behaviour::Hang => Ok(()),
                Behaviour::Fail(message) => bail!("{}", message),
                Behaviour::Panic => panic!("{} exploded", self.name),
            }
        })
    }
}
