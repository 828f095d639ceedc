//! Shared test utilities: instrumented collaborators for pipeline tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parley::{Converse, Error, Listen, Result, Speak};
use tokio_util::sync::CancellationToken;

/// Which collaborator an interval belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Listen,
    Speak,
}

/// A collaborator call; `end` is `None` while still in progress
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    pub activity: Activity,
    pub start: Instant,
    pub end: Option<Instant>,
}

impl Interval {
    fn overlaps(&self, other: &Self) -> bool {
        let self_end = self.end.unwrap_or_else(far_future);
        let other_end = other.end.unwrap_or_else(far_future);
        self.start < other_end && other.start < self_end
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

/// Shared record of when each collaborator was busy
#[derive(Debug, Default)]
pub struct Timeline {
    intervals: Mutex<Vec<Interval>>,
}

impl Timeline {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    fn begin(&self, activity: Activity) -> usize {
        let mut intervals = self.intervals.lock().unwrap();
        intervals.push(Interval {
            activity,
            start: Instant::now(),
            end: None,
        });
        intervals.len() - 1
    }

    fn end(&self, index: usize) {
        self.intervals.lock().unwrap()[index].end = Some(Instant::now());
    }

    pub fn intervals(&self) -> Vec<Interval> {
        self.intervals.lock().unwrap().clone()
    }

    /// Activities in the order they started
    pub fn sequence(&self) -> Vec<Activity> {
        self.intervals().iter().map(|i| i.activity).collect()
    }

    /// Assert no listen ever overlapped a speak
    pub fn assert_half_duplex(&self) {
        let intervals = self.intervals();
        for listen in intervals.iter().filter(|i| i.activity == Activity::Listen) {
            for speak in intervals.iter().filter(|i| i.activity == Activity::Speak) {
                assert!(
                    !listen.overlaps(speak),
                    "listen {listen:?} overlapped speak {speak:?}"
                );
            }
        }
    }
}

/// What a scripted listener does once its script runs out
#[derive(Debug, Clone, Copy)]
pub enum Exhausted {
    /// Block until cancelled, like a quiet room
    Block,
    /// Report end of input
    Close,
}

/// Returns scripted utterances, one per listen
pub struct ScriptedListener {
    script: Mutex<VecDeque<String>>,
    exhausted: Exhausted,
    delay: Duration,
    timeline: Arc<Timeline>,
    calls: Mutex<usize>,
}

impl ScriptedListener {
    pub fn new(script: &[&str], exhausted: Exhausted, timeline: &Arc<Timeline>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().map(ToString::to_string).collect()),
            exhausted,
            delay: Duration::from_millis(5),
            timeline: Arc::clone(timeline),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Listen for ScriptedListener {
    async fn listen(&self, cancel: &CancellationToken) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        let span = self.timeline.begin(Activity::Listen);

        let next = self.script.lock().unwrap().pop_front();
        let result = match (next, self.exhausted) {
            (Some(utterance), _) => {
                tokio::time::sleep(self.delay).await;
                Ok(utterance)
            }
            (None, Exhausted::Block) => {
                cancel.cancelled().await;
                Ok(String::new())
            }
            (None, Exhausted::Close) => Err(Error::InputClosed("script finished".to_string())),
        };

        self.timeline.end(span);
        result
    }
}

/// Replies from a lookup table; unknown prompts fail like an upstream outage
pub struct TableConverser {
    replies: HashMap<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl TableConverser {
    pub fn new(replies: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converse for TableConverser {
    async fn process(&self, prompt: &str, _cancel: &CancellationToken) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.replies
            .get(prompt)
            .cloned()
            .ok_or_else(|| Error::Conversation(format!("429 quota exceeded for {prompt:?}")))
    }
}

/// Records what it was asked to say and how long saying it took
pub struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
    delay: Duration,
    timeline: Arc<Timeline>,
}

impl RecordingSpeaker {
    pub fn new(delay: Duration, timeline: &Arc<Timeline>) -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            delay,
            timeline: Arc::clone(timeline),
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Speak for RecordingSpeaker {
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let span = self.timeline.begin(Activity::Speak);
        self.spoken.lock().unwrap().push(text.to_string());

        let result = tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(self.delay) => Ok(()),
        };

        self.timeline.end(span);
        result
    }
}

/// Poll `condition` until it holds, panicking after `timeout`
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A microphone that is gone for good but never reports end of input
pub struct BrokenListener {
    calls: AtomicUsize,
}

impl BrokenListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Listen for BrokenListener {
    async fn listen(&self, _cancel: &CancellationToken) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Audio("input device disappeared".to_string()))
    }
}
