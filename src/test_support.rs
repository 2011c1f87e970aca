//! Scripted backend for exercising the loader and synthesis paths without a
//! real model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::ModelVariant;
use crate::engines::{BackendError, CloneTarget, ModelBackend, SpeechModel};

pub(crate) const SCRIPTED_SAMPLE_RATE: u32 = 16000;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadBehavior {
    Succeed,
    Fail,
    Panic,
}

pub(crate) struct ScriptedBackend {
    loads: Mutex<Vec<ModelVariant>>,
    load_started: Condvar,
    gate_open: Mutex<bool>,
    gate: Condvar,
    behavior: Mutex<LoadBehavior>,
    load_delay: Duration,
    synth_calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            loads: Mutex::new(Vec::new()),
            load_started: Condvar::new(),
            gate_open: Mutex::new(true),
            gate: Condvar::new(),
            behavior: Mutex::new(LoadBehavior::Succeed),
            load_delay: Duration::ZERO,
            synth_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Loads block until [`open_gate`](Self::open_gate) is called.
    pub(crate) fn gated(self) -> Self {
        *self.gate_open.lock() = false;
        self
    }

    pub(crate) fn open_gate(&self) {
        *self.gate_open.lock() = true;
        self.gate.notify_all();
    }

    pub(crate) fn set_behavior(&self, behavior: LoadBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub(crate) fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    pub(crate) fn loaded_identifiers(&self) -> Vec<String> {
        self.loads
            .lock()
            .iter()
            .map(|variant| match variant {
                ModelVariant::Standard { identifier, .. } => identifier.clone(),
                ModelVariant::Cloning { .. } => "clone".to_string(),
            })
            .collect()
    }

    pub(crate) fn synth_calls(&self) -> usize {
        self.synth_calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` loads have started.
    pub(crate) fn wait_for_loads(&self, n: usize) {
        let mut loads = self.loads.lock();
        while loads.len() < n {
            let timed_out = self
                .load_started
                .wait_for(&mut loads, Duration::from_secs(5))
                .timed_out();
            assert!(!timed_out, "timed out waiting for {n} loads");
        }
    }
}

impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load(&self, variant: &ModelVariant) -> Result<Box<dyn SpeechModel>, BackendError> {
        self.loads.lock().push(variant.clone());
        self.load_started.notify_all();

        {
            let mut open = self.gate_open.lock();
            while !*open {
                self.gate.wait(&mut open);
            }
        }
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }

        match *self.behavior.lock() {
            LoadBehavior::Succeed => Ok(Box::new(ScriptedModel {
                produced: false,
                calls: self.synth_calls.clone(),
            })),
            LoadBehavior::Fail => Err("scripted load failure".into()),
            LoadBehavior::Panic => panic!("scripted load panic"),
        }
    }

    fn available_models(&self) -> Vec<String> {
        vec!["X".to_string(), "Y".to_string()]
    }
}

/// Produces three samples per byte of text; cloned voices are negated.
/// Text containing `FAIL` errors. The sample rate is only reported after
/// the first segment.
pub(crate) struct ScriptedModel {
    produced: bool,
    calls: Arc<AtomicUsize>,
}

pub(crate) fn scripted_samples(text: &str, cloned: bool) -> Vec<f32> {
    let sign = if cloned { -1.0 } else { 1.0 };
    text.bytes()
        .flat_map(|b| {
            let v = sign * b as f32 / 255.0;
            [v, v * 0.5, 0.0]
        })
        .collect()
}

impl SpeechModel for ScriptedModel {
    fn synthesize(
        &mut self,
        text: &str,
        clone: Option<CloneTarget<'_>>,
    ) -> Result<Vec<f32>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL") {
            return Err(format!("cannot voice {text:?}").into());
        }
        self.produced = true;
        Ok(scripted_samples(text, clone.is_some()))
    }

    fn sample_rate(&self) -> Option<u32> {
        self.produced.then_some(SCRIPTED_SAMPLE_RATE)
    }
}
