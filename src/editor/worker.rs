//! Background diagnostics and completion for an editor.
//!
//! Each request runs on its own thread and results come back over a channel.
//! Requests are grouped in lanes (one for diagnostics, one for completion);
//! a newer request in a lane supersedes every older one, and results of
//! superseded requests are dropped instead of delivered.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::model::{Diagnostic, Locale};
use crate::processor::{
    BuildOptions, CodeCompletionItem, Phase, complete_code, generate_diagnostics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Diagnostics,
    Completion,
}

#[derive(Debug, Clone)]
pub enum AdvisoryRequest {
    Diagnostics {
        /// `(file name, source)` of the phases linked before `source`.
        preceding: Vec<(String, String)>,
        source: String,
        options: BuildOptions,
    },
    Completion {
        code: String,
        index: usize,
        locale: Locale,
        asset_folder: Option<PathBuf>,
    },
}

impl AdvisoryRequest {
    pub fn lane(&self) -> Lane {
        match self {
            AdvisoryRequest::Diagnostics { .. } => Lane::Diagnostics,
            AdvisoryRequest::Completion { .. } => Lane::Completion,
        }
    }

    fn run(self) -> Advice {
        match self {
            AdvisoryRequest::Diagnostics {
                preceding,
                source,
                options,
            } => {
                let phases: Vec<Phase> = preceding
                    .iter()
                    .map(|(name, src)| Phase::new(name, src))
                    .collect();
                Advice::Diagnostics(generate_diagnostics(&phases, &source, &options))
            }
            AdvisoryRequest::Completion {
                code,
                index,
                locale,
                asset_folder,
            } => Advice::Completions(complete_code(&code, index, locale, asset_folder.as_deref())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advice {
    Diagnostics(Vec<Diagnostic>),
    Completions(Vec<CodeCompletionItem>),
}

impl Advice {
    fn empty(lane: Lane) -> Self {
        match lane {
            Lane::Diagnostics => Advice::Diagnostics(Vec::new()),
            Lane::Completion => Advice::Completions(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryResult {
    pub lane: Lane,
    pub generation: u64,
    pub advice: Advice,
}

#[derive(Default)]
struct Generations {
    diagnostics: AtomicU64,
    completion: AtomicU64,
}

impl Generations {
    fn of(&self, lane: Lane) -> &AtomicU64 {
        match lane {
            Lane::Diagnostics => &self.diagnostics,
            Lane::Completion => &self.completion,
        }
    }

    fn is_current(&self, lane: Lane, generation: u64) -> bool {
        self.of(lane).load(Ordering::SeqCst) == generation
    }
}

pub struct AdvisoryWorker {
    generations: Arc<Generations>,
    tx: mpsc::Sender<AdvisoryResult>,
    rx: mpsc::Receiver<AdvisoryResult>,
}

impl Default for AdvisoryWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisoryWorker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            generations: Arc::new(Generations::default()),
            tx,
            rx,
        }
    }

    /// Starts `request` in the background and returns its generation.
    pub fn submit(&self, request: AdvisoryRequest) -> u64 {
        let lane = request.lane();
        let generation = self.generations.of(lane).fetch_add(1, Ordering::SeqCst) + 1;
        let generations = Arc::clone(&self.generations);
        let tx = self.tx.clone();

        thread::spawn(move || {
            if !generations.is_current(lane, generation) {
                return;
            }
            let advice = match panic::catch_unwind(AssertUnwindSafe(|| request.run())) {
                Ok(advice) => advice,
                Err(_) => {
                    warn!(?lane, generation, "advisory request panicked");
                    Advice::empty(lane)
                }
            };
            if !generations.is_current(lane, generation) {
                debug!(?lane, generation, "dropping superseded advice");
                return;
            }
            let _ = tx.send(AdvisoryResult {
                lane,
                generation,
                advice,
            });
        });
        generation
    }

    /// Marks every pending request of `lane` as superseded.
    pub fn cancel(&self, lane: Lane) {
        self.generations.of(lane).fetch_add(1, Ordering::SeqCst);
    }

    fn accept(&self, result: AdvisoryResult) -> Option<AdvisoryResult> {
        self.generations
            .is_current(result.lane, result.generation)
            .then_some(result)
    }

    /// A finished, still current result if one is ready.
    pub fn try_recv(&self) -> Option<AdvisoryResult> {
        while let Ok(result) = self.rx.try_recv() {
            if let Some(result) = self.accept(result) {
                return Some(result);
            }
        }
        None
    }

    /// Waits up to `timeout` for a current result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AdvisoryResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            let result = self.rx.recv_timeout(left).ok()?;
            if let Some(result) = self.accept(result) {
                return Some(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(code: &str) -> AdvisoryRequest {
        AdvisoryRequest::Completion {
            code: code.to_string(),
            index: code.chars().count() - 1,
            locale: Locale::Jp,
            asset_folder: None,
        }
    }

    #[test]
    fn test_diagnostics_lane() {
        let worker = AdvisoryWorker::new();
        let generation = worker.submit(AdvisoryRequest::Diagnostics {
            preceding: vec![("Cast.zeile".into(), "let arisa = \"Arisa\"\n".into())],
            source: "narrate(arisa)\nnarrate(rimi)\n".into(),
            options: BuildOptions::for_locale(Locale::Jp),
        });
        let result = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(result.generation, generation);
        let Advice::Diagnostics(diags) = result.advice else {
            panic!("expected diagnostics");
        };
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 2);
    }

    #[test]
    fn test_superseded_results_are_dropped() {
        let worker = AdvisoryWorker::new();
        let first = worker.submit(completion("narr"));
        let second = worker.submit(completion("wai"));
        assert!(second > first);

        let result = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(result.generation, second);
        let Advice::Completions(items) = result.advice else {
            panic!("expected completions");
        };
        assert_eq!(items[0].display_name.text, "wait");
        assert!(worker.recv_timeout(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_cancel_discards_pending() {
        let worker = AdvisoryWorker::new();
        worker.submit(completion("narr"));
        worker.cancel(Lane::Completion);
        assert!(worker.recv_timeout(Duration::from_millis(300)).is_none());
    }
}
