//! Background ecotype loading.
//!
//! Parsing an ecotype (meshes, texture decode, mip generation) runs on a
//! dedicated tokio runtime's blocking pool. Results come back over a
//! channel and are applied on the main thread once per frame; nothing in
//! a job touches the atlas or the vertex buffer.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::texture::{AtlasLayout, SourceTexture};

use super::def::GeneratorDef;
use super::generator::EcotypeGenerator;
use super::EcotypeId;

/// Shared flag telling a job its result is no longer wanted.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything a job needs to build one ecotype.
#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub id: EcotypeId,
    /// Distinguishes successive loads of the same ID.
    pub generation: u64,
    pub generator: Option<GeneratorDef>,
    pub resource_root: PathBuf,
    pub layout: AtlasLayout,
    pub cancel: CancelToken,
}

/// Generator and texture built by a job.
#[derive(Debug)]
pub struct LoadedEcotype {
    pub generator: EcotypeGenerator,
    pub texture: Option<SourceTexture>,
}

/// Result of a job as seen by the main thread.
#[derive(Debug)]
pub struct LoadCompletion {
    pub id: EcotypeId,
    pub generation: u64,
    pub cancel: CancelToken,
    pub result: Result<LoadedEcotype>,
}

/// Build an ecotype synchronously.
pub fn load_ecotype(request: &LoadRequest) -> Result<LoadedEcotype> {
    let Some(def) = &request.generator else {
        return Ok(LoadedEcotype { generator: EcotypeGenerator::Empty, texture: None });
    };

    let (generator, source) = EcotypeGenerator::build(def, &request.resource_root, &request.layout)?;
    let texture = source
        .map(|s| {
            SourceTexture::load(
                &s,
                &request.resource_root,
                request.layout.slot_width,
                request.layout.slot_height,
            )
        })
        .transpose()?;

    Ok(LoadedEcotype { generator, texture })
}

/// Ecotype loader backed by a dedicated runtime.
pub struct EcotypeLoader {
    runtime: Option<Runtime>,
    result_tx: mpsc::UnboundedSender<LoadCompletion>,
    result_rx: mpsc::UnboundedReceiver<LoadCompletion>,
    in_flight: Vec<CancelToken>,
}

impl EcotypeLoader {
    /// Create a loader with `threads` blocking workers.
    pub fn new(threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name("flora-loader")
            .build()
            .map_err(|e| Error::Loader(format!("failed to start loader runtime: {}", e)))?;
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        Ok(Self {
            runtime: Some(runtime),
            result_tx,
            result_rx,
            in_flight: Vec::new(),
        })
    }

    /// Queue a load. The completion is delivered by `poll_completed`.
    pub fn submit(&mut self, request: LoadRequest) {
        let Some(runtime) = &self.runtime else {
            return;
        };

        let tx = self.result_tx.clone();
        self.in_flight.push(request.cancel.clone());
        runtime.spawn_blocking(move || {
            let result = if request.cancel.is_cancelled() {
                Err(Error::Loader("cancelled".into()))
            } else {
                panic::catch_unwind(AssertUnwindSafe(|| load_ecotype(&request)))
                    .unwrap_or_else(|_| Err(Error::Loader(format!("ecotype {} load panicked", request.id))))
            };
            let _ = tx.send(LoadCompletion {
                id: request.id,
                generation: request.generation,
                cancel: request.cancel,
                result,
            });
        });
    }

    fn complete(&mut self, completion: &LoadCompletion) {
        if let Some(i) = self
            .in_flight
            .iter()
            .position(|t| Arc::ptr_eq(&t.0, &completion.cancel.0))
        {
            self.in_flight.swap_remove(i);
        }
    }

    /// Drain finished jobs without blocking.
    pub fn poll_completed(&mut self) -> Vec<LoadCompletion> {
        let mut done = Vec::new();
        while let Ok(completion) = self.result_rx.try_recv() {
            self.complete(&completion);
            done.push(completion);
        }
        done
    }

    /// Block until every submitted job has reported.
    pub fn wait_idle(&mut self) -> Vec<LoadCompletion> {
        let mut done = self.poll_completed();
        while !self.in_flight.is_empty() {
            match self.result_rx.blocking_recv() {
                Some(completion) => {
                    self.complete(&completion);
                    done.push(completion);
                }
                None => break,
            }
        }
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancel every job that has not reported yet.
    pub fn cancel_all(&self) {
        for token in &self.in_flight {
            token.cancel();
        }
    }
}

impl Drop for EcotypeLoader {
    fn drop(&mut self) {
        self.cancel_all();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
