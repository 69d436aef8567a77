// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Merges many graphs concurrently, with a deterministic result.
//!
//! A [`MergePipeline`][] owns a fixed pool of worker threads.  Producers hand it graphs with
//! [`add`][`MergePipeline::add`], and collect the single merged result with
//! [`finish`][`MergePipeline::finish`].  The work happens in two phases.
//!
//! **Phase 1: batched accumulation.**  Each input is assigned an arrival sequence number, and goes
//! to slot `sequence mod slots`.  The first graph of a slot becomes its accumulator, and later
//! graphs are merged into it, in arrival order.  Once a slot has accumulated `batch_size` graphs,
//! it is appended to the _done list_.  Every batch carries an id, and batches are appended strictly
//! in id order, even if a later batch happens to finish first.
//!
//! **Phase 2: pairwise reduction.**  Once the inputs are exhausted, every partially filled slot is
//! flushed to the done list (again in batch order), and the done list becomes a work queue.
//! Workers repeatedly remove the two oldest entries, merge the first into the second, and append
//! the result, again in batch-id order, until a single graph remains.
//!
//! Because every merge happens in an order that only depends on the sequence of inputs and on the
//! batch size and slot count, the final graph is identical no matter how many threads run, or how
//! they are scheduled.
//!
//! The pipeline is generic over the [`Mergeable`][] trait, so that the scheduling can be exercised
//! with values other than type graphs.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread::JoinHandle;

use parking_lot::Condvar;
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::PipelineConfig;

/// Something that the pipeline can merge.
pub trait Mergeable: Send + 'static {
    /// Per-worker scratch state, reused for every merge that a worker performs.
    type Context: Default;
    type Error: Send + 'static;

    /// Merges `child` into `parent`.
    fn merge(child: Self, parent: &mut Self, cx: &mut Self::Context) -> Result<(), Self::Error>;

    /// A one-line description of a merged result, for logging.
    fn summary(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Error)]
pub enum PipelineError<E> {
    #[error("no graphs were added to the pipeline")]
    NoInputs,
    #[error("merge failed: {0}")]
    Merge(E),
    #[error("a merge worker panicked")]
    WorkerPanicked,
    #[error("the pipeline has been aborted")]
    Aborted,
}

/// The number of slots and threads that a pipeline runs with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PipelineSizing {
    pub slots: usize,
    pub threads: usize,
}

impl PipelineSizing {
    pub fn new(config: &PipelineConfig, expected_inputs: usize) -> PipelineSizing {
        let batch_size = config.batch_size.max(1);
        let batches = (expected_inputs + batch_size - 1) / batch_size;
        let slots = config.max_slots.min(batches).max(1);
        let threads = config
            .threads
            .unwrap_or_else(|| num_cpus::get() * 3 / 2)
            .min(slots)
            .max(1);
        PipelineSizing { slots, threads }
    }
}

//-------------------------------------------------------------------------------------------------
// Shared state

struct Input<M> {
    graph: M,
    name: String,
}

struct Queue<M> {
    inputs: VecDeque<Input<M>>,
    no_more_inputs: bool,
    next_sequence: usize,
    reduce: VecDeque<M>,
    remaining: usize,
    next_batch: u64,
    last_done: i64,
}

struct SlotState<M> {
    graph: Option<M>,
    merged: usize,
    batch_id: u64,
}

struct Slot<M> {
    state: Mutex<SlotState<M>>,
    /// Paired with the done lock.
    saved: Condvar,
}

struct Done<M> {
    list: VecDeque<M>,
    last_done_batch: i64,
    next_batch_id: u64,
}

struct Shared<M: Mergeable> {
    batch_size: usize,
    throttle: usize,
    queue: Mutex<Queue<M>>,
    work_available: Condvar,
    work_removed: Condvar,
    reduced: Condvar,
    slots: Vec<Slot<M>>,
    done: Mutex<Done<M>>,
    inputs_exhausted: Barrier,
    reduction_ready: Barrier,
    aborted: AtomicBool,
    error: Mutex<Option<PipelineError<M::Error>>>,
}

impl<M: Mergeable> Shared<M> {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Records the first error, and wakes every thread that is waiting for something.
    fn abort(&self, error: PipelineError<M::Error>) {
        {
            let mut slot = self.error.lock();
            if slot.is_none() {
                *slot = Some(error);
            }
        }
        self.aborted.store(true, Ordering::SeqCst);
        // Batch waiters first: they can hold a slot lock that the queue lock holder is waiting on.
        {
            let _done = self.done.lock();
            for slot in &self.slots {
                slot.saved.notify_all();
            }
        }
        {
            let _queue = self.queue.lock();
            self.work_available.notify_all();
            self.work_removed.notify_all();
            self.reduced.notify_all();
        }
    }

    /// Runs one merge.  Callers must release any slot lock before aborting on failure.
    fn merge(
        &self,
        child: M,
        parent: &mut M,
        cx: &mut M::Context,
    ) -> Result<(), PipelineError<M::Error>> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| M::merge(child, parent, cx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(PipelineError::Merge(err)),
            Err(_) => Err(PipelineError::WorkerPanicked),
        }
    }

    /// Every worker must reach every barrier, even after an abort, or the others would wait
    /// forever.
    fn run_worker(&self, index: usize) {
        let mut cx = match std::panic::catch_unwind(M::Context::default) {
            Ok(cx) => Some(cx),
            Err(_) => {
                self.abort(PipelineError::WorkerPanicked);
                None
            }
        };

        if let Some(cx) = cx.as_mut() {
            self.accumulate(index, cx);
        }
        if self.inputs_exhausted.wait().is_leader() {
            self.flush_slots();
        }
        self.reduction_ready.wait();
        if let Some(cx) = cx.as_mut() {
            self.reduce(index, cx);
        }
        log::debug!("worker {}: finished", index);
    }

    //---------------------------------------------------------------------------------------------
    // Phase 1

    fn accumulate(&self, index: usize, cx: &mut M::Context) {
        loop {
            let mut queue = self.queue.lock();
            while queue.inputs.is_empty() && !queue.no_more_inputs && !self.is_aborted() {
                self.work_available.wait(&mut queue);
            }
            if self.is_aborted() {
                return;
            }
            let input = match queue.inputs.pop_front() {
                Some(input) => input,
                None => return,
            };
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            let slot_index = sequence % self.slots.len();
            // Merges into one slot must happen in arrival order, so we claim the slot before
            // anyone else can take the next input.
            let mut slot = self.slots[slot_index].state.lock();
            self.work_removed.notify_all();
            drop(queue);
            if self.is_aborted() {
                return;
            }

            log::debug!(
                "worker {}: {} (#{}) into slot {}",
                index,
                input.name,
                sequence,
                slot_index
            );
            let merged = match slot.graph.take() {
                Some(mut accumulator) => {
                    let merged = self.merge(input.graph, &mut accumulator, cx);
                    slot.graph = Some(accumulator);
                    merged
                }
                None => {
                    slot.graph = Some(input.graph);
                    Ok(())
                }
            };
            if let Err(err) = merged {
                // Another worker can hold the queue lock while it waits for this slot.
                drop(slot);
                self.abort(err);
                return;
            }
            slot.merged += 1;
            if slot.merged >= self.batch_size && !self.save(slot_index, &mut slot) {
                return;
            }
        }
    }

    /// Appends a full slot to the done list, once every earlier batch has been appended.
    fn save(&self, slot_index: usize, slot: &mut SlotState<M>) -> bool {
        let mut done = self.done.lock();
        while done.last_done_batch + 1 != slot.batch_id as i64 && !self.is_aborted() {
            self.slots[slot_index].saved.wait(&mut done);
        }
        if self.is_aborted() {
            return false;
        }
        if let Some(graph) = slot.graph.take() {
            done.list.push_back(graph);
        }
        log::debug!(
            "saved batch {} from slot {} ({} graphs)",
            slot.batch_id,
            slot_index,
            slot.merged
        );
        done.last_done_batch = slot.batch_id as i64;
        slot.batch_id = done.next_batch_id;
        slot.merged = 0;
        done.next_batch_id += 1;
        self.slots[(slot_index + 1) % self.slots.len()]
            .saved
            .notify_all();
        true
    }

    //---------------------------------------------------------------------------------------------
    // Transition

    /// Flushes every partially filled slot in batch order, and turns the done list into the work
    /// queue of the reduction phase.  Only runs on one thread, while every other worker waits at a
    /// barrier.
    fn flush_slots(&self) {
        let mut done = self.done.lock();
        if !self.is_aborted() {
            let next = done.last_done_batch + 1;
            let first = self
                .slots
                .iter()
                .position(|slot| slot.state.lock().batch_id as i64 == next)
                .unwrap_or(0);
            for offset in 0..self.slots.len() {
                let slot_index = (first + offset) % self.slots.len();
                let mut slot = self.slots[slot_index].state.lock();
                if let Some(graph) = slot.graph.take() {
                    log::debug!(
                        "flushed batch {} from slot {} ({} graphs)",
                        slot.batch_id,
                        slot_index,
                        slot.merged
                    );
                    done.list.push_back(graph);
                }
                slot.merged = 0;
            }
        }

        let mut total = done.list.len();
        let mut n = total;
        while n > 1 {
            total += n / 2;
            n = n / 2 + n % 2;
        }

        let mut queue = self.queue.lock();
        queue.reduce = std::mem::take(&mut done.list);
        queue.remaining = total;
        queue.next_batch = done.next_batch_id;
        queue.last_done = done.next_batch_id as i64 - 1;
        log::debug!(
            "reducing {} batches ({} total)",
            queue.reduce.len(),
            queue.remaining
        );
    }

    //---------------------------------------------------------------------------------------------
    // Phase 2

    fn reduce(&self, index: usize, cx: &mut M::Context) {
        loop {
            let (child, mut parent, batch_id) = {
                let mut queue = self.queue.lock();
                while queue.reduce.len() < 2 && queue.remaining > 1 && !self.is_aborted() {
                    self.work_available.wait(&mut queue);
                }
                if self.is_aborted() || queue.remaining <= 1 {
                    return;
                }
                let (child, parent) = match (queue.reduce.pop_front(), queue.reduce.pop_front()) {
                    (Some(child), Some(parent)) => (child, parent),
                    _ => return,
                };
                queue.remaining -= 2;
                let batch_id = queue.next_batch;
                queue.next_batch += 1;
                (child, parent, batch_id)
            };

            log::debug!("worker {}: reducing batch {}", index, batch_id);
            if let Err(err) = self.merge(child, &mut parent, cx) {
                self.abort(err);
                return;
            }

            let mut queue = self.queue.lock();
            while queue.last_done + 1 != batch_id as i64 && !self.is_aborted() {
                self.reduced.wait(&mut queue);
            }
            if self.is_aborted() {
                return;
            }
            queue.reduce.push_back(parent);
            queue.last_done = batch_id as i64;
            self.reduced.notify_all();
            self.work_available.notify_all();
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Pipelines

/// A pool of workers that merges every graph it is given into one.
pub struct MergePipeline<M: Mergeable> {
    shared: Arc<Shared<M>>,
    workers: Vec<JoinHandle<()>>,
    sizing: PipelineSizing,
}

impl<M: Mergeable> MergePipeline<M> {
    /// Starts the worker threads.  `expected_inputs` is used to size the pipeline; it doesn't
    /// have to be exact.
    pub fn start(config: &PipelineConfig, expected_inputs: usize) -> MergePipeline<M> {
        let sizing = PipelineSizing::new(config, expected_inputs);
        log::info!(
            "merging {} graphs using {} slots, {} threads",
            expected_inputs,
            sizing.slots,
            sizing.threads
        );
        let slots = (0..sizing.slots)
            .map(|batch_id| Slot {
                state: Mutex::new(SlotState {
                    graph: None,
                    merged: 0,
                    batch_id: batch_id as u64,
                }),
                saved: Condvar::new(),
            })
            .collect();
        let shared = Arc::new(Shared {
            batch_size: config.batch_size.max(1),
            throttle: config.input_throttle.max(1) * sizing.threads,
            queue: Mutex::new(Queue {
                inputs: VecDeque::new(),
                no_more_inputs: false,
                next_sequence: 0,
                reduce: VecDeque::new(),
                remaining: 0,
                next_batch: 0,
                last_done: -1,
            }),
            work_available: Condvar::new(),
            work_removed: Condvar::new(),
            reduced: Condvar::new(),
            slots,
            done: Mutex::new(Done {
                list: VecDeque::new(),
                last_done_batch: -1,
                next_batch_id: sizing.slots as u64,
            }),
            inputs_exhausted: Barrier::new(sizing.threads),
            reduction_ready: Barrier::new(sizing.threads),
            aborted: AtomicBool::new(false),
            error: Mutex::new(None),
        });
        let workers = (0..sizing.threads)
            .map(|index| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.run_worker(index))
            })
            .collect();
        MergePipeline {
            shared,
            workers,
            sizing,
        }
    }

    pub fn sizing(&self) -> PipelineSizing {
        self.sizing
    }

    /// Adds a graph to the pipeline.  Blocks while too many graphs are waiting to be merged.
    pub fn add<S: Into<String>>(&self, graph: M, name: S) -> Result<(), PipelineError<M::Error>> {
        let shared = &self.shared;
        let mut queue = shared.queue.lock();
        while queue.inputs.len() > shared.throttle && !shared.is_aborted() {
            shared.work_removed.wait(&mut queue);
        }
        if shared.is_aborted() {
            return Err(PipelineError::Aborted);
        }
        queue.inputs.push_back(Input {
            graph,
            name: name.into(),
        });
        shared.work_available.notify_one();
        Ok(())
    }

    fn close(&self) {
        let mut queue = self.shared.queue.lock();
        queue.no_more_inputs = true;
        self.shared.work_available.notify_all();
    }

    /// Waits for every added graph to be merged, and returns the result.
    pub fn finish(mut self) -> Result<M, PipelineError<M::Error>> {
        self.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                self.shared.abort(PipelineError::WorkerPanicked);
            }
        }
        if let Some(error) = self.shared.error.lock().take() {
            return Err(error);
        }
        let mut queue = self.shared.queue.lock();
        let result = queue.reduce.pop_front().ok_or(PipelineError::NoInputs)?;
        match result.summary() {
            Some(summary) => log::debug!("merge pipeline finished: {}", summary),
            None => log::debug!("merge pipeline finished"),
        }
        Ok(result)
    }
}

impl<M: Mergeable> Drop for MergePipeline<M> {
    fn drop(&mut self) {
        // Let any workers that are still running drain the queue and exit.
        if !self.workers.is_empty() {
            self.close();
        }
    }
}

/// Merges a sequence of graphs into one.
pub fn merge_all<M, I>(config: &PipelineConfig, graphs: I) -> Result<M, PipelineError<M::Error>>
where
    M: Mergeable,
    I: IntoIterator<Item = M>,
    I::IntoIter: ExactSizeIterator,
{
    let graphs = graphs.into_iter();
    let pipeline = MergePipeline::start(config, graphs.len());
    for (index, graph) in graphs.enumerate() {
        // A failed add means the pipeline has aborted; finish reports the underlying error.
        if pipeline.add(graph, format!("input {}", index)).is_err() {
            break;
        }
    }
    pipeline.finish()
}
