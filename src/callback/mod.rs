//! Training-loop listeners.
//!
//! Listeners implement [`Callback`] and are registered on a [`CallbackList`],
//! which calls them in registration order at six points: train begin, epoch
//! begin, step begin, step end, epoch end and train end. Every hook receives
//! the shared [`RunContext`] and may fail; the first error stops dispatch and
//! is returned to the caller. A listener ends training early by calling
//! [`RunContext::request_stop`].

mod monitor;

pub use monitor::{BestMetric, EpochOffset, LossMonitor, LrScheduler, TimeMonitor};

use crate::util::DetPostResult;

/// Progress of the training loop as seen by listeners.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    /// Current epoch, 1-based.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Step within the current epoch, 1-based.
    pub step_in_epoch: usize,
    pub steps_per_epoch: usize,
    /// Steps completed across all epochs, including the current one.
    pub global_step: usize,
    /// Loss reported by the most recent step.
    pub loss: Option<f32>,
    /// Learning rate for the current step, when a schedule is attached.
    pub lr: Option<f32>,
    stop: bool,
}

impl RunContext {
    pub fn new(total_epochs: usize, steps_per_epoch: usize) -> Self {
        Self {
            total_epochs,
            steps_per_epoch,
            ..Self::default()
        }
    }

    /// Asks the driver to stop after the current step.
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }
}

/// Listener hooks; every hook defaults to a no-op.
pub trait Callback {
    fn on_train_begin(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        Ok(())
    }

    fn on_step_begin(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        Ok(())
    }

    fn on_step_end(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        Ok(())
    }

    fn on_train_end(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        Ok(())
    }
}

/// Ordered set of listeners.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

macro_rules! dispatch {
    ($name:ident, $hook:ident) => {
        pub fn $name(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
            for cb in self.callbacks.iter_mut() {
                cb.$hook(ctx)?;
            }
            Ok(())
        }
    };
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener after the existing ones.
    pub fn push<C: Callback + 'static>(&mut self, callback: C) -> &mut Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Builder form of [`CallbackList::push`].
    pub fn with<C: Callback + 'static>(mut self, callback: C) -> Self {
        self.push(callback);
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    dispatch!(train_begin, on_train_begin);
    dispatch!(epoch_begin, on_epoch_begin);
    dispatch!(step_begin, on_step_begin);
    dispatch!(step_end, on_step_end);
    dispatch!(epoch_end, on_epoch_end);
    dispatch!(train_end, on_train_end);

    /// Runs `ctx.total_epochs` epochs of `ctx.steps_per_epoch` steps.
    ///
    /// `step` performs one optimization step and returns its loss. The loop
    /// ends early once a listener requests a stop; the epoch-end and
    /// train-end hooks still run.
    pub fn run<F>(&mut self, ctx: &mut RunContext, mut step: F) -> DetPostResult<()>
    where
        F: FnMut(&RunContext) -> DetPostResult<f32>,
    {
        self.train_begin(ctx)?;
        for epoch in 1..=ctx.total_epochs {
            ctx.epoch = epoch;
            ctx.step_in_epoch = 0;
            self.epoch_begin(ctx)?;
            for s in 1..=ctx.steps_per_epoch {
                ctx.step_in_epoch = s;
                ctx.global_step += 1;
                self.step_begin(ctx)?;
                ctx.loss = Some(step(&*ctx)?);
                self.step_end(ctx)?;
                if ctx.stop_requested() {
                    break;
                }
            }
            self.epoch_end(ctx)?;
            if ctx.stop_requested() {
                break;
            }
        }
        self.train_end(ctx)
    }
}
