//! Built-in listeners.

use crate::callback::{Callback, RunContext};
use crate::trace::{trace_event, trace_warn};
use crate::util::{DetPostError, DetPostResult};
use std::time::{Duration, Instant};

/// Tracks the running loss and rejects non-finite values.
///
/// The running average restarts with each epoch. With `per_print_times = 0`
/// nothing is logged; otherwise a step line is logged every
/// `per_print_times` global steps.
#[derive(Debug, Default)]
pub struct LossMonitor {
    per_print_times: usize,
    last_print_step: usize,
    sum: f64,
    count: usize,
    epoch_averages: Vec<f32>,
}

impl LossMonitor {
    pub fn new(per_print_times: usize) -> Self {
        Self {
            per_print_times,
            ..Self::default()
        }
    }

    /// Average loss of the current epoch so far.
    pub fn average(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }

    /// Average loss of every finished epoch.
    pub fn epoch_averages(&self) -> &[f32] {
        &self.epoch_averages
    }
}

impl Callback for LossMonitor {
    fn on_train_begin(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        self.last_print_step = 0;
        self.sum = 0.0;
        self.count = 0;
        Ok(())
    }

    fn on_step_end(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
        let Some(loss) = ctx.loss else {
            trace_warn!("step {} reported no loss", ctx.global_step);
            return Ok(());
        };
        if ctx.step_in_epoch == 1 {
            self.sum = 0.0;
            self.count = 0;
        }
        if !loss.is_finite() {
            return Err(DetPostError::InvalidLoss {
                epoch: ctx.epoch,
                step: ctx.step_in_epoch,
                loss,
            });
        }
        self.sum += loss as f64;
        self.count += 1;

        if self.per_print_times != 0
            && ctx.global_step.saturating_sub(self.last_print_step) >= self.per_print_times
        {
            self.last_print_step = ctx.global_step;
            trace_event!(
                "train_step",
                epoch = ctx.epoch,
                step = ctx.step_in_epoch,
                loss = loss,
                avg_loss = self.average().unwrap_or(loss),
                lr = ctx.lr.unwrap_or(f32::NAN)
            );
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
        if let Some(avg) = self.average() {
            self.epoch_averages.push(avg);
            trace_event!("train_epoch", epoch = ctx.epoch, avg_loss = avg);
        }
        Ok(())
    }
}

/// Measures wall time per epoch.
#[derive(Debug, Default)]
pub struct TimeMonitor {
    epoch_start: Option<Instant>,
    step_start: Option<Instant>,
    epoch_times: Vec<Duration>,
    last_step_time: Option<Duration>,
}

impl TimeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch_times(&self) -> &[Duration] {
        &self.epoch_times
    }

    /// Duration of the most recent step.
    pub fn last_step_time(&self) -> Option<Duration> {
        self.last_step_time
    }
}

impl Callback for TimeMonitor {
    fn on_epoch_begin(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        self.epoch_start = Some(Instant::now());
        Ok(())
    }

    fn on_step_begin(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        self.step_start = Some(Instant::now());
        Ok(())
    }

    fn on_step_end(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        self.last_step_time = self.step_start.map(|s| s.elapsed());
        Ok(())
    }

    fn on_epoch_end(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
        if let Some(start) = self.epoch_start.take() {
            let elapsed = start.elapsed();
            self.epoch_times.push(elapsed);
            let per_step_ms = elapsed.as_secs_f64() * 1000.0 / ctx.step_in_epoch.max(1) as f64;
            trace_event!(
                "epoch_time",
                epoch = ctx.epoch,
                seconds = elapsed.as_secs_f64(),
                per_step_ms = per_step_ms
            );
        }
        Ok(())
    }
}

/// Shifts the reported epoch when training resumes from a checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct EpochOffset {
    start_epoch: usize,
}

impl EpochOffset {
    pub fn new(start_epoch: usize) -> Self {
        Self { start_epoch }
    }
}

impl Callback for EpochOffset {
    fn on_epoch_begin(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
        ctx.epoch += self.start_epoch;
        Ok(())
    }
}

/// Publishes a precomputed per-step learning rate into the context.
///
/// Steps past the end of the table keep the last rate.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    table: Vec<f32>,
}

impl LrScheduler {
    pub fn new(table: Vec<f32>) -> DetPostResult<Self> {
        if table.is_empty() {
            return Err(DetPostError::InvalidInput("learning-rate table is empty"));
        }
        Ok(Self { table })
    }
}

impl Callback for LrScheduler {
    fn on_step_begin(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
        let idx = ctx.global_step.saturating_sub(1).min(self.table.len() - 1);
        ctx.lr = Some(self.table[idx]);
        Ok(())
    }
}

/// Evaluates a metric every `interval` epochs and keeps the best value.
pub struct BestMetric<F> {
    interval: usize,
    eval: F,
    best: Option<(usize, f64)>,
    history: Vec<(usize, f64)>,
}

impl<F> BestMetric<F>
where
    F: FnMut(&RunContext) -> DetPostResult<f64>,
{
    pub fn new(interval: usize, eval: F) -> DetPostResult<Self> {
        if interval == 0 {
            return Err(DetPostError::param("interval", "must be at least 1"));
        }
        Ok(Self {
            interval,
            eval,
            best: None,
            history: Vec::new(),
        })
    }

    /// Best `(epoch, value)` seen so far; later epochs win ties.
    pub fn best(&self) -> Option<(usize, f64)> {
        self.best
    }

    pub fn history(&self) -> &[(usize, f64)] {
        &self.history
    }
}

impl<F> Callback for BestMetric<F>
where
    F: FnMut(&RunContext) -> DetPostResult<f64>,
{
    fn on_epoch_end(&mut self, ctx: &mut RunContext) -> DetPostResult<()> {
        if ctx.epoch % self.interval != 0 {
            return Ok(());
        }
        let value = (self.eval)(&*ctx)?;
        self.history.push((ctx.epoch, value));
        if self.best.map_or(true, |(_, best)| value >= best) {
            self.best = Some((ctx.epoch, value));
            trace_event!("best_metric", epoch = ctx.epoch, value = value);
        }
        Ok(())
    }

    fn on_train_end(&mut self, _ctx: &mut RunContext) -> DetPostResult<()> {
        if let Some((epoch, value)) = self.best {
            trace_event!("best_metric_final", epoch = epoch, value = value);
        }
        Ok(())
    }
}
